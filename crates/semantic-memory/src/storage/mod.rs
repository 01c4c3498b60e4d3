//! Storage for pipeline state
//!
//! Every write is a compare-and-swap on the pipeline version, so a writer
//! holding a stale snapshot can never overwrite a newer state.

mod database;
mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DataPipeline, PipelineKey};

pub use database::{SqlitePipelineStore, SqliteStoreStats};
pub use memory::InMemoryPipelineStore;

/// Durable map from `(index, document_id)` to [`DataPipeline`]
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Current state, if any
    async fn get(&self, key: &PipelineKey) -> Result<Option<DataPipeline>>;

    /// Write `pipeline` if the stored version equals `expected_version`.
    ///
    /// `None` means no record may exist yet. A mismatch yields
    /// [`crate::Error::VersionConflict`] and leaves the store unchanged.
    async fn save(&self, pipeline: &DataPipeline, expected_version: Option<u64>) -> Result<()>;

    /// All pipelines of an index, ordered by document id
    async fn list(&self, index: &str) -> Result<Vec<DataPipeline>>;

    /// Pipelines whose derived status is still in progress
    async fn list_in_progress(&self) -> Result<Vec<DataPipeline>>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
