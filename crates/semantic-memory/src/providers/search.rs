//! Search/ask gateway trait
//!
//! The query side of the memory consumes what completed pipelines produced.
//! Ranking and storage live behind this trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{MemoryAnswer, MemoryFilter, SearchResult};

/// Trait for querying processed documents, keyed by index
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Return the partitions relevant to `query`
    async fn search(
        &self,
        index: &str,
        query: &str,
        filter: Option<&MemoryFilter>,
        min_relevance: f32,
        limit: usize,
    ) -> Result<SearchResult>;

    /// Answer a question using the index content
    async fn ask(
        &self,
        index: &str,
        question: &str,
        filter: Option<&MemoryFilter>,
        min_relevance: f32,
    ) -> Result<MemoryAnswer>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
