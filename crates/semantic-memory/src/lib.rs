//! semantic-memory: document ingestion pipeline orchestrator
//!
//! Documents (files, streams, text, web pages) are imported into an index
//! through a durable, resumable sequence of named steps. Each step is
//! executed by a pluggable [`StepHandler`]; the [`Orchestrator`] persists the
//! pipeline state after every transition, allows one active run per
//! document, and answers readiness queries. [`Memory`] is the client facade
//! that also forwards search/ask calls to a [`SearchClient`].

pub mod config;
pub mod error;
pub mod memory;
pub mod processing;
pub mod providers;
pub mod storage;
pub mod types;

pub use config::{ExecutionMode, MemoryConfig, OrchestratorConfig, StorageBackend, StorageConfig};
pub use error::{Error, Result};
pub use memory::{ImportOptions, Memory, MemoryBuilder};
pub use processing::{
    DeleteDocumentHandler, HandlerRegistry, Orchestrator, PipelineContext, StepError,
    StepErrorKind, StepHandler, StepOutput,
};
pub use providers::{ContentStore, InMemoryContentStore, LocalContentStore, SearchClient};
pub use storage::{InMemoryPipelineStore, PipelineStore, SqlitePipelineStore};
pub use types::{
    DataPipeline, Document, MemoryAnswer, MemoryFilter, PipelineKey, PipelineKind,
    PipelineStatus, PipelineStatusSummary, SearchResult, StepStatus, TagCollection,
    UploadRequest,
};

/// Re-exported so callers can build tokens without a direct dependency
pub use tokio_util::sync::CancellationToken;
