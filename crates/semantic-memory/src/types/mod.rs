//! Core types for documents, pipeline state and search

pub mod document;
pub mod naming;
pub mod pipeline;
pub mod search;

pub use document::{
    Document, DocumentFile, FileContent, TagCollection, UploadFile, UploadRequest,
    RESERVED_DOCUMENT_ID_TAG, RESERVED_FILE_TYPE_TAG, RESERVED_TAG_PREFIX,
};
pub use naming::{clean_index_name, clean_index_name_or, DEFAULT_INDEX};
pub use pipeline::{
    DataPipeline, FileDetails, PipelineKey, PipelineKind, PipelineStatus, PipelineStatusSummary,
    PipelineStep, StepStatus,
};
pub use search::{Citation, MemoryAnswer, MemoryFilter, SearchResult};
