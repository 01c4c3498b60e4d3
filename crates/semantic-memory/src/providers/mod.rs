//! Provider abstractions for content storage and search
//!
//! Trait-based seams that let the orchestrator switch between in-memory and
//! local-disk content, and plug in any search backend.

pub mod content_store;
pub mod local;
pub mod search;

pub use content_store::{validate_file_name, ContentStore};
pub use local::{InMemoryContentStore, LocalContentStore};
pub use search::SearchClient;
