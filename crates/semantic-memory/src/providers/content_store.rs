//! Content store provider trait for uploaded files and step artifacts

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};

/// Trait for byte storage namespaced by `(index, document_id)`
///
/// Implementations:
/// - `InMemoryContentStore`: process memory
/// - `LocalContentStore`: local filesystem
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store a file, replacing any previous content. Returns the size written.
    async fn write_file(
        &self,
        index: &str,
        document_id: &str,
        file_name: &str,
        data: Bytes,
    ) -> Result<u64>;

    /// Read a stored file
    async fn read_file(&self, index: &str, document_id: &str, file_name: &str) -> Result<Bytes>;

    /// Check if a file exists
    async fn file_exists(&self, index: &str, document_id: &str, file_name: &str) -> Result<bool>;

    /// Names of every file stored for a document, sorted
    async fn list_files(&self, index: &str, document_id: &str) -> Result<Vec<String>>;

    /// Remove everything stored for a document. Returns the number of files removed.
    async fn delete_document(&self, index: &str, document_id: &str) -> Result<usize>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}

/// Reject names that could escape the document's namespace
pub fn validate_file_name(file_name: &str) -> Result<()> {
    let invalid = file_name.trim().is_empty()
        || file_name == "."
        || file_name == ".."
        || file_name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(Error::validation(format!("Invalid file name '{}'", file_name)));
    }
    Ok(())
}
