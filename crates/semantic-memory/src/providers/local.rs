//! Content store implementations: filesystem and process memory

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::{Error, Result};

use super::content_store::{validate_file_name, ContentStore};

/// Local content store using one directory per `index/document_id`
pub struct LocalContentStore {
    /// Root directory
    root: PathBuf,
}

impl LocalContentStore {
    /// Create a new local content store
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Directory holding a document's files
    fn document_dir(&self, index: &str, document_id: &str) -> Result<PathBuf> {
        validate_file_name(index)?;
        validate_file_name(document_id)?;
        Ok(self.root.join(index).join(document_id))
    }

    fn file_path(&self, index: &str, document_id: &str, file_name: &str) -> Result<PathBuf> {
        validate_file_name(file_name)?;
        Ok(self.document_dir(index, document_id)?.join(file_name))
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn write_file(
        &self,
        index: &str,
        document_id: &str,
        file_name: &str,
        data: Bytes,
    ) -> Result<u64> {
        let path = self.file_path(index, document_id, file_name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        Ok(data.len() as u64)
    }

    async fn read_file(&self, index: &str, document_id: &str, file_name: &str) -> Result<Bytes> {
        let path = self.file_path(index, document_id, file_name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::storage(format!(
                "File '{}' not found for {}/{}",
                file_name, index, document_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn file_exists(&self, index: &str, document_id: &str, file_name: &str) -> Result<bool> {
        let path = self.file_path(index, document_id, file_name)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn list_files(&self, index: &str, document_id: &str) -> Result<Vec<String>> {
        let dir = self.document_dir(index, document_id)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_document(&self, index: &str, document_id: &str) -> Result<usize> {
        let count = self.list_files(index, document_id).await?.len();
        let dir = self.document_dir(index, document_id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(count),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        "local-fs"
    }
}

/// Content store kept in process memory
#[derive(Default)]
pub struct InMemoryContentStore {
    files: DashMap<(String, String), DashMap<String, Bytes>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(index: &str, document_id: &str) -> (String, String) {
        (index.to_string(), document_id.to_string())
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn write_file(
        &self,
        index: &str,
        document_id: &str,
        file_name: &str,
        data: Bytes,
    ) -> Result<u64> {
        validate_file_name(file_name)?;
        let size = data.len() as u64;
        self.files
            .entry(Self::key(index, document_id))
            .or_default()
            .insert(file_name.to_string(), data);
        Ok(size)
    }

    async fn read_file(&self, index: &str, document_id: &str, file_name: &str) -> Result<Bytes> {
        self.files
            .get(&Self::key(index, document_id))
            .and_then(|files| files.get(file_name).map(|d| d.clone()))
            .ok_or_else(|| {
                Error::storage(format!(
                    "File '{}' not found for {}/{}",
                    file_name, index, document_id
                ))
            })
    }

    async fn file_exists(&self, index: &str, document_id: &str, file_name: &str) -> Result<bool> {
        Ok(self
            .files
            .get(&Self::key(index, document_id))
            .map(|files| files.contains_key(file_name))
            .unwrap_or(false))
    }

    async fn list_files(&self, index: &str, document_id: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .files
            .get(&Self::key(index, document_id))
            .map(|files| files.iter().map(|e| e.key().clone()).collect())
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    async fn delete_document(&self, index: &str, document_id: &str) -> Result<usize> {
        Ok(self
            .files
            .remove(&Self::key(index, document_id))
            .map(|(_, files)| files.len())
            .unwrap_or(0))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exercise(store: &dyn ContentStore) {
        store
            .write_file("kb", "doc1", "a.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        store
            .write_file("kb", "doc1", "b.txt", Bytes::from_static(b"world"))
            .await
            .unwrap();

        assert_eq!(&store.read_file("kb", "doc1", "a.txt").await.unwrap()[..], b"hello");
        assert!(store.file_exists("kb", "doc1", "b.txt").await.unwrap());
        assert!(!store.file_exists("kb", "doc2", "b.txt").await.unwrap());
        assert_eq!(store.list_files("kb", "doc1").await.unwrap(), vec!["a.txt", "b.txt"]);

        assert!(store.write_file("kb", "doc1", "../x", Bytes::new()).await.is_err());

        assert_eq!(store.delete_document("kb", "doc1").await.unwrap(), 2);
        assert!(store.list_files("kb", "doc1").await.unwrap().is_empty());
        assert_eq!(store.delete_document("kb", "doc1").await.unwrap(), 0);
        assert!(store.read_file("kb", "doc1", "a.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        exercise(&InMemoryContentStore::new()).await;
    }

    #[tokio::test]
    async fn test_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalContentStore::new(dir.path().join("content")).unwrap();
        exercise(&store).await;
    }
}
