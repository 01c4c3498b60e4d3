//! Documents, tags and upload requests
//!
//! A [`Document`] is what callers build; an [`UploadRequest`] is what the
//! orchestrator consumes. Converting one into the other reads every content
//! part into memory.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::types::naming::{new_document_id, validate_document_id};

/// Prefix of tag keys owned by the orchestrator
pub const RESERVED_TAG_PREFIX: &str = "__";
/// Tag carrying the document id on every document
pub const RESERVED_DOCUMENT_ID_TAG: &str = "__document_id";
/// Tag carrying the detected MIME type of each file
pub const RESERVED_FILE_TYPE_TAG: &str = "__file_type";

/// Tags attached to a document: each key maps to one or more values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagCollection {
    tags: BTreeMap<String, Vec<String>>,
}

impl TagCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key with no value
    pub fn add_key(&mut self, key: impl Into<String>) -> &mut Self {
        self.tags.entry(key.into()).or_default();
        self
    }

    /// Add a value under a key, keeping existing values
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let values = self.tags.entry(key.into()).or_default();
        let value = value.into();
        if !values.contains(&value) {
            values.push(value);
        }
        self
    }

    /// Builder-style [`TagCollection::add`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(key, value);
        self
    }

    /// Replace all values of a key
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.tags.insert(key.into(), vec![value.into()]);
        self
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.tags.get(key).map(Vec::as_slice)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.tags.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Flattened `(key, value)` pairs; keys without values yield nothing
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    /// Merge `other` into `self`
    pub fn extend(&mut self, other: &TagCollection) {
        for (key, values) in &other.tags {
            self.add_key(key.clone());
            for value in values {
                self.add(key.clone(), value.clone());
            }
        }
    }

    /// Reject empty keys, keys containing `=` and, unless `allow_reserved`,
    /// keys using the reserved prefix
    pub fn validate(&self, allow_reserved: bool) -> Result<()> {
        for key in self.tags.keys() {
            if key.trim().is_empty() {
                return Err(Error::validation("Tag key is empty"));
            }
            if key.contains('=') {
                return Err(Error::validation(format!(
                    "Tag key '{}' contains '='",
                    key
                )));
            }
            if !allow_reserved && key.starts_with(RESERVED_TAG_PREFIX) {
                return Err(Error::validation(format!(
                    "Tag key '{}' uses the reserved prefix '{}'",
                    key, RESERVED_TAG_PREFIX
                )));
            }
        }
        Ok(())
    }
}

/// Where the bytes of a content part come from
#[derive(Debug, Clone)]
pub enum FileContent {
    /// A file on the local filesystem, read at upload time
    Path(PathBuf),
    /// Bytes already in memory
    Bytes(Bytes),
}

/// A named content part of a document
#[derive(Debug, Clone)]
pub struct DocumentFile {
    pub name: String,
    pub content: FileContent,
}

/// Logical unit being ingested
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Caller-supplied id, generated at upload time when absent
    pub id: Option<String>,
    pub tags: TagCollection,
    pub files: Vec<DocumentFile>,
}

impl Document {
    pub fn new(id: Option<String>) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: TagCollection) -> Self {
        self.tags = tags;
        self
    }

    /// Add a file from disk; the name is the path's file name
    pub fn add_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        self.files.push(DocumentFile {
            name,
            content: FileContent::Path(path),
        });
        self
    }

    /// Add in-memory bytes under a file name
    pub fn add_bytes(mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.files.push(DocumentFile {
            name: name.into(),
            content: FileContent::Bytes(data.into()),
        });
        self
    }

    /// Drain an async reader into a named part
    pub async fn add_stream<R>(self, name: Option<&str>, mut reader: R) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("content.bin")
            .to_string();
        Ok(self.add_bytes(name, data))
    }

    /// Resolve every part into memory and build the request for `index`
    pub async fn into_upload_request(
        self,
        index: Option<String>,
        steps: Vec<String>,
    ) -> Result<UploadRequest> {
        let document_id = match self.id {
            Some(id) => {
                validate_document_id(&id)?;
                id
            }
            None => new_document_id(),
        };

        let mut files = Vec::with_capacity(self.files.len());
        for file in self.files {
            let data = match file.content {
                FileContent::Bytes(data) => data,
                FileContent::Path(path) => Bytes::from(tokio::fs::read(&path).await.map_err(|e| {
                    Error::validation(format!("Cannot read '{}': {}", path.display(), e))
                })?),
            };
            files.push(UploadFile {
                name: file.name,
                data,
            });
        }

        Ok(UploadRequest {
            index,
            document_id,
            tags: self.tags,
            steps,
            files,
        })
    }
}

/// A content part ready for upload
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub data: Bytes,
}

/// What the orchestrator consumes for one import
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Target index; normalized by the orchestrator
    pub index: Option<String>,
    pub document_id: String,
    pub tags: TagCollection,
    /// Requested step names; empty means the configured default sequence
    pub steps: Vec<String>,
    pub files: Vec<UploadFile>,
}

impl UploadRequest {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            index: None,
            document_id: document_id.into(),
            tags: TagCollection::new(),
            steps: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps = steps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tags(mut self, tags: TagCollection) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_file(mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.files.push(UploadFile {
            name: name.into(),
            data: data.into(),
        });
        self
    }
}
