//! Request and response shapes of the search/ask gateway

use serde::{Deserialize, Serialize};

use crate::types::document::TagCollection;

/// Tag filter applied by the search gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryFilter {
    #[serde(default)]
    pub tags: TagCollection,
}

impl MemoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.add(key, value);
        self
    }

    pub fn by_document(self, document_id: impl Into<String>) -> Self {
        self.by_tag(crate::types::document::RESERVED_DOCUMENT_ID_TAG, document_id)
    }
}

/// A partition of a document matched by a query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub index: String,
    pub document_id: String,
    pub file_name: String,
    pub text: String,
    pub relevance: f32,
    #[serde(default)]
    pub tags: TagCollection,
}

/// Result of a search call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub no_result: bool,
    pub results: Vec<Citation>,
}

/// Result of an ask call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryAnswer {
    pub question: String,
    pub no_result: bool,
    pub text: String,
    pub relevant_sources: Vec<Citation>,
}
