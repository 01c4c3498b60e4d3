//! Serverless memory client
//!
//! [`Memory`] owns one orchestrator and one search client. It turns files,
//! streams, text and web pages into upload requests, normalizes index names
//! and forwards search/ask calls to the gateway.

use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::processing::{Orchestrator, StepHandler};
use crate::providers::SearchClient;
use crate::types::naming::validate_web_url;
use crate::types::{
    DataPipeline, Document, MemoryAnswer, MemoryFilter, PipelineStatusSummary, SearchResult,
    TagCollection, UploadRequest,
};

/// File name used for text imports
pub const TEXT_FILE_NAME: &str = "content.txt";
/// File name used for web page imports; the content is the URL itself
pub const URL_FILE_NAME: &str = "content.url";

/// Optional settings shared by the single-content import calls
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub document_id: Option<String>,
    pub index: Option<String>,
    pub tags: TagCollection,
    /// Empty means the configured default steps
    pub steps: Vec<String>,
}

impl ImportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document_id(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_tags(mut self, tags: TagCollection) -> Self {
        self.tags = tags;
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

    fn document(&self) -> Document {
        Document::new(self.document_id.clone()).with_tags(self.tags.clone())
    }
}

/// Builder for [`Memory`]
#[derive(Default)]
pub struct MemoryBuilder {
    orchestrator: Option<Orchestrator>,
    search: Option<Arc<dyn SearchClient>>,
    handlers: Vec<Arc<dyn StepHandler>>,
}

impl MemoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_orchestrator(mut self, orchestrator: Orchestrator) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn with_search_client(mut self, search: Arc<dyn SearchClient>) -> Self {
        self.search = Some(search);
        self
    }

    /// Handler registered on the orchestrator when the memory is built
    pub fn with_handler(mut self, handler: Arc<dyn StepHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn build(self) -> Result<Memory> {
        let orchestrator = self
            .orchestrator
            .ok_or_else(|| Error::config("Memory requires a pipeline orchestrator"))?;
        let search = self
            .search
            .ok_or_else(|| Error::config("Memory requires a search client"))?;

        for handler in self.handlers {
            orchestrator.register_handler(handler);
        }

        tracing::info!(
            search = search.name(),
            default_index = orchestrator.default_index(),
            "Memory client ready"
        );

        Ok(Memory {
            orchestrator,
            search,
        })
    }
}

/// Memory client running the ingestion pipeline in-process
#[derive(Clone)]
pub struct Memory {
    orchestrator: Orchestrator,
    search: Arc<dyn SearchClient>,
}

impl Memory {
    pub fn builder() -> MemoryBuilder {
        MemoryBuilder::new()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Register (or replace) a step handler
    pub fn add_handler(&self, handler: Arc<dyn StepHandler>) {
        self.orchestrator.register_handler(handler);
    }

    /// Import a document; returns its id
    pub async fn import_document(
        &self,
        document: Document,
        index: Option<&str>,
        steps: Vec<String>,
        cancel: CancellationToken,
    ) -> Result<String> {
        let index = self.orchestrator.clean_index(index)?;
        let request = document.into_upload_request(Some(index), steps).await?;
        self.import_upload(request, cancel).await
    }

    /// Import a prepared upload request; returns its document id
    pub async fn import_upload(
        &self,
        mut request: UploadRequest,
        cancel: CancellationToken,
    ) -> Result<String> {
        let index = self.orchestrator.clean_index(request.index.as_deref())?;
        request.index = Some(index.clone());
        self.orchestrator
            .import_document(Some(&index), request, cancel)
            .await
    }

    /// Import a file from disk
    pub async fn import_file(
        &self,
        path: impl AsRef<Path>,
        options: ImportOptions,
        cancel: CancellationToken,
    ) -> Result<String> {
        let document = options.document().add_file(path.as_ref());
        self.import_document(document, options.index.as_deref(), options.steps, cancel)
            .await
    }

    /// Import the content of a reader under `file_name`
    pub async fn import_stream<R>(
        &self,
        reader: R,
        file_name: Option<&str>,
        options: ImportOptions,
        cancel: CancellationToken,
    ) -> Result<String>
    where
        R: AsyncRead + Unpin + Send,
    {
        let document = options.document().add_stream(file_name, reader).await?;
        self.import_document(document, options.index.as_deref(), options.steps, cancel)
            .await
    }

    /// Import plain text, stored as `content.txt`
    pub async fn import_text(
        &self,
        text: &str,
        options: ImportOptions,
        cancel: CancellationToken,
    ) -> Result<String> {
        let document = options
            .document()
            .add_bytes(TEXT_FILE_NAME, Bytes::copy_from_slice(text.as_bytes()));
        self.import_document(document, options.index.as_deref(), options.steps, cancel)
            .await
    }

    /// Import a web page by URL, stored as `content.url`
    ///
    /// The page is not fetched here; a step handler reads the URL file.
    pub async fn import_web_page(
        &self,
        url: &str,
        options: ImportOptions,
        cancel: CancellationToken,
    ) -> Result<String> {
        let url = validate_web_url(url)?;
        let document = options.document().add_bytes(URL_FILE_NAME, Bytes::from(url));
        self.import_document(document, options.index.as_deref(), options.steps, cancel)
            .await
    }

    pub async fn delete_document(
        &self,
        document_id: &str,
        index: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.orchestrator
            .start_document_deletion(document_id, index, cancel)
            .await
    }

    /// Delete every document of an index; returns how many were deleted
    pub async fn delete_index(
        &self,
        index: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<usize> {
        self.orchestrator.start_index_deletion(index, cancel).await
    }

    pub async fn is_document_ready(&self, document_id: &str, index: Option<&str>) -> Result<bool> {
        self.orchestrator.is_document_ready(document_id, index).await
    }

    pub async fn get_document_status(
        &self,
        document_id: &str,
        index: Option<&str>,
    ) -> Result<Option<PipelineStatusSummary>> {
        self.orchestrator.get_document_status(document_id, index).await
    }

    /// Block until the document's pipeline is terminal
    pub async fn wait_for_document(
        &self,
        document_id: &str,
        index: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<Option<DataPipeline>> {
        self.orchestrator
            .wait_for_document(document_id, index, cancel)
            .await
    }

    pub async fn search(
        &self,
        query: &str,
        index: Option<&str>,
        filter: Option<&MemoryFilter>,
        min_relevance: f32,
        limit: usize,
    ) -> Result<SearchResult> {
        let index = self.orchestrator.clean_index(index)?;
        self.search
            .search(&index, query, filter, min_relevance, limit)
            .await
    }

    pub async fn ask(
        &self,
        question: &str,
        index: Option<&str>,
        filter: Option<&MemoryFilter>,
        min_relevance: f32,
    ) -> Result<MemoryAnswer> {
        let index = self.orchestrator.clean_index(index)?;
        self.search.ask(&index, question, filter, min_relevance).await
    }
}
