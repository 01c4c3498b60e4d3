//! Pipeline orchestrator
//!
//! The only writer of pipeline state. A run executes its steps strictly in
//! order, persisting after every transition. Each document can have at most
//! one active run in this process: the key is claimed in a concurrent set for
//! the duration of the run and released by a drop guard. Persisted state that
//! is still in progress also counts as busy, so a crashed run blocks new work
//! until [`Orchestrator::resume_incomplete_pipelines`] finishes it.

use chrono::Utc;
use dashmap::DashSet;
use futures::future::join_all;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::deletion::DeleteDocumentHandler;
use super::handler::{PipelineContext, StepError, StepHandler, StepOutput, CANCELLED_REASON};
use super::registry::HandlerRegistry;
use crate::config::{ExecutionMode, MemoryConfig, OrchestratorConfig, StorageBackend};
use crate::error::{Error, Result};
use crate::providers::{
    validate_file_name, ContentStore, InMemoryContentStore, LocalContentStore,
};
use crate::storage::{InMemoryPipelineStore, PipelineStore, SqlitePipelineStore};
use crate::types::naming::{clean_index_name_or, validate_document_id};
use crate::types::{
    DataPipeline, FileDetails, PipelineKey, PipelineKind, PipelineStatus, PipelineStatusSummary,
    StepStatus, TagCollection, UploadFile, UploadRequest, RESERVED_DOCUMENT_ID_TAG,
    RESERVED_FILE_TYPE_TAG,
};

/// Releases a document's active-run claim when dropped
struct ActiveClaim {
    active: Arc<DashSet<PipelineKey>>,
    key: PipelineKey,
}

impl Drop for ActiveClaim {
    fn drop(&mut self) {
        self.active.remove(&self.key);
    }
}

/// Drives document pipelines and answers status queries
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn PipelineStore>,
    content: Arc<dyn ContentStore>,
    config: Arc<OrchestratorConfig>,
    default_index: String,
    /// Keys with a run active in this process
    active: Arc<DashSet<PipelineKey>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl Orchestrator {
    /// Create an orchestrator over the given stores
    ///
    /// The built-in deletion handler is registered unless the registry
    /// already has a handler for that step.
    pub fn new(
        config: &MemoryConfig,
        store: Arc<dyn PipelineStore>,
        content: Arc<dyn ContentStore>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(HandlerRegistry::new());
        registry.try_register(Arc::new(DeleteDocumentHandler));

        info!(
            store = store.name(),
            content = content.name(),
            mode = ?config.orchestrator.execution_mode,
            "Orchestrator created"
        );

        Ok(Self {
            registry,
            store,
            content,
            config: Arc::new(config.orchestrator.clone()),
            default_index: config.default_index.clone(),
            active: Arc::new(DashSet::new()),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    /// Create an orchestrator with the stores named by the storage section
    pub fn from_config(config: &MemoryConfig) -> Result<Self> {
        config.validate()?;

        let (store, content): (Arc<dyn PipelineStore>, Arc<dyn ContentStore>) =
            match config.storage.backend {
                StorageBackend::Memory => (
                    Arc::new(InMemoryPipelineStore::new()),
                    Arc::new(InMemoryContentStore::new()),
                ),
                StorageBackend::Local => {
                    info!(
                        "Using SQLite pipeline state at {} and content under {}",
                        config.storage.database_path.display(),
                        config.storage.content_dir.display()
                    );
                    (
                        Arc::new(SqlitePipelineStore::new(&config.storage.database_path)?),
                        Arc::new(LocalContentStore::new(config.storage.content_dir.clone())?),
                    )
                }
            };

        Self::new(config, store, content)
    }

    /// Register (or replace) the handler for a step
    pub fn register_handler(&self, handler: Arc<dyn StepHandler>) {
        self.registry.register(handler);
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn PipelineStore> {
        &self.store
    }

    pub fn content_store(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn default_index(&self) -> &str {
        &self.default_index
    }

    /// Number of runs active in this process
    pub fn active_runs(&self) -> usize {
        self.active.len()
    }

    /// Normalize an index name, falling back to the default index
    pub fn clean_index(&self, index: Option<&str>) -> Result<String> {
        clean_index_name_or(index, &self.default_index)
    }

    /// Import a document and run its pipeline
    ///
    /// `index` takes precedence over the index named in the request. In
    /// blocking mode this returns once the run is terminal; in background
    /// mode once the initial state is persisted. Step failures are recorded
    /// on the pipeline, never returned here.
    pub async fn import_document(
        &self,
        index: Option<&str>,
        request: UploadRequest,
        cancel: CancellationToken,
    ) -> Result<String> {
        self.ensure_running()?;

        let index = self.clean_index(index.or(request.index.as_deref()))?;
        validate_document_id(&request.document_id)?;
        request.tags.validate(false)?;
        let steps = self.import_steps(&request.steps)?;
        validate_upload_files(&request.files)?;

        let document_id = request.document_id;
        let key = PipelineKey::new(index, document_id.clone());
        let claim = self.claim(&key)?;

        let previous = self.store.get(&key).await?;
        if previous.as_ref().is_some_and(|p| !p.is_terminal()) {
            return Err(Error::busy(&key.index, &key.document_id));
        }

        let mut tags = request.tags;
        tags.set(RESERVED_DOCUMENT_ID_TAG, &document_id);

        let mut pipeline = match &previous {
            Some(prev) => DataPipeline::superseding(prev, PipelineKind::Import, steps, tags),
            None => DataPipeline::new(key.clone(), PipelineKind::Import, steps, tags),
        };
        pipeline.files = describe_files(&request.files);

        // The superseding state is written before any content changes, so a
        // lost version race leaves the previous run's files untouched
        self.persist(&mut pipeline).await?;

        if let Err(e) = self.replace_content(&key, previous.as_ref(), request.files).await {
            self.fail_first_step(&mut pipeline, &e).await?;
            return Err(e);
        }

        info!(
            index = %pipeline.index,
            document_id = %pipeline.document_id,
            execution_id = %pipeline.execution_id,
            files = pipeline.files.len(),
            "Document import accepted"
        );

        self.dispatch(pipeline, claim, cancel).await?;
        Ok(document_id)
    }

    /// Run the deletion pipeline for a document
    ///
    /// Unknown and already deleted documents are a no-op.
    pub async fn start_document_deletion(
        &self,
        document_id: &str,
        index: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.ensure_running()?;

        let index = self.clean_index(index)?;
        validate_document_id(document_id)?;
        let key = PipelineKey::new(index, document_id);
        let claim = self.claim(&key)?;

        match self.deletable(&key).await? {
            Some(previous) => self.delete_claimed(&previous, claim, cancel).await,
            None => Ok(()),
        }
    }

    /// Delete every live document of an index
    ///
    /// Every live document is claimed before any deletion starts, so a busy
    /// document fails the call without deleting anything. Returns the number
    /// of documents whose deletion was started.
    pub async fn start_index_deletion(
        &self,
        index: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<usize> {
        self.ensure_running()?;

        let index = self.clean_index(index)?;
        let pipelines = self.store.list(&index).await?;

        // Claims drop on early return, releasing the documents already taken
        let mut claimed = Vec::new();
        for listed in pipelines.iter().filter(|p| p.status() != PipelineStatus::Deleted) {
            let key = listed.key();
            let claim = self.claim(&key)?;
            if let Some(previous) = self.deletable(&key).await? {
                claimed.push((previous, claim));
            }
        }

        let count = claimed.len();
        info!(index = %index, documents = count, "Index deletion started");

        let results = join_all(claimed.into_iter().map(|(previous, claim)| {
            let cancel = cancel.clone();
            async move { self.delete_claimed(&previous, claim, cancel).await }
        }))
        .await;

        for result in results {
            result?;
        }
        Ok(count)
    }

    /// True iff the document's pipeline exists and completed
    pub async fn is_document_ready(&self, document_id: &str, index: Option<&str>) -> Result<bool> {
        let key = self.key(document_id, index)?;
        Ok(self
            .store
            .get(&key)
            .await?
            .is_some_and(|p| p.is_completed()))
    }

    /// Current pipeline state, without side effects
    pub async fn read_pipeline_status(
        &self,
        document_id: &str,
        index: Option<&str>,
    ) -> Result<Option<DataPipeline>> {
        let key = self.key(document_id, index)?;
        self.store.get(&key).await
    }

    /// Caller-facing view of [`Orchestrator::read_pipeline_status`]
    pub async fn get_document_status(
        &self,
        document_id: &str,
        index: Option<&str>,
    ) -> Result<Option<PipelineStatusSummary>> {
        Ok(self
            .read_pipeline_status(document_id, index)
            .await?
            .map(|p| p.summary()))
    }

    /// Poll until the pipeline is terminal or absent
    pub async fn wait_for_document(
        &self,
        document_id: &str,
        index: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<Option<DataPipeline>> {
        let key = self.key(document_id, index)?;
        let interval = self.config.poll_interval();

        loop {
            match self.store.get(&key).await? {
                Some(pipeline) if !pipeline.is_terminal() => {}
                other => return Ok(other),
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// All pipelines of an index, ordered by document id
    pub async fn list_pipelines(&self, index: Option<&str>) -> Result<Vec<DataPipeline>> {
        let index = self.clean_index(index)?;
        self.store.list(&index).await
    }

    /// Re-enter persisted runs left in progress, e.g. by a crash
    ///
    /// Each run continues at its first non-terminal step. Returns the keys
    /// that were resumed.
    pub async fn resume_incomplete_pipelines(
        &self,
        cancel: CancellationToken,
    ) -> Result<Vec<PipelineKey>> {
        self.ensure_running()?;

        let incomplete = self.store.list_in_progress().await?;
        let mut resumed = Vec::with_capacity(incomplete.len());

        for stale in incomplete {
            let key = stale.key();
            let claim = match self.claim(&key) {
                Ok(claim) => claim,
                Err(_) => {
                    debug!(
                        index = %key.index,
                        document_id = %key.document_id,
                        "Run active, not resuming"
                    );
                    continue;
                }
            };

            // Re-read under the claim so the run continues from the latest version
            let pipeline = match self.store.get(&key).await? {
                Some(pipeline) if !pipeline.is_terminal() => pipeline,
                _ => continue,
            };

            info!(
                index = %pipeline.index,
                document_id = %pipeline.document_id,
                execution_id = %pipeline.execution_id,
                remaining = ?pipeline.remaining_steps(),
                "Resuming pipeline"
            );

            resumed.push(key);
            self.dispatch(pipeline, claim, cancel.clone()).await?;
        }

        if !resumed.is_empty() {
            info!("Resumed {} incomplete pipelines", resumed.len());
        }
        Ok(resumed)
    }

    /// Cancel background runs and wait for them to record their state
    pub async fn shutdown(&self) {
        info!(active = self.active.len(), "Orchestrator shutting down");
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    fn key(&self, document_id: &str, index: Option<&str>) -> Result<PipelineKey> {
        let index = self.clean_index(index)?;
        validate_document_id(document_id)?;
        Ok(PipelineKey::new(index, document_id))
    }

    fn claim(&self, key: &PipelineKey) -> Result<ActiveClaim> {
        if !self.active.insert(key.clone()) {
            return Err(Error::busy(&key.index, &key.document_id));
        }
        Ok(ActiveClaim {
            active: self.active.clone(),
            key: key.clone(),
        })
    }

    /// Previous pipeline a deletion run should supersede, read under the claim
    ///
    /// `None` when the document is unknown or already deleted.
    async fn deletable(&self, key: &PipelineKey) -> Result<Option<DataPipeline>> {
        let previous = match self.store.get(key).await? {
            Some(previous) => previous,
            None => {
                debug!(index = %key.index, document_id = %key.document_id, "Nothing to delete");
                return Ok(None);
            }
        };

        match previous.status() {
            PipelineStatus::Deleted => Ok(None),
            PipelineStatus::InProgress => Err(Error::busy(&key.index, &key.document_id)),
            PipelineStatus::Completed | PipelineStatus::Failed => Ok(Some(previous)),
        }
    }

    async fn delete_claimed(
        &self,
        previous: &DataPipeline,
        claim: ActiveClaim,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut pipeline = DataPipeline::superseding(
            previous,
            PipelineKind::Deletion,
            self.config.deletion_steps.iter().cloned(),
            TagCollection::new(),
        );
        self.persist(&mut pipeline).await?;

        info!(
            index = %pipeline.index,
            document_id = %pipeline.document_id,
            execution_id = %pipeline.execution_id,
            "Document deletion started"
        );

        self.dispatch(pipeline, claim, cancel).await
    }

    fn import_steps(&self, requested: &[String]) -> Result<Vec<String>> {
        let steps = if requested.is_empty() {
            self.config.default_steps.clone()
        } else {
            requested.to_vec()
        };

        for step in &steps {
            if step.trim().is_empty() {
                return Err(Error::validation("Step name is empty"));
            }
            if self.config.deletion_steps.contains(step) {
                return Err(Error::validation(format!(
                    "Step '{}' is reserved for document deletion",
                    step
                )));
            }
        }
        Ok(steps)
    }

    /// Drop the superseded run's content and store the new files
    async fn replace_content(
        &self,
        key: &PipelineKey,
        previous: Option<&DataPipeline>,
        files: Vec<UploadFile>,
    ) -> Result<()> {
        if let Some(prev) = previous {
            let removed = self.content.delete_document(&key.index, &key.document_id).await?;
            debug!(
                index = %key.index,
                document_id = %key.document_id,
                previous_version = prev.version,
                files_removed = removed,
                "Superseding previous pipeline"
            );
        }

        for file in files {
            let size = self
                .content
                .write_file(&key.index, &key.document_id, &file.name, file.data)
                .await?;
            debug!(
                index = %key.index,
                document_id = %key.document_id,
                file = %file.name,
                size,
                "File uploaded"
            );
        }
        Ok(())
    }

    /// Record a failure that happened before the first step could run
    async fn fail_first_step(&self, pipeline: &mut DataPipeline, cause: &Error) -> Result<()> {
        warn!(
            index = %pipeline.index,
            document_id = %pipeline.document_id,
            execution_id = %pipeline.execution_id,
            error = %cause,
            "Document upload failed"
        );
        pipeline.mark_running(0)?;
        pipeline.mark_failed(0, cause.to_string())?;
        self.persist(pipeline).await
    }

    /// Bump the version and write with a compare-and-swap on the previous one
    async fn persist(&self, pipeline: &mut DataPipeline) -> Result<()> {
        let expected = (pipeline.version > 0).then_some(pipeline.version);
        pipeline.version += 1;
        pipeline.updated_at = Utc::now();

        if let Err(e) = self.store.save(pipeline, expected).await {
            pipeline.version -= 1;
            error!(
                index = %pipeline.index,
                document_id = %pipeline.document_id,
                execution_id = %pipeline.execution_id,
                error = %e,
                "Failed to persist pipeline state"
            );
            return Err(e);
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        pipeline: DataPipeline,
        claim: ActiveClaim,
        cancel: CancellationToken,
    ) -> Result<()> {
        match self.config.execution_mode {
            ExecutionMode::Blocking => self.run(pipeline, claim, cancel).await.map(|_| ()),
            ExecutionMode::Background => {
                let orchestrator = self.clone();
                self.tasks.spawn(async move {
                    if let Err(e) = orchestrator.run(pipeline, claim, cancel).await {
                        error!(error = %e, "Background pipeline run aborted");
                    }
                });
                Ok(())
            }
        }
    }

    async fn run(
        &self,
        mut pipeline: DataPipeline,
        _claim: ActiveClaim,
        cancel: CancellationToken,
    ) -> Result<DataPipeline> {
        let run_token = cancel.child_token();

        info!(
            index = %pipeline.index,
            document_id = %pipeline.document_id,
            execution_id = %pipeline.execution_id,
            kind = ?pipeline.kind,
            steps = ?pipeline.step_names(),
            "Pipeline run started"
        );

        while let Some(i) = pipeline.next_step_index() {
            let step = pipeline.steps[i].name.clone();

            if run_token.is_cancelled() || self.shutdown.is_cancelled() {
                if pipeline.steps[i].status == StepStatus::Pending {
                    pipeline.mark_running(i)?;
                }
                pipeline.mark_failed(i, CANCELLED_REASON)?;
                self.persist(&mut pipeline).await?;
                warn!(
                    index = %pipeline.index,
                    document_id = %pipeline.document_id,
                    execution_id = %pipeline.execution_id,
                    step = %step,
                    "Pipeline run cancelled before step"
                );
                break;
            }

            // A step persisted as running is re-invoked as is
            if pipeline.steps[i].status == StepStatus::Pending {
                pipeline.mark_running(i)?;
                self.persist(&mut pipeline).await?;
            }
            debug!(
                document_id = %pipeline.document_id,
                execution_id = %pipeline.execution_id,
                step = %step,
                "Step running"
            );

            match self.execute_step(&pipeline, &step, &run_token).await {
                Ok(output) => {
                    pipeline.mark_completed(i, output.data, output.artifacts)?;
                    self.persist(&mut pipeline).await?;
                    debug!(
                        document_id = %pipeline.document_id,
                        execution_id = %pipeline.execution_id,
                        step = %step,
                        "Step completed"
                    );
                }
                Err(err) => {
                    pipeline.mark_failed(i, err.message.clone())?;
                    self.persist(&mut pipeline).await?;
                    warn!(
                        index = %pipeline.index,
                        document_id = %pipeline.document_id,
                        execution_id = %pipeline.execution_id,
                        step = %step,
                        kind = ?err.kind,
                        error = %err,
                        "Step failed"
                    );
                    break;
                }
            }
        }

        match pipeline.failure() {
            Some(failure) => warn!(
                index = %pipeline.index,
                document_id = %pipeline.document_id,
                execution_id = %pipeline.execution_id,
                version = pipeline.version,
                error = %failure,
                "Pipeline run failed"
            ),
            None => info!(
                index = %pipeline.index,
                document_id = %pipeline.document_id,
                execution_id = %pipeline.execution_id,
                status = ?pipeline.status(),
                version = pipeline.version,
                "Pipeline run finished"
            ),
        }
        Ok(pipeline)
    }

    async fn execute_step(
        &self,
        pipeline: &DataPipeline,
        step: &str,
        run_token: &CancellationToken,
    ) -> std::result::Result<StepOutput, StepError> {
        // Resolved per invocation so replacements apply to in-flight runs
        let handler = self.registry.resolve(step)?;
        let ctx = PipelineContext::new(pipeline.clone(), self.content.clone(), run_token.clone());

        let execution = async {
            match self.config.step_timeout() {
                Some(limit) => timeout(limit, handler.execute(&ctx))
                    .await
                    .unwrap_or_else(|_| Err(StepError::timeout(limit))),
                None => handler.execute(&ctx).await,
            }
        };

        let mut output = tokio::select! {
            result = execution => result,
            _ = run_token.cancelled() => Err(StepError::cancelled()),
            _ = self.shutdown.cancelled() => {
                run_token.cancel();
                Err(StepError::cancelled())
            }
        }?;

        for artifact in ctx.take_artifacts() {
            if !output.artifacts.contains(&artifact) {
                output.artifacts.push(artifact);
            }
        }
        Ok(output)
    }
}

fn describe_files(files: &[UploadFile]) -> Vec<FileDetails> {
    files
        .iter()
        .map(|file| {
            let mime_type = mime_guess::from_path(&file.name)
                .first_or_octet_stream()
                .essence_str()
                .to_string();
            FileDetails {
                id: Uuid::new_v4(),
                name: file.name.clone(),
                size: file.data.len() as u64,
                tags: TagCollection::new().with(RESERVED_FILE_TYPE_TAG, mime_type.clone()),
                mime_type,
                sha256: hex::encode(Sha256::digest(&file.data)),
            }
        })
        .collect()
}

fn validate_upload_files(files: &[UploadFile]) -> Result<()> {
    let mut seen = HashSet::with_capacity(files.len());
    for file in files {
        validate_file_name(&file.name)?;
        if !seen.insert(file.name.as_str()) {
            return Err(Error::validation(format!(
                "File '{}' appears more than once",
                file.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DELETE_DOCUMENT_STEP;

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(
            &MemoryConfig::default(),
            Arc::new(InMemoryPipelineStore::new()),
            Arc::new(InMemoryContentStore::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_claim_released_on_drop() {
        let orchestrator = orchestrator();
        let key = PipelineKey::new("kb", "doc1");

        let claim = orchestrator.claim(&key).unwrap();
        assert_eq!(orchestrator.active_runs(), 1);
        assert!(matches!(orchestrator.claim(&key), Err(Error::PipelineBusy { .. })));

        drop(claim);
        assert_eq!(orchestrator.active_runs(), 0);
        assert!(orchestrator.claim(&key).is_ok());
    }

    #[test]
    fn test_import_steps() {
        let orchestrator = orchestrator();
        assert_eq!(orchestrator.import_steps(&[]).unwrap().len(), 4);

        let custom = vec!["extract".to_string(), "embed".to_string()];
        assert_eq!(orchestrator.import_steps(&custom).unwrap(), custom);

        let reserved = vec![DELETE_DOCUMENT_STEP.to_string()];
        assert!(matches!(orchestrator.import_steps(&reserved), Err(Error::Validation(_))));
        assert!(orchestrator.import_steps(&[" ".to_string()]).is_err());
    }

    #[test]
    fn test_delete_handler_registered_by_default() {
        let orchestrator = orchestrator();
        assert!(orchestrator.registry().contains(DELETE_DOCUMENT_STEP));
    }

    #[test]
    fn test_duplicate_file_names_rejected() {
        let files = vec![
            UploadFile { name: "a.txt".into(), data: "1".into() },
            UploadFile { name: "a.txt".into(), data: "2".into() },
        ];
        assert!(matches!(validate_upload_files(&files), Err(Error::Validation(_))));
        assert!(validate_upload_files(&files[..1]).is_ok());
    }

    #[test]
    fn test_validation_before_state() {
        let orchestrator = orchestrator();
        let request = UploadRequest::new("bad id!").with_file("a.txt", "x");

        let result = tokio_test::block_on(orchestrator.import_document(
            Some("kb"),
            request,
            CancellationToken::new(),
        ));
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(orchestrator.active_runs(), 0);

        let listed = tokio_test::block_on(orchestrator.list_pipelines(Some("kb"))).unwrap();
        assert!(listed.is_empty());
    }

    fn completed(index: &str, document_id: &str) -> DataPipeline {
        let key = PipelineKey::new(index, document_id);
        let mut pipeline =
            DataPipeline::new(key, PipelineKind::Import, ["extract"], TagCollection::new());
        pipeline.mark_running(0).unwrap();
        pipeline.mark_completed(0, serde_json::Value::Null, Vec::new()).unwrap();
        pipeline.version = 1;
        pipeline
    }

    #[test]
    fn test_index_deletion_claims_before_deleting() {
        let orchestrator = orchestrator();
        tokio_test::block_on(async {
            for id in ["doc1", "doc2", "doc3"] {
                orchestrator.store().save(&completed("kb", id), None).await.unwrap();
            }

            // doc2 is taken by another run in this process
            let held = orchestrator.claim(&PipelineKey::new("kb", "doc2")).unwrap();
            let err = orchestrator
                .start_index_deletion(Some("kb"), CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                Error::PipelineBusy { ref document_id, .. } if document_id == "doc2"
            ));

            // Nothing was deleted and the claim on doc1 was released
            assert_eq!(orchestrator.active_runs(), 1);
            for pipeline in orchestrator.list_pipelines(Some("kb")).await.unwrap() {
                assert_eq!(pipeline.status(), PipelineStatus::Completed);
                assert_eq!(pipeline.version, 1);
            }

            drop(held);
            let started = orchestrator
                .start_index_deletion(Some("kb"), CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(started, 3);
            assert_eq!(orchestrator.active_runs(), 0);
        });
    }

    #[test]
    fn test_describe_files() {
        let files = vec![UploadFile { name: "notes.txt".into(), data: "hello".into() }];
        let details = describe_files(&files);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].size, 5);
        assert_eq!(details[0].mime_type, "text/plain");
        assert_eq!(
            details[0].sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
