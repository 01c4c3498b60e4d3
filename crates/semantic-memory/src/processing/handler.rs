//! Step handler contract
//!
//! A handler implements one named pipeline step. It receives a
//! [`PipelineContext`] holding a snapshot of the pipeline (index, document id,
//! tags, uploaded files, outputs of earlier steps), the content store and the
//! run's cancellation token, and returns a [`StepOutput`] or a [`StepError`].

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Error;
use crate::providers::ContentStore;
use crate::types::{DataPipeline, FileDetails, TagCollection};

/// Reason recorded on a step interrupted by cancellation or shutdown
pub const CANCELLED_REASON: &str = "Pipeline run cancelled";

/// Trait for a pipeline step implementation
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Name the handler is registered under
    fn step_name(&self) -> &str;

    /// Run the step for one document
    async fn execute(&self, ctx: &PipelineContext) -> Result<StepOutput, StepError>;
}

/// What a successful step hands back to the orchestrator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutput {
    /// Recorded under the step name in the pipeline outputs
    pub data: Value,
    /// Names of artifacts the step stored in the content store
    pub artifacts: Vec<String>,
}

impl StepOutput {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            artifacts: Vec::new(),
        }
    }

    /// Step finished with nothing to record
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_artifact(mut self, name: impl Into<String>) -> Self {
        self.artifacts.push(name.into());
        self
    }
}

/// Why a step did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepErrorKind {
    /// The handler reported a failure
    Failed,
    /// The handler exceeded the configured step timeout
    Timeout,
    /// The run was cancelled while the step executed
    Cancelled,
}

/// Failure reported by, or imposed on, a step handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepError {
    pub kind: StepErrorKind,
    pub message: String,
}

impl StepError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            kind: StepErrorKind::Failed,
            message: message.into(),
        }
    }

    pub fn timeout(limit: Duration) -> Self {
        Self {
            kind: StepErrorKind::Timeout,
            message: format!("Step timed out after {}s", limit.as_secs_f64()),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            kind: StepErrorKind::Cancelled,
            message: CANCELLED_REASON.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == StepErrorKind::Cancelled
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StepError {}

impl From<Error> for StepError {
    fn from(err: Error) -> Self {
        match err {
            Error::Cancelled => Self::cancelled(),
            other => Self::failed(other.to_string()),
        }
    }
}

/// Everything a handler can see while it runs
pub struct PipelineContext {
    pipeline: DataPipeline,
    content: Arc<dyn ContentStore>,
    cancel: CancellationToken,
    written: Mutex<Vec<String>>,
}

impl PipelineContext {
    pub fn new(
        pipeline: DataPipeline,
        content: Arc<dyn ContentStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            content,
            cancel,
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn index(&self) -> &str {
        &self.pipeline.index
    }

    pub fn document_id(&self) -> &str {
        &self.pipeline.document_id
    }

    pub fn execution_id(&self) -> Uuid {
        self.pipeline.execution_id
    }

    pub fn tags(&self) -> &TagCollection {
        &self.pipeline.tags
    }

    pub fn files(&self) -> &[FileDetails] {
        &self.pipeline.files
    }

    /// Output recorded by an earlier step of this run
    pub fn output(&self, step: &str) -> Option<&Value> {
        self.pipeline.outputs.get(step)
    }

    pub fn outputs(&self) -> &BTreeMap<String, Value> {
        &self.pipeline.outputs
    }

    /// Snapshot taken before the step started
    pub fn pipeline(&self) -> &DataPipeline {
        &self.pipeline
    }

    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Read an uploaded file or an earlier artifact of this document
    pub async fn read_file(&self, name: &str) -> Result<Bytes, StepError> {
        Ok(self
            .content
            .read_file(self.index(), self.document_id(), name)
            .await?)
    }

    /// Store an artifact; it is recorded on the pipeline when the step completes
    pub async fn write_artifact(
        &self,
        name: &str,
        data: impl Into<Bytes>,
    ) -> Result<(), StepError> {
        self.content
            .write_file(self.index(), self.document_id(), name, data.into())
            .await?;
        let mut written = self.written.lock();
        if !written.iter().any(|n| n == name) {
            written.push(name.to_string());
        }
        Ok(())
    }

    /// Artifacts stored through [`PipelineContext::write_artifact`]
    pub fn take_artifacts(&self) -> Vec<String> {
        std::mem::take(&mut *self.written.lock())
    }
}
