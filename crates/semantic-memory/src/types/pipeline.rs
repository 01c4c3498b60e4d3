//! Persisted pipeline state for one document
//!
//! A [`DataPipeline`] is an explicit state machine: an ordered list of steps,
//! each with its own status, plus a version counter bumped on every persisted
//! mutation. The overall status is always derived from the steps, never
//! stored on its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::document::TagCollection;

/// Identity of a pipeline: `(index, document_id)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PipelineKey {
    pub index: String,
    pub document_id: String,
}

impl PipelineKey {
    pub fn new(index: impl Into<String>, document_id: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            document_id: document_id.into(),
        }
    }
}

impl fmt::Display for PipelineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.document_id)
    }
}

/// Per-step status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The only legal moves: pending → running → completed | failed
    fn can_transition_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

/// Overall status derived from the steps
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    InProgress,
    Completed,
    Failed,
    Deleted,
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// What a pipeline run does
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Import,
    Deletion,
}

/// One step of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineStep {
    pub name: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure reason, set only when `status` is failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineStep {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pending,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    fn transition(&mut self, next: StepStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::internal(format!(
                "Illegal transition for step '{}': {:?} -> {:?}",
                self.name, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// Details of an uploaded content part
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileDetails {
    pub id: Uuid,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub sha256: String,
    #[serde(default)]
    pub tags: TagCollection,
}

/// Durable record of one document's progress
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataPipeline {
    pub index: String,
    pub document_id: String,
    pub kind: PipelineKind,
    /// New for every run, including supersession and deletion
    pub execution_id: Uuid,
    /// Bumped on every persisted mutation
    pub version: u64,
    pub steps: Vec<PipelineStep>,
    #[serde(default)]
    pub tags: TagCollection,
    #[serde(default)]
    pub files: Vec<FileDetails>,
    /// Output recorded by each completed step, keyed by step name
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
    /// Names of artifacts written to the content store by steps
    #[serde(default)]
    pub artifacts: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DataPipeline {
    /// New pipeline with every step pending. `version` is 0 until first persisted.
    pub fn new<I, S>(
        key: PipelineKey,
        kind: PipelineKind,
        steps: I,
        tags: TagCollection,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Utc::now();
        Self {
            index: key.index,
            document_id: key.document_id,
            kind,
            execution_id: Uuid::new_v4(),
            version: 0,
            steps: steps.into_iter().map(PipelineStep::pending).collect(),
            tags,
            files: Vec::new(),
            outputs: BTreeMap::new(),
            artifacts: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Start a run that supersedes `previous`, continuing its version counter
    pub fn superseding<I, S>(
        previous: &DataPipeline,
        kind: PipelineKind,
        steps: I,
        tags: TagCollection,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut pipeline = Self::new(previous.key(), kind, steps, tags);
        pipeline.version = previous.version;
        pipeline
    }

    pub fn key(&self) -> PipelineKey {
        PipelineKey::new(self.index.clone(), self.document_id.clone())
    }

    pub fn status(&self) -> PipelineStatus {
        if self.steps.iter().any(|s| s.status == StepStatus::Failed) {
            return PipelineStatus::Failed;
        }
        if self.steps.iter().all(|s| s.status == StepStatus::Completed) {
            return match self.kind {
                PipelineKind::Import => PipelineStatus::Completed,
                PipelineKind::Deletion => PipelineStatus::Deleted,
            };
        }
        PipelineStatus::InProgress
    }

    pub fn is_completed(&self) -> bool {
        self.status() == PipelineStatus::Completed
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Index of the first step that is pending or running
    pub fn next_step_index(&self) -> Option<usize> {
        self.steps.iter().position(|s| !s.status.is_terminal())
    }

    pub fn failed_step(&self) -> Option<&PipelineStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }

    /// The recorded step failure as an [`Error::StepExecution`]
    pub fn failure(&self) -> Option<Error> {
        self.failed_step().map(|step| Error::StepExecution {
            step: step.name.clone(),
            message: step.error.clone().unwrap_or_default(),
        })
    }

    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name.clone()).collect()
    }

    pub fn completed_steps(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn remaining_steps(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| !s.status.is_terminal())
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn mark_running(&mut self, step: usize) -> Result<()> {
        let s = self.step_mut(step)?;
        s.transition(StepStatus::Running)?;
        s.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_completed(
        &mut self,
        step: usize,
        output: serde_json::Value,
        artifacts: Vec<String>,
    ) -> Result<()> {
        let s = self.step_mut(step)?;
        s.transition(StepStatus::Completed)?;
        s.finished_at = Some(Utc::now());
        let name = s.name.clone();
        if !output.is_null() {
            self.outputs.insert(name, output);
        }
        for artifact in artifacts {
            if !self.artifacts.contains(&artifact) {
                self.artifacts.push(artifact);
            }
        }
        Ok(())
    }

    pub fn mark_failed(&mut self, step: usize, error: impl Into<String>) -> Result<()> {
        let s = self.step_mut(step)?;
        s.transition(StepStatus::Failed)?;
        s.finished_at = Some(Utc::now());
        s.error = Some(error.into());
        Ok(())
    }

    fn step_mut(&mut self, step: usize) -> Result<&mut PipelineStep> {
        let total = self.steps.len();
        self.steps
            .get_mut(step)
            .ok_or_else(|| Error::internal(format!("Step {} out of range ({} steps)", step, total)))
    }

    /// Caller-facing summary
    pub fn summary(&self) -> PipelineStatusSummary {
        let status = self.status();
        let failed = self.failed_step();
        PipelineStatusSummary {
            index: self.index.clone(),
            document_id: self.document_id.clone(),
            execution_id: self.execution_id,
            version: self.version,
            status,
            completed: status == PipelineStatus::Completed,
            failed: status == PipelineStatus::Failed,
            empty: self.files.is_empty(),
            tags: self.tags.clone(),
            steps: self.step_names(),
            remaining_steps: self.remaining_steps(),
            completed_steps: self.completed_steps(),
            failed_step: failed.map(|s| s.name.clone()),
            error: failed.and_then(|s| s.error.clone()),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Progress view returned to callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineStatusSummary {
    pub index: String,
    pub document_id: String,
    pub execution_id: Uuid,
    pub version: u64,
    pub status: PipelineStatus,
    pub completed: bool,
    pub failed: bool,
    pub empty: bool,
    pub tags: TagCollection,
    pub steps: Vec<String>,
    pub remaining_steps: Vec<String>,
    pub completed_steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pipeline(steps: &[&str]) -> DataPipeline {
        DataPipeline::new(
            PipelineKey::new("kb", "doc1"),
            PipelineKind::Import,
            steps.iter().copied(),
            TagCollection::new(),
        )
    }

    #[test]
    fn test_status_derivation() {
        let mut p = pipeline(&["extract", "embed"]);
        assert_eq!(p.status(), PipelineStatus::InProgress);
        assert_eq!(p.next_step_index(), Some(0));

        p.mark_running(0).unwrap();
        p.mark_completed(0, json!({"chars": 10}), vec![]).unwrap();
        assert_eq!(p.status(), PipelineStatus::InProgress);
        assert_eq!(p.next_step_index(), Some(1));

        p.mark_running(1).unwrap();
        p.mark_completed(1, serde_json::Value::Null, vec!["a.emb".into()]).unwrap();
        assert_eq!(p.status(), PipelineStatus::Completed);
        assert!(p.is_completed());
        assert_eq!(p.next_step_index(), None);
        assert_eq!(p.outputs.len(), 1);
        assert_eq!(p.artifacts, vec!["a.emb".to_string()]);
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut p = pipeline(&["extract"]);
        assert!(p.mark_completed(0, json!(null), vec![]).is_err());
        assert!(p.mark_failed(0, "x").is_err());
        assert_eq!(p.steps[0].status, StepStatus::Pending);

        p.mark_running(0).unwrap();
        assert!(p.mark_running(0).is_err());
        p.mark_failed(0, "boom").unwrap();
        assert!(p.mark_running(0).is_err());
        assert!(p.mark_running(5).is_err());
    }

    #[test]
    fn test_failure_summary() {
        let mut p = pipeline(&["extract", "embed", "index"]);
        p.mark_running(0).unwrap();
        p.mark_completed(0, json!(null), vec![]).unwrap();
        p.mark_running(1).unwrap();
        p.mark_failed(1, "model offline").unwrap();

        let summary = p.summary();
        assert_eq!(summary.status, PipelineStatus::Failed);
        assert!(summary.failed);
        assert_eq!(summary.failed_step.as_deref(), Some("embed"));
        assert_eq!(summary.error.as_deref(), Some("model offline"));
        assert_eq!(summary.completed_steps, vec!["extract".to_string()]);
        assert_eq!(summary.remaining_steps, vec!["index".to_string()]);

        let failure = p.failure().unwrap();
        assert!(matches!(failure, Error::StepExecution { ref step, .. } if step == "embed"));
        assert_eq!(failure.to_string(), "Step 'embed' failed: model offline");
        assert!(pipeline(&["extract"]).failure().is_none());
    }

    #[test]
    fn test_deletion_pipeline_ends_deleted() {
        let mut p = DataPipeline::new(
            PipelineKey::new("kb", "doc1"),
            PipelineKind::Deletion,
            ["private_delete_document"],
            TagCollection::new(),
        );
        p.mark_running(0).unwrap();
        p.mark_completed(0, json!(null), vec![]).unwrap();
        assert_eq!(p.status(), PipelineStatus::Deleted);
        assert!(!p.is_completed());
    }

    #[test]
    fn test_superseding_keeps_version_and_new_execution() {
        let mut old = pipeline(&["extract"]);
        old.version = 7;
        let fresh = DataPipeline::superseding(
            &old,
            PipelineKind::Import,
            ["extract"],
            TagCollection::new(),
        );
        assert_eq!(fresh.version, 7);
        assert_ne!(fresh.execution_id, old.execution_id);
        assert_eq!(fresh.key(), old.key());
    }

    #[test]
    fn test_state_json_shape() {
        let p = pipeline(&["extract"]);
        let value = serde_json::to_value(&p).unwrap();
        assert_eq!(value["steps"][0]["status"], "pending");
        assert_eq!(value["kind"], "import");
        let back: DataPipeline = serde_json::from_value(value).unwrap();
        assert_eq!(back, p);
    }
}
