//! In-process pipeline store backed by a concurrent map

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::PipelineStore;
use crate::error::{Error, Result};
use crate::types::{DataPipeline, PipelineKey};

/// Pipeline store that lives as long as the process
#[derive(Default)]
pub struct InMemoryPipelineStore {
    pipelines: DashMap<PipelineKey, DataPipeline>,
}

impl InMemoryPipelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

#[async_trait]
impl PipelineStore for InMemoryPipelineStore {
    async fn get(&self, key: &PipelineKey) -> Result<Option<DataPipeline>> {
        Ok(self.pipelines.get(key).map(|p| p.clone()))
    }

    async fn save(&self, pipeline: &DataPipeline, expected_version: Option<u64>) -> Result<()> {
        let key = pipeline.key();
        // The entry guard holds the shard lock, making check-and-write atomic
        match self.pipelines.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let found = entry.get().version;
                if expected_version != Some(found) {
                    return Err(Error::VersionConflict {
                        key: key.to_string(),
                        expected: expected_version,
                        found: Some(found),
                    });
                }
                entry.insert(pipeline.clone());
            }
            Entry::Vacant(entry) => {
                if expected_version.is_some() {
                    return Err(Error::VersionConflict {
                        key: key.to_string(),
                        expected: expected_version,
                        found: None,
                    });
                }
                entry.insert(pipeline.clone());
            }
        }
        Ok(())
    }

    async fn list(&self, index: &str) -> Result<Vec<DataPipeline>> {
        let mut pipelines: Vec<DataPipeline> = self
            .pipelines
            .iter()
            .filter(|p| p.index == index)
            .map(|p| p.value().clone())
            .collect();
        pipelines.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        Ok(pipelines)
    }

    async fn list_in_progress(&self) -> Result<Vec<DataPipeline>> {
        Ok(self
            .pipelines
            .iter()
            .filter(|p| !p.is_terminal())
            .map(|p| p.value().clone())
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
