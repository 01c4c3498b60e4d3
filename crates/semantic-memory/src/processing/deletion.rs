//! Built-in handler of the reserved document deletion step

use async_trait::async_trait;
use serde_json::json;

use super::handler::{PipelineContext, StepError, StepHandler, StepOutput};
use crate::config::DELETE_DOCUMENT_STEP;

/// Removes every file the content store holds for the document
#[derive(Debug, Default, Clone, Copy)]
pub struct DeleteDocumentHandler;

#[async_trait]
impl StepHandler for DeleteDocumentHandler {
    fn step_name(&self) -> &str {
        DELETE_DOCUMENT_STEP
    }

    async fn execute(&self, ctx: &PipelineContext) -> Result<StepOutput, StepError> {
        let removed = ctx
            .content()
            .delete_document(ctx.index(), ctx.document_id())
            .await?;

        tracing::debug!(
            index = %ctx.index(),
            document_id = %ctx.document_id(),
            files = removed,
            "Document content removed"
        );

        Ok(StepOutput::new(json!({ "files_removed": removed })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ContentStore, InMemoryContentStore};
    use crate::types::{DataPipeline, PipelineKey, PipelineKind, TagCollection};
    use bytes::Bytes;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_removes_document_files_only() {
        let content = Arc::new(InMemoryContentStore::new());
        content.write_file("kb", "doc1", "a.txt", Bytes::from_static(b"a")).await.unwrap();
        content.write_file("kb", "doc1", "a.emb", Bytes::from_static(b"e")).await.unwrap();
        content.write_file("kb", "doc2", "b.txt", Bytes::from_static(b"b")).await.unwrap();

        let pipeline = DataPipeline::new(
            PipelineKey::new("kb", "doc1"),
            PipelineKind::Deletion,
            [DELETE_DOCUMENT_STEP],
            TagCollection::new(),
        );
        let ctx = PipelineContext::new(pipeline, content.clone(), CancellationToken::new());

        let output = DeleteDocumentHandler.execute(&ctx).await.unwrap();
        assert_eq!(output.data["files_removed"], 2);
        assert!(content.list_files("kb", "doc1").await.unwrap().is_empty());
        assert_eq!(content.list_files("kb", "doc2").await.unwrap(), vec!["b.txt"]);
    }
}
