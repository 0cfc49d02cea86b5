//! Writing the answered checklist back to durable storage.

use serde_json::json;
use thiserror::Error;

use crate::checklist::{Block, MetaData};
use crate::storage::{BlobStore, StorageError};

/// Errors raised while publishing the answer artifact. Fatal for the run.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Artifact could not be serialized.
    #[error("Failed to serialize answer artifact: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Write to the blob store failed.
    #[error("Failed to write answer artifact: {0}")]
    Storage(#[from] StorageError),
}

/// Write `{metaData, blocks}` to `{request_id}/{stem}_answer.json` and return that path.
///
/// The stem is the checklist path with a trailing `.json` removed; any directory prefix in
/// the path is kept, so the artifact mirrors the source layout under the request folder.
pub async fn publish(
    meta: &MetaData,
    blocks: &[Block],
    request_id: &str,
    checklist_path: &str,
    store: &dyn BlobStore,
) -> Result<String, PublishError> {
    let stem = checklist_path
        .strip_suffix(".json")
        .unwrap_or(checklist_path);
    let artifact_path = format!("{request_id}/{stem}_answer.json");

    let artifact = json!({ "metaData": meta, "blocks": blocks });
    let bytes = serde_json::to_vec_pretty(&artifact)?;

    store
        .write(&artifact_path, bytes, "application/json")
        .await?;
    tracing::info!(path = %artifact_path, blocks = blocks.len(), "Published answer artifact");
    Ok(artifact_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checklist::{BlockType, LeafStatus};
    use crate::storage::FsBlobStore;
    use tempfile::TempDir;

    fn answered_leaf() -> Block {
        Block {
            block_id: "b2".into(),
            block_type: BlockType::RadioQuestion,
            title: "Is access reviewed?".into(),
            response_options: vec!["Yes".into(), "No".into()],
            guidance_text: String::new(),
            blocks: vec![],
            parent_block_id: Some("b1".into()),
            is_ai_response_expected: true,
            answer: Some("Yes".into()),
            rationale: Some("Evidence found.".into()),
            status: Some(LeafStatus::Processed),
        }
    }

    #[tokio::test]
    async fn writes_artifact_under_request_folder() {
        let dir = TempDir::new().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        let meta = MetaData {
            checklist_id: Some("cl-1".into()),
            ..MetaData::default()
        };

        let path = publish(&meta, &[answered_leaf()], "req-1", "checklists/soc2.json", &store)
            .await
            .expect("publish");
        assert_eq!(path, "req-1/checklists/soc2_answer.json");

        let bytes = store.read_bytes(&path).await.expect("read back");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(value["metaData"]["checklistId"], "cl-1");
        assert_eq!(value["blocks"][0]["answer"], "Yes");
        assert_eq!(value["blocks"][0]["status"], "processed");
    }

    #[tokio::test]
    async fn stem_without_json_suffix_is_kept_verbatim() {
        let dir = TempDir::new().expect("tempdir");
        let store = FsBlobStore::new(dir.path());

        let path = publish(&MetaData::default(), &[], "req-2", "soc2", &store)
            .await
            .expect("publish");
        assert_eq!(path, "req-2/soc2_answer.json");
    }
}
