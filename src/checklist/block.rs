//! Typed checklist tree parsed from the input JSON document.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while parsing or validating a checklist document.
#[derive(Debug, Error)]
pub enum ChecklistError {
    /// Input bytes were not a valid checklist JSON document.
    #[error("Failed to parse checklist document: {0}")]
    Parse(#[from] serde_json::Error),
    /// Document parsed but contained no blocks to process.
    #[error("Checklist document contains no blocks")]
    Empty,
}

/// Kinds of blocks a checklist may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockType {
    /// Structural grouping of child blocks.
    Section,
    /// Informational text with no expected response.
    Information,
    /// Question answered by choosing one of the response options.
    RadioQuestion,
    /// Free-text question.
    TextQuestion,
    /// Container holding several related questions.
    MultiQuestionContainer,
}

/// Processing status recorded on an answered leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeafStatus {
    /// Retrieval and generation completed and the answer was accepted.
    Processed,
    /// Retrieval or generation failed for this leaf.
    Error,
}

/// One node of the checklist tree.
///
/// Children are owned, so the tree is acyclic by construction. `parent_block_id` is a plain
/// back-reference filled in during traversal when the input omits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Unique identifier of the block.
    pub block_id: String,
    /// Variant of the block.
    pub block_type: BlockType,
    /// Question or section title; used as the retrieval query for leaves.
    #[serde(default)]
    pub title: String,
    /// Allowed answer strings for constrained questions.
    #[serde(default)]
    pub response_options: Vec<String>,
    /// Guidance text shown alongside the question; drives sibling grouping.
    #[serde(default)]
    pub guidance_text: String,
    /// Child blocks in document order.
    #[serde(default)]
    pub blocks: Vec<Block>,
    /// Identifier of the structural parent, when known.
    #[serde(default)]
    pub parent_block_id: Option<String>,
    /// Whether this block expects an AI-generated answer.
    #[serde(default)]
    pub is_ai_response_expected: bool,
    /// Answer produced for this leaf, when processed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Model rationale supporting the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    /// Outcome of processing this leaf.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LeafStatus>,
}

impl Block {
    /// Shallow copy with children removed, used when capturing ancestor paths
    /// so group payloads stay small.
    pub fn without_children(&self) -> Block {
        Block {
            blocks: Vec::new(),
            ..self.clone()
        }
    }
}

/// Checklist metadata carried through the run untouched and re-emitted with the answers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    /// Identifier of the checklist instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checklist_id: Option<String>,
    /// Human-readable checklist name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checklist_name: Option<String>,
    /// Identifier of the template the checklist was created from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    /// Human-readable template name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    /// Audit framework the checklist belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    /// Client identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Client name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Scoping flag carried as an opaque string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_scoping: Option<String>,
    /// Identifier of the root block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_block_id: Option<String>,
    /// Total block count reported by the authoring system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_blocks: Option<String>,
}

/// Full checklist document as read from and written back to blob storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistDocument {
    /// Checklist metadata, round-tripped verbatim.
    #[serde(default)]
    pub meta_data: MetaData,
    /// Root blocks of the tree.
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl ChecklistDocument {
    /// Parse a checklist document from raw JSON bytes, rejecting empty trees.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChecklistError> {
        let document: ChecklistDocument = serde_json::from_slice(bytes)?;
        if document.blocks.is_empty() {
            return Err(ChecklistError::Empty);
        }
        Ok(document)
    }
}
