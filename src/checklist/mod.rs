//! Checklist block tree: parsing, metadata, and sibling-group extraction.

pub mod block;
pub mod grouping;

pub use block::{Block, BlockType, ChecklistDocument, ChecklistError, LeafStatus, MetaData};
pub use grouping::{SiblingGroup, canonical_guidance, group_leaves};
