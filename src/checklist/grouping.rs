//! Depth-first grouping of answerable leaves into sibling groups.
//!
//! Leaves (blocks flagged `is_ai_response_expected`) are grouped by their immediate parent
//! and the canonicalized guidance text, in DFS encounter order. Groups can optionally be
//! sliced to a maximum size, each slice receiving a fresh group id.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::block::Block;

/// A batch of leaves sharing an immediate parent and a canonical guidance key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiblingGroup {
    /// Fresh identifier, unique per group or per size-capped slice.
    pub group_id: String,
    /// Canonical guidance key shared by every leaf, possibly empty.
    pub group_key: String,
    /// Path from root to the leaves' parent, children stripped.
    pub ancestors: Vec<Block>,
    /// Leaves in DFS encounter order, children stripped.
    pub leaves: Vec<Block>,
}

fn paren_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\([^()]*\)").expect("valid paren pattern"))
}

fn whitespace_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace pattern"))
}

/// Canonicalize guidance text for grouping.
///
/// Repeatedly removes innermost balanced parenthetical substrings (handles nesting and
/// adjacency), splits the remainder on commas, trims and collapses internal whitespace of
/// each segment, drops empty segments, and rejoins the survivors with `", "`. Returns `None`
/// when nothing remains. The function is idempotent.
pub fn canonical_guidance(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut stripped = trimmed.to_string();
    loop {
        let next = paren_pattern().replace_all(&stripped, "").into_owned();
        if next == stripped {
            break;
        }
        stripped = next;
    }

    let segments: Vec<String> = stripped
        .split(',')
        .map(|segment| {
            whitespace_pattern()
                .replace_all(segment.trim(), " ")
                .into_owned()
        })
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.is_empty() {
        None
    } else {
        Some(segments.join(", "))
    }
}

type GroupKey = (Option<String>, Option<String>);

struct GroupAccumulator {
    ancestors: Vec<Block>,
    leaves: Vec<Block>,
    group_key: String,
}

/// Group every answerable leaf under `roots` into sibling groups.
///
/// Traversal is an explicit-stack depth-first walk carrying the ancestor path (root → parent,
/// excluding the node itself). Missing `parent_block_id` back-references are filled in on the
/// source tree as a side effect. Group emission order equals the first-seen order of each
/// (parent, guidance) key; when `max_group_size` is set, each group's leaves are sliced into
/// consecutive chunks of at most that size.
pub fn group_leaves(roots: &mut [Block], max_group_size: Option<usize>) -> Vec<SiblingGroup> {
    backfill_parent_ids(roots);

    let mut order: Vec<GroupKey> = Vec::new();
    let mut groups: HashMap<GroupKey, GroupAccumulator> = HashMap::new();

    // Stack entries hold the node alongside its ancestor path; children are pushed in
    // reverse so they pop in document order.
    let mut stack: Vec<(&Block, Vec<Block>)> = Vec::new();
    for root in roots.iter().rev() {
        stack.push((root, Vec::new()));
    }

    while let Some((node, ancestors)) = stack.pop() {
        if node.is_ai_response_expected {
            let parent_id = ancestors.last().map(|parent| parent.block_id.clone());
            let guidance_key = canonical_guidance(&node.guidance_text);
            let key = (parent_id, guidance_key.clone());

            let accumulator = groups.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                GroupAccumulator {
                    ancestors: ancestors.clone(),
                    leaves: Vec::new(),
                    group_key: guidance_key.unwrap_or_default(),
                }
            });
            accumulator.leaves.push(node.without_children());
        }

        if !node.blocks.is_empty() {
            let mut child_path = ancestors;
            child_path.push(node.without_children());
            for child in node.blocks.iter().rev() {
                stack.push((child, child_path.clone()));
            }
        }
    }

    let mut result = Vec::new();
    for key in order {
        let accumulator = groups
            .remove(&key)
            .expect("group accumulator present for ordered key");
        match max_group_size {
            Some(limit) if limit > 0 => {
                for slice in accumulator.leaves.chunks(limit) {
                    result.push(SiblingGroup {
                        group_id: Uuid::new_v4().to_string(),
                        group_key: accumulator.group_key.clone(),
                        ancestors: accumulator.ancestors.clone(),
                        leaves: slice.to_vec(),
                    });
                }
            }
            _ => result.push(SiblingGroup {
                group_id: Uuid::new_v4().to_string(),
                group_key: accumulator.group_key,
                ancestors: accumulator.ancestors,
                leaves: accumulator.leaves,
            }),
        }
    }
    result
}

/// Fill in missing `parent_block_id` back-references from the structural parent.
fn backfill_parent_ids(roots: &mut [Block]) {
    let mut stack: Vec<&mut Block> = roots.iter_mut().collect();
    while let Some(node) = stack.pop() {
        let parent_id = node.block_id.clone();
        for child in node.blocks.iter_mut() {
            if child.parent_block_id.is_none() {
                child.parent_block_id = Some(parent_id.clone());
            }
            stack.push(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checklist::block::BlockType;

    fn question(id: &str, guidance: &str) -> Block {
        Block {
            block_id: id.into(),
            block_type: BlockType::RadioQuestion,
            title: format!("Question {id}"),
            response_options: vec!["Yes".into(), "No".into()],
            guidance_text: guidance.into(),
            blocks: vec![],
            parent_block_id: None,
            is_ai_response_expected: true,
            answer: None,
            rationale: None,
            status: None,
        }
    }

    fn section(id: &str, children: Vec<Block>) -> Block {
        Block {
            block_id: id.into(),
            block_type: BlockType::Section,
            title: format!("Section {id}"),
            response_options: vec![],
            guidance_text: String::new(),
            blocks: children,
            parent_block_id: None,
            is_ai_response_expected: false,
            answer: None,
            rationale: None,
            status: None,
        }
    }

    #[test]
    fn canonical_guidance_strips_parentheticals() {
        let canonical =
            canonical_guidance("Check compliance (see note), review control (optional)");
        assert_eq!(canonical.as_deref(), Some("Check compliance, review control"));
    }

    #[test]
    fn canonical_guidance_handles_nesting_and_adjacency() {
        let canonical = canonical_guidance("alpha (outer (inner))(next), beta");
        assert_eq!(canonical.as_deref(), Some("alpha, beta"));
    }

    #[test]
    fn canonical_guidance_is_idempotent() {
        let once = canonical_guidance("  A (x),  B   C , ,").expect("some");
        let twice = canonical_guidance(&once).expect("some");
        assert_eq!(once, twice);
        assert_eq!(once, "A, B C");
    }

    #[test]
    fn canonical_guidance_empty_when_nothing_remains() {
        assert!(canonical_guidance("").is_none());
        assert!(canonical_guidance("  (all aside) , ").is_none());
    }

    #[test]
    fn groups_cover_every_leaf_exactly_once() {
        let mut roots = vec![section(
            "root",
            vec![
                question("q1", "Shared guidance"),
                question("q2", "Shared guidance"),
                section("s1", vec![question("q3", "Other")]),
                question("q4", "Shared guidance"),
            ],
        )];
        let groups = group_leaves(&mut roots, None);

        let mut seen: Vec<String> = groups
            .iter()
            .flat_map(|group| group.leaves.iter().map(|leaf| leaf.block_id.clone()))
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["q1", "q2", "q3", "q4"]);

        // q1/q2/q4 share parent root + guidance; q3 sits under s1.
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].leaves.len(), 3);
        assert_eq!(groups[0].group_key, "Shared guidance");
        assert_eq!(groups[1].leaves.len(), 1);
    }

    #[test]
    fn group_members_share_parent_and_key() {
        let mut roots = vec![section(
            "root",
            vec![
                question("q1", "G (note)"),
                question("q2", "G"),
                question("q3", "H"),
            ],
        )];
        let groups = group_leaves(&mut roots, None);
        assert_eq!(groups.len(), 2);
        for group in &groups {
            let parents: Vec<_> = group
                .leaves
                .iter()
                .map(|leaf| leaf.parent_block_id.clone())
                .collect();
            assert!(parents.iter().all(|parent| parent == &parents[0]));
            for leaf in &group.leaves {
                assert_eq!(
                    canonical_guidance(&leaf.guidance_text).unwrap_or_default(),
                    group.group_key
                );
            }
        }
    }

    #[test]
    fn max_group_size_slices_with_fresh_ids() {
        let mut roots = vec![section(
            "root",
            (0..5).map(|i| question(&format!("q{i}"), "G")).collect(),
        )];
        let groups = group_leaves(&mut roots, Some(2));
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].leaves.len(), 2);
        assert_eq!(groups[1].leaves.len(), 2);
        assert_eq!(groups[2].leaves.len(), 1);
        assert_ne!(groups[0].group_id, groups[1].group_id);
        assert!(groups.iter().all(|group| group.group_key == "G"));
        // Slice order preserves DFS order.
        assert_eq!(groups[0].leaves[0].block_id, "q0");
        assert_eq!(groups[2].leaves[0].block_id, "q4");
    }

    #[test]
    fn backfills_missing_parent_ids() {
        let mut roots = vec![section("root", vec![question("q1", "")])];
        let groups = group_leaves(&mut roots, None);
        assert_eq!(roots[0].blocks[0].parent_block_id.as_deref(), Some("root"));
        assert_eq!(groups[0].leaves[0].parent_block_id.as_deref(), Some("root"));
    }

    #[test]
    fn ancestors_exclude_leaf_and_strip_children() {
        let mut roots = vec![section("root", vec![section("s1", vec![question("q1", "")])])];
        let groups = group_leaves(&mut roots, None);
        let ancestors = &groups[0].ancestors;
        let ids: Vec<_> = ancestors.iter().map(|a| a.block_id.as_str()).collect();
        assert_eq!(ids, vec!["root", "s1"]);
        assert!(ancestors.iter().all(|a| a.blocks.is_empty()));
    }

    #[test]
    fn root_level_leaves_group_under_no_parent() {
        let mut roots = vec![question("q1", "G"), question("q2", "G")];
        let groups = group_leaves(&mut roots, None);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].leaves.len(), 2);
        assert!(groups[0].ancestors.is_empty());
    }
}
