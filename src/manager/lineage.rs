//! Provenance tree reconstruction
//!
//! The traversal is depth-first in source order and keeps one visited set
//! for the whole walk. An id seen anywhere earlier becomes a leaf marked
//! `circular_reference`, which also collapses the second path into a shared
//! ancestor (a diamond) even though no cycle exists.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::model::{Artifact, ArtifactStatus, ArtifactType};

/// One node of a lineage tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineageNode {
    pub artifact_id: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<ArtifactType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ArtifactStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_module: Option<String>,

    /// Lineage of each source, in `source_artifact_ids` order
    pub sources: Vec<LineageNode>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub circular_reference: bool,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub not_found: bool,
}

impl LineageNode {
    fn resolved(artifact: &Artifact) -> Self {
        Self {
            artifact_id: artifact.artifact_id.clone(),
            artifact_type: Some(artifact.artifact_type),
            status: Some(artifact.status),
            created_at: Some(artifact.created_at),
            processing_module: artifact.processing_module.clone(),
            sources: Vec::new(),
            circular_reference: false,
            not_found: false,
        }
    }

    fn leaf(artifact_id: &str) -> Self {
        Self {
            artifact_id: artifact_id.to_string(),
            artifact_type: None,
            status: None,
            created_at: None,
            processing_module: None,
            sources: Vec::new(),
            circular_reference: false,
            not_found: false,
        }
    }

    fn circular(artifact_id: &str) -> Self {
        Self {
            circular_reference: true,
            ..Self::leaf(artifact_id)
        }
    }

    fn missing(artifact_id: &str) -> Self {
        Self {
            not_found: true,
            ..Self::leaf(artifact_id)
        }
    }

    /// Number of levels in the tree, counting this node.
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self, 1usize)];
        while let Some((node, level)) = stack.pop() {
            max = max.max(level);
            stack.extend(node.sources.iter().map(|s| (s, level + 1)));
        }
        max
    }
}

/// Pending expansion of a resolved node.
struct Frame {
    index: usize,
    sources: Vec<String>,
    next: usize,
}

/// Rebuild the provenance tree rooted at `root_id`.
///
/// `load` resolves an id to its artifact (`None` when absent). Uses an
/// explicit stack, so depth is bounded by heap rather than call stack.
pub fn build_lineage<F, E>(root_id: &str, mut load: F) -> Result<LineageNode, E>
where
    F: FnMut(&str) -> Result<Option<Artifact>, E>,
{
    // Nodes are pushed in visit order, so every child has a larger index
    // than its parent.
    let mut nodes: Vec<LineageNode> = Vec::new();
    let mut children: Vec<Vec<usize>> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<Frame> = Vec::new();

    let mut visit = |id: &str,
                     nodes: &mut Vec<LineageNode>,
                     children: &mut Vec<Vec<usize>>|
     -> Result<(usize, Option<Frame>), E> {
        let index = nodes.len();
        let (node, frame) = if !visited.insert(id.to_string()) {
            (LineageNode::circular(id), None)
        } else {
            match load(id)? {
                Some(artifact) => {
                    let frame = (!artifact.source_artifact_ids.is_empty()).then(|| Frame {
                        index,
                        sources: artifact.source_artifact_ids.clone(),
                        next: 0,
                    });
                    (LineageNode::resolved(&artifact), frame)
                }
                None => (LineageNode::missing(id), None),
            }
        };
        nodes.push(node);
        children.push(Vec::new());
        Ok((index, frame))
    };

    let (_, root_frame) = visit(root_id, &mut nodes, &mut children)?;
    stack.extend(root_frame);

    while let Some(frame) = stack.last_mut() {
        if frame.next >= frame.sources.len() {
            stack.pop();
            continue;
        }
        let source_id = frame.sources[frame.next].clone();
        frame.next += 1;
        let parent = frame.index;

        let (child, child_frame) = visit(&source_id, &mut nodes, &mut children)?;
        children[parent].push(child);
        stack.extend(child_frame);
    }

    // Assemble bottom-up: children always sit after their parent.
    let mut slots: Vec<Option<LineageNode>> = nodes.into_iter().map(Some).collect();
    for index in (0..slots.len()).rev() {
        let sources: Vec<LineageNode> = children[index]
            .iter()
            .filter_map(|&child| slots[child].take())
            .collect();
        if let Some(node) = slots[index].as_mut() {
            node.sources = sources;
        }
    }

    Ok(slots
        .into_iter()
        .next()
        .flatten()
        .unwrap_or_else(|| LineageNode::missing(root_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::convert::Infallible;

    fn graph(edges: &[(&str, &[&str])]) -> HashMap<String, Artifact> {
        edges
            .iter()
            .map(|(id, sources)| {
                let mut a = Artifact::new(ArtifactType::Metadata);
                a.artifact_id = id.to_string();
                a.source_artifact_ids = sources.iter().map(|s| s.to_string()).collect();
                (id.to_string(), a)
            })
            .collect()
    }

    fn lineage(g: &HashMap<String, Artifact>, root: &str) -> LineageNode {
        build_lineage(root, |id| Ok::<_, Infallible>(g.get(id).cloned())).unwrap()
    }

    #[test]
    fn test_linear_chain() {
        let g = graph(&[("c", &["b"]), ("b", &["a"]), ("a", &[])]);
        let tree = lineage(&g, "c");
        assert_eq!(tree.artifact_id, "c");
        assert_eq!(tree.sources[0].artifact_id, "b");
        assert_eq!(tree.sources[0].sources[0].artifact_id, "a");
        assert_eq!(tree.depth(), 3);
    }

    #[test]
    fn test_true_cycle_terminates() {
        let g = graph(&[("a", &["b"]), ("b", &["a"])]);
        let tree = lineage(&g, "a");
        let b = &tree.sources[0];
        assert_eq!(b.artifact_id, "b");
        assert!(!b.circular_reference);
        assert_eq!(b.sources[0].artifact_id, "a");
        assert!(b.sources[0].circular_reference);
        assert!(b.sources[0].sources.is_empty());
    }

    #[test]
    fn test_self_reference() {
        let g = graph(&[("a", &["a"])]);
        let tree = lineage(&g, "a");
        assert!(tree.sources[0].circular_reference);
    }

    #[test]
    fn test_diamond_marks_second_visit() {
        // d derives from b and c, both of which derive from a
        let g = graph(&[("d", &["b", "c"]), ("b", &["a"]), ("c", &["a"]), ("a", &[])]);
        let tree = lineage(&g, "d");

        let b = &tree.sources[0];
        let c = &tree.sources[1];
        assert!(!b.sources[0].circular_reference);
        assert_eq!(b.sources[0].status, Some(ArtifactStatus::Pending));
        assert!(c.sources[0].circular_reference);
        assert_eq!(c.sources[0].artifact_id, "a");
    }

    #[test]
    fn test_missing_source_is_marked() {
        let g = graph(&[("b", &["gone"])]);
        let tree = lineage(&g, "b");
        assert!(tree.sources[0].not_found);
        assert!(tree.sources[0].artifact_type.is_none());

        let root_missing = lineage(&g, "nothing");
        assert!(root_missing.not_found);
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let n = 20_000;
        let mut g = HashMap::new();
        for i in 0..n {
            let mut a = Artifact::new(ArtifactType::Log);
            a.artifact_id = format!("n{}", i);
            if i > 0 {
                a.source_artifact_ids.push(format!("n{}", i - 1));
            }
            g.insert(a.artifact_id.clone(), a);
        }
        let tree = lineage(&g, &format!("n{}", n - 1));
        assert_eq!(tree.depth(), n);
        // Tear down iteratively so dropping the tree does not recurse
        let mut current = tree;
        while let Some(next) = current.sources.pop() {
            current = next;
        }
    }

    #[test]
    fn test_serialized_shape() {
        let g = graph(&[("a", &["a"])]);
        let json = serde_json::to_value(lineage(&g, "a")).unwrap();
        assert_eq!(json["type"], "metadata");
        assert_eq!(json["sources"][0]["circular_reference"], true);
        assert!(json.get("not_found").is_none());
    }
}
