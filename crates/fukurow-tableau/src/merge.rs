//! Merge chains.

use crate::node::NodeId;
use crate::ReasonerError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What happened to a node while a change was applied: where it ended up
/// after merges and which live nodes were modified on the way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMergeInfo {
    pub initial_node: NodeId,
    pub current_node: NodeId,
    pub merged_nodes: BTreeSet<NodeId>,
    pub modified_nodes: BTreeSet<NodeId>,
}

impl NodeMergeInfo {
    pub fn unchanged(node: NodeId) -> Self {
        Self {
            initial_node: node,
            current_node: node,
            merged_nodes: BTreeSet::new(),
            modified_nodes: BTreeSet::new(),
        }
    }

    pub fn is_merged(&self) -> bool {
        !self.merged_nodes.is_empty()
    }

    pub fn is_changed(&self) -> bool {
        self.is_merged() || !self.modified_nodes.is_empty()
    }

    pub fn record_modified(&mut self, node: NodeId) {
        if !self.merged_nodes.contains(&node) {
            self.modified_nodes.insert(node);
        }
    }

    /// Composes `next` onto this chain. `next` must start where this chain
    /// currently is, or have merged that node away.
    pub fn append(&mut self, next: NodeMergeInfo) -> Result<(), ReasonerError> {
        if next.initial_node != self.current_node && !next.merged_nodes.contains(&self.current_node)
        {
            return Err(ReasonerError::Internal(format!(
                "cannot append merge chain starting at {} to chain ending at {}",
                next.initial_node, self.current_node
            )));
        }
        self.current_node = next.current_node;
        self.merged_nodes.extend(next.merged_nodes);
        self.modified_nodes.extend(next.modified_nodes);
        let merged = &self.merged_nodes;
        self.modified_nodes.retain(|n| !merged.contains(n));
        Ok(())
    }
}
