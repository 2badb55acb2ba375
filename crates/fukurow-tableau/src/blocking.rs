//! ブロッキング (停止性の保証)

use crate::abox::ABox;
use crate::cow::CowCell;
use crate::node::{Node, NodeId, NodeOrderKey};
use crate::rbox::RBox;
use fukurow_term::Role;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How an anonymous node is matched against an ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockingStrategy {
    /// The ancestor's terms include the node's terms
    Subset,
    /// Equal terms and equal incoming role labels; needed once inverse
    /// roles can carry constraints back up the tree
    Double,
}

impl BlockingStrategy {
    pub fn for_rbox(rbox: &RBox) -> Self {
        if rbox.has_inverse_roles() {
            BlockingStrategy::Double
        } else {
            BlockingStrategy::Subset
        }
    }

    pub fn blocks(self, abox: &ABox, node: &Node, candidate: &Node) -> bool {
        match self {
            BlockingStrategy::Subset => candidate.terms().is_superset(node.terms()),
            BlockingStrategy::Double => {
                candidate.terms() == node.terms()
                    && incoming_roles(abox, candidate) == incoming_roles(abox, node)
            }
        }
    }
}

/// Roles of links arriving from earlier nodes
fn incoming_roles<'a>(abox: &ABox, node: &'a Node) -> BTreeSet<&'a Role> {
    let limit = node.order_key();
    node.predecessor_links()
        .filter(|(_, source)| abox.order_key(*source).map_or(false, |key| key < limit))
        .map(|(role, _)| role)
        .collect()
}

/// Transitive predecessors of `node` that come before it in the natural order
pub fn ancestors(abox: &ABox, node: &Node) -> BTreeSet<NodeOrderKey> {
    let limit = node.order_key();
    let mut seen = BTreeSet::new();
    let mut stack = vec![node.id()];
    while let Some(current) = stack.pop() {
        let Some(current) = abox.node(current) else {
            continue;
        };
        for (_, source) in current.predecessor_links() {
            if let Some(key) = abox.order_key(source) {
                if key < limit && seen.insert(key) {
                    stack.push(source);
                }
            }
        }
    }
    seen
}

/// Blocker of `id`, ignoring the cache for `id` itself.
///
/// Only anonymous individuals are blocked, and only by anonymous
/// individuals. A node below a blocked ancestor is blocked by that
/// ancestor's blocker.
pub(crate) fn find_blocker(abox: &ABox, id: NodeId) -> Option<NodeId> {
    let node = abox.node(id)?;
    if !node.is_anonymous() || node.is_datatype() {
        return None;
    }
    let ancestors = ancestors(abox, node);
    for key in &ancestors {
        if let Some(blocker) = abox.blocker(key.id) {
            return Some(blocker);
        }
    }
    let strategy = abox.blocking_strategy();
    ancestors
        .iter()
        .filter_map(|key| abox.node(key.id))
        .find(|candidate| {
            candidate.is_anonymous()
                && !candidate.is_datatype()
                && strategy.blocks(abox, node, candidate)
        })
        .map(Node::id)
}

/// Memoized blocking state: `Some(None)` means known to be unblocked.
#[derive(Debug, Clone)]
pub struct BlockingCache {
    strategy: BlockingStrategy,
    entries: CowCell<BTreeMap<NodeOrderKey, Option<NodeId>>>,
}

impl BlockingCache {
    pub fn new(strategy: BlockingStrategy) -> Self {
        Self {
            strategy,
            entries: CowCell::default(),
        }
    }

    pub fn strategy(&self) -> BlockingStrategy {
        self.strategy
    }

    pub fn get(&self, key: &NodeOrderKey) -> Option<Option<NodeId>> {
        self.entries.get().get(key).copied()
    }

    pub fn insert(&mut self, key: NodeOrderKey, blocker: Option<NodeId>) {
        self.entries.get_mut().insert(key, blocker);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry at or after `key` and returns the keys that were
    /// cached as blocked.
    pub fn invalidate_from(&mut self, key: NodeOrderKey) -> Vec<NodeOrderKey> {
        if self.entries.range(key..).next().is_none() {
            return Vec::new();
        }
        let entries = self.entries.get_mut();
        let stale = entries.split_off(&key);
        stale
            .into_iter()
            .filter(|(_, blocker)| blocker.is_some())
            .map(|(key, _)| key)
            .collect()
    }

    pub fn fork(&mut self) -> Self {
        Self {
            strategy: self.strategy,
            entries: self.entries.share(),
        }
    }
}
