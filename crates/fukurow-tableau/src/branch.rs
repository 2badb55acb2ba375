//! 分岐と分岐木

use crate::abox::ABox;
use crate::consistency::ConsistencyInfo;
use crate::dependency::TermEntry;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchState {
    Active,
    Inconsistent,
    Done,
}

/// One candidate completion
#[derive(Debug, Clone)]
pub struct Branch {
    abox: ABox,
    consistency: ConsistencyInfo,
    state: BranchState,
    depth: usize,
    merge_tracking: bool,
}

impl Branch {
    pub fn new(abox: ABox, merge_tracking: bool) -> Self {
        Self {
            abox,
            consistency: ConsistencyInfo::consistent(),
            state: BranchState::Active,
            depth: 0,
            merge_tracking,
        }
    }

    /// Child branch continuing from `abox`
    pub fn fork(&self, abox: ABox) -> Branch {
        Branch {
            abox,
            consistency: ConsistencyInfo::consistent(),
            state: BranchState::Active,
            depth: self.depth + 1,
            merge_tracking: self.merge_tracking,
        }
    }

    pub fn abox(&self) -> &ABox {
        &self.abox
    }

    pub fn abox_mut(&mut self) -> &mut ABox {
        &mut self.abox
    }

    pub fn into_abox(self) -> ABox {
        self.abox
    }

    pub fn state(&self) -> BranchState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == BranchState::Active
    }

    pub fn mark_done(&mut self) {
        self.state = BranchState::Done;
    }

    pub fn mark_inconsistent(&mut self, clashes: BTreeSet<TermEntry>) {
        self.consistency.merge(ConsistencyInfo::inconsistent(clashes));
        self.state = BranchState::Inconsistent;
    }

    pub fn consistency(&self) -> &ConsistencyInfo {
        &self.consistency
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn merge_tracking(&self) -> bool {
        self.merge_tracking
    }

    /// Choices this branch was built on
    pub fn governing(&self) -> &BTreeSet<TermEntry> {
        self.abox.dependencies().governing()
    }

    /// Governing entries the recorded clash depends on
    pub fn culprits(&self) -> BTreeSet<TermEntry> {
        self.abox.dependencies().culprits(&self.consistency.clashes)
    }
}

/// Position of a branch in a [`BranchTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BranchId(usize);

#[derive(Debug)]
enum Slot {
    /// `None` while the branch is taken out for processing
    Leaf(Option<Branch>),
    Decision(Vec<BranchId>),
}

#[derive(Debug)]
struct TreeNode {
    parent: Option<BranchId>,
    slot: Slot,
}

/// Search space of a query. Leaves hold pending branches; a decision point
/// holds the alternatives of one non-deterministic rule application, in
/// the order they are explored.
#[derive(Debug, Default)]
pub struct BranchTree {
    nodes: Vec<Option<TreeNode>>,
    root: Option<BranchId>,
}

impl BranchTree {
    pub fn new(branch: Branch) -> Self {
        let mut tree = BranchTree::default();
        let root = tree.push(None, Slot::Leaf(Some(branch)));
        tree.root = Some(root);
        tree
    }

    fn push(&mut self, parent: Option<BranchId>, slot: Slot) -> BranchId {
        self.nodes.push(Some(TreeNode { parent, slot }));
        BranchId(self.nodes.len() - 1)
    }

    fn tree_node(&self, id: BranchId) -> Option<&TreeNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    /// Leftmost leaf, depth first
    pub fn first_leaf(&self) -> Option<BranchId> {
        let mut current = self.root?;
        loop {
            match &self.tree_node(current)?.slot {
                Slot::Leaf(_) => return Some(current),
                Slot::Decision(children) => current = *children.first()?,
            }
        }
    }

    pub fn branch(&self, id: BranchId) -> Option<&Branch> {
        match &self.tree_node(id)?.slot {
            Slot::Leaf(branch) => branch.as_ref(),
            Slot::Decision(_) => None,
        }
    }

    /// Takes the branch out of its leaf; the leaf stays in place.
    pub fn take_branch(&mut self, id: BranchId) -> Option<Branch> {
        match &mut self.nodes.get_mut(id.0)?.as_mut()?.slot {
            Slot::Leaf(branch) => branch.take(),
            Slot::Decision(_) => None,
        }
    }

    pub fn put_branch(&mut self, id: BranchId, branch: Branch) {
        if let Some(Some(TreeNode {
            slot: Slot::Leaf(slot),
            ..
        })) = self.nodes.get_mut(id.0)
        {
            *slot = Some(branch);
        }
    }

    /// Replaces leaf `id` by a decision point whose first alternative is
    /// `branch`, followed by `alternatives`. Returns the new leaf of `branch`.
    pub fn fork(&mut self, id: BranchId, branch: Branch, alternatives: Vec<Branch>) -> BranchId {
        debug!(depth = branch.depth(), alternatives = alternatives.len(), "branch forked");
        let mut children = Vec::with_capacity(alternatives.len() + 1);
        for child in std::iter::once(branch).chain(alternatives) {
            children.push(self.push(Some(id), Slot::Leaf(Some(child))));
        }
        let first = children[0];
        if let Some(Some(node)) = self.nodes.get_mut(id.0) {
            node.slot = Slot::Decision(children);
        }
        first
    }

    /// Removes a leaf; decision points left without alternatives go too.
    pub fn remove(&mut self, id: BranchId) -> Option<Branch> {
        let node = self.nodes.get_mut(id.0)?.take()?;
        let removed = match node.slot {
            Slot::Leaf(branch) => branch,
            Slot::Decision(_) => None,
        };
        let mut child = id;
        let mut parent = node.parent;
        while let Some(pid) = parent {
            let Some(Some(parent_node)) = self.nodes.get_mut(pid.0) else {
                break;
            };
            if let Slot::Decision(children) = &mut parent_node.slot {
                children.retain(|c| *c != child);
                if !children.is_empty() {
                    return removed;
                }
            }
            parent = parent_node.parent;
            self.nodes[pid.0] = None;
            child = pid;
        }
        if parent.is_none() && self.root == Some(child) {
            self.root = None;
        }
        removed
    }

    /// Dependency-directed backtracking: drops every pending branch whose
    /// choices include all of `culprits`. Returns how many were dropped.
    pub fn prune(&mut self, culprits: &BTreeSet<TermEntry>) -> usize {
        let doomed: Vec<BranchId> = self
            .leaves()
            .into_iter()
            .filter(|id| {
                self.branch(*id)
                    .map_or(false, |branch| branch.governing().is_superset(culprits))
            })
            .collect();
        for id in &doomed {
            self.remove(*id);
        }
        if !doomed.is_empty() {
            debug!(pruned = doomed.len(), culprits = culprits.len(), "pruned branches");
        }
        doomed.len()
    }

    /// Leaves in exploration order
    pub fn leaves(&self) -> Vec<BranchId> {
        let mut leaves = Vec::new();
        let mut stack: Vec<BranchId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            match self.tree_node(id).map(|node| &node.slot) {
                Some(Slot::Leaf(_)) => leaves.push(id),
                Some(Slot::Decision(children)) => stack.extend(children.iter().rev()),
                None => {}
            }
        }
        leaves
    }

    /// Number of pending branches
    pub fn len(&self) -> usize {
        self.leaves().len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;
    use crate::tbox::TBox;
    use fukurow_term::Term;

    fn branch_with(choices: &[&str]) -> Branch {
        let mut abox = ABox::new(TBox::new());
        for choice in choices {
            abox.dependencies_mut()
                .add_governing(TermEntry::new(NodeId(0), Term::class(*choice)));
        }
        Branch::new(abox, false)
    }

    #[test]
    fn test_fork_and_depth_first_order() {
        let mut tree = BranchTree::new(branch_with(&[]));
        let root = tree.first_leaf().unwrap();
        let parent = tree.take_branch(root).unwrap();
        let a = parent.fork(branch_with(&["A"]).into_abox());
        let b = parent.fork(branch_with(&["B"]).into_abox());
        let first = tree.fork(root, a, vec![b]);

        assert_eq!(tree.first_leaf(), Some(first));
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.branch(first).unwrap().depth(), 1);

        tree.remove(first);
        let second = tree.first_leaf().unwrap();
        assert!(tree
            .branch(second)
            .unwrap()
            .governing()
            .contains(&TermEntry::new(NodeId(0), Term::class("B"))));
        tree.remove(second);
        assert!(tree.is_empty());
        assert_eq!(tree.first_leaf(), None);
    }

    #[test]
    fn test_prune_by_culprits() {
        let mut tree = BranchTree::new(branch_with(&[]));
        let root = tree.first_leaf().unwrap();
        let parent = tree.take_branch(root).unwrap();
        let children = vec![
            parent.fork(branch_with(&["A", "C"]).into_abox()),
            parent.fork(branch_with(&["B", "C"]).into_abox()),
            parent.fork(branch_with(&["B", "D"]).into_abox()),
        ];
        tree.fork(root, parent.fork(branch_with(&["A", "D"]).into_abox()), children);

        let culprits = BTreeSet::from([TermEntry::new(NodeId(0), Term::class("C"))]);
        assert_eq!(tree.prune(&culprits), 2);
        assert_eq!(tree.len(), 2);

        assert_eq!(tree.prune(&BTreeSet::new()), 2);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_taken_branch_is_not_pruned() {
        let mut tree = BranchTree::new(branch_with(&["A"]));
        let root = tree.first_leaf().unwrap();
        let branch = tree.take_branch(root).unwrap();
        assert_eq!(tree.prune(&BTreeSet::new()), 0);
        tree.put_branch(root, branch);
        assert!(tree.branch(root).is_some());
    }

    #[test]
    fn test_mark_inconsistent_records_clashes() {
        let mut branch = branch_with(&["A"]);
        let entry = TermEntry::new(NodeId(0), Term::class("A"));
        branch.mark_inconsistent(BTreeSet::from([entry.clone()]));
        assert_eq!(branch.state(), BranchState::Inconsistent);
        assert!(branch.consistency().finally_inconsistent);
        assert_eq!(branch.culprits(), BTreeSet::from([entry]));
    }
}
