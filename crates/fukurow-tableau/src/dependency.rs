//! 依存関係マップ (dependency-directed backtracking 用)

use crate::cow::CowCell;
use crate::node::NodeId;
use fukurow_term::{Role, Term};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

/// A term at a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TermEntry {
    pub node: NodeId,
    pub term: Term,
}

impl TermEntry {
    pub fn new(node: NodeId, term: Term) -> Self {
        Self { node, term }
    }
}

impl fmt::Display for TermEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.node, self.term)
    }
}

/// A role link between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkEntry {
    pub source: NodeId,
    pub role: Role,
    pub target: NodeId,
}

impl LinkEntry {
    pub fn new(source: NodeId, role: Role, target: NodeId) -> Self {
        Self {
            source,
            role,
            target,
        }
    }
}

/// Records, for every term added to the ABox, the entries that caused it.
///
/// Entries of nodes that were merged away stay queryable. Governing entries
/// are the non-deterministic choices taken on the current branch.
#[derive(Debug, Clone, Default)]
pub struct DependencyMap {
    parents: CowCell<BTreeMap<TermEntry, BTreeSet<TermEntry>>>,
    children: CowCell<BTreeMap<TermEntry, BTreeSet<TermEntry>>>,
    link_parents: CowCell<BTreeMap<LinkEntry, BTreeSet<TermEntry>>>,
    governing: CowCell<BTreeSet<TermEntry>>,
}

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `entry`. An entry that is already known keeps its parents.
    pub fn add(&mut self, entry: TermEntry, parents: impl IntoIterator<Item = TermEntry>) {
        if self.parents.contains_key(&entry) {
            return;
        }
        let parents: BTreeSet<TermEntry> = parents.into_iter().filter(|p| *p != entry).collect();
        let children = self.children.get_mut();
        for parent in &parents {
            children
                .entry(parent.clone())
                .or_default()
                .insert(entry.clone());
        }
        self.parents.get_mut().insert(entry, parents);
    }

    pub fn add_link(&mut self, link: LinkEntry, parents: impl IntoIterator<Item = TermEntry>) {
        self.link_parents
            .get_mut()
            .entry(link)
            .or_insert_with(|| parents.into_iter().collect());
    }

    pub fn contains(&self, entry: &TermEntry) -> bool {
        self.parents.contains_key(entry)
    }

    pub fn parents(&self, entry: &TermEntry) -> Option<&BTreeSet<TermEntry>> {
        self.parents.get().get(entry)
    }

    pub fn link_parents(&self, link: &LinkEntry) -> BTreeSet<TermEntry> {
        self.link_parents.get().get(link).cloned().unwrap_or_default()
    }

    pub fn ancestors(&self, entry: &TermEntry) -> BTreeSet<TermEntry> {
        Self::closure(entry, self.parents.get())
    }

    pub fn descendants(&self, entry: &TermEntry) -> BTreeSet<TermEntry> {
        Self::closure(entry, self.children.get())
    }

    fn closure(
        start: &TermEntry,
        edges: &BTreeMap<TermEntry, BTreeSet<TermEntry>>,
    ) -> BTreeSet<TermEntry> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&TermEntry> = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for next in edges.get(current).into_iter().flatten() {
                if next != start && seen.insert(next.clone()) {
                    queue.push_back(next);
                }
            }
        }
        seen
    }

    /// Terms at `node` that were asserted rather than derived
    pub fn root_terms(&self, node: NodeId) -> BTreeSet<Term> {
        self.parents
            .iter()
            .filter(|(entry, parents)| entry.node == node && parents.is_empty())
            .map(|(entry, _)| entry.term.clone())
            .collect()
    }

    pub fn add_governing(&mut self, entry: TermEntry) {
        self.governing.get_mut().insert(entry);
    }

    pub fn is_governing(&self, entry: &TermEntry) -> bool {
        self.governing.contains(entry)
    }

    pub fn governing(&self) -> &BTreeSet<TermEntry> {
        self.governing.get()
    }

    /// Handle for a child branch. Both maps share storage until one of them
    /// records something.
    pub fn fork(&mut self) -> Self {
        DependencyMap {
            parents: self.parents.share(),
            children: self.children.share(),
            link_parents: self.link_parents.share(),
            governing: self.governing.share(),
        }
    }

    /// Governing entries a clash depends on. An empty result means the
    /// clash does not depend on any choice.
    pub fn culprits(&self, clashes: &BTreeSet<TermEntry>) -> BTreeSet<TermEntry> {
        let mut culprits = BTreeSet::new();
        for clash in clashes {
            if self.is_governing(clash) {
                culprits.insert(clash.clone());
            }
            culprits.extend(
                self.ancestors(clash)
                    .into_iter()
                    .filter(|entry| self.is_governing(entry)),
            );
        }
        culprits
    }
}
