//! ABox ノード

use fukurow_term::{Name, Role, Term};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Node identifier, unique within an ABox and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Natural node order: named nodes first, then by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeOrderKey {
    pub anonymous: bool,
    pub id: NodeId,
}

/// A node of the completion graph.
///
/// Equality and hashing go by id only; `deep_eq`/`deep_hash` compare content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    id: NodeId,
    is_datatype: bool,
    names: BTreeSet<Name>,
    terms: BTreeSet<Term>,
    successors: BTreeMap<Role, BTreeSet<NodeId>>,
    predecessors: BTreeMap<Role, BTreeSet<NodeId>>,
}

impl Node {
    pub fn new(id: NodeId, is_datatype: bool) -> Self {
        Self {
            id,
            is_datatype,
            names: BTreeSet::new(),
            terms: BTreeSet::new(),
            successors: BTreeMap::new(),
            predecessors: BTreeMap::new(),
        }
    }

    pub fn named(id: NodeId, name: Name, is_datatype: bool) -> Self {
        let mut node = Self::new(id, is_datatype);
        node.names.insert(name);
        node
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn is_datatype(&self) -> bool {
        self.is_datatype
    }

    pub fn is_anonymous(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &BTreeSet<Name> {
        &self.names
    }

    pub fn primary_name(&self) -> Option<&Name> {
        self.names.first()
    }

    pub fn order_key(&self) -> NodeOrderKey {
        NodeOrderKey {
            anonymous: self.is_anonymous(),
            id: self.id,
        }
    }

    pub fn terms(&self) -> &BTreeSet<Term> {
        &self.terms
    }

    pub fn contains_term(&self, term: &Term) -> bool {
        self.terms.contains(term)
    }

    pub fn successors(&self, role: &Role) -> impl Iterator<Item = NodeId> + '_ {
        self.successors.get(role).into_iter().flatten().copied()
    }

    pub fn predecessors(&self, role: &Role) -> impl Iterator<Item = NodeId> + '_ {
        self.predecessors.get(role).into_iter().flatten().copied()
    }

    /// All outgoing `(role, target)` pairs
    pub fn successor_links(&self) -> impl Iterator<Item = (&Role, NodeId)> + '_ {
        self.successors
            .iter()
            .flat_map(|(role, targets)| targets.iter().map(move |t| (role, *t)))
    }

    /// All incoming `(role, source)` pairs
    pub fn predecessor_links(&self) -> impl Iterator<Item = (&Role, NodeId)> + '_ {
        self.predecessors
            .iter()
            .flat_map(|(role, sources)| sources.iter().map(move |s| (role, *s)))
    }

    pub fn successor_roles(&self) -> impl Iterator<Item = &Role> + '_ {
        self.successors.keys()
    }

    pub fn predecessor_roles(&self) -> impl Iterator<Item = &Role> + '_ {
        self.predecessors.keys()
    }

    pub fn has_successor(&self, role: &Role, target: NodeId) -> bool {
        self.successors
            .get(role)
            .map_or(false, |targets| targets.contains(&target))
    }

    pub fn deep_eq(&self, other: &Node) -> bool {
        self.id == other.id
            && self.is_datatype == other.is_datatype
            && self.names == other.names
            && self.terms == other.terms
            && self.successors == other.successors
            && self.predecessors == other.predecessors
    }

    pub fn deep_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.id.hash(&mut hasher);
        self.is_datatype.hash(&mut hasher);
        self.names.hash(&mut hasher);
        self.terms.hash(&mut hasher);
        self.successors.hash(&mut hasher);
        self.predecessors.hash(&mut hasher);
        hasher.finish()
    }

    pub(crate) fn insert_term(&mut self, term: Term) -> bool {
        self.terms.insert(term)
    }

    pub(crate) fn insert_name(&mut self, name: Name) -> bool {
        self.names.insert(name)
    }

    pub(crate) fn insert_successor(&mut self, role: Role, target: NodeId) -> bool {
        self.successors.entry(role).or_default().insert(target)
    }

    pub(crate) fn insert_predecessor(&mut self, role: Role, source: NodeId) -> bool {
        self.predecessors.entry(role).or_default().insert(source)
    }

    pub(crate) fn remove_successor(&mut self, role: &Role, target: NodeId) {
        if let Some(targets) = self.successors.get_mut(role) {
            targets.remove(&target);
            if targets.is_empty() {
                self.successors.remove(role);
            }
        }
    }

    pub(crate) fn remove_predecessor(&mut self, role: &Role, source: NodeId) {
        if let Some(sources) = self.predecessors.get_mut(role) {
            sources.remove(&source);
            if sources.is_empty() {
                self.predecessors.remove(role);
            }
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
