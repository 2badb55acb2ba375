//! ABox: 個体ノードの集合とマージ

use crate::blocking::{self, BlockingCache, BlockingStrategy};
use crate::consistency::find_direct_clash;
use crate::cow::CowCell;
use crate::dependency::{DependencyMap, LinkEntry, TermEntry};
use crate::merge::NodeMergeInfo;
use crate::node::{Node, NodeId, NodeOrderKey};
use crate::rbox::RBox;
use crate::tbox::TBox;
use crate::ReasonerError;
use fukurow_term::{Literal, Name, Role, Term};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::cell::{Cell, RefCell};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use tracing::debug;

/// The completion graph of one branch.
///
/// Nodes live in an arena keyed by [`NodeId`]; links refer to ids only.
/// Forks share storage copy-on-write and draw fresh ids from the same
/// counter, so an id names the same node in every branch of one search.
/// A clone starts its own counter where the original's stands.
#[derive(Debug)]
pub struct ABox {
    tbox: Rc<TBox>,
    nodes: CowCell<BTreeMap<NodeId, Rc<Node>>>,
    names: CowCell<BTreeMap<Name, NodeId>>,
    merged: CowCell<BTreeMap<NodeId, NodeId>>,
    ids: Rc<Cell<u64>>,
    dependencies: DependencyMap,
    blocking: RefCell<BlockingCache>,
    generating: BTreeSet<NodeOrderKey>,
    non_generating: BTreeSet<NodeOrderKey>,
}

impl ABox {
    pub fn new(tbox: TBox) -> Self {
        Self::with_tbox(Rc::new(tbox))
    }

    pub fn with_tbox(tbox: Rc<TBox>) -> Self {
        let strategy = BlockingStrategy::for_rbox(tbox.rbox());
        Self {
            tbox,
            nodes: CowCell::default(),
            names: CowCell::default(),
            merged: CowCell::default(),
            ids: Rc::new(Cell::new(0)),
            dependencies: DependencyMap::new(),
            blocking: RefCell::new(BlockingCache::new(strategy)),
            generating: BTreeSet::new(),
            non_generating: BTreeSet::new(),
        }
    }

    pub fn tbox(&self) -> &TBox {
        &self.tbox
    }

    pub fn rbox(&self) -> &RBox {
        self.tbox.rbox()
    }

    pub fn blocking_strategy(&self) -> BlockingStrategy {
        self.blocking.borrow().strategy()
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get().get(&id).map(|node| node.as_ref())
    }

    pub(crate) fn live_node(&self, id: NodeId) -> Result<&Node, ReasonerError> {
        self.node(id).ok_or(ReasonerError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, ReasonerError> {
        self.nodes
            .get_mut()
            .get_mut(&id)
            .map(Rc::make_mut)
            .ok_or(ReasonerError::UnknownNode(id))
    }

    /// Live nodes in natural order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        let named = self.nodes.values().filter(|node| !node.is_anonymous());
        let anonymous = self.nodes.values().filter(|node| node.is_anonymous());
        named.chain(anonymous).map(|node| node.as_ref())
    }

    /// Live node ids in natural order
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes().map(Node::id).collect()
    }

    pub fn order_key(&self, id: NodeId) -> Option<NodeOrderKey> {
        self.node(id).map(Node::order_key)
    }

    /// Follows the merge record to the live node `id` ended up in.
    pub fn resolve(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(next) = self.merged.get().get(&current) {
            current = *next;
        }
        current
    }

    pub fn node_by_name(&self, name: &Name) -> Option<NodeId> {
        self.names.get().get(name).map(|id| self.resolve(*id))
    }

    /// Retired node -> live node it was merged into
    pub fn merge_map(&self) -> BTreeMap<NodeId, NodeId> {
        self.merged
            .keys()
            .map(|retired| (*retired, self.resolve(*retired)))
            .collect()
    }

    pub fn dependencies(&self) -> &DependencyMap {
        &self.dependencies
    }

    pub fn dependencies_mut(&mut self) -> &mut DependencyMap {
        &mut self.dependencies
    }

    fn allocate_id(&self) -> NodeId {
        let id = self.ids.get();
        self.ids.set(id + 1);
        NodeId(id)
    }

    fn insert_node(&mut self, node: Node) {
        let id = node.id();
        self.nodes.get_mut().insert(id, Rc::new(node));
        self.touch(id);
    }

    /// Creates an anonymous node. Individuals receive the global TBox
    /// descriptions right away, which may merge them into a named node.
    pub fn create_node(&mut self, is_datatype: bool) -> Result<NodeId, ReasonerError> {
        let id = self.allocate_id();
        self.insert_node(Node::new(id, is_datatype));
        self.apply_global_descriptions(id)
    }

    pub fn get_or_add_named_node(
        &mut self,
        name: &Name,
        is_datatype: bool,
    ) -> Result<NodeId, ReasonerError> {
        if let Some(id) = self.node_by_name(name) {
            if self.live_node(id)?.is_datatype() != is_datatype {
                return Err(ReasonerError::Internal(format!(
                    "{} is already used for a node of the other kind",
                    name
                )));
            }
            return Ok(id);
        }
        let id = self.allocate_id();
        self.names.get_mut().insert(name.clone(), id);
        self.insert_node(Node::named(id, name.clone(), is_datatype));
        if is_datatype {
            return Ok(id);
        }
        let id = self.add_term(id, Term::Nominal(name.clone()), [])?.current_node;
        self.apply_global_descriptions(id)
    }

    /// Named datatype node carrying the literal
    pub fn get_or_add_literal_node(&mut self, literal: &Literal) -> Result<NodeId, ReasonerError> {
        let name = Name::new(literal.to_string());
        let id = self.get_or_add_named_node(&name, true)?;
        Ok(self.add_term(id, Term::Literal(literal.clone()), [])?.current_node)
    }

    fn apply_global_descriptions(&mut self, id: NodeId) -> Result<NodeId, ReasonerError> {
        if self.live_node(id)?.is_datatype() {
            return Ok(id);
        }
        let tbox = Rc::clone(&self.tbox);
        let mut current = id;
        for description in tbox.global_descriptions() {
            current = self.add_term(current, description.clone(), [])?.current_node;
        }
        Ok(current)
    }

    /// Adds a description to a node, unfolding it through the TBox.
    ///
    /// The term is normalized first. A nominal naming another individual
    /// merges the two nodes; the returned chain says where the node ended up.
    /// Adding a term that is already present changes nothing.
    pub fn add_term(
        &mut self,
        node: NodeId,
        term: Term,
        parents: impl IntoIterator<Item = TermEntry>,
    ) -> Result<NodeMergeInfo, ReasonerError> {
        let node = self.resolve(node);
        self.live_node(node)?;
        let tbox = Rc::clone(&self.tbox);
        let mut info = NodeMergeInfo::unchanged(node);
        let mut pending: VecDeque<(Term, BTreeSet<TermEntry>)> =
            VecDeque::from([(term.normalize(), parents.into_iter().collect())]);

        while let Some((term, parents)) = pending.pop_front() {
            if term == Term::Top {
                continue;
            }
            let current = info.current_node;
            if !self.insert_term(current, term.clone(), parents)? {
                continue;
            }
            info.record_modified(current);
            let entry = TermEntry::new(current, term.clone());

            if let Some(implied) = tbox.unfold(&term) {
                for description in implied {
                    pending.push_back((description.clone(), BTreeSet::from([entry.clone()])));
                }
            }

            if let Term::Nominal(name) = &term {
                let individual = self.get_or_add_named_node(name, false)?;
                let current = self.resolve(current);
                if individual != current {
                    let merge = self.merge_nodes(current, individual, BTreeSet::from([entry]))?;
                    info.append(merge)?;
                }
            }
        }
        Ok(info)
    }

    /// Alias of [`ABox::add_term`] under its tableau name.
    pub fn add_unfolded_description(
        &mut self,
        node: NodeId,
        term: Term,
        parents: impl IntoIterator<Item = TermEntry>,
    ) -> Result<NodeMergeInfo, ReasonerError> {
        self.add_term(node, term, parents)
    }

    fn insert_term(
        &mut self,
        node: NodeId,
        term: Term,
        parents: BTreeSet<TermEntry>,
    ) -> Result<bool, ReasonerError> {
        if self.live_node(node)?.contains_term(&term) {
            return Ok(false);
        }
        self.node_mut(node)?.insert_term(term.clone());
        self.dependencies.add(TermEntry::new(node, term), parents);
        self.touch(node);
        Ok(true)
    }

    /// Adds `source -role-> target`; returns false if the link exists.
    pub fn add_link(
        &mut self,
        source: NodeId,
        role: Role,
        target: NodeId,
        parents: impl IntoIterator<Item = TermEntry>,
    ) -> Result<bool, ReasonerError> {
        let (source, target) = (self.resolve(source), self.resolve(target));
        let source_node = self.live_node(source)?;
        if source_node.is_datatype() {
            return Err(ReasonerError::Internal(format!(
                "datatype node {} cannot have {} successors",
                source, role
            )));
        }
        if source_node.has_successor(&role, target) {
            return Ok(false);
        }
        self.live_node(target)?;
        self.insert_link(source, role, target, parents.into_iter().collect())?;
        Ok(true)
    }

    fn insert_link(
        &mut self,
        source: NodeId,
        role: Role,
        target: NodeId,
        parents: BTreeSet<TermEntry>,
    ) -> Result<(), ReasonerError> {
        self.node_mut(source)?.insert_successor(role.clone(), target);
        self.node_mut(target)?.insert_predecessor(role.clone(), source);
        self.dependencies
            .add_link(LinkEntry::new(source, role.clone(), target), parents);
        self.touch(source);
        self.touch(target);
        self.requeue_transitive_predecessors(source, &role);
        Ok(())
    }

    /// A new `source -role-> _` link extends every chain through a
    /// transitive super-role that ends in `source`; the nodes starting
    /// those chains go back on the non-generating queue.
    fn requeue_transitive_predecessors(&mut self, source: NodeId, role: &Role) {
        let rbox = self.tbox.rbox();
        let predecessors: Vec<NodeId> = rbox
            .super_roles_inclusive(role)
            .iter()
            .filter(|sup| rbox.is_transitive(sup))
            .flat_map(|sup| self.role_predecessor_links(source, sup))
            .map(|(_, predecessor)| predecessor)
            .filter(|predecessor| *predecessor != source)
            .collect();
        for predecessor in predecessors {
            if let Some(key) = self.order_key(predecessor) {
                self.non_generating.insert(key);
            }
        }
    }

    pub fn link_parents(&self, source: NodeId, role: &Role, target: NodeId) -> BTreeSet<TermEntry> {
        self.dependencies
            .link_parents(&LinkEntry::new(source, role.clone(), target))
    }

    /// Successors of `node` over `role` and all of its sub-roles, with the
    /// role each link actually carries
    pub fn role_successor_links(&self, node: NodeId, role: &Role) -> Vec<(Role, NodeId)> {
        let Some(node) = self.node(node) else {
            return Vec::new();
        };
        self.rbox()
            .sub_roles_inclusive(role)
            .into_iter()
            .flat_map(|sub| {
                node.successors(&sub)
                    .map(|target| (sub.clone(), target))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn role_successors(&self, node: NodeId, role: &Role) -> BTreeSet<NodeId> {
        self.role_successor_links(node, role)
            .into_iter()
            .map(|(_, target)| target)
            .collect()
    }

    /// Predecessors of `node` over `role` and all of its sub-roles
    pub fn role_predecessor_links(&self, node: NodeId, role: &Role) -> Vec<(Role, NodeId)> {
        let Some(node) = self.node(node) else {
            return Vec::new();
        };
        self.rbox()
            .sub_roles_inclusive(role)
            .into_iter()
            .flat_map(|sub| {
                node.predecessors(&sub)
                    .map(|source| (sub.clone(), source))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Merges two nodes into the earlier of them in natural order.
    ///
    /// Terms, names and links of the later node move to the earlier one,
    /// each depending on its old entry and on `cause`. The later node is
    /// retired and only reachable through [`ABox::resolve`].
    pub fn merge_nodes(
        &mut self,
        a: NodeId,
        b: NodeId,
        cause: BTreeSet<TermEntry>,
    ) -> Result<NodeMergeInfo, ReasonerError> {
        let (a, b) = (self.resolve(a), self.resolve(b));
        if a == b {
            return Ok(NodeMergeInfo::unchanged(a));
        }
        let (key_a, key_b) = (
            self.live_node(a)?.order_key(),
            self.live_node(b)?.order_key(),
        );
        let (target, source) = if key_a <= key_b { (a, b) } else { (b, a) };
        let source_node = self
            .nodes
            .get()
            .get(&source)
            .cloned()
            .ok_or(ReasonerError::UnknownNode(source))?;
        let target_node = self.live_node(target)?;

        if target_node.is_datatype() != source_node.is_datatype() {
            return Err(ReasonerError::NodeMerge {
                target,
                merged: source,
                culprits: cause,
            });
        }
        if let Some((negated, term)) = find_direct_clash(target_node.terms(), source_node.terms()) {
            let mut culprits = cause;
            culprits.insert(TermEntry::new(target, negated.clone()));
            culprits.insert(TermEntry::new(source, negated));
            culprits.insert(TermEntry::new(source, term));
            return Err(ReasonerError::NodeMerge {
                target,
                merged: source,
                culprits,
            });
        }

        debug!(%target, merged = %source, "merging nodes");
        let mut info = NodeMergeInfo {
            initial_node: a,
            current_node: target,
            merged_nodes: BTreeSet::from([source]),
            modified_nodes: BTreeSet::from([target]),
        };

        let outgoing: Vec<(Role, NodeId)> = source_node
            .successor_links()
            .map(|(role, node)| (role.clone(), node))
            .collect();
        let incoming: Vec<(Role, NodeId)> = source_node
            .predecessor_links()
            .map(|(role, node)| (role.clone(), node))
            .collect();

        self.nodes.get_mut().remove(&source);
        self.merged.get_mut().insert(source, target);
        for queue in [&mut self.generating, &mut self.non_generating] {
            queue.remove(&source_node.order_key());
        }

        for name in source_node.names() {
            self.node_mut(target)?.insert_name(name.clone());
            self.names.get_mut().insert(name.clone(), target);
        }
        for term in source_node.terms() {
            let mut parents = cause.clone();
            parents.insert(TermEntry::new(source, term.clone()));
            self.insert_term(target, term.clone(), parents)?;
        }
        for (role, node) in outgoing {
            let mut parents = self.link_parents(source, &role, node);
            parents.extend(cause.iter().cloned());
            let node = if node == source {
                target
            } else {
                self.node_mut(node)?.remove_predecessor(&role, source);
                node
            };
            self.relink(target, role, node, parents)?;
            info.record_modified(node);
        }
        for (role, node) in incoming {
            if node == source {
                continue;
            }
            let mut parents = self.link_parents(node, &role, source);
            parents.extend(cause.iter().cloned());
            self.node_mut(node)?.remove_successor(&role, source);
            self.relink(node, role, target, parents)?;
            info.record_modified(node);
        }
        self.touch(target);
        Ok(info)
    }

    fn relink(
        &mut self,
        source: NodeId,
        role: Role,
        target: NodeId,
        parents: BTreeSet<TermEntry>,
    ) -> Result<(), ReasonerError> {
        if self.live_node(source)?.has_successor(&role, target) {
            self.touch(source);
            self.touch(target);
            Ok(())
        } else {
            self.insert_link(source, role, target, parents)
        }
    }

    /// Marks a node as changed: it is queued for both rule passes and
    /// blocking state from its position on is forgotten. Nodes that were
    /// blocked from there on are queued for generation again.
    pub fn touch(&mut self, node: NodeId) {
        let Some(key) = self.order_key(node) else {
            return;
        };
        self.generating.insert(key);
        self.non_generating.insert(key);
        for released in self.blocking.get_mut().invalidate_from(key) {
            if self.contains(released.id) {
                self.generating.insert(released);
            }
        }
    }

    pub fn next_generating_node(&mut self) -> Option<NodeId> {
        while let Some(key) = self.generating.pop_first() {
            if self.contains(key.id) {
                return Some(key.id);
            }
        }
        None
    }

    pub fn next_non_generating_node(&mut self) -> Option<NodeId> {
        while let Some(key) = self.non_generating.pop_first() {
            if self.contains(key.id) {
                return Some(key.id);
            }
        }
        None
    }

    pub fn has_pending_work(&self) -> bool {
        !self.generating.is_empty() || !self.non_generating.is_empty()
    }

    pub fn is_blocked(&self, node: NodeId) -> bool {
        self.blocker(node).is_some()
    }

    pub fn blocker(&self, node: NodeId) -> Option<NodeId> {
        let key = self.order_key(node)?;
        if let Some(cached) = self.blocking.borrow().get(&key) {
            return cached;
        }
        let found = blocking::find_blocker(self, node);
        self.blocking.borrow_mut().insert(key, found);
        found
    }

    /// Nodes blocked by `blocker`. Only anonymous nodes after the blocker in
    /// natural order can be blocked by it.
    pub fn blocked_node_ids(&self, blocker: NodeId) -> BTreeSet<NodeId> {
        let Some(key) = self.order_key(blocker) else {
            return BTreeSet::new();
        };
        if !key.anonymous {
            return BTreeSet::new();
        }
        self.nodes
            .range(blocker..)
            .skip(1)
            .filter(|(_, node)| node.is_anonymous() && !node.is_datatype())
            .map(|(id, _)| *id)
            .filter(|id| self.blocker(*id) == Some(blocker))
            .collect()
    }

    /// Re-evaluates blocking from `node` on; returns the nodes that were
    /// blocked before and no longer are. Those are queued for generation.
    pub fn validate_blocks(&mut self, node: NodeId) -> BTreeSet<NodeId> {
        let Some(key) = self.order_key(node) else {
            return BTreeSet::new();
        };
        let released = self.blocking.get_mut().invalidate_from(key);
        let mut unblocked = BTreeSet::new();
        for key in released {
            if self.contains(key.id) && !self.is_blocked(key.id) {
                self.generating.insert(key);
                unblocked.insert(key.id);
            }
        }
        unblocked
    }

    /// Applies lazy unfolding and the global descriptions to every node.
    pub fn unfold_all(&mut self) -> Result<(), ReasonerError> {
        let tbox = Rc::clone(&self.tbox);
        for id in self.node_ids() {
            let id = self.resolve(id);
            let terms: Vec<Term> = self.live_node(id)?.terms().iter().cloned().collect();
            let mut current = id;
            for term in terms {
                for implied in tbox.unfold(&term).into_iter().flatten() {
                    let entry = TermEntry::new(current, term.clone());
                    current = self.add_term(current, implied.clone(), [entry])?.current_node;
                }
            }
            self.apply_global_descriptions(current)?;
        }
        Ok(())
    }

    /// Copy sharing node storage with `self` until either side writes.
    pub fn fork(&mut self) -> ABox {
        ABox {
            tbox: Rc::clone(&self.tbox),
            nodes: self.nodes.share(),
            names: self.names.share(),
            merged: self.merged.share(),
            ids: Rc::clone(&self.ids),
            dependencies: self.dependencies.fork(),
            blocking: RefCell::new(self.blocking.get_mut().fork()),
            generating: self.generating.clone(),
            non_generating: self.non_generating.clone(),
        }
    }

    /// Hash over the content of every live node
    pub fn deep_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for node in self.nodes.values() {
            node.deep_hash().hash(&mut hasher);
        }
        self.merged.get().hash(&mut hasher);
        hasher.finish()
    }

    pub fn deep_eq(&self, other: &ABox) -> bool {
        self.len() == other.len()
            && self.merged.get() == other.merged.get()
            && self
                .nodes
                .values()
                .zip(other.nodes.values())
                .all(|(a, b)| a.deep_eq(b))
    }
}

impl Clone for ABox {
    fn clone(&self) -> Self {
        ABox {
            tbox: Rc::clone(&self.tbox),
            nodes: self.nodes.clone(),
            names: self.names.clone(),
            merged: self.merged.clone(),
            ids: Rc::new(Cell::new(self.ids.get())),
            dependencies: self.dependencies.clone(),
            blocking: self.blocking.clone(),
            generating: self.generating.clone(),
            non_generating: self.non_generating.clone(),
        }
    }
}

impl Serialize for ABox {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let nodes: Vec<&Node> = self.nodes().collect();
        let merged: Vec<(NodeId, NodeId)> = self.merge_map().into_iter().collect();
        let mut state = serializer.serialize_struct("ABox", 2)?;
        state.serialize_field("nodes", &nodes)?;
        state.serialize_field("merged", &merged)?;
        state.end()
    }
}
