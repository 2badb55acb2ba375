//! テーブルロー規則 (completer)

use crate::abox::ABox;
use crate::consistency::find_direct_clash;
use crate::dependency::TermEntry;
use crate::node::NodeId;
use crate::rbox::RoleKind;
use crate::ReasonerError;
use fukurow_term::{Role, Term};
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// What the branch loop should do after a rule ran on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationState {
    /// Nothing that affects the remaining rules on this node
    Continue,
    /// The node changed; check it again before the next rule
    RecheckNode,
    /// The node was merged away or a successor was generated
    RecheckBranch,
    /// A clash was found; the clashing entries are in the context
    Inconsistent,
    /// The branch has nothing left to do
    Done,
}

/// Mutable state a rule works on
pub struct CompletionContext<'a> {
    pub abox: &'a mut ABox,
    /// ABoxes of alternative branches created by non-deterministic rules
    pub forks: Vec<ABox>,
    pub clashes: BTreeSet<TermEntry>,
    pub trace: bool,
}

impl<'a> CompletionContext<'a> {
    pub fn new(abox: &'a mut ABox, trace: bool) -> Self {
        Self {
            abox,
            forks: Vec::new(),
            clashes: BTreeSet::new(),
            trace,
        }
    }

    fn inconsistent(&mut self, clashes: BTreeSet<TermEntry>) -> ContinuationState {
        self.clashes.extend(clashes);
        ContinuationState::Inconsistent
    }
}

/// The tableau rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompleterKind {
    Intersection,
    Union,
    ForAll,
    RoleRestriction,
    Transitive,
    Symmetric,
    InverseAssertion,
    FunctionalMerge,
    Existential,
}

impl CompleterKind {
    /// Rules that never create nodes, in application order
    pub const NON_GENERATING: [CompleterKind; 8] = [
        CompleterKind::Intersection,
        CompleterKind::InverseAssertion,
        CompleterKind::Symmetric,
        CompleterKind::Transitive,
        CompleterKind::RoleRestriction,
        CompleterKind::ForAll,
        CompleterKind::FunctionalMerge,
        CompleterKind::Union,
    ];

    pub const GENERATING: [CompleterKind; 1] = [CompleterKind::Existential];

    pub fn is_generating(self) -> bool {
        matches!(self, CompleterKind::Existential)
    }

    pub fn complete_node(
        self,
        node: NodeId,
        ctx: &mut CompletionContext<'_>,
    ) -> Result<ContinuationState, ReasonerError> {
        let node = ctx.abox.resolve(node);
        if !ctx.abox.contains(node) {
            return Ok(ContinuationState::RecheckBranch);
        }
        let state = match self {
            CompleterKind::Intersection => complete_intersection(node, ctx),
            CompleterKind::Union => complete_union(node, ctx),
            CompleterKind::ForAll => complete_for_all(node, ctx),
            CompleterKind::RoleRestriction => complete_role_restriction(node, ctx),
            CompleterKind::Transitive => complete_transitive(node, ctx),
            CompleterKind::Symmetric => complete_symmetric(node, ctx),
            CompleterKind::InverseAssertion => complete_inverse_assertion(node, ctx),
            CompleterKind::FunctionalMerge => complete_functional_merge(node, ctx),
            CompleterKind::Existential => complete_existential(node, ctx),
        }?;
        if ctx.trace && state != ContinuationState::Continue {
            trace!(rule = ?self, %node, ?state, "completer applied");
        }
        Ok(state)
    }
}

fn terms_of(abox: &ABox, node: NodeId) -> Result<Vec<Term>, ReasonerError> {
    Ok(abox.live_node(node)?.terms().iter().cloned().collect())
}

/// Outcome after a node may have been changed or merged away
fn after_change(abox: &ABox, node: NodeId, changed: bool) -> ContinuationState {
    if !abox.contains(node) {
        ContinuationState::RecheckBranch
    } else if changed {
        ContinuationState::RecheckNode
    } else {
        ContinuationState::Continue
    }
}

fn complete_intersection(
    node: NodeId,
    ctx: &mut CompletionContext<'_>,
) -> Result<ContinuationState, ReasonerError> {
    let mut changed = false;
    for term in terms_of(ctx.abox, node)? {
        let Term::And(conjuncts) = &term else {
            continue;
        };
        let entry = TermEntry::new(node, term.clone());
        for conjunct in conjuncts {
            let info = ctx
                .abox
                .add_term(node, conjunct.clone(), [entry.clone()])?;
            changed |= info.is_changed();
            if info.is_merged() {
                return Ok(ContinuationState::RecheckBranch);
            }
        }
    }
    Ok(after_change(ctx.abox, node, changed))
}

/// `(or ..)`: nothing to do once a disjunct holds. Disjuncts that clash
/// directly with the node are excluded; a single survivor is added
/// outright, several split the branch.
fn complete_union(
    node: NodeId,
    ctx: &mut CompletionContext<'_>,
) -> Result<ContinuationState, ReasonerError> {
    for term in terms_of(ctx.abox, node)? {
        let Term::Or(disjuncts) = &term else {
            continue;
        };
        let current = ctx.abox.live_node(node)?;
        if disjuncts.iter().any(|d| current.contains_term(d)) {
            continue;
        }

        let entry = TermEntry::new(node, term.clone());
        let mut exclusions = BTreeSet::new();
        let mut candidates = Vec::new();
        for disjunct in disjuncts {
            let single = BTreeSet::from([disjunct.clone()]);
            match find_direct_clash(current.terms(), &single) {
                Some((negated, _)) => {
                    exclusions.insert(TermEntry::new(node, negated));
                }
                None => candidates.push(disjunct.clone()),
            }
        }

        let mut parents = exclusions;
        parents.insert(entry);
        match candidates.as_slice() {
            [] => return Ok(ctx.inconsistent(parents)),
            [only] => {
                let info = ctx.abox.add_term(node, only.clone(), parents)?;
                return Ok(after_change(ctx.abox, node, info.is_changed()));
            }
            [first, rest @ ..] => {
                debug!(%node, union = %term, alternatives = candidates.len(), "forking branch");
                for disjunct in rest {
                    let mut fork = ctx.abox.fork();
                    fork.dependencies_mut()
                        .add_governing(TermEntry::new(node, disjunct.clone()));
                    match fork.add_term(node, disjunct.clone(), parents.clone()) {
                        Ok(_) => ctx.forks.push(fork),
                        Err(err) if err.is_clash() => {
                            debug!(%node, disjunct = %disjunct, "alternative fails right away")
                        }
                        Err(err) => return Err(err),
                    }
                }
                ctx.abox
                    .dependencies_mut()
                    .add_governing(TermEntry::new(node, first.clone()));
                ctx.abox.add_term(node, first.clone(), parents)?;
                return Ok(after_change(ctx.abox, node, true));
            }
        }
    }
    Ok(ContinuationState::Continue)
}

/// `(only r C)`: C on every r-successor, including successors over
/// sub-roles. Over a transitive sub-role the restriction itself travels on.
fn complete_for_all(
    node: NodeId,
    ctx: &mut CompletionContext<'_>,
) -> Result<ContinuationState, ReasonerError> {
    let mut changed = false;
    for term in terms_of(ctx.abox, node)? {
        let Term::Only { role, filler } = &term else {
            continue;
        };
        let entry = TermEntry::new(node, term.clone());
        for (sub, successor) in ctx.abox.role_successor_links(node, role) {
            let mut parents = ctx.abox.link_parents(node, &sub, successor);
            parents.insert(entry.clone());

            let mut additions = vec![filler.as_ref().clone()];
            if ctx.abox.rbox().is_transitive(&sub) {
                additions.push(Term::only(sub.clone(), filler.as_ref().clone()));
            }
            for addition in additions {
                let info = ctx.abox.add_term(successor, addition, parents.clone())?;
                changed |= info.is_changed();
            }
            if !ctx.abox.contains(node) {
                return Ok(ContinuationState::RecheckBranch);
            }
        }
    }
    Ok(after_change(ctx.abox, node, changed))
}

/// Domains of outgoing links on the node, ranges on their targets
fn complete_role_restriction(
    node: NodeId,
    ctx: &mut CompletionContext<'_>,
) -> Result<ContinuationState, ReasonerError> {
    let links = successor_links(ctx.abox, node)?;
    let mut changed = false;
    for (role, target) in links {
        let domains: Vec<Term> = ctx.abox.rbox().domains(&role).cloned().collect();
        let ranges: Vec<Term> = ctx.abox.rbox().ranges(&role).cloned().collect();
        if domains.is_empty() && ranges.is_empty() {
            continue;
        }
        let parents = ctx.abox.link_parents(node, &role, target);
        for domain in domains {
            changed |= ctx.abox.add_term(node, domain, parents.clone())?.is_changed();
        }
        for range in ranges {
            changed |= ctx.abox.add_term(target, range, parents.clone())?.is_changed();
        }
        if !ctx.abox.contains(node) {
            return Ok(ContinuationState::RecheckBranch);
        }
    }
    Ok(after_change(ctx.abox, node, changed))
}

fn successor_links(abox: &ABox, node: NodeId) -> Result<Vec<(Role, NodeId)>, ReasonerError> {
    Ok(abox
        .live_node(node)?
        .successor_links()
        .map(|(role, target)| (role.clone(), target))
        .collect())
}

/// `x r y`, `y r z` gives `x r z` for transitive `r`, counting links over
/// sub-roles as `r` links
fn complete_transitive(
    node: NodeId,
    ctx: &mut CompletionContext<'_>,
) -> Result<ContinuationState, ReasonerError> {
    let roles: Vec<Role> = ctx.abox.rbox().transitive_roles().cloned().collect();
    let mut changed = false;
    for role in roles {
        for (first, middle) in ctx.abox.role_successor_links(node, &role) {
            for (second, last) in ctx.abox.role_successor_links(middle, &role) {
                let mut parents = ctx.abox.link_parents(node, &first, middle);
                parents.extend(ctx.abox.link_parents(middle, &second, last));
                changed |= ctx.abox.add_link(node, role.clone(), last, parents)?;
            }
        }
    }
    Ok(after_change(ctx.abox, node, changed))
}

fn complete_symmetric(
    node: NodeId,
    ctx: &mut CompletionContext<'_>,
) -> Result<ContinuationState, ReasonerError> {
    let mut changed = false;
    for (role, target) in successor_links(ctx.abox, node)? {
        if !ctx.abox.rbox().is_symmetric(&role) || is_datatype(ctx.abox, target) {
            continue;
        }
        let parents = ctx.abox.link_parents(node, &role, target);
        changed |= ctx.abox.add_link(target, role, node, parents)?;
    }
    Ok(after_change(ctx.abox, node, changed))
}

fn complete_inverse_assertion(
    node: NodeId,
    ctx: &mut CompletionContext<'_>,
) -> Result<ContinuationState, ReasonerError> {
    let mut changed = false;
    for (role, target) in successor_links(ctx.abox, node)? {
        if is_datatype(ctx.abox, target) {
            continue;
        }
        let inverses: Vec<Role> = ctx.abox.rbox().inverses(&role).cloned().collect();
        let parents = ctx.abox.link_parents(node, &role, target);
        for inverse in inverses {
            changed |= ctx.abox.add_link(target, inverse, node, parents.clone())?;
        }
    }
    Ok(after_change(ctx.abox, node, changed))
}

fn is_datatype(abox: &ABox, node: NodeId) -> bool {
    abox.node(node).map_or(false, |n| n.is_datatype())
}

/// Successors over a functional role collapse into one node, as do
/// predecessors over an inverse-functional role.
fn complete_functional_merge(
    node: NodeId,
    ctx: &mut CompletionContext<'_>,
) -> Result<ContinuationState, ReasonerError> {
    let (functional, inverse_functional) = {
        let current = ctx.abox.live_node(node)?;
        let rbox = ctx.abox.rbox();
        let functional: BTreeSet<Role> = current
            .successor_roles()
            .flat_map(|role| rbox.super_roles_inclusive(role))
            .filter(|role| rbox.is_functional(role))
            .collect();
        let inverse_functional: BTreeSet<Role> = current
            .predecessor_roles()
            .flat_map(|role| rbox.super_roles_inclusive(role))
            .filter(|role| rbox.is_inverse_functional(role))
            .collect();
        (functional, inverse_functional)
    };

    let mut merged = false;
    for role in functional {
        let links = ctx.abox.role_successor_links(node, &role);
        let cause: BTreeSet<TermEntry> = links
            .iter()
            .flat_map(|(sub, target)| ctx.abox.link_parents(node, sub, *target))
            .collect();
        merged |= merge_all(ctx.abox, links.into_iter().map(|(_, n)| n), cause)?;
        if !ctx.abox.contains(node) {
            return Ok(ContinuationState::RecheckBranch);
        }
    }
    for role in inverse_functional {
        let links = ctx.abox.role_predecessor_links(node, &role);
        let cause: BTreeSet<TermEntry> = links
            .iter()
            .flat_map(|(sub, source)| ctx.abox.link_parents(*source, sub, node))
            .collect();
        merged |= merge_all(ctx.abox, links.into_iter().map(|(_, n)| n), cause)?;
        if !ctx.abox.contains(node) {
            return Ok(ContinuationState::RecheckBranch);
        }
    }
    Ok(after_change(ctx.abox, node, merged))
}

fn merge_all(
    abox: &mut ABox,
    nodes: impl Iterator<Item = NodeId>,
    cause: BTreeSet<TermEntry>,
) -> Result<bool, ReasonerError> {
    let nodes: BTreeSet<NodeId> = nodes.collect();
    let mut iter = nodes.into_iter();
    let Some(mut survivor) = iter.next() else {
        return Ok(false);
    };
    let mut merged = false;
    for other in iter {
        let info = abox.merge_nodes(survivor, other, cause.clone())?;
        merged |= info.is_merged();
        survivor = info.current_node;
    }
    Ok(merged)
}

/// `(some r C)` without an r-successor carrying C creates one, unless the
/// node is blocked.
fn complete_existential(
    node: NodeId,
    ctx: &mut CompletionContext<'_>,
) -> Result<ContinuationState, ReasonerError> {
    if is_datatype(ctx.abox, node) || ctx.abox.is_blocked(node) {
        return Ok(ContinuationState::Continue);
    }
    let mut generated = false;
    for term in terms_of(ctx.abox, node)? {
        let Term::Some { role, filler } = &term else {
            continue;
        };
        let filler = filler.as_ref();
        let satisfied = ctx.abox.role_successors(node, role).into_iter().any(|successor| {
            *filler == Term::Top
                || ctx
                    .abox
                    .node(successor)
                    .map_or(false, |n| n.contains_term(filler))
        });
        if satisfied {
            continue;
        }

        let entry = TermEntry::new(node, term.clone());
        let successor = match filler {
            Term::Nominal(name) => ctx.abox.get_or_add_named_node(name, false)?,
            _ => {
                let data = ctx.abox.rbox().kind(role) == RoleKind::Data || filler.is_data();
                ctx.abox.create_node(data)?
            }
        };
        if ctx.trace {
            trace!(%node, %role, %successor, "generating successor");
        }
        ctx.abox
            .add_link(node, role.clone(), successor, [entry.clone()])?;
        ctx.abox.add_term(successor, filler.clone(), [entry])?;
        generated = true;
        if !ctx.abox.contains(node) {
            break;
        }
    }
    Ok(if generated {
        ContinuationState::RecheckBranch
    } else {
        ContinuationState::Continue
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbox::RBox;
    use crate::tbox::TBox;
    use fukurow_term::Name;

    fn run(kind: CompleterKind, abox: &mut ABox, node: NodeId) -> (ContinuationState, Vec<ABox>) {
        let mut ctx = CompletionContext::new(abox, false);
        let state = kind.complete_node(node, &mut ctx).unwrap();
        (state, ctx.forks)
    }

    #[test]
    fn test_intersection_adds_conjuncts() {
        let mut abox = ABox::new(TBox::new());
        let node = abox.create_node(false).unwrap();
        abox.add_term(node, Term::and(vec![Term::class("A"), Term::class("B")]), [])
            .unwrap();
        let (state, _) = run(CompleterKind::Intersection, &mut abox, node);
        assert_eq!(state, ContinuationState::RecheckNode);
        let terms = abox.node(node).unwrap().terms();
        assert!(terms.contains(&Term::class("A")));
        assert!(terms.contains(&Term::class("B")));
    }

    #[test]
    fn test_union_forks_per_disjunct() {
        let mut abox = ABox::new(TBox::new());
        let node = abox.create_node(false).unwrap();
        abox.add_term(node, Term::or(vec![Term::class("A"), Term::class("B")]), [])
            .unwrap();
        let (state, forks) = run(CompleterKind::Union, &mut abox, node);
        assert_eq!(state, ContinuationState::RecheckNode);
        assert_eq!(forks.len(), 1);
        assert!(abox.node(node).unwrap().contains_term(&Term::class("A")));
        assert!(forks[0].node(node).unwrap().contains_term(&Term::class("B")));
        assert!(abox
            .dependencies()
            .is_governing(&TermEntry::new(node, Term::class("A"))));
    }

    #[test]
    fn test_union_skips_excluded_disjunct() {
        let mut abox = ABox::new(TBox::new());
        let node = abox.create_node(false).unwrap();
        abox.add_term(node, Term::not(Term::class("A")), []).unwrap();
        abox.add_term(node, Term::or(vec![Term::class("A"), Term::class("B")]), [])
            .unwrap();
        let (_, forks) = run(CompleterKind::Union, &mut abox, node);
        assert!(forks.is_empty());
        assert!(abox.node(node).unwrap().contains_term(&Term::class("B")));
        assert!(abox.dependencies().governing().is_empty());
    }

    #[test]
    fn test_satisfied_union_is_a_no_op() {
        let mut abox = ABox::new(TBox::new());
        let node = abox.create_node(false).unwrap();
        abox.add_term(node, Term::class("B"), []).unwrap();
        abox.add_term(node, Term::or(vec![Term::class("A"), Term::class("B")]), [])
            .unwrap();
        let (state, forks) = run(CompleterKind::Union, &mut abox, node);
        assert_eq!(state, ContinuationState::Continue);
        assert!(forks.is_empty());
    }

    #[test]
    fn test_for_all_reaches_sub_role_successors() {
        let mut rbox = RBox::new();
        rbox.add_sub_role(Role::new("child"), Role::new("relative"))
            .unwrap();
        let mut abox = ABox::new(TBox::with_rbox(rbox));
        let x = abox.create_node(false).unwrap();
        let y = abox.create_node(false).unwrap();
        abox.add_link(x, Role::new("child"), y, []).unwrap();
        abox.add_term(x, Term::only(Role::new("relative"), Term::class("P")), [])
            .unwrap();

        run(CompleterKind::ForAll, &mut abox, x);
        assert!(abox.node(y).unwrap().contains_term(&Term::class("P")));
    }

    #[test]
    fn test_inverse_and_transitive_links() {
        let mut rbox = RBox::new();
        rbox.add_inverse_roles(Role::new("r"), Role::new("r_inv"))
            .unwrap();
        rbox.set_transitive(Role::new("r")).unwrap();
        let mut abox = ABox::new(TBox::with_rbox(rbox));
        let x = abox.create_node(false).unwrap();
        let y = abox.create_node(false).unwrap();
        let z = abox.create_node(false).unwrap();
        abox.add_link(x, Role::new("r"), y, []).unwrap();
        abox.add_link(y, Role::new("r"), z, []).unwrap();

        run(CompleterKind::InverseAssertion, &mut abox, x);
        assert!(abox.node(y).unwrap().has_successor(&Role::new("r_inv"), x));

        run(CompleterKind::Transitive, &mut abox, x);
        assert!(abox.node(x).unwrap().has_successor(&Role::new("r"), z));
    }

    #[test]
    fn test_functional_merge() {
        let mut rbox = RBox::new();
        rbox.set_functional(Role::new("r")).unwrap();
        let mut abox = ABox::new(TBox::with_rbox(rbox));
        let a = abox.get_or_add_named_node(&Name::new("a"), false).unwrap();
        let x = abox.get_or_add_named_node(&Name::new("x"), false).unwrap();
        let y = abox.get_or_add_named_node(&Name::new("y"), false).unwrap();
        abox.add_link(a, Role::new("r"), x, []).unwrap();
        abox.add_link(a, Role::new("r"), y, []).unwrap();

        let (state, _) = run(CompleterKind::FunctionalMerge, &mut abox, a);
        assert_eq!(state, ContinuationState::RecheckNode);
        assert_eq!(abox.len(), 2);
        assert_eq!(abox.resolve(y), x);
    }

    #[test]
    fn test_existential_generates_once() {
        let mut abox = ABox::new(TBox::new());
        let x = abox.get_or_add_named_node(&Name::new("x"), false).unwrap();
        let some = Term::some(Role::new("r"), Term::class("C"));
        abox.add_term(x, some, []).unwrap();

        let (state, _) = run(CompleterKind::Existential, &mut abox, x);
        assert_eq!(state, ContinuationState::RecheckBranch);
        assert_eq!(abox.len(), 2);
        let successors = abox.role_successors(x, &Role::new("r"));
        let y = *successors.iter().next().unwrap();
        assert!(abox.node(y).unwrap().contains_term(&Term::class("C")));

        let (state, _) = run(CompleterKind::Existential, &mut abox, x);
        assert_eq!(state, ContinuationState::Continue);
        assert_eq!(abox.len(), 2);
    }

    #[test]
    fn test_blocked_node_generates_nothing() {
        let mut abox = ABox::new(TBox::new());
        let root = abox.create_node(false).unwrap();
        let child = abox.create_node(false).unwrap();
        let some = Term::some(Role::new("r"), Term::class("C"));
        abox.add_term(root, some.clone(), []).unwrap();
        abox.add_term(root, Term::class("C"), []).unwrap();
        abox.add_term(child, some, []).unwrap();
        abox.add_link(root, Role::new("r"), child, []).unwrap();
        assert!(abox.is_blocked(child));

        let (state, _) = run(CompleterKind::Existential, &mut abox, child);
        assert_eq!(state, ContinuationState::Continue);
        assert_eq!(abox.len(), 2);
    }
}
