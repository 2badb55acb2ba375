//! ノード単位の無矛盾性検査

use crate::abox::ABox;
use crate::dependency::TermEntry;
use crate::node::{Node, NodeId};
use crate::rbox::RBox;
use crate::ReasonerError;
use fukurow_term::{DataRange, Datatype, Literal, LiteralValue, Role, Term};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::trace;

/// Outcome of a consistency check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyInfo {
    pub finally_inconsistent: bool,
    /// Entries taking part in the clash
    pub clashes: BTreeSet<TermEntry>,
}

impl ConsistencyInfo {
    pub fn consistent() -> Self {
        Self::default()
    }

    pub fn inconsistent(clashes: BTreeSet<TermEntry>) -> Self {
        Self {
            finally_inconsistent: true,
            clashes,
        }
    }

    pub fn is_consistent(&self) -> bool {
        !self.finally_inconsistent
    }

    pub fn merge(&mut self, other: ConsistencyInfo) {
        self.finally_inconsistent |= other.finally_inconsistent;
        self.clashes.extend(other.clashes);
    }
}

/// A term of `extra` that is ⊥ or whose negation is in `base` or `extra`.
/// Returns `(negation, term)`.
pub fn find_direct_clash(base: &BTreeSet<Term>, extra: &BTreeSet<Term>) -> Option<(Term, Term)> {
    extra.iter().find_map(|term| {
        if *term == Term::Bottom {
            return Some((Term::Bottom, Term::Bottom));
        }
        let negated = term.negate();
        (base.contains(&negated) || extra.contains(&negated)).then(|| (negated, term.clone()))
    })
}

/// Checks a single node: direct clashes, datatype validity and
/// functional-role cardinality.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeConsistencyChecker {
    trace: bool,
}

impl NodeConsistencyChecker {
    pub fn new(trace: bool) -> Self {
        Self { trace }
    }

    /// Full check of one node. Clashes are reported in the returned info;
    /// only lookup failures are errors.
    pub fn check_node(&self, abox: &ABox, node: NodeId) -> Result<ConsistencyInfo, ReasonerError> {
        let info = match self.validate_node(abox, node) {
            Ok(()) => ConsistencyInfo::consistent(),
            Err(err) if err.is_clash() => ConsistencyInfo::inconsistent(err.clash_entries()),
            Err(err) => return Err(err),
        };
        if self.trace {
            trace!(
                %node,
                consistent = info.is_consistent(),
                clashes = info.clashes.len(),
                "node consistency check"
            );
        }
        Ok(info)
    }

    /// Like [`NodeConsistencyChecker::check_node`], reporting the first
    /// clash as an error.
    pub fn validate_node(&self, abox: &ABox, node: NodeId) -> Result<(), ReasonerError> {
        let current = abox.live_node(node)?;
        self.validate_terms(node, current.terms())?;
        self.validate_kind(current)?;
        if current.is_datatype() {
            self.validate_data_values(current)?;
        }
        self.validate_role_cardinality(abox, current)
    }

    /// Direct clash between the terms of a node and extra terms about to be
    /// added to it
    pub fn check_terms(
        &self,
        node: NodeId,
        base: &BTreeSet<Term>,
        extra: &BTreeSet<Term>,
    ) -> ConsistencyInfo {
        match find_direct_clash(base, extra) {
            Some((negated, term)) => {
                ConsistencyInfo::inconsistent(BTreeSet::from([
                    TermEntry::new(node, negated),
                    TermEntry::new(node, term),
                ]))
            }
            None => ConsistencyInfo::consistent(),
        }
    }

    fn validate_terms(&self, node: NodeId, terms: &BTreeSet<Term>) -> Result<(), ReasonerError> {
        match find_direct_clash(terms, terms) {
            Some((negated, term)) => Err(ReasonerError::TermClash {
                node,
                clashes: BTreeSet::from([TermEntry::new(node, negated), TermEntry::new(node, term)]),
            }),
            None => Ok(()),
        }
    }

    /// Data terms on individuals and individual terms on data values
    fn validate_kind(&self, node: &Node) -> Result<(), ReasonerError> {
        let misplaced = node.terms().iter().find(|term| {
            if node.is_datatype() {
                term.is_individual()
            } else {
                matches!(term, Term::Literal(_) | Term::DataRange(_))
            }
        });
        match misplaced {
            Some(term) => Err(ReasonerError::InconsistentNode {
                node: node.id(),
                reason: format!("{} does not fit a {} node", term, kind_name(node)),
                clashes: BTreeSet::from([TermEntry::new(node.id(), term.clone())]),
            }),
            None => Ok(()),
        }
    }

    /// Some value must satisfy every literal and data range on the node
    fn validate_data_values(&self, node: &Node) -> Result<(), ReasonerError> {
        let mut literals: Vec<&Literal> = Vec::new();
        let mut ranges: Vec<&DataRange> = Vec::new();
        let mut excluded_literals: Vec<&Literal> = Vec::new();
        let mut excluded_ranges: Vec<&DataRange> = Vec::new();
        for term in node.terms() {
            match term {
                Term::Literal(literal) => literals.push(literal),
                Term::DataRange(range) => ranges.push(range),
                Term::Not(inner) => match inner.as_ref() {
                    Term::Literal(literal) => excluded_literals.push(literal),
                    Term::DataRange(range) => excluded_ranges.push(range),
                    _ => {}
                },
                _ => {}
            }
        }

        let fail = |reason: &str| -> Result<(), ReasonerError> {
            Err(ReasonerError::InconsistentNode {
                node: node.id(),
                reason: reason.to_string(),
                clashes: node
                    .terms()
                    .iter()
                    .filter(|term| term.is_data())
                    .map(|term| TermEntry::new(node.id(), term.clone()))
                    .collect(),
            })
        };

        let mut values = Vec::with_capacity(literals.len());
        for literal in &literals {
            values.push(literal.value()?);
        }

        let candidates: Vec<LiteralValue> = if let Some(first) = values.first() {
            if values.iter().any(|value| !value.same_value(first)) {
                return fail("literals with different values");
            }
            vec![first.clone()]
        } else if let Some(DataRange::OneOf(enumerated)) =
            ranges.iter().find(|range| matches!(range, DataRange::OneOf(_)))
        {
            enumerated
                .iter()
                .filter_map(|literal| literal.value().ok())
                .collect()
        } else {
            return match open_range_is_empty(&ranges, &excluded_ranges) {
                Some(reason) => fail(reason),
                None => Ok(()),
            };
        };

        let admissible = candidates.iter().any(|value| {
            ranges.iter().all(|range| range.contains(value))
                && !excluded_ranges.iter().any(|range| range.contains(value))
                && !excluded_literals.iter().any(|literal| {
                    literal
                        .value()
                        .map_or(false, |excluded| excluded.same_value(value))
                })
        });
        if admissible {
            Ok(())
        } else {
            fail("no value satisfies the data ranges")
        }
    }

    /// At most one successor per functional role and one predecessor per
    /// inverse-functional role, unless the surplus nodes can still be merged
    fn validate_role_cardinality(&self, abox: &ABox, node: &Node) -> Result<(), ReasonerError> {
        let rbox = abox.rbox();
        let id = node.id();

        for role in restricted_roles(rbox, node.successor_roles(), RBox::is_functional) {
            let links = abox.role_successor_links(id, &role);
            let targets: BTreeSet<NodeId> = links.iter().map(|(_, target)| *target).collect();
            if targets.len() > 1 && !mergeable(abox, &targets) {
                let mut clashes = BTreeSet::new();
                for (sub, target) in &links {
                    clashes.extend(abox.link_parents(id, sub, *target));
                    clashes.extend(data_entries(abox, *target));
                }
                return Err(ReasonerError::RoleCardinality {
                    node: id,
                    role,
                    clashes,
                });
            }
        }

        for role in restricted_roles(rbox, node.predecessor_roles(), RBox::is_inverse_functional) {
            let links = abox.role_predecessor_links(id, &role);
            let sources: BTreeSet<NodeId> = links.iter().map(|(_, source)| *source).collect();
            if sources.len() > 1 && !mergeable(abox, &sources) {
                let clashes = links
                    .iter()
                    .flat_map(|(sub, source)| abox.link_parents(*source, sub, id))
                    .collect();
                return Err(ReasonerError::RoleCardinality {
                    node: id,
                    role,
                    clashes,
                });
            }
        }
        Ok(())
    }
}

fn kind_name(node: &Node) -> &'static str {
    if node.is_datatype() {
        "datatype"
    } else {
        "individual"
    }
}

/// Roles carrying `flag` among the given link roles and their super-roles
fn restricted_roles<'a>(
    rbox: &RBox,
    link_roles: impl Iterator<Item = &'a Role>,
    flag: fn(&RBox, &Role) -> bool,
) -> BTreeSet<Role> {
    link_roles
        .flat_map(|role| rbox.super_roles_inclusive(role))
        .filter(|role| flag(rbox, role))
        .collect()
}

fn data_entries(abox: &ABox, node: NodeId) -> Vec<TermEntry> {
    abox.node(node)
        .map(|n| {
            n.terms()
                .iter()
                .filter(|term| term.is_data())
                .map(|term| TermEntry::new(node, term.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Whether the functional-merge rule could still identify these nodes
pub(crate) fn mergeable(abox: &ABox, ids: &BTreeSet<NodeId>) -> bool {
    let nodes: Vec<&Node> = ids.iter().filter_map(|id| abox.node(*id)).collect();
    let Some(first) = nodes.first() else {
        return true;
    };
    if nodes.iter().any(|n| n.is_datatype() != first.is_datatype()) {
        return false;
    }
    if !first.is_datatype() {
        return true;
    }
    let values: Vec<LiteralValue> = nodes
        .iter()
        .flat_map(|n| n.terms().iter())
        .filter_map(|term| match term {
            Term::Literal(literal) => literal.value().ok(),
            _ => None,
        })
        .collect();
    match values.first() {
        Some(first) => values.iter().all(|value| value.same_value(first)),
        None => true,
    }
}

/// Emptiness of an intersection of datatype and integer ranges without
/// enumerations
fn open_range_is_empty(ranges: &[&DataRange], excluded: &[&DataRange]) -> Option<&'static str> {
    let mut datatype: Option<Datatype> = None;
    let (mut low, mut high): (Option<i64>, Option<i64>) = (None, None);

    for range in ranges {
        let Some(base) = range.base_datatype() else {
            continue;
        };
        datatype = match datatype {
            None => Some(base),
            Some(current) if base.is_subtype_of(&current) => Some(base),
            Some(current) if current.is_subtype_of(&base) => Some(current),
            Some(_) => return Some("disjoint datatypes"),
        };
        if let DataRange::IntegerRange { min, max } = range {
            low = low.max(*min);
            high = match (high, max) {
                (Some(h), Some(m)) => Some(h.min(*m)),
                (h, m) => h.or(*m),
            };
        }
    }

    if let (Some(low), Some(high)) = (low, high) {
        if low > high {
            return Some("empty integer range");
        }
    }
    if let Some(datatype) = datatype {
        let whole_space_excluded = excluded.iter().any(|range| {
            matches!(range, DataRange::Datatype(excluded) if datatype.is_subtype_of(excluded))
        });
        if whole_space_excluded {
            return Some("value space excluded");
        }
    }
    None
}
