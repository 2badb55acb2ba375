//! TBox と遅延展開 (lazy unfolding) インデックス

use crate::rbox::RBox;
use fukurow_term::Term;
use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
struct UnfoldingIndex {
    /// Descriptions every individual must satisfy
    global: BTreeSet<Term>,
    /// Class or nominal -> descriptions it implies
    unfoldable: BTreeMap<Term, BTreeSet<Term>>,
}

/// Global axioms plus the role box.
///
/// The partition into global and unfoldable descriptions is built on first
/// use and thrown away on every mutation.
#[derive(Debug, Clone, Default)]
pub struct TBox {
    axioms: BTreeSet<Term>,
    generation: u64,
    rbox: RBox,
    index: OnceCell<UnfoldingIndex>,
}

impl TBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rbox(rbox: RBox) -> Self {
        Self {
            rbox,
            ..Self::default()
        }
    }

    /// Adds an axiom; returns false if it was already present.
    pub fn add_axiom(&mut self, axiom: Term) -> bool {
        let added = self.axioms.insert(axiom);
        if added {
            self.invalidate();
        }
        added
    }

    pub fn add_subsumption(&mut self, sub: Term, sup: Term) -> bool {
        self.add_axiom(Term::implies(sub, sup))
    }

    pub fn add_equivalence(&mut self, a: Term, b: Term) -> bool {
        let forward = self.add_subsumption(a.clone(), b.clone());
        let backward = self.add_subsumption(b, a);
        forward || backward
    }

    pub fn add_disjointness(&mut self, a: Term, b: Term) -> bool {
        self.add_subsumption(a, Term::not(b))
    }

    pub fn axioms(&self) -> &BTreeSet<Term> {
        &self.axioms
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn rbox(&self) -> &RBox {
        &self.rbox
    }

    pub fn rbox_mut(&mut self) -> &mut RBox {
        self.invalidate();
        &mut self.rbox
    }

    fn invalidate(&mut self) {
        self.generation += 1;
        self.index = OnceCell::new();
    }

    fn index(&self) -> &UnfoldingIndex {
        self.index.get_or_init(|| build_index(&self.axioms))
    }

    pub fn global_descriptions(&self) -> &BTreeSet<Term> {
        &self.index().global
    }

    /// Descriptions implied by a class or nominal term, if any
    pub fn unfold(&self, term: &Term) -> Option<&BTreeSet<Term>> {
        match term {
            Term::Class(_) | Term::Nominal(_) => self.index().unfoldable.get(term),
            _ => None,
        }
    }

    /// Told subsumers reachable through unfolding alone
    pub fn told_subsumers(&self, term: &Term) -> BTreeSet<Term> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![term.normalize()];
        while let Some(current) = stack.pop() {
            let implied: Vec<Term> = match &current {
                Term::And(terms) => terms.iter().cloned().collect(),
                other => self.unfold(other).into_iter().flatten().cloned().collect(),
            };
            for next in implied {
                if seen.insert(next.clone()) {
                    stack.push(next);
                }
            }
        }
        seen
    }
}

fn build_index(axioms: &BTreeSet<Term>) -> UnfoldingIndex {
    let mut index = UnfoldingIndex::default();
    for axiom in axioms {
        match axiom {
            Term::Implies(lhs, rhs) => absorb(&mut index, lhs.normalize(), rhs),
            other => insert_global(&mut index, other.normalize()),
        }
    }
    index
}

fn absorb(index: &mut UnfoldingIndex, lhs: Term, rhs: &Term) {
    match lhs {
        Term::Class(_) | Term::Nominal(_) => {
            let rhs = rhs.normalize();
            if rhs != Term::Top {
                index.unfoldable.entry(lhs).or_default().insert(rhs);
            }
        }
        Term::Or(disjuncts) => {
            for disjunct in disjuncts {
                absorb(index, disjunct, rhs);
            }
        }
        Term::Bottom => {}
        Term::Top => insert_global(index, rhs.normalize()),
        other => insert_global(
            index,
            Term::or(vec![Term::not(other), rhs.clone()]).normalize(),
        ),
    }
}

fn insert_global(index: &mut UnfoldingIndex, term: Term) {
    if term != Term::Top {
        index.global.insert(term);
    }
}
