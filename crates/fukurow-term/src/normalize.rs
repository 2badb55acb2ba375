//! 否定標準形 (NNF) と簡約化

use crate::model::Term;
use std::collections::BTreeSet;

impl Term {
    /// Syntactic negation: strips one `Not`, swaps ⊤/⊥, otherwise wraps.
    pub fn negate(&self) -> Term {
        match self {
            Term::Top => Term::Bottom,
            Term::Bottom => Term::Top,
            Term::Not(inner) => (**inner).clone(),
            other => Term::not(other.clone()),
        }
    }

    /// Negation normal form. Implications are rewritten, negation is pushed
    /// down to atomic terms.
    pub fn to_nnf(&self) -> Term {
        match self {
            Term::Not(inner) => inner.negated_nnf(),
            Term::And(terms) => Term::And(terms.iter().map(Term::to_nnf).collect()),
            Term::Or(terms) => Term::Or(terms.iter().map(Term::to_nnf).collect()),
            Term::Some { role, filler } => Term::some(role.clone(), filler.to_nnf()),
            Term::Only { role, filler } => Term::only(role.clone(), filler.to_nnf()),
            Term::Implies(a, b) => Term::or(vec![a.negated_nnf(), b.to_nnf()]),
            atomic => atomic.clone(),
        }
    }

    /// NNF of ¬self
    fn negated_nnf(&self) -> Term {
        match self {
            Term::Top => Term::Bottom,
            Term::Bottom => Term::Top,
            Term::Not(inner) => inner.to_nnf(),
            Term::And(terms) => Term::Or(terms.iter().map(Term::negated_nnf).collect()),
            Term::Or(terms) => Term::And(terms.iter().map(Term::negated_nnf).collect()),
            Term::Some { role, filler } => Term::only(role.clone(), filler.negated_nnf()),
            Term::Only { role, filler } => Term::some(role.clone(), filler.negated_nnf()),
            Term::Implies(a, b) => Term::and(vec![a.to_nnf(), b.negated_nnf()]),
            atomic => Term::not(atomic.clone()),
        }
    }

    /// Flattens nested operators and applies the unit, absorption and
    /// complement laws bottom-up.
    pub fn simplify(&self) -> Term {
        match self {
            Term::Not(inner) => match inner.simplify() {
                Term::Top => Term::Bottom,
                Term::Bottom => Term::Top,
                Term::Not(x) => *x,
                other => Term::not(other),
            },
            Term::And(terms) => simplify_junction(terms, true),
            Term::Or(terms) => simplify_junction(terms, false),
            Term::Some { role, filler } => match filler.simplify() {
                Term::Bottom => Term::Bottom,
                filler => Term::some(role.clone(), filler),
            },
            Term::Only { role, filler } => match filler.simplify() {
                Term::Top => Term::Top,
                filler => Term::only(role.clone(), filler),
            },
            Term::Implies(a, b) => {
                let (a, b) = (a.simplify(), b.simplify());
                if a == Term::Bottom || b == Term::Top {
                    Term::Top
                } else if a == Term::Top {
                    b
                } else {
                    Term::implies(a, b)
                }
            }
            atomic => atomic.clone(),
        }
    }

    /// `to_nnf` followed by `simplify`; the form terms are stored in.
    pub fn normalize(&self) -> Term {
        self.to_nnf().simplify()
    }
}

fn simplify_junction(terms: &BTreeSet<Term>, conjunction: bool) -> Term {
    let (unit, zero) = if conjunction {
        (Term::Top, Term::Bottom)
    } else {
        (Term::Bottom, Term::Top)
    };

    let mut flat = BTreeSet::new();
    for term in terms {
        match (term.simplify(), conjunction) {
            (Term::And(inner), true) | (Term::Or(inner), false) => flat.extend(inner),
            (simplified, _) => {
                flat.insert(simplified);
            }
        }
    }
    flat.remove(&unit);

    if flat.contains(&zero) || flat.iter().any(|t| flat.contains(&t.negate())) {
        return zero;
    }

    match flat.len() {
        0 => unit,
        1 => flat.into_iter().next().unwrap_or(unit),
        _ if conjunction => Term::And(flat),
        _ => Term::Or(flat),
    }
}
