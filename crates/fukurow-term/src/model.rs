//! DL 項データモデル

use crate::datatype::{DataRange, Literal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Name of a class, individual or role
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Name(pub String);

impl Name {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Role (object or data property) reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Role(pub Name);

impl Role {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Name::new(s))
    }

    pub fn name(&self) -> &Name {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Concept expression
///
/// Operands of `And`/`Or` are kept in ordered sets, so two expressions that
/// differ only in operand order are the same term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    /// ⊤
    Top,

    /// ⊥
    Bottom,

    /// Named class
    Class(Name),

    /// Nominal {a}
    Nominal(Name),

    /// Data value
    Literal(Literal),

    /// Data range (datatype, enumeration or facet range)
    DataRange(DataRange),

    /// ¬C
    Not(Box<Term>),

    /// C1 ⊓ ... ⊓ Cn
    And(BTreeSet<Term>),

    /// C1 ⊔ ... ⊔ Cn
    Or(BTreeSet<Term>),

    /// ∃R.C
    Some { role: Role, filler: Box<Term> },

    /// ∀R.C
    Only { role: Role, filler: Box<Term> },

    /// C → D, used for axioms
    Implies(Box<Term>, Box<Term>),
}

impl Term {
    pub fn class(name: impl Into<String>) -> Self {
        Term::Class(Name::new(name))
    }

    pub fn nominal(name: impl Into<String>) -> Self {
        Term::Nominal(Name::new(name))
    }

    pub fn literal(literal: Literal) -> Self {
        Term::Literal(literal)
    }

    pub fn data_range(range: DataRange) -> Self {
        Term::DataRange(range)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(term: Term) -> Self {
        Term::Not(Box::new(term))
    }

    pub fn and(terms: impl IntoIterator<Item = Term>) -> Self {
        Term::And(terms.into_iter().collect())
    }

    pub fn or(terms: impl IntoIterator<Item = Term>) -> Self {
        Term::Or(terms.into_iter().collect())
    }

    pub fn some(role: Role, filler: Term) -> Self {
        Term::Some {
            role,
            filler: Box::new(filler),
        }
    }

    pub fn only(role: Role, filler: Term) -> Self {
        Term::Only {
            role,
            filler: Box::new(filler),
        }
    }

    pub fn implies(antecedent: Term, consequent: Term) -> Self {
        Term::Implies(Box::new(antecedent), Box::new(consequent))
    }

    /// Atomic terms: ⊤, ⊥, classes, nominals, literals and data ranges
    pub fn is_atomic(&self) -> bool {
        matches!(
            self,
            Term::Top
                | Term::Bottom
                | Term::Class(_)
                | Term::Nominal(_)
                | Term::Literal(_)
                | Term::DataRange(_)
        )
    }

    /// Terms that only make sense on data values, negated or not
    pub fn is_data(&self) -> bool {
        match self {
            Term::Literal(_) | Term::DataRange(_) => true,
            Term::Not(inner) => inner.is_data(),
            _ => false,
        }
    }

    /// Terms that only make sense on individuals
    pub fn is_individual(&self) -> bool {
        matches!(
            self,
            Term::Class(_) | Term::Nominal(_) | Term::Some { .. }
        )
    }

    /// Roles mentioned anywhere in the term
    pub fn roles(&self) -> BTreeSet<Role> {
        let mut roles = BTreeSet::new();
        self.collect_roles(&mut roles);
        roles
    }

    fn collect_roles(&self, roles: &mut BTreeSet<Role>) {
        match self {
            Term::Not(inner) => inner.collect_roles(roles),
            Term::And(terms) | Term::Or(terms) => {
                for term in terms {
                    term.collect_roles(roles);
                }
            }
            Term::Some { role, filler } | Term::Only { role, filler } => {
                roles.insert(role.clone());
                filler.collect_roles(roles);
            }
            Term::Implies(a, b) => {
                a.collect_roles(roles);
                b.collect_roles(roles);
            }
            _ => {}
        }
    }
}

fn write_operands(f: &mut fmt::Formatter<'_>, op: &str, terms: &BTreeSet<Term>) -> fmt::Result {
    write!(f, "({}", op)?;
    for term in terms {
        write!(f, " {}", term)?;
    }
    write!(f, ")")
}

/// KRSS 風の S 式
impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Top => write!(f, "*top*"),
            Term::Bottom => write!(f, "*bottom*"),
            Term::Class(name) => write!(f, "{}", name),
            Term::Nominal(name) => write!(f, "(one-of {})", name),
            Term::Literal(literal) => write!(f, "{}", literal),
            Term::DataRange(range) => write!(f, "{}", range),
            Term::Not(inner) => write!(f, "(not {})", inner),
            Term::And(terms) => write_operands(f, "and", terms),
            Term::Or(terms) => write_operands(f, "or", terms),
            Term::Some { role, filler } => write!(f, "(some {} {})", role, filler),
            Term::Only { role, filler } => write!(f, "(only {} {})", role, filler),
            Term::Implies(a, b) => write!(f, "(implies {} {})", a, b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_order_is_irrelevant() {
        let a = Term::and(vec![Term::class("A"), Term::class("B")]);
        let b = Term::and(vec![Term::class("B"), Term::class("A")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_display_krss() {
        let term = Term::and(vec![
            Term::class("A"),
            Term::some(Role::new("r"), Term::not(Term::class("C"))),
        ]);
        assert_eq!(term.to_string(), "(and A (some r (not C)))");
        assert_eq!(Term::Top.to_string(), "*top*");
        assert_eq!(Term::nominal("a").to_string(), "(one-of a)");
    }

    #[test]
    fn test_roles_collected() {
        let term = Term::implies(
            Term::some(Role::new("r"), Term::Top),
            Term::only(Role::new("s"), Term::some(Role::new("t"), Term::class("C"))),
        );
        let roles: Vec<String> = term.roles().iter().map(|r| r.to_string()).collect();
        assert_eq!(roles, vec!["r", "s", "t"]);
    }

    #[test]
    fn test_serde_roundtrip() {
        let term = Term::only(Role::new("r"), Term::or(vec![Term::class("A"), Term::Bottom]));
        let json = serde_json::to_string(&term).unwrap();
        let back: Term = serde_json::from_str(&json).unwrap();
        assert_eq!(term, back);
    }
}
