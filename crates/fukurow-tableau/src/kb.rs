//! 知識ベース (公理の集合)

use crate::abox::ABox;
use crate::rbox::RoleKind;
use crate::tbox::TBox;
use crate::ReasonerError;
use fukurow_term::{Literal, Name, Role, Term};
use serde::{Deserialize, Serialize};

/// Knowledge base axiom
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axiom {
    /// C ⊑ D
    SubClassOf(Term, Term),

    /// C1 ≡ C2 ≡ ... ≡ Cn
    EquivalentClasses(Vec<Term>),

    /// Pairwise disjoint classes
    DisjointClasses(Vec<Term>),

    /// R ⊑ S
    SubPropertyOf(Role, Role),

    EquivalentProperties(Vec<Role>),

    /// R ≡ S⁻
    InverseProperties(Role, Role),

    ObjectProperty(Role),

    DataProperty(Role),

    PropertyDomain(Role, Term),

    PropertyRange(Role, Term),

    FunctionalProperty(Role),

    InverseFunctionalProperty(Role),

    TransitiveProperty(Role),

    SymmetricProperty(Role),

    /// a : C
    ClassAssertion(Term, Name),

    /// (a, b) : R
    ObjectPropertyAssertion(Role, Name, Name),

    /// (a, v) : R
    DataPropertyAssertion(Role, Name, Literal),

    SameIndividual(Vec<Name>),

    DifferentIndividuals(Vec<Name>),
}

impl Axiom {
    /// Assertions about individuals, as opposed to terminology
    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            Axiom::ClassAssertion(..)
                | Axiom::ObjectPropertyAssertion(..)
                | Axiom::DataPropertyAssertion(..)
                | Axiom::SameIndividual(_)
                | Axiom::DifferentIndividuals(_)
        )
    }
}

/// Terminology plus assertions, from which a fresh ABox is built per query
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    tbox: TBox,
    assertions: Vec<Axiom>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_axioms(axioms: impl IntoIterator<Item = Axiom>) -> Result<Self, ReasonerError> {
        let mut kb = Self::new();
        for axiom in axioms {
            kb.add_axiom(axiom)?;
        }
        Ok(kb)
    }

    pub fn tbox(&self) -> &TBox {
        &self.tbox
    }

    pub fn assertions(&self) -> &[Axiom] {
        &self.assertions
    }

    /// Routes the axiom into the TBox, the RBox or the assertions. Role
    /// axioms that contradict the role box are rejected.
    pub fn add_axiom(&mut self, axiom: Axiom) -> Result<(), ReasonerError> {
        if axiom.is_assertion() {
            self.assertions.push(axiom);
            return Ok(());
        }
        match axiom {
            Axiom::SubClassOf(sub, sup) => {
                self.tbox.add_subsumption(sub, sup);
            }
            Axiom::EquivalentClasses(classes) => {
                if let Some((first, rest)) = classes.split_first() {
                    for other in rest {
                        self.tbox.add_equivalence(first.clone(), other.clone());
                    }
                }
            }
            Axiom::DisjointClasses(classes) => {
                for (i, a) in classes.iter().enumerate() {
                    for b in &classes[i + 1..] {
                        self.tbox.add_disjointness(a.clone(), b.clone());
                    }
                }
            }
            Axiom::SubPropertyOf(sub, sup) => self.tbox.rbox_mut().add_sub_role(sub, sup)?,
            Axiom::EquivalentProperties(roles) => {
                if let Some((first, rest)) = roles.split_first() {
                    for other in rest {
                        self.tbox
                            .rbox_mut()
                            .add_equivalent_roles(first.clone(), other.clone())?;
                    }
                }
            }
            Axiom::InverseProperties(a, b) => self.tbox.rbox_mut().add_inverse_roles(a, b)?,
            Axiom::ObjectProperty(role) => {
                self.tbox.rbox_mut().declare_role(role, RoleKind::Object)?
            }
            Axiom::DataProperty(role) => self.tbox.rbox_mut().declare_role(role, RoleKind::Data)?,
            Axiom::PropertyDomain(role, term) => self.tbox.rbox_mut().add_domain(role, term)?,
            Axiom::PropertyRange(role, term) => self.tbox.rbox_mut().add_range(role, term)?,
            Axiom::FunctionalProperty(role) => self.tbox.rbox_mut().set_functional(role)?,
            Axiom::InverseFunctionalProperty(role) => {
                self.tbox.rbox_mut().set_inverse_functional(role)?
            }
            Axiom::TransitiveProperty(role) => self.tbox.rbox_mut().set_transitive(role)?,
            Axiom::SymmetricProperty(role) => self.tbox.rbox_mut().set_symmetric(role)?,
            Axiom::ClassAssertion(..)
            | Axiom::ObjectPropertyAssertion(..)
            | Axiom::DataPropertyAssertion(..)
            | Axiom::SameIndividual(_)
            | Axiom::DifferentIndividuals(_) => {}
        }
        Ok(())
    }

    /// Builds an ABox holding the assertions. A clash while building it
    /// surfaces as an error.
    pub fn abox(&self) -> Result<ABox, ReasonerError> {
        let mut abox = ABox::new(self.tbox.clone());
        for assertion in &self.assertions {
            match assertion {
                Axiom::ClassAssertion(term, individual) => {
                    let node = abox.get_or_add_named_node(individual, false)?;
                    abox.add_term(node, term.clone(), [])?;
                }
                Axiom::ObjectPropertyAssertion(role, subject, object) => {
                    let subject = abox.get_or_add_named_node(subject, false)?;
                    let object = abox.get_or_add_named_node(object, false)?;
                    abox.add_link(subject, role.clone(), object, [])?;
                }
                Axiom::DataPropertyAssertion(role, subject, value) => {
                    let subject = abox.get_or_add_named_node(subject, false)?;
                    let value = abox.get_or_add_literal_node(value)?;
                    abox.add_link(subject, role.clone(), value, [])?;
                }
                Axiom::SameIndividual(names) => {
                    if let Some((first, rest)) = names.split_first() {
                        let node = abox.get_or_add_named_node(first, false)?;
                        for other in rest {
                            abox.add_term(node, Term::Nominal(other.clone()), [])?;
                        }
                    }
                }
                Axiom::DifferentIndividuals(names) => {
                    for a in names {
                        let node = abox.get_or_add_named_node(a, false)?;
                        for b in names.iter().filter(|b| *b != a) {
                            abox.add_term(node, Term::not(Term::Nominal(b.clone())), [])?;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(abox)
    }
}
