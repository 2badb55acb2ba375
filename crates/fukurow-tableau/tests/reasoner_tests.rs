//! Tests for the fukurow-tableau crate

use fukurow_tableau::*;
use fukurow_term::{DataRange, Literal, Name, Role, Term};
use std::collections::BTreeSet;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn c(name: &str) -> Term {
    Term::class(name)
}

fn r(name: &str) -> Role {
    Role::new(name)
}

fn bounded_reasoner() -> Reasoner {
    Reasoner::with_options(ReasonerOptions::default().with_step_limit(10_000))
}

fn successors(abox: &ABox, node: NodeId, role: &Role) -> Vec<NodeId> {
    abox.node(node)
        .map(|node| node.successors(role).collect())
        .unwrap_or_default()
}

#[test]
fn test_merge_target_is_earliest_node() {
    let mut abox = ABox::new(TBox::new());
    let x = abox.create_node(false).unwrap();
    let y = abox.create_node(false).unwrap();
    let a = abox.get_or_add_named_node(&Name::new("a"), false).unwrap();

    let info = abox.merge_nodes(y, x, BTreeSet::new()).unwrap();
    assert_eq!(info.current_node, x);
    assert!(!abox.contains(y));

    let info = abox.merge_nodes(x, a, BTreeSet::new()).unwrap();
    assert_eq!(info.current_node, a);
    assert!(!abox.contains(x));
    assert_eq!(abox.resolve(y), a);
}

#[test]
fn test_multi_union_branching() {
    init_tracing();
    let mut abox = ABox::new(TBox::new());
    let node = abox.create_node(false).unwrap();
    for i in 0..3 {
        let union = Term::or(vec![c(&format!("A{}", i)), c(&format!("B{}", i))]);
        abox.add_term(node, union, []).unwrap();
    }
    let models = Reasoner::new().check_consistency(&abox, false).unwrap();
    assert_eq!(models.len(), 8);
}

#[test]
fn test_functional_role_merge() {
    let mut rbox = RBox::new();
    rbox.set_functional(r("r")).unwrap();
    let mut abox = ABox::new(TBox::with_rbox(rbox));
    let a = abox.get_or_add_named_node(&Name::new("a"), false).unwrap();
    let x = abox.get_or_add_named_node(&Name::new("x"), false).unwrap();
    let y = abox.get_or_add_named_node(&Name::new("y"), false).unwrap();
    abox.add_link(a, r("r"), x, []).unwrap();
    abox.add_link(a, r("r"), y, []).unwrap();

    let models = Reasoner::new().check_consistency(&abox, false).unwrap();
    assert!(!models.is_empty());
    for model in &models {
        assert_eq!(model.abox().len(), 2);
    }
}

#[test]
fn test_implication_from_union_is_satisfiable() {
    let mut tbox = TBox::new();
    tbox.add_subsumption(Term::or(vec![c("A"), c("B")]), Term::some(r("r"), c("C")));
    let mut abox = ABox::new(tbox);
    let node = abox.create_node(false).unwrap();
    abox.add_term(node, c("A"), []).unwrap();
    abox.add_term(node, Term::not(c("B")), []).unwrap();

    let reasoner = bounded_reasoner();
    assert!(reasoner.is_consistent(&abox).unwrap());

    let model = reasoner.first_model(&abox).unwrap();
    let successors = model.abox().role_successors(node, &r("r"));
    assert_eq!(successors.len(), 1);
    for successor in successors {
        assert!(model.abox().node(successor).unwrap().contains_term(&c("C")));
    }
}

#[test]
fn test_only_restriction_against_asserted_successor() {
    let mut abox = ABox::new(TBox::new());
    let x = abox.get_or_add_named_node(&Name::new("x"), false).unwrap();
    let y = abox.get_or_add_named_node(&Name::new("y"), false).unwrap();
    abox.add_term(x, Term::only(r("r"), c("B")), []).unwrap();
    abox.add_term(y, Term::not(c("B")), []).unwrap();
    abox.add_link(x, r("r"), y, []).unwrap();

    let reasoner = Reasoner::new();
    assert!(!reasoner.is_consistent(&abox).unwrap());
    assert!(matches!(
        reasoner.first_model(&abox),
        Err(ReasonerError::InconsistentABox(_))
    ));
}

#[test]
fn test_subsumption_reflexive_and_transitive() {
    let mut tbox = TBox::new();
    tbox.add_subsumption(c("A"), c("B"));
    tbox.add_subsumption(c("B"), c("C"));
    let abox = ABox::new(tbox);
    let reasoner = Reasoner::new();

    for term in [c("A"), c("B"), Term::some(r("r"), c("A"))] {
        assert!(reasoner.is_subclass_of(&abox, &term, &term).unwrap());
    }
    assert!(reasoner.is_subclass_of(&abox, &c("A"), &c("C")).unwrap());
    assert!(!reasoner.is_subclass_of(&abox, &c("C"), &c("A")).unwrap());
}

#[test]
fn test_subsumption_through_tableau() {
    let mut tbox = TBox::new();
    tbox.add_subsumption(c("A"), Term::and(vec![c("B"), Term::some(r("r"), c("D"))]));
    tbox.add_subsumption(Term::some(r("r"), c("D")), c("E"));
    let abox = ABox::new(tbox);
    let reasoner = bounded_reasoner();

    assert!(reasoner.is_subclass_of(&abox, &c("A"), &c("E")).unwrap());
    assert!(!reasoner.is_subclass_of(&abox, &c("E"), &c("A")).unwrap());
}

#[test]
fn test_consistency_round_trip() {
    let reasoner = bounded_reasoner();
    let mut samples = Vec::new();

    let mut plain = ABox::new(TBox::new());
    let node = plain.create_node(false).unwrap();
    plain.add_term(node, Term::or(vec![c("A"), c("B")]), []).unwrap();
    samples.push(plain);

    let mut clashing = ABox::new(TBox::new());
    let node = clashing.create_node(false).unwrap();
    clashing.add_term(node, c("A"), []).unwrap();
    clashing.add_term(node, Term::not(c("A")), []).unwrap();
    samples.push(clashing);

    let mut tbox = TBox::new();
    tbox.add_subsumption(c("A"), Term::Bottom);
    let mut forced = ABox::new(tbox);
    let node = forced.create_node(false).unwrap();
    forced.add_term(node, Term::or(vec![c("A"), c("A2")]), []).unwrap();
    samples.push(forced);

    for abox in &samples {
        let consistent = reasoner.is_consistent(abox).unwrap();
        let models = reasoner.check_consistency(abox, true).unwrap();
        assert_eq!(consistent, !models.is_empty());
    }
}

#[test]
fn test_cyclic_existential_terminates() {
    init_tracing();
    let mut tbox = TBox::new();
    tbox.add_subsumption(c("A"), Term::some(r("r"), c("A")));
    let abox = ABox::new(tbox);
    assert!(bounded_reasoner().is_satisfiable(&abox, &c("A")).unwrap());
}

#[test]
fn test_cyclic_existential_with_inverse_terminates() {
    let mut rbox = RBox::new();
    rbox.add_inverse_roles(r("r"), r("r_inv")).unwrap();
    let mut tbox = TBox::with_rbox(rbox);
    tbox.add_subsumption(c("A"), Term::some(r("r"), c("A")));
    let abox = ABox::new(tbox);
    assert_eq!(abox.blocking_strategy(), BlockingStrategy::Double);
    assert!(bounded_reasoner().is_satisfiable(&abox, &c("A")).unwrap());
}

#[test]
fn test_cyclic_existential_with_transitive_role_terminates() {
    let mut rbox = RBox::new();
    rbox.set_transitive(r("r")).unwrap();
    let mut tbox = TBox::with_rbox(rbox);
    tbox.add_subsumption(c("A"), Term::some(r("r"), c("A")));
    tbox.add_subsumption(c("A"), Term::only(r("r"), c("B")));
    let abox = ABox::new(tbox);
    let reasoner = bounded_reasoner();
    assert!(reasoner.is_satisfiable(&abox, &c("A")).unwrap());
    assert!(!reasoner
        .is_satisfiable(&abox, &Term::and(vec![c("A"), Term::some(r("r"), Term::not(c("B")))]))
        .unwrap());
}

#[test]
fn test_transitive_closure_reaches_generated_successor() -> anyhow::Result<()> {
    init_tracing();
    let mut rbox = RBox::new();
    rbox.set_transitive(r("r"))?;
    let mut abox = ABox::new(TBox::with_rbox(rbox));
    let x = abox.get_or_add_named_node(&Name::new("x"), false)?;
    let y = abox.get_or_add_named_node(&Name::new("y"), false)?;
    abox.add_link(x, r("r"), y, [])?;
    abox.add_term(y, Term::some(r("r"), c("C")), [])?;

    let result = bounded_reasoner().first_model(&abox)?;
    let model = result.abox();
    let generated = successors(model, y, &r("r"));
    assert_eq!(generated.len(), 1);
    assert!(model.node(generated[0]).unwrap().contains_term(&c("C")));

    let from_x = successors(model, x, &r("r"));
    assert_eq!(from_x, vec![y, generated[0]]);
    Ok(())
}

fn blocking_chain(rbox: RBox) -> (ABox, NodeId, NodeId, NodeId) {
    let mut abox = ABox::new(TBox::with_rbox(rbox));
    let root = abox.create_node(false).unwrap();
    let middle = abox.create_node(false).unwrap();
    let leaf = abox.create_node(false).unwrap();
    abox.add_term(root, c("B"), []).unwrap();
    abox.add_term(middle, c("A"), []).unwrap();
    abox.add_term(leaf, c("A"), []).unwrap();
    abox.add_link(root, r("r"), middle, []).unwrap();
    abox.add_link(middle, r("s"), leaf, []).unwrap();
    (abox, root, middle, leaf)
}

#[test]
fn test_double_blocking_needs_matching_incoming_roles() {
    let (abox, _, middle, leaf) = blocking_chain(RBox::new());
    assert_eq!(abox.blocking_strategy(), BlockingStrategy::Subset);
    assert_eq!(abox.blocker(leaf), Some(middle));

    let mut rbox = RBox::new();
    rbox.add_inverse_roles(r("r"), r("r_inv")).unwrap();
    let (mut abox, _, middle, leaf) = blocking_chain(rbox);
    assert_eq!(abox.blocking_strategy(), BlockingStrategy::Double);
    assert!(!abox.is_blocked(middle));
    // same terms as `middle`, but reached over s instead of r
    assert!(!abox.is_blocked(leaf));

    let sibling = abox.create_node(false).unwrap();
    abox.add_term(sibling, c("A"), []).unwrap();
    abox.add_link(middle, r("r"), sibling, []).unwrap();
    assert_eq!(abox.blocker(sibling), Some(middle));
}

#[test]
fn test_blocking_released_when_blocker_gains_term() {
    let mut rbox = RBox::new();
    rbox.add_inverse_roles(r("r"), r("r_inv")).unwrap();
    let mut abox = ABox::new(TBox::with_rbox(rbox));
    let root = abox.create_node(false).unwrap();
    let blocker = abox.create_node(false).unwrap();
    let blocked = abox.create_node(false).unwrap();
    for node in [root, blocker, blocked] {
        abox.add_term(node, c("A"), []).unwrap();
    }
    abox.add_link(root, r("r"), blocker, []).unwrap();
    abox.add_link(blocker, r("r"), blocked, []).unwrap();
    assert_eq!(abox.blocker(blocked), Some(blocker));
    while abox.next_generating_node().is_some() {}

    abox.add_term(blocker, c("C"), []).unwrap();
    assert!(!abox.is_blocked(blocked));
    assert!(!abox.is_blocked(blocker));
    assert_eq!(abox.next_generating_node(), Some(blocker));
    assert_eq!(abox.next_generating_node(), Some(blocked));
}

#[test]
fn test_queries_leave_node_ids_alone() -> anyhow::Result<()> {
    let mut tbox = TBox::new();
    tbox.add_subsumption(c("A"), Term::some(r("r"), c("B")));
    let mut abox = ABox::new(tbox);
    let first = abox.create_node(false)?;
    abox.add_term(first, c("A"), [])?;

    let reasoner = bounded_reasoner();
    let model = reasoner.first_model(&abox)?;
    assert_eq!(model.abox().len(), 2);
    assert!(reasoner.is_satisfiable(&abox, &c("A"))?);
    let again = reasoner.first_model(&abox)?;
    assert_eq!(again.abox().node_ids(), model.abox().node_ids());

    assert_eq!(abox.create_node(false)?, NodeId(1));
    Ok(())
}

#[test]
fn test_step_limit() {
    let mut tbox = TBox::new();
    tbox.add_subsumption(c("A"), Term::some(r("r"), c("A")));
    let abox = ABox::new(tbox);
    let reasoner = Reasoner::with_options(ReasonerOptions::default().with_step_limit(3));
    assert!(matches!(
        reasoner.is_satisfiable(&abox, &c("A")),
        Err(ReasonerError::StepLimitExceeded(3))
    ));
}

#[test]
fn test_dependency_directed_backtracking_keeps_other_choices() {
    let mut tbox = TBox::new();
    tbox.add_subsumption(c("C"), Term::Bottom);
    let mut abox = ABox::new(tbox);
    let node = abox.create_node(false).unwrap();
    abox.add_term(node, Term::or(vec![c("A1"), c("B1")]), []).unwrap();
    abox.add_term(node, Term::or(vec![c("C"), c("D")]), []).unwrap();

    let models = Reasoner::new().check_consistency(&abox, false).unwrap();
    assert_eq!(models.len(), 2);
    for model in &models {
        assert!(model.abox().node(node).unwrap().contains_term(&c("D")));
    }
}

#[test]
fn test_unconditional_clash_prunes_every_branch() {
    let mut abox = ABox::new(TBox::new());
    let node = abox.create_node(false).unwrap();
    let other = abox.create_node(false).unwrap();
    abox.add_term(node, Term::or(vec![c("A"), c("B")]), []).unwrap();
    abox.add_term(other, c("X"), []).unwrap();
    abox.add_term(other, Term::not(c("X")), []).unwrap();

    let models = Reasoner::new().check_consistency(&abox, false).unwrap();
    assert!(models.is_empty());
}

#[test]
fn test_knowledge_base_queries() -> anyhow::Result<()> {
    let kb = KnowledgeBase::from_axioms([
        Axiom::SubClassOf(c("Dog"), c("Animal")),
        Axiom::SubClassOf(c("Person"), c("Agent")),
        Axiom::DisjointClasses(vec![c("Animal"), c("Plant")]),
        Axiom::PropertyDomain(r("hasOwner"), c("Animal")),
        Axiom::PropertyRange(r("hasOwner"), c("Person")),
        Axiom::ClassAssertion(c("Dog"), Name::new("rex")),
    ])?;
    let abox = kb.abox()?;
    let reasoner = bounded_reasoner();

    assert!(reasoner.is_knowledge_base_consistent(&kb)?);
    assert!(reasoner.is_instance_of(&abox, &Name::new("rex"), &c("Animal"))?);
    assert!(!reasoner.is_instance_of(&abox, &Name::new("rex"), &c("Person"))?);

    assert!(reasoner.is_in_domain(&abox, &r("hasOwner"), &c("Animal"))?);
    assert!(!reasoner.is_in_domain(&abox, &r("hasOwner"), &c("Dog"))?);
    assert!(reasoner.is_in_range(&abox, &r("hasOwner"), &c("Agent"))?);
    assert!(!reasoner.is_in_range(&abox, &r("hasOwner"), &c("Dog"))?);

    assert!(reasoner.is_disjoint(&abox, &c("Dog"), &c("Plant"))?);
    assert!(!reasoner.is_disjoint(&abox, &c("Dog"), &c("Person"))?);

    let hierarchy = reasoner.classify(&abox, &[c("Dog"), c("Animal")])?;
    assert_eq!(hierarchy[&c("Dog")], BTreeSet::from([c("Dog"), c("Animal")]));
    assert_eq!(hierarchy[&c("Animal")], BTreeSet::from([c("Animal")]));
    Ok(())
}

#[test]
fn test_inconsistent_knowledge_base() -> anyhow::Result<()> {
    let kb = KnowledgeBase::from_axioms([
        Axiom::SubClassOf(c("Dog"), c("Animal")),
        Axiom::DisjointClasses(vec![c("Animal"), c("Plant")]),
        Axiom::ClassAssertion(c("Dog"), Name::new("rex")),
        Axiom::ClassAssertion(c("Plant"), Name::new("rex")),
    ])?;
    assert!(!Reasoner::new().is_knowledge_base_consistent(&kb)?);
    Ok(())
}

#[test]
fn test_different_individuals_cannot_merge() -> anyhow::Result<()> {
    let kb = KnowledgeBase::from_axioms([
        Axiom::FunctionalProperty(r("hasMother")),
        Axiom::ObjectPropertyAssertion(r("hasMother"), Name::new("x"), Name::new("a")),
        Axiom::ObjectPropertyAssertion(r("hasMother"), Name::new("x"), Name::new("b")),
    ])?;
    let reasoner = Reasoner::new();
    assert!(reasoner.is_knowledge_base_consistent(&kb)?);

    let mut distinct = kb.clone();
    distinct.add_axiom(Axiom::DifferentIndividuals(vec![Name::new("a"), Name::new("b")]))?;
    assert!(!reasoner.is_knowledge_base_consistent(&distinct)?);
    Ok(())
}

#[test]
fn test_functional_data_property_values() -> anyhow::Result<()> {
    let base = [
        Axiom::DataProperty(r("age")),
        Axiom::FunctionalProperty(r("age")),
        Axiom::PropertyRange(r("age"), Term::data_range(DataRange::integer_range(Some(0), Some(150)))),
    ];
    let reasoner = Reasoner::new();

    let mut kb = KnowledgeBase::from_axioms(base.clone())?;
    kb.add_axiom(Axiom::DataPropertyAssertion(r("age"), Name::new("p"), Literal::integer(30)))?;
    assert!(reasoner.is_knowledge_base_consistent(&kb)?);

    let mut twice = kb.clone();
    twice.add_axiom(Axiom::DataPropertyAssertion(r("age"), Name::new("p"), Literal::integer(31)))?;
    assert!(!reasoner.is_knowledge_base_consistent(&twice)?);

    let mut out_of_range = KnowledgeBase::from_axioms(base)?;
    out_of_range.add_axiom(Axiom::DataPropertyAssertion(
        r("age"),
        Name::new("q"),
        Literal::integer(200),
    ))?;
    assert!(!reasoner.is_knowledge_base_consistent(&out_of_range)?);
    Ok(())
}

#[test]
fn test_existential_to_nominal_reuses_named_node() {
    let mut abox = ABox::new(TBox::new());
    let b = abox.get_or_add_named_node(&Name::new("b"), false).unwrap();
    let a = abox.get_or_add_named_node(&Name::new("a"), false).unwrap();
    abox.add_term(a, Term::some(r("knows"), Term::nominal("b")), []).unwrap();

    let model = Reasoner::new().first_model(&abox).unwrap();
    assert_eq!(model.abox().len(), 2);
    assert!(model.abox().node(a).unwrap().has_successor(&r("knows"), b));
}

#[test]
fn test_rbox_contradictions_are_fatal() {
    let mut rbox = RBox::new();
    rbox.declare_role(r("age"), RoleKind::Data).unwrap();
    assert!(matches!(
        rbox.set_transitive(r("age")),
        Err(ReasonerError::InconsistentRBox(_))
    ));
    rbox.set_functional(r("parent")).unwrap();
    rbox.add_sub_role(r("mother"), r("parent")).unwrap();
    assert!(rbox.set_transitive(r("mother")).is_err());
}

#[test]
fn test_trace_option_does_not_change_answers() {
    init_tracing();
    let mut abox = ABox::new(TBox::new());
    let node = abox.create_node(false).unwrap();
    abox.add_term(node, Term::or(vec![c("A"), c("B")]), []).unwrap();
    let traced = Reasoner::with_options(
        ReasonerOptions::default()
            .with_trace(true)
            .with_progress_logging(true),
    );
    assert_eq!(traced.check_consistency(&abox, false).unwrap().len(), 2);
}
