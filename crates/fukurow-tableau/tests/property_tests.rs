//! Property tests for node merging and branching

use fukurow_tableau::*;
use fukurow_term::{Name, Term};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn build_nodes(named: &[bool]) -> (ABox, Vec<NodeId>) {
    let mut abox = ABox::new(TBox::new());
    let mut ids = Vec::new();
    for (i, is_named) in named.iter().enumerate() {
        let id = if *is_named {
            abox.get_or_add_named_node(&Name::new(format!("n{}", i)), false)
        } else {
            abox.create_node(false)
        };
        ids.push(id.unwrap());
    }
    (abox, ids)
}

proptest! {
    #[test]
    fn merge_keeps_the_earlier_node(
        named in prop::collection::vec(any::<bool>(), 2..8),
        picks in prop::collection::vec((0usize..8, 0usize..8), 1..6),
    ) {
        let (mut abox, ids) = build_nodes(&named);
        for (i, j) in picks {
            let (a, b) = (ids[i % ids.len()], ids[j % ids.len()]);
            let (ra, rb) = (abox.resolve(a), abox.resolve(b));
            let expected = if abox.order_key(ra) <= abox.order_key(rb) { ra } else { rb };

            let info = abox.merge_nodes(a, b, BTreeSet::new()).unwrap();
            prop_assert_eq!(info.current_node, expected);
            prop_assert_eq!(abox.resolve(a), expected);
            prop_assert_eq!(abox.resolve(b), expected);
            prop_assert!(abox.contains(expected));
        }
        let live: BTreeSet<NodeId> = ids.iter().map(|id| abox.resolve(*id)).collect();
        prop_assert_eq!(live.len(), abox.len());
    }

    #[test]
    fn independent_unions_multiply_models(n in 1usize..5) {
        let mut abox = ABox::new(TBox::new());
        let node = abox.create_node(false).unwrap();
        for i in 0..n {
            let union = Term::or(vec![
                Term::class(format!("A{}", i)),
                Term::class(format!("B{}", i)),
            ]);
            abox.add_term(node, union, []).unwrap();
        }
        let models = Reasoner::new().check_consistency(&abox, false).unwrap();
        prop_assert_eq!(models.len(), 1 << n);
    }

    #[test]
    fn re_adding_a_term_changes_nothing(names in prop::collection::vec("[A-D]", 1..6)) {
        let mut abox = ABox::new(TBox::new());
        let node = abox.create_node(false).unwrap();
        for name in &names {
            abox.add_term(node, Term::class(name.as_str()), []).unwrap();
        }
        let before = abox.deep_hash();
        for name in &names {
            let info = abox.add_term(node, Term::class(name.as_str()), []).unwrap();
            prop_assert!(!info.is_changed());
        }
        prop_assert_eq!(before, abox.deep_hash());
    }
}
