//! Property-based tests for archetype resolution.

use ecb_ecs::{ArchetypeIndex, ComponentId, EcsError};
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

/// A duplicate-free component set plus a shuffled copy of it.
fn arb_set_and_permutation() -> impl Strategy<Value = (Vec<u32>, Vec<u32>)> {
    proptest::collection::btree_set(1..64u32, 1..8)
        .prop_map(|set| set.into_iter().collect::<Vec<_>>())
        .prop_flat_map(|set| {
            let shuffled = Just(set.clone()).prop_shuffle();
            (Just(set), shuffled)
        })
}

fn ids(raw: &[u32]) -> Vec<ComponentId> {
    raw.iter().copied().map(ComponentId::from_raw).collect()
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Resolution does not depend on the order components are listed in.
    #[test]
    fn resolution_is_order_independent((set, shuffled) in arb_set_and_permutation()) {
        let mut index = ArchetypeIndex::new();
        let a = index.get_or_create(&ids(&set)).unwrap();
        let b = index.get_or_create(&ids(&shuffled)).unwrap();

        prop_assert_eq!(a, b);
        prop_assert_eq!(index.len(), 1);
    }

    /// Repeating any component makes the set invalid.
    #[test]
    fn duplicates_are_rejected((set, shuffled) in arb_set_and_permutation()) {
        let mut with_dup = shuffled;
        with_dup.push(set[0]);

        let mut index = ArchetypeIndex::new();
        let result = index.get_or_create(&ids(&with_dup));
        prop_assert!(matches!(result, Err(EcsError::DuplicateComponent(_))));
        prop_assert!(index.is_empty());
    }

    /// Rolled back archetypes leave committed ones untouched.
    #[test]
    fn rollback_preserves_committed(
        committed in proptest::collection::vec(arb_set_and_permutation(), 1..6),
        pending in proptest::collection::vec(arb_set_and_permutation(), 0..6),
    ) {
        let mut index = ArchetypeIndex::new();
        let before: Vec<_> = committed
            .iter()
            .map(|(set, _)| index.get_or_create(&ids(set)).unwrap())
            .collect();
        index.commit_pending();
        let len = index.len();

        for (set, _) in &pending {
            index.get_or_create(&ids(set)).unwrap();
        }
        index.rollback_pending();

        prop_assert_eq!(index.len(), len);
        for ((_, shuffled), id) in committed.iter().zip(before) {
            prop_assert_eq!(index.find(&ids(shuffled)).unwrap(), id);
        }
    }
}
