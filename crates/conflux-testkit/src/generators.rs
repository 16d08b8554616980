//! Proptest generators for property-based testing.

use std::collections::BTreeMap;

use num_bigint::{BigInt, Sign};
use proptest::prelude::*;

use conflux_core::{p_128, FieldElement, ZSet};

use crate::fixtures::SMALL_PRIME;

/// Generate an element of Z(P_128).
pub fn element() -> impl Strategy<Value = FieldElement> {
    any::<[u8; 16]>()
        .prop_map(|bytes| FieldElement::new(p_128().clone(), BigInt::from_bytes_le(Sign::Plus, &bytes)))
}

/// Generate an element of the small test field.
pub fn small_element() -> impl Strategy<Value = FieldElement> {
    (0..SMALL_PRIME).prop_map(|n| FieldElement::new(SMALL_PRIME, n))
}

/// Generate a set of up to `max` elements of Z(P_128).
pub fn element_set(max: usize) -> impl Strategy<Value = ZSet> {
    prop::collection::btree_set(element(), 0..=max).prop_map(ZSet::from_iter)
}

/// Two overlapping sets, as held by two peers.
#[derive(Debug, Clone)]
pub struct SetPair {
    pub shared: ZSet,
    pub only_a: ZSet,
    pub only_b: ZSet,
}

impl SetPair {
    /// Everything peer A holds.
    pub fn a(&self) -> ZSet {
        let mut set = self.shared.clone();
        set.add_all(&self.only_a);
        set
    }

    /// Everything peer B holds.
    pub fn b(&self) -> ZSet {
        let mut set = self.shared.clone();
        set.add_all(&self.only_b);
        set
    }
}

/// Generate a [`SetPair`] in the small test field with at most `max`
/// distinct elements overall.
pub fn set_pair(max: usize) -> impl Strategy<Value = SetPair> {
    prop::collection::btree_map(0..SMALL_PRIME, 0u8..3, 0..=max).prop_map(split_by_owner)
}

fn split_by_owner(owners: BTreeMap<i64, u8>) -> SetPair {
    let mut pair = SetPair {
        shared: ZSet::new(),
        only_a: ZSet::new(),
        only_b: ZSet::new(),
    };
    for (n, owner) in owners {
        let z = FieldElement::new(SMALL_PRIME, n);
        match owner {
            0 => pair.shared.insert(z),
            1 => pair.only_a.insert(z),
            _ => pair.only_b.insert(z),
        };
    }
    pair
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_tree::{MemPrefixTree, PrefixNode, PrefixTree};

    use crate::fixtures::small_tree_config;

    proptest! {
        #[test]
        fn test_set_pair_disjoint(pair in set_pair(60)) {
            for z in pair.only_a.iter() {
                prop_assert!(!pair.shared.contains(z));
                prop_assert!(!pair.only_b.contains(z));
            }
            prop_assert_eq!(ZSet::diff(&pair.a(), &pair.b()), pair.only_a.clone());
        }

        #[test]
        fn test_tree_contents_match_set(set in prop::collection::btree_set(small_element(), 0..80)) {
            let elements: Vec<FieldElement> = set.iter().cloned().collect();
            let tree = MemPrefixTree::with_elements(small_tree_config(), &elements).unwrap();
            let root = tree.root().unwrap();

            prop_assert_eq!(root.size(), set.len());
            let held: ZSet = root.elements().into_iter().collect();
            prop_assert_eq!(held, ZSet::from_iter(set));
        }

        #[test]
        fn test_root_digest_independent_of_order(mut elements in prop::collection::vec(small_element(), 0..60)) {
            elements.sort();
            elements.dedup();
            let forward = MemPrefixTree::with_elements(small_tree_config(), &elements).unwrap();
            elements.reverse();
            let backward = MemPrefixTree::with_elements(small_tree_config(), &elements).unwrap();

            prop_assert_eq!(
                forward.root().unwrap().svalues(),
                backward.root().unwrap().svalues()
            );
        }
    }
}
