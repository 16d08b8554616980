//! Test fixtures and helpers.
//!
//! Deterministic element sets and trees for integration tests.

use num_bigint::BigInt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use conflux_core::{p_128, FieldElement, ZSet};
use conflux_tree::{MemPrefixTree, TreeConfig};

/// A prime small enough to read element values in test output.
pub const SMALL_PRIME: i64 = 65537;

/// Tree shape that splits early, so small sets still build deep trees.
pub fn small_tree_config() -> TreeConfig {
    TreeConfig {
        bit_quantum: 2,
        split_threshold: 8,
        join_threshold: 4,
        num_samples: 6,
        modulus: BigInt::from(SMALL_PRIME),
    }
}

/// Like [`small_tree_config`] but over Z(P_128).
pub fn wide_tree_config() -> TreeConfig {
    TreeConfig {
        modulus: p_128().clone(),
        ..small_tree_config()
    }
}

/// A seeded source of random element sets.
pub struct SetFixture {
    rng: StdRng,
}

impl SetFixture {
    /// Create with a deterministic seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// One random element of Z(P_128).
    pub fn element(&mut self) -> FieldElement {
        FieldElement::new(p_128().clone(), self.rng.gen::<u128>())
    }

    /// `count` distinct random elements of Z(P_128).
    pub fn elements(&mut self, count: usize) -> ZSet {
        let mut set = ZSet::new();
        while set.len() < count {
            set.insert(self.element());
        }
        set
    }

    /// Two sets sharing `shared` elements, each with its own extras.
    pub fn overlapping(&mut self, shared: usize, only_a: usize, only_b: usize) -> (ZSet, ZSet) {
        let all = self.elements(shared + only_a + only_b).items();
        let (common, rest) = all.split_at(shared);
        let (extra_a, extra_b) = rest.split_at(only_a);

        let a = common.iter().chain(extra_a).cloned().collect();
        let b = common.iter().chain(extra_b).cloned().collect();
        (a, b)
    }
}

/// Build an in-memory tree holding `elements`.
///
/// Panics if the elements are not in the configured field.
pub fn tree_with(config: TreeConfig, elements: &ZSet) -> MemPrefixTree {
    match MemPrefixTree::with_elements(config, elements.iter()) {
        Ok(tree) => tree,
        Err(e) => panic!("fixture elements do not fit the tree: {e}"),
    }
}
