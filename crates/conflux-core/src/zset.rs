//! ZSet: a duplicate-free set of field elements.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::field::FieldElement;

/// An unordered, duplicate-free collection of [`FieldElement`]s.
///
/// Backed by an ordered set so that [`ZSet::items`] is deterministic.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZSet(BTreeSet<FieldElement>);

impl ZSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Insert an element. Returns false if it was already present.
    pub fn insert(&mut self, z: FieldElement) -> bool {
        self.0.insert(z)
    }

    /// Remove an element. Returns false if it was absent.
    pub fn remove(&mut self, z: &FieldElement) -> bool {
        self.0.remove(z)
    }

    /// Add every element of `other`.
    pub fn add_all(&mut self, other: &ZSet) {
        self.0.extend(other.0.iter().cloned());
    }

    /// Check membership.
    pub fn contains(&self, z: &FieldElement) -> bool {
        self.0.contains(z)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check for the empty set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldElement> {
        self.0.iter()
    }

    /// Elements in ascending order.
    pub fn items(&self) -> Vec<FieldElement> {
        self.0.iter().cloned().collect()
    }

    /// Elements in `a` that are not in `b`.
    pub fn diff(a: &ZSet, b: &ZSet) -> ZSet {
        ZSet(a.0.difference(&b.0).cloned().collect())
    }
}

impl FromIterator<FieldElement> for ZSet {
    fn from_iter<I: IntoIterator<Item = FieldElement>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<FieldElement> for ZSet {
    fn extend<I: IntoIterator<Item = FieldElement>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for ZSet {
    type Item = FieldElement;
    type IntoIter = std::collections::btree_set::IntoIter<FieldElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Debug for ZSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.iter().map(|z| z.value())).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(values: &[i64]) -> ZSet {
        values.iter().map(|&n| FieldElement::new(65537, n)).collect()
    }

    #[test]
    fn test_duplicates_collapse() {
        let mut s = set(&[1, 2, 3]);
        assert!(!s.insert(FieldElement::new(65537, 65539)));
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn test_diff() {
        let a = set(&[1, 2, 3, 4]);
        let b = set(&[3, 4, 5]);
        assert_eq!(ZSet::diff(&a, &b), set(&[1, 2]));
        assert_eq!(ZSet::diff(&b, &a), set(&[5]));
    }

    #[test]
    fn test_add_all() {
        let mut a = set(&[1]);
        a.add_all(&set(&[1, 7]));
        assert_eq!(a, set(&[1, 7]));
    }

    proptest! {
        #[test]
        fn prop_diff_partitions_union(
            a in prop::collection::vec(0i64..500, 0..40),
            b in prop::collection::vec(0i64..500, 0..40),
        ) {
            let (a, b) = (set(&a), set(&b));
            let only_a = ZSet::diff(&a, &b);
            let only_b = ZSet::diff(&b, &a);
            prop_assert!(only_a.iter().all(|z| !b.contains(z)));
            prop_assert!(only_b.iter().all(|z| !a.contains(z)));

            let mut rebuilt = ZSet::diff(&a, &only_a);
            rebuilt.add_all(&only_a);
            prop_assert_eq!(rebuilt, a);
        }
    }
}
