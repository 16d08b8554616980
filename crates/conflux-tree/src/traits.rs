//! Tree traits: the contract the reconciliation engine requires of storage.
//!
//! The engine only reads nodes; all mutation goes through [`PrefixTree`].
//! Implementations may be in memory or persistent.

use conflux_core::{Bitstring, FieldElement};

use crate::error::Result;

/// A read-only view of a prefix-tree node.
pub trait PrefixNode: Sized {
    /// The node's prefix.
    fn key(&self) -> Bitstring;

    /// True if the node has no children.
    fn is_leaf(&self) -> bool;

    /// Number of elements in the subtree.
    fn size(&self) -> usize;

    /// Every element in the subtree. Cheap only at or near leaves.
    fn elements(&self) -> Vec<FieldElement>;

    /// The subtree's characteristic polynomial evaluated at the tree's
    /// sample points.
    fn svalues(&self) -> Vec<FieldElement>;

    /// Child nodes, in prefix order. Empty for leaves.
    fn children(&self) -> Vec<Self>;
}

/// A prefix tree over field elements.
///
/// Nodes are borrowed from the tree, so no mutation can happen while a
/// reconciliation session holds one.
pub trait PrefixTree: Send + Sync + 'static {
    /// Borrowed node view.
    type Node<'a>: PrefixNode + Send + Sync
    where
        Self: 'a;

    /// The root node, keyed by the empty bitstring.
    fn root(&self) -> Result<Self::Node<'_>>;

    /// The deepest node whose key is a prefix of `key`.
    fn node(&self, key: &Bitstring) -> Result<Self::Node<'_>>;

    /// Insert an element.
    fn insert(&mut self, z: &FieldElement) -> Result<()>;

    /// Remove an element.
    fn remove(&mut self, z: &FieldElement) -> Result<()>;

    /// Total number of elements.
    fn len(&self) -> usize;

    /// Check for an empty tree.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample points that `svalues` are evaluated at.
    fn points(&self) -> &[FieldElement];

    /// Bits consumed per tree level.
    fn bit_quantum(&self) -> usize;
}

/// The routing bits of an element: its little-endian bytes, MSB-first.
pub fn element_bits(z: &FieldElement) -> Bitstring {
    Bitstring::from_bytes(&z.to_bytes_le())
}

/// True if `z` routes through the node keyed `prefix`.
///
/// Routing bits past the end of the element's bytes read as zero.
pub fn in_prefix(z: &FieldElement, prefix: &Bitstring) -> bool {
    let bits = element_bits(z);
    (0..prefix.len()).all(|i| (bits.read_bits(i, 1) == 1) == prefix.get(i))
}
