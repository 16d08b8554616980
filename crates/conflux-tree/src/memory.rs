//! In-memory implementation of the PrefixTree trait.
//!
//! Each node covers the elements whose routing bits start with the node's
//! key. Leaves hold elements directly; a leaf that grows past
//! `split_threshold` becomes an internal node with `2^bit_quantum` children,
//! and an internal node that shrinks to `join_threshold` collapses back into
//! a leaf. Nothing is persisted.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use tracing::trace;

use conflux_core::{characteristic_samples, p_128, sample_points, Bitstring, FieldElement};

use crate::error::{Result, TreeError};
use crate::traits::{element_bits, PrefixNode, PrefixTree};

/// Shape parameters for a prefix tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Bits consumed per level; each internal node has `2^bit_quantum` children.
    pub bit_quantum: usize,
    /// A leaf splits once it holds more than this many elements.
    pub split_threshold: usize,
    /// An internal node collapses once it holds this many elements or fewer.
    pub join_threshold: usize,
    /// Number of sample points per node.
    pub num_samples: usize,
    /// Prime bound of the element field.
    pub modulus: BigInt,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            bit_quantum: 2,
            split_threshold: 100,
            join_threshold: 50,
            num_samples: 6,
            modulus: p_128().clone(),
        }
    }
}

/// Largest supported `bit_quantum`.
pub const MAX_BIT_QUANTUM: usize = 8;

impl TreeConfig {
    /// Reject shapes the tree cannot be built with.
    pub fn validate(&self) -> Result<()> {
        if self.bit_quantum == 0 || self.bit_quantum > MAX_BIT_QUANTUM {
            return Err(TreeError::InvalidConfig(format!(
                "bit_quantum ({}) must be in 1..={MAX_BIT_QUANTUM}",
                self.bit_quantum
            )));
        }
        if self.split_threshold == 0 {
            return Err(TreeError::InvalidConfig(
                "split_threshold must be positive".into(),
            ));
        }
        if self.join_threshold >= self.split_threshold {
            return Err(TreeError::InvalidConfig(format!(
                "join_threshold ({}) must be below split_threshold ({})",
                self.join_threshold, self.split_threshold
            )));
        }
        Ok(())
    }

    fn num_children(&self) -> usize {
        1 << self.bit_quantum
    }
}

/// A node of [`MemPrefixTree`].
#[derive(Debug, Clone)]
pub struct MemNode {
    key: Bitstring,
    size: usize,
    svalues: Vec<FieldElement>,
    elements: Vec<FieldElement>,
    children: Vec<MemNode>,
}

impl MemNode {
    fn new(key: Bitstring, points: &[FieldElement]) -> Self {
        Self {
            key,
            size: 0,
            svalues: points.iter().map(|x| x.with_value(1)).collect(),
            elements: Vec::new(),
            children: Vec::new(),
        }
    }

    fn collect_elements(&self, out: &mut Vec<FieldElement>) {
        out.extend(self.elements.iter().cloned());
        for child in &self.children {
            child.collect_elements(out);
        }
    }

    fn leaf_for(&self, bits: &Bitstring, bit_quantum: usize) -> &MemNode {
        let mut node = self;
        while !node.children.is_empty() {
            node = &node.children[bits.read_bits(node.key.len(), bit_quantum)];
        }
        node
    }
}

/// In-memory prefix tree.
pub struct MemPrefixTree {
    config: TreeConfig,
    points: Vec<FieldElement>,
    root: MemNode,
}

impl MemPrefixTree {
    /// Create an empty tree. Fails if `config` does not pass
    /// [`TreeConfig::validate`].
    pub fn new(config: TreeConfig) -> Result<Self> {
        config.validate()?;
        let points = sample_points(&config.modulus, config.num_samples);
        let root = MemNode::new(Bitstring::default(), &points);
        Ok(Self {
            config,
            points,
            root,
        })
    }

    /// Create a tree holding `elements`.
    pub fn with_elements<'a>(
        config: TreeConfig,
        elements: impl IntoIterator<Item = &'a FieldElement>,
    ) -> Result<Self> {
        let mut tree = Self::new(config)?;
        for z in elements {
            tree.insert(z)?;
        }
        Ok(tree)
    }

    /// The tree's shape parameters.
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Check whether `z` is in the tree.
    pub fn contains(&self, z: &FieldElement) -> bool {
        self.root
            .leaf_for(&element_bits(z), self.config.bit_quantum)
            .elements
            .contains(z)
    }

    fn check_field(&self, z: &FieldElement) -> Result<()> {
        if z.modulus() != &self.config.modulus {
            return Err(TreeError::ModulusMismatch {
                expected: self.config.modulus.to_string(),
                got: z.modulus().to_string(),
            });
        }
        Ok(())
    }
}

/// `x_i - z` for each sample point.
fn marray(points: &[FieldElement], z: &FieldElement) -> Vec<FieldElement> {
    points
        .iter()
        .map(|x| {
            let mut d = x.clone();
            d.sub([z]);
            d
        })
        .collect()
}

fn insert_at(
    node: &mut MemNode,
    z: &FieldElement,
    bits: &Bitstring,
    marray: &[FieldElement],
    config: &TreeConfig,
    points: &[FieldElement],
) {
    node.size += 1;
    for (sv, m) in node.svalues.iter_mut().zip(marray) {
        *sv *= m;
    }
    if node.children.is_empty() {
        node.elements.push(z.clone());
        if node.size > config.split_threshold {
            split(node, config, points);
        }
    } else {
        let idx = bits.read_bits(node.key.len(), config.bit_quantum);
        insert_at(&mut node.children[idx], z, bits, marray, config, points);
    }
}

fn split(node: &mut MemNode, config: &TreeConfig, points: &[FieldElement]) {
    trace!(key = %node.key, size = node.size, "split");
    node.children = (0..config.num_children())
        .map(|i| MemNode::new(node.key.extend_with(i, config.bit_quantum), points))
        .collect();
    for z in std::mem::take(&mut node.elements) {
        let bits = element_bits(&z);
        let m = marray(points, &z);
        let idx = bits.read_bits(node.key.len(), config.bit_quantum);
        insert_at(&mut node.children[idx], &z, &bits, &m, config, points);
    }
}

fn join(node: &mut MemNode) {
    trace!(key = %node.key, size = node.size, "join");
    let mut elements = Vec::with_capacity(node.size);
    for child in &node.children {
        child.collect_elements(&mut elements);
    }
    node.children.clear();
    node.elements = elements;
}

/// `marray` is `None` when some factor is zero and cannot be divided out;
/// sample values along the path are then recomputed from scratch.
fn remove_at(
    node: &mut MemNode,
    z: &FieldElement,
    bits: &Bitstring,
    marray: Option<&[FieldElement]>,
    config: &TreeConfig,
    points: &[FieldElement],
) {
    node.size -= 1;
    if let Some(m) = marray {
        for (sv, m) in node.svalues.iter_mut().zip(m) {
            sv.div(m);
        }
    }
    if node.children.is_empty() {
        node.elements.retain(|e| e != z);
    } else {
        let idx = bits.read_bits(node.key.len(), config.bit_quantum);
        remove_at(&mut node.children[idx], z, bits, marray, config, points);
        if node.size <= config.join_threshold {
            join(node);
        }
    }
    if marray.is_none() {
        let mut elements = Vec::with_capacity(node.size);
        node.collect_elements(&mut elements);
        node.svalues = characteristic_samples(&elements, points);
    }
}

impl<'a> PrefixNode for &'a MemNode {
    fn key(&self) -> Bitstring {
        self.key.clone()
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn elements(&self) -> Vec<FieldElement> {
        let mut out = Vec::with_capacity(self.size);
        self.collect_elements(&mut out);
        out
    }

    fn svalues(&self) -> Vec<FieldElement> {
        self.svalues.clone()
    }

    fn children(&self) -> Vec<Self> {
        self.children.iter().collect()
    }
}

impl PrefixTree for MemPrefixTree {
    type Node<'a> = &'a MemNode
    where
        Self: 'a;

    fn root(&self) -> Result<&MemNode> {
        Ok(&self.root)
    }

    fn node(&self, key: &Bitstring) -> Result<&MemNode> {
        if key.len() % self.config.bit_quantum != 0 {
            return Err(TreeError::NodeNotFound(key.clone()));
        }
        let mut node = &self.root;
        while !node.children.is_empty() && node.key.len() < key.len() {
            node = &node.children[key.read_bits(node.key.len(), self.config.bit_quantum)];
        }
        Ok(node)
    }

    fn insert(&mut self, z: &FieldElement) -> Result<()> {
        self.check_field(z)?;
        if self.contains(z) {
            return Err(TreeError::DuplicateElement(z.clone()));
        }
        let bits = element_bits(z);
        let m = marray(&self.points, z);
        insert_at(&mut self.root, z, &bits, &m, &self.config, &self.points);
        Ok(())
    }

    fn remove(&mut self, z: &FieldElement) -> Result<()> {
        self.check_field(z)?;
        if !self.contains(z) {
            return Err(TreeError::ElementNotFound(z.clone()));
        }
        let bits = element_bits(z);
        let m = marray(&self.points, z);
        let divisible = m.iter().all(|f| !f.is_zero());
        let m = divisible.then_some(m.as_slice());
        remove_at(&mut self.root, z, &bits, m, &self.config, &self.points);
        Ok(())
    }

    fn len(&self) -> usize {
        self.root.size
    }

    fn points(&self) -> &[FieldElement] {
        &self.points
    }

    fn bit_quantum(&self) -> usize {
        self.config.bit_quantum
    }
}
