//! # Conflux Tree
//!
//! The prefix-tree abstraction that reconciliation runs against. The tree
//! partitions the element key space by binary prefix so that mismatches can
//! be localized by recursive descent.
//!
//! ## Key Types
//!
//! - [`PrefixTree`] - The trait the reconciliation engine consumes
//! - [`PrefixNode`] - A read-only view of one tree node
//! - [`MemPrefixTree`] - In-memory implementation for tests and small deployments
//! - [`TreeConfig`] - Branching, split/join thresholds and sample count
//!
//! ## Usage
//!
//! ```rust
//! use conflux_core::FieldElement;
//! use conflux_tree::{MemPrefixTree, PrefixNode, PrefixTree, TreeConfig};
//!
//! let config = TreeConfig::default();
//! let p = config.modulus.clone();
//! let mut tree = MemPrefixTree::new(config).unwrap();
//! tree.insert(&FieldElement::new(p, 42)).unwrap();
//! assert_eq!(tree.root().unwrap().size(), 1);
//! ```
//!
//! ## Design Notes
//!
//! - **Sample values**: each node keeps the characteristic polynomial of its
//!   subtree evaluated at fixed points, updated incrementally on insert/remove.
//! - **Exclusive ownership**: nodes are borrowed views; the tree itself is
//!   only ever touched from one execution context at a time.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, TreeError};
pub use memory::{MemNode, MemPrefixTree, TreeConfig, MAX_BIT_QUANTUM};
pub use traits::{element_bits, in_prefix, PrefixNode, PrefixTree};
