//! # Conflux Testkit
//!
//! Testing utilities for Conflux.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Generators**: Proptest strategies for elements and overlapping sets
//! - **Fixtures**: Seeded element sets and small-shaped trees
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use conflux_testkit::generators::set_pair;
//!
//! proptest! {
//!     #[test]
//!     fn peers_disagree_only_on_extras(pair in set_pair(50)) {
//!         prop_assert_eq!(conflux_core::ZSet::diff(&pair.a(), &pair.b()), pair.only_a);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use conflux_testkit::fixtures::{tree_with, wide_tree_config, SetFixture};
//!
//! let (a, b) = SetFixture::with_seed(42).overlapping(100, 3, 4);
//! let tree = tree_with(wide_tree_config(), &a);
//! # let _ = b;
//! # let _ = tree;
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{small_tree_config, tree_with, wide_tree_config, SetFixture, SMALL_PRIME};
pub use generators::SetPair;
