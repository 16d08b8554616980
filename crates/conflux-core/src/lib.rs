//! # Conflux Core
//!
//! Pure primitives for Conflux set reconciliation: finite field elements,
//! bitstrings and element sets.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over the values that the reconciliation protocol exchanges.
//!
//! ## Key Types
//!
//! - [`FieldElement`] - A value in the finite field Z(p)
//! - [`Bitstring`] - A prefix-tree path, used as node key and protocol field
//! - [`ZSet`] - A duplicate-free set of field elements
//!
//! ## Field Arithmetic
//!
//! Set digests are evaluations of a characteristic polynomial over Z(p).
//! Mixing values from different fields is a programming error and panics:
//!
//! ```rust
//! use conflux_core::FieldElement;
//!
//! let mut a = FieldElement::new(5, 1);
//! a.add([&FieldElement::new(5, 9)]);
//! assert_eq!(a, FieldElement::new(5, 0));
//! ```

pub mod bitstring;
pub mod error;
pub mod field;
pub mod zset;

pub use bitstring::Bitstring;
pub use error::{CoreError, Result};
pub use field::{
    characteristic_samples, p_128, p_160, p_256, p_512, sample_points, FieldElement,
};
pub use zset::ZSet;
