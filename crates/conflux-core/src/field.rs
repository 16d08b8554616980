//! Finite field arithmetic over Z(p).
//!
//! A [`FieldElement`] carries its own modulus. Every operation checks that
//! both operands live in the same field before combining them; a mismatch is
//! a programming error and panics rather than coercing one value into the
//! other's field.

use std::fmt;
use std::ops::{AddAssign, MulAssign, Neg, SubAssign};
use std::sync::OnceLock;

use num_bigint::{BigInt, Sign};
use num_traits::{One, Signed, Zero};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const P_128_BYTES: [u8; 16] = [
    0x91, 0xae, 0x33, 0x7c, 0x8a, 0x19, 0xf5, 0xb7, 0xc3, 0xca, 0xab, 0x7f, 0xf9, 0xf0, 0x6d, 0x95,
];

const P_160_BYTES: [u8; 20] = [
    0x81, 0xce, 0x83, 0x36, 0x6d, 0xb4, 0xff, 0xb5, 0x0b, 0xc9, 0x03, 0xf7, 0x5c, 0xd8, 0xfd, 0x35,
    0x0d, 0xab, 0xa4, 0xc3,
];

const P_256_BYTES: [u8; 32] = [
    0x8c, 0x1d, 0x8b, 0xc4, 0xf6, 0x99, 0xd5, 0xc1, 0x70, 0xc0, 0xe1, 0xfb, 0x53, 0x0c, 0xb2, 0x6c,
    0x77, 0x72, 0x81, 0x17, 0x0a, 0x99, 0x2b, 0x72, 0x4d, 0x59, 0xc6, 0x59, 0x0a, 0x9a, 0x54, 0xcb,
];

const P_512_BYTES: [u8; 64] = [
    0xae, 0x3f, 0x54, 0x4f, 0xa6, 0x5c, 0xb4, 0xa7, 0x8a, 0x45, 0x6d, 0x24, 0xe7, 0x45, 0xc9, 0xb2,
    0x15, 0x94, 0x3d, 0xd3, 0xaf, 0x31, 0xa0, 0xa8, 0xe4, 0xdb, 0xba, 0x59, 0x71, 0x44, 0xdc, 0x9f,
    0x35, 0x67, 0x88, 0xa6, 0x35, 0xa2, 0x4e, 0xfa, 0xcd, 0x55, 0x54, 0x06, 0xfa, 0x20, 0xbe, 0xe0,
    0x5e, 0x35, 0x19, 0xb8, 0x49, 0x21, 0x01, 0x78, 0x9a, 0x25, 0x50, 0x05, 0xa2, 0x56, 0x82, 0x1d,
];

fn prime(cell: &'static OnceLock<BigInt>, bytes: &[u8]) -> &'static BigInt {
    cell.get_or_init(|| BigInt::from_bytes_be(Sign::Plus, bytes))
}

/// 128-bit prime; the default modulus for element digests.
pub fn p_128() -> &'static BigInt {
    static P: OnceLock<BigInt> = OnceLock::new();
    prime(&P, &P_128_BYTES)
}

/// 160-bit prime.
pub fn p_160() -> &'static BigInt {
    static P: OnceLock<BigInt> = OnceLock::new();
    prime(&P, &P_160_BYTES)
}

/// 256-bit prime.
pub fn p_256() -> &'static BigInt {
    static P: OnceLock<BigInt> = OnceLock::new();
    prime(&P, &P_256_BYTES)
}

/// 512-bit prime.
pub fn p_512() -> &'static BigInt {
    static P: OnceLock<BigInt> = OnceLock::new();
    prime(&P, &P_512_BYTES)
}

/// A value in the finite field Z(p): an integer where all arithmetic is mod p.
///
/// Invariant: `0 <= value < modulus`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "FieldElementRepr", into = "FieldElementRepr")]
pub struct FieldElement {
    p: BigInt,
    z: BigInt,
}

impl FieldElement {
    /// Create `n mod p`. Negative `n` wraps into `[0, p)`.
    ///
    /// # Panics
    /// If `p` is not positive.
    pub fn new(p: impl Into<BigInt>, n: impl Into<BigInt>) -> Self {
        let p = p.into();
        assert!(p.is_positive(), "field modulus must be positive, got {p}");
        let mut zp = Self { p, z: n.into() };
        zp.normalize();
        zp
    }

    /// Create an element of the same field as `self`.
    pub fn with_value(&self, n: impl Into<BigInt>) -> Self {
        Self::new(self.p.clone(), n)
    }

    /// The prime bound of the field.
    pub fn modulus(&self) -> &BigInt {
        &self.p
    }

    /// The residue, always in `[0, p)`.
    pub fn value(&self) -> &BigInt {
        &self.z
    }

    /// Check for the additive identity.
    pub fn is_zero(&self) -> bool {
        self.z.is_zero()
    }

    /// Little-endian bytes of the residue. Zero encodes as a single zero byte.
    pub fn to_bytes_le(&self) -> Vec<u8> {
        self.z.to_bytes_le().1
    }

    /// Big-endian hex of the residue.
    pub fn to_hex(&self) -> String {
        hex::encode(self.z.to_bytes_be().1)
    }

    /// Check whether `other` belongs to the same field.
    pub fn same_field(&self, other: &FieldElement) -> bool {
        self.p == other.p
    }

    fn normalize(&mut self) {
        self.z %= &self.p;
        if self.z.is_negative() {
            self.z += &self.p;
        }
    }

    /// Add each operand in turn, normalizing after each one.
    ///
    /// # Panics
    /// If any operand belongs to a different field.
    pub fn add<'a>(&mut self, others: impl IntoIterator<Item = &'a FieldElement>) -> &mut Self {
        for v in others {
            assert_same_field(self, v);
            self.z += &v.z;
            self.normalize();
        }
        self
    }

    /// Subtract each operand in turn.
    ///
    /// # Panics
    /// If any operand belongs to a different field.
    pub fn sub<'a>(&mut self, others: impl IntoIterator<Item = &'a FieldElement>) -> &mut Self {
        for v in others {
            assert_same_field(self, v);
            self.z -= &v.z;
            self.normalize();
        }
        self
    }

    /// Multiply by each operand in turn.
    ///
    /// # Panics
    /// If any operand belongs to a different field.
    pub fn mul<'a>(&mut self, others: impl IntoIterator<Item = &'a FieldElement>) -> &mut Self {
        for v in others {
            assert_same_field(self, v);
            self.z *= &v.z;
            self.normalize();
        }
        self
    }

    /// Multiplicative inverse, `z^(p-2) mod p`. Requires `p` prime.
    ///
    /// # Panics
    /// If `self` is zero.
    pub fn inv(&self) -> FieldElement {
        assert!(!self.is_zero(), "zero has no multiplicative inverse in Z({})", self.p);
        let exp = &self.p - BigInt::from(2);
        Self {
            p: self.p.clone(),
            z: self.z.modpow(&exp, &self.p),
        }
    }

    /// Divide by `other`.
    ///
    /// # Panics
    /// If `other` is zero or belongs to a different field.
    pub fn div(&mut self, other: &FieldElement) -> &mut Self {
        assert_same_field(self, other);
        let inv = other.inv();
        self.mul([&inv])
    }
}

/// Panics unless both elements share a modulus.
fn assert_same_field(x: &FieldElement, y: &FieldElement) {
    if x.p != y.p {
        panic!("finite field mismatch between Z({}) and Z({})", x.p, y.p);
    }
}

impl AddAssign<&FieldElement> for FieldElement {
    fn add_assign(&mut self, rhs: &FieldElement) {
        FieldElement::add(self, [rhs]);
    }
}

impl SubAssign<&FieldElement> for FieldElement {
    fn sub_assign(&mut self, rhs: &FieldElement) {
        FieldElement::sub(self, [rhs]);
    }
}

impl MulAssign<&FieldElement> for FieldElement {
    fn mul_assign(&mut self, rhs: &FieldElement) {
        FieldElement::mul(self, [rhs]);
    }
}

impl Neg for &FieldElement {
    type Output = FieldElement;

    fn neg(self) -> FieldElement {
        FieldElement::new(self.p.clone(), -&self.z)
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement({} in Z(p{}))", self.z, self.p.bits())
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.z)
    }
}

/// Wire form of a field element; validated on the way in.
#[derive(Serialize, Deserialize)]
struct FieldElementRepr {
    p: BigInt,
    z: BigInt,
}

impl From<FieldElement> for FieldElementRepr {
    fn from(zp: FieldElement) -> Self {
        Self { p: zp.p, z: zp.z }
    }
}

impl TryFrom<FieldElementRepr> for FieldElement {
    type Error = CoreError;

    fn try_from(repr: FieldElementRepr) -> Result<Self, Self::Error> {
        if repr.p <= BigInt::one() {
            return Err(CoreError::InvalidFieldElement(format!(
                "modulus {} is not a field bound",
                repr.p
            )));
        }
        if repr.z.is_negative() || repr.z >= repr.p {
            return Err(CoreError::InvalidFieldElement(format!(
                "value {} out of range for Z({})",
                repr.z, repr.p
            )));
        }
        Ok(Self { p: repr.p, z: repr.z })
    }
}

/// Deterministic evaluation points `1, -1, 2, -2, ...` in Z(p).
///
/// Both sides of a reconciliation must agree on these for sample values to
/// be comparable.
pub fn sample_points(p: &BigInt, n: usize) -> Vec<FieldElement> {
    (0..n)
        .map(|i| {
            let magnitude = BigInt::from(i / 2 + 1);
            let n = if i % 2 == 0 { magnitude } else { -magnitude };
            FieldElement::new(p.clone(), n)
        })
        .collect()
}

/// Characteristic polynomial of `elements`, `prod(x - z)`, evaluated at each point.
///
/// # Panics
/// If any element belongs to a different field than the points.
pub fn characteristic_samples(
    elements: &[FieldElement],
    points: &[FieldElement],
) -> Vec<FieldElement> {
    points
        .iter()
        .map(|x| {
            let mut acc = x.with_value(1);
            for z in elements {
                let mut factor = x.clone();
                factor.sub([z]);
                acc.mul([&factor]);
            }
            acc
        })
        .collect()
}
