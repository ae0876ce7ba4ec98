use std::fmt::Display;
use std::ops::{Mul, Neg};

use derive_more::{Add, AddAssign, From};
use num::{BigInt, BigRational, One, Signed, Zero};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Relative tolerance of the float to rational conversion.
const FLOAT_TOLERANCE: f64 = 1e-14;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoefficientError {
    #[error("Coefficient {0} is not a finite number")]
    NonFinite(f64),
}

/// Exact scalar prefactor of a term.
///
/// Arbitrary precision: sums of many small prefactors with coprime denominators
/// stay exact.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Add,
    AddAssign,
    From,
)]
pub struct Coefficient(BigRational);

impl Coefficient {
    pub fn new(numer: i64, denom: i64) -> Self {
        Coefficient(BigRational::new(BigInt::from(numer), BigInt::from(denom)))
    }

    pub fn integer(value: i64) -> Self {
        Coefficient(BigRational::from_integer(BigInt::from(value)))
    }

    pub fn one() -> Self {
        Coefficient(BigRational::one())
    }

    pub fn zero() -> Self {
        Coefficient(BigRational::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[must_use]
    pub fn abs(&self) -> Self {
        Coefficient(self.0.abs())
    }

    /// `1/n!`, the Baker–Campbell–Hausdorff weight of the n-th nested commutator.
    pub fn inverse_factorial(n: usize) -> Self {
        let factorial: BigInt = (1..=n).map(BigInt::from).product();
        Coefficient(BigRational::new(BigInt::one(), factorial))
    }
}

/// First continued-fraction convergent `h/k` of `target >= 0` within the relative
/// [`FLOAT_TOLERANCE`], `None` once the convergents leave `i64`.
fn convergent(target: f64) -> Option<(i64, i64)> {
    let tolerance = FLOAT_TOLERANCE * target;
    let (mut h_prev, mut h) = (0i64, 1i64);
    let (mut k_prev, mut k) = (1i64, 0i64);
    let mut rest = target;
    loop {
        let a = rest.floor();
        if a > (i64::MAX / 2) as f64 {
            return None;
        }
        let a = a as i64;
        let h_next = a.checked_mul(h)?.checked_add(h_prev)?;
        let k_next = a.checked_mul(k)?.checked_add(k_prev)?;
        (h_prev, h) = (h, h_next);
        (k_prev, k) = (k, k_next);

        // relative, so a nonzero target never stops at 0/1
        let fraction = rest - a as f64;
        if (h as f64 / k as f64 - target).abs() <= tolerance || fraction == 0.0 {
            return Some((h, k));
        }
        rest = 1.0 / fraction;
    }
}

impl TryFrom<f64> for Coefficient {
    type Error = CoefficientError;

    /// Continued-fraction expansion, stopped at the first convergent within
    /// [`FLOAT_TOLERANCE`], so `1.0 / 6.0` becomes exactly `1/6`. Values without
    /// a 64-bit convergent keep their exact binary value.
    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() {
            return Err(CoefficientError::NonFinite(value));
        }
        match convergent(value.abs()) {
            Some((h, k)) => {
                let numer = if value < 0.0 { -h } else { h };
                Ok(Coefficient::new(numer, k))
            }
            None => BigRational::from_float(value)
                .map(Coefficient)
                .ok_or(CoefficientError::NonFinite(value)),
        }
    }
}

impl From<i64> for Coefficient {
    fn from(value: i64) -> Self {
        Coefficient::integer(value)
    }
}

impl Mul for Coefficient {
    type Output = Coefficient;
    fn mul(self, rhs: Coefficient) -> Self::Output {
        Coefficient(self.0 * rhs.0)
    }
}

impl Mul<Sign> for Coefficient {
    type Output = Coefficient;
    fn mul(self, rhs: Sign) -> Self::Output {
        match rhs {
            Sign::Plus => self,
            Sign::Minus => -self,
        }
    }
}

impl Neg for Coefficient {
    type Output = Coefficient;
    fn neg(self) -> Self::Output {
        Coefficient(-self.0)
    }
}

impl Display for Coefficient {
    /// Always signed: `+1`, `-1/2`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0.is_negative() { '-' } else { '+' };
        let abs = self.0.abs();
        if abs.is_integer() {
            write!(f, "{sign}{}", abs.numer())
        } else {
            write!(f, "{sign}{}/{}", abs.numer(), abs.denom())
        }
    }
}

/// Fermionic sign picked up by reordering elementary operators.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Sign {
    #[default]
    Plus,
    Minus,
}

impl Sign {
    /// `(-1)^odd`
    pub fn from_parity(odd: bool) -> Self {
        if odd {
            Sign::Minus
        } else {
            Sign::Plus
        }
    }
}

impl Neg for Sign {
    type Output = Sign;
    fn neg(self) -> Self::Output {
        match self {
            Sign::Plus => Sign::Minus,
            Sign::Minus => Sign::Plus,
        }
    }
}

impl Mul for Sign {
    type Output = Sign;
    fn mul(self, rhs: Sign) -> Self::Output {
        if self == rhs {
            Sign::Plus
        } else {
            Sign::Minus
        }
    }
}

impl Display for Sign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sign::Plus => write!(f, "+"),
            Sign::Minus => write!(f, "-"),
        }
    }
}
