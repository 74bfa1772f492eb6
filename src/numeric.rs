//! Fixed-point scaled-integer arithmetic for money values.
//!
//! All prices, amounts and funds in the engine are represented as a raw
//! `i128` paired with an explicit decimal precision, rather than as floats
//! or as bare `Decimal`. This keeps every arithmetic step auditable: a
//! multiplication always states the resulting precision, and truncation
//! (never rounding) is the only conversion mode from decimal input.

use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;

/// A value scaled by `10^precision`, e.g. `FixedPoint { raw: 12345, precision: 2 }`
/// represents `123.45`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedPoint {
    raw: i128,
    precision: u32,
}

impl FixedPoint {
    pub const fn new(raw: i128, precision: u32) -> Self {
        Self { raw, precision }
    }

    pub const fn zero(precision: u32) -> Self {
        Self { raw: 0, precision }
    }

    pub fn raw(&self) -> i128 {
        self.raw
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }

    pub fn is_positive(&self) -> bool {
        self.raw > 0
    }

    /// Convert a human-readable decimal to a scaled integer at `precision`,
    /// truncating toward zero (never rounding).
    pub fn from_decimal(value: Decimal, precision: u32) -> Self {
        let scale_factor = Decimal::from(10i64.pow(precision));
        let scaled = (value * scale_factor).trunc();
        let raw = scaled.mantissa() / 10i128.pow(scaled.scale());
        Self { raw, precision }
    }

    /// Convert back to a human-readable decimal.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::from_i128_with_scale(self.raw, self.precision)
    }

    /// `mul(a@p, b@q) = ab @ (p+q)`.
    pub fn mul(&self, other: &FixedPoint) -> FixedPoint {
        FixedPoint {
            raw: self.raw * other.raw,
            precision: self.precision + other.precision,
        }
    }

    /// `div(a@p, b@q) = (a / b) @ (p - q)`, truncating toward zero.
    ///
    /// Panics on division by zero; callers must check `is_zero()` first,
    /// matching the engine's contract that a zero price or zero remaining
    /// amount is always rejected before arithmetic is attempted.
    pub fn div(&self, other: &FixedPoint) -> FixedPoint {
        assert!(!other.is_zero(), "division by zero in fixed-point arithmetic");
        FixedPoint {
            raw: self.raw / other.raw,
            precision: self.precision.saturating_sub(other.precision),
        }
    }

    /// `add/sub` require equal precision.
    pub fn add(&self, other: &FixedPoint) -> FixedPoint {
        assert_eq!(self.precision, other.precision, "precision mismatch in add");
        FixedPoint {
            raw: self.raw + other.raw,
            precision: self.precision,
        }
    }

    pub fn sub(&self, other: &FixedPoint) -> FixedPoint {
        assert_eq!(self.precision, other.precision, "precision mismatch in sub");
        FixedPoint {
            raw: self.raw - other.raw,
            precision: self.precision,
        }
    }

    pub fn min(&self, other: &FixedPoint) -> FixedPoint {
        assert_eq!(self.precision, other.precision, "precision mismatch in min");
        if self.raw <= other.raw {
            *self
        } else {
            *other
        }
    }

    /// Rescale to a different precision, truncating toward zero if narrowing.
    pub fn rescale(&self, precision: u32) -> FixedPoint {
        if precision == self.precision {
            return *self;
        }
        if precision > self.precision {
            FixedPoint {
                raw: self.raw * 10i128.pow(precision - self.precision),
                precision,
            }
        } else {
            FixedPoint {
                raw: self.raw / 10i128.pow(self.precision - precision),
                precision,
            }
        }
    }
}

impl Ord for FixedPoint {
    fn cmp(&self, other: &Self) -> Ordering {
        debug_assert_eq!(self.precision, other.precision, "comparing FixedPoint values at different precisions");
        self.raw.cmp(&other.raw)
    }
}

impl PartialOrd for FixedPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}
