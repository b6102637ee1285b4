//! Rational time bases and timestamp rescaling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A rational number used for frame rates and time bases.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    /// Numerator.
    pub num: i64,
    /// Denominator.
    pub den: i64,
}

impl Rational {
    /// Create a new rational number with a positive denominator.
    ///
    /// # Panics
    ///
    /// Panics if denominator is zero.
    pub fn new(num: i64, den: i64) -> Self {
        assert!(den != 0, "Denominator cannot be zero");
        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        Self { num, den }
    }

    /// Whether the value is strictly positive with a non-zero denominator.
    pub fn is_positive(&self) -> bool {
        self.den != 0 && (self.num > 0) == (self.den > 0) && self.num != 0
    }

    /// Reciprocal.
    pub fn inv(&self) -> Self {
        Self::new(self.den, self.num)
    }

    /// Product, reduced.
    pub fn mul(&self, other: Rational) -> Self {
        let num = self.num as i128 * other.num as i128;
        let den = self.den as i128 * other.den as i128;
        let g = gcd(num.unsigned_abs(), den.unsigned_abs()).max(1) as i128;
        Self::new((num / g) as i64, (den / g) as i64)
    }

    /// Convert to f64.
    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Time base in which one frame at `frame_rate` lasts four ticks.
    ///
    /// Cadence jitter is expressed in these quarter-frame units.
    ///
    /// A zero frame rate yields a zero denominator instead of panicking, so
    /// [`is_positive`](Self::is_positive) can reject it later.
    pub fn quarter_frame(frame_rate: Rational) -> Self {
        let (num, den) = (frame_rate.den, frame_rate.num * 4);
        if den < 0 {
            Self { num: -num, den: -den }
        } else {
            Self { num, den }
        }
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rational({}/{})", self.num, self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Rescale `value` from time base `from` to time base `to`, rounding to nearest
/// (halves away from zero).
pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
    let num = value as i128 * from.num as i128 * to.den as i128;
    let den = from.den as i128 * to.num as i128;
    if den == 0 {
        return 0;
    }
    let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
    let half = den / 2;
    let q = if num >= 0 {
        (num + half) / den
    } else {
        (num - half) / den
    };
    q as i64
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rescale_identity() {
        let tb = Rational::new(1, 120);
        assert_eq!(rescale(37, tb, tb), 37);
    }

    #[test]
    fn test_rescale_rounds_to_nearest() {
        // 5 ticks of 1/120 in 1/1000 = 41.666.. -> 42
        assert_eq!(rescale(5, Rational::new(1, 120), Rational::new(1, 1000)), 42);
        // 3 ticks of 1/2 in 1/1 = 1.5 -> 2
        assert_eq!(rescale(3, Rational::new(1, 2), Rational::new(1, 1)), 2);
        assert_eq!(rescale(-3, Rational::new(1, 2), Rational::new(1, 1)), -2);
    }

    #[test]
    fn test_quarter_frame() {
        let ntsc = Rational::new(30000, 1001);
        let tb = Rational::quarter_frame(ntsc);
        assert_eq!(tb, Rational::new(1001, 120000));
        // One frame is four ticks.
        assert_eq!(rescale(1, ntsc.inv(), tb), 4);

        let zero = Rational::quarter_frame(Rational::new(0, 1));
        assert!(!zero.is_positive());
        assert_eq!(Rational::quarter_frame(Rational::new(-30, 1)), Rational::new(-1, 120));
    }

    #[test]
    fn test_mul_reduces() {
        let r = Rational::new(30000, 1001).mul(Rational::new(4, 5));
        assert_eq!(r, Rational::new(24000, 1001));
    }

    #[test]
    fn test_is_positive() {
        assert!(Rational::new(1, 4).is_positive());
        assert!(!Rational::new(0, 4).is_positive());
        assert!(!Rational::new(-1, 4).is_positive());
        assert!(!Rational { num: 1, den: 0 }.is_positive());
    }
}
