//! Fixed-point math utilities for deterministic simulation.
//!
//! All battle-space coordinates, distances and damage multipliers use
//! fixed-point arithmetic so that the same battle replays identically on
//! every platform. Square roots, logarithms and powers are computed in
//! fixed-point. Only headings go through `f64` trigonometry and are
//! rounded back into fixed-point immediately.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for hand-written data files.
///
/// Catalogs, configuration and scenarios are authored by people, so their
/// fixed-point fields are written as plain decimals (`12.5`) and rounded
/// into fixed-point on load.
pub mod decimal_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as a decimal.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_num::<f64>().serialize(serializer)
    }

    /// Deserialize a fixed-point number from a decimal.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Ok(Fixed::saturating_from_num(value))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Create a vector from integer coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Unit-length vector pointing along `angle` (radians, 0 = +x, clockwise
    /// in screen space because +y points down).
    #[must_use]
    pub fn from_angle(angle: Fixed) -> Self {
        let a = angle.to_num::<f64>();
        Self::new(Fixed::from_num(a.cos()), Fixed::from_num(a.sin()))
    }

    /// Angle of this vector in radians, normalized to `[0, 2π)`.
    #[must_use]
    pub fn angle(self) -> Fixed {
        let a = self.y.to_num::<f64>().atan2(self.x.to_num::<f64>());
        normalize_angle(Fixed::from_num(a))
    }

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }

    /// Euclidean distance between two points.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Length of the vector.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.dot(self))
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x
            .saturating_mul(other.x)
            .saturating_add(self.y.saturating_mul(other.y))
    }

    /// Multiply both components by a scalar.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Linearly interpolate between two vectors.
    #[must_use]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == Fixed::ZERO {
            return Self::ZERO;
        }
        Self::new(self.x / len, self.y / len)
    }

    /// Move from `self` toward `target` by at most `step`.
    ///
    /// Returns the new point and whether the target was reached.
    #[must_use]
    pub fn step_toward(self, target: Self, step: Fixed) -> (Self, bool) {
        let dist = self.distance(target);
        if dist <= step || dist == Fixed::ZERO {
            return (target, true);
        }
        let dir = (target - self).normalize();
        (self + dir.scale(step), false)
    }
}

/// Computes the square root of a fixed-point number using binary search.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::ONE { value } else { Fixed::ONE };

    for _ in 0..64 {
        let mid = low + (high - low) / Fixed::from_num(2);
        if mid == low {
            break;
        }
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

/// π in fixed-point.
#[must_use]
pub fn pi() -> Fixed {
    Fixed::from_num(std::f64::consts::PI)
}

/// 2π in fixed-point.
#[must_use]
pub fn tau() -> Fixed {
    Fixed::from_num(std::f64::consts::TAU)
}

/// Wrap an angle into `[0, 2π)`.
#[must_use]
pub fn normalize_angle(angle: Fixed) -> Fixed {
    let full = tau();
    let mut a = angle % full;
    if a < Fixed::ZERO {
        a += full;
    }
    if a >= full {
        a -= full;
    }
    a
}

/// Signed shortest rotation from `from` to `to`, in `(-π, π]`.
#[must_use]
pub fn angle_delta(from: Fixed, to: Fixed) -> Fixed {
    let mut d = normalize_angle(to) - normalize_angle(from);
    let half = pi();
    let full = tau();
    if d > half {
        d -= full;
    } else if d <= -half {
        d += full;
    }
    d
}

fn ln_2() -> Fixed {
    Fixed::from_num(std::f64::consts::LN_2)
}

/// Natural logarithm. Non-positive values yield zero.
///
/// The value is scaled into `[1, 2)` by powers of two and the mantissa
/// goes through the `atanh` series `ln(m) = 2 atanh((m - 1) / (m + 1))`.
#[must_use]
pub fn fixed_ln(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }
    let two = Fixed::from_num(2);
    let mut m = value;
    let mut k: i32 = 0;
    while m >= two {
        m /= two;
        k += 1;
    }
    while m < Fixed::ONE {
        m *= two;
        k -= 1;
    }

    let z = (m - Fixed::ONE) / (m + Fixed::ONE);
    let z2 = z * z;
    let mut term = z;
    let mut sum = Fixed::ZERO;
    for n in 0..32 {
        if term == Fixed::ZERO {
            break;
        }
        sum += term / Fixed::from_num(2 * n + 1);
        term *= z2;
    }
    sum * two + ln_2() * Fixed::from_num(k)
}

/// `e` raised to `value`, saturating on overflow.
///
/// Splits `value = n ln 2 + r` with `r` in `[0, ln 2)`, sums the Taylor
/// series of `e^r` and shifts by `n`.
#[must_use]
pub fn fixed_exp(value: Fixed) -> Fixed {
    let n = value.saturating_div(ln_2()).floor();
    if n >= Fixed::from_num(31) {
        return Fixed::MAX;
    }
    if n <= Fixed::from_num(-33) {
        return Fixed::ZERO;
    }
    let r = value - n * ln_2();

    let mut term = Fixed::ONE;
    let mut sum = Fixed::ONE;
    for i in 1..32 {
        term = term * r / Fixed::from_num(i);
        if term == Fixed::ZERO {
            break;
        }
        sum += term;
    }

    let n = n.to_num::<i32>();
    if n >= 0 {
        sum.saturating_mul(Fixed::from_num(1_i32 << n))
    } else {
        sum >> n.unsigned_abs()
    }
}

/// `base` raised to `exponent` as `exp(exponent * ln(base))`.
///
/// Non-positive bases yield zero.
#[must_use]
pub fn fixed_pow(base: Fixed, exponent: Fixed) -> Fixed {
    if base <= Fixed::ZERO {
        return Fixed::ZERO;
    }
    if base == Fixed::ONE || exponent == Fixed::ZERO {
        return Fixed::ONE;
    }
    fixed_exp(exponent.saturating_mul(fixed_ln(base)))
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epsilon() -> Fixed {
        Fixed::ONE / Fixed::from_num(1000)
    }

    #[test]
    fn test_vec2_distance_squared() {
        let a = Vec2Fixed::from_ints(3, 0);
        let b = Vec2Fixed::from_ints(0, 4);
        // 3² + 4² = 25
        assert_eq!(a.distance_squared(b), Fixed::from_num(25));
        assert!((a.distance(b) - Fixed::from_num(5)).abs() < epsilon());
    }

    #[test]
    fn test_fixed_determinism() {
        let a = Fixed::from_num(1) / Fixed::from_num(3);
        let b = Fixed::from_num(1) / Fixed::from_num(3);
        assert_eq!(a, b);
        assert_eq!(a * Fixed::from_num(7), b * Fixed::from_num(7));
    }

    #[test]
    fn test_vec2_normalize() {
        let norm = Vec2Fixed::from_ints(3, 4).normalize();
        let len_sq = norm.dot(norm);
        assert!((len_sq - Fixed::ONE).abs() < epsilon());
        let ratio_diff = (norm.x * Fixed::from_num(4)) - (norm.y * Fixed::from_num(3));
        assert!(ratio_diff.abs() < epsilon());
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(Vec2Fixed::ZERO.normalize(), Vec2Fixed::ZERO);
    }

    #[test]
    fn test_step_toward_stops_at_target() {
        let from = Vec2Fixed::from_ints(0, 0);
        let to = Vec2Fixed::from_ints(3, 0);
        let (p, arrived) = from.step_toward(to, Fixed::from_num(2));
        assert!(!arrived);
        assert!((p.x - Fixed::from_num(2)).abs() < epsilon());
        let (p, arrived) = p.step_toward(to, Fixed::from_num(2));
        assert!(arrived);
        assert_eq!(p, to);
    }

    #[test]
    fn test_angle_roundtrip_quadrants() {
        let down = Vec2Fixed::from_ints(0, 5).angle();
        assert!((down - pi() / Fixed::from_num(2)).abs() < epsilon());
        let left = Vec2Fixed::from_ints(-5, 0).angle();
        assert!((left - pi()).abs() < epsilon());
        let up = Vec2Fixed::from_ints(0, -5).angle();
        assert!((up - pi() * Fixed::from_num(3) / Fixed::from_num(2)).abs() < epsilon());
    }

    #[test]
    fn test_angle_delta_takes_short_way() {
        let a = Fixed::from_num(0.1);
        let b = tau() - Fixed::from_num(0.1);
        let d = angle_delta(a, b);
        assert!((d + Fixed::from_num(0.2)).abs() < epsilon());
        assert!((angle_delta(b, a) - Fixed::from_num(0.2)).abs() < epsilon());
    }

    #[test]
    fn test_normalize_angle_wraps_negative() {
        let a = normalize_angle(-pi() / Fixed::from_num(2));
        assert!((a - pi() * Fixed::from_num(3) / Fixed::from_num(2)).abs() < epsilon());
    }

    #[test]
    fn test_pow_inverse_cube_root() {
        // 8^(-1/3) = 0.5
        let v = fixed_pow(Fixed::from_num(8), Fixed::from_num(-1) / Fixed::from_num(3));
        assert!((v - Fixed::from_num(0.5)).abs() < epsilon());
        assert_eq!(fixed_pow(Fixed::ZERO, Fixed::ONE), Fixed::ZERO);
        assert_eq!(fixed_pow(Fixed::from_num(7), Fixed::ZERO), Fixed::ONE);
    }

    #[test]
    fn test_pow_integer_exponents() {
        let v = fixed_pow(Fixed::from_num(2), Fixed::from_num(10));
        assert!((v - Fixed::from_num(1024)).abs() < Fixed::from_num(0.01));
        let v = fixed_pow(Fixed::from_num(10), Fixed::from_num(-2));
        assert!((v - Fixed::from_num(0.01)).abs() < epsilon());
    }

    #[test]
    fn test_ln_and_exp() {
        assert_eq!(fixed_ln(Fixed::ONE), Fixed::ZERO);
        assert_eq!(fixed_ln(Fixed::ZERO), Fixed::ZERO);
        let e = Fixed::from_num(std::f64::consts::E);
        assert!((fixed_ln(e) - Fixed::ONE).abs() < epsilon());
        assert!((fixed_ln(Fixed::from_num(0.25)) + ln_2() * Fixed::from_num(2)).abs() < epsilon());

        assert_eq!(fixed_exp(Fixed::ZERO), Fixed::ONE);
        assert!((fixed_exp(Fixed::ONE) - e).abs() < epsilon());
        assert!((fixed_exp(Fixed::from_num(-3)) - Fixed::from_num(0.049_787)).abs() < epsilon());
        assert_eq!(fixed_exp(Fixed::from_num(100)), Fixed::MAX);
        assert_eq!(fixed_exp(Fixed::from_num(-100)), Fixed::ZERO);
    }

    #[test]
    fn test_focus_penalty_matches_float_reference() {
        // n^(-3/10), the default diminishing-returns curve
        let exponent = Fixed::from_num(-3) / Fixed::from_num(10);
        for n in 2..=12_i32 {
            let expected = f64::from(n).powf(-0.3);
            let v = fixed_pow(Fixed::from_num(n), exponent).to_num::<f64>();
            assert!((v - expected).abs() < 1e-6, "{n}: {v} vs {expected}");
        }
    }
}
