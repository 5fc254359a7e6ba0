//! 2D rotation stored as a sine/cosine pair
//!
//! Keeping both the sine and cosine avoids repeated trigonometry when the
//! same rotation is applied to many points (fixture vertices, anchors).

use serde::{Deserialize, Serialize};
use crate::Vec2;

/// Rotation by an angle, stored as `(sin, cos)`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rot {
    /// Sine of the angle
    pub s: f32,
    /// Cosine of the angle
    pub c: f32,
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rot {
    /// Identity rotation (angle 0)
    pub const IDENTITY: Self = Self { s: 0.0, c: 1.0 };

    /// Create a rotation from an angle in radians
    #[inline]
    pub fn from_angle(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self { s, c }
    }

    /// Set this rotation from an angle in radians
    #[inline]
    pub fn set_angle(&mut self, angle: f32) {
        *self = Self::from_angle(angle);
    }

    /// The angle in radians, in `[-pi, pi]`
    #[inline]
    pub fn angle(&self) -> f32 {
        self.s.atan2(self.c)
    }

    /// The rotated x-axis
    #[inline]
    pub fn x_axis(&self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    /// The rotated y-axis
    #[inline]
    pub fn y_axis(&self) -> Vec2 {
        Vec2::new(-self.s, self.c)
    }

    /// Rotate a vector
    #[inline]
    pub fn apply(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Inverse-rotate a vector
    #[inline]
    pub fn apply_inverse(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// Compose two rotations: `self * other`
    #[inline]
    pub fn mul(&self, other: &Rot) -> Rot {
        // [qc -qs] * [rc -rs] = [qc*rc-qs*rs -qc*rs-qs*rc]
        // [qs  qc]   [rs  rc]   [qs*rc+qc*rs -qs*rs+qc*rc]
        Rot {
            s: self.s * other.c + self.c * other.s,
            c: self.c * other.c - self.s * other.s,
        }
    }

    /// Transpose-compose two rotations: `self^T * other`
    #[inline]
    pub fn mul_transpose(&self, other: &Rot) -> Rot {
        Rot {
            s: self.c * other.s - self.s * other.c,
            c: self.c * other.c + self.s * other.s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const EPSILON: f32 = 1e-5;

    fn approx(a: Vec2, b: Vec2) -> bool {
        (a - b).length() < EPSILON
    }

    #[test]
    fn test_quarter_turn() {
        let q = Rot::from_angle(FRAC_PI_2);
        assert!(approx(q.apply(Vec2::X), Vec2::Y));
        assert!(approx(q.apply_inverse(Vec2::Y), Vec2::X));
    }

    #[test]
    fn test_angle_round_trip() {
        let q = Rot::from_angle(1.25);
        assert!((q.angle() - 1.25).abs() < EPSILON);
    }

    #[test]
    fn test_compose() {
        let a = Rot::from_angle(0.3);
        let b = Rot::from_angle(0.5);
        assert!((a.mul(&b).angle() - 0.8).abs() < EPSILON);
        assert!((a.mul_transpose(&b).angle() - 0.2).abs() < EPSILON);
    }
}
