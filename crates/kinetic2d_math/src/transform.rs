//! Rigid 2D transform (translation + rotation)

use serde::{Deserialize, Serialize};
use crate::{Rot, Vec2};

/// A rigid transform: rotation followed by translation
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform2D {
    /// Translation
    pub p: Vec2,
    /// Rotation
    pub q: Rot,
}

impl Transform2D {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        p: Vec2::ZERO,
        q: Rot::IDENTITY,
    };

    /// Create a transform from a position and a rotation
    #[inline]
    pub fn new(p: Vec2, q: Rot) -> Self {
        Self { p, q }
    }

    /// Create a transform from a position and an angle in radians
    #[inline]
    pub fn from_angle(p: Vec2, angle: f32) -> Self {
        Self { p, q: Rot::from_angle(angle) }
    }

    /// Transform a point from local to world space
    #[inline]
    pub fn apply(&self, v: Vec2) -> Vec2 {
        self.q.apply(v) + self.p
    }

    /// Transform a point from world to local space
    #[inline]
    pub fn apply_inverse(&self, v: Vec2) -> Vec2 {
        self.q.apply_inverse(v - self.p)
    }

    /// Compose: `self * other` (apply `other` first)
    #[inline]
    pub fn mul(&self, other: &Transform2D) -> Transform2D {
        Transform2D {
            q: self.q.mul(&other.q),
            p: self.q.apply(other.p) + self.p,
        }
    }

    /// Relative transform: `self^-1 * other`
    #[inline]
    pub fn mul_transpose(&self, other: &Transform2D) -> Transform2D {
        Transform2D {
            q: self.q.mul_transpose(&other.q),
            p: self.q.apply_inverse(other.p - self.p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_apply_and_inverse() {
        let xf = Transform2D::from_angle(Vec2::new(3.0, -1.0), 0.7);
        let local = Vec2::new(1.5, 2.0);
        let world = xf.apply(local);
        assert!((xf.apply_inverse(world) - local).length() < EPSILON);
    }

    #[test]
    fn test_relative_transform() {
        let a = Transform2D::from_angle(Vec2::new(1.0, 2.0), 0.4);
        let b = Transform2D::from_angle(Vec2::new(-2.0, 0.5), -1.1);
        let rel = a.mul_transpose(&b);
        let back = a.mul(&rel);
        assert!((back.p - b.p).length() < EPSILON);
        assert!((back.q.angle() - b.q.angle()).abs() < EPSILON);
    }
}
