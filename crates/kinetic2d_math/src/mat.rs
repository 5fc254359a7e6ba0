//! Small matrices used by the constraint solvers
//!
//! `Mat22` backs two-point block solving for contacts and point constraints;
//! `Mat33` backs the weld and revolute joints. Both are stored column-major.

use serde::{Deserialize, Serialize};
use crate::Vec2;

/// A 3D column vector, only used for 3x3 constraint solving
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    /// Create a new Vec3
    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Dot product
    #[inline]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product
    #[inline]
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    #[inline]
    fn add(self, o: Self) -> Self {
        Self::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl std::ops::AddAssign for Vec3 {
    #[inline]
    fn add_assign(&mut self, o: Self) {
        self.x += o.x;
        self.y += o.y;
        self.z += o.z;
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    #[inline]
    fn sub(self, o: Self) -> Self {
        Self::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

impl std::ops::Neg for Vec3 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;
    #[inline]
    fn mul(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

/// 2x2 matrix (columns `ex`, `ey`)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mat22 {
    pub ex: Vec2,
    pub ey: Vec2,
}

impl Mat22 {
    pub const ZERO: Self = Self { ex: Vec2::ZERO, ey: Vec2::ZERO };

    /// Create from two columns
    #[inline]
    pub const fn new(ex: Vec2, ey: Vec2) -> Self {
        Self { ex, ey }
    }

    /// Multiply by a vector
    #[inline]
    pub fn mul_vec(&self, v: Vec2) -> Vec2 {
        Vec2::new(
            self.ex.x * v.x + self.ey.x * v.y,
            self.ex.y * v.x + self.ey.y * v.y,
        )
    }

    /// Inverse, or the zero matrix when singular
    pub fn inverse(&self) -> Mat22 {
        let (a, b, c, d) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a * d - b * c;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Mat22 {
            ex: Vec2::new(det * d, -det * c),
            ey: Vec2::new(-det * b, det * a),
        }
    }

    /// Solve `A * x = b` without computing the inverse explicitly
    pub fn solve(&self, b: Vec2) -> Vec2 {
        let (a11, a12, a21, a22) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a11 * a22 - a12 * a21;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
    }
}

/// 3x3 matrix (columns `ex`, `ey`, `ez`)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mat33 {
    pub ex: Vec3,
    pub ey: Vec3,
    pub ez: Vec3,
}

impl Mat33 {
    pub const ZERO: Self = Self {
        ex: Vec3::ZERO,
        ey: Vec3::ZERO,
        ez: Vec3::ZERO,
    };

    /// Multiply by a vector
    #[inline]
    pub fn mul_vec(&self, v: Vec3) -> Vec3 {
        self.ex * v.x + self.ey * v.y + self.ez * v.z
    }

    /// Multiply the upper-left 2x2 block by a vector
    #[inline]
    pub fn mul_vec22(&self, v: Vec2) -> Vec2 {
        Vec2::new(
            self.ex.x * v.x + self.ey.x * v.y,
            self.ex.y * v.x + self.ey.y * v.y,
        )
    }

    /// Solve `A * x = b` for the full 3x3 system
    pub fn solve33(&self, b: Vec3) -> Vec3 {
        let mut det = self.ex.dot(self.ey.cross(self.ez));
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec3::new(
            det * b.dot(self.ey.cross(self.ez)),
            det * self.ex.dot(b.cross(self.ez)),
            det * self.ex.dot(self.ey.cross(b)),
        )
    }

    /// Solve `A * x = b` using only the upper-left 2x2 block
    pub fn solve22(&self, b: Vec2) -> Vec2 {
        let (a11, a12, a21, a22) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a11 * a22 - a12 * a21;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
    }

    /// Inverse of the upper-left 2x2 block, zero elsewhere
    pub fn inverse22(&self) -> Mat33 {
        let (a, b, c, d) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a * d - b * c;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Mat33 {
            ex: Vec3::new(det * d, -det * c, 0.0),
            ey: Vec3::new(-det * b, det * a, 0.0),
            ez: Vec3::ZERO,
        }
    }

    /// Inverse of a symmetric 3x3 matrix
    pub fn symmetric_inverse33(&self) -> Mat33 {
        let mut det = self.ex.dot(self.ey.cross(self.ez));
        if det != 0.0 {
            det = 1.0 / det;
        }

        let (a11, a12, a13) = (self.ex.x, self.ey.x, self.ez.x);
        let (a22, a23) = (self.ey.y, self.ez.y);
        let a33 = self.ez.z;

        let ex = Vec3::new(
            det * (a22 * a33 - a23 * a23),
            det * (a13 * a23 - a12 * a33),
            det * (a12 * a23 - a13 * a22),
        );
        let ey = Vec3::new(ex.y, det * (a11 * a33 - a13 * a13), det * (a13 * a12 - a11 * a23));
        let ez = Vec3::new(ex.z, ey.z, det * (a11 * a22 - a12 * a12));
        Mat33 { ex, ey, ez }
    }
}
