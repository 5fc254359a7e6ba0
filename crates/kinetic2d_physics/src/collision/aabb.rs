//! Axis-aligned bounding boxes

use kinetic2d_math::Vec2;
use serde::{Deserialize, Serialize};

use super::{RayCastInput, RayCastOutput};

/// An axis-aligned bounding box
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Bottom-left corner
    pub lower: Vec2,
    /// Top-right corner
    pub upper: Vec2,
}

impl Aabb {
    /// Create a box from its corners
    #[inline]
    pub const fn new(lower: Vec2, upper: Vec2) -> Self {
        Self { lower, upper }
    }

    /// Create a box from a center and half extents
    pub fn from_center(center: Vec2, half_extents: Vec2) -> Self {
        Self {
            lower: center - half_extents,
            upper: center + half_extents,
        }
    }

    /// True if the bounds are sorted and finite
    pub fn is_valid(&self) -> bool {
        let d = self.upper - self.lower;
        d.x >= 0.0 && d.y >= 0.0 && self.lower.is_valid() && self.upper.is_valid()
    }

    pub fn center(&self) -> Vec2 {
        (self.lower + self.upper) * 0.5
    }

    pub fn extents(&self) -> Vec2 {
        (self.upper - self.lower) * 0.5
    }

    /// Perimeter length, used as the tree insertion cost metric
    pub fn perimeter(&self) -> f32 {
        2.0 * ((self.upper.x - self.lower.x) + (self.upper.y - self.lower.y))
    }

    /// Smallest box containing both boxes
    pub fn combine(&self, other: &Aabb) -> Aabb {
        Aabb {
            lower: self.lower.min_components(other.lower),
            upper: self.upper.max_components(other.upper),
        }
    }

    /// Does this box fully contain `other`
    pub fn contains(&self, other: &Aabb) -> bool {
        self.lower.x <= other.lower.x
            && self.lower.y <= other.lower.y
            && other.upper.x <= self.upper.x
            && other.upper.y <= self.upper.y
    }

    /// Test overlap, touching edges count as overlapping
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        if other.lower.x - self.upper.x > 0.0 || other.lower.y - self.upper.y > 0.0 {
            return false;
        }
        if self.lower.x - other.upper.x > 0.0 || self.lower.y - other.upper.y > 0.0 {
            return false;
        }
        true
    }

    /// Grow the box by `amount` on every side
    pub fn fattened(&self, amount: f32) -> Aabb {
        let r = Vec2::new(amount, amount);
        Aabb {
            lower: self.lower - r,
            upper: self.upper + r,
        }
    }

    /// Slab ray cast against the box
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let mut tmin = f32::MIN;
        let mut tmax = f32::MAX;

        let p = input.p1;
        let d = input.p2 - input.p1;
        let abs_d = d.abs();
        let mut normal = Vec2::ZERO;

        for axis in 0..2 {
            let (pi, di, abs_di, lo, hi) = if axis == 0 {
                (p.x, d.x, abs_d.x, self.lower.x, self.upper.x)
            } else {
                (p.y, d.y, abs_d.y, self.lower.y, self.upper.y)
            };

            if abs_di < f32::EPSILON {
                // Parallel
                if pi < lo || hi < pi {
                    return None;
                }
            } else {
                let inv_d = 1.0 / di;
                let mut t1 = (lo - pi) * inv_d;
                let mut t2 = (hi - pi) * inv_d;
                let mut s = -1.0;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                    s = 1.0;
                }
                if t1 > tmin {
                    normal = if axis == 0 { Vec2::new(s, 0.0) } else { Vec2::new(0.0, s) };
                    tmin = t1;
                }
                tmax = tmax.min(t2);
                if tmin > tmax {
                    return None;
                }
            }
        }

        // Does the ray start inside the box, or is the hit beyond max_fraction
        if tmin < 0.0 || input.max_fraction < tmin {
            return None;
        }

        Some(RayCastOutput { normal, fraction: tmin })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Aabb {
        Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0))
    }

    #[test]
    fn test_overlap_and_touch() {
        let a = unit_box();
        let b = Aabb::new(Vec2::new(1.0, 0.0), Vec2::new(2.0, 1.0));
        let c = Aabb::new(Vec2::new(1.1, 0.0), Vec2::new(2.0, 1.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_combine_and_contains() {
        let a = unit_box();
        let b = Aabb::new(Vec2::new(-1.0, 0.5), Vec2::new(0.5, 3.0));
        let c = a.combine(&b);
        assert!(c.contains(&a));
        assert!(c.contains(&b));
        assert_eq!(c.lower, Vec2::new(-1.0, 0.0));
        assert_eq!(c.upper, Vec2::new(1.0, 3.0));
    }

    #[test]
    fn test_perimeter() {
        assert_eq!(unit_box().perimeter(), 4.0);
    }

    #[test]
    fn test_ray_cast_hits_left_face() {
        let input = RayCastInput {
            p1: Vec2::new(-1.0, 0.5),
            p2: Vec2::new(2.0, 0.5),
            max_fraction: 1.0,
        };
        let out = unit_box().ray_cast(&input).expect("ray should hit");
        assert!((out.fraction - 1.0 / 3.0).abs() < 1e-5);
        assert_eq!(out.normal, Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn test_ray_cast_miss() {
        let input = RayCastInput {
            p1: Vec2::new(-1.0, 2.0),
            p2: Vec2::new(2.0, 2.0),
            max_fraction: 1.0,
        };
        assert!(unit_box().ray_cast(&input).is_none());
    }
}
