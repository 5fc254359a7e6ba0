use kinetic2d_math::{Transform2D, Vec2};
use serde::{Deserialize, Serialize};

use super::MassData;
use crate::collision::{Aabb, RayCastInput, RayCastOutput};
use crate::settings::POLYGON_RADIUS;

/// A line segment
///
/// Edges may be connected in chains or loops to other edges. The optional
/// ghost vertices describe the neighbouring segments and are used for smooth
/// collision against the chain.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeShape {
    pub vertex1: Vec2,
    pub vertex2: Vec2,
    /// Ghost vertex preceding `vertex1`
    pub vertex0: Option<Vec2>,
    /// Ghost vertex following `vertex2`
    pub vertex3: Option<Vec2>,
    pub radius: f32,
}

impl Default for EdgeShape {
    fn default() -> Self {
        Self {
            vertex1: Vec2::ZERO,
            vertex2: Vec2::ZERO,
            vertex0: None,
            vertex3: None,
            radius: POLYGON_RADIUS,
        }
    }
}

impl EdgeShape {
    /// An isolated segment
    pub fn new(v1: Vec2, v2: Vec2) -> Self {
        Self {
            vertex1: v1,
            vertex2: v2,
            ..Default::default()
        }
    }

    /// Two-sided ray cast against the segment
    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform2D) -> Option<RayCastOutput> {
        let p1 = xf.apply_inverse(input.p1);
        let p2 = xf.apply_inverse(input.p2);
        let d = p2 - p1;

        let v1 = self.vertex1;
        let v2 = self.vertex2;
        let e = v2 - v1;
        let normal = Vec2::new(e.y, -e.x).normalized();

        // q = p1 + t * d
        // dot(normal, q - v1) = 0
        let numerator = normal.dot(v1 - p1);
        let denominator = normal.dot(d);
        if denominator == 0.0 {
            return None;
        }

        let t = numerator / denominator;
        if t < 0.0 || input.max_fraction < t {
            return None;
        }

        let q = p1 + d * t;

        // q = v1 + s * r
        let r = v2 - v1;
        let rr = r.length_squared();
        if rr == 0.0 {
            return None;
        }
        let s = (q - v1).dot(r) / rr;
        if !(0.0..=1.0).contains(&s) {
            return None;
        }

        let world_normal = xf.q.apply(normal);
        Some(RayCastOutput {
            normal: if numerator > 0.0 { -world_normal } else { world_normal },
            fraction: t,
        })
    }

    pub fn compute_aabb(&self, xf: &Transform2D) -> Aabb {
        let v1 = xf.apply(self.vertex1);
        let v2 = xf.apply(self.vertex2);
        let r = Vec2::new(self.radius, self.radius);
        Aabb::new(v1.min_components(v2) - r, v1.max_components(v2) + r)
    }

    pub fn compute_mass(&self) -> MassData {
        MassData {
            mass: 0.0,
            center: (self.vertex1 + self.vertex2) * 0.5,
            inertia: 0.0,
        }
    }

    /// Distance from a world point to the closest point on the segment
    pub fn compute_distance(&self, xf: &Transform2D, p: Vec2) -> (f32, Vec2) {
        let v1 = xf.apply(self.vertex1);
        let v2 = xf.apply(self.vertex2);

        let mut d = p - v1;
        let s = v2 - v1;
        let ds = d.dot(s);
        if ds > 0.0 {
            let s2 = s.length_squared();
            if ds > s2 {
                d = p - v2;
            } else {
                d -= s * (ds / s2);
            }
        }

        let length = d.normalize();
        (length, d)
    }
}
