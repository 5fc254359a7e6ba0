use std::f32::consts::PI;

use kinetic2d_math::{Transform2D, Vec2};
use serde::{Deserialize, Serialize};

use super::MassData;
use crate::collision::{Aabb, RayCastInput, RayCastOutput};

/// A solid circle
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CircleShape {
    /// Local center
    pub p: Vec2,
    pub radius: f32,
}

impl Default for CircleShape {
    fn default() -> Self {
        Self { p: Vec2::ZERO, radius: 0.0 }
    }
}

impl CircleShape {
    pub fn new(center: Vec2, radius: f32) -> Self {
        Self { p: center, radius }
    }

    pub fn test_point(&self, xf: &Transform2D, p: Vec2) -> bool {
        let center = xf.apply(self.p);
        (p - center).length_squared() <= self.radius * self.radius
    }

    /// Collision detection in computational geometry, Christer Ericson, section 3.1.2
    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform2D) -> Option<RayCastOutput> {
        let position = xf.apply(self.p);
        let s = input.p1 - position;
        let b = s.length_squared() - self.radius * self.radius;

        // Solve quadratic equation
        let r = input.p2 - input.p1;
        let c = s.dot(r);
        let rr = r.length_squared();
        let sigma = c * c - rr * b;

        // Check for negative discriminant and short segment
        if sigma < 0.0 || rr < f32::EPSILON {
            return None;
        }

        // Find the point of intersection of the line with the circle
        let mut a = -(c + sigma.sqrt());

        // Is the intersection point on the segment
        if 0.0 <= a && a <= input.max_fraction * rr {
            a /= rr;
            let normal = (s + r * a).normalized();
            return Some(RayCastOutput { normal, fraction: a });
        }
        None
    }

    pub fn compute_aabb(&self, xf: &Transform2D) -> Aabb {
        let p = xf.apply(self.p);
        Aabb::from_center(p, Vec2::new(self.radius, self.radius))
    }

    pub fn compute_mass(&self, density: f32) -> MassData {
        let mass = density * PI * self.radius * self.radius;
        // Inertia about the local origin
        let inertia = mass * (0.5 * self.radius * self.radius + self.p.dot(self.p));
        MassData { mass, center: self.p, inertia }
    }

    pub fn compute_distance(&self, xf: &Transform2D, p: Vec2) -> (f32, Vec2) {
        let center = xf.apply(self.p);
        let mut d = p - center;
        let length = d.normalize();
        (length - self.radius, d)
    }
}
