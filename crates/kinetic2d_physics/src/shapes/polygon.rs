use kinetic2d_math::{Rot, Transform2D, Vec2};
use serde::{Deserialize, Serialize};

use super::MassData;
use crate::collision::{Aabb, RayCastInput, RayCastOutput};
use crate::error::{PhysicsError, PhysicsResult};
use crate::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES, POLYGON_RADIUS};

/// A convex polygon with counter-clockwise winding
///
/// Polygons are solid and carry a small skin radius so that the collision
/// margin keeps stacks stable.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolygonShape {
    pub centroid: Vec2,
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    normals: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
    pub radius: f32,
}

impl Default for PolygonShape {
    fn default() -> Self {
        Self {
            centroid: Vec2::ZERO,
            vertices: [Vec2::ZERO; MAX_POLYGON_VERTICES],
            normals: [Vec2::ZERO; MAX_POLYGON_VERTICES],
            count: 0,
            radius: POLYGON_RADIUS,
        }
    }
}

impl PolygonShape {
    /// Build the convex hull of a point cloud
    ///
    /// Points closer than half the linear slop are welded. Fails if fewer
    /// than three distinct, non-collinear points remain or more than
    /// [`MAX_POLYGON_VERTICES`] points are given.
    pub fn new(points: &[Vec2]) -> PhysicsResult<Self> {
        if points.len() > MAX_POLYGON_VERTICES {
            return Err(PhysicsError::InvalidShape(format!(
                "polygon has {} vertices, at most {} are supported",
                points.len(),
                MAX_POLYGON_VERTICES
            )));
        }

        let weld = 0.5 * LINEAR_SLOP;
        let mut ps: Vec<Vec2> = Vec::with_capacity(points.len());
        for &v in points {
            if ps.iter().all(|p| v.distance_squared(*p) > weld * weld) {
                ps.push(v);
            }
        }

        if ps.len() < 3 {
            return Err(PhysicsError::InvalidShape(
                "polygon needs at least 3 distinct vertices".to_string(),
            ));
        }

        // Gift wrapping, starting at the rightmost (then lowest) point
        let mut i0 = 0;
        for (i, p) in ps.iter().enumerate().skip(1) {
            let best = ps[i0];
            if p.x > best.x || (p.x == best.x && p.y < best.y) {
                i0 = i;
            }
        }

        let mut hull: Vec<usize> = Vec::with_capacity(ps.len());
        let mut ih = i0;
        loop {
            if hull.len() > ps.len() {
                return Err(PhysicsError::InvalidShape("polygon hull did not close".to_string()));
            }
            hull.push(ih);

            let mut ie = 0;
            for j in 1..ps.len() {
                if ie == ih {
                    ie = j;
                    continue;
                }
                let r = ps[ie] - ps[ih];
                let v = ps[j] - ps[ih];
                let c = r.cross(v);
                if c < 0.0 {
                    ie = j;
                }
                // Collinear: keep the farthest point
                if c == 0.0 && v.length_squared() > r.length_squared() {
                    ie = j;
                }
            }

            ih = ie;
            if ie == i0 {
                break;
            }
        }

        if hull.len() < 3 {
            return Err(PhysicsError::InvalidShape("polygon vertices are collinear".to_string()));
        }

        let mut shape = PolygonShape {
            count: hull.len(),
            ..Default::default()
        };
        for (i, &h) in hull.iter().enumerate() {
            shape.vertices[i] = ps[h];
        }
        shape.compute_normals();
        shape.centroid = compute_centroid(shape.vertices());
        Ok(shape)
    }

    /// Axis-aligned box centered on the local origin
    pub fn new_box(hx: f32, hy: f32) -> Self {
        let mut shape = PolygonShape::default();
        shape.set_as_box(hx, hy);
        shape
    }

    /// Make this polygon an axis-aligned box with the given half extents
    pub fn set_as_box(&mut self, hx: f32, hy: f32) {
        self.count = 4;
        self.vertices[0] = Vec2::new(-hx, -hy);
        self.vertices[1] = Vec2::new(hx, -hy);
        self.vertices[2] = Vec2::new(hx, hy);
        self.vertices[3] = Vec2::new(-hx, hy);
        self.normals[0] = Vec2::new(0.0, -1.0);
        self.normals[1] = Vec2::new(1.0, 0.0);
        self.normals[2] = Vec2::new(0.0, 1.0);
        self.normals[3] = Vec2::new(-1.0, 0.0);
        self.centroid = Vec2::ZERO;
    }

    /// Make this polygon a box placed at `center` and rotated by `angle`
    pub fn set_as_oriented_box(&mut self, hx: f32, hy: f32, center: Vec2, angle: f32) {
        self.set_as_box(hx, hy);
        self.centroid = center;
        let xf = Transform2D::new(center, Rot::from_angle(angle));
        for i in 0..self.count {
            self.vertices[i] = xf.apply(self.vertices[i]);
            self.normals[i] = xf.q.apply(self.normals[i]);
        }
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices[..self.count]
    }

    pub fn normals(&self) -> &[Vec2] {
        &self.normals[..self.count]
    }

    pub fn vertex_count(&self) -> usize {
        self.count
    }

    fn compute_normals(&mut self) {
        for i in 0..self.count {
            let i2 = if i + 1 < self.count { i + 1 } else { 0 };
            let edge = self.vertices[i2] - self.vertices[i];
            self.normals[i] = edge.cross_scalar(1.0).normalized();
        }
    }

    pub fn test_point(&self, xf: &Transform2D, p: Vec2) -> bool {
        let p_local = xf.apply_inverse(p);
        self.vertices()
            .iter()
            .zip(self.normals())
            .all(|(v, n)| n.dot(p_local - *v) <= 0.0)
    }

    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform2D) -> Option<RayCastOutput> {
        // Put the ray into the polygon's frame of reference
        let p1 = xf.apply_inverse(input.p1);
        let p2 = xf.apply_inverse(input.p2);
        let d = p2 - p1;

        let mut lower = 0.0;
        let mut upper = input.max_fraction;
        let mut index = None;

        for i in 0..self.count {
            // p = p1 + a * d
            // dot(normal, p - v) = 0
            // dot(normal, p1 - v) + a * dot(normal, d) = 0
            let numerator = self.normals[i].dot(self.vertices[i] - p1);
            let denominator = self.normals[i].dot(d);

            if denominator == 0.0 {
                if numerator < 0.0 {
                    return None;
                }
            } else if denominator < 0.0 && numerator < lower * denominator {
                // The segment enters this half-space
                lower = numerator / denominator;
                index = Some(i);
            } else if denominator > 0.0 && numerator < upper * denominator {
                // The segment exits this half-space
                upper = numerator / denominator;
            }

            if upper < lower {
                return None;
            }
        }

        index.map(|i| RayCastOutput {
            normal: xf.q.apply(self.normals[i]),
            fraction: lower,
        })
    }

    pub fn compute_aabb(&self, xf: &Transform2D) -> Aabb {
        let first = xf.apply(self.vertices[0]);
        let (lower, upper) = self.vertices()[1..].iter().fold((first, first), |(lo, hi), v| {
            let w = xf.apply(*v);
            (lo.min_components(w), hi.max_components(w))
        });
        let r = Vec2::new(self.radius, self.radius);
        Aabb::new(lower - r, upper + r)
    }

    /// Mass, centroid and inertia by triangle fan decomposition
    pub fn compute_mass(&self, density: f32) -> MassData {
        const INV3: f32 = 1.0 / 3.0;
        let mut center = Vec2::ZERO;
        let mut area = 0.0;
        let mut inertia = 0.0;

        // Reference point inside the polygon keeps the sums well conditioned
        let s = self.vertices[0];

        for i in 0..self.count {
            let e1 = self.vertices[i] - s;
            let e2 = if i + 1 < self.count {
                self.vertices[i + 1] - s
            } else {
                self.vertices[0] - s
            };

            let d = e1.cross(e2);
            let triangle_area = 0.5 * d;
            area += triangle_area;
            center += (e1 + e2) * (triangle_area * INV3);

            let intx2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let inty2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 * INV3 * d) * (intx2 + inty2);
        }

        if area <= f32::EPSILON {
            return MassData::default();
        }

        let mass = density * area;
        center = center * (1.0 / area);
        let mass_center = center + s;

        // Shift from the reference point to the body origin
        let inertia = density * inertia + mass * (mass_center.dot(mass_center) - center.dot(center));
        MassData { mass, center: mass_center, inertia }
    }

    /// Distance from a world point to the polygon surface
    pub fn compute_distance(&self, xf: &Transform2D, p: Vec2) -> (f32, Vec2) {
        let p_local = xf.apply_inverse(p);
        let mut max_distance = f32::MIN;
        let mut normal_for_max = p_local;

        for i in 0..self.count {
            let dot = self.normals[i].dot(p_local - self.vertices[i]);
            if dot > max_distance {
                max_distance = dot;
                normal_for_max = self.normals[i];
            }
        }

        if max_distance > 0.0 {
            let mut min_distance = normal_for_max;
            let mut min_distance2 = max_distance * max_distance;
            for v in self.vertices() {
                let distance = p_local - *v;
                let distance2 = distance.length_squared();
                if min_distance2 > distance2 {
                    min_distance = distance;
                    min_distance2 = distance2;
                }
            }
            return (min_distance2.sqrt(), xf.q.apply(min_distance).normalized());
        }

        (max_distance, xf.q.apply(normal_for_max))
    }
}

fn compute_centroid(vs: &[Vec2]) -> Vec2 {
    const INV3: f32 = 1.0 / 3.0;
    let mut c = Vec2::ZERO;
    let mut area = 0.0;
    let p_ref = Vec2::ZERO;

    for i in 0..vs.len() {
        let p1 = p_ref;
        let p2 = vs[i];
        let p3 = if i + 1 < vs.len() { vs[i + 1] } else { vs[0] };
        let e1 = p2 - p1;
        let e2 = p3 - p1;
        let triangle_area = 0.5 * e1.cross(e2);
        area += triangle_area;
        c += (p1 + p2 + p3) * (triangle_area * INV3);
    }

    if area > f32::EPSILON {
        c * (1.0 / area)
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn test_box_mass_and_inertia() {
        let (w, h, density) = (2.0_f32, 1.0_f32, 3.0_f32);
        let shape = PolygonShape::new_box(w / 2.0, h / 2.0);
        let md = shape.compute_mass(density);
        assert!((md.mass - density * w * h).abs() < EPSILON);
        assert!(md.center.length() < EPSILON);
        let expected = md.mass * (w * w + h * h) / 12.0;
        assert!((md.inertia - expected).abs() < EPSILON);
    }

    #[test]
    fn test_hull_discards_interior_points() {
        let shape = PolygonShape::new(&[
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.5, 0.2),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ])
        .unwrap();
        assert_eq!(shape.vertex_count(), 4);
        assert!((shape.centroid - Vec2::new(0.5, 0.5)).length() < EPSILON);
    }

    #[test]
    fn test_hull_winding_is_counter_clockwise() {
        let shape = PolygonShape::new(&[
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 0.0),
        ])
        .unwrap();
        let v = shape.vertices();
        assert!((v[1] - v[0]).cross(v[2] - v[1]) > 0.0);
    }

    #[test]
    fn test_degenerate_polygon_fails() {
        let collinear = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(2.0, 0.0)];
        assert!(matches!(PolygonShape::new(&collinear), Err(PhysicsError::InvalidShape(_))));
        let welded = [Vec2::new(0.0, 0.0), Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0)];
        assert!(PolygonShape::new(&welded).is_err());
    }

    #[test]
    fn test_point_and_ray_cast() {
        let shape = PolygonShape::new_box(1.0, 1.0);
        let xf = Transform2D::from_angle(Vec2::new(5.0, 0.0), 0.0);
        assert!(shape.test_point(&xf, Vec2::new(5.5, 0.5)));
        assert!(!shape.test_point(&xf, Vec2::new(7.0, 0.0)));

        let input = RayCastInput {
            p1: Vec2::new(0.0, 0.0),
            p2: Vec2::new(10.0, 0.0),
            max_fraction: 1.0,
        };
        let out = shape.ray_cast(&input, &xf).unwrap();
        assert!((out.fraction - 0.4).abs() < EPSILON);
        assert!((out.normal - Vec2::new(-1.0, 0.0)).length() < EPSILON);
    }

    #[test]
    fn test_oriented_box_aabb() {
        let mut shape = PolygonShape::default();
        shape.set_as_oriented_box(1.0, 1.0, Vec2::new(2.0, 0.0), std::f32::consts::FRAC_PI_4);
        let aabb = shape.compute_aabb(&Transform2D::IDENTITY);
        let half = 2.0_f32.sqrt() + shape.radius;
        assert!((aabb.upper.x - (2.0 + half)).abs() < EPSILON);
    }

    #[test]
    fn test_compute_distance_sign() {
        let shape = PolygonShape::new_box(1.0, 1.0);
        let (outside, n) = shape.compute_distance(&Transform2D::IDENTITY, Vec2::new(3.0, 0.0));
        assert!((outside - 2.0).abs() < EPSILON);
        assert!((n - Vec2::X).length() < EPSILON);
        let (inside, _) = shape.compute_distance(&Transform2D::IDENTITY, Vec2::new(0.5, 0.0));
        assert!((inside + 0.5).abs() < EPSILON);
    }
}
