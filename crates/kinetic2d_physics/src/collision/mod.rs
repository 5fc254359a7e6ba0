//! Collision detection
//!
//! Everything here is stateless geometry: bounding boxes, contact manifolds,
//! GJK distance, time of impact and the per-shape-pair narrow phase. The
//! dynamic tree and broad phase keep the only persistent state.

pub mod aabb;
pub mod broad_phase;
pub mod distance;
pub mod dynamic_tree;
pub mod narrow_phase;
pub mod time_of_impact;

use kinetic2d_math::{Transform2D, Vec2};
use serde::{Deserialize, Serialize};

use crate::settings::MAX_MANIFOLD_POINTS;
use crate::shapes::Shape;

pub use aabb::Aabb;
pub use broad_phase::BroadPhase;
pub use distance::{distance, DistanceInput, DistanceOutput, DistanceProxy, SimplexCache};
pub use dynamic_tree::{DynamicTree, ProxyId};
pub use time_of_impact::{time_of_impact, ToiInput, ToiOutput, ToiState};

/// Which feature of a shape produced a contact point
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FeatureKind {
    Vertex = 0,
    Face = 1,
}

/// Identifies a contact point across steps so impulses can be warm started
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId {
    pub index_a: u8,
    pub index_b: u8,
    pub type_a: FeatureKind,
    pub type_b: FeatureKind,
}

impl Default for ContactId {
    fn default() -> Self {
        Self {
            index_a: 0,
            index_b: 0,
            type_a: FeatureKind::Vertex,
            type_b: FeatureKind::Vertex,
        }
    }
}

impl ContactId {
    /// Packed form used for equality between manifolds
    #[inline]
    pub fn key(&self) -> u32 {
        (self.index_a as u32)
            | (self.index_b as u32) << 8
            | (self.type_a as u32) << 16
            | (self.type_b as u32) << 24
    }

    /// Swap the A and B features, used when shapes were collided in reverse
    pub fn flip(&mut self) {
        std::mem::swap(&mut self.index_a, &mut self.index_b);
        std::mem::swap(&mut self.type_a, &mut self.type_b);
    }
}

/// One contact point in a manifold
///
/// `local_point` meaning depends on the manifold type:
/// circles - local center of circle B, face A - local center of circle B or
/// clip point of polygon B, face B - clip point of polygon A.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifoldPoint {
    pub local_point: Vec2,
    /// Non-penetration impulse
    pub normal_impulse: f32,
    /// Friction impulse
    pub tangent_impulse: f32,
    pub id: ContactId,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifoldType {
    #[default]
    Circles,
    FaceA,
    FaceB,
}

/// Contact points for two touching convex shapes, in local coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifold {
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    /// Not used for `ManifoldType::Circles`
    pub local_normal: Vec2,
    pub local_point: Vec2,
    pub manifold_type: ManifoldType,
    pub point_count: usize,
}

impl Manifold {
    /// The live points
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }
}

/// A manifold resolved into world space
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WorldManifold {
    /// Points from A to B
    pub normal: Vec2,
    /// Midpoints between the two surfaces
    pub points: [Vec2; MAX_MANIFOLD_POINTS],
    /// Negative when overlapping
    pub separations: [f32; MAX_MANIFOLD_POINTS],
}

impl WorldManifold {
    /// Evaluate `manifold` at the given transforms and shape radii
    pub fn new(
        manifold: &Manifold,
        xf_a: &Transform2D,
        radius_a: f32,
        xf_b: &Transform2D,
        radius_b: f32,
    ) -> Self {
        let mut wm = WorldManifold::default();
        if manifold.point_count == 0 {
            return wm;
        }

        match manifold.manifold_type {
            ManifoldType::Circles => {
                wm.normal = Vec2::X;
                let point_a = xf_a.apply(manifold.local_point);
                let point_b = xf_b.apply(manifold.points[0].local_point);
                if point_a.distance_squared(point_b) > f32::EPSILON * f32::EPSILON {
                    wm.normal = (point_b - point_a).normalized();
                }
                let c_a = point_a + wm.normal * radius_a;
                let c_b = point_b - wm.normal * radius_b;
                wm.points[0] = (c_a + c_b) * 0.5;
                wm.separations[0] = (c_b - c_a).dot(wm.normal);
            }
            ManifoldType::FaceA => {
                wm.normal = xf_a.q.apply(manifold.local_normal);
                let plane_point = xf_a.apply(manifold.local_point);
                for i in 0..manifold.point_count {
                    let clip_point = xf_b.apply(manifold.points[i].local_point);
                    let c_a = clip_point
                        + wm.normal * (radius_a - (clip_point - plane_point).dot(wm.normal));
                    let c_b = clip_point - wm.normal * radius_b;
                    wm.points[i] = (c_a + c_b) * 0.5;
                    wm.separations[i] = (c_b - c_a).dot(wm.normal);
                }
            }
            ManifoldType::FaceB => {
                wm.normal = xf_b.q.apply(manifold.local_normal);
                let plane_point = xf_b.apply(manifold.local_point);
                for i in 0..manifold.point_count {
                    let clip_point = xf_a.apply(manifold.points[i].local_point);
                    let c_b = clip_point
                        + wm.normal * (radius_b - (clip_point - plane_point).dot(wm.normal));
                    let c_a = clip_point - wm.normal * radius_a;
                    wm.points[i] = (c_a + c_b) * 0.5;
                    wm.separations[i] = (c_a - c_b).dot(wm.normal);
                }
                // Ensure normal points from A to B
                wm.normal = -wm.normal;
            }
        }
        wm
    }
}

/// Ray cast input: the ray runs from `p1` to `p1 + max_fraction * (p2 - p1)`
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RayCastInput {
    pub p1: Vec2,
    pub p2: Vec2,
    pub max_fraction: f32,
}

/// Ray cast hit: the point is `p1 + fraction * (p2 - p1)`
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RayCastOutput {
    pub normal: Vec2,
    pub fraction: f32,
}

/// A clipped vertex used while building polygon manifolds
#[derive(Clone, Copy, Debug, Default)]
pub struct ClipVertex {
    pub v: Vec2,
    pub id: ContactId,
}

/// Sutherland-Hodgman clipping of a segment against the half plane
/// `dot(normal, p) - offset <= 0`
///
/// Returns the number of output points written to `v_out`.
pub fn clip_segment_to_line(
    v_out: &mut [ClipVertex; 2],
    v_in: &[ClipVertex; 2],
    normal: Vec2,
    offset: f32,
    vertex_index_a: usize,
) -> usize {
    let mut count = 0;

    let distance0 = normal.dot(v_in[0].v) - offset;
    let distance1 = normal.dot(v_in[1].v) - offset;

    // Points behind the plane
    if distance0 <= 0.0 {
        v_out[count] = v_in[0];
        count += 1;
    }
    if distance1 <= 0.0 {
        v_out[count] = v_in[1];
        count += 1;
    }

    // Points on different sides of the plane
    if distance0 * distance1 < 0.0 {
        let interp = distance0 / (distance0 - distance1);
        v_out[count].v = v_in[0].v + (v_in[1].v - v_in[0].v) * interp;
        // VertexA is hitting edgeB
        v_out[count].id = ContactId {
            index_a: vertex_index_a as u8,
            index_b: v_in[0].id.index_b,
            type_a: FeatureKind::Vertex,
            type_b: FeatureKind::Face,
        };
        count += 1;
    }

    count
}

/// Exact overlap test between two shape children using GJK
pub fn test_overlap(
    shape_a: &Shape,
    index_a: usize,
    shape_b: &Shape,
    index_b: usize,
    xf_a: &Transform2D,
    xf_b: &Transform2D,
) -> bool {
    let input = DistanceInput {
        proxy_a: DistanceProxy::new(shape_a, index_a),
        proxy_b: DistanceProxy::new(shape_b, index_b),
        transform_a: *xf_a,
        transform_b: *xf_b,
        use_radii: true,
    };
    let mut cache = SimplexCache::default();
    let output = distance(&mut cache, &input);
    output.distance < 10.0 * f32::EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{CircleShape, PolygonShape};

    #[test]
    fn test_contact_id_key_is_unique_per_feature() {
        let a = ContactId { index_a: 1, index_b: 0, type_a: FeatureKind::Vertex, type_b: FeatureKind::Face };
        let mut b = a;
        b.flip();
        assert_ne!(a.key(), b.key());
        b.flip();
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_clip_segment_splits_crossing_segment() {
        let v_in = [
            ClipVertex { v: Vec2::new(-1.0, 0.0), id: ContactId::default() },
            ClipVertex { v: Vec2::new(1.0, 0.0), id: ContactId::default() },
        ];
        let mut v_out = [ClipVertex::default(); 2];
        let count = clip_segment_to_line(&mut v_out, &v_in, Vec2::X, 0.0, 3);
        assert_eq!(count, 2);
        assert_eq!(v_out[0].v, Vec2::new(-1.0, 0.0));
        assert!(v_out[1].v.length() < 1e-6);
        assert_eq!(v_out[1].id.index_a, 3);
    }

    #[test]
    fn test_overlap_circle_and_box() {
        let circle = Shape::Circle(CircleShape::new(Vec2::ZERO, 0.5));
        let square = Shape::Polygon(PolygonShape::new_box(1.0, 1.0));
        let near = Transform2D::from_angle(Vec2::new(1.2, 0.0), 0.0);
        let far = Transform2D::from_angle(Vec2::new(3.0, 0.0), 0.0);
        assert!(test_overlap(&circle, 0, &square, 0, &near, &Transform2D::IDENTITY));
        assert!(!test_overlap(&circle, 0, &square, 0, &far, &Transform2D::IDENTITY));
    }
}
