//! Contact manifold generation for each supported shape pair
//!
//! Shape A is always the "reference" side: manifolds of type `FaceA` store
//! the normal in A's frame, `FaceB` in B's frame.

use kinetic2d_math::{Transform2D, Vec2};

use super::{clip_segment_to_line, ClipVertex, ContactId, FeatureKind, Manifold, ManifoldType};
use crate::settings::{ANGULAR_SLOP, LINEAR_SLOP, MAX_MANIFOLD_POINTS, MAX_POLYGON_VERTICES};
use crate::shapes::{CircleShape, EdgeShape, PolygonShape};

/// Two circles
pub fn collide_circles(
    manifold: &mut Manifold,
    circle_a: &CircleShape,
    xf_a: &Transform2D,
    circle_b: &CircleShape,
    xf_b: &Transform2D,
) {
    manifold.point_count = 0;

    let p_a = xf_a.apply(circle_a.p);
    let p_b = xf_b.apply(circle_b.p);
    let radius = circle_a.radius + circle_b.radius;
    if p_a.distance_squared(p_b) > radius * radius {
        return;
    }

    manifold.manifold_type = ManifoldType::Circles;
    manifold.local_point = circle_a.p;
    manifold.local_normal = Vec2::ZERO;
    manifold.point_count = 1;
    manifold.points[0].local_point = circle_b.p;
    manifold.points[0].id = ContactId::default();
}

/// A polygon (A) and a circle (B)
pub fn collide_polygon_and_circle(
    manifold: &mut Manifold,
    polygon_a: &PolygonShape,
    xf_a: &Transform2D,
    circle_b: &CircleShape,
    xf_b: &Transform2D,
) {
    manifold.point_count = 0;

    // Circle position in the frame of the polygon
    let c = xf_b.apply(circle_b.p);
    let c_local = xf_a.apply_inverse(c);

    // Find the min separating edge
    let mut normal_index = 0;
    let mut separation = f32::MIN;
    let radius = polygon_a.radius + circle_b.radius;
    let vertices = polygon_a.vertices();
    let normals = polygon_a.normals();

    for i in 0..vertices.len() {
        let s = normals[i].dot(c_local - vertices[i]);
        if s > radius {
            // Early out
            return;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let v1 = vertices[normal_index];
    let v2 = vertices[if normal_index + 1 < vertices.len() { normal_index + 1 } else { 0 }];

    let set_point = |manifold: &mut Manifold, normal: Vec2, point: Vec2| {
        manifold.point_count = 1;
        manifold.manifold_type = ManifoldType::FaceA;
        manifold.local_normal = normal;
        manifold.local_point = point;
        manifold.points[0].local_point = circle_b.p;
        manifold.points[0].id = ContactId::default();
    };

    // Center is inside the polygon
    if separation < f32::EPSILON {
        set_point(manifold, normals[normal_index], (v1 + v2) * 0.5);
        return;
    }

    // Compute barycentric coordinates
    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);

    if u1 <= 0.0 {
        if c_local.distance_squared(v1) > radius * radius {
            return;
        }
        set_point(manifold, (c_local - v1).normalized(), v1);
    } else if u2 <= 0.0 {
        if c_local.distance_squared(v2) > radius * radius {
            return;
        }
        set_point(manifold, (c_local - v2).normalized(), v2);
    } else {
        let face_center = (v1 + v2) * 0.5;
        let s = (c_local - face_center).dot(normals[normal_index]);
        if s > radius {
            return;
        }
        set_point(manifold, normals[normal_index], face_center);
    }
}

/// Max separation between two polygons using the edge normals of `poly1`
fn find_max_separation(
    poly1: &PolygonShape,
    xf1: &Transform2D,
    poly2: &PolygonShape,
    xf2: &Transform2D,
) -> (usize, f32) {
    let n1s = poly1.normals();
    let v1s = poly1.vertices();
    let v2s = poly2.vertices();
    let xf = xf2.mul_transpose(xf1);

    let mut best_index = 0;
    let mut max_separation = f32::MIN;
    for i in 0..n1s.len() {
        // Get poly1 normal in frame2
        let n = xf.q.apply(n1s[i]);
        let v1 = xf.apply(v1s[i]);

        // Find deepest point for normal i
        let si = v2s
            .iter()
            .map(|v2| n.dot(*v2 - v1))
            .fold(f32::MAX, f32::min);

        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }
    (best_index, max_separation)
}

fn find_incident_edge(
    poly1: &PolygonShape,
    xf1: &Transform2D,
    edge1: usize,
    poly2: &PolygonShape,
    xf2: &Transform2D,
) -> [ClipVertex; 2] {
    let normals2 = poly2.normals();
    let vertices2 = poly2.vertices();

    // Get the normal of the reference edge in poly2's frame
    let normal1 = xf2.q.apply_inverse(xf1.q.apply(poly1.normals()[edge1]));

    // Find the incident edge on poly2
    let mut index = 0;
    let mut min_dot = f32::MAX;
    for (i, n) in normals2.iter().enumerate() {
        let dot = normal1.dot(*n);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = if i1 + 1 < vertices2.len() { i1 + 1 } else { 0 };

    let id = |index_b: usize| ContactId {
        index_a: edge1 as u8,
        index_b: index_b as u8,
        type_a: FeatureKind::Face,
        type_b: FeatureKind::Vertex,
    };

    [
        ClipVertex { v: xf2.apply(vertices2[i1]), id: id(i1) },
        ClipVertex { v: xf2.apply(vertices2[i2]), id: id(i2) },
    ]
}

/// Two convex polygons
///
/// Finds the separating axis with the largest separation (edge of A or B),
/// picks the incident edge on the other polygon and clips it against the
/// side planes of the reference edge.
pub fn collide_polygons(
    manifold: &mut Manifold,
    poly_a: &PolygonShape,
    xf_a: &Transform2D,
    poly_b: &PolygonShape,
    xf_b: &Transform2D,
) {
    manifold.point_count = 0;
    let total_radius = poly_a.radius + poly_b.radius;

    let (edge_a, separation_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return;
    }

    let (edge_b, separation_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return;
    }

    let tolerance = 0.1 * LINEAR_SLOP;
    let (poly1, poly2, xf1, xf2, edge1, flip) = if separation_b > separation_a + tolerance {
        manifold.manifold_type = ManifoldType::FaceB;
        (poly_b, poly_a, xf_b, xf_a, edge_b, true)
    } else {
        manifold.manifold_type = ManifoldType::FaceA;
        (poly_a, poly_b, xf_a, xf_b, edge_a, false)
    };

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let vertices1 = poly1.vertices();
    let iv1 = edge1;
    let iv2 = if edge1 + 1 < vertices1.len() { edge1 + 1 } else { 0 };

    let mut v11 = vertices1[iv1];
    let mut v12 = vertices1[iv2];

    let local_tangent = (v12 - v11).normalized();
    let local_normal = local_tangent.cross_scalar(1.0);
    let plane_point = (v11 + v12) * 0.5;

    let tangent = xf1.q.apply(local_tangent);
    let normal = tangent.cross_scalar(1.0);

    v11 = xf1.apply(v11);
    v12 = xf1.apply(v12);

    // Face offset
    let front_offset = normal.dot(v11);

    // Side offsets, extended by polytope skin thickness
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    // Clip incident edge against extruded edge1 side edges
    let mut clip_points1 = [ClipVertex::default(); 2];
    let mut clip_points2 = [ClipVertex::default(); 2];

    let np = clip_segment_to_line(&mut clip_points1, &incident_edge, -tangent, side_offset1, iv1);
    if np < 2 {
        return;
    }

    let np = clip_segment_to_line(&mut clip_points2, &clip_points1, tangent, side_offset2, iv2);
    if np < 2 {
        return;
    }

    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    let mut point_count = 0;
    for clip in clip_points2.iter() {
        let separation = normal.dot(clip.v) - front_offset;
        if separation <= total_radius {
            let cp = &mut manifold.points[point_count];
            cp.local_point = xf2.apply_inverse(clip.v);
            cp.id = clip.id;
            if flip {
                cp.id.flip();
            }
            point_count += 1;
        }
    }
    manifold.point_count = point_count;
}

/// An edge (A) and a circle (B), honouring ghost vertices
pub fn collide_edge_and_circle(
    manifold: &mut Manifold,
    edge_a: &EdgeShape,
    xf_a: &Transform2D,
    circle_b: &CircleShape,
    xf_b: &Transform2D,
) {
    manifold.point_count = 0;

    // Circle in the frame of the edge
    let q = xf_a.apply_inverse(xf_b.apply(circle_b.p));

    let a = edge_a.vertex1;
    let b = edge_a.vertex2;
    let e = b - a;

    // Barycentric coordinates
    let u = e.dot(b - q);
    let v = e.dot(q - a);

    let radius = edge_a.radius + circle_b.radius;

    let set_vertex = |manifold: &mut Manifold, p: Vec2, index_a: u8| {
        manifold.point_count = 1;
        manifold.manifold_type = ManifoldType::Circles;
        manifold.local_normal = Vec2::ZERO;
        manifold.local_point = p;
        manifold.points[0].id = ContactId {
            index_a,
            index_b: 0,
            type_a: FeatureKind::Vertex,
            type_b: FeatureKind::Vertex,
        };
        manifold.points[0].local_point = circle_b.p;
    };

    // Region A
    if v <= 0.0 {
        if q.distance_squared(a) > radius * radius {
            return;
        }
        // Is there an edge connected to A, and is the circle in its region
        if let Some(a1) = edge_a.vertex0 {
            let e1 = a - a1;
            if e1.dot(a - q) > 0.0 {
                return;
            }
        }
        set_vertex(manifold, a, 0);
        return;
    }

    // Region B
    if u <= 0.0 {
        if q.distance_squared(b) > radius * radius {
            return;
        }
        if let Some(b2) = edge_a.vertex3 {
            let e2 = b2 - b;
            if e2.dot(q - b) > 0.0 {
                return;
            }
        }
        set_vertex(manifold, b, 1);
        return;
    }

    // Region AB
    let den = e.length_squared();
    debug_assert!(den > 0.0);
    let p = (a * u + b * v) * (1.0 / den);
    if q.distance_squared(p) > radius * radius {
        return;
    }

    let mut n = Vec2::new(-e.y, e.x);
    if n.dot(q - a) < 0.0 {
        n = -n;
    }

    manifold.point_count = 1;
    manifold.manifold_type = ManifoldType::FaceA;
    manifold.local_normal = n.normalized();
    manifold.local_point = a;
    manifold.points[0].id = ContactId {
        index_a: 0,
        index_b: 0,
        type_a: FeatureKind::Face,
        type_b: FeatureKind::Vertex,
    };
    manifold.points[0].local_point = circle_b.p;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AxisKind {
    Unknown,
    EdgeA,
    EdgeB,
}

#[derive(Clone, Copy, Debug)]
struct EpAxis {
    kind: AxisKind,
    index: usize,
    separation: f32,
}

#[derive(Default)]
struct ReferenceFace {
    i1: usize,
    i2: usize,
    v1: Vec2,
    v2: Vec2,
    normal: Vec2,
    side_normal1: Vec2,
    side_offset1: f32,
    side_normal2: Vec2,
    side_offset2: f32,
}

/// Polygon B expressed in the edge's frame
struct TempPolygon {
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    normals: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
}

/// Edge-versus-polygon collider that respects the edge's neighbours, so
/// boxes slide over chain vertices without catching on internal corners
struct EpCollider {
    polygon_b: TempPolygon,
    xf: Transform2D,
    v1: Vec2,
    v2: Vec2,
    normal: Vec2,
    lower_limit: Vec2,
    upper_limit: Vec2,
    radius: f32,
    front: bool,
}

impl EpCollider {
    fn compute_edge_separation(&self) -> EpAxis {
        let separation = self.polygon_b.vertices[..self.polygon_b.count]
            .iter()
            .map(|v| self.normal.dot(*v - self.v1))
            .fold(f32::MAX, f32::min);
        EpAxis {
            kind: AxisKind::EdgeA,
            index: if self.front { 0 } else { 1 },
            separation,
        }
    }

    fn compute_polygon_separation(&self) -> EpAxis {
        let mut axis = EpAxis {
            kind: AxisKind::Unknown,
            index: 0,
            separation: f32::MIN,
        };

        let perp = Vec2::new(-self.normal.y, self.normal.x);

        for i in 0..self.polygon_b.count {
            let n = -self.polygon_b.normals[i];

            let s1 = n.dot(self.polygon_b.vertices[i] - self.v1);
            let s2 = n.dot(self.polygon_b.vertices[i] - self.v2);
            let s = s1.min(s2);

            if s > self.radius {
                // No collision
                return EpAxis { kind: AxisKind::EdgeB, index: i, separation: s };
            }

            // Adjacency
            if n.dot(perp) >= 0.0 {
                if (n - self.upper_limit).dot(self.normal) < -ANGULAR_SLOP {
                    continue;
                }
            } else if (n - self.lower_limit).dot(self.normal) < -ANGULAR_SLOP {
                continue;
            }

            if s > axis.separation {
                axis = EpAxis { kind: AxisKind::EdgeB, index: i, separation: s };
            }
        }

        axis
    }
}

/// An edge (A) and a polygon (B)
pub fn collide_edge_and_polygon(
    manifold: &mut Manifold,
    edge_a: &EdgeShape,
    xf_a: &Transform2D,
    polygon_b: &PolygonShape,
    xf_b: &Transform2D,
) {
    manifold.point_count = 0;

    let xf = xf_a.mul_transpose(xf_b);
    let centroid_b = xf.apply(polygon_b.centroid);

    let v1 = edge_a.vertex1;
    let v2 = edge_a.vertex2;

    let edge1 = (v2 - v1).normalized();
    let normal1 = Vec2::new(edge1.y, -edge1.x);
    let offset1 = normal1.dot(centroid_b - v1);

    let mut normal0 = Vec2::ZERO;
    let mut normal2 = Vec2::ZERO;
    let mut offset0 = 0.0;
    let mut offset2 = 0.0;
    let mut convex1 = false;
    let mut convex2 = false;

    // Is there a preceding edge
    if let Some(v0) = edge_a.vertex0 {
        let edge0 = (v1 - v0).normalized();
        normal0 = Vec2::new(edge0.y, -edge0.x);
        convex1 = edge0.cross(edge1) >= 0.0;
        offset0 = normal0.dot(centroid_b - v0);
    }

    // Is there a following edge
    if let Some(v3) = edge_a.vertex3 {
        let edge2 = (v3 - v2).normalized();
        normal2 = Vec2::new(edge2.y, -edge2.x);
        convex2 = edge1.cross(edge2) > 0.0;
        offset2 = normal2.dot(centroid_b - v2);
    }

    // Determine front or back collision and the collision normal limits
    let (front, normal, lower_limit, upper_limit) =
        match (edge_a.vertex0.is_some(), edge_a.vertex3.is_some()) {
            (true, true) => {
                if convex1 && convex2 {
                    let front = offset0 >= 0.0 || offset1 >= 0.0 || offset2 >= 0.0;
                    if front {
                        (front, normal1, normal0, normal2)
                    } else {
                        (front, -normal1, -normal1, -normal1)
                    }
                } else if convex1 {
                    let front = offset0 >= 0.0 || (offset1 >= 0.0 && offset2 >= 0.0);
                    if front {
                        (front, normal1, normal0, normal1)
                    } else {
                        (front, -normal1, -normal2, -normal1)
                    }
                } else if convex2 {
                    let front = offset2 >= 0.0 || (offset0 >= 0.0 && offset1 >= 0.0);
                    if front {
                        (front, normal1, normal1, normal2)
                    } else {
                        (front, -normal1, -normal1, -normal0)
                    }
                } else {
                    let front = offset0 >= 0.0 && offset1 >= 0.0 && offset2 >= 0.0;
                    if front {
                        (front, normal1, normal1, normal1)
                    } else {
                        (front, -normal1, -normal2, -normal0)
                    }
                }
            }
            (true, false) => {
                if convex1 {
                    let front = offset0 >= 0.0 || offset1 >= 0.0;
                    if front {
                        (front, normal1, normal0, -normal1)
                    } else {
                        (front, -normal1, normal1, -normal1)
                    }
                } else {
                    let front = offset0 >= 0.0 && offset1 >= 0.0;
                    if front {
                        (front, normal1, normal1, -normal1)
                    } else {
                        (front, -normal1, normal1, -normal0)
                    }
                }
            }
            (false, true) => {
                if convex2 {
                    let front = offset1 >= 0.0 || offset2 >= 0.0;
                    if front {
                        (front, normal1, -normal1, normal2)
                    } else {
                        (front, -normal1, -normal1, normal1)
                    }
                } else {
                    let front = offset1 >= 0.0 && offset2 >= 0.0;
                    if front {
                        (front, normal1, -normal1, normal1)
                    } else {
                        (front, -normal1, -normal2, normal1)
                    }
                }
            }
            (false, false) => {
                let front = offset1 >= 0.0;
                if front {
                    (front, normal1, -normal1, -normal1)
                } else {
                    (front, -normal1, normal1, normal1)
                }
            }
        };

    // Get polygon B in frame A
    let mut temp = TempPolygon {
        vertices: [Vec2::ZERO; MAX_POLYGON_VERTICES],
        normals: [Vec2::ZERO; MAX_POLYGON_VERTICES],
        count: polygon_b.vertex_count(),
    };
    for (i, (v, n)) in polygon_b.vertices().iter().zip(polygon_b.normals()).enumerate() {
        temp.vertices[i] = xf.apply(*v);
        temp.normals[i] = xf.q.apply(*n);
    }

    let collider = EpCollider {
        polygon_b: temp,
        xf,
        v1,
        v2,
        normal,
        lower_limit,
        upper_limit,
        radius: polygon_b.radius + edge_a.radius,
        front,
    };

    let edge_axis = collider.compute_edge_separation();

    // If no valid normal can be found this edge should not collide
    if edge_axis.kind == AxisKind::Unknown || edge_axis.separation > collider.radius {
        return;
    }

    let polygon_axis = collider.compute_polygon_separation();
    if polygon_axis.kind != AxisKind::Unknown && polygon_axis.separation > collider.radius {
        return;
    }

    // Use hysteresis for jitter reduction
    const RELATIVE_TOL: f32 = 0.98;
    const ABSOLUTE_TOL: f32 = 0.001;

    let primary_axis = if polygon_axis.kind == AxisKind::Unknown {
        edge_axis
    } else if polygon_axis.separation > RELATIVE_TOL * edge_axis.separation + ABSOLUTE_TOL {
        polygon_axis
    } else {
        edge_axis
    };

    let poly = &collider.polygon_b;
    let mut incident_edge = [ClipVertex::default(); 2];
    let mut rf = ReferenceFace::default();

    if primary_axis.kind == AxisKind::EdgeA {
        manifold.manifold_type = ManifoldType::FaceA;

        // Search for the polygon normal most anti-parallel to the edge normal
        let mut best_index = 0;
        let mut best_value = collider.normal.dot(poly.normals[0]);
        for i in 1..poly.count {
            let value = collider.normal.dot(poly.normals[i]);
            if value < best_value {
                best_value = value;
                best_index = i;
            }
        }

        let i1 = best_index;
        let i2 = if i1 + 1 < poly.count { i1 + 1 } else { 0 };

        for (clip, index) in incident_edge.iter_mut().zip([i1, i2]) {
            clip.v = poly.vertices[index];
            clip.id = ContactId {
                index_a: 0,
                index_b: index as u8,
                type_a: FeatureKind::Face,
                type_b: FeatureKind::Vertex,
            };
        }

        if collider.front {
            rf.i1 = 0;
            rf.i2 = 1;
            rf.v1 = collider.v1;
            rf.v2 = collider.v2;
            rf.normal = normal1;
        } else {
            rf.i1 = 1;
            rf.i2 = 0;
            rf.v1 = collider.v2;
            rf.v2 = collider.v1;
            rf.normal = -normal1;
        }
    } else {
        manifold.manifold_type = ManifoldType::FaceB;

        for (clip, v) in incident_edge.iter_mut().zip([collider.v1, collider.v2]) {
            clip.v = v;
            clip.id = ContactId {
                index_a: 0,
                index_b: primary_axis.index as u8,
                type_a: FeatureKind::Vertex,
                type_b: FeatureKind::Face,
            };
        }

        rf.i1 = primary_axis.index;
        rf.i2 = if rf.i1 + 1 < poly.count { rf.i1 + 1 } else { 0 };
        rf.v1 = poly.vertices[rf.i1];
        rf.v2 = poly.vertices[rf.i2];
        rf.normal = poly.normals[rf.i1];
    }

    rf.side_normal1 = Vec2::new(rf.normal.y, -rf.normal.x);
    rf.side_normal2 = -rf.side_normal1;
    rf.side_offset1 = rf.side_normal1.dot(rf.v1);
    rf.side_offset2 = rf.side_normal2.dot(rf.v2);

    // Clip incident edge against extruded edge1 side edges
    let mut clip_points1 = [ClipVertex::default(); 2];
    let mut clip_points2 = [ClipVertex::default(); 2];

    let np = clip_segment_to_line(
        &mut clip_points1,
        &incident_edge,
        rf.side_normal1,
        rf.side_offset1,
        rf.i1,
    );
    if np < MAX_MANIFOLD_POINTS {
        return;
    }

    let np = clip_segment_to_line(
        &mut clip_points2,
        &clip_points1,
        rf.side_normal2,
        rf.side_offset2,
        rf.i2,
    );
    if np < MAX_MANIFOLD_POINTS {
        return;
    }

    if primary_axis.kind == AxisKind::EdgeA {
        manifold.local_normal = rf.normal;
        manifold.local_point = rf.v1;
    } else {
        manifold.local_normal = polygon_b.normals()[rf.i1];
        manifold.local_point = polygon_b.vertices()[rf.i1];
    }

    let mut point_count = 0;
    for clip in clip_points2.iter() {
        let separation = rf.normal.dot(clip.v - rf.v1);
        if separation <= collider.radius {
            let cp = &mut manifold.points[point_count];
            if primary_axis.kind == AxisKind::EdgeA {
                cp.local_point = collider.xf.apply_inverse(clip.v);
                cp.id = clip.id;
            } else {
                cp.local_point = clip.v;
                cp.id = clip.id;
                cp.id.flip();
            }
            point_count += 1;
        }
    }

    manifold.point_count = point_count;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::WorldManifold;

    fn at(x: f32, y: f32) -> Transform2D {
        Transform2D::from_angle(Vec2::new(x, y), 0.0)
    }

    #[test]
    fn test_circles_touching_and_apart() {
        let circle = CircleShape::new(Vec2::ZERO, 0.5);
        let mut m = Manifold::default();
        collide_circles(&mut m, &circle, &at(0.0, 0.0), &circle, &at(0.9, 0.0));
        assert_eq!(m.point_count, 1);
        collide_circles(&mut m, &circle, &at(0.0, 0.0), &circle, &at(1.1, 0.0));
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_box_resting_on_box_has_two_points() {
        let ground = PolygonShape::new_box(5.0, 0.5);
        let crate_box = PolygonShape::new_box(0.5, 0.5);
        let mut m = Manifold::default();
        collide_polygons(&mut m, &ground, &at(0.0, 0.0), &crate_box, &at(0.0, 0.99));
        assert_eq!(m.point_count, 2);

        let xf_a = at(0.0, 0.0);
        let xf_b = at(0.0, 0.99);
        let wm = WorldManifold::new(&m, &xf_a, ground.radius, &xf_b, crate_box.radius);
        assert!((wm.normal - Vec2::Y).length() < 1e-4);
        assert!(wm.separations[0] < 0.0);
    }

    #[test]
    fn test_separated_polygons() {
        let a = PolygonShape::new_box(0.5, 0.5);
        let mut m = Manifold::default();
        collide_polygons(&mut m, &a, &at(0.0, 0.0), &a, &at(2.0, 0.0));
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_polygon_and_circle_face_contact() {
        let square = PolygonShape::new_box(1.0, 1.0);
        let circle = CircleShape::new(Vec2::ZERO, 0.5);
        let mut m = Manifold::default();
        collide_polygon_and_circle(&mut m, &square, &at(0.0, 0.0), &circle, &at(0.0, 1.4));
        assert_eq!(m.point_count, 1);
        assert_eq!(m.manifold_type, ManifoldType::FaceA);
        assert!((m.local_normal - Vec2::Y).length() < 1e-5);
    }

    #[test]
    fn test_edge_and_circle_regions() {
        let edge = EdgeShape::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0));
        let circle = CircleShape::new(Vec2::ZERO, 0.5);
        let mut m = Manifold::default();
        collide_edge_and_circle(&mut m, &edge, &at(0.0, 0.0), &circle, &at(0.0, 0.4));
        assert_eq!(m.manifold_type, ManifoldType::FaceA);
        collide_edge_and_circle(&mut m, &edge, &at(0.0, 0.0), &circle, &at(1.3, 0.0));
        assert_eq!(m.point_count, 1);
        assert_eq!(m.manifold_type, ManifoldType::Circles);
    }

    #[test]
    fn test_box_on_edge() {
        let edge = EdgeShape::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0));
        let crate_box = PolygonShape::new_box(0.5, 0.5);
        let mut m = Manifold::default();
        collide_edge_and_polygon(&mut m, &edge, &at(0.0, 0.0), &crate_box, &at(0.0, 0.5));
        assert_eq!(m.point_count, 2);
        let wm = WorldManifold::new(&m, &at(0.0, 0.0), edge.radius, &at(0.0, 0.5), crate_box.radius);
        assert!((wm.normal - Vec2::Y).length() < 1e-4);
    }
}
