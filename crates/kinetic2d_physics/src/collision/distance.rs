//! GJK closest-point computation between convex shapes
//!
//! The simplex from the previous call can be cached and fed back in; for
//! slowly moving shapes this usually converges in one or two iterations.

use kinetic2d_math::{Transform2D, Vec2};

use crate::settings::MAX_POLYGON_VERTICES;
use crate::shapes::Shape;

const MAX_ITERATIONS: usize = 20;

/// A convex shape reduced to a vertex cloud plus radius, as seen by GJK
#[derive(Clone, Copy, Debug)]
pub struct DistanceProxy {
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
    pub radius: f32,
}

impl DistanceProxy {
    /// Build a proxy for one child of a shape
    pub fn new(shape: &Shape, child_index: usize) -> Self {
        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        let count = match shape {
            Shape::Circle(circle) => {
                vertices[0] = circle.p;
                1
            }
            Shape::Polygon(polygon) => {
                let vs = polygon.vertices();
                vertices[..vs.len()].copy_from_slice(vs);
                vs.len()
            }
            Shape::Edge(edge) => {
                vertices[0] = edge.vertex1;
                vertices[1] = edge.vertex2;
                2
            }
            Shape::Chain(chain) => {
                let edge = chain.child_edge(child_index);
                vertices[0] = edge.vertex1;
                vertices[1] = edge.vertex2;
                2
            }
        };
        Self {
            vertices,
            count,
            radius: shape.radius(),
        }
    }

    /// Index of the vertex furthest along `d`
    pub fn support(&self, d: Vec2) -> usize {
        let mut best_index = 0;
        let mut best_value = self.vertices[0].dot(d);
        for i in 1..self.count {
            let value = self.vertices[i].dot(d);
            if value > best_value {
                best_index = i;
                best_value = value;
            }
        }
        best_index
    }

    #[inline]
    pub fn vertex(&self, index: usize) -> Vec2 {
        self.vertices[index]
    }

    pub fn vertex_count(&self) -> usize {
        self.count
    }
}

/// Warm-start state for GJK; zero-initialise it for the first call
#[derive(Clone, Copy, Debug, Default)]
pub struct SimplexCache {
    /// Length or area of the cached simplex
    pub metric: f32,
    pub count: usize,
    pub index_a: [u8; 3],
    pub index_b: [u8; 3],
}

#[derive(Clone, Copy, Debug)]
pub struct DistanceInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub transform_a: Transform2D,
    pub transform_b: Transform2D,
    pub use_radii: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DistanceOutput {
    /// Closest point on shape A
    pub point_a: Vec2,
    /// Closest point on shape B
    pub point_b: Vec2,
    pub distance: f32,
    /// Number of GJK iterations used
    pub iterations: usize,
}

#[derive(Clone, Copy, Debug, Default)]
struct SimplexVertex {
    /// Support point in proxy A
    w_a: Vec2,
    /// Support point in proxy B
    w_b: Vec2,
    /// `w_b - w_a`
    w: Vec2,
    /// Barycentric coordinate for the closest point
    a: f32,
    index_a: usize,
    index_b: usize,
}

#[derive(Default)]
struct Simplex {
    v: [SimplexVertex; 3],
    count: usize,
}

impl Simplex {
    fn read_cache(
        &mut self,
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        xf_a: &Transform2D,
        proxy_b: &DistanceProxy,
        xf_b: &Transform2D,
    ) {
        self.count = cache.count;
        for i in 0..self.count {
            let v = &mut self.v[i];
            v.index_a = cache.index_a[i] as usize;
            v.index_b = cache.index_b[i] as usize;
            v.w_a = xf_a.apply(proxy_a.vertex(v.index_a));
            v.w_b = xf_b.apply(proxy_b.vertex(v.index_b));
            v.w = v.w_b - v.w_a;
            v.a = 0.0;
        }

        // Flush the cache if the metric changed a lot
        if self.count > 1 {
            let metric1 = cache.metric;
            let metric2 = self.metric();
            if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < f32::EPSILON {
                self.count = 0;
            }
        }

        if self.count == 0 {
            let v = &mut self.v[0];
            v.index_a = 0;
            v.index_b = 0;
            v.w_a = xf_a.apply(proxy_a.vertex(0));
            v.w_b = xf_b.apply(proxy_b.vertex(0));
            v.w = v.w_b - v.w_a;
            v.a = 1.0;
            self.count = 1;
        }
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count;
        for i in 0..self.count {
            cache.index_a[i] = self.v[i].index_a as u8;
            cache.index_b[i] = self.v[i].index_b as u8;
        }
    }

    fn search_direction(&self) -> Vec2 {
        match self.count {
            1 => -self.v[0].w,
            2 => {
                let e12 = self.v[1].w - self.v[0].w;
                let sgn = e12.cross(-self.v[0].w);
                if sgn > 0.0 {
                    // Origin is left of e12
                    Vec2::scalar_cross(1.0, e12)
                } else {
                    e12.cross_scalar(1.0)
                }
            }
            _ => Vec2::ZERO,
        }
    }

    fn witness_points(&self) -> (Vec2, Vec2) {
        let [v1, v2, v3] = &self.v;
        match self.count {
            1 => (v1.w_a, v1.w_b),
            2 => (
                v1.w_a * v1.a + v2.w_a * v2.a,
                v1.w_b * v1.a + v2.w_b * v2.a,
            ),
            3 => {
                let p = v1.w_a * v1.a + v2.w_a * v2.a + v3.w_a * v3.a;
                (p, p)
            }
            _ => (Vec2::ZERO, Vec2::ZERO),
        }
    }

    fn metric(&self) -> f32 {
        match self.count {
            2 => self.v[0].w.distance(self.v[1].w),
            3 => (self.v[1].w - self.v[0].w).cross(self.v[2].w - self.v[0].w),
            _ => 0.0,
        }
    }

    /// Closest point on a segment to the origin, using barycentric coordinates
    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e12 = w2 - w1;

        // w1 region
        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // w2 region
        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // Must be in e12 region
        let inv_d12 = 1.0 / (d12_1 + d12_2);
        self.v[0].a = d12_1 * inv_d12;
        self.v[1].a = d12_2 * inv_d12;
        self.count = 2;
    }

    /// Closest feature of a triangle to the origin, by Voronoi regions
    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        // Triangle123
        let n123 = e12.cross(e13);
        let d123_1 = n123 * w2.cross(w3);
        let d123_2 = n123 * w3.cross(w1);
        let d123_3 = n123 * w1.cross(w2);

        // w1 region
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // e12
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv = 1.0 / (d12_1 + d12_2);
            self.v[0].a = d12_1 * inv;
            self.v[1].a = d12_2 * inv;
            self.count = 2;
            return;
        }

        // e13
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv = 1.0 / (d13_1 + d13_2);
            self.v[0].a = d13_1 * inv;
            self.v[2].a = d13_2 * inv;
            self.count = 2;
            self.v[1] = self.v[2];
            return;
        }

        // w2 region
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // w3 region
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v[2].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[2];
            return;
        }

        // e23
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv = 1.0 / (d23_1 + d23_2);
            self.v[1].a = d23_1 * inv;
            self.v[2].a = d23_2 * inv;
            self.count = 2;
            self.v[0] = self.v[2];
            return;
        }

        // Must be in triangle123
        let inv = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v[0].a = d123_1 * inv;
        self.v[1].a = d123_2 * inv;
        self.v[2].a = d123_3 * inv;
        self.count = 3;
    }
}

/// Closest points between two convex proxies
///
/// With `use_radii` the result accounts for the shape skins; overlapping
/// shapes report a distance of zero.
pub fn distance(cache: &mut SimplexCache, input: &DistanceInput) -> DistanceOutput {
    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;
    let xf_a = &input.transform_a;
    let xf_b = &input.transform_b;

    let mut simplex = Simplex::default();
    simplex.read_cache(cache, proxy_a, xf_a, proxy_b, xf_b);

    let mut save_a = [0usize; 3];
    let mut save_b = [0usize; 3];

    let mut iter = 0;
    while iter < MAX_ITERATIONS {
        // Copy simplex so we can identify duplicates
        let save_count = simplex.count;
        for i in 0..save_count {
            save_a[i] = simplex.v[i].index_a;
            save_b[i] = simplex.v[i].index_b;
        }

        match simplex.count {
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => {}
        }

        // The origin is inside the triangle
        if simplex.count == 3 {
            break;
        }

        let d = simplex.search_direction();
        if d.length_squared() < f32::EPSILON * f32::EPSILON {
            // The origin is probably on the simplex; the overlap is so
            // small it does not matter
            break;
        }

        let vertex = &mut simplex.v[simplex.count];
        vertex.index_a = proxy_a.support(xf_a.q.apply_inverse(-d));
        vertex.w_a = xf_a.apply(proxy_a.vertex(vertex.index_a));
        vertex.index_b = proxy_b.support(xf_b.q.apply_inverse(d));
        vertex.w_b = xf_b.apply(proxy_b.vertex(vertex.index_b));
        vertex.w = vertex.w_b - vertex.w_a;

        iter += 1;

        // A repeated support point means no further progress
        let (ia, ib) = (vertex.index_a, vertex.index_b);
        let duplicate = (0..save_count).any(|i| ia == save_a[i] && ib == save_b[i]);
        if duplicate {
            break;
        }

        simplex.count += 1;
    }

    let (mut point_a, mut point_b) = simplex.witness_points();
    let mut dist = point_a.distance(point_b);
    simplex.write_cache(cache);

    if input.use_radii {
        let r_a = proxy_a.radius;
        let r_b = proxy_b.radius;
        if dist > r_a + r_b && dist > f32::EPSILON {
            // Shapes are still not overlapped; move the witness points to the surfaces
            dist -= r_a + r_b;
            let normal = (point_b - point_a).normalized();
            point_a += normal * r_a;
            point_b -= normal * r_b;
        } else {
            let p = (point_a + point_b) * 0.5;
            point_a = p;
            point_b = p;
            dist = 0.0;
        }
    }

    DistanceOutput {
        point_a,
        point_b,
        distance: dist,
        iterations: iter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{CircleShape, PolygonShape};

    fn input(a: &Shape, xf_a: Transform2D, b: &Shape, xf_b: Transform2D) -> DistanceInput {
        DistanceInput {
            proxy_a: DistanceProxy::new(a, 0),
            proxy_b: DistanceProxy::new(b, 0),
            transform_a: xf_a,
            transform_b: xf_b,
            use_radii: true,
        }
    }

    #[test]
    fn test_distance_between_boxes() {
        let square = Shape::Polygon(PolygonShape::new_box(0.5, 0.5));
        let xf_b = Transform2D::from_angle(Vec2::new(3.0, 0.0), 0.0);
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &input(&square, Transform2D::IDENTITY, &square, xf_b));
        let skins = 2.0 * square.radius();
        assert!((out.distance - (2.0 - skins)).abs() < 1e-4);
        assert!((out.point_a.x - (0.5 + square.radius())).abs() < 1e-4);
    }

    #[test]
    fn test_distance_between_circles() {
        let circle = Shape::Circle(CircleShape::new(Vec2::ZERO, 1.0));
        let xf_b = Transform2D::from_angle(Vec2::new(0.0, 5.0), 0.0);
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &input(&circle, Transform2D::IDENTITY, &circle, xf_b));
        assert!((out.distance - 3.0).abs() < 1e-5);
        assert!((out.point_b - Vec2::new(0.0, 4.0)).length() < 1e-5);
    }

    #[test]
    fn test_overlap_reports_zero() {
        let square = Shape::Polygon(PolygonShape::new_box(1.0, 1.0));
        let xf_b = Transform2D::from_angle(Vec2::new(0.5, 0.5), 0.3);
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &input(&square, Transform2D::IDENTITY, &square, xf_b));
        assert_eq!(out.distance, 0.0);
    }

    #[test]
    fn test_cache_is_reused() {
        let square = Shape::Polygon(PolygonShape::new_box(0.5, 0.5));
        let xf_b = Transform2D::from_angle(Vec2::new(2.0, 0.3), 0.1);
        let mut cache = SimplexCache::default();
        let first = distance(&mut cache, &input(&square, Transform2D::IDENTITY, &square, xf_b));
        assert!(cache.count > 0);
        let second = distance(&mut cache, &input(&square, Transform2D::IDENTITY, &square, xf_b));
        assert!((first.distance - second.distance).abs() < 1e-5);
        assert!(second.iterations <= first.iterations);
    }
}
