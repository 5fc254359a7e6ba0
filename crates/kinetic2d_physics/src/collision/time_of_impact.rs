//! Time of impact by conservative advancement
//!
//! The upper bound on the separation is found with GJK, then a separating
//! axis is held fixed while its root is bracketed with a mix of secant and
//! bisection steps. This is able to find roots for rotating shapes without
//! tunneling, provided the sweeps cover less than half a turn.

use kinetic2d_math::{Sweep, Vec2};

use super::distance::{distance, DistanceInput, DistanceProxy, SimplexCache};
use crate::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES};

const MAX_ITERATIONS: usize = 20;
const MAX_ROOT_ITERATIONS: usize = 50;

#[derive(Clone, Copy, Debug)]
pub struct ToiInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub sweep_a: Sweep,
    pub sweep_b: Sweep,
    /// Defines the sweep interval `[0, t_max]`
    pub t_max: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToiState {
    Unknown,
    Failed,
    Overlapped,
    Touching,
    Separated,
}

#[derive(Clone, Copy, Debug)]
pub struct ToiOutput {
    pub state: ToiState,
    pub t: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SeparationKind {
    Points,
    FaceA,
    FaceB,
}

struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: SeparationKind,
    local_point: Vec2,
    axis: Vec2,
}

impl<'a> SeparationFunction<'a> {
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy,
        sweep_b: Sweep,
        t1: f32,
    ) -> Self {
        debug_assert!(0 < cache.count && cache.count < 3);

        let xf_a = sweep_a.transform_at(t1);
        let xf_b = sweep_b.transform_at(t1);

        let mut f = SeparationFunction {
            proxy_a,
            proxy_b,
            sweep_a,
            sweep_b,
            kind: SeparationKind::Points,
            local_point: Vec2::ZERO,
            axis: Vec2::ZERO,
        };

        if cache.count == 1 {
            let point_a = xf_a.apply(proxy_a.vertex(cache.index_a[0] as usize));
            let point_b = xf_b.apply(proxy_b.vertex(cache.index_b[0] as usize));
            f.axis = (point_b - point_a).normalized();
        } else if cache.index_a[0] == cache.index_a[1] {
            // Two points on B and one on A
            f.kind = SeparationKind::FaceB;
            let local_b1 = proxy_b.vertex(cache.index_b[0] as usize);
            let local_b2 = proxy_b.vertex(cache.index_b[1] as usize);

            f.axis = (local_b2 - local_b1).cross_scalar(1.0).normalized();
            let normal = xf_b.q.apply(f.axis);

            f.local_point = (local_b1 + local_b2) * 0.5;
            let point_b = xf_b.apply(f.local_point);
            let point_a = xf_a.apply(proxy_a.vertex(cache.index_a[0] as usize));

            if (point_a - point_b).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        } else {
            // Two points on A and one or two points on B
            f.kind = SeparationKind::FaceA;
            let local_a1 = proxy_a.vertex(cache.index_a[0] as usize);
            let local_a2 = proxy_a.vertex(cache.index_a[1] as usize);

            f.axis = (local_a2 - local_a1).cross_scalar(1.0).normalized();
            let normal = xf_a.q.apply(f.axis);

            f.local_point = (local_a1 + local_a2) * 0.5;
            let point_a = xf_a.apply(f.local_point);
            let point_b = xf_b.apply(proxy_b.vertex(cache.index_b[0] as usize));

            if (point_b - point_a).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        }
        f
    }

    /// Deepest points along the separating axis at time `t`
    fn find_min_separation(&self, t: f32) -> (f32, usize, usize) {
        let xf_a = self.sweep_a.transform_at(t);
        let xf_b = self.sweep_b.transform_at(t);

        match self.kind {
            SeparationKind::Points => {
                let index_a = self.proxy_a.support(xf_a.q.apply_inverse(self.axis));
                let index_b = self.proxy_b.support(xf_b.q.apply_inverse(-self.axis));
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                ((point_b - point_a).dot(self.axis), index_a, index_b)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let index_b = self.proxy_b.support(xf_b.q.apply_inverse(-normal));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                ((point_b - point_a).dot(normal), 0, index_b)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let index_a = self.proxy_a.support(xf_a.q.apply_inverse(-normal));
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                ((point_a - point_b).dot(normal), index_a, 0)
            }
        }
    }

    /// Separation of the given vertex pair at time `t`
    fn evaluate(&self, index_a: usize, index_b: usize, t: f32) -> f32 {
        let xf_a = self.sweep_a.transform_at(t);
        let xf_b = self.sweep_b.transform_at(t);

        match self.kind {
            SeparationKind::Points => {
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(self.axis)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(normal)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                (point_a - point_b).dot(normal)
            }
        }
    }
}

/// Compute the upper bound on time before two shapes penetrate
///
/// Time is a fraction of the sweep interval in `[0, t_max]`.
pub fn time_of_impact(input: &ToiInput) -> ToiOutput {
    let mut output = ToiOutput {
        state: ToiState::Unknown,
        t: input.t_max,
    };

    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;

    let mut sweep_a = input.sweep_a;
    let mut sweep_b = input.sweep_b;

    // Large rotations can make the root finder fail, so normalize the angles
    sweep_a.normalize();
    sweep_b.normalize();

    let t_max = input.t_max;

    let total_radius = proxy_a.radius + proxy_b.radius;
    let target = LINEAR_SLOP.max(total_radius - 3.0 * LINEAR_SLOP);
    let tolerance = 0.25 * LINEAR_SLOP;
    debug_assert!(target > tolerance);

    let mut t1 = 0.0;
    let mut iter = 0;

    // Prepare input for the distance query
    let mut cache = SimplexCache::default();
    let mut distance_input = DistanceInput {
        proxy_a: input.proxy_a,
        proxy_b: input.proxy_b,
        transform_a: sweep_a.transform_at(t1),
        transform_b: sweep_b.transform_at(t1),
        use_radii: false,
    };

    // The outer loop progressively attempts to compute new separating axes.
    // It terminates when an axis is repeated (no progress is made).
    loop {
        distance_input.transform_a = sweep_a.transform_at(t1);
        distance_input.transform_b = sweep_b.transform_at(t1);

        // Get the distance between shapes; this also seeds the separating axis
        let distance_output = distance(&mut cache, &distance_input);

        if distance_output.distance <= 0.0 {
            // Failure
            output.state = ToiState::Overlapped;
            output.t = 0.0;
            break;
        }

        if distance_output.distance < target + tolerance {
            // Victory
            output.state = ToiState::Touching;
            output.t = t1;
            break;
        }

        let fcn = SeparationFunction::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

        // Resolve the deepest point. This loop is bounded by the vertex count.
        let mut done = false;
        let mut t2 = t_max;
        let mut push_back_iter = 0;
        loop {
            let (mut s2, index_a, index_b) = fcn.find_min_separation(t2);

            // Is the final configuration separated
            if s2 > target + tolerance {
                output.state = ToiState::Separated;
                output.t = t_max;
                done = true;
                break;
            }

            // Has the separation reached tolerance
            if s2 > target - tolerance {
                // Advance the sweeps
                t1 = t2;
                break;
            }

            // Compute the initial separation of the witness points
            let mut s1 = fcn.evaluate(index_a, index_b, t1);

            // The root finder needs an initial overlap
            if s1 < target - tolerance {
                output.state = ToiState::Failed;
                output.t = t1;
                done = true;
                break;
            }

            // Check for touching
            if s1 <= target + tolerance {
                output.state = ToiState::Touching;
                output.t = t1;
                done = true;
                break;
            }

            // Compute 1D root of f(x) - target = 0
            let mut root_iter = 0;
            let mut a1 = t1;
            let mut a2 = t2;
            loop {
                // Mix secant and bisection
                let t = if root_iter & 1 == 1 {
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    0.5 * (a1 + a2)
                };
                root_iter += 1;

                let s = fcn.evaluate(index_a, index_b, t);

                if (s - target).abs() < tolerance {
                    t2 = t;
                    break;
                }

                // Ensure we continue to bracket the root
                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }

                if root_iter == MAX_ROOT_ITERATIONS {
                    break;
                }
            }

            push_back_iter += 1;
            if push_back_iter == MAX_POLYGON_VERTICES {
                break;
            }
        }

        iter += 1;

        if done {
            break;
        }

        if iter == MAX_ITERATIONS {
            // Root finder got stuck; semi-victory
            output.state = ToiState::Failed;
            output.t = t1;
            break;
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{PolygonShape, Shape};

    fn sweep(from: Vec2, to: Vec2) -> Sweep {
        Sweep {
            local_center: Vec2::ZERO,
            c0: from,
            c: to,
            a0: 0.0,
            a: 0.0,
            alpha0: 0.0,
        }
    }

    #[test]
    fn test_fast_box_hits_wall() {
        let wall = Shape::Polygon(PolygonShape::new_box(0.1, 5.0));
        let bullet = Shape::Polygon(PolygonShape::new_box(0.25, 0.25));
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&wall, 0),
            proxy_b: DistanceProxy::new(&bullet, 0),
            sweep_a: sweep(Vec2::ZERO, Vec2::ZERO),
            sweep_b: sweep(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0)),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Touching);
        // Contact happens around x = -0.35, i.e. just before the midpoint
        assert!(out.t > 0.45 && out.t < 0.5);
    }

    #[test]
    fn test_separated_sweeps() {
        let square = Shape::Polygon(PolygonShape::new_box(0.5, 0.5));
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&square, 0),
            proxy_b: DistanceProxy::new(&square, 0),
            sweep_a: sweep(Vec2::ZERO, Vec2::ZERO),
            sweep_b: sweep(Vec2::new(0.0, 5.0), Vec2::new(3.0, 5.0)),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Separated);
        assert_eq!(out.t, 1.0);
    }
}
