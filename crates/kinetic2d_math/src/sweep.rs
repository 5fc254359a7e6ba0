//! Body motion over a time step, for continuous collision

use serde::{Deserialize, Serialize};
use crate::{Rot, Transform2D, Vec2};

/// Describes the motion of a body/shape for time-of-impact computation
///
/// Shapes are defined with respect to the body origin, which may not coincide
/// with the center of mass. To support dynamics the center of mass is
/// interpolated, and the body origin is recovered from it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    /// Local center of mass position
    pub local_center: Vec2,
    /// Center world position at `alpha0`
    pub c0: Vec2,
    /// Center world position at the end of the step
    pub c: Vec2,
    /// World angle at `alpha0`
    pub a0: f32,
    /// World angle at the end of the step
    pub a: f32,
    /// Fraction of the current time step in `[0, 1]`; `c0` and `a0` are the
    /// positions at `alpha0`
    pub alpha0: f32,
}

impl Sweep {
    /// Interpolated transform at a specific time
    ///
    /// `beta` is a factor in `[0, 1]` where 0 indicates `alpha0`.
    pub fn transform_at(&self, beta: f32) -> Transform2D {
        let c = self.c0 * (1.0 - beta) + self.c * beta;
        let angle = (1.0 - beta) * self.a0 + beta * self.a;
        let q = Rot::from_angle(angle);
        // Shift to origin
        Transform2D::new(c - q.apply(self.local_center), q)
    }

    /// Advance the sweep forward, yielding a new initial state
    ///
    /// `alpha` is the new initial time.
    pub fn advance(&mut self, alpha: f32) {
        debug_assert!(self.alpha0 < 1.0);
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 += (self.c - self.c0) * beta;
        self.a0 += beta * (self.a - self.a0);
        self.alpha0 = alpha;
    }

    /// Normalize the angles into `[-pi, pi]` keeping their difference
    pub fn normalize(&mut self) {
        let two_pi = 2.0 * std::f32::consts::PI;
        let d = two_pi * (self.a0 / two_pi).floor();
        self.a0 -= d;
        self.a -= d;
    }
}
