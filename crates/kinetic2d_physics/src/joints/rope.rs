//! Rope joint: an upper limit on the distance between two anchors

use kinetic2d_math::{Rot, Vec2};

use super::{JointConstraint, SolverBody};
use crate::body::BodyKey;
use crate::settings::{LINEAR_SLOP, MAX_LINEAR_CORRECTION};
use crate::step::SolverData;

#[derive(Clone, Debug, PartialEq)]
pub struct RopeJointDef {
    pub body_a: BodyKey,
    pub body_b: BodyKey,
    pub collide_connected: bool,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Must be larger than the linear slop
    pub max_length: f32,
}

impl RopeJointDef {
    pub fn new(body_a: BodyKey, body_b: BodyKey) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            max_length: 0.0,
        }
    }

    pub fn with_anchors(mut self, local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        self.local_anchor_a = local_anchor_a;
        self.local_anchor_b = local_anchor_b;
        self
    }

    pub fn with_max_length(mut self, max_length: f32) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RopeJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    max_length: f32,
    length: f32,
    impulse: f32,

    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
    taut: bool,
}

impl RopeJoint {
    pub(crate) fn new(def: &RopeJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            max_length: def.max_length,
            length: 0.0,
            impulse: 0.0,
            u: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
            taut: false,
        }
    }

    pub fn max_length(&self) -> f32 {
        self.max_length
    }

    pub fn set_max_length(&mut self, max_length: f32) {
        self.max_length = max_length;
    }

    /// Whether the rope was stretched to its limit at the start of the step
    pub fn is_taut(&self) -> bool {
        self.taut
    }
}

impl JointConstraint for RopeJoint {
    fn init_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData) {
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);
        let pos_a = data.positions[a.index];
        let pos_b = data.positions[b.index];
        let mut vel_a = data.velocities[a.index];
        let mut vel_b = data.velocities[b.index];

        self.r_a = Rot::from_angle(pos_a.a).apply(self.local_anchor_a - a.local_center);
        self.r_b = Rot::from_angle(pos_b.a).apply(self.local_anchor_b - b.local_center);
        self.u = pos_b.c + self.r_b - pos_a.c - self.r_a;

        self.length = self.u.length();
        self.taut = self.length - self.max_length > 0.0;

        if self.length > LINEAR_SLOP {
            self.u = self.u * (1.0 / self.length);
        } else {
            self.u = Vec2::ZERO;
            self.mass = 0.0;
            self.impulse = 0.0;
            return;
        }

        let cr_a = self.r_a.cross(self.u);
        let cr_b = self.r_b.cross(self.u);
        let inv_mass = m_a + i_a * cr_a * cr_a + m_b + i_b * cr_b * cr_b;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            let p = self.u * self.impulse;
            vel_a.v -= p * m_a;
            vel_a.w -= i_a * self.r_a.cross(p);
            vel_b.v += p * m_b;
            vel_b.w += i_b * self.r_b.cross(p);
        } else {
            self.impulse = 0.0;
        }

        data.velocities[a.index] = vel_a;
        data.velocities[b.index] = vel_b;
    }

    fn solve_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData) {
        let mut vel_a = data.velocities[a.index];
        let mut vel_b = data.velocities[b.index];

        let vp_a = vel_a.v + Vec2::scalar_cross(vel_a.w, self.r_a);
        let vp_b = vel_b.v + Vec2::scalar_cross(vel_b.w, self.r_b);
        let c = self.length - self.max_length;
        let mut cdot = self.u.dot(vp_b - vp_a);

        // Predictive constraint
        if c < 0.0 {
            cdot += data.step.inv_dt * c;
        }

        let impulse = -self.mass * cdot;
        let old_impulse = self.impulse;
        self.impulse = (self.impulse + impulse).min(0.0);
        let impulse = self.impulse - old_impulse;

        let p = self.u * impulse;
        vel_a.v -= p * a.inv_mass;
        vel_a.w -= a.inv_i * self.r_a.cross(p);
        vel_b.v += p * b.inv_mass;
        vel_b.w += b.inv_i * self.r_b.cross(p);

        data.velocities[a.index] = vel_a;
        data.velocities[b.index] = vel_b;
    }

    fn solve_position_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData) -> bool {
        let mut pos_a = data.positions[a.index];
        let mut pos_b = data.positions[b.index];

        let r_a = Rot::from_angle(pos_a.a).apply(self.local_anchor_a - a.local_center);
        let r_b = Rot::from_angle(pos_b.a).apply(self.local_anchor_b - b.local_center);
        let mut u = pos_b.c + r_b - pos_a.c - r_a;

        let length = u.normalize();
        let c = (length - self.max_length).clamp(0.0, MAX_LINEAR_CORRECTION);

        let impulse = -self.mass * c;
        let p = u * impulse;

        pos_a.c -= p * a.inv_mass;
        pos_a.a -= a.inv_i * r_a.cross(p);
        pos_b.c += p * b.inv_mass;
        pos_b.a += b.inv_i * r_b.cross(p);

        data.positions[a.index] = pos_a;
        data.positions[b.index] = pos_b;

        length - self.max_length < LINEAR_SLOP
    }

    fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        self.u * (inv_dt * self.impulse)
    }

    fn reaction_torque(&self, _inv_dt: f32) -> f32 {
        0.0
    }
}
