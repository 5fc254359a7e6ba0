//! Distance joint: keeps two anchor points at a fixed distance
//!
//! With a positive frequency the rod becomes a damped spring.

use kinetic2d_math::{Rot, Vec2};

use super::{soft_constraint, JointConstraint, SolverBody};
use crate::body::{Body, BodyKey};
use crate::settings::{LINEAR_SLOP, MAX_LINEAR_CORRECTION};
use crate::step::SolverData;

#[derive(Clone, Debug, PartialEq)]
pub struct DistanceJointDef {
    pub body_a: BodyKey,
    pub body_b: BodyKey,
    pub collide_connected: bool,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Rest length
    pub length: f32,
    /// Mass-spring-damper frequency in Hertz; zero disables softness
    pub frequency_hz: f32,
    /// 0 = no damping, 1 = critical damping
    pub damping_ratio: f32,
}

impl DistanceJointDef {
    /// Anchors at the body origins with unit length
    pub fn new(body_a: BodyKey, body_b: BodyKey) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            length: 1.0,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
        }
    }

    /// Anchors and length from two world points
    pub fn initialize(
        body_a: (BodyKey, &Body),
        body_b: (BodyKey, &Body),
        anchor_a: Vec2,
        anchor_b: Vec2,
    ) -> Self {
        Self {
            local_anchor_a: body_a.1.local_point(anchor_a),
            local_anchor_b: body_b.1.local_point(anchor_b),
            length: (anchor_b - anchor_a).length(),
            ..Self::new(body_a.0, body_b.0)
        }
    }

    pub fn with_spring(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }

    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DistanceJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    length: f32,
    frequency_hz: f32,
    damping_ratio: f32,

    impulse: f32,
    gamma: f32,
    bias: f32,
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
}

impl DistanceJoint {
    pub(crate) fn new(def: &DistanceJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length: def.length,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            impulse: 0.0,
            gamma: 0.0,
            bias: 0.0,
            u: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
        }
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn set_length(&mut self, length: f32) {
        self.length = length;
    }

    pub fn frequency(&self) -> f32 {
        self.frequency_hz
    }

    pub fn set_frequency(&mut self, hz: f32) {
        self.frequency_hz = hz;
    }

    pub fn damping_ratio(&self) -> f32 {
        self.damping_ratio
    }

    pub fn set_damping_ratio(&mut self, ratio: f32) {
        self.damping_ratio = ratio;
    }
}

impl JointConstraint for DistanceJoint {
    fn init_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData) {
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);
        let pos_a = data.positions[a.index];
        let pos_b = data.positions[b.index];
        let mut vel_a = data.velocities[a.index];
        let mut vel_b = data.velocities[b.index];

        self.r_a = Rot::from_angle(pos_a.a).apply(self.local_anchor_a - a.local_center);
        self.r_b = Rot::from_angle(pos_b.a).apply(self.local_anchor_b - b.local_center);
        self.u = pos_b.c + self.r_b - pos_a.c - self.r_a;

        // Handle singularity
        let length = self.u.length();
        if length > LINEAR_SLOP {
            self.u = self.u * (1.0 / length);
        } else {
            self.u = Vec2::ZERO;
        }

        let cr_a = self.r_a.cross(self.u);
        let cr_b = self.r_b.cross(self.u);
        let mut inv_mass = m_a + i_a * cr_a * cr_a + m_b + i_b * cr_b * cr_b;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.frequency_hz > 0.0 {
            let c = length - self.length;
            let (gamma, bias_factor) =
                soft_constraint(self.mass, self.frequency_hz, self.damping_ratio, data.step.dt);
            self.gamma = gamma;
            self.bias = c * bias_factor;
            inv_mass += self.gamma;
            self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
        }

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
        let cdot = self.u.dot(vp_b - vp_a);

        let impulse = -self.mass * (cdot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;

        let p = self.u * impulse;
        vel_a.v -= p * a.inv_mass;
        vel_a.w -= a.inv_i * self.r_a.cross(p);
        vel_b.v += p * b.inv_mass;
        vel_b.w += b.inv_i * self.r_b.cross(p);

        data.velocities[a.index] = vel_a;
        data.velocities[b.index] = vel_b;
    }

    fn solve_position_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData) -> bool {
        // Springs do not correct position
        if self.frequency_hz > 0.0 {
            return true;
        }

        let mut pos_a = data.positions[a.index];
        let mut pos_b = data.positions[b.index];

        let r_a = Rot::from_angle(pos_a.a).apply(self.local_anchor_a - a.local_center);
        let r_b = Rot::from_angle(pos_b.a).apply(self.local_anchor_b - b.local_center);
        let mut u = pos_b.c + r_b - pos_a.c - r_a;

        let length = u.normalize();
        let c = (length - self.length).clamp(-MAX_LINEAR_CORRECTION, MAX_LINEAR_CORRECTION);

        let impulse = -self.mass * c;
        let p = u * impulse;

        pos_a.c -= p * a.inv_mass;
        pos_a.a -= a.inv_i * r_a.cross(p);
        pos_b.c += p * b.inv_mass;
        pos_b.a += b.inv_i * r_b.cross(p);

        data.positions[a.index] = pos_a;
        data.positions[b.index] = pos_b;

        c.abs() < LINEAR_SLOP
    }

    fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        self.u * (inv_dt * self.impulse)
    }

    fn reaction_torque(&self, _inv_dt: f32) -> f32 {
        0.0
    }
}
