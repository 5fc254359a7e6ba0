//! Mouse joint: drags a point on body B towards a world target
//!
//! A soft constraint with a maximum force, so the body lags behind a fast
//! target instead of exploding. Body A is only a placeholder for islands.

use kinetic2d_math::{Mat22, Rot, Vec2};

use super::{soft_constraint, JointConstraint, SolverBody};
use crate::body::{Body, BodyKey};
use crate::step::SolverData;

#[derive(Clone, Debug, PartialEq)]
pub struct MouseJointDef {
    /// Usually a static ground body
    pub body_a: BodyKey,
    pub body_b: BodyKey,
    pub collide_connected: bool,
    /// Initial world target; also the anchor on body B
    pub target: Vec2,
    /// Usually a multiple of the body weight
    pub max_force: f32,
    pub frequency_hz: f32,
    pub damping_ratio: f32,
}

impl MouseJointDef {
    pub fn new(body_a: BodyKey, body_b: BodyKey, target: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            target,
            max_force: 0.0,
            frequency_hz: 5.0,
            damping_ratio: 0.7,
        }
    }

    pub fn with_max_force(mut self, max_force: f32) -> Self {
        self.max_force = max_force;
        self
    }

    pub fn with_spring(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MouseJoint {
    pub(crate) local_anchor_b: Vec2,
    target: Vec2,
    frequency_hz: f32,
    damping_ratio: f32,
    beta: f32,
    impulse: Vec2,
    max_force: f32,
    gamma: f32,

    r_b: Vec2,
    mass: Mat22,
    c: Vec2,
}

impl MouseJoint {
    pub(crate) fn new(def: &MouseJointDef) -> Self {
        Self {
            // Resolved against body B when the joint is added to the world
            local_anchor_b: def.target,
            target: def.target,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            beta: 0.0,
            impulse: Vec2::ZERO,
            max_force: def.max_force,
            gamma: 0.0,
            r_b: Vec2::ZERO,
            mass: Mat22::ZERO,
            c: Vec2::ZERO,
        }
    }

    /// Anchor the grab point in body B's frame
    pub(crate) fn attach(&mut self, body_b: &Body) {
        self.local_anchor_b = body_b.local_point(self.target);
    }

    pub fn target(&self) -> Vec2 {
        self.target
    }

    /// Move the target; the world wakes body B when this is set through it
    pub(crate) fn set_target(&mut self, target: Vec2) {
        self.target = target;
    }

    pub fn max_force(&self) -> f32 {
        self.max_force
    }

    pub fn set_max_force(&mut self, force: f32) {
        self.max_force = force;
    }

    pub fn frequency(&self) -> f32 {
        self.frequency_hz
    }

    pub fn damping_ratio(&self) -> f32 {
        self.damping_ratio
    }
}

impl JointConstraint for MouseJoint {
    fn init_velocity_constraints(&mut self, _a: &SolverBody, b: &SolverBody, data: &mut SolverData) {
        let pos_b = data.positions[b.index];
        let mut vel_b = data.velocities[b.index];
        let (m_b, i_b) = (b.inv_mass, b.inv_i);

        let mass = if m_b > 0.0 { 1.0 / m_b } else { 0.0 };
        let (gamma, beta) = soft_constraint(mass, self.frequency_hz, self.damping_ratio, data.step.dt);
        self.gamma = gamma;
        self.beta = beta;

        self.r_b = Rot::from_angle(pos_b.a).apply(self.local_anchor_b - b.local_center);
        let r_b = self.r_b;

        let k = Mat22::new(
            Vec2::new(m_b + i_b * r_b.y * r_b.y + self.gamma, -i_b * r_b.x * r_b.y),
            Vec2::new(-i_b * r_b.x * r_b.y, m_b + i_b * r_b.x * r_b.x + self.gamma),
        );
        self.mass = k.inverse();

        self.c = (pos_b.c + r_b - self.target) * self.beta;

        // Cheat with some damping
        vel_b.w *= 0.98;

        if data.step.warm_starting {
            self.impulse = self.impulse * data.step.dt_ratio;
            vel_b.v += self.impulse * m_b;
            vel_b.w += i_b * r_b.cross(self.impulse);
        } else {
            self.impulse = Vec2::ZERO;
        }

        data.velocities[b.index] = vel_b;
    }

    fn solve_velocity_constraints(&mut self, _a: &SolverBody, b: &SolverBody, data: &mut SolverData) {
        let mut vel_b = data.velocities[b.index];

        let cdot = vel_b.v + Vec2::scalar_cross(vel_b.w, self.r_b);
        let impulse = self.mass.mul_vec(-(cdot + self.c + self.impulse * self.gamma));

        let old_impulse = self.impulse;
        self.impulse += impulse;
        let max_impulse = data.step.dt * self.max_force;
        if self.impulse.length_squared() > max_impulse * max_impulse {
            self.impulse = self.impulse * (max_impulse / self.impulse.length());
        }
        let impulse = self.impulse - old_impulse;

        vel_b.v += impulse * b.inv_mass;
        vel_b.w += b.inv_i * self.r_b.cross(impulse);
        data.velocities[b.index] = vel_b;
    }

    fn solve_position_constraints(&mut self, _a: &SolverBody, _b: &SolverBody, _data: &mut SolverData) -> bool {
        true
    }

    fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        self.impulse * inv_dt
    }

    fn reaction_torque(&self, _inv_dt: f32) -> f32 {
        0.0
    }
}
