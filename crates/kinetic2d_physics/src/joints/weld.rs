//! Weld joint: glues two bodies together, optionally with a soft angle

use kinetic2d_math::{Mat33, Rot, Vec2, Vec3};

use super::{point_angle_mass, soft_constraint, JointConstraint, SolverBody};
use crate::body::{Body, BodyKey};
use crate::settings::{ANGULAR_SLOP, LINEAR_SLOP};
use crate::step::SolverData;

#[derive(Clone, Debug, PartialEq)]
pub struct WeldJointDef {
    pub body_a: BodyKey,
    pub body_b: BodyKey,
    pub collide_connected: bool,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub reference_angle: f32,
    /// Angular spring frequency; zero makes the weld rigid
    pub frequency_hz: f32,
    pub damping_ratio: f32,
}

impl WeldJointDef {
    pub fn new(body_a: BodyKey, body_b: BodyKey) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            reference_angle: 0.0,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
        }
    }

    pub fn initialize(body_a: (BodyKey, &Body), body_b: (BodyKey, &Body), anchor: Vec2) -> Self {
        Self {
            local_anchor_a: body_a.1.local_point(anchor),
            local_anchor_b: body_b.1.local_point(anchor),
            reference_angle: body_b.1.angle() - body_a.1.angle(),
            ..Self::new(body_a.0, body_b.0)
        }
    }

    pub fn with_spring(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WeldJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    reference_angle: f32,
    frequency_hz: f32,
    damping_ratio: f32,
    bias: f32,
    gamma: f32,
    impulse: Vec3,

    r_a: Vec2,
    r_b: Vec2,
    mass: Mat33,
}

impl WeldJoint {
    pub(crate) fn new(def: &WeldJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            bias: 0.0,
            gamma: 0.0,
            impulse: Vec3::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: Mat33::ZERO,
        }
    }

    pub fn reference_angle(&self) -> f32 {
        self.reference_angle
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

    fn apply_impulse(&self, a: &SolverBody, b: &SolverBody, data: &mut SolverData, p: Vec2, angular: f32) {
        let vel_a = &mut data.velocities[a.index];
        vel_a.v -= p * a.inv_mass;
        vel_a.w -= a.inv_i * (self.r_a.cross(p) + angular);
        let vel_b = &mut data.velocities[b.index];
        vel_b.v += p * b.inv_mass;
        vel_b.w += b.inv_i * (self.r_b.cross(p) + angular);
    }
}

impl JointConstraint for WeldJoint {
    fn init_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData) {
        let (i_a, i_b) = (a.inv_i, b.inv_i);
        let pos_a = data.positions[a.index];
        let pos_b = data.positions[b.index];

        self.r_a = Rot::from_angle(pos_a.a).apply(self.local_anchor_a - a.local_center);
        self.r_b = Rot::from_angle(pos_b.a).apply(self.local_anchor_b - b.local_center);

        let k = point_angle_mass(a, b, self.r_a, self.r_b);

        if self.frequency_hz > 0.0 {
            self.mass = k.inverse22();

            let mut inv_m = i_a + i_b;
            let m = if inv_m > 0.0 { 1.0 / inv_m } else { 0.0 };
            let c = pos_b.a - pos_a.a - self.reference_angle;

            let (gamma, bias_factor) =
                soft_constraint(m, self.frequency_hz, self.damping_ratio, data.step.dt);
            self.gamma = gamma;
            self.bias = c * bias_factor;

            inv_m += self.gamma;
            self.mass.ez.z = if inv_m != 0.0 { 1.0 / inv_m } else { 0.0 };
        } else if k.ez.z == 0.0 {
            self.mass = k.inverse22();
            self.gamma = 0.0;
            self.bias = 0.0;
        } else {
            self.mass = k.symmetric_inverse33();
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            self.impulse = self.impulse * data.step.dt_ratio;
            let p = Vec2::new(self.impulse.x, self.impulse.y);
            self.apply_impulse(a, b, data, p, self.impulse.z);
        } else {
            self.impulse = Vec3::ZERO;
        }
    }

    fn solve_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData) {
        if self.frequency_hz > 0.0 {
            let cdot2 = data.velocities[b.index].w - data.velocities[a.index].w;
            let impulse2 = -self.mass.ez.z * (cdot2 + self.bias + self.gamma * self.impulse.z);
            self.impulse.z += impulse2;
            data.velocities[a.index].w -= a.inv_i * impulse2;
            data.velocities[b.index].w += b.inv_i * impulse2;

            let vel_a = data.velocities[a.index];
            let vel_b = data.velocities[b.index];
            let cdot1 = vel_b.v + Vec2::scalar_cross(vel_b.w, self.r_b)
                - vel_a.v
                - Vec2::scalar_cross(vel_a.w, self.r_a);
            let impulse1 = -self.mass.mul_vec22(cdot1);
            self.impulse.x += impulse1.x;
            self.impulse.y += impulse1.y;
            self.apply_impulse(a, b, data, impulse1, 0.0);
        } else {
            let vel_a = data.velocities[a.index];
            let vel_b = data.velocities[b.index];
            let cdot1 = vel_b.v + Vec2::scalar_cross(vel_b.w, self.r_b)
                - vel_a.v
                - Vec2::scalar_cross(vel_a.w, self.r_a);
            let cdot2 = vel_b.w - vel_a.w;
            let impulse = -self.mass.mul_vec(Vec3::new(cdot1.x, cdot1.y, cdot2));
            self.impulse += impulse;
            self.apply_impulse(a, b, data, Vec2::new(impulse.x, impulse.y), impulse.z);
        }
    }

    fn solve_position_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData) -> bool {
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);
        let mut pos_a = data.positions[a.index];
        let mut pos_b = data.positions[b.index];

        let r_a = Rot::from_angle(pos_a.a).apply(self.local_anchor_a - a.local_center);
        let r_b = Rot::from_angle(pos_b.a).apply(self.local_anchor_b - b.local_center);
        let k = point_angle_mass(a, b, r_a, r_b);

        let c1 = pos_b.c + r_b - pos_a.c - r_a;
        let position_error = c1.length();
        let angular_error;

        let (p, angular) = if self.frequency_hz > 0.0 {
            angular_error = 0.0;
            (-k.solve22(c1), 0.0)
        } else {
            let c2 = pos_b.a - pos_a.a - self.reference_angle;
            angular_error = c2.abs();
            let impulse = if k.ez.z > 0.0 {
                -k.solve33(Vec3::new(c1.x, c1.y, c2))
            } else {
                let impulse2 = -k.solve22(c1);
                Vec3::new(impulse2.x, impulse2.y, 0.0)
            };
            (Vec2::new(impulse.x, impulse.y), impulse.z)
        };

        pos_a.c -= p * m_a;
        pos_a.a -= i_a * (r_a.cross(p) + angular);
        pos_b.c += p * m_b;
        pos_b.a += i_b * (r_b.cross(p) + angular);

        data.positions[a.index] = pos_a;
        data.positions[b.index] = pos_b;

        position_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }

    fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        Vec2::new(self.impulse.x, self.impulse.y) * inv_dt
    }

    fn reaction_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.impulse.z
    }
}
