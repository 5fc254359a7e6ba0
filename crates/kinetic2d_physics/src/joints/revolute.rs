//! Revolute joint: two bodies share an anchor point and rotate about it
//!
//! An optional angle limit and an optional motor with bounded torque.

use kinetic2d_math::{Mat22, Mat33, Rot, Vec2, Vec3};
use slotmap::SlotMap;

use super::{point_angle_mass, JointConstraint, SolverBody};
use crate::body::{Body, BodyKey};
use crate::settings::{ANGULAR_SLOP, LINEAR_SLOP, MAX_ANGULAR_CORRECTION};
use crate::step::SolverData;

/// Which side of an angle or length limit is engaged
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LimitState {
    #[default]
    Inactive,
    AtLower,
    AtUpper,
    /// Lower and upper limits coincide
    Equal,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RevoluteJointDef {
    pub body_a: BodyKey,
    pub body_b: BodyKey,
    pub collide_connected: bool,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Body B angle minus body A angle in the reference state
    pub reference_angle: f32,
    pub enable_limit: bool,
    pub lower_angle: f32,
    pub upper_angle: f32,
    pub enable_motor: bool,
    /// Target relative speed in radians per second
    pub motor_speed: f32,
    pub max_motor_torque: f32,
}

impl RevoluteJointDef {
    pub fn new(body_a: BodyKey, body_b: BodyKey) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            reference_angle: 0.0,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
        }
    }

    /// Anchors and reference angle from a shared world anchor point
    pub fn initialize(body_a: (BodyKey, &Body), body_b: (BodyKey, &Body), anchor: Vec2) -> Self {
        Self {
            local_anchor_a: body_a.1.local_point(anchor),
            local_anchor_b: body_b.1.local_point(anchor),
            reference_angle: body_b.1.angle() - body_a.1.angle(),
            ..Self::new(body_a.0, body_b.0)
        }
    }

    pub fn with_limit(mut self, lower_angle: f32, upper_angle: f32) -> Self {
        self.enable_limit = true;
        self.lower_angle = lower_angle.min(upper_angle);
        self.upper_angle = upper_angle.max(lower_angle);
        self
    }

    pub fn with_motor(mut self, speed: f32, max_torque: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
        self
    }

    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RevoluteJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    reference_angle: f32,
    impulse: Vec3,
    motor_impulse: f32,

    enable_motor: bool,
    max_motor_torque: f32,
    motor_speed: f32,

    enable_limit: bool,
    lower_angle: f32,
    upper_angle: f32,

    r_a: Vec2,
    r_b: Vec2,
    /// Effective mass for the point-to-point and angle constraints
    mass: Mat33,
    /// Effective mass for the motor and limit
    motor_mass: f32,
    limit_state: LimitState,
}

impl RevoluteJoint {
    pub(crate) fn new(def: &RevoluteJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            impulse: Vec3::ZERO,
            motor_impulse: 0.0,
            enable_motor: def.enable_motor,
            max_motor_torque: def.max_motor_torque,
            motor_speed: def.motor_speed,
            enable_limit: def.enable_limit,
            lower_angle: def.lower_angle,
            upper_angle: def.upper_angle,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: Mat33::ZERO,
            motor_mass: 0.0,
            limit_state: LimitState::Inactive,
        }
    }

    pub fn reference_angle(&self) -> f32 {
        self.reference_angle
    }

    /// Current joint angle given the two bodies
    pub fn joint_angle(&self, bodies: &SlotMap<BodyKey, Body>, body_a: BodyKey, body_b: BodyKey) -> Option<f32> {
        Some(bodies.get(body_b)?.sweep.a - bodies.get(body_a)?.sweep.a - self.reference_angle)
    }

    pub fn is_limit_enabled(&self) -> bool {
        self.enable_limit
    }

    pub fn enable_limit(&mut self, flag: bool) {
        if flag != self.enable_limit {
            self.enable_limit = flag;
            self.impulse.z = 0.0;
        }
    }

    pub fn limits(&self) -> (f32, f32) {
        (self.lower_angle, self.upper_angle)
    }

    pub fn set_limits(&mut self, lower: f32, upper: f32) {
        if lower != self.lower_angle || upper != self.upper_angle {
            self.impulse.z = 0.0;
            self.lower_angle = lower.min(upper);
            self.upper_angle = upper.max(lower);
        }
    }

    pub fn limit_state(&self) -> LimitState {
        self.limit_state
    }

    pub fn is_motor_enabled(&self) -> bool {
        self.enable_motor
    }

    pub fn enable_motor(&mut self, flag: bool) {
        self.enable_motor = flag;
    }

    pub fn motor_speed(&self) -> f32 {
        self.motor_speed
    }

    pub fn set_motor_speed(&mut self, speed: f32) {
        self.motor_speed = speed;
    }

    pub fn max_motor_torque(&self) -> f32 {
        self.max_motor_torque
    }

    pub fn set_max_motor_torque(&mut self, torque: f32) {
        self.max_motor_torque = torque;
    }

    pub fn motor_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.motor_impulse
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

impl JointConstraint for RevoluteJoint {
    fn init_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData) {
        let (i_a, i_b) = (a.inv_i, b.inv_i);
        let pos_a = data.positions[a.index];
        let pos_b = data.positions[b.index];

        self.r_a = Rot::from_angle(pos_a.a).apply(self.local_anchor_a - a.local_center);
        self.r_b = Rot::from_angle(pos_b.a).apply(self.local_anchor_b - b.local_center);

        let fixed_rotation = i_a + i_b == 0.0;
        self.mass = point_angle_mass(a, b, self.r_a, self.r_b);

        self.motor_mass = i_a + i_b;
        if self.motor_mass > 0.0 {
            self.motor_mass = 1.0 / self.motor_mass;
        }

        if !self.enable_motor || fixed_rotation {
            self.motor_impulse = 0.0;
        }

        if self.enable_limit && !fixed_rotation {
            let joint_angle = pos_b.a - pos_a.a - self.reference_angle;
            if (self.upper_angle - self.lower_angle).abs() < 2.0 * ANGULAR_SLOP {
                self.limit_state = LimitState::Equal;
            } else if joint_angle <= self.lower_angle {
                if self.limit_state != LimitState::AtLower {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtLower;
            } else if joint_angle >= self.upper_angle {
                if self.limit_state != LimitState::AtUpper {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtUpper;
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = 0.0;
            }
        } else {
            self.limit_state = LimitState::Inactive;
        }

        if data.step.warm_starting {
            self.impulse = self.impulse * data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;
            let p = Vec2::new(self.impulse.x, self.impulse.y);
            self.apply_impulse(a, b, data, p, self.motor_impulse + self.impulse.z);
        } else {
            self.impulse = Vec3::ZERO;
            self.motor_impulse = 0.0;
        }
    }

    fn solve_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData) {
        let (i_a, i_b) = (a.inv_i, b.inv_i);
        let fixed_rotation = i_a + i_b == 0.0;

        // Motor
        if self.enable_motor && self.limit_state != LimitState::Equal && !fixed_rotation {
            let w_a = data.velocities[a.index].w;
            let w_b = data.velocities[b.index].w;
            let cdot = w_b - w_a - self.motor_speed;
            let impulse = -self.motor_mass * cdot;
            let old_impulse = self.motor_impulse;
            let max_impulse = data.step.dt * self.max_motor_torque;
            self.motor_impulse = (old_impulse + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.motor_impulse - old_impulse;

            data.velocities[a.index].w -= i_a * impulse;
            data.velocities[b.index].w += i_b * impulse;
        }

        let vel_a = data.velocities[a.index];
        let vel_b = data.velocities[b.index];
        let cdot1 = vel_b.v + Vec2::scalar_cross(vel_b.w, self.r_b)
            - vel_a.v
            - Vec2::scalar_cross(vel_a.w, self.r_a);

        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let cdot2 = vel_b.w - vel_a.w;
            let cdot = Vec3::new(cdot1.x, cdot1.y, cdot2);
            let mut impulse = -self.mass.solve33(cdot);

            let clamp_to_point = |joint: &mut Self, impulse: &mut Vec3| {
                let rhs = -cdot1 + Vec2::new(joint.mass.ez.x, joint.mass.ez.y) * joint.impulse.z;
                let reduced = joint.mass.solve22(rhs);
                impulse.x = reduced.x;
                impulse.y = reduced.y;
                impulse.z = -joint.impulse.z;
                joint.impulse.x += reduced.x;
                joint.impulse.y += reduced.y;
                joint.impulse.z = 0.0;
            };

            match self.limit_state {
                LimitState::Equal => self.impulse += impulse,
                LimitState::AtLower => {
                    if self.impulse.z + impulse.z < 0.0 {
                        clamp_to_point(self, &mut impulse);
                    } else {
                        self.impulse += impulse;
                    }
                }
                LimitState::AtUpper => {
                    if self.impulse.z + impulse.z > 0.0 {
                        clamp_to_point(self, &mut impulse);
                    } else {
                        self.impulse += impulse;
                    }
                }
                LimitState::Inactive => {}
            }

            let p = Vec2::new(impulse.x, impulse.y);
            self.apply_impulse(a, b, data, p, impulse.z);
        } else {
            // Point to point only
            let impulse = self.mass.solve22(-cdot1);
            self.impulse.x += impulse.x;
            self.impulse.y += impulse.y;
            self.apply_impulse(a, b, data, impulse, 0.0);
        }
    }

    fn solve_position_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData) -> bool {
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);
        let mut pos_a = data.positions[a.index];
        let mut pos_b = data.positions[b.index];

        let mut angular_error = 0.0;
        let fixed_rotation = i_a + i_b == 0.0;

        // Angle limit
        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let angle = pos_b.a - pos_a.a - self.reference_angle;
            let c = match self.limit_state {
                LimitState::Equal => {
                    let c = (angle - self.lower_angle)
                        .clamp(-MAX_ANGULAR_CORRECTION, MAX_ANGULAR_CORRECTION);
                    angular_error = c.abs();
                    c
                }
                LimitState::AtLower => {
                    let c = angle - self.lower_angle;
                    angular_error = -c;
                    (c + ANGULAR_SLOP).clamp(-MAX_ANGULAR_CORRECTION, 0.0)
                }
                LimitState::AtUpper => {
                    let c = angle - self.upper_angle;
                    angular_error = c;
                    (c - ANGULAR_SLOP).clamp(0.0, MAX_ANGULAR_CORRECTION)
                }
                LimitState::Inactive => 0.0,
            };
            let limit_impulse = -self.motor_mass * c;
            pos_a.a -= i_a * limit_impulse;
            pos_b.a += i_b * limit_impulse;
        }

        // Point to point
        let r_a = Rot::from_angle(pos_a.a).apply(self.local_anchor_a - a.local_center);
        let r_b = Rot::from_angle(pos_b.a).apply(self.local_anchor_b - b.local_center);

        let c = pos_b.c + r_b - pos_a.c - r_a;
        let position_error = c.length();

        let k = Mat22::new(
            Vec2::new(
                m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y,
                -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
            ),
            Vec2::new(
                -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
                m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x,
            ),
        );
        let impulse = -k.solve(c);

        pos_a.c -= impulse * m_a;
        pos_a.a -= i_a * r_a.cross(impulse);
        pos_b.c += impulse * m_b;
        pos_b.a += i_b * r_b.cross(impulse);

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
