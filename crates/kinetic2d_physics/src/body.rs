//! Rigid bodies
//!
//! A body is plain data owned by the world's body arena. Operations that
//! only touch the body itself (forces, impulses, velocities, point
//! transforms) live here; anything that touches fixtures, contacts or the
//! broad phase goes through [`World`](crate::World).

use bitflags::bitflags;
use kinetic2d_math::{Rot, Sweep, Transform2D, Vec2};
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::contact::ContactKey;
use crate::fixture::FixtureKey;
use crate::joints::JointKey;

// Define generational key type for rigid bodies
new_key_type! {
    /// Key to a rigid body in the physics world
    ///
    /// Uses generational indexing to prevent the ABA problem where a handle
    /// could point to a reused slot. If a body is removed and its slot reused,
    /// old keys will return None instead of pointing to the wrong body.
    pub struct BodyKey;
}

/// How a body participates in the simulation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyType {
    /// Zero mass, zero velocity, may be moved manually
    #[default]
    Static,
    /// Zero mass, velocity set by the user, moved by the solver
    Kinematic,
    /// Positive mass, velocity determined by forces, moved by the solver
    Dynamic,
}

bitflags! {
    /// Internal state bits of a body
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct BodyFlags: u16 {
        /// Visited by the current island search
        const ISLAND = 1 << 0;
        const AWAKE = 1 << 1;
        /// May fall asleep when still
        const AUTO_SLEEP = 1 << 2;
        /// Continuous collision against dynamic bodies too
        const BULLET = 1 << 3;
        const FIXED_ROTATION = 1 << 4;
        /// Inactive bodies have no proxies and no contacts
        const ACTIVE = 1 << 5;
        const TOI = 1 << 6;
    }
}

/// Everything needed to construct a body
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyDef {
    pub body_type: BodyType,
    /// World position of the body origin
    pub position: Vec2,
    /// World angle in radians
    pub angle: f32,
    /// Linear velocity of the body origin
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub allow_sleep: bool,
    pub awake: bool,
    pub fixed_rotation: bool,
    /// Prevent tunneling through other moving bodies; costs more CPU
    pub bullet: bool,
    pub active: bool,
    pub gravity_scale: f32,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
            active: true,
            gravity_scale: 1.0,
        }
    }
}

impl BodyDef {
    /// A definition for a body of the given type
    pub fn new(body_type: BodyType) -> Self {
        Self {
            body_type,
            ..Default::default()
        }
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_linear_velocity(mut self, velocity: Vec2) -> Self {
        self.linear_velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, velocity: f32) -> Self {
        self.angular_velocity = velocity;
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn with_fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self
    }

    pub fn with_bullet(mut self, bullet: bool) -> Self {
        self.bullet = bullet;
        self
    }

    pub fn with_gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn with_allow_sleep(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    pub fn with_awake(mut self, awake: bool) -> Self {
        self.awake = awake;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Link from a body to a contact it takes part in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContactEdge {
    /// The body on the other side of the contact
    pub other: BodyKey,
    pub contact: ContactKey,
}

/// Link from a body to a joint it takes part in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JointEdge {
    /// The body on the other side of the joint
    pub other: BodyKey,
    pub joint: JointKey,
}

/// A rigid body
#[derive(Clone, Debug)]
pub struct Body {
    pub(crate) body_type: BodyType,
    pub(crate) flags: BodyFlags,
    pub(crate) island_index: usize,

    /// Body origin transform
    pub(crate) xf: Transform2D,
    /// Transform at the start of the last step, for interpolation
    pub(crate) xf0: Transform2D,
    pub(crate) sweep: Sweep,

    pub(crate) linear_velocity: Vec2,
    pub(crate) angular_velocity: f32,

    pub(crate) force: Vec2,
    pub(crate) torque: f32,

    pub(crate) fixtures: Vec<FixtureKey>,
    pub(crate) contact_edges: Vec<ContactEdge>,
    pub(crate) joint_edges: Vec<JointEdge>,

    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    /// Rotational inertia about the center of mass
    pub(crate) inertia: f32,
    pub(crate) inv_inertia: f32,

    pub(crate) linear_damping: f32,
    pub(crate) angular_damping: f32,
    pub(crate) gravity_scale: f32,

    pub(crate) sleep_time: f32,
}

impl Body {
    pub(crate) fn new(def: &BodyDef) -> Self {
        let mut flags = BodyFlags::empty();
        flags.set(BodyFlags::BULLET, def.bullet);
        flags.set(BodyFlags::FIXED_ROTATION, def.fixed_rotation);
        flags.set(BodyFlags::AUTO_SLEEP, def.allow_sleep);
        flags.set(BodyFlags::AWAKE, def.awake);
        flags.set(BodyFlags::ACTIVE, def.active);

        let xf = Transform2D::new(def.position, Rot::from_angle(def.angle));
        let sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: xf.p,
            c: xf.p,
            a0: def.angle,
            a: def.angle,
            alpha0: 0.0,
        };

        let (mass, inv_mass) = if def.body_type == BodyType::Dynamic {
            (1.0, 1.0)
        } else {
            (0.0, 0.0)
        };

        Self {
            body_type: def.body_type,
            flags,
            island_index: 0,
            xf,
            xf0: xf,
            sweep,
            linear_velocity: def.linear_velocity,
            angular_velocity: def.angular_velocity,
            force: Vec2::ZERO,
            torque: 0.0,
            fixtures: Vec::new(),
            contact_edges: Vec::new(),
            joint_edges: Vec::new(),
            mass,
            inv_mass,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            sleep_time: 0.0,
        }
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn transform(&self) -> &Transform2D {
        &self.xf
    }

    /// Transform at the start of the most recent step
    pub fn previous_transform(&self) -> &Transform2D {
        &self.xf0
    }

    /// World position of the body origin
    pub fn position(&self) -> Vec2 {
        self.xf.p
    }

    /// World angle in radians
    pub fn angle(&self) -> f32 {
        self.sweep.a
    }

    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }

    pub fn sweep(&self) -> &Sweep {
        &self.sweep
    }

    pub fn fixtures(&self) -> &[FixtureKey] {
        &self.fixtures
    }

    pub fn contact_edges(&self) -> &[ContactEdge] {
        &self.contact_edges
    }

    pub fn joint_edges(&self) -> &[JointEdge] {
        &self.joint_edges
    }

    pub fn linear_velocity(&self) -> Vec2 {
        self.linear_velocity
    }

    /// Set the linear velocity of the center of mass; ignored for static bodies
    pub fn set_linear_velocity(&mut self, v: Vec2) {
        if self.body_type == BodyType::Static {
            return;
        }
        if v.dot(v) > 0.0 {
            self.set_awake(true);
        }
        self.linear_velocity = v;
    }

    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    /// Set the angular velocity in radians per second; ignored for static bodies
    pub fn set_angular_velocity(&mut self, w: f32) {
        if self.body_type == BodyType::Static {
            return;
        }
        if w * w > 0.0 {
            self.set_awake(true);
        }
        self.angular_velocity = w;
    }

    /// Apply a force at a world point
    ///
    /// A force off the center of mass also generates torque. Wakes the body.
    pub fn apply_force(&mut self, force: Vec2, point: Vec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.force += force;
        self.torque += (point - self.sweep.c).cross(force);
    }

    pub fn apply_force_to_center(&mut self, force: Vec2) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.force += force;
    }

    pub fn apply_torque(&mut self, torque: f32) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.torque += torque;
    }

    /// Apply an impulse at a world point, immediately changing the velocity
    pub fn apply_linear_impulse(&mut self, impulse: Vec2, point: Vec2, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if !self.is_awake() {
            if !wake {
                return;
            }
            self.set_awake(true);
        }
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia * (point - self.sweep.c).cross(impulse);
    }

    pub fn apply_angular_impulse(&mut self, impulse: f32) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.set_awake(true);
        self.angular_velocity += self.inv_inertia * impulse;
    }

    /// Total mass in kilograms
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Rotational inertia about the body origin
    pub fn inertia(&self) -> f32 {
        self.inertia + self.mass * self.sweep.local_center.dot(self.sweep.local_center)
    }

    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    pub fn linear_damping(&self) -> f32 {
        self.linear_damping
    }

    pub fn set_linear_damping(&mut self, damping: f32) {
        self.linear_damping = damping;
    }

    pub fn angular_damping(&self) -> f32 {
        self.angular_damping
    }

    pub fn set_angular_damping(&mut self, damping: f32) {
        self.angular_damping = damping;
    }

    pub fn gravity_scale(&self) -> f32 {
        self.gravity_scale
    }

    pub fn set_gravity_scale(&mut self, scale: f32) {
        self.gravity_scale = scale;
    }

    pub fn is_bullet(&self) -> bool {
        self.flags.contains(BodyFlags::BULLET)
    }

    pub fn set_bullet(&mut self, flag: bool) {
        self.flags.set(BodyFlags::BULLET, flag);
    }

    pub fn is_sleeping_allowed(&self) -> bool {
        self.flags.contains(BodyFlags::AUTO_SLEEP)
    }

    pub fn set_sleeping_allowed(&mut self, flag: bool) {
        self.flags.set(BodyFlags::AUTO_SLEEP, flag);
        if !flag {
            self.set_awake(true);
        }
    }

    pub fn is_awake(&self) -> bool {
        self.flags.contains(BodyFlags::AWAKE)
    }

    /// Wake the body, or put it to sleep clearing velocities and forces
    pub fn set_awake(&mut self, flag: bool) {
        if flag {
            if !self.is_awake() {
                self.flags.insert(BodyFlags::AWAKE);
                self.sleep_time = 0.0;
            }
        } else {
            self.flags.remove(BodyFlags::AWAKE);
            self.sleep_time = 0.0;
            self.linear_velocity = Vec2::ZERO;
            self.angular_velocity = 0.0;
            self.force = Vec2::ZERO;
            self.torque = 0.0;
        }
    }

    pub fn is_active(&self) -> bool {
        self.flags.contains(BodyFlags::ACTIVE)
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.flags.contains(BodyFlags::FIXED_ROTATION)
    }

    /// World coordinates of a point given in body coordinates
    pub fn world_point(&self, local_point: Vec2) -> Vec2 {
        self.xf.apply(local_point)
    }

    pub fn world_vector(&self, local_vector: Vec2) -> Vec2 {
        self.xf.q.apply(local_vector)
    }

    pub fn local_point(&self, world_point: Vec2) -> Vec2 {
        self.xf.apply_inverse(world_point)
    }

    pub fn local_vector(&self, world_vector: Vec2) -> Vec2 {
        self.xf.q.apply_inverse(world_vector)
    }

    /// Velocity of a world point attached to this body
    pub fn linear_velocity_from_world_point(&self, world_point: Vec2) -> Vec2 {
        self.linear_velocity + Vec2::scalar_cross(self.angular_velocity, world_point - self.sweep.c)
    }

    pub fn linear_velocity_from_local_point(&self, local_point: Vec2) -> Vec2 {
        self.linear_velocity_from_world_point(self.world_point(local_point))
    }

    /// Recompute the origin transform from the sweep end state
    pub(crate) fn synchronize_transform(&mut self) {
        self.xf.q = Rot::from_angle(self.sweep.a);
        self.xf.p = self.sweep.c - self.xf.q.apply(self.sweep.local_center);
    }

    /// Transform at the start of the sweep
    pub(crate) fn sweep_start_transform(&self) -> Transform2D {
        let q = Rot::from_angle(self.sweep.a0);
        Transform2D::new(self.sweep.c0 - q.apply(self.sweep.local_center), q)
    }

    /// Move the whole sweep to `alpha`, used by continuous collision
    pub(crate) fn advance(&mut self, alpha: f32) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }

    pub(crate) fn is_in_island(&self) -> bool {
        self.flags.contains(BodyFlags::ISLAND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dynamic() -> Body {
        Body::new(&BodyDef::new(BodyType::Dynamic))
    }

    #[test]
    fn test_def_builders() {
        let def = BodyDef::new(BodyType::Dynamic)
            .with_position(Vec2::new(1.0, 2.0))
            .with_angle(0.5)
            .with_bullet(true)
            .with_gravity_scale(0.0);
        let body = Body::new(&def);
        assert_eq!(body.position(), Vec2::new(1.0, 2.0));
        assert!((body.angle() - 0.5).abs() < 1e-6);
        assert!(body.is_bullet());
        assert_eq!(body.gravity_scale(), 0.0);
    }

    #[test]
    fn test_forces_ignored_on_static_and_kinematic() {
        for body_type in [BodyType::Static, BodyType::Kinematic] {
            let mut body = Body::new(&BodyDef::new(body_type).with_awake(false));
            body.apply_force_to_center(Vec2::new(10.0, 0.0));
            body.apply_torque(3.0);
            body.apply_linear_impulse(Vec2::new(1.0, 0.0), Vec2::ZERO, true);
            body.apply_angular_impulse(1.0);
            assert_eq!(body.force, Vec2::ZERO);
            assert_eq!(body.linear_velocity(), Vec2::ZERO);
            assert!(!body.is_awake());
        }
    }

    #[test]
    fn test_force_wakes_body() {
        let mut body = dynamic();
        body.set_awake(false);
        body.apply_force(Vec2::new(0.0, 1.0), Vec2::new(1.0, 0.0));
        assert!(body.is_awake());
        assert_eq!(body.force, Vec2::new(0.0, 1.0));
        assert!((body.torque - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sleeping_clears_motion() {
        let mut body = dynamic();
        body.set_linear_velocity(Vec2::new(3.0, 0.0));
        body.set_angular_velocity(2.0);
        body.set_awake(false);
        assert_eq!(body.linear_velocity(), Vec2::ZERO);
        assert_eq!(body.angular_velocity(), 0.0);
    }

    #[test]
    fn test_impulse_respects_wake_flag() {
        let mut body = dynamic();
        body.set_awake(false);
        body.apply_linear_impulse(Vec2::new(1.0, 0.0), body.world_center(), false);
        assert_eq!(body.linear_velocity(), Vec2::ZERO);
        body.apply_linear_impulse(Vec2::new(1.0, 0.0), body.world_center(), true);
        assert_eq!(body.linear_velocity(), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_point_velocity_includes_rotation() {
        let mut body = dynamic();
        body.set_angular_velocity(1.0);
        let v = body.linear_velocity_from_world_point(Vec2::new(1.0, 0.0));
        assert!((v - Vec2::new(0.0, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_local_world_round_trip() {
        let body = Body::new(
            &BodyDef::new(BodyType::Dynamic)
                .with_position(Vec2::new(3.0, -2.0))
                .with_angle(1.2),
        );
        let p = Vec2::new(0.5, 0.25);
        assert!((body.local_point(body.world_point(p)) - p).length() < 1e-5);
    }
}
