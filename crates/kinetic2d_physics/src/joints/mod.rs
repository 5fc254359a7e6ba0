//! Joints constrain the relative motion of two bodies
//!
//! Every joint follows the same three-phase protocol inside an island:
//! `init_velocity_constraints` once per step, `solve_velocity_constraints`
//! once per velocity iteration, and `solve_position_constraints` once per
//! position iteration until it reports the error is within tolerance.

mod distance;
mod mouse;
mod revolute;
mod rope;
mod weld;

pub use distance::{DistanceJoint, DistanceJointDef};
pub use mouse::{MouseJoint, MouseJointDef};
pub use revolute::{LimitState, RevoluteJoint, RevoluteJointDef};
pub use rope::{RopeJoint, RopeJointDef};
pub use weld::{WeldJoint, WeldJointDef};

use kinetic2d_math::{Mat33, Vec2, Vec3};
use slotmap::{new_key_type, SlotMap};

use crate::body::{Body, BodyKey};
use crate::step::SolverData;

new_key_type! {
    /// Key to a joint in the physics world
    pub struct JointKey;
}

/// Mass data of one joined body, cached at the start of a solve
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct SolverBody {
    pub index: usize,
    pub local_center: Vec2,
    pub inv_mass: f32,
    pub inv_i: f32,
}

impl SolverBody {
    fn from_body(body: &Body) -> Self {
        Self {
            index: body.island_index,
            local_center: body.sweep.local_center,
            inv_mass: body.inv_mass,
            inv_i: body.inv_inertia,
        }
    }
}

/// The phases every joint type implements
pub(crate) trait JointConstraint {
    fn init_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData);

    fn solve_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData);

    /// True when the position error is within tolerance
    fn solve_position_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData) -> bool;

    /// Reaction force on body B at the anchor
    fn reaction_force(&self, inv_dt: f32) -> Vec2;

    /// Reaction torque on body B
    fn reaction_torque(&self, inv_dt: f32) -> f32;
}

/// Definition of any joint type
#[derive(Clone, Debug, PartialEq)]
pub enum JointDef {
    Distance(DistanceJointDef),
    Revolute(RevoluteJointDef),
    Rope(RopeJointDef),
    Weld(WeldJointDef),
    Mouse(MouseJointDef),
}

impl JointDef {
    pub fn bodies(&self) -> (BodyKey, BodyKey) {
        match self {
            JointDef::Distance(def) => (def.body_a, def.body_b),
            JointDef::Revolute(def) => (def.body_a, def.body_b),
            JointDef::Rope(def) => (def.body_a, def.body_b),
            JointDef::Weld(def) => (def.body_a, def.body_b),
            JointDef::Mouse(def) => (def.body_a, def.body_b),
        }
    }

    pub fn collide_connected(&self) -> bool {
        match self {
            JointDef::Distance(def) => def.collide_connected,
            JointDef::Revolute(def) => def.collide_connected,
            JointDef::Rope(def) => def.collide_connected,
            JointDef::Weld(def) => def.collide_connected,
            JointDef::Mouse(def) => def.collide_connected,
        }
    }
}

impl From<DistanceJointDef> for JointDef {
    fn from(def: DistanceJointDef) -> Self {
        JointDef::Distance(def)
    }
}

impl From<RevoluteJointDef> for JointDef {
    fn from(def: RevoluteJointDef) -> Self {
        JointDef::Revolute(def)
    }
}

impl From<RopeJointDef> for JointDef {
    fn from(def: RopeJointDef) -> Self {
        JointDef::Rope(def)
    }
}

impl From<WeldJointDef> for JointDef {
    fn from(def: WeldJointDef) -> Self {
        JointDef::Weld(def)
    }
}

impl From<MouseJointDef> for JointDef {
    fn from(def: MouseJointDef) -> Self {
        JointDef::Mouse(def)
    }
}

/// The type-specific part of a joint
#[derive(Clone, Debug, PartialEq)]
pub enum JointKind {
    Distance(DistanceJoint),
    Revolute(RevoluteJoint),
    Rope(RopeJoint),
    Weld(WeldJoint),
    Mouse(MouseJoint),
}

/// A joint between two bodies
#[derive(Clone, Debug, PartialEq)]
pub struct Joint {
    pub(crate) body_a: BodyKey,
    pub(crate) body_b: BodyKey,
    pub(crate) collide_connected: bool,
    pub(crate) island: bool,
    solver_a: SolverBody,
    solver_b: SolverBody,
    kind: JointKind,
}

impl Joint {
    pub(crate) fn new(def: &JointDef) -> Self {
        let (body_a, body_b) = def.bodies();
        let kind = match def {
            JointDef::Distance(def) => JointKind::Distance(DistanceJoint::new(def)),
            JointDef::Revolute(def) => JointKind::Revolute(RevoluteJoint::new(def)),
            JointDef::Rope(def) => JointKind::Rope(RopeJoint::new(def)),
            JointDef::Weld(def) => JointKind::Weld(WeldJoint::new(def)),
            JointDef::Mouse(def) => JointKind::Mouse(MouseJoint::new(def)),
        };
        Self {
            body_a,
            body_b,
            collide_connected: def.collide_connected(),
            island: false,
            solver_a: SolverBody::default(),
            solver_b: SolverBody::default(),
            kind,
        }
    }

    pub fn body_a(&self) -> BodyKey {
        self.body_a
    }

    pub fn body_b(&self) -> BodyKey {
        self.body_b
    }

    /// Whether the joined bodies may still collide with each other
    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut JointKind {
        &mut self.kind
    }

    /// World anchor on body A
    pub fn anchor_a(&self, bodies: &SlotMap<BodyKey, Body>) -> Option<Vec2> {
        let body = bodies.get(self.body_a)?;
        Some(match &self.kind {
            JointKind::Distance(j) => body.world_point(j.local_anchor_a),
            JointKind::Revolute(j) => body.world_point(j.local_anchor_a),
            JointKind::Rope(j) => body.world_point(j.local_anchor_a),
            JointKind::Weld(j) => body.world_point(j.local_anchor_a),
            JointKind::Mouse(j) => j.target(),
        })
    }

    /// World anchor on body B
    pub fn anchor_b(&self, bodies: &SlotMap<BodyKey, Body>) -> Option<Vec2> {
        let body = bodies.get(self.body_b)?;
        let local_anchor = match &self.kind {
            JointKind::Distance(j) => j.local_anchor_b,
            JointKind::Revolute(j) => j.local_anchor_b,
            JointKind::Rope(j) => j.local_anchor_b,
            JointKind::Weld(j) => j.local_anchor_b,
            JointKind::Mouse(j) => j.local_anchor_b,
        };
        Some(body.world_point(local_anchor))
    }

    fn constraint(&self) -> &dyn JointConstraint {
        match &self.kind {
            JointKind::Distance(j) => j,
            JointKind::Revolute(j) => j,
            JointKind::Rope(j) => j,
            JointKind::Weld(j) => j,
            JointKind::Mouse(j) => j,
        }
    }

    fn constraint_mut(&mut self) -> &mut dyn JointConstraint {
        match &mut self.kind {
            JointKind::Distance(j) => j,
            JointKind::Revolute(j) => j,
            JointKind::Rope(j) => j,
            JointKind::Weld(j) => j,
            JointKind::Mouse(j) => j,
        }
    }

    pub fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        self.constraint().reaction_force(inv_dt)
    }

    pub fn reaction_torque(&self, inv_dt: f32) -> f32 {
        self.constraint().reaction_torque(inv_dt)
    }

    pub(crate) fn init_velocity_constraints(
        &mut self,
        data: &mut SolverData,
        bodies: &SlotMap<BodyKey, Body>,
    ) {
        if let (Some(a), Some(b)) = (bodies.get(self.body_a), bodies.get(self.body_b)) {
            self.solver_a = SolverBody::from_body(a);
            self.solver_b = SolverBody::from_body(b);
        }
        let (a, b) = (self.solver_a, self.solver_b);
        self.constraint_mut().init_velocity_constraints(&a, &b, data);
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData) {
        let (a, b) = (self.solver_a, self.solver_b);
        self.constraint_mut().solve_velocity_constraints(&a, &b, data);
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData) -> bool {
        let (a, b) = (self.solver_a, self.solver_b);
        self.constraint_mut().solve_position_constraints(&a, &b, data)
    }
}

/// Effective mass of a point-to-point constraint plus relative rotation
///
/// Shared by joints that lock both the anchor point and the angle.
pub(crate) fn point_angle_mass(a: &SolverBody, b: &SolverBody, r_a: Vec2, r_b: Vec2) -> Mat33 {
    let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);
    let ex_x = m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b;
    let ey_x = -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b;
    let ez_x = -r_a.y * i_a - r_b.y * i_b;
    let ey_y = m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b;
    let ez_y = r_a.x * i_a + r_b.x * i_b;
    let ez_z = i_a + i_b;
    Mat33 {
        ex: Vec3::new(ex_x, ey_x, ez_x),
        ey: Vec3::new(ey_x, ey_y, ez_y),
        ez: Vec3::new(ez_x, ez_y, ez_z),
    }
}

/// Spring coefficients `(gamma, bias_factor)` for a soft constraint
///
/// `mass` is the effective mass of the constraint; a zero frequency yields a
/// rigid constraint.
pub(crate) fn soft_constraint(mass: f32, frequency_hz: f32, damping_ratio: f32, dt: f32) -> (f32, f32) {
    let omega = 2.0 * std::f32::consts::PI * frequency_hz;
    let d = 2.0 * mass * damping_ratio * omega;
    let k = mass * omega * omega;
    let gamma = dt * (d + dt * k);
    let gamma = if gamma != 0.0 { 1.0 / gamma } else { 0.0 };
    (gamma, dt * k * gamma)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyDef, BodyType};

    #[test]
    fn test_def_reports_bodies() {
        let mut bodies: SlotMap<BodyKey, Body> = SlotMap::with_key();
        let a = bodies.insert(Body::new(&BodyDef::default()));
        let b = bodies.insert(Body::new(&BodyDef::new(BodyType::Dynamic)));
        let def: JointDef = RopeJointDef::new(a, b).with_max_length(2.0).into();
        assert_eq!(def.bodies(), (a, b));
        assert!(!def.collide_connected());

        let joint = Joint::new(&def);
        assert_eq!(joint.anchor_a(&bodies), Some(Vec2::ZERO));
        assert!(matches!(joint.kind(), JointKind::Rope(_)));
    }

    #[test]
    fn test_point_angle_mass_is_symmetric() {
        let a = SolverBody { inv_mass: 1.0, inv_i: 2.0, ..Default::default() };
        let b = SolverBody { inv_mass: 0.5, inv_i: 1.0, ..Default::default() };
        let k = point_angle_mass(&a, &b, Vec2::new(0.5, 1.0), Vec2::new(-1.0, 0.25));
        assert_eq!(k.ey.x, k.ex.y);
        assert_eq!(k.ez.x, k.ex.z);
        assert_eq!(k.ez.y, k.ey.z);
        assert_eq!(k.ez.z, 3.0);
    }

    #[test]
    fn test_zero_frequency_is_rigid() {
        assert_eq!(soft_constraint(2.0, 0.0, 0.5, 1.0 / 60.0), (0.0, 0.0));
        let (gamma, bias) = soft_constraint(2.0, 4.0, 0.5, 1.0 / 60.0);
        assert!(gamma > 0.0);
        assert!(bias > 0.0);
    }
}
