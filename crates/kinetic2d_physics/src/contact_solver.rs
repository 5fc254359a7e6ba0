//! Sequential impulse solver for contact constraints
//!
//! Velocity constraints handle non-penetration with restitution and Coulomb
//! friction; two-point manifolds are solved as a block when the effective
//! mass matrix is well conditioned. Position constraints push overlapping
//! shapes apart with Baumgarte-style correction.

use kinetic2d_math::{Mat22, Rot, Transform2D, Vec2};
use slotmap::SlotMap;

use crate::body::{Body, BodyKey};
use crate::collision::{ManifoldType, WorldManifold};
use crate::contact::{Contact, ContactKey};
use crate::fixture::{Fixture, FixtureKey};
use crate::listener::ContactImpulse;
use crate::settings::{
    BAUMGARTE, LINEAR_SLOP, MAX_LINEAR_CORRECTION, MAX_MANIFOLD_POINTS, TOI_BAUMGARTE,
    VELOCITY_THRESHOLD,
};
use crate::step::{Position, TimeStep, Velocity};

/// Block solving is skipped above this condition number
const MAX_CONDITION_NUMBER: f32 = 1000.0;

#[derive(Clone, Copy, Debug, Default)]
struct VelocityConstraintPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f32,
    tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
}

#[derive(Clone, Copy, Debug, Default)]
struct VelocityConstraint {
    points: [VelocityConstraintPoint; MAX_MANIFOLD_POINTS],
    normal: Vec2,
    normal_mass: Mat22,
    k: Mat22,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_i_a: f32,
    inv_i_b: f32,
    friction: f32,
    restitution: f32,
    tangent_speed: f32,
    point_count: usize,
}

#[derive(Clone, Copy, Debug, Default)]
struct PositionConstraint {
    local_points: [Vec2; MAX_MANIFOLD_POINTS],
    local_normal: Vec2,
    local_point: Vec2,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    local_center_a: Vec2,
    local_center_b: Vec2,
    inv_i_a: f32,
    inv_i_b: f32,
    manifold_type: ManifoldType,
    radius_a: f32,
    radius_b: f32,
    point_count: usize,
}

/// World-space normal, point and separation for one position constraint point
struct PositionSolverManifold {
    normal: Vec2,
    point: Vec2,
    separation: f32,
}

impl PositionSolverManifold {
    fn new(pc: &PositionConstraint, xf_a: &Transform2D, xf_b: &Transform2D, index: usize) -> Self {
        match pc.manifold_type {
            ManifoldType::Circles => {
                let point_a = xf_a.apply(pc.local_point);
                let point_b = xf_b.apply(pc.local_points[0]);
                let normal = (point_b - point_a).normalized();
                Self {
                    normal,
                    point: (point_a + point_b) * 0.5,
                    separation: (point_b - point_a).dot(normal) - pc.radius_a - pc.radius_b,
                }
            }
            ManifoldType::FaceA => {
                let normal = xf_a.q.apply(pc.local_normal);
                let plane_point = xf_a.apply(pc.local_point);
                let clip_point = xf_b.apply(pc.local_points[index]);
                Self {
                    normal,
                    point: clip_point,
                    separation: (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b,
                }
            }
            ManifoldType::FaceB => {
                let normal = xf_b.q.apply(pc.local_normal);
                let plane_point = xf_b.apply(pc.local_point);
                let clip_point = xf_a.apply(pc.local_points[index]);
                Self {
                    // Ensure normal points from A to B
                    normal: -normal,
                    point: clip_point,
                    separation: (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b,
                }
            }
        }
    }
}

/// Transform of a body from its center of mass state
fn center_transform(position: Position, local_center: Vec2) -> Transform2D {
    let q = Rot::from_angle(position.a);
    Transform2D::new(position.c - q.apply(local_center), q)
}

/// Solves the touching contacts of one island
pub(crate) struct ContactSolver {
    contacts: Vec<ContactKey>,
    velocity_constraints: Vec<VelocityConstraint>,
    position_constraints: Vec<PositionConstraint>,
}

impl ContactSolver {
    /// Snapshot the manifolds and mass data of `keys`
    pub fn new(
        step: TimeStep,
        keys: &[ContactKey],
        contacts: &SlotMap<ContactKey, Contact>,
        fixtures: &SlotMap<FixtureKey, Fixture>,
        bodies: &SlotMap<BodyKey, Body>,
    ) -> Self {
        let mut solver = Self {
            contacts: Vec::with_capacity(keys.len()),
            velocity_constraints: Vec::with_capacity(keys.len()),
            position_constraints: Vec::with_capacity(keys.len()),
        };

        for &key in keys {
            let Some(contact) = contacts.get(key) else {
                continue;
            };
            let (Some(fixture_a), Some(fixture_b)) =
                (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b))
            else {
                continue;
            };
            let (Some(body_a), Some(body_b)) =
                (bodies.get(contact.body_a), bodies.get(contact.body_b))
            else {
                continue;
            };
            let manifold = &contact.manifold;
            debug_assert!(manifold.point_count > 0);

            let mut vc = VelocityConstraint {
                friction: contact.friction,
                restitution: contact.restitution,
                tangent_speed: contact.tangent_speed,
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_i_a: body_a.inv_inertia,
                inv_i_b: body_b.inv_inertia,
                point_count: manifold.point_count,
                ..Default::default()
            };

            let mut pc = PositionConstraint {
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                local_center_a: body_a.sweep.local_center,
                local_center_b: body_b.sweep.local_center,
                inv_i_a: body_a.inv_inertia,
                inv_i_b: body_b.inv_inertia,
                local_normal: manifold.local_normal,
                local_point: manifold.local_point,
                point_count: manifold.point_count,
                radius_a: fixture_a.shape.radius(),
                radius_b: fixture_b.shape.radius(),
                manifold_type: manifold.manifold_type,
                ..Default::default()
            };

            for (j, mp) in manifold.points().iter().enumerate() {
                let vcp = &mut vc.points[j];
                if step.warm_starting {
                    vcp.normal_impulse = step.dt_ratio * mp.normal_impulse;
                    vcp.tangent_impulse = step.dt_ratio * mp.tangent_impulse;
                }
                pc.local_points[j] = mp.local_point;
            }

            solver.contacts.push(key);
            solver.velocity_constraints.push(vc);
            solver.position_constraints.push(pc);
        }

        solver
    }

    /// Compute effective masses, restitution bias and the block matrix
    pub fn initialize_velocity_constraints(
        &mut self,
        contacts: &SlotMap<ContactKey, Contact>,
        positions: &[Position],
        velocities: &[Velocity],
    ) {
        for ((vc, pc), key) in self
            .velocity_constraints
            .iter_mut()
            .zip(&self.position_constraints)
            .zip(&self.contacts)
        {
            let Some(contact) = contacts.get(*key) else {
                continue;
            };

            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);

            let c_a = positions[vc.index_a].c;
            let Velocity { v: v_a, w: w_a } = velocities[vc.index_a];
            let c_b = positions[vc.index_b].c;
            let Velocity { v: v_b, w: w_b } = velocities[vc.index_b];

            let xf_a = center_transform(positions[vc.index_a], pc.local_center_a);
            let xf_b = center_transform(positions[vc.index_b], pc.local_center_b);

            let world_manifold =
                WorldManifold::new(&contact.manifold, &xf_a, pc.radius_a, &xf_b, pc.radius_b);

            vc.normal = world_manifold.normal;
            let tangent = vc.normal.cross_scalar(1.0);

            for j in 0..vc.point_count {
                let vcp = &mut vc.points[j];
                vcp.r_a = world_manifold.points[j] - c_a;
                vcp.r_b = world_manifold.points[j] - c_b;

                let rn_a = vcp.r_a.cross(vc.normal);
                let rn_b = vcp.r_b.cross(vc.normal);
                let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                vcp.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = vcp.r_a.cross(tangent);
                let rt_b = vcp.r_b.cross(tangent);
                let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
                vcp.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                // Restitution bias
                vcp.velocity_bias = 0.0;
                let v_rel = vc.normal.dot(
                    v_b + Vec2::scalar_cross(w_b, vcp.r_b) - v_a - Vec2::scalar_cross(w_a, vcp.r_a),
                );
                if v_rel < -VELOCITY_THRESHOLD {
                    vcp.velocity_bias = -vc.restitution * v_rel;
                }
            }

            if vc.point_count == 2 {
                let (vcp1, vcp2) = (vc.points[0], vc.points[1]);
                let rn1_a = vcp1.r_a.cross(vc.normal);
                let rn1_b = vcp1.r_b.cross(vc.normal);
                let rn2_a = vcp2.r_a.cross(vc.normal);
                let rn2_b = vcp2.r_b.cross(vc.normal);

                let k11 = m_a + m_b + i_a * rn1_a * rn1_a + i_b * rn1_b * rn1_b;
                let k22 = m_a + m_b + i_a * rn2_a * rn2_a + i_b * rn2_b * rn2_b;
                let k12 = m_a + m_b + i_a * rn1_a * rn2_a + i_b * rn1_b * rn2_b;

                if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
                    vc.k = Mat22::new(Vec2::new(k11, k12), Vec2::new(k12, k22));
                    vc.normal_mass = vc.k.inverse();
                } else {
                    // Redundant points; solve only one
                    vc.point_count = 1;
                }
            }
        }
    }

    /// Apply the impulses carried over from the previous step
    pub fn warm_start(&self, velocities: &mut [Velocity]) {
        for vc in &self.velocity_constraints {
            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);
            let Velocity { v: mut v_a, w: mut w_a } = velocities[vc.index_a];
            let Velocity { v: mut v_b, w: mut w_b } = velocities[vc.index_b];

            let tangent = vc.normal.cross_scalar(1.0);
            for vcp in &vc.points[..vc.point_count] {
                let p = vc.normal * vcp.normal_impulse + tangent * vcp.tangent_impulse;
                w_a -= i_a * vcp.r_a.cross(p);
                v_a -= p * m_a;
                w_b += i_b * vcp.r_b.cross(p);
                v_b += p * m_b;
            }

            velocities[vc.index_a] = Velocity { v: v_a, w: w_a };
            velocities[vc.index_b] = Velocity { v: v_b, w: w_b };
        }
    }

    pub fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) {
        for vc in &mut self.velocity_constraints {
            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);
            let Velocity { v: mut v_a, w: mut w_a } = velocities[vc.index_a];
            let Velocity { v: mut v_b, w: mut w_b } = velocities[vc.index_b];

            let normal = vc.normal;
            let tangent = normal.cross_scalar(1.0);
            let friction = vc.friction;

            // Friction first; non-penetration matters more
            for vcp in &mut vc.points[..vc.point_count] {
                let dv = v_b + Vec2::scalar_cross(w_b, vcp.r_b)
                    - v_a
                    - Vec2::scalar_cross(w_a, vcp.r_a);

                let vt = dv.dot(tangent) - vc.tangent_speed;
                let lambda = vcp.tangent_mass * -vt;

                let max_friction = friction * vcp.normal_impulse;
                let new_impulse = (vcp.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let lambda = new_impulse - vcp.tangent_impulse;
                vcp.tangent_impulse = new_impulse;

                let p = tangent * lambda;
                v_a -= p * m_a;
                w_a -= i_a * vcp.r_a.cross(p);
                v_b += p * m_b;
                w_b += i_b * vcp.r_b.cross(p);
            }

            if vc.point_count == 1 {
                let vcp = &mut vc.points[0];
                let dv = v_b + Vec2::scalar_cross(w_b, vcp.r_b)
                    - v_a
                    - Vec2::scalar_cross(w_a, vcp.r_a);

                let vn = dv.dot(normal);
                let lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

                let new_impulse = (vcp.normal_impulse + lambda).max(0.0);
                let lambda = new_impulse - vcp.normal_impulse;
                vcp.normal_impulse = new_impulse;

                let p = normal * lambda;
                v_a -= p * m_a;
                w_a -= i_a * vcp.r_a.cross(p);
                v_b += p * m_b;
                w_b += i_b * vcp.r_b.cross(p);
            } else {
                // Block solver: find the accumulated impulse x for both points
                // satisfying the linear complementarity problem
                //   vn = A * x + b, vn >= 0, x >= 0, vn_i * x_i = 0
                // by testing the four active-set cases in order.
                let (cp1, cp2) = (vc.points[0], vc.points[1]);
                let a = Vec2::new(cp1.normal_impulse, cp2.normal_impulse);

                let dv1 = v_b + Vec2::scalar_cross(w_b, cp1.r_b) - v_a - Vec2::scalar_cross(w_a, cp1.r_a);
                let dv2 = v_b + Vec2::scalar_cross(w_b, cp2.r_b) - v_a - Vec2::scalar_cross(w_a, cp2.r_a);

                let vn1 = dv1.dot(normal);
                let vn2 = dv2.dot(normal);

                let b = Vec2::new(vn1 - cp1.velocity_bias, vn2 - cp2.velocity_bias) - vc.k.mul_vec(a);

                let candidates = [
                    // Both points active
                    {
                        let x = -vc.normal_mass.mul_vec(b);
                        (x, x.x >= 0.0 && x.y >= 0.0)
                    },
                    // Only the first point active
                    {
                        let x = Vec2::new(-cp1.normal_mass * b.x, 0.0);
                        let vn2 = vc.k.ex.y * x.x + b.y;
                        (x, x.x >= 0.0 && vn2 >= 0.0)
                    },
                    // Only the second point active
                    {
                        let x = Vec2::new(0.0, -cp2.normal_mass * b.y);
                        let vn1 = vc.k.ey.x * x.y + b.x;
                        (x, x.y >= 0.0 && vn1 >= 0.0)
                    },
                    // Neither point active
                    (Vec2::ZERO, b.x >= 0.0 && b.y >= 0.0),
                ];

                // When no case holds the impulses are left unchanged
                if let Some(&(x, _)) = candidates.iter().find(|(_, ok)| *ok) {
                    let d = x - a;
                    let p1 = normal * d.x;
                    let p2 = normal * d.y;
                    v_a -= (p1 + p2) * m_a;
                    w_a -= i_a * (cp1.r_a.cross(p1) + cp2.r_a.cross(p2));
                    v_b += (p1 + p2) * m_b;
                    w_b += i_b * (cp1.r_b.cross(p1) + cp2.r_b.cross(p2));

                    vc.points[0].normal_impulse = x.x;
                    vc.points[1].normal_impulse = x.y;
                }
            }

            velocities[vc.index_a] = Velocity { v: v_a, w: w_a };
            velocities[vc.index_b] = Velocity { v: v_b, w: w_b };
        }
    }

    /// Save accumulated impulses back into the contact manifolds
    pub fn store_impulses(&self, contacts: &mut SlotMap<ContactKey, Contact>) {
        for (vc, key) in self.velocity_constraints.iter().zip(&self.contacts) {
            let Some(contact) = contacts.get_mut(*key) else {
                continue;
            };
            for j in 0..vc.point_count {
                contact.manifold.points[j].normal_impulse = vc.points[j].normal_impulse;
                contact.manifold.points[j].tangent_impulse = vc.points[j].tangent_impulse;
            }
        }
    }

    /// One pass of position correction; true once overlap is within tolerance
    pub fn solve_position_constraints(&self, positions: &mut [Position]) -> bool {
        let mut min_separation: f32 = 0.0;

        for pc in &self.position_constraints {
            let (m_a, i_a, m_b, i_b) = (pc.inv_mass_a, pc.inv_i_a, pc.inv_mass_b, pc.inv_i_b);
            min_separation = min_separation.min(Self::correct(
                pc,
                positions,
                (m_a, i_a),
                (m_b, i_b),
                BAUMGARTE,
            ));
        }

        // Overlap is allowed up to three slops
        min_separation >= -3.0 * LINEAR_SLOP
    }

    /// Position correction for a time-of-impact sub-step
    ///
    /// Only the two bodies of the impact move; every other body is treated as
    /// having infinite mass.
    pub fn solve_toi_position_constraints(
        &self,
        positions: &mut [Position],
        toi_index_a: usize,
        toi_index_b: usize,
    ) -> bool {
        let mut min_separation: f32 = 0.0;

        for pc in &self.position_constraints {
            let moving = |index: usize| index == toi_index_a || index == toi_index_b;
            let (m_a, i_a) = if moving(pc.index_a) {
                (pc.inv_mass_a, pc.inv_i_a)
            } else {
                (0.0, 0.0)
            };
            let (m_b, i_b) = if moving(pc.index_b) {
                (pc.inv_mass_b, pc.inv_i_b)
            } else {
                (0.0, 0.0)
            };
            min_separation =
                min_separation.min(Self::correct(pc, positions, (m_a, i_a), (m_b, i_b), TOI_BAUMGARTE));
        }

        min_separation >= -1.5 * LINEAR_SLOP
    }

    /// Push one constraint's bodies apart, returning its deepest separation
    fn correct(
        pc: &PositionConstraint,
        positions: &mut [Position],
        (m_a, i_a): (f32, f32),
        (m_b, i_b): (f32, f32),
        baumgarte: f32,
    ) -> f32 {
        let mut min_separation = f32::MAX;
        let mut pos_a = positions[pc.index_a];
        let mut pos_b = positions[pc.index_b];

        for j in 0..pc.point_count {
            let xf_a = center_transform(pos_a, pc.local_center_a);
            let xf_b = center_transform(pos_b, pc.local_center_b);

            let psm = PositionSolverManifold::new(pc, &xf_a, &xf_b, j);
            let r_a = psm.point - pos_a.c;
            let r_b = psm.point - pos_b.c;

            min_separation = min_separation.min(psm.separation);

            // Prevent large corrections and allow slop
            let c = (baumgarte * (psm.separation + LINEAR_SLOP)).clamp(-MAX_LINEAR_CORRECTION, 0.0);

            let rn_a = r_a.cross(psm.normal);
            let rn_b = r_b.cross(psm.normal);
            let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
            let impulse = if k > 0.0 { -c / k } else { 0.0 };

            let p = psm.normal * impulse;
            pos_a.c -= p * m_a;
            pos_a.a -= i_a * r_a.cross(p);
            pos_b.c += p * m_b;
            pos_b.a += i_b * r_b.cross(p);
        }

        positions[pc.index_a] = pos_a;
        positions[pc.index_b] = pos_b;
        min_separation
    }

    /// Impulses applied to each solved contact, in island order
    pub fn impulses(&self) -> impl Iterator<Item = (ContactKey, ContactImpulse)> + '_ {
        self.velocity_constraints
            .iter()
            .zip(&self.contacts)
            .map(|(vc, &key)| {
                let mut impulse = ContactImpulse {
                    count: vc.point_count,
                    ..Default::default()
                };
                for j in 0..vc.point_count {
                    impulse.normal_impulses[j] = vc.points[j].normal_impulse;
                    impulse.tangent_impulses[j] = vc.points[j].tangent_impulse;
                }
                (key, impulse)
            })
    }
}
