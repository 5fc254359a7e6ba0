//! Physics world and simulation
//!
//! The world owns every body, fixture, joint and contact in arenas keyed by
//! generational handles. A call to [`World::step`] runs the whole pipeline:
//! narrow phase, particles, island solve, then continuous collision. The
//! world is locked for the duration, and every structural mutator fails with
//! [`PhysicsError::Locked`] while it is.

use bitflags::bitflags;
use kinetic2d_math::{Rot, Transform2D, Vec2};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::body::{Body, BodyDef, BodyFlags, BodyKey, BodyType, JointEdge};
use crate::collision::{
    time_of_impact, Aabb, BroadPhase, DistanceProxy, RayCastInput, ToiInput, ToiState,
    WorldManifold,
};
use crate::contact::{Contact, ContactFlags, ContactKey};
use crate::contact_manager::ContactManager;
use crate::error::{PhysicsError, PhysicsResult};
use crate::filter::Filter;
use crate::fixture::{Fixture, FixtureDef, FixtureKey, ProxyRef};
use crate::island::{Island, IslandContext};
use crate::joints::{Joint, JointDef, JointKey, JointKind};
use crate::listener::{ContactListener, NoopListener};
use crate::particle::{
    ParticleContext, ParticleDef, ParticleGroupDef, ParticleGroupKey, ParticleSystem,
    ParticleSystemDef,
};
use crate::settings::{MAX_SUB_STEPS, MAX_TOI_CONTACTS};
use crate::shapes::Shape;
use crate::step::{StepStats, TimeStep};

/// Position iterations used by each time-of-impact sub-step
const TOI_POSITION_ITERATIONS: usize = 20;

/// Configuration for the physics simulation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity acceleration in m/s²
    pub gravity: Vec2,
    /// Let still islands fall asleep
    pub allow_sleep: bool,
    /// Start each solve from the previous step's impulses
    pub warm_starting: bool,
    /// Run the time-of-impact pass after the discrete solve
    pub continuous_physics: bool,
    /// Resolve one time-of-impact event per step, for debugging
    pub sub_stepping: bool,
    /// Parameters of the world's particle system
    pub particles: ParticleSystemDef,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -10.0),
            allow_sleep: true,
            warm_starting: true,
            continuous_physics: true,
            sub_stepping: false,
            particles: ParticleSystemDef::default(),
        }
    }
}

impl PhysicsConfig {
    /// Create a new physics config with the given gravity
    pub fn new(gravity: Vec2) -> Self {
        Self {
            gravity,
            ..Default::default()
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    struct WorldFlags: u8 {
        /// A fixture or proxy was added; look for new pairs before the next collide
        const NEW_FIXTURE = 1 << 0;
        /// A step is in progress
        const LOCKED = 1 << 1;
        /// Zero forces and torques after every step
        const CLEAR_FORCES = 1 << 2;
    }
}

/// Holds contacts destroyed while touching outside a step
///
/// Their `end_contact` is reported to the next step's listener.
struct DeferredEnds<'a>(&'a mut Vec<Contact>);

impl ContactListener for DeferredEnds<'_> {
    fn end_contact(&mut self, contact: &Contact) {
        self.0.push(contact.clone());
    }
}

/// Move every proxy of `body` to cover its sweep for this step
fn synchronize_fixtures(
    body: &Body,
    fixtures: &mut SlotMap<FixtureKey, Fixture>,
    broad_phase: &mut BroadPhase<ProxyRef>,
) {
    let xf1 = body.sweep_start_transform();
    for key in &body.fixtures {
        if let Some(fixture) = fixtures.get_mut(*key) {
            fixture.synchronize(broad_phase, &xf1, &body.xf);
        }
    }
}

/// Recompute mass, inertia and center of mass from the attached fixtures
fn reset_mass_data(body: &mut Body, fixtures: &SlotMap<FixtureKey, Fixture>) {
    body.mass = 0.0;
    body.inv_mass = 0.0;
    body.inertia = 0.0;
    body.inv_inertia = 0.0;
    body.sweep.local_center = Vec2::ZERO;

    if body.body_type != BodyType::Dynamic {
        body.sweep.c0 = body.xf.p;
        body.sweep.c = body.xf.p;
        body.sweep.a0 = body.sweep.a;
        return;
    }

    let mut local_center = Vec2::ZERO;
    let mut inertia = 0.0;
    for key in &body.fixtures {
        let Some(fixture) = fixtures.get(*key) else {
            continue;
        };
        if fixture.density() == 0.0 {
            continue;
        }
        let mass_data = fixture.mass_data();
        body.mass += mass_data.mass;
        local_center += mass_data.center * mass_data.mass;
        inertia += mass_data.inertia;
    }

    if body.mass > 0.0 {
        body.inv_mass = 1.0 / body.mass;
        local_center = local_center * body.inv_mass;
    } else {
        // Dynamic bodies always have mass
        body.mass = 1.0;
        body.inv_mass = 1.0;
    }

    if inertia > 0.0 && !body.is_fixed_rotation() {
        // Shift to the center of mass
        body.inertia = inertia - body.mass * local_center.dot(local_center);
        body.inv_inertia = if body.inertia > 0.0 { 1.0 / body.inertia } else { 0.0 };
    }

    let old_center = body.sweep.c;
    body.sweep.local_center = local_center;
    body.sweep.c = body.xf.apply(local_center);
    body.sweep.c0 = body.sweep.c;

    body.linear_velocity += Vec2::scalar_cross(body.angular_velocity, body.sweep.c - old_center);
}

/// The physics world containing all bodies, joints and particles
#[derive(Debug)]
pub struct World {
    bodies: SlotMap<BodyKey, Body>,
    fixtures: SlotMap<FixtureKey, Fixture>,
    joints: SlotMap<JointKey, Joint>,
    contact_manager: ContactManager,
    particles: ParticleSystem,
    config: PhysicsConfig,
    flags: WorldFlags,

    // Scratch reused across steps
    island: Island,
    stack: Vec<BodyKey>,
    seeds: Vec<BodyKey>,

    /// Touching contacts destroyed since the last step
    ended_contacts: Vec<Contact>,

    inv_dt0: f32,
    step_complete: bool,
    stats: StepStats,
}

impl Default for World {
    fn default() -> Self {
        Self::new(PhysicsConfig::default())
    }
}

impl World {
    /// Create an empty world
    pub fn new(config: PhysicsConfig) -> Self {
        log::debug!(
            "Created physics world with gravity ({}, {})",
            config.gravity.x,
            config.gravity.y
        );
        Self {
            bodies: SlotMap::with_key(),
            fixtures: SlotMap::with_key(),
            joints: SlotMap::with_key(),
            contact_manager: ContactManager::new(),
            particles: ParticleSystem::new(config.particles.clone()),
            config,
            flags: WorldFlags::CLEAR_FORCES,
            island: Island::default(),
            stack: Vec::new(),
            seeds: Vec::new(),
            ended_contacts: Vec::new(),
            inv_dt0: 0.0,
            step_complete: true,
            stats: StepStats::default(),
        }
    }

    fn check_unlocked(&self, operation: &'static str) -> PhysicsResult<()> {
        if self.is_locked() {
            return Err(PhysicsError::Locked { operation });
        }
        Ok(())
    }

    /// True while a step is in progress
    pub fn is_locked(&self) -> bool {
        self.flags.contains(WorldFlags::LOCKED)
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn gravity(&self) -> Vec2 {
        self.config.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.config.gravity = gravity;
    }

    pub fn is_sleeping_allowed(&self) -> bool {
        self.config.allow_sleep
    }

    /// Disallowing sleep wakes every body
    pub fn set_allow_sleep(&mut self, flag: bool) {
        if flag == self.config.allow_sleep {
            return;
        }
        self.config.allow_sleep = flag;
        if !flag {
            for body in self.bodies.values_mut() {
                body.set_awake(true);
            }
        }
    }

    pub fn set_warm_starting(&mut self, flag: bool) {
        self.config.warm_starting = flag;
    }

    pub fn set_continuous_physics(&mut self, flag: bool) {
        self.config.continuous_physics = flag;
    }

    pub fn set_sub_stepping(&mut self, flag: bool) {
        self.config.sub_stepping = flag;
    }

    pub fn auto_clear_forces(&self) -> bool {
        self.flags.contains(WorldFlags::CLEAR_FORCES)
    }

    /// Whether forces are zeroed after every step; on by default
    pub fn set_auto_clear_forces(&mut self, flag: bool) {
        self.flags.set(WorldFlags::CLEAR_FORCES, flag);
    }

    /// Zero the accumulated force and torque on every body
    pub fn clear_forces(&mut self) {
        for body in self.bodies.values_mut() {
            body.force = Vec2::ZERO;
            body.torque = 0.0;
        }
    }

    // ------------------------------------------------------------------
    // Bodies
    // ------------------------------------------------------------------

    /// Add a body; it has no fixtures until [`World::create_fixture`]
    pub fn create_body(&mut self, def: &BodyDef) -> PhysicsResult<BodyKey> {
        self.check_unlocked("create a body")?;
        Ok(self.bodies.insert(Body::new(def)))
    }

    /// Remove a body with its fixtures, joints and contacts
    pub fn destroy_body(&mut self, key: BodyKey) -> PhysicsResult<()> {
        self.check_unlocked("destroy a body")?;
        let body = self.bodies.get(key).ok_or(PhysicsError::UnknownBody)?;

        let joints: Vec<JointKey> = body.joint_edges.iter().map(|edge| edge.joint).collect();
        let contacts: Vec<ContactKey> = body.contact_edges.iter().map(|edge| edge.contact).collect();

        for joint in joints {
            self.remove_joint(joint);
        }
        for contact in contacts {
            self.contact_manager
                .destroy(contact, &mut self.bodies, &mut DeferredEnds(&mut self.ended_contacts));
        }

        let Some(body) = self.bodies.remove(key) else {
            return Err(PhysicsError::UnknownBody);
        };
        for fixture_key in &body.fixtures {
            if let Some(mut fixture) = self.fixtures.remove(*fixture_key) {
                fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
            }
        }

        log::debug!("Destroyed body with {} fixtures", body.fixtures.len());
        Ok(())
    }

    pub fn body(&self, key: BodyKey) -> Option<&Body> {
        self.bodies.get(key)
    }

    /// Mutable access for forces, impulses, velocities and flags that do not
    /// touch the broad phase
    pub fn body_mut(&mut self, key: BodyKey) -> Option<&mut Body> {
        self.bodies.get_mut(key)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyKey, &Body)> {
        self.bodies.iter()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Teleport a body; proxies follow immediately, contacts update next step
    pub fn set_transform(&mut self, key: BodyKey, position: Vec2, angle: f32) -> PhysicsResult<()> {
        self.check_unlocked("set a transform")?;
        let body = self.bodies.get_mut(key).ok_or(PhysicsError::UnknownBody)?;

        body.xf = Transform2D::new(position, Rot::from_angle(angle));
        body.xf0 = body.xf;
        body.sweep.c = body.xf.apply(body.sweep.local_center);
        body.sweep.a = angle;
        body.sweep.c0 = body.sweep.c;
        body.sweep.a0 = angle;
        body.set_awake(true);

        let xf = body.xf;
        for fixture_key in &body.fixtures {
            if let Some(fixture) = self.fixtures.get_mut(*fixture_key) {
                fixture.synchronize(&mut self.contact_manager.broad_phase, &xf, &xf);
            }
        }
        self.flags.insert(WorldFlags::NEW_FIXTURE);
        Ok(())
    }

    /// Change the body type, dropping its contacts and recomputing mass
    pub fn set_body_type(&mut self, key: BodyKey, body_type: BodyType) -> PhysicsResult<()> {
        self.check_unlocked("change a body type")?;
        let body = self.bodies.get_mut(key).ok_or(PhysicsError::UnknownBody)?;
        if body.body_type == body_type {
            return Ok(());
        }

        body.body_type = body_type;
        reset_mass_data(body, &self.fixtures);

        if body_type == BodyType::Static {
            body.linear_velocity = Vec2::ZERO;
            body.angular_velocity = 0.0;
            body.sweep.a0 = body.sweep.a;
            body.sweep.c0 = body.sweep.c;
            synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);
        }

        body.set_awake(true);
        body.force = Vec2::ZERO;
        body.torque = 0.0;

        self.destroy_contacts_of(key);

        // Pairs with other bodies are re-created on the next step
        if let Some(body) = self.bodies.get(key) {
            for fixture_key in &body.fixtures {
                if let Some(fixture) = self.fixtures.get(*fixture_key) {
                    fixture.touch_proxies(&mut self.contact_manager.broad_phase);
                }
            }
        }
        self.flags.insert(WorldFlags::NEW_FIXTURE);
        Ok(())
    }

    /// Inactive bodies keep their fixtures but have no proxies or contacts
    pub fn set_active(&mut self, key: BodyKey, active: bool) -> PhysicsResult<()> {
        self.check_unlocked("change body activity")?;
        let body = self.bodies.get_mut(key).ok_or(PhysicsError::UnknownBody)?;
        if body.is_active() == active {
            return Ok(());
        }
        body.flags.set(BodyFlags::ACTIVE, active);

        let xf = body.xf;
        for fixture_key in &body.fixtures {
            if let Some(fixture) = self.fixtures.get_mut(*fixture_key) {
                if active {
                    fixture.create_proxies(&mut self.contact_manager.broad_phase, &xf, *fixture_key);
                } else {
                    fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
                }
            }
        }

        if active {
            self.flags.insert(WorldFlags::NEW_FIXTURE);
        } else {
            self.destroy_contacts_of(key);
        }
        Ok(())
    }

    pub fn set_fixed_rotation(&mut self, key: BodyKey, fixed: bool) -> PhysicsResult<()> {
        let body = self.bodies.get_mut(key).ok_or(PhysicsError::UnknownBody)?;
        if body.is_fixed_rotation() == fixed {
            return Ok(());
        }
        body.flags.set(BodyFlags::FIXED_ROTATION, fixed);
        body.angular_velocity = 0.0;
        reset_mass_data(body, &self.fixtures);
        Ok(())
    }

    /// Recompute a body's mass from its fixtures' densities
    ///
    /// Static and kinematic bodies always end up massless with the center of
    /// mass at their origin.
    pub fn reset_mass_data(&mut self, key: BodyKey) -> PhysicsResult<()> {
        let body = self.bodies.get_mut(key).ok_or(PhysicsError::UnknownBody)?;
        reset_mass_data(body, &self.fixtures);
        Ok(())
    }

    fn destroy_contacts_of(&mut self, key: BodyKey) {
        let Some(body) = self.bodies.get(key) else {
            return;
        };
        let contacts: Vec<ContactKey> = body.contact_edges.iter().map(|edge| edge.contact).collect();
        for contact in contacts {
            self.contact_manager
                .destroy(contact, &mut self.bodies, &mut DeferredEnds(&mut self.ended_contacts));
        }
    }

    // ------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------

    /// Attach a shape to a body
    ///
    /// A fixture with positive density updates the body's mass. Contacts for
    /// the new fixture appear on the next step.
    pub fn create_fixture(&mut self, body_key: BodyKey, def: &FixtureDef) -> PhysicsResult<FixtureKey> {
        self.check_unlocked("create a fixture")?;
        let body = self.bodies.get_mut(body_key).ok_or(PhysicsError::UnknownBody)?;

        let key = self.fixtures.insert(Fixture::new(body_key, def));
        if body.is_active() {
            if let Some(fixture) = self.fixtures.get_mut(key) {
                fixture.create_proxies(&mut self.contact_manager.broad_phase, &body.xf, key);
            }
        }
        body.fixtures.push(key);

        if def.material.density > 0.0 {
            reset_mass_data(body, &self.fixtures);
        }

        self.flags.insert(WorldFlags::NEW_FIXTURE);
        Ok(key)
    }

    /// Detach and drop a fixture, along with its contacts
    pub fn destroy_fixture(&mut self, key: FixtureKey) -> PhysicsResult<()> {
        self.check_unlocked("destroy a fixture")?;
        let body_key = self.fixtures.get(key).ok_or(PhysicsError::UnknownFixture)?.body;

        if let Some(body) = self.bodies.get(body_key) {
            let contacts: Vec<ContactKey> = body
                .contact_edges
                .iter()
                .filter(|edge| {
                    self.contact_manager
                        .contacts
                        .get(edge.contact)
                        .is_some_and(|c| c.fixture_a == key || c.fixture_b == key)
                })
                .map(|edge| edge.contact)
                .collect();
            for contact in contacts {
                self.contact_manager
                    .destroy(contact, &mut self.bodies, &mut DeferredEnds(&mut self.ended_contacts));
            }
        }

        if let Some(mut fixture) = self.fixtures.remove(key) {
            fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
        }
        if let Some(body) = self.bodies.get_mut(body_key) {
            body.fixtures.retain(|k| *k != key);
            reset_mass_data(body, &self.fixtures);
        }
        Ok(())
    }

    pub fn fixture(&self, key: FixtureKey) -> Option<&Fixture> {
        self.fixtures.get(key)
    }

    /// Mutable access for friction, restitution and user data
    pub fn fixture_mut(&mut self, key: FixtureKey) -> Option<&mut Fixture> {
        self.fixtures.get_mut(key)
    }

    pub fn fixtures(&self) -> impl Iterator<Item = (FixtureKey, &Fixture)> {
        self.fixtures.iter()
    }

    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    /// Replace a fixture's filter and re-evaluate its contacts
    pub fn set_filter(&mut self, key: FixtureKey, filter: Filter) -> PhysicsResult<()> {
        let fixture = self.fixtures.get_mut(key).ok_or(PhysicsError::UnknownFixture)?;
        fixture.filter = filter;
        self.refilter(key)
    }

    /// Flag a fixture's contacts for filtering and re-examine its proxies
    pub fn refilter(&mut self, key: FixtureKey) -> PhysicsResult<()> {
        let fixture = self.fixtures.get(key).ok_or(PhysicsError::UnknownFixture)?;
        if let Some(body) = self.bodies.get(fixture.body) {
            for edge in &body.contact_edges {
                if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) {
                    if contact.fixture_a == key || contact.fixture_b == key {
                        contact.flag_for_filtering();
                    }
                }
            }
        }
        fixture.touch_proxies(&mut self.contact_manager.broad_phase);
        self.flags.insert(WorldFlags::NEW_FIXTURE);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Joints
    // ------------------------------------------------------------------

    /// Connect two bodies
    pub fn create_joint(&mut self, def: impl Into<JointDef>) -> PhysicsResult<JointKey> {
        self.check_unlocked("create a joint")?;
        let def = def.into();
        let (body_a, body_b) = def.bodies();
        if !self.bodies.contains_key(body_a) || !self.bodies.contains_key(body_b) {
            return Err(PhysicsError::UnknownBody);
        }
        if body_a == body_b {
            return Err(PhysicsError::InvalidArgument(
                "a joint needs two different bodies".to_string(),
            ));
        }

        let mut joint = Joint::new(&def);
        if let (JointKind::Mouse(mouse), Some(body)) = (joint.kind_mut(), self.bodies.get(body_b)) {
            mouse.attach(body);
        }
        let collide_connected = joint.collide_connected;
        let key = self.joints.insert(joint);

        if let Some(body) = self.bodies.get_mut(body_a) {
            body.joint_edges.push(JointEdge { other: body_b, joint: key });
        }
        if let Some(body) = self.bodies.get_mut(body_b) {
            body.joint_edges.push(JointEdge { other: body_a, joint: key });
        }

        if !collide_connected {
            self.flag_contacts_between(body_a, body_b);
        }
        Ok(key)
    }

    /// Remove a joint and wake both bodies
    pub fn destroy_joint(&mut self, key: JointKey) -> PhysicsResult<()> {
        self.check_unlocked("destroy a joint")?;
        if !self.joints.contains_key(key) {
            return Err(PhysicsError::UnknownJoint);
        }
        self.remove_joint(key);
        Ok(())
    }

    fn remove_joint(&mut self, key: JointKey) {
        let Some(joint) = self.joints.remove(key) else {
            return;
        };
        for body_key in [joint.body_a, joint.body_b] {
            if let Some(body) = self.bodies.get_mut(body_key) {
                body.joint_edges.retain(|edge| edge.joint != key);
                body.set_awake(true);
            }
        }
        // The bodies may collide again
        if !joint.collide_connected {
            self.flag_contacts_between(joint.body_a, joint.body_b);
        }
        log::debug!("Destroyed joint");
    }

    fn flag_contacts_between(&mut self, body_a: BodyKey, body_b: BodyKey) {
        let Some(body) = self.bodies.get(body_b) else {
            return;
        };
        for edge in body.contact_edges.iter().filter(|edge| edge.other == body_a) {
            if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) {
                contact.flag_for_filtering();
            }
        }
    }

    pub fn joint(&self, key: JointKey) -> Option<&Joint> {
        self.joints.get(key)
    }

    /// Mutable access to motor, limit and spring settings
    pub fn joint_mut(&mut self, key: JointKey) -> Option<&mut Joint> {
        self.joints.get_mut(key)
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointKey, &Joint)> {
        self.joints.iter()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// World anchors on body A and body B
    pub fn joint_anchors(&self, key: JointKey) -> Option<(Vec2, Vec2)> {
        let joint = self.joints.get(key)?;
        Some((joint.anchor_a(&self.bodies)?, joint.anchor_b(&self.bodies)?))
    }

    /// Move the target of a mouse joint, waking the dragged body
    pub fn set_mouse_target(&mut self, key: JointKey, target: Vec2) -> PhysicsResult<()> {
        let joint = self.joints.get_mut(key).ok_or(PhysicsError::UnknownJoint)?;
        let body_b = joint.body_b;
        let JointKind::Mouse(mouse) = joint.kind_mut() else {
            return Err(PhysicsError::InvalidArgument("not a mouse joint".to_string()));
        };
        mouse.set_target(target);
        if let Some(body) = self.bodies.get_mut(body_b) {
            body.set_awake(true);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Contacts
    // ------------------------------------------------------------------

    pub fn contacts(&self) -> impl Iterator<Item = (ContactKey, &Contact)> {
        self.contact_manager.contacts()
    }

    pub fn contact(&self, key: ContactKey) -> Option<&Contact> {
        self.contact_manager.contacts.get(key)
    }

    pub fn contact_count(&self) -> usize {
        self.contact_manager.contact_count()
    }

    /// World-space points and normal of a contact
    pub fn world_manifold(&self, key: ContactKey) -> Option<WorldManifold> {
        self.contact_manager
            .contacts
            .get(key)?
            .world_manifold(&self.bodies, &self.fixtures)
    }

    // ------------------------------------------------------------------
    // Particles
    // ------------------------------------------------------------------

    pub fn particles(&self) -> &ParticleSystem {
        &self.particles
    }

    /// Tuning parameters and per-particle data
    pub fn particles_mut(&mut self) -> &mut ParticleSystem {
        &mut self.particles
    }

    /// Add one particle; `None` once the system is at its maximum count
    pub fn create_particle(&mut self, def: &ParticleDef) -> PhysicsResult<Option<usize>> {
        self.check_unlocked("create a particle")?;
        Ok(self.particles.create_particle(def))
    }

    /// Flag a particle for removal at the start of the next step
    pub fn destroy_particle(&mut self, index: usize) -> PhysicsResult<bool> {
        self.check_unlocked("destroy a particle")?;
        Ok(self.particles.destroy_particle(index))
    }

    /// Flag every particle inside `shape` for removal, returning how many
    pub fn destroy_particles_in_shape(&mut self, shape: &Shape, xf: &Transform2D) -> PhysicsResult<usize> {
        self.check_unlocked("destroy particles")?;
        Ok(self.particles.destroy_particles_in_shape(shape, xf))
    }

    pub fn create_particle_group(&mut self, def: &ParticleGroupDef) -> PhysicsResult<ParticleGroupKey> {
        self.check_unlocked("create a particle group")?;
        Ok(self.particles.create_particle_group(def))
    }

    pub fn destroy_particle_group(&mut self, key: ParticleGroupKey) -> PhysicsResult<()> {
        self.check_unlocked("destroy a particle group")?;
        self.particles.destroy_particle_group(key)
    }

    /// Merge group `b` into group `a`
    pub fn join_particle_groups(&mut self, a: ParticleGroupKey, b: ParticleGroupKey) -> PhysicsResult<()> {
        self.check_unlocked("join particle groups")?;
        self.particles.join_particle_groups(a, b)
    }

    /// Report particles inside an AABB until the callback returns false
    pub fn query_particles<F>(&self, aabb: &Aabb, callback: F)
    where
        F: FnMut(usize) -> bool,
    {
        self.particles.query_aabb(aabb, callback);
    }

    /// Ray cast against particles, with the same clipping rules as
    /// [`World::ray_cast`]
    pub fn ray_cast_particles<F>(&self, p1: Vec2, p2: Vec2, callback: F)
    where
        F: FnMut(usize, Vec2, Vec2, f32) -> f32,
    {
        self.particles.ray_cast(p1, p2, callback);
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Report fixtures whose fat AABB overlaps `aabb` until the callback
    /// returns false
    pub fn query_aabb<F>(&self, aabb: &Aabb, mut callback: F)
    where
        F: FnMut(FixtureKey) -> bool,
    {
        let broad_phase = &self.contact_manager.broad_phase;
        broad_phase.query(aabb, |proxy_id| match broad_phase.user_data(proxy_id) {
            Some(proxy) => callback(proxy.fixture),
            None => true,
        });
    }

    /// Cast a ray from `p1` to `p2`
    ///
    /// The callback receives the fixture, the hit point, the surface normal
    /// and the fraction along the ray. Its return value steers the cast:
    /// `-1` ignores the hit, `0` stops, a fraction clips the ray there and
    /// `1` continues unclipped. A fixture whose shape contains `p1` is
    /// reported at fraction 0 with the normal pointing back along the ray.
    pub fn ray_cast<F>(&self, p1: Vec2, p2: Vec2, mut callback: F)
    where
        F: FnMut(FixtureKey, Vec2, Vec2, f32) -> f32,
    {
        let broad_phase = &self.contact_manager.broad_phase;
        let d = p2 - p1;

        if d.length_squared() <= f32::EPSILON * f32::EPSILON {
            let point = Aabb::new(p1, p1);
            broad_phase.query(&point, |proxy_id| {
                let Some(proxy) = broad_phase.user_data(proxy_id) else {
                    return true;
                };
                let Some(fixture) = self.fixtures.get(proxy.fixture) else {
                    return true;
                };
                let Some(body) = self.bodies.get(fixture.body) else {
                    return true;
                };
                if proxy.child_index == 0 && fixture.test_point(&body.xf, p1) {
                    return callback(proxy.fixture, p1, Vec2::ZERO, 0.0) != 0.0;
                }
                true
            });
            return;
        }

        let back = (p1 - p2).normalized();
        let input = RayCastInput {
            p1,
            p2,
            max_fraction: 1.0,
        };
        broad_phase.ray_cast(&input, |sub_input, proxy_id| {
            let Some(proxy) = broad_phase.user_data(proxy_id) else {
                return sub_input.max_fraction;
            };
            let Some(fixture) = self.fixtures.get(proxy.fixture) else {
                return sub_input.max_fraction;
            };
            let Some(body) = self.bodies.get(fixture.body) else {
                return sub_input.max_fraction;
            };

            if proxy.child_index == 0 && fixture.test_point(&body.xf, p1) {
                return callback(proxy.fixture, p1, back, 0.0);
            }

            match fixture.ray_cast(sub_input, &body.xf, proxy.child_index) {
                Some(output) => {
                    let point = p1 + d * output.fraction;
                    callback(proxy.fixture, point, output.normal, output.fraction)
                }
                None => sub_input.max_fraction,
            }
        });
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    pub fn proxy_count(&self) -> usize {
        self.contact_manager.broad_phase.proxy_count()
    }

    pub fn tree_height(&self) -> i32 {
        self.contact_manager.broad_phase.tree_height()
    }

    pub fn tree_balance(&self) -> i32 {
        self.contact_manager.broad_phase.tree_balance()
    }

    /// Total tree area over root area; 1 is a perfect fit
    pub fn tree_quality(&self) -> f32 {
        self.contact_manager.broad_phase.tree_quality()
    }

    /// Counters from the most recent step
    pub fn stats(&self) -> StepStats {
        self.stats
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Advance the simulation by `dt` seconds
    pub fn step(&mut self, dt: f32, velocity_iterations: usize, position_iterations: usize) {
        self.step_with_listener(dt, velocity_iterations, position_iterations, &mut NoopListener);
    }

    /// Advance the simulation, reporting contact events to `listener`
    ///
    /// This performs:
    /// 1. End events for touching contacts destroyed since the last step
    /// 2. Contact creation for fixtures added since the last step
    /// 3. Narrow phase for every contact
    /// 4. Particle dynamics
    /// 5. Island building and the discrete solve
    /// 6. Continuous collision for fast bodies
    pub fn step_with_listener(
        &mut self,
        dt: f32,
        velocity_iterations: usize,
        position_iterations: usize,
        listener: &mut dyn ContactListener,
    ) {
        self.stats = StepStats::default();

        for contact in self.ended_contacts.drain(..) {
            listener.end_contact(&contact);
        }

        if self.flags.contains(WorldFlags::NEW_FIXTURE) {
            self.contact_manager
                .find_new_contacts(&mut self.bodies, &self.fixtures, &self.joints, listener);
            self.flags.remove(WorldFlags::NEW_FIXTURE);
        }

        self.flags.insert(WorldFlags::LOCKED);

        let mut step = TimeStep::new(dt, velocity_iterations, position_iterations);
        step.dt_ratio = self.inv_dt0 * dt;
        step.warm_starting = self.config.warm_starting;

        for body in self.bodies.values_mut() {
            body.xf0 = body.xf;
        }

        self.contact_manager
            .collide(&mut self.bodies, &self.fixtures, &self.joints, listener);

        if self.step_complete && step.dt > 0.0 {
            let mut ctx = ParticleContext {
                broad_phase: &self.contact_manager.broad_phase,
                fixtures: &self.fixtures,
                bodies: &mut self.bodies,
            };
            self.particles.solve(&step, self.config.gravity, &mut ctx);
            self.solve(&step, listener);
        }

        if self.config.continuous_physics && step.dt > 0.0 {
            self.solve_toi(&step, listener);
        }

        if step.dt > 0.0 {
            self.inv_dt0 = step.inv_dt;
        }

        if self.flags.contains(WorldFlags::CLEAR_FORCES) {
            self.clear_forces();
        }

        self.flags.remove(WorldFlags::LOCKED);

        log::trace!(
            "Step: {} islands, {} contacts, {} TOI events, {} dropped",
            self.stats.islands,
            self.contact_manager.contact_count(),
            self.stats.toi_events,
            self.stats.toi_dropped
        );
    }

    /// Build islands by depth-first search from awake bodies and solve each
    fn solve(&mut self, step: &TimeStep, listener: &mut dyn ContactListener) {
        for body in self.bodies.values_mut() {
            body.flags.remove(BodyFlags::ISLAND);
        }
        for contact in self.contact_manager.contacts.values_mut() {
            contact.flags.remove(ContactFlags::ISLAND);
        }
        for joint in self.joints.values_mut() {
            joint.island = false;
        }

        let mut seeds = std::mem::take(&mut self.seeds);
        let mut stack = std::mem::take(&mut self.stack);
        seeds.clear();
        seeds.extend(self.bodies.keys());

        for &seed in &seeds {
            let Some(body) = self.bodies.get_mut(seed) else {
                continue;
            };
            if body.is_in_island()
                || !body.is_awake()
                || !body.is_active()
                || body.body_type == BodyType::Static
            {
                continue;
            }

            self.island.clear();
            stack.clear();
            stack.push(seed);
            body.flags.insert(BodyFlags::ISLAND);

            while let Some(key) = stack.pop() {
                let Some(body) = self.bodies.get_mut(key) else {
                    continue;
                };
                self.island.add_body(key, body);

                // Keep the sleep timer; only the flag matters here
                body.flags.insert(BodyFlags::AWAKE);

                // Static bodies do not propagate islands
                if body.body_type == BodyType::Static {
                    continue;
                }

                let contact_count = body.contact_edges.len();
                for i in 0..contact_count {
                    let Some(edge) = self.bodies.get(key).and_then(|b| b.contact_edges.get(i).copied())
                    else {
                        break;
                    };
                    let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) else {
                        continue;
                    };
                    if contact.flags.contains(ContactFlags::ISLAND)
                        || !contact.is_enabled()
                        || !contact.is_touching()
                        || contact.sensor
                    {
                        continue;
                    }
                    contact.flags.insert(ContactFlags::ISLAND);
                    self.island.add_contact(edge.contact);

                    let Some(other) = self.bodies.get_mut(edge.other) else {
                        continue;
                    };
                    if other.is_in_island() {
                        continue;
                    }
                    other.flags.insert(BodyFlags::ISLAND);
                    stack.push(edge.other);
                }

                let joint_count = self.bodies.get(key).map_or(0, |b| b.joint_edges.len());
                for i in 0..joint_count {
                    let Some(edge) = self.bodies.get(key).and_then(|b| b.joint_edges.get(i).copied())
                    else {
                        break;
                    };
                    let Some(joint) = self.joints.get_mut(edge.joint) else {
                        continue;
                    };
                    if joint.island {
                        continue;
                    }
                    let Some(other) = self.bodies.get_mut(edge.other) else {
                        continue;
                    };
                    // Joints to inactive bodies are not simulated
                    if !other.is_active() {
                        continue;
                    }
                    joint.island = true;
                    self.island.add_joint(edge.joint);

                    if other.is_in_island() {
                        continue;
                    }
                    other.flags.insert(BodyFlags::ISLAND);
                    stack.push(edge.other);
                }
            }

            let mut ctx = IslandContext {
                bodies: &mut self.bodies,
                fixtures: &self.fixtures,
                contacts: &mut self.contact_manager.contacts,
                joints: &mut self.joints,
                listener: &mut *listener,
            };
            self.island
                .solve(step, self.config.gravity, self.config.allow_sleep, &mut ctx);
            self.stats.islands += 1;

            // Static bodies may take part in other islands
            for key in &self.island.bodies {
                if let Some(body) = self.bodies.get_mut(*key) {
                    if body.body_type == BodyType::Static {
                        body.flags.remove(BodyFlags::ISLAND);
                    }
                }
            }
        }

        self.seeds = seeds;
        self.stack = stack;

        // Moved bodies drag their proxies along
        for body in self.bodies.values() {
            if !body.is_in_island() || body.body_type == BodyType::Static {
                continue;
            }
            synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);
        }

        self.contact_manager
            .find_new_contacts(&mut self.bodies, &self.fixtures, &self.joints, listener);
    }

    /// Earliest time of impact among contacts that need continuous handling
    fn find_min_toi(&mut self) -> Option<(ContactKey, f32)> {
        let mut min_contact = None;
        let mut min_alpha = 1.0;

        for (key, contact) in self.contact_manager.contacts.iter_mut() {
            if !contact.is_enabled() {
                continue;
            }
            if contact.toi_count > MAX_SUB_STEPS {
                // Counted once, the first time the cap keeps it out
                if contact.toi_count == MAX_SUB_STEPS + 1 {
                    contact.toi_count += 1;
                    self.stats.toi_dropped += 1;
                    if self.stats.toi_dropped == 1 {
                        log::warn!(
                            "Contact exceeded {} TOI sub-steps; leaving it to the discrete solver",
                            MAX_SUB_STEPS
                        );
                    }
                }
                continue;
            }

            let alpha = if contact.flags.contains(ContactFlags::TOI) {
                contact.toi
            } else {
                if contact.sensor {
                    continue;
                }
                let (Some(fixture_a), Some(fixture_b)) = (
                    self.fixtures.get(contact.fixture_a),
                    self.fixtures.get(contact.fixture_b),
                ) else {
                    continue;
                };
                let (Some(body_a), Some(body_b)) =
                    (self.bodies.get(contact.body_a), self.bodies.get(contact.body_b))
                else {
                    continue;
                };

                let active_a = body_a.is_awake() && body_a.body_type != BodyType::Static;
                let active_b = body_b.is_awake() && body_b.body_type != BodyType::Static;
                if !active_a && !active_b {
                    continue;
                }

                let collide_a = body_a.is_bullet() || body_a.body_type != BodyType::Dynamic;
                let collide_b = body_b.is_bullet() || body_b.body_type != BodyType::Dynamic;
                if !collide_a && !collide_b {
                    continue;
                }

                // Put both sweeps on the same time interval
                let mut sweep_a = body_a.sweep;
                let mut sweep_b = body_b.sweep;
                let alpha0 = sweep_a.alpha0.max(sweep_b.alpha0);
                if sweep_a.alpha0 < alpha0 {
                    sweep_a.advance(alpha0);
                } else if sweep_b.alpha0 < alpha0 {
                    sweep_b.advance(alpha0);
                }

                let input = ToiInput {
                    proxy_a: DistanceProxy::new(&fixture_a.shape, contact.child_a),
                    proxy_b: DistanceProxy::new(&fixture_b.shape, contact.child_b),
                    sweep_a,
                    sweep_b,
                    t_max: 1.0,
                };
                let output = time_of_impact(&input);

                if let Some(body) = self.bodies.get_mut(contact.body_a) {
                    body.sweep = sweep_a;
                }
                if let Some(body) = self.bodies.get_mut(contact.body_b) {
                    body.sweep = sweep_b;
                }

                let alpha = if output.state == ToiState::Touching {
                    (alpha0 + (1.0 - alpha0) * output.t).min(1.0)
                } else {
                    1.0
                };
                contact.toi = alpha;
                contact.flags.insert(ContactFlags::TOI);
                alpha
            };

            if alpha < min_alpha {
                min_contact = Some(key);
                min_alpha = alpha;
            }
        }

        min_contact
            .filter(|_| min_alpha < 1.0 - 10.0 * f32::EPSILON)
            .map(|key| (key, min_alpha))
    }

    /// Move a body to `alpha` and refresh one contact there, restoring the
    /// body if the contact does not touch
    fn advance_and_update(
        &mut self,
        contact_key: ContactKey,
        advance: &[BodyKey],
        alpha: f32,
        listener: &mut dyn ContactListener,
    ) -> bool {
        let mut backups = Vec::with_capacity(advance.len());
        for key in advance {
            if let Some(body) = self.bodies.get_mut(*key) {
                backups.push((*key, body.sweep));
                body.advance(alpha);
            }
        }

        let Some(contact) = self.contact_manager.contacts.get_mut(contact_key) else {
            return false;
        };
        contact.update(&self.fixtures, &mut self.bodies, listener);
        if contact.is_enabled() && contact.is_touching() {
            return true;
        }

        for (key, backup) in backups {
            if let Some(body) = self.bodies.get_mut(key) {
                body.sweep = backup;
                body.synchronize_transform();
            }
        }
        false
    }

    /// Resolve impacts in time order so fast bodies do not tunnel
    fn solve_toi(&mut self, step: &TimeStep, listener: &mut dyn ContactListener) {
        if self.step_complete {
            for body in self.bodies.values_mut() {
                body.flags.remove(BodyFlags::ISLAND);
                body.sweep.alpha0 = 0.0;
            }
            for contact in self.contact_manager.contacts.values_mut() {
                contact.flags.remove(ContactFlags::TOI | ContactFlags::ISLAND);
                contact.toi_count = 0;
                contact.toi = 1.0;
            }
        }

        loop {
            let Some((min_key, min_alpha)) = self.find_min_toi() else {
                // No more impacts this step
                self.step_complete = true;
                break;
            };

            let Some(contact) = self.contact_manager.contacts.get_mut(min_key) else {
                break;
            };
            let (key_a, key_b) = (contact.body_a, contact.body_b);
            contact.flags.remove(ContactFlags::TOI);
            contact.toi_count += 1;

            if !self.advance_and_update(min_key, &[key_a, key_b], min_alpha, listener) {
                if let Some(contact) = self.contact_manager.contacts.get_mut(min_key) {
                    contact.flags.remove(ContactFlags::ENABLED);
                }
                continue;
            }

            self.island.clear();
            for key in [key_a, key_b] {
                if let Some(body) = self.bodies.get_mut(key) {
                    body.set_awake(true);
                    body.flags.insert(BodyFlags::ISLAND);
                    self.island.add_body(key, body);
                }
            }
            if let Some(contact) = self.contact_manager.contacts.get_mut(min_key) {
                contact.flags.insert(ContactFlags::ISLAND);
            }
            self.island.add_contact(min_key);

            // Pull in the static, kinematic and bullet neighbours of the impact
            for key in [key_a, key_b] {
                let Some(body) = self.bodies.get(key) else {
                    continue;
                };
                if body.body_type != BodyType::Dynamic {
                    continue;
                }
                let body_is_bullet = body.is_bullet();
                let edge_count = body.contact_edges.len();

                for i in 0..edge_count {
                    if self.island.bodies.len() == 2 * MAX_TOI_CONTACTS
                        || self.island.contacts.len() == MAX_TOI_CONTACTS
                    {
                        break;
                    }
                    let Some(edge) = self.bodies.get(key).and_then(|b| b.contact_edges.get(i).copied())
                    else {
                        break;
                    };
                    let Some(contact) = self.contact_manager.contacts.get(edge.contact) else {
                        continue;
                    };
                    if contact.flags.contains(ContactFlags::ISLAND) || contact.sensor {
                        continue;
                    }
                    let Some(other) = self.bodies.get(edge.other) else {
                        continue;
                    };
                    if other.body_type == BodyType::Dynamic && !body_is_bullet && !other.is_bullet() {
                        continue;
                    }

                    // Tentatively move the neighbour to the time of impact
                    let advance = (!other.is_in_island()).then_some(edge.other);
                    if !self.advance_and_update(edge.contact, advance.as_slice(), min_alpha, listener) {
                        continue;
                    }

                    if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) {
                        contact.flags.insert(ContactFlags::ISLAND);
                    }
                    self.island.add_contact(edge.contact);

                    let Some(other) = self.bodies.get_mut(edge.other) else {
                        continue;
                    };
                    if other.is_in_island() {
                        continue;
                    }
                    other.flags.insert(BodyFlags::ISLAND);
                    if other.body_type != BodyType::Static {
                        other.set_awake(true);
                    }
                    self.island.add_body(edge.other, other);
                }
            }

            let dt = (1.0 - min_alpha) * step.dt;
            let sub_step = TimeStep {
                dt,
                inv_dt: 1.0 / dt,
                dt_ratio: 1.0,
                velocity_iterations: step.velocity_iterations,
                position_iterations: TOI_POSITION_ITERATIONS,
                warm_starting: false,
            };
            let index_a = self.bodies.get(key_a).map_or(0, |b| b.island_index);
            let index_b = self.bodies.get(key_b).map_or(0, |b| b.island_index);

            let mut ctx = IslandContext {
                bodies: &mut self.bodies,
                fixtures: &self.fixtures,
                contacts: &mut self.contact_manager.contacts,
                joints: &mut self.joints,
                listener: &mut *listener,
            };
            self.island.solve_toi(&sub_step, index_a, index_b, &mut ctx);
            self.stats.toi_events += 1;

            // Release island flags and move proxies to the new positions
            for key in &self.island.bodies {
                let Some(body) = self.bodies.get_mut(*key) else {
                    continue;
                };
                body.flags.remove(BodyFlags::ISLAND);
                if body.body_type != BodyType::Dynamic {
                    continue;
                }
                synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);

                // Neighbouring contacts get a fresh time of impact
                for edge in &body.contact_edges {
                    if let Some(contact) = self.contact_manager.contacts.get_mut(edge.contact) {
                        contact.flags.remove(ContactFlags::TOI | ContactFlags::ISLAND);
                    }
                }
            }

            // Some contacts may have been destroyed and new ones created
            self.contact_manager
                .find_new_contacts(&mut self.bodies, &self.fixtures, &self.joints, listener);

            if self.config.sub_stepping {
                self.step_complete = false;
                break;
            }
        }
    }
}
