//! Fixtures: a shape attached to a body, with material and filtering
//!
//! A fixture owns one broad-phase proxy per shape child (chains have one per
//! segment). Proxies only exist while the owning body is active.

use kinetic2d_math::{Transform2D, Vec2};
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::body::BodyKey;
use crate::collision::{Aabb, BroadPhase, ProxyId, RayCastInput, RayCastOutput};
use crate::filter::Filter;
use crate::material::PhysicsMaterial;
use crate::shapes::{MassData, Shape, ShapeType};

new_key_type! {
    /// Key to a fixture in the physics world
    pub struct FixtureKey;
}

/// What the broad phase stores for each proxy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProxyRef {
    pub fixture: FixtureKey,
    pub child_index: usize,
}

/// A broad-phase proxy belonging to one child of a fixture's shape
#[derive(Clone, Copy, Debug)]
pub struct FixtureProxy {
    pub aabb: Aabb,
    pub child_index: usize,
    pub proxy_id: ProxyId,
}

/// Everything needed to attach a shape to a body
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FixtureDef {
    pub shape: Shape,
    pub material: PhysicsMaterial,
    /// Sensors report overlap but never generate a collision response
    pub is_sensor: bool,
    pub filter: Filter,
    /// Opaque value for the embedding application
    pub user_data: u64,
}

impl FixtureDef {
    /// A fixture for `shape` with the default material
    pub fn new(shape: impl Into<Shape>) -> Self {
        Self {
            shape: shape.into(),
            material: PhysicsMaterial::default(),
            is_sensor: false,
            filter: Filter::default(),
            user_data: 0,
        }
    }

    pub fn with_material(mut self, material: PhysicsMaterial) -> Self {
        self.material = material;
        self
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.material.density = density;
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.material.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.material.restitution = restitution;
        self
    }

    pub fn with_sensor(mut self, is_sensor: bool) -> Self {
        self.is_sensor = is_sensor;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }
}

/// A shape attached to a body
#[derive(Clone, Debug)]
pub struct Fixture {
    pub(crate) body: BodyKey,
    pub(crate) shape: Shape,
    pub(crate) material: PhysicsMaterial,
    pub(crate) is_sensor: bool,
    pub(crate) filter: Filter,
    pub(crate) proxies: Vec<FixtureProxy>,
    pub(crate) user_data: u64,
}

impl Fixture {
    pub(crate) fn new(body: BodyKey, def: &FixtureDef) -> Self {
        Self {
            body,
            shape: def.shape.clone(),
            material: def.material,
            is_sensor: def.is_sensor,
            filter: def.filter,
            proxies: Vec::with_capacity(def.shape.child_count()),
            user_data: def.user_data,
        }
    }

    /// The body this fixture is attached to
    pub fn body(&self) -> BodyKey {
        self.body
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn shape_type(&self) -> ShapeType {
        self.shape.shape_type()
    }

    pub fn material(&self) -> &PhysicsMaterial {
        &self.material
    }

    pub fn density(&self) -> f32 {
        self.material.density
    }

    pub fn friction(&self) -> f32 {
        self.material.friction
    }

    /// Affects contacts created after the change
    pub fn set_friction(&mut self, friction: f32) {
        self.material.friction = friction;
    }

    pub fn restitution(&self) -> f32 {
        self.material.restitution
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.material.restitution = restitution;
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    pub fn set_user_data(&mut self, user_data: u64) {
        self.user_data = user_data;
    }

    pub fn proxies(&self) -> &[FixtureProxy] {
        &self.proxies
    }

    /// Tight AABB of one child as of the last synchronization
    pub fn aabb(&self, child_index: usize) -> Option<Aabb> {
        self.proxies
            .iter()
            .find(|proxy| proxy.child_index == child_index)
            .map(|proxy| proxy.aabb)
    }

    pub fn mass_data(&self) -> MassData {
        self.shape.compute_mass(self.material.density)
    }

    /// Does the shape contain a world point
    pub fn test_point(&self, xf: &Transform2D, p: Vec2) -> bool {
        self.shape.test_point(xf, p)
    }

    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        xf: &Transform2D,
        child_index: usize,
    ) -> Option<RayCastOutput> {
        self.shape.ray_cast(input, xf, child_index)
    }

    pub(crate) fn create_proxies(
        &mut self,
        broad_phase: &mut BroadPhase<ProxyRef>,
        xf: &Transform2D,
        key: FixtureKey,
    ) {
        debug_assert!(self.proxies.is_empty());
        for child_index in 0..self.shape.child_count() {
            let aabb = self.shape.compute_aabb(xf, child_index);
            let proxy_id = broad_phase.create_proxy(aabb, ProxyRef { fixture: key, child_index });
            self.proxies.push(FixtureProxy {
                aabb,
                child_index,
                proxy_id,
            });
        }
    }

    pub(crate) fn destroy_proxies(&mut self, broad_phase: &mut BroadPhase<ProxyRef>) {
        for proxy in self.proxies.drain(..) {
            broad_phase.destroy_proxy(proxy.proxy_id);
        }
    }

    /// Move every proxy to cover the sweep from `xf1` to `xf2`
    pub(crate) fn synchronize(
        &mut self,
        broad_phase: &mut BroadPhase<ProxyRef>,
        xf1: &Transform2D,
        xf2: &Transform2D,
    ) {
        let displacement = xf2.p - xf1.p;
        for proxy in &mut self.proxies {
            let aabb1 = self.shape.compute_aabb(xf1, proxy.child_index);
            let aabb2 = self.shape.compute_aabb(xf2, proxy.child_index);
            proxy.aabb = aabb1.combine(&aabb2);
            broad_phase.move_proxy(proxy.proxy_id, proxy.aabb, displacement);
        }
    }

    /// Re-examine all pairs of this fixture on the next broad-phase update
    pub(crate) fn touch_proxies(&self, broad_phase: &mut BroadPhase<ProxyRef>) {
        for proxy in &self.proxies {
            broad_phase.touch_proxy(proxy.proxy_id);
        }
    }
}
