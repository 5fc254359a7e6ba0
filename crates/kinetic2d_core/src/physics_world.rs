//! The application-facing physics world
//!
//! [`PhysicsWorld`] wraps the engine [`World`] and works in pixel units. Each
//! tick it:
//! 1. Steps the engine, recording contact begin/end events
//! 2. Copies body transforms back onto their entities
//! 3. Turns the recorded events into sensor and collision notifications
//! 4. Checks hit box overlap for pairs the engine does not report
//!    (entities without physics, kinematic against static)
//! 5. Runs the collision handlers for every tracked pair

use std::collections::HashMap;

use kinetic2d_math::Vec2;
use kinetic2d_physics::{
    Body, BodyKey, BodyType, Contact, ContactListener, DistanceJointDef, Fixture, FixtureDef,
    FixtureKey, JointKey, ParticleColor, ParticleFlags, ParticleGroupDef, ParticleGroupKey,
    PhysicsConfig, PhysicsError, PhysicsResult, RevoluteJointDef, RopeJointDef, World,
};
use slotmap::SlotMap;

use crate::collision::{pair_index, CollisionHandler, CollisionHandlerKey, CollisionPair, CollisionPairKey, PairEvent};
use crate::entity::{Entity, EntityKey, EntityType};
use crate::hitbox::HitBox;
use crate::physics_component::{PhysicsBody, PhysicsComponent};
use crate::raycast::RaycastResult;
use crate::units::UnitConverter;

/// Default solver iterations per step
pub const DEFAULT_VELOCITY_ITERATIONS: usize = 8;
pub const DEFAULT_POSITION_ITERATIONS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FixtureRole {
    HitBox(usize),
    Sensor(usize),
}

#[derive(Clone, Copy, Debug)]
struct FixtureOwner {
    entity: EntityKey,
    role: FixtureRole,
}

#[derive(Clone, Copy, Debug)]
enum ContactEvent {
    Begin(FixtureKey, FixtureKey),
    End(FixtureKey, FixtureKey),
}

/// Records engine contact events so they can be dispatched after the step
struct EventCollector<'a> {
    entities: &'a SlotMap<EntityKey, Entity>,
    owners: &'a HashMap<FixtureKey, FixtureOwner>,
    events: &'a mut Vec<ContactEvent>,
}

impl EventCollector<'_> {
    fn entity_of(&self, fixture: FixtureKey) -> Option<&Entity> {
        let owner = self.owners.get(&fixture)?;
        self.entities.get(owner.entity)
    }
}

impl ContactListener for EventCollector<'_> {
    fn begin_contact(&mut self, contact: &Contact) {
        self.events
            .push(ContactEvent::Begin(contact.fixture_a(), contact.fixture_b()));
    }

    fn end_contact(&mut self, contact: &Contact) {
        self.events
            .push(ContactEvent::End(contact.fixture_a(), contact.fixture_b()));
    }

    fn should_collide(&mut self, fixture_a: FixtureKey, fixture_b: FixtureKey) -> bool {
        match (self.entity_of(fixture_a), self.entity_of(fixture_b)) {
            (Some(a), Some(b)) => !(a.is_collidable() && b.is_collidable() && a.ignores(b)),
            _ => true,
        }
    }
}

/// Entities, collision handlers and the engine world, in pixel units
#[derive(Debug)]
pub struct PhysicsWorld {
    world: World,
    units: UnitConverter,
    entities: SlotMap<EntityKey, Entity>,
    handlers: SlotMap<CollisionHandlerKey, CollisionHandler>,
    /// Active collisions; slots are reused once a pair ends
    pairs: SlotMap<CollisionPairKey, CollisionPair>,
    pair_lookup: HashMap<(EntityKey, EntityKey), CollisionPairKey>,
    body_owners: HashMap<BodyKey, EntityKey>,
    fixture_owners: HashMap<FixtureKey, FixtureOwner>,
    events: Vec<ContactEvent>,
    collidables: Vec<EntityKey>,
    tick: u64,
    velocity_iterations: usize,
    position_iterations: usize,
    log_collisions: bool,
}

impl PhysicsWorld {
    /// A world with default engine settings for an application `app_height`
    /// pixels tall
    pub fn new(app_height: f32, pixels_per_meter: f32) -> Self {
        Self::with_config(UnitConverter::new(app_height, pixels_per_meter), PhysicsConfig::default())
    }

    pub fn with_config(units: UnitConverter, config: PhysicsConfig) -> Self {
        log::debug!(
            "Physics world initialized: app_height={}, pixels_per_meter={:.1}",
            units.app_height(),
            units.pixels_per_meter()
        );

        Self {
            world: World::new(config),
            units,
            entities: SlotMap::with_key(),
            handlers: SlotMap::with_key(),
            pairs: SlotMap::with_key(),
            pair_lookup: HashMap::new(),
            body_owners: HashMap::new(),
            fixture_owners: HashMap::new(),
            events: Vec::new(),
            collidables: Vec::new(),
            tick: 0,
            velocity_iterations: DEFAULT_VELOCITY_ITERATIONS,
            position_iterations: DEFAULT_POSITION_ITERATIONS,
            log_collisions: false,
        }
    }

    pub fn with_iterations(mut self, velocity_iterations: usize, position_iterations: usize) -> Self {
        self.velocity_iterations = velocity_iterations;
        self.position_iterations = position_iterations;
        self
    }

    /// Log every collision begin and end at debug level
    pub fn with_collision_logging(mut self, enabled: bool) -> Self {
        self.log_collisions = enabled;
        self
    }

    pub fn units(&self) -> &UnitConverter {
        &self.units
    }

    /// The engine world, in physics units
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable engine world
    ///
    /// Bodies and fixtures created directly here are not tied to entities and
    /// never produce collision notifications.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Number of completed updates
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Set gravity in pixels per second squared (y down)
    pub fn set_gravity(&mut self, x: f32, y: f32) {
        let gravity = self.units.to_vector(Vec2::new(x, y));
        self.world.set_gravity(gravity);
    }

    /// Gravity in pixels per second squared (y down)
    pub fn gravity(&self) -> Vec2 {
        self.units.to_pixel_vector(self.world.gravity())
    }

    // ==================== Entities ====================

    /// Register an entity, creating its body and fixtures if it has physics
    ///
    /// Hit boxes whose shape cannot be built are skipped with a warning. A
    /// chain hit box on a non-static body is rejected.
    pub fn add_entity(&mut self, mut entity: Entity) -> PhysicsResult<EntityKey> {
        let created = self.create_body(&mut entity)?;
        let key = self.entities.insert(entity);

        if let Some((body, fixtures)) = created {
            self.body_owners.insert(body, key);
            for (fixture, role) in fixtures {
                self.fixture_owners.insert(fixture, FixtureOwner { entity: key, role });
            }
        }

        log::debug!("Added entity {:?}", key);
        Ok(key)
    }

    fn create_body(&mut self, entity: &mut Entity) -> PhysicsResult<Option<(BodyKey, Vec<(FixtureKey, FixtureRole)>)>> {
        let units = self.units;
        let center_local = entity.center_local();
        let center = entity.center();
        let rotation = entity.rotation;

        let Some(physics) = entity.physics() else {
            return Ok(None);
        };
        if physics.is_initialized() {
            return Err(PhysicsError::InvalidArgument(
                "entity already belongs to a physics world".to_string(),
            ));
        }

        let sensor_boxes = physics.sensors().iter().map(|s| &s.hit_box);
        if physics.body_type() != BodyType::Static
            && entity.hit_boxes().iter().chain(sensor_boxes).any(|hb| hb.shape().is_chain())
        {
            return Err(PhysicsError::InvalidArgument(
                "BoundingShape::chain can only be used with static bodies".to_string(),
            ));
        }

        let mut defs = Vec::new();
        for (i, hit_box) in entity.hit_boxes().iter().enumerate() {
            match hit_box.to_physics_shape(center_local, &units) {
                Ok(shape) => defs.push((
                    FixtureRole::HitBox(i),
                    FixtureDef {
                        shape,
                        ..physics.fixture_def().clone()
                    },
                )),
                Err(err) => log::warn!("Skipping hit box '{}': {}", hit_box.name(), err),
            }
        }
        for (i, sensor) in physics.sensors().iter().enumerate() {
            match sensor.hit_box.to_physics_shape(center_local, &units) {
                Ok(shape) => defs.push((FixtureRole::Sensor(i), FixtureDef::new(shape).with_sensor(true))),
                Err(err) => log::warn!("Skipping sensor '{}': {}", sensor.hit_box.name(), err),
            }
        }

        // The entity's placement always wins over the def's
        let mut body_def = physics.body_def().clone();
        body_def.position = units.to_point(center);
        body_def.angle = units.to_radians(rotation);

        let body = self.world.create_body(&body_def)?;
        let mut fixtures = Vec::with_capacity(defs.len());
        for (role, def) in defs {
            match self.world.create_fixture(body, &def) {
                Ok(fixture) => fixtures.push((fixture, role)),
                Err(err) => {
                    self.world.destroy_body(body)?;
                    return Err(err);
                }
            }
        }

        if let Some(physics) = entity.physics_mut() {
            physics.attach(body);
            for callback in physics.take_init_callbacks() {
                if let Some(b) = self.world.body_mut(body) {
                    callback(b, &units);
                }
            }
        }

        Ok(Some((body, fixtures)))
    }

    /// Remove an entity and destroy its body
    ///
    /// Collision pairs involving the entity are dropped on the next update
    /// without an end notification.
    pub fn remove_entity(&mut self, key: EntityKey) -> Option<Entity> {
        let mut entity = self.entities.remove(key)?;

        if let Some(body) = entity.physics_mut().and_then(PhysicsComponent::detach) {
            self.body_owners.remove(&body);
            if let Some(b) = self.world.body(body) {
                for fixture in b.fixtures() {
                    self.fixture_owners.remove(fixture);
                }
            }
            if let Err(err) = self.world.destroy_body(body) {
                log::warn!("Failed to destroy body of entity {:?}: {}", key, err);
            }
        }

        log::debug!("Removed entity {:?}", key);
        Some(entity)
    }

    pub fn entity(&self, key: EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    /// Mutable entity access
    ///
    /// Positions of entities with a body are overwritten from the body each
    /// update; use [`PhysicsBody::overwrite_position`] to move them.
    pub fn entity_mut(&mut self, key: EntityKey) -> Option<&mut Entity> {
        self.entities.get_mut(key)
    }

    pub fn entities(&self) -> impl Iterator<Item = (EntityKey, &Entity)> {
        self.entities.iter()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Find the first entity with the given name
    pub fn find_by_name(&self, name: &str) -> Option<EntityKey> {
        self.entities
            .iter()
            .find(|(_, e)| e.name.as_deref() == Some(name))
            .map(|(k, _)| k)
    }

    /// Entity owning an engine body
    pub fn entity_of_body(&self, body: BodyKey) -> Option<EntityKey> {
        self.body_owners.get(&body).copied()
    }

    /// Pixel-unit access to an entity's body
    pub fn physics(&mut self, key: EntityKey) -> PhysicsResult<PhysicsBody<'_>> {
        let entity = self
            .entities
            .get_mut(key)
            .ok_or_else(|| PhysicsError::InvalidArgument(format!("unknown entity {:?}", key)))?;
        let body = entity
            .physics()
            .ok_or_else(|| PhysicsError::NotInitialized("entity has no physics component".to_string()))?
            .body()?;

        Ok(PhysicsBody {
            world: &mut self.world,
            entity,
            body,
            units: self.units,
        })
    }

    /// Remove every entity and active collision; handlers stay registered
    pub fn clear(&mut self) {
        log::debug!("Clearing physics world");

        let keys: Vec<EntityKey> = self.entities.keys().collect();
        for key in keys {
            self.remove_entity(key);
        }
        self.pairs.clear();
        self.pair_lookup.clear();
    }

    // ==================== Collision handlers ====================

    /// Register a handler; the order of its types fixes the callback argument
    /// order
    pub fn add_collision_handler(&mut self, handler: CollisionHandler) -> CollisionHandlerKey {
        log::debug!(
            "Added collision handler {} - {}",
            handler.type_a(),
            handler.type_b()
        );
        self.handlers.insert(handler)
    }

    /// Unregister a handler; its pairs are dropped on the next update
    pub fn remove_collision_handler(&mut self, key: CollisionHandlerKey) -> Option<CollisionHandler> {
        self.handlers.remove(key)
    }

    pub fn clear_collision_handlers(&mut self) {
        self.handlers.clear();
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Handler registered for two entity types, in either order
    pub fn find_handler(&self, a: &EntityType, b: &EntityType) -> Option<CollisionHandlerKey> {
        self.handlers
            .iter()
            .find(|(_, h)| h.matches(a, b))
            .map(|(k, _)| k)
    }

    /// Pairs currently tracked, including ones not yet begun
    pub fn collision_pairs(&self) -> impl Iterator<Item = &CollisionPair> {
        self.pairs.values()
    }

    /// True if a collision between the two entities is being tracked
    pub fn is_colliding(&self, e1: EntityKey, e2: EntityKey) -> bool {
        self.pair_lookup.contains_key(&pair_index(e1, e2))
    }

    // ==================== Update ====================

    /// Advance the simulation by `dt` seconds and dispatch collisions
    pub fn update(&mut self, dt: f32) {
        self.tick += 1;
        self.sync_active_flags();

        {
            let mut collector = EventCollector {
                entities: &self.entities,
                owners: &self.fixture_owners,
                events: &mut self.events,
            };
            self.world.step_with_listener(
                dt,
                self.velocity_iterations,
                self.position_iterations,
                &mut collector,
            );
        }

        self.sync_transforms();
        self.process_contact_events();
        self.check_collisions();
        self.notify_collisions();

        log::trace!(
            "Tick {}: {} entities, {} pairs",
            self.tick,
            self.entities.len(),
            self.pairs.len()
        );
    }

    fn sync_active_flags(&mut self) {
        for (_, entity) in &self.entities {
            let Some(physics) = entity.physics() else {
                continue;
            };
            let Ok(body) = physics.body() else {
                continue;
            };
            let wanted = entity.is_active() && physics.body_def().active;
            let current = self.world.body(body).map(Body::is_active);
            if current.map_or(false, |active| active != wanted) {
                if let Err(err) = self.world.set_active(body, wanted) {
                    log::warn!("Failed to update body activity: {}", err);
                }
            }
        }
    }

    fn sync_transforms(&mut self) {
        let units = self.units;
        for (_, entity) in self.entities.iter_mut() {
            let Some(key) = entity.physics().and_then(|p| p.body().ok()) else {
                continue;
            };
            let Some(body) = self.world.body(key) else {
                continue;
            };
            let center = units.to_pixel_point(body.position());
            entity.position = center - entity.center_local();
            entity.rotation = units.to_degrees(body.angle());
        }
    }

    fn process_contact_events(&mut self) {
        let mut events = std::mem::take(&mut self.events);
        for event in events.drain(..) {
            match event {
                ContactEvent::Begin(a, b) => self.on_contact(a, b, true),
                ContactEvent::End(a, b) => self.on_contact(a, b, false),
            }
        }
        self.events = events;
    }

    fn on_contact(&mut self, fixture_a: FixtureKey, fixture_b: FixtureKey, begin: bool) {
        let (Some(a), Some(b)) = (
            self.fixture_owners.get(&fixture_a).copied(),
            self.fixture_owners.get(&fixture_b).copied(),
        ) else {
            return;
        };

        // Sensors first
        let (box_a, box_b) = match (a.role, b.role) {
            (FixtureRole::Sensor(i), _) => return self.notify_sensor(a.entity, i, b.entity, begin),
            (_, FixtureRole::Sensor(i)) => return self.notify_sensor(b.entity, i, a.entity, begin),
            (FixtureRole::HitBox(i), FixtureRole::HitBox(j)) => (i, j),
        };

        let handler = match (self.entities.get(a.entity), self.entities.get(b.entity)) {
            (Some(e1), Some(e2)) if e1.is_collidable() && e2.is_collidable() => {
                self.find_handler(e1.entity_type(), e2.entity_type())
            }
            _ => None,
        };
        let Some(handler) = handler else {
            return;
        };

        if begin {
            self.collision_begin_for(handler, a.entity, b.entity, box_a, box_b, true);
        } else {
            self.collision_end_for(a.entity, b.entity, true);
        }
    }

    fn notify_sensor(&mut self, owner: EntityKey, sensor: usize, other: EntityKey, begin: bool) {
        let Some([owner, other]) = self.entities.get_disjoint_mut([owner, other]) else {
            return;
        };
        if let Some(sensor) = owner.physics_mut().and_then(|p| p.sensor_mut(sensor)) {
            if begin {
                sensor.handler.begin(other);
            } else {
                sensor.handler.end(other);
            }
        }
    }

    fn collision_begin_for(
        &mut self,
        handler_key: CollisionHandlerKey,
        e1: EntityKey,
        e2: EntityKey,
        box1: usize,
        box2: usize,
        from_engine: bool,
    ) {
        let index = pair_index(e1, e2);

        // Still colliding
        if let Some(&pair_key) = self.pair_lookup.get(&index) {
            if let Some(pair) = self.pairs.get_mut(pair_key) {
                if from_engine {
                    pair.touch();
                } else {
                    pair.resume();
                }
            }
            return;
        }

        let (Some(ent1), Some(ent2)) = (self.entities.get(e1), self.entities.get(e2)) else {
            return;
        };
        let Some(handler) = self.handlers.get_mut(handler_key) else {
            return;
        };

        let swap = ent1.entity_type() != handler.type_a();
        let (a, b, ent_a, ent_b, box_a, box_b) = if swap {
            (e2, e1, ent2, ent1, box2, box1)
        } else {
            (e1, e2, ent1, ent2, box1, box2)
        };
        let (Some(hit_box_a), Some(hit_box_b)) = (ent_a.hit_boxes().get(box_a), ent_b.hit_boxes().get(box_b)) else {
            return;
        };

        handler.hit_box_trigger(ent_a, ent_b, hit_box_a, hit_box_b);

        if self.log_collisions {
            log::debug!(
                "Collision detected on tick {}: {} ({}) - {} ({})",
                self.tick,
                ent_a.entity_type(),
                hit_box_a.name(),
                ent_b.entity_type(),
                hit_box_b.name()
            );
        }

        let mut pair = CollisionPair::new(a, b, handler_key, self.tick);
        if from_engine {
            pair.touch();
        }
        let pair_key = self.pairs.insert(pair);
        self.pair_lookup.insert(index, pair_key);
    }

    fn collision_end_for(&mut self, e1: EntityKey, e2: EntityKey, from_engine: bool) {
        let Some(&key) = self.pair_lookup.get(&pair_index(e1, e2)) else {
            return;
        };
        if let Some(pair) = self.pairs.get_mut(key) {
            if from_engine {
                pair.release();
            } else {
                pair.end();
            }
        }
    }

    fn body_type_of(&self, entity: &Entity) -> Option<BodyType> {
        let body = entity.physics()?.body().ok()?;
        self.world.body(body).map(Body::body_type)
    }

    /// Pairs the engine never reports: at least one side without a body, or
    /// kinematic against static
    fn needs_manual_check(&self, e1: &Entity, e2: &Entity) -> bool {
        match (self.body_type_of(e1), self.body_type_of(e2)) {
            (Some(t1), Some(t2)) => matches!(
                (t1, t2),
                (BodyType::Kinematic, BodyType::Static) | (BodyType::Static, BodyType::Kinematic)
            ),
            _ => true,
        }
    }

    fn check_collisions(&mut self) {
        let mut collidables = std::mem::take(&mut self.collidables);
        collidables.clear();
        collidables.extend(
            self.entities
                .iter()
                .filter(|(_, e)| e.is_collidable())
                .map(|(k, _)| k),
        );

        for (i, &k1) in collidables.iter().enumerate() {
            for &k2 in &collidables[i + 1..] {
                let (Some(e1), Some(e2)) = (self.entities.get(k1), self.entities.get(k2)) else {
                    continue;
                };

                // No handler, no need to check this pair
                let Some(handler) = self.find_handler(e1.entity_type(), e2.entity_type()) else {
                    continue;
                };
                if !self.needs_manual_check(e1, e2) || e1.ignores(e2) {
                    continue;
                }

                match e1.overlapping_hit_boxes(e2) {
                    Some((box1, box2)) => self.collision_begin_for(handler, k1, k2, box1, box2, false),
                    None => self.collision_end_for(k1, k2, false),
                }
            }
        }

        self.collidables = collidables;
    }

    fn notify_collisions(&mut self) {
        let tick = self.tick;
        let log_collisions = self.log_collisions;
        let entities = &self.entities;
        let handlers = &mut self.handlers;
        let lookup = &mut self.pair_lookup;

        self.pairs.retain(|_, pair| {
            let index = pair_index(pair.a(), pair.b());
            let alive = match (entities.get(pair.a()), entities.get(pair.b()), handlers.get_mut(pair.handler())) {
                (Some(a), Some(b), Some(handler)) if a.is_collidable() && b.is_collidable() => Some((a, b, handler)),
                _ => None,
            };

            // No longer qualifies: drop without an end notification
            let Some((a, b, handler)) = alive else {
                lookup.remove(&index);
                return false;
            };

            let keep = match pair.advance(tick) {
                PairEvent::Pending => true,
                PairEvent::Begin => {
                    handler.begin(a, b);
                    true
                }
                PairEvent::Collision => {
                    handler.collision(a, b);
                    true
                }
                PairEvent::End => {
                    handler.end(a, b);
                    false
                }
                PairEvent::BeginEnd => {
                    handler.begin(a, b);
                    handler.end(a, b);
                    false
                }
            };

            if !keep {
                if log_collisions {
                    log::debug!("Collision ended on tick {}: {} - {}", tick, a.entity_type(), b.entity_type());
                }
                lookup.remove(&index);
            }
            keep
        });
    }

    // ==================== Queries ====================

    /// Closest entity hit by the segment from `start` to `end` (pixels)
    ///
    /// Sensors and raycast-ignored entities are skipped. A ray starting inside
    /// a fixture hits it at the start point.
    pub fn raycast(&self, start: Vec2, end: Vec2) -> RaycastResult {
        let p1 = self.units.to_point(start);
        let p2 = self.units.to_point(end);
        let mut closest: Option<(FixtureKey, Vec2)> = None;

        self.world.ray_cast(p1, p2, |fixture, point, _normal, fraction| {
            let sensor = self.world.fixture(fixture).map_or(false, Fixture::is_sensor);
            let ignored = self
                .fixture_owners
                .get(&fixture)
                .and_then(|owner| self.entities.get(owner.entity))
                .and_then(Entity::physics)
                .map_or(false, PhysicsComponent::is_raycast_ignored);
            if sensor || ignored {
                return -1.0;
            }
            closest = Some((fixture, point));
            fraction
        });

        match closest {
            Some((fixture, point)) => RaycastResult {
                entity: self.fixture_owners.get(&fixture).map(|owner| owner.entity),
                point: Some(self.units.to_pixel_point(point)),
            },
            None => RaycastResult::NONE,
        }
    }

    // ==================== Joints ====================

    fn body_of(&self, key: EntityKey) -> PhysicsResult<BodyKey> {
        self.entities
            .get(key)
            .and_then(Entity::physics)
            .ok_or_else(|| {
                PhysicsError::InvalidArgument(
                    "cannot create a joint: both entities must have a physics component".to_string(),
                )
            })?
            .body()
    }

    /// World anchor (physics units) of a point given relative to an entity's
    /// top-left corner in pixels
    fn anchor_point(&self, key: EntityKey, local: Vec2) -> PhysicsResult<Vec2> {
        let entity = self
            .entities
            .get(key)
            .ok_or_else(|| PhysicsError::InvalidArgument(format!("unknown entity {:?}", key)))?;
        Ok(self.units.to_point(entity.position + local))
    }

    fn body_pair(&self, a: BodyKey, b: BodyKey) -> PhysicsResult<(&Body, &Body)> {
        match (self.world.body(a), self.world.body(b)) {
            (Some(body_a), Some(body_b)) => Ok((body_a, body_b)),
            _ => Err(PhysicsError::UnknownBody),
        }
    }

    /// Pin two entities together at a shared point
    ///
    /// Anchors are given in pixels relative to each entity's top-left corner.
    pub fn add_revolute_joint(
        &mut self,
        e1: EntityKey,
        e2: EntityKey,
        local_anchor1: Vec2,
        local_anchor2: Vec2,
    ) -> PhysicsResult<JointKey> {
        let (a, b) = (self.body_of(e1)?, self.body_of(e2)?);
        let (anchor_a, anchor_b) = (self.anchor_point(e1, local_anchor1)?, self.anchor_point(e2, local_anchor2)?);
        let (body_a, body_b) = self.body_pair(a, b)?;

        let mut def = RevoluteJointDef::new(a, b);
        def.local_anchor_a = body_a.local_point(anchor_a);
        def.local_anchor_b = body_b.local_point(anchor_b);
        def.reference_angle = body_b.angle() - body_a.angle();
        self.world.create_joint(def)
    }

    /// Rope between the two entity centers, as long as they are apart now
    pub fn add_rope_joint(&mut self, e1: EntityKey, e2: EntityKey) -> PhysicsResult<JointKey> {
        let (c1, c2, length) = match (self.entities.get(e1), self.entities.get(e2)) {
            (Some(a), Some(b)) => (a.center_local(), b.center_local(), a.center().distance(b.center())),
            _ => {
                return Err(PhysicsError::InvalidArgument(
                    "cannot create a joint: unknown entity".to_string(),
                ))
            }
        };
        self.add_rope_joint_with(e1, e2, c1, c2, length)
    }

    /// Rope with explicit anchors and maximum length, all in pixels
    pub fn add_rope_joint_with(
        &mut self,
        e1: EntityKey,
        e2: EntityKey,
        local_anchor1: Vec2,
        local_anchor2: Vec2,
        length: f32,
    ) -> PhysicsResult<JointKey> {
        let (a, b) = (self.body_of(e1)?, self.body_of(e2)?);
        let (anchor_a, anchor_b) = (self.anchor_point(e1, local_anchor1)?, self.anchor_point(e2, local_anchor2)?);
        let (body_a, body_b) = self.body_pair(a, b)?;

        let def = RopeJointDef::new(a, b)
            .with_anchors(body_a.local_point(anchor_a), body_b.local_point(anchor_b))
            .with_max_length(self.units.to_meters(length));
        self.world.create_joint(def)
    }

    /// Spring keeping the anchors at their current distance
    ///
    /// A zero frequency makes the joint rigid.
    pub fn add_distance_joint(
        &mut self,
        e1: EntityKey,
        e2: EntityKey,
        local_anchor1: Vec2,
        local_anchor2: Vec2,
        frequency_hz: f32,
        damping_ratio: f32,
    ) -> PhysicsResult<JointKey> {
        let (a, b) = (self.body_of(e1)?, self.body_of(e2)?);
        let (anchor_a, anchor_b) = (self.anchor_point(e1, local_anchor1)?, self.anchor_point(e2, local_anchor2)?);
        let (body_a, body_b) = self.body_pair(a, b)?;

        let def = DistanceJointDef::initialize((a, body_a), (b, body_b), anchor_a, anchor_b)
            .with_spring(frequency_hz, damping_ratio);
        self.world.create_joint(def)
    }

    pub fn remove_joint(&mut self, joint: JointKey) -> PhysicsResult<()> {
        self.world.destroy_joint(joint)
    }

    // ==================== Particles ====================

    /// Fill a hit box shape with particles; `position` is the hit box's
    /// top-left corner in pixels
    pub fn add_particles(
        &mut self,
        hit_box: &HitBox,
        position: Vec2,
        flags: ParticleFlags,
        color: ParticleColor,
    ) -> PhysicsResult<ParticleGroupKey> {
        if hit_box.shape().is_chain() {
            return Err(PhysicsError::InvalidArgument(
                "particles cannot fill a chain".to_string(),
            ));
        }

        let center_local = hit_box.bounds().center();
        let shape = hit_box.to_physics_shape(center_local, &self.units)?;
        let def = ParticleGroupDef::new(shape)
            .with_flags(flags)
            .with_color(color)
            .with_position(self.units.to_point(position + center_local - hit_box.origin()));
        self.world.create_particle_group(&def)
    }

    pub fn particle_count(&self) -> usize {
        self.world.particles().particle_count()
    }

    /// Particle positions in pixels
    pub fn particle_positions(&self) -> Vec<Vec2> {
        self.world
            .particles()
            .positions()
            .iter()
            .map(|p| self.units.to_pixel_point(*p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hitbox::BoundingShape;
    use crate::physics_component::SensorHandler;
    use kinetic2d_physics::BodyDef;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    const DT: f32 = 1.0 / 60.0;

    fn physics_world() -> PhysicsWorld {
        PhysicsWorld::new(600.0, 50.0)
    }

    fn square(entity_type: &str, x: f32, y: f32, size: f32) -> Entity {
        Entity::new(entity_type)
            .at(x, y)
            .with_hit_box(HitBox::new("body", BoundingShape::rectangle(size, size)))
    }

    #[derive(Default)]
    struct Counts {
        hit_box: Cell<u32>,
        begin: Cell<u32>,
        collision: Cell<u32>,
        end: Cell<u32>,
    }

    fn counting_handler(a: &str, b: &str, counts: &Rc<Counts>) -> CollisionHandler {
        let (c1, c2, c3, c4) = (counts.clone(), counts.clone(), counts.clone(), counts.clone());
        CollisionHandler::new(a, b)
            .on_hit_box_trigger(move |_, _, _, _| c1.hit_box.set(c1.hit_box.get() + 1))
            .on_collision_begin(move |_, _| c2.begin.set(c2.begin.get() + 1))
            .on_collision(move |_, _| c3.collision.set(c3.collision.get() + 1))
            .on_collision_end(move |_, _| c4.end.set(c4.end.get() + 1))
    }

    fn counts(c: &Counts) -> (u32, u32, u32, u32) {
        (c.hit_box.get(), c.begin.get(), c.collision.get(), c.end.get())
    }

    #[test]
    fn test_new_world_is_empty() {
        let world = physics_world();
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.world().body_count(), 0);
        assert_eq!(world.tick(), 0);
    }

    #[test]
    fn test_set_gravity_in_pixels() {
        let mut world = physics_world();
        world.set_gravity(50.0, 10.0);
        let g = world.world().gravity();
        assert!((g.x - 1.0).abs() < 1e-6 && (g.y + 0.2).abs() < 1e-6);
        let g = world.gravity();
        assert!((g.x - 50.0).abs() < 1e-4 && (g.y - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_entities_with_physics_get_bodies() {
        let mut world = physics_world();
        let plain = world.add_entity(square("wall", 0.0, 0.0, 10.0)).unwrap();
        let a = world
            .add_entity(square("crate", 100.0, 100.0, 50.0).with_physics(PhysicsComponent::new()))
            .unwrap();
        assert_eq!(world.world().body_count(), 1);

        let body = world.entity(a).unwrap().physics().unwrap().body().unwrap();
        assert_eq!(world.entity_of_body(body), Some(a));
        // Body origin sits at the entity center: (125, 125) px
        assert_eq!(world.world().body(body).unwrap().position(), Vec2::new(2.5, 9.5));

        world.remove_entity(a);
        assert_eq!(world.world().body_count(), 0);
        assert!(world.entity(plain).is_some());
    }

    #[test]
    fn test_body_placed_from_entity_not_def() {
        let mut world = physics_world();
        let def = BodyDef::new(BodyType::Dynamic)
            .with_position(Vec2::new(5.0, 5.0))
            .with_angle(1.0);
        let a = world
            .add_entity(
                square("crate", 100.0, 100.0, 50.0)
                    .with_rotation(90.0)
                    .with_physics(PhysicsComponent::new().with_body_def(def)),
            )
            .unwrap();
        let body = world.entity(a).unwrap().physics().unwrap().body().unwrap();
        let body = world.world().body(body).unwrap();
        assert_eq!(body.position(), Vec2::new(2.5, 9.5));
        assert!((body.angle() + std::f32::consts::FRAC_PI_2).abs() < 1e-5);

        // An entity at the origin keeps its body there too
        let b = world
            .add_entity(
                Entity::new("marker")
                    .with_hit_box(HitBox::with_origin("body", Vec2::new(-10.0, 590.0), BoundingShape::rectangle(20.0, 20.0)))
                    .with_physics(PhysicsComponent::new()),
            )
            .unwrap();
        let body = world.entity(b).unwrap().physics().unwrap().body().unwrap();
        assert_eq!(world.world().body(body).unwrap().position(), Vec2::ZERO);
        assert_eq!(world.world().body(body).unwrap().angle(), 0.0);
    }

    #[test]
    fn test_dynamic_chain_is_rejected() {
        let mut world = physics_world();
        let chain = BoundingShape::chain(&[Vec2::ZERO, Vec2::new(100.0, 0.0)]).unwrap();
        let entity = Entity::new("ground")
            .with_hit_box(HitBox::new("line", chain.clone()))
            .with_physics(PhysicsComponent::new().with_body_type(BodyType::Dynamic));
        assert!(matches!(world.add_entity(entity), Err(PhysicsError::InvalidArgument(_))));
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.world().body_count(), 0);

        let entity = Entity::new("ground")
            .with_hit_box(HitBox::new("line", chain))
            .with_physics(PhysicsComponent::new());
        assert!(world.add_entity(entity).is_ok());
    }

    #[test]
    fn test_invalid_hit_box_is_skipped() {
        let mut world = physics_world();
        let entity = square("crate", 0.0, 0.0, 20.0)
            .with_hit_box(HitBox::new("broken", BoundingShape::rectangle(0.0, 10.0)))
            .with_physics(PhysicsComponent::new());
        let key = world.add_entity(entity).unwrap();
        let body = world.entity(key).unwrap().physics().unwrap().body().unwrap();
        assert_eq!(world.world().body(body).unwrap().fixtures().len(), 1);
    }

    #[test]
    fn test_on_initialized_runs_with_body() {
        let mut world = physics_world();
        let entity = square("ball", 0.0, 0.0, 10.0).with_physics(
            PhysicsComponent::new()
                .with_body_type(BodyType::Dynamic)
                .on_initialized(|body, units| body.set_linear_velocity(units.to_vector(Vec2::new(100.0, 0.0)))),
        );
        let key = world.add_entity(entity).unwrap();
        let v = world.physics(key).unwrap().linear_velocity().unwrap();
        assert!((v.x - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_physics_without_component_is_not_initialized() {
        let mut world = physics_world();
        let key = world.add_entity(square("wall", 0.0, 0.0, 10.0)).unwrap();
        assert!(matches!(world.physics(key), Err(PhysicsError::NotInitialized(_))));
    }

    #[test]
    fn test_dynamic_body_falls_down_the_screen() {
        let mut world = physics_world();
        let key = world
            .add_entity(square("ball", 100.0, 100.0, 20.0).with_physics(PhysicsComponent::new().with_body_type(BodyType::Dynamic)))
            .unwrap();
        for _ in 0..30 {
            world.update(DT);
        }
        let entity = world.entity(key).unwrap();
        assert!(entity.position.y > 110.0);
        assert!((entity.position.x - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_velocity_helpers_use_pixels() {
        let mut world = physics_world();
        world.set_gravity(0.0, 0.0);
        let key = world
            .add_entity(square("ship", 0.0, 300.0, 20.0).with_physics(PhysicsComponent::new().with_body_type(BodyType::Kinematic)))
            .unwrap();
        world.physics(key).unwrap().set_linear_velocity(60.0, 0.0).unwrap();
        for _ in 0..60 {
            world.update(DT);
        }
        let x = world.entity(key).unwrap().position.x;
        assert!((x - 60.0).abs() < 0.5, "moved to {}", x);
    }

    #[test]
    fn test_overwrite_position_and_angle() {
        let mut world = physics_world();
        let key = world
            .add_entity(square("crate", 0.0, 0.0, 50.0).with_physics(PhysicsComponent::new().with_body_type(BodyType::Dynamic)))
            .unwrap();
        {
            let mut physics = world.physics(key).unwrap();
            physics.overwrite_position(Vec2::new(200.0, 100.0)).unwrap();
            physics.overwrite_angle(90.0).unwrap();
        }
        let body = world.entity(key).unwrap().physics().unwrap().body().unwrap();
        let body = world.world().body(body).unwrap();
        assert_eq!(body.position(), Vec2::new(4.5, 9.5));
        assert!((body.angle() + std::f32::consts::FRAC_PI_2).abs() < 1e-5);
        assert_eq!(world.entity(key).unwrap().position, Vec2::new(200.0, 100.0));
    }

    #[test]
    fn test_manual_collision_tick_offsets() {
        let mut world = physics_world();
        let counts = Rc::new(Counts::default());
        world.add_collision_handler(counting_handler("a", "b", &counts));
        let a = world.add_entity(square("a", 0.0, 0.0, 20.0)).unwrap();
        world.add_entity(square("b", 10.0, 10.0, 20.0)).unwrap();

        world.update(DT);
        assert_eq!(self::counts(&counts), (1, 0, 0, 0));
        world.update(DT);
        assert_eq!(self::counts(&counts), (1, 1, 0, 0));
        world.update(DT);
        world.update(DT);
        assert_eq!(self::counts(&counts), (1, 1, 2, 0));

        world.entity_mut(a).unwrap().position = Vec2::new(-100.0, 0.0);
        world.update(DT);
        assert_eq!(self::counts(&counts), (1, 1, 2, 1));
        assert_eq!(world.collision_pairs().count(), 0);

        world.update(DT);
        assert_eq!(self::counts(&counts), (1, 1, 2, 1));
    }

    #[test]
    fn test_handler_arguments_follow_registration_order() {
        let mut world = physics_world();
        let order = Rc::new(RefCell::new(Vec::new()));
        let o = order.clone();
        world.add_collision_handler(CollisionHandler::new("player", "coin").on_hit_box_trigger(
            move |a, b, box_a, box_b| {
                o.borrow_mut().push((
                    a.entity_type().to_string(),
                    b.entity_type().to_string(),
                    box_a.name().to_string(),
                    box_b.name().to_string(),
                ));
            },
        ));
        // Coin registered first so it is the first entity of the pair
        world
            .add_entity(Entity::new("coin").with_hit_box(HitBox::new("coin_box", BoundingShape::circle(5.0))))
            .unwrap();
        world
            .add_entity(Entity::new("player").with_hit_box(HitBox::new("player_box", BoundingShape::rectangle(8.0, 8.0))))
            .unwrap();
        world.update(DT);

        let order = order.borrow();
        assert_eq!(order.len(), 1);
        assert_eq!(
            order[0],
            ("player".into(), "coin".into(), "player_box".into(), "coin_box".into())
        );
    }

    #[test]
    fn test_ignored_types_skip_manual_check() {
        let mut world = physics_world();
        let counts = Rc::new(Counts::default());
        world.add_collision_handler(counting_handler("a", "b", &counts));
        world.add_entity(square("a", 0.0, 0.0, 20.0).with_ignored_type("b")).unwrap();
        world.add_entity(square("b", 5.0, 5.0, 20.0)).unwrap();
        world.update(DT);
        world.update(DT);
        assert_eq!(self::counts(&counts), (0, 0, 0, 0));
    }

    #[test]
    fn test_inactive_entity_drops_pair_without_end() {
        let mut world = physics_world();
        let counts = Rc::new(Counts::default());
        world.add_collision_handler(counting_handler("a", "b", &counts));
        let a = world.add_entity(square("a", 0.0, 0.0, 20.0)).unwrap();
        world.add_entity(square("b", 5.0, 5.0, 20.0)).unwrap();
        world.update(DT);
        world.update(DT);
        assert_eq!(self::counts(&counts), (1, 1, 0, 0));

        world.entity_mut(a).unwrap().set_collidable(false);
        world.update(DT);
        assert_eq!(self::counts(&counts), (1, 1, 0, 0));
        assert_eq!(world.collision_pairs().count(), 0);
    }

    #[test]
    fn test_removed_entity_drops_pair() {
        let mut world = physics_world();
        let counts = Rc::new(Counts::default());
        world.add_collision_handler(counting_handler("a", "b", &counts));
        let a = world.add_entity(square("a", 0.0, 0.0, 20.0)).unwrap();
        let b = world.add_entity(square("b", 5.0, 5.0, 20.0)).unwrap();
        world.update(DT);
        assert!(world.is_colliding(a, b));

        world.remove_entity(b);
        world.update(DT);
        assert!(!world.is_colliding(a, b));
        assert_eq!(self::counts(&counts).3, 0);
    }

    #[test]
    fn test_removed_handler_drops_pairs() {
        let mut world = physics_world();
        let counts = Rc::new(Counts::default());
        let handler = world.add_collision_handler(counting_handler("a", "b", &counts));
        world.add_entity(square("a", 0.0, 0.0, 20.0)).unwrap();
        world.add_entity(square("b", 5.0, 5.0, 20.0)).unwrap();
        world.update(DT);
        assert!(world.remove_collision_handler(handler).is_some());
        world.update(DT);
        assert_eq!(world.collision_pairs().count(), 0);
        assert_eq!(self::counts(&counts), (1, 0, 0, 0));
    }

    #[test]
    fn test_clear_keeps_handlers() {
        let mut world = physics_world();
        let counts = Rc::new(Counts::default());
        world.add_collision_handler(counting_handler("a", "b", &counts));
        world.add_entity(square("a", 0.0, 0.0, 20.0).with_physics(PhysicsComponent::new())).unwrap();
        world.add_entity(square("b", 5.0, 5.0, 20.0)).unwrap();
        world.update(DT);

        world.clear();
        assert_eq!(world.entity_count(), 0);
        assert_eq!(world.world().body_count(), 0);
        assert_eq!(world.collision_pairs().count(), 0);
        assert_eq!(world.handler_count(), 1);

        world.clear_collision_handlers();
        assert_eq!(world.handler_count(), 0);
    }

    #[test]
    fn test_engine_contact_drives_collision() {
        let mut world = physics_world();
        let counts = Rc::new(Counts::default());
        world.add_collision_handler(counting_handler("ball", "ground", &counts));
        let ground = world
            .add_entity(
                Entity::new("ground")
                    .at(0.0, 500.0)
                    .with_hit_box(HitBox::new("floor", BoundingShape::rectangle(800.0, 50.0)))
                    .with_physics(PhysicsComponent::new()),
            )
            .unwrap();
        let ball = world
            .add_entity(
                square("ball", 390.0, 470.0, 20.0)
                    .with_physics(PhysicsComponent::new().with_body_type(BodyType::Dynamic)),
            )
            .unwrap();

        for _ in 0..60 {
            world.update(DT);
        }
        let (hit_box, begin, collision, _) = self::counts(&counts);
        assert!(hit_box >= 1);
        assert_eq!(begin, hit_box);
        assert!(collision > 10);
        assert!(world.is_colliding(ball, ground));
        assert!(world.entity(ball).unwrap().position.y < 482.0);
    }

    /// A ball resting on the ground with a tracked ("ball", "ground") pair
    fn resting_ball(world: &mut PhysicsWorld, counts: &Rc<Counts>) -> (EntityKey, EntityKey) {
        world.add_collision_handler(counting_handler("ball", "ground", counts));
        let ground = world
            .add_entity(
                Entity::new("ground")
                    .at(0.0, 500.0)
                    .with_hit_box(HitBox::new("floor", BoundingShape::rectangle(800.0, 50.0)))
                    .with_physics(PhysicsComponent::new()),
            )
            .unwrap();
        let ball = world
            .add_entity(
                square("ball", 390.0, 480.0, 20.0)
                    .with_physics(PhysicsComponent::new().with_body_type(BodyType::Dynamic)),
            )
            .unwrap();
        for _ in 0..30 {
            world.update(DT);
        }
        assert!(world.is_colliding(ball, ground));
        (ball, ground)
    }

    fn body_of(world: &PhysicsWorld, key: EntityKey) -> BodyKey {
        world.entity(key).unwrap().physics().unwrap().body().unwrap()
    }

    /// Runs a few ticks and checks the pair ended exactly once and stays gone
    fn assert_ended_once(world: &mut PhysicsWorld, counts: &Counts, ball: EntityKey, ground: EntityKey) {
        let ends = counts.end.get();
        world.update(DT);
        assert_eq!(counts.end.get(), ends + 1);
        let collisions = counts.collision.get();
        for _ in 0..30 {
            world.update(DT);
        }
        assert_eq!(counts.end.get(), ends + 1);
        assert_eq!(counts.collision.get(), collisions);
        assert!(!world.is_colliding(ball, ground));
        assert_eq!(world.collision_pairs().count(), 0);
    }

    #[test]
    fn test_body_type_change_ends_collision() {
        let mut world = physics_world();
        let counts = Rc::new(Counts::default());
        let (ball, ground) = resting_ball(&mut world, &counts);
        let body = body_of(&world, ball);
        world.world_mut().set_body_type(body, BodyType::Static).unwrap();
        assert_ended_once(&mut world, &counts, ball, ground);
    }

    #[test]
    fn test_destroyed_fixture_ends_collision() {
        let mut world = physics_world();
        let counts = Rc::new(Counts::default());
        let (ball, ground) = resting_ball(&mut world, &counts);
        let body = body_of(&world, ball);
        let fixture = world.world().body(body).unwrap().fixtures()[0];
        world.world_mut().destroy_fixture(fixture).unwrap();
        assert_ended_once(&mut world, &counts, ball, ground);
    }

    #[test]
    fn test_deactivated_body_ends_collision() {
        let mut world = physics_world();
        let counts = Rc::new(Counts::default());
        let (ball, ground) = resting_ball(&mut world, &counts);
        world
            .entity_mut(ball)
            .and_then(Entity::physics_mut)
            .unwrap()
            .body_def_mut()
            .active = false;
        assert_ended_once(&mut world, &counts, ball, ground);
    }

    #[test]
    fn test_recreated_contact_ends_on_separation() {
        let mut world = physics_world();
        let counts = Rc::new(Counts::default());
        let (ball, ground) = resting_ball(&mut world, &counts);
        let body = body_of(&world, ball);

        // Contact is torn down and rebuilt next step; the pair carries on
        world.world_mut().set_body_type(body, BodyType::Kinematic).unwrap();
        world.world_mut().set_body_type(body, BodyType::Dynamic).unwrap();
        for _ in 0..10 {
            world.update(DT);
        }
        assert!(world.is_colliding(ball, ground));
        assert_eq!(counts.end.get(), 0);

        world.physics(ball).unwrap().overwrite_position(Vec2::new(390.0, 100.0)).unwrap();
        world.update(DT);
        world.update(DT);
        assert_eq!(counts.end.get(), 1);
        assert!(!world.is_colliding(ball, ground));
    }

    #[test]
    fn test_sensor_reports_entities() {
        let mut world = physics_world();
        let entered = Rc::new(RefCell::new(Vec::new()));
        let e = entered.clone();
        let sensor = SensorHandler::new()
            .on_collision_begin(move |other| e.borrow_mut().push(other.entity_type().to_string()));
        world
            .add_entity(
                square("zone", 0.0, 400.0, 10.0).with_physics(PhysicsComponent::new().with_sensor(
                    HitBox::with_origin("area", Vec2::new(0.0, -200.0), BoundingShape::rectangle(200.0, 200.0)),
                    sensor,
                )),
            )
            .unwrap();
        world
            .add_entity(
                square("rock", 80.0, 100.0, 10.0)
                    .with_physics(PhysicsComponent::new().with_body_type(BodyType::Dynamic)),
            )
            .unwrap();

        for _ in 0..60 {
            world.update(DT);
        }
        assert_eq!(entered.borrow().first().map(String::as_str), Some("rock"));
    }

    #[test]
    fn test_raycast_skips_ignored_entities() {
        let mut world = physics_world();
        let near = world
            .add_entity(square("wall", 100.0, 290.0, 20.0).with_physics(PhysicsComponent::new().with_raycast_ignored(true)))
            .unwrap();
        let far = world
            .add_entity(square("wall", 200.0, 290.0, 20.0).with_physics(PhysicsComponent::new()))
            .unwrap();

        let result = world.raycast(Vec2::new(0.0, 300.0), Vec2::new(400.0, 300.0));
        assert_eq!(result.entity, Some(far));
        let point = result.point.unwrap();
        assert!((point.x - 200.0).abs() < 0.1);
        assert!((point.y - 300.0).abs() < 0.1);
        assert_ne!(result.entity, Some(near));
    }

    #[test]
    fn test_raycast_empty_world() {
        let world = physics_world();
        assert_eq!(world.raycast(Vec2::ZERO, Vec2::new(100.0, 100.0)), RaycastResult::NONE);
    }

    #[test]
    fn test_joints_require_physics() {
        let mut world = physics_world();
        let a = world
            .add_entity(square("a", 0.0, 0.0, 10.0).with_physics(PhysicsComponent::new().with_body_type(BodyType::Dynamic)))
            .unwrap();
        let b = world.add_entity(square("b", 50.0, 0.0, 10.0)).unwrap();
        assert!(matches!(
            world.add_revolute_joint(a, b, Vec2::ZERO, Vec2::ZERO),
            Err(PhysicsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_rope_joint_limits_distance() {
        let mut world = physics_world();
        let anchor = world
            .add_entity(square("anchor", 300.0, 100.0, 10.0).with_physics(PhysicsComponent::new()))
            .unwrap();
        let weight = world
            .add_entity(square("weight", 300.0, 150.0, 10.0).with_physics(PhysicsComponent::new().with_body_type(BodyType::Dynamic)))
            .unwrap();
        let joint = world.add_rope_joint(anchor, weight).unwrap();
        assert_eq!(world.world().joint_count(), 1);

        for _ in 0..120 {
            world.update(DT);
        }
        let distance = world
            .entity(anchor)
            .unwrap()
            .center()
            .distance(world.entity(weight).unwrap().center());
        assert!(distance < 52.0, "rope stretched to {}", distance);

        world.remove_joint(joint).unwrap();
        assert_eq!(world.world().joint_count(), 0);
    }

    #[test]
    fn test_revolute_and_distance_joints() {
        let mut world = physics_world();
        let def = BodyDef::new(BodyType::Dynamic);
        let a = world
            .add_entity(square("a", 100.0, 100.0, 20.0).with_physics(PhysicsComponent::new().with_body_def(def.clone())))
            .unwrap();
        let b = world
            .add_entity(square("b", 140.0, 100.0, 20.0).with_physics(PhysicsComponent::new().with_body_def(def)))
            .unwrap();
        world
            .add_revolute_joint(a, b, Vec2::new(30.0, 10.0), Vec2::new(-10.0, 10.0))
            .unwrap();
        world
            .add_distance_joint(a, b, Vec2::new(10.0, 10.0), Vec2::new(10.0, 10.0), 0.0, 0.0)
            .unwrap();
        assert_eq!(world.world().joint_count(), 2);

        world.remove_entity(b);
        assert_eq!(world.world().joint_count(), 0);
    }

    #[test]
    fn test_particles_in_pixels() {
        let mut world = physics_world();
        let group = world
            .add_particles(
                &HitBox::new("water", BoundingShape::rectangle(100.0, 100.0)),
                Vec2::new(100.0, 100.0),
                ParticleFlags::WATER,
                ParticleColor::new(0, 0, 255, 255),
            )
            .unwrap();
        assert!(world.particle_count() > 0);
        assert!(world.world().particles().group(group).is_some());

        for p in world.particle_positions() {
            assert!(p.x >= 99.0 && p.x <= 201.0, "x = {}", p.x);
            assert!(p.y >= 99.0 && p.y <= 201.0, "y = {}", p.y);
        }

        let chain = HitBox::new("c", BoundingShape::chain(&[Vec2::ZERO, Vec2::new(1.0, 1.0)]).unwrap());
        assert!(world
            .add_particles(&chain, Vec2::ZERO, ParticleFlags::WATER, ParticleColor::WHITE)
            .is_err());
    }
}
