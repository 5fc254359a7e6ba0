//! Rigid-body physics for an entity
//!
//! A [`PhysicsComponent`] carries the body and fixture definitions used when
//! the entity joins a [`PhysicsWorld`](crate::PhysicsWorld). Once the body
//! exists, [`PhysicsWorld::physics`](crate::PhysicsWorld::physics) hands out a
//! [`PhysicsBody`] view that works in pixel units.

use std::fmt;

use kinetic2d_math::Vec2;
use kinetic2d_physics::{
    Body, BodyDef, BodyKey, BodyType, CircleShape, FixtureDef, PhysicsError, PhysicsResult, World,
};

use crate::entity::Entity;
use crate::hitbox::HitBox;
use crate::units::UnitConverter;

type SensorCallback = Box<dyn FnMut(&Entity)>;
type InitCallback = Box<dyn FnOnce(&mut Body, &UnitConverter)>;

/// Callbacks for a sensor hit box
///
/// A sensor reports overlap with other entities' fixtures but never pushes
/// them.
#[derive(Default)]
pub struct SensorHandler {
    on_begin: Option<SensorCallback>,
    on_end: Option<SensorCallback>,
}

impl SensorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the entity that entered the sensor
    pub fn on_collision_begin(mut self, f: impl FnMut(&Entity) + 'static) -> Self {
        self.on_begin = Some(Box::new(f));
        self
    }

    /// Called with the entity that left the sensor
    pub fn on_collision_end(mut self, f: impl FnMut(&Entity) + 'static) -> Self {
        self.on_end = Some(Box::new(f));
        self
    }

    pub(crate) fn begin(&mut self, other: &Entity) {
        if let Some(f) = self.on_begin.as_mut() {
            f(other);
        }
    }

    pub(crate) fn end(&mut self, other: &Entity) {
        if let Some(f) = self.on_end.as_mut() {
            f(other);
        }
    }
}

impl fmt::Debug for SensorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorHandler")
            .field("on_begin", &self.on_begin.is_some())
            .field("on_end", &self.on_end.is_some())
            .finish()
    }
}

/// A sensor hit box and its handler
#[derive(Debug)]
pub struct Sensor {
    pub hit_box: HitBox,
    pub handler: SensorHandler,
}

/// Physics definition and runtime handle of an entity
pub struct PhysicsComponent {
    body_def: BodyDef,
    fixture_def: FixtureDef,
    sensors: Vec<Sensor>,
    raycast_ignored: bool,
    on_initialized: Vec<InitCallback>,
    body: Option<BodyKey>,
}

impl Default for PhysicsComponent {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsComponent {
    /// A static body with the default fixture material
    pub fn new() -> Self {
        Self {
            body_def: BodyDef::default(),
            fixture_def: FixtureDef::new(CircleShape::default()),
            sensors: Vec::new(),
            raycast_ignored: false,
            on_initialized: Vec::new(),
            body: None,
        }
    }

    pub fn with_body_type(mut self, body_type: BodyType) -> Self {
        self.body_def.body_type = body_type;
        self
    }

    /// Body definition in physics units
    ///
    /// A zero position or angle is replaced by the entity's own placement when
    /// the body is created.
    pub fn with_body_def(mut self, body_def: BodyDef) -> Self {
        self.body_def = body_def;
        self
    }

    /// Template for every hit box fixture; its shape is replaced per hit box
    pub fn with_fixture_def(mut self, fixture_def: FixtureDef) -> Self {
        self.fixture_def = fixture_def;
        self
    }

    pub fn with_sensor(mut self, hit_box: HitBox, handler: SensorHandler) -> Self {
        self.sensors.push(Sensor { hit_box, handler });
        self
    }

    /// Exclude this entity's fixtures from ray casts
    pub fn with_raycast_ignored(mut self, ignored: bool) -> Self {
        self.raycast_ignored = ignored;
        self
    }

    /// Run `f` once the body has been created
    ///
    /// This is the place to set initial velocities: the body does not exist
    /// before the entity joins a world.
    pub fn on_initialized(mut self, f: impl FnOnce(&mut Body, &UnitConverter) + 'static) -> Self {
        self.on_initialized.push(Box::new(f));
        self
    }

    pub fn body_def(&self) -> &BodyDef {
        &self.body_def
    }

    pub fn body_def_mut(&mut self) -> &mut BodyDef {
        &mut self.body_def
    }

    pub fn fixture_def(&self) -> &FixtureDef {
        &self.fixture_def
    }

    pub fn body_type(&self) -> BodyType {
        self.body_def.body_type
    }

    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    pub(crate) fn sensor_mut(&mut self, index: usize) -> Option<&mut Sensor> {
        self.sensors.get_mut(index)
    }

    pub fn is_raycast_ignored(&self) -> bool {
        self.raycast_ignored
    }

    pub fn set_raycast_ignored(&mut self, ignored: bool) {
        self.raycast_ignored = ignored;
    }

    pub fn is_initialized(&self) -> bool {
        self.body.is_some()
    }

    /// The engine body, once the entity has joined a world
    pub fn body(&self) -> PhysicsResult<BodyKey> {
        self.body.ok_or_else(|| {
            PhysicsError::NotInitialized(
                "the body does not exist yet; use on_initialized to configure it".to_string(),
            )
        })
    }

    pub(crate) fn attach(&mut self, body: BodyKey) {
        self.body = Some(body);
    }

    pub(crate) fn detach(&mut self) -> Option<BodyKey> {
        self.body.take()
    }

    pub(crate) fn take_init_callbacks(&mut self) -> Vec<InitCallback> {
        std::mem::take(&mut self.on_initialized)
    }
}

impl fmt::Debug for PhysicsComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicsComponent")
            .field("body_def", &self.body_def)
            .field("fixture_def", &self.fixture_def)
            .field("sensors", &self.sensors)
            .field("raycast_ignored", &self.raycast_ignored)
            .field("body", &self.body)
            .finish()
    }
}

/// Pixel-unit view of an entity's body
///
/// Velocities are in pixels per second with y pointing down, angular values
/// in clockwise degrees.
pub struct PhysicsBody<'a> {
    pub(crate) world: &'a mut World,
    pub(crate) entity: &'a mut Entity,
    pub(crate) body: BodyKey,
    pub(crate) units: UnitConverter,
}

impl<'a> PhysicsBody<'a> {
    pub fn key(&self) -> BodyKey {
        self.body
    }

    /// Raw engine body, in physics units
    pub fn body(&self) -> PhysicsResult<&Body> {
        self.world.body(self.body).ok_or(PhysicsError::UnknownBody)
    }

    pub fn body_mut(&mut self) -> PhysicsResult<&mut Body> {
        self.world.body_mut(self.body).ok_or(PhysicsError::UnknownBody)
    }

    pub fn linear_velocity(&self) -> PhysicsResult<Vec2> {
        Ok(self.units.to_pixel_vector(self.body()?.linear_velocity()))
    }

    pub fn set_linear_velocity(&mut self, vx: f32, vy: f32) -> PhysicsResult<()> {
        let v = self.units.to_vector(Vec2::new(vx, vy));
        let body = self.body_mut()?;
        body.set_linear_velocity(v);
        body.set_awake(true);
        Ok(())
    }

    pub fn angular_velocity(&self) -> PhysicsResult<f32> {
        Ok(self.units.to_degrees(self.body()?.angular_velocity()))
    }

    pub fn set_angular_velocity(&mut self, degrees_per_second: f32) -> PhysicsResult<()> {
        let w = self.units.to_radians(degrees_per_second);
        let body = self.body_mut()?;
        body.set_angular_velocity(w);
        body.set_awake(true);
        Ok(())
    }

    /// Apply an impulse (pixel units) at a point in pixel space
    pub fn apply_linear_impulse(&mut self, impulse: Vec2, point: Vec2, wake: bool) -> PhysicsResult<()> {
        let impulse = self.units.to_vector(impulse);
        let point = self.units.to_point(point);
        self.body_mut()?.apply_linear_impulse(impulse, point, wake);
        Ok(())
    }

    /// Apply a force (pixel units) at a point in pixel space
    pub fn apply_force(&mut self, force: Vec2, point: Vec2) -> PhysicsResult<()> {
        let force = self.units.to_vector(force);
        let point = self.units.to_point(point);
        self.body_mut()?.apply_force(force, point);
        Ok(())
    }

    pub fn apply_force_to_center(&mut self, force: Vec2) -> PhysicsResult<()> {
        let force = self.units.to_vector(force);
        self.body_mut()?.apply_force_to_center(force);
        Ok(())
    }

    /// Torque is passed through unchanged apart from the handedness flip
    pub fn apply_torque(&mut self, torque: f32) -> PhysicsResult<()> {
        self.body_mut()?.apply_torque(-torque);
        Ok(())
    }

    /// Teleport the entity so its top-left corner sits at `position` pixels
    pub fn overwrite_position(&mut self, position: Vec2) -> PhysicsResult<()> {
        let center = self.units.to_point(position + self.entity.center_local());
        let angle = self.body()?.angle();
        self.world.set_transform(self.body, center, angle)?;
        self.entity.position = position;
        Ok(())
    }

    /// Set the clockwise rotation in degrees
    pub fn overwrite_angle(&mut self, degrees: f32) -> PhysicsResult<()> {
        let position = self.body()?.position();
        self.world
            .set_transform(self.body, position, self.units.to_radians(degrees))?;
        self.entity.rotation = degrees;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_component_defaults() {
        let physics = PhysicsComponent::new();
        assert_eq!(physics.body_type(), BodyType::Static);
        assert!(!physics.is_raycast_ignored());
        assert!(!physics.is_initialized());
        assert!(physics.sensors().is_empty());
    }

    #[test]
    fn test_body_before_init_is_not_initialized() {
        let physics = PhysicsComponent::new().with_body_type(BodyType::Dynamic);
        match physics.body() {
            Err(PhysicsError::NotInitialized(msg)) => assert!(msg.contains("on_initialized")),
            other => panic!("expected NotInitialized, got {:?}", other),
        }
    }

    #[test]
    fn test_sensor_handler_calls_closures() {
        let begun = Rc::new(Cell::new(0));
        let ended = Rc::new(Cell::new(0));
        let (b, e) = (begun.clone(), ended.clone());
        let mut handler = SensorHandler::new()
            .on_collision_begin(move |_| b.set(b.get() + 1))
            .on_collision_end(move |_| e.set(e.get() + 1));

        let other = Entity::new("coin");
        handler.begin(&other);
        handler.begin(&other);
        handler.end(&other);
        assert_eq!(begun.get(), 2);
        assert_eq!(ended.get(), 1);

        // Missing callbacks are no-ops
        SensorHandler::new().begin(&other);
    }

    #[test]
    fn test_init_callbacks_are_taken_once() {
        let mut physics = PhysicsComponent::new()
            .on_initialized(|_, _| {})
            .on_initialized(|_, _| {});
        assert_eq!(physics.take_init_callbacks().len(), 2);
        assert!(physics.take_init_callbacks().is_empty());
    }
}
