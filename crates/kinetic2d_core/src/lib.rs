//! Application layer for kinetic2d
//!
//! This crate connects application entities to the physics engine, working in
//! pixels with the y axis pointing down:
//!
//! - [`UnitConverter`] - Pixel/meter and screen/world coordinate conversion
//! - [`HitBox`] and [`BoundingShape`] - Named collision shapes in entity space
//! - [`Entity`] - A typed object with hit boxes and optional physics
//! - [`PhysicsComponent`] - Body and fixture definitions plus sensors
//! - [`PhysicsBody`] - Pixel-unit view of a live body
//! - [`CollisionHandler`] - Callbacks for collisions between two entity types
//! - [`PhysicsWorld`] - Owns entities and the engine world and dispatches collisions
//! - [`RaycastResult`] - Closest entity hit by a ray
//! - [`Scene`] - Loadable/saveable list of entity templates

mod units;
mod hitbox;
mod entity;
mod physics_component;
mod collision;
mod raycast;
mod physics_world;
mod scene;

pub use units::{UnitConverter, DEFAULT_PIXELS_PER_METER};
pub use hitbox::{Bounds, BoundingShape, HitBox, ShapeTag};
pub use entity::{Entity, EntityKey, EntityType};
pub use physics_component::{PhysicsBody, PhysicsComponent, Sensor, SensorHandler};
pub use collision::{CollisionHandler, CollisionHandlerKey, CollisionPair, CollisionPairKey};
pub use raycast::RaycastResult;
pub use physics_world::{PhysicsWorld, DEFAULT_POSITION_ITERATIONS, DEFAULT_VELOCITY_ITERATIONS};
pub use scene::{BodyTemplate, EntityTemplate, Scene, SceneLoadError, SceneSaveError};

// Re-export commonly used types from kinetic2d_math for convenience
pub use kinetic2d_math::Vec2;

// Re-export physics types for convenient access through kinetic2d_core
pub use kinetic2d_physics::{
    BodyDef, BodyType, FixtureDef, JointKey, ParticleColor, ParticleFlags, ParticleGroupKey,
    PhysicsConfig, PhysicsError, PhysicsMaterial, PhysicsResult,
};
