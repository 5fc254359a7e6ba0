//! 2D rigid-body physics for kinetic2d
//!
//! This crate provides the simulation core:
//! - Shapes (circles, convex polygons, edges, chains) and their mass properties
//! - Collision detection: dynamic AABB tree broad phase, narrow-phase
//!   manifolds, GJK distance and time of impact
//! - Rigid bodies, fixtures and collision filtering
//! - A sequential-impulse island solver with sleeping and continuous collision
//! - Joints (distance, revolute, rope, weld, mouse)
//! - A particle system for liquids and granular materials
//!
//! Lengths are in meters and the y axis points up.

pub mod body;
pub mod collision;
pub mod contact;
mod contact_manager;
mod contact_solver;
pub mod error;
pub mod filter;
pub mod fixture;
mod island;
pub mod joints;
pub mod listener;
pub mod material;
pub mod particle;
pub mod settings;
pub mod shapes;
mod step;
pub mod world;

// Re-export commonly used types
pub use body::{Body, BodyDef, BodyFlags, BodyKey, BodyType, ContactEdge, JointEdge};
pub use collision::{Aabb, Manifold, RayCastInput, RayCastOutput, WorldManifold};
pub use contact::{Contact, ContactKey};
pub use error::{PhysicsError, PhysicsResult};
pub use filter::Filter;
pub use fixture::{Fixture, FixtureDef, FixtureKey};
pub use joints::{
    DistanceJointDef, Joint, JointDef, JointKey, JointKind, MouseJointDef, RevoluteJointDef,
    RopeJointDef, WeldJointDef,
};
pub use listener::{ContactImpulse, ContactListener, NoopListener};
pub use material::PhysicsMaterial;
pub use particle::{
    ParticleColor, ParticleDef, ParticleFlags, ParticleGroup, ParticleGroupDef, ParticleGroupKey,
    ParticleGroupStats, ParticleSystem, ParticleSystemDef,
};
pub use shapes::{ChainShape, CircleShape, EdgeShape, MassData, PolygonShape, Shape, ShapeType};
pub use step::StepStats;
pub use world::{PhysicsConfig, World};
