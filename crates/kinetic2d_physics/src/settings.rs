//! Global tuning constants for the simulation
//!
//! Lengths are in meters, angles in radians, times in seconds. The engine is
//! tuned for moving objects between 0.1 and 10 meters.

use std::f32::consts::PI;

/// Maximum number of contact points between two convex shapes
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Maximum number of vertices on a convex polygon
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Fattens AABBs in the dynamic tree so proxies can move a small amount
/// without triggering a tree update
pub const AABB_EXTENSION: f32 = 0.1;

/// Predicts AABB movement from the body displacement
pub const AABB_MULTIPLIER: f32 = 2.0;

/// Collision and constraint tolerance, chosen to be numerically significant
/// but visually insignificant
pub const LINEAR_SLOP: f32 = 0.005;

/// Angular counterpart of [`LINEAR_SLOP`]
pub const ANGULAR_SLOP: f32 = 2.0 / 180.0 * PI;

/// Radius of the polygon/edge skin
pub const POLYGON_RADIUS: f32 = 2.0 * LINEAR_SLOP;

/// Maximum number of sub-steps per contact in continuous physics
pub const MAX_SUB_STEPS: u32 = 8;

/// Maximum number of contacts handled while solving one TOI impact
pub const MAX_TOI_CONTACTS: usize = 32;

/// Relative velocity below which collisions are treated as inelastic
pub const VELOCITY_THRESHOLD: f32 = 1.0;

/// Maximum linear position correction per constraint solve
pub const MAX_LINEAR_CORRECTION: f32 = 0.2;

/// Maximum angular position correction per constraint solve
pub const MAX_ANGULAR_CORRECTION: f32 = 8.0 / 180.0 * PI;

/// Maximum linear displacement of a body per step
pub const MAX_TRANSLATION: f32 = 2.0;
pub const MAX_TRANSLATION_SQUARED: f32 = MAX_TRANSLATION * MAX_TRANSLATION;

/// Maximum rotation of a body per step
pub const MAX_ROTATION: f32 = 0.5 * PI;
pub const MAX_ROTATION_SQUARED: f32 = MAX_ROTATION * MAX_ROTATION;

/// Fraction of overlap resolved per step
pub const BAUMGARTE: f32 = 0.2;

/// Stiffer overlap resolution used by time-of-impact sub-steps
pub const TOI_BAUMGARTE: f32 = 0.75;

/// Time a body must be still before it sleeps
pub const TIME_TO_SLEEP: f32 = 0.5;

/// Linear speed below which a body may sleep
pub const LINEAR_SLEEP_TOLERANCE: f32 = 0.01;

/// Angular speed below which a body may sleep
pub const ANGULAR_SLEEP_TOLERANCE: f32 = 2.0 / 180.0 * PI;

/// Particle spacing as a fraction of the particle diameter when filling shapes
pub const PARTICLE_STRIDE: f32 = 0.75;

/// Particle weight below which no pressure is applied
pub const MIN_PARTICLE_WEIGHT: f32 = 1.0;

/// Upper bound on particle weight used for pressure
pub const MAX_PARTICLE_WEIGHT: f32 = 5.0;

/// Smallest allocation made for particle buffers
pub const MIN_PARTICLE_BUFFER_CAPACITY: usize = 256;

/// Friction mixing law: geometric mean
#[inline]
pub fn mix_friction(friction1: f32, friction2: f32) -> f32 {
    (friction1 * friction2).sqrt()
}

/// Restitution mixing law: the bouncier surface wins
#[inline]
pub fn mix_restitution(restitution1: f32, restitution2: f32) -> f32 {
    restitution1.max(restitution2)
}
