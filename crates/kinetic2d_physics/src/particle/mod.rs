//! Particle simulation for liquids and granular materials
//!
//! Particles live in flat parallel buffers owned by [`ParticleSystem`].
//! Particles created together form a [`ParticleGroup`] occupying a contiguous
//! index range. Removal is deferred: destroyed particles are flagged as
//! zombies and compacted away at the start of the next step.

mod group;
mod solver;
mod system;

pub use group::{ParticleGroup, ParticleGroupDef, ParticleGroupKey, ParticleGroupStats};
pub use system::{ParticleSystem, ParticleSystemDef};
pub(crate) use solver::ParticleContext;

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use kinetic2d_math::Vec2;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Behaviour of a particle; water is the empty set
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ParticleFlags: u32 {
        /// Removed at the start of the next step
        const ZOMBIE = 1 << 1;
        /// Zero velocity, never moves
        const WALL = 1 << 2;
        /// Keeps its distance to neighbours it was created with
        const SPRING = 1 << 3;
        /// Keeps the shape of the triangles it was created in
        const ELASTIC = 1 << 4;
        /// Velocity is smoothed towards its neighbours
        const VISCOUS = 1 << 5;
        /// Pushed away from neighbours without pressure
        const POWDER = 1 << 6;
        /// Surface tension
        const TENSILE = 1 << 7;
        /// Exchanges color with touching color-mixing particles
        const COLOR_MIXING = 1 << 8;
    }
}

impl ParticleFlags {
    /// Plain liquid
    pub const WATER: Self = Self::empty();
}

/// RGBA color of a particle, laid out for direct upload to a renderer
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize)]
pub struct ParticleColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl ParticleColor {
    pub const WHITE: Self = Self::new(255, 255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Move both colors towards each other by `strength` (out of 256)
    pub(crate) fn mix(&mut self, other: &mut Self, strength: i32) {
        let mix = |a: &mut u8, b: &mut u8| {
            let d = (strength * (*b as i32 - *a as i32)) >> 8;
            *a = (*a as i32 + d).clamp(0, 255) as u8;
            *b = (*b as i32 - d).clamp(0, 255) as u8;
        };
        mix(&mut self.r, &mut other.r);
        mix(&mut self.g, &mut other.g);
        mix(&mut self.b, &mut other.b);
        mix(&mut self.a, &mut other.a);
    }
}

/// Definition of a single particle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleDef {
    pub flags: ParticleFlags,
    pub position: Vec2,
    pub velocity: Vec2,
    pub color: ParticleColor,
}

impl Default for ParticleDef {
    fn default() -> Self {
        Self {
            flags: ParticleFlags::WATER,
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            color: ParticleColor::WHITE,
        }
    }
}

impl ParticleDef {
    pub fn new(position: Vec2) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: ParticleFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_color(mut self, color: ParticleColor) -> Self {
        self.color = color;
        self
    }
}

/// Two particles closer than one diameter
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ParticleContact {
    pub index_a: usize,
    pub index_b: usize,
    pub flags: ParticleFlags,
    /// 1 at full overlap, 0 at one diameter apart
    pub weight: f32,
    /// From A to B
    pub normal: Vec2,
}

/// A particle closer than one diameter to a fixture
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ParticleBodyContact {
    pub index: usize,
    pub body: crate::body::BodyKey,
    pub weight: f32,
    /// Points from the fixture towards the particle, negated
    pub normal: Vec2,
    /// Effective mass of the particle-body pair
    pub mass: f32,
}

/// Spring connection created with a spring group
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ParticlePair {
    pub index_a: usize,
    pub index_b: usize,
    pub flags: ParticleFlags,
    pub strength: f32,
    /// Rest length
    pub distance: f32,
}

/// Elastic triangle created with an elastic group
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ParticleTriad {
    pub index_a: usize,
    pub index_b: usize,
    pub index_c: usize,
    pub flags: ParticleFlags,
    pub strength: f32,
    /// Rest positions relative to the triangle's centroid
    pub pa: Vec2,
    pub pb: Vec2,
    pub pc: Vec2,
}
