//! Particle groups

use kinetic2d_math::Vec2;
use slotmap::new_key_type;

use super::{ParticleColor, ParticleFlags};
use crate::shapes::Shape;

new_key_type! {
    /// Handle to a particle group; stale after the group is destroyed
    pub struct ParticleGroupKey;
}

/// Definition of a group of particles filling a shape
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleGroupDef {
    /// Flags given to every particle in the group
    pub flags: ParticleFlags,
    /// Shape to fill, in the group's local frame; `None` creates an empty group
    pub shape: Option<Shape>,
    pub position: Vec2,
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub color: ParticleColor,
    /// Strength of the spring and elastic connections
    pub strength: f32,
    /// Remove the group once its last particle is gone
    pub destroy_automatically: bool,
}

impl Default for ParticleGroupDef {
    fn default() -> Self {
        Self {
            flags: ParticleFlags::WATER,
            shape: None,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            color: ParticleColor::WHITE,
            strength: 1.0,
            destroy_automatically: true,
        }
    }
}

impl ParticleGroupDef {
    pub fn new(shape: impl Into<Shape>) -> Self {
        Self {
            shape: Some(shape.into()),
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: ParticleFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_linear_velocity(mut self, velocity: Vec2) -> Self {
        self.linear_velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, velocity: f32) -> Self {
        self.angular_velocity = velocity;
        self
    }

    pub fn with_color(mut self, color: ParticleColor) -> Self {
        self.color = color;
        self
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength;
        self
    }
}

/// A contiguous range of particles created together
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleGroup {
    pub(crate) first_index: usize,
    pub(crate) last_index: usize,
    pub(crate) flags: ParticleFlags,
    pub(crate) strength: f32,
    pub(crate) destroy_automatically: bool,
    pub(crate) to_be_destroyed: bool,
    pub user_data: u64,
}

impl ParticleGroup {
    pub(crate) fn new(first_index: usize, last_index: usize, def: &ParticleGroupDef) -> Self {
        Self {
            first_index,
            last_index,
            flags: def.flags,
            strength: def.strength,
            destroy_automatically: def.destroy_automatically,
            to_be_destroyed: false,
            user_data: 0,
        }
    }

    /// Index of the first particle
    pub fn first_index(&self) -> usize {
        self.first_index
    }

    pub fn particle_count(&self) -> usize {
        self.last_index - self.first_index
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.first_index..self.last_index).contains(&index)
    }

    pub fn flags(&self) -> ParticleFlags {
        self.flags
    }

    pub fn strength(&self) -> f32 {
        self.strength
    }
}

/// Aggregate motion of a group, computed on demand
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ParticleGroupStats {
    pub mass: f32,
    /// Rotational inertia about the center
    pub inertia: f32,
    pub center: Vec2,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
}
