//! Surface material properties for fixtures

use serde::{Deserialize, Serialize};
use crate::settings::{mix_friction, mix_restitution};

/// Surface material of a fixture
///
/// Materials define how fixtures interact during collisions, including
/// density (mass per square meter), friction (how much surfaces resist
/// sliding) and restitution (bounciness).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicsMaterial {
    /// Density in kg/m^2
    pub density: f32,
    /// Friction coefficient, usually in [0, 1]
    pub friction: f32,
    /// Restitution/bounciness (0.0 = no bounce, 1.0 = perfect bounce)
    pub restitution: f32,
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self {
            density: 0.0,
            friction: 0.2,
            restitution: 0.0,
        }
    }
}

impl PhysicsMaterial {
    /// Ice-like material: very low friction, slight bounce
    pub const ICE: Self = Self {
        density: 0.9,
        friction: 0.05,
        restitution: 0.1,
    };

    /// Rubber-like material: high friction, very bouncy
    pub const RUBBER: Self = Self {
        density: 1.1,
        friction: 0.9,
        restitution: 0.8,
    };

    /// Metal-like material: heavy, moderate friction and bounce
    pub const METAL: Self = Self {
        density: 7.8,
        friction: 0.3,
        restitution: 0.3,
    };

    /// Wood-like material: moderate friction, low bounce
    pub const WOOD: Self = Self {
        density: 0.7,
        friction: 0.5,
        restitution: 0.2,
    };

    /// Create a new material
    ///
    /// Density and friction are clamped to be non-negative, restitution to [0, 1].
    pub fn new(density: f32, friction: f32, restitution: f32) -> Self {
        Self {
            density: density.max(0.0),
            friction: friction.max(0.0),
            restitution: restitution.clamp(0.0, 1.0),
        }
    }

    /// Combine two materials for collision response
    ///
    /// Uses geometric mean for friction and maximum for restitution.
    /// Density does not combine; the result keeps `self.density`.
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            density: self.density,
            friction: mix_friction(self.friction, other.friction),
            restitution: mix_restitution(self.restitution, other.restitution),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_material() {
        let material = PhysicsMaterial::default();
        assert_eq!(material.density, 0.0);
        assert_eq!(material.friction, 0.2);
        assert_eq!(material.restitution, 0.0);
    }

    #[test]
    fn test_new_clamps_values() {
        let material = PhysicsMaterial::new(-1.0, -0.5, 1.5);
        assert_eq!(material.density, 0.0);
        assert_eq!(material.friction, 0.0);
        assert_eq!(material.restitution, 1.0);
    }

    #[test]
    fn test_combine_geometric_mean_friction() {
        let combined = PhysicsMaterial::ICE.combine(&PhysicsMaterial::RUBBER);
        let expected = (0.05_f32 * 0.9_f32).sqrt();
        assert!((combined.friction - expected).abs() < 0.0001);
    }

    #[test]
    fn test_combine_max_restitution() {
        let combined = PhysicsMaterial::METAL.combine(&PhysicsMaterial::RUBBER);
        assert_eq!(combined.restitution, 0.8);
    }

    #[test]
    fn test_combine_is_commutative() {
        let a = PhysicsMaterial::new(1.0, 0.3, 0.5);
        let b = PhysicsMaterial::new(2.0, 0.7, 0.2);
        let ab = a.combine(&b);
        let ba = b.combine(&a);
        assert!((ab.friction - ba.friction).abs() < 0.0001);
        assert_eq!(ab.restitution, ba.restitution);
    }
}
