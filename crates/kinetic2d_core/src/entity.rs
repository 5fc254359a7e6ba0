//! Entities known to the physics world
//!
//! An entity is a typed, optionally named object with a pixel-space position,
//! a set of hit boxes and, optionally, a [`PhysicsComponent`]. Entities
//! without a physics component still take part in collision handling through
//! hit box overlap checks.

use std::collections::HashSet;
use std::fmt;

use kinetic2d_math::Vec2;
use serde::{Serialize, Deserialize};
use slotmap::new_key_type;

use crate::hitbox::{Bounds, HitBox};
use crate::physics_component::PhysicsComponent;

new_key_type! {
    /// Handle to an entity registered with a [`PhysicsWorld`](crate::PhysicsWorld)
    pub struct EntityKey;
}

/// Application-level type tag used to match collision handlers
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An object in the application world
///
/// Each entity has:
/// - A type (for collision handler lookup)
/// - An optional name
/// - A position (top-left corner, pixels) and a clockwise rotation in degrees
/// - Hit boxes in entity space
/// - Active and collidable flags plus a set of ignored types
/// - An optional physics component
#[derive(Debug)]
pub struct Entity {
    /// Optional name for lookup
    pub name: Option<String>,
    /// Top-left corner in pixels
    pub position: Vec2,
    /// Clockwise rotation in degrees about the entity center
    pub rotation: f32,
    entity_type: EntityType,
    hit_boxes: Vec<HitBox>,
    active: bool,
    collidable: bool,
    ignored_types: HashSet<EntityType>,
    physics: Option<PhysicsComponent>,
}

impl Entity {
    /// Create an active, collidable entity of the given type at the origin
    pub fn new(entity_type: impl Into<EntityType>) -> Self {
        Self {
            name: None,
            position: Vec2::ZERO,
            rotation: 0.0,
            entity_type: entity_type.into(),
            hit_boxes: Vec::new(),
            active: true,
            collidable: true,
            ignored_types: HashSet::new(),
            physics: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Place the top-left corner at `(x, y)` pixels
    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.position = Vec2::new(x, y);
        self
    }

    pub fn with_rotation(mut self, degrees: f32) -> Self {
        self.rotation = degrees;
        self
    }

    pub fn with_hit_box(mut self, hit_box: HitBox) -> Self {
        self.hit_boxes.push(hit_box);
        self
    }

    pub fn with_collidable(mut self, collidable: bool) -> Self {
        self.collidable = collidable;
        self
    }

    /// Never report collisions with entities of `entity_type`
    pub fn with_ignored_type(mut self, entity_type: impl Into<EntityType>) -> Self {
        self.ignored_types.insert(entity_type.into());
        self
    }

    pub fn with_physics(mut self, physics: PhysicsComponent) -> Self {
        self.physics = Some(physics);
        self
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    pub fn is_type(&self, entity_type: &EntityType) -> bool {
        &self.entity_type == entity_type
    }

    pub fn hit_boxes(&self) -> &[HitBox] {
        &self.hit_boxes
    }

    /// Add a hit box
    ///
    /// Only hit boxes present when the entity joins the physics world become
    /// fixtures; later ones take part in overlap checks only.
    pub fn add_hit_box(&mut self, hit_box: HitBox) {
        self.hit_boxes.push(hit_box);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Collidable entities take part in collision handling while active
    #[inline]
    pub fn is_collidable(&self) -> bool {
        self.collidable && self.active
    }

    pub fn set_collidable(&mut self, collidable: bool) {
        self.collidable = collidable;
    }

    pub fn ignored_types(&self) -> impl Iterator<Item = &EntityType> {
        self.ignored_types.iter()
    }

    pub fn add_ignored_type(&mut self, entity_type: impl Into<EntityType>) {
        self.ignored_types.insert(entity_type.into());
    }

    /// True if either entity lists the other's type as ignored
    pub fn ignores(&self, other: &Entity) -> bool {
        self.ignored_types.contains(&other.entity_type) || other.ignored_types.contains(&self.entity_type)
    }

    pub fn physics(&self) -> Option<&PhysicsComponent> {
        self.physics.as_ref()
    }

    pub fn physics_mut(&mut self) -> Option<&mut PhysicsComponent> {
        self.physics.as_mut()
    }

    pub fn has_physics(&self) -> bool {
        self.physics.is_some()
    }

    /// Union of the hit box bounds in entity space
    pub fn local_bounds(&self) -> Bounds {
        let mut boxes = self.hit_boxes.iter().map(HitBox::bounds);
        match boxes.next() {
            Some(first) => boxes.fold(first, |acc, b| acc.union(&b)),
            None => Bounds::default(),
        }
    }

    /// Center of the entity in entity space
    pub fn center_local(&self) -> Vec2 {
        self.local_bounds().center()
    }

    /// Center of the entity in pixels
    pub fn center(&self) -> Vec2 {
        self.position + self.center_local()
    }

    /// Bounds of a hit box in pixel space, rotated with the entity
    pub fn world_bounds(&self, hit_box: &HitBox) -> Bounds {
        let b = hit_box.bounds();
        let translated = Bounds::new(
            b.min_x + self.position.x,
            b.min_y + self.position.y,
            b.width,
            b.height,
        );
        translated.rotated(self.center(), self.rotation)
    }

    /// Indices of the first pair of overlapping hit boxes between two entities
    pub fn overlapping_hit_boxes(&self, other: &Entity) -> Option<(usize, usize)> {
        for (i, a) in self.hit_boxes.iter().enumerate() {
            let bounds_a = self.world_bounds(a);
            for (j, b) in other.hit_boxes.iter().enumerate() {
                if bounds_a.overlaps(&other.world_bounds(b)) {
                    return Some((i, j));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hitbox::BoundingShape;

    #[test]
    fn test_entity_new() {
        let entity = Entity::new("player");
        assert_eq!(entity.entity_type().as_str(), "player");
        assert!(entity.is_active());
        assert!(entity.is_collidable());
        assert!(!entity.has_physics());
        assert!(entity.hit_boxes().is_empty());
        assert_eq!(entity.local_bounds(), Bounds::default());
    }

    #[test]
    fn test_entity_builder() {
        let entity = Entity::new("coin")
            .with_name("coin_1")
            .at(10.0, 20.0)
            .with_hit_box(HitBox::new("body", BoundingShape::rectangle(16.0, 16.0)));
        assert_eq!(entity.name.as_deref(), Some("coin_1"));
        assert_eq!(entity.position, Vec2::new(10.0, 20.0));
        assert_eq!(entity.center(), Vec2::new(18.0, 28.0));
    }

    #[test]
    fn test_local_bounds_union() {
        let entity = Entity::new("robot")
            .with_hit_box(HitBox::new("head", BoundingShape::rectangle(10.0, 10.0)))
            .with_hit_box(HitBox::with_origin("legs", Vec2::new(0.0, 30.0), BoundingShape::rectangle(20.0, 10.0)));
        let bounds = entity.local_bounds();
        assert_eq!(bounds, Bounds::new(0.0, 0.0, 20.0, 40.0));
        assert_eq!(entity.center_local(), Vec2::new(10.0, 20.0));
    }

    #[test]
    fn test_inactive_is_not_collidable() {
        let mut entity = Entity::new("a");
        entity.set_active(false);
        assert!(!entity.is_collidable());
        entity.set_active(true);
        entity.set_collidable(false);
        assert!(!entity.is_collidable());
    }

    #[test]
    fn test_ignores_is_symmetric() {
        let bullet = Entity::new("bullet").with_ignored_type("player");
        let player = Entity::new("player");
        let enemy = Entity::new("enemy");
        assert!(bullet.ignores(&player));
        assert!(player.ignores(&bullet));
        assert!(!bullet.ignores(&enemy));
    }

    #[test]
    fn test_overlapping_hit_boxes() {
        let a = Entity::new("a")
            .at(0.0, 0.0)
            .with_hit_box(HitBox::new("left", BoundingShape::rectangle(10.0, 10.0)))
            .with_hit_box(HitBox::with_origin("right", Vec2::new(30.0, 0.0), BoundingShape::rectangle(10.0, 10.0)));
        let b = Entity::new("b")
            .at(35.0, 5.0)
            .with_hit_box(HitBox::new("box", BoundingShape::rectangle(10.0, 10.0)));

        let (i, j) = a.overlapping_hit_boxes(&b).expect("right half overlaps");
        assert_eq!(a.hit_boxes()[i].name(), "right");
        assert_eq!(b.hit_boxes()[j].name(), "box");

        let far = Entity::new("c")
            .at(100.0, 100.0)
            .with_hit_box(HitBox::new("box", BoundingShape::rectangle(10.0, 10.0)));
        assert!(a.overlapping_hit_boxes(&far).is_none());
    }

    #[test]
    fn test_rotation_changes_world_bounds() {
        let entity = Entity::new("plank")
            .with_rotation(90.0)
            .with_hit_box(HitBox::new("body", BoundingShape::rectangle(40.0, 10.0)));
        let bounds = entity.world_bounds(&entity.hit_boxes()[0]);
        assert!((bounds.width - 10.0).abs() < 1e-4);
        assert!((bounds.height - 40.0).abs() < 1e-4);
    }
}
