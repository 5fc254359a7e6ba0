//! Collision handlers and per-pair collision state
//!
//! A [`CollisionHandler`] is registered for an ordered pair of entity types.
//! Whenever two entities of those types overlap, the world tracks a
//! [`CollisionPair`] for them and drives the handler's callbacks:
//!
//! 1. `on_hit_box_trigger` on the tick the overlap is detected
//! 2. `on_collision_begin` on the following tick
//! 3. `on_collision` on every later tick while the overlap lasts
//! 4. `on_collision_end` once, on the tick the overlap is gone
//!
//! Callbacks always receive the entities in registration order.

use std::fmt;

use slotmap::new_key_type;

use crate::entity::{Entity, EntityKey, EntityType};
use crate::hitbox::HitBox;

new_key_type! {
    /// Handle to a registered collision handler
    pub struct CollisionHandlerKey;
}

new_key_type! {
    /// Handle to a tracked collision pair
    pub struct CollisionPairKey;
}

type PairCallback = Box<dyn FnMut(&Entity, &Entity)>;
type HitBoxCallback = Box<dyn FnMut(&Entity, &Entity, &HitBox, &HitBox)>;

/// Callbacks for collisions between two entity types
///
/// Every callback is optional; unset callbacks do nothing.
pub struct CollisionHandler {
    type_a: EntityType,
    type_b: EntityType,
    on_hit_box_trigger: Option<HitBoxCallback>,
    on_begin: Option<PairCallback>,
    on_collision: Option<PairCallback>,
    on_end: Option<PairCallback>,
}

impl CollisionHandler {
    /// A handler for entities of `type_a` colliding with `type_b`
    pub fn new(type_a: impl Into<EntityType>, type_b: impl Into<EntityType>) -> Self {
        Self {
            type_a: type_a.into(),
            type_b: type_b.into(),
            on_hit_box_trigger: None,
            on_begin: None,
            on_collision: None,
            on_end: None,
        }
    }

    pub fn on_hit_box_trigger(mut self, f: impl FnMut(&Entity, &Entity, &HitBox, &HitBox) + 'static) -> Self {
        self.on_hit_box_trigger = Some(Box::new(f));
        self
    }

    pub fn on_collision_begin(mut self, f: impl FnMut(&Entity, &Entity) + 'static) -> Self {
        self.on_begin = Some(Box::new(f));
        self
    }

    pub fn on_collision(mut self, f: impl FnMut(&Entity, &Entity) + 'static) -> Self {
        self.on_collision = Some(Box::new(f));
        self
    }

    pub fn on_collision_end(mut self, f: impl FnMut(&Entity, &Entity) + 'static) -> Self {
        self.on_end = Some(Box::new(f));
        self
    }

    pub fn type_a(&self) -> &EntityType {
        &self.type_a
    }

    pub fn type_b(&self) -> &EntityType {
        &self.type_b
    }

    /// True if the handler covers these two types, in either order
    pub fn matches(&self, a: &EntityType, b: &EntityType) -> bool {
        (&self.type_a == a && &self.type_b == b) || (&self.type_a == b && &self.type_b == a)
    }

    pub(crate) fn hit_box_trigger(&mut self, a: &Entity, b: &Entity, box_a: &HitBox, box_b: &HitBox) {
        if let Some(f) = self.on_hit_box_trigger.as_mut() {
            f(a, b, box_a, box_b);
        }
    }

    pub(crate) fn begin(&mut self, a: &Entity, b: &Entity) {
        if let Some(f) = self.on_begin.as_mut() {
            f(a, b);
        }
    }

    pub(crate) fn collision(&mut self, a: &Entity, b: &Entity) {
        if let Some(f) = self.on_collision.as_mut() {
            f(a, b);
        }
    }

    pub(crate) fn end(&mut self, a: &Entity, b: &Entity) {
        if let Some(f) = self.on_end.as_mut() {
            f(a, b);
        }
    }
}

impl fmt::Debug for CollisionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollisionHandler")
            .field("type_a", &self.type_a)
            .field("type_b", &self.type_b)
            .finish_non_exhaustive()
    }
}

/// What the dispatch pass should report for a pair this tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PairEvent {
    /// Detected this tick; begin is reported on the next one
    Pending,
    Begin,
    Collision,
    End,
    /// Overlap started and stopped before begin was reported
    BeginEnd,
}

/// Collision state of two concrete entities
///
/// `a` always matches the handler's first type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollisionPair {
    a: EntityKey,
    b: EntityKey,
    handler: CollisionHandlerKey,
    /// Tick on which the overlap was first detected
    detected_tick: u64,
    begun: bool,
    ended: bool,
    /// Engine contacts currently touching between the two entities
    touching: u32,
}

impl CollisionPair {
    pub(crate) fn new(a: EntityKey, b: EntityKey, handler: CollisionHandlerKey, tick: u64) -> Self {
        Self {
            a,
            b,
            handler,
            detected_tick: tick,
            begun: false,
            ended: false,
            touching: 0,
        }
    }

    pub fn a(&self) -> EntityKey {
        self.a
    }

    pub fn b(&self) -> EntityKey {
        self.b
    }

    pub fn handler(&self) -> CollisionHandlerKey {
        self.handler
    }

    pub fn detected_tick(&self) -> u64 {
        self.detected_tick
    }

    pub fn has_begun(&self) -> bool {
        self.begun
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    pub fn involves(&self, entity: EntityKey) -> bool {
        self.a == entity || self.b == entity
    }

    /// An engine contact between the two started touching
    pub(crate) fn touch(&mut self) {
        self.touching += 1;
        self.ended = false;
    }

    /// An engine contact stopped touching; ends the pair when none are left
    pub(crate) fn release(&mut self) {
        self.touching = self.touching.saturating_sub(1);
        if self.touching == 0 {
            self.ended = true;
        }
    }

    /// The overlap is back before the end was reported
    pub(crate) fn resume(&mut self) {
        self.ended = false;
    }

    pub(crate) fn end(&mut self) {
        self.ended = true;
    }

    /// Advance the pair to `tick` and report what to notify
    pub(crate) fn advance(&mut self, tick: u64) -> PairEvent {
        if tick <= self.detected_tick {
            return PairEvent::Pending;
        }
        if self.ended {
            return if self.begun { PairEvent::End } else { PairEvent::BeginEnd };
        }
        if self.begun {
            PairEvent::Collision
        } else {
            self.begun = true;
            PairEvent::Begin
        }
    }
}

/// Unordered lookup key for a pair of entities
pub(crate) fn pair_index(e1: EntityKey, e2: EntityKey) -> (EntityKey, EntityKey) {
    if e1 <= e2 {
        (e1, e2)
    } else {
        (e2, e1)
    }
}
