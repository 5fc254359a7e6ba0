//! Hooks into the contact lifecycle
//!
//! Listeners receive shared references only; the world stays locked for the
//! whole step, so a callback cannot mutate bodies, fixtures or joints.

use crate::collision::Manifold;
use crate::contact::Contact;
use crate::fixture::FixtureKey;
use crate::settings::MAX_MANIFOLD_POINTS;

/// Impulses applied by the solver to one contact, reported after solving
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContactImpulse {
    pub normal_impulses: [f32; MAX_MANIFOLD_POINTS],
    pub tangent_impulses: [f32; MAX_MANIFOLD_POINTS],
    pub count: usize,
}

/// Receives contact events during a step
///
/// Every method has a no-op default so implementors only override what they
/// need.
pub trait ContactListener {
    /// Two fixtures started touching
    fn begin_contact(&mut self, _contact: &Contact) {}

    /// Two fixtures stopped touching, or their contact was destroyed while
    /// touching
    ///
    /// Contacts destroyed between steps (body or fixture removal, a body type
    /// change, deactivation) are reported at the start of the next step.
    fn end_contact(&mut self, _contact: &Contact) {}

    /// Called after the manifold is updated and before the solver runs
    ///
    /// Only called for touching, non-sensor contacts.
    fn pre_solve(&mut self, _contact: &Contact, _old_manifold: &Manifold) {}

    /// Impulses the solver applied to a touching contact
    fn post_solve(&mut self, _contact: &Contact, _impulse: &ContactImpulse) {}

    /// Veto a candidate pair before a contact is created for it
    fn should_collide(&mut self, _fixture_a: FixtureKey, _fixture_b: FixtureKey) -> bool {
        true
    }
}

/// Listener that ignores every event
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl ContactListener for NoopListener {}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_noop_accepts_every_pair() {
        let mut keys: SlotMap<FixtureKey, ()> = SlotMap::with_key();
        let a = keys.insert(());
        let b = keys.insert(());
        assert!(NoopListener.should_collide(a, b));
    }
}
