//! Owns the broad phase and the live contact set
//!
//! New pairs come from the broad phase; every step each contact is either
//! destroyed (fat AABBs separated, filter changed) or updated through the
//! narrow phase.

use slotmap::SlotMap;

use crate::body::{Body, BodyKey, BodyType, ContactEdge};
use crate::collision::BroadPhase;
use crate::contact::{Contact, ContactFlags, ContactKey};
use crate::fixture::{Fixture, FixtureKey, ProxyRef};
use crate::joints::{Joint, JointKey};
use crate::listener::ContactListener;

#[derive(Clone, Debug, Default)]
pub struct ContactManager {
    pub(crate) broad_phase: BroadPhase<ProxyRef>,
    pub(crate) contacts: SlotMap<ContactKey, Contact>,
    pairs: Vec<(ProxyRef, ProxyRef)>,
    keys: Vec<ContactKey>,
}

/// Can contacts form between two bodies at all
///
/// At least one side must be dynamic, and a joint between them with
/// `collide_connected` off suppresses contacts.
pub(crate) fn bodies_should_collide(
    bodies: &SlotMap<BodyKey, Body>,
    joints: &SlotMap<JointKey, Joint>,
    key_a: BodyKey,
    key_b: BodyKey,
) -> bool {
    let (Some(body_a), Some(body_b)) = (bodies.get(key_a), bodies.get(key_b)) else {
        return false;
    };
    if body_a.body_type != BodyType::Dynamic && body_b.body_type != BodyType::Dynamic {
        return false;
    }
    !body_b.joint_edges.iter().any(|edge| {
        edge.other == key_a
            && joints
                .get(edge.joint)
                .is_some_and(|joint| !joint.collide_connected())
    })
}

impl ContactManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    pub fn contacts(&self) -> impl Iterator<Item = (ContactKey, &Contact)> {
        self.contacts.iter()
    }

    /// Create contacts for broad-phase pairs that are new since the last call
    pub(crate) fn find_new_contacts(
        &mut self,
        bodies: &mut SlotMap<BodyKey, Body>,
        fixtures: &SlotMap<FixtureKey, Fixture>,
        joints: &SlotMap<JointKey, Joint>,
        listener: &mut dyn ContactListener,
    ) {
        let mut pairs = std::mem::take(&mut self.pairs);
        pairs.clear();
        self.broad_phase.update_pairs(|a, b| pairs.push((a, b)));
        for &(proxy_a, proxy_b) in &pairs {
            self.add_pair(proxy_a, proxy_b, bodies, fixtures, joints, listener);
        }
        self.pairs = pairs;
    }

    fn add_pair(
        &mut self,
        proxy_a: ProxyRef,
        proxy_b: ProxyRef,
        bodies: &mut SlotMap<BodyKey, Body>,
        fixtures: &SlotMap<FixtureKey, Fixture>,
        joints: &SlotMap<JointKey, Joint>,
        listener: &mut dyn ContactListener,
    ) {
        let (Some(fixture_a), Some(fixture_b)) =
            (fixtures.get(proxy_a.fixture), fixtures.get(proxy_b.fixture))
        else {
            return;
        };

        let body_a = fixture_a.body;
        let body_b = fixture_b.body;
        if body_a == body_b {
            return;
        }

        // Already tracked in either order
        if let Some(body) = bodies.get(body_b) {
            let exists = body.contact_edges.iter().any(|edge| {
                edge.other == body_a
                    && self.contacts.get(edge.contact).is_some_and(|c| {
                        (c.fixture_a == proxy_a.fixture
                            && c.child_a == proxy_a.child_index
                            && c.fixture_b == proxy_b.fixture
                            && c.child_b == proxy_b.child_index)
                            || (c.fixture_a == proxy_b.fixture
                                && c.child_a == proxy_b.child_index
                                && c.fixture_b == proxy_a.fixture
                                && c.child_b == proxy_a.child_index)
                    })
            });
            if exists {
                return;
            }
        }

        if !bodies_should_collide(bodies, joints, body_b, body_a) {
            return;
        }
        if !fixture_a.filter.collides_with(&fixture_b.filter) {
            return;
        }
        if !listener.should_collide(proxy_a.fixture, proxy_b.fixture) {
            return;
        }

        let Some(contact) = Contact::new(
            fixtures,
            proxy_a.fixture,
            proxy_a.child_index,
            proxy_b.fixture,
            proxy_b.child_index,
        ) else {
            return;
        };

        let (contact_body_a, contact_body_b) = (contact.body_a, contact.body_b);
        let key = self.contacts.insert(contact);
        if let Some(body) = bodies.get_mut(contact_body_a) {
            body.contact_edges.push(ContactEdge {
                other: contact_body_b,
                contact: key,
            });
        }
        if let Some(body) = bodies.get_mut(contact_body_b) {
            body.contact_edges.push(ContactEdge {
                other: contact_body_a,
                contact: key,
            });
        }
    }

    /// Remove a contact, reporting its end if it was touching
    pub(crate) fn destroy(
        &mut self,
        key: ContactKey,
        bodies: &mut SlotMap<BodyKey, Body>,
        listener: &mut dyn ContactListener,
    ) {
        let Some(contact) = self.contacts.remove(key) else {
            return;
        };
        if contact.is_touching() {
            listener.end_contact(&contact);
        }
        for body_key in [contact.body_a, contact.body_b] {
            if let Some(body) = bodies.get_mut(body_key) {
                body.contact_edges.retain(|edge| edge.contact != key);
            }
        }
    }

    /// Narrow phase for every live contact
    pub(crate) fn collide(
        &mut self,
        bodies: &mut SlotMap<BodyKey, Body>,
        fixtures: &SlotMap<FixtureKey, Fixture>,
        joints: &SlotMap<JointKey, Joint>,
        listener: &mut dyn ContactListener,
    ) {
        let mut keys = std::mem::take(&mut self.keys);
        keys.clear();
        keys.extend(self.contacts.keys());

        for &key in &keys {
            let Some(contact) = self.contacts.get(key) else {
                continue;
            };
            let (Some(fixture_a), Some(fixture_b)) =
                (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b))
            else {
                self.destroy(key, bodies, listener);
                continue;
            };

            if contact.flags.contains(ContactFlags::FILTER) {
                let keep = bodies_should_collide(bodies, joints, contact.body_b, contact.body_a)
                    && fixture_a.filter.collides_with(&fixture_b.filter)
                    && listener.should_collide(contact.fixture_a, contact.fixture_b);
                if !keep {
                    self.destroy(key, bodies, listener);
                    continue;
                }
                if let Some(contact) = self.contacts.get_mut(key) {
                    contact.flags.remove(ContactFlags::FILTER);
                }
            }

            let Some(contact) = self.contacts.get(key) else {
                continue;
            };
            let is_active = |body_key: BodyKey| {
                bodies
                    .get(body_key)
                    .is_some_and(|b| b.is_awake() && b.body_type != BodyType::Static)
            };
            // At least one body must be awake and it must be dynamic or kinematic
            if !is_active(contact.body_a) && !is_active(contact.body_b) {
                continue;
            }

            let overlap = match (
                fixture_a.proxies.get(contact.child_a),
                fixture_b.proxies.get(contact.child_b),
            ) {
                (Some(proxy_a), Some(proxy_b)) => {
                    self.broad_phase.test_overlap(proxy_a.proxy_id, proxy_b.proxy_id)
                }
                _ => false,
            };

            if !overlap {
                self.destroy(key, bodies, listener);
                continue;
            }

            if let Some(contact) = self.contacts.get_mut(key) {
                contact.update(fixtures, bodies, listener);
            }
        }

        self.keys = keys;
    }
}
