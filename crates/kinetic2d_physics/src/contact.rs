//! Contacts between fixture pairs
//!
//! A contact exists while the fat AABBs of two fixture children overlap. It
//! caches the manifold produced by the narrow phase and flips between
//! touching and not touching as that manifold gains or loses points.

use bitflags::bitflags;
use slotmap::{new_key_type, SlotMap};

use crate::body::{Body, BodyKey};
use crate::collision::narrow_phase::{
    collide_circles, collide_edge_and_circle, collide_edge_and_polygon,
    collide_polygon_and_circle, collide_polygons,
};
use crate::collision::{test_overlap, Manifold, WorldManifold};
use crate::fixture::{Fixture, FixtureKey};
use crate::listener::ContactListener;
use crate::settings::{mix_friction, mix_restitution};
use crate::shapes::{Shape, ShapeType};

new_key_type! {
    /// Key to a live contact
    ///
    /// Contacts come and go every step, so hold on to these only within a
    /// callback.
    pub struct ContactKey;
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ContactFlags: u8 {
        /// Visited by the current island search
        const ISLAND = 1 << 0;
        /// The manifold has points, or the sensor shapes overlap
        const TOUCHING = 1 << 1;
        /// Disabled contacts are skipped by the solver
        const ENABLED = 1 << 2;
        /// Filtering must be re-evaluated before the next update
        const FILTER = 1 << 3;
        const BULLET_HIT = 1 << 4;
        /// `toi` holds a valid time of impact for this step
        const TOI = 1 << 5;
    }
}

/// Order in which a shape-type pair is handed to its collider
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Register {
    /// Fixtures keep the order they were reported in
    Primary,
    /// Fixtures are swapped so the collider sees them in its own order
    Swapped,
}

use Register::{Primary, Swapped};

/// Indexed by `[ShapeType a][ShapeType b]`; `None` pairs never collide
const REGISTERS: [[Option<Register>; ShapeType::COUNT]; ShapeType::COUNT] = [
    // circle vs circle, edge, polygon, chain
    [Some(Primary), Some(Swapped), Some(Swapped), Some(Swapped)],
    // edge vs ...
    [Some(Primary), None, Some(Primary), None],
    // polygon vs ...
    [Some(Primary), Some(Swapped), Some(Primary), Some(Swapped)],
    // chain vs ...
    [Some(Primary), None, Some(Primary), None],
];

/// A potential touch between one child of each of two fixtures
#[derive(Clone, Debug)]
pub struct Contact {
    pub(crate) flags: ContactFlags,
    pub(crate) fixture_a: FixtureKey,
    pub(crate) fixture_b: FixtureKey,
    pub(crate) child_a: usize,
    pub(crate) child_b: usize,
    pub(crate) body_a: BodyKey,
    pub(crate) body_b: BodyKey,
    pub(crate) sensor: bool,
    pub(crate) manifold: Manifold,
    pub(crate) toi_count: u32,
    pub(crate) toi: f32,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) tangent_speed: f32,
}

impl Contact {
    /// Build a contact for two fixture children, or `None` if their shape
    /// types never collide
    pub(crate) fn new(
        fixtures: &SlotMap<FixtureKey, Fixture>,
        key_a: FixtureKey,
        child_a: usize,
        key_b: FixtureKey,
        child_b: usize,
    ) -> Option<Self> {
        let fixture_a = fixtures.get(key_a)?;
        let fixture_b = fixtures.get(key_b)?;
        let register =
            REGISTERS[fixture_a.shape_type() as usize][fixture_b.shape_type() as usize]?;

        let ((key_a, fixture_a, child_a), (key_b, fixture_b, child_b)) = match register {
            Primary => ((key_a, fixture_a, child_a), (key_b, fixture_b, child_b)),
            Swapped => ((key_b, fixture_b, child_b), (key_a, fixture_a, child_a)),
        };

        Some(Self {
            flags: ContactFlags::ENABLED,
            fixture_a: key_a,
            fixture_b: key_b,
            child_a,
            child_b,
            body_a: fixture_a.body,
            body_b: fixture_b.body,
            sensor: fixture_a.is_sensor || fixture_b.is_sensor,
            manifold: Manifold::default(),
            toi_count: 0,
            toi: 1.0,
            friction: mix_friction(fixture_a.friction(), fixture_b.friction()),
            restitution: mix_restitution(fixture_a.restitution(), fixture_b.restitution()),
            tangent_speed: 0.0,
        })
    }

    pub fn fixture_a(&self) -> FixtureKey {
        self.fixture_a
    }

    pub fn fixture_b(&self) -> FixtureKey {
        self.fixture_b
    }

    pub fn child_index_a(&self) -> usize {
        self.child_a
    }

    pub fn child_index_b(&self) -> usize {
        self.child_b
    }

    pub fn body_a(&self) -> BodyKey {
        self.body_a
    }

    pub fn body_b(&self) -> BodyKey {
        self.body_b
    }

    /// Local-space manifold from the last update
    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    /// Resolve the manifold against the current body transforms
    pub fn world_manifold(
        &self,
        bodies: &SlotMap<BodyKey, Body>,
        fixtures: &SlotMap<FixtureKey, Fixture>,
    ) -> Option<WorldManifold> {
        let (body_a, body_b) = (bodies.get(self.body_a)?, bodies.get(self.body_b)?);
        let (fixture_a, fixture_b) = (fixtures.get(self.fixture_a)?, fixtures.get(self.fixture_b)?);
        Some(WorldManifold::new(
            &self.manifold,
            body_a.transform(),
            fixture_a.shape.radius(),
            body_b.transform(),
            fixture_b.shape.radius(),
        ))
    }

    pub fn is_touching(&self) -> bool {
        self.flags.contains(ContactFlags::TOUCHING)
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.contains(ContactFlags::ENABLED)
    }

    /// At least one side is a sensor; sensor contacts never reach the solver
    pub fn is_sensor(&self) -> bool {
        self.sensor
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    /// Conveyor-belt style surface speed along the tangent
    pub fn tangent_speed(&self) -> f32 {
        self.tangent_speed
    }

    pub(crate) fn flag_for_filtering(&mut self) {
        self.flags.insert(ContactFlags::FILTER);
    }

    /// Run the narrow phase for the current fixture shapes and transforms
    fn evaluate(&mut self, shape_a: &Shape, shape_b: &Shape, body_a: &Body, body_b: &Body) {
        let manifold = &mut self.manifold;
        let (xf_a, xf_b) = (&body_a.xf, &body_b.xf);
        match (shape_a, shape_b) {
            (Shape::Circle(a), Shape::Circle(b)) => collide_circles(manifold, a, xf_a, b, xf_b),
            (Shape::Polygon(a), Shape::Circle(b)) => {
                collide_polygon_and_circle(manifold, a, xf_a, b, xf_b)
            }
            (Shape::Polygon(a), Shape::Polygon(b)) => collide_polygons(manifold, a, xf_a, b, xf_b),
            (Shape::Edge(a), Shape::Circle(b)) => collide_edge_and_circle(manifold, a, xf_a, b, xf_b),
            (Shape::Edge(a), Shape::Polygon(b)) => {
                collide_edge_and_polygon(manifold, a, xf_a, b, xf_b)
            }
            (Shape::Chain(a), Shape::Circle(b)) => {
                let edge = a.child_edge(self.child_a);
                collide_edge_and_circle(manifold, &edge, xf_a, b, xf_b)
            }
            (Shape::Chain(a), Shape::Polygon(b)) => {
                let edge = a.child_edge(self.child_a);
                collide_edge_and_polygon(manifold, &edge, xf_a, b, xf_b)
            }
            _ => manifold.point_count = 0,
        }
    }

    /// Refresh the manifold and fire touch events
    ///
    /// Warm-start impulses carry over for points whose feature ids match the
    /// previous manifold.
    pub(crate) fn update(
        &mut self,
        fixtures: &SlotMap<FixtureKey, Fixture>,
        bodies: &mut SlotMap<BodyKey, Body>,
        listener: &mut dyn ContactListener,
    ) {
        let (Some(fixture_a), Some(fixture_b)) =
            (fixtures.get(self.fixture_a), fixtures.get(self.fixture_b))
        else {
            return;
        };
        let (Some(body_a), Some(body_b)) = (bodies.get(self.body_a), bodies.get(self.body_b))
        else {
            return;
        };

        let old_manifold = self.manifold;

        // Re-enable; pre-solve listeners see every touching contact
        self.flags.insert(ContactFlags::ENABLED);

        let was_touching = self.is_touching();
        let touching = if self.sensor {
            self.manifold.point_count = 0;
            test_overlap(
                &fixture_a.shape,
                self.child_a,
                &fixture_b.shape,
                self.child_b,
                &body_a.xf,
                &body_b.xf,
            )
        } else {
            self.evaluate(&fixture_a.shape, &fixture_b.shape, body_a, body_b);

            for point in &mut self.manifold.points[..self.manifold.point_count] {
                point.normal_impulse = 0.0;
                point.tangent_impulse = 0.0;
                let key = point.id.key();
                if let Some(old) = old_manifold.points().iter().find(|old| old.id.key() == key) {
                    point.normal_impulse = old.normal_impulse;
                    point.tangent_impulse = old.tangent_impulse;
                }
            }

            let touching = self.manifold.point_count > 0;
            if touching != was_touching {
                if let Some(body) = bodies.get_mut(self.body_a) {
                    body.set_awake(true);
                }
                if let Some(body) = bodies.get_mut(self.body_b) {
                    body.set_awake(true);
                }
            }
            touching
        };

        self.flags.set(ContactFlags::TOUCHING, touching);

        if !was_touching && touching {
            listener.begin_contact(self);
        }
        if was_touching && !touching {
            listener.end_contact(self);
        }
        if !self.sensor && touching {
            listener.pre_solve(self, &old_manifold);
        }
    }
}
