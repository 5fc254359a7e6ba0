//! Integration tests for the simulation pipeline
//!
//! These tests drive the public `World` API end to end:
//! 1. Mass properties follow body type and fixture density
//! 2. Continuous collision stops fast bodies at thin walls
//! 3. Ray casts and queries report the right fixtures
//! 4. Destroying bodies cleans up the broad phase
//! 5. Definitions survive a RON round trip

use kinetic2d_math::Vec2;
use kinetic2d_physics::{
    BodyDef, BodyType, ChainShape, CircleShape, Contact, ContactListener, EdgeShape, FixtureDef,
    PhysicsConfig, PolygonShape, RevoluteJointDef, World,
};

const DT: f32 = 1.0 / 60.0;

fn add_box(world: &mut World, body_type: BodyType, position: Vec2, hx: f32, hy: f32, density: f32) -> kinetic2d_physics::BodyKey {
    let body = world
        .create_body(&BodyDef::new(body_type).with_position(position))
        .expect("world should not be locked");
    world
        .create_fixture(body, &FixtureDef::new(PolygonShape::new_box(hx, hy)).with_density(density))
        .expect("body should exist");
    body
}

// ==================== Mass Tests ====================

/// Static and kinematic bodies never gain mass, whatever the density
#[test]
fn test_non_dynamic_bodies_are_massless() {
    let mut world = World::default();
    for body_type in [BodyType::Static, BodyType::Kinematic] {
        for density in [0.0, 1.0, 250.0] {
            let body = add_box(&mut world, body_type, Vec2::ZERO, 1.0, 2.0, density);
            let body = world.body(body).unwrap();
            assert_eq!(body.mass(), 0.0, "{:?} at density {}", body_type, density);
            assert_eq!(body.inertia(), 0.0);
        }
    }
}

/// A box of density ρ and size w×h weighs ρ·w·h with inertia m(w²+h²)/12
#[test]
fn test_box_mass_matches_analytic_formula() {
    let cases = [(1.0, 1.0, 1.0), (2.0, 0.5, 3.0), (0.25, 4.0, 0.1)];
    for (w, h, density) in cases {
        let mut world = World::default();
        let body = add_box(&mut world, BodyType::Dynamic, Vec2::new(3.0, -1.0), w / 2.0, h / 2.0, density);
        let body = world.body(body).unwrap();

        let mass = density * w * h;
        let inertia = mass * (w * w + h * h) / 12.0;
        assert!((body.mass() - mass).abs() < 1e-4 * mass.max(1.0));
        assert!((body.inertia() - inertia).abs() < 1e-3 * inertia.max(1.0));
    }
}

/// Resetting mass data twice gives identical results
#[test]
fn test_reset_mass_data_is_idempotent() {
    let mut world = World::default();
    let body = add_box(&mut world, BodyType::Dynamic, Vec2::ZERO, 0.5, 0.5, 1.0);
    world
        .create_fixture(body, &FixtureDef::new(CircleShape::new(Vec2::new(1.5, 0.5), 0.4)).with_density(3.0))
        .unwrap();

    world.reset_mass_data(body).unwrap();
    let first = world.body(body).unwrap().clone();
    world.reset_mass_data(body).unwrap();
    let second = world.body(body).unwrap();

    assert_eq!(first.mass(), second.mass());
    assert_eq!(first.inertia(), second.inertia());
    assert_eq!(first.local_center(), second.local_center());
    assert_eq!(first.world_center(), second.world_center());
}

// ==================== Continuous Collision Tests ====================

/// A bullet crossing a thin wall within one step is stopped on its side
#[test]
fn test_bullet_does_not_tunnel_through_thin_wall() {
    let mut world = World::new(PhysicsConfig::new(Vec2::ZERO));

    let wall = world.create_body(&BodyDef::default()).unwrap();
    world
        .create_fixture(wall, &FixtureDef::new(PolygonShape::new_box(0.05, 5.0)))
        .unwrap();

    let bullet = world
        .create_body(
            &BodyDef::new(BodyType::Dynamic)
                .with_position(Vec2::new(-3.0, 0.0))
                .with_linear_velocity(Vec2::new(110.0, 0.0))
                .with_bullet(true),
        )
        .unwrap();
    world
        .create_fixture(bullet, &FixtureDef::new(CircleShape::new(Vec2::ZERO, 0.1)).with_density(1.0))
        .unwrap();

    for _ in 0..30 {
        world.step(DT, 8, 3);
        assert!(world.body(bullet).unwrap().position().x < 0.0);
    }
}

/// Fast dynamic bodies collide continuously with static geometry too
#[test]
fn test_fast_body_stops_at_static_chain() {
    let mut world = World::new(PhysicsConfig::new(Vec2::ZERO));

    let ground = world.create_body(&BodyDef::default()).unwrap();
    let chain = ChainShape::create_chain(&[Vec2::new(-10.0, 0.0), Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)])
        .expect("two or more points make a chain");
    world.create_fixture(ground, &FixtureDef::new(chain)).unwrap();

    let body = add_box(&mut world, BodyType::Dynamic, Vec2::new(1.0, 5.0), 0.2, 0.2, 1.0);
    world
        .body_mut(body)
        .unwrap()
        .set_linear_velocity(Vec2::new(0.0, -100.0));

    for _ in 0..30 {
        world.step(DT, 8, 3);
    }
    assert!(world.body(body).unwrap().position().y > 0.0);
}

/// Turning continuous physics off lets the same bullet pass
#[test]
fn test_discrete_only_tunnels() {
    let mut config = PhysicsConfig::new(Vec2::ZERO);
    config.continuous_physics = false;
    let mut world = World::new(config);

    let wall = world.create_body(&BodyDef::default()).unwrap();
    world
        .create_fixture(wall, &FixtureDef::new(EdgeShape::new(Vec2::new(0.0, -5.0), Vec2::new(0.0, 5.0))))
        .unwrap();
    let bullet = world
        .create_body(
            &BodyDef::new(BodyType::Dynamic)
                .with_position(Vec2::new(-1.0, 0.0))
                .with_linear_velocity(Vec2::new(100.0, 0.0)),
        )
        .unwrap();
    world
        .create_fixture(bullet, &FixtureDef::new(CircleShape::new(Vec2::ZERO, 0.05)).with_density(1.0))
        .unwrap();

    for _ in 0..3 {
        world.step(DT, 8, 3);
    }
    assert!(world.body(bullet).unwrap().position().x > 0.0);
    assert_eq!(world.stats().toi_events, 0);
}

// ==================== Query Tests ====================

/// Ray cast against an empty world reports nothing
#[test]
fn test_ray_cast_empty_world_reports_nothing() {
    let world = World::default();
    let mut hit = None;
    world.ray_cast(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0), |fixture, point, _, fraction| {
        hit = Some((fixture, point));
        fraction
    });
    assert!(hit.is_none());
}

/// A ray that starts and ends inside a fixture reports that fixture
#[test]
fn test_ray_cast_inside_fixture_reports_it() {
    let mut world = World::default();
    let body = add_box(&mut world, BodyType::Static, Vec2::ZERO, 3.0, 3.0, 0.0);
    let fixture = world.body(body).unwrap().fixtures()[0];

    let mut hit = None;
    world.ray_cast(Vec2::new(-1.0, 1.0), Vec2::new(1.0, 1.0), |f, point, _, fraction| {
        hit = Some((f, point));
        fraction
    });
    let (f, point) = hit.expect("the containing fixture is reported");
    assert_eq!(f, fixture);
    assert_eq!(point, Vec2::new(-1.0, 1.0));
}

/// Ray hits on a rotated body land on its surface
#[test]
fn test_ray_cast_rotated_box() {
    let mut world = World::default();
    let body = world
        .create_body(&BodyDef::default().with_position(Vec2::new(5.0, 0.0)).with_angle(std::f32::consts::FRAC_PI_4))
        .unwrap();
    world
        .create_fixture(body, &FixtureDef::new(PolygonShape::new_box(1.0, 1.0)))
        .unwrap();

    let mut hit = None;
    world.ray_cast(Vec2::ZERO, Vec2::new(10.0, 0.0), |_, point, normal, fraction| {
        hit = Some((point, normal));
        fraction
    });
    let (point, normal) = hit.unwrap();
    // The corner of a diamond points at the ray origin
    assert!((point.x - (5.0 - std::f32::consts::SQRT_2)).abs() < 1e-3);
    assert!(normal.x < 0.0);
}

// ==================== Lifecycle Tests ====================

/// Destroying a body removes all of its proxies and contacts
#[test]
fn test_destroy_body_removes_proxies() {
    let mut world = World::default();
    let ground = add_box(&mut world, BodyType::Static, Vec2::ZERO, 10.0, 0.5, 0.0);
    let body = add_box(&mut world, BodyType::Dynamic, Vec2::new(0.0, 1.0), 0.5, 0.5, 1.0);
    world
        .create_fixture(body, &FixtureDef::new(CircleShape::new(Vec2::new(0.0, 0.5), 0.5)).with_density(1.0))
        .unwrap();
    let other = add_box(&mut world, BodyType::Dynamic, Vec2::new(0.0, 3.0), 0.5, 0.5, 1.0);
    world.create_joint(RevoluteJointDef::new(body, other)).unwrap();

    for _ in 0..10 {
        world.step(DT, 8, 3);
    }
    assert_eq!(world.proxy_count(), 4);

    world.destroy_body(body).unwrap();
    assert_eq!(world.proxy_count(), 2);
    assert!(world.body(body).is_none());
    assert_eq!(world.joint_count(), 0);
    assert!(world
        .contacts()
        .all(|(_, contact)| contact.body_a() != body && contact.body_b() != body));

    // The rest of the world keeps simulating
    for _ in 0..10 {
        world.step(DT, 8, 3);
    }
    assert!(world.body(ground).is_some());
}

#[derive(Default)]
struct Touches {
    begun: usize,
    ended: usize,
}

impl ContactListener for Touches {
    fn begin_contact(&mut self, _contact: &Contact) {
        self.begun += 1;
    }

    fn end_contact(&mut self, _contact: &Contact) {
        self.ended += 1;
    }
}

/// A stack of boxes settles and falls asleep
#[test]
fn test_stack_settles_and_sleeps() {
    let mut world = World::default();
    add_box(&mut world, BodyType::Static, Vec2::ZERO, 10.0, 0.5, 0.0);
    let boxes: Vec<_> = (0..4)
        .map(|i| add_box(&mut world, BodyType::Dynamic, Vec2::new(0.0, 1.0 + i as f32 * 1.05), 0.5, 0.5, 1.0))
        .collect();

    let mut touches = Touches::default();
    for _ in 0..600 {
        world.step_with_listener(DT, 8, 3, &mut touches);
    }

    assert!(touches.begun >= 4);
    for (i, key) in boxes.iter().enumerate() {
        let body = world.body(*key).unwrap();
        assert!((body.position().x).abs() < 0.1, "box {} drifted", i);
        assert!(!body.is_awake(), "box {} should sleep", i);
    }
}

// ==================== Serialization Tests ====================

/// Body and fixture definitions round-trip through RON
#[test]
fn test_definitions_round_trip_through_ron() {
    let body = BodyDef::new(BodyType::Dynamic)
        .with_position(Vec2::new(1.0, 2.0))
        .with_bullet(true);
    let text = ron::to_string(&body).unwrap();
    let parsed: BodyDef = ron::from_str(&text).unwrap();
    assert_eq!(parsed, body);

    let fixture = FixtureDef::new(CircleShape::new(Vec2::new(0.5, 0.0), 2.0))
        .with_density(3.0)
        .with_sensor(true);
    let text = ron::to_string(&fixture).unwrap();
    let parsed: FixtureDef = ron::from_str(&text).unwrap();
    assert_eq!(parsed.material.density, 3.0);
    assert!(parsed.is_sensor);
    assert_eq!(parsed.shape, fixture.shape);

    let config = PhysicsConfig::default();
    let parsed: PhysicsConfig = ron::from_str(&ron::to_string(&config).unwrap()).unwrap();
    assert_eq!(parsed, config);
}
