//! Integration tests for the application physics pipeline
//!
//! These tests verify the path from scene data to collision callbacks:
//! 1. Scenes loaded from RON create the right bodies and gravity
//! 2. Engine contacts and manual overlap checks both drive collision handlers
//! 3. Ignored types, sensors and raycasts behave across full updates
//! 4. Collision bookkeeping stays bounded over repeated contacts

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use kinetic2d_core::{
    BodyType, BoundingShape, CollisionHandler, Entity, HitBox, PhysicsComponent, PhysicsWorld,
    Scene, SensorHandler, Vec2,
};

const DT: f32 = 1.0 / 60.0;

fn run(world: &mut PhysicsWorld, ticks: usize) {
    for _ in 0..ticks {
        world.update(DT);
    }
}

fn counter() -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
    let c = Rc::new(Cell::new(0));
    (c.clone(), c)
}

// ==================== Scene Tests ====================

const DROP_SCENE: &str = r#"Scene(
    name: "Drop",
    gravity: Some((0.0, 500.0)),
    entities: [
        EntityTemplate(
            entity_type: "ground",
            name: Some("floor"),
            position: (0.0, 550.0),
            hit_boxes: [["body", 0.0, 0.0, 800.0, 50.0, Box]],
            body: Some(BodyTemplate(body_type: Static)),
        ),
        EntityTemplate(
            entity_type: "ball",
            name: Some("ball"),
            position: (390.0, 300.0),
            hit_boxes: [["body", 0.0, 0.0, 20.0, 20.0, Circle]],
            body: Some(BodyTemplate(body_type: Dynamic)),
        ),
    ],
)"#;

/// A ball loaded from a scene falls and comes to rest on the floor
#[test]
fn test_scene_ball_lands_on_floor() {
    let scene: Scene = ron::from_str(DROP_SCENE).unwrap();
    let mut world = PhysicsWorld::new(600.0, 50.0);
    scene.instantiate(&mut world).unwrap();

    let (begins, b) = counter();
    world.add_collision_handler(
        CollisionHandler::new("ball", "ground").on_collision_begin(move |_, _| b.set(b.get() + 1)),
    );

    run(&mut world, 180);

    let ball = world.find_by_name("ball").unwrap();
    let y = world.entity(ball).unwrap().position.y;
    // Resting on top of the floor: bottom edge at 550
    assert!((y - 530.0).abs() < 1.5, "ball rests at {}", y);
    assert!(begins.get() >= 1);
}

// ==================== Collision Handler Tests ====================

/// Kinematic bodies never touch static ones in the engine, so the overlap is
/// found by the manual hit box check
#[test]
fn test_kinematic_against_static_uses_hit_boxes() {
    let mut world = PhysicsWorld::new(600.0, 50.0);
    world
        .add_entity(
            Entity::new("wall")
                .at(300.0, 0.0)
                .with_hit_box(HitBox::new("body", BoundingShape::rectangle(20.0, 600.0)))
                .with_physics(PhysicsComponent::new()),
        )
        .unwrap();
    let paddle = world
        .add_entity(
            Entity::new("paddle")
                .at(200.0, 290.0)
                .with_hit_box(HitBox::new("body", BoundingShape::rectangle(20.0, 20.0)))
                .with_physics(PhysicsComponent::new().with_body_type(BodyType::Kinematic)),
        )
        .unwrap();
    world.physics(paddle).unwrap().set_linear_velocity(120.0, 0.0).unwrap();

    let (begins, b) = counter();
    world.add_collision_handler(
        CollisionHandler::new("paddle", "wall").on_collision_begin(move |_, _| b.set(b.get() + 1)),
    );

    run(&mut world, 30);
    assert_eq!(begins.get(), 0);
    run(&mut world, 30);
    assert_eq!(begins.get(), 1);
}

/// An ignored type disables both the engine response and the callbacks
#[test]
fn test_ignored_type_falls_through() {
    let mut world = PhysicsWorld::new(600.0, 50.0);
    world
        .add_entity(
            Entity::new("ground")
                .at(0.0, 500.0)
                .with_hit_box(HitBox::new("body", BoundingShape::rectangle(800.0, 50.0)))
                .with_physics(PhysicsComponent::new()),
        )
        .unwrap();
    let ghost = world
        .add_entity(
            Entity::new("ghost")
                .at(390.0, 470.0)
                .with_hit_box(HitBox::new("body", BoundingShape::rectangle(20.0, 20.0)))
                .with_ignored_type("ground")
                .with_physics(PhysicsComponent::new().with_body_type(BodyType::Dynamic)),
        )
        .unwrap();

    let (calls, c) = counter();
    world.add_collision_handler(
        CollisionHandler::new("ghost", "ground")
            .on_hit_box_trigger(move |_, _, _, _| c.set(c.get() + 1)),
    );

    run(&mut world, 60);
    assert!(world.entity(ghost).unwrap().position.y > 550.0);
    assert_eq!(calls.get(), 0);
}

/// The trigger reports the hit boxes that actually overlap
#[test]
fn test_trigger_reports_overlapping_hit_boxes() {
    let mut world = PhysicsWorld::new(600.0, 50.0);
    world
        .add_entity(
            Entity::new("robot")
                .with_hit_box(HitBox::new("head", BoundingShape::rectangle(10.0, 10.0)))
                .with_hit_box(HitBox::with_origin("legs", Vec2::new(0.0, 30.0), BoundingShape::rectangle(20.0, 10.0))),
        )
        .unwrap();
    world
        .add_entity(
            Entity::new("spike")
                .at(5.0, 35.0)
                .with_hit_box(HitBox::new("tip", BoundingShape::rectangle(5.0, 5.0))),
        )
        .unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = seen.clone();
    world.add_collision_handler(CollisionHandler::new("robot", "spike").on_hit_box_trigger(
        move |_, _, robot_box, spike_box| {
            s.borrow_mut()
                .push((robot_box.name().to_string(), spike_box.name().to_string()));
        },
    ));

    world.update(DT);
    assert_eq!(*seen.borrow(), vec![("legs".to_string(), "tip".to_string())]);
}

/// Repeated touch/separate cycles each produce one begin and one end
#[test]
fn test_repeated_contacts_reuse_pairs() {
    let mut world = PhysicsWorld::new(600.0, 50.0);
    let (begins, b) = counter();
    let (ends, e) = counter();
    world.add_collision_handler(
        CollisionHandler::new("a", "b")
            .on_collision_begin(move |_, _| b.set(b.get() + 1))
            .on_collision_end(move |_, _| e.set(e.get() + 1)),
    );
    world
        .add_entity(Entity::new("a").with_hit_box(HitBox::new("body", BoundingShape::rectangle(20.0, 20.0))))
        .unwrap();
    let mover = world
        .add_entity(Entity::new("b").with_hit_box(HitBox::new("body", BoundingShape::rectangle(20.0, 20.0))))
        .unwrap();

    for i in 0..10 {
        world.entity_mut(mover).unwrap().position = Vec2::new(10.0, 0.0);
        run(&mut world, 3);
        assert_eq!(world.collision_pairs().count(), 1);

        world.entity_mut(mover).unwrap().position = Vec2::new(100.0, 0.0);
        run(&mut world, 2);
        assert_eq!(world.collision_pairs().count(), 0);
        assert_eq!(begins.get(), i + 1);
        assert_eq!(ends.get(), i + 1);
    }
}

/// A ball frozen into a static body away from the floor ends its collision
/// once, even though the engine dropped the contact between steps
#[test]
fn test_static_conversion_ends_collision_once() {
    let scene: Scene = ron::from_str(DROP_SCENE).unwrap();
    let mut world = PhysicsWorld::new(600.0, 50.0);
    scene.instantiate(&mut world).unwrap();

    let (ends, e) = counter();
    let (collisions, c) = counter();
    world.add_collision_handler(
        CollisionHandler::new("ball", "ground")
            .on_collision(move |_, _| c.set(c.get() + 1))
            .on_collision_end(move |_, _| e.set(e.get() + 1)),
    );
    run(&mut world, 120);

    let ball = world.find_by_name("ball").unwrap();
    let floor = world.find_by_name("floor").unwrap();
    assert!(world.is_colliding(ball, floor));

    let body = world.entity(ball).unwrap().physics().unwrap().body().unwrap();
    let position = world.world().body(body).unwrap().position();
    world
        .world_mut()
        .set_transform(body, position + Vec2::new(0.0, 4.0), 0.0)
        .unwrap();
    world.world_mut().set_body_type(body, BodyType::Static).unwrap();

    let before = collisions.get();
    run(&mut world, 30);

    assert_eq!(world.world().contact_count(), 0);
    assert_eq!(world.collision_pairs().count(), 0);
    assert_eq!(ends.get(), 1);
    assert_eq!(collisions.get(), before);
}

// ==================== Sensor Tests ====================

/// A body falling through a sensor area enters and then leaves it
#[test]
fn test_sensor_enter_and_leave() {
    let mut world = PhysicsWorld::new(600.0, 50.0);
    let events = Rc::new(RefCell::new(Vec::new()));
    let (enter, leave) = (events.clone(), events.clone());
    let handler = SensorHandler::new()
        .on_collision_begin(move |other| enter.borrow_mut().push(format!("enter {}", other.entity_type())))
        .on_collision_end(move |other| leave.borrow_mut().push(format!("leave {}", other.entity_type())));

    world
        .add_entity(
            Entity::new("zone")
                .at(0.0, 400.0)
                .with_hit_box(HitBox::new("post", BoundingShape::rectangle(10.0, 10.0)))
                .with_physics(PhysicsComponent::new().with_sensor(
                    HitBox::with_origin("area", Vec2::new(0.0, -200.0), BoundingShape::rectangle(200.0, 200.0)),
                    handler,
                )),
        )
        .unwrap();
    let rock = world
        .add_entity(
            Entity::new("rock")
                .at(80.0, 100.0)
                .with_hit_box(HitBox::new("body", BoundingShape::rectangle(10.0, 10.0)))
                .with_physics(PhysicsComponent::new().with_body_type(BodyType::Dynamic)),
        )
        .unwrap();

    run(&mut world, 120);

    // The sensor never pushes the rock
    assert!(world.entity(rock).unwrap().position.y > 400.0);
    assert_eq!(*events.borrow(), vec!["enter rock".to_string(), "leave rock".to_string()]);
}

// ==================== Raycast Tests ====================

/// A ray starting inside a fixture hits it at the start point
#[test]
fn test_raycast_from_inside_fixture() {
    let mut world = PhysicsWorld::new(600.0, 50.0);
    let wall = world
        .add_entity(
            Entity::new("wall")
                .at(100.0, 100.0)
                .with_hit_box(HitBox::new("body", BoundingShape::rectangle(100.0, 100.0)))
                .with_physics(PhysicsComponent::new()),
        )
        .unwrap();

    let result = world.raycast(Vec2::new(150.0, 150.0), Vec2::new(400.0, 150.0));
    assert_eq!(result.entity, Some(wall));
    let point = result.point.unwrap();
    assert!((point.x - 150.0).abs() < 1e-3 && (point.y - 150.0).abs() < 1e-3);
}

/// Raycasts see bodies at their simulated positions
#[test]
fn test_raycast_follows_moving_body() {
    let mut world = PhysicsWorld::new(600.0, 50.0);
    world.set_gravity(0.0, 0.0);
    let target = world
        .add_entity(
            Entity::new("target")
                .at(100.0, 280.0)
                .with_hit_box(HitBox::new("body", BoundingShape::circle(10.0)))
                .with_physics(PhysicsComponent::new().with_body_type(BodyType::Kinematic)),
        )
        .unwrap();
    world.physics(target).unwrap().set_linear_velocity(0.0, 20.0).unwrap();

    let ray = (Vec2::new(0.0, 310.0), Vec2::new(600.0, 310.0));
    assert!(!world.raycast(ray.0, ray.1).is_hit());

    run(&mut world, 60);
    assert_eq!(world.raycast(ray.0, ray.1).entity, Some(target));
}
