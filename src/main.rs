//! kinetic2d - headless physics demo
//!
//! Builds a small scene (floor, falling crates, a bouncing ball, a coin
//! sensor and a pool of water particles), runs it for a few seconds at a fixed
//! step and logs what happened.

use std::cell::Cell;
use std::rc::Rc;

use kinetic2d::config::AppConfig;
use kinetic2d::systems::SimulationSystem;
use kinetic2d_core::{
    BodyTemplate, BodyType, BoundingShape, CollisionHandler, Entity, EntityTemplate, HitBox,
    ParticleColor, ParticleFlags, PhysicsComponent, PhysicsMaterial, PhysicsResult, PhysicsWorld,
    Scene, SensorHandler, Vec2,
};

const DEMO_SECONDS: f32 = 5.0;

fn demo_scene() -> Scene {
    let mut scene = Scene::new("Demo");
    scene.add_entity(
        EntityTemplate::new("ground", 0.0, 550.0)
            .with_name("floor")
            .with_hit_box(HitBox::new("body", BoundingShape::rectangle(800.0, 50.0)))
            .with_body(BodyTemplate::new(BodyType::Static)),
    );
    for i in 0..4 {
        scene.add_entity(
            EntityTemplate::new("crate", 300.0 + 10.0 * i as f32, 100.0 + 60.0 * i as f32)
                .with_hit_box(HitBox::new("body", BoundingShape::rectangle(40.0, 40.0)))
                .with_body(BodyTemplate::new(BodyType::Dynamic).with_material(PhysicsMaterial::WOOD)),
        );
    }
    scene.add_entity(
        EntityTemplate::new("ball", 100.0, 50.0)
            .with_name("ball")
            .with_hit_box(HitBox::new("body", BoundingShape::circle(15.0)))
            .with_body(
                BodyTemplate::new(BodyType::Dynamic)
                    .with_material(PhysicsMaterial::RUBBER)
                    .with_velocity(120.0, 0.0),
            ),
    );
    scene
}

fn populate(world: &mut PhysicsWorld) -> PhysicsResult<Rc<Cell<u32>>> {
    demo_scene().instantiate(world)?;

    let landings = Rc::new(Cell::new(0));
    let l = landings.clone();
    world.add_collision_handler(
        CollisionHandler::new("crate", "ground").on_collision_begin(move |_, _| l.set(l.get() + 1)),
    );
    world.add_collision_handler(CollisionHandler::new("ball", "crate").on_collision_begin(|_, c| {
        log::info!("Ball hit a crate at ({:.0}, {:.0})", c.position.x, c.position.y);
    }));

    let coin = Entity::new("coin")
        .at(600.0, 480.0)
        .with_hit_box(HitBox::new("body", BoundingShape::rectangle(20.0, 20.0)))
        .with_physics(PhysicsComponent::new().with_sensor(
            HitBox::with_origin("pickup", Vec2::new(-20.0, -20.0), BoundingShape::rectangle(60.0, 60.0)),
            SensorHandler::new().on_collision_begin(|other| {
                log::info!("{} reached the coin", other.entity_type());
            }),
        ));
    world.add_entity(coin)?;

    world.add_particles(
        &HitBox::new("water", BoundingShape::rectangle(100.0, 60.0)),
        Vec2::new(650.0, 300.0),
        ParticleFlags::WATER,
        ParticleColor::new(40, 90, 220, 255),
    )?;

    Ok(landings)
}

fn main() {
    let config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load config: {}. Using defaults.", e);
        AppConfig::default()
    });

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.debug.log_level))
        .init();
    log::info!("Starting kinetic2d demo");

    let mut world = config.build_world();
    let landings = match populate(&mut world) {
        Ok(landings) => landings,
        Err(e) => {
            log::error!("Failed to build demo scene: {}", e);
            std::process::exit(1);
        }
    };

    let mut simulation = SimulationSystem::new(&config.simulation);
    let frame_time = simulation.time_step();
    let frames = (DEMO_SECONDS / frame_time).round() as u32;
    for _ in 0..frames {
        simulation.advance(&mut world, frame_time);
    }

    if let Some(ball) = world.find_by_name("ball").and_then(|key| world.entity(key)) {
        log::info!("Ball came to ({:.1}, {:.1})", ball.position.x, ball.position.y);
    }
    let lowest_particle = world
        .particle_positions()
        .iter()
        .map(|p| p.y)
        .fold(f32::MIN, f32::max);

    let stats = world.world().stats();
    log::info!(
        "Simulated {} ticks: {} bodies, {} contacts, {} particles (lowest at y={:.0}), {} crate landings, {} TOI events in the last step",
        world.tick(),
        world.world().body_count(),
        world.world().contact_count(),
        world.particle_count(),
        lowest_particle,
        landings.get(),
        stats.toi_events
    );
}
