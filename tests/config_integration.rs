//! Integration tests for configuration loading
//!
//! Tests that verify config loading from files and environment variables.

use std::fs;
use std::path::PathBuf;

use kinetic2d::config::AppConfig;
use kinetic2d::systems::SimulationSystem;
use serial_test::serial;

fn temp_config_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("kinetic2d_config_{}_{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
#[serial]
fn test_default_file_loads() {
    std::env::remove_var("K2D_PHYSICS__PIXELS_PER_METER");
    let config = AppConfig::load().unwrap();
    assert_eq!(config.physics.pixels_per_meter, 50.0);
    assert_eq!(config.simulation.velocity_iterations, 8);
    assert_eq!(config.debug.log_level, "info");
}

#[test]
#[serial]
fn test_env_override() {
    std::env::set_var("K2D_PHYSICS__PIXELS_PER_METER", "32");
    let config = AppConfig::load().unwrap();
    std::env::remove_var("K2D_PHYSICS__PIXELS_PER_METER");
    assert_eq!(config.physics.pixels_per_meter, 32.0);
}

#[test]
#[serial]
fn test_user_file_overrides_default() {
    std::env::remove_var("K2D_PHYSICS__PIXELS_PER_METER");
    let dir = temp_config_dir("user");
    fs::write(
        dir.join("default.toml"),
        "[physics]\npixels_per_meter = 50.0\napp_height = 600.0\ngravity = [0.0, 500.0]\n\
         allow_sleep = true\nwarm_starting = true\ncontinuous_physics = true\nsub_stepping = false\n",
    )
    .unwrap();
    fs::write(dir.join("user.toml"), "[debug]\nlog_level = \"debug\"\nlog_collisions = true\n").unwrap();

    let config = AppConfig::load_from(&dir).unwrap();
    fs::remove_dir_all(&dir).ok();

    assert!(config.debug.log_collisions);
    assert_eq!(config.debug.log_level, "debug");
    assert_eq!(config.physics.app_height, 600.0);
}

#[test]
#[serial]
fn test_missing_directory_uses_defaults() {
    let config = AppConfig::load_from("/nonexistent/kinetic2d").unwrap();
    assert_eq!(config.physics.gravity, [0.0, 500.0]);
}

#[test]
#[serial]
fn test_invalid_value_is_an_error() {
    let dir = temp_config_dir("invalid");
    fs::write(dir.join("default.toml"), "[simulation]\ntime_step = \"fast\"\n").unwrap();
    let result = AppConfig::load_from(&dir);
    fs::remove_dir_all(&dir).ok();

    let err = result.unwrap_err();
    assert!(err.to_string().starts_with("Configuration error"));
}

#[test]
fn test_configured_world_runs() {
    let config = AppConfig::default();
    let mut world = config.build_world();
    let mut simulation = SimulationSystem::new(&config.simulation);
    let result = simulation.advance(&mut world, 0.1);
    assert!(result.steps >= 5);
    assert_eq!(world.tick(), u64::from(result.steps));
}
