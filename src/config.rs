//! Application configuration
//!
//! Configuration is loaded from multiple sources with the following priority (lowest to highest):
//! 1. `config/default.toml` (version controlled)
//! 2. `config/user.toml` (gitignored, user overrides)
//! 3. Environment variables (`K2D_SECTION__KEY`)

use figment::{Figment, providers::{Format, Toml, Env}};
use serde::{Serialize, Deserialize};
use std::path::Path;

use kinetic2d_core::{PhysicsWorld, UnitConverter, DEFAULT_PIXELS_PER_METER};
use kinetic2d_math::Vec2;
use kinetic2d_physics::{PhysicsConfig, ParticleSystemDef};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fixed-step loop configuration
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// World scale and engine switches
    #[serde(default)]
    pub physics: PhysicsSection,
    /// Particle system parameters
    #[serde(default)]
    pub particles: ParticlesSection,
    /// Debug configuration
    #[serde(default)]
    pub debug: DebugConfig,
}

impl AppConfig {
    /// Load configuration from default locations
    ///
    /// Priority (lowest to highest):
    /// 1. `config/default.toml`
    /// 2. `config/user.toml`
    /// 3. Environment variables (`K2D_*`)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific config directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let default_path = config_dir.join("default.toml");
        let user_path = config_dir.join("user.toml");

        let mut figment = Figment::new();

        if default_path.exists() {
            figment = figment.merge(Toml::file(&default_path));
        }

        if user_path.exists() {
            figment = figment.merge(Toml::file(&user_path));
        }

        // Environment variables override everything
        // K2D_PHYSICS__PIXELS_PER_METER=32 -> physics.pixels_per_meter = 32
        figment = figment.merge(Env::prefixed("K2D_").split("__"));

        figment.extract().map_err(ConfigError::from)
    }

    /// Engine configuration including the particle system
    pub fn physics_config(&self) -> PhysicsConfig {
        let mut config = self.physics.to_physics_config();
        config.particles = self.particles.to_particle_def(self.physics.pixels_per_meter);
        config
    }

    /// Create an empty world set up from this configuration
    pub fn build_world(&self) -> PhysicsWorld {
        PhysicsWorld::with_config(self.physics.units(), self.physics_config())
            .with_iterations(self.simulation.velocity_iterations, self.simulation.position_iterations)
            .with_collision_logging(self.debug.log_collisions)
    }
}

/// Fixed-step loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seconds per physics step
    pub time_step: f32,
    pub velocity_iterations: usize,
    pub position_iterations: usize,
    /// Longest frame the loop will catch up on, in seconds
    pub max_frame_time: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_step: 1.0 / 60.0,
            velocity_iterations: 8,
            position_iterations: 3,
            max_frame_time: 0.25,
        }
    }
}

/// World scale and engine switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsSection {
    pub pixels_per_meter: f32,
    /// Height of the application area in pixels
    pub app_height: f32,
    /// Gravity in pixels per second squared, y down
    pub gravity: [f32; 2],
    pub allow_sleep: bool,
    pub warm_starting: bool,
    pub continuous_physics: bool,
    pub sub_stepping: bool,
}

impl Default for PhysicsSection {
    fn default() -> Self {
        Self {
            pixels_per_meter: DEFAULT_PIXELS_PER_METER,
            app_height: 600.0,
            gravity: [0.0, 500.0],
            allow_sleep: true,
            warm_starting: true,
            continuous_physics: true,
            sub_stepping: false,
        }
    }
}

impl PhysicsSection {
    pub fn units(&self) -> UnitConverter {
        UnitConverter::new(self.app_height, self.pixels_per_meter)
    }

    /// Convert to the engine's config (meters, y up)
    pub fn to_physics_config(&self) -> PhysicsConfig {
        let [gx, gy] = self.gravity;
        PhysicsConfig {
            gravity: self.units().to_vector(Vec2::new(gx, gy)),
            allow_sleep: self.allow_sleep,
            warm_starting: self.warm_starting,
            continuous_physics: self.continuous_physics,
            sub_stepping: self.sub_stepping,
            ..PhysicsConfig::default()
        }
    }
}

/// Particle system parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticlesSection {
    /// Zero means unlimited
    pub max_count: usize,
    /// Particle radius in pixels
    pub radius: f32,
    pub density: f32,
    pub gravity_scale: f32,
    pub damping: f32,
}

impl Default for ParticlesSection {
    fn default() -> Self {
        Self {
            max_count: 0,
            radius: 5.0,
            density: 1.0,
            gravity_scale: 1.0,
            damping: 1.0,
        }
    }
}

impl ParticlesSection {
    pub fn to_particle_def(&self, pixels_per_meter: f32) -> ParticleSystemDef {
        let radius = if pixels_per_meter > 0.0 {
            self.radius / pixels_per_meter
        } else {
            self.radius / DEFAULT_PIXELS_PER_METER
        };
        ParticleSystemDef {
            radius,
            density: self.density,
            gravity_scale: self.gravity_scale,
            damping_strength: self.damping,
            max_count: self.max_count,
            ..ParticleSystemDef::default()
        }
    }
}

/// Debug configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
    /// Log every collision begin and end
    pub log_collisions: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_collisions: false,
        }
    }
}

/// Configuration error
#[derive(Debug)]
pub struct ConfigError {
    message: String,
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError {
            message: e.to_string(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.physics.pixels_per_meter, 50.0);
        assert_eq!(config.simulation.velocity_iterations, 8);
        assert_eq!(config.physics.gravity, [0.0, 500.0]);
    }

    #[test]
    fn test_gravity_converts_to_meters() {
        let config = PhysicsSection::default().to_physics_config();
        assert!((config.gravity.x).abs() < 1e-6);
        assert!((config.gravity.y + 10.0).abs() < 1e-4);
        assert!(config.continuous_physics);
    }

    #[test]
    fn test_particle_radius_in_meters() {
        let def = ParticlesSection::default().to_particle_def(50.0);
        assert!((def.radius - 0.1).abs() < 1e-6);
        assert_eq!(def.max_count, 0);
    }

    #[test]
    fn test_build_world_uses_scale() {
        let mut config = AppConfig::default();
        config.physics.app_height = 480.0;
        let world = config.build_world();
        assert_eq!(world.units().app_height(), 480.0);
        assert!((world.gravity().y - 500.0).abs() < 1e-3);
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml = toml::to_string(&config).unwrap();
        assert!(toml.contains("pixels_per_meter"));
        assert!(toml.contains("time_step"));
        assert!(toml.contains("log_collisions"));
    }
}
