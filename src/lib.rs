//! kinetic2d - 2D physics for pixel-space applications
//!
//! The root package ties the workspace crates together:
//! - [`config`] - Layered application configuration
//! - [`systems`] - The fixed-step simulation loop

pub mod config;
pub mod systems;
