//! Application systems

mod simulation;

pub use simulation::{SimulationResult, SimulationSystem};
