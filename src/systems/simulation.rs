//! Fixed-step simulation system
//!
//! Converts variable frame times into whole physics steps:
//! - Delta time calculation from the wall clock
//! - Frame time capping
//! - Accumulating leftover time between frames
//! - Interpolation factor for rendering between steps

use std::time::Instant;

use kinetic2d_core::PhysicsWorld;

use crate::config::SimulationConfig;

/// Result of a simulation update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationResult {
    /// Physics steps taken this frame
    pub steps: u32,
    /// Fraction of a step left in the accumulator, in [0, 1)
    pub alpha: f32,
}

/// Drives a [`PhysicsWorld`] at a fixed time step
pub struct SimulationSystem {
    last_frame: Instant,
    accumulator: f32,
    time_step: f32,
    max_frame_time: f32,
}

impl SimulationSystem {
    pub fn new(config: &SimulationConfig) -> Self {
        let time_step = if config.time_step > 0.0 {
            config.time_step
        } else {
            log::warn!("Invalid time step {}, using 1/60", config.time_step);
            1.0 / 60.0
        };

        Self {
            last_frame: Instant::now(),
            accumulator: 0.0,
            time_step,
            max_frame_time: config.max_frame_time.max(time_step),
        }
    }

    pub fn time_step(&self) -> f32 {
        self.time_step
    }

    /// Run one frame using the time elapsed since the previous call
    pub fn update(&mut self, world: &mut PhysicsWorld) -> SimulationResult {
        let now = Instant::now();
        let frame_time = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.advance(world, frame_time)
    }

    /// Run one frame of `frame_time` seconds
    ///
    /// Frame times above the cap are clamped so a long stall cannot trigger an
    /// unbounded number of catch-up steps.
    pub fn advance(&mut self, world: &mut PhysicsWorld, frame_time: f32) -> SimulationResult {
        self.accumulator += frame_time.clamp(0.0, self.max_frame_time);

        let mut steps = 0;
        while self.accumulator >= self.time_step {
            world.update(self.time_step);
            self.accumulator -= self.time_step;
            steps += 1;
        }

        if steps > 1 {
            log::trace!("Caught up {} steps in one frame", steps);
        }

        SimulationResult {
            steps,
            alpha: self.accumulator / self.time_step,
        }
    }
}

impl Default for SimulationSystem {
    fn default() -> Self {
        Self::new(&SimulationConfig::default())
    }
}
