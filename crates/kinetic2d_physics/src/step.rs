//! Per-step solver state shared by islands, contacts and joints

use kinetic2d_math::Vec2;

/// Timing and iteration counts for one solve
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct TimeStep {
    pub dt: f32,
    /// Zero when `dt` is zero
    pub inv_dt: f32,
    /// `dt * inv_dt` of the previous step, rescales warm-start impulses
    pub dt_ratio: f32,
    pub velocity_iterations: usize,
    pub position_iterations: usize,
    pub warm_starting: bool,
}

impl TimeStep {
    pub fn new(dt: f32, velocity_iterations: usize, position_iterations: usize) -> Self {
        Self {
            dt,
            inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            dt_ratio: 1.0,
            velocity_iterations,
            position_iterations,
            warm_starting: true,
        }
    }
}

/// Center of mass position and angle of an island body
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Position {
    pub c: Vec2,
    pub a: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Velocity {
    pub v: Vec2,
    pub w: f32,
}

/// What joints see while the island is being solved
pub(crate) struct SolverData<'a> {
    pub step: TimeStep,
    pub positions: &'a mut [Position],
    pub velocities: &'a mut [Velocity],
}

/// Counters from the most recent [`World::step`](crate::World::step)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Islands solved by the discrete pass
    pub islands: usize,
    /// Time-of-impact events resolved by the continuous pass
    pub toi_events: usize,
    /// Contacts that hit the sub-step cap and were left to the discrete solver
    pub toi_dropped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_dt_has_zero_inverse() {
        let step = TimeStep::new(0.0, 8, 3);
        assert_eq!(step.inv_dt, 0.0);
        let step = TimeStep::new(0.5, 8, 3);
        assert_eq!(step.inv_dt, 2.0);
    }
}
