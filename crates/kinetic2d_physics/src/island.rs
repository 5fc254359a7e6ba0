//! Islands: groups of bodies connected by contacts and joints
//!
//! Each island is integrated and solved independently, and goes to sleep as a
//! unit once every body in it has been still for long enough.

use kinetic2d_math::Vec2;
use slotmap::SlotMap;

use crate::body::{Body, BodyKey, BodyType};
use crate::contact::{Contact, ContactKey};
use crate::contact_solver::ContactSolver;
use crate::fixture::{Fixture, FixtureKey};
use crate::joints::{Joint, JointKey};
use crate::listener::ContactListener;
use crate::settings::{
    ANGULAR_SLEEP_TOLERANCE, LINEAR_SLEEP_TOLERANCE, MAX_ROTATION, MAX_ROTATION_SQUARED,
    MAX_TRANSLATION, MAX_TRANSLATION_SQUARED, TIME_TO_SLEEP,
};
use crate::step::{Position, SolverData, TimeStep, Velocity};

/// Scratch storage reused for every island in a step
#[derive(Clone, Debug, Default)]
pub(crate) struct Island {
    pub bodies: Vec<BodyKey>,
    pub contacts: Vec<ContactKey>,
    pub joints: Vec<JointKey>,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
}

/// The world state an island solve reads and writes
pub(crate) struct IslandContext<'a> {
    pub bodies: &'a mut SlotMap<BodyKey, Body>,
    pub fixtures: &'a SlotMap<FixtureKey, Fixture>,
    pub contacts: &'a mut SlotMap<ContactKey, Contact>,
    pub joints: &'a mut SlotMap<JointKey, Joint>,
    pub listener: &'a mut dyn ContactListener,
}

/// Scale a velocity down so one step moves at most the per-step limits
fn clamp_motion(h: f32, velocity: &mut Velocity) {
    let translation = velocity.v * h;
    if translation.dot(translation) > MAX_TRANSLATION_SQUARED {
        let ratio = MAX_TRANSLATION / translation.length();
        velocity.v *= ratio;
    }

    let rotation = h * velocity.w;
    if rotation * rotation > MAX_ROTATION_SQUARED {
        let ratio = MAX_ROTATION / rotation.abs();
        velocity.w *= ratio;
    }
}

impl Island {
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
    }

    pub fn add_body(&mut self, key: BodyKey, body: &mut Body) {
        body.island_index = self.bodies.len();
        self.bodies.push(key);
    }

    pub fn add_contact(&mut self, key: ContactKey) {
        self.contacts.push(key);
    }

    pub fn add_joint(&mut self, key: JointKey) {
        self.joints.push(key);
    }

    fn load_state(&mut self, bodies: &SlotMap<BodyKey, Body>) {
        self.positions.clear();
        self.velocities.clear();
        for key in &self.bodies {
            let (position, velocity) = bodies
                .get(*key)
                .map(|b| {
                    (
                        Position { c: b.sweep.c, a: b.sweep.a },
                        Velocity { v: b.linear_velocity, w: b.angular_velocity },
                    )
                })
                .unwrap_or_default();
            self.positions.push(position);
            self.velocities.push(velocity);
        }
    }

    fn store_state(&self, bodies: &mut SlotMap<BodyKey, Body>) {
        for (i, key) in self.bodies.iter().enumerate() {
            if let Some(body) = bodies.get_mut(*key) {
                body.sweep.c = self.positions[i].c;
                body.sweep.a = self.positions[i].a;
                body.linear_velocity = self.velocities[i].v;
                body.angular_velocity = self.velocities[i].w;
                body.synchronize_transform();
            }
        }
    }

    fn report(&self, solver: &ContactSolver, contacts: &SlotMap<ContactKey, Contact>, listener: &mut dyn ContactListener) {
        for (key, impulse) in solver.impulses() {
            if let Some(contact) = contacts.get(key) {
                listener.post_solve(contact, &impulse);
            }
        }
    }

    /// Integrate, solve constraints and update sleep state for one island
    pub fn solve(&mut self, step: &TimeStep, gravity: Vec2, allow_sleep: bool, ctx: &mut IslandContext) {
        let h = step.dt;

        // Integrate velocities and remember where the step started
        self.positions.clear();
        self.velocities.clear();
        for key in &self.bodies {
            let Some(body) = ctx.bodies.get_mut(*key) else {
                self.positions.push(Position::default());
                self.velocities.push(Velocity::default());
                continue;
            };
            let c = body.sweep.c;
            let a = body.sweep.a;
            let mut v = body.linear_velocity;
            let mut w = body.angular_velocity;

            body.sweep.c0 = c;
            body.sweep.a0 = a;

            if body.body_type == BodyType::Dynamic {
                v += (gravity * body.gravity_scale + body.force * body.inv_mass) * h;
                w += h * body.inv_inertia * body.torque;

                // Pade approximation of exponential damping, stable for large h
                v *= 1.0 / (1.0 + h * body.linear_damping);
                w *= 1.0 / (1.0 + h * body.angular_damping);
            }

            self.positions.push(Position { c, a });
            self.velocities.push(Velocity { v, w });
        }

        let mut solver = ContactSolver::new(*step, &self.contacts, ctx.contacts, ctx.fixtures, ctx.bodies);
        solver.initialize_velocity_constraints(ctx.contacts, &self.positions, &self.velocities);
        if step.warm_starting {
            solver.warm_start(&mut self.velocities);
        }

        {
            let mut data = SolverData {
                step: *step,
                positions: &mut self.positions,
                velocities: &mut self.velocities,
            };
            for key in &self.joints {
                if let Some(joint) = ctx.joints.get_mut(*key) {
                    joint.init_velocity_constraints(&mut data, ctx.bodies);
                }
            }

            for _ in 0..step.velocity_iterations {
                for key in &self.joints {
                    if let Some(joint) = ctx.joints.get_mut(*key) {
                        joint.solve_velocity_constraints(&mut data);
                    }
                }
                solver.solve_velocity_constraints(&mut *data.velocities);
            }
        }

        solver.store_impulses(ctx.contacts);

        // Integrate positions
        for (position, velocity) in self.positions.iter_mut().zip(self.velocities.iter_mut()) {
            clamp_motion(h, velocity);
            position.c += velocity.v * h;
            position.a += h * velocity.w;
        }

        let mut position_solved = false;
        {
            let mut data = SolverData {
                step: *step,
                positions: &mut self.positions,
                velocities: &mut self.velocities,
            };
            for _ in 0..step.position_iterations {
                let contacts_okay = solver.solve_position_constraints(&mut *data.positions);

                let mut joints_okay = true;
                for key in &self.joints {
                    if let Some(joint) = ctx.joints.get_mut(*key) {
                        joints_okay &= joint.solve_position_constraints(&mut data);
                    }
                }

                if contacts_okay && joints_okay {
                    // Exit early if the position errors are small
                    position_solved = true;
                    break;
                }
            }
        }

        self.store_state(ctx.bodies);
        self.report(&solver, ctx.contacts, ctx.listener);

        if allow_sleep {
            let mut min_sleep_time = f32::MAX;
            let lin_tol_sqr = LINEAR_SLEEP_TOLERANCE * LINEAR_SLEEP_TOLERANCE;
            let ang_tol_sqr = ANGULAR_SLEEP_TOLERANCE * ANGULAR_SLEEP_TOLERANCE;

            for key in &self.bodies {
                let Some(body) = ctx.bodies.get_mut(*key) else {
                    continue;
                };
                if body.body_type == BodyType::Static {
                    continue;
                }
                let moving = body.angular_velocity * body.angular_velocity > ang_tol_sqr
                    || body.linear_velocity.dot(body.linear_velocity) > lin_tol_sqr;
                if !body.is_sleeping_allowed() || moving {
                    body.sleep_time = 0.0;
                    min_sleep_time = 0.0;
                } else {
                    body.sleep_time += h;
                    min_sleep_time = min_sleep_time.min(body.sleep_time);
                }
            }

            if min_sleep_time >= TIME_TO_SLEEP && position_solved {
                for key in &self.bodies {
                    if let Some(body) = ctx.bodies.get_mut(*key) {
                        body.set_awake(false);
                    }
                }
            }
        }
    }

    /// Resolve one time-of-impact event for the remainder of the step
    ///
    /// Only the two impact bodies are moved by position correction; the rest
    /// of the island acts as fixed obstacles.
    pub fn solve_toi(
        &mut self,
        sub_step: &TimeStep,
        toi_index_a: usize,
        toi_index_b: usize,
        ctx: &mut IslandContext,
    ) {
        self.load_state(ctx.bodies);

        let mut solver =
            ContactSolver::new(*sub_step, &self.contacts, ctx.contacts, ctx.fixtures, ctx.bodies);

        for _ in 0..sub_step.position_iterations {
            if solver.solve_toi_position_constraints(&mut self.positions, toi_index_a, toi_index_b) {
                break;
            }
        }

        // Leap of faith: the new sweep starts at the corrected position
        for index in [toi_index_a, toi_index_b] {
            if let Some(body) = self.bodies.get(index).and_then(|key| ctx.bodies.get_mut(*key)) {
                body.sweep.c0 = self.positions[index].c;
                body.sweep.a0 = self.positions[index].a;
            }
        }

        // No warm starting; TOI impulses are not stored since they can be large
        solver.initialize_velocity_constraints(ctx.contacts, &self.positions, &self.velocities);
        for _ in 0..sub_step.velocity_iterations {
            solver.solve_velocity_constraints(&mut self.velocities);
        }

        let h = sub_step.dt;
        for (position, velocity) in self.positions.iter_mut().zip(self.velocities.iter_mut()) {
            clamp_motion(h, velocity);
            position.c += velocity.v * h;
            position.a += h * velocity.w;
        }

        self.store_state(ctx.bodies);
        self.report(&solver, ctx.contacts, ctx.listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;
    use crate::listener::NoopListener;

    struct Fixtureless {
        bodies: SlotMap<BodyKey, Body>,
        fixtures: SlotMap<FixtureKey, Fixture>,
        contacts: SlotMap<ContactKey, Contact>,
        joints: SlotMap<JointKey, Joint>,
    }

    impl Fixtureless {
        fn new() -> Self {
            Self {
                bodies: SlotMap::with_key(),
                fixtures: SlotMap::with_key(),
                contacts: SlotMap::with_key(),
                joints: SlotMap::with_key(),
            }
        }

        fn solve(&mut self, island: &mut Island, step: &TimeStep, allow_sleep: bool) {
            let mut listener = NoopListener;
            let mut ctx = IslandContext {
                bodies: &mut self.bodies,
                fixtures: &self.fixtures,
                contacts: &mut self.contacts,
                joints: &mut self.joints,
                listener: &mut listener,
            };
            island.solve(step, Vec2::new(0.0, -10.0), allow_sleep, &mut ctx);
        }
    }

    #[test]
    fn test_gravity_integrates_dynamic_bodies() {
        let mut world = Fixtureless::new();
        let key = world.bodies.insert(Body::new(&BodyDef::new(BodyType::Dynamic)));
        let mut island = Island::default();
        island.add_body(key, &mut world.bodies[key]);

        let step = TimeStep::new(0.1, 8, 3);
        world.solve(&mut island, &step, false);

        let body = &world.bodies[key];
        assert!((body.linear_velocity().y + 1.0).abs() < 1e-5);
        assert!((body.position().y + 0.1).abs() < 1e-5);
        assert_eq!(body.sweep.c0, Vec2::ZERO);
    }

    #[test]
    fn test_translation_is_clamped() {
        let mut world = Fixtureless::new();
        let key = world.bodies.insert(Body::new(
            &BodyDef::new(BodyType::Kinematic).with_linear_velocity(Vec2::new(1000.0, 0.0)),
        ));
        let mut island = Island::default();
        island.add_body(key, &mut world.bodies[key]);

        world.solve(&mut island, &TimeStep::new(0.1, 8, 3), false);
        assert!((world.bodies[key].position().x - MAX_TRANSLATION).abs() < 1e-4);
    }

    #[test]
    fn test_still_island_falls_asleep() {
        let mut world = Fixtureless::new();
        let key = world.bodies.insert(Body::new(
            &BodyDef::new(BodyType::Dynamic).with_gravity_scale(0.0),
        ));
        let mut island = Island::default();
        island.add_body(key, &mut world.bodies[key]);

        let step = TimeStep::new(0.1, 8, 3);
        for _ in 0..10 {
            world.solve(&mut island, &step, true);
        }
        assert!(!world.bodies[key].is_awake());
    }
}
