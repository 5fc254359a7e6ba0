//! Per-step particle dynamics
//!
//! Each pass reads the contacts found this step and nudges velocities;
//! pressure keeps the fluid from compressing, the others are opt-in per flag.

use kinetic2d_math::Vec2;
use slotmap::SlotMap;

use super::system::ParticleSystem;
use super::{ParticleBodyContact, ParticleFlags};
use crate::body::{Body, BodyKey};
use crate::collision::{Aabb, BroadPhase, RayCastInput};
use crate::fixture::{Fixture, FixtureKey, ProxyRef};
use crate::settings::{LINEAR_SLOP, MAX_PARTICLE_WEIGHT, MIN_PARTICLE_WEIGHT, PARTICLE_STRIDE};
use crate::step::TimeStep;

/// Rigid world state the particles collide with
pub(crate) struct ParticleContext<'a> {
    pub broad_phase: &'a BroadPhase<ProxyRef>,
    pub fixtures: &'a SlotMap<FixtureKey, Fixture>,
    pub bodies: &'a mut SlotMap<BodyKey, Body>,
}

impl ParticleContext<'_> {
    /// Non-sensor fixture children whose fat AABB overlaps the box
    fn fixtures_in(&self, aabb: &Aabb) -> Vec<ProxyRef> {
        let broad_phase = self.broad_phase;
        let mut found = Vec::new();
        broad_phase.query(aabb, |proxy_id| {
            if let Some(proxy) = broad_phase.user_data(proxy_id) {
                if self.fixtures.get(proxy.fixture).is_some_and(|f| !f.is_sensor()) {
                    found.push(*proxy);
                }
            }
            true
        });
        found
    }

    fn apply_impulse(&mut self, body: BodyKey, impulse: Vec2, point: Vec2) {
        if let Some(body) = self.bodies.get_mut(body) {
            body.apply_linear_impulse(impulse, point, true);
        }
    }
}

impl ParticleSystem {
    /// Fastest speed a particle may have without skipping a diameter per step
    fn critical_velocity(&self, step: &TimeStep) -> f32 {
        self.diameter() * step.inv_dt
    }

    pub(crate) fn solve(&mut self, step: &TimeStep, gravity: Vec2, ctx: &mut ParticleContext) {
        if self.particle_count() == 0 {
            return;
        }
        if self.flags.iter().any(|f| f.contains(ParticleFlags::ZOMBIE)) {
            self.solve_zombie();
        }
        if self.particle_count() == 0 {
            return;
        }
        let all_flags = self.flags.iter().fold(ParticleFlags::empty(), |acc, f| acc | *f);

        let gravity_dv = gravity * (step.dt * self.def.gravity_scale);
        let critical = self.critical_velocity(step);
        let critical_squared = critical * critical;
        for v in &mut self.velocities {
            *v += gravity_dv;
            let v2 = v.length_squared();
            if v2 > critical_squared {
                *v *= (critical_squared / v2).sqrt();
            }
        }

        self.update_proxies();
        self.solve_collision(step, ctx);
        if all_flags.contains(ParticleFlags::WALL) {
            self.solve_wall();
        }

        for (p, v) in self.positions.iter_mut().zip(&self.velocities) {
            *p += *v * step.dt;
        }

        self.update_body_contacts(ctx);
        self.update_contacts();

        if all_flags.contains(ParticleFlags::VISCOUS) {
            self.solve_viscous(ctx);
        }
        if all_flags.contains(ParticleFlags::POWDER) {
            self.solve_powder(step, ctx);
        }
        if all_flags.contains(ParticleFlags::TENSILE) {
            self.solve_tensile(step);
        }
        if all_flags.contains(ParticleFlags::ELASTIC) {
            self.solve_elastic(step);
        }
        if all_flags.contains(ParticleFlags::SPRING) {
            self.solve_spring(step);
        }
        if all_flags.contains(ParticleFlags::COLOR_MIXING) {
            self.solve_color_mixing();
        }
        self.solve_pressure(step, ctx);
        self.solve_damping(ctx);
    }

    /// Stop particles at fixture surfaces they would cross this step
    fn solve_collision(&mut self, step: &TimeStep, ctx: &mut ParticleContext) {
        let Some(mut aabb) = self.bounds() else {
            return;
        };
        for (p, v) in self.positions.iter().zip(&self.velocities) {
            let p2 = *p + *v * step.dt;
            aabb.lower = aabb.lower.min_components(p2);
            aabb.upper = aabb.upper.max_components(p2);
        }

        let particle_mass = self.particle_mass();
        let diameter = self.diameter();
        for proxy in ctx.fixtures_in(&aabb) {
            let Some(fixture) = ctx.fixtures.get(proxy.fixture) else {
                continue;
            };
            let body_key = fixture.body();
            let Some(body) = ctx.bodies.get(body_key) else {
                continue;
            };
            let (xf, xf0) = (*body.transform(), *body.previous_transform());
            let shape = fixture.shape();
            let child_aabb = shape.compute_aabb(&xf, proxy.child_index).fattened(diameter);

            let mut impulses = Vec::new();
            for a in self.particles_in(&child_aabb) {
                let ap = self.positions[a];
                let av = self.velocities[a];
                // Start where the particle was relative to the body last step
                let input = RayCastInput {
                    p1: xf0.apply(xf.apply_inverse(ap)),
                    p2: ap + av * step.dt,
                    max_fraction: 1.0,
                };
                let Some(output) = shape.ray_cast(&input, &xf, proxy.child_index) else {
                    continue;
                };
                let n = output.normal;
                let p = input.p1 * (1.0 - output.fraction) + input.p2 * output.fraction + n * LINEAR_SLOP;
                let v = (p - ap) * step.inv_dt;
                self.velocities[a] = v;
                let f = (av - v) * particle_mass;
                impulses.push((n * f.dot(n), p));
            }
            for (impulse, point) in impulses {
                ctx.apply_impulse(body_key, impulse, point);
            }
        }
    }

    fn solve_wall(&mut self) {
        for (v, flags) in self.velocities.iter_mut().zip(&self.flags) {
            if flags.contains(ParticleFlags::WALL) {
                *v = Vec2::ZERO;
            }
        }
    }

    /// Find particles within one diameter of a fixture
    fn update_body_contacts(&mut self, ctx: &ParticleContext) {
        self.body_contacts.clear();
        let Some(bounds) = self.bounds() else {
            return;
        };
        let diameter = self.diameter();
        let inv_diameter = self.inv_diameter();
        let particle_inv_mass = self.particle_inv_mass();

        for proxy in ctx.fixtures_in(&bounds.fattened(diameter)) {
            let Some(fixture) = ctx.fixtures.get(proxy.fixture) else {
                continue;
            };
            let body_key = fixture.body();
            let Some(body) = ctx.bodies.get(body_key) else {
                continue;
            };
            let xf = body.transform();
            let body_center = body.world_center();
            let (inv_body_mass, inv_body_i) = (body.inv_mass(), body.inv_inertia);
            let child_aabb = fixture.shape().compute_aabb(xf, proxy.child_index).fattened(diameter);

            for a in self.particles_in(&child_aabb) {
                let ap = self.positions[a];
                let (d, n) = fixture.shape().compute_distance(xf, ap, proxy.child_index);
                if d >= diameter {
                    continue;
                }
                let inv_am = if self.flags[a].contains(ParticleFlags::WALL) {
                    0.0
                } else {
                    particle_inv_mass
                };
                let rpn = (ap - body_center).cross(n);
                let inv_m = inv_am + inv_body_mass + inv_body_i * rpn * rpn;
                self.body_contacts.push(ParticleBodyContact {
                    index: a,
                    body: body_key,
                    weight: 1.0 - d * inv_diameter,
                    normal: -n,
                    mass: if inv_m > 0.0 { 1.0 / inv_m } else { 0.0 },
                });
            }
        }
    }

    fn solve_viscous(&mut self, ctx: &mut ParticleContext) {
        let strength = self.def.viscous_strength;
        let inv_mass = self.particle_inv_mass();
        for i in 0..self.body_contacts.len() {
            let contact = self.body_contacts[i];
            let a = contact.index;
            if !self.flags[a].contains(ParticleFlags::VISCOUS) {
                continue;
            }
            let p = self.positions[a];
            let Some(body) = ctx.bodies.get(contact.body) else {
                continue;
            };
            let v = body.linear_velocity_from_world_point(p) - self.velocities[a];
            let f = v * (strength * contact.mass * contact.weight);
            self.velocities[a] += f * inv_mass;
            ctx.apply_impulse(contact.body, -f, p);
        }
        for contact in &self.contacts {
            if contact.flags.contains(ParticleFlags::VISCOUS) {
                let (a, b) = (contact.index_a, contact.index_b);
                let v = self.velocities[b] - self.velocities[a];
                let f = v * (strength * contact.weight);
                self.velocities[a] += f;
                self.velocities[b] -= f;
            }
        }
    }

    fn solve_powder(&mut self, step: &TimeStep, ctx: &mut ParticleContext) {
        let strength = self.def.powder_strength * self.critical_velocity(step);
        let min_weight = 1.0 - PARTICLE_STRIDE;
        let inv_mass = self.particle_inv_mass();
        for i in 0..self.body_contacts.len() {
            let contact = self.body_contacts[i];
            let a = contact.index;
            if self.flags[a].contains(ParticleFlags::POWDER) && contact.weight > min_weight {
                let p = self.positions[a];
                let f = contact.normal * (strength * contact.mass * (contact.weight - min_weight));
                self.velocities[a] -= f * inv_mass;
                ctx.apply_impulse(contact.body, f, p);
            }
        }
        for contact in &self.contacts {
            if contact.flags.contains(ParticleFlags::POWDER) && contact.weight > min_weight {
                let f = contact.normal * (strength * (contact.weight - min_weight));
                self.velocities[contact.index_a] -= f;
                self.velocities[contact.index_b] += f;
            }
        }
    }

    /// Surface tension: pull surface particles together, smooth the surface
    fn solve_tensile(&mut self, step: &TimeStep) {
        self.accumulation.iter_mut().for_each(|w| *w = 0.0);
        self.accumulation2.iter_mut().for_each(|v| *v = Vec2::ZERO);
        for contact in &self.contacts {
            if contact.flags.contains(ParticleFlags::TENSILE) {
                let (a, b, w) = (contact.index_a, contact.index_b, contact.weight);
                self.accumulation[a] += w;
                self.accumulation[b] += w;
                let inter = contact.normal * ((1.0 - w) * w);
                self.accumulation2[a] -= inter;
                self.accumulation2[b] += inter;
            }
        }

        let critical = self.critical_velocity(step);
        let strength_a = self.def.tensile_pressure_strength * critical;
        let strength_b = self.def.tensile_normal_strength * critical;
        for contact in &self.contacts {
            if contact.flags.contains(ParticleFlags::TENSILE) {
                let (a, b, w, n) = (contact.index_a, contact.index_b, contact.weight, contact.normal);
                let h = self.accumulation[a] + self.accumulation[b];
                let s = self.accumulation2[b] - self.accumulation2[a];
                let f = n * ((strength_a * (h - 2.0) + strength_b * s.dot(n)) * w);
                self.velocities[a] -= f;
                self.velocities[b] += f;
            }
        }
    }

    /// Restore each triad towards its rest shape, allowing rotation
    fn solve_elastic(&mut self, step: &TimeStep) {
        let elastic_strength = step.inv_dt * self.def.elastic_strength;
        for triad in &self.triads {
            if !triad.flags.contains(ParticleFlags::ELASTIC) {
                continue;
            }
            let (a, b, c) = (triad.index_a, triad.index_b, triad.index_c);
            let mut pa = self.positions[a] + self.velocities[a] * step.dt;
            let mut pb = self.positions[b] + self.velocities[b] * step.dt;
            let mut pc = self.positions[c] + self.velocities[c] * step.dt;
            let mid = (pa + pb + pc) * (1.0 / 3.0);
            pa -= mid;
            pb -= mid;
            pc -= mid;

            // Best-fit rotation of the rest shape onto the current one
            let mut rs = triad.pa.cross(pa) + triad.pb.cross(pb) + triad.pc.cross(pc);
            let mut rc = triad.pa.dot(pa) + triad.pb.dot(pb) + triad.pc.dot(pc);
            let r2 = rs * rs + rc * rc;
            if r2 <= f32::EPSILON {
                continue;
            }
            let inv_r = 1.0 / r2.sqrt();
            rs *= inv_r;
            rc *= inv_r;
            let rotate = |o: Vec2| Vec2::new(rc * o.x - rs * o.y, rs * o.x + rc * o.y);

            let strength = elastic_strength * triad.strength;
            self.velocities[a] += (rotate(triad.pa) - pa) * strength;
            self.velocities[b] += (rotate(triad.pb) - pb) * strength;
            self.velocities[c] += (rotate(triad.pc) - pc) * strength;
        }
    }

    fn solve_spring(&mut self, step: &TimeStep) {
        let spring_strength = step.inv_dt * self.def.spring_strength;
        for pair in &self.pairs {
            if !pair.flags.contains(ParticleFlags::SPRING) {
                continue;
            }
            let (a, b) = (pair.index_a, pair.index_b);
            let pa = self.positions[a] + self.velocities[a] * step.dt;
            let pb = self.positions[b] + self.velocities[b] * step.dt;
            let d = pb - pa;
            let r1 = d.length();
            if r1 <= f32::EPSILON {
                continue;
            }
            let strength = spring_strength * pair.strength;
            let f = d * (strength * (pair.distance - r1) / r1);
            self.velocities[a] -= f;
            self.velocities[b] += f;
        }
    }

    fn solve_color_mixing(&mut self) {
        let strength = (256.0 * self.def.color_mixing_strength) as i32;
        for contact in &self.contacts {
            let (a, b) = (contact.index_a, contact.index_b);
            if (self.flags[a] & self.flags[b]).contains(ParticleFlags::COLOR_MIXING) {
                let (lo, hi) = (a.min(b), a.max(b));
                let (head, tail) = self.colors.split_at_mut(hi);
                head[lo].mix(&mut tail[0], strength);
            }
        }
    }

    /// Push particles apart in proportion to how crowded they are
    fn solve_pressure(&mut self, step: &TimeStep, ctx: &mut ParticleContext) {
        self.accumulation.iter_mut().for_each(|w| *w = 0.0);
        for contact in &self.body_contacts {
            self.accumulation[contact.index] += contact.weight;
        }
        for contact in &self.contacts {
            self.accumulation[contact.index_a] += contact.weight;
            self.accumulation[contact.index_b] += contact.weight;
        }
        for (w, flags) in self.accumulation.iter_mut().zip(&self.flags) {
            if flags.contains(ParticleFlags::POWDER) {
                *w = 0.0;
            }
        }

        let critical = self.critical_velocity(step);
        let critical_pressure = self.def.density * critical * critical;
        let pressure_per_weight = self.def.pressure_strength * critical_pressure;
        for w in &mut self.accumulation {
            *w = pressure_per_weight * (w.min(MAX_PARTICLE_WEIGHT) - MIN_PARTICLE_WEIGHT).max(0.0);
        }

        let velocity_per_pressure = step.dt / (self.def.density * self.diameter());
        let inv_mass = self.particle_inv_mass();
        for i in 0..self.body_contacts.len() {
            let contact = self.body_contacts[i];
            let a = contact.index;
            let p = self.positions[a];
            let h = self.accumulation[a] + pressure_per_weight * contact.weight;
            let f = contact.normal * (velocity_per_pressure * contact.weight * contact.mass * h);
            self.velocities[a] -= f * inv_mass;
            ctx.apply_impulse(contact.body, f, p);
        }
        for contact in &self.contacts {
            let (a, b) = (contact.index_a, contact.index_b);
            let h = self.accumulation[a] + self.accumulation[b];
            let f = contact.normal * (velocity_per_pressure * contact.weight * h);
            self.velocities[a] -= f;
            self.velocities[b] += f;
        }
    }

    /// Remove approaching velocity at contacts
    fn solve_damping(&mut self, ctx: &mut ParticleContext) {
        let damping = self.def.damping_strength;
        let inv_mass = self.particle_inv_mass();
        for i in 0..self.body_contacts.len() {
            let contact = self.body_contacts[i];
            let a = contact.index;
            let p = self.positions[a];
            let Some(body) = ctx.bodies.get(contact.body) else {
                continue;
            };
            let v = body.linear_velocity_from_world_point(p) - self.velocities[a];
            let vn = v.dot(contact.normal);
            if vn < 0.0 {
                let f = contact.normal * (damping * contact.weight * contact.mass * vn);
                self.velocities[a] += f * inv_mass;
                ctx.apply_impulse(contact.body, -f, p);
            }
        }
        for contact in &self.contacts {
            let (a, b) = (contact.index_a, contact.index_b);
            let vn = (self.velocities[b] - self.velocities[a]).dot(contact.normal);
            if vn < 0.0 {
                let f = contact.normal * (damping * contact.weight * vn);
                self.velocities[a] += f;
                self.velocities[b] -= f;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;
    use crate::particle::{ParticleColor, ParticleDef, ParticleGroupDef, ParticleSystemDef};
    use crate::shapes::PolygonShape;

    struct Empty {
        broad_phase: BroadPhase<ProxyRef>,
        fixtures: SlotMap<FixtureKey, Fixture>,
        bodies: SlotMap<BodyKey, Body>,
    }

    impl Empty {
        fn new() -> Self {
            Self {
                broad_phase: BroadPhase::new(),
                fixtures: SlotMap::with_key(),
                bodies: SlotMap::with_key(),
            }
        }

        fn ctx(&mut self) -> ParticleContext<'_> {
            ParticleContext {
                broad_phase: &self.broad_phase,
                fixtures: &self.fixtures,
                bodies: &mut self.bodies,
            }
        }
    }

    fn step() -> TimeStep {
        TimeStep::new(1.0 / 60.0, 8, 3)
    }

    #[test]
    fn test_free_particle_falls() {
        let mut ps = ParticleSystem::new(ParticleSystemDef::default());
        ps.create_particle(&ParticleDef::new(Vec2::ZERO));
        let mut world = Empty::new();
        ps.solve(&step(), Vec2::new(0.0, -10.0), &mut world.ctx());
        assert!(ps.velocities()[0].y < 0.0);
        assert!(ps.positions()[0].y < 0.0);
    }

    #[test]
    fn test_wall_particles_do_not_move() {
        let mut ps = ParticleSystem::new(ParticleSystemDef::default());
        ps.create_particle(&ParticleDef::new(Vec2::ZERO).with_flags(ParticleFlags::WALL));
        let mut world = Empty::new();
        for _ in 0..10 {
            ps.solve(&step(), Vec2::new(0.0, -10.0), &mut world.ctx());
        }
        assert_eq!(ps.positions()[0], Vec2::ZERO);
    }

    #[test]
    fn test_velocity_clamped_to_critical() {
        let mut ps = ParticleSystem::new(ParticleSystemDef::default());
        ps.create_particle(&ParticleDef::new(Vec2::ZERO).with_velocity(Vec2::new(1000.0, 0.0)));
        let mut world = Empty::new();
        let step = step();
        ps.solve(&step, Vec2::ZERO, &mut world.ctx());
        // One diameter per step at most
        assert!(ps.velocities()[0].length() <= ps.diameter() * step.inv_dt + 1e-3);
    }

    #[test]
    fn test_pressure_pushes_crowded_particles_apart() {
        let mut ps = ParticleSystem::new(ParticleSystemDef::default());
        for i in 0..6 {
            ps.create_particle(&ParticleDef::new(Vec2::new(i as f32 * 0.01, 0.0)));
        }
        let mut world = Empty::new();
        let spread = |ps: &ParticleSystem| ps.positions()[5].x - ps.positions()[0].x;
        let before = spread(&ps);
        for _ in 0..5 {
            ps.solve(&step(), Vec2::ZERO, &mut world.ctx());
        }
        assert!(spread(&ps) > before);
    }

    #[test]
    fn test_zombies_removed_at_start_of_solve() {
        let mut ps = ParticleSystem::new(ParticleSystemDef::default());
        ps.create_particle(&ParticleDef::new(Vec2::ZERO));
        ps.create_particle(&ParticleDef::new(Vec2::new(10.0, 0.0)));
        ps.destroy_particle(0);
        let mut world = Empty::new();
        ps.solve(&step(), Vec2::ZERO, &mut world.ctx());
        assert_eq!(ps.particle_count(), 1);
        assert!((ps.positions()[0].x - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_color_mixing_blends_touching_particles() {
        let mut ps = ParticleSystem::new(ParticleSystemDef::default());
        let flags = ParticleFlags::COLOR_MIXING;
        ps.create_particle(
            &ParticleDef::new(Vec2::ZERO).with_flags(flags).with_color(ParticleColor::new(0, 0, 0, 255)),
        );
        ps.create_particle(
            &ParticleDef::new(Vec2::new(0.5, 0.0))
                .with_flags(flags)
                .with_color(ParticleColor::new(255, 0, 0, 255)),
        );
        let mut world = Empty::new();
        ps.solve(&step(), Vec2::ZERO, &mut world.ctx());
        assert!(ps.colors()[0].r > 0);
        assert!(ps.colors()[1].r < 255);
    }

    #[test]
    fn test_spring_group_keeps_its_shape_under_gravity() {
        let mut ps = ParticleSystem::new(ParticleSystemDef::default());
        let def = ParticleGroupDef::new(PolygonShape::new_box(1.0, 1.0)).with_flags(ParticleFlags::SPRING);
        ps.create_particle_group(&def);
        let mut world = Empty::new();
        for _ in 0..30 {
            ps.solve(&step(), Vec2::new(0.0, -10.0), &mut world.ctx());
        }
        let d = ps.positions()[0].distance(ps.positions()[1]);
        assert!((d - 0.75).abs() < 0.1);
    }

    #[test]
    fn test_particles_rest_on_static_box() {
        let mut ps = ParticleSystem::new(ParticleSystemDef {
            radius: 0.1,
            ..Default::default()
        });
        ps.create_particle(&ParticleDef::new(Vec2::new(0.0, 0.3)));

        let mut world = Empty::new();
        let body_key = world.bodies.insert(Body::new(&BodyDef::default()));
        let fixture_def = crate::fixture::FixtureDef::new(PolygonShape::new_box(5.0, 0.1));
        let fixture_key = world.fixtures.insert(Fixture::new(body_key, &fixture_def));
        let xf = *world.bodies[body_key].transform();
        if let Some(fixture) = world.fixtures.get_mut(fixture_key) {
            fixture.create_proxies(&mut world.broad_phase, &xf, fixture_key);
        }

        for _ in 0..120 {
            ps.solve(&step(), Vec2::new(0.0, -10.0), &mut world.ctx());
        }
        let y = ps.positions()[0].y;
        assert!(y > 0.1 && y < 0.5, "particle ended at {}", y);
    }
}
