//! Particle buffers, creation, destruction and queries

use std::collections::HashMap;

use kinetic2d_math::{Transform2D, Vec2};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use super::group::{ParticleGroup, ParticleGroupDef, ParticleGroupKey, ParticleGroupStats};
use super::{
    ParticleBodyContact, ParticleColor, ParticleContact, ParticleDef, ParticleFlags, ParticlePair,
    ParticleTriad,
};
use crate::collision::Aabb;
use crate::error::{PhysicsError, PhysicsResult};
use crate::settings::{MIN_PARTICLE_BUFFER_CAPACITY, PARTICLE_STRIDE};
use crate::shapes::Shape;

/// Tuning parameters shared by every particle in a system
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleSystemDef {
    pub radius: f32,
    pub density: f32,
    /// Multiplier on world gravity
    pub gravity_scale: f32,
    /// Removes approaching velocity at contacts
    pub damping_strength: f32,
    pub pressure_strength: f32,
    pub viscous_strength: f32,
    pub powder_strength: f32,
    pub spring_strength: f32,
    pub elastic_strength: f32,
    /// Surface tension from neighbour count
    pub tensile_pressure_strength: f32,
    /// Surface tension along the surface normal
    pub tensile_normal_strength: f32,
    pub color_mixing_strength: f32,
    /// Zero means unlimited
    pub max_count: usize,
}

impl Default for ParticleSystemDef {
    fn default() -> Self {
        Self {
            radius: 0.5,
            density: 1.0,
            gravity_scale: 1.0,
            damping_strength: 1.0,
            pressure_strength: 0.05,
            viscous_strength: 0.25,
            powder_strength: 0.5,
            spring_strength: 0.25,
            elastic_strength: 0.25,
            tensile_pressure_strength: 0.1,
            tensile_normal_strength: 0.2,
            color_mixing_strength: 0.5,
            max_count: 0,
        }
    }
}

/// Grid cell of a particle, row first so rows sort contiguously
pub(crate) type Cell = (i32, i32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Proxy {
    pub index: usize,
    pub cell: Cell,
}

/// All particles of a world
///
/// Particle indices are stable until the next step; destroyed particles are
/// compacted away at its start, shifting later indices down.
#[derive(Debug, Default)]
pub struct ParticleSystem {
    pub(crate) def: ParticleSystemDef,

    pub(crate) flags: Vec<ParticleFlags>,
    pub(crate) positions: Vec<Vec2>,
    pub(crate) velocities: Vec<Vec2>,
    pub(crate) colors: Vec<ParticleColor>,
    pub(crate) group_of: Vec<Option<ParticleGroupKey>>,
    pub(crate) user_data: Vec<u64>,

    /// Scratch used by pressure and surface tension
    pub(crate) accumulation: Vec<f32>,
    pub(crate) accumulation2: Vec<Vec2>,

    /// Particles sorted by grid cell
    pub(crate) proxies: Vec<Proxy>,
    proxies_current: bool,

    pub(crate) contacts: Vec<ParticleContact>,
    pub(crate) body_contacts: Vec<ParticleBodyContact>,
    pub(crate) pairs: Vec<ParticlePair>,
    pub(crate) triads: Vec<ParticleTriad>,

    pub(crate) groups: SlotMap<ParticleGroupKey, ParticleGroup>,
}

impl ParticleSystem {
    pub fn new(def: ParticleSystemDef) -> Self {
        Self {
            def,
            ..Default::default()
        }
    }

    pub fn def(&self) -> &ParticleSystemDef {
        &self.def
    }

    pub fn particle_count(&self) -> usize {
        self.positions.len()
    }

    pub fn max_count(&self) -> usize {
        self.def.max_count
    }

    /// Zero removes the limit; existing particles beyond it are kept
    pub fn set_max_count(&mut self, count: usize) {
        self.def.max_count = count;
    }

    pub fn radius(&self) -> f32 {
        self.def.radius
    }

    pub fn set_radius(&mut self, radius: f32) -> PhysicsResult<()> {
        if !(radius > 0.0) {
            return Err(PhysicsError::InvalidArgument(format!(
                "particle radius must be positive, got {}",
                radius
            )));
        }
        self.def.radius = radius;
        self.proxies_current = false;
        Ok(())
    }

    pub fn density(&self) -> f32 {
        self.def.density
    }

    pub fn set_density(&mut self, density: f32) -> PhysicsResult<()> {
        if !(density > 0.0) {
            return Err(PhysicsError::InvalidArgument(format!(
                "particle density must be positive, got {}",
                density
            )));
        }
        self.def.density = density;
        Ok(())
    }

    pub fn gravity_scale(&self) -> f32 {
        self.def.gravity_scale
    }

    pub fn set_gravity_scale(&mut self, scale: f32) {
        self.def.gravity_scale = scale;
    }

    pub fn damping(&self) -> f32 {
        self.def.damping_strength
    }

    pub fn set_damping(&mut self, damping: f32) {
        self.def.damping_strength = damping;
    }

    #[inline]
    pub(crate) fn diameter(&self) -> f32 {
        2.0 * self.def.radius
    }

    #[inline]
    pub(crate) fn inv_diameter(&self) -> f32 {
        1.0 / self.diameter()
    }

    /// Spacing used when filling shapes
    #[inline]
    pub(crate) fn stride(&self) -> f32 {
        PARTICLE_STRIDE * self.diameter()
    }

    /// Mass of one particle: its share of a filled area at the system density
    pub fn particle_mass(&self) -> f32 {
        let stride = self.stride();
        self.def.density * stride * stride
    }

    #[inline]
    pub(crate) fn particle_inv_mass(&self) -> f32 {
        1.0 / self.particle_mass()
    }

    // --- Buffers ---

    pub fn positions(&self) -> &[Vec2] {
        &self.positions
    }

    pub fn velocities(&self) -> &[Vec2] {
        &self.velocities
    }

    pub fn colors(&self) -> &[ParticleColor] {
        &self.colors
    }

    pub fn flags(&self) -> &[ParticleFlags] {
        &self.flags
    }

    /// Positions as raw bytes for upload to a renderer
    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn color_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.colors)
    }

    pub fn set_particle_flags(&mut self, index: usize, flags: ParticleFlags) {
        if let Some(f) = self.flags.get_mut(index) {
            *f = flags;
        }
    }

    pub fn set_particle_velocity(&mut self, index: usize, velocity: Vec2) {
        if let Some(v) = self.velocities.get_mut(index) {
            *v = velocity;
        }
    }

    pub fn particle_user_data(&self, index: usize) -> Option<u64> {
        self.user_data.get(index).copied()
    }

    pub fn set_particle_user_data(&mut self, index: usize, data: u64) {
        if let Some(d) = self.user_data.get_mut(index) {
            *d = data;
        }
    }

    /// Group a particle belongs to, if any
    pub fn particle_group(&self, index: usize) -> Option<ParticleGroupKey> {
        self.group_of.get(index).copied().flatten()
    }

    pub fn group(&self, key: ParticleGroupKey) -> Option<&ParticleGroup> {
        self.groups.get(key)
    }

    pub fn group_mut(&mut self, key: ParticleGroupKey) -> Option<&mut ParticleGroup> {
        self.groups.get_mut(key)
    }

    pub fn groups(&self) -> impl Iterator<Item = (ParticleGroupKey, &ParticleGroup)> {
        self.groups.iter()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    // --- Creation ---

    /// Add one particle; `None` once the maximum count is reached
    pub fn create_particle(&mut self, def: &ParticleDef) -> Option<usize> {
        let count = self.particle_count();
        if self.def.max_count > 0 && count >= self.def.max_count {
            return None;
        }
        if self.positions.capacity() == 0 {
            let capacity = if self.def.max_count > 0 {
                self.def.max_count.min(MIN_PARTICLE_BUFFER_CAPACITY)
            } else {
                MIN_PARTICLE_BUFFER_CAPACITY
            };
            self.reserve(capacity);
        }

        self.flags.push(def.flags);
        self.positions.push(def.position);
        self.velocities.push(def.velocity);
        self.colors.push(def.color);
        self.group_of.push(None);
        self.user_data.push(0);
        self.accumulation.push(0.0);
        self.accumulation2.push(Vec2::ZERO);
        self.proxies_current = false;
        Some(count)
    }

    fn reserve(&mut self, additional: usize) {
        self.flags.reserve(additional);
        self.positions.reserve(additional);
        self.velocities.reserve(additional);
        self.colors.reserve(additional);
        self.group_of.reserve(additional);
        self.user_data.reserve(additional);
        self.accumulation.reserve(additional);
        self.accumulation2.reserve(additional);
    }

    /// Fill the group's shape with particles and connect them per its flags
    ///
    /// Solid shapes are filled on a grid at the particle stride; edges and
    /// chains get particles along their segments. Filling stops silently at
    /// the maximum particle count.
    pub fn create_particle_group(&mut self, def: &ParticleGroupDef) -> ParticleGroupKey {
        let first = self.particle_count();
        let key = self.groups.insert(ParticleGroup::new(first, first, def));

        let xf = Transform2D::from_angle(def.position, def.angle);
        let mut lattice = HashMap::new();
        if let Some(shape) = &def.shape {
            let complete = match shape {
                Shape::Circle(_) | Shape::Polygon(_) => self.fill_shape(shape, &xf, def, &mut lattice),
                Shape::Edge(_) | Shape::Chain(_) => self.stroke_shape(shape, &xf, def),
            };
            if !complete {
                log::warn!(
                    "Particle group truncated at the maximum of {} particles",
                    self.def.max_count
                );
            }
        }
        let last = self.particle_count();
        for group in &mut self.group_of[first..last] {
            *group = Some(key);
        }
        if let Some(group) = self.groups.get_mut(key) {
            group.last_index = last;
        }

        if def.flags.contains(ParticleFlags::SPRING) {
            self.update_contacts();
            for contact in &self.contacts {
                let (a, b) = (contact.index_a, contact.index_b);
                if a >= first && b >= first {
                    self.pairs.push(ParticlePair {
                        index_a: a,
                        index_b: b,
                        flags: contact.flags,
                        strength: def.strength,
                        distance: self.positions[a].distance(self.positions[b]),
                    });
                }
            }
        }
        if def.flags.contains(ParticleFlags::ELASTIC) {
            self.create_triads(&lattice, def);
        }

        log::debug!("Created particle group with {} particles", last - first);
        key
    }

    fn group_particle(&self, p: Vec2, def: &ParticleGroupDef) -> ParticleDef {
        ParticleDef {
            flags: def.flags,
            position: p,
            velocity: def.linear_velocity + Vec2::scalar_cross(def.angular_velocity, p - def.position),
            color: def.color,
        }
    }

    fn fill_shape(
        &mut self,
        shape: &Shape,
        xf: &Transform2D,
        def: &ParticleGroupDef,
        lattice: &mut HashMap<Cell, usize>,
    ) -> bool {
        let stride = self.stride();
        for child in 0..shape.child_count() {
            let aabb = shape.compute_aabb(&Transform2D::IDENTITY, child);
            let x0 = (aabb.lower.x / stride).floor() as i32;
            let y0 = (aabb.lower.y / stride).floor() as i32;
            let mut j = y0;
            while (j as f32) * stride < aabb.upper.y {
                let mut i = x0;
                while (i as f32) * stride < aabb.upper.x {
                    let local = Vec2::new(i as f32 * stride, j as f32 * stride);
                    if !lattice.contains_key(&(j, i)) && shape.test_point(&Transform2D::IDENTITY, local) {
                        let particle = self.group_particle(xf.apply(local), def);
                        match self.create_particle(&particle) {
                            Some(index) => {
                                lattice.insert((j, i), index);
                            }
                            None => return false,
                        }
                    }
                    i += 1;
                }
                j += 1;
            }
        }
        true
    }

    fn stroke_shape(&mut self, shape: &Shape, xf: &Transform2D, def: &ParticleGroupDef) -> bool {
        let stride = self.stride();
        let edges: Vec<_> = match shape {
            Shape::Edge(edge) => vec![*edge],
            Shape::Chain(chain) => (0..chain.child_count()).map(|i| chain.child_edge(i)).collect(),
            _ => Vec::new(),
        };
        // Carry the leftover distance so spacing stays even across segments
        let mut offset = 0.0;
        for edge in edges {
            let d = edge.vertex2 - edge.vertex1;
            let length = d.length();
            while offset < length {
                let local = edge.vertex1 + d * (offset / length);
                let particle = self.group_particle(xf.apply(local), def);
                if self.create_particle(&particle).is_none() {
                    return false;
                }
                offset += stride;
            }
            offset -= length;
        }
        true
    }

    /// Triangulate the fill lattice into elastic triads
    fn create_triads(&mut self, lattice: &HashMap<Cell, usize>, def: &ParticleGroupDef) {
        let mut cells: Vec<_> = lattice.keys().copied().collect();
        cells.sort_unstable();
        for (j, i) in cells {
            let corner = |dj, di| lattice.get(&(j + dj, i + di)).copied();
            let (Some(a), right, up, diag) = (corner(0, 0), corner(0, 1), corner(1, 0), corner(1, 1)) else {
                continue;
            };
            if let (Some(b), Some(c)) = (right, up) {
                self.push_triad(a, b, c, def);
            }
            if let (Some(b), Some(c), Some(d)) = (right, diag, up) {
                self.push_triad(b, c, d, def);
            }
        }
    }

    fn push_triad(&mut self, a: usize, b: usize, c: usize, def: &ParticleGroupDef) {
        let (pa, pb, pc) = (self.positions[a], self.positions[b], self.positions[c]);
        let mid = (pa + pb + pc) * (1.0 / 3.0);
        self.triads.push(ParticleTriad {
            index_a: a,
            index_b: b,
            index_c: c,
            flags: self.flags[a] | self.flags[b] | self.flags[c],
            strength: def.strength,
            pa: pa - mid,
            pb: pb - mid,
            pc: pc - mid,
        });
    }

    // --- Destruction ---

    /// Mark a particle for removal at the start of the next step
    pub fn destroy_particle(&mut self, index: usize) -> bool {
        match self.flags.get_mut(index) {
            Some(flags) => {
                flags.insert(ParticleFlags::ZOMBIE);
                true
            }
            None => false,
        }
    }

    /// Mark every particle inside the shape; returns how many were marked
    pub fn destroy_particles_in_shape(&mut self, shape: &Shape, xf: &Transform2D) -> usize {
        let mut destroyed = 0;
        for (p, flags) in self.positions.iter().zip(self.flags.iter_mut()) {
            if !flags.contains(ParticleFlags::ZOMBIE) && shape.test_point(xf, *p) {
                flags.insert(ParticleFlags::ZOMBIE);
                destroyed += 1;
            }
        }
        destroyed
    }

    /// Mark every particle of the group; the group goes with its last particle
    pub fn destroy_particle_group(&mut self, key: ParticleGroupKey) -> PhysicsResult<()> {
        let group = self.groups.get_mut(key).ok_or(PhysicsError::UnknownParticleGroup)?;
        group.to_be_destroyed = true;
        let range = group.first_index..group.last_index;
        if range.is_empty() {
            self.groups.remove(key);
            return Ok(());
        }
        for flags in &mut self.flags[range] {
            flags.insert(ParticleFlags::ZOMBIE);
        }
        Ok(())
    }

    /// Merge group B into group A
    ///
    /// The particles of both groups are moved to the end of the buffers so
    /// that A's range is followed directly by B's, then A takes over the
    /// combined range and B is removed. Spring and elastic connections
    /// between the two are created where the groups touch.
    pub fn join_particle_groups(&mut self, a: ParticleGroupKey, b: ParticleGroupKey) -> PhysicsResult<()> {
        if a == b {
            return Err(PhysicsError::InvalidArgument("cannot join a particle group with itself".into()));
        }
        let group_b = self.groups.get(b).ok_or(PhysicsError::UnknownParticleGroup)?;
        let (b_first, b_last) = (group_b.first_index, group_b.last_index);
        let count = self.particle_count();
        self.rotate_buffer(b_first, b_last, count);

        let group_a = self.groups.get(a).ok_or(PhysicsError::UnknownParticleGroup)?;
        let (a_first, a_last) = (group_a.first_index, group_a.last_index);
        let b_first = self.groups.get(b).map_or(count, |g| g.first_index);
        self.rotate_buffer(a_first, a_last, b_first);

        let (joined_first, a_end) = match self.groups.get(a) {
            Some(g) => (g.first_index, g.last_index),
            None => return Err(PhysicsError::UnknownParticleGroup),
        };
        let joined_last = self.groups.get(b).map_or(count, |g| g.last_index);

        let strength = self.groups.get(a).map_or(1.0, |g| g.strength);
        let joined_flags = self.flags[joined_first..joined_last]
            .iter()
            .fold(ParticleFlags::empty(), |acc, f| acc | *f);
        if joined_flags.contains(ParticleFlags::SPRING) {
            self.update_contacts();
            for contact in &self.contacts {
                let (i, j) = (contact.index_a.min(contact.index_b), contact.index_a.max(contact.index_b));
                let across = (joined_first..a_end).contains(&i) && (a_end..joined_last).contains(&j);
                if across {
                    self.pairs.push(ParticlePair {
                        index_a: i,
                        index_b: j,
                        flags: contact.flags,
                        strength,
                        distance: self.positions[i].distance(self.positions[j]),
                    });
                }
            }
        }

        if let Some(removed) = self.groups.remove(b) {
            if let Some(group) = self.groups.get_mut(a) {
                group.last_index = joined_last;
                group.flags |= removed.flags;
                group.destroy_automatically |= removed.destroy_automatically;
            }
        }
        for group in &mut self.group_of[joined_first..joined_last] {
            *group = Some(a);
        }
        Ok(())
    }

    /// Move `[mid, end)` to `start`, shifting `[start, mid)` up
    pub(crate) fn rotate_buffer(&mut self, start: usize, mid: usize, end: usize) {
        if start == mid || mid == end {
            return;
        }
        let new_index = |i: usize| {
            if i < start || i >= end {
                i
            } else if i < mid {
                i + end - mid
            } else {
                i + start - mid
            }
        };

        let k = mid - start;
        self.flags[start..end].rotate_left(k);
        self.positions[start..end].rotate_left(k);
        self.velocities[start..end].rotate_left(k);
        self.colors[start..end].rotate_left(k);
        self.group_of[start..end].rotate_left(k);
        self.user_data[start..end].rotate_left(k);

        for pair in &mut self.pairs {
            pair.index_a = new_index(pair.index_a);
            pair.index_b = new_index(pair.index_b);
        }
        for triad in &mut self.triads {
            triad.index_a = new_index(triad.index_a);
            triad.index_b = new_index(triad.index_b);
            triad.index_c = new_index(triad.index_c);
        }
        for group in self.groups.values_mut() {
            if group.first_index < group.last_index {
                group.first_index = new_index(group.first_index);
                group.last_index = new_index(group.last_index - 1) + 1;
            } else {
                let moved = new_index(group.first_index);
                group.first_index = moved;
                group.last_index = moved;
            }
        }
        self.contacts.clear();
        self.body_contacts.clear();
        self.proxies_current = false;
    }

    /// Compact away zombie particles and drop groups left empty
    pub(crate) fn solve_zombie(&mut self) {
        let count = self.particle_count();
        let mut new_indices = vec![None; count];
        let mut write = 0;
        for read in 0..count {
            if self.flags[read].contains(ParticleFlags::ZOMBIE) {
                continue;
            }
            new_indices[read] = Some(write);
            if read != write {
                self.flags[write] = self.flags[read];
                self.positions[write] = self.positions[read];
                self.velocities[write] = self.velocities[read];
                self.colors[write] = self.colors[read];
                self.group_of[write] = self.group_of[read];
                self.user_data[write] = self.user_data[read];
            }
            write += 1;
        }
        self.flags.truncate(write);
        self.positions.truncate(write);
        self.velocities.truncate(write);
        self.colors.truncate(write);
        self.group_of.truncate(write);
        self.user_data.truncate(write);
        self.accumulation.truncate(write);
        self.accumulation2.truncate(write);

        self.pairs.retain_mut(|pair| match (new_indices[pair.index_a], new_indices[pair.index_b]) {
            (Some(a), Some(b)) => {
                pair.index_a = a;
                pair.index_b = b;
                true
            }
            _ => false,
        });
        self.triads.retain_mut(|triad| {
            match (
                new_indices[triad.index_a],
                new_indices[triad.index_b],
                new_indices[triad.index_c],
            ) {
                (Some(a), Some(b), Some(c)) => {
                    triad.index_a = a;
                    triad.index_b = b;
                    triad.index_c = c;
                    true
                }
                _ => false,
            }
        });

        let mut emptied = Vec::new();
        for (key, group) in self.groups.iter_mut() {
            let was_empty = group.first_index == group.last_index;
            let survivors = (group.first_index..group.last_index).filter_map(|i| new_indices[i]);
            let (first, last) = survivors.fold((usize::MAX, 0), |(lo, hi), i| (lo.min(i), hi.max(i + 1)));
            if first == usize::MAX {
                // Every particle went; keep an empty range where the group was
                let at = (0..group.first_index).rev().find_map(|i| new_indices[i]).map_or(0, |i| i + 1);
                group.first_index = at;
                group.last_index = at;
                if group.to_be_destroyed || (group.destroy_automatically && !was_empty) {
                    emptied.push(key);
                }
            } else {
                group.first_index = first;
                group.last_index = last;
            }
        }
        for key in emptied {
            self.groups.remove(key);
        }

        self.contacts.clear();
        self.body_contacts.clear();
        self.proxies_current = false;
        log::debug!("Removed {} particles", count - write);
    }

    // --- Spatial grid ---

    #[inline]
    pub(crate) fn cell_of(&self, p: Vec2) -> Cell {
        let inv = self.inv_diameter();
        ((p.y * inv).floor() as i32, (p.x * inv).floor() as i32)
    }

    /// Re-sort particles by grid cell
    pub(crate) fn update_proxies(&mut self) {
        let mut proxies = std::mem::take(&mut self.proxies);
        proxies.clear();
        proxies.extend(self.positions.iter().enumerate().map(|(index, p)| Proxy {
            index,
            cell: self.cell_of(*p),
        }));
        proxies.sort_unstable_by_key(|proxy| proxy.cell);
        self.proxies = proxies;
        self.proxies_current = true;
    }

    /// Find every pair of particles closer than one diameter
    pub(crate) fn update_contacts(&mut self) {
        self.update_proxies();
        self.contacts.clear();

        let diameter = self.diameter();
        let squared_diameter = diameter * diameter;
        let inv_diameter = self.inv_diameter();
        let proxies = &self.proxies;

        let add = |a: usize, b: usize, contacts: &mut Vec<ParticleContact>| {
            let d = self.positions[b] - self.positions[a];
            let distance_squared = d.length_squared();
            if distance_squared < squared_diameter && distance_squared > 0.0 {
                let distance = distance_squared.sqrt();
                contacts.push(ParticleContact {
                    index_a: a,
                    index_b: b,
                    flags: self.flags[a] | self.flags[b],
                    weight: 1.0 - distance * inv_diameter,
                    normal: d * (1.0 / distance),
                });
            }
        };

        let mut contacts = std::mem::take(&mut self.contacts);
        for (i, a) in proxies.iter().enumerate() {
            let (row, col) = a.cell;
            // Rest of this cell and the cell to the right
            for b in &proxies[i + 1..] {
                if b.cell > (row, col + 1) {
                    break;
                }
                add(a.index, b.index, &mut contacts);
            }
            // The three cells of the next row
            let start = proxies.partition_point(|p| p.cell < (row + 1, col - 1));
            for b in &proxies[start..] {
                if b.cell > (row + 1, col + 1) {
                    break;
                }
                add(a.index, b.index, &mut contacts);
            }
        }
        self.contacts = contacts;
    }

    /// Indices of particles whose position lies inside the box
    ///
    /// Uses the sorted grid when it is current, otherwise scans every particle.
    pub(crate) fn particles_in(&self, aabb: &Aabb) -> Vec<usize> {
        let inside = |p: Vec2| {
            p.x >= aabb.lower.x && p.x <= aabb.upper.x && p.y >= aabb.lower.y && p.y <= aabb.upper.y
        };
        if !self.proxies_current || self.proxies.len() != self.particle_count() {
            return (0..self.particle_count())
                .filter(|&i| inside(self.positions[i]))
                .collect();
        }

        let (row_lo, col_lo) = self.cell_of(aabb.lower);
        let (row_hi, col_hi) = self.cell_of(aabb.upper);
        let mut found = Vec::new();
        for row in row_lo..=row_hi {
            let start = self.proxies.partition_point(|p| p.cell < (row, col_lo));
            for proxy in &self.proxies[start..] {
                if proxy.cell > (row, col_hi) {
                    break;
                }
                if inside(self.positions[proxy.index]) {
                    found.push(proxy.index);
                }
            }
        }
        found
    }

    /// Bounds of all particle positions, `None` when empty
    pub(crate) fn bounds(&self) -> Option<Aabb> {
        let first = *self.positions.first()?;
        let mut aabb = Aabb::new(first, first);
        for p in &self.positions[1..] {
            aabb.lower = aabb.lower.min_components(*p);
            aabb.upper = aabb.upper.max_components(*p);
        }
        Some(aabb)
    }

    // --- Queries ---

    /// Report particles inside the box until the callback returns false
    pub fn query_aabb<F>(&self, aabb: &Aabb, mut callback: F)
    where
        F: FnMut(usize) -> bool,
    {
        for index in self.particles_in(aabb) {
            if !callback(index) {
                break;
            }
        }
    }

    /// Cast a ray against the particles
    ///
    /// The callback gets the particle index, hit point, normal and fraction,
    /// and returns the new maximum fraction: 0 stops, the hit fraction clips,
    /// 1 continues unclipped.
    pub fn ray_cast<F>(&self, p1: Vec2, p2: Vec2, mut callback: F)
    where
        F: FnMut(usize, Vec2, Vec2, f32) -> f32,
    {
        if self.particle_count() == 0 {
            return;
        }
        let diameter = self.diameter();
        let aabb = Aabb::new(p1.min_components(p2), p1.max_components(p2)).fattened(diameter);
        let v = p2 - p1;
        let vv = v.length_squared();
        if vv == 0.0 {
            return;
        }
        let squared_diameter = diameter * diameter;
        let mut fraction = 1.0;

        for i in self.particles_in(&aabb) {
            let p = p1 - self.positions[i];
            let pv = p.dot(v);
            let determinant = pv * pv - vv * (p.length_squared() - squared_diameter);
            if determinant < 0.0 {
                continue;
            }
            let sqrt_determinant = determinant.sqrt();
            let mut t = (-pv - sqrt_determinant) / vv;
            if t > fraction {
                continue;
            }
            if t < 0.0 {
                t = (-pv + sqrt_determinant) / vv;
                if t < 0.0 || t > fraction {
                    continue;
                }
            }
            let normal = (p + v * t).normalized();
            let point = p1 + v * t;
            let f = callback(i, point, normal, t);
            fraction = fraction.min(f);
            if fraction <= 0.0 {
                break;
            }
        }
    }

    /// Mass, center and motion of a group
    pub fn group_stats(&self, key: ParticleGroupKey) -> Option<ParticleGroupStats> {
        let group = self.groups.get(key)?;
        let range = group.first_index..group.last_index;
        let m = self.particle_mass();
        let mut stats = ParticleGroupStats::default();
        if range.is_empty() {
            return Some(stats);
        }

        for i in range.clone() {
            stats.mass += m;
            stats.center += self.positions[i] * m;
            stats.linear_velocity += self.velocities[i] * m;
        }
        stats.center = stats.center * (1.0 / stats.mass);
        stats.linear_velocity = stats.linear_velocity * (1.0 / stats.mass);

        let mut angular_momentum = 0.0;
        for i in range {
            let p = self.positions[i] - stats.center;
            let v = self.velocities[i] - stats.linear_velocity;
            stats.inertia += m * p.length_squared();
            angular_momentum += m * p.cross(v);
        }
        if stats.inertia > 0.0 {
            stats.angular_velocity = angular_momentum / stats.inertia;
        }
        Some(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{CircleShape, EdgeShape, PolygonShape};

    fn system() -> ParticleSystem {
        ParticleSystem::new(ParticleSystemDef::default())
    }

    #[test]
    fn test_create_particle_respects_max_count() {
        let mut ps = ParticleSystem::new(ParticleSystemDef {
            max_count: 2,
            ..Default::default()
        });
        assert_eq!(ps.create_particle(&ParticleDef::new(Vec2::ZERO)), Some(0));
        assert_eq!(ps.create_particle(&ParticleDef::new(Vec2::X)), Some(1));
        assert_eq!(ps.create_particle(&ParticleDef::new(Vec2::Y)), None);
        assert_eq!(ps.particle_count(), 2);
    }

    #[test]
    fn test_group_fills_box_on_stride_grid() {
        let mut ps = system();
        // Diameter 1, stride 0.75: -0.75, 0, 0.75 on each axis
        let key = ps.create_particle_group(&ParticleGroupDef::new(PolygonShape::new_box(1.0, 1.0)));
        let group = ps.group(key).unwrap();
        assert_eq!(group.particle_count(), 9);
        assert_eq!(group.first_index(), 0);
        assert!((0..9).all(|i| ps.particle_group(i) == Some(key)));
    }

    #[test]
    fn test_group_transform_and_velocity() {
        let mut ps = system();
        let def = ParticleGroupDef::new(CircleShape::new(Vec2::ZERO, 0.1))
            .with_position(Vec2::new(10.0, 5.0))
            .with_linear_velocity(Vec2::new(1.0, 0.0));
        ps.create_particle_group(&def);
        assert_eq!(ps.particle_count(), 1);
        assert_eq!(ps.positions()[0], Vec2::new(10.0, 5.0));
        assert_eq!(ps.velocities()[0], Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_edge_group_places_particles_along_segment() {
        let mut ps = system();
        ps.create_particle_group(&ParticleGroupDef::new(EdgeShape::new(Vec2::ZERO, Vec2::new(3.0, 0.0))));
        // 0, 0.75, 1.5, 2.25
        assert_eq!(ps.particle_count(), 4);
        assert!(ps.positions().iter().all(|p| p.y == 0.0));
    }

    #[test]
    fn test_spring_group_creates_pairs() {
        let mut ps = system();
        let def = ParticleGroupDef::new(PolygonShape::new_box(1.0, 1.0)).with_flags(ParticleFlags::SPRING);
        ps.create_particle_group(&def);
        // 3x3 lattice: 12 axis-aligned neighbours closer than a diameter
        assert_eq!(ps.pairs.len(), 12);
        assert!(ps.pairs.iter().all(|p| (p.distance - 0.75).abs() < 1e-5));
    }

    #[test]
    fn test_elastic_group_creates_triads() {
        let mut ps = system();
        let def = ParticleGroupDef::new(PolygonShape::new_box(1.0, 1.0)).with_flags(ParticleFlags::ELASTIC);
        ps.create_particle_group(&def);
        // 2x2 squares, two triangles each
        assert_eq!(ps.triads.len(), 8);
    }

    #[test]
    fn test_contacts_found_across_cells() {
        let mut ps = system();
        ps.create_particle(&ParticleDef::new(Vec2::new(0.9, 0.0)));
        ps.create_particle(&ParticleDef::new(Vec2::new(1.1, 0.0)));
        ps.create_particle(&ParticleDef::new(Vec2::new(1.0, 0.95)));
        ps.create_particle(&ParticleDef::new(Vec2::new(5.0, 5.0)));
        ps.update_contacts();
        assert_eq!(ps.contacts.len(), 3);
        for c in &ps.contacts {
            assert!(c.weight > 0.0 && c.weight < 1.0);
            assert!((c.normal.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_destroy_is_deferred_until_compaction() {
        let mut ps = system();
        let key = ps.create_particle_group(&ParticleGroupDef::new(PolygonShape::new_box(1.0, 1.0)));
        assert!(ps.destroy_particle(0));
        assert!(!ps.destroy_particle(100));
        assert_eq!(ps.particle_count(), 9);

        ps.solve_zombie();
        assert_eq!(ps.particle_count(), 8);
        assert_eq!(ps.group(key).unwrap().particle_count(), 8);
    }

    #[test]
    fn test_destroy_in_shape_counts_marked() {
        let mut ps = system();
        ps.create_particle_group(&ParticleGroupDef::new(PolygonShape::new_box(1.0, 1.0)));
        let marked = ps.destroy_particles_in_shape(
            &Shape::Circle(CircleShape::new(Vec2::ZERO, 0.1)),
            &Transform2D::IDENTITY,
        );
        assert_eq!(marked, 1);
        // Already-marked particles are not counted twice
        let again = ps.destroy_particles_in_shape(
            &Shape::Circle(CircleShape::new(Vec2::ZERO, 0.1)),
            &Transform2D::IDENTITY,
        );
        assert_eq!(again, 0);
    }

    #[test]
    fn test_destroy_group_removes_group_on_compaction() {
        let mut ps = system();
        let a = ps.create_particle_group(&ParticleGroupDef::new(PolygonShape::new_box(1.0, 1.0)));
        let b = ps.create_particle_group(
            &ParticleGroupDef::new(PolygonShape::new_box(1.0, 1.0)).with_position(Vec2::new(10.0, 0.0)),
        );
        ps.destroy_particle_group(a).unwrap();
        assert!(ps.group(a).is_some());
        ps.solve_zombie();
        assert!(ps.group(a).is_none());
        let group_b = ps.group(b).unwrap();
        assert_eq!(group_b.first_index(), 0);
        assert_eq!(group_b.particle_count(), 9);
        assert_eq!(ps.destroy_particle_group(a), Err(PhysicsError::UnknownParticleGroup));
    }

    #[test]
    fn test_join_groups_makes_contiguous_range() {
        let mut ps = system();
        let a = ps.create_particle_group(&ParticleGroupDef::new(CircleShape::new(Vec2::ZERO, 0.1)));
        let middle = ps.create_particle_group(
            &ParticleGroupDef::new(CircleShape::new(Vec2::ZERO, 0.1)).with_position(Vec2::new(5.0, 0.0)),
        );
        let b = ps.create_particle_group(
            &ParticleGroupDef::new(CircleShape::new(Vec2::ZERO, 0.1)).with_position(Vec2::new(9.0, 0.0)),
        );
        ps.join_particle_groups(a, b).unwrap();

        assert!(ps.group(b).is_none());
        let joined = ps.group(a).unwrap();
        assert_eq!(joined.particle_count(), 2);
        let range = joined.first_index()..joined.first_index() + 2;
        let xs: Vec<f32> = range.map(|i| ps.positions()[i].x).collect();
        assert_eq!(xs, vec![0.0, 9.0]);
        let m = ps.group(middle).unwrap();
        assert_eq!(ps.positions()[m.first_index()].x, 5.0);
        assert_eq!(ps.join_particle_groups(a, a).map_err(|_| ()), Err(()));
    }

    #[test]
    fn test_query_aabb_with_stale_and_current_grid() {
        let mut ps = system();
        ps.create_particle(&ParticleDef::new(Vec2::new(0.0, 0.0)));
        ps.create_particle(&ParticleDef::new(Vec2::new(3.0, 3.0)));
        let aabb = Aabb::new(Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0));

        let mut hits = Vec::new();
        ps.query_aabb(&aabb, |i| {
            hits.push(i);
            true
        });
        assert_eq!(hits, vec![0]);

        ps.update_proxies();
        hits.clear();
        ps.query_aabb(&aabb, |i| {
            hits.push(i);
            true
        });
        assert_eq!(hits, vec![0]);
    }

    #[test]
    fn test_ray_cast_reports_nearest_first_hit() {
        let mut ps = system();
        ps.create_particle(&ParticleDef::new(Vec2::new(5.0, 0.0)));
        let mut hit = None;
        ps.ray_cast(Vec2::ZERO, Vec2::new(10.0, 0.0), |i, point, normal, fraction| {
            hit = Some((i, point, normal, fraction));
            fraction
        });
        let (i, point, normal, fraction) = hit.unwrap();
        assert_eq!(i, 0);
        // Particles are hit at one diameter from their center
        assert!((point.x - 4.0).abs() < 1e-4);
        assert!((normal.x + 1.0).abs() < 1e-4);
        assert!((fraction - 0.4).abs() < 1e-4);
    }

    #[test]
    fn test_group_stats_of_moving_group() {
        let mut ps = system();
        let key = ps.create_particle_group(
            &ParticleGroupDef::new(PolygonShape::new_box(1.0, 1.0)).with_linear_velocity(Vec2::new(2.0, 0.0)),
        );
        let stats = ps.group_stats(key).unwrap();
        assert!((stats.mass - 9.0 * ps.particle_mass()).abs() < 1e-5);
        assert!(stats.center.length() < 1e-5);
        assert!((stats.linear_velocity.x - 2.0).abs() < 1e-5);
        assert!(stats.angular_velocity.abs() < 1e-5);
    }

    #[test]
    fn test_byte_views() {
        let mut ps = system();
        ps.create_particle(&ParticleDef::new(Vec2::new(1.0, 2.0)));
        assert_eq!(ps.position_bytes().len(), 8);
        assert_eq!(ps.color_bytes(), &[255, 255, 255, 255]);
    }

    #[test]
    fn test_radius_must_be_positive() {
        let mut ps = system();
        assert!(ps.set_radius(0.0).is_err());
        assert!(ps.set_radius(0.25).is_ok());
        assert!((ps.particle_mass() - 0.375 * 0.375).abs() < 1e-6);
    }
}
