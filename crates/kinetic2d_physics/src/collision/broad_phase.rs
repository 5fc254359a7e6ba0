//! Broad phase: turns proxy movement into candidate overlap pairs
//!
//! Proxies that moved (or were created or touched) since the last update are
//! buffered; `update_pairs` queries the tree once per buffered proxy and
//! reports each overlapping pair exactly once.

use kinetic2d_math::Vec2;

use super::dynamic_tree::{DynamicTree, ProxyId};
use super::{Aabb, RayCastInput};

#[derive(Clone, Debug)]
pub struct BroadPhase<T> {
    tree: DynamicTree<T>,
    proxy_count: usize,
    move_buffer: Vec<ProxyId>,
    pair_buffer: Vec<(ProxyId, ProxyId)>,
}

impl<T> Default for BroadPhase<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BroadPhase<T> {
    pub fn new() -> Self {
        Self {
            tree: DynamicTree::new(),
            proxy_count: 0,
            move_buffer: Vec::with_capacity(16),
            pair_buffer: Vec::with_capacity(16),
        }
    }

    /// Create a proxy; it is reported in pairs on the next update
    pub fn create_proxy(&mut self, aabb: Aabb, user_data: T) -> ProxyId {
        let id = self.tree.create_proxy(aabb, user_data);
        self.proxy_count += 1;
        self.buffer_move(id);
        id
    }

    pub fn destroy_proxy(&mut self, id: ProxyId) -> Option<T> {
        self.unbuffer_move(id);
        let data = self.tree.destroy_proxy(id);
        if data.is_some() {
            self.proxy_count -= 1;
        }
        data
    }

    /// Update a proxy's bounds; pairs are only re-examined if it left its fat AABB
    pub fn move_proxy(&mut self, id: ProxyId, aabb: Aabb, displacement: Vec2) {
        if self.tree.move_proxy(id, aabb, displacement) {
            self.buffer_move(id);
        }
    }

    /// Force the proxy's pairs to be re-examined on the next update
    pub fn touch_proxy(&mut self, id: ProxyId) {
        self.buffer_move(id);
    }

    fn buffer_move(&mut self, id: ProxyId) {
        self.move_buffer.push(id);
    }

    fn unbuffer_move(&mut self, id: ProxyId) {
        self.move_buffer.retain(|&moved| moved != id);
    }

    pub fn fat_aabb(&self, id: ProxyId) -> Aabb {
        self.tree.fat_aabb(id)
    }

    pub fn user_data(&self, id: ProxyId) -> Option<&T> {
        self.tree.user_data(id)
    }

    /// Do the fat AABBs of two proxies overlap
    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        self.tree.fat_aabb(a).overlaps(&self.tree.fat_aabb(b))
    }

    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    pub fn query<F>(&self, aabb: &Aabb, callback: F)
    where
        F: FnMut(ProxyId) -> bool,
    {
        self.tree.query(aabb, callback);
    }

    pub fn ray_cast<F>(&self, input: &RayCastInput, callback: F)
    where
        F: FnMut(&RayCastInput, ProxyId) -> f32,
    {
        self.tree.ray_cast(input, callback);
    }

    pub fn tree_height(&self) -> i32 {
        self.tree.height()
    }

    pub fn tree_balance(&self) -> i32 {
        self.tree.max_balance()
    }

    pub fn tree_quality(&self) -> f32 {
        self.tree.area_ratio()
    }
}

impl<T: Copy> BroadPhase<T> {
    /// Report new candidate pairs to the callback
    ///
    /// Each unordered pair is reported once even if both proxies moved.
    pub fn update_pairs<F>(&mut self, mut callback: F)
    where
        F: FnMut(T, T),
    {
        self.pair_buffer.clear();

        for i in 0..self.move_buffer.len() {
            let query_id = self.move_buffer[i];
            let fat_aabb = self.tree.fat_aabb(query_id);
            let pairs = &mut self.pair_buffer;
            self.tree.query(&fat_aabb, |proxy_id| {
                // A proxy cannot form a pair with itself
                if proxy_id != query_id {
                    pairs.push((proxy_id.min(query_id), proxy_id.max(query_id)));
                }
                true
            });
        }

        self.move_buffer.clear();

        self.pair_buffer.sort_unstable();
        self.pair_buffer.dedup();

        for &(a, b) in &self.pair_buffer {
            if let (Some(&data_a), Some(&data_b)) = (self.tree.user_data(a), self.tree.user_data(b)) {
                callback(data_a, data_b);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f32) -> Aabb {
        Aabb::new(Vec2::new(x, 0.0), Vec2::new(x + 1.0, 1.0))
    }

    #[test]
    fn test_pairs_reported_once() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(square(0.0), 1);
        bp.create_proxy(square(0.5), 2);
        bp.create_proxy(square(10.0), 3);

        let mut pairs = Vec::new();
        bp.update_pairs(|a, b| pairs.push((a.min(b), a.max(b))));
        assert_eq!(pairs, vec![(1, 2)]);

        // Nothing moved, nothing reported
        let mut again = Vec::new();
        bp.update_pairs(|a, b| again.push((a, b)));
        assert!(again.is_empty());
    }

    #[test]
    fn test_touch_reports_existing_pairs() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(square(0.0), 'a');
        bp.create_proxy(square(0.5), 'b');
        bp.update_pairs(|_, _| {});

        bp.touch_proxy(a);
        let mut count = 0;
        bp.update_pairs(|_, _| count += 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_destroy_unbuffers_and_counts() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(square(0.0), 'a');
        bp.create_proxy(square(0.5), 'b');
        assert_eq!(bp.destroy_proxy(a), Some('a'));
        assert_eq!(bp.proxy_count(), 1);
        let mut count = 0;
        bp.update_pairs(|_, _| count += 1);
        assert_eq!(count, 0);
    }
}
