//! Dynamic AABB tree
//!
//! A balanced bounding-volume hierarchy. Leaves are proxies with a fattened
//! AABB and a user payload; internal nodes store the union of their
//! children. The tree is rebalanced with rotations on every insert and
//! remove, and leaves are only reinserted when their real bounds escape
//! the fat bounds.

use kinetic2d_math::Vec2;

use super::{Aabb, RayCastInput};
use crate::settings::{AABB_EXTENSION, AABB_MULTIPLIER};

/// Index of a leaf in a [`DynamicTree`]
pub type ProxyId = usize;

const NULL_NODE: usize = usize::MAX;

#[derive(Clone, Debug)]
struct TreeNode<T> {
    /// Enlarged AABB
    aabb: Aabb,
    user_data: Option<T>,
    /// Parent for live nodes, next free node for pooled ones
    parent: usize,
    child1: usize,
    child2: usize,
    /// Leaf = 0, free node = -1
    height: i32,
}

impl<T> TreeNode<T> {
    #[inline]
    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

/// Dynamic bounding-volume tree with a free list of nodes
#[derive(Clone, Debug)]
pub struct DynamicTree<T> {
    nodes: Vec<TreeNode<T>>,
    root: usize,
    free_list: usize,
    node_count: usize,
}

impl<T> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DynamicTree<T> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::with_capacity(16),
            root: NULL_NODE,
            free_list: NULL_NODE,
            node_count: 0,
        }
    }

    fn allocate_node(&mut self) -> usize {
        let id = if self.free_list == NULL_NODE {
            self.nodes.push(TreeNode {
                aabb: Aabb::default(),
                user_data: None,
                parent: NULL_NODE,
                child1: NULL_NODE,
                child2: NULL_NODE,
                height: 0,
            });
            self.nodes.len() - 1
        } else {
            let id = self.free_list;
            self.free_list = self.nodes[id].parent;
            id
        };

        let node = &mut self.nodes[id];
        node.parent = NULL_NODE;
        node.child1 = NULL_NODE;
        node.child2 = NULL_NODE;
        node.height = 0;
        node.user_data = None;
        self.node_count += 1;
        id
    }

    fn free_node(&mut self, id: usize) {
        let node = &mut self.nodes[id];
        node.parent = self.free_list;
        node.height = -1;
        node.user_data = None;
        self.free_list = id;
        self.node_count -= 1;
    }

    /// Create a leaf for `aabb`, fattened by [`AABB_EXTENSION`]
    pub fn create_proxy(&mut self, aabb: Aabb, user_data: T) -> ProxyId {
        let id = self.allocate_node();
        self.nodes[id].aabb = aabb.fattened(AABB_EXTENSION);
        self.nodes[id].user_data = Some(user_data);
        self.nodes[id].height = 0;
        self.insert_leaf(id);
        id
    }

    /// Remove a leaf and return its payload
    pub fn destroy_proxy(&mut self, id: ProxyId) -> Option<T> {
        if id >= self.nodes.len() || !self.nodes[id].is_leaf() || self.nodes[id].height != 0 {
            return None;
        }
        self.remove_leaf(id);
        let data = self.nodes[id].user_data.take();
        self.free_node(id);
        data
    }

    /// Move a proxy with a swept AABB
    ///
    /// Returns true when the proxy was reinserted; false means the new
    /// bounds still fit inside the fat AABB and nothing changed.
    pub fn move_proxy(&mut self, id: ProxyId, aabb: Aabb, displacement: Vec2) -> bool {
        debug_assert!(self.nodes[id].is_leaf());

        if self.nodes[id].aabb.contains(&aabb) {
            return false;
        }

        self.remove_leaf(id);

        // Extend AABB and predict its motion
        let mut b = aabb.fattened(AABB_EXTENSION);
        let d = displacement * AABB_MULTIPLIER;
        if d.x < 0.0 {
            b.lower.x += d.x;
        } else {
            b.upper.x += d.x;
        }
        if d.y < 0.0 {
            b.lower.y += d.y;
        } else {
            b.upper.y += d.y;
        }

        self.nodes[id].aabb = b;
        self.insert_leaf(id);
        true
    }

    pub fn user_data(&self, id: ProxyId) -> Option<&T> {
        self.nodes.get(id).and_then(|n| n.user_data.as_ref())
    }

    pub fn fat_aabb(&self, id: ProxyId) -> Aabb {
        self.nodes[id].aabb
    }

    /// Report every leaf whose fat AABB overlaps `aabb`
    ///
    /// The callback returns false to stop the query.
    pub fn query<F>(&self, aabb: &Aabb, mut callback: F)
    where
        F: FnMut(ProxyId) -> bool,
    {
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(id) = stack.pop() {
            if id == NULL_NODE {
                continue;
            }
            let node = &self.nodes[id];
            if node.aabb.overlaps(aabb) {
                if node.is_leaf() {
                    if !callback(id) {
                        return;
                    }
                } else {
                    let (c1, c2) = (node.child1, node.child2);
                    stack.push(c1);
                    stack.push(c2);
                }
            }
        }
    }

    /// Cast a ray through the tree
    ///
    /// The callback returns the new max fraction for the ray: 0 terminates,
    /// a negative value ignores the proxy, and a positive value clips the ray.
    pub fn ray_cast<F>(&self, input: &RayCastInput, mut callback: F)
    where
        F: FnMut(&RayCastInput, ProxyId) -> f32,
    {
        let p1 = input.p1;
        let p2 = input.p2;
        let r = (p2 - p1).normalized();
        debug_assert!(r.length_squared() > 0.0);

        // v is perpendicular to the segment
        let v = Vec2::scalar_cross(1.0, r);
        let abs_v = v.abs();

        let mut max_fraction = input.max_fraction;

        let segment_aabb = |max_fraction: f32| {
            let t = p1 + (p2 - p1) * max_fraction;
            Aabb::new(p1.min_components(t), p1.max_components(t))
        };
        let mut segment = segment_aabb(max_fraction);

        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(id) = stack.pop() {
            if id == NULL_NODE {
                continue;
            }
            let node = &self.nodes[id];
            if !node.aabb.overlaps(&segment) {
                continue;
            }

            // Separating axis for segment: |dot(v, p1 - c)| > dot(|v|, h)
            let c = node.aabb.center();
            let h = node.aabb.extents();
            let separation = v.dot(p1 - c).abs() - abs_v.dot(h);
            if separation > 0.0 {
                continue;
            }

            if node.is_leaf() {
                let sub_input = RayCastInput { p1, p2, max_fraction };
                let value = callback(&sub_input, id);

                if value == 0.0 {
                    // The client has terminated the ray cast
                    return;
                }

                if value > 0.0 {
                    max_fraction = value;
                    segment = segment_aabb(max_fraction);
                }
            } else {
                let (c1, c2) = (node.child1, node.child2);
                stack.push(c1);
                stack.push(c2);
            }
        }
    }

    fn insert_leaf(&mut self, leaf: usize) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf].parent = NULL_NODE;
            return;
        }

        // Find the best sibling for this node
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = self.root;
        while !self.nodes[index].is_leaf() {
            let child1 = self.nodes[index].child1;
            let child2 = self.nodes[index].child2;

            let area = self.nodes[index].aabb.perimeter();
            let combined_area = self.nodes[index].aabb.combine(&leaf_aabb).perimeter();

            // Cost of creating a new parent for this node and the new leaf
            let cost = 2.0 * combined_area;

            // Minimum cost of pushing the leaf further down the tree
            let inheritance_cost = 2.0 * (combined_area - area);

            let descend_cost = |child: usize| {
                let node = &self.nodes[child];
                let combined = leaf_aabb.combine(&node.aabb).perimeter();
                if node.is_leaf() {
                    combined + inheritance_cost
                } else {
                    combined - node.aabb.perimeter() + inheritance_cost
                }
            };
            let cost1 = descend_cost(child1);
            let cost2 = descend_cost(child2);

            if cost < cost1 && cost < cost2 {
                break;
            }

            index = if cost1 < cost2 { child1 } else { child2 };
        }

        let sibling = index;

        // Create a new parent
        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.allocate_node();
        self.nodes[new_parent].parent = old_parent;
        self.nodes[new_parent].aabb = leaf_aabb.combine(&self.nodes[sibling].aabb);
        self.nodes[new_parent].height = self.nodes[sibling].height + 1;
        self.nodes[new_parent].child1 = sibling;
        self.nodes[new_parent].child2 = leaf;
        self.nodes[sibling].parent = new_parent;
        self.nodes[leaf].parent = new_parent;

        if old_parent != NULL_NODE {
            // The sibling was not the root
            if self.nodes[old_parent].child1 == sibling {
                self.nodes[old_parent].child1 = new_parent;
            } else {
                self.nodes[old_parent].child2 = new_parent;
            }
        } else {
            self.root = new_parent;
        }

        // Walk back up the tree fixing heights and AABBs
        self.refit_from(self.nodes[leaf].parent);
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf].parent;
        let grand_parent = self.nodes[parent].parent;
        let sibling = if self.nodes[parent].child1 == leaf {
            self.nodes[parent].child2
        } else {
            self.nodes[parent].child1
        };

        if grand_parent != NULL_NODE {
            // Destroy parent and connect sibling to grand parent
            if self.nodes[grand_parent].child1 == parent {
                self.nodes[grand_parent].child1 = sibling;
            } else {
                self.nodes[grand_parent].child2 = sibling;
            }
            self.nodes[sibling].parent = grand_parent;
            self.free_node(parent);
            self.refit_from(grand_parent);
        } else {
            self.root = sibling;
            self.nodes[sibling].parent = NULL_NODE;
            self.free_node(parent);
        }
    }

    fn refit_from(&mut self, mut index: usize) {
        while index != NULL_NODE {
            index = self.balance(index);

            let child1 = self.nodes[index].child1;
            let child2 = self.nodes[index].child2;

            self.nodes[index].height = 1 + self.nodes[child1].height.max(self.nodes[child2].height);
            self.nodes[index].aabb = self.nodes[child1].aabb.combine(&self.nodes[child2].aabb);

            index = self.nodes[index].parent;
        }
    }

    /// Perform a left or right rotation if node A is imbalanced
    ///
    /// Returns the new root index of the subtree.
    fn balance(&mut self, i_a: usize) -> usize {
        if self.nodes[i_a].is_leaf() || self.nodes[i_a].height < 2 {
            return i_a;
        }

        let i_b = self.nodes[i_a].child1;
        let i_c = self.nodes[i_a].child2;

        let balance = self.nodes[i_c].height - self.nodes[i_b].height;

        // Rotate C up
        if balance > 1 {
            let i_f = self.nodes[i_c].child1;
            let i_g = self.nodes[i_c].child2;

            // Swap A and C
            self.nodes[i_c].child1 = i_a;
            self.nodes[i_c].parent = self.nodes[i_a].parent;
            self.nodes[i_a].parent = i_c;

            // A's old parent should point to C
            self.replace_child(self.nodes[i_c].parent, i_a, i_c);

            // Rotate
            let (keep, move_down) = if self.nodes[i_f].height > self.nodes[i_g].height {
                (i_f, i_g)
            } else {
                (i_g, i_f)
            };
            self.nodes[i_c].child2 = keep;
            self.nodes[i_a].child2 = move_down;
            self.nodes[move_down].parent = i_a;
            self.nodes[i_a].aabb = self.nodes[i_b].aabb.combine(&self.nodes[move_down].aabb);
            self.nodes[i_c].aabb = self.nodes[i_a].aabb.combine(&self.nodes[keep].aabb);
            self.nodes[i_a].height =
                1 + self.nodes[i_b].height.max(self.nodes[move_down].height);
            self.nodes[i_c].height = 1 + self.nodes[i_a].height.max(self.nodes[keep].height);

            return i_c;
        }

        // Rotate B up
        if balance < -1 {
            let i_d = self.nodes[i_b].child1;
            let i_e = self.nodes[i_b].child2;

            // Swap A and B
            self.nodes[i_b].child1 = i_a;
            self.nodes[i_b].parent = self.nodes[i_a].parent;
            self.nodes[i_a].parent = i_b;

            // A's old parent should point to B
            self.replace_child(self.nodes[i_b].parent, i_a, i_b);

            // Rotate
            let (keep, move_down) = if self.nodes[i_d].height > self.nodes[i_e].height {
                (i_d, i_e)
            } else {
                (i_e, i_d)
            };
            self.nodes[i_b].child2 = keep;
            self.nodes[i_a].child1 = move_down;
            self.nodes[move_down].parent = i_a;
            self.nodes[i_a].aabb = self.nodes[i_c].aabb.combine(&self.nodes[move_down].aabb);
            self.nodes[i_b].aabb = self.nodes[i_a].aabb.combine(&self.nodes[keep].aabb);
            self.nodes[i_a].height =
                1 + self.nodes[i_c].height.max(self.nodes[move_down].height);
            self.nodes[i_b].height = 1 + self.nodes[i_a].height.max(self.nodes[keep].height);

            return i_b;
        }

        i_a
    }

    fn replace_child(&mut self, parent: usize, old: usize, new: usize) {
        if parent == NULL_NODE {
            self.root = new;
        } else if self.nodes[parent].child1 == old {
            self.nodes[parent].child1 = new;
        } else {
            self.nodes[parent].child2 = new;
        }
    }

    /// Height of the tree; zero for an empty or single-leaf tree
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root].height
        }
    }

    /// Largest height difference between the two children of any node
    pub fn max_balance(&self) -> i32 {
        self.nodes
            .iter()
            .filter(|n| n.height > 1)
            .map(|n| (self.nodes[n.child2].height - self.nodes[n.child1].height).abs())
            .max()
            .unwrap_or(0)
    }

    /// Ratio of the summed node perimeters to the root perimeter
    pub fn area_ratio(&self) -> f32 {
        if self.root == NULL_NODE {
            return 0.0;
        }
        let root_area = self.nodes[self.root].aabb.perimeter();
        let total_area: f32 = self
            .nodes
            .iter()
            .filter(|n| n.height >= 0)
            .map(|n| n.aabb.perimeter())
            .sum();
        if root_area > 0.0 {
            total_area / root_area
        } else {
            0.0
        }
    }

    /// Number of live nodes, leaves and internal
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Recompute the height from the leaves, for validation
    pub fn compute_height(&self) -> i32 {
        self.compute_height_from(self.root)
    }

    fn compute_height_from(&self, id: usize) -> i32 {
        if id == NULL_NODE {
            return 0;
        }
        let node = &self.nodes[id];
        if node.is_leaf() {
            return 0;
        }
        1 + self
            .compute_height_from(node.child1)
            .max(self.compute_height_from(node.child2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f32, y: f32) -> Aabb {
        Aabb::new(Vec2::new(x, y), Vec2::new(x + 1.0, y + 1.0))
    }

    #[test]
    fn test_query_finds_overlapping_leaves() {
        let mut tree = DynamicTree::new();
        let a = tree.create_proxy(square(0.0, 0.0), 'a');
        let _b = tree.create_proxy(square(10.0, 0.0), 'b');
        let c = tree.create_proxy(square(0.5, 0.5), 'c');

        let mut found = Vec::new();
        tree.query(&square(0.2, 0.2), |id| {
            found.push(id);
            true
        });
        found.sort();
        let mut expected = vec![a, c];
        expected.sort();
        assert_eq!(found, expected);
        assert_eq!(tree.user_data(c), Some(&'c'));
    }

    #[test]
    fn test_move_within_fat_bounds_is_noop() {
        let mut tree = DynamicTree::new();
        let id = tree.create_proxy(square(0.0, 0.0), ());
        assert!(!tree.move_proxy(id, square(0.05, 0.0), Vec2::new(0.05, 0.0)));
        assert!(tree.move_proxy(id, square(3.0, 0.0), Vec2::new(3.0, 0.0)));
        assert!(tree.fat_aabb(id).contains(&square(3.0, 0.0)));
    }

    #[test]
    fn test_tree_stays_balanced() {
        let mut tree = DynamicTree::new();
        for i in 0..64 {
            tree.create_proxy(square(i as f32 * 2.0, 0.0), i);
        }
        assert_eq!(tree.height(), tree.compute_height());
        assert!(tree.max_balance() <= 2);
        assert!(tree.height() < 12);
        assert_eq!(tree.node_count(), 127);
    }

    #[test]
    fn test_destroy_returns_payload_and_frees_node() {
        let mut tree = DynamicTree::new();
        let a = tree.create_proxy(square(0.0, 0.0), 1);
        let b = tree.create_proxy(square(5.0, 0.0), 2);
        assert_eq!(tree.destroy_proxy(a), Some(1));
        assert_eq!(tree.node_count(), 1);
        let c = tree.create_proxy(square(8.0, 0.0), 3);
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.user_data(b), Some(&2));
        assert_eq!(tree.user_data(c), Some(&3));
    }

    #[test]
    fn test_ray_cast_visits_hit_leaves() {
        let mut tree = DynamicTree::new();
        let near = tree.create_proxy(square(2.0, -0.5), "near");
        tree.create_proxy(square(2.0, 5.0), "off-axis");
        let input = RayCastInput {
            p1: Vec2::new(0.0, 0.0),
            p2: Vec2::new(10.0, 0.0),
            max_fraction: 1.0,
        };
        let mut hits = Vec::new();
        tree.ray_cast(&input, |sub, id| {
            hits.push(id);
            sub.max_fraction
        });
        assert_eq!(hits, vec![near]);
    }
}
