//! Collision filtering between fixtures

use serde::{Deserialize, Serialize};

/// Collision filter determining what a fixture collides with
///
/// Uses a category/mask system plus an override group:
/// - `category_bits`: which categories this fixture belongs to
/// - `mask_bits`: which categories this fixture can collide with
/// - `group_index`: fixtures sharing a positive group always collide,
///   fixtures sharing a negative group never collide
///
/// Without a shared non-zero group, two fixtures A and B collide if:
/// - (A.mask & B.category) != 0, AND
/// - (B.mask & A.category) != 0
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub category_bits: u16,
    pub mask_bits: u16,
    pub group_index: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category_bits: 0x0001,
            mask_bits: 0xFFFF,
            group_index: 0,
        }
    }
}

impl Filter {
    /// Create a new filter with the given category and mask
    pub fn new(category_bits: u16, mask_bits: u16) -> Self {
        Self {
            category_bits,
            mask_bits,
            group_index: 0,
        }
    }

    /// Set the override group
    pub fn with_group(mut self, group_index: i16) -> Self {
        self.group_index = group_index;
        self
    }

    /// Check if this filter allows collision with another filter
    pub fn collides_with(&self, other: &Self) -> bool {
        if self.group_index == other.group_index && self.group_index != 0 {
            return self.group_index > 0;
        }
        (self.mask_bits & other.category_bits) != 0 && (self.category_bits & other.mask_bits) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filters_collide() {
        assert!(Filter::default().collides_with(&Filter::default()));
    }

    #[test]
    fn test_mask_must_agree_both_ways() {
        let pickup = Filter::new(0x0004, 0x0002);
        let player = Filter::new(0x0002, 0xFFFF);
        let enemy = Filter::new(0x0008, 0xFFFF);
        assert!(pickup.collides_with(&player));
        assert!(!pickup.collides_with(&enemy));
        assert!(!enemy.collides_with(&pickup));
    }

    #[test]
    fn test_groups_override_masks() {
        let a = Filter::new(0x0001, 0x0000).with_group(3);
        let b = Filter::new(0x0002, 0x0000).with_group(3);
        assert!(a.collides_with(&b));

        let c = Filter::default().with_group(-2);
        let d = Filter::default().with_group(-2);
        assert!(!c.collides_with(&d));
    }
}
