//! Ray cast results in pixel space

use kinetic2d_math::Vec2;

use crate::entity::EntityKey;

/// The closest entity hit by a ray, if any
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RaycastResult {
    /// Entity owning the closest fixture
    pub entity: Option<EntityKey>,
    /// Impact point in pixels
    pub point: Option<Vec2>,
}

impl RaycastResult {
    /// Nothing was hit
    pub const NONE: Self = Self { entity: None, point: None };

    pub fn is_hit(&self) -> bool {
        self.entity.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_is_default() {
        assert_eq!(RaycastResult::default(), RaycastResult::NONE);
        assert!(!RaycastResult::NONE.is_hit());
    }
}
