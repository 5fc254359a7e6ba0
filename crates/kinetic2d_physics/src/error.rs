//! Physics error types
//!
//! Failures here are programmer errors surfaced early: mutating the world
//! during a step, building a degenerate shape, or using a stale handle.

use std::fmt;

/// Error type for world and shape operations
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicsError {
    /// The world is in the middle of a step and cannot be mutated
    Locked {
        /// The operation that was attempted
        operation: &'static str,
    },
    /// A shape could not be constructed from the given data
    InvalidShape(String),
    /// An argument was out of range or otherwise unusable
    InvalidArgument(String),
    /// A physics component was used before its body was created
    NotInitialized(String),
    /// The body handle does not refer to a live body
    UnknownBody,
    /// The fixture handle does not refer to a live fixture
    UnknownFixture,
    /// The joint handle does not refer to a live joint
    UnknownJoint,
    /// The particle group handle does not refer to a live group
    UnknownParticleGroup,
}

impl fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicsError::Locked { operation } => {
                write!(f, "Cannot {} while the world is stepping", operation)
            }
            PhysicsError::InvalidShape(msg) => write!(f, "Invalid shape: {}", msg),
            PhysicsError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            PhysicsError::NotInitialized(msg) => write!(f, "Physics not initialized: {}", msg),
            PhysicsError::UnknownBody => write!(f, "Body does not exist"),
            PhysicsError::UnknownFixture => write!(f, "Fixture does not exist"),
            PhysicsError::UnknownJoint => write!(f, "Joint does not exist"),
            PhysicsError::UnknownParticleGroup => write!(f, "Particle group does not exist"),
        }
    }
}

impl std::error::Error for PhysicsError {}

/// Result alias used throughout the physics crate
pub type PhysicsResult<T> = Result<T, PhysicsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_display() {
        let err = PhysicsError::Locked { operation: "create a body" };
        let msg = format!("{}", err);
        assert!(msg.contains("create a body"));
        assert!(msg.contains("stepping"));
    }

    #[test]
    fn test_invalid_shape_display() {
        let err = PhysicsError::InvalidShape("chain needs at least 2 points".to_string());
        assert!(format!("{}", err).contains("at least 2 points"));
    }

    #[test]
    fn test_not_initialized_display() {
        let err = PhysicsError::NotInitialized("use on_physics_initialized".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("not initialized"));
        assert!(msg.contains("on_physics_initialized"));
    }
}
