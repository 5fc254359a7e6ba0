//! 2D Mathematics Library
//!
//! This crate provides the small value types shared by the kinetic2d physics
//! engine and its application layer.
//!
//! ## Core Types
//!
//! - [`Vec2`] - 2D vector
//! - [`Rot`] - rotation stored as sine/cosine
//! - [`Transform2D`] - rigid transform (rotation + translation)
//! - [`Mat22`], [`Mat33`] - small matrices for constraint solving
//! - [`Sweep`] - body motion over a step, for continuous collision

mod vec2;
mod rot;
mod transform;
pub mod mat;
mod sweep;

pub use vec2::Vec2;
pub use rot::Rot;
pub use transform::Transform2D;
pub use mat::{Mat22, Mat33, Vec3};
pub use sweep::Sweep;
