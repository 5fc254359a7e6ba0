//! Collision shapes
//!
//! The shape set is closed: circles, convex polygons, edge segments and
//! chains of edges. [`Shape`] is a tagged union over them and every query
//! dispatches with a `match`, so the narrow phase can look up a collide
//! function per shape-type pair.
//!
//! Shapes are described in body-local coordinates. Chains are the only shapes
//! with more than one child; each child of a chain is an [`EdgeShape`].

mod chain;
mod circle;
mod edge;
mod polygon;

pub use chain::ChainShape;
pub use circle::CircleShape;
pub use edge::EdgeShape;
pub use polygon::PolygonShape;

use kinetic2d_math::{Transform2D, Vec2};
use serde::{Deserialize, Serialize};

use crate::collision::{Aabb, RayCastInput, RayCastOutput};

/// Discriminant of [`Shape`], used to index the contact dispatch table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeType {
    Circle = 0,
    Edge = 1,
    Polygon = 2,
    Chain = 3,
}

impl ShapeType {
    /// Number of shape types
    pub const COUNT: usize = 4;
}

/// Mass properties computed from a shape and a density
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MassData {
    /// Mass in kilograms
    pub mass: f32,
    /// Center of mass relative to the shape origin
    pub center: Vec2,
    /// Rotational inertia about the shape origin
    pub inertia: f32,
}

/// A collision shape
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Circle(CircleShape),
    Polygon(PolygonShape),
    Edge(EdgeShape),
    Chain(ChainShape),
}

impl Shape {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Circle(_) => ShapeType::Circle,
            Shape::Polygon(_) => ShapeType::Polygon,
            Shape::Edge(_) => ShapeType::Edge,
            Shape::Chain(_) => ShapeType::Chain,
        }
    }

    /// Skin radius; polygons and edges carry a small rounding radius
    pub fn radius(&self) -> f32 {
        match self {
            Shape::Circle(s) => s.radius,
            Shape::Polygon(s) => s.radius,
            Shape::Edge(s) => s.radius,
            Shape::Chain(s) => s.radius,
        }
    }

    /// Number of convex children (broad-phase proxies) this shape needs
    pub fn child_count(&self) -> usize {
        match self {
            Shape::Chain(s) => s.child_count(),
            _ => 1,
        }
    }

    /// Is the world point inside the shape; always false for edges and chains
    pub fn test_point(&self, xf: &Transform2D, p: Vec2) -> bool {
        match self {
            Shape::Circle(s) => s.test_point(xf, p),
            Shape::Polygon(s) => s.test_point(xf, p),
            Shape::Edge(_) | Shape::Chain(_) => false,
        }
    }

    /// Cast a ray against one child of the shape
    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        xf: &Transform2D,
        child_index: usize,
    ) -> Option<RayCastOutput> {
        match self {
            Shape::Circle(s) => s.ray_cast(input, xf),
            Shape::Polygon(s) => s.ray_cast(input, xf),
            Shape::Edge(s) => s.ray_cast(input, xf),
            Shape::Chain(s) => s.child_edge(child_index).ray_cast(input, xf),
        }
    }

    /// World bounding box of one child
    pub fn compute_aabb(&self, xf: &Transform2D, child_index: usize) -> Aabb {
        match self {
            Shape::Circle(s) => s.compute_aabb(xf),
            Shape::Polygon(s) => s.compute_aabb(xf),
            Shape::Edge(s) => s.compute_aabb(xf),
            Shape::Chain(s) => s.compute_aabb(xf, child_index),
        }
    }

    /// Mass properties at the given density; edges and chains have none
    pub fn compute_mass(&self, density: f32) -> MassData {
        match self {
            Shape::Circle(s) => s.compute_mass(density),
            Shape::Polygon(s) => s.compute_mass(density),
            Shape::Edge(s) => s.compute_mass(),
            Shape::Chain(_) => MassData::default(),
        }
    }

    /// Distance from a world point to one child, and the outward direction
    ///
    /// Negative distances mean the point is inside the shape.
    pub fn compute_distance(&self, xf: &Transform2D, p: Vec2, child_index: usize) -> (f32, Vec2) {
        match self {
            Shape::Circle(s) => s.compute_distance(xf, p),
            Shape::Polygon(s) => s.compute_distance(xf, p),
            Shape::Edge(s) => s.compute_distance(xf, p),
            Shape::Chain(s) => s.child_edge(child_index).compute_distance(xf, p),
        }
    }
}

impl From<CircleShape> for Shape {
    fn from(shape: CircleShape) -> Self {
        Shape::Circle(shape)
    }
}

impl From<PolygonShape> for Shape {
    fn from(shape: PolygonShape) -> Self {
        Shape::Polygon(shape)
    }
}

impl From<EdgeShape> for Shape {
    fn from(shape: EdgeShape) -> Self {
        Shape::Edge(shape)
    }
}

impl From<ChainShape> for Shape {
    fn from(shape: ChainShape) -> Self {
        Shape::Chain(shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_counts() {
        let circle: Shape = CircleShape::new(Vec2::ZERO, 1.0).into();
        assert_eq!(circle.child_count(), 1);

        let chain: Shape = ChainShape::create_chain(&[
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 1.0),
        ])
        .unwrap()
        .into();
        assert_eq!(chain.child_count(), 2);
        assert_eq!(chain.shape_type(), ShapeType::Chain);
    }

    #[test]
    fn test_edges_have_no_mass_and_no_inside() {
        let edge: Shape = EdgeShape::new(Vec2::ZERO, Vec2::new(1.0, 0.0)).into();
        assert_eq!(edge.compute_mass(5.0).mass, 0.0);
        assert!(!edge.test_point(&Transform2D::IDENTITY, Vec2::new(0.5, 0.0)));
    }
}
