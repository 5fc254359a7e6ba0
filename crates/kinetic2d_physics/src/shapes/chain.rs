use kinetic2d_math::{Transform2D, Vec2};
use serde::{Deserialize, Serialize};

use super::EdgeShape;
use crate::collision::Aabb;
use crate::error::{PhysicsError, PhysicsResult};
use crate::settings::{LINEAR_SLOP, POLYGON_RADIUS};

/// A free-form sequence of line segments
///
/// Chains have two-sided collision, so either winding works. Connectivity
/// information is kept so edges collide smoothly across vertices. Chains
/// have no mass and should only be attached to static bodies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainShape {
    vertices: Vec<Vec2>,
    /// Ghost vertex before the first vertex, for open chains
    pub prev_vertex: Option<Vec2>,
    /// Ghost vertex after the last vertex, for open chains
    pub next_vertex: Option<Vec2>,
    pub radius: f32,
}

impl ChainShape {
    /// Open chain through the given points
    pub fn create_chain(points: &[Vec2]) -> PhysicsResult<Self> {
        if points.len() < 2 {
            return Err(PhysicsError::InvalidShape(format!(
                "chain needs at least 2 points, got {}",
                points.len()
            )));
        }
        check_spacing(points)?;
        Ok(Self {
            vertices: points.to_vec(),
            prev_vertex: None,
            next_vertex: None,
            radius: POLYGON_RADIUS,
        })
    }

    /// Closed loop through the given points; the last point connects to the first
    pub fn create_loop(points: &[Vec2]) -> PhysicsResult<Self> {
        if points.len() < 3 {
            return Err(PhysicsError::InvalidShape(format!(
                "loop needs at least 3 points, got {}",
                points.len()
            )));
        }
        check_spacing(points)?;
        let mut vertices = points.to_vec();
        vertices.push(points[0]);
        Ok(Self {
            prev_vertex: Some(vertices[vertices.len() - 2]),
            next_vertex: Some(vertices[1]),
            vertices,
            radius: POLYGON_RADIUS,
        })
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    /// One child per segment
    pub fn child_count(&self) -> usize {
        self.vertices.len() - 1
    }

    /// The edge for a child index, with ghost vertices from its neighbours
    pub fn child_edge(&self, index: usize) -> EdgeShape {
        let count = self.vertices.len();
        debug_assert!(index + 1 < count);
        EdgeShape {
            vertex1: self.vertices[index],
            vertex2: self.vertices[index + 1],
            vertex0: if index > 0 {
                Some(self.vertices[index - 1])
            } else {
                self.prev_vertex
            },
            vertex3: if index + 2 < count {
                Some(self.vertices[index + 2])
            } else {
                self.next_vertex
            },
            radius: self.radius,
        }
    }

    pub fn compute_aabb(&self, xf: &Transform2D, child_index: usize) -> Aabb {
        let i2 = if child_index + 1 < self.vertices.len() { child_index + 1 } else { 0 };
        let v1 = xf.apply(self.vertices[child_index]);
        let v2 = xf.apply(self.vertices[i2]);
        Aabb::new(v1.min_components(v2), v1.max_components(v2))
    }
}

fn check_spacing(points: &[Vec2]) -> PhysicsResult<()> {
    for pair in points.windows(2) {
        if pair[0].distance_squared(pair[1]) <= LINEAR_SLOP * LINEAR_SLOP {
            return Err(PhysicsError::InvalidShape(
                "chain vertices are too close together".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_needs_two_points() {
        let result = ChainShape::create_chain(&[Vec2::ZERO]);
        assert!(matches!(result, Err(PhysicsError::InvalidShape(_))));
        assert!(ChainShape::create_chain(&[]).is_err());
    }

    #[test]
    fn test_open_chain_ghosts() {
        let chain = ChainShape::create_chain(&[
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 0.0),
        ])
        .unwrap();
        let first = chain.child_edge(0);
        assert_eq!(first.vertex0, None);
        assert_eq!(first.vertex3, Some(Vec2::new(2.0, 0.0)));
        let last = chain.child_edge(1);
        assert_eq!(last.vertex0, Some(Vec2::new(0.0, 0.0)));
        assert_eq!(last.vertex3, None);
    }

    #[test]
    fn test_loop_closes() {
        let square = ChainShape::create_loop(&[
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ])
        .unwrap();
        assert_eq!(square.child_count(), 4);
        let closing = square.child_edge(3);
        assert_eq!(closing.vertex2, Vec2::new(0.0, 0.0));
        assert_eq!(closing.vertex3, Some(Vec2::new(1.0, 0.0)));
        assert_eq!(square.child_edge(0).vertex0, Some(Vec2::new(0.0, 1.0)));
    }

    #[test]
    fn test_coincident_points_rejected() {
        let result = ChainShape::create_chain(&[Vec2::ZERO, Vec2::ZERO, Vec2::X]);
        assert!(result.is_err());
    }
}
