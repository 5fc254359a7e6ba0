//! Hit boxes: named collision shapes attached to an entity
//!
//! Hit boxes are described in pixel space relative to the entity's top-left
//! corner. When an entity with a physics component joins a [`PhysicsWorld`],
//! each hit box becomes one fixture on the entity's body.
//!
//! On the wire a hit box is a flat sequence of fields: name, origin `(x, y)`,
//! size `(w, h)`, a shape tag and, for chains only, the point count followed
//! by each point's `x, y`.
//!
//! [`PhysicsWorld`]: crate::PhysicsWorld

use std::fmt;

use kinetic2d_math::Vec2;
use kinetic2d_physics::{ChainShape, CircleShape, PhysicsError, PhysicsResult, PolygonShape, Shape};
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer, Deserialize, Deserializer};

use crate::units::UnitConverter;

/// An axis-aligned rectangle in pixel space (y down)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn new(min_x: f32, min_y: f32, width: f32, height: f32) -> Self {
        Self { min_x, min_y, width, height }
    }

    #[inline]
    pub fn max_x(&self) -> f32 {
        self.min_x + self.width
    }

    #[inline]
    pub fn max_y(&self) -> f32 {
        self.min_y + self.height
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.min_x + self.width * 0.5, self.min_y + self.height * 0.5)
    }

    /// Smallest rectangle containing both
    pub fn union(&self, other: &Bounds) -> Bounds {
        let min_x = self.min_x.min(other.min_x);
        let min_y = self.min_y.min(other.min_y);
        let max_x = self.max_x().max(other.max_x());
        let max_y = self.max_y().max(other.max_y());
        Bounds::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// True if the interiors intersect; touching edges do not count
    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.min_x < other.max_x()
            && other.min_x < self.max_x()
            && self.min_y < other.max_y()
            && other.min_y < self.max_y()
    }

    /// Bounds of this rectangle rotated by `degrees` (clockwise) about `pivot`
    pub fn rotated(&self, pivot: Vec2, degrees: f32) -> Bounds {
        if degrees == 0.0 {
            return *self;
        }
        let (s, c) = degrees.to_radians().sin_cos();
        let corners = [
            Vec2::new(self.min_x, self.min_y),
            Vec2::new(self.max_x(), self.min_y),
            Vec2::new(self.max_x(), self.max_y()),
            Vec2::new(self.min_x, self.max_y()),
        ];

        let mut lower = Vec2::new(f32::MAX, f32::MAX);
        let mut upper = Vec2::new(f32::MIN, f32::MIN);
        for corner in corners {
            let d = corner - pivot;
            // y points down, so a positive angle turns clockwise on screen
            let p = pivot + Vec2::new(c * d.x - s * d.y, s * d.x + c * d.y);
            lower = lower.min_components(p);
            upper = upper.max_components(p);
        }
        Bounds::new(lower.x, lower.y, upper.x - lower.x, upper.y - lower.y)
    }
}

/// Wire tag of a [`BoundingShape`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeTag {
    Circle,
    Box,
    Chain,
}

/// The geometry of a hit box, in pixels
#[derive(Clone, Debug, PartialEq)]
pub enum BoundingShape {
    /// Circle filling a `2r × 2r` square
    Circle { radius: f32 },
    /// Axis-aligned rectangle
    Box { width: f32, height: f32 },
    /// Open polyline; only valid on static bodies
    Chain { points: Vec<Vec2> },
}

impl BoundingShape {
    pub fn circle(radius: f32) -> Self {
        BoundingShape::Circle { radius }
    }

    pub fn rectangle(width: f32, height: f32) -> Self {
        BoundingShape::Box { width, height }
    }

    /// A chain through `points`, relative to the hit box origin
    pub fn chain(points: &[Vec2]) -> PhysicsResult<Self> {
        if points.len() < 2 {
            return Err(PhysicsError::InvalidShape(format!(
                "chain needs at least 2 points, got {}",
                points.len()
            )));
        }
        Ok(BoundingShape::Chain { points: points.to_vec() })
    }

    pub fn tag(&self) -> ShapeTag {
        match self {
            BoundingShape::Circle { .. } => ShapeTag::Circle,
            BoundingShape::Box { .. } => ShapeTag::Box,
            BoundingShape::Chain { .. } => ShapeTag::Chain,
        }
    }

    pub fn is_chain(&self) -> bool {
        matches!(self, BoundingShape::Chain { .. })
    }

    /// Width and height of the shape's bounding rectangle
    pub fn size(&self) -> (f32, f32) {
        let (lower, upper) = self.extent();
        (upper.x - lower.x, upper.y - lower.y)
    }

    /// Corners of the bounding rectangle relative to the hit box origin
    ///
    /// Circles and boxes start at the origin; a chain spans its points.
    pub fn extent(&self) -> (Vec2, Vec2) {
        match self {
            BoundingShape::Circle { radius } => (Vec2::ZERO, Vec2::new(radius * 2.0, radius * 2.0)),
            BoundingShape::Box { width, height } => (Vec2::ZERO, Vec2::new(*width, *height)),
            BoundingShape::Chain { points } => {
                let Some(first) = points.first() else {
                    return (Vec2::ZERO, Vec2::ZERO);
                };
                points.iter().fold((*first, *first), |(lower, upper), p| {
                    (lower.min_components(*p), upper.max_components(*p))
                })
            }
        }
    }
}

/// A named collision shape placed at a local origin
#[derive(Clone, Debug, PartialEq)]
pub struct HitBox {
    name: String,
    origin: Vec2,
    shape: BoundingShape,
}

impl HitBox {
    /// A hit box at the entity origin
    pub fn new(name: impl Into<String>, shape: BoundingShape) -> Self {
        Self::with_origin(name, Vec2::ZERO, shape)
    }

    /// A hit box whose top-left corner sits at `origin` in entity space
    pub fn with_origin(name: impl Into<String>, origin: Vec2, shape: BoundingShape) -> Self {
        Self {
            name: name.into(),
            origin,
            shape,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn shape(&self) -> &BoundingShape {
        &self.shape
    }

    /// Local bounds relative to the entity's top-left corner
    pub fn bounds(&self) -> Bounds {
        let (lower, upper) = self.shape.extent();
        let min = self.origin + lower;
        Bounds::new(min.x, min.y, upper.x - lower.x, upper.y - lower.y)
    }

    /// Build the engine shape for this hit box
    ///
    /// `center_local` is the entity's center in entity space, which is where
    /// the body origin sits.
    pub fn to_physics_shape(&self, center_local: Vec2, units: &UnitConverter) -> PhysicsResult<Shape> {
        let bounds = self.bounds();
        let offset = |p: Vec2| {
            Vec2::new(
                units.to_meters(p.x - center_local.x),
                units.to_meters(center_local.y - p.y),
            )
        };

        match &self.shape {
            BoundingShape::Circle { radius } => {
                if !(radius.is_finite() && *radius > 0.0) {
                    return Err(PhysicsError::InvalidShape(format!(
                        "hit box '{}' has radius {}",
                        self.name, radius
                    )));
                }
                Ok(CircleShape::new(offset(bounds.center()), units.to_meters(*radius)).into())
            }
            BoundingShape::Box { width, height } => {
                if !(width.is_finite() && height.is_finite() && *width > 0.0 && *height > 0.0) {
                    return Err(PhysicsError::InvalidShape(format!(
                        "hit box '{}' has size {}x{}",
                        self.name, width, height
                    )));
                }
                let mut polygon = PolygonShape::new_box(1.0, 1.0);
                polygon.set_as_oriented_box(
                    units.to_meters(width * 0.5),
                    units.to_meters(height * 0.5),
                    offset(bounds.center()),
                    0.0,
                );
                Ok(polygon.into())
            }
            BoundingShape::Chain { points } => {
                let vertices: Vec<Vec2> = points.iter().map(|p| offset(self.origin + *p)).collect();
                Ok(ChainShape::create_chain(&vertices)?.into())
            }
        }
    }
}

impl Serialize for HitBox {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (width, height) = self.shape.size();
        let points = match &self.shape {
            BoundingShape::Chain { points } => points.as_slice(),
            _ => &[],
        };
        let len = 6 + if self.shape.is_chain() { 1 + 2 * points.len() } else { 0 };

        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.name)?;
        seq.serialize_element(&self.origin.x)?;
        seq.serialize_element(&self.origin.y)?;
        seq.serialize_element(&width)?;
        seq.serialize_element(&height)?;
        seq.serialize_element(&self.shape.tag())?;
        if self.shape.is_chain() {
            seq.serialize_element(&(points.len() as u32))?;
            for p in points {
                seq.serialize_element(&p.x)?;
                seq.serialize_element(&p.y)?;
            }
        }
        seq.end()
    }
}

struct HitBoxVisitor;

impl<'de> Visitor<'de> for HitBoxVisitor {
    type Value = HitBox;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a flat hit box sequence: name, x, y, w, h, shape tag [, count, points]")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<HitBox, A::Error> {
        let name: String = seq.next_element()?.ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let x: f32 = seq.next_element()?.ok_or_else(|| de::Error::invalid_length(1, &self))?;
        let y: f32 = seq.next_element()?.ok_or_else(|| de::Error::invalid_length(2, &self))?;
        let width: f32 = seq.next_element()?.ok_or_else(|| de::Error::invalid_length(3, &self))?;
        let height: f32 = seq.next_element()?.ok_or_else(|| de::Error::invalid_length(4, &self))?;
        let tag: ShapeTag = seq.next_element()?.ok_or_else(|| de::Error::invalid_length(5, &self))?;

        let shape = match tag {
            ShapeTag::Circle => BoundingShape::circle(width * 0.5),
            ShapeTag::Box => BoundingShape::rectangle(width, height),
            ShapeTag::Chain => {
                let count: u32 = seq.next_element()?.ok_or_else(|| de::Error::invalid_length(6, &self))?;
                let mut points = Vec::with_capacity(count as usize);
                for i in 0..count as usize {
                    let px: f32 = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(7 + 2 * i, &self))?;
                    let py: f32 = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(8 + 2 * i, &self))?;
                    points.push(Vec2::new(px, py));
                }
                BoundingShape::chain(&points).map_err(de::Error::custom)?
            }
        };

        Ok(HitBox::with_origin(name, Vec2::new(x, y), shape))
    }
}

impl<'de> Deserialize<'de> for HitBox {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(HitBoxVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinetic2d_math::Transform2D;

    fn units() -> UnitConverter {
        UnitConverter::new(600.0, 50.0)
    }

    #[test]
    fn test_bounds_from_shape() {
        let hit_box = HitBox::with_origin("body", Vec2::new(5.0, 10.0), BoundingShape::rectangle(40.0, 20.0));
        let bounds = hit_box.bounds();
        assert_eq!(bounds, Bounds::new(5.0, 10.0, 40.0, 20.0));
        assert_eq!(bounds.max_x(), 45.0);
        assert_eq!(bounds.center(), Vec2::new(25.0, 20.0));

        let circle = HitBox::new("ball", BoundingShape::circle(8.0));
        assert_eq!(circle.bounds().width, 16.0);
    }

    #[test]
    fn test_overlap_excludes_touching_edges() {
        let a = Bounds::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.overlaps(&Bounds::new(5.0, 5.0, 10.0, 10.0)));
        assert!(!a.overlaps(&Bounds::new(10.0, 0.0, 10.0, 10.0)));
        assert!(!a.overlaps(&Bounds::new(0.0, 20.0, 10.0, 10.0)));
    }

    #[test]
    fn test_rotated_bounds() {
        let a = Bounds::new(0.0, 0.0, 20.0, 10.0);
        let r = a.rotated(a.center(), 90.0);
        assert!((r.width - 10.0).abs() < 1e-4);
        assert!((r.height - 20.0).abs() < 1e-4);
        assert!((r.center().x - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_chain_needs_two_points() {
        assert!(matches!(
            BoundingShape::chain(&[Vec2::ZERO]),
            Err(PhysicsError::InvalidShape(_))
        ));
        assert!(BoundingShape::chain(&[Vec2::ZERO, Vec2::new(10.0, 0.0)]).is_ok());
    }

    #[test]
    fn test_box_shape_is_centered_on_body() {
        let hit_box = HitBox::new("body", BoundingShape::rectangle(100.0, 50.0));
        let shape = hit_box
            .to_physics_shape(hit_box.bounds().center(), &units())
            .unwrap();

        // 2m x 1m box centered on the body origin
        assert!(shape.test_point(&Transform2D::IDENTITY, Vec2::new(0.95, 0.45)));
        assert!(!shape.test_point(&Transform2D::IDENTITY, Vec2::new(1.05, 0.0)));
    }

    #[test]
    fn test_offset_circle_flips_y() {
        // Circle in the lower half of a 100x100 entity
        let hit_box = HitBox::with_origin("feet", Vec2::new(25.0, 50.0), BoundingShape::circle(25.0));
        let shape = hit_box.to_physics_shape(Vec2::new(50.0, 50.0), &units()).unwrap();
        match shape {
            Shape::Circle(circle) => {
                assert_eq!(circle.p, Vec2::new(0.0, -0.5));
                assert_eq!(circle.radius, 0.5);
            }
            other => panic!("expected a circle, got {:?}", other),
        }
    }

    #[test]
    fn test_degenerate_box_is_rejected() {
        let hit_box = HitBox::new("flat", BoundingShape::rectangle(10.0, 0.0));
        assert!(matches!(
            hit_box.to_physics_shape(Vec2::ZERO, &units()),
            Err(PhysicsError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_box_round_trips_through_ron() {
        let hit_box = HitBox::with_origin("torso", Vec2::new(2.0, 4.0), BoundingShape::rectangle(30.0, 60.0));
        let text = ron::to_string(&hit_box).unwrap();
        assert!(text.contains("torso"));
        let parsed: HitBox = ron::from_str(&text).unwrap();
        assert_eq!(parsed, hit_box);
    }

    #[test]
    fn test_chain_bounds_span_points() {
        let points = [Vec2::new(-20.0, 5.0), Vec2::new(30.0, -10.0), Vec2::new(60.0, 5.0)];
        let hit_box = HitBox::with_origin("ramp", Vec2::new(100.0, 100.0), BoundingShape::chain(&points).unwrap());
        assert_eq!(hit_box.shape().size(), (80.0, 15.0));
        assert_eq!(hit_box.bounds(), Bounds::new(80.0, 90.0, 80.0, 15.0));

        let parsed: HitBox = ron::from_str(&ron::to_string(&hit_box).unwrap()).unwrap();
        assert_eq!(parsed, hit_box);
    }

    #[test]
    fn test_flat_chain_overlaps_box() {
        let line = BoundingShape::chain(&[Vec2::new(0.0, 50.0), Vec2::new(200.0, 50.0)]).unwrap();
        let bounds = HitBox::new("line", line).bounds();
        assert_eq!(bounds, Bounds::new(0.0, 50.0, 200.0, 0.0));

        let crossing = HitBox::with_origin("crate", Vec2::new(90.0, 40.0), BoundingShape::rectangle(20.0, 20.0));
        assert!(bounds.overlaps(&crossing.bounds()));
        let above = HitBox::with_origin("crate", Vec2::new(90.0, 10.0), BoundingShape::rectangle(20.0, 20.0));
        assert!(!bounds.overlaps(&above.bounds()));
    }

    #[test]
    fn test_chain_round_trips_through_ron() {
        let points = [Vec2::new(0.0, 0.0), Vec2::new(50.0, 10.0), Vec2::new(100.0, 0.0)];
        let hit_box = HitBox::new("ground", BoundingShape::chain(&points).unwrap());
        let parsed: HitBox = ron::from_str(&ron::to_string(&hit_box).unwrap()).unwrap();
        assert_eq!(parsed, hit_box);
    }

    #[test]
    fn test_flat_sequence_layout() {
        let parsed: HitBox = ron::from_str(r#"["ball", 1.0, 2.0, 10.0, 10.0, Circle]"#).unwrap();
        assert_eq!(parsed.name(), "ball");
        assert_eq!(parsed.origin(), Vec2::new(1.0, 2.0));
        assert_eq!(parsed.shape(), &BoundingShape::circle(5.0));

        let short_chain = ron::from_str::<HitBox>(r#"["c", 0.0, 0.0, 1.0, 1.0, Chain, 1, 0.0, 0.0]"#);
        assert!(short_chain.is_err());
    }
}
