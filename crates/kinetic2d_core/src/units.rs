//! Conversion between pixel space and physics space
//!
//! Pixel space has its origin at the top-left of the application area with y
//! pointing down. Physics space is measured in meters with y pointing up. The
//! application height is the pivot for the y flip.

use kinetic2d_math::Vec2;
use serde::{Serialize, Deserialize};

/// Default scale between the two spaces
pub const DEFAULT_PIXELS_PER_METER: f32 = 50.0;

/// Converts lengths, points and vectors between pixels and meters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitConverter {
    pixels_per_meter: f32,
    meters_per_pixel: f32,
    app_height: f32,
}

impl Default for UnitConverter {
    fn default() -> Self {
        Self::new(600.0, DEFAULT_PIXELS_PER_METER)
    }
}

impl UnitConverter {
    /// Create a converter for an application area `app_height` pixels tall
    ///
    /// A non-positive or non-finite scale falls back to the default.
    pub fn new(app_height: f32, pixels_per_meter: f32) -> Self {
        let pixels_per_meter = if pixels_per_meter.is_finite() && pixels_per_meter > 0.0 {
            pixels_per_meter
        } else {
            log::warn!(
                "Invalid pixels_per_meter {}, using {}",
                pixels_per_meter,
                DEFAULT_PIXELS_PER_METER
            );
            DEFAULT_PIXELS_PER_METER
        };

        Self {
            pixels_per_meter,
            meters_per_pixel: 1.0 / pixels_per_meter,
            app_height,
        }
    }

    #[inline]
    pub fn pixels_per_meter(&self) -> f32 {
        self.pixels_per_meter
    }

    #[inline]
    pub fn app_height(&self) -> f32 {
        self.app_height
    }

    /// Length in pixels to meters
    #[inline]
    pub fn to_meters(&self, pixels: f32) -> f32 {
        pixels * self.meters_per_pixel
    }

    /// Length in meters to pixels
    #[inline]
    pub fn to_pixels(&self, meters: f32) -> f32 {
        meters * self.pixels_per_meter
    }

    /// A point in pixel space to a point in physics space
    pub fn to_point(&self, p: Vec2) -> Vec2 {
        Vec2::new(self.to_meters(p.x), self.to_meters(self.app_height - p.y))
    }

    /// A point in physics space to a point in pixel space
    pub fn to_pixel_point(&self, p: Vec2) -> Vec2 {
        Vec2::new(self.to_pixels(p.x), self.to_pixels(self.to_meters(self.app_height) - p.y))
    }

    /// A direction or velocity in pixel space to physics space (no pivot)
    pub fn to_vector(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.to_meters(v.x), -self.to_meters(v.y))
    }

    /// A direction or velocity in physics space to pixel space (no pivot)
    pub fn to_pixel_vector(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.to_pixels(v.x), -self.to_pixels(v.y))
    }

    /// Clockwise degrees in pixel space to counter-clockwise radians
    #[inline]
    pub fn to_radians(&self, degrees: f32) -> f32 {
        -degrees.to_radians()
    }

    /// Counter-clockwise radians to clockwise degrees in pixel space
    #[inline]
    pub fn to_degrees(&self, radians: f32) -> f32 {
        -radians.to_degrees()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter() -> UnitConverter {
        UnitConverter::new(600.0, 50.0)
    }

    #[test]
    fn test_lengths() {
        let units = converter();
        assert_eq!(units.to_meters(100.0), 2.0);
        assert_eq!(units.to_pixels(2.0), 100.0);
    }

    #[test]
    fn test_point_flips_about_app_height() {
        let units = converter();
        assert_eq!(units.to_point(Vec2::new(100.0, 50.0)), Vec2::new(2.0, 11.0));
        assert_eq!(units.to_pixel_point(Vec2::new(2.0, 11.0)), Vec2::new(100.0, 50.0));
    }

    #[test]
    fn test_vector_flips_without_pivot() {
        let units = converter();
        assert_eq!(units.to_vector(Vec2::new(100.0, 50.0)), Vec2::new(2.0, -1.0));
        assert_eq!(units.to_pixel_vector(Vec2::new(2.0, -1.0)), Vec2::new(100.0, 50.0));
    }

    #[test]
    fn test_length_round_trip() {
        let units = UnitConverter::new(720.0, 37.5);
        for x in [-1234.5f32, -1.0, 0.0, 0.25, 3.0, 99.9, 4096.0] {
            let back = units.to_pixels(units.to_meters(x));
            assert!((back - x).abs() <= 1e-5 * x.abs().max(1.0), "{} -> {}", x, back);
        }
    }

    #[test]
    fn test_angles() {
        let units = converter();
        assert!((units.to_radians(90.0) + std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert!((units.to_degrees(-std::f32::consts::FRAC_PI_2) - 90.0).abs() < 1e-4);
    }

    #[test]
    fn test_invalid_scale_falls_back() {
        let units = UnitConverter::new(600.0, 0.0);
        assert_eq!(units.pixels_per_meter(), DEFAULT_PIXELS_PER_METER);
    }
}
