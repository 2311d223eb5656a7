//! Affine geotransform handling.
//!
//! Uses the six-coefficient convention common to raster libraries:
//!
//! ```text
//! X = c[0] + col * c[1] + row * c[2]
//! Y = c[3] + col * c[4] + row * c[5]
//! ```
//!
//! For north-up imagery `c[2]` and `c[4]` are zero, `c[1]` is the pixel
//! width and `c[5]` the (negative) pixel height.

use serde::{Deserialize, Serialize};

use crate::grid::Window;

/// Six-parameter affine transform from pixel to projected coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform([f64; 6]);

impl GeoTransform {
    /// Create a transform from its raw coefficients.
    pub const fn new(coefficients: [f64; 6]) -> Self {
        Self(coefficients)
    }

    /// Create a north-up transform from an origin and pixel size.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self([origin_x, pixel_width, 0.0, origin_y, 0.0, pixel_height])
    }

    /// Identity transform (pixel coordinates are projected coordinates).
    pub const fn identity() -> Self {
        Self([0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
    }

    /// Raw coefficients.
    pub fn coefficients(&self) -> [f64; 6] {
        self.0
    }

    /// X coordinate of the top-left corner.
    pub fn origin_x(&self) -> f64 {
        self.0[0]
    }

    /// Y coordinate of the top-left corner.
    pub fn origin_y(&self) -> f64 {
        self.0[3]
    }

    /// Pixel width (`c[1]`).
    pub fn pixel_width(&self) -> f64 {
        self.0[1]
    }

    /// Pixel height (`c[5]`, negative for north-up rasters).
    pub fn pixel_height(&self) -> f64 {
        self.0[5]
    }

    /// Project a pixel coordinate.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let c = &self.0;
        (
            c[0] + col * c[1] + row * c[2],
            c[3] + col * c[4] + row * c[5],
        )
    }

    /// Transform for a sub-window whose top-left pixel is `window`'s origin.
    ///
    /// Only the origin moves, by `(x * pixel_width, y * pixel_height)`;
    /// resolution and rotation terms are kept.
    pub fn for_window(&self, window: &Window) -> Self {
        let mut c = self.0;
        c[0] += f64::from(window.x()) * c[1];
        c[3] += f64::from(window.y()) * c[5];
        Self(c)
    }

    /// Transform of a level reduced by `factor` (used for overviews).
    pub fn scaled(&self, factor_x: f64, factor_y: f64) -> Self {
        let mut c = self.0;
        c[1] *= factor_x;
        c[2] *= factor_y;
        c[4] *= factor_x;
        c[5] *= factor_y;
        Self(c)
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<[f64; 6]> for GeoTransform {
    fn from(c: [f64; 6]) -> Self {
        Self(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_shifts_origin_only() {
        // 10m Sentinel-2 grid
        let gt = GeoTransform::north_up(300000.0, 4900020.0, 10.0, -10.0);
        let shifted = gt.for_window(&Window::new(512, 1024, 512, 512));

        assert_eq!(shifted.origin_x(), 300000.0 + 5120.0);
        assert_eq!(shifted.origin_y(), 4900020.0 - 10240.0);
        assert_eq!(shifted.pixel_width(), 10.0);
        assert_eq!(shifted.pixel_height(), -10.0);
    }

    #[test]
    fn test_zero_window_keeps_transform() {
        let gt = GeoTransform::north_up(1.0, 2.0, 0.5, -0.5);
        assert_eq!(gt.for_window(&Window::new(0, 0, 4, 4)), gt);
    }

    #[test]
    fn test_apply() {
        let gt = GeoTransform::north_up(100.0, 200.0, 2.0, -2.0);
        assert_eq!(gt.apply(3.0, 4.0), (106.0, 192.0));
    }

    #[test]
    fn test_scaled() {
        let gt = GeoTransform::north_up(100.0, 200.0, 2.0, -2.0).scaled(2.0, 2.0);
        assert_eq!(gt.pixel_width(), 4.0);
        assert_eq!(gt.pixel_height(), -4.0);
        assert_eq!(gt.origin_x(), 100.0);
    }
}
