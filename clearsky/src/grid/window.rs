//! Pixel window type shared by the grid, jobs, and raster I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A rectangular pixel window `{x, y, width, height}`.
///
/// Serialized as a four element array `[x, y, width, height]`, which is the
/// wire form used in job records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct Window {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl Window {
    /// Create a new window.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Column offset of the window's top-left pixel.
    pub fn x(&self) -> u32 {
        self.x
    }

    /// Row offset of the window's top-left pixel.
    pub fn y(&self) -> u32 {
        self.y
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Exclusive right edge (`x + width`), saturating.
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge (`y + height`), saturating.
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Number of pixels covered by one band of this window.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// True when the window has no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when the window lies fully inside a `width` × `height` raster.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x.checked_add(self.width).is_some_and(|r| r <= width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= height)
    }

    /// Intersection with another window, if any.
    pub fn intersect(&self, other: &Window) -> Option<Window> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x0 < x1 && y0 < y1 {
            Some(Window::new(x0, y0, x1 - x0, y1 - y0))
        } else {
            None
        }
    }

    /// The `[x, y, width, height]` array form.
    pub fn to_array(&self) -> [u32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

impl From<[u32; 4]> for Window {
    fn from(a: [u32; 4]) -> Self {
        Self::new(a[0], a[1], a[2], a[3])
    }
}

impl From<Window> for [u32; 4] {
    fn from(w: Window) -> Self {
        w.to_array()
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {} {} {}]",
            self.x, self.y, self.width, self.height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_within() {
        let w = Window::new(8, 8, 2, 2);
        assert!(w.fits_within(10, 10));
        assert!(!w.fits_within(9, 10));
        assert!(!Window::new(u32::MAX, 0, 2, 1).fits_within(u32::MAX, 1));
    }

    #[test]
    fn test_intersect() {
        let a = Window::new(0, 0, 10, 10);
        let b = Window::new(5, 8, 10, 10);
        assert_eq!(a.intersect(&b), Some(Window::new(5, 8, 5, 2)));
        assert_eq!(a.intersect(&Window::new(10, 0, 3, 3)), None);
    }

    #[test]
    fn test_serializes_as_array() {
        let w = Window::new(512, 1024, 512, 260);
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, "[512,1024,512,260]");
        let back: Window = serde_json::from_str(&json).unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn test_negative_offsets_rejected() {
        assert!(serde_json::from_str::<Window>("[-1,0,4,4]").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Window::new(1, 2, 3, 4).to_string(), "[1 2 3 4]");
    }
}
