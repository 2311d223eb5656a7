//! Grid partitioning of a pixel extent into composite tiles.
//!
//! An [`AreaOfInterest`] describes the full raster extent in pixels and the
//! tile size used to split it. [`AreaOfInterest::tiles`] returns a lazy
//! [`Tiles`] iterator; calling it again restarts the enumeration from the
//! first tile.
//!
//! # Ordering
//!
//! Tiles are produced x-major: every tile of the first column (increasing y)
//! is emitted before the next column starts.
//!
//! ```text
//! extent = 10, tile = 4
//!
//!   x=0      x=4      x=8
//! ┌────────┬────────┬────┐ y=0
//! │   1    │   4    │ 7  │
//! ├────────┼────────┼────┤ y=4
//! │   2    │   5    │ 8  │
//! ├────────┼────────┼────┤ y=8
//! │   3    │   6    │ 9  │
//! └────────┴────────┴────┘
//! ```
//!
//! Edge tiles are clipped so that the grid covers the extent exactly.

mod window;

pub use window::Window;

use thiserror::Error;

/// Errors raised when building an area of interest.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    /// Tile size of zero would never advance the enumeration.
    #[error("tile size must be greater than zero")]
    ZeroTileSize,

    /// An empty extent has nothing to partition.
    #[error("extent must be greater than zero (got {width}x{height})")]
    EmptyExtent { width: u32, height: u32 },
}

/// Pixel extent to be partitioned into tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AreaOfInterest {
    width: u32,
    height: u32,
    tile_size: u32,
}

impl AreaOfInterest {
    /// Create an area of interest of `width` × `height` pixels.
    pub fn new(width: u32, height: u32, tile_size: u32) -> Result<Self, GridError> {
        if tile_size == 0 {
            return Err(GridError::ZeroTileSize);
        }
        if width == 0 || height == 0 {
            return Err(GridError::EmptyExtent { width, height });
        }
        Ok(Self {
            width,
            height,
            tile_size,
        })
    }

    /// Create a square area of interest (the common case for a single scene).
    pub fn square(extent: u32, tile_size: u32) -> Result<Self, GridError> {
        Self::new(extent, extent, tile_size)
    }

    /// Width of the extent in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of the extent in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Nominal tile size in pixels.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Number of tile columns.
    pub fn columns(&self) -> u32 {
        self.width.div_ceil(self.tile_size)
    }

    /// Number of tile rows.
    pub fn rows(&self) -> u32 {
        self.height.div_ceil(self.tile_size)
    }

    /// Total number of tiles in the grid.
    pub fn tile_count(&self) -> usize {
        self.columns() as usize * self.rows() as usize
    }

    /// Enumerate every tile, x-major.
    pub fn tiles(&self) -> Tiles {
        Tiles {
            width: self.width,
            height: self.height,
            tile_size: self.tile_size,
            x: 0,
            y: 0,
            remaining: self.tile_count(),
        }
    }

    /// Enumerate at most `limit` tiles.
    ///
    /// `None` (or a limit larger than the grid) yields the full grid. The
    /// enumeration stops as soon as the cap is reached, even mid-column.
    pub fn tiles_limited(&self, limit: Option<usize>) -> std::iter::Take<Tiles> {
        self.tiles().take(limit.unwrap_or(usize::MAX))
    }
}

/// Lazy iterator over the tiles of an [`AreaOfInterest`].
#[derive(Debug, Clone)]
pub struct Tiles {
    width: u32,
    height: u32,
    tile_size: u32,
    x: u32,
    y: u32,
    remaining: usize,
}

impl Iterator for Tiles {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.remaining == 0 {
            return None;
        }

        let width = self.tile_size.min(self.width - self.x);
        let height = self.tile_size.min(self.height - self.y);
        let tile = Window::new(self.x, self.y, width, height);

        self.remaining -= 1;
        match self.y.checked_add(self.tile_size) {
            Some(next_y) if next_y < self.height => self.y = next_y,
            _ => {
                self.y = 0;
                self.x = self.x.saturating_add(self.tile_size);
            }
        }

        Some(tile)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Tiles {}

impl std::iter::FusedIterator for Tiles {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_extent_10_tile_4_matches_expected_grid() {
        let aoi = AreaOfInterest::square(10, 4).unwrap();
        let tiles: Vec<_> = aoi.tiles().map(|w| w.to_array()).collect();

        assert_eq!(
            tiles,
            vec![
                [0, 0, 4, 4],
                [0, 4, 4, 4],
                [0, 8, 4, 2],
                [4, 0, 4, 4],
                [4, 4, 4, 4],
                [4, 8, 4, 2],
                [8, 0, 2, 4],
                [8, 4, 2, 4],
                [8, 8, 2, 2],
            ]
        );
    }

    #[test]
    fn test_exact_multiple_has_no_clipped_tiles() {
        let aoi = AreaOfInterest::square(8, 4).unwrap();
        assert_eq!(aoi.tile_count(), 4);
        assert!(aoi.tiles().all(|w| w.width() == 4 && w.height() == 4));
    }

    #[test]
    fn test_last_single_pixel_column_is_covered() {
        let aoi = AreaOfInterest::square(9, 4).unwrap();
        let last = aoi.tiles().last().unwrap();
        assert_eq!(last.to_array(), [8, 8, 1, 1]);
    }

    #[test]
    fn test_tile_larger_than_extent() {
        let aoi = AreaOfInterest::square(3, 512).unwrap();
        let tiles: Vec<_> = aoi.tiles().collect();
        assert_eq!(tiles, vec![Window::new(0, 0, 3, 3)]);
    }

    #[test]
    fn test_rectangular_extent() {
        let aoi = AreaOfInterest::new(6, 3, 4).unwrap();
        let tiles: Vec<_> = aoi.tiles().map(|w| w.to_array()).collect();
        assert_eq!(tiles, vec![[0, 0, 4, 3], [4, 0, 2, 3]]);
    }

    #[test]
    fn test_limit_stops_mid_column() {
        let aoi = AreaOfInterest::square(10, 4).unwrap();
        let tiles: Vec<_> = aoi.tiles_limited(Some(2)).collect();
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[1].to_array(), [0, 4, 4, 4]);
    }

    #[test]
    fn test_no_limit_yields_full_grid() {
        let aoi = AreaOfInterest::square(10, 4).unwrap();
        assert_eq!(aoi.tiles_limited(None).count(), 9);
        assert_eq!(aoi.tiles_limited(Some(100)).count(), 9);
    }

    #[test]
    fn test_enumeration_is_restartable() {
        let aoi = AreaOfInterest::square(10, 4).unwrap();
        let first: Vec<_> = aoi.tiles().collect();
        let second: Vec<_> = aoi.tiles().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_size_hint_is_exact() {
        let aoi = AreaOfInterest::square(10, 4).unwrap();
        let mut tiles = aoi.tiles();
        assert_eq!(tiles.len(), 9);
        tiles.next();
        assert_eq!(tiles.len(), 8);
    }

    #[test]
    fn test_invalid_areas_rejected() {
        assert_eq!(
            AreaOfInterest::square(10, 0),
            Err(GridError::ZeroTileSize)
        );
        assert!(matches!(
            AreaOfInterest::square(0, 4),
            Err(GridError::EmptyExtent { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_tiles_cover_extent_exactly(
            width in 1u32..300,
            height in 1u32..300,
            tile in 1u32..64,
        ) {
            let aoi = AreaOfInterest::new(width, height, tile).unwrap();
            let mut coverage = vec![0u8; (width * height) as usize];
            let mut count = 0usize;

            for w in aoi.tiles() {
                prop_assert!(w.width() > 0 && w.height() > 0);
                prop_assert!(w.right() <= width && w.bottom() <= height);
                for y in w.y()..w.bottom() {
                    for x in w.x()..w.right() {
                        coverage[(y * width + x) as usize] += 1;
                    }
                }
                count += 1;
            }

            prop_assert_eq!(count, aoi.tile_count());
            prop_assert!(coverage.iter().all(|&c| c == 1));
        }

        #[test]
        fn prop_boundary_tiles_have_remainder_size(extent in 1u32..500, tile in 1u32..64) {
            let aoi = AreaOfInterest::square(extent, tile).unwrap();
            let remainder = extent % tile;
            let last = aoi.tiles().last().unwrap();
            let expected = if remainder == 0 { tile.min(extent) } else { remainder };
            prop_assert_eq!(last.width(), expected);
            prop_assert_eq!(last.height(), expected);
        }
    }
}
