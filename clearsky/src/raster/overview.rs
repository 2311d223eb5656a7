//! Reduced-resolution pyramid construction.
//!
//! Each level halves the previous one (rounding up) until a level fits in a
//! single internal block:
//!
//! ```text
//! 512x512 ──► 256x256 ──► 128x128      (block size 128)
//! ```

use super::{PixelBuffer, Resampling, Sample};

/// One reduced-resolution level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewLevel {
    pub width: u32,
    pub height: u32,
    /// Planar samples for all bands.
    pub data: PixelBuffer,
}

/// Sizes of the overview levels for a raster, largest first.
///
/// Empty when the full-resolution raster already fits in one block.
pub fn level_sizes(width: u32, height: u32, block_size: u32) -> Vec<(u32, u32)> {
    let block_size = block_size.max(1);
    let mut sizes = Vec::new();
    let (mut w, mut h) = (width, height);
    while w > block_size || h > block_size {
        w = w.div_ceil(2);
        h = h.div_ceil(2);
        sizes.push((w, h));
    }
    sizes
}

/// Build every overview level for a planar buffer.
pub fn build(
    data: &PixelBuffer,
    width: u32,
    height: u32,
    bands: usize,
    block_size: u32,
    resampling: Resampling,
) -> Vec<OverviewLevel> {
    match data {
        PixelBuffer::U8(v) => build_typed(v, width, height, bands, block_size, resampling),
        PixelBuffer::U16(v) => build_typed(v, width, height, bands, block_size, resampling),
    }
}

fn build_typed<T: Sample>(
    data: &[T],
    width: u32,
    height: u32,
    bands: usize,
    block_size: u32,
    resampling: Resampling,
) -> Vec<OverviewLevel> {
    let mut levels = Vec::new();
    let mut current: Vec<T> = data.to_vec();
    let (mut w, mut h) = (width, height);

    for (nw, nh) in level_sizes(width, height, block_size) {
        let next = halve(&current, w, h, bands, resampling);
        levels.push(OverviewLevel {
            width: nw,
            height: nh,
            data: T::into_buffer(next.clone()),
        });
        current = next;
        w = nw;
        h = nh;
    }
    levels
}

/// Halve a planar raster in both dimensions.
///
/// Odd trailing rows and columns contribute to the last output pixel on
/// their own.
pub fn halve<T: Sample>(
    data: &[T],
    width: u32,
    height: u32,
    bands: usize,
    resampling: Resampling,
) -> Vec<T> {
    let (w, h) = (width as usize, height as usize);
    let (ow, oh) = (w.div_ceil(2), h.div_ceil(2));
    let mut out = Vec::with_capacity(ow * oh * bands);

    for band in 0..bands {
        let plane = &data[band * w * h..(band + 1) * w * h];
        for oy in 0..oh {
            for ox in 0..ow {
                let (x0, y0) = (ox * 2, oy * 2);
                let value = match resampling {
                    Resampling::Nearest => plane[y0 * w + x0],
                    Resampling::Average => {
                        let mut sum = 0u32;
                        let mut n = 0u32;
                        for y in y0..(y0 + 2).min(h) {
                            for x in x0..(x0 + 2).min(w) {
                                sum += plane[y * w + x].to_u32();
                                n += 1;
                            }
                        }
                        T::from_u32_clamped((sum + n / 2) / n)
                    }
                };
                out.push(value);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_sizes() {
        assert_eq!(level_sizes(512, 512, 256), vec![(256, 256)]);
        assert_eq!(level_sizes(512, 512, 128), vec![(256, 256), (128, 128)]);
        assert_eq!(level_sizes(100, 40, 256), Vec::<(u32, u32)>::new());
        assert_eq!(level_sizes(5, 3, 2), vec![(3, 2), (2, 1)]);
    }

    #[test]
    fn test_average_rounds() {
        // one band 2x2 -> 1x1, mean of 1,2,2,2 = 1.75 -> 2
        let out = halve(&[1u8, 2, 2, 2], 2, 2, 1, Resampling::Average);
        assert_eq!(out, vec![2]);
    }

    #[test]
    fn test_odd_edges() {
        // 3x1 -> 2x1: (10+20)/2, 30
        let out = halve(&[10u16, 20, 30], 3, 1, 1, Resampling::Average);
        assert_eq!(out, vec![15, 30]);
    }

    #[test]
    fn test_nearest_per_band() {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let out = halve(&data, 2, 2, 2, Resampling::Nearest);
        assert_eq!(out, vec![1, 5]);
    }

    #[test]
    fn test_build_levels() {
        let data = PixelBuffer::from(vec![100u8; 8 * 8 * 3]);
        let levels = build(&data, 8, 8, 3, 2, Resampling::Average);
        let sizes: Vec<_> = levels.iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(sizes, vec![(4, 4), (2, 2)]);
        assert_eq!(levels[1].data.len(), 2 * 2 * 3);
        assert!(levels[1].data.samples::<u8>().unwrap().iter().all(|&v| v == 100));
    }
}
