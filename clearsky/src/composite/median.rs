//! Median kernels over planar sample slices.
//!
//! Callers guarantee every slice has the same length, a multiple of
//! `bands`.

use rayon::prelude::*;

use crate::raster::Sample;

/// Joint lower median of pixel vectors, ranked by channel sum.
pub fn joint_median<T: Sample>(inputs: &[&[T]], bands: usize) -> Vec<T> {
    let Some(first) = inputs.first() else {
        return Vec::new();
    };
    let len = first.len();
    let band_len = len / bands.max(1);

    // Winning source per pixel, None when every observation is excluded.
    let winners: Vec<Option<usize>> = (0..band_len)
        .into_par_iter()
        .map_init(
            || Vec::with_capacity(inputs.len()),
            |ranked: &mut Vec<(u64, usize)>, p| {
                ranked.clear();
                for (source, samples) in inputs.iter().enumerate() {
                    let mut sum = 0u64;
                    let mut valid = true;
                    for band in 0..bands {
                        let v = samples[band * band_len + p];
                        if v.is_sentinel() {
                            valid = false;
                            break;
                        }
                        sum += u64::from(v.to_u32());
                    }
                    if valid {
                        ranked.push((sum, source));
                    }
                }
                if ranked.is_empty() {
                    return None;
                }
                // Source index in the key keeps ties in source order.
                ranked.sort_unstable();
                Some(ranked[ranked.len() / 2].1)
            },
        )
        .collect();

    let mut out = vec![T::NODATA; len];
    for band in 0..bands {
        let base = band * band_len;
        for (p, winner) in winners.iter().enumerate() {
            if let Some(source) = winner {
                out[base + p] = inputs[*source][base + p];
            }
        }
    }
    out
}

/// Independent lower median per sample position, skipping nodata only.
pub fn per_channel_median<T: Sample>(inputs: &[&[T]]) -> Vec<T> {
    let Some(first) = inputs.first() else {
        return Vec::new();
    };
    (0..first.len())
        .into_par_iter()
        .map_init(
            || Vec::with_capacity(inputs.len()),
            |values: &mut Vec<T>, i| {
                values.clear();
                values.extend(
                    inputs
                        .iter()
                        .map(|samples| samples[i])
                        .filter(|&v| v != T::NODATA),
                );
                if values.is_empty() {
                    return T::NODATA;
                }
                values.sort_unstable();
                values[values.len() / 2]
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Build planar single-pixel slices from RGB triplets.
    fn pixels(triplets: &[[u8; 3]]) -> Vec<Vec<u8>> {
        triplets.iter().map(|t| t.to_vec()).collect()
    }

    fn run(triplets: &[[u8; 3]]) -> Vec<u8> {
        let owned = pixels(triplets);
        let slices: Vec<&[u8]> = owned.iter().map(|v| v.as_slice()).collect();
        joint_median(&slices, 3)
    }

    #[test]
    fn test_excludes_nodata_and_saturated() {
        assert_eq!(run(&[[10, 10, 10], [0, 0, 0], [255, 255, 255]]), vec![10, 10, 10]);
    }

    #[test]
    fn test_single_zero_channel_excludes_vector() {
        assert_eq!(run(&[[10, 0, 10], [40, 40, 40]]), vec![40, 40, 40]);
    }

    #[test]
    fn test_tie_goes_to_earliest_source() {
        // All sums are 30; rank 3/2 = 1 must be the second source in order.
        assert_eq!(
            run(&[[10, 10, 10], [20, 5, 5], [5, 20, 5]]),
            vec![20, 5, 5]
        );
        // Two tied: rank 1 is the later of the pair.
        assert_eq!(run(&[[1, 2, 3], [3, 2, 1]]), vec![3, 2, 1]);
    }

    #[test]
    fn test_even_count_picks_upper_index_lower_median() {
        // sums 3, 6, 9, 12 -> rank 2 -> sum 9
        assert_eq!(
            run(&[[4, 4, 4], [1, 1, 1], [3, 3, 3], [2, 2, 2]]),
            vec![3, 3, 3]
        );
    }

    #[test]
    fn test_single_survivor() {
        assert_eq!(run(&[[0, 1, 1], [7, 8, 9]]), vec![7, 8, 9]);
    }

    #[test]
    fn test_planar_multi_pixel() {
        // Two pixels per source, planar [r0 r1 g0 g1 b0 b1].
        let a: Vec<u8> = vec![10, 0, 10, 0, 10, 0];
        let b: Vec<u8> = vec![20, 50, 20, 50, 20, 50];
        let c: Vec<u8> = vec![30, 60, 30, 60, 30, 60];
        let out = joint_median(&[&a[..], &b[..], &c[..]], 3);
        // pixel 0: sums 30,60,90 -> rank 1 = b; pixel 1: b,c survive -> rank 1 = c
        assert_eq!(out, vec![20, 60, 20, 60, 20, 60]);
    }

    #[test]
    fn test_per_channel_skips_only_nodata() {
        let a: Vec<u16> = vec![0, 5, u16::MAX];
        let b: Vec<u16> = vec![0, 7, 1];
        let c: Vec<u16> = vec![0, 6, 2];
        let out = per_channel_median(&[&a[..], &b[..], &c[..]]);
        assert_eq!(out, vec![0, 6, 2]);
    }

    #[test]
    fn test_per_channel_even_count_lower_median() {
        let a: Vec<u8> = vec![1];
        let b: Vec<u8> = vec![4];
        let c: Vec<u8> = vec![2];
        let d: Vec<u8> = vec![3];
        assert_eq!(per_channel_median(&[&a[..], &b[..], &c[..], &d[..]]), vec![3]);
    }

    proptest! {
        #[test]
        fn prop_output_is_a_real_observation_or_nodata(
            triplets in prop::collection::vec(prop::array::uniform3(any::<u8>()), 1..12)
        ) {
            let out = run(&triplets);
            let valid: Vec<[u8; 3]> = triplets
                .iter()
                .copied()
                .filter(|t| t.iter().all(|v| !v.is_sentinel()))
                .collect();
            if valid.is_empty() {
                prop_assert_eq!(out, vec![0, 0, 0]);
            } else {
                prop_assert!(valid.iter().any(|t| t.to_vec() == out));
            }
        }

        #[test]
        fn prop_rank_is_lower_median(
            triplets in prop::collection::vec(prop::array::uniform3(1u8..255), 1..12)
        ) {
            let out = run(&triplets);
            let sum = |t: &[u8]| t.iter().map(|&v| u32::from(v)).sum::<u32>();
            let chosen = sum(&out);
            let below = triplets.iter().filter(|t| sum(&t[..]) < chosen).count();
            let at_or_below = triplets.iter().filter(|t| sum(&t[..]) <= chosen).count();
            let rank = triplets.len() / 2;
            prop_assert!(below <= rank && rank < at_or_below);
        }
    }
}
