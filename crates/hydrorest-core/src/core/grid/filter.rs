use super::field::SampleGrid;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Maximum over the `(2·radius+1)^3` cube around every sample.
///
/// Windows are clamped at the array border, which is equivalent to extending
/// the array with its nearest border values. The cube maximum is separable, so
/// it is computed as three 1-D passes; the first pass reads straight from `grid`
/// so tiled views are never copied.
pub fn maximum_filter<G: SampleGrid + ?Sized>(grid: &G, radius: usize) -> Vec<f64> {
    let dims = grid.dims();
    let mut first = vec![0.0; grid.len()];
    max_along_axis(dims, radius, 2, &|flat| grid.value(grid.unravel(flat)), &mut first);

    let mut second = vec![0.0; first.len()];
    max_along_axis(dims, radius, 1, &|flat| first[flat], &mut second);

    max_along_axis(dims, radius, 0, &|flat| second[flat], &mut first);
    first
}

fn max_along_axis(
    dims: [usize; 3],
    radius: usize,
    axis: usize,
    read: &(dyn Fn(usize) -> f64 + Sync),
    out: &mut [f64],
) {
    let strides = [dims[1] * dims[2], dims[2], 1];
    let stride = strides[axis];
    let extent = dims[axis];

    let window_max = |(flat, slot): (usize, &mut f64)| {
        let coord = (flat / stride) % extent;
        let base = flat - coord * stride;
        let lo = coord.saturating_sub(radius);
        let hi = (coord + radius).min(extent - 1);
        *slot = (lo..=hi)
            .map(|t| read(base + t * stride))
            .fold(f64::NEG_INFINITY, f64::max);
    };

    #[cfg(not(feature = "parallel"))]
    out.iter_mut().enumerate().for_each(window_max);

    #[cfg(feature = "parallel")]
    out.par_iter_mut().enumerate().for_each(window_max);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::field::GridField;

    fn brute_force(field: &GridField, radius: usize) -> Vec<f64> {
        let [d0, d1, d2] = field.dims();
        let clamp = |c: isize, d: usize| c.clamp(0, d as isize - 1) as usize;
        let r = radius as isize;
        (0..field.len())
            .map(|flat| {
                let [i, j, k] = field.unravel(flat);
                let mut best = f64::NEG_INFINITY;
                for di in -r..=r {
                    for dj in -r..=r {
                        for dk in -r..=r {
                            let index = [
                                clamp(i as isize + di, d0),
                                clamp(j as isize + dj, d1),
                                clamp(k as isize + dk, d2),
                            ];
                            best = best.max(field.value(index));
                        }
                    }
                }
                best
            })
            .collect()
    }

    fn pseudo_random_field(dims: [usize; 3]) -> GridField {
        let mut state = 12345u64;
        GridField::from_fn(dims, |_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as f64 / (1u64 << 31) as f64
        })
        .unwrap()
    }

    #[test]
    fn separable_filter_matches_brute_force_cube() {
        let field = pseudo_random_field([5, 7, 6]);
        for radius in [0, 1, 3] {
            assert_eq!(maximum_filter(&field, radius), brute_force(&field, radius));
        }
    }

    #[test]
    fn radius_zero_is_identity() {
        let field = pseudo_random_field([3, 3, 3]);
        assert_eq!(maximum_filter(&field, 0), field.samples());
    }

    #[test]
    fn filter_reads_through_tiled_views() {
        let field = pseudo_random_field([3, 4, 2]);
        let view = field.tiled([2, 1, 1]);
        let filtered = maximum_filter(&view, 1);
        assert_eq!(filtered.len(), 2 * field.len());
        assert!(filtered.iter().all(|&v| v <= field.max_value()));
    }
}
