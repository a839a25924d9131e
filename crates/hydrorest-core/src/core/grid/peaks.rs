use super::field::{GridField, SampleGrid};
use super::filter::maximum_filter;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point3;
use thiserror::Error;
use tracing::debug;

/// Minimum Chebyshev separation, in grid units, between two reported maxima.
pub const MIN_PEAK_DISTANCE: usize = 3;

/// Supercell used for periodic searches; the centre tile is the real cell.
pub const SUPERCELL_REPS: [usize; 3] = [3, 3, 3];

const CENTER_TILE: [usize; 3] = [1, 1, 1];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetectionError {
    #[error("Equivalence threshold must lie in (0, 1], got {value}")]
    InvalidThreshold { value: f64 },

    #[error(
        "Peak #{index} has value {value} which exceeds the preceding value {previous}; peaks must be sorted in descending order"
    )]
    UnsortedPeaks {
        index: usize,
        previous: f64,
        value: f64,
    },
}

/// A local maximum of a field, in canonical grid coordinates `[0, dims)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub grid_position: [usize; 3],
    pub value: f64,
}

impl Peak {
    /// Fractional coordinates of this peak in a grid of shape `dims`.
    pub fn fractional(&self, dims: [usize; 3]) -> Point3<f64> {
        Point3::new(
            self.grid_position[0] as f64 / dims[0] as f64,
            self.grid_position[1] as f64 / dims[1] as f64,
            self.grid_position[2] as f64 / dims[2] as f64,
        )
    }
}

/// All maxima found in one detection pass, strongest first, together with the
/// prefix that passed the relative-strength threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedPeakSet {
    peaks: Vec<Peak>,
    accepted: usize,
    threshold_ratio: f64,
    dims: [usize; 3],
}

impl RankedPeakSet {
    pub fn all(&self) -> &[Peak] {
        &self.peaks
    }

    /// Peaks whose value is strictly greater than `max_value * threshold_ratio`.
    ///
    /// The comparison is strict, so a ratio of exactly `1.0` rejects even the
    /// strongest peak and this slice is empty.
    pub fn accepted(&self) -> &[Peak] {
        &self.peaks[..self.accepted]
    }

    pub fn discarded(&self) -> &[Peak] {
        &self.peaks[self.accepted..]
    }

    pub fn max_value(&self) -> Option<f64> {
        self.peaks.first().map(|p| p.value)
    }

    pub fn threshold_ratio(&self) -> f64 {
        self.threshold_ratio
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn snapshot(&self) -> PeakSnapshot {
        PeakSnapshot {
            dims: self.dims,
            peaks: self.peaks.clone(),
        }
    }
}

/// The full, unfiltered candidate list of a detection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakSnapshot {
    dims: [usize; 3],
    peaks: Vec<Peak>,
}

impl PeakSnapshot {
    pub fn new(dims: [usize; 3], peaks: Vec<Peak>) -> Self {
        Self { dims, peaks }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn fractional_positions(&self) -> Vec<Point3<f64>> {
        self.peaks.iter().map(|p| p.fractional(self.dims)).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.peaks.iter().map(|p| p.value).collect()
    }
}

/// Local-maximum detector for periodic fields.
#[derive(Debug, Clone, Copy)]
pub struct PeakDetector {
    min_distance: usize,
}

impl Default for PeakDetector {
    fn default() -> Self {
        Self::new(MIN_PEAK_DISTANCE)
    }
}

impl PeakDetector {
    pub fn new(min_distance: usize) -> Self {
        Self { min_distance }
    }

    pub fn min_distance(&self) -> usize {
        self.min_distance
    }

    /// Finds, ranks and filters the local maxima of `field`.
    ///
    /// With `use_periodic_wrap` the search runs over a virtual 3x3x3 tiling of the
    /// cell and only maxima originating in the centre tile are kept, folded back
    /// into `[0, dims)`. This sees the true periodic neighbourhood of samples near
    /// a face while reporting each physical maximum once.
    ///
    /// A peak is accepted only if its value is strictly greater than
    /// `max * equiv_threshold`; `equiv_threshold = 1.0` therefore accepts nothing.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::InvalidThreshold`] unless `0 < equiv_threshold <= 1`,
    /// and [`DetectionError::UnsortedPeaks`] if the ranked output is not in
    /// descending order (an internal defect).
    pub fn detect(
        &self,
        field: &GridField,
        equiv_threshold: f64,
        use_periodic_wrap: bool,
    ) -> Result<RankedPeakSet, DetectionError> {
        if !(equiv_threshold > 0.0 && equiv_threshold <= 1.0) {
            return Err(DetectionError::InvalidThreshold {
                value: equiv_threshold,
            });
        }

        let dims = field.dims();
        let peaks: Vec<Peak> = if use_periodic_wrap {
            let tiled = field.tiled(SUPERCELL_REPS);
            local_maxima(&tiled, self.min_distance)
                .into_iter()
                .filter(|p| (0..3).all(|a| p.grid_position[a] / dims[a] == CENTER_TILE[a]))
                .map(|p| {
                    let folded = [0, 1, 2].map(|a| p.grid_position[a] % dims[a]);
                    Peak {
                        grid_position: folded,
                        value: field.value(folded),
                    }
                })
                .collect()
        } else {
            local_maxima(field, self.min_distance)
        };

        ensure_descending(&peaks)?;

        let accepted = match peaks.first() {
            Some(top) => {
                let cutoff = top.value * equiv_threshold;
                peaks.iter().take_while(|p| p.value > cutoff).count()
            }
            None => 0,
        };

        debug!(
            found = peaks.len(),
            accepted,
            periodic = use_periodic_wrap,
            "Peak detection finished."
        );

        Ok(RankedPeakSet {
            peaks,
            accepted,
            threshold_ratio: equiv_threshold,
            dims,
        })
    }
}

/// Verifies that peak values never increase along the sequence.
pub fn ensure_descending(peaks: &[Peak]) -> Result<(), DetectionError> {
    for (index, pair) in peaks.windows(2).enumerate() {
        if pair[1].value > pair[0].value {
            return Err(DetectionError::UnsortedPeaks {
                index: index + 1,
                previous: pair[0].value,
                value: pair[1].value,
            });
        }
    }
    Ok(())
}

/// Standard local-maximum search with nearest-border windows.
///
/// A sample is a candidate if it equals the maximum of its
/// `(2·min_distance+1)^3` window and exceeds the global minimum, so a constant
/// grid has no maxima. Candidates are ranked by value (stable over raster
/// order) and greedily thinned so that no two survivors are closer than
/// `min_distance` in Chebyshev distance.
pub fn local_maxima<G: SampleGrid + ?Sized>(grid: &G, min_distance: usize) -> Vec<Peak> {
    let window_max = maximum_filter(grid, min_distance);
    let floor = (0..grid.len())
        .map(|flat| grid.value(grid.unravel(flat)))
        .fold(f64::INFINITY, f64::min);

    let mut candidates: Vec<Peak> = window_max
        .iter()
        .enumerate()
        .filter_map(|(flat, &local_max)| {
            let position = grid.unravel(flat);
            let value = grid.value(position);
            (value == local_max && value > floor).then_some(Peak {
                grid_position: position,
                value,
            })
        })
        .collect();

    candidates.sort_by(|a, b| b.value.total_cmp(&a.value));

    if min_distance > 1 {
        thin_by_spacing(candidates, min_distance)
    } else {
        candidates
    }
}

/// Per-candidate offset added to tree coordinates. Grid candidates share whole
/// coordinate planes, and the tree cannot split a bucket whose points all agree
/// on the split axis.
const TIE_BREAK_OFFSET: f64 = 1e-9;

/// Greedy minimum-spacing filter over value-ranked candidates.
///
/// Candidates are indexed once in a k-d tree. Walking in rank order, every
/// surviving candidate rejects the neighbours closer than `spacing` in Chebyshev
/// distance. The Euclidean ball searched in the tree encloses that cube.
fn thin_by_spacing(ranked: Vec<Peak>, spacing: usize) -> Vec<Peak> {
    if ranked.len() < 2 {
        return ranked;
    }

    let points: Vec<[f64; 3]> = ranked
        .iter()
        .enumerate()
        .map(|(index, peak)| {
            let offset = index as f64 * TIE_BREAK_OFFSET;
            peak.grid_position.map(|c| c as f64 + offset)
        })
        .collect();
    let tree: KdTree<f64, 3> = (&points).into();
    let reach = spacing as f64 + 1.0;
    let radius_sq = 3.0 * reach * reach;

    let mut rejected = vec![false; ranked.len()];
    for index in 0..ranked.len() {
        if rejected[index] {
            continue;
        }
        for neighbour in tree.within_unsorted::<SquaredEuclidean>(&points[index], radius_sq) {
            let other = neighbour.item as usize;
            if other != index
                && chebyshev(&ranked[index].grid_position, &ranked[other].grid_position) < spacing
            {
                rejected[other] = true;
            }
        }
    }

    ranked
        .into_iter()
        .zip(rejected)
        .filter_map(|(peak, rejected)| (!rejected).then_some(peak))
        .collect()
}

#[inline]
fn chebyshev(a: &[usize; 3], b: &[usize; 3]) -> usize {
    (0..3).map(|i| a[i].abs_diff(b[i])).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bumps(dims: [usize; 3], centers: &[([f64; 3], f64)]) -> GridField {
        GridField::from_fn(dims, |[i, j, k]| {
            centers
                .iter()
                .map(|&(c, height)| {
                    let mut r2 = 0.0;
                    for (axis, &x) in [i, j, k].iter().enumerate() {
                        let n = dims[axis] as f64;
                        let mut d = (x as f64 - c[axis]).abs();
                        d = d.min(n - d);
                        r2 += d * d;
                    }
                    height * (-r2 / 2.0).exp()
                })
                .sum()
        })
        .unwrap()
    }

    #[test]
    fn detect_rejects_thresholds_outside_unit_interval() {
        let field = bumps([8, 8, 8], &[([4.0, 4.0, 4.0], 1.0)]);
        let detector = PeakDetector::default();
        for bad in [0.0, -0.5, 1.5, f64::NAN] {
            assert!(matches!(
                detector.detect(&field, bad, true),
                Err(DetectionError::InvalidThreshold { .. })
            ));
        }
        assert!(detector.detect(&field, 1.0, true).is_ok());
    }

    #[test]
    fn constant_field_has_no_maxima() {
        let field = GridField::new([4, 4, 4], vec![2.5; 64]).unwrap();
        let peaks = PeakDetector::default().detect(&field, 0.9, true).unwrap();
        assert!(peaks.is_empty());
        assert!(peaks.accepted().is_empty());
        assert_eq!(peaks.max_value(), None);
    }

    #[test]
    fn boundary_peak_is_found_exactly_once_with_periodic_wrap() {
        let field = bumps([12, 12, 12], &[([0.0, 6.0, 6.0], 1.0)]);
        let peaks = PeakDetector::default().detect(&field, 0.5, true).unwrap();
        assert_eq!(peaks.all().len(), 1);
        assert_eq!(peaks.all()[0].grid_position, [0, 6, 6]);
        assert_eq!(peaks.accepted().len(), 1);
    }

    #[test]
    fn folded_peak_matches_untiled_search_for_interior_maximum() {
        let field = bumps([12, 12, 12], &[([5.0, 6.0, 7.0], 1.0)]);
        let detector = PeakDetector::default();
        let periodic = detector.detect(&field, 0.5, true).unwrap();
        let direct = detector.detect(&field, 0.5, false).unwrap();
        assert_eq!(periodic.all().len(), 1);
        assert_eq!(
            periodic.all()[0].grid_position,
            direct.all()[0].grid_position
        );
        assert_eq!(periodic.all()[0].value, direct.all()[0].value);
    }

    #[test]
    fn peaks_are_ranked_and_thresholded_as_a_prefix() {
        let field = bumps(
            [16, 16, 16],
            &[
                ([3.0, 3.0, 3.0], 1.0),
                ([11.0, 11.0, 11.0], 0.999),
                ([3.0, 11.0, 7.0], 0.5),
            ],
        );
        let peaks = PeakDetector::default().detect(&field, 0.995, true).unwrap();
        assert_eq!(peaks.all().len(), 3);
        assert_eq!(peaks.accepted().len(), 2);
        assert_eq!(peaks.discarded().len(), 1);
        assert_eq!(peaks.all()[0].grid_position, [3, 3, 3]);
        assert_eq!(peaks.all()[1].grid_position, [11, 11, 11]);
        assert_eq!(peaks.all()[2].grid_position, [3, 11, 7]);

        for threshold in [0.1, 0.5, 0.9, 0.999, 1.0] {
            let ranked = PeakDetector::default().detect(&field, threshold, true).unwrap();
            let cutoff = ranked.max_value().unwrap() * threshold;
            assert!(ranked.accepted().iter().all(|p| p.value > cutoff));
            assert!(ranked.discarded().iter().all(|p| p.value <= cutoff));
        }
    }

    #[test]
    fn threshold_of_one_accepts_nothing_because_comparison_is_strict() {
        let field = bumps([12, 12, 12], &[([6.0, 6.0, 6.0], 1.0)]);
        let peaks = PeakDetector::default().detect(&field, 1.0, true).unwrap();
        assert_eq!(peaks.all().len(), 1);
        assert!(peaks.accepted().is_empty());
    }

    #[test]
    fn nearby_weaker_maxima_are_thinned() {
        let mut samples = vec![0.0; 10 * 10 * 10];
        let field = GridField::new([10, 10, 10], samples.clone()).unwrap();
        samples[field.flat_index([5, 5, 5])] = 2.0;
        samples[field.flat_index([5, 5, 7])] = 1.0;
        samples[field.flat_index([5, 5, 9])] = 1.5;
        let field = GridField::new([10, 10, 10], samples).unwrap();

        let maxima = local_maxima(&field, 0);
        assert_eq!(maxima.len(), 3);

        let thinned = local_maxima(&field, 1);
        assert_eq!(thinned.len(), 3);

        let direct = PeakDetector::new(2).detect(&field, 0.1, false).unwrap();
        let positions: Vec<_> = direct.all().iter().map(|p| p.grid_position).collect();
        assert_eq!(positions, vec![[5, 5, 5], [5, 5, 9]]);
    }

    fn greedy_reference(ranked: &[Peak], spacing: usize) -> Vec<Peak> {
        let mut kept: Vec<Peak> = Vec::new();
        for peak in ranked {
            if kept
                .iter()
                .all(|k| chebyshev(&k.grid_position, &peak.grid_position) >= spacing)
            {
                kept.push(*peak);
            }
        }
        kept
    }

    #[test]
    fn spacing_filter_matches_pairwise_greedy_selection() {
        let mut ranked: Vec<Peak> = Vec::new();
        for i in 0..9 {
            for j in 0..7 {
                for k in 0..3 {
                    let value = ((i * 7 + j * 13 + k * 29) % 31) as f64 + (i + j + k) as f64 * 1e-3;
                    ranked.push(Peak {
                        grid_position: [i, 2 * j, 4 * k],
                        value,
                    });
                }
            }
        }
        ranked.sort_by(|a, b| b.value.total_cmp(&a.value));

        for spacing in [2, 3, 5] {
            assert_eq!(
                thin_by_spacing(ranked.clone(), spacing),
                greedy_reference(&ranked, spacing),
                "spacing {spacing}"
            );
        }
    }

    #[test]
    fn spacing_filter_handles_many_candidates_on_one_plane() {
        let mut ranked: Vec<Peak> = Vec::new();
        for a in 0..12 {
            for b in 0..12 {
                ranked.push(Peak {
                    grid_position: [5, 4 * a, 4 * b],
                    value: 1000.0 - (a * 12 + b) as f64,
                });
            }
        }
        let kept = thin_by_spacing(ranked.clone(), 3);
        assert_eq!(kept, ranked);

        let crowded = thin_by_spacing(ranked.clone(), 5);
        assert_eq!(crowded, greedy_reference(&ranked, 5));
        assert_eq!(crowded.len(), 36);
    }

    #[test]
    fn detection_is_idempotent() {
        let field = bumps(
            [12, 10, 14],
            &[([1.0, 2.0, 13.0], 1.0), ([7.0, 6.0, 5.0], 0.8)],
        );
        let detector = PeakDetector::default();
        let first = detector.detect(&field, 0.7, true).unwrap();
        let second = detector.detect(&field, 0.7, true).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn ensure_descending_reports_first_violation() {
        let peaks = [
            Peak { grid_position: [0, 0, 0], value: 3.0 },
            Peak { grid_position: [1, 0, 0], value: 2.0 },
            Peak { grid_position: [2, 0, 0], value: 2.5 },
        ];
        assert_eq!(
            ensure_descending(&peaks),
            Err(DetectionError::UnsortedPeaks {
                index: 2,
                previous: 2.0,
                value: 2.5
            })
        );
        assert!(ensure_descending(&peaks[..2]).is_ok());
    }

    #[test]
    fn snapshot_reports_fractional_positions() {
        let field = bumps([12, 12, 12], &[([3.0, 6.0, 9.0], 1.0)]);
        let snapshot = PeakDetector::default()
            .detect(&field, 0.5, true)
            .unwrap()
            .snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.fractional_positions()[0], Point3::new(0.25, 0.5, 0.75));
        assert_eq!(snapshot.values(), vec![field.value([3, 6, 9])]);
    }
}
