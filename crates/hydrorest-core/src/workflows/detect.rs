use crate::core::grid::field::GridField;
use crate::core::grid::peaks::{PeakDetector, PeakSnapshot};
use crate::core::models::structure::Structure;
use crate::engine::allocator::{AllocationOutcome, SiteAllocator};
use crate::engine::config::DetectConfig;
use crate::engine::error::EngineError;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct DetectionReport {
    pub structure: Structure,
    pub placed: usize,
    pub degenerate: usize,
    pub outcome: AllocationOutcome,
    /// Every maximum found, strongest first.
    pub peaks: PeakSnapshot,
    /// Number of leading entries in `peaks` that passed the threshold.
    pub accepted: usize,
}

/// Runs one detect-and-place pass of `field` over `structure`.
///
/// No external computation is involved, so the field must already describe
/// the structure's cell on a grid of any shape.
///
/// # Errors
///
/// Returns [`EngineError::Detection`] for an invalid threshold and
/// [`EngineError::SiteTooClose`] when a candidate violates the minimum separation.
#[instrument(skip_all, name = "detect_workflow", fields(target = config.target_count))]
pub fn run(
    structure: &Structure,
    field: &GridField,
    config: &DetectConfig,
) -> Result<DetectionReport, EngineError> {
    let detector = PeakDetector::new(config.detection.min_peak_distance);
    let ranked = detector.detect(
        field,
        config.detection.equiv_threshold,
        config.detection.use_periodic_wrap,
    )?;

    let allocation =
        SiteAllocator::new(&config.allocation).allocate(structure, &ranked, config.target_count)?;

    info!(
        found = ranked.all().len(),
        accepted = ranked.accepted().len(),
        placed = allocation.placed,
        "Detection pass finished."
    );

    Ok(DetectionReport {
        structure: allocation.structure,
        placed: allocation.placed,
        degenerate: allocation.degenerate,
        outcome: allocation.outcome,
        peaks: ranked.snapshot(),
        accepted: ranked.accepted().len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::peaks::DetectionError;
    use crate::engine::config::RestoreConfigBuilder;
    use crate::engine::testing::{GRID, bump_field, grid_to_fractional, oxygen_cell};

    fn config(target: usize, threshold: f64) -> DetectConfig {
        RestoreConfigBuilder::new()
            .target_count(target)
            .equiv_threshold(threshold)
            .build_detect()
            .unwrap()
    }

    #[test]
    fn places_every_peak_above_threshold() {
        let field = bump_field(GRID, &[([3, 3, 3], 1.0), ([9, 9, 3], 0.9), ([3, 9, 9], 0.2)]);
        let report = run(&oxygen_cell(), &field, &config(5, 0.5)).unwrap();

        assert_eq!(report.peaks.len(), 3);
        assert_eq!(report.accepted, 2);
        assert_eq!(report.placed, 2);
        assert_eq!(report.outcome, AllocationOutcome::Exhausted);
        let h: Vec<_> = report.structure.positions_of("H").copied().collect();
        assert_eq!(
            h,
            vec![grid_to_fractional([3, 3, 3]), grid_to_fractional([9, 9, 3])]
        );
    }

    #[test]
    fn stops_once_target_is_met() {
        let field = bump_field(GRID, &[([3, 3, 3], 1.0), ([9, 9, 3], 0.9)]);
        let report = run(&oxygen_cell(), &field, &config(1, 0.5)).unwrap();
        assert_eq!(report.placed, 1);
        assert_eq!(report.outcome, AllocationOutcome::BudgetReached);
    }

    #[test]
    fn flat_field_places_nothing() {
        let field = GridField::from_fn(GRID, |_| 0.25).unwrap();
        let report = run(&oxygen_cell(), &field, &config(2, 0.9)).unwrap();
        assert!(report.peaks.is_empty());
        assert_eq!(report.outcome, AllocationOutcome::NoProgress);
        assert_eq!(report.structure, oxygen_cell());
    }

    #[test]
    fn invalid_threshold_is_reported_by_the_detector() {
        let field = bump_field(GRID, &[([3, 3, 3], 1.0)]);
        let mut config = config(1, 0.5);
        config.detection.equiv_threshold = 1.5;
        let result = run(&oxygen_cell(), &field, &config);
        assert!(matches!(
            result,
            Err(EngineError::Detection(DetectionError::InvalidThreshold { .. }))
        ));
    }
}
