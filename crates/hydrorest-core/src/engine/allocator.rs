use super::config::AllocationConfig;
use super::error::EngineError;
use crate::core::grid::peaks::RankedPeakSet;
use crate::core::models::structure::Structure;
use tracing::{debug, info};

/// How an allocation pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationOutcome {
    /// The tracked count reached the target; remaining peaks were not consumed.
    BudgetReached,
    /// Every accepted peak was consumed, at least one site was placed, and the
    /// target is still not reached.
    Exhausted,
    /// Nothing was placed: no accepted peaks, or all of them were degenerate.
    NoProgress,
}

#[derive(Debug, Clone)]
pub struct Allocation {
    pub structure: Structure,
    pub placed: usize,
    pub degenerate: usize,
    pub outcome: AllocationOutcome,
}

impl Allocation {
    /// True when the accepted peaks ran out before the target was reached.
    pub fn exhausted(&self) -> bool {
        self.outcome != AllocationOutcome::BudgetReached
    }
}

/// Turns ranked peaks into new sites of the tracked kind.
#[derive(Debug, Clone, Copy)]
pub struct SiteAllocator<'a> {
    config: &'a AllocationConfig,
}

impl<'a> SiteAllocator<'a> {
    pub fn new(config: &'a AllocationConfig) -> Self {
        Self { config }
    }

    pub fn tracked_kind(&self) -> &str {
        &self.config.tracked_kind
    }

    /// Places one tracked atom per accepted peak, in rank order, until the
    /// tracked count reaches `target_count`.
    ///
    /// A peak within `occupancy_tolerance` of an existing tracked site is
    /// skipped as degenerate. Any other peak closer than `min_separation` to an
    /// existing site aborts the pass.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SiteTooClose`] when a candidate violates the
    /// minimum separation.
    pub fn allocate(
        &self,
        structure: &Structure,
        peaks: &RankedPeakSet,
        target_count: usize,
    ) -> Result<Allocation, EngineError> {
        let kind = self.config.tracked_kind.as_str();
        let dims = peaks.dims();
        let max_value = peaks.max_value().unwrap_or(0.0);

        let mut current = structure.clone();
        let mut count = current.count_of(kind);
        let mut placed = 0;
        let mut degenerate = 0;

        for peak in peaks.accepted() {
            if count >= target_count {
                break;
            }
            let position = peak.fractional(dims);

            let occupied = current
                .nearest_site(&position, Some(kind))
                .is_some_and(|(_, distance)| distance < self.config.occupancy_tolerance);
            if occupied {
                debug!(
                    grid = ?peak.grid_position,
                    "Skipping peak that coincides with an existing {} site.", kind
                );
                degenerate += 1;
                continue;
            }

            current = current
                .with_site(kind, position, self.config.min_separation)
                .map_err(EngineError::SiteTooClose)?;
            count += 1;
            placed += 1;

            info!(
                frac = ?[position.x, position.y, position.z],
                grid = ?peak.grid_position,
                value = peak.value,
                "Placed {} at peak ({:.4}% of max peak).",
                kind,
                peak.value / max_value * 100.0
            );
        }

        let outcome = if count >= target_count {
            AllocationOutcome::BudgetReached
        } else if placed == 0 {
            AllocationOutcome::NoProgress
        } else {
            AllocationOutcome::Exhausted
        };

        info!(
            placed,
            degenerate,
            found = peaks.all().len(),
            count,
            target = target_count,
            ?outcome,
            "Allocation pass finished."
        );

        Ok(Allocation {
            structure: current,
            placed,
            degenerate,
            outcome,
        })
    }
}
