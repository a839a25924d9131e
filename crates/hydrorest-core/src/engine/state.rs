use super::services::FieldContext;
use crate::core::grid::peaks::PeakSnapshot;
use crate::core::io::record::FallbackRecord;
use crate::core::models::structure::Structure;

/// Everything the refinement loop carries from one transition to the next.
#[derive(Debug, Clone)]
pub struct RefinementState {
    pub current_structure: Structure,
    /// The most recent external computation whose output the next step builds on.
    pub current_field_source: Option<FieldContext>,
    pub target_count: usize,
    pub progress_failed: bool,
    /// Unfiltered peaks of the latest detection pass.
    pub all_peaks_snapshot: Option<PeakSnapshot>,
    /// Completed detect-and-place cycles.
    pub cycles: usize,
    /// Every external computation started during the run, in order.
    pub artifacts: Vec<FieldContext>,
    pub fallback_record: Option<FallbackRecord>,
    pub used_fallback: bool,
}

impl RefinementState {
    pub fn new(structure: Structure, target_count: usize) -> Self {
        Self {
            current_structure: structure,
            current_field_source: None,
            target_count,
            progress_failed: false,
            all_peaks_snapshot: None,
            cycles: 0,
            artifacts: Vec::new(),
            fallback_record: None,
            used_fallback: false,
        }
    }

    pub fn tracked_count(&self, kind: &str) -> usize {
        self.current_structure.count_of(kind)
    }

    pub fn missing(&self, kind: &str) -> usize {
        self.target_count.saturating_sub(self.tracked_count(kind))
    }

    /// Makes `context` the current field source and remembers it for cleanup.
    pub fn adopt_context(&mut self, context: FieldContext) {
        self.artifacts.push(context.clone());
        self.current_field_source = Some(context);
    }

    pub fn status(&self, kind: &str) -> CompletionStatus {
        let found = self.tracked_count(kind);
        if found == self.target_count {
            CompletionStatus::Complete
        } else {
            CompletionStatus::TargetNotReached {
                found,
                target: self.target_count,
            }
        }
    }
}

/// Whether a finished run reached its target count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Complete,
    /// The run finished without error but with fewer tracked atoms than requested.
    TargetNotReached { found: usize, target: usize },
}

impl CompletionStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, CompletionStatus::Complete)
    }
}
