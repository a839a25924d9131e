use crate::core::grid::peaks::PeakSnapshot;
use crate::core::io::record::FallbackRecord;
use crate::core::models::structure::Structure;
use crate::core::units::ev_to_ry;
use crate::engine::config::RestoreConfig;
use crate::engine::context::RefinementContext;
use crate::engine::error::{EngineError, Stage};
use crate::engine::machine;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::services::{FieldContext, Services};
use crate::engine::state::CompletionStatus;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct RestoreResult {
    pub final_structure: Structure,
    /// Unfiltered peaks of the last detection pass, if any pass ran.
    pub peaks: Option<PeakSnapshot>,
    pub status: CompletionStatus,
    /// Total energy of the reference structure in Ry.
    pub reference_energy_ry: Option<f64>,
    pub cycles: usize,
    pub used_fallback: bool,
    pub fallback_record: Option<FallbackRecord>,
    /// External computations performed during the run, in order.
    pub artifacts: Vec<FieldContext>,
}

/// Restores the tracked atoms of `initial` up to `config.target_count`.
///
/// When both a `reference` structure and an energy calculator are available the
/// reference energy is computed first. Artifacts are released only when the run
/// reached its target and `clean_workdir` is set; cleanup failures are logged.
///
/// # Errors
///
/// Returns an [`EngineError`] if the configuration is inconsistent with the
/// input structure, if any external computation fails, or if a candidate
/// site violates the minimum separation.
#[instrument(skip_all, name = "restore_workflow", fields(target = config.target_count))]
pub fn run(
    initial: &Structure,
    reference: Option<&Structure>,
    config: &RestoreConfig,
    services: Services<'_>,
    reporter: &ProgressReporter,
) -> Result<RestoreResult, EngineError> {
    // === Phase 0: Reference energy ===
    let reference_energy_ry = match (reference, services.energy) {
        (Some(reference), Some(calculator)) => {
            reporter.report(Progress::PhaseStart {
                name: "Reference Energy",
            });
            let energy_ev = calculator
                .total_energy_ev(reference)
                .map_err(|e| EngineError::external(Stage::ReferenceEnergy, e))?;
            let energy_ry = ev_to_ry(energy_ev);
            info!(energy_ev, energy_ry, "Reference energy computed.");
            reporter.report(Progress::PhaseFinish);
            Some(energy_ry)
        }
        (Some(_), None) => {
            warn!("A reference structure was given but no energy calculator is configured.");
            None
        }
        (None, _) => None,
    };

    // === Phase 1: Refinement loop ===
    let context = RefinementContext::new(config, services, reporter);
    let outcome = machine::run_to_completion(&context, initial.clone())?;
    let state = outcome.state;

    // === Phase 2: Cleanup ===
    if config.refinement.clean_workdir {
        match (outcome.status, services.cleaner) {
            (CompletionStatus::Complete, Some(cleaner)) => {
                match cleaner.release(&state.artifacts) {
                    Ok(()) => info!(count = state.artifacts.len(), "Released external artifacts."),
                    Err(e) => warn!(error = %e, "Failed to release external artifacts."),
                }
            }
            (CompletionStatus::Complete, None) => {
                warn!("Cleanup requested but no artifact cleaner is configured.")
            }
            (CompletionStatus::TargetNotReached { .. }, _) => {
                info!("Keeping external artifacts of an incomplete run.")
            }
        }
    }

    Ok(RestoreResult {
        final_structure: state.current_structure,
        peaks: state.all_peaks_snapshot,
        status: outcome.status,
        reference_energy_ry,
        cycles: state.cycles,
        used_fallback: state.used_fallback,
        fallback_record: state.fallback_record,
        artifacts: state.artifacts,
    })
}
