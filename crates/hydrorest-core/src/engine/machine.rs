//! The refinement state machine.
//!
//! Each phase owns the [`RefinementState`] while it runs and hands it to its
//! successor. Transition functions return phase-specific enums, so only the
//! successors a phase may legally reach can be expressed. Failures are returned
//! as [`EngineError`]s and end the run without retry.

use super::allocator::AllocationOutcome;
use super::config::{ConfigError, FieldMode};
use super::context::RefinementContext;
use super::error::{EngineError, Stage};
use super::progress::Progress;
use super::services::{FallbackRequest, FieldRequest, FieldSample, RelaxationRequest, ServiceError};
use super::state::{CompletionStatus, RefinementState};
use crate::core::grid::field::GridField;
use crate::core::models::structure::Structure;
use tracing::{debug, error, info, instrument, warn};

enum Phase {
    Init(RefinementState),
    ComputeField(RefinementState),
    DetectAndPlace(RefinementState, GridField),
    Refine(RefinementState),
    Fallback(RefinementState),
    RefineFinal(RefinementState),
    Done(RefinementState),
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Init(_) => "INIT",
            Phase::ComputeField(_) => "COMPUTE_FIELD",
            Phase::DetectAndPlace(..) => "DETECT_AND_PLACE",
            Phase::Refine(_) => "REFINE",
            Phase::Fallback(_) => "FALLBACK",
            Phase::RefineFinal(_) => "REFINE_FINAL",
            Phase::Done(_) => "DONE",
        }
    }
}

enum AfterInit {
    ComputeField(RefinementState),
    Done(RefinementState),
}

enum AfterComputeField {
    DetectAndPlace(RefinementState, GridField),
}

enum AfterDetectAndPlace {
    Refine(RefinementState),
    Fallback(RefinementState),
    Done(RefinementState),
}

enum AfterRefine {
    ComputeField(RefinementState),
}

enum AfterFallback {
    RefineFinal(RefinementState),
}

enum AfterRefineFinal {
    Done(RefinementState),
}

impl From<AfterInit> for Phase {
    fn from(next: AfterInit) -> Self {
        match next {
            AfterInit::ComputeField(s) => Phase::ComputeField(s),
            AfterInit::Done(s) => Phase::Done(s),
        }
    }
}

impl From<AfterComputeField> for Phase {
    fn from(next: AfterComputeField) -> Self {
        match next {
            AfterComputeField::DetectAndPlace(s, field) => Phase::DetectAndPlace(s, field),
        }
    }
}

impl From<AfterDetectAndPlace> for Phase {
    fn from(next: AfterDetectAndPlace) -> Self {
        match next {
            AfterDetectAndPlace::Refine(s) => Phase::Refine(s),
            AfterDetectAndPlace::Fallback(s) => Phase::Fallback(s),
            AfterDetectAndPlace::Done(s) => Phase::Done(s),
        }
    }
}

impl From<AfterRefine> for Phase {
    fn from(next: AfterRefine) -> Self {
        match next {
            AfterRefine::ComputeField(s) => Phase::ComputeField(s),
        }
    }
}

impl From<AfterFallback> for Phase {
    fn from(next: AfterFallback) -> Self {
        match next {
            AfterFallback::RefineFinal(s) => Phase::RefineFinal(s),
        }
    }
}

impl From<AfterRefineFinal> for Phase {
    fn from(next: AfterRefineFinal) -> Self {
        match next {
            AfterRefineFinal::Done(s) => Phase::Done(s),
        }
    }
}

/// Final state of a run that reached `DONE`.
#[derive(Debug, Clone)]
pub struct RefinementOutcome {
    pub state: RefinementState,
    pub status: CompletionStatus,
}

/// Drives the machine from `INIT` until `DONE`, or until a transition fails.
#[instrument(
    skip_all,
    name = "refinement_loop",
    fields(target = ctx.config.target_count, kind = ctx.tracked_kind())
)]
pub fn run_to_completion(
    ctx: &RefinementContext<'_>,
    initial: Structure,
) -> Result<RefinementOutcome, EngineError> {
    let mut phase = Phase::Init(RefinementState::new(initial, ctx.config.target_count));
    loop {
        let name = phase.name();
        debug!(phase = name, "Entering phase.");
        let next = match phase {
            Phase::Init(s) => init(ctx, s).map(Phase::from),
            Phase::ComputeField(s) => compute_field(ctx, s).map(Phase::from),
            Phase::DetectAndPlace(s, field) => detect_and_place(ctx, s, field).map(Phase::from),
            Phase::Refine(s) => refine(ctx, s).map(Phase::from),
            Phase::Fallback(s) => fallback(ctx, s).map(Phase::from),
            Phase::RefineFinal(s) => refine_final(ctx, s).map(Phase::from),
            Phase::Done(s) => return Ok(finish(ctx, s)),
        };
        phase = next.inspect_err(|e| error!(phase = name, error = %e, "Refinement failed."))?;
    }
}

fn init(ctx: &RefinementContext<'_>, mut state: RefinementState) -> Result<AfterInit, EngineError> {
    let kind = ctx.tracked_kind();
    let current = state.tracked_count(kind);
    state.progress_failed = false;

    if current > state.target_count {
        return Err(ConfigError::InvalidParameter {
            name: "target_count",
            reason: format!(
                "structure already holds {current} {kind} atoms, more than the target of {}",
                state.target_count
            ),
        }
        .into());
    }

    info!(current, target = state.target_count, kind, "Starting refinement.");
    if current == state.target_count {
        info!("Structure already holds the target count; nothing to restore.");
        return Ok(AfterInit::Done(state));
    }
    Ok(AfterInit::ComputeField(state))
}

fn solve_field(
    ctx: &RefinementContext<'_>,
    state: &RefinementState,
    total_charge: i64,
) -> Result<FieldSample, EngineError> {
    let request = FieldRequest {
        structure: &state.current_structure,
        missing: state.missing(ctx.tracked_kind()),
        total_charge,
        previous: state.current_field_source.as_ref(),
    };
    ctx.services
        .field
        .compute_field(&request)
        .map_err(|e| EngineError::external(Stage::FieldComputation, e))
}

fn compute_field(
    ctx: &RefinementContext<'_>,
    mut state: RefinementState,
) -> Result<AfterComputeField, EngineError> {
    let charge = -(state.missing(ctx.tracked_kind()) as i64);

    let field = match ctx.config.refinement.field_mode {
        FieldMode::Direct => {
            let sample = solve_field(ctx, &state, charge)?;
            state.adopt_context(sample.context);
            sample.field
        }
        FieldMode::Difference => {
            let full = solve_field(ctx, &state, charge)?;
            let partial = solve_field(ctx, &state, charge + 1)?;
            let difference = full.field.difference(&partial.field)?;
            state.adopt_context(full.context);
            state.artifacts.push(partial.context);
            difference
        }
    };
    Ok(AfterComputeField::DetectAndPlace(state, field))
}

fn detect_and_place(
    ctx: &RefinementContext<'_>,
    mut state: RefinementState,
    field: GridField,
) -> Result<AfterDetectAndPlace, EngineError> {
    let kind = ctx.tracked_kind();
    let target = state.target_count;
    state.cycles += 1;
    let before = state.tracked_count(kind);

    ctx.reporter.report(Progress::CycleStart {
        cycle: state.cycles,
        current: before,
        target,
    });
    info!(cycle = state.cycles, current = before, target, "Starting detect-and-place cycle.");

    let detection = &ctx.config.detection;
    let ranked = ctx
        .detector
        .detect(&field, detection.equiv_threshold, detection.use_periodic_wrap)?;
    state.all_peaks_snapshot = Some(ranked.snapshot());

    let allocation = ctx
        .allocator
        .allocate(&state.current_structure, &ranked, target)?;
    state.current_structure = allocation.structure;
    let after = state.tracked_count(kind);
    ctx.reporter.report(Progress::CountUpdate {
        current: after,
        target,
    });

    if after == target {
        return Ok(AfterDetectAndPlace::Done(state));
    }
    if allocation.outcome == AllocationOutcome::NoProgress {
        warn!(
            cycle = state.cycles,
            found = ranked.all().len(),
            degenerate = allocation.degenerate,
            "No new sites could be placed."
        );
        state.progress_failed = true;
        return Ok(escalate(ctx, state));
    }
    if state.cycles >= ctx.config.refinement.max_cycles {
        warn!(
            max_cycles = ctx.config.refinement.max_cycles,
            current = after,
            target,
            "Cycle limit reached before the target count."
        );
        state.progress_failed = true;
        return Ok(escalate(ctx, state));
    }
    Ok(AfterDetectAndPlace::Refine(state))
}

fn escalate(ctx: &RefinementContext<'_>, state: RefinementState) -> AfterDetectAndPlace {
    if ctx.services.fallback.is_some() {
        AfterDetectAndPlace::Fallback(state)
    } else {
        warn!("No fallback solver configured; finishing with the sites placed so far.");
        AfterDetectAndPlace::Done(state)
    }
}

fn relax(ctx: &RefinementContext<'_>, state: &mut RefinementState) -> Result<(), EngineError> {
    let kind = ctx.tracked_kind();
    let sites_before = state.current_structure.len();
    let tracked_before = state.tracked_count(kind);
    let frozen = state.current_structure.freeze_mask(kind);

    let request = RelaxationRequest {
        structure: &state.current_structure,
        frozen: &frozen,
        max_steps: ctx.config.relaxation.max_steps,
        dynamics: ctx.config.relaxation.dynamics,
        total_charge: -(state.missing(kind) as i64),
        previous: state.current_field_source.as_ref(),
    };
    let relaxed = ctx
        .services
        .relaxer
        .relax(&request)
        .map_err(|e| EngineError::external(Stage::Relaxation, e))?;

    let tracked_after = relaxed.structure.count_of(kind);
    if tracked_after != tracked_before || relaxed.structure.len() != sites_before {
        return Err(EngineError::external(
            Stage::Relaxation,
            ServiceError::Failed(format!(
                "relaxed structure has {} sites ({tracked_after} {kind}), expected {sites_before} ({tracked_before} {kind})",
                relaxed.structure.len()
            )),
        ));
    }

    state.current_structure = relaxed.structure;
    state.adopt_context(relaxed.context);
    Ok(())
}

fn refine(ctx: &RefinementContext<'_>, mut state: RefinementState) -> Result<AfterRefine, EngineError> {
    relax(ctx, &mut state)?;
    Ok(AfterRefine::ComputeField(state))
}

fn fallback(
    ctx: &RefinementContext<'_>,
    mut state: RefinementState,
) -> Result<AfterFallback, EngineError> {
    let solver = ctx.services.fallback.ok_or_else(|| {
        EngineError::Internal("fallback phase entered without a fallback solver".into())
    })?;
    let snapshot = state.all_peaks_snapshot.as_ref().ok_or_else(|| {
        EngineError::Internal("fallback phase entered before any detection pass".into())
    })?;

    let kind = ctx.tracked_kind();
    let previous = state.tracked_count(kind);
    let remaining = state.missing(kind);

    ctx.reporter.report(Progress::PhaseStart {
        name: "Fallback Placement",
    });
    info!(
        remaining,
        candidates = snapshot.len(),
        "Handing residual placement to the fallback solver."
    );

    let request = FallbackRequest {
        structure: &state.current_structure,
        context: state.current_field_source.as_ref(),
        candidates: snapshot,
        remaining,
    };
    let outcome = solver
        .place_remaining(&request)
        .map_err(|e| EngineError::external(Stage::Fallback, e))?;

    let found = outcome.structure.count_of(kind);
    if found < previous || found > state.target_count {
        return Err(EngineError::InvalidFallbackResult {
            found,
            previous,
            target: state.target_count,
        });
    }

    info!(placed = found - previous, found, "Fallback solver finished.");
    state.current_structure = outcome.structure;
    state.fallback_record = Some(outcome.record);
    state.adopt_context(outcome.context);
    state.used_fallback = true;

    ctx.reporter.report(Progress::PhaseFinish);
    ctx.reporter.report(Progress::CountUpdate {
        current: found,
        target: state.target_count,
    });
    Ok(AfterFallback::RefineFinal(state))
}

fn refine_final(
    ctx: &RefinementContext<'_>,
    mut state: RefinementState,
) -> Result<AfterRefineFinal, EngineError> {
    ctx.reporter.report(Progress::PhaseStart {
        name: "Final Relaxation",
    });
    relax(ctx, &mut state)?;
    ctx.reporter.report(Progress::PhaseFinish);
    Ok(AfterRefineFinal::Done(state))
}

fn finish(ctx: &RefinementContext<'_>, state: RefinementState) -> RefinementOutcome {
    let status = state.status(ctx.tracked_kind());
    match status {
        CompletionStatus::Complete => info!(
            cycles = state.cycles,
            fallback = state.used_fallback,
            "Target count reached."
        ),
        CompletionStatus::TargetNotReached { found, target } => warn!(
            found,
            target,
            cycles = state.cycles,
            "Run finished without reaching the target count."
        ),
    }
    RefinementOutcome { state, status }
}
