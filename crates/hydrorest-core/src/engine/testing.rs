//! Scripted collaborators for exercising the refinement loop without external codes.

use super::services::{
    ArtifactCleaner, EnergyCalculator, FallbackOutcome, FallbackRequest, FallbackSolver,
    FieldContext, FieldRequest, FieldSample, FieldSolver, RelaxationRequest, Relaxed, Relaxer,
    ServiceError,
};
use crate::core::grid::field::GridField;
use crate::core::io::record::FallbackRecord;
use crate::core::models::lattice::Lattice;
use crate::core::models::structure::{Site, Structure};
use nalgebra::Point3;
use std::cell::{Cell, RefCell};

pub const GRID: [usize; 3] = [12, 12, 12];

/// Sum of unit-width periodic Gaussians centred on grid points.
pub fn bump_field(dims: [usize; 3], bumps: &[([usize; 3], f64)]) -> GridField {
    GridField::from_fn(dims, |index| {
        bumps
            .iter()
            .map(|&(center, height)| {
                let r2: f64 = (0..3)
                    .map(|axis| {
                        let n = dims[axis] as f64;
                        let d = (index[axis] as f64 - center[axis] as f64).abs();
                        let d = d.min(n - d);
                        d * d
                    })
                    .sum();
                height * (-r2 / 2.0).exp()
            })
            .sum()
    })
    .unwrap()
}

/// A 6 Å cubic cell holding a single oxygen at the origin.
pub fn oxygen_cell() -> Structure {
    Structure::new(
        Lattice::cubic(6.0).unwrap(),
        vec![Site::new("O", Point3::new(0.0, 0.0, 0.0))],
    )
}

pub fn grid_to_fractional(index: [usize; 3]) -> Point3<f64> {
    Point3::new(
        index[0] as f64 / GRID[0] as f64,
        index[1] as f64 / GRID[1] as f64,
        index[2] as f64 / GRID[2] as f64,
    )
}

/// Emits bumps at fixed grid points, optionally hiding those already holding hydrogen.
pub struct BumpFieldSolver {
    pub bumps: Vec<([usize; 3], f64)>,
    pub hide_occupied: bool,
    pub calls: Cell<usize>,
    pub charges: RefCell<Vec<i64>>,
}

impl BumpFieldSolver {
    pub fn new(bumps: Vec<([usize; 3], f64)>, hide_occupied: bool) -> Self {
        Self {
            bumps,
            hide_occupied,
            calls: Cell::new(0),
            charges: RefCell::new(Vec::new()),
        }
    }
}

impl FieldSolver for BumpFieldSolver {
    fn compute_field(&self, request: &FieldRequest<'_>) -> Result<FieldSample, ServiceError> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        self.charges.borrow_mut().push(request.total_charge);

        let visible: Vec<_> = self
            .bumps
            .iter()
            .copied()
            .filter(|&(center, _)| {
                !self.hide_occupied
                    || request
                        .structure
                        .nearest_site(&grid_to_fractional(center), Some("H"))
                        .is_none_or(|(_, distance)| distance > 0.1)
            })
            .collect();

        Ok(FieldSample {
            field: bump_field(GRID, &visible),
            context: FieldContext::new(format!("field-{call}")),
        })
    }
}

pub struct FailingFieldSolver;

impl FieldSolver for FailingFieldSolver {
    fn compute_field(&self, _request: &FieldRequest<'_>) -> Result<FieldSample, ServiceError> {
        Err(ServiceError::Failed("solver exited with status 1".into()))
    }
}

/// Returns the structure unchanged.
#[derive(Default)]
pub struct StillRelaxer {
    pub calls: Cell<usize>,
    pub masks: RefCell<Vec<Vec<bool>>>,
}

impl Relaxer for StillRelaxer {
    fn relax(&self, request: &RelaxationRequest<'_>) -> Result<Relaxed, ServiceError> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        self.masks.borrow_mut().push(request.frozen.to_vec());
        Ok(Relaxed {
            structure: request.structure.clone(),
            context: FieldContext::new(format!("relax-{call}")),
        })
    }
}

/// Drops every tracked atom, breaking the relaxation contract.
pub struct LossyRelaxer;

impl Relaxer for LossyRelaxer {
    fn relax(&self, request: &RelaxationRequest<'_>) -> Result<Relaxed, ServiceError> {
        let sites = request
            .structure
            .sites()
            .iter()
            .filter(|s| s.kind != "H")
            .cloned()
            .collect();
        Ok(Relaxed {
            structure: Structure::new(request.structure.lattice().clone(), sites),
            context: FieldContext::new("lossy"),
        })
    }
}

/// Places hydrogen at the first `limit` free candidates (all of them when `None`).
pub struct GreedyFallback {
    pub limit: Option<usize>,
    pub requests: RefCell<Vec<(usize, usize)>>,
}

impl GreedyFallback {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            requests: RefCell::new(Vec::new()),
        }
    }
}

impl FallbackSolver for GreedyFallback {
    fn place_remaining(
        &self,
        request: &FallbackRequest<'_>,
    ) -> Result<FallbackOutcome, ServiceError> {
        self.requests
            .borrow_mut()
            .push((request.remaining, request.candidates.len()));

        let budget = self.limit.unwrap_or(request.remaining).min(request.remaining);
        let mut structure = request.structure.clone();
        let mut positions = Vec::new();
        for position in request.candidates.fractional_positions() {
            if positions.len() == budget {
                break;
            }
            if let Ok(next) = structure.with_site("H", position, 0.5) {
                structure = next;
                positions.push([position.x, position.y, position.z]);
            }
        }

        Ok(FallbackOutcome {
            structure,
            record: FallbackRecord {
                positions,
                pseudo: "H.pbe-rrkjus.UPF".into(),
                requested: request.remaining,
            },
            context: FieldContext::new("fallback"),
        })
    }
}

/// Returns a structure with more hydrogen than the target allows.
pub struct OverfillingFallback;

impl FallbackSolver for OverfillingFallback {
    fn place_remaining(
        &self,
        request: &FallbackRequest<'_>,
    ) -> Result<FallbackOutcome, ServiceError> {
        let mut sites = request.structure.sites().to_vec();
        for i in 0..=request.remaining {
            sites.push(Site::new("H", Point3::new(0.5, 0.1 * i as f64, 0.5)));
        }
        Ok(FallbackOutcome {
            structure: Structure::new(request.structure.lattice().clone(), sites),
            record: FallbackRecord {
                positions: Vec::new(),
                pseudo: "H".into(),
                requested: request.remaining,
            },
            context: FieldContext::new("fallback"),
        })
    }
}

pub struct FixedEnergy(pub f64);

impl EnergyCalculator for FixedEnergy {
    fn total_energy_ev(&self, _structure: &Structure) -> Result<f64, ServiceError> {
        Ok(self.0)
    }
}

#[derive(Default)]
pub struct RecordingCleaner {
    pub released: RefCell<Vec<FieldContext>>,
}

impl ArtifactCleaner for RecordingCleaner {
    fn release(&self, contexts: &[FieldContext]) -> Result<(), ServiceError> {
        self.released.borrow_mut().extend_from_slice(contexts);
        Ok(())
    }
}
