//! Boundaries to the external computations the refinement loop drives.
//!
//! The engine never computes fields, relaxes geometries or runs the
//! combinatorial fallback itself. It talks to implementations of the traits in
//! this module, each call blocking until the external job has finished.

use super::config::IonDynamics;
use crate::core::grid::field::{GridError, GridField};
use crate::core::grid::peaks::PeakSnapshot;
use crate::core::io::record::{ArtifactError, FallbackRecord};
use crate::core::models::structure::Structure;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Opaque handle to a completed external computation and its working storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldContext {
    pub id: String,
    pub location: Option<PathBuf>,
}

impl FieldContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Failed(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("Invalid field: {0}")]
    Grid(#[from] GridError),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRequest<'a> {
    pub structure: &'a Structure,
    /// Tracked atoms still missing from `structure`.
    pub missing: usize,
    /// Total charge of the cell in elementary charges; `-missing` for a plain solve.
    pub total_charge: i64,
    pub previous: Option<&'a FieldContext>,
}

#[derive(Debug, Clone)]
pub struct FieldSample {
    pub field: GridField,
    pub context: FieldContext,
}

#[derive(Debug, Clone, Copy)]
pub struct RelaxationRequest<'a> {
    pub structure: &'a Structure,
    /// One entry per site; `true` keeps the site fixed.
    pub frozen: &'a [bool],
    pub max_steps: usize,
    pub dynamics: IonDynamics,
    pub total_charge: i64,
    pub previous: Option<&'a FieldContext>,
}

#[derive(Debug, Clone)]
pub struct Relaxed {
    pub structure: Structure,
    pub context: FieldContext,
}

#[derive(Debug, Clone, Copy)]
pub struct FallbackRequest<'a> {
    pub structure: &'a Structure,
    pub context: Option<&'a FieldContext>,
    /// Full, unfiltered candidate list of the last detection pass.
    pub candidates: &'a PeakSnapshot,
    pub remaining: usize,
}

#[derive(Debug, Clone)]
pub struct FallbackOutcome {
    pub structure: Structure,
    pub record: FallbackRecord,
    pub context: FieldContext,
}

pub trait FieldSolver {
    fn compute_field(&self, request: &FieldRequest<'_>) -> Result<FieldSample, ServiceError>;
}

pub trait Relaxer {
    fn relax(&self, request: &RelaxationRequest<'_>) -> Result<Relaxed, ServiceError>;
}

pub trait FallbackSolver {
    fn place_remaining(&self, request: &FallbackRequest<'_>) -> Result<FallbackOutcome, ServiceError>;
}

pub trait EnergyCalculator {
    /// Total energy of `structure` in eV.
    fn total_energy_ev(&self, structure: &Structure) -> Result<f64, ServiceError>;
}

pub trait ArtifactCleaner {
    fn release(&self, contexts: &[FieldContext]) -> Result<(), ServiceError>;
}

/// The set of collaborators a restoration run uses.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub field: &'a dyn FieldSolver,
    pub relaxer: &'a dyn Relaxer,
    pub fallback: Option<&'a dyn FallbackSolver>,
    pub energy: Option<&'a dyn EnergyCalculator>,
    pub cleaner: Option<&'a dyn ArtifactCleaner>,
}

impl<'a> Services<'a> {
    pub fn new(field: &'a dyn FieldSolver, relaxer: &'a dyn Relaxer) -> Self {
        Self {
            field,
            relaxer,
            fallback: None,
            energy: None,
            cleaner: None,
        }
    }

    pub fn with_fallback(mut self, fallback: &'a dyn FallbackSolver) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_energy(mut self, energy: &'a dyn EnergyCalculator) -> Self {
        self.energy = Some(energy);
        self
    }

    pub fn with_cleaner(mut self, cleaner: &'a dyn ArtifactCleaner) -> Self {
        self.cleaner = Some(cleaner);
        self
    }
}
