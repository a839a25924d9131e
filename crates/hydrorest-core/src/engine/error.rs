use super::config::ConfigError;
use super::services::ServiceError;
use crate::core::grid::field::GridError;
use crate::core::grid::peaks::DetectionError;
use crate::core::io::record::ArtifactError;
use crate::core::models::structure::ProximityError;
use std::fmt;
use thiserror::Error;

/// The external computation a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FieldComputation,
    Relaxation,
    Fallback,
    ReferenceEnergy,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::FieldComputation => "field computation",
            Stage::Relaxation => "relaxation",
            Stage::Fallback => "fallback placement",
            Stage::ReferenceEnergy => "reference energy",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid field grid: {0}")]
    Grid(#[from] GridError),

    #[error("Peak detection rejected its input: {0}")]
    Detection(DetectionError),

    #[error("External {stage} failed: {source}")]
    ExternalComputationFailed { stage: Stage, source: ServiceError },

    #[error("Candidate site is too close to an existing atom: {0}")]
    SiteTooClose(ProximityError),

    #[error("Peak ordering invariant violated at #{index}: {value} follows {previous}")]
    PeakOrderingInvariantViolated {
        index: usize,
        previous: f64,
        value: f64,
    },

    #[error("{0}")]
    ArtifactParse(#[from] ArtifactError),

    #[error(
        "Fallback returned {found} tracked atoms, expected between {previous} and {target}"
    )]
    InvalidFallbackResult {
        found: usize,
        previous: usize,
        target: usize,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Wraps a service failure, surfacing artifact parse errors as their own variant.
    pub fn external(stage: Stage, error: ServiceError) -> Self {
        match error {
            ServiceError::Artifact(artifact) => EngineError::ArtifactParse(artifact),
            source => EngineError::ExternalComputationFailed { stage, source },
        }
    }
}

impl From<DetectionError> for EngineError {
    fn from(error: DetectionError) -> Self {
        match error {
            DetectionError::UnsortedPeaks {
                index,
                previous,
                value,
            } => EngineError::PeakOrderingInvariantViolated {
                index,
                previous,
                value,
            },
            other => EngineError::Detection(other),
        }
    }
}
