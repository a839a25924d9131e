use crate::core::grid::peaks::MIN_PEAK_DISTANCE;
use thiserror::Error;

pub const DEFAULT_EQUIV_THRESHOLD: f64 = 0.995;
pub const DEFAULT_TRACKED_KIND: &str = "H";
pub const DEFAULT_MIN_SEPARATION: f64 = 0.5;
pub const DEFAULT_OCCUPANCY_TOLERANCE: f64 = 0.01;
pub const DEFAULT_MAX_CYCLES: usize = 64;
pub const DEFAULT_RELAXATION_STEPS: usize = 250;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionConfig {
    /// Fraction of the strongest peak a candidate must exceed to be accepted.
    pub equiv_threshold: f64,
    pub use_periodic_wrap: bool,
    /// Minimum Chebyshev separation between maxima, in grid units.
    pub min_peak_distance: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            equiv_threshold: DEFAULT_EQUIV_THRESHOLD,
            use_periodic_wrap: true,
            min_peak_distance: MIN_PEAK_DISTANCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationConfig {
    /// Kind label of the atoms being restored.
    pub tracked_kind: String,
    /// Minimum distance in Å between a new site and any existing site.
    pub min_separation: f64,
    /// Distance in Å below which a candidate is treated as an already occupied site.
    pub occupancy_tolerance: f64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            tracked_kind: DEFAULT_TRACKED_KIND.to_string(),
            min_separation: DEFAULT_MIN_SEPARATION,
            occupancy_tolerance: DEFAULT_OCCUPANCY_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IonDynamics {
    #[default]
    Damped,
    Bfgs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelaxationConfig {
    pub max_steps: usize,
    pub dynamics: IonDynamics,
}

impl Default for RelaxationConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_RELAXATION_STEPS,
            dynamics: IonDynamics::Damped,
        }
    }
}

/// How the field used for detection is obtained each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldMode {
    /// One solve; detect on its field.
    #[default]
    Direct,
    /// Two solves whose charge adjustments differ by one; detect on their difference.
    Difference,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// Detect-and-place cycles allowed before escalating to the fallback path.
    pub max_cycles: usize,
    pub field_mode: FieldMode,
    /// Release the working storage of external computations after a complete run.
    pub clean_workdir: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_cycles: DEFAULT_MAX_CYCLES,
            field_mode: FieldMode::Direct,
            clean_workdir: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestoreConfig {
    pub target_count: usize,
    pub detection: DetectionConfig,
    pub allocation: AllocationConfig,
    pub relaxation: RelaxationConfig,
    pub refinement: LoopConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectConfig {
    pub target_count: usize,
    pub detection: DetectionConfig,
    pub allocation: AllocationConfig,
}

fn validate_detection(detection: &DetectionConfig) -> Result<(), ConfigError> {
    let threshold = detection.equiv_threshold;
    if !(threshold > 0.0 && threshold <= 1.0) {
        return Err(ConfigError::InvalidParameter {
            name: "equiv_threshold",
            reason: format!("{threshold} is outside (0, 1]"),
        });
    }
    Ok(())
}

fn validate_allocation(allocation: &AllocationConfig) -> Result<(), ConfigError> {
    if allocation.tracked_kind.trim().is_empty() {
        return Err(ConfigError::InvalidParameter {
            name: "tracked_kind",
            reason: "must not be empty".to_string(),
        });
    }
    if !(allocation.min_separation.is_finite() && allocation.min_separation > 0.0) {
        return Err(ConfigError::InvalidParameter {
            name: "min_separation",
            reason: format!("{} must be a positive distance", allocation.min_separation),
        });
    }
    let tolerance = allocation.occupancy_tolerance;
    if !(tolerance >= 0.0 && tolerance < allocation.min_separation) {
        return Err(ConfigError::InvalidParameter {
            name: "occupancy_tolerance",
            reason: format!(
                "{tolerance} must be non-negative and below min_separation ({})",
                allocation.min_separation
            ),
        });
    }
    Ok(())
}

#[derive(Default)]
pub struct RestoreConfigBuilder {
    target_count: Option<usize>,
    equiv_threshold: Option<f64>,
    use_periodic_wrap: Option<bool>,
    min_peak_distance: Option<usize>,
    tracked_kind: Option<String>,
    min_separation: Option<f64>,
    occupancy_tolerance: Option<f64>,
    relaxation_steps: Option<usize>,
    ion_dynamics: Option<IonDynamics>,
    max_cycles: Option<usize>,
    field_mode: Option<FieldMode>,
    clean_workdir: Option<bool>,
}

impl RestoreConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target_count(mut self, count: usize) -> Self {
        self.target_count = Some(count);
        self
    }
    pub fn equiv_threshold(mut self, threshold: f64) -> Self {
        self.equiv_threshold = Some(threshold);
        self
    }
    pub fn use_periodic_wrap(mut self, wrap: bool) -> Self {
        self.use_periodic_wrap = Some(wrap);
        self
    }
    pub fn min_peak_distance(mut self, distance: usize) -> Self {
        self.min_peak_distance = Some(distance);
        self
    }
    pub fn tracked_kind(mut self, kind: impl Into<String>) -> Self {
        self.tracked_kind = Some(kind.into());
        self
    }
    pub fn min_separation(mut self, distance: f64) -> Self {
        self.min_separation = Some(distance);
        self
    }
    pub fn occupancy_tolerance(mut self, distance: f64) -> Self {
        self.occupancy_tolerance = Some(distance);
        self
    }
    pub fn relaxation_steps(mut self, steps: usize) -> Self {
        self.relaxation_steps = Some(steps);
        self
    }
    pub fn ion_dynamics(mut self, dynamics: IonDynamics) -> Self {
        self.ion_dynamics = Some(dynamics);
        self
    }
    pub fn max_cycles(mut self, cycles: usize) -> Self {
        self.max_cycles = Some(cycles);
        self
    }
    pub fn field_mode(mut self, mode: FieldMode) -> Self {
        self.field_mode = Some(mode);
        self
    }
    pub fn clean_workdir(mut self, clean: bool) -> Self {
        self.clean_workdir = Some(clean);
        self
    }

    fn detection(&self) -> DetectionConfig {
        let defaults = DetectionConfig::default();
        DetectionConfig {
            equiv_threshold: self.equiv_threshold.unwrap_or(defaults.equiv_threshold),
            use_periodic_wrap: self.use_periodic_wrap.unwrap_or(defaults.use_periodic_wrap),
            min_peak_distance: self.min_peak_distance.unwrap_or(defaults.min_peak_distance),
        }
    }

    fn allocation(&mut self) -> AllocationConfig {
        let defaults = AllocationConfig::default();
        AllocationConfig {
            tracked_kind: self.tracked_kind.take().unwrap_or(defaults.tracked_kind),
            min_separation: self.min_separation.unwrap_or(defaults.min_separation),
            occupancy_tolerance: self
                .occupancy_tolerance
                .unwrap_or(defaults.occupancy_tolerance),
        }
    }

    pub fn build(mut self) -> Result<RestoreConfig, ConfigError> {
        let target_count = self
            .target_count
            .ok_or(ConfigError::MissingParameter("target_count"))?;
        let detection = self.detection();
        validate_detection(&detection)?;
        let allocation = self.allocation();
        validate_allocation(&allocation)?;

        let relaxation = RelaxationConfig {
            max_steps: self.relaxation_steps.unwrap_or(DEFAULT_RELAXATION_STEPS),
            dynamics: self.ion_dynamics.unwrap_or_default(),
        };
        if relaxation.max_steps == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "relaxation_steps",
                reason: "at least one step is required".to_string(),
            });
        }

        let refinement = LoopConfig {
            max_cycles: self.max_cycles.unwrap_or(DEFAULT_MAX_CYCLES),
            field_mode: self.field_mode.unwrap_or_default(),
            clean_workdir: self.clean_workdir.unwrap_or(false),
        };
        if refinement.max_cycles == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "max_cycles",
                reason: "at least one cycle is required".to_string(),
            });
        }

        Ok(RestoreConfig {
            target_count,
            detection,
            allocation,
            relaxation,
            refinement,
        })
    }

    /// Builds the subset used by a single detect-and-place pass.
    pub fn build_detect(mut self) -> Result<DetectConfig, ConfigError> {
        let target_count = self
            .target_count
            .ok_or(ConfigError::MissingParameter("target_count"))?;
        let detection = self.detection();
        validate_detection(&detection)?;
        let allocation = self.allocation();
        validate_allocation(&allocation)?;
        Ok(DetectConfig {
            target_count,
            detection,
            allocation,
        })
    }
}
