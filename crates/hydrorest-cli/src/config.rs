use crate::cli::RestoreArgs;
use crate::error::{CliError, Result};
use crate::services::{DEFAULT_PSEUDO, DEFAULT_SHELL, ServiceCommands};
use hydrorest::engine::config::{self as core_config, FieldMode, IonDynamics};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialDetectionConfig {
    threshold: Option<f64>,
    periodic: Option<bool>,
    min_peak_distance: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialAllocationConfig {
    kind: Option<String>,
    min_separation: Option<f64>,
    occupancy_tolerance: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialLoopConfig {
    max_cycles: Option<usize>,
    field_mode: Option<String>,
    clean_workdir: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialRelaxationConfig {
    max_steps: Option<usize>,
    dynamics: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialServicesConfig {
    workdir: Option<PathBuf>,
    shell: Option<String>,
    field: Option<String>,
    relax: Option<String>,
    fallback: Option<String>,
    energy: Option<String>,
    pseudo: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PartialRestoreConfig {
    target_count: Option<usize>,
    detection: Option<PartialDetectionConfig>,
    allocation: Option<PartialAllocationConfig>,
    #[serde(rename = "loop")]
    refinement: Option<PartialLoopConfig>,
    relaxation: Option<PartialRelaxationConfig>,
    services: Option<PartialServicesConfig>,
}

/// Everything the `restore` command needs after merging file and CLI values.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub restore: core_config::RestoreConfig,
    pub services: ServiceCommands,
}

fn parse_field_mode(value: &str) -> Result<FieldMode> {
    match value {
        "direct" => Ok(FieldMode::Direct),
        "difference" => Ok(FieldMode::Difference),
        other => Err(CliError::Config(format!(
            "Unknown field mode '{other}'. Expected 'direct' or 'difference'."
        ))),
    }
}

fn parse_dynamics(value: &str) -> Result<IonDynamics> {
    match value {
        "damped" => Ok(IonDynamics::Damped),
        "bfgs" => Ok(IonDynamics::Bfgs),
        other => Err(CliError::Config(format!(
            "Unknown ion dynamics '{other}'. Expected 'damped' or 'bfgs'."
        ))),
    }
}

fn required<T>(value: Option<T>, key: &str) -> Result<T> {
    value.ok_or_else(|| CliError::Config(format!("`services.{key}` is required.")))
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {key}: {value}")))
}

impl PartialRestoreConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn merge_with_cli(mut self, args: &RestoreArgs) -> Result<AppConfig> {
        self.apply_set_values(&args.set_values)?;

        let detection = self.detection.take().unwrap_or_default();
        let allocation = self.allocation.take().unwrap_or_default();
        let refinement = self.refinement.take().unwrap_or_default();
        let relaxation = self.relaxation.take().unwrap_or_default();
        let services = self.services.take().unwrap_or_default();

        let target_count = args.target.or(self.target_count).ok_or_else(|| {
            CliError::Config(
                "A value for 'target-count' is required either in the config file or via --target."
                    .to_string(),
            )
        })?;

        let mut builder = core_config::RestoreConfigBuilder::new().target_count(target_count);
        if let Some(threshold) = args.threshold.or(detection.threshold) {
            builder = builder.equiv_threshold(threshold);
        }
        if let Some(periodic) = detection.periodic {
            builder = builder.use_periodic_wrap(periodic);
        }
        if let Some(distance) = detection.min_peak_distance {
            builder = builder.min_peak_distance(distance);
        }
        if let Some(kind) = allocation.kind {
            builder = builder.tracked_kind(kind);
        }
        if let Some(distance) = allocation.min_separation {
            builder = builder.min_separation(distance);
        }
        if let Some(distance) = allocation.occupancy_tolerance {
            builder = builder.occupancy_tolerance(distance);
        }
        if let Some(cycles) = refinement.max_cycles {
            builder = builder.max_cycles(cycles);
        }
        if let Some(mode) = refinement.field_mode.as_deref() {
            builder = builder.field_mode(parse_field_mode(mode)?);
        }
        if let Some(clean) = refinement.clean_workdir {
            builder = builder.clean_workdir(clean);
        }
        if let Some(steps) = relaxation.max_steps {
            builder = builder.relaxation_steps(steps);
        }
        if let Some(dynamics) = relaxation.dynamics.as_deref() {
            builder = builder.ion_dynamics(parse_dynamics(dynamics)?);
        }
        let restore = builder
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;

        let services = ServiceCommands {
            workdir: required(services.workdir, "workdir")?,
            shell: services.shell.unwrap_or_else(|| DEFAULT_SHELL.to_string()),
            field: required(services.field, "field")?,
            relax: required(services.relax, "relax")?,
            fallback: services.fallback,
            energy: services.energy,
            pseudo: services.pseudo.unwrap_or_else(|| DEFAULT_PSEUDO.to_string()),
        };

        Ok(AppConfig { restore, services })
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{kv_pair}'. Expected KEY=VALUE."
                )));
            };

            match key {
                "target-count" => self.target_count = Some(parse_value(key, value)?),
                "detection.threshold" => {
                    self.detection.get_or_insert_with(Default::default).threshold =
                        Some(parse_value(key, value)?)
                }
                "detection.periodic" => {
                    self.detection.get_or_insert_with(Default::default).periodic =
                        Some(parse_value(key, value)?)
                }
                "detection.min-peak-distance" => {
                    self.detection
                        .get_or_insert_with(Default::default)
                        .min_peak_distance = Some(parse_value(key, value)?)
                }
                "allocation.kind" => {
                    self.allocation.get_or_insert_with(Default::default).kind =
                        Some(value.to_string())
                }
                "allocation.min-separation" => {
                    self.allocation
                        .get_or_insert_with(Default::default)
                        .min_separation = Some(parse_value(key, value)?)
                }
                "allocation.occupancy-tolerance" => {
                    self.allocation
                        .get_or_insert_with(Default::default)
                        .occupancy_tolerance = Some(parse_value(key, value)?)
                }
                "loop.max-cycles" => {
                    self.refinement.get_or_insert_with(Default::default).max_cycles =
                        Some(parse_value(key, value)?)
                }
                "loop.field-mode" => {
                    parse_field_mode(value)?;
                    self.refinement.get_or_insert_with(Default::default).field_mode =
                        Some(value.to_string())
                }
                "loop.clean-workdir" => {
                    self.refinement
                        .get_or_insert_with(Default::default)
                        .clean_workdir = Some(parse_value(key, value)?)
                }
                "relaxation.max-steps" => {
                    self.relaxation.get_or_insert_with(Default::default).max_steps =
                        Some(parse_value(key, value)?)
                }
                "relaxation.dynamics" => {
                    parse_dynamics(value)?;
                    self.relaxation.get_or_insert_with(Default::default).dynamics =
                        Some(value.to_string())
                }
                "services.workdir" => {
                    self.services.get_or_insert_with(Default::default).workdir =
                        Some(PathBuf::from(value))
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{key}'"
                    )));
                }
            }
        }
        Ok(())
    }
}
