//! Service implementations that shell out to user-configured commands.
//!
//! Every call gets a fresh directory under the configured work directory. The
//! input structure is written there as `input.cif`, the command runs with that
//! directory as its working directory, and the `HYDROREST_*` variables below
//! name the files it reads and must produce.
//!
//! | Variable                    | Set for                 | Meaning                                   |
//! |-----------------------------|-------------------------|-------------------------------------------|
//! | `HYDROREST_WORKDIR`         | all                     | the per-call directory                    |
//! | `HYDROREST_INPUT`           | all                     | input structure (CIF)                     |
//! | `HYDROREST_OUTPUT`          | all                     | file the command must write               |
//! | `HYDROREST_CHARGE`          | field, relax            | total cell charge in elementary charges   |
//! | `HYDROREST_MISSING`         | field                   | tracked atoms still missing               |
//! | `HYDROREST_FREE_ATOMS`      | relax                   | comma-separated 0-based indices to move   |
//! | `HYDROREST_MAX_STEPS`       | relax                   | ionic step cap                            |
//! | `HYDROREST_DYNAMICS`        | relax                   | `damped` or `bfgs`                        |
//! | `HYDROREST_FALLBACK_INPUT`  | fallback                | JSON candidate list                       |
//! | `HYDROREST_RECORD`          | fallback                | JSON result record to write               |
//! | `HYDROREST_PREVIOUS`        | field, relax, fallback  | directory of the previous computation     |
//!
//! Outputs are a cube file for the field, a CIF file for relaxations and the
//! fallback, and a single number in eV for the energy.

use hydrorest::core::grid::field::{GridField, SampleGrid};
use hydrorest::core::io::cif::CifFile;
use hydrorest::core::io::cube::CubeFile;
use hydrorest::core::io::record::{
    FallbackInput, read_final_structure, read_result_record_path,
};
use hydrorest::core::io::traits::StructureFile;
use hydrorest::core::models::structure::Structure;
use hydrorest::engine::config::IonDynamics;
use hydrorest::engine::services::{
    ArtifactCleaner, EnergyCalculator, FallbackOutcome, FallbackRequest, FallbackSolver,
    FieldContext, FieldRequest, FieldSample, FieldSolver, RelaxationRequest, Relaxed, Relaxer,
    ServiceError,
};
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

pub const INPUT_FILE: &str = "input.cif";
const FIELD_FILE: &str = "field.cube";
const RELAXED_FILE: &str = "relaxed.cif";
const FINAL_FILE: &str = "final.cif";
const RECORD_FILE: &str = "result.json";
const FALLBACK_INPUT_FILE: &str = "fallback-input.json";
const ENERGY_FILE: &str = "energy.txt";

pub const DEFAULT_SHELL: &str = "sh";
pub const DEFAULT_PSEUDO: &str = "H";

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCommands {
    pub workdir: PathBuf,
    pub shell: String,
    pub field: String,
    pub relax: String,
    pub fallback: Option<String>,
    pub energy: Option<String>,
    /// Pseudo-identifier handed to the fallback solver.
    pub pseudo: String,
}

pub struct CommandServices {
    commands: ServiceCommands,
    calls: Cell<usize>,
}

impl CommandServices {
    pub fn new(commands: ServiceCommands) -> std::io::Result<Self> {
        fs::create_dir_all(&commands.workdir)?;
        Ok(Self {
            commands,
            calls: Cell::new(0),
        })
    }

    pub fn has_fallback(&self) -> bool {
        self.commands.fallback.is_some()
    }

    pub fn has_energy(&self) -> bool {
        self.commands.energy.is_some()
    }

    fn prepare(&self, stage: &str, structure: &Structure) -> Result<(String, PathBuf), ServiceError> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        let id = format!("{call:03}-{stage}");
        let dir = self.commands.workdir.join(&id);
        fs::create_dir_all(&dir)?;
        CifFile::write_structure_to_path(structure, dir.join(INPUT_FILE)).map_err(|e| {
            ServiceError::Failed(format!("cannot write {stage} input structure: {e}"))
        })?;
        Ok((id, dir))
    }

    fn execute(
        &self,
        stage: &str,
        command: &str,
        dir: &Path,
        output: &Path,
        env: &[(&str, String)],
    ) -> Result<(), ServiceError> {
        debug!(stage, dir = %dir.display(), "Running service command.");
        let result = Command::new(&self.commands.shell)
            .arg("-c")
            .arg(command)
            .current_dir(dir)
            .env("HYDROREST_WORKDIR", dir)
            .env("HYDROREST_INPUT", dir.join(INPUT_FILE))
            .env("HYDROREST_OUTPUT", output)
            .envs(env.iter().map(|(key, value)| (*key, value)))
            .output()?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ServiceError::Failed(format!(
                "{stage} command failed ({}): {}",
                result.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

fn previous_env(previous: Option<&FieldContext>) -> Option<(&'static str, String)> {
    previous
        .and_then(|context| context.location.as_ref())
        .map(|location| ("HYDROREST_PREVIOUS", location.display().to_string()))
}

fn dynamics_name(dynamics: IonDynamics) -> &'static str {
    match dynamics {
        IonDynamics::Damped => "damped",
        IonDynamics::Bfgs => "bfgs",
    }
}

fn read_structure(stage: &str, path: &Path) -> Result<Structure, ServiceError> {
    CifFile::read_from_path(path)
        .map(|(structure, _)| structure)
        .map_err(|e| ServiceError::Failed(format!("{stage} output {}: {e}", path.display())))
}

impl FieldSolver for CommandServices {
    fn compute_field(&self, request: &FieldRequest<'_>) -> Result<FieldSample, ServiceError> {
        let (id, dir) = self.prepare("field", request.structure)?;
        let output = dir.join(FIELD_FILE);

        let mut env = vec![
            ("HYDROREST_CHARGE", request.total_charge.to_string()),
            ("HYDROREST_MISSING", request.missing.to_string()),
        ];
        env.extend(previous_env(request.previous));
        self.execute("field", &self.commands.field, &dir, &output, &env)?;

        let (cube_structure, metadata) = CubeFile::read_from_path(&output).map_err(|e| {
            ServiceError::Failed(format!("field output {}: {e}", output.display()))
        })?;
        if cube_structure.len() != request.structure.len() {
            warn!(
                expected = request.structure.len(),
                found = cube_structure.len(),
                "Field file lists a different number of atoms than the submitted structure."
            );
        }
        let field: GridField = metadata.field;
        info!(id, dims = ?field.dims(), "Field computed.");

        Ok(FieldSample {
            field,
            context: FieldContext::new(id).with_location(dir),
        })
    }
}

impl Relaxer for CommandServices {
    fn relax(&self, request: &RelaxationRequest<'_>) -> Result<Relaxed, ServiceError> {
        let (id, dir) = self.prepare("relax", request.structure)?;
        let output = dir.join(RELAXED_FILE);

        let free_atoms = request
            .frozen
            .iter()
            .enumerate()
            .filter(|(_, frozen)| !**frozen)
            .map(|(index, _)| index.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let mut env = vec![
            ("HYDROREST_CHARGE", request.total_charge.to_string()),
            ("HYDROREST_FREE_ATOMS", free_atoms),
            ("HYDROREST_MAX_STEPS", request.max_steps.to_string()),
            ("HYDROREST_DYNAMICS", dynamics_name(request.dynamics).to_string()),
        ];
        env.extend(previous_env(request.previous));
        self.execute("relax", &self.commands.relax, &dir, &output, &env)?;

        let structure = read_structure("relax", &output)?;
        info!(id, "Relaxation finished.");
        Ok(Relaxed {
            structure,
            context: FieldContext::new(id).with_location(dir),
        })
    }
}

impl FallbackSolver for CommandServices {
    fn place_remaining(
        &self,
        request: &FallbackRequest<'_>,
    ) -> Result<FallbackOutcome, ServiceError> {
        let command = self
            .commands
            .fallback
            .as_deref()
            .ok_or_else(|| ServiceError::Failed("no fallback command configured".into()))?;
        let (id, dir) = self.prepare("fallback", request.structure)?;
        let output = dir.join(FINAL_FILE);
        let record_path = dir.join(RECORD_FILE);
        let input_path = dir.join(FALLBACK_INPUT_FILE);

        let pwin = request
            .context
            .and_then(|context| context.location.as_ref())
            .map(|location| location.join(INPUT_FILE).display().to_string())
            .unwrap_or_default();
        FallbackInput {
            pwin,
            remaining: request.remaining,
            pseudo: self.commands.pseudo.clone(),
            positions: request
                .candidates
                .fractional_positions()
                .iter()
                .map(|p| [p.x, p.y, p.z])
                .collect(),
        }
        .write_to_path(&input_path)?;

        let mut env = vec![
            ("HYDROREST_FALLBACK_INPUT", input_path.display().to_string()),
            ("HYDROREST_RECORD", record_path.display().to_string()),
        ];
        env.extend(previous_env(request.context));
        self.execute("fallback", command, &dir, &output, &env)?;

        let structure = read_final_structure(&output)?;
        let record = read_result_record_path(&record_path)?;
        info!(id, placed = record.positions.len(), "Fallback finished.");
        Ok(FallbackOutcome {
            structure,
            record,
            context: FieldContext::new(id).with_location(dir),
        })
    }
}

impl EnergyCalculator for CommandServices {
    fn total_energy_ev(&self, structure: &Structure) -> Result<f64, ServiceError> {
        let command = self
            .commands
            .energy
            .as_deref()
            .ok_or_else(|| ServiceError::Failed("no energy command configured".into()))?;
        let (_, dir) = self.prepare("energy", structure)?;
        let output = dir.join(ENERGY_FILE);
        self.execute("energy", command, &dir, &output, &[])?;

        let content = fs::read_to_string(&output)?;
        content.trim().parse::<f64>().map_err(|e| {
            ServiceError::Failed(format!(
                "energy output {} is not a number: {e}",
                output.display()
            ))
        })
    }
}

impl ArtifactCleaner for CommandServices {
    fn release(&self, contexts: &[FieldContext]) -> Result<(), ServiceError> {
        for location in contexts.iter().filter_map(|c| c.location.as_ref()) {
            if location.exists() {
                debug!(dir = %location.display(), "Removing service directory.");
                fs::remove_dir_all(location)?;
            }
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use hydrorest::core::grid::peaks::{Peak, PeakSnapshot};
    use hydrorest::core::io::cube::CubeMetadata;
    use hydrorest::core::io::record::ArtifactKind;
    use hydrorest::core::models::lattice::Lattice;
    use hydrorest::core::models::structure::Site;
    use nalgebra::Point3;
    use tempfile::{TempDir, tempdir};

    fn structure() -> Structure {
        Structure::new(
            Lattice::cubic(4.0).unwrap(),
            vec![
                Site::new("O", Point3::new(0.0, 0.0, 0.0)),
                Site::new("H", Point3::new(0.25, 0.0, 0.0)),
            ],
        )
    }

    fn services(dir: &TempDir, field: &str, relax: &str) -> CommandServices {
        CommandServices::new(ServiceCommands {
            workdir: dir.path().join("runs"),
            shell: DEFAULT_SHELL.to_string(),
            field: field.to_string(),
            relax: relax.to_string(),
            fallback: None,
            energy: None,
            pseudo: DEFAULT_PSEUDO.to_string(),
        })
        .unwrap()
    }

    fn write_cube(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("fixture.cube");
        let metadata = CubeMetadata {
            comments: ["fixture".to_string(), "field".to_string()],
            origin: Point3::origin(),
            field: GridField::from_fn([4, 4, 4], |[i, j, k]| (i + j + k) as f64).unwrap(),
        };
        CubeFile::write_to_path(&structure(), &metadata, &path).unwrap();
        path
    }

    #[test]
    fn field_command_output_is_read_from_cube() {
        let dir = tempdir().unwrap();
        let cube = write_cube(&dir);
        let command = format!(
            "echo \"$HYDROREST_CHARGE $HYDROREST_MISSING\" > args.txt && cp '{}' \"$HYDROREST_OUTPUT\"",
            cube.display()
        );
        let services = services(&dir, &command, "true");

        let sample = services
            .compute_field(&FieldRequest {
                structure: &structure(),
                missing: 2,
                total_charge: -2,
                previous: None,
            })
            .unwrap();

        assert_eq!(sample.field.dims(), [4, 4, 4]);
        assert_eq!(sample.context.id, "001-field");
        let location = sample.context.location.unwrap();
        assert!(location.join(INPUT_FILE).exists());
        let args = fs::read_to_string(location.join("args.txt")).unwrap();
        assert_eq!(args.trim(), "-2 2");
    }

    #[test]
    fn failing_command_reports_its_stderr() {
        let dir = tempdir().unwrap();
        let services = services(&dir, "echo boom >&2; exit 3", "true");
        let result = services.compute_field(&FieldRequest {
            structure: &structure(),
            missing: 1,
            total_charge: -1,
            previous: None,
        });
        match result {
            Err(ServiceError::Failed(message)) => assert!(message.contains("boom")),
            other => panic!("Expected a failed service, got {other:?}"),
        }
    }

    #[test]
    fn relax_command_receives_free_atoms_and_returns_structure() {
        let dir = tempdir().unwrap();
        let services = services(
            &dir,
            "true",
            "echo \"$HYDROREST_FREE_ATOMS $HYDROREST_DYNAMICS\" > args.txt && cp \"$HYDROREST_INPUT\" \"$HYDROREST_OUTPUT\"",
        );
        let relaxed = services
            .relax(&RelaxationRequest {
                structure: &structure(),
                frozen: &[true, false],
                max_steps: 10,
                dynamics: IonDynamics::Damped,
                total_charge: 0,
                previous: None,
            })
            .unwrap();

        assert_eq!(relaxed.structure.len(), 2);
        assert_eq!(relaxed.structure.count_of("H"), 1);
        let location = relaxed.context.location.unwrap();
        let args = fs::read_to_string(location.join("args.txt")).unwrap();
        assert_eq!(args.trim(), "1 damped");
    }

    #[test]
    fn missing_fallback_record_is_tagged_as_result_record() {
        let dir = tempdir().unwrap();
        let mut commands = services(&dir, "true", "true").commands;
        commands.fallback = Some("cp \"$HYDROREST_INPUT\" \"$HYDROREST_OUTPUT\"".to_string());
        let services = CommandServices::new(commands).unwrap();

        let snapshot = PeakSnapshot::new(
            [4, 4, 4],
            vec![Peak {
                grid_position: [2, 2, 2],
                value: 1.0,
            }],
        );
        let result = services.place_remaining(&FallbackRequest {
            structure: &structure(),
            context: None,
            candidates: &snapshot,
            remaining: 1,
        });

        match result {
            Err(ServiceError::Artifact(e)) => assert_eq!(e.kind, ArtifactKind::ResultRecord),
            other => panic!("Expected an artifact error, got {other:?}"),
        }
        let input = fs::read_to_string(
            dir.path()
                .join("runs")
                .join("001-fallback")
                .join(FALLBACK_INPUT_FILE),
        )
        .unwrap();
        assert!(input.contains("\"tot_pinballs\": 1"));
    }

    #[test]
    fn energy_command_output_is_parsed_in_ev() {
        let dir = tempdir().unwrap();
        let mut commands = services(&dir, "true", "true").commands;
        commands.energy = Some("echo ' -27.5 ' > \"$HYDROREST_OUTPUT\"".to_string());
        let services = CommandServices::new(commands).unwrap();
        let energy = services.total_energy_ev(&structure()).unwrap();
        assert_eq!(energy, -27.5);
    }

    #[test]
    fn release_removes_context_directories() {
        let dir = tempdir().unwrap();
        let services = services(&dir, "true", "true");
        let (id, location) = services.prepare("field", &structure()).unwrap();
        assert!(location.exists());

        let contexts = vec![
            FieldContext::new(id).with_location(&location),
            FieldContext::new("in-memory"),
        ];
        services.release(&contexts).unwrap();
        assert!(!location.exists());
    }
}
