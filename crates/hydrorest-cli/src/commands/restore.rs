use crate::cli::RestoreArgs;
use crate::config::PartialRestoreConfig;
use crate::error::{CliError, Result};
use crate::services::CommandServices;
use crate::utils::progress::CliProgressHandler;
use hydrorest::{
    core::io::{cif::CifFile, snapshot::write_peak_snapshot_path, traits::StructureFile},
    core::models::structure::Structure,
    engine::{progress::ProgressReporter, services::Services, state::CompletionStatus},
    workflows,
};
use std::path::Path;
use tracing::{info, warn};

fn read_cif(path: &Path) -> Result<Structure> {
    CifFile::read_from_path(path)
        .map(|(structure, _)| structure)
        .map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
}

pub async fn run(args: RestoreArgs) -> Result<()> {
    let partial_config = PartialRestoreConfig::from_file(&args.config)?;
    info!("Merging configuration from file and CLI arguments...");
    let app_config = partial_config.merge_with_cli(&args)?;

    info!("Loading input structure from {:?}", &args.input);
    let structure = read_cif(&args.input)?;
    let reference = args.reference.as_deref().map(read_cif).transpose()?;

    let command_services = CommandServices::new(app_config.services.clone())?;
    let mut services =
        Services::new(&command_services, &command_services).with_cleaner(&command_services);
    if command_services.has_fallback() {
        services = services.with_fallback(&command_services);
    }
    if command_services.has_energy() {
        services = services.with_energy(&command_services);
    } else if reference.is_some() {
        warn!("--reference was given but `services.energy` is not configured.");
    }

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting hydrogen restoration...");
    info!("Invoking the core restoration workflow...");
    let result = tokio::task::block_in_place(|| {
        workflows::restore::run(
            &structure,
            reference.as_ref(),
            &app_config.restore,
            services,
            &reporter,
        )
    })?;

    CifFile::write_structure_to_path(&result.final_structure, &args.output).map_err(|e| {
        CliError::FileWriting {
            path: args.output.clone(),
            source: e.into(),
        }
    })?;

    match result.status {
        CompletionStatus::Complete => println!(
            "✓ Restored {} atom(s) in {} cycle(s); structure written to: {}",
            app_config.restore.target_count,
            result.cycles,
            args.output.display()
        ),
        CompletionStatus::TargetNotReached { found, target } => {
            warn!(found, target, "Target count not reached.");
            println!(
                "Warning: only {found} of {target} atoms could be placed after {} cycle(s); partial structure written to: {}",
                result.cycles,
                args.output.display()
            );
        }
    }
    if let Some(record) = &result.fallback_record {
        println!(
            "  Fallback placed {} of {} requested atom(s).",
            record.positions.len(),
            record.requested
        );
    }
    if let Some(energy) = result.reference_energy_ry {
        println!("  Reference energy: {energy:.6} Ry");
    }

    if let Some(path) = &args.peaks_csv {
        match &result.peaks {
            Some(peaks) => {
                write_peak_snapshot_path(peaks, path).map_err(|e| CliError::FileWriting {
                    path: path.clone(),
                    source: e.into(),
                })?;
                println!("  Peak list written to: {}", path.display());
            }
            None => warn!("No detection pass ran; skipping the peak list."),
        }
    }

    Ok(())
}
