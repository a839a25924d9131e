use crate::cli::PeaksArgs;
use crate::error::{CliError, Result};
use hydrorest::{
    core::io::{cif::CifFile, cube::CubeFile, snapshot::write_peak_snapshot_path, traits::StructureFile},
    engine::config::RestoreConfigBuilder,
    workflows,
};
use tracing::info;

pub async fn run(args: PeaksArgs) -> Result<()> {
    info!("Loading cube file from {:?}", &args.cube);
    let (structure, metadata) =
        CubeFile::read_from_path(&args.cube).map_err(|e| CliError::FileParsing {
            path: args.cube.clone(),
            source: e.into(),
        })?;

    let mut builder = RestoreConfigBuilder::new()
        .target_count(args.target)
        .use_periodic_wrap(!args.no_periodic);
    if let Some(threshold) = args.threshold {
        builder = builder.equiv_threshold(threshold);
    }
    if let Some(kind) = &args.kind {
        builder = builder.tracked_kind(kind.clone());
    }
    let config = builder
        .build_detect()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let report = tokio::task::block_in_place(|| {
        workflows::detect::run(&structure, &metadata.field, &config)
    })?;

    let kind = &config.allocation.tracked_kind;
    println!(
        "Found {} peak(s), {} above threshold; placed {} {} atom(s) ({} skipped as occupied).",
        report.peaks.len(),
        report.accepted,
        report.placed,
        kind,
        report.degenerate
    );
    let count = report.structure.count_of(kind);
    if count < config.target_count {
        println!(
            "Warning: structure holds {count} of {} requested {kind} atoms.",
            config.target_count
        );
    }

    if let Some(path) = &args.peaks_csv {
        write_peak_snapshot_path(&report.peaks, path).map_err(|e| CliError::FileWriting {
            path: path.clone(),
            source: e.into(),
        })?;
        println!("✓ Peak list written to: {}", path.display());
    }

    if let Some(path) = &args.output {
        CifFile::write_structure_to_path(&report.structure, path).map_err(|e| {
            CliError::FileWriting {
                path: path.clone(),
                source: e.into(),
            }
        })?;
        println!("✓ Structure written to: {}", path.display());
    }

    Ok(())
}
