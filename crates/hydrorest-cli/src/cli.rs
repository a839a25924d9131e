use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "HydroRest Developers",
    version,
    about = "HydroRest CLI - Restores missing hydrogen atoms in periodic crystal structures from computed field maxima.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect field maxima in a cube file and place atoms at them in a single pass.
    Peaks(PeaksArgs),
    /// Run the full restoration loop, driving the external services from a config file.
    Restore(RestoreArgs),
}

/// Arguments for the `peaks` subcommand.
#[derive(Args, Debug)]
pub struct PeaksArgs {
    /// Path to a Gaussian cube file holding both the structure and the field.
    #[arg(long, required = true, value_name = "PATH")]
    pub cube: PathBuf,

    /// Number of tracked atoms the structure should hold after placement.
    #[arg(short, long, required = true, value_name = "INT")]
    pub target: usize,

    /// Relative strength a peak must exceed to be accepted, in (0, 1].
    #[arg(long, value_name = "FLOAT")]
    pub threshold: Option<f64>,

    /// Search the cell without periodic images.
    #[arg(long)]
    pub no_periodic: bool,

    /// Element symbol of the atoms to place.
    #[arg(long, value_name = "SYMBOL")]
    pub kind: Option<String>,

    /// Write the resulting structure to this CIF file.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Write every detected peak to this CSV file.
    #[arg(long, value_name = "PATH")]
    pub peaks_csv: Option<PathBuf>,
}

/// Arguments for the `restore` subcommand.
#[derive(Args, Debug)]
pub struct RestoreArgs {
    // --- Core Arguments ---
    /// Path to the input structure (CIF) with hydrogen atoms missing.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path to the run configuration in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Path for the restored structure (CIF).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    // --- Overrides ---
    /// Override the target count of tracked atoms.
    #[arg(short, long, value_name = "INT")]
    pub target: Option<usize>,

    /// Override the relative peak acceptance threshold.
    #[arg(long, value_name = "FLOAT")]
    pub threshold: Option<f64>,

    /// Structure with its true hydrogen atoms; its total energy is reported in Ry.
    #[arg(long, value_name = "PATH")]
    pub reference: Option<PathBuf>,

    /// Write the unfiltered peaks of the last detection pass to this CSV file.
    #[arg(long, value_name = "PATH")]
    pub peaks_csv: Option<PathBuf>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S loop.max-cycles=10
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peaks_command_parses_flags() {
        let cli = Cli::parse_from([
            "hydrorest",
            "peaks",
            "--cube",
            "field.cube",
            "-t",
            "4",
            "--no-periodic",
            "--threshold",
            "0.9",
        ]);
        let Commands::Peaks(args) = cli.command else {
            panic!("Expected 'peaks' subcommand");
        };
        assert_eq!(args.cube, PathBuf::from("field.cube"));
        assert_eq!(args.target, 4);
        assert!(args.no_periodic);
        assert_eq!(args.threshold, Some(0.9));
        assert!(args.output.is_none());
    }

    #[test]
    fn restore_command_collects_repeated_set_values() {
        let cli = Cli::parse_from([
            "hydrorest",
            "-vv",
            "restore",
            "-i",
            "in.cif",
            "-c",
            "run.toml",
            "-o",
            "out.cif",
            "-S",
            "loop.max-cycles=3",
            "-S",
            "detection.periodic=false",
        ]);
        assert_eq!(cli.verbose, 2);
        let Commands::Restore(args) = cli.command else {
            panic!("Expected 'restore' subcommand");
        };
        assert_eq!(
            args.set_values,
            vec!["loop.max-cycles=3", "detection.periodic=false"]
        );
        assert!(args.target.is_none());
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["hydrorest", "-q", "-v", "peaks", "--cube", "a", "-t", "1"]);
        assert!(result.is_err());
    }
}
