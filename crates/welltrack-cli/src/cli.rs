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
    author = "WellTrack Contributors",
    version,
    about = "WellTrack CLI - Replays pipetting protocols and tracks well volumes and uncertainty.",
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
    /// Run a protocol file against a simulated liquid handler and report concentrations.
    Run(RunArgs),
    /// List the calibrated containers and pipette models.
    Library(LibraryArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the protocol description in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub protocol: PathBuf,

    /// Additional calibration tables (TOML, or CSV for containers). Can be used multiple times.
    #[arg(short, long = "calibration", value_name = "PATH")]
    pub calibration: Vec<PathBuf>,

    /// Stop at the first failing step instead of logging it and continuing.
    #[arg(long)]
    pub strict: bool,

    /// Disable the progress bar.
    #[arg(long)]
    pub no_progress: bool,

    /// Set a protocol default, overriding the file. Can be used multiple times.
    /// Example: -S defaults.wet-cycles=2
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `library` subcommand.
#[derive(Args, Debug)]
pub struct LibraryArgs {
    #[command(subcommand)]
    pub command: LibraryCommands,

    /// Additional calibration tables to include in the listing.
    #[arg(short, long = "calibration", value_name = "PATH", global = true)]
    pub calibration: Vec<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum LibraryCommands {
    /// List the names of all calibrated containers.
    Containers,
    /// List the names of all pipette error profiles.
    Pipettes,
    /// Show the volume/headroom relation of one container.
    Show {
        /// Container name, e.g. 'epptube-1500ul'.
        #[arg(required = true)]
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_arguments_parse() {
        let cli = Cli::parse_from([
            "welltrack",
            "-vv",
            "run",
            "-p",
            "protocol.toml",
            "-c",
            "extra.toml",
            "--strict",
            "-S",
            "defaults.mix-cycles=5",
        ]);
        assert_eq!(cli.verbose, 2);
        let Commands::Run(args) = cli.command else {
            panic!("Expected 'run' subcommand");
        };
        assert_eq!(args.protocol, PathBuf::from("protocol.toml"));
        assert_eq!(args.calibration, vec![PathBuf::from("extra.toml")]);
        assert!(args.strict);
        assert_eq!(args.set_values, vec!["defaults.mix-cycles=5".to_string()]);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["welltrack", "-q", "-v", "library", "containers"]).is_err());
    }

    #[test]
    fn library_show_requires_a_name() {
        assert!(Cli::try_parse_from(["welltrack", "library", "show"]).is_err());
        let cli = Cli::parse_from(["welltrack", "library", "show", "vial-2ml"]);
        let Commands::Library(args) = cli.command else {
            panic!("Expected 'library' subcommand");
        };
        assert!(matches!(args.command, LibraryCommands::Show { name } if name == "vial-2ml"));
    }
}
