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
    version,
    about = "nrnpatch CLI - build models through the typed interpreter wrappers and inspect how interpreter errors are translated.",
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
    /// Build a model description on the in-memory interpreter and write its transcript.
    Build(BuildArgs),
    /// Run the error translation rules on captured interpreter error output.
    Classify(ClassifyArgs),
}

/// Arguments for the `build` subcommand.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Path to the model description in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub model: PathBuf,

    /// Path to an interpreter configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write the hoc transcript of the build to this file instead of stdout.
    #[arg(short, long, value_name = "PATH")]
    pub transcript: Option<PathBuf>,

    /// Override the simulation temperature from the config file.
    #[arg(long, value_name = "FLOAT")]
    pub celsius: Option<f64>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S netcon.weight=0.5
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `classify` subcommand.
#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// The operation that produced the error (net-con, section-access, record, any).
    #[arg(short, long, default_value = "any", value_name = "OPERATION")]
    pub operation: String,

    /// File holding the captured error output. Reads stdin when omitted.
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// The message of the failure itself.
    #[arg(short, long, default_value = "hoc error", value_name = "TEXT")]
    pub fault: String,

    /// Additional rules consulted after the built-in ones.
    #[arg(short, long, value_name = "PATH")]
    pub rules: Option<PathBuf>,

    /// A context item for message templates. Can be used multiple times.
    /// Example: -C source=Section
    #[arg(short = 'C', long = "context", value_name = "KEY=VALUE", num_args(0..))]
    pub context: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_arguments_are_parsed() {
        let cli = Cli::parse_from([
            "nrnpatch", "-vv", "build", "-m", "model.toml", "-S", "celsius=6.3", "-S",
            "netcon.weight=1",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Build(args) => {
                assert_eq!(args.model, PathBuf::from("model.toml"));
                assert_eq!(args.set_values, ["celsius=6.3", "netcon.weight=1"]);
                assert!(args.config.is_none());
            }
            other => panic!("Expected 'build' subcommand, got {:?}", other),
        }
    }

    #[test]
    fn classify_defaults_to_any_operation() {
        let cli = Cli::parse_from(["nrnpatch", "classify", "-i", "err.txt"]);
        match cli.command {
            Commands::Classify(args) => {
                assert_eq!(args.operation, "any");
                assert_eq!(args.fault, "hoc error");
                assert!(args.context.is_empty());
            }
            other => panic!("Expected 'classify' subcommand, got {:?}", other),
        }
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let result = Cli::try_parse_from(["nrnpatch", "-q", "-v", "classify"]);
        assert!(result.is_err());
    }
}
