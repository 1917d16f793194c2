//! Contains structures and functionality for the binary
use std::path::PathBuf;

/// Which delta rules to print as XML
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DeltaDirection {
    /// Rules propagating insertions
    Insertion,
    /// Rules propagating deletions
    Deletion,
}

/// Cli Arguments related to logging
#[derive(clap::Args, Debug)]
pub(crate) struct LoggingArgs {
    /// Increase log verbosity (multiple uses increase verbosity further)
    #[arg(short, long, action = clap::builder::ArgAction::Count, group = "verbosity")]
    verbose: u8,
    /// Reduce log verbosity to show only errors (equivalent to --log error)
    #[arg(short, long, group = "verbosity")]
    quiet: bool,
    /// Set log verbosity (default is "warn")
    #[arg(long = "log", value_parser=clap::builder::PossibleValuesParser::new(["error", "warn", "info", "debug", "trace"]), group = "verbosity")]
    log_level: Option<String>,
}

impl LoggingArgs {
    /// Initialising Logging
    ///
    /// Sets the logging verbosity to the given log-level in the following order:
    ///  * `Info`, `Debug`, `Trace`; depending on the count of `-v`
    ///  * `Error` when `-q` is used
    ///  * The `ORC_LOG` environment variable value
    ///  * `Warn` otherwise
    pub(crate) fn initialize_logging(&self) {
        let mut builder = env_logger::Builder::new();

        // Default log level
        builder.filter_level(log::LevelFilter::Warn);

        builder.parse_env("ORC_LOG");
        if let Some(ref level) = self.log_level {
            builder.parse_filters(level);
        } else if self.quiet {
            builder.filter_level(log::LevelFilter::Error);
        } else if self.verbose > 0 {
            builder.filter_level(match self.verbose {
                1 => log::LevelFilter::Info,
                2 => log::LevelFilter::Debug,
                3 => log::LevelFilter::Trace,
                _ => log::LevelFilter::Warn,
            });
        }
        builder.init();
    }
}

/// Cli arguments related to output
#[derive(Debug, clap::Args)]
pub(crate) struct OutputArgs {
    /// Print the translated mapping rules and the compiled delta-rule sequences
    #[arg(long = "print-rules")]
    pub(crate) print_rules: bool,
    /// Print the delta rules of one direction as XML
    #[arg(long = "xml", value_enum)]
    pub(crate) xml: Option<DeltaDirection>,
    /// Print the tuples of all peer relations after the round
    #[arg(long = "print-relations")]
    pub(crate) print_relations: bool,
    /// Print detailed timing of the evaluated programs
    #[arg(long = "report")]
    pub(crate) report: bool,
}

/// Orchestra CLI
#[derive(clap::Parser, Debug)]
#[command(author, version, about)]
pub struct CliApp {
    /// Exchange file declaring peers, mappings and local updates
    #[arg(value_parser)]
    pub(crate) file: PathBuf,
    /// JSON file with exchange parameters
    #[arg(short, long = "config")]
    pub(crate) config: Option<PathBuf>,
    /// Arguments related to output
    #[command(flatten)]
    pub(crate) output: OutputArgs,
    /// Arguments related to logging
    #[command(flatten)]
    pub(crate) logging: LoggingArgs,
}
