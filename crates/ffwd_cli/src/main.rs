//! ffwd CLI — inspect and maintain the fast-forward build cache.
//!
//! Provides `ffwd status` to evaluate a reactor snapshot, `ffwd record` to
//! record modules after a real build, `ffwd archive` to rewrite the output
//! archive, and `ffwd clean` to forget all recorded state.

#![warn(missing_docs)]

mod archive;
mod clean;
mod record;
mod session;
mod status;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Skip build work whose inputs did not change.
#[derive(Parser, Debug)]
#[command(name = "ffwd", version, about = "Fast-forward build cache")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `ffwd.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate which modules can be fast-forwarded.
    Status(StatusArgs),
    /// Record modules after a real build.
    Record(RecordArgs),
    /// Rewrite the output archive from every valid module.
    Archive(ReactorArgs),
    /// Remove all recorded state and the archive.
    Clean(ReactorArgs),
}

/// Location of the reactor snapshot.
#[derive(Parser, Debug)]
pub struct ReactorArgs {
    /// Reactor snapshot written by the host build tool.
    #[arg(default_value = "reactor.json")]
    pub reactor: PathBuf,
}

/// Arguments for the `ffwd status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Reactor snapshot written by the host build tool.
    #[arg(default_value = "reactor.json")]
    pub reactor: PathBuf,

    /// Output format for the report.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for the `ffwd record` subcommand.
#[derive(Parser, Debug)]
pub struct RecordArgs {
    /// Reactor snapshot written by the host build tool.
    #[arg(default_value = "reactor.json")]
    pub reactor: PathBuf,

    /// Modules to record as `group:artifact` (default: every module).
    #[arg(short, long = "module")]
    pub modules: Vec<String>,
}

/// Report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };
    init_logging(&global);

    let result = match cli.command {
        Command::Status(ref args) => status::run(args, &global),
        Command::Record(ref args) => record::run(args, &global),
        Command::Archive(ref args) => archive::run(args, &global),
        Command::Clean(ref args) => clean::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// `--verbose` wins over `--quiet`; without either, `RUST_LOG` or `info`.
fn log_filter(global: &GlobalArgs) -> EnvFilter {
    if global.verbose {
        EnvFilter::new("debug")
    } else if global.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn init_logging(global: &GlobalArgs) {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(global))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
