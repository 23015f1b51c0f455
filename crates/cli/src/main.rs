use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use containerdiff::commands::{diff_command, list_comparators_command, DiffArgs};
use containerdiff::{init_tracing, LogLevel};

/// Show differences between two container images.
///
/// This CLI is a thin wrapper around `containerdiff-core`. All comparison,
/// filtering and cleanup logic lives in the library.
#[derive(Parser, Debug)]
#[command(
    name = "containerdiff",
    version,
    about = "Show differences between two container images",
    long_about = None
)]
struct Cli {
    /// Log verbosity. `RUST_LOG` overrides this.
    #[arg(short = 'l', long, value_enum, default_value_t = LogLevel::Warn, global = true)]
    log_level: LogLevel,

    /// Shorthand for `--log-level debug`.
    #[arg(short, long, default_value_t = false, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare two images and print a JSON report.
    ///
    /// Every registered comparator runs against both images; their results are
    /// merged into one mapping, optionally filtered, and written to stdout or
    /// to `--output`.
    Diff {
        /// First image (name, tag or id).
        image1: String,

        /// Second image (name, tag or id).
        image2: String,

        /// Lower verbosity of comparator output.
        #[arg(short, long, default_value_t = false)]
        silent: bool,

        /// Enable filtering. Optionally give a JSON or YAML filter file;
        /// the built-in filter is used otherwise.
        #[arg(short, long, num_args = 0..=1, value_name = "PATH")]
        filter: Option<Option<PathBuf>>,

        /// Write the report to this file instead of stdout.
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Keep the extracted images. Optionally give the directory to
        /// extract into (system temp dir by default).
        #[arg(short, long, num_args = 0..=1, value_name = "DIR")]
        preserve: Option<Option<PathBuf>>,

        /// Read images from a directory store instead of docker.
        #[arg(long, value_name = "DIR", conflicts_with = "docker")]
        store: Option<PathBuf>,

        /// Docker client binary (defaults to $CONTAINERDIFF_DOCKER or `docker`).
        #[arg(long, value_name = "BIN")]
        docker: Option<PathBuf>,

        /// Run only the named comparator. May be repeated.
        #[arg(long, value_name = "NAME")]
        only: Vec<String>,

        /// Run comparators on separate threads.
        #[arg(long, default_value_t = false)]
        parallel: bool,
    },

    /// List the comparators built into this binary.
    Comparators {
        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { LogLevel::Debug } else { cli.log_level };
    init_tracing(level.as_level());
    tracing::debug!(version = containerdiff_core::version(), "starting containerdiff");

    match cli.command {
        Command::Diff {
            image1,
            image2,
            silent,
            filter,
            output,
            preserve,
            store,
            docker,
            only,
            parallel,
        } => {
            let args = DiffArgs {
                first: image1,
                second: image2,
                silent,
                filter,
                output,
                preserve,
                store,
                docker,
                only,
                parallel,
            };
            diff_command(&args)?
        }
        Command::Comparators { json } => list_comparators_command(json)?,
    }

    Ok(())
}
