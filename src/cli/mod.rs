//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;
mod route;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::config::{locate_config, load_config_file, merge_cli_overrides, AssetConfig, CliOverrides, ConfigError};

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// assetpipe - Declarative multi-target asset builds
#[derive(Parser)]
#[command(name = "assetpipe")]
#[command(about = "assetpipe - Route source files through loader chains into per-target outputs")]
#[command(version)]
pub struct Cli {
    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build targets according to assetpipe.toml
    Build {
        /// Path to assetpipe.toml (default: search upwards from the current directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Only build targets matching this name or glob (repeatable)
        #[arg(short, long = "target")]
        targets: Vec<String>,

        /// Number of targets built in parallel
        #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
        jobs: Option<u16>,

        /// Re-root relative output directories under this directory
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Override source directory
        #[arg(long)]
        src: Option<PathBuf>,

        /// Dry run (validate and show planned outputs without building)
        #[arg(long)]
        dry_run: bool,
    },

    /// Load and validate the configuration without building
    Check {
        /// Path to assetpipe.toml
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show which rule and chain each target applies to a file
    Route {
        /// Logical path (relative to the source root) or path to a file
        path: String,

        /// Path to assetpipe.toml
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Install the tracing subscriber.
///
/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--verbose`.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_writer(std::io::stderr)
        .try_init();
}

/// Locate and load the configuration, apply CLI overrides and determine the project root.
pub(crate) fn load_project(
    config: Option<&Path>,
    overrides: &CliOverrides,
) -> Result<(AssetConfig, PathBuf), ConfigError> {
    let config_path = locate_config(config)?;
    let mut cfg = load_config_file(&config_path)?;
    merge_cli_overrides(&mut cfg, overrides);

    let root = config_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let root = if root.is_absolute() { root.to_path_buf() } else { std::env::current_dir()?.join(root) };
    Ok((cfg, root))
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build { config, targets, jobs, out, src, dry_run } => build::run_build(
            config.as_deref(),
            &targets,
            jobs.map(usize::from),
            out.as_deref(),
            src.as_deref(),
            dry_run,
            cli.verbose,
        ),
        Commands::Check { config } => build::run_check(config.as_deref()),
        Commands::Route { path, config } => route::run_route(&path, config.as_deref()),
    }
}
