//! assetpipe - Command-line tool for building asset targets from assetpipe.toml

use std::process::ExitCode;

use assetpipe::cli;

fn main() -> ExitCode {
    cli::run()
}
