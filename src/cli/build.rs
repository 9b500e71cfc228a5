//! Build command implementations (build, check)

use std::path::Path;
use std::process::ExitCode;

use super::{load_project, EXIT_ERROR, EXIT_SUCCESS};
use crate::build::{targets_from_config, BuildContext, BuildError, BuildStatus, MultiTargetOrchestrator};
use crate::config::CliOverrides;

fn print_configuration_errors(errors: &[crate::build::ConfigurationError]) {
    eprintln!("Configuration invalid:");
    for error in errors {
        eprintln!("  - {}", error);
    }
}

/// Run the build command
pub fn run_build(
    config: Option<&Path>,
    targets: &[String],
    jobs: Option<usize>,
    out: Option<&Path>,
    src: Option<&Path>,
    dry_run: bool,
    verbose: bool,
) -> ExitCode {
    let overrides = CliOverrides { src: src.map(Path::to_path_buf), out: out.map(Path::to_path_buf) };
    let (config, project_root) = match load_project(config, &overrides) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let specs = match targets_from_config(&config) {
        Ok(specs) => specs,
        Err(errors) => {
            print_configuration_errors(&errors);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let mut context = match BuildContext::from_config(&config, project_root) {
        Ok(ctx) => ctx.with_verbose(verbose),
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    if !targets.is_empty() {
        context = context.with_filter(targets.to_vec());
    }

    let mut orchestrator = MultiTargetOrchestrator::new(context).with_dry_run(dry_run);
    if let Some(jobs) = jobs {
        orchestrator = orchestrator.with_jobs(jobs);
    }

    let result = match orchestrator.run(&specs) {
        Ok(result) => result,
        Err(BuildError::Configuration(errors)) => {
            print_configuration_errors(&errors);
            return ExitCode::from(EXIT_ERROR);
        }
        Err(e) => {
            eprintln!("Build error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    if result.targets.is_empty() {
        eprintln!("Warning: no targets selected");
    }

    if dry_run {
        println!("Dry run - would build:");
        for target in &result.targets {
            println!("  {}:", target.target);
            for output in &target.outputs {
                println!("    {}", output.display());
            }
        }
        return ExitCode::from(EXIT_SUCCESS);
    }

    for (target, warning) in result.all_warnings() {
        eprintln!("Warning [{}]: {}", target, warning);
    }
    for target in &result.targets {
        if let BuildStatus::Failed(ref message) = target.status {
            eprintln!("Target '{}' failed: {}", target.target, message);
        }
    }

    if result.is_success() {
        println!("{}", result.summary());
        ExitCode::from(EXIT_SUCCESS)
    } else {
        eprintln!("{}", result.summary());
        ExitCode::from(EXIT_ERROR)
    }
}

/// Run the check command
pub fn run_check(config: Option<&Path>) -> ExitCode {
    let (config, project_root) = match load_project(config, &CliOverrides::default()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let specs = match targets_from_config(&config) {
        Ok(specs) => specs,
        Err(errors) => {
            print_configuration_errors(&errors);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let context = match BuildContext::from_config(&config, project_root) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    match MultiTargetOrchestrator::new(context).validate(&specs) {
        Ok(prepared) => {
            println!("Configuration OK: {} targets", prepared.len());
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(BuildError::Configuration(errors)) => {
            print_configuration_errors(&errors);
            ExitCode::from(EXIT_ERROR)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
