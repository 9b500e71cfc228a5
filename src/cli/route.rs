//! Route command: explain how each target handles one file

use std::path::Path;
use std::process::ExitCode;

use super::{load_project, EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};
use crate::build::{logical_path, targets_from_config, BuildContext, BuildTargetSpec};
use crate::config::CliOverrides;
use crate::rules::{ExtractMode, LoaderChainResolver};

/// Turn the argument into a logical path.
///
/// Existing files are made relative to the source root; anything else is
/// taken as a logical path already.
fn to_logical(ctx: &BuildContext, path: &str) -> Option<String> {
    let (file, query) = match path.split_once('?') {
        Some((file, query)) => (file, Some(query)),
        None => (path, None),
    };
    let on_disk = Path::new(file);
    let logical = if on_disk.is_file() {
        let absolute = match std::env::current_dir() {
            Ok(cwd) => cwd.join(on_disk),
            Err(_) => on_disk.to_path_buf(),
        };
        logical_path(ctx.src_dir(), &absolute)?
    } else {
        file.trim_start_matches("./").to_string()
    };
    Some(match query {
        Some(query) => format!("{}?{}", logical, query),
        None => logical,
    })
}

/// Describe the routing of `logical` within one target.
pub(crate) fn describe_route(ctx: &BuildContext, target: &BuildTargetSpec, logical: &str) -> String {
    let resolver = LoaderChainResolver::new(ctx.registry());
    match target.module_rules.resolve_indexed(logical) {
        None => format!("{}: no rule matched, copied as-is", target.name),
        Some((index, rule)) => {
            let chain: Vec<&str> =
                resolver.resolve(rule).execution_order().map(|s| s.identifier.as_str()).collect();
            let disposition = match rule.extract {
                ExtractMode::Inline => "inline".to_string(),
                ExtractMode::DefaultSink => "extract".to_string(),
                ExtractMode::Sink(ref sink) => format!("extract into '{}'", sink),
            };
            let opaque = if target.is_opaque(logical, Some(rule)) { ", opaque" } else { "" };
            format!(
                "{}: rule #{} ({}) -> {} [{}{}]",
                target.name,
                index,
                rule.test.as_str(),
                chain.join(" -> "),
                disposition,
                opaque
            )
        }
    }
}

/// Run the route command
pub fn run_route(path: &str, config: Option<&Path>) -> ExitCode {
    let (config, project_root) = match load_project(config, &CliOverrides::default()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
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

    let specs = match targets_from_config(&config) {
        Ok(specs) => specs,
        Err(errors) => {
            eprintln!("Configuration invalid:");
            for error in errors {
                eprintln!("  - {}", error);
            }
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let Some(logical) = to_logical(&context, path) else {
        eprintln!("Error: '{}' is outside the source root {}", path, context.src_dir().display());
        return ExitCode::from(EXIT_INVALID_ARGS);
    };

    println!("{}", logical);
    for target in &specs {
        println!("  {}", describe_route(&context, target, &logical));
    }
    ExitCode::from(EXIT_SUCCESS)
}
