//! Multi-target orchestration.
//!
//! All targets are validated together before anything is built. Targets share
//! nothing mutable, so they run in parallel on a bounded thread pool; results
//! are reported in declaration order.
//!
//! # Example
//!
//! ```ignore
//! use assetpipe::build::{targets_from_config, BuildContext, MultiTargetOrchestrator};
//!
//! let ctx = BuildContext::from_config(&config, project_root)?;
//! let targets = targets_from_config(&config)?;
//! let result = MultiTargetOrchestrator::new(ctx).with_jobs(4).run(&targets)?;
//! println!("{}", result.summary());
//! ```

use crate::build::{
    filter_targets, prepare, BuildContext, BuildResult, BuildTargetSpec, ConfigurationError,
    PreparedTarget, TargetBuild, TargetResult,
};
use rayon::prelude::*;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

/// Error that stops a whole run.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Invalid configuration; nothing was built
    #[error("Configuration invalid:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Configuration(Vec<ConfigurationError>),
    /// The worker pool could not be created
    #[error("Failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl From<Vec<ConfigurationError>> for BuildError {
    fn from(errors: Vec<ConfigurationError>) -> Self {
        BuildError::Configuration(errors)
    }
}

/// Default number of parallel jobs (uses available parallelism).
fn default_jobs() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Runs build targets independently of each other.
pub struct MultiTargetOrchestrator {
    context: BuildContext,
    jobs: usize,
    dry_run: bool,
}

impl MultiTargetOrchestrator {
    pub fn new(context: BuildContext) -> Self {
        Self { context, jobs: default_jobs(), dry_run: false }
    }

    /// Set the number of parallel jobs.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Set dry-run mode (validate and plan only).
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    /// Validate the selected targets without building anything.
    pub fn validate(&self, targets: &[BuildTargetSpec]) -> Result<Vec<PreparedTarget>, BuildError> {
        let selected = match self.context.target_filter() {
            Some(filter) => filter_targets(targets.to_vec(), filter),
            None => targets.to_vec(),
        };
        Ok(prepare(&self.context, &selected)?)
    }

    /// Validate, then build every selected target.
    ///
    /// A configuration error aborts the run before any output is written. A
    /// failing target is reported in its result and does not affect the others.
    pub fn run(&self, targets: &[BuildTargetSpec]) -> Result<BuildResult, BuildError> {
        let start = Instant::now();
        let prepared = self.validate(targets)?;

        if self.context.is_verbose() {
            info!("Build plan: {} targets ({} workers)", prepared.len(), self.jobs);
        }

        let mut result = BuildResult::new();
        if self.dry_run {
            for target in &prepared {
                let planned = target.static_outputs().into_iter().map(|p| target.output_dir.join(p)).collect();
                result.add_result(TargetResult::skipped(target.name().to_string()).with_outputs(planned));
            }
            return Ok(result.with_duration(start.elapsed()));
        }

        let pool = rayon::ThreadPoolBuilder::new().num_threads(self.jobs).build()?;
        let results: Vec<TargetResult> =
            pool.install(|| prepared.par_iter().map(|target| self.build_target(target)).collect());

        for target_result in results {
            result.add_result(target_result);
        }
        Ok(result.with_duration(start.elapsed()))
    }

    fn build_target(&self, target: &PreparedTarget) -> TargetResult {
        let start = Instant::now();
        let name = target.name().to_string();
        info!(target_name = %name, "building");

        let abort = AtomicBool::new(false);
        let outcome = TargetBuild::new(&self.context, target, &abort).run();
        let duration = start.elapsed();

        match outcome {
            Ok(outcome) => {
                info!(target_name = %name, outputs = outcome.outputs.len(), "done in {:?}", duration);
                TargetResult::success(name, outcome.outputs, duration).with_warnings(outcome.warnings)
            }
            Err(e) => {
                error!(target_name = %name, "failed: {}", e);
                TargetResult::failed(name, e.to_string(), duration)
            }
        }
    }
}
