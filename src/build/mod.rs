//! Build pipeline module for assetpipe
//!
//! Turns declared build targets into output directories: bundles, extracted
//! stylesheets, emitted assets and rendered HTML pages.
//!
//! # Overview
//!
//! The build pipeline consists of:
//! - **Validation**: Check every target, rule chain, sink and declared output
//!   before anything runs ([`prepare`])
//! - **Execution**: Traverse each entry's module graph and run loader chains
//!   ([`TargetBuild`])
//! - **Orchestration**: Run independent targets in parallel
//!   ([`MultiTargetOrchestrator`])
//!
//! # Example
//!
//! ```ignore
//! use assetpipe::build::{targets_from_config, BuildContext, MultiTargetOrchestrator};
//! use assetpipe::config::load_config;
//!
//! let config = load_config(None)?;
//! let context = BuildContext::from_config(&config, project_root)?;
//! let targets = targets_from_config(&config)?;
//!
//! let result = MultiTargetOrchestrator::new(context).run(&targets)?;
//! println!("{}", result.summary());
//! ```

pub mod context;
pub mod discovery;
pub mod extract;
pub mod html;
pub mod orchestrator;
pub mod pipeline;
pub mod plugin;
pub mod result;
pub mod staging;
pub mod target;
pub mod validate;

pub use context::*;
pub use discovery::*;
pub use extract::*;
pub use html::*;
pub use orchestrator::*;
pub use pipeline::*;
pub use plugin::*;
pub use result::*;
pub use staging::*;
pub use target::*;
pub use validate::*;
