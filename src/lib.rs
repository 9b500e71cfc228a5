//! assetpipe - Declarative multi-target asset builds
//!
//! This library provides functionality to:
//! - Route source files to loader chains with first-match-wins module rules
//! - Run each target's chains and divert extracted content into named sinks
//! - Render HTML pages from templates and build metadata
//! - Build independent targets in parallel with conflict-free outputs

pub mod build;
pub mod capability;
pub mod cli;
pub mod config;
pub mod rules;
