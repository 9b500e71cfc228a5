//! Configuration module for the asset build pipeline
//!
//! Provides types, parsing and discovery for `assetpipe.toml` project configuration.

pub mod loader;
pub mod schema;

pub use loader::*;
pub use schema::*;
