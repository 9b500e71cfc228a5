//! Configuration schema types for `assetpipe.toml`
//!
//! Defines the structure and validation rules for build configuration.

use crate::build::PluginDescriptor;
use crate::rules::{PatternConfig, StepConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A value written either alone or as an array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            OneOrMany::One(item) => std::slice::from_ref(item).iter(),
            OneOrMany::Many(items) => items.iter(),
        }
    }

    pub fn len(&self) -> usize {
        self.iter().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

/// Extraction marker on a module rule: `true`, `false` or a sink name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractConfig {
    Flag(bool),
    Sink(String),
}

impl Default for ExtractConfig {
    fn default() -> Self {
        ExtractConfig::Flag(false)
    }
}

/// Project metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (required)
    pub name: String,
    /// Source root; logical paths are relative to it
    #[serde(default = "default_src")]
    pub src: PathBuf,
}

fn default_src() -> PathBuf {
    PathBuf::from(".")
}

/// An external transform capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// Program and arguments; `{path}` and `{dir}` are substituted per file
    pub command: Vec<String>,
    /// Accepted option keys
    #[serde(default)]
    pub options: Vec<String>,
    /// Whether the step injects into the page at runtime
    #[serde(default)]
    pub injector: bool,
}

/// A named entry point
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryConfig {
    pub name: String,
    /// Files, directories or globs, relative to the project root
    pub roots: OneOrMany<String>,
}

/// Output location of a target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Output directory
    pub dir: PathBuf,
    /// Bundle filename template (`[name]`, `[ext]`)
    #[serde(default = "default_filename")]
    pub filename: String,
}

fn default_filename() -> String {
    "[name].js".to_string()
}

/// A module rule as written in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub test: PatternConfig,
    #[serde(default)]
    pub exclude: OneOrMany<PatternConfig>,
    /// Loader steps, declared left to right
    #[serde(rename = "use", alias = "loader")]
    pub chain: OneOrMany<StepConfig>,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub opaque: bool,
}

/// A build target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub name: String,
    #[serde(default)]
    pub entry_points: Vec<EntryConfig>,
    #[serde(default)]
    pub module_rules: Vec<RuleConfig>,
    #[serde(default)]
    pub plugins: Vec<PluginDescriptor>,
    pub output: OutputConfig,
    /// Files whose dependencies are never followed
    #[serde(default)]
    pub no_parse: Vec<PatternConfig>,
}

/// Root configuration structure for `assetpipe.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    pub project: ProjectConfig,
    #[serde(default)]
    pub capabilities: BTreeMap<String, CapabilityConfig>,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "targets[0].module_rules[2].use")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "assetpipe.toml: '{}' {}", self.field, self.message)
    }
}

fn invalid(field: String, message: &str) -> ConfigValidationError {
    ConfigValidationError { field, message: message.to_string() }
}

impl AssetConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.project.name.is_empty() {
            errors.push(invalid("project.name".to_string(), "must be a non-empty string"));
        }

        for (id, capability) in &self.capabilities {
            if capability.command.first().map_or(true, |p| p.is_empty()) {
                errors.push(invalid(format!("capabilities.{}.command", id), "must name a program"));
            }
        }

        if self.targets.is_empty() {
            errors.push(invalid("targets".to_string(), "must declare at least one target"));
        }

        for (t, target) in self.targets.iter().enumerate() {
            if target.name.is_empty() {
                errors.push(invalid(format!("targets[{}].name", t), "must be a non-empty string"));
            }
            if target.output.filename.is_empty() {
                errors.push(invalid(
                    format!("targets[{}].output.filename", t),
                    "must be a non-empty string",
                ));
            }

            for (e, entry) in target.entry_points.iter().enumerate() {
                if entry.name.is_empty() {
                    errors.push(invalid(
                        format!("targets[{}].entry_points[{}].name", t, e),
                        "must be a non-empty string",
                    ));
                }
                if entry.roots.is_empty() {
                    errors.push(invalid(
                        format!("targets[{}].entry_points[{}].roots", t, e),
                        "must contain at least one path",
                    ));
                }
            }

            for (r, rule) in target.module_rules.iter().enumerate() {
                if rule.chain.is_empty() {
                    errors.push(invalid(
                        format!("targets[{}].module_rules[{}].use", t, r),
                        "must contain at least one loader",
                    ));
                }
            }
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
