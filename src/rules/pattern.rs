//! Path patterns used by module rules.
//!
//! A pattern is either a regular expression (the usual form, e.g. `\.scss$`)
//! or a glob. Both are evaluated against the *logical* path of a module: the
//! source-root relative path with `/` separators, including any `?query`
//! suffix. Matching is case-sensitive and never touches the filesystem.

use glob::MatchOptions;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Error compiling a pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    /// Invalid regular expression
    #[error("invalid regex '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    /// Invalid glob
    #[error("invalid glob '{pattern}': {source}")]
    Glob {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// A pattern as written in configuration.
///
/// A bare string is a regular expression; `{ glob = "..." }` is a glob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternConfig {
    /// Regular expression source
    Regex(String),
    /// Glob pattern
    Glob { glob: String },
}

/// A compiled path predicate.
#[derive(Debug, Clone)]
pub enum PathPattern {
    Regex(Regex),
    Glob(glob::Pattern),
}

impl PathPattern {
    /// Compile a regular expression pattern.
    pub fn regex(pattern: &str) -> Result<Self, PatternError> {
        Regex::new(pattern)
            .map(PathPattern::Regex)
            .map_err(|source| PatternError::Regex { pattern: pattern.to_string(), source })
    }

    /// Compile a glob pattern.
    pub fn glob(pattern: &str) -> Result<Self, PatternError> {
        glob::Pattern::new(pattern)
            .map(PathPattern::Glob)
            .map_err(|source| PatternError::Glob { pattern: pattern.to_string(), source })
    }

    /// Compile a pattern from its configuration form.
    pub fn from_config(config: &PatternConfig) -> Result<Self, PatternError> {
        match config {
            PatternConfig::Regex(source) => Self::regex(source),
            PatternConfig::Glob { glob } => Self::glob(glob),
        }
    }

    /// The pattern source text.
    pub fn as_str(&self) -> &str {
        match self {
            PathPattern::Regex(re) => re.as_str(),
            PathPattern::Glob(pattern) => pattern.as_str(),
        }
    }

    /// Test a logical path against this pattern.
    pub fn is_match(&self, path: &str) -> bool {
        match self {
            PathPattern::Regex(re) => re.is_match(path),
            PathPattern::Glob(pattern) => pattern.matches_with(path, GLOB_OPTIONS),
        }
    }
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathPattern::Regex(re) => write!(f, "/{}/", re.as_str()),
            PathPattern::Glob(pattern) => write!(f, "glob({})", pattern.as_str()),
        }
    }
}

/// A path matches iff `test` matches and no exclusion matches.
pub fn matches(path: &str, test: &PathPattern, exclude: &[PathPattern]) -> bool {
    test.is_match(path) && !exclude.iter().any(|pattern| pattern.is_match(path))
}
