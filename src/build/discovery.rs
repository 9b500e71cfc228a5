//! Source file discovery and logical paths.
//!
//! Entry roots are expanded into files here, and files are named by their
//! logical path: relative to the source root, `/`-separated, optionally with a
//! `?query` suffix carried over from the request that reached them.

use glob::{glob_with, MatchOptions};
use std::path::{Component, Path, PathBuf};

/// Error during source discovery.
#[derive(Debug)]
pub enum DiscoveryError {
    /// Invalid glob pattern
    InvalidPattern(String, glob::PatternError),
    /// Root does not exist
    NotFound(PathBuf),
    /// IO error during file enumeration
    Io(std::io::Error),
}

impl std::fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryError::InvalidPattern(pattern, err) => {
                write!(f, "Invalid glob pattern '{}': {}", pattern, err)
            }
            DiscoveryError::NotFound(path) => write!(f, "'{}' does not exist", path.display()),
            DiscoveryError::Io(err) => write!(f, "IO error during discovery: {}", err),
        }
    }
}

impl std::error::Error for DiscoveryError {}

impl From<std::io::Error> for DiscoveryError {
    fn from(err: std::io::Error) -> Self {
        DiscoveryError::Io(err)
    }
}

fn match_options() -> MatchOptions {
    MatchOptions { case_sensitive: true, require_literal_separator: true, require_literal_leading_dot: false }
}

/// Whether a string contains glob metacharacters.
pub fn is_glob(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Discover files matching a glob pattern, sorted.
///
/// # Arguments
/// - `base_dir` - Base directory to resolve patterns from
/// - `pattern` - Glob pattern to match
pub fn discover_files(base_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
    let full_pattern = base_dir.join(pattern);
    let pattern_str = full_pattern.to_string_lossy();

    let paths = glob_with(&pattern_str, match_options())
        .map_err(|e| DiscoveryError::InvalidPattern(pattern.to_string(), e))?;

    let mut files = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => tracing::warn!("error reading path: {}", e),
        }
    }

    files.sort();
    Ok(files)
}

/// Expand an entry root into files.
///
/// A file expands to itself, a directory to every file beneath it and a glob
/// to its matches, all sorted.
pub fn expand_root(project_root: &Path, root: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
    if is_glob(root) {
        return discover_files(project_root, root);
    }

    let path = normalize_path(&project_root.join(root));
    if path.is_file() {
        Ok(vec![path])
    } else if path.is_dir() {
        let pattern = glob::Pattern::escape(&path.to_string_lossy());
        discover_files(Path::new(&pattern), "**/*")
    } else {
        Err(DiscoveryError::NotFound(path))
    }
}

/// Lexically normalize a path: drop `.` and fold `..` into its parent.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Logical path of a file under the source root, or `None` if it lies outside.
pub fn logical_path(src_root: &Path, file: &Path) -> Option<String> {
    let relative = normalize_path(file).strip_prefix(normalize_path(src_root)).ok()?.to_path_buf();
    let parts: Vec<String> = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Split a logical path into its path and optional query.
pub fn split_query(logical: &str) -> (&str, Option<&str>) {
    match logical.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (logical, None),
    }
}

/// Resolve a dependency request made by `importer` into a logical path.
///
/// Relative requests are resolved against the importer's directory; a leading
/// `/` means the source root. Returns `None` if the result escapes the root.
pub fn resolve_request(importer: &str, request: &str) -> Option<String> {
    let (importer_path, _) = split_query(importer);
    let (request_path, query) = split_query(request);

    let mut segments: Vec<&str> = Vec::new();
    let relative = match request_path.strip_prefix('/') {
        Some(rest) => rest,
        None => {
            segments.extend(importer_path.split('/'));
            segments.pop();
            request_path
        }
    };

    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return None;
    }
    let path = segments.join("/");
    Some(match query {
        Some(q) => format!("{}?{}", path, q),
        None => path,
    })
}

/// Path of a logical path on disk, query removed.
pub fn file_for(src_root: &Path, logical: &str) -> PathBuf {
    let (path, _) = split_query(logical);
    path.split('/').fold(src_root.to_path_buf(), |acc, part| acc.join(part))
}

/// Express an output-relative URL relative to `base_dir`, another
/// output-relative directory (`""` is the output root).
///
/// Absolute, `data:` and remote URLs are returned unchanged.
pub fn relative_url(base_dir: &str, url: &str) -> String {
    if url.starts_with('/') || url.starts_with("data:") || url.contains("://") {
        return url.to_string();
    }
    let base: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    let target: Vec<&str> = url.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    let dirs = &target[..target.len().saturating_sub(1)];
    let common = base.iter().zip(dirs).take_while(|(a, b)| a == b).count();

    let mut parts = vec![".."; base.len() - common];
    parts.extend_from_slice(&target[common..]);
    parts.join("/")
}
