//! Build context containing paths and capabilities for a build.

use crate::capability::CapabilityRegistry;
use crate::config::{AssetConfig, ConfigError};
use crate::build::normalize_path;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Build context containing paths and capabilities for a build operation.
///
/// Entry roots, templates and icons resolve against the project root (the
/// directory holding `assetpipe.toml`); logical paths are relative to the
/// source root.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Project root directory
    project_root: PathBuf,
    /// Source root directory (absolute)
    src_root: PathBuf,
    /// Registered transform capabilities
    registry: Arc<CapabilityRegistry>,
    /// Whether to run in verbose mode
    verbose: bool,
    /// Optional filter to build specific targets only
    target_filter: Option<Vec<String>>,
}

impl BuildContext {
    /// Create a context with the built-in capabilities and the project root as source root.
    pub fn new(project_root: PathBuf) -> Self {
        let project_root = normalize_path(&project_root);
        Self {
            src_root: project_root.clone(),
            project_root,
            registry: Arc::new(CapabilityRegistry::with_builtins()),
            verbose: false,
            target_filter: None,
        }
    }

    /// Create a context from configuration.
    ///
    /// Registers the configured external capabilities next to the built-ins.
    pub fn from_config(config: &AssetConfig, project_root: PathBuf) -> Result<Self, ConfigError> {
        let registry =
            CapabilityRegistry::from_config(&config.capabilities).map_err(ConfigError::Validation)?;
        Ok(Self::new(project_root).with_src(&config.project.src).with_registry(registry))
    }

    /// Get the project root directory.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Get the source root directory.
    pub fn src_dir(&self) -> &Path {
        &self.src_root
    }

    /// Get the capability registry.
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Whether verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Set the source root, relative to the project root.
    pub fn with_src(mut self, src: &Path) -> Self {
        self.src_root = normalize_path(&self.resolve_path(src));
        self
    }

    /// Replace the capability registry.
    pub fn with_registry(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set target filter to build only specific targets.
    pub fn with_filter(mut self, targets: Vec<String>) -> Self {
        self.target_filter = Some(targets);
        self
    }

    /// Get the target filter.
    pub fn target_filter(&self) -> Option<&[String]> {
        self.target_filter.as_deref()
    }

    /// Resolve a path relative to the project root.
    ///
    /// If the path is absolute, returns it unchanged.
    /// If relative, joins it with the project root.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn test_build_context_new() {
        let ctx = BuildContext::new(PathBuf::from("/project"));

        assert_eq!(ctx.project_root(), Path::new("/project"));
        assert_eq!(ctx.src_dir(), Path::new("/project"));
        assert!(!ctx.is_verbose());
        assert!(ctx.registry().contains("css-loader"));
    }

    #[test]
    fn test_build_context_with_src() {
        let ctx = BuildContext::new(PathBuf::from("/project")).with_src(Path::new("./app/../web"));
        assert_eq!(ctx.src_dir(), Path::new("/project/web"));
    }

    #[test]
    fn test_build_context_with_verbose() {
        let ctx = BuildContext::new(PathBuf::from("/project")).with_verbose(true);
        assert!(ctx.is_verbose());
    }

    #[test]
    fn test_build_context_with_filter() {
        let ctx = BuildContext::new(PathBuf::from("/project")).with_filter(vec!["dist".to_string()]);
        assert_eq!(ctx.target_filter(), Some(&["dist".to_string()][..]));
    }

    #[test]
    fn test_build_context_resolve_path() {
        let ctx = BuildContext::new(PathBuf::from("/project"));
        assert_eq!(ctx.resolve_path(Path::new("/other/path")), PathBuf::from("/other/path"));
        assert_eq!(ctx.resolve_path(Path::new("src/style")), PathBuf::from("/project/src/style"));
    }

    #[test]
    fn test_build_context_from_config() {
        let config = parse_config(
            r#"
[project]
name = "family-tree"
src = "app"

[capabilities.sass-loader]
command = ["sass", "--stdin"]

[[targets]]
name = "dist"
[targets.output]
dir = "dist"
"#,
        )
        .unwrap();

        let ctx = BuildContext::from_config(&config, PathBuf::from("/project")).unwrap();
        assert_eq!(ctx.src_dir(), Path::new("/project/app"));
        assert!(ctx.registry().contains("sass-loader"));
        assert!(ctx.registry().contains("style-loader"));
    }
}
