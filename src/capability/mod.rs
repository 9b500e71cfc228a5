//! Transform capabilities and their registry.
//!
//! The build core never transforms content itself. Each loader step names a
//! [`Capability`] registered in a [`CapabilityRegistry`]; the core checks the
//! names and options once when configuration is loaded and then only hands
//! content to the capability in chain order.

pub mod builtin;
pub mod command;

pub use builtin::*;
pub use command::*;

use crate::config::CapabilityConfig;
use crate::rules::LoaderOptions;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

static NOT_CANCELLED: AtomicBool = AtomicBool::new(false);

/// Input handed to a capability.
#[derive(Debug, Clone, Copy)]
pub struct TransformInput<'a> {
    /// Logical path of the module (source-root relative, may carry `?query`)
    pub logical_path: &'a str,
    /// Absolute path of the file on disk
    pub file: &'a Path,
    /// Content produced by the previous step (or the file itself)
    pub content: &'a [u8],
    /// Options of this step
    pub options: &'a LoaderOptions,
    /// Raised when the owning target has failed; long-running steps should stop
    pub cancel: &'a AtomicBool,
}

impl<'a> TransformInput<'a> {
    /// Input that is never cancelled.
    pub fn new(logical_path: &'a str, file: &'a Path, content: &'a [u8], options: &'a LoaderOptions) -> Self {
        Self { logical_path, file, content, options, cancel: &NOT_CANCELLED }
    }

    /// Tie the input to a target's abort flag.
    pub fn with_cancel(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Token a capability writes where a reported dependency's URL belongs.
///
/// The build replaces it with the URL the dependency is finally served from,
/// relative to the file the content ends up in.
pub fn url_placeholder(request: &str) -> String {
    format!("__assetpipe_url_{}__", content_hash(request.as_bytes()))
}

/// A file a capability asks to be written next to the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedAsset {
    /// Path relative to the target's output directory
    pub path: PathBuf,
    pub content: Vec<u8>,
}

/// Output of one transform step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutput {
    /// Content passed to the next step
    pub content: Vec<u8>,
    /// Files to write into the output directory
    pub emitted: Vec<EmittedAsset>,
    /// Requests for further modules, relative to the transformed file
    pub dependencies: Vec<String>,
    /// Output-relative URL (or `data:` URL) the module is referenced by
    pub url: Option<String>,
}

impl TransformOutput {
    /// Output with content only.
    pub fn content(content: impl Into<Vec<u8>>) -> Self {
        Self { content: content.into(), ..Default::default() }
    }
}

/// An external capability failed on a given input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{capability} failed on '{path}': {message}")]
pub struct TransformError {
    pub capability: String,
    pub path: String,
    pub message: String,
}

impl TransformError {
    pub fn new(
        capability: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self { capability: capability.into(), path: path.into(), message: message.into() }
    }
}

/// A named transform.
pub trait Capability: Send + Sync {
    /// Identifier used in loader steps.
    fn id(&self) -> &str;

    /// Injectors place content into the page at runtime; extracting rules skip them.
    fn is_injector(&self) -> bool {
        false
    }

    /// Check option names and value types. Called once, at configuration load.
    fn check_options(&self, options: &LoaderOptions) -> Result<(), String>;

    /// Transform content.
    fn apply(&self, input: &TransformInput<'_>) -> Result<TransformOutput, String>;
}

/// Reject option keys outside `known`.
pub fn check_known_options(options: &LoaderOptions, known: &[&str]) -> Result<(), String> {
    for key in options.keys() {
        if !known.contains(&key.as_str()) {
            return Err(if known.is_empty() {
                format!("unknown option '{}' (this loader takes no options)", key)
            } else {
                format!("unknown option '{}' (expected one of: {})", key, known.join(", "))
            });
        }
    }
    Ok(())
}

/// Read a boolean option.
pub fn option_bool(options: &LoaderOptions, key: &str) -> Result<Option<bool>, String> {
    options
        .get(key)
        .map(|v| v.as_bool().ok_or_else(|| format!("option '{}' must be a boolean", key)))
        .transpose()
}

/// Read a non-negative integer option.
pub fn option_usize(options: &LoaderOptions, key: &str) -> Result<Option<usize>, String> {
    options
        .get(key)
        .map(|v| {
            v.as_int()
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| format!("option '{}' must be a non-negative integer", key))
        })
        .transpose()
}

/// Read a string option.
pub fn option_str<'a>(options: &'a LoaderOptions, key: &str) -> Result<Option<&'a str>, String> {
    options
        .get(key)
        .map(|v| v.as_str().ok_or_else(|| format!("option '{}' must be a string", key)))
        .transpose()
}

/// Identifier-to-capability mapping.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in loaders.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CssLoader));
        registry.register(Arc::new(StyleLoader));
        registry.register(Arc::new(FileLoader));
        registry.register(Arc::new(UrlLoader));
        registry.register(Arc::new(RawLoader));
        registry
    }

    /// Built-ins plus the external command capabilities declared in configuration.
    ///
    /// A declared capability replaces a built-in of the same name.
    pub fn from_config(configs: &BTreeMap<String, CapabilityConfig>) -> Result<Self, Vec<String>> {
        let mut registry = Self::with_builtins();
        let mut errors = Vec::new();

        for (id, config) in configs {
            match CommandCapability::from_config(id, config) {
                Ok(capability) => registry.register(Arc::new(capability)),
                Err(e) => errors.push(format!("capabilities.{}: {}", id, e)),
            }
        }

        if errors.is_empty() {
            Ok(registry)
        } else {
            Err(errors)
        }
    }

    /// Register a capability under its identifier, replacing any previous one.
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        self.capabilities.insert(capability.id().to_string(), capability);
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Capability>> {
        self.capabilities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.capabilities.contains_key(id)
    }

    /// Registered identifiers, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.capabilities.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.capabilities.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::OptionValue;

    struct Upper;

    impl Capability for Upper {
        fn id(&self) -> &str {
            "upper"
        }

        fn check_options(&self, options: &LoaderOptions) -> Result<(), String> {
            check_known_options(options, &[])
        }

        fn apply(&self, input: &TransformInput<'_>) -> Result<TransformOutput, String> {
            Ok(TransformOutput::content(input.content.to_ascii_uppercase()))
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = CapabilityRegistry::with_builtins();
        let ids: Vec<&str> = registry.ids().collect();
        assert_eq!(ids, vec!["css-loader", "file-loader", "raw-loader", "style-loader", "url-loader"]);
        assert!(registry.get("style-loader").unwrap().is_injector());
        assert!(!registry.get("css-loader").unwrap().is_injector());
    }

    #[test]
    fn test_register_custom() {
        let mut registry = CapabilityRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(Upper));
        assert!(registry.contains("upper"));

        let options = LoaderOptions::new();
        let input = TransformInput::new("a.txt", Path::new("/src/a.txt"), b"abc", &options);
        let output = registry.get("upper").unwrap().apply(&input).unwrap();
        assert_eq!(output.content, b"ABC");
    }

    #[test]
    fn test_from_config_rejects_empty_command() {
        let mut configs = BTreeMap::new();
        configs.insert(
            "sass-loader".to_string(),
            CapabilityConfig { command: vec![], options: vec![], injector: false },
        );

        let errors = CapabilityRegistry::from_config(&configs).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("capabilities.sass-loader"));
    }

    #[test]
    fn test_check_known_options() {
        let mut options = LoaderOptions::new();
        options.insert("limit".to_string(), OptionValue::Int(1));
        assert!(check_known_options(&options, &["limit"]).is_ok());

        let err = check_known_options(&options, &["name"]).unwrap_err();
        assert!(err.contains("unknown option 'limit'"));
        assert!(check_known_options(&options, &[]).unwrap_err().contains("takes no options"));
    }

    #[test]
    fn test_option_readers_check_types() {
        let mut options = LoaderOptions::new();
        options.insert("limit".to_string(), OptionValue::Str("big".to_string()));
        options.insert("minify".to_string(), OptionValue::Bool(true));

        assert!(option_usize(&options, "limit").is_err());
        assert_eq!(option_bool(&options, "minify"), Ok(Some(true)));
        assert_eq!(option_str(&options, "missing"), Ok(None));
        assert!(option_str(&options, "minify").is_err());
    }

    #[test]
    fn test_input_cancel_flag() {
        let options = LoaderOptions::new();
        let input = TransformInput::new("a.txt", Path::new("/src/a.txt"), b"", &options);
        assert!(!input.is_cancelled());

        let abort = AtomicBool::new(true);
        assert!(input.with_cancel(&abort).is_cancelled());
    }

    #[test]
    fn test_url_placeholder_is_stable_per_request() {
        assert_eq!(url_placeholder("img/logo.png"), url_placeholder("img/logo.png"));
        assert_ne!(url_placeholder("img/logo.png"), url_placeholder("img/logo.png?v=2"));
        assert!(url_placeholder("a.png").chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn test_transform_error_display() {
        let err = TransformError::new("sass-loader", "main.scss", "undefined variable");
        assert_eq!(err.to_string(), "sass-loader failed on 'main.scss': undefined variable");
    }
}
