//! Build target definitions.
//!
//! A [`BuildTargetSpec`] is the unit of configuration: entry points, the
//! target's own rule set, its plugins and where its outputs go. Specs are
//! built once from configuration and never mutated during a run.

use crate::build::{is_glob, ConfigurationError, PluginDescriptor};
use crate::config::{AssetConfig, TargetConfig};
use crate::rules::{ModuleRule, ModuleRuleSet, PathPattern};
use std::path::{Path, PathBuf};

/// A named entry point and its roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub name: String,
    /// Files, directories or globs, relative to the project root
    pub roots: Vec<String>,
}

impl EntryPoint {
    pub fn new(name: impl Into<String>, roots: Vec<String>) -> Self {
        Self { name: name.into(), roots }
    }

    /// `[ext]` of the entry's bundle: the first root's extension, or `js`.
    pub fn bundle_extension(&self) -> &str {
        self.roots
            .first()
            .filter(|root| !is_glob(root))
            .and_then(|root| Path::new(root).extension())
            .and_then(|ext| ext.to_str())
            .unwrap_or("js")
    }
}

/// Output directory plus bundle filename template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLocation {
    /// Absolute or project-root-relative directory
    pub directory: PathBuf,
    /// Filename with `[name]` and `[ext]` placeholders
    pub filename_template: String,
}

impl OutputLocation {
    pub fn new(directory: impl Into<PathBuf>, filename_template: impl Into<String>) -> Self {
        Self { directory: directory.into(), filename_template: filename_template.into() }
    }

    /// Bundle filename for an entry.
    pub fn filename(&self, name: &str, ext: &str) -> String {
        render_filename(&self.filename_template, name, ext)
    }
}

/// Substitute `[name]` and `[ext]` in a filename template.
pub fn render_filename(template: &str, name: &str, ext: &str) -> String {
    template.replace("[name]", name).replace("[ext]", ext)
}

/// A build target.
#[derive(Debug, Clone)]
pub struct BuildTargetSpec {
    /// Unique target name
    pub name: String,
    pub entry_points: Vec<EntryPoint>,
    pub module_rules: ModuleRuleSet,
    pub plugins: Vec<PluginDescriptor>,
    pub output: OutputLocation,
    /// Files whose dependencies are never followed
    pub no_parse: Vec<PathPattern>,
}

impl BuildTargetSpec {
    /// Create a target with no entries, rules or plugins.
    pub fn new(name: impl Into<String>, output: OutputLocation) -> Self {
        Self {
            name: name.into(),
            entry_points: vec![],
            module_rules: ModuleRuleSet::default(),
            plugins: vec![],
            output,
            no_parse: vec![],
        }
    }

    pub fn with_entry(mut self, entry: EntryPoint) -> Self {
        self.entry_points.push(entry);
        self
    }

    pub fn with_rule(mut self, rule: ModuleRule) -> Self {
        self.module_rules.push(rule);
        self
    }

    pub fn with_plugin(mut self, plugin: PluginDescriptor) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_no_parse(mut self, pattern: PathPattern) -> Self {
        self.no_parse.push(pattern);
        self
    }

    /// Compile a target from configuration, collecting every error.
    pub fn from_config(config: &TargetConfig) -> Result<Self, Vec<ConfigurationError>> {
        let mut errors = Vec::new();
        let mut spec = BuildTargetSpec::new(
            &config.name,
            OutputLocation::new(&config.output.dir, &config.output.filename),
        );

        for entry in &config.entry_points {
            spec.entry_points.push(EntryPoint::new(&entry.name, entry.roots.iter().cloned().collect()));
        }

        for rule in &config.module_rules {
            match ModuleRule::from_config(&config.name, rule) {
                Ok(rule) => spec.module_rules.push(rule),
                Err(e) => errors.extend(e),
            }
        }

        for pattern in &config.no_parse {
            match PathPattern::from_config(pattern) {
                Ok(p) => spec.no_parse.push(p),
                Err(source) => {
                    errors.push(ConfigurationError::Pattern { target: config.name.clone(), source })
                }
            }
        }

        spec.plugins = config.plugins.clone();

        if errors.is_empty() {
            Ok(spec)
        } else {
            Err(errors)
        }
    }

    /// Check if this target matches a filter: an exact name or a glob.
    pub fn matches_filter(&self, filter: &str) -> bool {
        if self.name == filter {
            return true;
        }
        is_glob(filter) && glob::Pattern::new(filter).map(|p| p.matches(&self.name)).unwrap_or(false)
    }

    /// Whether dependencies reported for a file are ignored.
    pub fn is_opaque(&self, path: &str, rule: Option<&ModuleRule>) -> bool {
        rule.is_some_and(|r| r.opaque) || self.no_parse.iter().any(|p| p.is_match(path))
    }
}

/// Compile every target of a configuration.
pub fn targets_from_config(config: &AssetConfig) -> Result<Vec<BuildTargetSpec>, Vec<ConfigurationError>> {
    let mut targets = Vec::new();
    let mut errors = Vec::new();

    for target in &config.targets {
        match BuildTargetSpec::from_config(target) {
            Ok(spec) => targets.push(spec),
            Err(e) => errors.extend(e),
        }
    }

    if errors.is_empty() {
        Ok(targets)
    } else {
        Err(errors)
    }
}

/// Keep targets matching any of the filters. No filters keeps everything.
pub fn filter_targets(targets: Vec<BuildTargetSpec>, filters: &[String]) -> Vec<BuildTargetSpec> {
    if filters.is_empty() {
        return targets;
    }
    targets.into_iter().filter(|t| filters.iter().any(|f| t.matches_filter(f))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{LoaderChain, LoaderStep};

    fn target(name: &str) -> BuildTargetSpec {
        BuildTargetSpec::new(name, OutputLocation::new("dist", "[name].[ext]"))
    }

    #[test]
    fn test_render_filename() {
        assert_eq!(render_filename("[name].[ext]", "app", "js"), "app.js");
        assert_eq!(render_filename("bundle.js", "app", "js"), "bundle.js");
        assert_eq!(render_filename("[name]-[name].css", "a", "css"), "a-a.css");
    }

    #[test]
    fn test_bundle_extension() {
        assert_eq!(EntryPoint::new("app", vec!["src/index.js".into()]).bundle_extension(), "js");
        assert_eq!(EntryPoint::new("s", vec!["style/main.scss".into()]).bundle_extension(), "scss");
        assert_eq!(EntryPoint::new("d", vec!["src".into()]).bundle_extension(), "js");
        assert_eq!(EntryPoint::new("g", vec!["src/*.ts".into()]).bundle_extension(), "js");
        assert_eq!(EntryPoint::new("e", vec![]).bundle_extension(), "js");
    }

    #[test]
    fn test_output_location_filename() {
        let output = OutputLocation::new("dist", "[name].bundle.[ext]");
        assert_eq!(output.filename("app", "js"), "app.bundle.js");
    }

    #[test]
    fn test_matches_filter() {
        let t = target("prototyping");
        assert!(t.matches_filter("prototyping"));
        assert!(t.matches_filter("proto*"));
        assert!(!t.matches_filter("proto"));
        assert!(!t.matches_filter("dist"));
    }

    #[test]
    fn test_filter_targets() {
        let targets = vec![target("dist"), target("prototyping"), target("docs")];

        let kept = filter_targets(targets.clone(), &["d*".to_string()]);
        let names: Vec<&str> = kept.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["dist", "docs"]);

        assert_eq!(filter_targets(targets, &[]).len(), 3);
    }

    #[test]
    fn test_is_opaque() {
        let elm = ModuleRule::new(
            PathPattern::regex(r"\.elm$").unwrap(),
            LoaderChain::new(vec![LoaderStep::new("raw-loader")]),
        );
        let t = target("dist").with_no_parse(PathPattern::regex(r"vendor/").unwrap());

        assert!(!t.is_opaque("src/Main.elm", Some(&elm)));
        assert!(t.is_opaque("src/Main.elm", Some(&elm.clone().with_opaque(true))));
        assert!(t.is_opaque("vendor/lib.js", None));
        assert!(!t.is_opaque("src/app.js", None));
    }

    #[test]
    fn test_from_config() {
        let config: TargetConfig = toml::from_str(
            r#"
name = "dist"
no_parse = ['\.elm$']
[output]
dir = "dist"
filename = "bundle.js"
[[entry_points]]
name = "app"
roots = "src/index.js"
[[module_rules]]
test = '\.css$'
use = ["style-loader", "css-loader"]
"#,
        )
        .unwrap();

        let spec = BuildTargetSpec::from_config(&config).unwrap();
        assert_eq!(spec.name, "dist");
        assert_eq!(spec.entry_points[0].roots, vec!["src/index.js"]);
        assert_eq!(spec.module_rules.len(), 1);
        assert_eq!(spec.no_parse.len(), 1);
        assert_eq!(spec.output.filename("app", "js"), "bundle.js");
    }

    #[test]
    fn test_from_config_collects_pattern_errors() {
        let config: TargetConfig = toml::from_str(
            r#"
name = "dist"
no_parse = ['(']
[output]
dir = "dist"
[[module_rules]]
test = '['
use = "css-loader"
"#,
        )
        .unwrap();

        let errors = BuildTargetSpec::from_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
