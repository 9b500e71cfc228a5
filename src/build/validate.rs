//! Static validation.
//!
//! Everything that can be known about a run before any transform executes is
//! checked here: target names, loader chains, extraction sinks, entry roots,
//! templates and the declared output paths of every target. Errors are
//! collected rather than returned one at a time.

use crate::build::{
    apply, expand_root, inject_tags, logical_path, normalize_path, BuildContext, BuildTargetSpec,
    DiscoveryError, ExtractionCoordinator, ExtractionSink, OutputBinder, PluginContext,
    PluginEffect, TemplateError,
};
use crate::rules::{LoaderChainResolver, PatternError, StepParseError};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// A configuration problem. Always fatal and always reported before any transform runs.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("target name '{name}' is used more than once")]
    DuplicateTarget { name: String },

    #[error("target '{target}': {source}")]
    Pattern {
        target: String,
        #[source]
        source: PatternError,
    },

    #[error("target '{target}': {source}")]
    LoaderSpec {
        target: String,
        #[source]
        source: StepParseError,
    },

    #[error("target '{target}': unknown capability '{identifier}'")]
    UnknownCapability { target: String, identifier: String },

    #[error("target '{target}': invalid options for '{identifier}': {message}")]
    InvalidOptions { target: String, identifier: String, message: String },

    #[error("target '{target}': {}", missing_sink(.sink))]
    MissingSink { target: String, sink: Option<String> },

    #[error("target '{target}': `extract = true` is ambiguous between sinks {}", .sinks.join(", "))]
    AmbiguousSink { target: String, sinks: Vec<String> },

    #[error("target '{target}': extraction sink '{sink}' is declared more than once")]
    DuplicateSink { target: String, sink: String },

    #[error("target '{target}': entry '{entry}' root '{root}' {message}")]
    MissingEntry { target: String, entry: String, root: String, message: String },

    #[error("target '{target}': entry '{entry}' file '{}' is outside the source root", path.display())]
    EntryOutsideSource { target: String, entry: String, path: PathBuf },

    #[error("target '{target}': file '{}' not found", path.display())]
    MissingFile { target: String, path: PathBuf },

    #[error("target '{target}': {source}")]
    Template {
        target: String,
        #[source]
        source: TemplateError,
    },

    #[error("output '{}' is written by both '{first}' and '{second}'", path.display())]
    ConflictingOutput { path: PathBuf, first: String, second: String },
}

fn missing_sink(sink: &Option<String>) -> String {
    match sink {
        Some(name) => format!("no extraction sink named '{}'", name),
        None => "a rule extracts but no extraction sink is declared".to_string(),
    }
}

/// An entry point with its expanded roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedEntry {
    pub name: String,
    /// Bundle filename within the output directory
    pub bundle: String,
    /// Logical paths of the roots, in expansion order
    pub roots: Vec<String>,
}

/// A rendered page, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub output: PathBuf,
    pub content: String,
}

/// A validated target with everything needed to build it.
#[derive(Debug, Clone)]
pub struct PreparedTarget {
    pub spec: BuildTargetSpec,
    /// Absolute, normalized output directory
    pub output_dir: PathBuf,
    pub entries: Vec<PreparedEntry>,
    pub sinks: Vec<ExtractionSink>,
    /// Sink index per rule, in rule order (`None` for inline rules)
    pub rule_sinks: Vec<Option<usize>>,
    pub pages: Vec<RenderedPage>,
    /// Files copied verbatim: absolute source and output-relative destination
    pub copies: Vec<(PathBuf, PathBuf)>,
}

impl PreparedTarget {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Outputs known before the build: bundles, sinks, pages and copies.
    pub fn static_outputs(&self) -> Vec<PathBuf> {
        let mut outputs: Vec<PathBuf> = self.entries.iter().map(|e| PathBuf::from(&e.bundle)).collect();
        outputs.extend(self.sinks.iter().map(|s| PathBuf::from(&s.output_filename)));
        outputs.extend(self.pages.iter().map(|p| p.output.clone()));
        outputs.extend(self.copies.iter().map(|(_, to)| to.clone()));
        outputs
    }
}

/// Validate targets and prepare them for building.
pub fn prepare(
    ctx: &BuildContext,
    targets: &[BuildTargetSpec],
) -> Result<Vec<PreparedTarget>, Vec<ConfigurationError>> {
    let mut errors = Vec::new();

    let mut names = HashSet::new();
    for target in targets {
        if !names.insert(target.name.as_str()) {
            errors.push(ConfigurationError::DuplicateTarget { name: target.name.clone() });
        }
    }

    let binder = OutputBinder::new();
    let mut prepared = Vec::new();
    for target in targets {
        match prepare_target(ctx, &binder, target) {
            Ok(p) => prepared.push(p),
            Err(e) => errors.extend(e),
        }
    }

    errors.extend(check_conflicts(&prepared));

    if errors.is_empty() {
        Ok(prepared)
    } else {
        Err(errors)
    }
}

fn prepare_target(
    ctx: &BuildContext,
    binder: &OutputBinder,
    spec: &BuildTargetSpec,
) -> Result<PreparedTarget, Vec<ConfigurationError>> {
    let name = spec.name.as_str();
    let mut errors = Vec::new();

    let resolver = LoaderChainResolver::new(ctx.registry());
    for rule in spec.module_rules.rules() {
        errors.extend(resolver.validate(name, resolver.resolve(rule)));
    }

    let entries = prepare_entries(ctx, spec, &mut errors);
    let bundles: Vec<String> = entries.iter().map(|e| e.bundle.clone()).collect();

    let plugin_ctx = PluginContext { target: name, project_root: ctx.project_root(), bundles: &bundles };
    let mut sinks: Vec<ExtractionSink> = Vec::new();
    let mut pages = Vec::new();
    let mut copies = Vec::new();

    for descriptor in &spec.plugins {
        match apply(descriptor, &plugin_ctx) {
            PluginEffect::Sink(sink) => {
                if sinks.iter().any(|s| s.name == sink.name) {
                    errors.push(ConfigurationError::DuplicateSink {
                        target: name.to_string(),
                        sink: sink.name.clone(),
                    });
                }
                sinks.push(sink);
            }
            PluginEffect::Html(plan) => {
                if let Some((icon, icon_name)) = &plan.favicon {
                    if icon.is_file() {
                        copies.push((icon.clone(), PathBuf::from(icon_name)));
                    } else {
                        errors.push(ConfigurationError::MissingFile {
                            target: name.to_string(),
                            path: icon.clone(),
                        });
                    }
                }

                let source = match fs::read_to_string(&plan.template) {
                    Ok(s) => s,
                    Err(_) => {
                        errors.push(ConfigurationError::MissingFile {
                            target: name.to_string(),
                            path: plan.template.clone(),
                        });
                        continue;
                    }
                };

                let template_name = plan.template.to_string_lossy();
                match binder.bind(name, &template_name, &source, &plan.metadata) {
                    Ok(artifact) => {
                        let content = if plan.inject {
                            let icon = plan.favicon.as_ref().map(|(_, n)| n.as_str());
                            inject_tags(&artifact.content, &plan.bundles, icon)
                        } else {
                            artifact.content
                        };
                        pages.push(RenderedPage { output: plan.output.clone(), content });
                    }
                    Err(source) => errors.push(ConfigurationError::Template { target: name.to_string(), source }),
                }
            }
        }
    }

    let mut rule_sinks = Vec::new();
    for rule in spec.module_rules.rules() {
        match ExtractionCoordinator::select(name, &sinks, &rule.extract) {
            Ok(sink) => rule_sinks.push(sink),
            Err(e) => errors.push(e),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(PreparedTarget {
        spec: spec.clone(),
        output_dir: normalize_path(&ctx.resolve_path(&spec.output.directory)),
        entries,
        sinks,
        rule_sinks,
        pages,
        copies,
    })
}

fn prepare_entries(
    ctx: &BuildContext,
    spec: &BuildTargetSpec,
    errors: &mut Vec<ConfigurationError>,
) -> Vec<PreparedEntry> {
    let mut entries = Vec::new();

    for entry in &spec.entry_points {
        let mut roots: Vec<String> = Vec::new();
        for root in &entry.roots {
            let missing = |message: String| ConfigurationError::MissingEntry {
                target: spec.name.clone(),
                entry: entry.name.clone(),
                root: root.clone(),
                message,
            };

            let files = match expand_root(ctx.project_root(), root) {
                Ok(files) if files.is_empty() => {
                    errors.push(missing("matches no files".to_string()));
                    continue;
                }
                Ok(files) => files,
                Err(DiscoveryError::NotFound(_)) => {
                    errors.push(missing("does not exist".to_string()));
                    continue;
                }
                Err(e) => {
                    errors.push(missing(format!("cannot be expanded: {}", e)));
                    continue;
                }
            };

            for file in files {
                match logical_path(ctx.src_dir(), &file) {
                    Some(logical) if !roots.contains(&logical) => roots.push(logical),
                    Some(_) => {}
                    None => errors.push(ConfigurationError::EntryOutsideSource {
                        target: spec.name.clone(),
                        entry: entry.name.clone(),
                        path: file,
                    }),
                }
            }
        }

        entries.push(PreparedEntry {
            name: entry.name.clone(),
            bundle: spec.output.filename(&entry.name, entry.bundle_extension()),
            roots,
        });
    }

    entries
}

/// Every declared output path must belong to exactly one target and be
/// produced once within it.
///
/// Emitted assets and raw copies are only named once transforms run, so two
/// targets may not share an output directory or nest one inside the other.
fn check_conflicts(prepared: &[PreparedTarget]) -> Vec<ConfigurationError> {
    let mut errors = Vec::new();
    let dirs: Vec<PathBuf> = prepared.iter().map(|t| normalize_path(&t.output_dir)).collect();
    let mut overlapping: HashSet<(usize, usize)> = HashSet::new();

    for (i, dir) in dirs.iter().enumerate() {
        for (j, earlier) in dirs[..i].iter().enumerate() {
            if dir.starts_with(earlier) || earlier.starts_with(dir) {
                let deeper = if dir.starts_with(earlier) { dir } else { earlier };
                errors.push(ConfigurationError::ConflictingOutput {
                    path: deeper.clone(),
                    first: prepared[j].name().to_string(),
                    second: prepared[i].name().to_string(),
                });
                overlapping.insert((j, i));
            }
        }
    }

    let mut owners: BTreeMap<PathBuf, usize> = BTreeMap::new();
    for (i, target) in prepared.iter().enumerate() {
        for relative in target.static_outputs() {
            let path = normalize_path(&dirs[i].join(&relative));
            match owners.get(&path) {
                Some(&j) if overlapping.contains(&(j, i)) => {}
                Some(&j) => errors.push(ConfigurationError::ConflictingOutput {
                    path,
                    first: prepared[j].name().to_string(),
                    second: target.name().to_string(),
                }),
                None => {
                    owners.insert(path, i);
                }
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{EntryPoint, ExtractOptions, HtmlOptions, OutputLocation, PluginDescriptor};
    use crate::rules::{ExtractMode, LoaderChain, LoaderStep, ModuleRule, PathPattern};
    use std::path::Path;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn create_test_context() -> (TempDir, BuildContext) {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), "src/index.js", "console.log(1)");
        create_test_file(temp.path(), "style/main.css", "body{}");
        let ctx = BuildContext::new(temp.path().to_path_buf());
        (temp, ctx)
    }

    fn target(name: &str, dir: &str, filename: &str) -> BuildTargetSpec {
        BuildTargetSpec::new(name, OutputLocation::new(dir, filename))
            .with_entry(EntryPoint::new("app", vec!["src/index.js".to_string()]))
    }

    fn css_rule() -> ModuleRule {
        ModuleRule::new(
            PathPattern::regex(r"\.css$").unwrap(),
            LoaderChain::new(vec![LoaderStep::new("style-loader"), LoaderStep::new("css-loader")]),
        )
    }

    fn extract_plugin(name: &str, filename: &str) -> PluginDescriptor {
        PluginDescriptor::Extract(ExtractOptions {
            name: name.to_string(),
            filename: filename.to_string(),
            banner: false,
        })
    }

    #[test]
    fn test_prepare_valid_target() {
        let (_temp, ctx) = create_test_context();
        let spec = target("dist", "dist", "bundle.js").with_rule(css_rule());

        let prepared = prepare(&ctx, &[spec]).unwrap();
        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared[0].entries[0].roots, vec!["src/index.js"]);
        assert_eq!(prepared[0].entries[0].bundle, "bundle.js");
        assert_eq!(prepared[0].rule_sinks, vec![None]);
        assert_eq!(prepared[0].output_dir, ctx.project_root().join("dist"));
    }

    #[test]
    fn test_duplicate_target_names() {
        let (_temp, ctx) = create_test_context();
        let errors =
            prepare(&ctx, &[target("dist", "a", "a.js"), target("dist", "b", "b.js")]).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ConfigurationError::DuplicateTarget { .. })));
    }

    #[test]
    fn test_unknown_capability_reported() {
        let (_temp, ctx) = create_test_context();
        let rule = ModuleRule::new(
            PathPattern::regex(r"\.scss$").unwrap(),
            LoaderChain::new(vec![LoaderStep::new("sass-loader")]),
        );

        let errors = prepare(&ctx, &[target("dist", "dist", "bundle.js").with_rule(rule)]).unwrap_err();
        assert!(matches!(&errors[0], ConfigurationError::UnknownCapability { identifier, .. } if identifier == "sass-loader"));
    }

    #[test]
    fn test_conflicting_outputs_across_targets() {
        let (_temp, ctx) = create_test_context();
        let errors = prepare(
            &ctx,
            &[target("dist", "out", "bundle.js"), target("prototyping", "out/./", "bundle.js")],
        )
        .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            ConfigurationError::ConflictingOutput { first, second, .. } if first == "dist" && second == "prototyping"
        ));
    }

    #[test]
    fn test_shared_output_directory_conflicts() {
        let (_temp, ctx) = create_test_context();
        let errors =
            prepare(&ctx, &[target("ta", "out", "a.js"), target("tb", "out", "b.js")]).unwrap_err();

        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            ConfigurationError::ConflictingOutput { path, first, second }
                if path.ends_with("out") && first == "ta" && second == "tb"
        ));
    }

    #[test]
    fn test_nested_output_directory_conflicts() {
        let (_temp, ctx) = create_test_context();
        let errors = prepare(
            &ctx,
            &[target("site", "public/docs", "a.js"), target("root", "public", "b.js")],
        )
        .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            ConfigurationError::ConflictingOutput { path, first, second }
                if path.ends_with("public/docs") && first == "site" && second == "root"
        ));
    }

    #[test]
    fn test_sibling_directory_with_common_prefix_is_fine() {
        let (_temp, ctx) = create_test_context();
        assert!(prepare(&ctx, &[target("a", "out", "a.js"), target("b", "out-b", "b.js")]).is_ok());
    }

    #[test]
    fn test_same_filename_different_dirs_is_fine() {
        let (_temp, ctx) = create_test_context();
        let specs = [
            target("dist", "dist", "bundle.js").with_plugin(extract_plugin("styles", "main.css")),
            target("prototyping", "assets/style/generated", "bundle.js")
                .with_plugin(extract_plugin("styles", "main.css")),
        ];
        assert!(prepare(&ctx, &specs).is_ok());
    }

    #[test]
    fn test_sink_conflicts_with_bundle() {
        let (_temp, ctx) = create_test_context();
        let spec = target("dist", "dist", "main.css").with_plugin(extract_plugin("styles", "main.css"));

        let errors = prepare(&ctx, &[spec]).unwrap_err();
        assert!(matches!(&errors[0], ConfigurationError::ConflictingOutput { .. }));
    }

    #[test]
    fn test_extracting_rule_needs_sink() {
        let (_temp, ctx) = create_test_context();
        let spec = target("dist", "dist", "bundle.js").with_rule(css_rule().with_extract(ExtractMode::DefaultSink));

        let errors = prepare(&ctx, &[spec]).unwrap_err();
        assert!(matches!(&errors[0], ConfigurationError::MissingSink { sink: None, .. }));
    }

    #[test]
    fn test_extracting_rule_selects_sink() {
        let (_temp, ctx) = create_test_context();
        let spec = target("dist", "dist", "bundle.js")
            .with_rule(css_rule().with_extract(ExtractMode::Sink("vendor".to_string())))
            .with_plugin(extract_plugin("styles", "main.css"))
            .with_plugin(extract_plugin("vendor", "vendor.css"));

        let prepared = prepare(&ctx, &[spec]).unwrap();
        assert_eq!(prepared[0].rule_sinks, vec![Some(1)]);
    }

    #[test]
    fn test_missing_entry_root() {
        let (_temp, ctx) = create_test_context();
        let spec = BuildTargetSpec::new("dist", OutputLocation::new("dist", "[name].js"))
            .with_entry(EntryPoint::new("app", vec!["src/missing.js".to_string()]));

        let errors = prepare(&ctx, &[spec]).unwrap_err();
        assert!(matches!(&errors[0], ConfigurationError::MissingEntry { .. }));
    }

    #[test]
    fn test_entry_outside_source_root() {
        let (_temp, ctx) = create_test_context();
        let ctx = ctx.with_src(Path::new("style"));

        let errors = prepare(&ctx, &[target("dist", "dist", "bundle.js")]).unwrap_err();
        assert!(matches!(&errors[0], ConfigurationError::EntryOutsideSource { .. }));
    }

    #[test]
    fn test_template_missing_variable_is_configuration_error() {
        let (temp, ctx) = create_test_context();
        create_test_file(temp.path(), "src/index.html", "<title>{{ title }}</title>");
        let plugin = PluginDescriptor::Html(HtmlOptions {
            template: PathBuf::from("src/index.html"),
            filename: "index.html".to_string(),
            title: None,
            favicon: None,
            inject: true,
            vars: Default::default(),
        });

        let errors = prepare(&ctx, &[target("dist", "dist", "bundle.js").with_plugin(plugin)]).unwrap_err();
        assert!(matches!(
            &errors[0],
            ConfigurationError::Template { source: TemplateError::MissingVariable { .. }, .. }
        ));
    }

    #[test]
    fn test_template_rendered_and_injected() {
        let (temp, ctx) = create_test_context();
        create_test_file(temp.path(), "src/index.html", "<head><title>{{ title }}</title></head><body></body>");
        create_test_file(temp.path(), "src/favicon.png", "png");
        let plugin = PluginDescriptor::Html(HtmlOptions {
            template: PathBuf::from("src/index.html"),
            filename: "index.html".to_string(),
            title: Some("Family Tree".to_string()),
            favicon: Some(PathBuf::from("src/favicon.png")),
            inject: true,
            vars: Default::default(),
        });

        let prepared = prepare(&ctx, &[target("dist", "dist", "bundle.js").with_plugin(plugin)]).unwrap();
        let page = &prepared[0].pages[0];
        assert!(page.content.contains("<title>Family Tree</title>"));
        assert!(page.content.contains("src=\"bundle.js\""));
        assert!(page.content.contains("href=\"favicon.png\""));
        assert_eq!(prepared[0].copies[0].1, PathBuf::from("favicon.png"));
        assert_eq!(
            prepared[0].static_outputs(),
            vec![PathBuf::from("bundle.js"), PathBuf::from("index.html"), PathBuf::from("favicon.png")]
        );
    }

    #[test]
    fn test_missing_template_file() {
        let (_temp, ctx) = create_test_context();
        let plugin = PluginDescriptor::Html(HtmlOptions {
            template: PathBuf::from("src/nope.html"),
            filename: "index.html".to_string(),
            title: None,
            favicon: Some(PathBuf::from("src/nope.png")),
            inject: true,
            vars: Default::default(),
        });

        let errors = prepare(&ctx, &[target("dist", "dist", "bundle.js").with_plugin(plugin)]).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, ConfigurationError::MissingFile { .. })));
    }
}
