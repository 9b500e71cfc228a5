//! Plugin descriptors.
//!
//! A plugin is plain data: a kind plus parameters. [`apply`] turns a
//! descriptor into the [`PluginEffect`] it has on one target without touching
//! the filesystem; the effects are carried out by validation (templates are
//! rendered) and by the target build (sinks are filled and flushed).

use crate::build::{render_filename, AggregationPolicy, ExtractionSink, Metadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Parameters of an HTML generation plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HtmlOptions {
    /// Template file, relative to the project root
    pub template: PathBuf,
    /// Output filename within the target's output directory
    #[serde(default = "default_html_filename")]
    pub filename: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Icon file, relative to the project root; copied next to the page
    #[serde(default)]
    pub favicon: Option<PathBuf>,
    /// Insert script and icon tags into the rendered page
    #[serde(default = "default_inject")]
    pub inject: bool,
    /// Extra template variables
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,
}

fn default_html_filename() -> String {
    "index.html".to_string()
}

fn default_inject() -> bool {
    true
}

/// Parameters of an extraction plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractOptions {
    /// Sink name referenced by `extract = "<name>"`
    #[serde(default = "default_sink_name")]
    pub name: String,
    /// Output filename within the target's output directory
    pub filename: String,
    /// Prefix each chunk with a comment naming its source
    #[serde(default)]
    pub banner: bool,
}

fn default_sink_name() -> String {
    "styles".to_string()
}

/// A plugin: kind plus kind-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PluginDescriptor {
    Html(HtmlOptions),
    Extract(ExtractOptions),
}

impl PluginDescriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            PluginDescriptor::Html(_) => "html",
            PluginDescriptor::Extract(_) => "extract",
        }
    }
}

/// What a plugin needs to know about the target it is applied to.
#[derive(Debug, Clone, Copy)]
pub struct PluginContext<'a> {
    pub target: &'a str,
    pub project_root: &'a Path,
    /// Bundle filenames of the target, in entry order
    pub bundles: &'a [String],
}

/// A page to render for a target.
#[derive(Debug, Clone, PartialEq)]
pub struct HtmlPlan {
    /// Absolute template path
    pub template: PathBuf,
    /// Output path relative to the target's output directory
    pub output: PathBuf,
    pub metadata: Metadata,
    /// Absolute icon source and its output name
    pub favicon: Option<(PathBuf, String)>,
    pub inject: bool,
    pub bundles: Vec<String>,
}

/// The effect of one plugin on one target.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginEffect {
    Html(HtmlPlan),
    Sink(ExtractionSink),
}

/// Resolve a descriptor against a target. Performs no I/O.
pub fn apply(descriptor: &PluginDescriptor, ctx: &PluginContext<'_>) -> PluginEffect {
    match descriptor {
        PluginDescriptor::Html(options) => {
            let favicon = options.favicon.as_ref().map(|icon| {
                let name = icon
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "favicon.ico".to_string());
                (ctx.project_root.join(icon), name)
            });

            let mut metadata = Metadata::new();
            for (key, value) in &options.vars {
                metadata.insert(key, value.clone());
            }
            metadata.insert("vars", serde_json::json!(options.vars));
            if let Some(title) = &options.title {
                metadata.insert("title", title.clone());
            }
            if let Some((_, name)) = &favicon {
                metadata.insert("favicon", name.clone());
            }
            metadata.insert("target", ctx.target);
            metadata.insert("bundles", ctx.bundles.to_vec());

            PluginEffect::Html(HtmlPlan {
                template: ctx.project_root.join(&options.template),
                output: PathBuf::from(render_filename(&options.filename, ctx.target, "html")),
                metadata,
                favicon,
                inject: options.inject,
                bundles: ctx.bundles.to_vec(),
            })
        }
        PluginDescriptor::Extract(options) => {
            let policy =
                if options.banner { AggregationPolicy::Bannered } else { AggregationPolicy::Concatenate };
            PluginEffect::Sink(ExtractionSink::new(
                ctx.target,
                &options.name,
                render_filename(&options.filename, &options.name, "css"),
                policy,
            ))
        }
    }
}
