//! Auxiliary page generation.
//!
//! [`OutputBinder`] renders a template with target metadata. Rendering is
//! strict: a variable the template uses but the metadata lacks is an error,
//! while metadata the template ignores is fine.

use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Template rendering error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// The template uses a variable that was not supplied
    #[error("template '{template}' uses an undefined variable: {message}")]
    MissingVariable { template: String, message: String },
    /// Syntax or evaluation error
    #[error("template '{template}' failed to render: {message}")]
    Render { template: String, message: String },
}

/// Values available to a template.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, serde_json::Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

/// A rendered page owned by a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundArtifact {
    pub target: String,
    pub content: String,
}

/// Renders templates with target metadata.
pub struct OutputBinder {
    env: Environment<'static>,
}

impl Default for OutputBinder {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBinder {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    /// Render `template_source` for `target`.
    ///
    /// `template_name` is only used in error messages.
    pub fn bind(
        &self,
        target: &str,
        template_name: &str,
        template_source: &str,
        metadata: &Metadata,
    ) -> Result<BoundArtifact, TemplateError> {
        let content = self.env.render_str(template_source, metadata).map_err(|e| {
            let message = e.to_string();
            if e.kind() == ErrorKind::UndefinedError {
                TemplateError::MissingVariable { template: template_name.to_string(), message }
            } else {
                TemplateError::Render { template: template_name.to_string(), message }
            }
        })?;

        Ok(BoundArtifact { target: target.to_string(), content })
    }
}

/// Insert an icon link before `</head>` and script tags before `</body>`.
///
/// Tags go at the end of the document when the closing tag is absent.
pub fn inject_tags(html: &str, bundles: &[String], favicon: Option<&str>) -> String {
    let mut page = html.to_string();

    if let Some(icon) = favicon {
        let link = format!("<link rel=\"icon\" href=\"{}\">\n", icon);
        insert_before(&mut page, "</head>", &link);
    }

    let scripts: String = bundles
        .iter()
        .map(|b| format!("<script type=\"text/javascript\" src=\"{}\"></script>\n", b))
        .collect();
    if !scripts.is_empty() {
        insert_before(&mut page, "</body>", &scripts);
    }

    page
}

fn insert_before(page: &mut String, marker: &str, tag: &str) {
    match page.rfind(marker) {
        Some(at) => page.insert_str(at, tag),
        None => page.push_str(tag),
    }
}
