//! Built-in loaders.
//!
//! These cover the common stylesheet and static-asset cases so a project can
//! build without any external tool:
//! - `css-loader`: parse and reprint CSS, report local `url(...)` references
//!   and mark them for rewriting
//! - `style-loader`: wrap CSS into a script that injects a `<style>` element
//! - `file-loader`: emit the file and export its URL
//! - `url-loader`: inline small files as `data:` URLs, emit the rest
//! - `raw-loader`: export the file content as a string

use super::{
    check_known_options, option_bool, option_str, option_usize, url_placeholder, Capability,
    EmittedAsset, TransformInput, TransformOutput,
};
use crate::rules::LoaderOptions;
use base64::Engine;
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleSheet};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn url_reference() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| {
        Regex::new(r#"url\(\s*['"]?([^'")\s]+)['"]?\s*\)"#).expect("url() pattern is valid")
    })
}

fn as_utf8<'a>(input: &TransformInput<'a>) -> Result<&'a str, String> {
    std::str::from_utf8(input.content)
        .map_err(|e| format!("content is not valid UTF-8: {}", e))
}

fn js_string(value: &str) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| e.to_string())
}

/// Whether a `url()` target names a file inside the project.
fn is_local_reference(reference: &str) -> bool {
    !(reference.starts_with("data:")
        || reference.starts_with('#')
        || reference.starts_with('/')
        || reference.contains("://"))
}

/// Local `url(...)` references in order of appearance, without duplicates.
pub fn collect_url_references(css: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for capture in url_reference().captures_iter(css) {
        let reference = &capture[1];
        if is_local_reference(reference) && !found.iter().any(|f| f == reference) {
            found.push(reference.to_string());
        }
    }
    found
}

/// Replace every local `url(...)` reference with its placeholder.
pub fn mark_url_references(css: &str) -> String {
    url_reference()
        .replace_all(css, |caps: &regex::Captures<'_>| {
            if is_local_reference(&caps[1]) {
                format!("url(\"{}\")", url_placeholder(&caps[1]))
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// First 20 hex digits of the SHA-256 of `content`.
pub fn content_hash(content: &[u8]) -> String {
    Sha256::digest(content).iter().take(10).map(|b| format!("{:02x}", b)).collect()
}

/// Render an asset name template.
///
/// Placeholders: `[name]` (file stem), `[ext]` (extension without dot),
/// `[path]` (directory of the logical path with a trailing `/`, or empty) and
/// `[hash]` (see [`content_hash`]).
pub fn render_asset_name(template: &str, logical_path: &str, content: &[u8]) -> String {
    let clean = logical_path.split_once('?').map(|(p, _)| p).unwrap_or(logical_path);
    let path = Path::new(clean);
    let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    let dir = match path.parent().and_then(|p| p.to_str()) {
        Some(d) if !d.is_empty() => format!("{}/", d),
        _ => String::new(),
    };

    let mut rendered = template.replace("[name]", name).replace("[ext]", ext).replace("[path]", &dir);
    if rendered.contains("[hash]") {
        rendered = rendered.replace("[hash]", &content_hash(content));
    }
    rendered
}

fn mime_type(logical_path: &str) -> &'static str {
    let clean = logical_path.split_once('?').map(|(p, _)| p).unwrap_or(logical_path);
    match Path::new(clean).extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("woff") => "application/font-woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("eot") => "application/vnd.ms-fontobject",
        Some("css") => "text/css",
        Some("html") => "text/html",
        _ => "application/octet-stream",
    }
}

/// Parses and reprints stylesheets with lightningcss.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssLoader;

impl Capability for CssLoader {
    fn id(&self) -> &str {
        "css-loader"
    }

    fn check_options(&self, options: &LoaderOptions) -> Result<(), String> {
        check_known_options(options, &["minify", "url"])?;
        option_bool(options, "minify")?;
        option_bool(options, "url")?;
        Ok(())
    }

    fn apply(&self, input: &TransformInput<'_>) -> Result<TransformOutput, String> {
        let source = as_utf8(input)?;
        let minify = option_bool(input.options, "minify")?.unwrap_or(false);
        let follow_urls = option_bool(input.options, "url")?.unwrap_or(true);

        let sheet = StyleSheet::parse(
            source,
            ParserOptions { filename: input.logical_path.to_string(), ..ParserOptions::default() },
        )
        .map_err(|e| e.to_string())?;
        let printed = sheet
            .to_css(PrinterOptions { minify, ..PrinterOptions::default() })
            .map_err(|e| e.to_string())?;

        if !follow_urls {
            return Ok(TransformOutput::content(printed.code));
        }

        Ok(TransformOutput {
            dependencies: collect_url_references(&printed.code),
            content: mark_url_references(&printed.code).into_bytes(),
            ..Default::default()
        })
    }
}

/// Wraps CSS in a script that appends a `<style>` element to the document.
#[derive(Debug, Clone, Copy, Default)]
pub struct StyleLoader;

impl Capability for StyleLoader {
    fn id(&self) -> &str {
        "style-loader"
    }

    fn is_injector(&self) -> bool {
        true
    }

    fn check_options(&self, options: &LoaderOptions) -> Result<(), String> {
        check_known_options(options, &[])
    }

    fn apply(&self, input: &TransformInput<'_>) -> Result<TransformOutput, String> {
        let css = js_string(as_utf8(input)?)?;
        let script = format!(
            "(function () {{\n  var style = document.createElement('style');\n  style.textContent = {};\n  document.head.appendChild(style);\n}})();\n",
            css
        );
        Ok(TransformOutput::content(script))
    }
}

/// Emits the file into the output directory and exports its URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl FileLoader {
    const OPTIONS: &'static [&'static str] = &["name", "outputPath"];

    fn check(options: &LoaderOptions) -> Result<(), String> {
        option_str(options, "name")?;
        option_str(options, "outputPath")?;
        Ok(())
    }

    fn emit(input: &TransformInput<'_>) -> Result<TransformOutput, String> {
        let template = option_str(input.options, "name")?.unwrap_or("[hash].[ext]");
        let file_name = render_asset_name(template, input.logical_path, input.content);
        let path = match option_str(input.options, "outputPath")? {
            Some(dir) => PathBuf::from(dir).join(&file_name),
            None => PathBuf::from(&file_name),
        };

        let url = path.to_string_lossy().replace('\\', "/");
        Ok(TransformOutput {
            content: format!("module.exports = {};\n", js_string(&url)?).into_bytes(),
            emitted: vec![EmittedAsset { path, content: input.content.to_vec() }],
            dependencies: vec![],
            url: Some(url),
        })
    }
}

impl Capability for FileLoader {
    fn id(&self) -> &str {
        "file-loader"
    }

    fn check_options(&self, options: &LoaderOptions) -> Result<(), String> {
        check_known_options(options, Self::OPTIONS)?;
        Self::check(options)
    }

    fn apply(&self, input: &TransformInput<'_>) -> Result<TransformOutput, String> {
        Self::emit(input)
    }
}

/// Inlines files smaller than `limit` bytes as base64 `data:` URLs.
///
/// Without a `limit` every file is inlined. Larger files fall back to
/// `file-loader` behaviour and accept its options.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlLoader;

impl Capability for UrlLoader {
    fn id(&self) -> &str {
        "url-loader"
    }

    fn check_options(&self, options: &LoaderOptions) -> Result<(), String> {
        check_known_options(options, &["limit", "mimetype", "name", "outputPath"])?;
        option_usize(options, "limit")?;
        option_str(options, "mimetype")?;
        FileLoader::check(options)
    }

    fn apply(&self, input: &TransformInput<'_>) -> Result<TransformOutput, String> {
        if let Some(limit) = option_usize(input.options, "limit")? {
            if input.content.len() >= limit {
                return FileLoader::emit(input);
            }
        }

        let mime = match option_str(input.options, "mimetype")? {
            Some(m) => m,
            None => mime_type(input.logical_path),
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(input.content);
        let url = format!("data:{};base64,{}", mime, encoded);
        Ok(TransformOutput {
            content: format!("module.exports = {};\n", js_string(&url)?).into_bytes(),
            url: Some(url),
            ..Default::default()
        })
    }
}

/// Exports file content as a string literal.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawLoader;

impl Capability for RawLoader {
    fn id(&self) -> &str {
        "raw-loader"
    }

    fn check_options(&self, options: &LoaderOptions) -> Result<(), String> {
        check_known_options(options, &[])
    }

    fn apply(&self, input: &TransformInput<'_>) -> Result<TransformOutput, String> {
        let text = String::from_utf8_lossy(input.content);
        Ok(TransformOutput::content(format!("module.exports = {};\n", js_string(&text)?)))
    }
}
