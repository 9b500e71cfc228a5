//! Single-target build.
//!
//! Each entry is traversed in waves starting from its roots. Files of one
//! wave are transformed in parallel; dependencies reported by transforms form
//! the next wave. Once an entry is fully traversed its modules are consumed in
//! first-encounter order, which fixes their order in bundles and sinks.
//!
//! Capabilities mark dependency URLs with [`url_placeholder`]. When a module
//! is consumed each placeholder is replaced by the URL its dependency is
//! served from, relative to the file the module ends up in.

use crate::build::{
    file_for, relative_url, resolve_request, split_query, BuildContext, BuildWarning,
    ExtractionCoordinator, PreparedTarget, StageError, StagedOutputs,
};
use crate::capability::{url_placeholder, EmittedAsset, TransformError, TransformInput};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

/// Failure of one target. Never affects other targets.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{importer}' requests '{request}', which {reason}")]
    MissingModule { importer: String, request: String, reason: &'static str },

    #[error(transparent)]
    Output(#[from] StageError),

    #[error("build cancelled")]
    Cancelled,
}

/// How a module's content is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Inlined into the entry bundle
    Inline,
    /// Appended to the sink with this index
    Extract(usize),
    /// No rule matched; copied verbatim
    Raw,
}

/// A transformed module.
#[derive(Debug, Clone)]
pub struct ProcessedModule {
    pub logical_path: String,
    pub disposition: Disposition,
    pub content: Vec<u8>,
    pub emitted: Vec<EmittedAsset>,
    /// Logical paths of followed dependencies, in report order
    pub dependencies: Vec<String>,
    /// Reported requests and the logical path each resolved to (`None` when not followed)
    pub references: Vec<(String, Option<String>)>,
    /// Output-relative URL other modules reference this one by
    pub url: Option<String>,
}

impl ProcessedModule {
    /// Content with every dependency placeholder replaced.
    ///
    /// `base_dir` is the output-relative directory of the file the content is
    /// written into. Requests whose module has no URL are restored verbatim.
    pub fn linked_content(&self, modules: &HashMap<String, ProcessedModule>, base_dir: &str) -> Vec<u8> {
        let mut content = self.content.clone();
        for (request, resolved) in &self.references {
            let url = resolved
                .as_ref()
                .and_then(|logical| modules.get(logical))
                .and_then(|module| module.url.as_deref())
                .map(|url| relative_url(base_dir, url))
                .unwrap_or_else(|| request.clone());
            content = replace_bytes(&content, url_placeholder(request).as_bytes(), url.as_bytes());
        }
        content
    }
}

fn replace_bytes(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    if needle.is_empty() {
        return haystack.to_vec();
    }
    let mut out = Vec::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some(at) = rest.windows(needle.len()).position(|w| w == needle) {
        out.extend_from_slice(&rest[..at]);
        out.extend_from_slice(replacement);
        rest = &rest[at + needle.len()..];
    }
    out.extend_from_slice(rest);
    out
}

/// Output-relative directory of an output file name.
fn parent_dir(output_filename: &str) -> &str {
    output_filename.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Successful target build.
#[derive(Debug, Clone, Default)]
pub struct TargetOutcome {
    pub outputs: Vec<PathBuf>,
    pub warnings: Vec<BuildWarning>,
}

/// Builds one prepared target.
pub struct TargetBuild<'a> {
    ctx: &'a BuildContext,
    target: &'a PreparedTarget,
    abort: &'a AtomicBool,
}

impl<'a> TargetBuild<'a> {
    pub fn new(ctx: &'a BuildContext, target: &'a PreparedTarget, abort: &'a AtomicBool) -> Self {
        Self { ctx, target, abort }
    }

    /// Run the build and promote its outputs.
    ///
    /// On error nothing is written to the output directory.
    pub fn run(&self) -> Result<TargetOutcome, TargetError> {
        let mut stage = StagedOutputs::new(&self.target.output_dir)?;
        let mut coordinator = ExtractionCoordinator::new(self.target.sinks.clone());
        let mut cache: HashMap<String, ProcessedModule> = HashMap::new();
        let mut emitted_by: HashSet<String> = HashSet::new();
        let mut warnings = Vec::new();

        for entry in &self.target.entries {
            let order = self.traverse(&entry.roots, &mut cache)?;
            let roots: HashSet<&str> = entry.roots.iter().map(String::as_str).collect();
            let mut bundle: Vec<u8> = Vec::new();

            for logical in &order {
                let Some(module) = cache.get(logical) else { continue };

                match module.disposition {
                    // Modules referenced by URL are served from that URL, not the bundle.
                    Disposition::Inline if module.url.is_some() && !roots.contains(logical.as_str()) => {}
                    Disposition::Inline => {
                        let content = module.linked_content(&cache, "");
                        bundle.extend_from_slice(format!("/* {} */\n", logical).as_bytes());
                        bundle.extend_from_slice(&content);
                        if !content.ends_with(b"\n") {
                            bundle.push(b'\n');
                        }
                    }
                    Disposition::Extract(sink) => {
                        let base = self.target.sinks.get(sink).map_or("", |s| parent_dir(&s.output_filename));
                        coordinator.append(sink, logical, module.linked_content(&cache, base));
                    }
                    Disposition::Raw => {
                        let (path, _) = split_query(logical);
                        if !stage.contains(Path::new(path)) {
                            warn!(target_name = %self.target.name(), "no rule matched '{}', copying as-is", path);
                            warnings.push(BuildWarning::UnmatchedFile { path: path.to_string() });
                        }
                        stage.write(Path::new(path), &module.content)?;
                    }
                }

                if emitted_by.insert(logical.clone()) {
                    for asset in &module.emitted {
                        stage.write(&asset.path, &asset.content)?;
                    }
                }
            }

            stage.write(Path::new(&entry.bundle), &bundle)?;
        }

        for flushed in coordinator.finish() {
            stage.write(Path::new(&flushed.output_filename), &flushed.content)?;
        }
        for page in &self.target.pages {
            stage.write(&page.output, page.content.as_bytes())?;
        }
        for (source, destination) in &self.target.copies {
            stage.copy(destination, source)?;
        }

        if self.abort.load(Ordering::SeqCst) {
            return Err(TargetError::Cancelled);
        }

        let outputs = stage.promote()?;
        Ok(TargetOutcome { outputs, warnings })
    }

    /// Transform everything reachable from `roots`, wave by wave.
    ///
    /// Returns the reached modules in first-encounter order.
    fn traverse(
        &self,
        roots: &[String],
        cache: &mut HashMap<String, ProcessedModule>,
    ) -> Result<Vec<String>, TargetError> {
        let mut order: Vec<String> = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut wave: Vec<String> = roots.iter().filter(|r| visited.insert((*r).clone())).cloned().collect();

        while !wave.is_empty() {
            self.process_wave(&wave, cache)?;

            let mut next = Vec::new();
            for logical in &wave {
                let Some(module) = cache.get(logical) else { continue };
                for dep in &module.dependencies {
                    if visited.insert(dep.clone()) {
                        next.push(dep.clone());
                    }
                }
            }
            order.append(&mut wave);
            wave = next;
        }
        Ok(order)
    }

    /// Transform every not-yet-seen module of a wave, in parallel.
    fn process_wave(
        &self,
        wave: &[String],
        cache: &mut HashMap<String, ProcessedModule>,
    ) -> Result<(), TargetError> {
        if self.abort.load(Ordering::SeqCst) {
            return Err(TargetError::Cancelled);
        }

        let pending: Vec<&String> = wave.iter().filter(|l| !cache.contains_key(*l)).collect();
        let results: Vec<Result<ProcessedModule, TargetError>> =
            pending.par_iter().map(|logical| self.process_module(logical)).collect();

        let mut first_error = None;
        for result in results {
            match result {
                Ok(module) => {
                    cache.insert(module.logical_path.clone(), module);
                }
                Err(TargetError::Cancelled) => {
                    first_error.get_or_insert(TargetError::Cancelled);
                }
                Err(e) => {
                    // a real failure outranks cancellations it caused
                    if matches!(first_error, None | Some(TargetError::Cancelled)) {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn fail(&self, error: TargetError) -> TargetError {
        self.abort.store(true, Ordering::SeqCst);
        error
    }

    /// Route one module through its rule's chain.
    fn process_module(&self, logical: &str) -> Result<ProcessedModule, TargetError> {
        let spec = &self.target.spec;
        let file = file_for(self.ctx.src_dir(), logical);
        let original = fs::read(&file)
            .map_err(|source| self.fail(TargetError::Io { path: file.clone(), source }))?;

        let Some((index, rule)) = spec.module_rules.resolve_indexed(logical) else {
            debug!(target_name = %spec.name, "{} -> raw copy", logical);
            let (path, _) = split_query(logical);
            return Ok(ProcessedModule {
                logical_path: logical.to_string(),
                disposition: Disposition::Raw,
                content: original,
                emitted: vec![],
                dependencies: vec![],
                references: vec![],
                url: Some(path.to_string()),
            });
        };

        let sink = self.target.rule_sinks.get(index).copied().flatten();
        debug!(target_name = %spec.name, "{} -> rule {} {}", logical, index, rule.chain);

        let mut content = original;
        let mut emitted = Vec::new();
        let mut requests: Vec<String> = Vec::new();
        let mut url = None;

        for step in rule.chain.execution_order() {
            if self.abort.load(Ordering::SeqCst) {
                return Err(TargetError::Cancelled);
            }

            let capability = self.ctx.registry().get(&step.identifier).ok_or_else(|| {
                self.fail(TransformError::new(&step.identifier, logical, "capability is not registered").into())
            })?;
            if sink.is_some() && capability.is_injector() {
                continue;
            }

            let input = TransformInput::new(logical, &file, &content, &step.options).with_cancel(self.abort);
            let output = capability.apply(&input).map_err(|message| {
                // a step stopped by another module's failure is not a failure of its own
                if self.abort.load(Ordering::SeqCst) {
                    TargetError::Cancelled
                } else {
                    self.fail(TransformError::new(&step.identifier, logical, message).into())
                }
            })?;

            content = output.content;
            emitted.extend(output.emitted);
            for request in output.dependencies {
                if !requests.contains(&request) {
                    requests.push(request);
                }
            }
            url = output.url.or(url);
        }

        let references: Vec<(String, Option<String>)> = if spec.is_opaque(logical, Some(rule)) {
            requests.into_iter().map(|request| (request, None)).collect()
        } else {
            self.resolve_dependencies(logical, requests)?
        };
        let mut dependencies: Vec<String> = Vec::new();
        for dep in references.iter().filter_map(|(_, resolved)| resolved.as_ref()) {
            if !dependencies.contains(dep) {
                dependencies.push(dep.clone());
            }
        }

        Ok(ProcessedModule {
            logical_path: logical.to_string(),
            disposition: match sink {
                Some(s) => Disposition::Extract(s),
                None => Disposition::Inline,
            },
            content,
            emitted,
            dependencies,
            references,
            url,
        })
    }

    /// Resolve each request to the logical path of an existing file.
    fn resolve_dependencies(
        &self,
        importer: &str,
        requests: Vec<String>,
    ) -> Result<Vec<(String, Option<String>)>, TargetError> {
        let mut resolved = Vec::with_capacity(requests.len());
        for request in requests {
            let missing = |reason| {
                self.fail(TargetError::MissingModule {
                    importer: importer.to_string(),
                    request: request.clone(),
                    reason,
                })
            };

            let logical = resolve_request(importer, &request).ok_or_else(|| missing("is outside the source root"))?;
            if !file_for(self.ctx.src_dir(), &logical).is_file() {
                return Err(missing("does not exist"));
            }
            resolved.push((request, Some(logical)));
        }
        Ok(resolved)
    }
}
