//! Extraction sinks.
//!
//! Content of extracting rules is diverted from the entry bundle into a sink
//! owned by the target. The coordinator is the only writer of its sinks;
//! chunks are kept in the order they are appended and written out once, by
//! [`ExtractionCoordinator::finish`].

use crate::build::ConfigurationError;
use crate::rules::ExtractMode;
use std::collections::HashSet;

/// How chunks from several files are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationPolicy {
    /// Chunks back to back, newline-separated
    #[default]
    Concatenate,
    /// Each chunk preceded by a `/* <logical path> */` line
    Bannered,
}

/// An extraction output declared by a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSink {
    /// Owning target
    pub target_name: String,
    /// Name referenced by extracting rules
    pub name: String,
    /// Output filename within the target's output directory
    pub output_filename: String,
    pub policy: AggregationPolicy,
}

impl ExtractionSink {
    pub fn new(
        target_name: &str,
        name: &str,
        output_filename: impl Into<String>,
        policy: AggregationPolicy,
    ) -> Self {
        Self {
            target_name: target_name.to_string(),
            name: name.to_string(),
            output_filename: output_filename.into(),
            policy,
        }
    }
}

#[derive(Debug)]
struct SinkBuffer {
    sink: ExtractionSink,
    seen: HashSet<String>,
    chunks: Vec<(String, Vec<u8>)>,
}

/// A flushed sink: output filename and aggregated content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushedSink {
    pub output_filename: String,
    pub content: Vec<u8>,
}

/// Owns the sink buffers of one target build.
#[derive(Debug)]
pub struct ExtractionCoordinator {
    buffers: Vec<SinkBuffer>,
}

impl ExtractionCoordinator {
    /// Create empty buffers for the given sinks.
    pub fn new(sinks: Vec<ExtractionSink>) -> Self {
        let buffers = sinks
            .into_iter()
            .map(|sink| SinkBuffer { sink, seen: HashSet::new(), chunks: Vec::new() })
            .collect();
        Self { buffers }
    }

    /// Pick the sink for an extraction mode.
    ///
    /// `Inline` selects nothing. `DefaultSink` needs exactly one declared sink;
    /// `Sink(name)` needs a sink of that name.
    pub fn select(
        target: &str,
        sinks: &[ExtractionSink],
        mode: &ExtractMode,
    ) -> Result<Option<usize>, ConfigurationError> {
        match mode {
            ExtractMode::Inline => Ok(None),
            ExtractMode::DefaultSink => match sinks {
                [] => Err(ConfigurationError::MissingSink {
                    target: target.to_string(),
                    sink: None,
                }),
                [_] => Ok(Some(0)),
                _ => Err(ConfigurationError::AmbiguousSink {
                    target: target.to_string(),
                    sinks: sinks.iter().map(|s| s.name.clone()).collect(),
                }),
            },
            ExtractMode::Sink(name) => sinks
                .iter()
                .position(|s| &s.name == name)
                .map(Some)
                .ok_or_else(|| ConfigurationError::MissingSink {
                    target: target.to_string(),
                    sink: Some(name.clone()),
                }),
        }
    }

    /// Append a file's content to a sink.
    ///
    /// A file already appended to the same sink is ignored; returns whether
    /// the chunk was added.
    pub fn append(&mut self, sink: usize, logical_path: &str, content: Vec<u8>) -> bool {
        let Some(buffer) = self.buffers.get_mut(sink) else {
            return false;
        };
        if !buffer.seen.insert(logical_path.to_string()) {
            return false;
        }
        buffer.chunks.push((logical_path.to_string(), content));
        true
    }

    /// Paths appended so far, per sink, in append order.
    pub fn appended(&self, sink: usize) -> Vec<&str> {
        self.buffers
            .get(sink)
            .map(|b| b.chunks.iter().map(|(p, _)| p.as_str()).collect())
            .unwrap_or_default()
    }

    /// Aggregate every sink. Consumes the coordinator, so each sink is flushed once.
    pub fn finish(self) -> Vec<FlushedSink> {
        self.buffers
            .into_iter()
            .map(|buffer| FlushedSink {
                output_filename: buffer.sink.output_filename,
                content: aggregate(buffer.sink.policy, &buffer.chunks),
            })
            .collect()
    }
}

fn aggregate(policy: AggregationPolicy, chunks: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (path, content) in chunks {
        if policy == AggregationPolicy::Bannered {
            out.extend_from_slice(format!("/* {} */\n", path).as_bytes());
        }
        out.extend_from_slice(content);
        if !content.ends_with(b"\n") {
            out.push(b'\n');
        }
    }
    out
}
