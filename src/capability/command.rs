//! Capabilities backed by an external process.
//!
//! Content is written to the process's stdin and the transformed content is
//! read back from stdout. `{path}` and `{dir}` in arguments are replaced with
//! the absolute path of the file and its directory; step options are passed as
//! `ASSETPIPE_OPT_<KEY>` environment variables.

use super::{check_known_options, Capability, TransformInput, TransformOutput};
use crate::config::CapabilityConfig;
use crate::rules::LoaderOptions;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Prefix of the environment variables carrying step options.
pub const OPTION_ENV_PREFIX: &str = "ASSETPIPE_OPT_";

/// How often a running command checks its cancel flag.
const CANCEL_POLL: Duration = Duration::from_millis(10);

fn drain(source: Option<impl Read + Send + 'static>) -> JoinHandle<std::io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut source) = source {
            source.read_to_end(&mut buffer)?;
        }
        Ok(buffer)
    })
}

fn join_output(handle: JoinHandle<std::io::Result<Vec<u8>>>, stream: &str) -> Result<Vec<u8>, String> {
    handle
        .join()
        .map_err(|_| format!("{} reader panicked", stream))?
        .map_err(|e| format!("failed to read {}: {}", stream, e))
}

/// A transform that runs a command per file.
#[derive(Debug, Clone)]
pub struct CommandCapability {
    id: String,
    program: String,
    args: Vec<String>,
    options: Vec<String>,
    injector: bool,
}

impl CommandCapability {
    pub fn new(id: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            program: program.into(),
            args: Vec::new(),
            options: Vec::new(),
            injector: false,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_options(mut self, options: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_injector(mut self, injector: bool) -> Self {
        self.injector = injector;
        self
    }

    pub fn from_config(id: &str, config: &CapabilityConfig) -> Result<Self, String> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| "'command' must name a program".to_string())?;
        if program.is_empty() {
            return Err("'command' must name a program".to_string());
        }

        Ok(Self::new(id, program.clone())
            .with_args(args.iter().cloned())
            .with_options(config.options.iter().cloned())
            .with_injector(config.injector))
    }

    fn expand_args(&self, file: &Path) -> Vec<String> {
        let path = file.to_string_lossy();
        let dir = file.parent().map(|d| d.to_string_lossy().into_owned()).unwrap_or_default();
        self.args.iter().map(|arg| arg.replace("{path}", &path).replace("{dir}", &dir)).collect()
    }
}

/// Environment variable name for an option key.
pub fn option_env_name(key: &str) -> String {
    let key: String =
        key.chars().map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' }).collect();
    format!("{}{}", OPTION_ENV_PREFIX, key)
}

impl Capability for CommandCapability {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_injector(&self) -> bool {
        self.injector
    }

    fn check_options(&self, options: &LoaderOptions) -> Result<(), String> {
        let known: Vec<&str> = self.options.iter().map(String::as_str).collect();
        check_known_options(options, &known)
    }

    fn apply(&self, input: &TransformInput<'_>) -> Result<TransformOutput, String> {
        let mut command = Command::new(&self.program);
        command
            .args(self.expand_args(input.file))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = input.file.parent().filter(|d| d.is_dir()) {
            command.current_dir(dir);
        }
        for (key, value) in input.options {
            command.env(option_env_name(key), value.to_string());
        }

        let mut child =
            command.spawn().map_err(|e| format!("failed to start '{}': {}", self.program, e))?;

        // Pipes are served from their own threads so a chatty child cannot deadlock.
        let stdin = child.stdin.take();
        let content = input.content.to_vec();
        let writer = thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&content)?;
            }
            Ok(())
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait(&mut child, input)?;
        let written = writer.join().map_err(|_| "stdin writer panicked".to_string())?;
        let stdout = join_output(stdout, "stdout")?;
        let stderr = join_output(stderr, "stderr")?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
            return Err(match status.code() {
                Some(code) if stderr.is_empty() => format!("exited with status {}", code),
                Some(code) => format!("exited with status {}: {}", code, stderr),
                None if stderr.is_empty() => "terminated by signal".to_string(),
                None => format!("terminated by signal: {}", stderr),
            });
        }
        // A filter may exit before reading everything; only a failed exit counts.
        if let Err(e) = written {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(format!("failed to write input: {}", e));
            }
        }

        Ok(TransformOutput::content(stdout))
    }
}

impl CommandCapability {
    /// Wait for the child, killing it once the input is cancelled.
    fn wait(&self, child: &mut Child, input: &TransformInput<'_>) -> Result<std::process::ExitStatus, String> {
        loop {
            if let Some(status) =
                child.try_wait().map_err(|e| format!("failed to run '{}': {}", self.program, e))?
            {
                return Ok(status);
            }
            if input.is_cancelled() {
                // The child may have exited since try_wait; either way it is reaped below.
                let _ = child.kill();
                let _ = child.wait();
                return Err("cancelled".to_string());
            }
            thread::sleep(CANCEL_POLL);
        }
    }
}
