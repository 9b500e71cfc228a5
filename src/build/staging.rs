//! Staged outputs.
//!
//! A target writes every output into a temporary directory next to its output
//! directory. Only a successful target promotes the staged files into place;
//! dropping the stage discards them.

use crate::build::normalize_path;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

/// Error while staging or promoting outputs.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("failed to write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Two different outputs for the same path
    #[error("output '{}' is produced twice with different content", .0.display())]
    Collision(PathBuf),
    /// Output path leaves the output directory
    #[error("output '{}' is outside the output directory", .0.display())]
    OutsideOutput(PathBuf),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StageError + '_ {
    move |source| StageError::Io { path: path.to_path_buf(), source }
}

/// Outputs of one target, staged until promotion.
#[derive(Debug)]
pub struct StagedOutputs {
    out_dir: PathBuf,
    staging: TempDir,
    written: BTreeMap<PathBuf, Vec<u8>>,
    order: Vec<PathBuf>,
}

impl StagedOutputs {
    /// Create a staging area for `out_dir`.
    pub fn new(out_dir: &Path) -> Result<Self, StageError> {
        let parent = out_dir.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(out_dir);
        fs::create_dir_all(parent).map_err(io_error(parent))?;
        let staging = tempfile::Builder::new()
            .prefix(".assetpipe-staging-")
            .tempdir_in(parent)
            .map_err(io_error(parent))?;

        Ok(Self { out_dir: out_dir.to_path_buf(), staging, written: BTreeMap::new(), order: Vec::new() })
    }

    fn checked(relative: &Path) -> Result<PathBuf, StageError> {
        let normalized = normalize_path(relative);
        let inside = normalized.components().next().is_some()
            && normalized.components().all(|c| matches!(c, Component::Normal(_)));
        if inside {
            Ok(normalized)
        } else {
            Err(StageError::OutsideOutput(relative.to_path_buf()))
        }
    }

    /// Stage a file at `relative` within the output directory.
    ///
    /// Writing identical content twice is a no-op; different content is a collision.
    pub fn write(&mut self, relative: &Path, content: &[u8]) -> Result<(), StageError> {
        let relative = Self::checked(relative)?;
        let digest = Sha256::digest(content).to_vec();

        if let Some(existing) = self.written.get(&relative) {
            return if *existing == digest { Ok(()) } else { Err(StageError::Collision(relative)) };
        }

        let staged = self.staging.path().join(&relative);
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        fs::write(&staged, content).map_err(io_error(&staged))?;

        self.written.insert(relative.clone(), digest);
        self.order.push(relative);
        Ok(())
    }

    /// Stage a copy of `source`.
    pub fn copy(&mut self, relative: &Path, source: &Path) -> Result<(), StageError> {
        let content = fs::read(source).map_err(io_error(source))?;
        self.write(relative, &content)
    }

    /// Whether a path has been staged.
    pub fn contains(&self, relative: &Path) -> bool {
        self.written.contains_key(&normalize_path(relative))
    }

    /// Staged paths, relative to the output directory, in write order.
    pub fn staged(&self) -> &[PathBuf] {
        &self.order
    }

    /// Move every staged file into the output directory.
    pub fn promote(self) -> Result<Vec<PathBuf>, StageError> {
        let mut outputs = Vec::with_capacity(self.order.len());
        for relative in &self.order {
            let from = self.staging.path().join(relative);
            let to = self.out_dir.join(relative);
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).map_err(io_error(parent))?;
            }
            fs::rename(&from, &to).map_err(io_error(&to))?;
            outputs.push(to);
        }
        Ok(outputs)
    }
}
