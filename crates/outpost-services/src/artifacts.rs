//! Artifact persistence for round-tripped predictions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bytes::Bytes;

/// Writes each correlated artifact under `<dir>/<uid>`.
#[derive(Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// The directory is created eagerly so save failures surface at startup
    /// rather than on the first event.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create artifact dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn save(&self, uid: &str, artifact: &Bytes) -> Result<PathBuf> {
        let path = self.dir.join(uid);
        std::fs::write(&path, artifact)
            .with_context(|| format!("failed to write artifact {}", path.display()))?;
        Ok(path)
    }

    pub fn path_for(&self, uid: &str) -> PathBuf {
        self.dir.join(uid)
    }
}
