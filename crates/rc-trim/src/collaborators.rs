//! External collaborators notified around a trim.

use std::path::Path;

use async_trait::async_trait;
use rc_core::{ProjectKey, Result};

/// The player showing the source file.
pub trait PlaybackSurface: Send + Sync {
    /// Stop playback of `path` before it is replaced.
    fn pause(&self, path: &Path);

    /// Load `path` again after it was replaced.
    fn reload(&self, path: &Path);
}

/// Hosted document store holding project metadata.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Record the confirmed file path and its new duration.
    async fn persist_trim(
        &self,
        project: Option<&ProjectKey>,
        path: &Path,
        duration_us: u64,
    ) -> Result<()>;
}

/// Playback surface for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPlayback;

impl PlaybackSurface for NoPlayback {
    fn pause(&self, _path: &Path) {}
    fn reload(&self, _path: &Path) {}
}

/// Project store that records nothing; used when no project is open.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProjectStore;

#[async_trait]
impl ProjectStore for NoProjectStore {
    async fn persist_trim(
        &self,
        project: Option<&ProjectKey>,
        path: &Path,
        duration_us: u64,
    ) -> Result<()> {
        tracing::debug!(
            project = ?project.map(ToString::to_string),
            path = %path.display(),
            duration_us,
            "No project store configured; skipping persist"
        );
        Ok(())
    }
}
