//! Trim Job State Machine.
//!
//! At most one trim per source path runs at a time. A job moves
//! `Idle → Running → Succeeded | Failed → Idle`; the running entry is removed
//! by a drop guard so the path returns to idle even if the trim panics.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rc_core::events::{EventBus, EventPayload};
use rc_core::{Error, Result, TrimJobId};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::collaborators::{PlaybackSurface, ProjectStore};
use crate::request::TrimRequest;
use crate::trimmer::{TrimOutcome, Trimmer};

/// Lifecycle state of the trim job for one source path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A trim job that is currently running.
#[derive(Debug, Clone, Serialize)]
pub struct TrimJob {
    pub id: TrimJobId,
    pub request: TrimRequest,
    pub state: JobState,
    pub started_at: DateTime<Utc>,
}

/// Removes the running entry for a path when dropped.
struct RunningGuard {
    running: Arc<DashMap<PathBuf, TrimJob>>,
    key: PathBuf,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.remove(&self.key);
    }
}

/// Coordinates trim jobs across source paths.
#[derive(Clone)]
pub struct TrimJobs {
    trimmer: Arc<Trimmer>,
    playback: Arc<dyn PlaybackSurface>,
    store: Arc<dyn ProjectStore>,
    events: Arc<EventBus>,
    running: Arc<DashMap<PathBuf, TrimJob>>,
    last_outcomes: Arc<DashMap<PathBuf, JobState>>,
}

impl TrimJobs {
    pub fn new(
        trimmer: Arc<Trimmer>,
        playback: Arc<dyn PlaybackSurface>,
        store: Arc<dyn ProjectStore>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            trimmer,
            playback,
            store,
            events,
            running: Arc::new(DashMap::new()),
            last_outcomes: Arc::new(DashMap::new()),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Start a trim on a blocking worker.
    ///
    /// Refused with [`Error::InvalidRange`] before any I/O when the window is
    /// malformed, and with [`Error::AlreadyRunning`] when a trim of the same
    /// source is in progress. Must be called from within a Tokio runtime.
    pub fn submit(&self, request: TrimRequest) -> Result<JoinHandle<Result<TrimOutcome>>> {
        if let Err(e) = request.validate(self.trimmer.min_window_us()) {
            self.reject(&request.source, &e);
            return Err(e);
        }

        let key = self.job_key(&request.source);
        let job = TrimJob {
            id: TrimJobId::new(),
            request: request.clone(),
            state: JobState::Running,
            started_at: Utc::now(),
        };
        let job_id = job.id;

        match self.running.entry(key.clone()) {
            Entry::Occupied(e) => {
                let running_id = e.get().id;
                drop(e);
                let err = Error::AlreadyRunning {
                    path: request.source.clone(),
                };
                tracing::info!(
                    path = %request.source.display(),
                    running_job = %running_id,
                    "Trim refused; another trim of this file is running"
                );
                self.reject(&request.source, &err);
                return Err(err);
            }
            Entry::Vacant(e) => {
                e.insert(job);
            }
        }
        let guard = RunningGuard {
            running: Arc::clone(&self.running),
            key: key.clone(),
        };

        self.playback.pause(&request.source);
        self.events.broadcast(EventPayload::TrimStarted {
            job_id,
            path: request.source.clone(),
            start_us: request.start_us,
            end_us: request.end_us,
        });
        tracing::info!(
            job_id = %job_id,
            path = %request.source.display(),
            start_us = request.start_us,
            end_us = request.end_us,
            "Trim started"
        );

        let jobs = self.clone();
        Ok(tokio::spawn(async move {
            let trimmer = Arc::clone(&jobs.trimmer);
            let blocking_request = request.clone();
            let result = tokio::task::spawn_blocking(move || trimmer.trim(&blocking_request))
                .await
                .map_err(|e| Error::Internal(format!("trim worker join error: {e}")))
                .and_then(|r| r);

            // The job is over once the file is settled; reload and listeners
            // must already see it as idle.
            let state = if result.is_ok() {
                JobState::Succeeded
            } else {
                JobState::Failed
            };
            jobs.last_outcomes.insert(key, state);
            drop(guard);

            match &result {
                Ok(outcome) => jobs.on_success(job_id, &request, outcome).await,
                Err(e) => jobs.on_failure(job_id, &request, e),
            }
            result
        }))
    }

    async fn on_success(&self, job_id: TrimJobId, request: &TrimRequest, outcome: &TrimOutcome) {
        self.playback.reload(&outcome.path);
        if let Err(e) = self
            .store
            .persist_trim(request.project.as_ref(), &outcome.path, outcome.duration_us)
            .await
        {
            // The file on disk is already trimmed; the record catches up on
            // the next save.
            tracing::warn!(
                job_id = %job_id,
                path = %outcome.path.display(),
                error = %e,
                "Failed to persist trimmed project"
            );
        }
        self.events.broadcast(EventPayload::TrimCompleted {
            job_id,
            path: outcome.path.clone(),
            duration_us: outcome.duration_us,
        });
    }

    fn on_failure(&self, job_id: TrimJobId, request: &TrimRequest, error: &Error) {
        if error.original_intact() {
            tracing::warn!(
                job_id = %job_id,
                path = %request.source.display(),
                error = %error,
                "Trim failed"
            );
        } else {
            tracing::error!(
                job_id = %job_id,
                path = %request.source.display(),
                error = %error,
                "Trim failed and the original is not at its path"
            );
        }
        self.events.broadcast(EventPayload::TrimFailed {
            job_id,
            path: request.source.clone(),
            error: error.to_string(),
            data_at_risk: !error.original_intact(),
        });
    }

    fn reject(&self, path: &Path, error: &Error) {
        self.events.broadcast(EventPayload::TrimRejected {
            path: path.to_path_buf(),
            reason: error.to_string(),
        });
    }

    /// Key under which a source path is tracked: the canonical path when it
    /// resolves, the path as given otherwise.
    fn job_key(&self, path: &Path) -> PathBuf {
        self.trimmer
            .fs()
            .canonicalize(path)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    /// `Running` while a trim of `path` is in progress, `Idle` otherwise.
    pub fn state(&self, path: &Path) -> JobState {
        if self.running.contains_key(&self.job_key(path)) {
            JobState::Running
        } else {
            JobState::Idle
        }
    }

    /// Terminal state of the most recent finished trim of `path`.
    pub fn last_outcome(&self, path: &Path) -> Option<JobState> {
        self.last_outcomes
            .get(&self.job_key(path))
            .map(|entry| *entry.value())
    }

    /// Snapshot of the running jobs.
    pub fn running(&self) -> Vec<TrimJob> {
        self.running.iter().map(|entry| entry.value().clone()).collect()
    }
}
