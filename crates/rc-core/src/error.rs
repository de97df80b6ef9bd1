//! Unified error type for the trim engine.
//!
//! All crates funnel their failures into [`Error`]. Each variant carries
//! enough context for the caller to report it, and [`Error::severity`] tells
//! the caller whether user data may be at risk.

use std::fmt;
use std::path::PathBuf;

/// Which rename of the swap sequence failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStage {
    /// Moving the original aside to its backup path.
    Backup,
    /// Moving the trimmed output onto the original path.
    Promote,
}

impl fmt::Display for SwapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backup => write!(f, "backup"),
            Self::Promote => write!(f, "promote"),
        }
    }
}

/// How bad a failure is from the user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// The request was refused before any work started.
    Rejected,
    /// The trim failed; the original file is untouched.
    Failed,
    /// The original file is not at its path; manual recovery may be needed.
    DataAtRisk,
}

/// Unified error type covering all failure modes of a trim.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested window is malformed. No I/O was attempted.
    #[error("Invalid trim range [{start_us}, {end_us}) us: {reason}")]
    InvalidRange {
        /// Requested start in microseconds.
        start_us: u64,
        /// Requested end in microseconds.
        end_us: u64,
        /// Why the range was refused.
        reason: String,
    },

    /// The source is missing, empty, or not a recognised container.
    #[error("Cannot open container {}: {reason}", .path.display())]
    ContainerOpen {
        /// Path that was opened.
        path: PathBuf,
        /// Human-readable error description.
        reason: String,
    },

    /// The source has no video track.
    #[error("No video track in {}", .path.display())]
    NoVideoTrack {
        /// Path that was inspected.
        path: PathBuf,
    },

    /// Reading or seeking samples failed mid-copy.
    #[error("Sample read error on track {track}: {source}")]
    SampleRead {
        /// Source track index.
        track: u32,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The container writer failed or was misused.
    #[error("Write error: {0}")]
    Write(String),

    /// The produced file is missing or too small to be a real container.
    #[error("Output validation failed for {}: {reason}", .path.display())]
    OutputValidation {
        /// Temporary output path.
        path: PathBuf,
        /// Human-readable error description.
        reason: String,
    },

    /// A rename in the swap sequence failed; the original file is intact.
    #[error("Swap failed at {stage} stage, original intact: {source}")]
    Swap {
        /// Which rename failed.
        stage: SwapStage,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The promote rename failed and restoring the backup failed too.
    #[error(
        "Swap failed and restore failed; original content is at {}: {source}",
        .backup.display()
    )]
    SwapUnrecoverable {
        /// Path the original should be at.
        original: PathBuf,
        /// Path still holding the original content.
        backup: PathBuf,
        /// The error from the restoring rename.
        source: std::io::Error,
    },

    /// A trim for the same source is already running.
    #[error("Trim already running for {}", .path.display())]
    AlreadyRunning {
        /// Source path of the running job.
        path: PathBuf,
    },

    /// An external collaborator (project store, playback) failed.
    #[error("Collaborator error [{collaborator}]: {message}")]
    Collaborator {
        /// Name of the collaborator.
        collaborator: String,
        /// Human-readable error description.
        message: String,
    },

    /// Configuration could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O operation outside the copy and swap phases failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error for reporting.
    pub fn severity(&self) -> Severity {
        match self {
            Error::InvalidRange { .. } | Error::AlreadyRunning { .. } | Error::Config(_) => {
                Severity::Rejected
            }
            Error::SwapUnrecoverable { .. } => Severity::DataAtRisk,
            Error::ContainerOpen { .. }
            | Error::NoVideoTrack { .. }
            | Error::SampleRead { .. }
            | Error::Write(_)
            | Error::OutputValidation { .. }
            | Error::Swap { .. }
            | Error::Collaborator { .. }
            | Error::Io { .. }
            | Error::Internal(_) => Severity::Failed,
        }
    }

    /// Whether the original file is guaranteed to still be at its path with
    /// its pre-operation content.
    pub fn original_intact(&self) -> bool {
        self.severity() != Severity::DataAtRisk
    }

    /// Convenience constructor for [`Error::InvalidRange`].
    pub fn invalid_range(start_us: u64, end_us: u64, reason: impl Into<String>) -> Self {
        Error::InvalidRange {
            start_us,
            end_us,
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`Error::ContainerOpen`].
    pub fn container_open(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Error::ContainerOpen {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Write`].
    pub fn write(message: impl fmt::Display) -> Self {
        Error::Write(message.to_string())
    }

    /// Convenience constructor for [`Error::Collaborator`].
    pub fn collaborator(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Collaborator {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
