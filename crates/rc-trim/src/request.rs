//! Trim requests and their validation.

use std::path::{Path, PathBuf};

use rc_core::{Error, ProjectKey, Result, MICROS_PER_SEC};
use serde::{Deserialize, Serialize};

/// Where the trimmed result ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// Atomically replace the source file.
    #[default]
    ReplaceSource,
}

/// An immutable request to keep `[start_us, end_us)` of `source`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimRequest {
    pub source: PathBuf,
    pub start_us: u64,
    pub end_us: u64,
    #[serde(default)]
    pub destination: Destination,
    /// Project record to update once the trim succeeds.
    #[serde(default)]
    pub project: Option<ProjectKey>,
}

impl TrimRequest {
    pub fn new(source: impl Into<PathBuf>, start_us: u64, end_us: u64) -> Self {
        Self {
            source: source.into(),
            start_us,
            end_us,
            destination: Destination::ReplaceSource,
            project: None,
        }
    }

    /// Build a request from times in seconds, as typed by a user.
    pub fn from_secs(source: impl Into<PathBuf>, start_secs: f64, end_secs: f64) -> Result<Self> {
        let to_us = |secs: f64, what: &str| -> Result<u64> {
            if !secs.is_finite() || secs < 0.0 {
                return Err(Error::invalid_range(
                    0,
                    0,
                    format!("{what} time {secs} s is not a non-negative number"),
                ));
            }
            Ok((secs * MICROS_PER_SEC as f64).round() as u64)
        };
        Ok(Self::new(source, to_us(start_secs, "start")?, to_us(end_secs, "end")?))
    }

    pub fn with_project(mut self, project: ProjectKey) -> Self {
        self.project = Some(project);
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Length of the requested window.
    pub fn window_us(&self) -> u64 {
        self.end_us.saturating_sub(self.start_us)
    }

    /// Check the window shape. Performs no I/O.
    pub fn validate(&self, min_window_us: u64) -> Result<()> {
        if self.end_us <= self.start_us {
            return Err(Error::invalid_range(
                self.start_us,
                self.end_us,
                "end must be after start",
            ));
        }
        if self.window_us() < min_window_us {
            return Err(Error::invalid_range(
                self.start_us,
                self.end_us,
                format!(
                    "window of {} ms is shorter than the minimum of {} ms",
                    self.window_us() / 1000,
                    min_window_us / 1000
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_window_at_minimum() {
        let request = TrimRequest::new("/v/clip.mp4", 2_000_000, 3_000_000);
        assert!(request.validate(1_000_000).is_ok());
        assert_eq!(request.window_us(), 1_000_000);
        assert_eq!(request.destination, Destination::ReplaceSource);
    }

    #[test]
    fn rejects_short_and_inverted_windows() {
        let short = TrimRequest::new("/v/clip.mp4", 2_000_000, 2_999_999);
        let err = short.validate(1_000_000).unwrap_err();
        assert!(matches!(err, Error::InvalidRange { .. }));
        assert!(err.to_string().contains("minimum"));

        let inverted = TrimRequest::new("/v/clip.mp4", 5_000_000, 2_000_000);
        assert!(inverted.validate(0).unwrap_err().to_string().contains("after start"));

        let empty = TrimRequest::new("/v/clip.mp4", 5_000_000, 5_000_000);
        assert!(empty.validate(0).is_err());
    }

    #[test]
    fn from_secs_converts_and_rejects_negatives() {
        let request = TrimRequest::from_secs("/v/clip.mp4", 2.0, 5.5).unwrap();
        assert_eq!((request.start_us, request.end_us), (2_000_000, 5_500_000));
        assert!(TrimRequest::from_secs("/v/clip.mp4", -1.0, 5.0).is_err());
        assert!(TrimRequest::from_secs("/v/clip.mp4", 0.0, f64::NAN).is_err());
    }

    #[test]
    fn request_serde_defaults() {
        let request: TrimRequest =
            serde_json::from_str(r#"{"source":"/v/a.mp4","start_us":0,"end_us":1000000}"#).unwrap();
        assert_eq!(request.destination, Destination::ReplaceSource);
        assert!(request.project.is_none());
    }
}
