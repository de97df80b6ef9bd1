//! Track Inspector: enumerate the tracks of a container and select the
//! video and audio tracks to copy.

use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use rc_core::{ticks_to_micros, Error, MediaKind, Result};
use serde::Serialize;

use crate::fs::FileSystem;
use crate::mp4::{parse_movie, TableScope};
use crate::track::Track;

/// Everything the inspector learned about one container.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub path: PathBuf,
    pub file_size: u64,
    /// Movie duration from `mvhd`, in microseconds.
    pub duration_us: u64,
    pub tracks: Vec<Track>,
}

impl Inspection {
    /// The first video track, if any.
    pub fn video(&self) -> Option<&Track> {
        self.first_of(MediaKind::Video)
    }

    /// The first audio track, if any.
    pub fn audio(&self) -> Option<&Track> {
        self.first_of(MediaKind::Audio)
    }

    /// The first video track, or [`Error::NoVideoTrack`].
    pub fn require_video(&self) -> Result<&Track> {
        self.video().ok_or_else(|| Error::NoVideoTrack {
            path: self.path.clone(),
        })
    }

    fn first_of(&self, kind: MediaKind) -> Option<&Track> {
        self.tracks
            .iter()
            .find(|t| t.kind == kind && t.format.is_some())
    }
}

/// Open `path` read-only and describe its tracks.
///
/// Fails with [`Error::ContainerOpen`] when the file is missing, empty, or
/// not a parseable MP4.
pub fn inspect(fs: &dyn FileSystem, path: &Path) -> Result<Inspection> {
    let file_size = fs.file_size(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::container_open(path, "file does not exist"),
        _ => Error::container_open(path, e),
    })?;
    if file_size == 0 {
        return Err(Error::container_open(path, "file is empty"));
    }

    let file = fs.open_read(path).map_err(|e| Error::container_open(path, e))?;
    let mut reader = BufReader::new(file);
    let movie =
        parse_movie(&mut reader, TableScope::All).map_err(|e| Error::container_open(path, e))?;

    let duration_us = ticks_to_micros(movie.duration as i64, movie.timescale).max(0) as u64;

    let tracks: Vec<Track> = movie
        .tracks
        .into_iter()
        .map(|t| {
            let table = t.table.unwrap_or_default();
            let duration_ticks = table.duration_ticks().max(t.media_duration);
            Track {
                index: t.index,
                track_id: t.track_id,
                kind: t.format.kind,
                handler: t.format.handler,
                sample_count: table.samples.len() as u32,
                sync_sample_count: table.samples.iter().filter(|s| s.is_sync).count() as u32,
                duration_us: ticks_to_micros(duration_ticks as i64, t.format.timescale).max(0)
                    as u64,
                total_bytes: table.total_bytes(),
                format: t.format.kind.is_supported().then_some(t.format),
            }
        })
        .collect();

    tracing::debug!(
        path = %path.display(),
        tracks = tracks.len(),
        duration_us,
        "Inspected container"
    );

    Ok(Inspection {
        path: path.to_path_buf(),
        file_size,
        duration_us,
        tracks,
    })
}
