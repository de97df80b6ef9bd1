//! Windowed Sample Reader.
//!
//! Streams the samples of one track that fall inside `[start_us, end_us)`,
//! starting from the closest preceding sync sample so the first emitted
//! frame is decodable.

use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use rc_core::{ticks_to_micros, Error, RebaseMode, Result};

use crate::fs::{FileSystem, ReadSeek};
use crate::mp4::{parse_movie, ResolvedSample, ResolvedSampleTable, TableScope};
use crate::sample::SampleView;
use crate::track::TrackFormat;

/// Lazy, finite, non-restartable sequence of samples from one track.
///
/// Each reader owns its file handle and sample table; readers of different
/// tracks of the same file never share a cursor.
pub struct SampleReader {
    path: PathBuf,
    track_index: u32,
    format: TrackFormat,
    table: ResolvedSampleTable,
    source: BufReader<Box<dyn ReadSeek>>,
    /// File position of `source`, when known, so contiguous samples skip the
    /// seek (which would drop the read buffer).
    position: Option<u64>,
    cursor: usize,
    start_us: i64,
    end_us: i64,
    rebase: RebaseMode,
    anchor_us: Option<i64>,
    buffer: Vec<u8>,
    finished: bool,
    emitted: u64,
    emitted_bytes: u64,
    first_pts_us: Option<i64>,
    last_end_us: i64,
}

impl std::fmt::Debug for SampleReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleReader")
            .field("path", &self.path)
            .field("track_index", &self.track_index)
            .field("cursor", &self.cursor)
            .field("emitted", &self.emitted)
            .finish_non_exhaustive()
    }
}

impl SampleReader {
    /// Open `track_index` of `path` and position on the last sync sample at
    /// or before `start_us` (or the first sample when none qualifies).
    pub fn open(
        fs: &dyn FileSystem,
        path: &Path,
        track_index: u32,
        start_us: u64,
        end_us: u64,
        rebase: RebaseMode,
    ) -> Result<Self> {
        let read_err = |source: io::Error| Error::SampleRead {
            track: track_index,
            source,
        };

        let file = fs.open_read(path).map_err(read_err)?;
        let mut source = BufReader::new(file);
        let mut movie =
            parse_movie(&mut source, TableScope::Only(track_index)).map_err(read_err)?;

        let position = movie
            .tracks
            .iter()
            .position(|t| t.index == track_index)
            .ok_or_else(|| {
                read_err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no track at index {track_index}"),
                ))
            })?;
        let track = movie.tracks.swap_remove(position);
        if !track.format.kind.is_supported() {
            return Err(read_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("track {track_index} is {}, not video or audio", track.format.handler),
            )));
        }
        let table = track.table.unwrap_or_default();

        let start_us = start_us.min(i64::MAX as u64) as i64;
        let end_us = end_us.min(i64::MAX as u64) as i64;
        let timescale = table.timescale;
        let cursor = table
            .samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_sync && pts_us(s, timescale) <= start_us)
            .map(|(i, _)| i)
            .last()
            .unwrap_or(0);

        tracing::debug!(
            path = %path.display(),
            track = track_index,
            kind = %track.format.kind,
            samples = table.samples.len(),
            seek_sample = cursor,
            start_us,
            end_us,
            "Opened sample reader"
        );

        Ok(Self {
            path: path.to_path_buf(),
            track_index,
            format: track.format,
            table,
            source,
            position: None,
            cursor,
            start_us,
            end_us,
            rebase,
            anchor_us: None,
            buffer: Vec::new(),
            finished: false,
            emitted: 0,
            emitted_bytes: 0,
            first_pts_us: None,
            last_end_us: 0,
        })
    }

    /// Produce the next sample inside the window, or `None` when the window
    /// or the track is exhausted.
    pub fn next_sample(&mut self) -> Result<Option<SampleView<'_>>> {
        let timescale = self.table.timescale;
        while !self.finished {
            let Some(sample) = self.table.samples.get(self.cursor).copied() else {
                self.finished = true;
                break;
            };
            self.cursor += 1;

            let pts = pts_us(&sample, timescale);
            if pts < self.start_us {
                continue;
            }
            if pts >= self.end_us {
                self.finished = true;
                break;
            }

            self.load_payload(&sample)?;

            let anchor = *self.anchor_us.get_or_insert(match self.rebase {
                RebaseMode::FirstSample => pts,
                RebaseMode::SharedAnchor => self.start_us,
            });
            let dts = ticks_to_micros(sample.decode_timestamp as i64, timescale);
            let duration_us = ticks_to_micros(sample.duration as i64, timescale);

            self.emitted += 1;
            self.emitted_bytes += sample.size as u64;
            self.first_pts_us.get_or_insert(pts);
            self.last_end_us = self.last_end_us.max(pts + duration_us);

            return Ok(Some(SampleView {
                track_index: self.track_index,
                timestamp_us: pts - anchor,
                decode_timestamp_us: dts - anchor,
                duration_us,
                is_sync: sample.is_sync,
                data: &self.buffer,
            }));
        }
        Ok(None)
    }

    fn load_payload(&mut self, sample: &ResolvedSample) -> Result<()> {
        let track = self.track_index;
        let read_err = |source: io::Error| Error::SampleRead { track, source };
        if self.position != Some(sample.file_offset) {
            self.source
                .seek(SeekFrom::Start(sample.file_offset))
                .map_err(read_err)?;
        }
        self.buffer.resize(sample.size as usize, 0);
        if let Err(e) = self.source.read_exact(&mut self.buffer) {
            self.position = None;
            return Err(read_err(e));
        }
        self.position = Some(sample.file_offset + sample.size as u64);
        Ok(())
    }

    /// Format descriptor of the track being read.
    pub fn format(&self) -> &TrackFormat {
        &self.format
    }

    pub fn track_index(&self) -> u32 {
        self.track_index
    }

    /// Number of samples emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Payload bytes emitted so far.
    pub fn emitted_bytes(&self) -> u64 {
        self.emitted_bytes
    }

    /// Presentation span covered by the emitted samples, from the first
    /// emitted timestamp to the end of the latest-ending sample.
    pub fn emitted_span_us(&self) -> u64 {
        match self.first_pts_us {
            Some(first) => (self.last_end_us - first).max(0) as u64,
            None => 0,
        }
    }

    /// Whether the sequence is exhausted.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

fn pts_us(sample: &ResolvedSample, timescale: u32) -> i64 {
    ticks_to_micros(sample.presentation_timestamp(), timescale)
}
