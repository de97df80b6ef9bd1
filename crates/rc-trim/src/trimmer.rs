//! Trim Orchestrator: inspect, copy the window, validate, swap.

use std::path::PathBuf;
use std::sync::Arc;

use rc_core::config::TrimConfig;
use rc_core::{Error, Result};
use rc_media::{inspect, FileSystem, Mp4Writer, SampleReader, StdFileSystem, Track};
use serde::Serialize;

use crate::request::TrimRequest;
use crate::workspace::TrimWorkspace;

/// What a successful trim produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrimOutcome {
    /// The source path, now holding the trimmed content.
    pub path: PathBuf,
    /// Duration of the trimmed clip.
    pub duration_us: u64,
    pub tracks_written: u32,
    pub samples_written: u64,
    /// Size of the trimmed file.
    pub bytes_written: u64,
}

/// Totals from the copy phase.
#[derive(Debug, Default)]
struct CopyStats {
    tracks: u32,
    samples: u64,
    video_span_us: u64,
}

/// Runs one trim synchronously. Cheap to share behind an `Arc`.
pub struct Trimmer {
    fs: Arc<dyn FileSystem>,
    config: TrimConfig,
}

impl Trimmer {
    pub fn new(fs: Arc<dyn FileSystem>, config: TrimConfig) -> Self {
        Self { fs, config }
    }

    /// Trimmer over the real filesystem.
    pub fn with_std_fs(config: TrimConfig) -> Self {
        Self::new(Arc::new(StdFileSystem), config)
    }

    pub fn config(&self) -> &TrimConfig {
        &self.config
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Minimum window in microseconds.
    pub fn min_window_us(&self) -> u64 {
        self.config.min_window_ms.saturating_mul(1000)
    }

    /// Replace `request.source` with the samples inside its window.
    ///
    /// On any error other than [`Error::SwapUnrecoverable`] the source file
    /// is left byte-identical and no temp file remains.
    pub fn trim(&self, request: &TrimRequest) -> Result<TrimOutcome> {
        request.validate(self.min_window_us())?;

        let span = tracing::info_span!(
            "trim",
            path = %request.source.display(),
            start_us = request.start_us,
            end_us = request.end_us
        );
        let _enter = span.enter();

        let fs = self.fs.as_ref();
        let inspection = inspect(fs, &request.source)?;
        let video = inspection.require_video()?;
        let audio = inspection.audio();
        tracing::debug!(
            video_track = video.index,
            audio_track = ?audio.map(|t| t.index),
            "Selected tracks"
        );

        let workspace = TrimWorkspace::new(fs, &request.source, &self.config);
        let stats = self.copy_window(&workspace, request, video, audio)?;
        let bytes_written = workspace.validate_output(self.config.min_output_bytes)?;
        workspace.swap()?;

        let duration_us = request.window_us().min(stats.video_span_us);
        tracing::info!(
            duration_us,
            tracks = stats.tracks,
            samples = stats.samples,
            bytes = bytes_written,
            "Trim complete"
        );

        Ok(TrimOutcome {
            path: request.source.clone(),
            duration_us,
            tracks_written: stats.tracks,
            samples_written: stats.samples,
            bytes_written,
        })
    }

    /// Copy video then audio into the workspace's temp file, one track at a
    /// time.
    fn copy_window(
        &self,
        workspace: &TrimWorkspace<'_>,
        request: &TrimRequest,
        video: &Track,
        audio: Option<&Track>,
    ) -> Result<CopyStats> {
        let fs = self.fs.as_ref();
        let mut writer = Mp4Writer::create(fs, workspace.temp())?;

        let mut plan = Vec::with_capacity(2);
        for track in std::iter::once(video).chain(audio) {
            let format = track.format.as_ref().ok_or_else(|| {
                Error::Internal(format!("track {} has no format descriptor", track.index))
            })?;
            plan.push((track, writer.add_track(format)?));
        }
        writer.start()?;

        let mut stats = CopyStats::default();
        for (track, output) in plan {
            let mut reader = SampleReader::open(
                fs,
                &request.source,
                track.index,
                request.start_us,
                request.end_us,
                self.config.rebase,
            )?;
            while let Some(sample) = reader.next_sample()? {
                writer.write_sample(output, &sample)?;
            }
            tracing::debug!(
                track = track.index,
                kind = %track.kind,
                samples = reader.emitted(),
                bytes = reader.emitted_bytes(),
                span_us = reader.emitted_span_us(),
                "Copied track"
            );
            if track.index == video.index {
                stats.video_span_us = reader.emitted_span_us();
            }
            stats.samples += reader.emitted();
            stats.tracks += 1;
        }

        writer.finish()?;
        Ok(stats)
    }
}
