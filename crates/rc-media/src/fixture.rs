//! Synthetic MP4 builders for tests.
//!
//! Payload bytes are deterministic per (track, sample index) so tests can
//! check that a trimmed file carries exactly the source bytes.

use std::path::Path;

use rc_core::{ticks_to_micros, MediaKind, Result};

use crate::fs::{FileSystem, StdFileSystem};
use crate::mp4::boxes::{fullbox_header, write_box};
use crate::sample::SampleView;
use crate::track::{FourCc, TrackFormat, IDENTITY_MATRIX, LANGUAGE_UNDETERMINED};
use crate::writer::Mp4Writer;

pub const VIDEO_TIMESCALE: u32 = 90_000;
/// 100 ms frames.
pub const VIDEO_FRAME_TICKS: u32 = 9_000;
pub const AUDIO_TIMESCALE: u32 = 48_000;
pub const AUDIO_FRAME_TICKS: u32 = 1_024;

/// Which synthetic track a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackTag {
    Video,
    Audio,
    Text,
}

/// Deterministic payload for sample `index` of `tag`.
pub fn payload(tag: TrackTag, index: u32, size: usize) -> Vec<u8> {
    let marker = match tag {
        TrackTag::Video => 0x56,
        TrackTag::Audio => 0x41,
        TrackTag::Text => 0x54,
    };
    let mut data = Vec::with_capacity(size);
    data.push(marker);
    data.extend_from_slice(&index.to_be_bytes());
    data.extend((0..size.saturating_sub(5)).map(|i| (index as usize + i) as u8));
    data.truncate(size);
    data
}

/// Presentation time of audio frame `index`, in microseconds.
pub fn audio_frame_us(index: u32) -> i64 {
    ticks_to_micros(index as i64 * AUDIO_FRAME_TICKS as i64, AUDIO_TIMESCALE)
}

#[derive(Debug, Clone)]
pub struct VideoSpec {
    /// A sync sample every `gop` frames, starting with frame 0.
    pub gop: u32,
    pub payload_size: usize,
    pub width: u32,
    pub height: u32,
    pub matrix: [i32; 9],
    /// Code every third frame as a B-frame: decode order I P B, display
    /// order I B P. Keep `gop` a multiple of 3.
    pub reorder: bool,
}

impl Default for VideoSpec {
    fn default() -> Self {
        Self {
            gop: 10,
            payload_size: 200,
            width: 640,
            height: 360,
            matrix: IDENTITY_MATRIX,
            reorder: false,
        }
    }
}

/// Display position of the frame decoded at `index`.
pub fn presentation_index(index: u32, frames: u32, reorder: bool) -> u32 {
    match index % 3 {
        1 if reorder && index + 1 < frames => index + 1,
        2 if reorder => index - 1,
        _ => index,
    }
}

#[derive(Debug, Clone)]
pub struct AudioSpec {
    pub payload_size: usize,
}

impl Default for AudioSpec {
    fn default() -> Self {
        Self { payload_size: 64 }
    }
}

/// Shape of a synthetic container.
#[derive(Debug, Clone)]
pub struct FixtureSpec {
    pub duration_us: u64,
    pub video: Option<VideoSpec>,
    pub audio: Option<AudioSpec>,
    /// Add a one-sample-per-second `text` track after the media tracks.
    pub subtitles: bool,
}

impl FixtureSpec {
    pub fn video_and_audio(duration_us: u64) -> Self {
        Self {
            duration_us,
            video: Some(VideoSpec::default()),
            audio: Some(AudioSpec::default()),
            subtitles: false,
        }
    }

    pub fn video_only(duration_us: u64) -> Self {
        Self {
            audio: None,
            ..Self::video_and_audio(duration_us)
        }
    }

    pub fn audio_only(duration_us: u64) -> Self {
        Self {
            video: None,
            ..Self::video_and_audio(duration_us)
        }
    }

    pub fn with_subtitle_track(mut self) -> Self {
        self.subtitles = true;
        self
    }

    pub fn with_video(mut self, video: VideoSpec) -> Self {
        self.video = Some(video);
        self
    }

    /// Number of video frames the fixture will contain.
    pub fn video_frames(&self) -> u32 {
        frames_within(self.duration_us, VIDEO_FRAME_TICKS, VIDEO_TIMESCALE)
    }

    /// Number of audio frames the fixture will contain.
    pub fn audio_frames(&self) -> u32 {
        frames_within(self.duration_us, AUDIO_FRAME_TICKS, AUDIO_TIMESCALE)
    }
}

/// Frames of `frame_ticks` whose start lies before `duration_us`.
fn frames_within(duration_us: u64, frame_ticks: u32, timescale: u32) -> u32 {
    let total_ticks = rc_core::micros_to_ticks(duration_us as i64, timescale) as u64;
    total_ticks.div_ceil(frame_ticks as u64) as u32
}

/// `stsd` content with a single sample entry.
fn sample_description(entry_type: &[u8; 4], entry: &[u8]) -> Vec<u8> {
    let sample_entry = write_box(entry_type, entry);
    let mut content = Vec::with_capacity(8 + sample_entry.len());
    content.extend_from_slice(&fullbox_header(0, 0));
    content.extend_from_slice(&1u32.to_be_bytes());
    content.extend_from_slice(&sample_entry);
    content
}

fn avc1_description(width: u32, height: u32) -> Vec<u8> {
    let mut entry = Vec::with_capacity(100);
    // reserved + data reference index
    entry.extend_from_slice(&[0u8; 6]);
    entry.extend_from_slice(&1u16.to_be_bytes());
    entry.extend_from_slice(&[0u8; 16]);
    entry.extend_from_slice(&(width as u16).to_be_bytes());
    entry.extend_from_slice(&(height as u16).to_be_bytes());
    // 72 dpi
    entry.extend_from_slice(&0x00480000u32.to_be_bytes());
    entry.extend_from_slice(&0x00480000u32.to_be_bytes());
    entry.extend_from_slice(&0u32.to_be_bytes());
    entry.extend_from_slice(&1u16.to_be_bytes());
    entry.extend_from_slice(&[0u8; 32]);
    entry.extend_from_slice(&0x0018u16.to_be_bytes());
    entry.extend_from_slice(&(-1i16).to_be_bytes());
    let avcc = [
        0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x04, 0x67, 0x64, 0x00, 0x1F, 0x01, 0x00, 0x02,
        0x68, 0xEE,
    ];
    entry.extend_from_slice(&write_box(b"avcC", &avcc));
    sample_description(b"avc1", &entry)
}

fn mp4a_description() -> Vec<u8> {
    let mut entry = Vec::with_capacity(64);
    entry.extend_from_slice(&[0u8; 6]);
    entry.extend_from_slice(&1u16.to_be_bytes());
    entry.extend_from_slice(&[0u8; 8]);
    // channels, sample size, pre_defined, reserved
    entry.extend_from_slice(&2u16.to_be_bytes());
    entry.extend_from_slice(&16u16.to_be_bytes());
    entry.extend_from_slice(&[0u8; 4]);
    entry.extend_from_slice(&(AUDIO_TIMESCALE << 16).to_be_bytes());
    let mut esds = fullbox_header(0, 0).to_vec();
    esds.extend_from_slice(&[0x03, 0x19, 0x00, 0x01, 0x00, 0x04, 0x11, 0x40, 0x15]);
    esds.extend_from_slice(&[0u8; 11]);
    esds.extend_from_slice(&[0x05, 0x02, 0x11, 0x90, 0x06, 0x01, 0x02]);
    entry.extend_from_slice(&write_box(b"esds", &esds));
    sample_description(b"mp4a", &entry)
}

fn tx3g_description() -> Vec<u8> {
    let mut entry = vec![0u8; 6];
    entry.extend_from_slice(&1u16.to_be_bytes());
    entry.extend_from_slice(&[0u8; 30]);
    sample_description(b"tx3g", &entry)
}

/// Format of the synthetic video track.
pub fn video_format() -> TrackFormat {
    video_format_for(&VideoSpec::default())
}

fn video_format_for(spec: &VideoSpec) -> TrackFormat {
    TrackFormat {
        kind: MediaKind::Video,
        handler: FourCc(*b"vide"),
        codec: FourCc(*b"avc1"),
        timescale: VIDEO_TIMESCALE,
        language: LANGUAGE_UNDETERMINED,
        width: spec.width << 16,
        height: spec.height << 16,
        volume: 0,
        matrix: spec.matrix,
        handler_name: "VideoHandler".into(),
        sample_description: avc1_description(spec.width, spec.height),
    }
}

/// Format of the synthetic audio track.
pub fn audio_format() -> TrackFormat {
    TrackFormat {
        kind: MediaKind::Audio,
        handler: FourCc(*b"soun"),
        codec: FourCc(*b"mp4a"),
        timescale: AUDIO_TIMESCALE,
        // "eng"
        language: (5 << 10) | (14 << 5) | 7,
        width: 0,
        height: 0,
        volume: 0x0100,
        matrix: IDENTITY_MATRIX,
        handler_name: "SoundHandler".into(),
        sample_description: mp4a_description(),
    }
}

fn text_format() -> TrackFormat {
    TrackFormat {
        kind: MediaKind::Other,
        handler: FourCc(*b"text"),
        codec: FourCc(*b"tx3g"),
        timescale: 1000,
        language: LANGUAGE_UNDETERMINED,
        width: 0,
        height: 0,
        volume: 0,
        matrix: IDENTITY_MATRIX,
        handler_name: "SubtitleHandler".into(),
        sample_description: tx3g_description(),
    }
}

struct Planned {
    slot: usize,
    tag: TrackTag,
    index: u32,
    ts_us: i64,
    decode_us: i64,
    duration_us: i64,
    is_sync: bool,
    size: usize,
}

/// Write a synthetic container to `path` on the real filesystem.
pub fn write_fixture(path: &Path, spec: &FixtureSpec) -> Result<u64> {
    write_fixture_with(&StdFileSystem, path, spec)
}

/// Write a synthetic container through `fs`. Samples of all tracks are
/// interleaved in decode order, as a camera would record them.
pub fn write_fixture_with(fs: &dyn FileSystem, path: &Path, spec: &FixtureSpec) -> Result<u64> {
    let mut writer = Mp4Writer::create(fs, path)?;
    let mut slots = Vec::new();
    let mut plan = Vec::new();

    if let Some(video) = &spec.video {
        slots.push(writer.add_track(&video_format_for(video))?);
        let slot = slots.len() - 1;
        let frames = spec.video_frames();
        let frame_us = |i: u32| ticks_to_micros(i as i64 * VIDEO_FRAME_TICKS as i64, VIDEO_TIMESCALE);
        for index in 0..frames {
            plan.push(Planned {
                slot,
                tag: TrackTag::Video,
                index,
                ts_us: frame_us(presentation_index(index, frames, video.reorder)),
                decode_us: frame_us(index),
                duration_us: ticks_to_micros(VIDEO_FRAME_TICKS as i64, VIDEO_TIMESCALE),
                is_sync: index % video.gop.max(1) == 0,
                size: video.payload_size,
            });
        }
    }

    if let Some(audio) = &spec.audio {
        slots.push(writer.add_track(&audio_format())?);
        let slot = slots.len() - 1;
        for index in 0..spec.audio_frames() {
            plan.push(Planned {
                slot,
                tag: TrackTag::Audio,
                index,
                ts_us: audio_frame_us(index),
                decode_us: audio_frame_us(index),
                duration_us: audio_frame_us(index + 1) - audio_frame_us(index),
                is_sync: true,
                size: audio.payload_size,
            });
        }
    }

    if spec.subtitles {
        slots.push(writer.add_track(&text_format())?);
        let slot = slots.len() - 1;
        let cues = spec.duration_us.div_ceil(1_000_000) as u32;
        for index in 0..cues {
            plan.push(Planned {
                slot,
                tag: TrackTag::Text,
                index,
                ts_us: index as i64 * 1_000_000,
                decode_us: index as i64 * 1_000_000,
                duration_us: 1_000_000,
                is_sync: true,
                size: 16,
            });
        }
    }

    // Stable sort keeps per-track order for equal timestamps.
    plan.sort_by_key(|p| p.decode_us);

    writer.start()?;
    for p in &plan {
        let data = payload(p.tag, p.index, p.size);
        let sample = SampleView {
            track_index: p.slot as u32,
            timestamp_us: p.ts_us,
            decode_timestamp_us: p.decode_us,
            duration_us: p.duration_us,
            is_sync: p.is_sync,
            data: &data,
        };
        writer.write_sample(slots[p.slot], &sample)?;
    }
    writer.finish()
}
