//! Integration tests for the trim orchestrator: window copy, swap failure
//! handling, and crash safety of the source file.

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{dir_listing, source_file, FsOp, TestFs};
use rc_core::config::TrimConfig;
use rc_core::{Error, MediaKind, RebaseMode, Severity, SwapStage};
use rc_media::fixture::{audio_frame_us, payload, FixtureSpec, TrackTag, VideoSpec};
use rc_media::{inspect, SampleReader, StdFileSystem};
use rc_trim::{TrimRequest, Trimmer};

const TEN_SECONDS: u64 = 10_000_000;

fn trimmer_on(fs: Arc<TestFs>) -> Trimmer {
    Trimmer::new(fs, TrimConfig::default())
}

/// Collect `(timestamp_us, payload)` of every sample of `track_index`.
fn read_all(path: &Path, track_index: u32) -> Vec<(i64, Vec<u8>)> {
    let mut reader =
        SampleReader::open(&StdFileSystem, path, track_index, 0, u64::MAX, RebaseMode::SharedAnchor)
            .unwrap();
    let mut out = Vec::new();
    while let Some(sample) = reader.next_sample().unwrap() {
        out.push((sample.timestamp_us, sample.data.to_vec()));
    }
    out
}

// ---------------------------------------------------------------------------
// Window copy
// ---------------------------------------------------------------------------

#[test]
fn three_second_window_of_ten_second_clip() {
    let dir = tempfile::tempdir().unwrap();
    let (path, original) =
        source_file(dir.path(), "clip.mp4", &FixtureSpec::video_and_audio(TEN_SECONDS));

    let outcome = trimmer_on(TestFs::spy())
        .trim(&TrimRequest::new(&path, 2_000_000, 5_000_000))
        .unwrap();
    assert_eq!(outcome.duration_us, 3_000_000);
    assert_eq!(outcome.tracks_written, 2);
    assert_eq!(dir_listing(dir.path()), vec!["clip.mp4"]);

    let trimmed = std::fs::read(&path).unwrap();
    assert_ne!(trimmed, original);
    assert_eq!(outcome.bytes_written, trimmed.len() as u64);

    let inspection = inspect(&StdFileSystem, &path).unwrap();
    assert_eq!(inspection.tracks.len(), 2);
    let video = inspection.video().unwrap();
    assert_eq!(video.sample_count, 30);
    assert_eq!(video.sync_sample_count, 3);

    let video_samples = read_all(&path, video.index);
    assert_eq!(video_samples[0].0, 0);
    assert!(video_samples.iter().all(|(ts, _)| *ts < 3_000_000));
    for (i, (_, data)) in video_samples.iter().enumerate() {
        assert_eq!(*data, payload(TrackTag::Video, 20 + i as u32, 200));
    }

    // Audio keeps only frames presented inside the window, rebased to 0.
    let audio = inspection.audio().unwrap();
    let audio_samples = read_all(&path, audio.index);
    assert_eq!(audio_samples[0].0, 0);
    assert_eq!(audio_samples[0].1, payload(TrackTag::Audio, 94, 64));
    assert!(audio_samples.iter().all(|(ts, _)| *ts < 3_000_000));
}

#[test]
fn video_only_source_opens_no_audio_reader() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) = source_file(dir.path(), "clip.mp4", &FixtureSpec::video_only(TEN_SECONDS));

    let fs = TestFs::spy();
    let outcome = trimmer_on(Arc::clone(&fs))
        .trim(&TrimRequest::new(&path, 1_000_000, 4_000_000))
        .unwrap();
    assert_eq!(outcome.tracks_written, 1);
    assert_eq!(outcome.samples_written, 30);

    // One read for inspection, one for the video reader.
    assert_eq!(fs.count(|op| matches!(op, FsOp::OpenRead(_))), 2);
    let inspection = inspect(&StdFileSystem, &path).unwrap();
    assert_eq!(inspection.tracks.len(), 1);
    assert!(inspection.audio().is_none());
}

#[test]
fn subtitle_track_is_not_copied() {
    let dir = tempfile::tempdir().unwrap();
    let spec = FixtureSpec::video_and_audio(TEN_SECONDS).with_subtitle_track();
    let (path, _) = source_file(dir.path(), "clip.mp4", &spec);
    assert_eq!(inspect(&StdFileSystem, &path).unwrap().tracks.len(), 3);

    trimmer_on(TestFs::spy())
        .trim(&TrimRequest::new(&path, 0, 3_000_000))
        .unwrap();

    let kinds: Vec<MediaKind> = inspect(&StdFileSystem, &path)
        .unwrap()
        .tracks
        .iter()
        .map(|t| t.kind)
        .collect();
    assert_eq!(kinds, vec![MediaKind::Video, MediaKind::Audio]);
}

#[test]
fn damaged_subtitle_table_does_not_block_trim() {
    let dir = tempfile::tempdir().unwrap();
    let spec = FixtureSpec::video_only(TEN_SECONDS).with_subtitle_track();
    let (path, mut bytes) = source_file(dir.path(), "clip.mp4", &spec);
    let at = bytes.windows(4).rposition(|w| w == b"stsz").unwrap();
    bytes[at..at + 4].copy_from_slice(b"stz2");
    std::fs::write(&path, &bytes).unwrap();

    trimmer_on(TestFs::spy())
        .trim(&TrimRequest::new(&path, 0, 3_000_000))
        .unwrap();

    let inspection = inspect(&StdFileSystem, &path).unwrap();
    assert_eq!(inspection.tracks.len(), 1);
    assert_eq!(inspection.require_video().unwrap().sample_count, 30);
}

#[test]
fn rotation_and_dimensions_are_preserved() {
    let dir = tempfile::tempdir().unwrap();
    let rotated = [0, 0x0001_0000, 0, -0x0001_0000, 0, 0, 0, 0, 0x4000_0000];
    let spec = FixtureSpec::video_and_audio(TEN_SECONDS).with_video(VideoSpec {
        width: 1080,
        height: 1920,
        matrix: rotated,
        ..VideoSpec::default()
    });
    let (path, _) = source_file(dir.path(), "portrait.mp4", &spec);

    trimmer_on(TestFs::spy())
        .trim(&TrimRequest::new(&path, 3_000_000, 6_000_000))
        .unwrap();

    let inspection = inspect(&StdFileSystem, &path).unwrap();
    let format = inspection.video().unwrap().format.as_ref().unwrap();
    assert_eq!(format.matrix, rotated);
    assert_eq!(format.width_px(), 1080);
    assert_eq!(format.height_px(), 1920);
    assert_eq!(&format.codec.0, b"avc1");

    let audio_format = inspection.audio().unwrap().format.as_ref().unwrap();
    assert_eq!(audio_format.language_code().as_deref(), Some("eng"));
}

#[test]
fn shared_anchor_keeps_audio_offset() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) =
        source_file(dir.path(), "clip.mp4", &FixtureSpec::video_and_audio(TEN_SECONDS));

    let config = TrimConfig {
        rebase: RebaseMode::SharedAnchor,
        ..TrimConfig::default()
    };
    Trimmer::new(TestFs::spy(), config)
        .trim(&TrimRequest::new(&path, 2_000_000, 5_000_000))
        .unwrap();

    let inspection = inspect(&StdFileSystem, &path).unwrap();
    let video_samples = read_all(&path, inspection.video().unwrap().index);
    let audio_samples = read_all(&path, inspection.audio().unwrap().index);
    assert_eq!(video_samples[0].0, 0);
    assert_eq!(audio_samples[0].0, audio_frame_us(94) - 2_000_000);
    assert!(audio_samples[0].0 > 0);
}

#[test]
fn reordered_frames_keep_presentation_order() {
    let dir = tempfile::tempdir().unwrap();
    let spec = FixtureSpec::video_only(TEN_SECONDS).with_video(VideoSpec {
        gop: 12,
        reorder: true,
        ..VideoSpec::default()
    });
    let (path, _) = source_file(dir.path(), "bframes.mp4", &spec);

    let outcome = trimmer_on(TestFs::spy())
        .trim(&TrimRequest::new(&path, 2_400_000, 5_400_000))
        .unwrap();
    assert_eq!(outcome.duration_us, 3_000_000);

    // Decode order 24..54 from the sync frame at 2.4 s, each shifted by 2.4 s.
    let samples = read_all(&path, 0);
    assert_eq!(samples.len(), 30);
    for (i, (ts, data)) in samples.iter().enumerate() {
        let decode_index = 24 + i as u32;
        let shown = rc_media::fixture::presentation_index(decode_index, 100, true);
        assert_eq!(*ts, (shown as i64 - 24) * 100_000, "decode index {decode_index}");
        assert_eq!(data, &payload(TrackTag::Video, decode_index, 200));
    }
    assert_eq!(samples[0].0, 0);
    assert_eq!(samples[1].0, 200_000);
    assert_eq!(samples[2].0, 100_000);

    let inspection = inspect(&StdFileSystem, &path).unwrap();
    assert_eq!(inspection.require_video().unwrap().sync_sample_count, 3);
}

#[test]
fn trimmed_output_can_be_trimmed_again() {
    let dir = tempfile::tempdir().unwrap();
    let (path, _) =
        source_file(dir.path(), "clip.mp4", &FixtureSpec::video_and_audio(TEN_SECONDS));
    let trimmer = trimmer_on(TestFs::spy());

    trimmer
        .trim(&TrimRequest::new(&path, 2_000_000, 8_000_000))
        .unwrap();
    let second = trimmer
        .trim(&TrimRequest::new(&path, 1_000_000, 3_000_000))
        .unwrap();
    assert_eq!(second.duration_us, 2_000_000);

    let video = read_all(&path, 0);
    assert_eq!(video.len(), 20);
    assert_eq!(video[0].1, payload(TrackTag::Video, 30, 200));
}

// ---------------------------------------------------------------------------
// Refusals
// ---------------------------------------------------------------------------

#[test]
fn short_window_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (path, original) =
        source_file(dir.path(), "clip.mp4", &FixtureSpec::video_and_audio(TEN_SECONDS));

    let fs = TestFs::spy();
    let err = trimmer_on(Arc::clone(&fs))
        .trim(&TrimRequest::new(&path, 2_000_000, 2_500_000))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRange { .. }));
    assert!(fs.ops().is_empty());
    assert_eq!(std::fs::read(&path).unwrap(), original);

    let err = trimmer_on(Arc::clone(&fs))
        .trim(&TrimRequest::new(&path, 5_000_000, 2_000_000))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidRange { .. }));
    assert!(fs.ops().is_empty());
}

#[test]
fn audio_only_source_has_no_video_track() {
    let dir = tempfile::tempdir().unwrap();
    let (path, original) =
        source_file(dir.path(), "voice.mp4", &FixtureSpec::audio_only(TEN_SECONDS));

    let fs = TestFs::spy();
    let err = trimmer_on(Arc::clone(&fs))
        .trim(&TrimRequest::new(&path, 0, 3_000_000))
        .unwrap_err();
    assert!(matches!(err, Error::NoVideoTrack { .. }));
    assert_eq!(fs.count(|op| matches!(op, FsOp::Create(_))), 0);
    assert_eq!(std::fs::read(&path).unwrap(), original);
}

#[test]
fn non_container_source_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.mp4");
    std::fs::write(&path, b"shopping list: eggs, flour, more eggs").unwrap();

    let err = trimmer_on(TestFs::spy())
        .trim(&TrimRequest::new(&path, 0, 3_000_000))
        .unwrap_err();
    assert!(matches!(err, Error::ContainerOpen { .. }));
    assert_eq!(dir_listing(dir.path()), vec!["notes.mp4"]);
}

#[test]
fn small_output_fails_validation_and_is_removed() {
    let dir = tempfile::tempdir().unwrap();
    let (path, original) =
        source_file(dir.path(), "clip.mp4", &FixtureSpec::video_and_audio(TEN_SECONDS));

    let config = TrimConfig {
        min_output_bytes: 10 * 1024 * 1024,
        ..TrimConfig::default()
    };
    let err = Trimmer::new(TestFs::spy(), config)
        .trim(&TrimRequest::new(&path, 2_000_000, 5_000_000))
        .unwrap_err();
    assert!(matches!(err, Error::OutputValidation { .. }));
    assert_eq!(std::fs::read(&path).unwrap(), original);
    assert_eq!(dir_listing(dir.path()), vec!["clip.mp4"]);
}

// ---------------------------------------------------------------------------
// Swap failures
// ---------------------------------------------------------------------------

fn is_rename_from(op: &FsOp, from: &Path) -> bool {
    matches!(op, FsOp::Rename(f, _) if f == from)
}

#[test]
fn failed_backup_rename_leaves_original() {
    let dir = tempfile::tempdir().unwrap();
    let (path, original) =
        source_file(dir.path(), "clip.mp4", &FixtureSpec::video_and_audio(TEN_SECONDS));

    let source = path.clone();
    let fs = TestFs::failing(move |_, op| is_rename_from(op, &source));
    let err = trimmer_on(fs)
        .trim(&TrimRequest::new(&path, 2_000_000, 5_000_000))
        .unwrap_err();

    assert!(matches!(err, Error::Swap { stage: SwapStage::Backup, .. }));
    assert!(err.original_intact());
    assert_eq!(std::fs::read(&path).unwrap(), original);
    assert_eq!(dir_listing(dir.path()), vec!["clip.mp4"]);
}

#[test]
fn failed_promote_restores_original() {
    let dir = tempfile::tempdir().unwrap();
    let (path, original) =
        source_file(dir.path(), "clip.mp4", &FixtureSpec::video_and_audio(TEN_SECONDS));

    let fs = TestFs::failing(|_, op| {
        matches!(op, FsOp::Rename(from, _) if from.to_string_lossy().contains("_trimmed_"))
    });
    let err = trimmer_on(Arc::clone(&fs))
        .trim(&TrimRequest::new(&path, 2_000_000, 5_000_000))
        .unwrap_err();

    assert!(matches!(err, Error::Swap { stage: SwapStage::Promote, .. }));
    assert!(err.original_intact());
    assert_eq!(std::fs::read(&path).unwrap(), original);
    assert_eq!(dir_listing(dir.path()), vec!["clip.mp4"]);
    assert_eq!(fs.count(|op| matches!(op, FsOp::Rename(..))), 3);
}

#[test]
fn failed_restore_keeps_backup_and_trimmed_output() {
    let dir = tempfile::tempdir().unwrap();
    let (path, original) =
        source_file(dir.path(), "clip.mp4", &FixtureSpec::video_and_audio(TEN_SECONDS));

    // The first rename (source to backup) succeeds; every later one fails.
    let source = path.clone();
    let fs = TestFs::failing(move |_, op| {
        matches!(op, FsOp::Rename(..)) && !is_rename_from(op, &source)
    });
    let err = trimmer_on(fs)
        .trim(&TrimRequest::new(&path, 2_000_000, 5_000_000))
        .unwrap_err();

    let Error::SwapUnrecoverable { original: at, backup, .. } = &err else {
        panic!("expected SwapUnrecoverable, got {err:?}");
    };
    assert_eq!(at, &path);
    assert_eq!(err.severity(), Severity::DataAtRisk);
    assert!(!err.original_intact());
    assert!(!path.exists());
    assert_eq!(std::fs::read(backup).unwrap(), original);

    let listing = dir_listing(dir.path());
    assert_eq!(listing.len(), 2);
    assert!(listing.contains(&"clip.mp4.bak".to_string()));
    assert!(listing.iter().any(|name| name.contains("_trimmed_")));
}

#[test]
fn undeletable_backup_does_not_fail_the_trim() {
    let dir = tempfile::tempdir().unwrap();
    let (path, original) =
        source_file(dir.path(), "clip.mp4", &FixtureSpec::video_and_audio(TEN_SECONDS));

    let fs = TestFs::failing(|_, op| {
        matches!(op, FsOp::RemoveFile(p) if p.to_string_lossy().ends_with(".bak"))
    });
    trimmer_on(fs)
        .trim(&TrimRequest::new(&path, 2_000_000, 5_000_000))
        .unwrap();

    assert_eq!(dir_listing(dir.path()), vec!["clip.mp4", "clip.mp4.bak"]);
    assert_eq!(std::fs::read(dir.path().join("clip.mp4.bak")).unwrap(), original);
}

// ---------------------------------------------------------------------------
// Crash safety
// ---------------------------------------------------------------------------

/// Fail each filesystem call of a trim in turn. Whatever fails, the source
/// path must hold either the untouched original or a complete trimmed file.
#[test]
fn any_single_fault_leaves_source_usable() {
    let spec = FixtureSpec::video_and_audio(TEN_SECONDS);
    let request_for = |path: &Path| TrimRequest::new(path, 2_000_000, 5_000_000);

    let total_ops = {
        let dir = tempfile::tempdir().unwrap();
        let (path, _) = source_file(dir.path(), "clip.mp4", &spec);
        let fs = TestFs::spy();
        trimmer_on(Arc::clone(&fs)).trim(&request_for(&path)).unwrap();
        fs.ops().len()
    };
    assert!(total_ops > 8);

    for fault_at in 0..total_ops {
        let dir = tempfile::tempdir().unwrap();
        let (path, original) = source_file(dir.path(), "clip.mp4", &spec);
        let fs = TestFs::failing(move |index, _| index == fault_at);
        let result = trimmer_on(Arc::clone(&fs)).trim(&request_for(&path));

        assert!(path.exists(), "source missing after fault at call {fault_at}");
        match result {
            Ok(outcome) => {
                assert_eq!(outcome.duration_us, 3_000_000);
                let inspection = inspect(&StdFileSystem, &path).unwrap();
                assert_eq!(inspection.video().unwrap().sample_count, 30);
            }
            Err(e) => {
                assert!(e.original_intact(), "fault at call {fault_at}: {e}");
                assert_eq!(
                    std::fs::read(&path).unwrap(),
                    original,
                    "source changed after fault at call {fault_at}: {e}"
                );
                assert_eq!(
                    dir_listing(dir.path()),
                    vec!["clip.mp4"],
                    "leftover files after fault at call {fault_at}: {e}"
                );
            }
        }
    }
}
