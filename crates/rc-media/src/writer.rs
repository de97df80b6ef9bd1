//! Container Writer.
//!
//! Produces a progressive MP4: `ftyp`, one `mdat` holding every payload in
//! write order, then `moov` with complete sample tables. The `mdat` size is
//! patched once all payloads are known.

use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rc_core::{micros_to_ticks, Error, MediaKind, Result};

use crate::fs::{FileSystem, WriteSeek};
use crate::mp4::boxes;
use crate::sample::SampleView;
use crate::track::TrackFormat;

/// Timescale of `mvhd` and `tkhd` durations.
const MOVIE_TIMESCALE: u32 = 1000;

/// Handle to a track added with [`Mp4Writer::add_track`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputTrackId(usize);

impl OutputTrackId {
    /// The 1-based `track_ID` written to `tkhd`.
    pub fn track_id(self) -> u32 {
        self.0 as u32 + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Configuring,
    Writing,
    Finished,
}

/// Per-track sample tables accumulated while writing.
#[derive(Debug)]
struct OutputTrack {
    format: TrackFormat,
    sizes: Vec<u32>,
    durations: Vec<u32>,
    composition_offsets: Vec<i32>,
    /// 1-based sample numbers.
    sync_samples: Vec<u32>,
    chunk_offsets: Vec<u64>,
    samples_per_chunk: Vec<u32>,
    last_decode_us: Option<i64>,
    /// Decode time of the next sample, in media ticks.
    next_decode_ticks: i64,
}

impl OutputTrack {
    fn new(format: TrackFormat) -> Self {
        Self {
            format,
            sizes: Vec::new(),
            durations: Vec::new(),
            composition_offsets: Vec::new(),
            sync_samples: Vec::new(),
            chunk_offsets: Vec::new(),
            samples_per_chunk: Vec::new(),
            last_decode_us: None,
            next_decode_ticks: 0,
        }
    }

    fn duration_ticks(&self) -> u64 {
        self.durations.iter().map(|&d| d as u64).sum()
    }

    fn movie_duration(&self) -> u64 {
        let ticks = self.duration_ticks();
        let timescale = self.format.timescale as u64;
        (ticks * MOVIE_TIMESCALE as u64 + timescale / 2) / timescale
    }

    fn build_trak(&self, track_id: u32) -> Vec<u8> {
        let format = &self.format;
        let tkhd = boxes::write_tkhd(track_id, self.movie_duration(), format);
        let mdhd = boxes::write_mdhd(format.timescale, self.duration_ticks(), format.language);
        let hdlr = boxes::write_hdlr(format.handler.as_bytes(), &format.handler_name);

        let media_header = match format.kind {
            MediaKind::Video => boxes::write_vmhd(),
            MediaKind::Audio => boxes::write_smhd(),
            MediaKind::Other => boxes::write_nmhd(),
        };
        let dinf = boxes::write_dinf();

        let stsd = boxes::write_stsd(&format.sample_description);
        let stts = boxes::write_stts(&self.durations);
        let ctts = self
            .composition_offsets
            .iter()
            .any(|&o| o != 0)
            .then(|| boxes::write_ctts(&self.composition_offsets));
        let stss = (self.sync_samples.len() < self.sizes.len())
            .then(|| boxes::write_stss(&self.sync_samples));
        let stsz = boxes::write_stsz(&self.sizes);
        let stsc = boxes::write_stsc(&self.samples_per_chunk);
        let stco = boxes::write_chunk_offsets(&self.chunk_offsets);

        let mut stbl_children: Vec<&[u8]> = vec![stsd.as_slice(), stts.as_slice()];
        if let Some(ctts) = &ctts {
            stbl_children.push(ctts);
        }
        if let Some(stss) = &stss {
            stbl_children.push(stss);
        }
        stbl_children.extend([stsz.as_slice(), stsc.as_slice(), stco.as_slice()]);
        let stbl = boxes::write_container_box(b"stbl", &stbl_children);

        let minf = boxes::write_container_box(b"minf", &[&media_header, &dinf, &stbl]);
        let mdia = boxes::write_container_box(b"mdia", &[&mdhd, &hdlr, &minf]);
        boxes::write_container_box(b"trak", &[&tkhd, &mdia])
    }
}

/// Streaming MP4 writer.
///
/// Lifecycle: `create` → `add_track`* → `start` → `write_sample`* → `finish`.
/// Calls out of that order fail with [`Error::Write`].
pub struct Mp4Writer {
    path: PathBuf,
    out: BufWriter<Box<dyn WriteSeek>>,
    state: WriterState,
    tracks: Vec<OutputTrack>,
    mdat_start: u64,
    position: u64,
    current_track: Option<usize>,
}

impl std::fmt::Debug for Mp4Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mp4Writer")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("tracks", &self.tracks.len())
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl Mp4Writer {
    /// Create the output file, deleting anything already at `path`.
    pub fn create(fs: &dyn FileSystem, path: &Path) -> Result<Self> {
        if fs.exists(path) {
            fs.remove_file(path).map_err(|e| {
                Error::write(format!("cannot remove existing {}: {e}", path.display()))
            })?;
        }
        let file = fs
            .create(path)
            .map_err(|e| Error::write(format!("cannot create {}: {e}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            state: WriterState::Configuring,
            tracks: Vec::new(),
            mdat_start: 0,
            position: 0,
            current_track: None,
        })
    }

    /// Register a track. Must be called before [`start`](Self::start).
    pub fn add_track(&mut self, format: &TrackFormat) -> Result<OutputTrackId> {
        if self.state != WriterState::Configuring {
            return Err(Error::write("add_track called after start"));
        }
        if format.timescale == 0 {
            return Err(Error::write(format!("track {} has timescale 0", format.handler)));
        }
        if format.sample_description.is_empty() {
            return Err(Error::write(format!(
                "track {} has no sample description",
                format.handler
            )));
        }
        self.tracks.push(OutputTrack::new(format.clone()));
        Ok(OutputTrackId(self.tracks.len() - 1))
    }

    /// Write the file header and open the media data box.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            WriterState::Configuring => {}
            WriterState::Writing => return Err(Error::write("start called twice")),
            WriterState::Finished => return Err(Error::write("start called after finish")),
        }
        if self.tracks.is_empty() {
            return Err(Error::write("start called with no tracks"));
        }

        let ftyp = boxes::write_ftyp();
        self.emit(&ftyp)?;
        self.mdat_start = self.position;
        self.emit(&boxes::write_mdat_header(0))?;
        self.state = WriterState::Writing;
        Ok(())
    }

    /// Append one sample to `track`.
    ///
    /// Decode timestamps must not go backwards within a track.
    pub fn write_sample(&mut self, track: OutputTrackId, sample: &SampleView<'_>) -> Result<()> {
        match self.state {
            WriterState::Writing => {}
            WriterState::Configuring => return Err(Error::write("write_sample called before start")),
            WriterState::Finished => return Err(Error::write("write_sample called after finish")),
        }
        let index = track.0;
        let Some(output) = self.tracks.get(index) else {
            return Err(Error::write(format!("unknown output track {}", track.track_id())));
        };
        if let Some(last) = output.last_decode_us {
            if sample.decode_timestamp_us < last {
                return Err(Error::write(format!(
                    "timestamp regression on track {}: {} us after {} us",
                    track.track_id(),
                    sample.decode_timestamp_us,
                    last
                )));
            }
        }
        let size = u32::try_from(sample.size())
            .map_err(|_| Error::write(format!("sample of {} bytes is too large", sample.size())))?;

        let timescale = output.format.timescale;
        let duration = micros_to_ticks(sample.duration_us, timescale).clamp(0, u32::MAX as i64) as u32;
        // The file's decode timeline starts at zero, so the presentation
        // time lands in ctts relative to the accumulated durations.
        let composition_offset = (micros_to_ticks(sample.timestamp_us, timescale)
            - output.next_decode_ticks)
            .clamp(i32::MIN as i64, i32::MAX as i64) as i32;

        let offset = self.position;
        self.emit(sample.data)?;

        let new_chunk = self.current_track != Some(index);
        self.current_track = Some(index);
        let output = &mut self.tracks[index];
        if new_chunk {
            output.chunk_offsets.push(offset);
            output.samples_per_chunk.push(0);
        }
        if let Some(count) = output.samples_per_chunk.last_mut() {
            *count += 1;
        }
        output.sizes.push(size);
        output.durations.push(duration);
        output.next_decode_ticks += duration as i64;
        output.composition_offsets.push(composition_offset);
        if sample.is_sync {
            output.sync_samples.push(output.sizes.len() as u32);
        }
        output.last_decode_us = Some(sample.decode_timestamp_us);
        Ok(())
    }

    /// Patch the `mdat` size, append `moov`, flush, and sync to disk.
    ///
    /// Returns the final file size.
    pub fn finish(&mut self) -> Result<u64> {
        match self.state {
            WriterState::Writing => {}
            WriterState::Configuring => return Err(Error::write("finish called before start")),
            WriterState::Finished => return Err(Error::write("finish called twice")),
        }
        self.state = WriterState::Finished;

        let mdat_size = self.position - self.mdat_start;
        self.out
            .seek(SeekFrom::Start(self.mdat_start + boxes::MDAT_LARGESIZE_OFFSET))
            .and_then(|_| self.out.write_all(&mdat_size.to_be_bytes()))
            .and_then(|_| self.out.seek(SeekFrom::Start(self.position)))
            .map_err(|e| Error::write(format!("cannot patch mdat size: {e}")))?;

        let moov = self.build_moov();
        self.emit(&moov)?;

        self.out
            .flush()
            .and_then(|_| self.out.get_mut().sync())
            .map_err(|e| Error::write(format!("cannot flush {}: {e}", self.path.display())))?;

        tracing::debug!(
            path = %self.path.display(),
            tracks = self.tracks.len(),
            samples = self.tracks.iter().map(|t| t.sizes.len()).sum::<usize>(),
            bytes = self.position,
            "Finished container"
        );
        Ok(self.position)
    }

    fn build_moov(&self) -> Vec<u8> {
        let duration = self
            .tracks
            .iter()
            .map(OutputTrack::movie_duration)
            .max()
            .unwrap_or(0);
        let mvhd = boxes::write_mvhd(MOVIE_TIMESCALE, duration, self.tracks.len() as u32 + 1);
        let traks: Vec<Vec<u8>> = self
            .tracks
            .iter()
            .enumerate()
            .map(|(i, t)| t.build_trak(OutputTrackId(i).track_id()))
            .collect();

        let mut children: Vec<&[u8]> = vec![mvhd.as_slice()];
        children.extend(traks.iter().map(Vec::as_slice));
        boxes::write_container_box(b"moov", &children)
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.out
            .write_all(bytes)
            .map_err(|e| Error::write(format!("write to {} failed: {e}", self.path.display())))?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.position
    }

    /// Number of samples written to `track`.
    pub fn sample_count(&self, track: OutputTrackId) -> usize {
        self.tracks.get(track.0).map_or(0, |t| t.sizes.len())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{audio_format, video_format};
    use crate::fs::StdFileSystem;
    use crate::mp4::{parse_movie, TableScope};
    use std::io::Cursor;

    fn sample(ts_us: i64, duration_us: i64, is_sync: bool, data: &[u8]) -> SampleView<'_> {
        SampleView {
            track_index: 0,
            timestamp_us: ts_us,
            decode_timestamp_us: ts_us,
            duration_us,
            is_sync,
            data,
        }
    }

    fn new_writer() -> (tempfile::TempDir, PathBuf, Mp4Writer) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let writer = Mp4Writer::create(&StdFileSystem, &path).unwrap();
        (dir, path, writer)
    }

    #[test]
    fn written_file_parses_back() {
        let (_dir, path, mut writer) = new_writer();
        let video = writer.add_track(&video_format()).unwrap();
        let audio = writer.add_track(&audio_format()).unwrap();
        assert_eq!(video.track_id(), 1);
        assert_eq!(audio.track_id(), 2);
        writer.start().unwrap();

        for i in 0..6 {
            let data = vec![i as u8; 100 + i];
            writer
                .write_sample(video, &sample(i as i64 * 100_000, 100_000, i % 3 == 0, &data))
                .unwrap();
        }
        for i in 0..4 {
            let data = vec![0xA0; 32];
            let ts = crate::fixture::audio_frame_us(i);
            writer.write_sample(audio, &sample(ts, 21_333, true, &data)).unwrap();
        }
        let size = writer.finish().unwrap();
        assert_eq!(size, std::fs::metadata(&path).unwrap().len());

        let bytes = std::fs::read(&path).unwrap();
        let movie = parse_movie(&mut Cursor::new(&bytes), TableScope::All).unwrap();
        assert_eq!(movie.tracks.len(), 2);

        let v = movie.tracks[0].table.as_ref().unwrap();
        assert_eq!(v.samples.len(), 6);
        let syncs: Vec<bool> = v.samples.iter().map(|s| s.is_sync).collect();
        assert_eq!(syncs, vec![true, false, false, true, false, false]);
        assert_eq!(v.samples[5].size, 105);
        let payload_at = v.samples[5].file_offset as usize;
        assert_eq!(&bytes[payload_at..payload_at + 105], &[5u8; 105][..]);
        assert_eq!(v.samples[5].decode_timestamp, 5 * 9000);

        let a = movie.tracks[1].table.as_ref().unwrap();
        assert_eq!(a.samples.len(), 4);
        assert!(a.samples.iter().all(|s| s.duration == 1024));
        assert_eq!(movie.tracks[1].format.sample_description, audio_format().sample_description);

        // Sequential per-track writing yields one chunk per track.
        assert_eq!(v.samples[1].file_offset, v.samples[0].file_offset + 100);
        assert_eq!(a.samples[0].file_offset, v.samples[5].file_offset + 105);
    }

    #[test]
    fn mdat_size_is_patched() {
        let (_dir, path, mut writer) = new_writer();
        let video = writer.add_track(&video_format()).unwrap();
        writer.start().unwrap();
        let data = vec![1u8; 500];
        writer.write_sample(video, &sample(0, 100_000, true, &data)).unwrap();
        writer.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let ftyp_len = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
        assert_eq!(&bytes[ftyp_len + 4..ftyp_len + 8], b"mdat");
        let mdat_size = u64::from_be_bytes(bytes[ftyp_len + 8..ftyp_len + 16].try_into().unwrap());
        assert_eq!(mdat_size, 16 + 500);
        assert_eq!(&bytes[ftyp_len + 16 + 500 + 4..ftyp_len + 16 + 500 + 8], b"moov");
    }

    #[test]
    fn interleaved_writes_start_new_chunks() {
        let (_dir, path, mut writer) = new_writer();
        let video = writer.add_track(&video_format()).unwrap();
        let audio = writer.add_track(&audio_format()).unwrap();
        writer.start().unwrap();
        let data = [0u8; 10];
        writer.write_sample(video, &sample(0, 100_000, true, &data)).unwrap();
        writer.write_sample(audio, &sample(0, 21_333, true, &data)).unwrap();
        writer.write_sample(video, &sample(100_000, 100_000, false, &data)).unwrap();
        writer.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let movie = parse_movie(&mut Cursor::new(&bytes), TableScope::All).unwrap();
        let v = movie.tracks[0].table.as_ref().unwrap();
        assert_eq!(v.samples[1].file_offset, v.samples[0].file_offset + 20);
    }

    #[test]
    fn composition_offsets_survive() {
        let (_dir, path, mut writer) = new_writer();
        let video = writer.add_track(&video_format()).unwrap();
        writer.start().unwrap();
        let data = [0u8; 8];
        let mut s = sample(0, 100_000, true, &data);
        s.timestamp_us = 200_000;
        writer.write_sample(video, &s).unwrap();
        writer.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let movie = parse_movie(&mut Cursor::new(&bytes), TableScope::All).unwrap();
        let v = movie.tracks[0].table.as_ref().unwrap();
        assert_eq!(v.samples[0].composition_offset, 18_000);
    }

    #[test]
    fn leading_presentation_offset_is_kept() {
        let (_dir, path, mut writer) = new_writer();
        let audio = writer.add_track(&audio_format()).unwrap();
        writer.start().unwrap();
        let data = [0u8; 8];
        for i in 0..3 {
            // Timeline shifted by 256 ticks, as a shared anchor leaves it.
            let ts = crate::fixture::audio_frame_us(i) + 5_333;
            writer.write_sample(audio, &sample(ts, 21_333, true, &data)).unwrap();
        }
        writer.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let movie = parse_movie(&mut Cursor::new(&bytes), TableScope::All).unwrap();
        let a = movie.tracks[0].table.as_ref().unwrap();
        let offsets: Vec<i32> = a.samples.iter().map(|s| s.composition_offset).collect();
        assert_eq!(offsets, vec![256, 256, 256]);
        assert_eq!(a.samples[2].decode_timestamp, 2048);
    }

    #[test]
    fn reordered_presentation_goes_negative() {
        let (_dir, path, mut writer) = new_writer();
        let video = writer.add_track(&video_format()).unwrap();
        writer.start().unwrap();
        let data = [0u8; 8];
        // Decode order I P B: presentation 0, 200 ms, 100 ms.
        for (i, pts) in [0i64, 200_000, 100_000].into_iter().enumerate() {
            let mut s = sample(i as i64 * 100_000, 100_000, i == 0, &data);
            s.timestamp_us = pts;
            writer.write_sample(video, &s).unwrap();
        }
        writer.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let movie = parse_movie(&mut Cursor::new(&bytes), TableScope::All).unwrap();
        let v = movie.tracks[0].table.as_ref().unwrap();
        let offsets: Vec<i32> = v.samples.iter().map(|s| s.composition_offset).collect();
        assert_eq!(offsets, vec![0, 9000, -9000]);
    }

    #[test]
    fn misuse_is_rejected() {
        let (_dir, _path, mut writer) = new_writer();
        assert!(matches!(writer.start(), Err(Error::Write(_))));
        let video = writer.add_track(&video_format()).unwrap();
        let data = [0u8; 4];
        assert!(matches!(
            writer.write_sample(video, &sample(0, 1, true, &data)),
            Err(Error::Write(_))
        ));
        assert!(matches!(writer.finish(), Err(Error::Write(_))));

        writer.start().unwrap();
        assert!(matches!(writer.start(), Err(Error::Write(_))));
        assert!(matches!(writer.add_track(&audio_format()), Err(Error::Write(_))));

        writer.write_sample(video, &sample(100, 1, true, &data)).unwrap();
        let err = writer.write_sample(video, &sample(50, 1, true, &data)).unwrap_err();
        assert!(err.to_string().contains("regression"));

        writer.finish().unwrap();
        assert!(matches!(writer.finish(), Err(Error::Write(_))));
        assert!(matches!(
            writer.write_sample(video, &sample(200, 1, true, &data)),
            Err(Error::Write(_))
        ));
    }

    #[test]
    fn create_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        std::fs::write(&path, vec![0xEE; 4096]).unwrap();
        let mut writer = Mp4Writer::create(&StdFileSystem, &path).unwrap();
        let video = writer.add_track(&video_format()).unwrap();
        writer.start().unwrap();
        writer.write_sample(video, &sample(0, 100_000, true, &[1, 2, 3])).unwrap();
        let size = writer.finish().unwrap();
        assert!(size < 4096);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), size);
    }

    #[test]
    fn descriptorless_track_is_rejected() {
        let (_dir, _path, mut writer) = new_writer();
        let mut format = video_format();
        format.sample_description.clear();
        assert!(matches!(writer.add_track(&format), Err(Error::Write(_))));
    }
}
