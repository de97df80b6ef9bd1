//! MP4 `moov` parsing.
//!
//! Walks `moov > trak > mdia > minf > stbl` and produces one [`MovieTrack`]
//! per `trak`, optionally resolving its sample table.

pub mod atoms;
pub(crate) mod boxes;
pub mod sample_table;

use std::io::{self, Read, Seek, SeekFrom};

use atoms::{
    child_boxes, find_child_box, find_in_range, read_bytes, read_fourcc, read_fullbox_header,
    read_i32, read_u16, read_u32, read_versioned_u64, require_child_box, BoxHeader,
};
use rc_core::MediaKind;
pub use sample_table::{ResolvedSample, ResolvedSampleTable};

use crate::track::{FourCc, TrackFormat};

/// Parsed `moov` contents.
#[derive(Debug, Clone)]
pub(crate) struct Movie {
    pub timescale: u32,
    pub duration: u64,
    pub tracks: Vec<MovieTrack>,
}

/// One parsed `trak`.
#[derive(Debug, Clone)]
pub(crate) struct MovieTrack {
    pub index: u32,
    pub track_id: u32,
    pub format: TrackFormat,
    /// Duration from `mdhd`, in media timescale ticks.
    pub media_duration: u64,
    /// Present when requested by the [`TableScope`].
    pub table: Option<ResolvedSampleTable>,
}

/// Which sample tables [`parse_movie`] resolves.
///
/// Tables of unsupported tracks are never resolved, so a damaged subtitle
/// or data track cannot fail the parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TableScope {
    /// Every video and audio track.
    All,
    /// Only the track at this index; others are described but not resolved.
    Only(u32),
}

impl TableScope {
    fn includes(self, index: u32) -> bool {
        match self {
            TableScope::All => true,
            TableScope::Only(i) => i == index,
        }
    }
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Parse the `moov` box of a progressive MP4.
pub(crate) fn parse_movie<R: Read + Seek>(reader: &mut R, scope: TableScope) -> io::Result<Movie> {
    let file_len = reader.seek(SeekFrom::End(0))?;

    let moov = find_in_range(reader, 0, file_len, b"moov")?
        .ok_or_else(|| invalid("no moov box found"))?;

    require_child_box(reader, &moov, b"mvhd")?;
    let (timescale, duration) = parse_mvhd(reader)?;

    let mut tracks = Vec::new();
    let traks = child_boxes(reader, moov.content_start(), moov.end())?
        .into_iter()
        .filter(|h| &h.box_type == b"trak");
    for (index, trak) in traks.enumerate() {
        let index = index as u32;
        tracks.push(parse_trak(reader, &trak, index, scope.includes(index), file_len)?);
    }

    Ok(Movie {
        timescale,
        duration,
        tracks,
    })
}

/// Parse mvhd, return (timescale, duration).
fn parse_mvhd<R: Read>(reader: &mut R) -> io::Result<(u32, u64)> {
    let (version, _flags) = read_fullbox_header(reader)?;
    let _creation = read_versioned_u64(reader, version)?;
    let _modification = read_versioned_u64(reader, version)?;
    let timescale = read_u32(reader)?;
    let duration = read_versioned_u64(reader, version)?;
    Ok((timescale, duration))
}

fn parse_trak<R: Read + Seek>(
    reader: &mut R,
    trak: &BoxHeader,
    index: u32,
    resolve: bool,
    data_limit: u64,
) -> io::Result<MovieTrack> {
    require_child_box(reader, trak, b"tkhd")?;
    let tkhd = parse_tkhd(reader)?;

    let mdia = require_child_box(reader, trak, b"mdia")?;
    require_child_box(reader, &mdia, b"mdhd")?;
    let (timescale, media_duration, language) = parse_mdhd(reader)?;

    let hdlr = require_child_box(reader, &mdia, b"hdlr")?;
    let (handler, handler_name) = parse_hdlr(reader, &hdlr)?;
    let kind = MediaKind::from_handler(&handler);

    let stbl = match find_child_box(reader, &mdia, b"minf")? {
        Some(minf) => find_child_box(reader, &minf, b"stbl")?,
        None => None,
    };

    let sample_description = match stbl {
        Some(stbl) => match find_child_box(reader, &stbl, b"stsd")? {
            Some(stsd) => read_bytes(reader, stsd.content_size() as usize)?,
            None => Vec::new(),
        },
        None => Vec::new(),
    };
    if kind.is_supported() && sample_description.is_empty() {
        return Err(invalid(format!("track {index} has no sample description")));
    }

    let table = match (resolve && kind.is_supported(), stbl) {
        (true, Some(stbl)) => Some(sample_table::resolve_sample_table(
            reader, &stbl, timescale, data_limit,
        )?),
        (true, None) => return Err(invalid(format!("track {index} has no stbl"))),
        (false, _) => None,
    };

    let format = TrackFormat {
        kind,
        handler: FourCc(handler),
        codec: TrackFormat::codec_from_sample_description(&sample_description),
        timescale,
        language,
        width: tkhd.width,
        height: tkhd.height,
        volume: tkhd.volume,
        matrix: tkhd.matrix,
        handler_name,
        sample_description,
    };

    Ok(MovieTrack {
        index,
        track_id: tkhd.track_id,
        format,
        media_duration,
        table,
    })
}

struct TkhdFields {
    track_id: u32,
    volume: u16,
    matrix: [i32; 9],
    width: u32,
    height: u32,
}

fn parse_tkhd<R: Read>(reader: &mut R) -> io::Result<TkhdFields> {
    let (version, _flags) = read_fullbox_header(reader)?;
    let _creation = read_versioned_u64(reader, version)?;
    let _modification = read_versioned_u64(reader, version)?;
    let track_id = read_u32(reader)?;
    let _reserved = read_u32(reader)?;
    let _duration = read_versioned_u64(reader, version)?;
    // reserved(8) + layer(2) + alternate_group(2)
    let _ = read_bytes(reader, 12)?;
    let volume = read_u16(reader)?;
    let _reserved = read_u16(reader)?;
    let mut matrix = [0i32; 9];
    for value in &mut matrix {
        *value = read_i32(reader)?;
    }
    let width = read_u32(reader)?;
    let height = read_u32(reader)?;
    Ok(TkhdFields {
        track_id,
        volume,
        matrix,
        width,
        height,
    })
}

/// Parse mdhd, return (timescale, duration, language).
fn parse_mdhd<R: Read>(reader: &mut R) -> io::Result<(u32, u64, u16)> {
    let (version, _flags) = read_fullbox_header(reader)?;
    let _creation = read_versioned_u64(reader, version)?;
    let _modification = read_versioned_u64(reader, version)?;
    let timescale = read_u32(reader)?;
    let duration = read_versioned_u64(reader, version)?;
    let language = read_u16(reader)? & 0x7FFF;
    Ok((timescale, duration, language))
}

/// Parse hdlr, return (handler_type, name).
fn parse_hdlr<R: Read>(reader: &mut R, header: &BoxHeader) -> io::Result<([u8; 4], String)> {
    let (_version, _flags) = read_fullbox_header(reader)?;
    let _pre_defined = read_u32(reader)?;
    let handler = read_fourcc(reader)?;
    let _reserved = read_bytes(reader, 12)?;
    let name_len = header.content_size().saturating_sub(24) as usize;
    let raw = read_bytes(reader, name_len)?;
    let name = raw.split(|&b| b == 0).next().unwrap_or_default();
    Ok((handler, String::from_utf8_lossy(name).into_owned()))
}
