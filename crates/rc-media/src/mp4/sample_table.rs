//! Parse MP4 sample table atoms (stts, ctts, stss, stsz, stsc, stco, co64)
//! and resolve them into a flat, decode-ordered list of samples with
//! absolute file offsets.

use std::io::{self, Read, Seek};

use super::atoms::{
    find_child_box, read_fullbox_header, read_i32, read_u32, read_u64, require_child_box,
    BoxHeader,
};

/// A fully resolved sample with absolute file position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSample {
    pub index: u32,
    pub file_offset: u64,
    pub size: u32,
    /// Duration in media timescale ticks.
    pub duration: u32,
    /// Presentation minus decode time, in ticks.
    pub composition_offset: i32,
    pub is_sync: bool,
    /// Decode time in ticks.
    pub decode_timestamp: u64,
}

impl ResolvedSample {
    /// Presentation time in ticks.
    pub fn presentation_timestamp(&self) -> i64 {
        self.decode_timestamp as i64 + self.composition_offset as i64
    }
}

/// A resolved sample table for one track.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSampleTable {
    pub samples: Vec<ResolvedSample>,
    pub timescale: u32,
}

impl ResolvedSampleTable {
    /// Sum of all sample durations, in ticks.
    pub fn duration_ticks(&self) -> u64 {
        self.samples.iter().map(|s| s.duration as u64).sum()
    }

    /// Sum of all sample sizes, in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.samples.iter().map(|s| s.size as u64).sum()
    }
}

/// (count, delta) pair from stts.
struct SttsEntry {
    count: u32,
    delta: u32,
}

/// (count, offset) pair from ctts.
struct CttsEntry {
    count: u32,
    offset: i32,
}

/// (first_chunk, samples_per_chunk) from stsc; the description index is
/// not needed because descriptors are copied as a whole.
struct StscEntry {
    first_chunk: u32,
    samples_per_chunk: u32,
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Cap preallocation so a corrupt entry count cannot exhaust memory before
/// the reads fail.
fn capacity_hint(count: u32) -> usize {
    (count as usize).min(1 << 16)
}

fn parse_stts<R: Read>(reader: &mut R) -> io::Result<Vec<SttsEntry>> {
    let (_version, _flags) = read_fullbox_header(reader)?;
    let entry_count = read_u32(reader)?;
    let mut entries = Vec::with_capacity(capacity_hint(entry_count));
    for _ in 0..entry_count {
        let count = read_u32(reader)?;
        let delta = read_u32(reader)?;
        entries.push(SttsEntry { count, delta });
    }
    Ok(entries)
}

fn parse_ctts<R: Read>(reader: &mut R) -> io::Result<Vec<CttsEntry>> {
    let (version, _flags) = read_fullbox_header(reader)?;
    let entry_count = read_u32(reader)?;
    let mut entries = Vec::with_capacity(capacity_hint(entry_count));
    for _ in 0..entry_count {
        let count = read_u32(reader)?;
        let offset = if version == 0 {
            read_u32(reader)? as i32
        } else {
            read_i32(reader)?
        };
        entries.push(CttsEntry { count, offset });
    }
    Ok(entries)
}

/// Returns 0-based sync sample indices.
fn parse_stss<R: Read>(reader: &mut R) -> io::Result<Vec<u32>> {
    let (_version, _flags) = read_fullbox_header(reader)?;
    let entry_count = read_u32(reader)?;
    let mut syncs = Vec::with_capacity(capacity_hint(entry_count));
    for _ in 0..entry_count {
        let sample_number = read_u32(reader)?;
        // stss uses 1-based sample numbers.
        let index = sample_number
            .checked_sub(1)
            .ok_or_else(|| invalid("stss references sample 0"))?;
        syncs.push(index);
    }
    Ok(syncs)
}

fn parse_stsz<R: Read>(reader: &mut R, data_limit: u64) -> io::Result<Vec<u32>> {
    let (_version, _flags) = read_fullbox_header(reader)?;
    let sample_size = read_u32(reader)?;
    let sample_count = read_u32(reader)?;
    if sample_size != 0 {
        // A constant size expands to one entry per sample without reading
        // anything, so the declared payload must fit in the file first.
        if sample_count as u64 * sample_size as u64 > data_limit {
            return Err(invalid(format!(
                "stsz declares {sample_count} samples of {sample_size} bytes in a {data_limit}-byte file"
            )));
        }
        Ok(vec![sample_size; sample_count as usize])
    } else {
        let mut sizes = Vec::with_capacity(capacity_hint(sample_count));
        for _ in 0..sample_count {
            sizes.push(read_u32(reader)?);
        }
        Ok(sizes)
    }
}

fn parse_stsc<R: Read>(reader: &mut R) -> io::Result<Vec<StscEntry>> {
    let (_version, _flags) = read_fullbox_header(reader)?;
    let entry_count = read_u32(reader)?;
    let mut entries = Vec::with_capacity(capacity_hint(entry_count));
    for _ in 0..entry_count {
        let first_chunk = read_u32(reader)?;
        let samples_per_chunk = read_u32(reader)?;
        let _sdi = read_u32(reader)?;
        entries.push(StscEntry {
            first_chunk,
            samples_per_chunk,
        });
    }
    Ok(entries)
}

fn parse_chunk_offsets<R: Read>(reader: &mut R, is_co64: bool) -> io::Result<Vec<u64>> {
    let (_version, _flags) = read_fullbox_header(reader)?;
    let entry_count = read_u32(reader)?;
    let mut offsets = Vec::with_capacity(capacity_hint(entry_count));
    for _ in 0..entry_count {
        if is_co64 {
            offsets.push(read_u64(reader)?);
        } else {
            offsets.push(read_u32(reader)? as u64);
        }
    }
    Ok(offsets)
}

/// Resolve the sample table held by `stbl`.
///
/// Every sample must lie within the first `data_limit` bytes of the file.
pub fn resolve_sample_table<R: Read + Seek>(
    reader: &mut R,
    stbl: &BoxHeader,
    timescale: u32,
    data_limit: u64,
) -> io::Result<ResolvedSampleTable> {
    require_child_box(reader, stbl, b"stts")?;
    let stts_entries = parse_stts(reader)?;

    let ctts_entries = match find_child_box(reader, stbl, b"ctts")? {
        Some(_) => parse_ctts(reader)?,
        None => Vec::new(),
    };

    // No stss means every sample is sync.
    let sync_indices = match find_child_box(reader, stbl, b"stss")? {
        Some(_) => Some(parse_stss(reader)?),
        None => None,
    };

    let sizes = match find_child_box(reader, stbl, b"stsz")? {
        Some(_) => parse_stsz(reader, data_limit)?,
        None => return Err(invalid("missing stsz box (stz2 is not supported)")),
    };

    require_child_box(reader, stbl, b"stsc")?;
    let stsc_entries = parse_stsc(reader)?;

    let chunk_offsets = if find_child_box(reader, stbl, b"stco")?.is_some() {
        parse_chunk_offsets(reader, false)?
    } else if find_child_box(reader, stbl, b"co64")?.is_some() {
        parse_chunk_offsets(reader, true)?
    } else {
        return Err(invalid("missing stco/co64 box"));
    };

    let sample_count = sizes.len();
    if sample_count == 0 {
        return Ok(ResolvedSampleTable {
            samples: Vec::new(),
            timescale,
        });
    }
    if stsc_entries.is_empty() {
        return Err(invalid("stsc has no entries but the track has samples"));
    }

    // Walk chunks, assigning file offsets to samples. stsc entries use
    // 1-based chunk numbers and apply until the next entry's first chunk.
    let mut placements: Vec<(u64, u32)> = Vec::with_capacity(capacity_hint(sample_count as u32));
    let mut stsc_cursor = 0usize;
    for (chunk_idx, &chunk_offset) in chunk_offsets.iter().enumerate() {
        let chunk_number = chunk_idx as u32 + 1;
        while stsc_cursor + 1 < stsc_entries.len()
            && stsc_entries[stsc_cursor + 1].first_chunk <= chunk_number
        {
            stsc_cursor += 1;
        }
        let mut offset = chunk_offset;
        for _ in 0..stsc_entries[stsc_cursor].samples_per_chunk {
            let Some(&size) = sizes.get(placements.len()) else {
                break;
            };
            let end = offset
                .checked_add(size as u64)
                .filter(|&end| end <= data_limit)
                .ok_or_else(|| {
                    invalid(format!(
                        "sample {} ({size} bytes at {offset}) lies outside the {data_limit}-byte file",
                        placements.len()
                    ))
                })?;
            placements.push((offset, size));
            offset = end;
        }
        if placements.len() == sample_count {
            break;
        }
    }
    if placements.len() < sample_count {
        return Err(invalid(format!(
            "chunk table covers {} of {sample_count} samples",
            placements.len()
        )));
    }

    let mut timing = Vec::with_capacity(placements.len());
    let mut dts: u64 = 0;
    'stts: for entry in &stts_entries {
        for _ in 0..entry.count {
            if timing.len() == sample_count {
                break 'stts;
            }
            timing.push((dts, entry.delta));
            dts += entry.delta as u64;
        }
    }
    if timing.len() < sample_count {
        return Err(invalid(format!(
            "stts covers {} of {sample_count} samples",
            timing.len()
        )));
    }

    let mut cts_offsets = vec![0i32; sample_count];
    let mut i = 0usize;
    'ctts: for entry in &ctts_entries {
        for _ in 0..entry.count {
            if i == sample_count {
                break 'ctts;
            }
            cts_offsets[i] = entry.offset;
            i += 1;
        }
    }

    let mut sync_flags = vec![sync_indices.is_none(); sample_count];
    for index in sync_indices.into_iter().flatten() {
        if let Some(flag) = sync_flags.get_mut(index as usize) {
            *flag = true;
        }
    }

    let samples = placements
        .into_iter()
        .zip(timing)
        .enumerate()
        .map(|(i, ((file_offset, size), (decode_timestamp, duration)))| ResolvedSample {
            index: i as u32,
            file_offset,
            size,
            duration,
            composition_offset: cts_offsets[i],
            is_sync: sync_flags[i],
            decode_timestamp,
        })
        .collect();

    Ok(ResolvedSampleTable { samples, timescale })
}
