//! ISO BMFF box serialization for progressive (non-fragmented) output.
//!
//! Each box follows the standard layout: 4-byte size (big-endian u32),
//! 4-byte type (ASCII), then box-specific content. Sample tables are built
//! from plain per-sample vectors and run-length compressed here.

use crate::track::TrackFormat;

// ---------------------------------------------------------------------------
// Low-level box writing helpers
// ---------------------------------------------------------------------------

/// Write a complete box: size (u32 BE) + type (4 ASCII bytes) + content.
pub(crate) fn write_box(box_type: &[u8; 4], content: &[u8]) -> Vec<u8> {
    let size = (8 + content.len()) as u32;
    let mut out = Vec::with_capacity(size as usize);
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(box_type);
    out.extend_from_slice(content);
    out
}

/// Write a container box (size + type + children concatenated).
pub(crate) fn write_container_box(box_type: &[u8; 4], children: &[&[u8]]) -> Vec<u8> {
    let children_len: usize = children.iter().map(|c| c.len()).sum();
    let size = (8 + children_len) as u32;
    let mut out = Vec::with_capacity(size as usize);
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(box_type);
    for child in children {
        out.extend_from_slice(child);
    }
    out
}

/// Version + flags word of a full box.
pub(crate) fn fullbox_header(version: u8, flags: u32) -> [u8; 4] {
    let val = ((version as u32) << 24) | (flags & 0x00FFFFFF);
    val.to_be_bytes()
}

fn write_matrix(content: &mut Vec<u8>, matrix: &[i32; 9]) {
    for value in matrix {
        content.extend_from_slice(&value.to_be_bytes());
    }
}

// ---------------------------------------------------------------------------
// File-level boxes
// ---------------------------------------------------------------------------

/// `ftyp` box. Major brand "isom", minor version 0x200, compatible brands
/// isom, iso2, mp41.
pub(crate) fn write_ftyp() -> Vec<u8> {
    let mut content = Vec::with_capacity(20);
    content.extend_from_slice(b"isom");
    content.extend_from_slice(&0x200u32.to_be_bytes());
    content.extend_from_slice(b"isom");
    content.extend_from_slice(b"iso2");
    content.extend_from_slice(b"mp41");
    write_box(b"ftyp", &content)
}

/// Size of the `mdat` header written by [`write_mdat_header`].
pub(crate) const MDAT_HEADER_SIZE: u64 = 16;

/// Offset of the 64-bit size field inside the `mdat` header.
pub(crate) const MDAT_LARGESIZE_OFFSET: u64 = 8;

/// `mdat` header using the 64-bit size form. `total_size` includes the
/// header; pass 0 for a placeholder to be patched later.
pub(crate) fn write_mdat_header(total_size: u64) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..4].copy_from_slice(&1u32.to_be_bytes());
    out[4..8].copy_from_slice(b"mdat");
    out[8..].copy_from_slice(&total_size.to_be_bytes());
    out
}

// ---------------------------------------------------------------------------
// Movie and track headers (version 1 for 64-bit durations)
// ---------------------------------------------------------------------------

pub(crate) fn write_mvhd(timescale: u32, duration: u64, next_track_id: u32) -> Vec<u8> {
    let mut content = Vec::with_capacity(112);
    content.extend_from_slice(&fullbox_header(1, 0));
    // creation_time, modification_time
    content.extend_from_slice(&0u64.to_be_bytes());
    content.extend_from_slice(&0u64.to_be_bytes());
    content.extend_from_slice(&timescale.to_be_bytes());
    content.extend_from_slice(&duration.to_be_bytes());
    // rate = 1.0 (16.16), volume = 1.0 (8.8)
    content.extend_from_slice(&0x00010000u32.to_be_bytes());
    content.extend_from_slice(&0x0100u16.to_be_bytes());
    content.extend_from_slice(&[0u8; 10]);
    write_matrix(&mut content, &crate::track::IDENTITY_MATRIX);
    // pre_defined
    content.extend_from_slice(&[0u8; 24]);
    content.extend_from_slice(&next_track_id.to_be_bytes());

    write_box(b"mvhd", &content)
}

/// `tkhd` carrying the source track's geometry, volume, and transform.
pub(crate) fn write_tkhd(track_id: u32, duration: u64, format: &TrackFormat) -> Vec<u8> {
    let mut content = Vec::with_capacity(96);
    // flags = 7 (enabled | in_movie | in_preview)
    content.extend_from_slice(&fullbox_header(1, 7));
    content.extend_from_slice(&0u64.to_be_bytes());
    content.extend_from_slice(&0u64.to_be_bytes());
    content.extend_from_slice(&track_id.to_be_bytes());
    content.extend_from_slice(&0u32.to_be_bytes());
    content.extend_from_slice(&duration.to_be_bytes());
    content.extend_from_slice(&[0u8; 8]);
    // layer, alternate_group
    content.extend_from_slice(&0u16.to_be_bytes());
    content.extend_from_slice(&0u16.to_be_bytes());
    content.extend_from_slice(&format.volume.to_be_bytes());
    content.extend_from_slice(&0u16.to_be_bytes());
    write_matrix(&mut content, &format.matrix);
    content.extend_from_slice(&format.width.to_be_bytes());
    content.extend_from_slice(&format.height.to_be_bytes());

    write_box(b"tkhd", &content)
}

pub(crate) fn write_mdhd(timescale: u32, duration: u64, language: u16) -> Vec<u8> {
    let mut content = Vec::with_capacity(36);
    content.extend_from_slice(&fullbox_header(1, 0));
    content.extend_from_slice(&0u64.to_be_bytes());
    content.extend_from_slice(&0u64.to_be_bytes());
    content.extend_from_slice(&timescale.to_be_bytes());
    content.extend_from_slice(&duration.to_be_bytes());
    content.extend_from_slice(&(language & 0x7FFF).to_be_bytes());
    content.extend_from_slice(&0u16.to_be_bytes());

    write_box(b"mdhd", &content)
}

pub(crate) fn write_hdlr(handler_type: &[u8; 4], name: &str) -> Vec<u8> {
    let mut content = Vec::with_capacity(25 + name.len());
    content.extend_from_slice(&fullbox_header(0, 0));
    // pre_defined
    content.extend_from_slice(&0u32.to_be_bytes());
    content.extend_from_slice(handler_type);
    content.extend_from_slice(&[0u8; 12]);
    // name (null-terminated)
    content.extend_from_slice(name.as_bytes());
    content.push(0);

    write_box(b"hdlr", &content)
}

// ---------------------------------------------------------------------------
// Media information
// ---------------------------------------------------------------------------

/// `dinf` with a single self-contained `url ` reference.
pub(crate) fn write_dinf() -> Vec<u8> {
    let url_box = write_box(b"url ", &fullbox_header(0, 1));
    let dref_box = {
        let mut c = Vec::with_capacity(8 + url_box.len());
        c.extend_from_slice(&fullbox_header(0, 0));
        c.extend_from_slice(&1u32.to_be_bytes());
        c.extend_from_slice(&url_box);
        write_box(b"dref", &c)
    };
    write_container_box(b"dinf", &[&dref_box])
}

pub(crate) fn write_vmhd() -> Vec<u8> {
    let mut content = Vec::with_capacity(12);
    content.extend_from_slice(&fullbox_header(0, 1));
    // graphicsmode + opcolor
    content.extend_from_slice(&[0u8; 8]);
    write_box(b"vmhd", &content)
}

pub(crate) fn write_smhd() -> Vec<u8> {
    let mut content = Vec::with_capacity(8);
    content.extend_from_slice(&fullbox_header(0, 0));
    // balance + reserved
    content.extend_from_slice(&[0u8; 4]);
    write_box(b"smhd", &content)
}

/// Null media header for tracks that are neither video nor audio.
pub(crate) fn write_nmhd() -> Vec<u8> {
    write_box(b"nmhd", &fullbox_header(0, 0))
}

/// `stsd` from raw content copied out of the source container.
pub(crate) fn write_stsd(sample_description: &[u8]) -> Vec<u8> {
    write_box(b"stsd", sample_description)
}

// ---------------------------------------------------------------------------
// Sample tables
// ---------------------------------------------------------------------------

/// Collapse consecutive equal values into (count, value) runs.
fn runs<T: Copy + PartialEq>(values: &[T]) -> Vec<(u32, T)> {
    let mut out: Vec<(u32, T)> = Vec::new();
    for &v in values {
        match out.last_mut() {
            Some((count, last)) if *last == v => *count += 1,
            _ => out.push((1, v)),
        }
    }
    out
}

/// `stts` from per-sample durations in ticks.
pub(crate) fn write_stts(durations: &[u32]) -> Vec<u8> {
    let entries = runs(durations);
    let mut content = Vec::with_capacity(8 + entries.len() * 8);
    content.extend_from_slice(&fullbox_header(0, 0));
    content.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for (count, delta) in entries {
        content.extend_from_slice(&count.to_be_bytes());
        content.extend_from_slice(&delta.to_be_bytes());
    }
    write_box(b"stts", &content)
}

/// `ctts` from per-sample composition offsets in ticks. Version 1 (signed)
/// when any offset is negative.
pub(crate) fn write_ctts(offsets: &[i32]) -> Vec<u8> {
    let version = if offsets.iter().any(|&o| o < 0) { 1 } else { 0 };
    let entries = runs(offsets);
    let mut content = Vec::with_capacity(8 + entries.len() * 8);
    content.extend_from_slice(&fullbox_header(version, 0));
    content.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for (count, offset) in entries {
        content.extend_from_slice(&count.to_be_bytes());
        content.extend_from_slice(&offset.to_be_bytes());
    }
    write_box(b"ctts", &content)
}

/// `stss` from 1-based sync sample numbers.
pub(crate) fn write_stss(sample_numbers: &[u32]) -> Vec<u8> {
    let mut content = Vec::with_capacity(8 + sample_numbers.len() * 4);
    content.extend_from_slice(&fullbox_header(0, 0));
    content.extend_from_slice(&(sample_numbers.len() as u32).to_be_bytes());
    for n in sample_numbers {
        content.extend_from_slice(&n.to_be_bytes());
    }
    write_box(b"stss", &content)
}

/// `stsz` from per-sample sizes, using the fixed-size form when possible.
pub(crate) fn write_stsz(sizes: &[u32]) -> Vec<u8> {
    let uniform = match sizes.first() {
        Some(&first) if sizes.iter().all(|&s| s == first) => Some(first),
        _ => None,
    };
    let mut content = Vec::with_capacity(12 + sizes.len() * 4);
    content.extend_from_slice(&fullbox_header(0, 0));
    match uniform {
        Some(size) => {
            content.extend_from_slice(&size.to_be_bytes());
            content.extend_from_slice(&(sizes.len() as u32).to_be_bytes());
        }
        None => {
            content.extend_from_slice(&0u32.to_be_bytes());
            content.extend_from_slice(&(sizes.len() as u32).to_be_bytes());
            for size in sizes {
                content.extend_from_slice(&size.to_be_bytes());
            }
        }
    }
    write_box(b"stsz", &content)
}

/// `stsc` from the number of samples in each chunk. Every chunk uses
/// sample description 1.
pub(crate) fn write_stsc(samples_per_chunk: &[u32]) -> Vec<u8> {
    let mut entries: Vec<(u32, u32)> = Vec::new();
    for (i, &count) in samples_per_chunk.iter().enumerate() {
        if entries.last().map(|&(_, c)| c) != Some(count) {
            entries.push((i as u32 + 1, count));
        }
    }
    let mut content = Vec::with_capacity(8 + entries.len() * 12);
    content.extend_from_slice(&fullbox_header(0, 0));
    content.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for (first_chunk, count) in entries {
        content.extend_from_slice(&first_chunk.to_be_bytes());
        content.extend_from_slice(&count.to_be_bytes());
        content.extend_from_slice(&1u32.to_be_bytes());
    }
    write_box(b"stsc", &content)
}

/// `stco`, or `co64` when any offset does not fit in 32 bits.
pub(crate) fn write_chunk_offsets(offsets: &[u64]) -> Vec<u8> {
    let wide = offsets.iter().any(|&o| o > u32::MAX as u64);
    let mut content = Vec::with_capacity(8 + offsets.len() * if wide { 8 } else { 4 });
    content.extend_from_slice(&fullbox_header(0, 0));
    content.extend_from_slice(&(offsets.len() as u32).to_be_bytes());
    for &offset in offsets {
        if wide {
            content.extend_from_slice(&offset.to_be_bytes());
        } else {
            content.extend_from_slice(&(offset as u32).to_be_bytes());
        }
    }
    write_box(if wide { b"co64" } else { b"stco" }, &content)
}
