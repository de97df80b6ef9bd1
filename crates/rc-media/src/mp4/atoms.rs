//! ISO BMFF box header parsing and navigation.
//!
//! Every header records its absolute offset so callers can hop between
//! sibling boxes with plain seeks instead of tracking relative positions.

use std::io::{self, Read, Seek, SeekFrom};

/// A parsed box header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    /// 4-byte box type (e.g. b"moov").
    pub box_type: [u8; 4],
    /// Absolute file offset of the first header byte.
    pub offset: u64,
    /// Total size of the box including the header.
    pub size: u64,
    /// Size of the header itself (8 or 16 for extended-size boxes).
    pub header_size: u64,
}

impl BoxHeader {
    /// Size of the box content (size - header_size).
    pub fn content_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size)
    }

    /// Absolute offset of the first content byte.
    pub fn content_start(&self) -> u64 {
        self.offset + self.header_size
    }

    /// Absolute offset one past the last byte of the box.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Box type as text, for logs and error messages.
    pub fn type_name(&self) -> String {
        String::from_utf8_lossy(&self.box_type).into_owned()
    }
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Read a box header at the current position.
///
/// `limit` is the absolute end of the enclosing range; a size-0 box
/// ("extends to end") is resolved against it. Returns `Ok(None)` when fewer
/// than 8 bytes remain before `limit` or the stream ends.
pub fn read_box_header<R: Read + Seek>(reader: &mut R, limit: u64) -> io::Result<Option<BoxHeader>> {
    let offset = reader.stream_position()?;
    if offset.saturating_add(8) > limit {
        return Ok(None);
    }

    let mut buf = [0u8; 8];
    match reader.read_exact(&mut buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let size32 = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let box_type = [buf[4], buf[5], buf[6], buf[7]];

    let (size, header_size) = match size32 {
        1 => (read_u64(reader)?, 16u64),
        0 => (limit - offset, 8u64),
        n => (n as u64, 8u64),
    };

    if size < header_size {
        return Err(invalid(format!(
            "box '{}' at {offset} has size {size} smaller than its header",
            String::from_utf8_lossy(&box_type)
        )));
    }
    if offset.saturating_add(size) > limit {
        return Err(invalid(format!(
            "box '{}' at {offset} overruns its parent ({size} bytes)",
            String::from_utf8_lossy(&box_type)
        )));
    }

    Ok(Some(BoxHeader {
        box_type,
        offset,
        size,
        header_size,
    }))
}

/// Collect the headers of every direct child box in `[start, end)`.
pub fn child_boxes<R: Read + Seek>(reader: &mut R, start: u64, end: u64) -> io::Result<Vec<BoxHeader>> {
    let mut children = Vec::new();
    reader.seek(SeekFrom::Start(start))?;
    while let Some(header) = read_box_header(reader, end)? {
        reader.seek(SeekFrom::Start(header.end()))?;
        children.push(header);
    }
    Ok(children)
}

/// Search the content of `parent` for a direct child with the given type.
///
/// If found, the reader is positioned at the start of the child's content
/// (just past its header).
pub fn find_child_box<R: Read + Seek>(
    reader: &mut R,
    parent: &BoxHeader,
    target: &[u8; 4],
) -> io::Result<Option<BoxHeader>> {
    find_in_range(reader, parent.content_start(), parent.end(), target)
}

/// Like [`find_child_box`] but over an explicit absolute range.
pub fn find_in_range<R: Read + Seek>(
    reader: &mut R,
    start: u64,
    end: u64,
    target: &[u8; 4],
) -> io::Result<Option<BoxHeader>> {
    reader.seek(SeekFrom::Start(start))?;
    while let Some(header) = read_box_header(reader, end)? {
        if &header.box_type == target {
            return Ok(Some(header));
        }
        reader.seek(SeekFrom::Start(header.end()))?;
    }
    Ok(None)
}

/// Like [`find_child_box`] but fails with `InvalidData` when absent.
pub fn require_child_box<R: Read + Seek>(
    reader: &mut R,
    parent: &BoxHeader,
    target: &[u8; 4],
) -> io::Result<BoxHeader> {
    find_child_box(reader, parent, target)?.ok_or_else(|| {
        invalid(format!(
            "missing '{}' inside '{}'",
            String::from_utf8_lossy(target),
            parent.type_name()
        ))
    })
}

/// Read a big-endian u16.
pub fn read_u16<R: Read>(reader: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

/// Read a big-endian u32.
pub fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// Read a big-endian i32.
pub fn read_i32<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

/// Read a big-endian u64.
pub fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

/// Read a four-character code.
pub fn read_fourcc<R: Read>(reader: &mut R) -> io::Result<[u8; 4]> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Read `n` bytes into a new Vec.
pub fn read_bytes<R: Read>(reader: &mut R, n: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Read a 32-bit or 64-bit field depending on a fullbox version.
pub fn read_versioned_u64<R: Read>(reader: &mut R, version: u8) -> io::Result<u64> {
    if version == 1 {
        read_u64(reader)
    } else {
        read_u32(reader).map(u64::from)
    }
}

/// Read a fullbox header (1 byte version + 3 bytes flags) and return (version, flags).
pub fn read_fullbox_header<R: Read>(reader: &mut R) -> io::Result<(u8, u32)> {
    let val = read_u32(reader)?;
    let version = (val >> 24) as u8;
    let flags = val & 0x00FFFFFF;
    Ok((version, flags))
}
