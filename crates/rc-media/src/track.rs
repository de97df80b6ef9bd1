//! Track descriptions shared by the inspector, reader, and writer.

use rc_core::MediaKind;
use serde::Serialize;
use std::fmt;

/// Identity transform in 16.16 / 2.30 fixed point, as stored in `tkhd`.
pub const IDENTITY_MATRIX: [i32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

/// Packed ISO-639-2 code for "und".
pub const LANGUAGE_UNDETERMINED: u16 = 0x55C4;

/// A four-character code (box type, handler type, sample entry type).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({self})")
    }
}

impl From<FourCc> for String {
    fn from(code: FourCc) -> Self {
        code.to_string()
    }
}

impl From<&[u8; 4]> for FourCc {
    fn from(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }
}

/// Opaque format descriptor of one track.
///
/// The sample description (`stsd` content) is carried byte-for-byte from the
/// source to the trimmed output; nothing inside it is interpreted beyond the
/// first sample entry's type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackFormat {
    pub kind: MediaKind,
    pub handler: FourCc,
    /// Type of the first sample entry (`avc1`, `hvc1`, `mp4a`, ...).
    pub codec: FourCc,
    /// Media timescale in ticks per second.
    pub timescale: u32,
    /// Packed ISO-639-2 language code from `mdhd`.
    pub language: u16,
    /// Presentation width from `tkhd`, 16.16 fixed point.
    pub width: u32,
    /// Presentation height from `tkhd`, 16.16 fixed point.
    pub height: u32,
    /// Playback volume from `tkhd`, 8.8 fixed point.
    pub volume: u16,
    /// Display transform from `tkhd` (carries rotation).
    pub matrix: [i32; 9],
    /// Handler name from `hdlr`.
    pub handler_name: String,
    /// Raw `stsd` content (version/flags, entry count, entries).
    #[serde(skip)]
    pub sample_description: Vec<u8>,
}

impl TrackFormat {
    /// Width in whole pixels.
    pub fn width_px(&self) -> u32 {
        self.width >> 16
    }

    /// Height in whole pixels.
    pub fn height_px(&self) -> u32 {
        self.height >> 16
    }

    /// Language as three ASCII letters, or `None` if the packed code is not
    /// a valid ISO-639-2 triple.
    pub fn language_code(&self) -> Option<String> {
        let code: String = [10u16, 5, 0]
            .iter()
            .map(|shift| (((self.language >> shift) & 0x1F) as u8 + 0x60) as char)
            .collect();
        code.chars().all(|c| c.is_ascii_lowercase()).then_some(code)
    }

    /// Extract the codec fourcc from raw `stsd` content.
    pub fn codec_from_sample_description(stsd: &[u8]) -> FourCc {
        // version/flags(4) + entry_count(4) + entry size(4) + entry type(4)
        match stsd.get(12..16) {
            Some(&[a, b, c, d]) => FourCc([a, b, c, d]),
            _ => FourCc(*b"????"),
        }
    }
}

/// One track of an inspected container.
#[derive(Debug, Clone, Serialize)]
pub struct Track {
    /// Position of the `trak` box within `moov`, starting at 0.
    pub index: u32,
    pub track_id: u32,
    pub kind: MediaKind,
    pub handler: FourCc,
    /// Present for video and audio tracks only.
    pub format: Option<TrackFormat>,
    pub sample_count: u32,
    pub sync_sample_count: u32,
    pub duration_us: u64,
    pub total_bytes: u64,
}
