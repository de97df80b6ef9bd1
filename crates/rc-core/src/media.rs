//! Media-domain enums shared between the reader and the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Microseconds per second, the engine's time base.
pub const MICROS_PER_SEC: u64 = 1_000_000;

// ---------------------------------------------------------------------------
// RebaseMode
// ---------------------------------------------------------------------------

/// How emitted timestamps are shifted so a trimmed track starts near zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebaseMode {
    /// Each track subtracts the timestamp of its own first emitted sample.
    /// Every track starts at exactly 0; tracks may be offset from each other
    /// by up to one sync interval.
    #[default]
    FirstSample,
    /// Every track subtracts the requested window start, keeping the source's
    /// A/V alignment. The first sample of a track may start slightly after 0.
    SharedAnchor,
}

impl fmt::Display for RebaseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstSample => write!(f, "first_sample"),
            Self::SharedAnchor => write!(f, "shared_anchor"),
        }
    }
}

// ---------------------------------------------------------------------------
// MediaKind
// ---------------------------------------------------------------------------

/// Classification of a track by its handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    /// Any other handler (text, hint, metadata). Never copied.
    Other,
}

impl MediaKind {
    /// Classify an MP4 handler type.
    pub fn from_handler(handler: &[u8; 4]) -> Self {
        match handler {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            _ => Self::Other,
        }
    }

    /// Whether tracks of this kind are copied into trimmed output.
    pub fn is_supported(self) -> bool {
        !matches!(self, Self::Other)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Convert a tick count in `timescale` units to microseconds, rounding to
/// the nearest microsecond.
pub fn ticks_to_micros(ticks: i64, timescale: u32) -> i64 {
    if timescale == 0 {
        return 0;
    }
    let scaled = ticks as i128 * MICROS_PER_SEC as i128;
    let ts = timescale as i128;
    let rounded = if scaled >= 0 {
        (scaled + ts / 2) / ts
    } else {
        (scaled - ts / 2) / ts
    };
    rounded as i64
}

/// Convert microseconds to `timescale` ticks, rounding to the nearest tick.
pub fn micros_to_ticks(micros: i64, timescale: u32) -> i64 {
    let scaled = micros as i128 * timescale as i128;
    let us = MICROS_PER_SEC as i128;
    let rounded = if scaled >= 0 {
        (scaled + us / 2) / us
    } else {
        (scaled - us / 2) / us
    };
    rounded as i64
}
