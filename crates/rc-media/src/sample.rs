//! A borrowed view of one media sample.

/// One sample handed from a reader to a writer.
///
/// `data` borrows the producer's reusable buffer, so a view cannot outlive
/// the next call that produces a sample. All times are in microseconds.
#[derive(Debug, Clone, Copy)]
pub struct SampleView<'a> {
    /// Source track the sample came from.
    pub track_index: u32,
    /// Presentation timestamp after rebasing.
    pub timestamp_us: i64,
    /// Decode timestamp, shifted by the same amount as `timestamp_us`.
    pub decode_timestamp_us: i64,
    pub duration_us: i64,
    pub is_sync: bool,
    pub data: &'a [u8],
}

impl SampleView<'_> {
    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Offset of the payload inside `data`. Always 0.
    pub fn offset(&self) -> usize {
        0
    }

    /// Presentation minus decode time.
    pub fn composition_offset_us(&self) -> i64 {
        self.timestamp_us - self.decode_timestamp_us
    }
}
