use thiserror::Error;

/// Decode failure.
///
/// Every variant indicates a snapshot that disagrees with the device
/// contract (a protocol or version mismatch), not a short or empty trace;
/// short traces decode successfully by construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecoderError {
    /// Ring cursor outside `[0, capacity)`.
    #[error("LBR ring cursor {cursor} outside capacity {capacity}")]
    CursorOutOfRange { cursor: u64, capacity: usize },
    /// BTS write index beyond the buffer capacity.
    #[error("BTS write index {index} outside capacity {capacity}")]
    IndexOutOfRange { index: u64, capacity: usize },
    /// BTS write pointer not a whole number of records past the base.
    #[error("BTS write pointer {index:#x} is not record-aligned against base {base:#x}")]
    MisalignedIndex { base: u64, index: u64 },
    /// BTS write pointer before the buffer base.
    #[error("BTS write pointer {index:#x} precedes buffer base {base:#x}")]
    IndexBeforeBase { base: u64, index: u64 },
}

pub(crate) type DecoderResult<T> = core::result::Result<T, DecoderError>;
