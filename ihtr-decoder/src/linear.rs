//! BTS linear-buffer decoding.

use ihtr_protocol::{BtsDataHeader, BtsRecord};

use crate::{
    error::{DecoderError, DecoderResult},
    trace::OrderedTrace,
};

/// Borrowed view of a dumped BTS buffer.
///
/// BTS appends records from index 0, so the buffer is already in
/// chronological order; decoding is a prefix copy, no rotation. Overflow
/// and the near-full interrupt are the device's concern and never visible
/// here.
#[derive(Debug, Clone, Copy)]
pub struct LinearBufferView<'a> {
    records: &'a [BtsRecord],
    populated: usize,
}

impl<'a> LinearBufferView<'a> {
    /// Wrap a dumped record slice.
    ///
    /// `populated` is the number of live records counted from index 0;
    /// `None` means the device did not report a write position and the
    /// whole capacity is assumed live.
    #[expect(clippy::cast_possible_truncation)]
    pub fn new(records: &'a [BtsRecord], populated: Option<u64>) -> DecoderResult<Self> {
        let capacity = records.len();
        let populated = match populated {
            None => capacity,
            Some(count) if count > capacity as u64 => {
                return Err(DecoderError::IndexOutOfRange {
                    index: count,
                    capacity,
                });
            }
            Some(count) => count as usize,
        };
        Ok(Self { records, populated })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn populated(&self) -> usize {
        self.populated
    }

    /// Copy out the live prefix, oldest record first.
    #[must_use]
    pub fn linearize(&self) -> OrderedTrace<BtsRecord> {
        log::trace!(
            "linearized {} of {} BTS records",
            self.populated,
            self.records.len()
        );
        OrderedTrace::from_records(self.records[..self.populated].to_vec())
    }
}

/// Decode a dumped BTS buffer in one step.
pub fn decode_bts_buffer(
    records: &[BtsRecord],
    populated: Option<u64>,
) -> DecoderResult<OrderedTrace<BtsRecord>> {
    Ok(LinearBufferView::new(records, populated)?.linearize())
}

/// Derive the populated-record count from a dumped buffer header.
///
/// The device reports its write position as a pointer one past the newest
/// record. A null pointer means the position is unavailable (`None`, full
/// capacity assumed). A pointer before the base, past the capacity, or not
/// a whole number of records from the base indicates a protocol mismatch.
pub fn populated_record_count(
    header: &BtsDataHeader,
    capacity: usize,
) -> DecoderResult<Option<u64>> {
    let base = header.bts_buffer_base;
    let index = header.bts_index;
    if index == 0 {
        return Ok(None);
    }
    if index < base {
        return Err(DecoderError::IndexBeforeBase { base, index });
    }
    let offset = index - base;
    let record_len = size_of::<BtsRecord>() as u64;
    if offset % record_len != 0 {
        return Err(DecoderError::MisalignedIndex { base, index });
    }
    let count = offset / record_len;
    if count > capacity as u64 {
        return Err(DecoderError::IndexOutOfRange {
            index: count,
            capacity,
        });
    }
    Ok(Some(count))
}
