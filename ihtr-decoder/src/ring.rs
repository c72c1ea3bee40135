//! LBR ring linearization.

use ihtr_protocol::LbrStackEntry;

use crate::{
    error::{DecoderError, DecoderResult},
    trace::OrderedTrace,
};

/// Borrowed view of a dumped LBR ring.
///
/// `tos` is the index of the **newest** entry, not the next write slot;
/// the hardware top-of-stack cursor points at the slot it wrote last.
/// The view is only valid between the dump that materialized the slice
/// and the next disable or re-enable of the trace.
///
/// The protocol carries no valid-entry count, so a ring that has not yet
/// wrapped since enable still decodes all `capacity` slots; slots the
/// hardware has not reached hold stale pre-enable data. This is a
/// limitation of the device interface, not of the decoder.
#[derive(Debug, Clone, Copy)]
pub struct RingBufferView<'a> {
    entries: &'a [LbrStackEntry],
    tos: usize,
}

impl<'a> RingBufferView<'a> {
    /// Wrap a dumped entry slice and its top-of-stack cursor.
    #[expect(clippy::cast_possible_truncation)]
    pub fn new(entries: &'a [LbrStackEntry], tos: u64) -> DecoderResult<Self> {
        let capacity = entries.len();
        if tos >= capacity as u64 {
            return Err(DecoderError::CursorOutOfRange {
                cursor: tos,
                capacity,
            });
        }
        Ok(Self {
            entries,
            // Cast is lossless: tos < capacity, which is a usize.
            tos: tos as usize,
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn tos(&self) -> usize {
        self.tos
    }

    /// Rotate the ring into chronological order.
    ///
    /// The slot after `tos` is the oldest retained entry, so the output is
    /// slots `[tos+1, capacity)` followed by `[0, tos]` — exactly
    /// `capacity` entries, each once.
    #[must_use]
    pub fn linearize(&self) -> OrderedTrace<LbrStackEntry> {
        let mut records = Vec::with_capacity(self.entries.len());
        records.extend_from_slice(&self.entries[self.tos + 1..]);
        records.extend_from_slice(&self.entries[..=self.tos]);
        log::trace!(
            "linearized {} LBR slots around tos {}",
            records.len(),
            self.tos
        );
        OrderedTrace::from_records(records)
    }
}

/// Decode a dumped LBR ring in one step.
pub fn decode_lbr_ring(
    entries: &[LbrStackEntry],
    tos: u64,
) -> DecoderResult<OrderedTrace<LbrStackEntry>> {
    Ok(RingBufferView::new(entries, tos)?.linearize())
}
