//! Turns dumped hardware trace buffers into chronological branch sequences.
//!
//! Both decoders are pure functions of a dumped snapshot: they read a
//! borrowed view of the buffer the device materialized and produce an
//! [`OrderedTrace`] whose index 0 is the **oldest** retained branch and
//! whose last index is the newest. Callers that want newest-first output
//! reverse at presentation time ([`OrderedTrace::newest_first`]); display
//! order is never baked in here.

pub mod error;
mod linear;
mod ring;
mod trace;

pub use crate::{
    error::DecoderError,
    linear::{LinearBufferView, decode_bts_buffer, populated_record_count},
    ring::{RingBufferView, decode_lbr_ring},
    trace::OrderedTrace,
};
