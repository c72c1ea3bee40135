//! Per-mode control sessions over the branch-tracing kernel component.
//!
//! A session owns at most one active trace handle for its mode (LBR or
//! BTS) and drives the device through the [`TraceChannel`] seam with
//! blocking, serialized control requests. Each request is bounded by a
//! timeout; a request that never returns poisons the session instead of
//! blocking the caller forever or letting the device write into reclaimed
//! memory.
//!
//! Dumped buffers are decoded into [`ihtr_decoder::OrderedTrace`]s
//! (oldest record first) and can be rendered with best-effort symbol
//! resolution via [`ResolveSymbol`].

mod bts;
mod buffer;
pub mod channel;
pub mod error;
mod lbr;
mod render;
mod submit;

pub use crate::{
    bts::BtsSession,
    channel::TraceChannel,
    error::SessionError,
    lbr::LbrSession,
    render::{DisplayOrder, NoSymbols, ResolveSymbol, render_bts_trace, render_lbr_trace},
};

#[cfg(feature = "device-channel")]
pub use crate::channel::device::DeviceChannel;
