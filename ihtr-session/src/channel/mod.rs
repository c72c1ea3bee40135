//! The control seam to the trace-owning kernel component.

use ihtr_protocol::RequestEnvelope;

#[cfg(feature = "device-channel")]
pub mod device;

/// A blocking request/response channel to the trace device.
///
/// `submit` hands one [`RequestEnvelope`] to the device and returns once
/// the device has finished processing it. The device reads the envelope
/// and, for dump requests, writes results through the buffer pointers the
/// envelope carries — the caller must keep those allocations alive until
/// `submit` returns.
///
/// `Error` is `Send + 'static` because sessions run submissions on a
/// courier thread to bound their latency.
pub trait TraceChannel {
    /// Error reported by the device for a rejected or failed request.
    type Error: std::error::Error + Send + 'static;

    /// Issue one control request and block until the device replies.
    fn submit(&mut self, request: &RequestEnvelope) -> Result<(), Self::Error>;
}
