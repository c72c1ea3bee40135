use std::time::Duration;

use ihtr_decoder::DecoderError;
use perfect_derive::perfect_derive;
use thiserror::Error;

use crate::channel::TraceChannel;

/// Session-level failure.
///
/// Everything here is reported to the caller; nothing is swallowed or
/// retried internally. Control requests are not idempotent (a re-issued
/// dump can move device-owned cursors), so retrying even a [`Timeout`]
/// is an explicit caller decision.
///
/// [`Timeout`]: SessionError::Timeout
#[derive(Error)]
#[perfect_derive(Debug)]
pub enum SessionError<C: TraceChannel> {
    /// The device rejected an enable request: unknown pid, missing
    /// permission, or the trace feature is unsupported on this CPU.
    #[error("Trace acquisition rejected by the trace device")]
    Acquisition(#[source] C::Error),
    /// At most one trace may be active per session.
    #[error("A trace is already enabled on this session")]
    AlreadyEnabled,
    /// Disable, configure, or dump on a session whose trace was never
    /// enabled or has already been disabled.
    #[error("Operation on a session with no enabled trace")]
    InvalidHandle,
    /// The dump produced no materialized buffer to decode.
    #[error("No materialized trace buffer available")]
    BufferUnavailable,
    /// The device did not answer a control request within the bound.
    /// The session is poisoned afterwards.
    #[error("Control request timed out after {0:?}")]
    Timeout(Duration),
    /// A control request was attempted after an earlier timeout
    /// surrendered the channel to its courier thread.
    #[error("Control channel lost after a timed-out request")]
    ChannelLost,
    /// A non-enable control request failed in the channel.
    #[error("Trace device control request failed")]
    Channel(#[source] C::Error),
    /// The dumped snapshot disagrees with the device contract.
    #[error("Failed to decode dumped trace buffer")]
    Decode(#[from] DecoderError),
}

pub(crate) type SessionResult<T, C> = core::result::Result<T, SessionError<C>>;
