//! Bounded-latency submission of control requests.

use std::{
    sync::{Arc, mpsc},
    thread,
    time::Duration,
};

use ihtr_protocol::RequestEnvelope;

use crate::{buffer::RawTraceBuffer, channel::TraceChannel};

pub(crate) enum SubmitError<E> {
    /// The device processed the request and reported failure.
    Rejected(E),
    /// No reply within the bound; the channel is gone.
    TimedOut(Duration),
    /// The channel was lost by an earlier timeout (or a courier panic).
    ChannelLost,
}

/// Runs each channel submission on a courier thread and waits for it with
/// a deadline.
///
/// On success the channel comes back for the next request. On timeout the
/// courier keeps the channel and the buffer keep-alives forever — the
/// device call may still be executing, so neither the fd nor the buffers
/// may be reused. The submitter is poisoned from then on and every later
/// submit reports [`SubmitError::ChannelLost`].
pub(crate) struct BoundedSubmitter<C> {
    channel: Option<C>,
    timeout: Duration,
}

impl<C: TraceChannel + Send + 'static> BoundedSubmitter<C> {
    pub(crate) fn new(channel: C, timeout: Duration) -> Self {
        Self {
            channel: Some(channel),
            timeout,
        }
    }

    pub(crate) fn submit(
        &mut self,
        request: RequestEnvelope,
        keepalive: Vec<Arc<RawTraceBuffer>>,
    ) -> Result<(), SubmitError<C::Error>> {
        let Some(mut channel) = self.channel.take() else {
            return Err(SubmitError::ChannelLost);
        };
        let (reply_tx, reply_rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("ihtr-control".into())
            .spawn(move || {
                let result = channel.submit(&request);
                // The buffers must outlive the device call; dropping the
                // keep-alives before this point would let a slow dump
                // write into freed memory.
                drop(keepalive);
                // The receiver may have given up; nothing to do then.
                let _ = reply_tx.send((channel, result));
            });
        if let Err(err) = spawned {
            log::error!("failed to spawn control courier: {err}");
            return Err(SubmitError::ChannelLost);
        }

        match reply_rx.recv_timeout(self.timeout) {
            Ok((channel, result)) => {
                self.channel = Some(channel);
                result.map_err(SubmitError::Rejected)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                log::warn!(
                    "control request {} timed out after {:?}; session poisoned",
                    request.command_code(),
                    self.timeout
                );
                Err(SubmitError::TimedOut(self.timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(SubmitError::ChannelLost),
        }
    }
}
