//! LBR control session.

use std::{sync::Arc, time::Duration};

use ihtr_decoder::{OrderedTrace, decode_lbr_ring};
use ihtr_protocol::{
    LBR_DEFAULT_CAPACITY, LbrConfig, LbrDataHeader, LbrRequest, LbrStackEntry, RequestEnvelope,
    TraceCommand,
};
use zerocopy::{FromBytes, IntoBytes};

use crate::{
    buffer::RawTraceBuffer,
    channel::TraceChannel,
    error::{SessionError, SessionResult},
    submit::{BoundedSubmitter, SubmitError},
};

/// One active LBR trace: the enable-time config plus the buffer the
/// device dumps into. Valid from enable until disable; dump and
/// configure reuse it.
struct ActiveLbrTrace {
    config: LbrConfig,
    header: Arc<RawTraceBuffer>,
    entries: Arc<RawTraceBuffer>,
    capacity: usize,
}

impl ActiveLbrTrace {
    fn request(&self) -> LbrRequest {
        LbrRequest::new(self.config, self.header.device_addr())
    }

    fn keepalive(&self) -> Vec<Arc<RawTraceBuffer>> {
        vec![Arc::clone(&self.header), Arc::clone(&self.entries)]
    }
}

/// Session for the LBR trace mode.
///
/// Holds at most one active trace. Control requests are serialized and
/// bounded by the constructor's timeout; see [`SessionError::Timeout`]
/// for the poisoning semantics.
pub struct LbrSession<C: TraceChannel> {
    submitter: BoundedSubmitter<C>,
    capacity: usize,
    active: Option<ActiveLbrTrace>,
}

impl<C: TraceChannel + Send + 'static> LbrSession<C> {
    /// Session assuming the default hardware ring capacity (32 slots).
    pub fn new(channel: C, timeout: Duration) -> Self {
        Self::with_capacity(channel, timeout, LBR_DEFAULT_CAPACITY)
    }

    /// Session for hardware with a non-default ring capacity.
    pub fn with_capacity(channel: C, timeout: Duration, capacity: usize) -> Self {
        Self {
            submitter: BoundedSubmitter::new(channel, timeout),
            capacity,
            active: None,
        }
    }

    /// Start tracing `pid` with the given `MSR_LBR_SELECT` filter word
    /// (zero records every branch class).
    ///
    /// Fails with [`SessionError::AlreadyEnabled`] while a trace is
    /// active, and with [`SessionError::Acquisition`] when the device
    /// rejects the pid or does not support LBR.
    pub fn enable(&mut self, pid: u32, lbr_select: u64) -> SessionResult<(), C> {
        if self.active.is_some() {
            return Err(SessionError::AlreadyEnabled);
        }
        let entries = RawTraceBuffer::zeroed(self.capacity * size_of::<LbrStackEntry>());
        let header_init = LbrDataHeader {
            lbr_tos: 0,
            entries: entries.device_addr(),
        };
        let header = RawTraceBuffer::from_bytes(header_init.as_bytes());
        let config = LbrConfig::new(pid, lbr_select);
        let trace = ActiveLbrTrace {
            config,
            header,
            entries,
            capacity: self.capacity,
        };
        let envelope = RequestEnvelope::lbr(TraceCommand::EnableLbr, &trace.request());
        self.submit(envelope, trace.keepalive(), SessionError::Acquisition)?;
        log::debug!("enabled LBR trace for pid {pid}");
        self.active = Some(trace);
        Ok(())
    }

    /// Stop the active trace.
    ///
    /// The local handle is invalidated even when the device reports an
    /// error; a later [`enable`][Self::enable] starts from fresh state.
    /// Disabling a session with no active trace is a caller bug and
    /// reported as [`SessionError::InvalidHandle`].
    pub fn disable(&mut self) -> SessionResult<(), C> {
        let trace = self.active.take().ok_or(SessionError::InvalidHandle)?;
        let pid = trace.config.pid;
        let envelope = RequestEnvelope::lbr(TraceCommand::DisableLbr, &trace.request());
        self.submit(envelope, trace.keepalive(), SessionError::Channel)?;
        log::debug!("disabled LBR trace for pid {pid}");
        Ok(())
    }

    /// Update the filter word without stopping the trace.
    ///
    /// An unchanged selector is a no-op success; no request reaches the
    /// device.
    pub fn configure(&mut self, lbr_select: u64) -> SessionResult<(), C> {
        let Some(trace) = self.active.as_ref() else {
            return Err(SessionError::InvalidHandle);
        };
        if trace.config.lbr_select == lbr_select {
            log::debug!("LBR selector unchanged ({lbr_select:#x}), skipping request");
            return Ok(());
        }
        let mut config = trace.config;
        config.lbr_select = lbr_select;
        let request = LbrRequest::new(config, trace.header.device_addr());
        let envelope = RequestEnvelope::lbr(TraceCommand::ConfigureLbr, &request);
        let keepalive = trace.keepalive();
        self.submit(envelope, keepalive, SessionError::Channel)?;
        if let Some(trace) = self.active.as_mut() {
            trace.config = config;
        }
        log::debug!("configured LBR selector {lbr_select:#x}");
        Ok(())
    }

    /// Materialize and decode the current ring contents.
    ///
    /// The device keeps accumulating after a dump; its cursor is not
    /// reset. A decode failure aborts only this dump and leaves the
    /// trace enabled.
    pub fn dump(&mut self) -> SessionResult<OrderedTrace<LbrStackEntry>, C> {
        let Some(trace) = self.active.as_ref() else {
            return Err(SessionError::InvalidHandle);
        };
        let envelope = RequestEnvelope::lbr(TraceCommand::DumpLbr, &trace.request());
        let keepalive = trace.keepalive();
        let header_buf = Arc::clone(&trace.header);
        let entries_buf = Arc::clone(&trace.entries);
        let capacity = trace.capacity;
        let pid = trace.config.pid;
        self.submit(envelope, keepalive, SessionError::Channel)?;

        let header: LbrDataHeader = header_buf
            .snapshot_as()
            .ok_or(SessionError::BufferUnavailable)?;
        if header.entries == 0 {
            return Err(SessionError::BufferUnavailable);
        }
        let entry_bytes = entries_buf.snapshot();
        let entries = <[LbrStackEntry]>::ref_from_bytes(&entry_bytes)
            .map_err(|_| SessionError::BufferUnavailable)?;
        debug_assert_eq!(entries.len(), capacity);
        let decoded = decode_lbr_ring(entries, header.lbr_tos)?;
        log::debug!("dumped {} LBR records for pid {pid}", decoded.len());
        Ok(decoded)
    }

    /// Whether a trace is currently enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.active.is_some()
    }

    /// Pid of the active trace, if any.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.active.as_ref().map(|trace| trace.config.pid)
    }

    fn submit(
        &mut self,
        request: RequestEnvelope,
        keepalive: Vec<Arc<RawTraceBuffer>>,
        on_reject: fn(C::Error) -> SessionError<C>,
    ) -> SessionResult<(), C> {
        self.submitter
            .submit(request, keepalive)
            .map_err(|err| match err {
                SubmitError::Rejected(source) => on_reject(source),
                SubmitError::TimedOut(bound) => SessionError::Timeout(bound),
                SubmitError::ChannelLost => SessionError::ChannelLost,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::channel::testing::{MockDevice, MockDeviceState};

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn entry(from: u64, to: u64) -> LbrStackEntry {
        LbrStackEntry { from, to }
    }

    #[test]
    fn test_enable_dump_disable_roundtrip() {
        // The end-to-end ring scenario: capacity 4, cursor 1. Slot 2 is
        // the oldest branch, slot 1 the newest.
        let state = MockDeviceState::shared();
        state.lock().unwrap().lbr_tos = 1;
        state.lock().unwrap().lbr_entries = vec![
            entry(0x10, 0x20),
            entry(0x30, 0x40),
            entry(0x50, 0x60),
            entry(0x70, 0x80),
        ];
        let mut session = LbrSession::with_capacity(MockDevice::new(&state), TIMEOUT, 4);

        session.enable(1234, 0).unwrap();
        assert!(session.is_enabled());
        assert_eq!(session.pid(), Some(1234));
        assert_eq!(state.lock().unwrap().lbr_enabled_pid, Some(1234));

        let trace = session.dump().unwrap();
        assert_eq!(
            trace.as_slice(),
            &[
                entry(0x50, 0x60),
                entry(0x70, 0x80),
                entry(0x10, 0x20),
                entry(0x30, 0x40),
            ]
        );

        session.disable().unwrap();
        assert!(!session.is_enabled());
        assert_eq!(state.lock().unwrap().lbr_enabled_pid, None);
    }

    #[test]
    fn test_enable_twice_is_rejected_locally() {
        let state = MockDeviceState::shared();
        let mut session = LbrSession::with_capacity(MockDevice::new(&state), TIMEOUT, 4);
        session.enable(1, 0).unwrap();
        assert!(matches!(
            session.enable(1, 0),
            Err(SessionError::AlreadyEnabled)
        ));
        // The device saw exactly one enable.
        assert_eq!(state.lock().unwrap().commands, vec![1]);
    }

    #[test]
    fn test_device_rejection_is_an_acquisition_error() {
        let state = MockDeviceState::shared();
        state.lock().unwrap().reject_enable = true;
        let mut session = LbrSession::with_capacity(MockDevice::new(&state), TIMEOUT, 4);
        assert!(matches!(
            session.enable(99999, 0),
            Err(SessionError::Acquisition(_))
        ));
        assert!(!session.is_enabled());
        // A rejected enable leaves the session usable.
        state.lock().unwrap().reject_enable = false;
        session.enable(1, 0).unwrap();
    }

    #[test]
    fn test_operations_without_enable_are_invalid_handle() {
        let state = MockDeviceState::shared();
        let mut session = LbrSession::with_capacity(MockDevice::new(&state), TIMEOUT, 4);
        assert!(matches!(session.dump(), Err(SessionError::InvalidHandle)));
        assert!(matches!(
            session.configure(0),
            Err(SessionError::InvalidHandle)
        ));
        assert!(matches!(session.disable(), Err(SessionError::InvalidHandle)));
    }

    #[test]
    fn test_double_disable_is_invalid_handle() {
        let state = MockDeviceState::shared();
        let mut session = LbrSession::with_capacity(MockDevice::new(&state), TIMEOUT, 4);
        session.enable(1, 0).unwrap();
        session.disable().unwrap();
        assert!(matches!(session.disable(), Err(SessionError::InvalidHandle)));
        // Re-enable after disable produces a fresh handle.
        session.enable(2, 0).unwrap();
        assert_eq!(session.pid(), Some(2));
    }

    #[test]
    fn test_configure_unchanged_selector_is_a_noop() {
        let state = MockDeviceState::shared();
        let mut session = LbrSession::with_capacity(MockDevice::new(&state), TIMEOUT, 4);
        session.enable(1, 0x1).unwrap();
        session.configure(0x1).unwrap();
        // Only the enable reached the device.
        assert_eq!(state.lock().unwrap().commands, vec![1]);
        session.configure(0x5).unwrap();
        assert_eq!(state.lock().unwrap().commands, vec![1, 4]);
        assert_eq!(state.lock().unwrap().lbr_select, Some(0x5));
    }

    #[test]
    fn test_bad_cursor_from_device_aborts_dump_only() {
        let state = MockDeviceState::shared();
        state.lock().unwrap().lbr_tos = 4; // == capacity, out of range
        state.lock().unwrap().lbr_entries = vec![entry(0, 0); 4];
        let mut session = LbrSession::with_capacity(MockDevice::new(&state), TIMEOUT, 4);
        session.enable(1, 0).unwrap();
        assert!(matches!(session.dump(), Err(SessionError::Decode(_))));
        // Handle state unchanged: the trace is still enabled.
        assert!(session.is_enabled());
        state.lock().unwrap().lbr_tos = 0;
        session.dump().unwrap();
    }

    #[test]
    fn test_withheld_dump_buffer_is_buffer_unavailable() {
        // A device whose trace was torn down underneath us nulls the
        // entry pointer instead of filling the ring.
        let state = MockDeviceState::shared();
        state.lock().unwrap().withhold_dump_buffer = true;
        let mut session = LbrSession::with_capacity(MockDevice::new(&state), TIMEOUT, 4);
        session.enable(1, 0).unwrap();
        assert!(matches!(
            session.dump(),
            Err(SessionError::BufferUnavailable)
        ));
        // The failed dump does not invalidate the handle.
        assert!(session.is_enabled());
        session.disable().unwrap();
    }

    #[test]
    fn test_timeout_poisons_the_session() {
        let state = MockDeviceState::shared();
        state.lock().unwrap().delay = Some(Duration::from_millis(200));
        let mut session = LbrSession::with_capacity(
            MockDevice::new(&state),
            Duration::from_millis(20),
            4,
        );
        assert!(matches!(
            session.enable(1, 0),
            Err(SessionError::Timeout(_))
        ));
        // The channel is gone for good; no retry happens implicitly.
        assert!(matches!(
            session.enable(1, 0),
            Err(SessionError::ChannelLost)
        ));
    }
}
