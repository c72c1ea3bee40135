//! BTS control session.

use std::{sync::Arc, time::Duration};

use ihtr_decoder::{OrderedTrace, decode_bts_buffer, populated_record_count};
use ihtr_protocol::{
    BTS_DEFAULT_CAPACITY, BtsConfig, BtsDataHeader, BtsRecord, BtsRequest, RequestEnvelope,
    TraceCommand,
};
use zerocopy::{FromBytes, IntoBytes};

use crate::{
    buffer::RawTraceBuffer,
    channel::TraceChannel,
    error::{SessionError, SessionResult},
    submit::{BoundedSubmitter, SubmitError},
};

/// One active BTS trace. Same lifecycle as the LBR counterpart: valid
/// from enable until disable, reused by dump and configure.
struct ActiveBtsTrace {
    config: BtsConfig,
    header: Arc<RawTraceBuffer>,
    records: Arc<RawTraceBuffer>,
    capacity: usize,
}

impl ActiveBtsTrace {
    fn request(&self) -> BtsRequest {
        BtsRequest::new(self.config, self.header.device_addr())
    }

    fn keepalive(&self) -> Vec<Arc<RawTraceBuffer>> {
        vec![Arc::clone(&self.header), Arc::clone(&self.records)]
    }
}

/// Session for the BTS trace mode.
///
/// BTS stores branches linearly; overflow handling (the near-full
/// interrupt) lives entirely in the device. The session only allocates
/// the buffer, forwards the control word verbatim, and decodes dumps.
pub struct BtsSession<C: TraceChannel> {
    submitter: BoundedSubmitter<C>,
    capacity: usize,
    active: Option<ActiveBtsTrace>,
}

impl<C: TraceChannel + Send + 'static> BtsSession<C> {
    /// Session with the default buffer capacity (1024 records).
    pub fn new(channel: C, timeout: Duration) -> Self {
        Self::with_capacity(channel, timeout, BTS_DEFAULT_CAPACITY)
    }

    /// Session with a caller-chosen buffer capacity in records.
    pub fn with_capacity(channel: C, timeout: Duration, capacity: usize) -> Self {
        Self {
            submitter: BoundedSubmitter::new(channel, timeout),
            capacity,
            active: None,
        }
    }

    /// Start tracing `pid` with the given trace-control word (forwarded
    /// verbatim to the device; zero selects the device default).
    pub fn enable(&mut self, pid: u32, bts_control: u64) -> SessionResult<(), C> {
        if self.active.is_some() {
            return Err(SessionError::AlreadyEnabled);
        }
        let records = RawTraceBuffer::zeroed(self.capacity * size_of::<BtsRecord>());
        let header_init = BtsDataHeader {
            bts_buffer_base: records.device_addr(),
            bts_index: 0,
            bts_interrupt_threshold: 0,
        };
        let header = RawTraceBuffer::from_bytes(header_init.as_bytes());
        let config = BtsConfig::new(pid, bts_control, self.capacity as u64);
        let trace = ActiveBtsTrace {
            config,
            header,
            records,
            capacity: self.capacity,
        };
        let envelope = RequestEnvelope::bts(TraceCommand::EnableBts, &trace.request());
        self.submit(envelope, trace.keepalive(), SessionError::Acquisition)?;
        log::debug!("enabled BTS trace for pid {pid}");
        self.active = Some(trace);
        Ok(())
    }

    /// Stop the active trace; see [`LbrSession::disable`] for the
    /// invalidation semantics, which are identical.
    ///
    /// [`LbrSession::disable`]: crate::LbrSession::disable
    pub fn disable(&mut self) -> SessionResult<(), C> {
        let trace = self.active.take().ok_or(SessionError::InvalidHandle)?;
        let pid = trace.config.pid;
        let envelope = RequestEnvelope::bts(TraceCommand::DisableBts, &trace.request());
        self.submit(envelope, trace.keepalive(), SessionError::Channel)?;
        log::debug!("disabled BTS trace for pid {pid}");
        Ok(())
    }

    /// Update the trace-control word without stopping the trace.
    ///
    /// An unchanged word is a no-op success. The buffer capacity is
    /// fixed at enable time and cannot be reconfigured.
    pub fn configure(&mut self, bts_control: u64) -> SessionResult<(), C> {
        let Some(trace) = self.active.as_ref() else {
            return Err(SessionError::InvalidHandle);
        };
        if trace.config.bts_config == bts_control {
            log::debug!("BTS control word unchanged ({bts_control:#x}), skipping request");
            return Ok(());
        }
        let mut config = trace.config;
        config.bts_config = bts_control;
        let request = BtsRequest::new(config, trace.header.device_addr());
        let envelope = RequestEnvelope::bts(TraceCommand::ConfigureBts, &request);
        let keepalive = trace.keepalive();
        self.submit(envelope, keepalive, SessionError::Channel)?;
        if let Some(trace) = self.active.as_mut() {
            trace.config = config;
        }
        log::debug!("configured BTS control word {bts_control:#x}");
        Ok(())
    }

    /// Materialize and decode the buffer contents.
    ///
    /// The populated length comes from the write index the device
    /// reports in the dump header; a device that reports none gets the
    /// full capacity decoded. The device keeps accumulating after a
    /// dump.
    pub fn dump(&mut self) -> SessionResult<OrderedTrace<BtsRecord>, C> {
        let Some(trace) = self.active.as_ref() else {
            return Err(SessionError::InvalidHandle);
        };
        let envelope = RequestEnvelope::bts(TraceCommand::DumpBts, &trace.request());
        let keepalive = trace.keepalive();
        let header_buf = Arc::clone(&trace.header);
        let records_buf = Arc::clone(&trace.records);
        let capacity = trace.capacity;
        let pid = trace.config.pid;
        self.submit(envelope, keepalive, SessionError::Channel)?;

        let header: BtsDataHeader = header_buf
            .snapshot_as()
            .ok_or(SessionError::BufferUnavailable)?;
        if header.bts_buffer_base == 0 {
            return Err(SessionError::BufferUnavailable);
        }
        let populated = populated_record_count(&header, capacity)?;
        let record_bytes = records_buf.snapshot();
        let records = <[BtsRecord]>::ref_from_bytes(&record_bytes)
            .map_err(|_| SessionError::BufferUnavailable)?;
        let decoded = decode_bts_buffer(records, populated)?;
        log::debug!("dumped {} BTS records for pid {pid}", decoded.len());
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

    fn record(from: u64, to: u64, misc: u64) -> BtsRecord {
        BtsRecord { from, to, misc }
    }

    #[test]
    fn test_enable_dump_disable_roundtrip() {
        // Capacity 1024, three populated records: the decode must yield
        // exactly those three, oldest first, ignoring slots 3..1023.
        let state = MockDeviceState::shared();
        state.lock().unwrap().bts_records = vec![
            record(0xA, 0xB, 0),
            record(0xC, 0xD, 1),
            record(0xE, 0xF, 0),
        ];
        let mut session = BtsSession::new(MockDevice::new(&state), TIMEOUT);

        session.enable(1234, 0).unwrap();
        assert_eq!(state.lock().unwrap().bts_enabled_pid, Some(1234));

        let trace = session.dump().unwrap();
        assert_eq!(
            trace.as_slice(),
            &[
                record(0xA, 0xB, 0),
                record(0xC, 0xD, 1),
                record(0xE, 0xF, 0),
            ]
        );

        session.disable().unwrap();
        assert!(!session.is_enabled());
        assert_eq!(state.lock().unwrap().bts_enabled_pid, None);
    }

    #[test]
    fn test_dump_without_reported_index_decodes_full_capacity() {
        let state = MockDeviceState::shared();
        state.lock().unwrap().bts_report_index = false;
        state.lock().unwrap().bts_records = vec![record(1, 2, 0); 8];
        let mut session = BtsSession::with_capacity(MockDevice::new(&state), TIMEOUT, 8);
        session.enable(1, 0).unwrap();
        let trace = session.dump().unwrap();
        assert_eq!(trace.len(), 8);
    }

    #[test]
    fn test_state_machine_rejects_out_of_order_operations() {
        let state = MockDeviceState::shared();
        let mut session = BtsSession::with_capacity(MockDevice::new(&state), TIMEOUT, 8);
        assert!(matches!(session.dump(), Err(SessionError::InvalidHandle)));
        session.enable(1, 0).unwrap();
        assert!(matches!(
            session.enable(1, 0),
            Err(SessionError::AlreadyEnabled)
        ));
        session.disable().unwrap();
        assert!(matches!(session.disable(), Err(SessionError::InvalidHandle)));
    }

    #[test]
    fn test_withheld_dump_buffer_is_buffer_unavailable() {
        // The device reports a null buffer base when the trace it was
        // asked to dump no longer exists on its side.
        let state = MockDeviceState::shared();
        state.lock().unwrap().withhold_dump_buffer = true;
        let mut session = BtsSession::with_capacity(MockDevice::new(&state), TIMEOUT, 8);
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
    fn test_configure_forwards_control_word_verbatim() {
        let state = MockDeviceState::shared();
        let mut session = BtsSession::with_capacity(MockDevice::new(&state), TIMEOUT, 8);
        session.enable(1, 0xC0).unwrap();
        assert_eq!(state.lock().unwrap().bts_control, Some(0xC0));
        session.configure(0xC0).unwrap();
        assert_eq!(state.lock().unwrap().commands, vec![6]);
        session.configure(0x1C0).unwrap();
        assert_eq!(state.lock().unwrap().bts_control, Some(0x1C0));
    }
}
