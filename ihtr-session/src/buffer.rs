//! Allocations the trace device writes into.

use std::{cell::UnsafeCell, sync::Arc};

use zerocopy::FromBytes;

/// A heap buffer whose address is handed to the trace device.
///
/// The device writes through the raw pointer while a control request is
/// in flight; Rust code reads only between requests, and sessions
/// serialize requests, so the two never overlap. Shared ownership
/// (`Arc`) lets a timed-out request's courier thread keep the memory
/// alive until the device call actually returns, so a late device write
/// can never land in reclaimed memory.
pub(crate) struct RawTraceBuffer {
    bytes: UnsafeCell<Box<[u8]>>,
}

// SAFETY: see the struct docs — device writes and Rust reads are
// serialized by the session's request/response model.
unsafe impl Send for RawTraceBuffer {}
unsafe impl Sync for RawTraceBuffer {}

impl RawTraceBuffer {
    pub(crate) fn zeroed(len: usize) -> Arc<Self> {
        Arc::new(Self {
            bytes: UnsafeCell::new(vec![0u8; len].into_boxed_slice()),
        })
    }

    pub(crate) fn from_bytes(init: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            bytes: UnsafeCell::new(init.to_vec().into_boxed_slice()),
        })
    }

    /// Address of the first byte, as the device sees it.
    pub(crate) fn device_addr(&self) -> u64 {
        // SAFETY: the UnsafeCell always holds a live allocation.
        unsafe { (*self.bytes.get()).as_ptr() as usize as u64 }
    }

    /// Copy out the current contents. Sound only between control
    /// requests.
    pub(crate) fn snapshot(&self) -> Vec<u8> {
        // SAFETY: no request is in flight while we read (sessions
        // serialize), so the device is not writing concurrently.
        unsafe { (*self.bytes.get()).to_vec() }
    }

    /// Snapshot the buffer as one fixed-layout record.
    ///
    /// `None` when the buffer length does not match the record, which
    /// for session-allocated buffers cannot happen.
    pub(crate) fn snapshot_as<T: FromBytes>(&self) -> Option<T> {
        T::read_from_bytes(&self.snapshot()).ok()
    }
}
