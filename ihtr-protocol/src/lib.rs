//! Fixed-layout records exchanged with the trace-owning kernel component.
//!
//! Every type in this crate crosses the user/kernel boundary unchanged, so
//! field order, width, and padding must match the device ABI exactly
//! (x86-64 C layout). Padding that a C compiler would insert implicitly is
//! spelled out as `_pad` fields so the structs stay free of uninitialized
//! bytes, and each layout is pinned by a compile-time size assertion.

pub mod bts;
pub mod lbr;
mod request;

pub use crate::{
    bts::{BtsConfig, BtsDataHeader, BtsRecord, BtsRequest},
    lbr::{LbrConfig, LbrDataHeader, LbrRequest, LbrStackEntry},
    request::{RequestEnvelope, TraceCommand},
};

/// Number of LBR slots assumed when the hardware capacity is unknown.
///
/// Matches the device's `MAX_LBR_LIST_LEN`; real hardware varies per
/// microarchitecture but the device always materializes this many slots.
pub const LBR_DEFAULT_CAPACITY: usize = 0x20;

/// Number of BTS records allocated when the caller does not request a
/// specific buffer size (`MAX_BTS_LIST_LEN` in the device headers).
pub const BTS_DEFAULT_CAPACITY: usize = 0x400;

/// Control code for all requests, `_IO('l', 0)` in the device's terms.
/// The actual operation is selected by [`TraceCommand`] inside the
/// envelope, not by the ioctl code.
pub const DEVICE_IOCTL_CODE: u64 = (b'l' as u64) << 8;

/// Default path of the trace device's proc interface.
pub const DEVICE_DEFAULT_PATH: &str = "/proc/libiht-info";
