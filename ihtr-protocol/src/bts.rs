//! BTS (Branch Trace Store) wire types.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Per-trace BTS parameters, `struct bts_config` on the device side.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct BtsConfig {
    /// Target process id.
    pub pid: u32,
    _pad: u32,
    /// `IA32_DEBUGCTL` trace-control flags, forwarded verbatim.
    pub bts_config: u64,
    /// Requested buffer capacity in records; zero lets the device pick
    /// its default.
    pub bts_buffer_size: u64,
}

impl BtsConfig {
    #[must_use]
    pub fn new(pid: u32, bts_config: u64, bts_buffer_size: u64) -> Self {
        Self {
            pid,
            _pad: 0,
            bts_config,
            bts_buffer_size,
        }
    }
}

/// One branch trace message, `struct bts_record`.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct BtsRecord {
    /// Branch source address.
    pub from: u64,
    /// Branch destination address.
    pub to: u64,
    /// Hardware auxiliary flags (e.g. branch-predicted bit).
    pub misc: u64,
}

/// Header of the dump buffer, `struct bts_data`.
///
/// Pointers cross the boundary as `u64`s. `bts_index` points at the next
/// free record inside the array behind `bts_buffer_base`, so the number of
/// populated records is the pointer difference in record units. The
/// interrupt threshold belongs to the device's overflow handling and is
/// irrelevant to decoding.
///
/// Older kernel-side revisions of `bts_data` carry a fourth field,
/// `bts_absolute_maximum`, between `bts_index` and
/// `bts_interrupt_threshold`. This layout matches the three-field
/// revision the user-space library speaks; a device built from the
/// four-field headers needs this struct (and the size assertion below)
/// bumped first.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct BtsDataHeader {
    /// User-space address of the `BtsRecord` array.
    pub bts_buffer_base: u64,
    /// User-space address one past the newest record, or null when the
    /// device did not report a write position.
    pub bts_index: u64,
    /// Buffer offset at which the device raises its near-full interrupt.
    pub bts_interrupt_threshold: u64,
}

/// Full BTS request body, `struct bts_ioctl_request`.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct BtsRequest {
    pub config: BtsConfig,
    /// User-space address of the [`BtsDataHeader`].
    pub buffer: u64,
}

impl BtsRequest {
    #[must_use]
    pub fn new(config: BtsConfig, buffer: u64) -> Self {
        Self { config, buffer }
    }
}

const _: () = assert!(size_of::<BtsConfig>() == 24);
const _: () = assert!(size_of::<BtsRecord>() == 24);
const _: () = assert!(size_of::<BtsDataHeader>() == 24);
const _: () = assert!(size_of::<BtsRequest>() == 32);
const _: () = assert!(align_of::<BtsRequest>() == 8);
