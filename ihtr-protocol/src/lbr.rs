//! LBR (Last Branch Record) wire types.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Per-trace LBR parameters, `struct lbr_config` on the device side.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct LbrConfig {
    /// Target process id.
    pub pid: u32,
    _pad: u32,
    /// `MSR_LBR_SELECT` filter word, forwarded verbatim to the device.
    /// See [`select_bits`] for the documented filter bits.
    pub lbr_select: u64,
}

impl LbrConfig {
    #[must_use]
    pub fn new(pid: u32, lbr_select: u64) -> Self {
        Self {
            pid,
            _pad: 0,
            lbr_select,
        }
    }
}

/// One recorded branch, `struct lbr_stack_entry`.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct LbrStackEntry {
    /// Branch source address.
    pub from: u64,
    /// Branch destination address.
    pub to: u64,
}

/// Header of the dump buffer, `struct lbr_data`.
///
/// The device writes the top-of-stack cursor into `lbr_tos` during a dump
/// and fills the entry array behind `entries`. `entries` is a raw pointer
/// smuggled through the boundary as a `u64`; it is only meaningful inside
/// the process that allocated it.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct LbrDataHeader {
    /// Index of the most recently written ring slot.
    pub lbr_tos: u64,
    /// User-space address of the `LbrStackEntry` array.
    pub entries: u64,
}

/// Full LBR request body, `struct lbr_ioctl_request`.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct LbrRequest {
    pub config: LbrConfig,
    /// User-space address of the [`LbrDataHeader`].
    pub buffer: u64,
}

impl LbrRequest {
    #[must_use]
    pub fn new(config: LbrConfig, buffer: u64) -> Self {
        Self { config, buffer }
    }
}

/// Filter bits of the `lbr_select` word (`MSR_LBR_SELECT`).
///
/// Each bit *suppresses* the named class of branches when set. A selector
/// of zero records everything the hardware can see.
pub mod select_bits {
    /// Do not capture branches ending in ring 0.
    pub const CPL_EQ_0: u64 = 1 << 0;
    /// Do not capture branches ending in ring > 0.
    pub const CPL_NEQ_0: u64 = 1 << 1;
    /// Do not capture conditional branches.
    pub const JCC: u64 = 1 << 2;
    /// Do not capture near relative calls.
    pub const NEAR_REL_CALL: u64 = 1 << 3;
    /// Do not capture near indirect calls.
    pub const NEAR_IND_CALL: u64 = 1 << 4;
    /// Do not capture near returns.
    pub const NEAR_RET: u64 = 1 << 5;
    /// Do not capture near indirect jumps.
    pub const NEAR_IND_JMP: u64 = 1 << 6;
    /// Do not capture near relative jumps.
    pub const NEAR_REL_JMP: u64 = 1 << 7;
    /// Do not capture far branches.
    pub const FAR_BRANCH: u64 = 1 << 8;

    /// Device default: skip kernel-ending branches, keep user code.
    pub const DEFAULT: u64 = CPL_EQ_0;
}

const _: () = assert!(size_of::<LbrConfig>() == 16);
const _: () = assert!(size_of::<LbrStackEntry>() == 16);
const _: () = assert!(size_of::<LbrDataHeader>() == 16);
const _: () = assert!(size_of::<LbrRequest>() == 24);
const _: () = assert!(align_of::<LbrRequest>() == 8);

#[cfg(test)]
mod tests {
    use zerocopy::{FromBytes, IntoBytes};

    use super::*;

    #[test]
    fn test_lbr_config_field_offsets() {
        let config = LbrConfig::new(0x1234, 0xAABB_CCDD_EEFF_0011);
        let bytes = config.as_bytes();
        assert_eq!(&bytes[0..4], 0x1234u32.as_bytes());
        // Four bytes of explicit padding between pid and lbr_select.
        assert_eq!(&bytes[8..16], 0xAABB_CCDD_EEFF_0011u64.as_bytes());
    }

    #[test]
    fn test_lbr_entry_roundtrip() {
        let entry = LbrStackEntry {
            from: 0x10,
            to: 0x20,
        };
        let parsed = LbrStackEntry::read_from_bytes(entry.as_bytes()).unwrap();
        assert_eq!(parsed, entry);
    }
}
