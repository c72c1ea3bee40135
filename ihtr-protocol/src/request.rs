//! The request envelope shared by every control operation.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{BtsRequest, LbrRequest};

/// Control operation selector, `enum IOCTL` on the device side.
///
/// Discriminants are part of the ABI and must not be renumbered. The
/// `LbrEnd`/`BtsEnd` sentinels delimit the per-mode command ranges in the
/// device's dispatch code and are never sent by this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum TraceCommand {
    Base = 0,

    EnableLbr = 1,
    DisableLbr = 2,
    DumpLbr = 3,
    ConfigureLbr = 4,
    LbrEnd = 5,

    EnableBts = 6,
    DisableBts = 7,
    DumpBts = 8,
    ConfigureBts = 9,
    BtsEnd = 10,
}

/// Size of the C request union: the larger of the two mode bodies.
pub const REQUEST_BODY_LEN: usize = size_of::<BtsRequest>();

/// One complete control request, `struct xioctl_request`.
///
/// The body is a byte array the size of the device's request union; the
/// device dispatches on `cmd` and interprets only the prefix belonging to
/// that command's mode. Trailing bytes of the smaller (LBR) body are zero.
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct RequestEnvelope {
    cmd: u32,
    _pad: u32,
    body: [u8; REQUEST_BODY_LEN],
}

impl RequestEnvelope {
    /// Wrap an LBR request body.
    #[must_use]
    pub fn lbr(cmd: TraceCommand, request: &LbrRequest) -> Self {
        debug_assert!(matches!(
            cmd,
            TraceCommand::EnableLbr
                | TraceCommand::DisableLbr
                | TraceCommand::DumpLbr
                | TraceCommand::ConfigureLbr
        ));
        let mut body = [0u8; REQUEST_BODY_LEN];
        body[..size_of::<LbrRequest>()].copy_from_slice(request.as_bytes());
        Self {
            cmd: cmd as u32,
            _pad: 0,
            body,
        }
    }

    /// Wrap a BTS request body.
    #[must_use]
    pub fn bts(cmd: TraceCommand, request: &BtsRequest) -> Self {
        debug_assert!(matches!(
            cmd,
            TraceCommand::EnableBts
                | TraceCommand::DisableBts
                | TraceCommand::DumpBts
                | TraceCommand::ConfigureBts
        ));
        let mut body = [0u8; REQUEST_BODY_LEN];
        body.copy_from_slice(request.as_bytes());
        Self {
            cmd: cmd as u32,
            _pad: 0,
            body,
        }
    }

    /// Raw command discriminant as the device sees it.
    #[must_use]
    pub fn command_code(&self) -> u32 {
        self.cmd
    }

    /// Body bytes, sized to the device's request union.
    #[must_use]
    pub fn body(&self) -> &[u8; REQUEST_BODY_LEN] {
        &self.body
    }
}

const _: () = assert!(REQUEST_BODY_LEN >= size_of::<LbrRequest>());
const _: () = assert!(size_of::<RequestEnvelope>() == 8 + REQUEST_BODY_LEN);
const _: () = assert!(align_of::<RequestEnvelope>() == 8);

#[cfg(test)]
mod tests {
    use zerocopy::{FromBytes, IntoBytes};

    use super::*;
    use crate::{BtsConfig, LbrConfig};

    #[test]
    fn test_lbr_envelope_layout() {
        let request = LbrRequest::new(LbrConfig::new(42, 0), 0xDEAD_0000);
        let envelope = RequestEnvelope::lbr(TraceCommand::EnableLbr, &request);
        let bytes = envelope.as_bytes();
        assert_eq!(bytes.len(), 40);
        assert_eq!(&bytes[0..4], 1u32.as_bytes());
        let body = LbrRequest::read_from_bytes(&bytes[8..8 + size_of::<LbrRequest>()]).unwrap();
        assert_eq!(body, request);
        // Union tail beyond the LBR body stays zeroed.
        assert!(bytes[8 + size_of::<LbrRequest>()..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_bts_envelope_layout() {
        let request = BtsRequest::new(BtsConfig::new(42, 0xC0, 512), 0xBEEF_0000);
        let envelope = RequestEnvelope::bts(TraceCommand::DumpBts, &request);
        let bytes = envelope.as_bytes();
        assert_eq!(&bytes[0..4], 8u32.as_bytes());
        let body = BtsRequest::read_from_bytes(&bytes[8..]).unwrap();
        assert_eq!(body, request);
    }
}
