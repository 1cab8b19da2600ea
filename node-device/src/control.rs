//! Control Request Router, device side (§4.8): reflects USB device-stack
//! callbacks (`SET_REPORT`/`SET_PROTOCOL`/`SET_IDLE`) to node H as plain
//! `CONTROL` frames on the primary link, and services `GET_REPORT`
//! synchronously the way a real HID stack's `get_report` callback demands
//! (§4.5 `tud_hid_get_report_cb`).

extern crate alloc;

use alloc::vec::Vec;

use bridge_proto::error::CodecError;
use bridge_proto::frame::{self, FrameKind};

use crate::log::warn;

pub use bridge_proto::control_cmd::GET_REPORT as CMD_GET_REPORT;
pub use bridge_proto::control_cmd::SET_REPORT as CMD_SET_REPORT;
pub use bridge_proto::control_cmd::SET_PROTOCOL as CMD_SET_PROTOCOL;
pub use bridge_proto::control_cmd::SET_IDLE as CMD_SET_IDLE;
pub use bridge_proto::control_cmd::DEVICE_RESET as CMD_DEVICE_RESET;

pub const GET_REPORT_MAX_LEN: usize = 64;

/// Why node H asked this node to reset (§4.8 `DEVICE_RESET`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    HostRequested = 0,
    DescriptorResync = 1,
    LinkRecovery = 2,
}

impl ResetReason {
    pub fn from_u8(b: u8) -> Option<ResetReason> {
        match b {
            0 => Some(ResetReason::HostRequested),
            1 => Some(ResetReason::DescriptorResync),
            2 => Some(ResetReason::LinkRecovery),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingGet {
    itf: u8,
    report_type: u8,
    report_id: u8,
}

/// One synchronous `GET_REPORT` in flight, plus the outgoing-frame builders
/// for the other reflected callbacks.
pub struct ControlRouter {
    pending: Option<PendingGet>,
}

impl ControlRouter {
    pub fn new() -> Self {
        ControlRouter { pending: None }
    }

    pub fn pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Called from the USB stack's synchronous get-report callback: builds
    /// the outbound request `{itf,type,id,reqlen-LE}` and arms the pending
    /// record the caller must then busy-wait on (bounded by the caller's own
    /// timeout, §5: ≤20ms).
    pub fn begin_get_report(
        &mut self,
        itf: u8,
        report_type: u8,
        report_id: u8,
        reqlen: u16,
    ) -> Result<Vec<u8>, CodecError> {
        self.pending = Some(PendingGet { itf, report_type, report_id });
        let mut payload = Vec::with_capacity(5);
        payload.push(itf);
        payload.push(report_type);
        payload.push(report_id);
        payload.extend_from_slice(&reqlen.to_le_bytes());
        frame::build_vec(FrameKind::Control, CMD_GET_REPORT, &payload)
    }

    pub fn cancel_get_report(&mut self) {
        self.pending = None;
    }

    /// Feed an inbound `GET_REPORT` response payload `{itf,type,id,bytes}`
    /// in; returns the copied length once the matching response arrives. A
    /// response for the wrong itf/type/id is ignored (stale answer to an
    /// already-timed-out request).
    pub fn on_get_report_response(&mut self, payload: &[u8], out: &mut [u8]) -> Option<usize> {
        let pending = self.pending?;
        if payload.len() < 3 {
            return None;
        }
        if payload[0] != pending.itf || payload[1] != pending.report_type || payload[2] != pending.report_id {
            warn!("get_report response mismatch itf/type/id");
            return None;
        }
        self.pending = None;
        let data = &payload[3..];
        let take = data.len().min(out.len()).min(GET_REPORT_MAX_LEN);
        out[..take].copy_from_slice(&data[..take]);
        Some(take)
    }

    pub fn reflect_set_report(
        &self,
        itf: u8,
        report_type: u8,
        report_id: u8,
        data: &[u8],
    ) -> Result<Vec<u8>, CodecError> {
        let mut payload = Vec::with_capacity(3 + data.len());
        payload.push(itf);
        payload.push(report_type);
        payload.push(report_id);
        payload.extend_from_slice(data);
        frame::build_vec(FrameKind::Control, CMD_SET_REPORT, &payload)
    }

    pub fn reflect_set_protocol(&self, itf: u8, protocol: u8) -> Result<Vec<u8>, CodecError> {
        frame::build_vec(FrameKind::Control, CMD_SET_PROTOCOL, &[itf, protocol])
    }

    pub fn reflect_set_idle(&self, itf: u8, duration: u8, report_id: u8) -> Result<Vec<u8>, CodecError> {
        frame::build_vec(FrameKind::Control, CMD_SET_IDLE, &[itf, duration, report_id])
    }

    /// Decode an inbound `DEVICE_RESET` request's reason byte.
    pub fn parse_device_reset(payload: &[u8]) -> Option<ResetReason> {
        payload.first().copied().and_then(ResetReason::from_u8)
    }
}

impl Default for ControlRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_report_round_trip() {
        let mut router = ControlRouter::new();
        let req = router.begin_get_report(0, 1, 0, 8).unwrap();
        assert!(router.pending());
        let parsed = frame::parse(&req).unwrap();
        assert_eq!(parsed.cmd, CMD_GET_REPORT);
        assert_eq!(parsed.payload, &[0, 1, 0, 8, 0]);

        let mut out = [0u8; 8];
        let response_payload = [0u8, 1, 0, 0xAA, 0xBB, 0xCC];
        let n = router.on_get_report_response(&response_payload, &mut out).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&out[..3], &[0xAA, 0xBB, 0xCC]);
        assert!(!router.pending());
    }

    #[test]
    fn stale_response_itf_is_ignored() {
        let mut router = ControlRouter::new();
        router.begin_get_report(0, 1, 0, 8).unwrap();
        let mut out = [0u8; 8];
        let result = router.on_get_report_response(&[1, 1, 0, 1], &mut out);
        assert!(result.is_none());
        assert!(router.pending());
    }

    #[test]
    fn short_response_payload_clears_nothing() {
        let mut router = ControlRouter::new();
        router.begin_get_report(0, 1, 2, 8).unwrap();
        let mut out = [0u8; 8];
        let result = router.on_get_report_response(&[0, 1], &mut out);
        assert!(result.is_none());
        assert!(router.pending());
    }

    #[test]
    fn device_reset_reason_parses() {
        assert_eq!(ControlRouter::parse_device_reset(&[1]), Some(ResetReason::DescriptorResync));
        assert_eq!(ControlRouter::parse_device_reset(&[99]), None);
    }
}
