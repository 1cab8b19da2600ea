//! Side-channel Control API (§4.10): a second SLIP-framed serial link,
//! independent of the primary bridge link, that lets an external controller
//! introspect attached interfaces and inject synthetic reports.

extern crate alloc;

use alloc::vec::Vec;

use bridge_proto::control_frame::{self, Command, ControlFlags, KeyKind, ResponseError};
use bridge_proto::hid_report::{InferredType, LayoutKind, ReportLayout};

use crate::log::warn;

const GET_REPORT_DESC_MAX_BYTES: usize = 236;

/// One tracked interface, as surfaced by `LIST_INTERFACES` (§3 session state).
#[derive(Debug, Clone, Copy)]
pub struct InterfaceInfo {
    pub dev_addr: u8,
    pub itf: u8,
    pub itf_protocol: u8,
    pub hid_protocol: u8,
    pub inferred_type: InferredType,
    pub mounted: bool,
    pub active: bool,
}

/// Descriptor/layout lookups the side channel needs but doesn't own.
pub trait DescriptorSource {
    fn report_descriptor(&self, itf: u8) -> Option<&[u8]>;
    fn report_layout(&self, itf: u8, report_id: u8) -> Option<ReportLayout>;
}

/// Injection path collaborator: the Input Forwarder. Returns `false` if the
/// forwarder refuses (not READY).
pub trait Injector {
    fn inject(&mut self, itf: u8, bytes: &[u8]) -> bool;
}

pub struct SideChannel {
    bootstrap_key: Vec<u8>,
    derived_key: Option<Vec<u8>>,
    derived_ever_verified: bool,
    board_id: Vec<u8>,
}

impl SideChannel {
    pub fn new(bootstrap_key: Vec<u8>, board_id: Vec<u8>) -> Self {
        SideChannel {
            bootstrap_key,
            derived_key: None,
            derived_ever_verified: false,
            board_id,
        }
    }

    /// Construct a side channel after checking it isn't sharing a UART with
    /// the primary link: returns `None` and logs once if `control_transport_id
    /// == primary_transport_id`, rather than let the two links corrupt each
    /// other's framing.
    pub fn new_checked(bootstrap_key: Vec<u8>, board_id: Vec<u8>, primary_transport_id: u32, control_transport_id: u32) -> Option<Self> {
        if control_transport_id == primary_transport_id {
            warn!("side channel disabled: shares a transport with the primary link");
            return None;
        }
        Some(Self::new(bootstrap_key, board_id))
    }

    pub fn set_derived_key(&mut self, key: Vec<u8>) {
        self.derived_key = Some(key);
    }

    /// Handle one inbound frame. Returns the encoded response to send back,
    /// or `None` if the frame failed authentication or carried an unknown
    /// command (§7: unknown commands are dropped silently).
    pub fn handle_frame(
        &mut self,
        raw: &[u8],
        interfaces: &[InterfaceInfo],
        descriptors: &dyn DescriptorSource,
        injector: &mut dyn Injector,
    ) -> Option<Vec<u8>> {
        let (frame, key_kind) =
            control_frame::parse_and_verify(raw, self.derived_key.as_deref(), &self.bootstrap_key).ok()?;

        let Some(command) = Command::from_u8(frame.cmd) else {
            return None; // unknown commands are dropped silently
        };

        // Once a derived-key verification has ever succeeded, the bootstrap
        // secret stops working for anything but GET_DEVICE_ID (§4.10 rollover).
        if key_kind == KeyKind::Bootstrap && self.derived_ever_verified && !command.always_bootstrap() {
            return None;
        }
        if key_kind == KeyKind::Derived {
            self.derived_ever_verified = true;
        }

        let seq = frame.seq;
        let payload = frame.payload;
        let response = match command {
            Command::InjectReport => self.inject_report(payload, interfaces, injector),
            Command::ListInterfaces => Ok(Self::list_interfaces(interfaces)),
            Command::SetLogLevel => Self::set_log_level(payload),
            Command::GetReportDesc => self.get_report_desc(payload, interfaces, descriptors),
            Command::GetReportLayout => self.get_report_layout(payload, interfaces, descriptors),
            Command::GetDeviceId => Ok(self.get_device_id()),
        };

        let key = self.derived_key.clone().unwrap_or_else(|| self.bootstrap_key.clone());
        let (flags, body) = match response {
            Ok(body) => (ControlFlags::RESPONSE, body),
            Err(err) => (ControlFlags::RESPONSE | ControlFlags::ERROR, alloc::vec![err as u8]),
        };
        control_frame::build_vec(seq, frame.cmd, flags, &body, &key).ok()
    }

    fn resolve_itf_sel(itf_sel: u8, interfaces: &[InterfaceInfo]) -> Option<u8> {
        match itf_sel {
            0xFF => interfaces
                .iter()
                .find(|i| i.mounted && i.inferred_type.contains(InferredType::MOUSE))
                .map(|i| i.itf),
            0xFE => interfaces
                .iter()
                .find(|i| i.mounted && i.inferred_type.contains(InferredType::KEYBOARD))
                .map(|i| i.itf),
            other => interfaces.iter().find(|i| i.itf == other).map(|i| i.itf),
        }
    }

    fn inject_report(&self, payload: &[u8], interfaces: &[InterfaceInfo], injector: &mut dyn Injector) -> Result<Vec<u8>, ResponseError> {
        if payload.len() < 2 {
            return Err(ResponseError::BadLen);
        }
        let itf_sel = payload[0];
        let rlen = payload[1] as usize;
        let bytes = payload.get(2..2 + rlen).ok_or(ResponseError::BadLen)?;
        let Some(itf) = Self::resolve_itf_sel(itf_sel, interfaces) else {
            return Err(ResponseError::InjectFailed);
        };
        if injector.inject(itf, bytes) {
            Ok(Vec::new())
        } else {
            warn!("inject refused: forwarder not ready");
            Err(ResponseError::InjectFailed)
        }
    }

    fn list_interfaces(interfaces: &[InterfaceInfo]) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + interfaces.len() * 7);
        out.push(interfaces.len() as u8);
        for i in interfaces {
            out.push(i.dev_addr);
            out.push(i.itf);
            out.push(i.itf_protocol);
            out.push(i.hid_protocol);
            out.push(i.inferred_type.bits());
            out.push(i.active as u8);
            out.push(i.mounted as u8);
        }
        out
    }

    fn set_log_level(payload: &[u8]) -> Result<Vec<u8>, ResponseError> {
        if payload.is_empty() {
            return Err(ResponseError::BadLen);
        }
        Ok(Vec::new())
    }

    fn get_report_desc(&self, payload: &[u8], interfaces: &[InterfaceInfo], descriptors: &dyn DescriptorSource) -> Result<Vec<u8>, ResponseError> {
        let &[itf] = payload else {
            return Err(ResponseError::BadLen);
        };
        let _ = interfaces;
        let bytes = descriptors.report_descriptor(itf).ok_or(ResponseError::DescMissing)?;
        let total_len = bytes.len() as u16;
        let truncated = bytes.len() > GET_REPORT_DESC_MAX_BYTES;
        let take = bytes.len().min(GET_REPORT_DESC_MAX_BYTES);

        let mut out = Vec::with_capacity(4 + take);
        out.push(itf);
        out.extend_from_slice(&total_len.to_le_bytes());
        out.push(truncated as u8);
        out.extend_from_slice(&bytes[..take]);
        Ok(out)
    }

    fn get_report_layout(&self, payload: &[u8], interfaces: &[InterfaceInfo], descriptors: &dyn DescriptorSource) -> Result<Vec<u8>, ResponseError> {
        let &[itf, report_id] = payload else {
            return Err(ResponseError::BadLen);
        };
        let _ = interfaces;
        let layout = descriptors.report_layout(itf, report_id).ok_or(ResponseError::LayoutMissing)?;
        Ok(encode_layout(&layout))
    }

    fn get_device_id(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.board_id.len());
        out.push(self.board_id.len() as u8);
        out.extend_from_slice(&self.board_id);
        out
    }
}

fn encode_field(f: &bridge_proto::hid_report::Field, out: &mut Vec<u8>) {
    out.push(f.present as u8);
    out.extend_from_slice(&f.offset_bits.to_le_bytes());
    out.push(f.size_bits);
    out.push(f.is_signed as u8);
}

fn encode_layout(layout: &ReportLayout) -> Vec<u8> {
    let mut out = Vec::with_capacity(24);
    out.push(layout.report_id);
    out.push(match layout.layout_kind {
        LayoutKind::None => 0,
        LayoutKind::Mouse => 1,
        LayoutKind::Keyboard => 2,
        LayoutKind::MouseAndKeyboard => 3,
    });
    out.push(layout.flags.bits());
    out.extend_from_slice(&layout.buttons_offset_bits.to_le_bytes());
    out.push(layout.buttons_count);
    out.push(layout.buttons_size_bits);
    encode_field(&layout.x, &mut out);
    encode_field(&layout.y, &mut out);
    encode_field(&layout.wheel, &mut out);
    out.push(layout.keyboard_report_len_bytes);
    out.push(layout.keyboard_has_report_id as u8);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOTSTRAP: &[u8] = b"bootstrap-secret";

    struct FakeDescriptors {
        report: Vec<u8>,
        layout: Option<ReportLayout>,
    }

    impl DescriptorSource for FakeDescriptors {
        fn report_descriptor(&self, _itf: u8) -> Option<&[u8]> {
            Some(&self.report)
        }
        fn report_layout(&self, _itf: u8, _report_id: u8) -> Option<ReportLayout> {
            self.layout
        }
    }

    struct FakeInjector {
        ready: bool,
        injected: Vec<(u8, Vec<u8>)>,
    }

    impl Injector for FakeInjector {
        fn inject(&mut self, itf: u8, bytes: &[u8]) -> bool {
            if !self.ready {
                return false;
            }
            self.injected.push((itf, bytes.to_vec()));
            true
        }
    }

    fn interfaces() -> Vec<InterfaceInfo> {
        alloc::vec![InterfaceInfo {
            dev_addr: 1,
            itf: 0,
            itf_protocol: 2,
            hid_protocol: 1,
            inferred_type: InferredType::MOUSE,
            mounted: true,
            active: true,
        }]
    }

    #[test]
    fn get_device_id_works_with_bootstrap_key_always() {
        let mut sc = SideChannel::new(BOOTSTRAP.to_vec(), alloc::vec![1, 2, 3, 4]);
        let req = control_frame::build_vec(1, Command::GetDeviceId as u8, ControlFlags::empty(), &[], BOOTSTRAP).unwrap();
        let descriptors = FakeDescriptors { report: Vec::new(), layout: None };
        let mut injector = FakeInjector { ready: true, injected: Vec::new() };
        let rsp = sc.handle_frame(&req, &interfaces(), &descriptors, &mut injector).unwrap();
        let (frame, _) = control_frame::parse_and_verify(&rsp, None, BOOTSTRAP).unwrap();
        assert_eq!(frame.payload, &[4, 1, 2, 3, 4]);
    }

    #[test]
    fn inject_report_resolves_first_mounted_mouse_and_bumps_seq() {
        let mut sc = SideChannel::new(BOOTSTRAP.to_vec(), alloc::vec![9]);
        let payload = [0xFFu8, 4, 0x01, 0x05, 0x00, 0x00];
        let req = control_frame::build_vec(3, Command::InjectReport as u8, ControlFlags::empty(), &payload, BOOTSTRAP).unwrap();
        let descriptors = FakeDescriptors { report: Vec::new(), layout: None };
        let mut injector = FakeInjector { ready: true, injected: Vec::new() };
        let rsp = sc.handle_frame(&req, &interfaces(), &descriptors, &mut injector).unwrap();
        assert_eq!(injector.injected, alloc::vec![(0u8, alloc::vec![0x01, 0x05, 0x00, 0x00])]);
        let (frame, _) = control_frame::parse_and_verify(&rsp, None, BOOTSTRAP).unwrap();
        assert!(!frame.flags.contains(ControlFlags::ERROR));
    }

    #[test]
    fn inject_refused_when_forwarder_not_ready() {
        let mut sc = SideChannel::new(BOOTSTRAP.to_vec(), alloc::vec![9]);
        let payload = [0xFFu8, 1, 0x01];
        let req = control_frame::build_vec(1, Command::InjectReport as u8, ControlFlags::empty(), &payload, BOOTSTRAP).unwrap();
        let descriptors = FakeDescriptors { report: Vec::new(), layout: None };
        let mut injector = FakeInjector { ready: false, injected: Vec::new() };
        let rsp = sc.handle_frame(&req, &interfaces(), &descriptors, &mut injector).unwrap();
        let (frame, _) = control_frame::parse_and_verify(&rsp, None, BOOTSTRAP).unwrap();
        assert!(frame.flags.contains(ControlFlags::ERROR));
        assert_eq!(frame.payload, &[ResponseError::InjectFailed as u8]);
    }

    #[test]
    fn bad_hmac_is_silently_dropped() {
        let mut sc = SideChannel::new(BOOTSTRAP.to_vec(), alloc::vec![9]);
        let mut req = control_frame::build_vec(1, Command::GetDeviceId as u8, ControlFlags::empty(), &[], BOOTSTRAP).unwrap();
        let last = req.len() - 1;
        req[last] ^= 0xFF;
        let descriptors = FakeDescriptors { report: Vec::new(), layout: None };
        let mut injector = FakeInjector { ready: true, injected: Vec::new() };
        assert!(sc.handle_frame(&req, &interfaces(), &descriptors, &mut injector).is_none());
    }

    #[test]
    fn shared_transport_id_disables_side_channel() {
        assert!(SideChannel::new_checked(BOOTSTRAP.to_vec(), alloc::vec![1], 0, 0).is_none());
        assert!(SideChannel::new_checked(BOOTSTRAP.to_vec(), alloc::vec![1], 0, 1).is_some());
    }

    #[test]
    fn bootstrap_key_rejected_for_non_device_id_commands_after_derived_key_seen() {
        let mut sc = SideChannel::new(BOOTSTRAP.to_vec(), alloc::vec![9]);
        sc.set_derived_key(b"derived-key".to_vec());
        let derived_req = control_frame::build_vec(1, Command::ListInterfaces as u8, ControlFlags::empty(), &[], b"derived-key").unwrap();
        let descriptors = FakeDescriptors { report: Vec::new(), layout: None };
        let mut injector = FakeInjector { ready: true, injected: Vec::new() };
        assert!(sc.handle_frame(&derived_req, &interfaces(), &descriptors, &mut injector).is_some());

        let bootstrap_req = control_frame::build_vec(2, Command::ListInterfaces as u8, ControlFlags::empty(), &[], BOOTSTRAP).unwrap();
        assert!(sc.handle_frame(&bootstrap_req, &interfaces(), &descriptors, &mut injector).is_none());
    }
}
