//! Descriptor Pipeline (§4.3): `IDLE → GET_DEVICE → GET_CONFIG → GET_LANGID
//! → GET_STR(manuf/prod/serial) → PARSE_CONFIG_FOR_HID → FETCH_REPORT(itf)*
//! → FORWARD_DONE → WAIT_READY`, one cooperative step per `service()` call.

extern crate alloc;

use alloc::vec::Vec;

use bridge_proto::config::BridgeConfig;
use bridge_proto::descriptor_cmd as dcmd;
use bridge_proto::frame::{self, FrameKind};

use crate::log::{info, warn};
use crate::usb_stack::HostUsbStack;

const CHUNK_SIZE: usize = 48;
const MAX_HID_INTERFACES: usize = 4;
const MAX_REPORT_FETCH_RETRIES: u8 = 3;
const STANDARD_DEVICE_DESC_LEN: usize = 18;

const STR_MANUFACTURER: usize = 0;
const STR_PRODUCT: usize = 1;
const STR_SERIAL: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Idle,
    GetDevice,
    GetConfig,
    GetLangId,
    GetStr(u8),
    FetchReport(u8),
    ForwardDone,
    WaitReady,
}

#[derive(Debug, Clone, Copy)]
struct HidItf {
    itf_num: u8,
    itf_protocol: u8,
}

pub struct DescriptorPipeline {
    step: Step,
    dev_addr: u8,
    hid_interfaces: arrayvec::ArrayVec<HidItf, MAX_HID_INTERFACES>,
    device_bytes: Vec<u8>,
    config_bytes: Vec<u8>,
    expected_mask: u8,
    forwarded_mask: u8,
    report_retries: [u8; MAX_HID_INTERFACES],
    done_sent: bool,
    done_resend_count: u8,
    last_done_sent_ms: u32,
    pub ready_received: bool,
    pub input_paused: bool,
}

impl DescriptorPipeline {
    pub fn new() -> Self {
        DescriptorPipeline {
            step: Step::Idle,
            dev_addr: 0,
            hid_interfaces: arrayvec::ArrayVec::new(),
            device_bytes: Vec::new(),
            config_bytes: Vec::new(),
            expected_mask: 0,
            forwarded_mask: 0,
            report_retries: [0; MAX_HID_INTERFACES],
            done_sent: false,
            done_resend_count: 0,
            last_done_sent_ms: 0,
            ready_received: false,
            input_paused: true,
        }
    }

    /// A mount event from the host stack: begin a fresh descriptor pass.
    pub fn on_mount(&mut self, dev_addr: u8) {
        *self = DescriptorPipeline::new();
        self.dev_addr = dev_addr;
        self.step = Step::GetDevice;
        info!("descriptor pipeline started for dev_addr={}", dev_addr);
    }

    pub fn on_ready(&mut self) {
        self.ready_received = true;
        self.input_paused = false;
    }

    pub fn is_running(&self) -> bool {
        self.step != Step::Idle
    }

    /// Advance one step, appending any frames that step produced to `out`.
    pub fn service(&mut self, stack: &mut dyn HostUsbStack, cfg: &BridgeConfig, now_ms: u32, out: &mut Vec<Vec<u8>>) {
        match self.step {
            Step::Idle => {}
            Step::GetDevice => self.step_get_device(stack, out),
            Step::GetConfig => self.step_get_config(stack, out),
            Step::GetLangId => self.step_get_langid(stack, out),
            Step::GetStr(which) => self.step_get_str(which, stack, out),
            Step::FetchReport(itf) => self.step_fetch_report(itf, stack, out),
            Step::ForwardDone => self.step_forward_done(cfg, now_ms, out),
            Step::WaitReady => self.step_wait_ready(cfg, now_ms, out),
        }
    }

    fn emit_descriptor_frame(cmd: u8, payload: &[u8], out: &mut Vec<Vec<u8>>) {
        if let Ok(bytes) = frame::build_vec(FrameKind::Descriptor, cmd, payload) {
            out.push(bytes);
        }
    }

    fn emit_control_frame(cmd: u8, payload: &[u8], out: &mut Vec<Vec<u8>>) {
        if let Ok(bytes) = frame::build_vec(FrameKind::Control, cmd, payload) {
            out.push(bytes);
        }
    }

    fn emit_chunked(cmd: u8, prefix: &[u8], body: &[u8], out: &mut Vec<Vec<u8>>) {
        if body.is_empty() {
            let mut payload = Vec::with_capacity(prefix.len());
            payload.extend_from_slice(prefix);
            Self::emit_descriptor_frame(cmd, &payload, out);
            return;
        }
        for chunk in body.chunks(CHUNK_SIZE.saturating_sub(prefix.len()).max(1)) {
            let mut payload = Vec::with_capacity(prefix.len() + chunk.len());
            payload.extend_from_slice(prefix);
            payload.extend_from_slice(chunk);
            Self::emit_descriptor_frame(cmd, &payload, out);
        }
    }

    fn step_get_device(&mut self, stack: &mut dyn HostUsbStack, out: &mut Vec<Vec<u8>>) {
        match stack.get_device_descriptor(self.dev_addr) {
            Some(bytes) => {
                self.device_bytes = bytes;
                Self::emit_chunked(dcmd::DEV_DESC, &[], &self.device_bytes, out);
                self.step = Step::GetConfig;
            }
            None => {
                warn!("device descriptor fetch failed, continuing best-effort");
                self.step = Step::GetConfig;
            }
        }
    }

    fn step_get_config(&mut self, stack: &mut dyn HostUsbStack, out: &mut Vec<Vec<u8>>) {
        match stack.get_config_descriptor(self.dev_addr) {
            Some(bytes) => {
                self.hid_interfaces = parse_hid_interfaces(&bytes);
                for i in 0..self.hid_interfaces.len().min(MAX_HID_INTERFACES) {
                    self.expected_mask |= 1 << i;
                }
                self.config_bytes = bytes;
                Self::emit_chunked(dcmd::CONFIG_DESC, &[], &self.config_bytes, out);
            }
            None => warn!("config descriptor fetch failed, continuing best-effort"),
        }
        self.step = Step::GetLangId;
    }

    fn step_get_langid(&mut self, stack: &mut dyn HostUsbStack, out: &mut Vec<Vec<u8>>) {
        if let Some(bytes) = stack.get_string_descriptor(self.dev_addr, 0, 0) {
            Self::emit_chunked(dcmd::STRING_DESC, &[0], &bytes, out);
        }
        self.step = Step::GetStr(0);
    }

    fn device_string_index(&self, which: u8) -> u8 {
        if self.device_bytes.len() < STANDARD_DEVICE_DESC_LEN {
            return 0;
        }
        match which as usize {
            STR_MANUFACTURER => self.device_bytes[14],
            STR_PRODUCT => self.device_bytes[15],
            STR_SERIAL => self.device_bytes[16],
            _ => 0,
        }
    }

    fn step_get_str(&mut self, which: u8, stack: &mut dyn HostUsbStack, out: &mut Vec<Vec<u8>>) {
        let idx = self.device_string_index(which);
        if idx != 0 {
            if let Some(bytes) = stack.get_string_descriptor(self.dev_addr, idx, 0x0409) {
                Self::emit_chunked(dcmd::STRING_DESC, &[idx], &bytes, out);
            } else {
                warn!("string descriptor idx={} fetch failed, continuing", idx);
            }
        }
        self.step = if which < 2 {
            Step::GetStr(which + 1)
        } else if self.hid_interfaces.is_empty() {
            Step::ForwardDone
        } else {
            Step::FetchReport(0)
        };
    }

    fn step_fetch_report(&mut self, itf: u8, stack: &mut dyn HostUsbStack, out: &mut Vec<Vec<u8>>) {
        let idx = itf as usize;
        let Some(hid) = self.hid_interfaces.get(idx).copied() else {
            self.step = Step::ForwardDone;
            return;
        };
        match stack.get_report_descriptor(self.dev_addr, hid.itf_num) {
            Some(bytes) => {
                Self::emit_chunked(dcmd::REPORT_DESC, &[itf], &bytes, out);
                self.forwarded_mask |= 1 << idx;
                self.report_retries[idx] = 0;
                self.advance_past_report(itf);
            }
            None => {
                self.report_retries[idx] += 1;
                if self.report_retries[idx] >= MAX_REPORT_FETCH_RETRIES {
                    warn!("report descriptor itf={} exhausted retries, accepting stub", itf);
                    self.advance_past_report(itf);
                } else {
                    warn!("report descriptor itf={} fetch failed, retrying", itf);
                }
            }
        }
    }

    fn advance_past_report(&mut self, itf: u8) {
        let next = itf + 1;
        self.step = if (next as usize) < self.hid_interfaces.len() {
            Step::FetchReport(next)
        } else {
            Step::ForwardDone
        };
    }

    fn step_forward_done(&mut self, cfg: &BridgeConfig, now_ms: u32, out: &mut Vec<Vec<u8>>) {
        if cfg.resend_before_done {
            Self::emit_chunked(dcmd::DEV_DESC, &[], &self.device_bytes, out);
            Self::emit_chunked(dcmd::CONFIG_DESC, &[], &self.config_bytes, out);
        }
        Self::emit_descriptor_frame(dcmd::DONE, &[], out);
        self.done_sent = true;
        self.done_resend_count = 0;
        self.last_done_sent_ms = now_ms;
        self.input_paused = true;
        self.ready_received = false;
        info!(
            "DONE forwarded (forwarded_mask={:#04x} expected_mask={:#04x})",
            self.forwarded_mask, self.expected_mask
        );
        self.step = Step::WaitReady;
    }

    fn step_wait_ready(&mut self, cfg: &BridgeConfig, now_ms: u32, out: &mut Vec<Vec<u8>>) {
        if self.ready_received {
            info!("READY received, pipeline settled");
            self.step = Step::Idle;
            return;
        }
        if now_ms.wrapping_sub(self.last_done_sent_ms) < cfg.ready_retry_ms {
            return;
        }
        if self.done_resend_count < cfg.ready_retry_limit {
            warn!("READY timeout, resending DONE (attempt {})", self.done_resend_count + 1);
            Self::emit_descriptor_frame(dcmd::DONE, &[], out);
            self.done_resend_count += 1;
            self.last_done_sent_ms = now_ms;
        } else {
            warn!("READY never arrived after {} resends, forcing reenumeration", cfg.ready_retry_limit);
            if let Ok(unmount) = frame::build_vec(FrameKind::Unmount, 0, &[]) {
                out.push(unmount);
            }
            Self::emit_control_frame(bridge_proto::control_cmd::DEVICE_RESET, &[0], out);
            self.step = Step::Idle;
        }
    }
}

impl Default for DescriptorPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan a configuration descriptor for HID-class interface descriptors,
/// in declaration order (§4.4 layout selection relies on this ordering
/// matching node D's `reports[itf]` indexing).
fn parse_hid_interfaces(config: &[u8]) -> arrayvec::ArrayVec<HidItf, MAX_HID_INTERFACES> {
    let mut out = arrayvec::ArrayVec::new();
    let mut pos = 0;
    while pos + 2 <= config.len() {
        let len = config[pos] as usize;
        if len < 2 || pos + len > config.len() {
            break;
        }
        let desc_type = config[pos + 1];
        if desc_type == 0x04 && len >= 9 {
            let itf_class = config[pos + 5];
            if itf_class == 0x03 {
                let itf_num = config[pos + 2];
                let itf_protocol = config[pos + 7];
                if out.try_push(HidItf { itf_num, itf_protocol }).is_err() {
                    break;
                }
            }
        }
        pos += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb_stack::fake::FakeHostStack;

    fn std_device_desc() -> Vec<u8> {
        let mut d = alloc::vec![0u8; 18];
        d[0] = 18;
        d[1] = 1;
        d[14] = 1; // iManufacturer
        d[15] = 2; // iProduct
        d[16] = 3; // iSerialNumber
        d
    }

    fn config_with_one_hid_itf() -> Vec<u8> {
        let mut d = Vec::new();
        d.extend_from_slice(&[9, 2, 9 + 9, 0, 1, 1, 0, 0, 0]); // config header, wTotalLength patched below
        let itf_start = d.len();
        d.extend_from_slice(&[9, 4, 0, 0, 1, 0x03, 0x01, 0x02, 0]); // interface: HID, boot, mouse
        let total = d.len() as u16;
        d[2] = (total & 0xFF) as u8;
        d[3] = (total >> 8) as u8;
        let _ = itf_start;
        d
    }

    fn run_until_wait_ready(pipeline: &mut DescriptorPipeline, stack: &mut FakeHostStack, cfg: &BridgeConfig) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        pipeline.on_mount(1);
        for _ in 0..20 {
            pipeline.service(stack, cfg, 0, &mut frames);
            if matches!(pipeline.step, Step::WaitReady) {
                break;
            }
        }
        frames
    }

    #[test]
    fn happy_path_reaches_wait_ready_with_done_last() {
        let cfg = BridgeConfig::DEFAULT;
        let mut stack = FakeHostStack {
            device_desc: Some(std_device_desc()),
            config_desc: Some(config_with_one_hid_itf()),
            ..Default::default()
        };
        stack.strings.insert(0, alloc::vec![0x04, 0x03, 0x09, 0x04]);
        stack.strings.insert(1, alloc::vec![0x04, 0x03, b'A', 0]);
        stack.strings.insert(2, alloc::vec![0x04, 0x03, b'B', 0]);
        stack.strings.insert(3, alloc::vec![0x04, 0x03, b'C', 0]);
        stack.reports.insert(0, alloc::vec![0x05, 0x01, 0x09, 0x02]);

        let mut pipeline = DescriptorPipeline::new();
        let frames = run_until_wait_ready(&mut pipeline, &mut stack, &cfg);

        assert!(matches!(pipeline.step, Step::WaitReady));
        assert!(pipeline.input_paused);
        let last = frame::parse(frames.last().unwrap()).unwrap();
        assert_eq!(last.kind, FrameKind::Descriptor);
        assert_eq!(last.cmd, dcmd::DONE);
        assert_eq!(pipeline.forwarded_mask, pipeline.expected_mask);
    }

    #[test]
    fn ready_unblocks_input_and_returns_to_idle() {
        let cfg = BridgeConfig::DEFAULT;
        let mut stack = FakeHostStack {
            device_desc: Some(std_device_desc()),
            config_desc: Some(Vec::new()),
            ..Default::default()
        };
        let mut pipeline = DescriptorPipeline::new();
        let _ = run_until_wait_ready(&mut pipeline, &mut stack, &cfg);
        pipeline.on_ready();
        let mut frames = Vec::new();
        pipeline.service(&mut stack, &cfg, 0, &mut frames);
        assert!(!pipeline.input_paused);
        assert!(!pipeline.is_running());
    }

    #[test]
    fn missing_ready_resends_done_then_forces_reset() {
        let cfg = BridgeConfig::DEFAULT;
        let mut stack = FakeHostStack {
            device_desc: Some(std_device_desc()),
            config_desc: Some(Vec::new()),
            ..Default::default()
        };
        let mut pipeline = DescriptorPipeline::new();
        let _ = run_until_wait_ready(&mut pipeline, &mut stack, &cfg);

        let mut now = 0u32;
        let mut saw_reset = false;
        for _ in 0..(cfg.ready_retry_limit as u32 + 2) {
            now += cfg.ready_retry_ms;
            let mut frames = Vec::new();
            pipeline.service(&mut stack, &cfg, now, &mut frames);
            if frames.iter().any(|f| frame::parse(f).map(|p| p.kind == FrameKind::Unmount).unwrap_or(false)) {
                saw_reset = true;
                break;
            }
        }
        assert!(saw_reset);
        assert!(!pipeline.is_running());
    }

    #[test]
    fn parses_hid_interfaces_from_config_descriptor() {
        let itfs = parse_hid_interfaces(&config_with_one_hid_itf());
        assert_eq!(itfs.len(), 1);
        assert_eq!(itfs[0].itf_num, 0);
        assert_eq!(itfs[0].itf_protocol, 2);
    }
}
