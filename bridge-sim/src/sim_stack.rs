//! Stand-in USB stacks for both nodes: replace the real `tuh_*`/`tud_*`
//! callback surface with plain in-memory state so a session can be driven
//! deterministically from a CLI or a test.

use std::collections::BTreeMap;

use node_device::store::UsbSpeed;
use node_device::usb_stack::DeviceUsbStack;
use node_host::usb_stack::HostUsbStack;

/// Host-side (node H) stand-in: descriptors and strings come from a fixed
/// table; `get_report` and the `set_*` calls are recorded for assertions.
#[derive(Default)]
pub struct SimHostStack {
    pub device_desc: Option<Vec<u8>>,
    pub config_desc: Option<Vec<u8>>,
    pub strings: BTreeMap<u8, Vec<u8>>,
    pub reports: BTreeMap<u8, Vec<u8>>,
    pub get_report_response: Option<Vec<u8>>,
    pub set_protocol_calls: Vec<(u8, u8, u8)>,
    pub set_report_calls: Vec<(u8, u8, u8, u8, Vec<u8>)>,
    pub set_idle_calls: Vec<(u8, u8, u8, u8)>,
}

impl HostUsbStack for SimHostStack {
    fn get_device_descriptor(&mut self, _dev_addr: u8) -> Option<Vec<u8>> {
        self.device_desc.clone()
    }

    fn get_config_descriptor(&mut self, _dev_addr: u8) -> Option<Vec<u8>> {
        self.config_desc.clone()
    }

    fn get_string_descriptor(&mut self, _dev_addr: u8, index: u8, _langid: u16) -> Option<Vec<u8>> {
        self.strings.get(&index).cloned()
    }

    fn get_report_descriptor(&mut self, _dev_addr: u8, itf: u8) -> Option<Vec<u8>> {
        self.reports.get(&itf).cloned()
    }

    fn set_protocol(&mut self, dev_addr: u8, itf: u8, protocol: u8) -> bool {
        self.set_protocol_calls.push((dev_addr, itf, protocol));
        true
    }

    fn set_idle(&mut self, dev_addr: u8, itf: u8, duration: u8, report_id: u8) -> bool {
        self.set_idle_calls.push((dev_addr, itf, duration, report_id));
        true
    }

    fn set_report(&mut self, dev_addr: u8, itf: u8, report_type: u8, report_id: u8, data: &[u8]) -> bool {
        self.set_report_calls.push((dev_addr, itf, report_type, report_id, data.to_vec()));
        true
    }

    fn get_report(&mut self, _dev_addr: u8, _itf: u8, _report_type: u8, _report_id: u8, len: usize) -> Option<Vec<u8>> {
        self.get_report_response.as_ref().map(|bytes| {
            let take = bytes.len().min(len.max(bytes.len()));
            bytes[..take].to_vec()
        })
    }
}

/// Device-side (node D) stand-in: a PC "attaches" when the harness flips
/// `attached`, mirroring the electrical attach-detect signal a real stack
/// would raise once the host finishes enumeration.
#[derive(Default)]
pub struct SimDeviceStack {
    pub started: bool,
    pub last_speed: Option<UsbSpeed>,
    pub attached: bool,
    pub hid_ready: bool,
    pub sent: Vec<(u8, Vec<u8>)>,
    pub irq_pulses: u32,
}

impl DeviceUsbStack for SimDeviceStack {
    fn start(&mut self, _device_desc: &[u8], _config_desc: &[u8], speed: UsbSpeed) {
        self.started = true;
        self.last_speed = Some(speed);
    }

    fn shutdown(&mut self) {
        self.started = false;
    }

    fn hid_ready(&self, _itf: u8) -> bool {
        self.hid_ready
    }

    fn send_report(&mut self, itf: u8, bytes: &[u8]) -> bool {
        self.sent.push((itf, bytes.to_vec()));
        true
    }

    fn attached(&self) -> bool {
        self.attached
    }

    fn pulse_notify_irq(&mut self) {
        self.irq_pulses += 1;
    }
}
