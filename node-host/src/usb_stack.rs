//! Collaborator boundary for the host-role USB stack (§6): blocking
//! descriptor getters plus the control requests the Control Request Router
//! forwards on D's behalf. A concrete board wires a real `tuh_*` stack in;
//! everything else in this crate only sees this trait.

extern crate alloc;

use alloc::vec::Vec;

/// One attached HID interface, as enumerated by the host stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HidInterface {
    pub dev_addr: u8,
    pub itf: u8,
    pub itf_protocol: u8,
}

pub trait HostUsbStack {
    fn get_device_descriptor(&mut self, dev_addr: u8) -> Option<Vec<u8>>;
    fn get_config_descriptor(&mut self, dev_addr: u8) -> Option<Vec<u8>>;
    fn get_string_descriptor(&mut self, dev_addr: u8, index: u8, langid: u16) -> Option<Vec<u8>>;
    fn get_report_descriptor(&mut self, dev_addr: u8, itf: u8) -> Option<Vec<u8>>;

    fn set_protocol(&mut self, dev_addr: u8, itf: u8, protocol: u8) -> bool;
    fn set_idle(&mut self, dev_addr: u8, itf: u8, duration: u8, report_id: u8) -> bool;
    fn set_report(&mut self, dev_addr: u8, itf: u8, report_type: u8, report_id: u8, data: &[u8]) -> bool;
    fn get_report(&mut self, dev_addr: u8, itf: u8, report_type: u8, report_id: u8, len: usize) -> Option<Vec<u8>>;
}
