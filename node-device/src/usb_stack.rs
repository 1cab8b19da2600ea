//! Collaborator boundary between this crate and whatever USB device stack
//! (TinyUSB, embassy-usb, ...) a given board wires in (§6 External
//! Interfaces). Nothing in `lifecycle`/`input`/`control` talks to a concrete
//! stack directly; they hold a `&mut dyn DeviceUsbStack` instead.

use crate::store::UsbSpeed;

/// One HID report queued for send when the stack was momentarily busy.
#[derive(Debug, Clone, Copy)]
pub struct PendingReport {
    pub itf: u8,
    pub len: u8,
    pub bytes: [u8; 64],
}

/// The subset of USB device-stack behavior node D drives or is driven by.
///
/// Implementors own the actual `tinyusb`/`embassy-usb` instance; this trait
/// just gives the session logic a stack to call without knowing which one.
pub trait DeviceUsbStack {
    /// (Re)initialize the stack with the given descriptors and speed. Called
    /// once descriptors are complete and again if the remote speed changes
    /// after the stack was already running.
    fn start(&mut self, device_desc: &[u8], config_desc: &[u8], speed: UsbSpeed);

    fn shutdown(&mut self);

    /// True once enumeration with the real PC has progressed far enough that
    /// HID reports can be sent (`tud_hid_ready()`).
    fn hid_ready(&self, itf: u8) -> bool;

    /// Non-blocking report send; `false` means the stack was busy and the
    /// caller should retry via its own pending-report fallback.
    fn send_report(&mut self, itf: u8, bytes: &[u8]) -> bool;

    /// Electrical/attach-detect signal from the stack, not import-time
    /// configuration: becomes true once a real PC is plugged into this port.
    fn attached(&self) -> bool;

    /// Pulse the remote-wake / notify line so node H knows descriptors were
    /// accepted and a READY control frame is on its way.
    fn pulse_notify_irq(&mut self);
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    #[derive(Default)]
    pub struct FakeUsbStack {
        pub started: bool,
        pub start_calls: u32,
        pub last_speed: Option<UsbSpeed>,
        pub ready: bool,
        pub attached: bool,
        pub sent: alloc::vec::Vec<(u8, alloc::vec::Vec<u8>)>,
        pub reject_next_send: bool,
        pub irq_pulses: u32,
    }

    extern crate alloc;

    impl DeviceUsbStack for FakeUsbStack {
        fn start(&mut self, _device_desc: &[u8], _config_desc: &[u8], speed: UsbSpeed) {
            self.started = true;
            self.start_calls += 1;
            self.last_speed = Some(speed);
        }

        fn shutdown(&mut self) {
            self.started = false;
        }

        fn hid_ready(&self, _itf: u8) -> bool {
            self.ready
        }

        fn send_report(&mut self, itf: u8, bytes: &[u8]) -> bool {
            if self.reject_next_send {
                self.reject_next_send = false;
                return false;
            }
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
}
