//! Descriptor-session lifecycle: drives the USB stack start/restart and the
//! READY handshake once the [`DescriptorStore`] reports everything needed is
//! in hand (§4.5 `maybe_complete_descriptors`/`start_tinyusb_if_ready`).

extern crate alloc;

use alloc::vec::Vec;

use bridge_proto::control_cmd;
use bridge_proto::error::ControlError;
use bridge_proto::frame::{self, FrameKind};

use crate::log::info;
use crate::store::DescriptorStore;
use crate::usb_stack::DeviceUsbStack;

pub use bridge_proto::control_cmd::READY as CMD_READY;

/// Runs after every descriptor-affecting frame: starts the USB stack once the
/// store is ready and not already running, restarts it if the speed changed
/// after the fact, and emits READY the first time a PC is already attached.
pub struct Lifecycle;

impl Lifecycle {
    /// Returns an encoded `CONTROL/READY` frame to send, if one became due
    /// (§4.5 `maybe_complete_descriptors`, §4.8 READY signaling).
    pub fn service(store: &mut DescriptorStore, stack: &mut dyn DeviceUsbStack) -> Option<Vec<u8>> {
        if !store.descriptors_complete {
            return None;
        }

        let blocked = store.missing_start_preconditions();
        if blocked {
            return None;
        }

        if !store.stack_initialized {
            store.analyze_report_descriptors();
            info!("starting USB device stack, speed={:?}", store.usb_speed);
            stack.start(store.device_bytes(), store.config_bytes(), store.usb_speed);
            store.stack_initialized = true;
            store.started_speed = Some(store.usb_speed);
        } else if store.started_speed != Some(store.usb_speed) {
            // Speed mismatch after a resync: restart to match the new value.
            info!("restarting USB device stack for speed change");
            stack.shutdown();
            stack.start(store.device_bytes(), store.config_bytes(), store.usb_speed);
            store.started_speed = Some(store.usb_speed);
        }

        store.usb_attached = stack.attached();
        if store.usb_attached && !store.ready_sent {
            let frame = frame::build_vec(FrameKind::Control, CMD_READY, &[]).ok()?;
            store.ready_sent = true;
            stack.pulse_notify_irq();
            info!("descriptors ready, notifying host");
            return Some(frame);
        }
        None
    }

    /// Dispatch a parsed control command that isn't handled by
    /// [`crate::control`]; returns `Err` for anything this module doesn't own.
    pub fn reject_unknown(cmd: u8) -> Result<(), ControlError> {
        if cmd == CMD_READY
            || cmd == control_cmd::SET_PROTOCOL
            || cmd == control_cmd::GET_REPORT
            || cmd == control_cmd::SET_REPORT
            || cmd == control_cmd::SET_IDLE
            || cmd == control_cmd::STRING_REQ
            || cmd == control_cmd::DEVICE_RESET
        {
            Ok(())
        } else {
            Err(ControlError::Malformed)
        }
    }
}
