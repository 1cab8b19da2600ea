//! Control Request Router, host side (§4.8): executes CONTROL frames
//! reflected up from node D against the real device and replies for the
//! GET-style requests.

extern crate alloc;

use alloc::vec::Vec;

use bridge_proto::control_cmd;
use bridge_proto::frame::{self, FrameKind};

use crate::log::warn;
use crate::usb_stack::HostUsbStack;

fn emit(cmd: u8, payload: &[u8], out: &mut Vec<Vec<u8>>) {
    if let Ok(bytes) = frame::build_vec(FrameKind::Control, cmd, payload) {
        out.push(bytes);
    }
}

/// Dispatch one inbound `CONTROL` frame's `(cmd, payload)` from node D.
pub fn handle_inbound(dev_addr: u8, cmd: u8, payload: &[u8], stack: &mut dyn HostUsbStack, out: &mut Vec<Vec<u8>>) {
    match cmd {
        c if c == control_cmd::SET_PROTOCOL => {
            let Some(&[itf, protocol]) = payload.get(..2) else {
                warn!("SET_PROTOCOL payload too short");
                return;
            };
            stack.set_protocol(dev_addr, itf, protocol);
        }
        c if c == control_cmd::GET_REPORT => {
            if payload.len() < 5 {
                warn!("GET_REPORT request payload too short");
                return;
            }
            let itf = payload[0];
            let report_type = payload[1];
            let report_id = payload[2];
            let reqlen = u16::from_le_bytes([payload[3], payload[4]]) as usize;
            let bytes = stack.get_report(dev_addr, itf, report_type, report_id, reqlen).unwrap_or_default();
            let mut rsp = Vec::with_capacity(3 + bytes.len());
            rsp.push(itf);
            rsp.push(report_type);
            rsp.push(report_id);
            rsp.extend_from_slice(&bytes);
            emit(control_cmd::GET_REPORT, &rsp, out);
        }
        c if c == control_cmd::SET_REPORT => {
            if payload.len() < 3 {
                warn!("SET_REPORT payload too short");
                return;
            }
            let itf = payload[0];
            let report_type = payload[1];
            let report_id = payload[2];
            stack.set_report(dev_addr, itf, report_type, report_id, &payload[3..]);
        }
        c if c == control_cmd::SET_IDLE => {
            let Some(&[itf, duration, report_id]) = payload.get(..3) else {
                warn!("SET_IDLE payload too short");
                return;
            };
            stack.set_idle(dev_addr, itf, duration, report_id);
        }
        _ => warn!("unhandled control cmd {:#04x}", cmd),
    }
}
