//! Shared wire protocol for the USB/HID proxy bridge.
//!
//! This crate carries everything both nodes need to agree on: the primary
//! link's framed byte protocol (byte-stuffing + CRC), the HID report
//! descriptor analyzer, and the side-channel control protocol (SLIP + CRC +
//! HMAC). It has no notion of which node it is running on.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

#[cfg(not(any(feature = "std", test)))]
extern crate core as std;

extern crate alloc;

#[cfg(test)]
mod testlog;

mod log {
    cfg_if::cfg_if! {
        if #[cfg(feature = "defmt")] {
            pub use defmt::{info, warn, debug};
        } else if #[cfg(feature = "log")] {
            pub use log::{info, warn, debug};
        } else {
            #[allow(unused_macros)]
            macro_rules! info { ($($arg:tt)*) => {}; }
            #[allow(unused_macros)]
            macro_rules! warn { ($($arg:tt)*) => {}; }
            #[allow(unused_macros)]
            macro_rules! debug { ($($arg:tt)*) => {}; }
            pub(crate) use {info, warn, debug};
        }
    }
}

pub mod config;
pub mod control_cmd;
pub mod control_frame;
pub mod crc;
pub mod descriptor_cmd;
pub mod error;
pub mod frame;
pub mod hid_report;
pub mod hmac16;
pub mod rx_ring;
pub mod slip;
pub mod transport;

pub use config::BridgeConfig;
pub use error::{CodecError, ControlError};
pub use frame::{Frame, FrameKind};
