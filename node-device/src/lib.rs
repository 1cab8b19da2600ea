//! Node D: the side that presents itself to a PC as the real HID device.
//!
//! Owns the descriptor store, the USB device-stack lifecycle, the input
//! applier and the control-request reflection path. Driven by an explicit
//! `service()` call from a caller-owned main loop — no async runtime.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

#[cfg(not(any(feature = "std", test)))]
extern crate core as std;

extern crate alloc;

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

pub mod control;
pub mod input;
pub mod lifecycle;
pub mod store;
pub mod usb_stack;

pub use store::DescriptorStore;
