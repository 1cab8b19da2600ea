//! Node H: the side that attaches to the real USB HID device and forwards
//! it over the link so node D can present it to a PC.
//!
//! Owns the descriptor-collection pipeline, the string cache/scheduler, the
//! input forwarder and the host side of the control router and side-channel
//! API. Like node-device, everything here is driven by explicit `service()`
//! calls from a caller-owned main loop.

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
pub mod pipeline;
pub mod sidechannel;
pub mod strings;
pub mod usb_stack;

pub use pipeline::DescriptorPipeline;
pub use strings::StringCache;
