//! Command bytes carried by [`crate::frame::FrameKind::Descriptor`] frames
//! (§3, §4.3, §4.5). Shared between both nodes so neither redefines them.

/// Full USB device descriptor, sent as a single chunk (node H → node D).
pub const DEV_DESC: u8 = 1;
/// One chunk of the configuration descriptor; assembled by `wTotalLength`.
pub const CONFIG_DESC: u8 = 2;
/// One chunk of a per-interface HID report descriptor, prefixed with the
/// interface index.
pub const REPORT_DESC: u8 = 3;
/// One string descriptor, prefixed with its index.
pub const STRING_DESC: u8 = 4;
/// Marks the end of one descriptor-collection pass.
pub const DONE: u8 = 5;
/// Node D asking node H to fetch a string index it doesn't have cached yet.
pub const STRING_REQ: u8 = 6;
