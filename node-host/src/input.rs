//! Input Forwarder (§4.6): turns HID reports completed by the host USB
//! stack into timestamped, sequenced `INPUT` frames, plus the boot→report
//! protocol coaxing rule.

extern crate alloc;

use alloc::vec::Vec;

use bridge_proto::frame::{self, FrameKind};

use crate::log::info;
use crate::usb_stack::HostUsbStack;

const MAX_HID_INTERFACES: usize = 4;
const STATS_LOG_EVERY_N: u32 = 500;
const STATS_LOG_EVERY_MS: u32 = 5000;
const BOOT_COAX_MAX_LEN: usize = 3;
const BOOT_COAX_MAX_ATTEMPTS: u8 = 2;

#[derive(Debug, Clone, Copy, Default)]
struct ItfStats {
    seq: u16,
    count: u32,
    skipped_not_ready: u32,
    last_arrival_ms: Option<u32>,
    min_delta_ms: u32,
    max_delta_ms: u32,
    boot_coax_attempts: u8,
    last_log_ms: u32,
}

pub struct InputForwarder {
    itfs: [ItfStats; MAX_HID_INTERFACES],
}

impl InputForwarder {
    pub fn new() -> Self {
        InputForwarder {
            itfs: [ItfStats { min_delta_ms: u32::MAX, ..Default::default() }; MAX_HID_INTERFACES],
        }
    }

    /// One HID report completion from the host stack. `ready` gates whether
    /// node D will actually accept input right now (§4.5 WAIT_READY).
    pub fn on_report(
        &mut self,
        dev_addr: u8,
        itf: u8,
        itf_protocol: u8,
        boot_capable: bool,
        report: &[u8],
        now_ms: u32,
        ready: bool,
        stack: &mut dyn HostUsbStack,
    ) -> Option<Vec<u8>> {
        let idx = itf as usize;
        if idx >= MAX_HID_INTERFACES {
            return None;
        }
        let stats = &mut self.itfs[idx];

        if let Some(last) = stats.last_arrival_ms {
            let delta = now_ms.wrapping_sub(last);
            stats.min_delta_ms = stats.min_delta_ms.min(delta);
            stats.max_delta_ms = stats.max_delta_ms.max(delta);
        }
        stats.last_arrival_ms = Some(now_ms);
        stats.count += 1;
        Self::maybe_log(stats, itf, now_ms);

        if !ready {
            stats.skipped_not_ready += 1;
            return None;
        }

        if boot_capable
            && itf_protocol == 0 // boot protocol currently active
            && report.len() <= BOOT_COAX_MAX_LEN
            && stats.boot_coax_attempts < BOOT_COAX_MAX_ATTEMPTS
        {
            stats.boot_coax_attempts += 1;
            const REPORT_PROTOCOL: u8 = 1;
            stack.set_protocol(dev_addr, itf, REPORT_PROTOCOL);
        }

        let seq = stats.seq;
        stats.seq = stats.seq.wrapping_add(1);

        let mut payload = Vec::with_capacity(7 + report.len());
        payload.push(itf);
        payload.extend_from_slice(&now_ms.to_le_bytes());
        payload.extend_from_slice(&seq.to_le_bytes());
        payload.extend_from_slice(report);

        frame::build_vec(FrameKind::Input, 0, &payload).ok()
    }

    fn maybe_log(stats: &mut ItfStats, itf: u8, now_ms: u32) {
        let gap = now_ms.wrapping_sub(stats.last_log_ms);
        if stats.count % STATS_LOG_EVERY_N != 0 && gap < STATS_LOG_EVERY_MS {
            return;
        }
        info!(
            "input forwarder itf={} count={} skipped={} delta_ms=[{},{}]",
            itf, stats.count, stats.skipped_not_ready, stats.min_delta_ms, stats.max_delta_ms
        );
        stats.last_log_ms = now_ms;
    }
}

impl Default for InputForwarder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb_stack::fake::FakeHostStack;

    #[test]
    fn scenario_4_input_happy_path() {
        let mut forwarder = InputForwarder::new();
        let mut stack = FakeHostStack::default();
        let report = [0u8; 8];
        let bytes = forwarder
            .on_report(1, 0, 1, false, &report, 1000, true, &mut stack)
            .unwrap();
        let frame = frame::parse(&bytes).unwrap();
        assert_eq!(frame.kind, FrameKind::Input);
        let mut expected = alloc::vec![0u8];
        expected.extend_from_slice(&1000u32.to_le_bytes());
        expected.extend_from_slice(&0u16.to_le_bytes());
        expected.extend_from_slice(&report);
        assert_eq!(frame.payload, expected.as_slice());
    }

    #[test]
    fn not_ready_is_dropped_and_counted() {
        let mut forwarder = InputForwarder::new();
        let mut stack = FakeHostStack::default();
        let result = forwarder.on_report(1, 0, 1, false, &[0u8; 4], 1000, false, &mut stack);
        assert!(result.is_none());
        assert_eq!(forwarder.itfs[0].skipped_not_ready, 1);
    }

    #[test]
    fn seq_increases_monotonically_per_interface() {
        let mut forwarder = InputForwarder::new();
        let mut stack = FakeHostStack::default();
        let a = forwarder.on_report(1, 0, 1, false, &[0u8; 4], 1000, true, &mut stack).unwrap();
        let b = forwarder.on_report(1, 0, 1, false, &[0u8; 4], 1010, true, &mut stack).unwrap();
        let seq_a = u16::from_le_bytes([a[9], a[10]]);
        let seq_b = u16::from_le_bytes([b[9], b[10]]);
        assert_eq!(seq_b, seq_a + 1);
    }

    #[test]
    fn boot_coax_sets_report_protocol_once_per_short_report() {
        let mut forwarder = InputForwarder::new();
        let mut stack = FakeHostStack::default();
        forwarder.on_report(1, 0, 0, true, &[0u8; 3], 1000, true, &mut stack);
        assert_eq!(stack.set_protocol_calls, alloc::vec![(1, 0, 1)]);
    }
}
