//! Input Applier (§4.6 device side): takes forwarded HID input frames off
//! the primary link and pushes them into the local USB device stack, with
//! the clock-skew EMA and drop/backlog accounting the original tracks.

extern crate alloc;

use crate::log::{info, warn};
use crate::store::{DescriptorStore, MAX_HID_INTERFACES};
use crate::usb_stack::DeviceUsbStack;

/// Input frame payload layout: `[itf:u8][host_ts:u32 LE][seq:u16 LE][report bytes...]`.
const ITF_OFFSET: usize = 0;
const HOST_TS_OFFSET: usize = 1;
const SEQ_OFFSET: usize = 5;
const REPORT_OFFSET: usize = 7;

const PENDING_REPORT_MAX: usize = 64;
const STATS_LOG_EVERY_N: u32 = 500;
const STATS_LOG_EVERY_MS: u32 = 5000;

#[derive(Debug, Clone, Copy, Default)]
struct Pending {
    itf: u8,
    len: u8,
    bytes: [u8; PENDING_REPORT_MAX],
}

pub struct InputApplier {
    host_time_offset_ms: Option<i32>,
    received: u32,
    dropped_not_ready: u32,
    dropped_too_long: u32,
    min_delta_ms: u32,
    max_delta_ms: u32,
    last_frame_host_ts: Option<u32>,
    last_log_now_ms: u32,
    pending: [Option<Pending>; MAX_HID_INTERFACES],
}

impl InputApplier {
    pub fn new() -> Self {
        InputApplier {
            host_time_offset_ms: None,
            received: 0,
            dropped_not_ready: 0,
            dropped_too_long: 0,
            min_delta_ms: u32::MAX,
            max_delta_ms: 0,
            last_frame_host_ts: None,
            last_log_now_ms: 0,
            pending: Default::default(),
        }
    }

    /// Feed one raw `INPUT` frame payload. `now_ms` is the device's own
    /// monotonic clock at receipt time.
    pub fn on_input_frame(
        &mut self,
        payload: &[u8],
        now_ms: u32,
        store: &DescriptorStore,
        stack: &mut dyn DeviceUsbStack,
    ) {
        if payload.len() < REPORT_OFFSET {
            warn!("input frame too short len={}", payload.len());
            return;
        }
        let itf = payload[ITF_OFFSET] as usize;
        let host_ts = u32::from_le_bytes([
            payload[HOST_TS_OFFSET],
            payload[HOST_TS_OFFSET + 1],
            payload[HOST_TS_OFFSET + 2],
            payload[HOST_TS_OFFSET + 3],
        ]);
        let _seq = u16::from_le_bytes([payload[SEQ_OFFSET], payload[SEQ_OFFSET + 1]]);
        let report = &payload[REPORT_OFFSET..];

        self.update_clock_skew(now_ms, host_ts);
        self.track_inter_arrival(host_ts);
        self.received += 1;
        self.maybe_log_stats(now_ms);

        if itf >= MAX_HID_INTERFACES {
            warn!("input frame itf={} out of range", itf);
            return;
        }

        let to_send: &[u8] = if store.report_has_id(itf) {
            // This interface's report format carries a Report-ID byte;
            // strip it before handing raw HID data to the local stack.
            &report[1.min(report.len())..]
        } else {
            report
        };

        if to_send.len() > PENDING_REPORT_MAX {
            self.dropped_too_long += 1;
            warn!("input report itf={} too long len={}", itf, to_send.len());
            return;
        }

        if !store.usb_attached || !store.descriptors_complete || !store.ready_sent || !stack.hid_ready(itf as u8) {
            self.dropped_not_ready += 1;
            return;
        }

        if !stack.send_report(itf as u8, to_send) {
            let mut bytes = [0u8; PENDING_REPORT_MAX];
            bytes[..to_send.len()].copy_from_slice(to_send);
            self.pending[itf] = Some(Pending {
                itf: itf as u8,
                len: to_send.len() as u8,
                bytes,
            });
        }
    }

    /// Retry any interface whose last report was deferred because the stack
    /// was busy. Call once per main-loop tick.
    pub fn drain_pending(&mut self, stack: &mut dyn DeviceUsbStack) {
        for slot in self.pending.iter_mut() {
            if let Some(p) = slot {
                if stack.hid_ready(p.itf) && stack.send_report(p.itf, &p.bytes[..p.len as usize]) {
                    *slot = None;
                }
            }
        }
    }

    fn update_clock_skew(&mut self, now_ms: u32, host_ts: u32) {
        let offset = now_ms as i64 - host_ts as i64;
        let offset = offset.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        self.host_time_offset_ms = Some(match self.host_time_offset_ms {
            None => offset,
            Some(old) => ((old as i64 * 7 + offset as i64) / 8) as i32,
        });
    }

    pub fn latency_ms(&self, now_ms: u32, host_ts: u32) -> u32 {
        let Some(offset) = self.host_time_offset_ms else {
            return 0;
        };
        let estimate = host_ts as i64 + offset as i64;
        let latency = now_ms as i64 - estimate;
        if latency < 0 {
            0
        } else {
            latency as u32
        }
    }

    fn track_inter_arrival(&mut self, host_ts: u32) {
        if let Some(last) = self.last_frame_host_ts {
            let delta = host_ts.wrapping_sub(last);
            self.min_delta_ms = self.min_delta_ms.min(delta);
            self.max_delta_ms = self.max_delta_ms.max(delta);
        }
        self.last_frame_host_ts = Some(host_ts);
    }

    fn maybe_log_stats(&mut self, now_ms: u32) {
        let gap = now_ms.wrapping_sub(self.last_log_now_ms);
        if self.received % STATS_LOG_EVERY_N != 0 && gap < STATS_LOG_EVERY_MS {
            return;
        }
        info!(
            "input stats: received={} dropped_not_ready={} dropped_too_long={} delta_ms=[{},{}]",
            self.received, self.dropped_not_ready, self.dropped_too_long, self.min_delta_ms, self.max_delta_ms
        );
        self.last_log_now_ms = now_ms;
    }
}

impl Default for InputApplier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb_stack::fake::FakeUsbStack;

    fn frame(itf: u8, host_ts: u32, seq: u16, report: &[u8]) -> alloc::vec::Vec<u8> {
        let mut v = alloc::vec![itf];
        v.extend_from_slice(&host_ts.to_le_bytes());
        v.extend_from_slice(&seq.to_le_bytes());
        v.extend_from_slice(report);
        v
    }

    /// A store with every §4.7 precondition (attached/complete/ready) set,
    /// matching the state the pipeline leaves it in once READY is sent.
    fn ready_store() -> DescriptorStore {
        let mut store = DescriptorStore::new();
        store.usb_attached = true;
        store.descriptors_complete = true;
        store.ready_sent = true;
        store
    }

    #[test]
    fn forwards_report_when_ready() {
        let mut applier = InputApplier::new();
        let store = ready_store();
        let mut stack = FakeUsbStack {
            ready: true,
            ..Default::default()
        };
        let f = frame(0, 1000, 1, &[0x01, 0x02, 0x03]);
        applier.on_input_frame(&f, 1005, &store, &mut stack);
        assert_eq!(stack.sent.len(), 1);
        assert_eq!(stack.sent[0].1, alloc::vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn drops_and_counts_when_not_ready() {
        let mut applier = InputApplier::new();
        let store = ready_store();
        let mut stack = FakeUsbStack::default();
        let f = frame(0, 1000, 1, &[0xAA]);
        applier.on_input_frame(&f, 1000, &store, &mut stack);
        assert_eq!(stack.sent.len(), 0);
        assert_eq!(applier.dropped_not_ready, 1);
    }

    #[test]
    fn drops_when_ready_sent_is_false() {
        let mut applier = InputApplier::new();
        let store = DescriptorStore::new(); // usb_attached/descriptors_complete/ready_sent all false
        let mut stack = FakeUsbStack {
            ready: true,
            ..Default::default()
        };
        let f = frame(0, 1000, 1, &[0xAA]);
        applier.on_input_frame(&f, 1000, &store, &mut stack);
        assert_eq!(stack.sent.len(), 0);
        assert_eq!(applier.dropped_not_ready, 1);
    }

    #[test]
    fn busy_send_is_queued_and_drained_later() {
        let mut applier = InputApplier::new();
        let store = ready_store();
        let mut stack = FakeUsbStack {
            ready: true,
            reject_next_send: true,
            ..Default::default()
        };
        let f = frame(0, 1000, 1, &[0xAA, 0xBB]);
        applier.on_input_frame(&f, 1000, &store, &mut stack);
        assert_eq!(stack.sent.len(), 0);
        applier.drain_pending(&mut stack);
        assert_eq!(stack.sent.len(), 1);
        assert_eq!(stack.sent[0].1, alloc::vec![0xAA, 0xBB]);
    }

    #[test]
    fn clock_skew_offset_seeds_from_first_frame() {
        let mut applier = InputApplier::new();
        let store = ready_store();
        let mut stack = FakeUsbStack {
            ready: true,
            ..Default::default()
        };
        applier.on_input_frame(&frame(0, 1000, 1, &[0x00]), 1050, &store, &mut stack);
        assert_eq!(applier.latency_ms(1050, 1000), 0);
        applier.on_input_frame(&frame(0, 2000, 2, &[0x00]), 2060, &store, &mut stack);
        assert_eq!(applier.latency_ms(2060, 2000), 9);
    }
}
