//! String Cache + Scheduler (§4.9): serves `STRING_REQ` frames from node D
//! out of a small cache, falling back to an on-demand fetch from the real
//! device with retries and a configurable timeout policy.

extern crate alloc;

use alloc::vec::Vec;

use bridge_proto::config::{BridgeConfig, StringFallbackPolicy};
use bridge_proto::descriptor_cmd as dcmd;
use bridge_proto::frame::{self, FrameKind};

use crate::log::{info, warn};
use crate::usb_stack::HostUsbStack;

const CACHE_CAPACITY: usize = 16;
const PENDING_CAPACITY: usize = 8;
const MAX_INFLIGHT_FETCHES: usize = 1;
const DEFAULT_LANGID: u16 = 0x0409;

#[derive(Debug, Clone)]
struct CacheEntry {
    index: u8,
    langid: u16,
    bytes: Vec<u8>,
    synthetic: bool,
}

#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    index: u8,
    langid: u16,
    fetching: bool,
    retry_count: u8,
    first_requested_ms: u32,
    last_attempt_ms: u32,
}

pub struct StringCache {
    cache: Vec<CacheEntry>,
    default_langid: u16,
    pending: arrayvec::ArrayVec<PendingRequest, PENDING_CAPACITY>,
    inflight: usize,
}

impl StringCache {
    pub fn new() -> Self {
        StringCache {
            cache: Vec::with_capacity(CACHE_CAPACITY),
            default_langid: DEFAULT_LANGID,
            pending: arrayvec::ArrayVec::new(),
            inflight: 0,
        }
    }

    fn normalize_langid(&self, index: u8, requested: u16) -> u16 {
        if index == 0 {
            requested
        } else if requested == 0 {
            self.default_langid
        } else {
            requested
        }
    }

    fn find_cached(&self, index: u8, langid: u16) -> Option<&CacheEntry> {
        self.cache
            .iter()
            .find(|e| e.index == index && e.langid == langid)
            .or_else(|| self.cache.iter().find(|e| e.index == index))
    }

    fn insert_cached(&mut self, index: u8, langid: u16, bytes: Vec<u8>, synthetic: bool) {
        if let Some(slot) = self.cache.iter_mut().find(|e| e.index == index) {
            slot.langid = langid;
            slot.bytes = bytes;
            slot.synthetic = synthetic;
            return;
        }
        if self.cache.len() >= CACHE_CAPACITY {
            // Overwrite slot 0 on full (§3 string-cache entry eviction policy).
            self.cache[0] = CacheEntry { index, langid, bytes, synthetic };
        } else {
            self.cache.push(CacheEntry { index, langid, bytes, synthetic });
        }
    }

    /// Record the default LangID, learned from the LangID table (index 0).
    pub fn set_default_langid(&mut self, langid: u16) {
        if langid != 0 {
            self.default_langid = langid;
        }
    }

    fn emit_forward(index: u8, bytes: &[u8], out: &mut Vec<Vec<u8>>) {
        let mut payload = Vec::with_capacity(1 + bytes.len());
        payload.push(index);
        payload.extend_from_slice(bytes);
        if let Ok(frame) = frame::build_vec(FrameKind::Descriptor, dcmd::STRING_DESC, &payload) {
            out.push(frame);
        }
    }

    /// Handle one `STRING_REQ(index, langid)` from node D.
    pub fn on_string_request(
        &mut self,
        dev_addr: u8,
        index: u8,
        requested_langid: u16,
        now_ms: u32,
        stack: &mut dyn HostUsbStack,
        out: &mut Vec<Vec<u8>>,
    ) {
        let langid = self.normalize_langid(index, requested_langid);
        if let Some(entry) = self.find_cached(index, langid) {
            Self::emit_forward(index, &entry.bytes, out);
            return;
        }

        if self.pending.iter().any(|p| p.index == index) {
            return;
        }
        if self.pending.try_push(PendingRequest {
            index,
            langid,
            fetching: false,
            retry_count: 0,
            first_requested_ms: now_ms,
            last_attempt_ms: now_ms,
        }).is_err() {
            warn!("string pending table full, dropping request idx={}", index);
            return;
        }
        self.attempt_fetch(dev_addr, now_ms, stack, out);
    }

    fn attempt_fetch(&mut self, dev_addr: u8, now_ms: u32, stack: &mut dyn HostUsbStack, out: &mut Vec<Vec<u8>>) {
        if self.inflight >= MAX_INFLIGHT_FETCHES {
            return;
        }
        let Some(slot) = self.pending.iter_mut().find(|p| !p.fetching) else {
            return;
        };
        slot.fetching = true;
        slot.last_attempt_ms = now_ms;
        let index = slot.index;
        let langid = slot.langid;
        self.inflight += 1;

        match stack.get_string_descriptor(dev_addr, index, langid) {
            Some(bytes) => {
                self.inflight -= 1;
                self.insert_cached(index, langid, bytes.clone(), false);
                self.pending.retain(|p| p.index != index);
                Self::emit_forward(index, &bytes, out);
                info!("string idx={} fetched and cached", index);
            }
            None => {
                self.inflight -= 1;
                if let Some(slot) = self.pending.iter_mut().find(|p| p.index == index) {
                    slot.fetching = false;
                }
            }
        }
    }

    /// Called once per tick: retries stalled fetches and applies fallback
    /// once a request has exceeded its retry budget or overall timeout.
    pub fn service(
        &mut self,
        dev_addr: u8,
        now_ms: u32,
        cfg: &BridgeConfig,
        stack: &mut dyn HostUsbStack,
        out: &mut Vec<Vec<u8>>,
    ) {
        let mut fallbacks = Vec::new();
        for p in self.pending.iter_mut() {
            let overall_elapsed = now_ms.wrapping_sub(p.first_requested_ms);
            let since_attempt = now_ms.wrapping_sub(p.last_attempt_ms);
            if overall_elapsed >= cfg.string_fetch_timeout_ms {
                fallbacks.push((p.index, p.langid));
                continue;
            }
            if p.fetching && since_attempt >= cfg.string_retry_ms {
                if p.retry_count >= cfg.string_retry_limit {
                    fallbacks.push((p.index, p.langid));
                } else {
                    p.retry_count += 1;
                    p.fetching = false;
                }
            }
        }

        for (index, langid) in fallbacks {
            self.pending.retain(|p| p.index != index);
            self.apply_fallback(index, langid, cfg, out);
        }

        self.attempt_fetch(dev_addr, now_ms, stack, out);
    }

    fn apply_fallback(&mut self, index: u8, langid: u16, cfg: &BridgeConfig, out: &mut Vec<Vec<u8>>) {
        warn!("string idx={} fetch exhausted, applying fallback", index);
        let bytes = match cfg.string_fallback {
            StringFallbackPolicy::Empty => Vec::new(),
            StringFallbackPolicy::Synthetic => synthesize_stub(index),
        };
        self.insert_cached(index, langid, bytes.clone(), true);
        Self::emit_forward(index, &bytes, out);
    }

    pub fn evict(&mut self, index: u8) {
        self.cache.retain(|e| e.index != index);
    }
}

impl Default for StringCache {
    fn default() -> Self {
        Self::new()
    }
}

fn synthesize_stub(index: u8) -> Vec<u8> {
    let mut label = Vec::new();
    label.push(b'I');
    label.push(b'D');
    label.push(b'X');
    let mut n = index;
    if n == 0 {
        label.push(b'0');
    } else {
        let mut digits = Vec::new();
        while n > 0 {
            digits.push(b'0' + (n % 10));
            n /= 10;
        }
        digits.reverse();
        label.extend_from_slice(&digits);
    }
    let mut utf16 = Vec::with_capacity(2 + label.len() * 2);
    utf16.push((2 + label.len() * 2) as u8);
    utf16.push(0x03);
    for &b in &label {
        utf16.push(b);
        utf16.push(0);
    }
    utf16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb_stack::fake::FakeHostStack;

    #[test]
    fn cache_hit_forwards_without_fetch() {
        let mut cache = StringCache::new();
        cache.insert_cached(5, 0x0409, alloc::vec![1, 2, 3], false);
        let mut stack = FakeHostStack::default();
        let mut out = Vec::new();
        cache.on_string_request(1, 5, 0x0409, 0, &mut stack, &mut out);
        assert_eq!(out.len(), 1);
        let frame = frame::parse(&out[0]).unwrap();
        assert_eq!(frame.payload, &[5, 1, 2, 3]);
    }

    #[test]
    fn cache_miss_fetches_and_caches() {
        let mut cache = StringCache::new();
        let mut stack = FakeHostStack::default();
        stack.strings.insert(7, alloc::vec![0xAA, 0xBB]);
        let mut out = Vec::new();
        cache.on_string_request(1, 7, 0x0409, 0, &mut stack, &mut out);
        assert_eq!(out.len(), 1);
        let frame = frame::parse(&out[0]).unwrap();
        assert_eq!(frame.payload, &[7, 0xAA, 0xBB]);
        assert!(cache.find_cached(7, 0x0409).is_some());
    }

    #[test]
    fn timeout_falls_back_to_empty_by_default() {
        let cfg = BridgeConfig::DEFAULT;
        let mut cache = StringCache::new();
        let mut stack = FakeHostStack::default(); // no strings registered: every fetch "fails"
        let mut out = Vec::new();
        cache.on_string_request(1, 9, 0x0409, 0, &mut stack, &mut out);
        assert!(out.is_empty());

        let mut now = 0u32;
        loop {
            now += cfg.string_retry_ms;
            out.clear();
            cache.service(1, now, &cfg, &mut stack, &mut out);
            if !out.is_empty() {
                break;
            }
            if now > cfg.string_fetch_timeout_ms + 10 * cfg.string_retry_ms {
                panic!("fallback never fired");
            }
        }
        let frame = frame::parse(&out[0]).unwrap();
        assert_eq!(frame.payload, &[9]); // empty descriptor policy
    }

    #[test]
    fn evicted_entry_retriggers_exactly_one_fetch() {
        let mut cache = StringCache::new();
        let mut stack = FakeHostStack::default();
        stack.strings.insert(3, alloc::vec![1]);
        let mut out = Vec::new();
        cache.on_string_request(1, 3, 0x0409, 0, &mut stack, &mut out);
        assert_eq!(out.len(), 1);
        cache.evict(3);

        out.clear();
        cache.on_string_request(1, 3, 0x0409, 10, &mut stack, &mut out);
        assert_eq!(out.len(), 1);
    }
}
