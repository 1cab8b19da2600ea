//! Descriptor Store (§3, §4.5): append-only typed buffers rebuilt once per
//! descriptor-collection session, plus the completeness predicate that gates
//! USB-stack start.

extern crate alloc;

use alloc::vec::Vec;

use bridge_proto::hid_report::{self, Analysis};

use crate::log::{info, warn};

pub const MAX_HID_INTERFACES: usize = 4;
pub const MAX_DESC_SIZE: usize = 512;
pub const MAX_STRING_INDEX: usize = 64;
pub const MAX_STRING_LEN: usize = 64;
pub const STANDARD_DEVICE_DESC_LEN: usize = 18;
pub const DEFAULT_LANGID: u16 = 0x0409;

/// Detected/effective USB speed (§4.5 `update_speed_from_device_desc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbSpeed {
    Full,
    Low,
}

#[derive(Debug, Clone, Default)]
struct DescBuffer {
    data: Vec<u8>,
    valid: bool,
}

impl DescBuffer {
    fn reset(&mut self) {
        self.data.clear();
        self.valid = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringState {
    Absent,
    Pending,
    Valid,
}

#[derive(Debug, Clone)]
struct StringEntry {
    bytes: Vec<u8>,
    langid: u16,
    state: StringState,
    allow_fetch: bool,
}

impl Default for StringEntry {
    fn default() -> Self {
        StringEntry {
            bytes: Vec::new(),
            langid: 0,
            state: StringState::Absent,
            allow_fetch: true,
        }
    }
}

/// Per-interface HID bookkeeping derived from the config descriptor plus
/// the running report-descriptor analysis.
#[derive(Debug, Clone, Default)]
struct InterfaceInfo {
    present: bool,
    expected_len: u16,
    report_has_id: bool,
}

/// Result of feeding a `DEV_DESC`/`CONFIG_DESC`/`REPORT_DESC`/`STRING_DESC`
/// frame into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Accepted,
    RejectedSessionInUse,
    ResyncOutOfRange,
    Ignored,
}

pub struct DescriptorStore {
    device: DescBuffer,
    config: DescBuffer,
    reports: [DescBuffer; MAX_HID_INTERFACES],
    interfaces: [InterfaceInfo; MAX_HID_INTERFACES],
    strings: Vec<StringEntry>,
    pub usb_speed: UsbSpeed,
    pub descriptors_complete: bool,
    pub usb_attached: bool,
    pub stack_initialized: bool,
    pub started_speed: Option<UsbSpeed>,
    pub ready_sent: bool,
    missing_report_logged: bool,
    missing_device_logged: bool,
    missing_config_logged: bool,
}

impl DescriptorStore {
    pub fn new() -> Self {
        let mut strings = Vec::with_capacity(MAX_STRING_INDEX);
        strings.resize_with(MAX_STRING_INDEX, StringEntry::default);
        DescriptorStore {
            device: DescBuffer::default(),
            config: DescBuffer::default(),
            reports: Default::default(),
            interfaces: Default::default(),
            strings,
            usb_speed: UsbSpeed::Full,
            descriptors_complete: false,
            usb_attached: false,
            stack_initialized: false,
            started_speed: None,
            ready_sent: false,
            missing_report_logged: false,
            missing_device_logged: false,
            missing_config_logged: false,
        }
    }

    /// Full reset: new descriptor session, including the string table.
    pub fn reset(&mut self) {
        self.device.reset();
        self.reset_reports_and_config();
        for s in self.strings.iter_mut() {
            *s = StringEntry::default();
        }
    }

    /// Clear reports/config without touching the string cache (§4.5:
    /// `remote_desc_reset_reports_and_config`).
    pub fn reset_reports_and_config(&mut self) {
        self.config.reset();
        for r in self.reports.iter_mut() {
            r.reset();
        }
        for i in self.interfaces.iter_mut() {
            *i = InterfaceInfo::default();
        }
        self.descriptors_complete = false;
    }

    fn session_in_use(&self) -> bool {
        self.usb_attached || self.descriptors_complete
    }

    /// `DEV_DESC`: full session reset then store the device descriptor.
    pub fn handle_device_desc(&mut self, bytes: &[u8]) -> StoreOutcome {
        if self.session_in_use() {
            warn!("device descriptor ignored (active session)");
            return StoreOutcome::RejectedSessionInUse;
        }
        self.reset();
        if bytes.len() > MAX_DESC_SIZE {
            warn!("device descriptor too long len={}", bytes.len());
            return StoreOutcome::Ignored;
        }
        self.device.data.clear();
        self.device.data.extend_from_slice(bytes);
        self.device.valid = true;
        info!("device descriptor chunk len={}", bytes.len());
        self.update_speed_from_device_desc();
        StoreOutcome::Accepted
    }

    /// `CONFIG_DESC`: append a chunk, trimming to the declared `wTotalLength`.
    pub fn handle_config_desc(&mut self, chunk: &[u8]) -> StoreOutcome {
        if self.session_in_use() {
            warn!("config descriptor chunk ignored (active session)");
            return StoreOutcome::RejectedSessionInUse;
        }
        let base = self.config.data.len();
        if base >= 4 {
            let target = u16::from_le_bytes([self.config.data[2], self.config.data[3]]) as usize;
            if target != 0 && base >= target {
                warn!("extra config chunk ignored (already have {})", base);
                return StoreOutcome::Ignored;
            }
        }
        if base >= MAX_DESC_SIZE {
            warn!("config descriptor buffer full, dropping chunk len={}", chunk.len());
            self.reset();
            return StoreOutcome::Ignored;
        }
        let room = MAX_DESC_SIZE - base;
        let take = chunk.len().min(room);
        self.config.data.extend_from_slice(&chunk[..take]);
        if self.config.data.len() >= 4 {
            let target = u16::from_le_bytes([self.config.data[2], self.config.data[3]]) as usize;
            if target != 0 && self.config.data.len() > target {
                self.config.data.truncate(target);
            }
            if target != 0 && self.config.data.len() >= target {
                self.config.valid = true;
            }
        }
        info!("config descriptor chunk len={} total={}", take, self.config.data.len());
        StoreOutcome::Accepted
    }

    /// `REPORT_DESC`: first byte is the interface index.
    pub fn handle_report_desc(&mut self, frame_payload: &[u8]) -> StoreOutcome {
        if frame_payload.is_empty() {
            warn!("report descriptor frame too short");
            return StoreOutcome::Ignored;
        }
        if self.session_in_use() {
            warn!("report descriptor ignored itf={} (active session)", frame_payload[0]);
            return StoreOutcome::RejectedSessionInUse;
        }
        let itf = frame_payload[0] as usize;
        if itf >= MAX_HID_INTERFACES {
            warn!("report descriptor itf={} out of range, resync", itf);
            self.reset();
            return StoreOutcome::ResyncOutOfRange;
        }
        self.interfaces[itf].present = true;
        self.reports[itf].data.extend_from_slice(&frame_payload[1..]);
        self.reports[itf].valid = true;
        info!(
            "report descriptor chunk itf={} len={} total={}",
            itf,
            frame_payload.len() - 1,
            self.reports[itf].data.len()
        );
        StoreOutcome::Accepted
    }

    /// `STRING_DESC`: first byte is the string index.
    pub fn handle_string_desc(&mut self, frame_payload: &[u8]) -> StoreOutcome {
        if frame_payload.len() < 2 {
            warn!("string descriptor frame too short len={}", frame_payload.len());
            return StoreOutcome::Ignored;
        }
        let idx = frame_payload[0] as usize;
        let Some(entry) = self.strings.get_mut(idx) else {
            warn!("string descriptor idx={} ignored (no entry)", idx);
            return StoreOutcome::Ignored;
        };
        let body = &frame_payload[1..];
        if body.is_empty() {
            warn!("string descriptor len=0 ignored idx={}", idx);
            return StoreOutcome::Ignored;
        }
        let had_valid = entry.state == StringState::Valid && !entry.bytes.is_empty();
        if had_valid && body.len() < entry.bytes.len() {
            warn!(
                "string descriptor idx={} shorter ({}<{}), keeping existing",
                idx,
                body.len(),
                entry.bytes.len()
            );
            entry.state = StringState::Valid;
            return StoreOutcome::Ignored;
        }
        let take = body.len().min(MAX_STRING_LEN);
        entry.bytes.clear();
        entry.bytes.extend_from_slice(&body[..take]);
        if idx == 0 {
            // Index 0 is the LangID table; the first u16 pair is our default.
            if entry.bytes.len() >= 2 {
                entry.langid = u16::from_le_bytes([entry.bytes[0], entry.bytes[1]]);
            }
        } else if entry.langid == 0 {
            entry.langid = DEFAULT_LANGID;
        }
        entry.state = StringState::Valid;
        info!("string descriptor stored idx={} len={}", idx, entry.bytes.len());
        StoreOutcome::Accepted
    }

    /// Route one descriptor-frame `(cmd, payload)` pair to the matching
    /// handler (§4.5 `handle_descriptor_frame`). `DONE` carries no payload.
    pub fn handle_descriptor_frame(&mut self, cmd: u8, payload: &[u8]) -> StoreOutcome {
        use bridge_proto::descriptor_cmd::*;
        match cmd {
            DEV_DESC => self.handle_device_desc(payload),
            CONFIG_DESC => self.handle_config_desc(payload),
            REPORT_DESC => self.handle_report_desc(payload),
            STRING_DESC => self.handle_string_desc(payload),
            DONE => {
                self.handle_done();
                StoreOutcome::Accepted
            }
            _ => {
                warn!("unknown descriptor subcommand {}", cmd);
                StoreOutcome::Ignored
            }
        }
    }

    /// `DONE`: mark the session complete and re-analyze.
    pub fn handle_done(&mut self) {
        info!("descriptor transmission complete (reset pending)");
        self.descriptors_complete = true;
        self.ready_sent = false;
        self.update_string_allowlist();
    }

    fn update_speed_from_device_desc(&mut self) {
        if !self.device.valid || self.device.data.len() < STANDARD_DEVICE_DESC_LEN {
            return;
        }
        let max_packet_size0 = self.device.data[7];
        let detected = if max_packet_size0 <= 8 { UsbSpeed::Low } else { UsbSpeed::Full };
        let effective = match detected {
            UsbSpeed::Low => {
                info!("remote device speed detected: LOW (clamped to FULL)");
                UsbSpeed::Full
            }
            UsbSpeed::Full => {
                info!("remote device speed detected: FULL");
                UsbSpeed::Full
            }
        };
        if self.usb_speed != effective {
            self.usb_speed = effective;
            if self.stack_initialized {
                info!("reinitializing USB stack to match new speed setting");
            }
        }
    }

    fn update_string_allowlist(&mut self) {
        for entry in self.strings.iter_mut() {
            if entry.state != StringState::Valid {
                entry.allow_fetch = true;
            }
        }
    }

    /// Run the full per-report layout analysis over every interface's report
    /// descriptor and refresh `report_has_id`/`expected_len` bookkeeping.
    pub fn analyze_report_descriptors(&mut self) {
        for (itf, report) in self.reports.iter().enumerate() {
            if !report.valid || report.data.is_empty() {
                continue;
            }
            let analysis: Analysis = hid_report::analyze(&report.data);
            self.interfaces[itf].report_has_id = analysis.report_has_id;
            if self.interfaces[itf].expected_len == 0 {
                self.interfaces[itf].expected_len = report.data.len() as u16;
            }
        }
    }

    pub fn report_has_id(&self, itf: usize) -> bool {
        self.interfaces.get(itf).map(|i| i.report_has_id).unwrap_or(false)
    }

    pub fn report_bytes(&self, itf: usize) -> Option<&[u8]> {
        self.reports.get(itf).filter(|r| r.valid).map(|r| r.data.as_slice())
    }

    pub fn device_valid(&self) -> bool {
        self.device.valid
    }

    pub fn config_valid(&self) -> bool {
        self.config.valid
    }

    pub fn device_bytes(&self) -> &[u8] {
        &self.device.data
    }

    pub fn config_bytes(&self) -> &[u8] {
        &self.config.data
    }

    pub fn string_bytes(&self, idx: usize) -> Option<(&[u8], u16)> {
        self.strings
            .get(idx)
            .filter(|e| e.state == StringState::Valid)
            .map(|e| (e.bytes.as_slice(), e.langid))
    }

    /// Completeness predicate (§4.5): for every declared HID interface a
    /// sufficiently long report buffer exists, with a legacy fallback to
    /// interface 0 when no interface was explicitly declared present.
    pub fn reports_ready(&self) -> bool {
        let any_present = self.interfaces.iter().any(|i| i.present);
        if !any_present {
            return self.reports[0].valid && !self.reports[0].data.is_empty();
        }
        self.interfaces.iter().enumerate().all(|(itf, info)| {
            if !info.present {
                return true;
            }
            let len = self.reports[itf].data.len() as u16;
            len >= info.expected_len.max(1)
        })
    }

    pub fn ready_to_start(&self) -> bool {
        self.device.valid && self.config.valid && self.reports_ready()
    }

    /// Mirrors `start_tinyusb_if_ready`'s log-once-per-unresolved-precondition
    /// latches: returns which preconditions are still missing, logging each
    /// category exactly once until it clears.
    pub fn missing_start_preconditions(&mut self) -> bool {
        let mut blocked = false;
        if !self.reports_ready() {
            if !self.missing_report_logged {
                warn!("cannot start USB stack: report descriptor(s) missing");
                self.missing_report_logged = true;
            }
            blocked = true;
        } else {
            self.missing_report_logged = false;
        }
        if !self.device.valid {
            if !self.missing_device_logged {
                warn!("cannot start USB stack: device descriptor missing");
                self.missing_device_logged = true;
            }
            blocked = true;
        } else {
            self.missing_device_logged = false;
        }
        if !self.config.valid {
            if !self.missing_config_logged {
                warn!("cannot start USB stack: config descriptor missing");
                self.missing_config_logged = true;
            }
            blocked = true;
        } else {
            self.missing_config_logged = false;
        }
        blocked
    }
}

impl Default for DescriptorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn std_device_desc(max_packet_size0: u8) -> Vec<u8> {
        let mut d = alloc::vec![0u8; STANDARD_DEVICE_DESC_LEN];
        d[0] = STANDARD_DEVICE_DESC_LEN as u8;
        d[1] = 1; // bDescriptorType = DEVICE
        d[7] = max_packet_size0;
        d
    }

    fn config_desc_total(total: u16) -> Vec<u8> {
        let mut d = alloc::vec![0u8; total as usize];
        d[0] = 9;
        d[1] = 2;
        d[2] = (total & 0xFF) as u8;
        d[3] = (total >> 8) as u8;
        d
    }

    #[test]
    fn scenario_2_descriptor_session_accept() {
        let mut store = DescriptorStore::new();
        assert_eq!(store.handle_device_desc(&std_device_desc(64)), StoreOutcome::Accepted);
        let cfg = config_desc_total(34);
        assert_eq!(store.handle_config_desc(&cfg[..17]), StoreOutcome::Accepted);
        assert_eq!(store.handle_config_desc(&cfg[17..]), StoreOutcome::Accepted);
        assert!(store.config_valid());

        let mut report_payload = alloc::vec![0u8]; // itf 0
        report_payload.extend(alloc::vec![0xAAu8; 74]);
        assert_eq!(store.handle_report_desc(&report_payload), StoreOutcome::Accepted);

        store.analyze_report_descriptors();
        assert!(store.ready_to_start());
        store.handle_done();
        assert!(store.descriptors_complete);
        assert_eq!(store.usb_speed, UsbSpeed::Full);
    }

    #[test]
    fn scenario_3_descriptor_session_reject() {
        let mut store = DescriptorStore::new();
        store.handle_device_desc(&std_device_desc(64));
        store.descriptors_complete = true;
        store.usb_attached = true;
        let before = store.device_bytes().to_vec();
        let outcome = store.handle_device_desc(&std_device_desc(8));
        assert_eq!(outcome, StoreOutcome::RejectedSessionInUse);
        assert_eq!(store.device_bytes(), before.as_slice());
    }

    #[test]
    fn low_speed_device_is_clamped_to_full() {
        let mut store = DescriptorStore::new();
        store.handle_device_desc(&std_device_desc(8));
        assert_eq!(store.usb_speed, UsbSpeed::Full);
    }

    #[test]
    fn out_of_range_interface_resyncs() {
        let mut store = DescriptorStore::new();
        store.handle_device_desc(&std_device_desc(64));
        let payload = [MAX_HID_INTERFACES as u8, 1, 2, 3];
        assert_eq!(store.handle_report_desc(&payload), StoreOutcome::ResyncOutOfRange);
        assert!(!store.device_valid());
    }

    #[test]
    fn legacy_fallback_when_no_interface_declared_present() {
        let mut store = DescriptorStore::new();
        store.reports[0].data.extend_from_slice(&[1, 2, 3]);
        store.reports[0].valid = true;
        assert!(store.reports_ready());
    }

    #[test]
    fn dispatch_routes_by_command_byte() {
        let mut store = DescriptorStore::new();
        let outcome = store.handle_descriptor_frame(bridge_proto::descriptor_cmd::DEV_DESC, &std_device_desc(64));
        assert_eq!(outcome, StoreOutcome::Accepted);
        assert!(store.device_valid());
    }

    #[test]
    fn string_index_zero_shorter_than_existing_is_rejected() {
        let mut store = DescriptorStore::new();
        let payload = [0u8, 0x09, 0x04, 0x0C, 0x08];
        store.handle_string_desc(&payload);
        let shorter = [0u8, 0x09, 0x04];
        assert_eq!(store.handle_string_desc(&shorter), StoreOutcome::Ignored);
        let (bytes, _) = store.string_bytes(0).unwrap();
        assert_eq!(bytes.len(), 4);
    }
}
