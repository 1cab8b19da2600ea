//! Wires node H and node D together over the real SLIP + frame transport,
//! one [`Session::tick`] per cooperative step on both sides. This is the
//! thing a firmware's two independent main loops would do if you could run
//! them in the same process.

use bridge_proto::config::BridgeConfig;
use bridge_proto::control_cmd;
use bridge_proto::descriptor_cmd as dcmd;
use bridge_proto::frame::FrameKind;
use bridge_proto::slip;
use bridge_proto::transport::PrimaryLink;

use node_device::control::ControlRouter as DeviceControlRouter;
use node_device::input::InputApplier;
use node_device::lifecycle::Lifecycle;
use node_device::store::DescriptorStore;

use node_host::control as host_control;
use node_host::input::InputForwarder;
use node_host::pipeline::DescriptorPipeline;
use node_host::strings::StringCache;

use crate::sim_stack::{SimDeviceStack, SimHostStack};

const RING: usize = 8192;
const FRAME: usize = 300;

/// One resolved `GET_REPORT` reply delivered back to node D.
pub struct GetReportResult {
    pub len: usize,
    pub bytes: [u8; 64],
}

pub struct Session {
    pub host_stack: SimHostStack,
    pub host_pipeline: DescriptorPipeline,
    pub host_strings: StringCache,
    pub host_forwarder: InputForwarder,

    pub device_store: DescriptorStore,
    pub device_stack: SimDeviceStack,
    pub device_input: InputApplier,
    pub device_control: DeviceControlRouter,

    pub last_get_report: Option<GetReportResult>,

    h_to_d: PrimaryLink<RING, FRAME>,
    d_to_h: PrimaryLink<RING, FRAME>,
    pub cfg: BridgeConfig,
    pub now_ms: u32,
    pub dev_addr: u8,
}

impl Session {
    pub fn new(host_stack: SimHostStack) -> Self {
        Session {
            host_stack,
            host_pipeline: DescriptorPipeline::new(),
            host_strings: StringCache::new(),
            host_forwarder: InputForwarder::new(),
            device_store: DescriptorStore::new(),
            device_stack: SimDeviceStack::default(),
            device_input: InputApplier::new(),
            device_control: DeviceControlRouter::new(),
            last_get_report: None,
            h_to_d: PrimaryLink::new(),
            d_to_h: PrimaryLink::new(),
            cfg: BridgeConfig::DEFAULT,
            now_ms: 0,
            dev_addr: 1,
        }
    }

    /// A mount event from H's host stack: begins the descriptor pipeline.
    pub fn mount(&mut self, dev_addr: u8) {
        self.dev_addr = dev_addr;
        self.host_pipeline.on_mount(dev_addr);
    }

    fn feed(link: &mut PrimaryLink<RING, FRAME>, frames: &[Vec<u8>]) {
        for raw in frames {
            let mut encoded = Vec::new();
            slip::encode(raw, &mut encoded);
            for b in encoded {
                link.on_rx_byte(b);
            }
        }
    }

    /// Advance node H's descriptor pipeline and string cache one step, node
    /// D's lifecycle/input/control one step, and ferry every frame either
    /// side produced across the link. Call in a loop until both settle.
    pub fn tick(&mut self) {
        self.now_ms = self.now_ms.wrapping_add(1);

        let mut h_out = Vec::new();
        self.host_pipeline.service(&mut self.host_stack, &self.cfg, self.now_ms, &mut h_out);
        self.host_strings.service(self.dev_addr, self.now_ms, &self.cfg, &mut self.host_stack, &mut h_out);
        Self::feed(&mut self.h_to_d, &h_out);
        self.drain_h_to_d();

        if let Some(ready_frame) = Lifecycle::service(&mut self.device_store, &mut self.device_stack) {
            Self::feed(&mut self.d_to_h, &[ready_frame]);
        }
        self.device_input.drain_pending(&mut self.device_stack);
        self.drain_d_to_h();
    }

    fn drain_h_to_d(&mut self) {
        loop {
            let mut scratch = arrayvec::ArrayVec::new();
            let Some(result) = self.h_to_d.poll_frame(&mut scratch) else {
                break;
            };
            let Ok(parsed) = result else { continue };
            match parsed.kind {
                FrameKind::Descriptor => {
                    self.device_store.handle_descriptor_frame(parsed.cmd, parsed.payload);
                }
                FrameKind::Input => {
                    self.device_input
                        .on_input_frame(parsed.payload, self.now_ms, &self.device_store, &mut self.device_stack);
                }
                FrameKind::Control => {
                    if parsed.cmd == control_cmd::GET_REPORT {
                        let mut buf = [0u8; 64];
                        if let Some(len) = self.device_control.on_get_report_response(parsed.payload, &mut buf) {
                            self.last_get_report = Some(GetReportResult { len, bytes: buf });
                        }
                    } else if parsed.cmd == control_cmd::DEVICE_RESET {
                        self.device_store.reset();
                        self.device_stack.started = false;
                    }
                }
                FrameKind::Unmount => {
                    self.device_store.reset();
                    self.device_stack.started = false;
                    self.device_stack.attached = false;
                }
            }
        }
    }

    fn drain_d_to_h(&mut self) {
        loop {
            let mut scratch = arrayvec::ArrayVec::new();
            let Some(result) = self.d_to_h.poll_frame(&mut scratch) else {
                break;
            };
            let Ok(parsed) = result else { continue };
            match parsed.kind {
                FrameKind::Control if parsed.cmd == node_device::lifecycle::CMD_READY => {
                    self.host_pipeline.on_ready();
                }
                FrameKind::Control => {
                    let mut out = Vec::new();
                    host_control::handle_inbound(self.dev_addr, parsed.cmd, parsed.payload, &mut self.host_stack, &mut out);
                    Self::feed(&mut self.h_to_d, &out);
                }
                FrameKind::Descriptor if parsed.cmd == dcmd::STRING_REQ => {
                    if parsed.payload.len() >= 3 {
                        let index = parsed.payload[0];
                        let langid = u16::from_le_bytes([parsed.payload[1], parsed.payload[2]]);
                        let mut out = Vec::new();
                        self.host_strings
                            .on_string_request(self.dev_addr, index, langid, self.now_ms, &mut self.host_stack, &mut out);
                        Self::feed(&mut self.h_to_d, &out);
                    }
                }
                _ => {}
            }
        }
    }

    /// Run `tick` until the descriptor pipeline has forwarded DONE and is
    /// parked in `WaitReady`, or `max_ticks` is exhausted.
    pub fn run_descriptor_session(&mut self, max_ticks: u32) {
        for _ in 0..max_ticks {
            self.tick();
            if !self.host_pipeline.is_running() && self.device_stack.attached {
                break;
            }
        }
    }

    /// Have node D's USB device stack initiate a synchronous `GET_REPORT`
    /// (§4.8), ferrying the request to H and the response back.
    pub fn device_get_report(&mut self, itf: u8, report_type: u8, report_id: u8, reqlen: u16) {
        if let Ok(req) = self.device_control.begin_get_report(itf, report_type, report_id, reqlen) {
            Self::feed(&mut self.d_to_h, &[req]);
            self.drain_d_to_h();
            self.drain_h_to_d();
        }
    }

    /// Have node H forward one HID report on `itf` as an `INPUT` frame and
    /// deliver it to node D.
    pub fn forward_input(&mut self, itf: u8, itf_protocol: u8, boot_capable: bool, report: &[u8], ready: bool) {
        if let Some(frame) = self
            .host_forwarder
            .on_report(self.dev_addr, itf, itf_protocol, boot_capable, report, self.now_ms, ready, &mut self.host_stack)
        {
            Self::feed(&mut self.h_to_d, &[frame]);
            self.drain_h_to_d();
        }
    }
}
