//! The six concrete end-to-end scenarios: framing sanity, descriptor
//! session accept/reject, the input happy path, a GET_REPORT round trip and
//! side-channel injection.

use bridge_proto::frame::{self, FrameKind};
use bridge_proto::hid_report::InferredType;

use bridge_sim::fixtures;
use bridge_sim::harness::Session;
use bridge_sim::sim_stack::SimHostStack;

use node_host::sidechannel::{DescriptorSource, InterfaceInfo, Injector, SideChannel};

fn mounted_host_stack() -> SimHostStack {
    let mut stack = SimHostStack::default();
    stack.device_desc = Some(fixtures::device_descriptor());
    stack.config_desc = Some(fixtures::config_descriptor());
    stack.reports.insert(0, fixtures::report_descriptor_mouse());
    stack.strings.insert(0, fixtures::langid_table());
    stack.strings.insert(1, fixtures::string_descriptor("Acme"));
    stack.strings.insert(2, fixtures::string_descriptor("Bridge Mouse"));
    stack.strings.insert(3, fixtures::string_descriptor("0001"));
    stack
}

fn running_session() -> Session {
    let mut session = Session::new(mounted_host_stack());
    session.device_stack.attached = true;
    session.device_stack.hid_ready = true;
    session.mount(1);
    session.run_descriptor_session(200);
    session
}

#[test]
fn scenario_1_framing_sanity() {
    let payload = [0x00u8, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0xAB, 0xCD];
    let encoded = frame::build_vec(FrameKind::Input, 0, &payload).unwrap();
    assert_eq!(&encoded[..4], &[0x02, 0x00, 0x09, 0x00]);

    let parsed = frame::parse(&encoded).unwrap();
    assert_eq!(parsed.kind, FrameKind::Input);
    assert_eq!(parsed.cmd, 0);
    assert_eq!(parsed.payload, &payload[..]);
}

#[test]
fn scenario_2_descriptor_session_accept() {
    let session = running_session();
    assert!(session.device_store.descriptors_complete);
    assert!(session.device_stack.started);
    assert_eq!(session.device_stack.last_speed, Some(node_device::store::UsbSpeed::Full));
    assert!(session.device_store.ready_sent);
}

#[test]
fn scenario_3_descriptor_session_reject() {
    let mut session = running_session();
    let device_before = session.device_store.device_bytes().to_vec();

    let outcome = session.device_store.handle_device_desc(&fixtures::device_descriptor());
    assert_eq!(outcome, node_device::store::StoreOutcome::RejectedSessionInUse);
    assert_eq!(session.device_store.device_bytes(), device_before.as_slice());
}

#[test]
fn scenario_4_input_happy_path() {
    let mut session = running_session();
    assert!(!session.device_store.report_has_id(0));

    session.now_ms = 1000;
    let report = [0u8; 8];
    session.forward_input(0, 2, false, &report, true);

    assert_eq!(session.device_stack.sent.len(), 1);
    assert_eq!(session.device_stack.sent[0].0, 0);
    assert_eq!(session.device_stack.sent[0].1, report.to_vec());
}

#[test]
fn scenario_5_get_report_round_trip() {
    let mut session = running_session();
    session.host_stack.get_report_response = Some(vec![b'A', b'B', b'C', b'D', b'E', b'F', b'G', b'H']);

    session.device_get_report(0, 1, 2, 8);

    let result = session.last_get_report.expect("GET_REPORT should have resolved");
    assert_eq!(result.len, 8);
    assert_eq!(&result.bytes[..8], b"ABCDEFGH");
}

struct ForwardingInjector<'a> {
    session: &'a mut Session,
}

impl Injector for ForwardingInjector<'_> {
    fn inject(&mut self, itf: u8, bytes: &[u8]) -> bool {
        self.session.forward_input(itf, 2, false, bytes, true);
        true
    }
}

struct NoDescriptors;

impl DescriptorSource for NoDescriptors {
    fn report_descriptor(&self, _itf: u8) -> Option<&[u8]> {
        None
    }
    fn report_layout(&self, _itf: u8, _report_id: u8) -> Option<bridge_proto::hid_report::ReportLayout> {
        None
    }
}

#[test]
fn scenario_6_side_channel_injection() {
    let mut session = running_session();
    session.forward_input(0, 2, false, &[0u8; 4], true); // establishes seq=0 baseline
    let baseline_sent = session.device_stack.sent.len();

    const KEY: &[u8] = b"derived-session-key";
    let mut side_channel = SideChannel::new(b"bootstrap-secret".to_vec(), vec![1, 2, 3, 4]);
    side_channel.set_derived_key(KEY.to_vec());

    let interfaces = vec![InterfaceInfo {
        dev_addr: 1,
        itf: 0,
        itf_protocol: 2,
        hid_protocol: 1,
        inferred_type: InferredType::MOUSE,
        mounted: true,
        active: true,
    }];

    let payload = [0xFFu8, 4, 0x01, 0x05, 0x00, 0x00];
    let req = bridge_proto::control_frame::build_vec(
        1,
        bridge_proto::control_frame::Command::InjectReport as u8,
        bridge_proto::control_frame::ControlFlags::empty(),
        &payload,
        KEY,
    )
    .unwrap();

    let descriptors = NoDescriptors;
    let mut injector = ForwardingInjector { session: &mut session };
    let rsp = side_channel.handle_frame(&req, &interfaces, &descriptors, &mut injector).unwrap();
    let (parsed, _) = bridge_proto::control_frame::parse_and_verify(&rsp, Some(KEY), b"bootstrap-secret").unwrap();
    assert!(!parsed.flags.contains(bridge_proto::control_frame::ControlFlags::ERROR));

    assert_eq!(session.device_stack.sent.len(), baseline_sent + 1);
    assert_eq!(session.device_stack.sent[baseline_sent].1, vec![0x01, 0x05, 0x00, 0x00]);
}
