//! Manual exploration CLI for the bridge session harness: drives a
//! simulated device through a descriptor session, an input happy path and a
//! `GET_REPORT` round trip, printing what each side does along the way.

use clap::{Parser, Subcommand};

use anyhow::Result;

use bridge_sim::fixtures;
use bridge_sim::harness::Session;
use bridge_sim::sim_stack::SimHostStack;

#[derive(Parser)]
#[command(name = "bridge-sim")]
#[command(about = "USB/HID proxy bridge session harness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full session: mount, descriptor pipeline, a mouse move, a
    /// GET_REPORT round trip.
    Run {
        /// Number of mouse-move reports to forward after READY.
        #[arg(long, default_value_t = 3)]
        moves: u32,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run { moves } => run(*moves),
    }
}

fn run(moves: u32) -> Result<()> {
    let mut host_stack = SimHostStack::default();
    host_stack.device_desc = Some(fixtures::device_descriptor());
    host_stack.config_desc = Some(fixtures::config_descriptor());
    host_stack.reports.insert(0, fixtures::report_descriptor_mouse());
    host_stack.strings.insert(0, fixtures::langid_table());
    host_stack.strings.insert(1, fixtures::string_descriptor("Acme Corp"));
    host_stack.strings.insert(2, fixtures::string_descriptor("Bridge Mouse"));
    host_stack.strings.insert(3, fixtures::string_descriptor("0001"));

    let mut session = Session::new(host_stack);
    session.device_stack.attached = true;
    session.device_stack.hid_ready = true;
    session.mount(1);

    println!("running descriptor session...");
    session.run_descriptor_session(200);
    println!(
        "device descriptors complete={} attached={} report_has_id(0)={}",
        session.device_store.descriptors_complete,
        session.device_stack.attached,
        session.device_store.report_has_id(0)
    );

    for i in 0..moves {
        let dx = (i % 5) as i8 as u8;
        let report = [0u8, dx, 0, 0];
        session.forward_input(0, 2, false, &report, true);
    }
    println!("forwarded {} reports, device received {}", moves, session.device_stack.sent.len());

    session.host_stack.get_report_response = Some(vec![0, 0, 0]);
    session.device_get_report(0, 1, 0, 4);
    if let Some(result) = &session.last_get_report {
        println!("GET_REPORT resolved: {} bytes = {:?}", result.len, &result.bytes[..result.len]);
    } else {
        println!("GET_REPORT did not resolve");
    }

    Ok(())
}
