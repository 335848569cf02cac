//! Hardware tests for the trailcam uplink controller.
//!
//! Flash the firmware, connect the board's USB serial port and run. The
//! delivery group sends a real message over whichever link the board picks,
//! so it is left out unless asked for.

mod device;
mod protocol;

use std::time::Duration;

use clap::Parser;
use colored::Colorize;

use device::{resolve_port, DeviceClient};
use tests::{print_results, run_tests, Group};

#[derive(Parser)]
#[command(name = "integration-tests")]
#[command(about = "Hardware tests for the trailcam uplink controller")]
struct Args {
    /// Serial port for the device (use "auto" to auto-detect)
    #[arg(short, long, default_value = "auto")]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "115200")]
    baud: u32,

    /// Test groups to run (repeatable)
    #[arg(short, long = "group", value_enum, default_values_t = [Group::Protocol, Group::Control])]
    groups: Vec<Group>,

    /// Sync the device clock to this host before testing
    #[arg(long)]
    sync_clock: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let port = resolve_port(&args.port)?;

    println!("{}", "Trailcam Uplink Hardware Tests".bold());
    println!("Port:   {}", port);
    println!("Groups: {:?}", args.groups);
    println!();

    let mut device = DeviceClient::new(&port, args.baud)?;
    // Boot log shares the USB serial port
    std::thread::sleep(Duration::from_secs(1));
    device.clear_buffer()?;

    if args.sync_clock {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)?
            .as_secs();
        device.set_time(now)?;
        println!("Device clock set to {}", now);
    }

    match device.status() {
        Ok(report) => println!(
            "Satellite {}, {} pending, {} sent today\n",
            if report.satellite_fitted { "fitted".green() } else { "absent".yellow() },
            report.pending,
            report.messages_sent_today
        ),
        Err(e) => anyhow::bail!("Device did not answer GetStatus: {}", e),
    }

    let results = run_tests(&mut device, &args.groups);
    print_results(&results);

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }
    Ok(())
}
