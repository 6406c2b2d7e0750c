// Arm a single-shot capture and wait for it to complete
//
// Mirrors pressing SINGLE on the front panel: arms the trigger, then polls
// the trigger status until the scope stops.

use clap::Parser;
use ds1202_rs::Ds1202;
use std::time::Duration;

#[derive(Parser)]
#[command(about = "Arm a single-shot capture on a DS1202")]
struct Args {
    /// IP address or hostname of the oscilloscope
    host: String,

    /// Seconds to wait for the capture to trigger
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    println!("Connecting to oscilloscope at {}...", args.host);
    let mut scope = Ds1202::connect(&args.host)?;
    println!("Connected to: {}", scope.identity());

    println!("Single trigger now...");
    scope.single()?;
    scope.wait_for_stop(Duration::from_secs(args.timeout))?;
    println!("Capture complete, scope stopped.");

    Ok(())
}
