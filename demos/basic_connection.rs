// Basic connection and status check
//
// This example connects to a scope and prints its identity and the current
// acquisition settings.

use clap::Parser;
use ds1202_rs::Ds1202;

#[derive(Parser)]
#[command(about = "Connect to a DS1202 and print its state")]
struct Args {
    /// IP address or hostname of the oscilloscope
    host: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    println!("Connecting to oscilloscope at {}...", args.host);
    let mut scope = Ds1202::connect(&args.host)?;
    println!("Connected to: {}", scope.identity());

    println!("\nCurrent state:");
    println!("  Trigger status: {:?}", scope.trigger_status()?);
    println!("  Sample rate:    {} Sa/s", scope.sample_rate()?);
    println!("  Timebase scale: {} s/div", scope.timebase_scale()?);
    println!("  Timebase offset: {} s", scope.timebase_offset()?);
    println!("  Channel 1 displayed: {}", scope.channel_display(1)?);
    println!("  Channel 2 displayed: {}", scope.channel_display(2)?);

    Ok(())
}
