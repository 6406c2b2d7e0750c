// Configure the scope, arm a single capture and persist the result
//
// Applies a known acquisition setup (both channels on, zero offsets, 20 us
// per division), arms a single-shot capture, waits for the trigger and
// reads channel 2 at full depth.

use clap::Parser;
use ds1202_rs::{Ds1202, TimebaseMode, WaveformFormat};
use polars::prelude::*;
use std::time::Duration;

#[derive(Parser)]
#[command(about = "Configured single-shot capture on a DS1202")]
struct Args {
    /// IP address or hostname of the oscilloscope
    host: String,

    /// Channel to read after the capture
    #[arg(short, long, default_value_t = 2)]
    channel: u8,

    /// Main timebase scale in seconds per division
    #[arg(long, default_value_t = 20e-6)]
    timebase: f64,

    /// Output CSV filename
    #[arg(short, long, default_value = "capture.csv")]
    output: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    println!("Connecting to oscilloscope at {}...", args.host);
    let mut scope = Ds1202::connect(&args.host)?;
    println!("Connected to: {}", scope.identity());

    println!("Applying acquisition setup...");
    scope.set_timebase_mode(TimebaseMode::Main)?;
    scope.set_timebase_scale(args.timebase)?;
    scope.set_timebase_offset(0.0)?;
    scope.set_channel_display(1, true)?;
    scope.set_channel_display(2, true)?;
    scope.set_channel_offset(1, 0.0)?;
    scope.set_channel_offset(2, 0.0)?;
    println!("  time/div = {}", scope.timebase_scale()?);

    println!("Arming single-shot capture...");
    scope.single()?;
    scope.wait_for_stop(Duration::from_secs(10))?;
    println!("Triggered, scope stopped.");

    println!("Reading channel {} at full depth...", args.channel);
    let waveform = scope.read_waveform(args.channel, WaveformFormat::Byte)?;
    println!("  Recovered {} samples", waveform.len());

    let mut df = waveform.to_dataframe()?;
    let mut file = std::fs::File::create(&args.output)?;
    CsvWriter::new(&mut file).finish(&mut df)?;
    println!("Saved to {}", args.output);

    Ok(())
}
