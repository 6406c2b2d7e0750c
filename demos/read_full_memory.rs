// Full-depth read of one or both channels, persisted as CSV
//
// Reads the complete acquisition memory (the scope must already be stopped)
// and writes a time column plus one column per channel that could be read.

use clap::Parser;
use ds1202_rs::{Ds1202, Waveform, WaveformFormat};
use polars::prelude::*;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Parser)]
#[command(about = "Read the full acquisition memory of a DS1202 into a CSV file")]
struct Args {
    /// IP address or hostname of the oscilloscope
    host: String,

    /// Channel to read (1 or 2). If not specified, tries both channels.
    #[arg(short, long)]
    channel: Option<u8>,

    /// Prefix for the output filename
    #[arg(short, long, default_value = "ds1202_data")]
    prefix: String,

    /// Transfer the slower, full-resolution ASCII encoding instead of
    /// 8-bit byte codes
    #[arg(long)]
    ascii: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let format = if args.ascii {
        WaveformFormat::Ascii
    } else {
        WaveformFormat::Byte
    };

    println!("Connecting to oscilloscope at {}...", args.host);
    let mut scope = Ds1202::connect(&args.host)?;
    println!("Connected to: {}", scope.identity());

    let channels: Vec<u8> = match args.channel {
        Some(channel) => vec![channel],
        None => vec![1, 2],
    };

    let mut captures: Vec<(u8, Waveform)> = Vec::new();
    for &channel in &channels {
        println!("Reading data from channel {channel}...");
        match scope.read_waveform(channel, format) {
            Ok(waveform) => {
                println!("  Recovered {} samples", waveform.len());
                captures.push((channel, waveform));
            }
            Err(e) if args.channel.is_none() => {
                // Trying both channels; a disabled one is not fatal
                println!("  Channel {channel}: {e}");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let Some((_, first)) = captures.first() else {
        return Err("No channels could be read. Make sure at least one channel is enabled.".into());
    };

    let mut columns = vec![Column::new("time".into(), &first.time)];
    for (channel, waveform) in &captures {
        columns.push(Column::new(
            format!("channel_{channel}").into(),
            &waveform.voltage,
        ));
    }
    let mut df = DataFrame::new(columns)?;

    let stamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let filename = format!("{}_{stamp}.csv", args.prefix);
    println!("Saving data to {filename}...");
    let mut file = std::fs::File::create(&filename)?;
    CsvWriter::new(&mut file).finish(&mut df)?;

    println!("Data saved successfully!");
    println!("  Filename: {filename}");
    println!("  Rows: {}", df.height());

    Ok(())
}
