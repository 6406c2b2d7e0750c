//! # DS1202 RS
//!
//! A Rust library for reading full-memory waveform captures from Rigol
//! DS1202 oscilloscopes over the instrument's raw-socket SCPI service.
//!
//! The scope limits a single `:WAVeform:DATA?` reply to a bounded number of
//! samples, so a full memory-depth capture has to be transferred as a series
//! of range-addressed chunks. This library plans those chunks from the
//! instrument state, validates every chunk against its TMC length header,
//! reassembles the capture in order and converts it to physical time and
//! voltage values.
//!
//! ## Features
//!
//! - **Chunked full-depth transfer**: reads the whole acquisition memory,
//!   not just the on-screen samples, in ASCII or BYTE encoding
//! - **Strict validation**: trigger-state precondition, source-select echo
//!   check, per-chunk length headers and a final depth cross-check — a
//!   failed read never yields partial data
//! - **Scope control**: trigger commands, status polling, channel and
//!   timebase setup
//! - **DataFrame output**: uses `polars` to hand captures to analysis code
//!   and to persist them as CSV
//! - **Type safety**: closed error enums with structured fields throughout
//!
//! ## Examples
//!
//! ### Reading a full capture
//!
//! ```rust,no_run
//! use ds1202_rs::{Ds1202, WaveformFormat};
//!
//! // Connect to the scope's SCPI service (port 5555)
//! let mut scope = Ds1202::connect("10.0.4.104")?;
//!
//! // The scope must be stopped before waveform memory is addressable
//! scope.stop()?;
//!
//! let waveform = scope.read_waveform(1, WaveformFormat::Byte)?;
//! println!("Captured {} samples", waveform.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Single-shot capture
//!
//! ```rust,no_run
//! use ds1202_rs::{Ds1202, WaveformFormat};
//! use std::time::Duration;
//!
//! let mut scope = Ds1202::connect("10.0.4.104")?;
//!
//! scope.single()?;
//! scope.wait_for_stop(Duration::from_secs(10))?;
//!
//! let waveform = scope.read_waveform(2, WaveformFormat::Ascii)?;
//! let df = waveform.to_dataframe()?;
//! println!("{df}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Driving the reader over your own session
//!
//! Anything implementing [`ScpiSession`] can back the reader, which keeps
//! the transfer logic testable without hardware.
//!
//! ```rust,no_run
//! use ds1202_rs::{ScpiSocket, WaveformFormat, WaveformReader, DEFAULT_SCPI_PORT};
//! use std::time::Duration;
//!
//! let mut session = ScpiSocket::connect("10.0.4.104", DEFAULT_SCPI_PORT, Duration::from_secs(5))?;
//! let waveform = WaveformReader::new(&mut session).fetch(1, WaveformFormat::Ascii)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod ds1202;
pub mod scpi_socket;
pub mod waveform;

// Re-export the main types for convenience
pub use ds1202::{Ds1202, Ds1202Error, TimebaseMode, TriggerStatus};

pub use scpi_socket::{ScpiError, ScpiSession, ScpiSocket, DEFAULT_SCPI_PORT};

pub use waveform::{
    AcquisitionParams, TmcHeader, VerticalCalibration, Waveform, WaveformError, WaveformFormat,
    WaveformReader,
};
