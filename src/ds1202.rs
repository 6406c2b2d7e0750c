use crate::scpi_socket::{ScpiError, ScpiSession, ScpiSocket, DEFAULT_SCPI_PORT};
use crate::waveform::{Waveform, WaveformError, WaveformFormat, WaveformReader};
use std::thread;
use std::time::{Duration, Instant};

/// Connect timeout, also applied to every read and write on the session.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum Ds1202Error {
    #[error("SCPI session error: {0}")]
    Scpi(#[from] ScpiError),

    #[error(transparent)]
    Waveform(#[from] WaveformError),

    #[error("Channel {requested} out of range (the DS1202 has channels 1 and 2)")]
    InvalidChannel { requested: u8 },

    #[error("Unexpected reply {reply:?} to {query:?}")]
    UnexpectedReply { query: String, reply: String },

    #[error("Scope did not reach STOP within {waited:?} (last status {status:?})")]
    StopTimeout {
        waited: Duration,
        status: TriggerStatus,
    },
}

/// Reply values of `:TRIGger:STATus?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerStatus {
    Td,
    Wait,
    Run,
    Auto,
    Stop,
}

impl TriggerStatus {
    fn from_reply(reply: &str) -> Option<Self> {
        match reply {
            "TD" => Some(Self::Td),
            "WAIT" => Some(Self::Wait),
            "RUN" => Some(Self::Run),
            "AUTO" => Some(Self::Auto),
            "STOP" => Some(Self::Stop),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimebaseMode {
    Main,
    Xy,
    Roll,
}

impl TimebaseMode {
    pub fn as_scpi(&self) -> &'static str {
        match self {
            TimebaseMode::Main => "MAIN",
            TimebaseMode::Xy => "XY",
            TimebaseMode::Roll => "ROLL",
        }
    }
}

/// Control handle for a DS1202 oscilloscope.
///
/// Owns the session; all methods are blocking round trips. Construct with
/// [`Ds1202::connect`] for the TCP socket service, or [`Ds1202::with_session`]
/// to take over any open [`ScpiSession`].
pub struct Ds1202<S: ScpiSession = ScpiSocket> {
    session: S,
    idn: String,
}

impl Ds1202<ScpiSocket> {
    /// Connect to the scope's SCPI service at `host` and verify the link
    /// with an identification query.
    pub fn connect(host: &str) -> Result<Self, Ds1202Error> {
        let session = ScpiSocket::connect(host, DEFAULT_SCPI_PORT, DEFAULT_CONNECT_TIMEOUT)?;
        Self::with_session(session)
    }
}

impl<S: ScpiSession> Ds1202<S> {
    /// Take over an already-open session.
    pub fn with_session(mut session: S) -> Result<Self, Ds1202Error> {
        let idn = session.query_text("*IDN?")?;
        log::info!("Connected to: {idn}");
        Ok(Self { session, idn })
    }

    /// The `*IDN?` reply captured at connect time.
    pub fn identity(&self) -> &str {
        &self.idn
    }

    /// Give up the handle and get the underlying session back.
    pub fn into_session(self) -> S {
        self.session
    }

    pub fn trigger_status(&mut self) -> Result<TriggerStatus, Ds1202Error> {
        let reply = self.session.query_text(":TRIGger:STATus?")?;
        TriggerStatus::from_reply(&reply).ok_or(Ds1202Error::UnexpectedReply {
            query: ":TRIGger:STATus?".to_string(),
            reply,
        })
    }

    pub fn run(&mut self) -> Result<(), Ds1202Error> {
        Ok(self.session.send_command(":RUN")?)
    }

    pub fn stop(&mut self) -> Result<(), Ds1202Error> {
        Ok(self.session.send_command(":STOP")?)
    }

    /// Arm a single-shot acquisition.
    pub fn single(&mut self) -> Result<(), Ds1202Error> {
        Ok(self.session.send_command(":SINGle")?)
    }

    /// Poll the trigger status until the scope reaches STOP.
    ///
    /// A single-shot capture stops on its own once triggered; use this
    /// after [`Ds1202::single`] to block until the memory is readable.
    pub fn wait_for_stop(&mut self, timeout: Duration) -> Result<(), Ds1202Error> {
        let started = Instant::now();
        loop {
            let status = self.trigger_status()?;
            if status == TriggerStatus::Stop {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(Ds1202Error::StopTimeout {
                    waited: started.elapsed(),
                    status,
                });
            }
            thread::sleep(STATUS_POLL_INTERVAL);
        }
    }

    pub fn set_channel_display(&mut self, channel: u8, enabled: bool) -> Result<(), Ds1202Error> {
        check_channel(channel)?;
        let state = if enabled { "ON" } else { "OFF" };
        Ok(self
            .session
            .send_command(&format!(":CHANnel{channel}:DISPlay {state}"))?)
    }

    pub fn channel_display(&mut self, channel: u8) -> Result<bool, Ds1202Error> {
        check_channel(channel)?;
        let query = format!(":CHANnel{channel}:DISPlay?");
        let reply = self.session.query_text(&query)?;
        match reply.as_str() {
            "1" => Ok(true),
            "0" => Ok(false),
            _ => Err(Ds1202Error::UnexpectedReply { query, reply }),
        }
    }

    /// Set the vertical offset of `channel`, in volts.
    pub fn set_channel_offset(&mut self, channel: u8, volts: f64) -> Result<(), Ds1202Error> {
        check_channel(channel)?;
        Ok(self
            .session
            .send_command(&format!(":CHANnel{channel}:OFFSet {volts}"))?)
    }

    pub fn set_timebase_mode(&mut self, mode: TimebaseMode) -> Result<(), Ds1202Error> {
        Ok(self
            .session
            .send_command(&format!(":TIMebase:MODE {}", mode.as_scpi()))?)
    }

    /// Set the main timebase scale, in seconds per division.
    pub fn set_timebase_scale(&mut self, seconds_per_div: f64) -> Result<(), Ds1202Error> {
        Ok(self
            .session
            .send_command(&format!(":TIMebase:MAIN:SCALe {seconds_per_div:e}"))?)
    }

    pub fn timebase_scale(&mut self) -> Result<f64, Ds1202Error> {
        self.query_f64(":TIMebase:MAIN:SCALe?")
    }

    /// Set the horizontal delay offset, in seconds.
    pub fn set_timebase_offset(&mut self, seconds: f64) -> Result<(), Ds1202Error> {
        Ok(self
            .session
            .send_command(&format!(":TIMebase:MAIN:OFFSet {seconds:e}"))?)
    }

    pub fn timebase_offset(&mut self) -> Result<f64, Ds1202Error> {
        self.query_f64(":TIMebase:MAIN:OFFSet?")
    }

    /// Current sample rate, in Sa/s.
    pub fn sample_rate(&mut self) -> Result<f64, Ds1202Error> {
        self.query_f64(":ACQuire:SRATe?")
    }

    /// Read the full acquisition memory of `channel`.
    ///
    /// The scope must be stopped first; see [`WaveformReader::fetch`] for
    /// the transfer protocol and failure modes.
    pub fn read_waveform(
        &mut self,
        channel: u8,
        format: WaveformFormat,
    ) -> Result<Waveform, Ds1202Error> {
        Ok(WaveformReader::new(&mut self.session).fetch(channel, format)?)
    }

    fn query_f64(&mut self, query: &str) -> Result<f64, Ds1202Error> {
        let reply = self.session.query_text(query)?;
        reply.parse().map_err(|_| Ds1202Error::UnexpectedReply {
            query: query.to_string(),
            reply,
        })
    }
}

fn check_channel(channel: u8) -> Result<(), Ds1202Error> {
    if (1..=2).contains(&channel) {
        Ok(())
    } else {
        Err(Ds1202Error::InvalidChannel { requested: channel })
    }
}
