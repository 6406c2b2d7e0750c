use crate::scpi_socket::{ScpiError, ScpiSession};
use polars::prelude::*;

/// Horizontal divisions of the display window. Not queryable on the DS1202.
pub const TIMEBASE_DIVISIONS: usize = 12;

const TIME_COLUMN_NAME: &str = "time";
const VOLTAGE_COLUMN_NAME: &str = "voltage";

#[derive(Debug, thiserror::Error)]
pub enum WaveformError {
    #[error("Waveform source channel {requested} out of range (the DS1202 has channels 1 and 2)")]
    InvalidChannel { requested: u8 },

    #[error("Scope must be stopped before reading waveform memory (trigger status {status:?})")]
    NotStopped { status: String },

    #[error("Source select echoed {reply:?}; turn channel {channel} on")]
    SourceSelectFailed { channel: u8, reply: String },

    #[error("Unexpected reply {reply:?} to {query:?}")]
    UnexpectedReply { query: String, reply: String },

    #[error("Malformed TMC block header {header:?}")]
    BadTmcHeader { header: String },

    #[error("Chunk {index}: header declares {declared} samples but body holds {actual}")]
    ChunkLengthMismatch {
        index: usize,
        declared: usize,
        actual: usize,
    },

    #[error("Recovered {actual} samples, expected memory depth {expected}")]
    DepthMismatch { expected: usize, actual: usize },

    #[error("SCPI session error: {0}")]
    Session(#[from] ScpiError),
}

/// Wire encoding of a waveform transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveformFormat {
    /// Human-readable decimal values, already in volts.
    Ascii,
    /// Unsigned byte codes needing the vertical calibration to decode.
    /// Faster, but limited to the scope's 8-bit ADC resolution.
    Byte,
}

impl WaveformFormat {
    pub fn as_scpi(&self) -> &'static str {
        match self {
            WaveformFormat::Ascii => "ASC",
            WaveformFormat::Byte => "BYTE",
        }
    }

    /// Largest sample range the scope will return in one `:WAVeform:DATA?`
    /// reply for this encoding.
    pub fn max_chunk_size(&self) -> usize {
        match self {
            WaveformFormat::Ascii => 15_625,
            WaveformFormat::Byte => 250_000,
        }
    }
}

/// Vertical calibration constants of the selected channel, queried for
/// BYTE transfers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerticalCalibration {
    pub y_increment: f64,
    pub y_origin: f64,
    pub y_reference: f64,
}

impl VerticalCalibration {
    /// Convert one raw byte code to volts.
    pub fn volts_from_code(&self, code: u8) -> f64 {
        (f64::from(code) - self.y_origin - self.y_reference) * self.y_increment
    }
}

/// Instrument state needed to plan and decode a full-depth read.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionParams {
    /// Sample rate in Sa/s.
    pub sample_rate: f64,
    /// Main timebase scale in seconds per division.
    pub timebase_scale: f64,
    /// Per-sample time increment as reported by the scope. Recorded for
    /// callers; the synthesized time axis does not consume it (see
    /// [`Waveform`]).
    pub x_increment: f64,
    /// Total samples in acquisition memory for the current settings.
    pub memory_depth: usize,
    /// Present for BYTE transfers only.
    pub vertical: Option<VerticalCalibration>,
}

/// Fixed-width header prefixed to every `:WAVeform:DATA?` reply.
///
/// Layout is `tag[2] || length[9]`: two tag bytes (`#9` on this scope)
/// followed by nine ASCII digits giving the body length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TmcHeader {
    pub tag: [u8; 2],
    pub declared_len: usize,
}

impl TmcHeader {
    pub const LEN: usize = 11;

    /// Decode the header from the front of a reply. Total for any input
    /// whose bytes [2..11] are ASCII digits.
    pub fn parse(reply: &[u8]) -> Result<Self, WaveformError> {
        let header = reply.get(..Self::LEN).ok_or_else(|| Self::bad(reply))?;

        let digits = std::str::from_utf8(&header[2..]).map_err(|_| Self::bad(header))?;
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Self::bad(header));
        }
        let declared_len = digits.parse().map_err(|_| Self::bad(header))?;

        Ok(Self {
            tag: [header[0], header[1]],
            declared_len,
        })
    }

    fn bad(bytes: &[u8]) -> WaveformError {
        WaveformError::BadTmcHeader {
            header: String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// Split `memory_depth` samples into transfer-sized chunks. Every chunk is
/// the format maximum except a final remainder chunk, omitted when the
/// depth divides evenly.
pub fn plan_chunks(memory_depth: usize, max_chunk_size: usize) -> Vec<usize> {
    let full_chunks = memory_depth / max_chunk_size;
    let remainder = memory_depth % max_chunk_size;

    let mut plan = vec![max_chunk_size; full_chunks];
    if remainder != 0 {
        plan.push(remainder);
    }
    plan
}

/// A reassembled full-depth capture.
///
/// `time` is a uniform spread of `memory_depth` points over the closed
/// interval `[0, timebase_scale * 12]`, derived from the displayed window
/// rather than the scope's reported per-sample increment. The two can
/// disagree slightly; [`AcquisitionParams::x_increment`] preserves the
/// reported value for callers that care.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Sample instants in seconds, starting at 0.
    pub time: Vec<f64>,
    /// Sample values in volts.
    pub voltage: Vec<f64>,
}

impl Waveform {
    pub fn len(&self) -> usize {
        self.voltage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voltage.is_empty()
    }

    /// Bridge to a two-column (`time`, `voltage`) DataFrame.
    pub fn to_dataframe(&self) -> Result<DataFrame, PolarsError> {
        df!(
            TIME_COLUMN_NAME => &self.time,
            VOLTAGE_COLUMN_NAME => &self.voltage,
        )
    }
}

fn time_axis(timebase_scale: f64, memory_depth: usize) -> Vec<f64> {
    let span = timebase_scale * TIMEBASE_DIVISIONS as f64;
    if memory_depth <= 1 {
        return vec![0.0; memory_depth];
    }
    let last = (memory_depth - 1) as f64;
    (0..memory_depth)
        .map(|i| span * (i as f64 / last))
        .collect()
}

/// Executes full-depth waveform reads over a borrowed session.
///
/// A read is strictly sequential: resolve the acquisition parameters, then
/// transfer and decode the chunks one round trip at a time. Exactly one
/// read may be in flight per session; any failure is terminal for the call
/// and yields no data.
pub struct WaveformReader<'a, S: ScpiSession> {
    session: &'a mut S,
}

impl<'a, S: ScpiSession> WaveformReader<'a, S> {
    pub fn new(session: &'a mut S) -> Self {
        Self { session }
    }

    /// Read the full acquisition memory of `channel` and convert it to
    /// physical units.
    pub fn fetch(&mut self, channel: u8, format: WaveformFormat) -> Result<Waveform, WaveformError> {
        let params = self.resolve(channel, format)?;
        let plan = plan_chunks(params.memory_depth, format.max_chunk_size());
        log::debug!(
            "Reading {} samples from channel {channel} in {} chunks",
            params.memory_depth,
            plan.len()
        );

        let voltage = match format {
            WaveformFormat::Ascii => self.read_ascii_chunks(&plan)?,
            WaveformFormat::Byte => {
                let calibration = params
                    .vertical
                    .expect("vertical calibration is resolved for BYTE transfers");
                self.read_byte_chunks(&plan, calibration)?
            }
        };

        if voltage.len() != params.memory_depth {
            return Err(WaveformError::DepthMismatch {
                expected: params.memory_depth,
                actual: voltage.len(),
            });
        }

        let time = time_axis(params.timebase_scale, params.memory_depth);
        Ok(Waveform { time, voltage })
    }

    /// Gather the instrument state needed to plan a full-depth read and
    /// put the scope into raw-memory transfer mode for `channel`.
    ///
    /// Fails closed: the scope must already be stopped, and the source
    /// select must echo back the requested channel (a disabled channel
    /// does not).
    pub fn resolve(
        &mut self,
        channel: u8,
        format: WaveformFormat,
    ) -> Result<AcquisitionParams, WaveformError> {
        if !(1..=2).contains(&channel) {
            return Err(WaveformError::InvalidChannel { requested: channel });
        }

        let status = self.session.query_text(":TRIGger:STATus?")?;
        if status != "STOP" {
            return Err(WaveformError::NotStopped { status });
        }

        self.session
            .send_command(&format!(":WAVeform:SOURce CHANnel{channel}"))?;
        let echoed = self.session.query_text(":WAVeform:SOURce?")?;
        if echoed != format!("CHAN{channel}") {
            return Err(WaveformError::SourceSelectFailed {
                channel,
                reply: echoed,
            });
        }

        self.session
            .send_command(&format!(":WAVeform:FORMat {}", format.as_scpi()))?;
        self.session.send_command(":WAVeform:MODE RAW")?;

        let sample_rate = self.query_f64(":ACQuire:SRATe?")?;
        let timebase_scale = self.query_f64(":TIMebase:MAIN:SCALe?")?;
        let x_increment = self.query_f64(":WAVeform:XINCrement?")?;

        let memory_depth = (sample_rate * timebase_scale * TIMEBASE_DIVISIONS as f64) as usize;

        let vertical = match format {
            WaveformFormat::Ascii => None,
            WaveformFormat::Byte => Some(VerticalCalibration {
                y_increment: self.query_f64(":WAVeform:YINCrement?")?,
                y_origin: self.query_f64(":WAVeform:YORigin?")?,
                y_reference: self.query_f64(":WAVeform:YREFerence?")?,
            }),
        };

        log::debug!(
            "Resolved: {sample_rate} Sa/s, {timebase_scale} s/div, depth {memory_depth}"
        );

        Ok(AcquisitionParams {
            sample_rate,
            timebase_scale,
            x_increment,
            memory_depth,
            vertical,
        })
    }

    fn read_ascii_chunks(&mut self, plan: &[usize]) -> Result<Vec<f64>, WaveformError> {
        let mut voltage = Vec::with_capacity(plan.iter().sum());
        let mut start = 1usize;

        for (index, &chunk_size) in plan.iter().enumerate() {
            let reply = self.query_chunk_text(index, plan.len(), start, chunk_size)?;

            let header = TmcHeader::parse(reply.as_bytes())?;
            let body = &reply[TmcHeader::LEN..];
            if body.len() != header.declared_len {
                return Err(WaveformError::ChunkLengthMismatch {
                    index,
                    declared: header.declared_len,
                    actual: body.len(),
                });
            }

            for token in body.split(',') {
                let value = token.trim().parse().map_err(|_| {
                    WaveformError::UnexpectedReply {
                        query: ":WAVeform:DATA?".to_string(),
                        reply: token.to_string(),
                    }
                })?;
                voltage.push(value);
            }

            start += chunk_size;
        }

        Ok(voltage)
    }

    fn read_byte_chunks(
        &mut self,
        plan: &[usize],
        calibration: VerticalCalibration,
    ) -> Result<Vec<f64>, WaveformError> {
        let mut voltage = Vec::with_capacity(plan.iter().sum());
        let mut start = 1usize;

        for (index, &chunk_size) in plan.iter().enumerate() {
            let reply = self.query_chunk_bytes(index, plan.len(), start, chunk_size)?;

            let header = TmcHeader::parse(&reply)?;
            let body = &reply[TmcHeader::LEN..];
            // The scope may append a message terminator after the block;
            // anything past the declared length is not sample data.
            let body = &body[..body.len().min(header.declared_len)];
            if body.len() != header.declared_len {
                return Err(WaveformError::ChunkLengthMismatch {
                    index,
                    declared: header.declared_len,
                    actual: body.len(),
                });
            }

            voltage.extend(body.iter().map(|&code| calibration.volts_from_code(code)));

            start += chunk_size;
        }

        Ok(voltage)
    }

    fn set_chunk_range(
        &mut self,
        index: usize,
        total: usize,
        start: usize,
        chunk_size: usize,
    ) -> Result<(), WaveformError> {
        // Sample addressing is 1-based, inclusive on both ends.
        let stop = start + chunk_size - 1;
        log::debug!("Chunk {}/{total}: samples {start}..={stop}", index + 1);

        self.session
            .send_command(&format!(":WAVeform:STARt {start}"))?;
        self.session
            .send_command(&format!(":WAVeform:STOP {stop}"))?;
        Ok(())
    }

    fn query_chunk_text(
        &mut self,
        index: usize,
        total: usize,
        start: usize,
        chunk_size: usize,
    ) -> Result<String, WaveformError> {
        self.set_chunk_range(index, total, start, chunk_size)?;
        Ok(self.session.query_text(":WAVeform:DATA?")?)
    }

    fn query_chunk_bytes(
        &mut self,
        index: usize,
        total: usize,
        start: usize,
        chunk_size: usize,
    ) -> Result<Vec<u8>, WaveformError> {
        self.set_chunk_range(index, total, start, chunk_size)?;
        Ok(self.session.query_bytes(":WAVeform:DATA?")?)
    }

    fn query_f64(&mut self, query: &str) -> Result<f64, WaveformError> {
        let reply = self.session.query_text(query)?;
        reply
            .parse()
            .map_err(|_| WaveformError::UnexpectedReply {
                query: query.to_string(),
                reply,
            })
    }
}
