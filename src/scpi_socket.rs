use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Port of the raw-socket SCPI service on DS1000Z-series scopes.
pub const DEFAULT_SCPI_PORT: u16 = 5555;

#[derive(Debug, thiserror::Error)]
pub enum ScpiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No usable socket address for host {host:?}")]
    AddressResolution { host: String },

    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Malformed definite-length block header in reply to {command:?}")]
    BadBlockHeader { command: String },
}

/// Blocking request/response session with an instrument.
///
/// One command or query is one round trip; the next request must not be
/// issued until the previous reply has fully returned. Implementations own
/// the link, callers own the sequencing.
pub trait ScpiSession {
    /// Send a command that produces no reply.
    fn send_command(&mut self, command: &str) -> Result<(), ScpiError>;

    /// Send a query and read the newline-terminated reply, trimmed.
    fn query_text(&mut self, command: &str) -> Result<String, ScpiError>;

    /// Send a query and read the raw reply bytes.
    ///
    /// Definite-length block replies (`#<n><length><body>`) are returned
    /// complete, header included; the caller validates the header.
    fn query_bytes(&mut self, command: &str) -> Result<Vec<u8>, ScpiError>;
}

/// TCP client for the scope's SCPI service.
pub struct ScpiSocket {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl ScpiSocket {
    /// Open a connection to `host:port` with `timeout` applied to the
    /// connect itself and to every subsequent read and write.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, ScpiError> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ScpiError::AddressResolution {
                host: host.to_string(),
            })?;

        log::debug!("Connecting to {addr}");
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { stream, reader })
    }

    fn write_line(&mut self, command: &str) -> Result<(), ScpiError> {
        self.stream.write_all(command.as_bytes())?;
        self.stream.write_all(b"\n")?;
        self.stream.flush()?;
        Ok(())
    }
}

impl ScpiSession for ScpiSocket {
    fn send_command(&mut self, command: &str) -> Result<(), ScpiError> {
        self.write_line(command)
    }

    fn query_text(&mut self, command: &str) -> Result<String, ScpiError> {
        self.write_line(command)?;

        let mut reply = Vec::new();
        self.reader.read_until(b'\n', &mut reply)?;
        let reply = String::from_utf8(reply)?;
        Ok(reply.trim().to_string())
    }

    fn query_bytes(&mut self, command: &str) -> Result<Vec<u8>, ScpiError> {
        self.write_line(command)?;
        read_definite_length_block(&mut self.reader, command)
    }
}

/// Read one binary reply, using IEEE 488.2 definite-length block framing to
/// find the end of the message.
///
/// Replies that do not start with `#` fall back to newline framing. The
/// returned buffer contains the complete block, header included, without
/// the trailing message terminator.
fn read_definite_length_block(
    reader: &mut impl BufRead,
    command: &str,
) -> Result<Vec<u8>, ScpiError> {
    let mut first = [0u8; 1];
    reader.read_exact(&mut first)?;

    if first[0] != b'#' {
        let mut reply = vec![first[0]];
        reader.read_until(b'\n', &mut reply)?;
        while matches!(reply.last(), Some(b'\n' | b'\r')) {
            reply.pop();
        }
        return Ok(reply);
    }

    let mut digit_count = [0u8; 1];
    reader.read_exact(&mut digit_count)?;
    if !digit_count[0].is_ascii_digit() {
        return Err(ScpiError::BadBlockHeader {
            command: command.to_string(),
        });
    }

    let mut digits = vec![0u8; usize::from(digit_count[0] - b'0')];
    reader.read_exact(&mut digits)?;
    let body_len: usize = std::str::from_utf8(&digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ScpiError::BadBlockHeader {
            command: command.to_string(),
        })?;

    let mut block = Vec::with_capacity(2 + digits.len() + body_len);
    block.push(b'#');
    block.push(digit_count[0]);
    block.extend_from_slice(&digits);

    let body_start = block.len();
    block.resize(body_start + body_len, 0);
    reader.read_exact(&mut block[body_start..])?;

    // The scope terminates the message with a newline after the block.
    if let Ok(buffered) = reader.fill_buf() {
        if buffered.first() == Some(&b'\n') {
            reader.consume(1);
        }
    }

    Ok(block)
}

#[cfg(test)]
pub(crate) mod mock {
    use super::{ScpiError, ScpiSession};
    use std::collections::VecDeque;

    /// One scripted round trip: the exact command the code under test must
    /// send, and the reply the fake scope returns.
    #[derive(Debug)]
    pub enum Exchange {
        Command(&'static str),
        QueryText(&'static str, String),
        QueryBytes(&'static str, Vec<u8>),
    }

    /// Session replaying a fixed transcript, asserting command order and
    /// content. Any traffic past the end of the script is a test failure.
    #[derive(Debug, Default)]
    pub struct MockSession {
        script: VecDeque<Exchange>,
    }

    impl MockSession {
        pub fn new(script: Vec<Exchange>) -> Self {
            Self {
                script: script.into(),
            }
        }

        pub fn assert_exhausted(&self) {
            assert!(
                self.script.is_empty(),
                "unused exchanges left in script: {:?}",
                self.script
            );
        }

        fn next(&mut self, sent: &str) -> Exchange {
            self.script
                .pop_front()
                .unwrap_or_else(|| unreachable!("session received {sent:?} past end of script"))
        }
    }

    impl ScpiSession for MockSession {
        fn send_command(&mut self, command: &str) -> Result<(), ScpiError> {
            match self.next(command) {
                Exchange::Command(expected) => {
                    assert_eq!(command, expected);
                    Ok(())
                }
                other => unreachable!("expected {other:?}, got command {command:?}"),
            }
        }

        fn query_text(&mut self, command: &str) -> Result<String, ScpiError> {
            match self.next(command) {
                Exchange::QueryText(expected, reply) => {
                    assert_eq!(command, expected);
                    Ok(reply)
                }
                other => unreachable!("expected {other:?}, got text query {command:?}"),
            }
        }

        fn query_bytes(&mut self, command: &str) -> Result<Vec<u8>, ScpiError> {
            match self.next(command) {
                Exchange::QueryBytes(expected, reply) => {
                    assert_eq!(command, expected);
                    Ok(reply)
                }
                other => unreachable!("expected {other:?}, got bytes query {command:?}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_block_read_returns_header_and_body() {
        let mut reader = Cursor::new(b"#9000000004abcd\n".to_vec());
        let block = read_definite_length_block(&mut reader, ":WAVeform:DATA?").unwrap();
        assert_eq!(block, b"#9000000004abcd");
        // Terminator consumed as well
        assert_eq!(reader.position() as usize, 16);
    }

    #[test]
    fn test_block_read_without_terminator() {
        let mut reader = Cursor::new(b"#9000000002hi".to_vec());
        let block = read_definite_length_block(&mut reader, ":WAVeform:DATA?").unwrap();
        assert_eq!(block, b"#9000000002hi");
    }

    #[test]
    fn test_non_block_reply_falls_back_to_line_framing() {
        let mut reader = Cursor::new(b"STOP\r\n".to_vec());
        let block = read_definite_length_block(&mut reader, ":TRIGger:STATus?").unwrap();
        assert_eq!(block, b"STOP");
    }

    #[test]
    fn test_bad_digit_count_is_rejected() {
        let mut reader = Cursor::new(b"#x123".to_vec());
        let err = read_definite_length_block(&mut reader, ":WAVeform:DATA?").unwrap_err();
        assert!(matches!(err, ScpiError::BadBlockHeader { .. }));
    }

    #[test]
    fn test_truncated_body_is_an_io_error() {
        let mut reader = Cursor::new(b"#9000000010short".to_vec());
        let err = read_definite_length_block(&mut reader, ":WAVeform:DATA?").unwrap_err();
        assert!(matches!(err, ScpiError::Io(_)));
    }
}
