//! Container log demultiplexing
//!
//! The daemon multiplexes stdout and stderr over one byte stream. Each frame
//! is an 8-byte header followed by its payload:
//!
//! ```text
//! [stream: u8][0, 0, 0][length: u32 big-endian][payload; length]
//! ```
//!
//! Stream 1 is stdout, stream 2 is stderr; anything else is skipped.

use bollard::container::LogOutput;

const HEADER_LEN: usize = 8;
const STREAM_STDIN: u8 = 0;
const STREAM_STDOUT: u8 = 1;
const STREAM_STDERR: u8 = 2;

/// Undecoded combined output of one container, in framed wire form
///
/// A capture built with [`RawLogCapture::with_limit`] stops growing once the
/// limit is reached; the last frame is cut short and the capture is marked
/// truncated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawLogCapture {
    bytes: Vec<u8>,
    limit: Option<usize>,
    truncated: bool,
}

impl RawLogCapture {
    /// Wrap bytes received from the daemon
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        RawLogCapture {
            bytes: bytes.into(),
            ..Default::default()
        }
    }

    /// Empty capture that holds at most `limit` bytes
    pub fn with_limit(limit: usize) -> Self {
        RawLogCapture {
            limit: Some(limit),
            ..Default::default()
        }
    }

    fn remaining(&self) -> usize {
        self.limit
            .map_or(usize::MAX, |limit| limit.saturating_sub(self.bytes.len()))
    }

    /// Append one framed chunk, cutting the payload at the limit
    pub fn push_frame(&mut self, stream: u8, payload: &[u8]) {
        if self.truncated {
            return;
        }
        let room = self.remaining();
        if room <= HEADER_LEN {
            self.truncated = true;
            return;
        }
        let kept = payload.len().min(room - HEADER_LEN);
        if kept < payload.len() {
            self.truncated = true;
        }

        self.bytes.push(stream);
        self.bytes.extend_from_slice(&[0, 0, 0]);
        self.bytes.extend_from_slice(&(kept as u32).to_be_bytes());
        self.bytes.extend_from_slice(&payload[..kept]);
    }

    /// Append one log item as delivered by the daemon client.
    ///
    /// Unframed console output (tty containers) is kept as raw bytes.
    pub fn push(&mut self, output: LogOutput) {
        match output {
            LogOutput::StdIn { message } => self.push_frame(STREAM_STDIN, &message),
            LogOutput::StdOut { message } => self.push_frame(STREAM_STDOUT, &message),
            LogOutput::StdErr { message } => self.push_frame(STREAM_STDERR, &message),
            LogOutput::Console { message } => {
                if self.truncated {
                    return;
                }
                let kept = message.len().min(self.remaining());
                if kept < message.len() {
                    self.truncated = true;
                }
                self.bytes.extend_from_slice(&message[..kept]);
            }
        }
    }

    /// Whether output was dropped because the limit was reached
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Decoded standard streams
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedLogs {
    pub stdout: String,
    pub stderr: String,
}

fn read_u32_at(data: &[u8], offset: usize) -> Option<u32> {
    let bytes: [u8; 4] = data.get(offset..offset + 4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Split a capture into stdout and stderr text.
///
/// Decoding stops quietly at a truncated trailing frame. If no stdout or
/// stderr bytes were decoded from a non-empty capture, the whole capture is
/// returned as stdout.
pub fn decode(capture: &RawLogCapture) -> DecodedLogs {
    let buffer = capture.as_bytes();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut offset = 0;

    while offset + HEADER_LEN <= buffer.len() {
        let stream = buffer[offset];
        let Some(length) = read_u32_at(buffer, offset + 4) else {
            break;
        };
        let start = offset + HEADER_LEN;
        let Some(end) = start.checked_add(length as usize) else {
            break;
        };
        if end > buffer.len() {
            break;
        }

        match stream {
            STREAM_STDOUT => stdout.extend_from_slice(&buffer[start..end]),
            STREAM_STDERR => stderr.extend_from_slice(&buffer[start..end]),
            _ => {}
        }
        offset = end;
    }

    if stdout.is_empty() && stderr.is_empty() && !buffer.is_empty() {
        return DecodedLogs {
            stdout: String::from_utf8_lossy(buffer).into_owned(),
            stderr: String::new(),
        };
    }

    DecodedLogs {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    }
}
