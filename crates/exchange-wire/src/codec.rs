//! Request framing and incremental response decoding.
//!
//! Requests are always framed as `<decimal length>\n<payload>`, where the
//! length is the UTF-8 byte length of the payload.
//!
//! Responses are recognized by one of three [`CompletionMode`]s:
//!
//! | Mode            | Complete when                                        |
//! |-----------------|------------------------------------------------------|
//! | `marker`        | the buffer contains `</results>`                     |
//! | `length-prefix` | `length` payload bytes followed the `length\n` line  |
//! | `auto`          | length prefix if the response starts with one, marker otherwise |
//!
//! The marker check is a substring scan, not an XML parse: it says the
//! response is good enough to classify, not that it is well formed.

use exchange_types::RESULTS_MARKER;
use serde::{Deserialize, Serialize};

/// Largest response frame accepted before the decoder gives up.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// More digits than this cannot be a length prefix (`u64::MAX` has 20).
const MAX_PREFIX_DIGITS: usize = 20;

/// Frame an XML body for the wire.
pub fn encode(xml_body: &str) -> Vec<u8> {
    let body = xml_body.as_bytes();
    let header = format!("{}\n", body.len());
    let mut framed = Vec::with_capacity(header.len() + body.len());
    framed.extend_from_slice(header.as_bytes());
    framed.extend_from_slice(body);
    framed
}

/// Result of feeding bytes to a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// More bytes are needed. The new bytes were appended to the buffer.
    Incomplete,
    /// A response was recognized. The buffer has been drained; any bytes
    /// past the end of the response are returned in `remaining`.
    Complete {
        payload: Vec<u8>,
        remaining: Vec<u8>,
    },
    /// The bytes cannot become a valid response.
    ///
    /// `consumed` is true only when the whole malformed frame was read, so
    /// the stream is positioned at the start of the next response. When it
    /// is false, the rest of the frame may still be in flight.
    FramingError { reason: String, consumed: bool },
}

impl DecodeResult {
    fn unconsumed(reason: String) -> Self {
        DecodeResult::FramingError {
            reason,
            consumed: false,
        }
    }
}

/// Accumulates stream bytes until a complete response is recognized.
///
/// Decoders keep no state of their own; everything received so far lives
/// in the caller's buffer.
pub trait FrameDecoder: Send + Sync {
    fn decode_incremental(&self, buffer: &mut Vec<u8>, new_bytes: &[u8]) -> DecodeResult;
}

/// How the end of a response is recognized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompletionMode {
    /// Honor a leading length prefix, otherwise scan for the marker.
    #[default]
    Auto,
    /// Scan for the terminal marker only.
    Marker,
    /// Require a length prefix and read exactly that many bytes.
    LengthPrefix,
}

impl std::fmt::Display for CompletionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionMode::Auto => write!(f, "auto"),
            CompletionMode::Marker => write!(f, "marker"),
            CompletionMode::LengthPrefix => write!(f, "length-prefix"),
        }
    }
}

/// The response decoder used by connections.
#[derive(Debug, Clone)]
pub struct ResponseDecoder {
    mode: CompletionMode,
    marker: Vec<u8>,
    max_frame_len: usize,
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        Self::new(CompletionMode::default())
    }
}

impl ResponseDecoder {
    pub fn new(mode: CompletionMode) -> Self {
        Self {
            mode,
            marker: RESULTS_MARKER.as_bytes().to_vec(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Use a different terminal marker.
    pub fn with_marker(mut self, marker: impl Into<Vec<u8>>) -> Self {
        self.marker = marker.into();
        self
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn mode(&self) -> CompletionMode {
        self.mode
    }

    fn decode_length_prefixed(
        &self,
        buffer: &mut Vec<u8>,
        header_len: usize,
        payload_len: usize,
        require_marker: bool,
    ) -> DecodeResult {
        if payload_len > self.max_frame_len {
            buffer.clear();
            return DecodeResult::unconsumed(format!(
                "response length {payload_len} exceeds limit of {} bytes",
                self.max_frame_len
            ));
        }
        let frame_end = header_len + payload_len;
        if buffer.len() < frame_end {
            return DecodeResult::Incomplete;
        }
        let remaining = buffer.split_off(frame_end);
        let payload = buffer.split_off(header_len);
        buffer.clear();

        if require_marker && find(&payload, &self.marker, 0).is_none() {
            return DecodeResult::FramingError {
                reason: format!(
                    "{payload_len}-byte response does not contain {}",
                    String::from_utf8_lossy(&self.marker)
                ),
                consumed: true,
            };
        }
        DecodeResult::Complete { payload, remaining }
    }

    fn decode_marker(&self, buffer: &mut Vec<u8>, scan_from: usize) -> DecodeResult {
        // Back up so a marker split across chunks is still found.
        let start = scan_from.saturating_sub(self.marker.len().saturating_sub(1));
        match find(buffer, &self.marker, start) {
            Some(pos) => {
                let end = pos + self.marker.len();
                let body_start = match parse_prefix(buffer) {
                    Prefix::Present { header_len, .. } if header_len <= pos => header_len,
                    _ => 0,
                };
                let remaining = buffer.split_off(end);
                let payload = buffer.split_off(body_start);
                buffer.clear();
                DecodeResult::Complete { payload, remaining }
            }
            None if buffer.len() > self.max_frame_len => {
                let len = buffer.len();
                buffer.clear();
                DecodeResult::unconsumed(format!(
                    "no {} within {len} bytes",
                    String::from_utf8_lossy(&self.marker)
                ))
            }
            None => DecodeResult::Incomplete,
        }
    }
}

impl FrameDecoder for ResponseDecoder {
    fn decode_incremental(&self, buffer: &mut Vec<u8>, new_bytes: &[u8]) -> DecodeResult {
        let scan_from = buffer.len();
        buffer.extend_from_slice(new_bytes);

        match self.mode {
            CompletionMode::Marker => self.decode_marker(buffer, scan_from),
            CompletionMode::LengthPrefix => match parse_prefix(buffer) {
                Prefix::NeedMore => DecodeResult::Incomplete,
                Prefix::Present {
                    header_len,
                    payload_len,
                } => self.decode_length_prefixed(buffer, header_len, payload_len, false),
                Prefix::Absent(reason) | Prefix::Invalid(reason) => {
                    buffer.clear();
                    DecodeResult::unconsumed(reason)
                }
            },
            CompletionMode::Auto => match parse_prefix(buffer) {
                Prefix::NeedMore => DecodeResult::Incomplete,
                Prefix::Present {
                    header_len,
                    payload_len,
                } => self.decode_length_prefixed(buffer, header_len, payload_len, true),
                Prefix::Absent(_) | Prefix::Invalid(_) => self.decode_marker(buffer, scan_from),
            },
        }
    }
}

/// What the start of a buffer says about a length prefix.
#[derive(Debug, PartialEq, Eq)]
enum Prefix {
    /// Only digits so far; the line is not finished.
    NeedMore,
    /// `digits\n` (or `digits\r\n`).
    Present {
        header_len: usize,
        payload_len: usize,
    },
    /// The buffer does not start with a length line.
    Absent(String),
    /// Starts like a length line but cannot be one.
    Invalid(String),
}

fn parse_prefix(buffer: &[u8]) -> Prefix {
    let digits = buffer.iter().take_while(|b| b.is_ascii_digit()).count();
    if buffer.is_empty() {
        return Prefix::NeedMore;
    }
    if digits == 0 {
        return Prefix::Absent(format!(
            "expected length prefix, found byte 0x{:02x}",
            buffer[0]
        ));
    }
    if digits > MAX_PREFIX_DIGITS {
        return Prefix::Invalid(format!("length prefix longer than {MAX_PREFIX_DIGITS} digits"));
    }

    let header_len = match &buffer[digits..] {
        [] => return Prefix::NeedMore,
        [b'\n', ..] => digits + 1,
        [b'\r'] => return Prefix::NeedMore,
        [b'\r', b'\n', ..] => digits + 2,
        [other, ..] => {
            return Prefix::Absent(format!(
                "length prefix followed by byte 0x{other:02x} instead of newline"
            ))
        }
    };

    // Digits only, so the slice is valid UTF-8.
    let text = String::from_utf8_lossy(&buffer[..digits]);
    match text.parse::<usize>() {
        Ok(payload_len) => Prefix::Present {
            header_len,
            payload_len,
        },
        Err(e) => Prefix::Invalid(format!("length prefix '{text}' is not a valid size: {e}")),
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() || haystack.len() - from < needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}
