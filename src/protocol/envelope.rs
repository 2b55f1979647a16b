//! Envelope grammar: header parsing and outbound frame encoding.
//!
//! Every message travels inside a bracket-delimited text envelope:
//!
//! ```text
//! [<session_token>,<msg_type>,<body_len>,<device_id>@<payload>]
//! ```
//!
//! `body_len` is the byte length of `device_id + "@" + payload`. Observed
//! traffic treats it as advisory rather than a transport length prefix, so a
//! disagreement is reported for logging but never drops the frame.
//!
//! # Example
//!
//! ```
//! use trackwire::protocol::parse_frame;
//!
//! let frame = parse_frame(b"201707092056000253,J12,21,357396080001200@Heart").unwrap();
//! assert_eq!(frame.msg_type(), "J12");
//! assert_eq!(frame.device_id(), "357396080001200");
//! assert_eq!(frame.payload(), "Heart");
//! ```

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use thiserror::Error;

use super::frame::RawFrame;

/// Frame opening delimiter.
pub const FRAME_OPEN: u8 = b'[';

/// Frame closing delimiter.
pub const FRAME_CLOSE: u8 = b']';

/// Separator between the header fields and the payload.
pub const PAYLOAD_SEPARATOR: char = '@';

/// Exact number of comma-separated header fields.
pub const HEADER_FIELDS: usize = 4;

/// Parsed frame header.
///
/// `session_token` is an opaque vendor-assigned timestamp+sequence string,
/// kept only for echoing and ordering hints. `device_id` is the terminal's
/// hardware identifier, treated as an opaque stable key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Opaque vendor token, never reparsed.
    pub session_token: String,
    /// Message type code (e.g. `J01`, `J12`, `R03`).
    pub msg_type: String,
    /// Declared byte length of `device_id + "@" + payload` (advisory).
    pub body_len: u32,
    /// Terminal hardware identifier.
    pub device_id: String,
}

/// Non-fatal violations detected while parsing a frame body.
///
/// Both variants drop the frame and keep the session: devices are known to
/// emit empty heartbeats `[]` and malformed partials, and those are tolerated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameViolation {
    /// The frame body was empty (`[]`), a tolerated no-op.
    #[error("empty frame")]
    EmptyFrame,

    /// Header grammar violation: the frame is dropped, the session survives.
    #[error("malformed header: {0}")]
    MalformedHeader(String),
}

/// Parse a raw frame body (the bytes between `[` and `]`).
///
/// Splits on the first `@`: the left side must be exactly
/// [`HEADER_FIELDS`] comma-separated fields
/// (`session_token,msg_type,body_len,device_id`), the right side is the
/// payload, taken verbatim.
///
/// # Errors
///
/// [`FrameViolation::EmptyFrame`] for `[]`, [`FrameViolation::MalformedHeader`]
/// for non-UTF-8 bodies, a missing `@`, a wrong field count, or a non-numeric
/// `body_len`.
pub fn parse_frame(body: &[u8]) -> Result<RawFrame, FrameViolation> {
    if body.is_empty() {
        return Err(FrameViolation::EmptyFrame);
    }

    let body = std::str::from_utf8(body)
        .map_err(|_| FrameViolation::MalformedHeader("frame body is not UTF-8".to_string()))?;

    let (head, payload) = body.split_once(PAYLOAD_SEPARATOR).ok_or_else(|| {
        FrameViolation::MalformedHeader("missing '@' header/payload separator".to_string())
    })?;

    let fields: Vec<&str> = head.split(',').collect();
    if fields.len() != HEADER_FIELDS {
        return Err(FrameViolation::MalformedHeader(format!(
            "expected {} header fields, got {}",
            HEADER_FIELDS,
            fields.len()
        )));
    }

    let body_len: u32 = fields[2].parse().map_err(|_| {
        FrameViolation::MalformedHeader(format!("body_len is not an integer: {:?}", fields[2]))
    })?;

    let header = Header {
        session_token: fields[0].to_string(),
        msg_type: fields[1].to_string(),
        body_len,
        device_id: fields[3].to_string(),
    };

    Ok(RawFrame::new(header, payload.to_string()))
}

/// Encode an outbound frame using the same envelope as inbound traffic.
///
/// `body_len` is computed from the actual bytes, so outbound frames are
/// always self-consistent.
///
/// # Example
///
/// ```
/// use trackwire::protocol::encode_frame;
///
/// let frame = encode_frame("200710231200001000", "R02", "12345", "ok");
/// assert_eq!(frame, "[200710231200001000,R02,8,12345@ok]");
/// ```
pub fn encode_frame(token: &str, msg_type: &str, device_id: &str, payload: &str) -> String {
    let body_len = device_id.len() + 1 + payload.len();
    format!("[{token},{msg_type},{body_len},{device_id}{PAYLOAD_SEPARATOR}{payload}]")
}

/// Generator for outbound session tokens.
///
/// Mirrors the vendor token shape: a 14-digit `YYYYMMDDHHMMSS` timestamp
/// followed by a zero-padded 4-digit sequence number. The sequence is atomic
/// so the generator can be shared between the session task and the command
/// injection path.
#[derive(Debug, Default)]
pub struct TokenGenerator {
    seq: AtomicU32,
}

impl TokenGenerator {
    /// Create a generator starting at sequence 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the next outbound token.
    pub fn next_token(&self) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) % 10_000;
        format!("{}{:04}", Utc::now().format("%Y%m%d%H%M%S"), seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_heartbeat_frame() {
        let frame = parse_frame(b"201707092056000253,J12,21,357396080001200@Heart").unwrap();

        assert_eq!(frame.header.session_token, "201707092056000253");
        assert_eq!(frame.msg_type(), "J12");
        assert_eq!(frame.header.body_len, 21);
        assert_eq!(frame.device_id(), "357396080001200");
        assert_eq!(frame.payload(), "Heart");
        assert!(frame.length_mismatch().is_none());
    }

    #[test]
    fn test_parse_empty_frame() {
        assert_eq!(parse_frame(b""), Err(FrameViolation::EmptyFrame));
    }

    #[test]
    fn test_parse_missing_separator() {
        let err = parse_frame(b"200710231200001000,J12,5,12345").unwrap_err();
        assert!(matches!(err, FrameViolation::MalformedHeader(_)));
    }

    #[test]
    fn test_parse_wrong_field_count() {
        // Three header fields instead of four.
        let err = parse_frame(b"200710231200001000,J12,12345@Heart").unwrap_err();
        assert!(matches!(err, FrameViolation::MalformedHeader(_)));

        // Five header fields.
        let err = parse_frame(b"a,b,5,c,d@Heart").unwrap_err();
        assert!(matches!(err, FrameViolation::MalformedHeader(_)));
    }

    #[test]
    fn test_parse_non_numeric_length() {
        let err = parse_frame(b"200710231200001000,J12,abc,12345@Heart").unwrap_err();
        assert!(matches!(err, FrameViolation::MalformedHeader(_)));
    }

    #[test]
    fn test_parse_non_utf8_body() {
        let err = parse_frame(&[0xFF, 0xFE, b'@', b'x']).unwrap_err();
        assert!(matches!(err, FrameViolation::MalformedHeader(_)));
    }

    #[test]
    fn test_payload_may_contain_at_sign() {
        // Only the first '@' separates header from payload.
        let frame = parse_frame(b"t,J99,9,123@pay@load").unwrap();
        assert_eq!(frame.device_id(), "123");
        assert_eq!(frame.payload(), "pay@load");
    }

    #[test]
    fn test_length_mismatch_is_advisory() {
        // Declared 99, actual is 21. Parsing still succeeds.
        let frame = parse_frame(b"201707092056000253,J12,99,357396080001200@Heart").unwrap();
        assert_eq!(frame.length_mismatch(), Some((99, 21)));
        assert_eq!(frame.payload(), "Heart");
    }

    #[test]
    fn test_encode_frame_computes_length() {
        let frame = encode_frame("200710231200001000", "J17", "123456789012345", "ok");
        // body = "123456789012345@ok" = 18 bytes
        assert_eq!(frame, "[200710231200001000,J17,18,123456789012345@ok]");
    }

    #[test]
    fn test_encode_parse_roundtrip() {
        let encoded = encode_frame("200710231200001000", "R03", "123456789012345", "009");
        let body = &encoded.as_bytes()[1..encoded.len() - 1];
        let frame = parse_frame(body).unwrap();

        assert_eq!(frame.msg_type(), "R03");
        assert_eq!(frame.device_id(), "123456789012345");
        assert_eq!(frame.payload(), "009");
        assert!(frame.length_mismatch().is_none());
    }

    #[test]
    fn test_token_generator_shape() {
        let tokens = TokenGenerator::new();
        let token = tokens.next_token();

        assert_eq!(token.len(), 18);
        assert!(token.chars().all(|c| c.is_ascii_digit()));
        assert!(token.ends_with("0000"));
        assert!(tokens.next_token().ends_with("0001"));
    }

    #[test]
    fn test_token_generator_sequence_wraps() {
        let tokens = TokenGenerator::new();
        for _ in 0..10_000 {
            tokens.next_token();
        }
        assert!(tokens.next_token().ends_with("0000"));
    }
}
