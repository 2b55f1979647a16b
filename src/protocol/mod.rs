//! Protocol module - envelope grammar, framing, and frame types.
//!
//! This module implements the text wire protocol:
//! - bracket-delimited frame extraction with resynchronization
//! - four-field header parsing and outbound envelope encoding
//! - [`RawFrame`] with typed accessors

mod envelope;
mod frame;
mod frame_buffer;

pub use envelope::{
    encode_frame, parse_frame, FrameViolation, Header, TokenGenerator, FRAME_CLOSE, FRAME_OPEN,
    HEADER_FIELDS, PAYLOAD_SEPARATOR,
};
pub use frame::RawFrame;
pub use frame_buffer::{FrameBuffer, DEFAULT_MAX_BUFFERED};
