//! Error types for trackwire.

use thiserror::Error;

/// Main error type for all trackwire operations.
///
/// Only session-fatal conditions surface here. Everything that is locally
/// recoverable (garbage between frames, malformed headers, advisory length
/// disagreements, unknown message types) is handled inside the session loop
/// and reported through structured logs instead of failing the connection.
#[derive(Debug, Error)]
pub enum TrackwireError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame buffer cap exceeded without a complete frame.
    #[error("frame buffer overflow: {buffered} bytes without a complete frame (cap {cap})")]
    FrameTooLarge { buffered: usize, cap: usize },

    /// A frame arrived carrying a device id different from the one the
    /// session is bound to.
    #[error("session bound to device {bound} received frame for {offered}")]
    DeviceRebind { bound: String, offered: String },

    /// Command injection targeted a device with no live session.
    #[error("device {0} is not connected")]
    NoSuchSession(String),

    /// Connection closed while frames were still queued for writing.
    #[error("connection closed")]
    ConnectionClosed,

    /// Outbound queue full and not draining.
    #[error("outbound queue backpressure timeout")]
    BackpressureTimeout,
}

/// Result type alias using TrackwireError.
pub type Result<T> = std::result::Result<T, TrackwireError>;
