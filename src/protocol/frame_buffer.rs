//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for buffer management. Frames are text, delimited
//! by `[` and `]` with no nesting, so extraction is a forward scan rather
//! than a length-prefixed state machine:
//!
//! - bytes before the next `[` are garbage from a desynchronized stream;
//!   they are discarded and accounted so the session can log the resync
//! - a `[` without a matching `]` is a partial frame; it is retained
//!   untouched until more data arrives
//!
//! The buffer owns a read cursor: bytes before the cursor are consumed or
//! discarded garbage, bytes from the cursor to the end are unconsumed.
//! [`FrameBuffer::compact`] physically drops the consumed prefix and is
//! called once per read cycle, not per frame, to avoid quadratic behavior on
//! long-lived connections.
//!
//! # Example
//!
//! ```
//! use trackwire::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! // Data arrives in arbitrary chunks from the socket.
//! buffer.append(b"[20071023").unwrap();
//! assert!(buffer.next_frame().is_none());
//!
//! buffer.append(b"1200001000,J12,5,12345@Heart]").unwrap();
//! let body = buffer.next_frame().unwrap();
//! assert_eq!(&body[..], b"200710231200001000,J12,5,12345@Heart");
//! ```

use bytes::{Bytes, BytesMut};

use super::envelope::{FRAME_CLOSE, FRAME_OPEN};
use crate::error::{Result, TrackwireError};

/// Default cap on unconsumed buffered bytes per session (64 KiB).
pub const DEFAULT_MAX_BUFFERED: usize = 64 * 1024;

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buf: BytesMut,
    /// Read cursor: everything before it is consumed or discarded garbage.
    cursor: usize,
    /// Cap on unconsumed bytes without a complete frame.
    max_buffered: usize,
    /// Garbage bytes discarded since the last [`FrameBuffer::take_skipped`].
    skipped: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default cap.
    pub fn new() -> Self {
        Self::with_max_buffered(DEFAULT_MAX_BUFFERED)
    }

    /// Create a new frame buffer with a custom cap on unconsumed bytes.
    pub fn with_max_buffered(max_buffered: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(8 * 1024),
            cursor: 0,
            max_buffered,
            skipped: 0,
        }
    }

    /// Append bytes read from the socket.
    ///
    /// # Errors
    ///
    /// Returns [`TrackwireError::FrameTooLarge`] when the unconsumed region
    /// exceeds the cap without containing a single complete frame. A burst
    /// that momentarily exceeds the cap but holds an extractable frame is
    /// accepted: the session drains frames after every append.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(data);

        if self.unconsumed() > self.max_buffered && !self.has_complete_frame() {
            return Err(TrackwireError::FrameTooLarge {
                buffered: self.unconsumed(),
                cap: self.max_buffered,
            });
        }

        Ok(())
    }

    /// Try to extract the next complete frame body.
    ///
    /// Returns the bytes between `[` and `]` (exclusive) and advances the
    /// cursor past the closing delimiter, or `None` when no complete frame
    /// is buffered. Garbage before the frame start is discarded and added to
    /// the skipped-byte counter; a trailing partial frame is always retained.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        let unread = &self.buf[self.cursor..];

        let open = match unread.iter().position(|&b| b == FRAME_OPEN) {
            Some(pos) => pos,
            None => {
                // No frame start anywhere: the whole region is garbage.
                self.skipped += unread.len();
                self.cursor = self.buf.len();
                return None;
            }
        };

        // Resynchronize on the frame start.
        self.skipped += open;
        self.cursor += open;

        let after_open = &self.buf[self.cursor + 1..];
        let close = after_open.iter().position(|&b| b == FRAME_CLOSE)?;

        let start = self.cursor + 1;
        let body = Bytes::copy_from_slice(&self.buf[start..start + close]);
        self.cursor = start + close + 1;
        Some(body)
    }

    /// Drain the count of garbage bytes discarded during resynchronization.
    ///
    /// The session reads this once per drain cycle and logs a framing-desync
    /// event when it is non-zero.
    pub fn take_skipped(&mut self) -> usize {
        std::mem::take(&mut self.skipped)
    }

    /// Physically drop consumed bytes before the cursor.
    ///
    /// Never discards unconsumed bytes: the next frame extracted after a
    /// compaction is the same as before it.
    pub fn compact(&mut self) {
        if self.cursor > 0 {
            let _ = self.buf.split_to(self.cursor);
            self.cursor = 0;
        }
    }

    /// Number of unconsumed buffered bytes.
    #[inline]
    pub fn unconsumed(&self) -> usize {
        self.buf.len() - self.cursor
    }

    /// Check if the buffer has no unconsumed bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.unconsumed() == 0
    }

    /// True when the unconsumed region contains at least one complete frame.
    fn has_complete_frame(&self) -> bool {
        let unread = &self.buf[self.cursor..];
        match unread.iter().position(|&b| b == FRAME_OPEN) {
            Some(open) => unread[open + 1..].contains(&FRAME_CLOSE),
            None => false,
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
