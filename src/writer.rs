//! Dedicated writer task for the per-session outbound queue.
//!
//! Each session owns exactly one writer task fed by an mpsc channel. Frames
//! are written in channel order, so writes are serialized per connection and
//! never interleaved:
//!
//! ```text
//! Session loop ──┐
//! Dispatcher  ───┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Socket
//! Command path ──┘
//! ```
//!
//! A pending-frame counter provides backpressure: producers wait (bounded by
//! a timeout) when a slow device stops draining its socket, instead of
//! buffering without limit. Closing the channel lets the task drain what is
//! queued and exit, which is the session's best-effort flush on `Closing`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, TrackwireError};

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 256;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum frames flushed together in one pass.
const MAX_BATCH_SIZE: usize = 32;

/// A fully-encoded frame ready to be written to the socket.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Complete envelope bytes, delimiters included.
    pub bytes: Bytes,
}

impl OutboundFrame {
    /// Create an outbound frame from an encoded envelope.
    pub fn new(frame: String) -> Self {
        Self {
            bytes: Bytes::from(frame),
        }
    }

    /// Frame size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the frame is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum pending frames before backpressure kicks in.
    pub max_pending_frames: usize,
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Handle for enqueueing frames on the writer task.
///
/// Cheaply cloneable; shared by the session loop and the command-injection
/// path. Dropping every handle closes the channel, which drains the queue
/// and ends the task.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    timeout: Duration,
}

impl WriterHandle {
    fn new(
        tx: mpsc::Sender<OutboundFrame>,
        pending: Arc<AtomicUsize>,
        max_pending: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            tx,
            pending,
            max_pending,
            timeout,
        }
    }

    /// Enqueue a frame, waiting out backpressure up to the configured
    /// timeout.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            self.wait_for_backpressure().await?;
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(frame).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            TrackwireError::ConnectionClosed
        })
    }

    /// Enqueue a frame without waiting.
    ///
    /// Returns [`TrackwireError::BackpressureTimeout`] immediately when the
    /// queue is at capacity. Used by the command-injection path, which must
    /// not block the collaborator on a stalled device.
    pub fn try_send(&self, frame: OutboundFrame) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            return Err(TrackwireError::BackpressureTimeout);
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.try_send(frame).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => TrackwireError::BackpressureTimeout,
                mpsc::error::TrySendError::Closed(_) => TrackwireError::ConnectionClosed,
            }
        })
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Get the current pending frame count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    async fn wait_for_backpressure(&self) -> Result<()> {
        let start = Instant::now();
        let check_interval = Duration::from_micros(100);

        loop {
            if self.pending.load(Ordering::Acquire) < self.max_pending {
                return Ok(());
            }

            if start.elapsed() > self.timeout {
                return Err(TrackwireError::BackpressureTimeout);
            }

            tokio::time::sleep(check_interval).await;
        }
    }
}

/// Spawn the writer task and return a handle for enqueueing frames.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(
        tx,
        pending.clone(),
        config.max_pending_frames,
        config.backpressure_timeout,
    );

    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

/// Main writer loop - receives frames and writes them in order.
///
/// Ready frames are gathered into a batch and flushed once, so a burst of
/// small acknowledgements costs one flush instead of one per frame.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(f) => f,
            None => return Ok(()), // Channel closed and drained, clean shutdown.
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        for frame in &batch {
            writer.write_all(&frame.bytes).await?;
        }
        writer.flush().await?;

        pending.fetch_sub(batch.len(), Ordering::Release);
    }
}
