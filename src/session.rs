//! Per-connection session: read loop, liveness, device binding.
//!
//! One session owns one connection end to end: the frame buffer, the read
//! loop and the outbound writer task. The lifecycle is
//!
//! ```text
//! Connected ──first valid header──► Identified ──close/timeout──► Closing ──► Closed
//! ```
//!
//! The device id binds permanently on the first valid header; a frame
//! carrying a different id is a protocol violation that closes the session.
//! Liveness is enforced by bounding every read with the idle timeout; any
//! bytes from the device (heartbeats included) refresh it. On `Closing` the
//! outbound queue is flushed best-effort within the drain timeout and any
//! partially-buffered frame is discarded; the device retransmits.
//!
//! Per-frame error handling: empty frames are skipped, malformed headers are
//! dropped with a warning, advisory length mismatches are logged and the
//! frame is kept. Only a frame-buffer overflow and transport errors are
//! session-fatal.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::decode_event;
use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::error::{Result, TrackwireError};
use crate::protocol::{
    encode_frame, parse_frame, FrameBuffer, FrameViolation, TokenGenerator,
};
use crate::server::SessionRegistry;
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

/// Socket read chunk size.
const READ_BUF_SIZE: usize = 8 * 1024;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, no valid frame seen yet.
    Connected,
    /// Device id bound by the first valid header.
    Identified,
    /// Read loop finished; flushing the outbound queue best-effort.
    Closing,
    /// Fully torn down and removed from the registry.
    Closed,
}

/// State and identity for one accepted connection.
pub(crate) struct Session {
    conn_id: u64,
    peer: SocketAddr,
    config: Arc<ServerConfig>,
    dispatcher: Dispatcher,
    registry: Arc<SessionRegistry>,
    cancel: CancellationToken,
}

impl Session {
    pub(crate) fn new(
        conn_id: u64,
        peer: SocketAddr,
        config: Arc<ServerConfig>,
        dispatcher: Dispatcher,
        registry: Arc<SessionRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            conn_id,
            peer,
            config,
            dispatcher,
            registry,
            cancel,
        }
    }

    /// Drive the connection until close, then tear down.
    pub(crate) async fn run<S>(self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let conn_id = self.conn_id;
        let (reader, write_half) = tokio::io::split(stream);
        let (writer, mut writer_task) = spawn_writer_task(write_half, WriterConfig::default());
        let tokens = Arc::new(TokenGenerator::new());

        self.registry.register(conn_id, writer.clone(), tokens.clone());
        debug!(conn_id, peer = %self.peer, "session connected");

        let mut state = SessionState::Connected;
        match self.read_loop(reader, &writer, &tokens, &mut state).await {
            Ok(()) => debug!(conn_id, "read loop finished"),
            Err(e) => warn!(conn_id, error = %e, "session failed"),
        }

        state = SessionState::Closing;
        debug!(conn_id, state = ?state, "session closing");

        // Remove from the registry first: its entry holds a writer handle,
        // and the channel only closes once every handle is gone.
        self.registry.unregister(conn_id);
        drop(writer);

        match tokio::time::timeout(self.config.drain_timeout, &mut writer_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => debug!(conn_id, error = %e, "outbound flush failed"),
            Ok(Err(e)) => debug!(conn_id, error = %e, "writer task panicked"),
            Err(_) => {
                writer_task.abort();
                warn!(conn_id, "drain timeout exceeded, aborting writer");
            }
        }

        state = SessionState::Closed;
        debug!(conn_id, state = ?state, "session closed");
    }

    /// Read → scan → decode → dispatch until the peer closes, the idle
    /// timeout fires, shutdown is requested, or a fatal error occurs.
    async fn read_loop<R>(
        &self,
        mut reader: R,
        writer: &WriterHandle,
        tokens: &TokenGenerator,
        state: &mut SessionState,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let conn_id = self.conn_id;
        let mut buffer = FrameBuffer::with_max_buffered(self.config.max_frame_buffer);
        let mut read_buf = vec![0u8; READ_BUF_SIZE];
        let mut device_id: Option<String> = None;

        loop {
            let read = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(conn_id, "shutdown requested");
                    return Ok(());
                }
                r = tokio::time::timeout(self.config.idle_timeout, reader.read(&mut read_buf)) => r,
            };

            let n = match read {
                Err(_) => {
                    info!(conn_id, device_id = ?device_id, "idle timeout, closing session");
                    return Ok(());
                }
                Ok(Ok(0)) => {
                    debug!(conn_id, "peer closed connection");
                    return Ok(());
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(e.into()),
            };

            buffer.append(&read_buf[..n])?;

            while let Some(body) = buffer.next_frame() {
                self.handle_frame(&body, &mut device_id, state, writer, tokens)
                    .await?;
            }

            let skipped = buffer.take_skipped();
            if skipped > 0 {
                warn!(conn_id, skipped, "framing desync: discarded bytes before frame start");
            }

            buffer.compact();
        }
    }

    /// Handle one extracted frame body: parse, bind, decode, dispatch.
    async fn handle_frame(
        &self,
        body: &[u8],
        device_id: &mut Option<String>,
        state: &mut SessionState,
        writer: &WriterHandle,
        tokens: &TokenGenerator,
    ) -> Result<()> {
        let conn_id = self.conn_id;

        let frame = match parse_frame(body) {
            Ok(frame) => frame,
            Err(FrameViolation::EmptyFrame) => {
                debug!(conn_id, "empty frame, skipping");
                return Ok(());
            }
            Err(FrameViolation::MalformedHeader(reason)) => {
                warn!(conn_id, %reason, "dropping malformed frame");
                return Ok(());
            }
        };

        if let Some((declared, actual)) = frame.length_mismatch() {
            warn!(conn_id, declared, actual, "advisory body_len mismatch");
        }

        let id = frame.device_id();
        match device_id.as_deref() {
            None => {
                self.registry.bind_device(conn_id, id);
                info!(conn_id, device_id = %id, "session identified");
                *device_id = Some(id.to_string());
                *state = SessionState::Identified;
            }
            Some(bound) if bound != id => {
                return Err(TrackwireError::DeviceRebind {
                    bound: bound.to_string(),
                    offered: id.to_string(),
                });
            }
            Some(_) => {}
        }

        let event = decode_event(frame.msg_type(), frame.payload());
        if let Some(command) = self.dispatcher.dispatch(id, event).await {
            let encoded = encode_frame(&tokens.next_token(), &command.msg_type, id, &command.payload);
            if let Err(e) = writer.send(OutboundFrame::new(encoded)).await {
                warn!(conn_id, error = %e, "failed to enqueue reply");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Command, EventSink};
    use crate::event::DeviceEvent;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::sync::mpsc;

    struct ChannelSink {
        tx: mpsc::UnboundedSender<(String, DeviceEvent)>,
        reply: Option<Command>,
    }

    #[async_trait]
    impl EventSink for ChannelSink {
        async fn on_device_event(&self, device_id: &str, event: DeviceEvent) -> Option<Command> {
            let _ = self.tx.send((device_id.to_string(), event));
            self.reply.clone()
        }
    }

    fn test_config() -> Arc<ServerConfig> {
        Arc::new(ServerConfig {
            idle_timeout: Duration::from_millis(200),
            drain_timeout: Duration::from_millis(200),
            ..ServerConfig::default()
        })
    }

    fn spawn_session(
        config: Arc<ServerConfig>,
        reply: Option<Command>,
    ) -> (
        tokio::io::DuplexStream,
        mpsc::UnboundedReceiver<(String, DeviceEvent)>,
        Arc<SessionRegistry>,
        tokio::task::JoinHandle<()>,
    ) {
        let (client, server_side) = duplex(4096);
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Arc::new(SessionRegistry::new());
        let session = Session::new(
            1,
            "127.0.0.1:9".parse().unwrap(),
            config,
            Dispatcher::new(Arc::new(ChannelSink { tx, reply })),
            registry.clone(),
            CancellationToken::new(),
        );
        let task = tokio::spawn(session.run(server_side));
        (client, rx, registry, task)
    }

    #[tokio::test]
    async fn test_heartbeat_binds_device_and_dispatches() {
        let (mut client, mut rx, registry, task) = spawn_session(test_config(), None);

        client
            .write_all(b"[201707092056000253,J12,21,357396080001200@Heart]")
            .await
            .unwrap();

        let (device, event) = rx.recv().await.unwrap();
        assert_eq!(device, "357396080001200");
        assert_eq!(event, DeviceEvent::Heartbeat { raw: None });
        assert_eq!(registry.len(), 1);

        drop(client);
        task.await.unwrap();
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_fragmented_frame_across_writes() {
        let (mut client, mut rx, _registry, _task) = spawn_session(test_config(), None);

        client.write_all(b"[20071023").await.unwrap();
        client
            .write_all(b"1200001000,J12,5,12345@Heart]")
            .await
            .unwrap();

        let (device, event) = rx.recv().await.unwrap();
        assert_eq!(device, "12345");
        assert!(event.is_heartbeat());
    }

    #[tokio::test]
    async fn test_garbage_then_frame_still_decodes() {
        let (mut client, mut rx, _registry, _task) = spawn_session(test_config(), None);

        client
            .write_all(b"xyz[201707092056000253,J12,21,357396080001200@Heart]")
            .await
            .unwrap();

        let (device, _) = rx.recv().await.unwrap();
        assert_eq!(device, "357396080001200");
    }

    #[tokio::test]
    async fn test_empty_and_malformed_frames_are_skipped() {
        let (mut client, mut rx, _registry, _task) = spawn_session(test_config(), None);

        client
            .write_all(b"[][only,three,fields@x][201707092056000253,J12,21,357396080001200@Heart]")
            .await
            .unwrap();

        // Only the heartbeat survives.
        let (device, event) = rx.recv().await.unwrap();
        assert_eq!(device, "357396080001200");
        assert!(event.is_heartbeat());
    }

    #[tokio::test]
    async fn test_rebind_closes_session() {
        let (mut client, mut rx, _registry, task) = spawn_session(test_config(), None);

        client
            .write_all(b"[t,J12,5,11111@Heart][t,J12,5,22222@Heart]")
            .await
            .unwrap();

        let (device, _) = rx.recv().await.unwrap();
        assert_eq!(device, "11111");

        // The second frame violates the binding; the session tears down
        // without dispatching it.
        task.await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sink_reply_is_framed_and_written() {
        let (mut client, mut rx, _registry, _task) =
            spawn_session(test_config(), Some(Command::new("R01", "confirmed")));

        client
            .write_all(b"[t,R03,9,12345@009]")
            .await
            .unwrap();
        rx.recv().await.unwrap();

        let mut buf = vec![0u8; 256];
        let n = client.read(&mut buf).await.unwrap();
        let reply = String::from_utf8_lossy(&buf[..n]);

        assert!(reply.starts_with('['));
        assert!(reply.ends_with(']'));
        assert!(reply.contains(",R01,15,12345@confirmed"));
    }

    #[tokio::test]
    async fn test_idle_timeout_closes_session() {
        let config = Arc::new(ServerConfig {
            idle_timeout: Duration::from_millis(50),
            drain_timeout: Duration::from_millis(100),
            ..ServerConfig::default()
        });
        let (_client, _rx, registry, task) = spawn_session(config, None);

        // No traffic at all: the session must close on its own.
        task.await.unwrap();
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_oversized_partial_frame_is_fatal() {
        let config = Arc::new(ServerConfig {
            max_frame_buffer: 32,
            idle_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_millis(100),
            ..ServerConfig::default()
        });
        let (mut client, _rx, registry, task) = spawn_session(config, None);

        // An unterminated frame far beyond the cap.
        client.write_all(b"[").await.unwrap();
        client.write_all(&[b'x'; 64]).await.unwrap();

        task.await.unwrap();
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_closes_session() {
        let (client, _rx, registry, _) = {
            let (client, server_side) = duplex(4096);
            let (tx, rx) = mpsc::unbounded_channel();
            let registry = Arc::new(SessionRegistry::new());
            let cancel = CancellationToken::new();
            let session = Session::new(
                7,
                "127.0.0.1:9".parse().unwrap(),
                test_config(),
                Dispatcher::new(Arc::new(ChannelSink { tx, reply: None })),
                registry.clone(),
                cancel.clone(),
            );
            let task = tokio::spawn(session.run(server_side));
            cancel.cancel();
            task.await.unwrap();
            (client, rx, registry, cancel)
        };

        drop(client);
        assert_eq!(registry.len(), 0);
    }
}
