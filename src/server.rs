//! TCP server: accept loop, live-session registry, shutdown supervision.
//!
//! The server accepts terminal connections and spawns one [`Session`] task
//! per connection, so a stalled device never blocks the others. The only
//! cross-session structure is the [`SessionRegistry`], a concurrent map
//! keyed by connection id with a device-id index maintained at bind and
//! close, which backs collaborator-initiated command injection.
//!
//! Shutdown is cooperative: cancelling the server token stops the accept
//! loop and signals every session to enter `Closing`; the server then waits
//! for session tasks bounded by the drain timeout before aborting stragglers.
//!
//! # Example
//!
//! ```ignore
//! let server = Server::bind(ServerConfig::default(), Arc::new(JsonLogSink)).await?;
//! let handle = server.handle();
//! tokio::spawn(async move { server.run().await });
//! // later
//! handle.enqueue_command("357396080001200", Command::new("S09", "locate"))?;
//! handle.shutdown();
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::dispatch::{Command, Dispatcher, EventSink};
use crate::error::{Result, TrackwireError};
use crate::protocol::{encode_frame, TokenGenerator};
use crate::session::Session;
use crate::writer::{OutboundFrame, WriterHandle};

/// Per-connection registry entry.
struct SessionEntry {
    writer: WriterHandle,
    tokens: Arc<TokenGenerator>,
    device_id: Option<String>,
}

/// Registry of live sessions.
///
/// Insert on accept, device binding on the first valid frame, removal on
/// close. Lookups by device id serve [`ServerHandle::enqueue_command`].
pub struct SessionRegistry {
    sessions: DashMap<u64, SessionEntry>,
    devices: DashMap<String, u64>,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            devices: DashMap::new(),
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if no sessions are live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub(crate) fn register(&self, conn_id: u64, writer: WriterHandle, tokens: Arc<TokenGenerator>) {
        self.sessions.insert(
            conn_id,
            SessionEntry {
                writer,
                tokens,
                device_id: None,
            },
        );
    }

    pub(crate) fn bind_device(&self, conn_id: u64, device_id: &str) {
        if let Some(mut entry) = self.sessions.get_mut(&conn_id) {
            entry.device_id = Some(device_id.to_string());
        }
        if let Some(previous) = self.devices.insert(device_id.to_string(), conn_id) {
            if previous != conn_id {
                debug!(device_id, previous, conn_id, "device re-attached on a new connection");
            }
        }
    }

    pub(crate) fn unregister(&self, conn_id: u64) {
        if let Some((_, entry)) = self.sessions.remove(&conn_id) {
            if let Some(device_id) = entry.device_id {
                // Only drop the index if it still points at this connection:
                // the device may have already re-attached elsewhere.
                self.devices.remove_if(&device_id, |_, &bound| bound == conn_id);
            }
        }
    }

    /// Frame and enqueue a command on the device's session.
    ///
    /// # Errors
    ///
    /// [`TrackwireError::NoSuchSession`] when the device is not connected,
    /// [`TrackwireError::BackpressureTimeout`] when its outbound queue is
    /// full.
    pub fn enqueue_command(&self, device_id: &str, command: Command) -> Result<()> {
        let conn_id = self
            .devices
            .get(device_id)
            .map(|entry| *entry)
            .ok_or_else(|| TrackwireError::NoSuchSession(device_id.to_string()))?;

        let entry = self
            .sessions
            .get(&conn_id)
            .ok_or_else(|| TrackwireError::NoSuchSession(device_id.to_string()))?;

        let frame = encode_frame(
            &entry.tokens.next_token(),
            &command.msg_type,
            device_id,
            &command.payload,
        );
        entry.writer.try_send(OutboundFrame::new(frame))
    }
}

/// Accepts terminal connections and supervises their sessions.
pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    dispatcher: Dispatcher,
    registry: Arc<SessionRegistry>,
    cancel: CancellationToken,
}

impl Server {
    /// Bind the listen address and prepare the server.
    pub async fn bind(config: ServerConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).await?;
        info!(addr = %listener.local_addr()?, "listening for terminals");

        Ok(Self {
            listener,
            config: Arc::new(config),
            dispatcher: Dispatcher::new(sink),
            registry: Arc::new(SessionRegistry::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// The actual bound address (useful with an ephemeral port).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Get a handle for shutdown and command injection.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            registry: self.registry.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Run the accept loop until shutdown, then drain sessions.
    pub async fn run(self) -> Result<()> {
        let mut next_conn_id: u64 = 0;
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("shutdown requested, stopping accept loop");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            next_conn_id += 1;
                            debug!(conn_id = next_conn_id, %peer, "accepted connection");
                            let session = Session::new(
                                next_conn_id,
                                peer,
                                self.config.clone(),
                                self.dispatcher.clone(),
                                self.registry.clone(),
                                self.cancel.child_token(),
                            );
                            tasks.spawn(session.run(stream));
                        }
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
            }
        }

        // Signal every session, then wait bounded by the drain timeout.
        self.cancel.cancel();
        let drained = tokio::time::timeout(self.config.drain_timeout, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(live = self.registry.len(), "drain timeout exceeded, aborting sessions");
            tasks.shutdown().await;
        }

        info!("server stopped");
        Ok(())
    }
}

/// Cloneable handle to a running [`Server`].
#[derive(Clone)]
pub struct ServerHandle {
    registry: Arc<SessionRegistry>,
    cancel: CancellationToken,
}

impl ServerHandle {
    /// Request cooperative shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Frame and enqueue an externally-initiated command for a device.
    pub fn enqueue_command(&self, device_id: &str, command: Command) -> Result<()> {
        self.registry.enqueue_command(device_id, command)
    }

    /// Number of live sessions.
    pub fn live_sessions(&self) -> usize {
        self.registry.len()
    }
}
