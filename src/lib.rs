//! # trackwire
//!
//! TCP gateway for fleet tracking terminals speaking a bracket-framed text
//! telemetry protocol.
//!
//! Terminals hold long-lived plaintext TCP connections and push location
//! fixes, health pings, heartbeats, status reports, log batches and command
//! acknowledgements, each as a self-delimited text frame:
//!
//! ```text
//! [<session_token>,<msg_type>,<body_len>,<device_id>@<payload>]
//! ```
//!
//! ## Architecture
//!
//! - **Protocol layer** ([`protocol`]): incremental frame extraction from an
//!   arbitrarily-fragmented byte stream, with resynchronization on garbage,
//!   plus header parsing and outbound envelope encoding.
//! - **Codec layer** ([`codec`]): pure per-message-type payload decoders
//!   producing [`event::DeviceEvent`] values; unclassifiable bytes are
//!   preserved, never dropped.
//! - **Session layer** ([`session`], [`server`]): one task per connection
//!   driving read → scan → decode → dispatch, with device binding, idle
//!   timeout, a serialized per-connection outbound queue and cooperative
//!   shutdown.
//! - **Collaborator seam** ([`dispatch`]): decoded events are handed by
//!   value to an [`dispatch::EventSink`]; replies and externally-initiated
//!   commands travel back through the session's writer.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use trackwire::{config::ServerConfig, dispatch::JsonLogSink, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> trackwire::Result<()> {
//!     let server = Server::bind(ServerConfig::default(), Arc::new(JsonLogSink)).await?;
//!     server.run().await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod protocol;
pub mod server;
pub mod session;
pub mod writer;

pub use config::ServerConfig;
pub use dispatch::{Command, EventSink, JsonLogSink};
pub use error::{Result, TrackwireError};
pub use event::DeviceEvent;
pub use server::{Server, ServerHandle};
