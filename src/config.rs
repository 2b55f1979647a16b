//! Server configuration.
//!
//! The daemon is configured through CLI flags with environment-variable
//! fallbacks (`TRACKWIRE_*`). Library users construct [`ServerConfig`]
//! directly.

use std::time::Duration;

use clap::Parser;

use crate::protocol::DEFAULT_MAX_BUFFERED;

/// Default listen address (the port the terminal fleet dials).
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:5050";

/// Default idle timeout: a healthy terminal heartbeats well inside this.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default drain timeout on shutdown and session close.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime configuration for a [`crate::server::Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address and port to listen on.
    pub listen_addr: String,
    /// Cap on buffered bytes per session without a complete frame.
    pub max_frame_buffer: usize,
    /// Close a session after this long without any bytes from the device.
    pub idle_timeout: Duration,
    /// Bound on best-effort flushing during shutdown and session close.
    pub drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            max_frame_buffer: DEFAULT_MAX_BUFFERED,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// Command-line interface for the trackwire daemon.
#[derive(Parser, Debug)]
#[command(name = "trackwire", about = "TCP gateway for fleet tracking terminals")]
pub struct Cli {
    /// Listen address for terminal connections.
    #[arg(long, env = "TRACKWIRE_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: String,

    /// Max buffered bytes per session without a complete frame.
    #[arg(long, env = "TRACKWIRE_MAX_FRAME_BUFFER", default_value_t = DEFAULT_MAX_BUFFERED)]
    pub max_frame_buffer: usize,

    /// Idle timeout in seconds before a silent session is closed.
    #[arg(long, env = "TRACKWIRE_IDLE_TIMEOUT_SECS", default_value_t = 300)]
    pub idle_timeout_secs: u64,

    /// Drain timeout in seconds for best-effort flushing on shutdown.
    #[arg(long, env = "TRACKWIRE_DRAIN_TIMEOUT_SECS", default_value_t = 10)]
    pub drain_timeout_secs: u64,
}

impl Cli {
    /// Build a [`ServerConfig`] from the parsed flags.
    pub fn into_config(self) -> ServerConfig {
        ServerConfig {
            listen_addr: self.listen,
            max_frame_buffer: self.max_frame_buffer,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:5050");
        assert_eq!(config.max_frame_buffer, 64 * 1024);
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
        assert_eq!(config.drain_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_cli_into_config() {
        let cli = Cli::parse_from([
            "trackwire",
            "--listen",
            "127.0.0.1:6000",
            "--idle-timeout-secs",
            "60",
        ]);
        let config = cli.into_config();

        assert_eq!(config.listen_addr, "127.0.0.1:6000");
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.drain_timeout, Duration::from_secs(10));
    }
}
