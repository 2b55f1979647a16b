//! Decoded device events.
//!
//! [`DeviceEvent`] is the tagged union handed to the external collaborator:
//! one variant per message family, keyed on the wire by its `msg_type` code.
//! Payload dialects vary per terminal firmware, so several variants are
//! deliberately type-erased (ordered sequences of ordered field sequences)
//! rather than carrying semantic field names the traffic does not evidence.
//!
//! Events serialize to JSON for the device-management intake; coordinates
//! and timestamps stay as strings so re-encoding to the wire is lossless.

use serde::Serialize;

/// A decoded message from a terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// `J01` - one or more positional/cell-signal fixes.
    LocationReport {
        /// Ordered fix records.
        fixes: Vec<Fix>,
        /// Auxiliary station-scan entries (e.g. wifi MAC/RSSI/SSID rows),
        /// kept opaque.
        stations: Vec<Vec<String>>,
        /// Trailing `#`-separated ancillary counters, kept opaque.
        extra: Option<Vec<String>>,
    },

    /// `J02` - health segments, dialect-dependent field counts.
    HealthInfo { segments: Vec<Vec<String>> },

    /// `J12` - liveness only. `raw` is `None` for the canonical `Heart`
    /// payload; anything else is retained for diagnostics.
    Heartbeat { raw: Option<String> },

    /// `R03` - acknowledgement of an outstanding command, code verbatim.
    CommandAck { code: String },

    /// `J17` - terminal identity and battery status.
    StatusReport {
        phone: String,
        fw_version: String,
        hw_version: String,
        /// Battery percentage, clamped to 0..=100.
        battery_pct: u8,
        /// Set when the raw value was out of range and got clamped.
        battery_clamped: bool,
    },

    /// `J18` - batched terminal log entries.
    LogUpload { entries: Vec<LogEntry> },

    /// Forward-compatible catch-all: unclassified bytes are never dropped.
    Unknown { msg_type: String, payload: String },
}

/// A single record inside a `J01` location report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "fix", rename_all = "snake_case")]
pub enum Fix {
    /// Cell-tower dialect: comma-separated fields, optionally terminated by
    /// an embedded `T<timestamp>` marker. Fields are opaque; a record that
    /// is only a timestamp marker has no fields.
    Cell {
        fields: Vec<String>,
        timestamp: Option<String>,
    },

    /// GPS dialect: `<flag><hem><lon><hem><lat>T<timestamp>`.
    Gps {
        flag: String,
        lon_hemisphere: char,
        longitude: String,
        lat_hemisphere: char,
        latitude: String,
        timestamp: String,
    },

    /// Unrecognized record shape, preserved verbatim.
    Unknown { raw: String },
}

/// One `timestamp,code` pair from a `J18` log upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub code: String,
}

impl DeviceEvent {
    /// The wire `msg_type` code this event encodes to.
    pub fn msg_type(&self) -> &str {
        match self {
            DeviceEvent::LocationReport { .. } => crate::codec::msg_type::LOCATION,
            DeviceEvent::HealthInfo { .. } => crate::codec::msg_type::HEALTH,
            DeviceEvent::Heartbeat { .. } => crate::codec::msg_type::HEARTBEAT,
            DeviceEvent::CommandAck { .. } => crate::codec::msg_type::COMMAND_ACK,
            DeviceEvent::StatusReport { .. } => crate::codec::msg_type::STATUS,
            DeviceEvent::LogUpload { .. } => crate::codec::msg_type::LOG_UPLOAD,
            DeviceEvent::Unknown { msg_type, .. } => msg_type,
        }
    }

    /// Check if this is a liveness-only message.
    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, DeviceEvent::Heartbeat { .. })
    }
}
