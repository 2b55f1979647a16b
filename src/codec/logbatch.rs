//! `J18` log upload decoding.
//!
//! The payload is `%`-separated entries, each a `timestamp,code` pair, e.g.
//! `20160418165030,1%20160418165031,2%20160418165032,3`. A malformed entry
//! is skipped individually and never fails the message.

use crate::event::{DeviceEvent, LogEntry};

/// Decode a `J18` payload.
pub fn decode(payload: &str) -> DeviceEvent {
    let entries = payload
        .split('%')
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            entry.split_once(',').map(|(timestamp, code)| LogEntry {
                timestamp: timestamp.to_string(),
                code: code.to_string(),
            })
        })
        .collect();

    DeviceEvent::LogUpload { entries }
}

/// Re-encode a log upload payload.
pub fn encode(entries: &[LogEntry]) -> String {
    entries
        .iter()
        .map(|entry| format!("{},{}", entry.timestamp, entry.code))
        .collect::<Vec<_>>()
        .join("%")
}
