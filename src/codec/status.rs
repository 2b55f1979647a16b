//! `J17` status report decoding.
//!
//! The payload is `%`-separated into exactly four fields:
//! `phone%fw_version%hw_version%battery_pct`, e.g.
//! `13501530329%1.0.0%1.0.0%100`. An out-of-range battery value is clamped
//! to 0..=100 and flagged rather than rejected; a payload that does not
//! match the grammar at all degrades to [`DeviceEvent::Unknown`].

use crate::event::DeviceEvent;

/// Number of `%`-separated fields in a status report.
const STATUS_FIELDS: usize = 4;

/// Decode a `J17` payload.
pub fn decode(payload: &str) -> DeviceEvent {
    let fields: Vec<&str> = payload.split('%').collect();
    if fields.len() != STATUS_FIELDS {
        return unknown(payload);
    }

    let raw_battery: i64 = match fields[3].parse() {
        Ok(v) => v,
        Err(_) => return unknown(payload),
    };

    let battery_pct = raw_battery.clamp(0, 100) as u8;

    DeviceEvent::StatusReport {
        phone: fields[0].to_string(),
        fw_version: fields[1].to_string(),
        hw_version: fields[2].to_string(),
        battery_pct,
        battery_clamped: i64::from(battery_pct) != raw_battery,
    }
}

/// Re-encode a status report payload.
pub fn encode(phone: &str, fw_version: &str, hw_version: &str, battery_pct: u8) -> String {
    format!("{phone}%{fw_version}%{hw_version}%{battery_pct}")
}

fn unknown(payload: &str) -> DeviceEvent {
    DeviceEvent::Unknown {
        msg_type: super::msg_type::STATUS.to_string(),
        payload: payload.to_string(),
    }
}
