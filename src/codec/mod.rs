//! Codec module - per-message-type payload grammars.
//!
//! Each decoder is a pure function from payload text to a [`DeviceEvent`]
//! variant and is total: a payload that does not match its grammar degrades
//! to [`DeviceEvent::Unknown`] (whole message) or to a per-record unknown
//! (inside `J01`/`J18`), never to a failure. The layer must not throw away
//! bytes it cannot classify.
//!
//! [`encode_payload`] is the inverse surface: re-encoding a decoded event
//! produces a payload that decodes back to an equivalent event. It is also
//! what outbound command/acknowledgement framing uses.
//!
//! # Example
//!
//! ```
//! use trackwire::codec::{decode_event, encode_payload};
//! use trackwire::event::DeviceEvent;
//!
//! let event = decode_event("J12", "Heart");
//! assert_eq!(event, DeviceEvent::Heartbeat { raw: None });
//! assert_eq!(encode_payload(&event), "Heart");
//! ```

mod health;
mod location;
mod logbatch;
mod status;

use crate::event::DeviceEvent;

/// Observed `msg_type` codes.
pub mod msg_type {
    /// Location report (cell and/or GPS fixes).
    pub const LOCATION: &str = "J01";
    /// Health info segments.
    pub const HEALTH: &str = "J02";
    /// Liveness heartbeat.
    pub const HEARTBEAT: &str = "J12";
    /// Terminal status report.
    pub const STATUS: &str = "J17";
    /// Terminal log upload.
    pub const LOG_UPLOAD: &str = "J18";
    /// Command acknowledgement.
    pub const COMMAND_ACK: &str = "R03";
}

/// Canonical heartbeat payload.
pub const HEARTBEAT_PAYLOAD: &str = "Heart";

/// Decode a payload according to its message type.
pub fn decode_event(msg_type: &str, payload: &str) -> DeviceEvent {
    match msg_type {
        msg_type::LOCATION => location::decode(payload),
        msg_type::HEALTH => health::decode(payload),
        msg_type::HEARTBEAT => decode_heartbeat(payload),
        msg_type::STATUS => status::decode(payload),
        msg_type::LOG_UPLOAD => logbatch::decode(payload),
        msg_type::COMMAND_ACK => DeviceEvent::CommandAck {
            code: payload.to_string(),
        },
        _ => DeviceEvent::Unknown {
            msg_type: msg_type.to_string(),
            payload: payload.to_string(),
        },
    }
}

/// Re-encode an event to its wire payload.
pub fn encode_payload(event: &DeviceEvent) -> String {
    match event {
        DeviceEvent::LocationReport {
            fixes,
            stations,
            extra,
        } => location::encode(fixes, stations, extra.as_deref()),
        DeviceEvent::HealthInfo { segments } => health::encode(segments),
        DeviceEvent::Heartbeat { raw } => raw
            .clone()
            .unwrap_or_else(|| HEARTBEAT_PAYLOAD.to_string()),
        DeviceEvent::CommandAck { code } => code.clone(),
        DeviceEvent::StatusReport {
            phone,
            fw_version,
            hw_version,
            battery_pct,
            ..
        } => status::encode(phone, fw_version, hw_version, *battery_pct),
        DeviceEvent::LogUpload { entries } => logbatch::encode(entries),
        DeviceEvent::Unknown { payload, .. } => payload.clone(),
    }
}

/// Heartbeats carry no business data: any payload is accepted, with the raw
/// text retained for diagnostics when it is not the canonical token.
fn decode_heartbeat(payload: &str) -> DeviceEvent {
    if payload == HEARTBEAT_PAYLOAD {
        DeviceEvent::Heartbeat { raw: None }
    } else {
        DeviceEvent::Heartbeat {
            raw: Some(payload.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_canonical() {
        assert_eq!(
            decode_event("J12", "Heart"),
            DeviceEvent::Heartbeat { raw: None }
        );
    }

    #[test]
    fn test_heartbeat_nonstandard_payload_still_heartbeat() {
        let event = decode_event("J12", "beep");
        assert_eq!(
            event,
            DeviceEvent::Heartbeat {
                raw: Some("beep".to_string())
            }
        );
        assert_eq!(encode_payload(&event), "beep");
    }

    #[test]
    fn test_command_ack_verbatim() {
        let event = decode_event("R03", "009");
        assert_eq!(
            event,
            DeviceEvent::CommandAck {
                code: "009".to_string()
            }
        );
        assert_eq!(encode_payload(&event), "009");
    }

    #[test]
    fn test_unknown_type_preserved_verbatim() {
        let event = decode_event("J42", "anything|at,all#really");
        assert_eq!(
            event,
            DeviceEvent::Unknown {
                msg_type: "J42".to_string(),
                payload: "anything|at,all#really".to_string()
            }
        );
        assert_eq!(encode_payload(&event), "anything|at,all#really");
    }

    #[test]
    fn test_heartbeat_roundtrip() {
        let event = decode_event("J12", "Heart");
        let reencoded = encode_payload(&event);
        assert_eq!(decode_event("J12", &reencoded), event);
    }
}
