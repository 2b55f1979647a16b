//! `J02` health info decoding.
//!
//! The payload is one or more `#`-separated segments, each a comma-separated
//! field list, e.g. `1,20161210175403,2880,1#1,20161214175403,2800,2`.
//! Segment and field counts vary by firmware dialect, so everything is kept
//! as ordered sequences of ordered field sequences.

use crate::event::DeviceEvent;

/// Decode a `J02` payload.
pub fn decode(payload: &str) -> DeviceEvent {
    if payload.is_empty() {
        return DeviceEvent::HealthInfo { segments: vec![] };
    }

    let segments = payload
        .split('#')
        .map(|segment| segment.split(',').map(str::to_string).collect())
        .collect();

    DeviceEvent::HealthInfo { segments }
}

/// Re-encode a health info payload.
pub fn encode(segments: &[Vec<String>]) -> String {
    segments
        .iter()
        .map(|segment| segment.join(","))
        .collect::<Vec<_>>()
        .join("#")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_segments() {
        let event = decode("1,20161210175403,2880,1#1,20161214175403,2800,2");

        assert_eq!(
            event,
            DeviceEvent::HealthInfo {
                segments: vec![
                    vec![
                        "1".to_string(),
                        "20161210175403".to_string(),
                        "2880".to_string(),
                        "1".to_string()
                    ],
                    vec![
                        "1".to_string(),
                        "20161214175403".to_string(),
                        "2800".to_string(),
                        "2".to_string()
                    ],
                ]
            }
        );
    }

    #[test]
    fn test_segment_field_counts_are_type_erased() {
        let event = decode("1201604181650300656,10000#2,20160418165030,75");

        match event {
            DeviceEvent::HealthInfo { segments } => {
                assert_eq!(segments.len(), 2);
                assert_eq!(segments[0].len(), 2);
                assert_eq!(segments[1].len(), 3);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_empty_payload() {
        assert_eq!(decode(""), DeviceEvent::HealthInfo { segments: vec![] });
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn test_roundtrip() {
        let payload = "1,20161210175403,2880,1#1,20161214175403,2800,2";
        let event = decode(payload);

        let reencoded = super::super::encode_payload(&event);
        assert_eq!(reencoded, payload);
        assert_eq!(decode(&reencoded), event);
    }
}
