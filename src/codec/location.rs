//! `J01` location report decoding.
//!
//! The payload carries two observed record grammars side by side:
//!
//! ```text
//! <fix>|<fix>|...[%<station>|<station>|...][#<ancillary-csv>]
//! ```
//!
//! - cell dialect: comma-separated fields, optionally terminated by an
//!   embedded `T<timestamp>` marker, e.g. `460,0,9365,4190,28` or
//!   `2460,01,40977,-65T20080121165030`
//! - GPS dialect: a single coordinate token,
//!   e.g. `0E113.997118N22.593125T20161213132722`
//! - a bare `T<timestamp>` record closes a fix list in some firmwares
//!
//! The decoder detects the grammar per record; an unrecognized shape yields
//! a per-record [`Fix::Unknown`] rather than failing the whole message.
//! `%`-separated trailing sections (station scans) and the `#`-suffixed
//! ancillary counters are preserved as opaque ordered field sequences.

use crate::event::{DeviceEvent, Fix};

/// Minimum digits after a `T` for it to count as a timestamp marker.
const MIN_TIMESTAMP_DIGITS: usize = 6;

/// Decode a `J01` payload.
pub fn decode(payload: &str) -> DeviceEvent {
    let (main, extra) = match payload.split_once('#') {
        Some((main, ancillary)) => (
            main,
            Some(ancillary.split(',').map(str::to_string).collect()),
        ),
        None => (payload, None),
    };

    let mut sections = main.split('%');
    let fix_section = sections.next().unwrap_or("");

    let fixes = fix_section
        .split('|')
        .filter(|record| !record.is_empty())
        .map(decode_fix)
        .collect();

    let stations = sections
        .flat_map(|section| section.split('|'))
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.split(',').map(str::to_string).collect())
        .collect();

    DeviceEvent::LocationReport {
        fixes,
        stations,
        extra,
    }
}

/// Re-encode a location report payload.
pub fn encode(fixes: &[Fix], stations: &[Vec<String>], extra: Option<&[String]>) -> String {
    let mut out = fixes
        .iter()
        .map(encode_fix)
        .collect::<Vec<_>>()
        .join("|");

    if !stations.is_empty() {
        out.push('%');
        out.push_str(
            &stations
                .iter()
                .map(|entry| entry.join(","))
                .collect::<Vec<_>>()
                .join("|"),
        );
    }

    if let Some(extra) = extra {
        out.push('#');
        out.push_str(&extra.join(","));
    }

    out
}

fn decode_fix(record: &str) -> Fix {
    let (rest, timestamp) = split_timestamp(record);

    // Timestamp-only marker closing a fix list.
    if rest.is_empty() {
        if let Some(ts) = timestamp {
            return Fix::Cell {
                fields: Vec::new(),
                timestamp: Some(ts.to_string()),
            };
        }
        return Fix::Unknown {
            raw: record.to_string(),
        };
    }

    if rest.contains(',') {
        return Fix::Cell {
            fields: rest.split(',').map(str::to_string).collect(),
            timestamp: timestamp.map(str::to_string),
        };
    }

    if let (Some(gps), Some(ts)) = (parse_gps(rest), timestamp) {
        let (flag, lon_hemisphere, longitude, lat_hemisphere, latitude) = gps;
        return Fix::Gps {
            flag,
            lon_hemisphere,
            longitude,
            lat_hemisphere,
            latitude,
            timestamp: ts.to_string(),
        };
    }

    Fix::Unknown {
        raw: record.to_string(),
    }
}

fn encode_fix(fix: &Fix) -> String {
    match fix {
        Fix::Cell { fields, timestamp } => {
            let mut out = fields.join(",");
            if let Some(ts) = timestamp {
                out.push('T');
                out.push_str(ts);
            }
            out
        }
        Fix::Gps {
            flag,
            lon_hemisphere,
            longitude,
            lat_hemisphere,
            latitude,
            timestamp,
        } => {
            format!("{flag}{lon_hemisphere}{longitude}{lat_hemisphere}{latitude}T{timestamp}")
        }
        Fix::Unknown { raw } => raw.clone(),
    }
}

/// Split a trailing `T<timestamp>` marker off a record.
///
/// The marker is the rightmost `T` whose suffix is all digits and long
/// enough to be a timestamp.
fn split_timestamp(record: &str) -> (&str, Option<&str>) {
    if let Some(pos) = record.rfind('T') {
        let suffix = &record[pos + 1..];
        if suffix.len() >= MIN_TIMESTAMP_DIGITS && suffix.bytes().all(|b| b.is_ascii_digit()) {
            return (&record[..pos], Some(suffix));
        }
    }
    (record, None)
}

/// Parse the coordinate part of a GPS token:
/// `<flag><E|W><longitude><N|S><latitude>`.
///
/// Returns `None` when the token does not match the grammar, letting the
/// caller fall back to the unknown-record shape.
fn parse_gps(token: &str) -> Option<(String, char, String, char, String)> {
    let lon_start = token.find(['E', 'W'])?;
    let flag = &token[..lon_start];
    if !flag.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let lon_hemisphere = token[lon_start..].chars().next()?;
    let after_lon_hem = &token[lon_start + 1..];

    let lat_start = after_lon_hem.find(['N', 'S'])?;
    let longitude = &after_lon_hem[..lat_start];
    let lat_hemisphere = after_lon_hem[lat_start..].chars().next()?;
    let latitude = &after_lon_hem[lat_start + 1..];

    if !is_coordinate(longitude) || !is_coordinate(latitude) {
        return None;
    }

    Some((
        flag.to_string(),
        lon_hemisphere,
        longitude.to_string(),
        lat_hemisphere,
        latitude.to_string(),
    ))
}

fn is_coordinate(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit() || b == b'.')
}
