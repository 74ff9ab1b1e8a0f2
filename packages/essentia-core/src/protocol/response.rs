//! Inbound response line classification and field parsing.
//!
//! The device's response grammar is terse and ambiguous, so decoding is
//! deliberately forgiving: every field of a zone status line is matched
//! independently against known prefixes and unmatched fields are skipped
//! one by one. A line that yields nothing recognizable classifies as
//! [`Response::Unrecognized`] and must never mutate state. Decoding never
//! fails.

use serde::Serialize;

use crate::constants::{SOURCE_COUNT, TONE_LEVEL_MAX, TONE_LEVEL_MIN, ZONE_COUNT};
use crate::protocol::device_to_user_volume;

/// Zone power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Power {
    On,
    Off,
    /// Not yet reported by the device.
    #[default]
    Unknown,
}

/// A single recognized field from a zone status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "attribute", content = "value", rename_all = "camelCase")]
pub enum ZoneAttribute {
    /// Explicit PWRON/PWROFF token.
    Power(Power),
    /// Selected source (1-6).
    Source(u8),
    /// Group membership.
    Group(u8),
    /// Volume on the user-facing 1-100 scale (converted from attenuation).
    Volume(u8),
    /// Bass level (-12..=12).
    Bass(i8),
    /// Treble level (-12..=12).
    Treble(i8),
    /// Volume restore enabled.
    VolumeRestore(bool),
    /// External override contact active.
    OverrideActive(bool),
}

/// A classified inbound line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "details", rename_all = "camelCase")]
pub enum Response {
    /// `#ALLOFF` broadcast: every zone just powered off.
    AllOff,
    /// `#?...`: the device rejected a command. The connection is still live;
    /// this counts as a received response for liveness purposes.
    DeviceFault { raw: String },
    /// `#Z<NN>...` zone status with at least one recognized field.
    ZoneStatus {
        zone: u8,
        attributes: Vec<ZoneAttribute>,
    },
    /// Anything else. Logged by the caller, never mutates state.
    Unrecognized { raw: String },
}

/// Classifies one received line.
///
/// Never panics and never returns an error: malformed input degrades to
/// [`Response::Unrecognized`], and a numeric parse failure inside a zone
/// status line drops only that field.
#[must_use]
pub fn decode(line: &str) -> Response {
    let line = line.trim();

    if line == "#ALLOFF" {
        return Response::AllOff;
    }
    if line.starts_with("#?") {
        return Response::DeviceFault {
            raw: line.to_string(),
        };
    }
    if let Some(rest) = line.strip_prefix("#Z") {
        if let Some(response) = decode_zone_status(line, rest) {
            return response;
        }
    }
    Response::Unrecognized {
        raw: line.to_string(),
    }
}

/// Parses the body of a `#Z<NN>` line. Returns `None` when the zone tag is
/// malformed or no field is recognized, which the caller turns into
/// `Unrecognized`.
fn decode_zone_status(line: &str, rest: &str) -> Option<Response> {
    if rest.len() < 2 || !rest.is_char_boundary(2) {
        return None;
    }
    let (digits, fields) = rest.split_at(2);
    let zone: u8 = digits.parse().ok()?;
    if !(1..=ZONE_COUNT).contains(&zone) {
        log::debug!("[Protocol] status for out-of-range zone in {line:?}");
        return None;
    }

    // The power token, when present, rides directly on the zone tag; the
    // remaining fields are comma separated. Splitting on ',' handles both.
    let attributes: Vec<ZoneAttribute> = fields
        .split(',')
        .filter(|field| !field.is_empty())
        .filter_map(parse_field)
        .collect();

    if attributes.is_empty() {
        return None;
    }
    Some(Response::ZoneStatus { zone, attributes })
}

/// Matches one comma-separated field against the known prefixes.
/// Unrecognized or unparseable fields yield `None` and are skipped.
fn parse_field(field: &str) -> Option<ZoneAttribute> {
    match field {
        "PWRON" => return Some(ZoneAttribute::Power(Power::On)),
        "PWROFF" => return Some(ZoneAttribute::Power(Power::Off)),
        _ => {}
    }
    if let Some(value) = field.strip_prefix("SRC") {
        let source: u8 = value.parse().ok()?;
        if !(1..=SOURCE_COUNT).contains(&source) {
            return None;
        }
        return Some(ZoneAttribute::Source(source));
    }
    if let Some(value) = field.strip_prefix("GRP") {
        return value.parse().ok().map(ZoneAttribute::Group);
    }
    if let Some(value) = field.strip_prefix("VOL-") {
        let attenuation: u8 = value.parse().ok()?;
        return Some(ZoneAttribute::Volume(device_to_user_volume(attenuation)));
    }
    if let Some(value) = field.strip_prefix("BASS") {
        return parse_tone(value).map(ZoneAttribute::Bass);
    }
    if let Some(value) = field.strip_prefix("TREB") {
        return parse_tone(value).map(ZoneAttribute::Treble);
    }
    if let Some(value) = field.strip_prefix("VRST") {
        return parse_flag(value).map(ZoneAttribute::VolumeRestore);
    }
    if let Some(value) = field.strip_prefix("OVR") {
        return parse_flag(value).map(ZoneAttribute::OverrideActive);
    }
    None
}

/// Parses a signed bass/treble value (`+NN`/`-NN`). Values outside the
/// protocol range are treated as malformed.
fn parse_tone(value: &str) -> Option<i8> {
    let level: i8 = value.parse().ok()?;
    (TONE_LEVEL_MIN..=TONE_LEVEL_MAX).contains(&level).then_some(level)
}

/// Parses a `0`/`1` flag suffix.
fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}
