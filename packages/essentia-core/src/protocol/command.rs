//! Outbound command intents and their wire encoding.
//!
//! Every command the device understands is a variant here. `encode` produces
//! the exact token sequence the device expects: zone numbers zero-padded to
//! two digits, bass/treble magnitude zero-padded to two digits with a
//! mandatory explicit sign, volume converted to the device attenuation
//! scale. Level arguments are clamped to protocol ranges; zone and source
//! numbers are checked by [`Command::validate`].

use serde::Serialize;

use crate::constants::{SOURCE_COUNT, TONE_LEVEL_MAX, TONE_LEVEL_MIN, ZONE_COUNT};
use crate::error::{EssentiaError, EssentiaResult};
use crate::protocol::user_to_device_volume;

/// A typed command intent for the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Power a zone on.
    ZoneOn { zone: u8 },
    /// Power a zone off.
    ZoneOff { zone: u8 },
    /// Select a source (1-6) for a zone.
    SetSource { zone: u8, source: u8 },
    /// Set a zone's volume on the user-facing 1-100 scale.
    SetVolume { zone: u8, volume: u8 },
    /// Mute or unmute a zone.
    SetMute { zone: u8, mute: bool },
    /// Set a zone's bass level (-12..=12).
    SetBass { zone: u8, level: i8 },
    /// Set a zone's treble level (-12..=12).
    SetTreble { zone: u8, level: i8 },
    /// Enable or disable volume restore for a zone.
    SetVolumeRestore { zone: u8, enabled: bool },
    /// Query a zone's power/source/volume/group status.
    QueryStatus { zone: u8 },
    /// Query a zone's bass/treble/volume-restore settings.
    QuerySettings { zone: u8 },
    /// Power every zone off.
    AllOff,
}

impl Command {
    /// The zone this command targets, if zone-scoped.
    #[must_use]
    pub fn zone(&self) -> Option<u8> {
        match self {
            Self::ZoneOn { zone }
            | Self::ZoneOff { zone }
            | Self::SetSource { zone, .. }
            | Self::SetVolume { zone, .. }
            | Self::SetMute { zone, .. }
            | Self::SetBass { zone, .. }
            | Self::SetTreble { zone, .. }
            | Self::SetVolumeRestore { zone, .. }
            | Self::QueryStatus { zone }
            | Self::QuerySettings { zone } => Some(*zone),
            Self::AllOff => None,
        }
    }

    /// Checks zone and source numbers against the device topology.
    pub fn validate(&self) -> EssentiaResult<()> {
        if let Some(zone) = self.zone() {
            validate_zone(zone)?;
        }
        if let Self::SetSource { source, .. } = self {
            validate_source(*source)?;
        }
        Ok(())
    }

    /// Encodes the command into its wire string (without line terminator).
    ///
    /// Level arguments outside their protocol range are clamped; zone and
    /// source numbers are encoded as given (see [`Command::validate`]).
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::ZoneOn { zone } => format!("*Z{zone:02}ON"),
            Self::ZoneOff { zone } => format!("*Z{zone:02}OFF"),
            Self::SetSource { zone, source } => format!("*Z{zone:02}SRC{source}"),
            Self::SetVolume { zone, volume } => {
                format!("*Z{zone:02}VOL{:02}", user_to_device_volume(*volume))
            }
            Self::SetMute { zone, mute: true } => format!("*Z{zone:02}MTON"),
            Self::SetMute { zone, mute: false } => format!("*Z{zone:02}MTOFF"),
            Self::SetBass { zone, level } => format!("*Z{zone:02}BASS{}", encode_tone(*level)),
            Self::SetTreble { zone, level } => format!("*Z{zone:02}TREB{}", encode_tone(*level)),
            Self::SetVolumeRestore {
                zone,
                enabled: true,
            } => format!("*Z{zone:02}VRSTON"),
            Self::SetVolumeRestore {
                zone,
                enabled: false,
            } => format!("*Z{zone:02}VRSTOFF"),
            Self::QueryStatus { zone } => format!("*Z{zone:02}CONSR"),
            Self::QuerySettings { zone } => format!("*Z{zone:02}SETSR"),
            Self::AllOff => "*ALLOFF".to_string(),
        }
    }
}

/// Encodes a bass/treble level with mandatory sign and two-digit magnitude.
///
/// The sign is never omitted: the device treats a missing sign as a syntax
/// error, so zero and positive levels encode with an explicit `+`.
fn encode_tone(level: i8) -> String {
    let level = level.clamp(TONE_LEVEL_MIN, TONE_LEVEL_MAX);
    let sign = if level >= 0 { '+' } else { '-' };
    format!("{sign}{:02}", level.unsigned_abs())
}

/// Checks a zone number against the device topology.
pub fn validate_zone(zone: u8) -> EssentiaResult<u8> {
    if (1..=ZONE_COUNT).contains(&zone) {
        Ok(zone)
    } else {
        Err(EssentiaError::InvalidZone(zone))
    }
}

/// Checks a source number against the device topology.
pub fn validate_source(source: u8) -> EssentiaResult<u8> {
    if (1..=SOURCE_COUNT).contains(&source) {
        Ok(source)
    } else {
        Err(EssentiaError::InvalidSource(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_commands_zero_pad_zone() {
        assert_eq!(Command::ZoneOn { zone: 3 }.encode(), "*Z03ON");
        assert_eq!(Command::ZoneOff { zone: 12 }.encode(), "*Z12OFF");
    }

    #[test]
    fn bass_sign_is_always_present() {
        assert_eq!(
            Command::SetBass { zone: 11, level: -11 }.encode(),
            "*Z11BASS-11"
        );
        assert_eq!(
            Command::SetBass { zone: 3, level: 12 }.encode(),
            "*Z03BASS+12"
        );
        assert_eq!(
            Command::SetTreble { zone: 1, level: 0 }.encode(),
            "*Z01TREB+00"
        );
        assert_eq!(
            Command::SetTreble { zone: 9, level: -2 }.encode(),
            "*Z09TREB-02"
        );
    }

    #[test]
    fn tone_levels_are_clamped_to_protocol_range() {
        assert_eq!(
            Command::SetBass { zone: 1, level: 127 }.encode(),
            "*Z01BASS+12"
        );
        assert_eq!(
            Command::SetBass { zone: 1, level: -128 }.encode(),
            "*Z01BASS-12"
        );
    }

    #[test]
    fn volume_encodes_on_device_scale() {
        // User 100 = no attenuation, user 1 = full attenuation
        assert_eq!(
            Command::SetVolume { zone: 2, volume: 100 }.encode(),
            "*Z02VOL00"
        );
        assert_eq!(
            Command::SetVolume { zone: 2, volume: 1 }.encode(),
            "*Z02VOL79"
        );
    }

    #[test]
    fn mute_restore_and_query_tokens() {
        assert_eq!(Command::SetMute { zone: 5, mute: true }.encode(), "*Z05MTON");
        assert_eq!(
            Command::SetMute { zone: 5, mute: false }.encode(),
            "*Z05MTOFF"
        );
        assert_eq!(
            Command::SetVolumeRestore { zone: 7, enabled: true }.encode(),
            "*Z07VRSTON"
        );
        assert_eq!(Command::QueryStatus { zone: 10 }.encode(), "*Z10CONSR");
        assert_eq!(Command::QuerySettings { zone: 4 }.encode(), "*Z04SETSR");
        assert_eq!(Command::AllOff.encode(), "*ALLOFF");
    }

    #[test]
    fn validate_rejects_out_of_range_zone_and_source() {
        assert!(Command::ZoneOn { zone: 0 }.validate().is_err());
        assert!(Command::ZoneOn { zone: 13 }.validate().is_err());
        assert!(Command::SetSource { zone: 1, source: 7 }.validate().is_err());
        assert!(Command::SetSource { zone: 1, source: 0 }.validate().is_err());
        assert!(Command::SetSource { zone: 12, source: 6 }.validate().is_ok());
        assert!(Command::AllOff.validate().is_ok());
    }
}
