//! Essentia serial protocol codec.
//!
//! Pure functions only: encoding typed commands into wire strings and
//! decoding wire response lines into typed events. No I/O and no state.
//!
//! # Module Structure
//!
//! - `command` - Outbound command intents and wire encoding
//! - `response` - Inbound line classification and field parsing
//!
//! The volume scale conversion lives here because both directions need it:
//! the device speaks 0-79 attenuation (lower is louder) while the crate API
//! speaks 1-100 (higher is louder).

pub mod command;
pub mod response;

pub use command::Command;
pub use response::{decode, Power, Response, ZoneAttribute};

use crate::constants::{DEVICE_VOLUME_MAX, USER_VOLUME_MAX, USER_VOLUME_MIN};

/// Converts a user-facing volume (1-100, higher is louder) to the device
/// attenuation scale (0-79, lower is louder).
///
/// Input is clamped into the user range before mapping; output is clamped
/// into the device range after rounding.
#[must_use]
pub fn user_to_device_volume(user: u8) -> u8 {
    let user = user.clamp(USER_VOLUME_MIN, USER_VOLUME_MAX);
    let device = ((f64::from(USER_VOLUME_MAX) - f64::from(user)) * f64::from(DEVICE_VOLUME_MAX)
        / f64::from(USER_VOLUME_MAX - USER_VOLUME_MIN))
    .round();
    (device as i64).clamp(0, i64::from(DEVICE_VOLUME_MAX)) as u8
}

/// Converts a device attenuation value (0-79) to the user-facing volume
/// scale (1-100). Inverse of [`user_to_device_volume`], clamped to [1, 100].
#[must_use]
pub fn device_to_user_volume(device: u8) -> u8 {
    let device = device.min(DEVICE_VOLUME_MAX);
    let user = (f64::from(USER_VOLUME_MAX)
        - f64::from(device) * f64::from(USER_VOLUME_MAX - USER_VOLUME_MIN)
            / f64::from(DEVICE_VOLUME_MAX))
    .round();
    (user as i64).clamp(i64::from(USER_VOLUME_MIN), i64::from(USER_VOLUME_MAX)) as u8
}
