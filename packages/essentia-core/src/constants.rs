//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the Essentia serial protocol and the hardware
//! itself; changing them would break compatibility with the device.

// ─────────────────────────────────────────────────────────────────────────────
// Device Topology
// ─────────────────────────────────────────────────────────────────────────────

/// Number of controllable zones on a fully expanded system.
pub const ZONE_COUNT: u8 = 12;

/// Number of selectable source inputs.
pub const SOURCE_COUNT: u8 = 6;

/// Zone queried by the validation probe after a fresh connect.
pub const PROBE_ZONE: u8 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Wire Scales
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum device volume value (attenuation steps, 0 = loudest).
///
/// The device speaks a 0-79 "lower is louder" attenuation scale; the crate
/// API uses a 1-100 "higher is louder" scale and converts at the codec.
pub const DEVICE_VOLUME_MAX: u8 = 79;

/// Minimum user-facing volume.
pub const USER_VOLUME_MIN: u8 = 1;

/// Maximum user-facing volume.
pub const USER_VOLUME_MAX: u8 = 100;

/// Minimum bass/treble level (dB steps).
pub const TONE_LEVEL_MIN: i8 = -12;

/// Maximum bass/treble level (dB steps).
pub const TONE_LEVEL_MAX: i8 = 12;

// ─────────────────────────────────────────────────────────────────────────────
// Command Pacing
// ─────────────────────────────────────────────────────────────────────────────

/// Default spacing between queued command transmissions (milliseconds).
///
/// The RS-232 side of the bridge cannot absorb back-to-back commands; 500ms
/// is the pacing the hardware reliably keeps up with.
pub const DEFAULT_COMMAND_SPACING_MS: u64 = 500;

/// Lower bound for configurable command spacing (milliseconds).
pub const MIN_COMMAND_SPACING_MS: u64 = 100;

/// Upper bound for configurable command spacing (milliseconds).
pub const MAX_COMMAND_SPACING_MS: u64 = 5000;

// ─────────────────────────────────────────────────────────────────────────────
// Connection Supervision
// ─────────────────────────────────────────────────────────────────────────────

/// Default TCP connect timeout (seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default time allowed for the validation probe round trip (seconds).
pub const DEFAULT_VALIDATION_TIMEOUT_SECS: u64 = 10;

/// Default interval between heartbeat polls while connected (seconds).
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 25;

/// Minimum allowed heartbeat interval (seconds).
///
/// Shorter intervals would compete with user traffic on the serial link;
/// configured values below this are clamped up.
pub const MIN_HEARTBEAT_INTERVAL_SECS: u64 = 15;

/// Default base reconnect backoff (seconds). Doubles per consecutive failure.
pub const DEFAULT_RECONNECT_BACKOFF_BASE_SECS: u64 = 10;

/// Default cap on the reconnect backoff (seconds).
pub const DEFAULT_RECONNECT_BACKOFF_MAX_SECS: u64 = 300;

/// Consecutive-failure counts that trigger a warning alert.
pub const FAILURE_WARN_THRESHOLDS: [u32; 2] = [5, 10];

/// Consecutive-failure ceiling that triggers a critical alert.
///
/// Reaching the ceiling never stops reconnection attempts; it only
/// escalates the alert severity.
pub const DEFAULT_FAILURE_CEILING: u32 = 30;

// ─────────────────────────────────────────────────────────────────────────────
// Source Activity
// ─────────────────────────────────────────────────────────────────────────────

/// Default debounce before recomputing source activity (seconds).
///
/// Long on purpose: users moving between zones on the same source should
/// not flap the derived "playing" flags.
pub const DEFAULT_ACTIVITY_DEBOUNCE_SECS: u64 = 180;

/// Default hold-over window keeping a source "playing" after its last
/// contributing zone deactivates (seconds).
pub const DEFAULT_ACTIVITY_HOLDOVER_SECS: u64 = 300;

// ─────────────────────────────────────────────────────────────────────────────
// Eventing
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the event broadcast channel for subscribers.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;
