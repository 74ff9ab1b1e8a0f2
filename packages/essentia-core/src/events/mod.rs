//! Event system for notifying the external caller of state changes.
//!
//! This module provides:
//! - [`EventEmitter`] trait for core components to emit events
//! - [`BroadcastEventBridge`], the subscription channel handed to callers
//! - The [`DeviceEvent`] envelope over the per-domain event types
//!
//! Zone and source payload types live with their owning modules and are
//! re-exported here for convenience.

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{AlertNotifier, EventEmitter, LoggingAlertNotifier, LoggingEventEmitter, NoopAlertNotifier, NoopEventEmitter};

use serde::Serialize;

pub use crate::activity::SourceActivityChange;
pub use crate::connection::ConnectionEvent;
pub use crate::zones::ZoneChange;

/// A device-reported command rejection (`#?` response).
///
/// Informational only: the device rejected one command, the connection is
/// still live, and no zone state is affected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFault {
    /// Raw rejected-response text as received.
    pub raw: String,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

/// Events delivered to session subscribers.
///
/// Each category wraps the event type owned by the corresponding module.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum DeviceEvent {
    /// A single zone attribute changed.
    Zone(ZoneChange),

    /// A derived source-activity flag flipped.
    Source(SourceActivityChange),

    /// Connection state machine transition or failure threshold.
    Connection(ConnectionEvent),

    /// The device rejected a command.
    Fault(DeviceFault),
}

impl From<ZoneChange> for DeviceEvent {
    fn from(event: ZoneChange) -> Self {
        DeviceEvent::Zone(event)
    }
}

impl From<SourceActivityChange> for DeviceEvent {
    fn from(event: SourceActivityChange) -> Self {
        DeviceEvent::Source(event)
    }
}

impl From<ConnectionEvent> for DeviceEvent {
    fn from(event: ConnectionEvent) -> Self {
        DeviceEvent::Connection(event)
    }
}

impl From<DeviceFault> for DeviceEvent {
    fn from(event: DeviceFault) -> Self {
        DeviceEvent::Fault(event)
    }
}
