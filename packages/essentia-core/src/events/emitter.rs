//! Emitter and notifier abstractions for decoupling the core from transport.
//!
//! Components depend on the [`EventEmitter`] trait rather than a concrete
//! channel, enabling testing and alternative delivery (host platform
//! callbacks, logging only, etc.). [`AlertNotifier`] is the separate
//! collaborator for failure-threshold alerts, which typically route to a
//! human (push notification, hub alert) rather than to state subscribers.

use super::{DeviceFault, SourceActivityChange};
use crate::connection::ConnectionEvent;
use crate::zones::ZoneChange;

/// Trait for emitting state-change events without knowledge of transport.
pub trait EventEmitter: Send + Sync {
    /// Emits a single-field zone change.
    fn emit_zone(&self, event: ZoneChange);

    /// Emits a source-activity flag change.
    fn emit_source(&self, event: SourceActivityChange);

    /// Emits a connection lifecycle event.
    fn emit_connection(&self, event: ConnectionEvent);

    /// Emits a device-reported command rejection.
    fn emit_fault(&self, event: DeviceFault);
}

/// No-op emitter for tests and headless embedding.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_zone(&self, _event: ZoneChange) {}
    fn emit_source(&self, _event: SourceActivityChange) {}
    fn emit_connection(&self, _event: ConnectionEvent) {}
    fn emit_fault(&self, _event: DeviceFault) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level. Useful for tracing event flow without
/// wiring a subscriber.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_zone(&self, event: ZoneChange) {
        tracing::debug!(?event, "zone_event");
    }

    fn emit_source(&self, event: SourceActivityChange) {
        tracing::debug!(?event, "source_event");
    }

    fn emit_connection(&self, event: ConnectionEvent) {
        tracing::debug!(?event, "connection_event");
    }

    fn emit_fault(&self, event: DeviceFault) {
        tracing::debug!(?event, "fault_event");
    }
}

/// Collaborator for consecutive-failure threshold alerts.
///
/// Called when the failure counter crosses a configured warning threshold
/// or the ceiling. Alerting never affects reconnection behavior.
pub trait AlertNotifier: Send + Sync {
    fn alert(&self, consecutive_failures: u32, message: &str);
}

/// Default notifier: alerts go nowhere.
pub struct NoopAlertNotifier;

impl AlertNotifier for NoopAlertNotifier {
    fn alert(&self, _consecutive_failures: u32, _message: &str) {}
}

/// Notifier that records alerts in the log.
pub struct LoggingAlertNotifier;

impl AlertNotifier for LoggingAlertNotifier {
    fn alert(&self, consecutive_failures: u32, message: &str) {
        log::error!("[Alert] {consecutive_failures} consecutive failures: {message}");
    }
}
