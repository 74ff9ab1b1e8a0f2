//! Bridge implementation that maps core events to the subscriber channel.
//!
//! The [`BroadcastEventBridge`] implements [`EventEmitter`] by forwarding
//! typed events to a `tokio::sync::broadcast` channel. Callers subscribe
//! through [`BroadcastEventBridge::subscribe`]; slow subscribers lag and
//! drop rather than back-pressuring the session.

use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{DeviceEvent, DeviceFault, SourceActivityChange};
use crate::connection::ConnectionEvent;
use crate::zones::ZoneChange;

/// Bridges core events to the subscriber broadcast channel.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<DeviceEvent>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.tx.subscribe()
    }

    fn forward(&self, event: DeviceEvent) {
        if let Err(e) = self.tx.send(event) {
            log::trace!("[EventBridge] no subscribers: {e}");
        }
    }
}

impl EventEmitter for BroadcastEventBridge {
    fn emit_zone(&self, event: ZoneChange) {
        self.forward(DeviceEvent::Zone(event));
    }

    fn emit_source(&self, event: SourceActivityChange) {
        self.forward(DeviceEvent::Source(event));
    }

    fn emit_connection(&self, event: ConnectionEvent) {
        self.forward(DeviceEvent::Connection(event));
    }

    fn emit_fault(&self, event: DeviceFault) {
        self.forward(DeviceEvent::Fault(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Power, ZoneAttribute};

    #[tokio::test]
    async fn subscriber_receives_forwarded_events() {
        let bridge = BroadcastEventBridge::new(8);
        let mut rx = bridge.subscribe();

        bridge.emit_zone(ZoneChange {
            zone: 4,
            attribute: ZoneAttribute::Power(Power::On),
            timestamp: 1,
        });

        let event = rx.recv().await.unwrap();
        match event {
            DeviceEvent::Zone(change) => {
                assert_eq!(change.zone, 4);
                assert_eq!(change.attribute, ZoneAttribute::Power(Power::On));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn emitting_without_subscribers_does_not_panic() {
        let bridge = BroadcastEventBridge::new(8);
        bridge.emit_fault(DeviceFault {
            raw: "#?ERR".to_string(),
            timestamp: 0,
        });
    }
}
