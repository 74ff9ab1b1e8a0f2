//! High-level session facade.
//!
//! [`DeviceSession`] wires the store, queue, activity tracker, and
//! connection manager together and exposes the whole surface a host
//! platform needs: typed zone commands, state reads, health, and an event
//! subscription. Everything here is non-blocking; commands go through the
//! paced queue and results come back as events.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::activity::SourceActivityTracker;
use crate::config::SessionConfig;
use crate::connection::{ConnectionHealth, ConnectionManager, ConnectionState};
use crate::constants::ZONE_COUNT;
use crate::error::{EssentiaError, EssentiaResult};
use crate::events::{AlertNotifier, BroadcastEventBridge, DeviceEvent, EventEmitter, NoopAlertNotifier};
use crate::protocol::Command;
use crate::queue::CommandQueue;
use crate::transport::{LineTransport, TcpLineTransport};
use crate::zones::{ZoneState, ZoneStateStore};

/// One managed session against a single amplifier.
///
/// Cheap to clone the pieces of (everything is behind `Arc`), but intended
/// to be held once by the host platform for the device's lifetime.
pub struct DeviceSession {
    config: SessionConfig,
    store: Arc<ZoneStateStore>,
    queue: Arc<CommandQueue>,
    tracker: Arc<SourceActivityTracker>,
    connection: Arc<ConnectionManager>,
    bridge: BroadcastEventBridge,
}

impl DeviceSession {
    /// Creates a session over TCP to the configured serial bridge.
    pub fn new(config: SessionConfig) -> EssentiaResult<Self> {
        let transport = Arc::new(TcpLineTransport::new(
            config.endpoint(),
            config.connect_timeout(),
        ));
        Self::with_transport(config, transport, Arc::new(NoopAlertNotifier))
    }

    /// Creates a session over a caller-supplied transport and notifier.
    ///
    /// This is the seam for host-platform alert delivery and for tests.
    pub fn with_transport(
        config: SessionConfig,
        transport: Arc<dyn LineTransport>,
        notifier: Arc<dyn AlertNotifier>,
    ) -> EssentiaResult<Self> {
        config.validate().map_err(EssentiaError::Configuration)?;

        let bridge = BroadcastEventBridge::new(config.event_channel_capacity);
        let emitter: Arc<dyn EventEmitter> = Arc::new(bridge.clone());

        let store = Arc::new(ZoneStateStore::new());
        // The queue gets a live sink on every `open()`; this initial one is
        // a placeholder that drops anything sent before then.
        let (placeholder_tx, _) = mpsc::unbounded_channel();
        let queue = CommandQueue::new(placeholder_tx, &config);
        let tracker = SourceActivityTracker::new(Arc::clone(&store), Arc::clone(&emitter), &config);
        let connection = ConnectionManager::new(
            config.clone(),
            transport,
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&tracker),
            emitter,
            notifier,
        );

        Ok(Self {
            config,
            store,
            queue,
            tracker,
            connection,
            bridge,
        })
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Opens the device link. Safe to call repeatedly; each call replaces
    /// the previous session generation.
    pub fn open(&self) {
        log::info!("[Session] opening link to {}", self.config.endpoint());
        self.connection.open();
    }

    /// Closes the device link and drops all queued commands.
    pub fn close(&self) {
        log::info!("[Session] closing link to {}", self.config.endpoint());
        self.connection.close();
    }

    /// Closes and reopens the link immediately.
    pub fn force_reconnect(&self) {
        self.connection.force_reconnect();
    }

    /// Subscribes to zone, source, connection, and fault events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.bridge.subscribe()
    }

    // ─── Commands ────────────────────────────────────────────────────────

    /// Validates and enqueues one command.
    pub fn send_command(&self, command: Command) -> EssentiaResult<()> {
        command.validate()?;
        self.queue.enqueue(command.encode());
        Ok(())
    }

    pub fn zone_on(&self, zone: u8) -> EssentiaResult<()> {
        self.send_command(Command::ZoneOn { zone })
    }

    pub fn zone_off(&self, zone: u8) -> EssentiaResult<()> {
        self.send_command(Command::ZoneOff { zone })
    }

    /// Turns every zone off with a single wire command.
    pub fn all_off(&self) -> EssentiaResult<()> {
        self.send_command(Command::AllOff)
    }

    pub fn set_source(&self, zone: u8, source: u8) -> EssentiaResult<()> {
        self.send_command(Command::SetSource { zone, source })
    }

    /// Sets zone volume on the user scale (1-100, higher is louder).
    pub fn set_volume(&self, zone: u8, volume: u8) -> EssentiaResult<()> {
        self.send_command(Command::SetVolume { zone, volume })
    }

    pub fn set_mute(&self, zone: u8, mute: bool) -> EssentiaResult<()> {
        self.send_command(Command::SetMute { zone, mute })
    }

    /// Sets zone bass level (-12..=+12, clamped on encode).
    pub fn set_bass(&self, zone: u8, level: i8) -> EssentiaResult<()> {
        self.send_command(Command::SetBass { zone, level })
    }

    /// Sets zone treble level (-12..=+12, clamped on encode).
    pub fn set_treble(&self, zone: u8, level: i8) -> EssentiaResult<()> {
        self.send_command(Command::SetTreble { zone, level })
    }

    pub fn set_volume_restore(&self, zone: u8, enabled: bool) -> EssentiaResult<()> {
        self.send_command(Command::SetVolumeRestore { zone, enabled })
    }

    /// Polls one zone's status and settings.
    pub fn query_zone(&self, zone: u8) -> EssentiaResult<()> {
        self.send_command(Command::QueryStatus { zone })?;
        self.send_command(Command::QuerySettings { zone })
    }

    /// Polls status and settings for every zone.
    pub fn refresh_all_zones(&self) {
        self.connection.refresh_all_zones();
    }

    /// Drops all queued commands without sending them.
    pub fn clear_queue(&self) {
        self.queue.clear();
    }

    // ─── State reads ─────────────────────────────────────────────────────

    /// Snapshot of one zone's cached state.
    pub fn zone(&self, zone: u8) -> EssentiaResult<ZoneState> {
        self.store
            .zone(zone)
            .ok_or(EssentiaError::InvalidZone(zone))
    }

    /// Snapshot of all zones' cached state.
    #[must_use]
    pub fn all_zones(&self) -> Vec<ZoneState> {
        self.store.all_zones()
    }

    /// Derived per-source playing flags, in source order.
    #[must_use]
    pub fn source_activity(&self) -> Vec<(u8, bool)> {
        self.tracker.source_activity()
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    #[must_use]
    pub fn health(&self) -> ConnectionHealth {
        self.connection.health()
    }

    /// Manually zeroes the consecutive-failure counter.
    pub fn reset_failure_counter(&self) {
        self.connection.reset_failure_counter();
    }

    /// Number of commands waiting in the queue.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Full cached state as a JSON value, for status surfaces.
    pub fn state_json(&self) -> serde_json::Value {
        serde_json::json!({
            "endpoint": self.config.endpoint(),
            "connection": self.health(),
            "zones": self.all_zones(),
            "sources": self.source_activity()
                .into_iter()
                .map(|(source, playing)| serde_json::json!({
                    "source": source,
                    "playing": playing,
                }))
                .collect::<Vec<_>>(),
        })
    }
}

/// Upper zone bound re-exported for host-platform UIs.
pub const MAX_ZONE: u8 = ZONE_COUNT;
