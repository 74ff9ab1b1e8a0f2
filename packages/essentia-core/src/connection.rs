//! Connection supervision for the serial bridge link.
//!
//! The manager owns the connection lifecycle: connect, validate with a real
//! probe round trip, supervise with a heartbeat, and reconnect with
//! exponential backoff forever. Each `open()` spawns one session task that
//! exclusively owns the socket for its generation; teardown is a typed
//! cancellation token, never a side channel.
//!
//! State machine: `Disconnected -> Connecting -> Validating -> Connected`.
//! A TCP accept alone never reaches `Connected` (the bridge accepts even
//! when its serial side is dead); only a decodable response line does.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::activity::SourceActivityTracker;
use crate::config::SessionConfig;
use crate::constants::{PROBE_ZONE, ZONE_COUNT};
use crate::events::{AlertNotifier, DeviceFault, EventEmitter};
use crate::protocol::{decode, Command, Response};
use crate::queue::CommandQueue;
use crate::transport::{LineSink, LineSource, LineTransport};
use crate::utils::now_millis;
use crate::zones::ZoneStateStore;

// ─── State and events ────────────────────────────────────────────────────

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    /// No live link; possibly waiting out a reconnect backoff.
    Disconnected,
    /// TCP connect in progress.
    Connecting,
    /// Socket open, waiting for the probe round trip to complete.
    Validating,
    /// Probe answered; the device is reachable end to end.
    Connected,
}

/// Connection lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConnectionEvent {
    /// The state machine moved to a new state.
    #[serde(rename_all = "camelCase")]
    StateChanged {
        state: ConnectionState,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },

    /// The consecutive-failure counter crossed a warning threshold or the
    /// ceiling. Retrying continues regardless.
    #[serde(rename_all = "camelCase")]
    FailureThreshold {
        consecutive_failures: u32,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Snapshot of connection health for status surfaces.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionHealth {
    pub state: ConnectionState,
    pub consecutive_failures: u32,
    /// Unix millis of the last decoded response, if any.
    pub last_response_at: Option<u64>,
    /// Zone the next heartbeat poll targets.
    pub heartbeat_cursor: u8,
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            consecutive_failures: 0,
            last_response_at: None,
            heartbeat_cursor: 1,
        }
    }
}

/// Whether a read/write error means the link is gone.
///
/// Timeouts and interrupts can be transient on serial bridges; reset and
/// pipe errors mean the TCP side is dead and the session must rebuild.
fn is_fatal_io(error: &io::Error) -> bool {
    use io::ErrorKind::*;
    matches!(
        error.kind(),
        ConnectionReset | ConnectionAborted | BrokenPipe | NotConnected | UnexpectedEof
    )
}

/// How one session attempt's inner loop ended.
enum SessionEnd {
    Cancelled,
    Failed(String),
}

// ─── Manager ─────────────────────────────────────────────────────────────

/// Supervises the device link and keeps the rest of the core fed.
///
/// One spawned session task per `open()` generation owns the socket halves;
/// the manager itself holds no I/O resources and all its methods are
/// non-blocking.
pub struct ConnectionManager {
    config: SessionConfig,
    transport: Arc<dyn LineTransport>,
    store: Arc<ZoneStateStore>,
    queue: Arc<CommandQueue>,
    tracker: Arc<SourceActivityTracker>,
    emitter: Arc<dyn EventEmitter>,
    notifier: Arc<dyn AlertNotifier>,
    health: Mutex<ConnectionHealth>,
    generation: AtomicU64,
    cancel: Mutex<Option<CancellationToken>>,
}

impl ConnectionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn LineTransport>,
        store: Arc<ZoneStateStore>,
        queue: Arc<CommandQueue>,
        tracker: Arc<SourceActivityTracker>,
        emitter: Arc<dyn EventEmitter>,
        notifier: Arc<dyn AlertNotifier>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            transport,
            store,
            queue,
            tracker,
            emitter,
            notifier,
            health: Mutex::new(ConnectionHealth::default()),
            generation: AtomicU64::new(0),
            cancel: Mutex::new(None),
        })
    }

    /// Opens the link, replacing any previous session generation.
    ///
    /// The previous generation (if any) is cancelled first; commands routed
    /// to it die with it. Returns immediately; connection progress is
    /// reported through events.
    pub fn open(self: &Arc<Self>) {
        let token = CancellationToken::new();
        if let Some(previous) = self.cancel.lock().replace(token.clone()) {
            previous.cancel();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.queue.rebind(outbound_tx);

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.run_session(outbound_rx, token, generation).await;
        });
    }

    /// Tears down the link: cancels the session task, drops queued
    /// commands, resets derived source activity, and discards cached zone
    /// state. A later session re-polls the device rather than presenting
    /// the old session's snapshot as current.
    pub fn close(&self) {
        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
        self.queue.clear();
        self.tracker.reset();
        self.store.reset();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Closes and reopens the link immediately, skipping any backoff.
    pub fn force_reconnect(self: &Arc<Self>) {
        log::info!("[Connection] forced reconnect requested");
        self.close();
        self.open();
    }

    /// Manually zeroes the consecutive-failure counter.
    pub fn reset_failure_counter(&self) {
        let mut health = self.health.lock();
        if health.consecutive_failures > 0 {
            log::info!(
                "[Connection] failure counter manually reset (was {})",
                health.consecutive_failures
            );
            health.consecutive_failures = 0;
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.health.lock().state
    }

    #[must_use]
    pub fn health(&self) -> ConnectionHealth {
        self.health.lock().clone()
    }

    /// Enqueues a full state poll (status and settings) for every zone.
    pub fn refresh_all_zones(&self) {
        for zone in 1..=ZONE_COUNT {
            self.queue.enqueue(Command::QueryStatus { zone }.encode());
            self.queue.enqueue(Command::QuerySettings { zone }.encode());
        }
    }

    // ─── Session task ────────────────────────────────────────────────────

    /// Connect/validate/supervise loop for one generation. Runs until the
    /// cancellation token fires; connection failures loop back through
    /// backoff, never out of the task.
    async fn run_session(
        self: Arc<Self>,
        mut outbound_rx: mpsc::UnboundedReceiver<String>,
        cancel: CancellationToken,
        generation: u64,
    ) {
        log::info!("[Connection] session generation {generation} starting");

        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.set_state(ConnectionState::Connecting);

            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.transport.connect() => result,
            };
            let (mut sink, mut source) = match connected {
                Ok(halves) => halves,
                Err(e) => {
                    self.handle_failure(&format!("connect failed: {e}"));
                    if !self.backoff_wait(&cancel, &mut outbound_rx).await {
                        break;
                    }
                    continue;
                }
            };

            // The bridge accepts TCP even when its serial side is dead, so
            // the link only counts once a probe response comes back.
            self.set_state(ConnectionState::Validating);
            let probe = Command::QueryStatus { zone: PROBE_ZONE }.encode();
            if let Err(e) = sink.send_line(&probe).await {
                self.handle_failure(&format!("validation probe send failed: {e}"));
                if !self.backoff_wait(&cancel, &mut outbound_rx).await {
                    break;
                }
                continue;
            }

            let end = self
                .drive_connection(&mut sink, &mut source, &mut outbound_rx, &cancel)
                .await;
            match end {
                SessionEnd::Cancelled => break,
                SessionEnd::Failed(reason) => {
                    self.handle_failure(&reason);
                    if !self.backoff_wait(&cancel, &mut outbound_rx).await {
                        break;
                    }
                }
            }
        }

        log::info!("[Connection] session generation {generation} ended");
    }

    /// Inner event loop for one established socket: inbound lines, outbound
    /// commands, the validation deadline, and the heartbeat schedule.
    async fn drive_connection(
        &self,
        sink: &mut Box<dyn LineSink>,
        source: &mut Box<dyn LineSource>,
        outbound_rx: &mut mpsc::UnboundedReceiver<String>,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let mut validated = false;
        let validation_deadline = tokio::time::sleep(self.config.validation_timeout());
        tokio::pin!(validation_deadline);

        let period = self.config.heartbeat_interval();
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,

                _ = &mut validation_deadline, if !validated => {
                    return SessionEnd::Failed("validation probe timed out".to_string());
                }

                line = source.next_line() => match line {
                    Ok(Some(line)) => {
                        validated = true;
                        self.handle_line(&line);
                    }
                    Ok(None) => return SessionEnd::Failed("stream closed by peer".to_string()),
                    Err(e) if is_fatal_io(&e) => {
                        return SessionEnd::Failed(format!("read error: {e}"));
                    }
                    Err(e) => log::debug!("[Connection] transient read error ignored: {e}"),
                },

                Some(wire) = outbound_rx.recv() => {
                    log::trace!("[Connection] tx: {wire}");
                    if let Err(e) = sink.send_line(&wire).await {
                        return SessionEnd::Failed(format!("write error: {e}"));
                    }
                }

                _ = heartbeat.tick() => self.maybe_heartbeat(),
            }
        }
    }

    /// Decodes one inbound line and routes its effects.
    fn handle_line(&self, line: &str) {
        log::trace!("[Connection] rx: {line}");
        let response = decode(line);
        // Any decoded line, a rejection included, proves the serial side
        // is alive.
        self.on_response_received();

        match &response {
            Response::DeviceFault { raw } => {
                log::warn!("[Connection] device rejected a command: {raw}");
                self.emitter.emit_fault(DeviceFault {
                    raw: raw.clone(),
                    timestamp: now_millis(),
                });
            }
            Response::Unrecognized { raw } => {
                log::debug!("[Connection] unrecognized line ignored: {raw}");
            }
            _ => {
                let changes = self.store.apply(&response);
                if matches!(response, Response::AllOff) {
                    self.tracker.handle_all_off();
                }
                for change in changes {
                    self.emitter.emit_zone(change.clone());
                    self.tracker.observe_change(&change);
                }
            }
        }
    }

    /// Liveness bookkeeping: stamps the response, clears the failure
    /// counter, and promotes to `Connected` on the first response of a
    /// session.
    fn on_response_received(&self) {
        let promote = {
            let mut health = self.health.lock();
            health.last_response_at = Some(now_millis());
            if health.consecutive_failures > 0 {
                log::info!(
                    "[Connection] healthy response, failure counter reset (was {})",
                    health.consecutive_failures
                );
                health.consecutive_failures = 0;
            }
            health.state != ConnectionState::Connected
        };
        if promote {
            self.set_state(ConnectionState::Connected);
            log::info!("[Connection] validated, now CONNECTED");
            if self.config.refresh_on_connect {
                self.refresh_all_zones();
            }
        }
    }

    /// Round-robin heartbeat poll. Skipped entirely when the link isn't
    /// validated, when user commands are queued (they take priority), or
    /// while an activity recompute is running.
    fn maybe_heartbeat(&self) {
        if self.health.lock().state != ConnectionState::Connected {
            return;
        }
        if self.queue.is_busy() {
            log::debug!("[Connection] heartbeat deferred, queue busy");
            return;
        }
        if self.tracker.is_recomputing() {
            log::debug!("[Connection] heartbeat deferred, activity recompute in progress");
            return;
        }

        let zone = {
            let mut health = self.health.lock();
            let zone = health.heartbeat_cursor;
            health.heartbeat_cursor = health.heartbeat_cursor % ZONE_COUNT + 1;
            zone
        };
        self.queue.enqueue(Command::QueryStatus { zone }.encode());
    }

    /// Registers a connection failure: drop to `Disconnected`, clear the
    /// queue (stale commands must not fire into a rebuilt link), bump the
    /// counter, and alert on thresholds.
    fn handle_failure(&self, reason: &str) {
        self.set_state(ConnectionState::Disconnected);
        self.queue.clear();

        let failures = {
            let mut health = self.health.lock();
            health.consecutive_failures += 1;
            health.consecutive_failures
        };
        log::warn!("[Connection] failure #{failures}: {reason}");

        let ceiling = self.config.failure_ceiling;
        if self.config.failure_warn_thresholds.contains(&failures) || failures == ceiling {
            let message = if failures >= ceiling {
                format!("{failures} consecutive connection failures (ceiling reached); still retrying")
            } else {
                format!("{failures} consecutive connection failures")
            };
            self.notifier.alert(failures, &message);
            self.emitter.emit_connection(ConnectionEvent::FailureThreshold {
                consecutive_failures: failures,
                timestamp: now_millis(),
            });
        }
    }

    /// Waits out the reconnect backoff for the current failure count.
    /// Outbound commands arriving while disconnected are dropped. Returns
    /// false when cancelled.
    async fn backoff_wait(
        &self,
        cancel: &CancellationToken,
        outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    ) -> bool {
        let failures = self.health.lock().consecutive_failures;
        let delay = self.config.reconnect_backoff(failures);
        log::info!("[Connection] reconnecting in {}s", delay.as_secs());

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = &mut sleep => return true,
                Some(wire) = outbound_rx.recv() => {
                    log::debug!("[Connection] disconnected, dropping outbound: {wire}");
                }
            }
        }
    }

    /// Moves the state machine, emitting and logging only actual changes.
    fn set_state(&self, state: ConnectionState) {
        {
            let mut health = self.health.lock();
            if health.state == state {
                return;
            }
            health.state = state;
        }
        log::info!("[Connection] state -> {state:?}");
        self.emitter.emit_connection(ConnectionEvent::StateChanged {
            state,
            timestamp: now_millis(),
        });
    }
}
