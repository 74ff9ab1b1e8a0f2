//! Derived per-source "currently playing" flags.
//!
//! A source is playing when at least one powered-on zone has it selected.
//! The flags are derived from the zone store, never set directly, and move
//! slowly on purpose:
//!
//! - Recomputation is debounced for minutes so users moving between zones
//!   on the same source don't flap the flags.
//! - Once a source's deriving set goes empty, its flag holds true for a
//!   hold-over window; a zone re-activating the source inside the window
//!   cancels the pending flip.
//!
//! All timers are epoch-tagged spawned sleeps; stale timers are no-ops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::SessionConfig;
use crate::constants::SOURCE_COUNT;
use crate::events::EventEmitter;
use crate::protocol::ZoneAttribute;
use crate::utils::now_millis;
use crate::zones::{ZoneChange, ZoneStateStore};

/// Notification that a source's derived activity flag flipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceActivityChange {
    /// Source number (1-6).
    pub source: u8,
    /// New value of the "currently playing" flag.
    pub playing: bool,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

#[derive(Debug, Default)]
struct PendingTimers {
    /// Epoch of the most recent debounce schedule; older timers are stale.
    recompute_epoch: u64,
    /// Per-source hold-over timers: presence means a flip to false is
    /// pending; the epoch identifies the owning timer.
    holdover: HashMap<u8, u64>,
    next_holdover_epoch: u64,
}

/// Tracks which sources are actively playing, with debounce and hold-over.
pub struct SourceActivityTracker {
    store: Arc<ZoneStateStore>,
    emitter: Arc<dyn EventEmitter>,
    /// Source number -> currently playing.
    flags: DashMap<u8, bool>,
    pending: Mutex<PendingTimers>,
    /// True while a recomputation pass is executing.
    recomputing: AtomicBool,
    debounce: Duration,
    holdover: Duration,
}

impl SourceActivityTracker {
    pub fn new(
        store: Arc<ZoneStateStore>,
        emitter: Arc<dyn EventEmitter>,
        config: &SessionConfig,
    ) -> Arc<Self> {
        let flags = DashMap::new();
        for source in 1..=SOURCE_COUNT {
            flags.insert(source, false);
        }
        Arc::new(Self {
            store,
            emitter,
            flags,
            pending: Mutex::new(PendingTimers::default()),
            recomputing: AtomicBool::new(false),
            debounce: config.activity_debounce(),
            holdover: config.activity_holdover(),
        })
    }

    /// Feeds one zone change into the tracker. Power and source changes
    /// schedule a debounced recomputation, replacing any pending schedule.
    pub fn observe_change(self: &Arc<Self>, change: &ZoneChange) {
        match change.attribute {
            ZoneAttribute::Power(_) | ZoneAttribute::Source(_) => self.schedule_recompute(),
            _ => {}
        }
    }

    /// Handles an all-zones-off broadcast: flags drop immediately and all
    /// hold-over bookkeeping is cleared, so nothing lingers as playing.
    pub fn handle_all_off(&self) {
        {
            let mut pending = self.pending.lock();
            pending.holdover.clear();
        }
        let timestamp = now_millis();
        for source in 1..=SOURCE_COUNT {
            if self.set_flag(source, false) {
                self.emitter.emit_source(SourceActivityChange {
                    source,
                    playing: false,
                    timestamp,
                });
            }
        }
    }

    /// Snapshot of all per-source flags in source order.
    #[must_use]
    pub fn source_activity(&self) -> Vec<(u8, bool)> {
        (1..=SOURCE_COUNT)
            .map(|s| (s, self.flags.get(&s).map(|r| *r).unwrap_or(false)))
            .collect()
    }

    /// Whether a recomputation pass is executing right now. The heartbeat
    /// defers around it to avoid interleaving notification bursts.
    #[must_use]
    pub fn is_recomputing(&self) -> bool {
        self.recomputing.load(Ordering::SeqCst)
    }

    /// Drops all flags and timers without emitting. Used on teardown.
    pub fn reset(&self) {
        let mut pending = self.pending.lock();
        pending.recompute_epoch += 1;
        pending.holdover.clear();
        drop(pending);
        for source in 1..=SOURCE_COUNT {
            self.flags.insert(source, false);
        }
    }

    /// Schedules a recomputation after the debounce delay, replacing any
    /// previously pending schedule.
    fn schedule_recompute(self: &Arc<Self>) {
        let epoch = {
            let mut pending = self.pending.lock();
            pending.recompute_epoch += 1;
            pending.recompute_epoch
        };
        let tracker = Arc::clone(self);
        let debounce = self.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if tracker.pending.lock().recompute_epoch != epoch {
                return;
            }
            tracker.recompute();
        });
    }

    /// Derives the active-source set from the zone store and reconciles
    /// the flags, honoring hold-over for sources that went idle.
    fn recompute(self: &Arc<Self>) {
        self.recomputing.store(true, Ordering::SeqCst);
        let active = self.store.derive_active_sources();
        let timestamp = now_millis();

        for source in 1..=SOURCE_COUNT {
            let playing_now = active.contains(&source);
            if playing_now {
                // Re-activation cancels any pending flip
                self.pending.lock().holdover.remove(&source);
                if self.set_flag(source, true) {
                    log::info!("[SourceActivity] source {source} playing");
                    self.emitter.emit_source(SourceActivityChange {
                        source,
                        playing: true,
                        timestamp,
                    });
                }
            } else if self.flags.get(&source).map(|r| *r).unwrap_or(false) {
                self.start_holdover(source);
            }
        }
        self.recomputing.store(false, Ordering::SeqCst);
    }

    /// Starts the hold-over timer for a source that just went idle, unless
    /// one is already pending.
    fn start_holdover(self: &Arc<Self>, source: u8) {
        let epoch = {
            let mut pending = self.pending.lock();
            if pending.holdover.contains_key(&source) {
                return;
            }
            pending.next_holdover_epoch += 1;
            let epoch = pending.next_holdover_epoch;
            pending.holdover.insert(source, epoch);
            epoch
        };
        log::debug!("[SourceActivity] source {source} idle, hold-over started");

        let tracker = Arc::clone(self);
        let holdover = self.holdover;
        tokio::spawn(async move {
            tokio::time::sleep(holdover).await;
            tracker.on_holdover_elapsed(source, epoch);
        });
    }

    /// Hold-over expiry: flips the flag false only when the source is
    /// still idle and this timer is still the pending one.
    fn on_holdover_elapsed(self: &Arc<Self>, source: u8, epoch: u64) {
        {
            let mut pending = self.pending.lock();
            match pending.holdover.get(&source) {
                Some(&current) if current == epoch => {
                    pending.holdover.remove(&source);
                }
                _ => return,
            }
        }
        if self.store.derive_active_sources().contains(&source) {
            return;
        }
        if self.set_flag(source, false) {
            log::info!("[SourceActivity] source {source} stopped (hold-over elapsed)");
            self.emitter.emit_source(SourceActivityChange {
                source,
                playing: false,
                timestamp: now_millis(),
            });
        }
    }

    /// Writes a flag, returning whether it changed.
    fn set_flag(&self, source: u8, playing: bool) -> bool {
        let previous = self.flags.insert(source, playing);
        previous != Some(playing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;
    use crate::protocol::decode;
    use tokio::time::sleep;

    const DEBOUNCE: Duration = Duration::from_secs(180);
    const HOLDOVER: Duration = Duration::from_secs(300);

    fn setup() -> (Arc<ZoneStateStore>, Arc<SourceActivityTracker>) {
        let store = Arc::new(ZoneStateStore::new());
        let config = SessionConfig::new("host", 23);
        let tracker = SourceActivityTracker::new(
            Arc::clone(&store),
            Arc::new(NoopEventEmitter),
            &config,
        );
        (store, tracker)
    }

    fn apply_and_observe(
        store: &Arc<ZoneStateStore>,
        tracker: &Arc<SourceActivityTracker>,
        line: &str,
    ) {
        for change in store.apply(&decode(line)) {
            tracker.observe_change(&change);
        }
    }

    fn playing(tracker: &SourceActivityTracker, source: u8) -> bool {
        tracker
            .source_activity()
            .into_iter()
            .find(|(s, _)| *s == source)
            .map(|(_, p)| p)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn flag_rises_only_after_debounce() {
        let (store, tracker) = setup();
        apply_and_observe(&store, &tracker, "#Z01PWRON,SRC2");

        sleep(DEBOUNCE - Duration::from_secs(1)).await;
        assert!(!playing(&tracker, 2));

        sleep(Duration::from_secs(2)).await;
        assert!(playing(&tracker, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn new_change_replaces_pending_schedule() {
        let (store, tracker) = setup();
        apply_and_observe(&store, &tracker, "#Z01PWRON,SRC2");

        sleep(Duration::from_secs(60)).await;
        apply_and_observe(&store, &tracker, "#Z02PWRON,SRC3");

        // The first schedule was replaced; at its original deadline
        // nothing has recomputed yet.
        sleep(DEBOUNCE - Duration::from_secs(60) + Duration::from_secs(1)).await;
        assert!(!playing(&tracker, 2));

        sleep(Duration::from_secs(60)).await;
        assert!(playing(&tracker, 2));
        assert!(playing(&tracker, 3));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_source_holds_over_before_dropping() {
        let (store, tracker) = setup();
        apply_and_observe(&store, &tracker, "#Z01PWRON,SRC2");
        sleep(DEBOUNCE + Duration::from_secs(1)).await;
        assert!(playing(&tracker, 2));

        apply_and_observe(&store, &tracker, "#Z01PWROFF");
        sleep(DEBOUNCE + Duration::from_secs(1)).await;
        // Recompute ran, source is idle, but hold-over keeps it playing
        assert!(playing(&tracker, 2));

        sleep(HOLDOVER + Duration::from_secs(1)).await;
        assert!(!playing(&tracker, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn reactivation_within_holdover_cancels_flip() {
        let (store, tracker) = setup();
        apply_and_observe(&store, &tracker, "#Z01PWRON,SRC2");
        sleep(DEBOUNCE + Duration::from_secs(1)).await;
        assert!(playing(&tracker, 2));

        // Zone 1 drops off; hold-over starts after the debounced recompute
        apply_and_observe(&store, &tracker, "#Z01PWROFF");
        sleep(DEBOUNCE + Duration::from_secs(1)).await;
        assert!(playing(&tracker, 2));

        // Zone 2 picks the source back up inside the window
        apply_and_observe(&store, &tracker, "#Z02PWRON,SRC2");
        sleep(DEBOUNCE + Duration::from_secs(1)).await;
        assert!(playing(&tracker, 2));

        // Long after the original hold-over deadline the flag still holds
        sleep(HOLDOVER * 2).await;
        assert!(playing(&tracker, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn all_off_drops_flags_immediately() {
        let (store, tracker) = setup();
        apply_and_observe(&store, &tracker, "#Z01PWRON,SRC2");
        apply_and_observe(&store, &tracker, "#Z03PWRON,SRC5");
        sleep(DEBOUNCE + Duration::from_secs(1)).await;
        assert!(playing(&tracker, 2));
        assert!(playing(&tracker, 5));

        let response = decode("#ALLOFF");
        for change in store.apply(&response) {
            tracker.observe_change(&change);
        }
        tracker.handle_all_off();
        assert!(!playing(&tracker, 2));
        assert!(!playing(&tracker, 5));

        // The debounced recompute triggered by the power changes must not
        // resurrect anything.
        sleep(DEBOUNCE + HOLDOVER).await;
        assert!(!playing(&tracker, 2));
        assert!(!playing(&tracker, 5));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_without_emitting() {
        let (store, tracker) = setup();
        apply_and_observe(&store, &tracker, "#Z01PWRON,SRC2");
        sleep(DEBOUNCE + Duration::from_secs(1)).await;
        assert!(playing(&tracker, 2));

        tracker.reset();
        assert!(!playing(&tracker, 2));
    }
}
