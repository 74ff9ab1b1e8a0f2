//! Rate-limited outbound command queue.
//!
//! The RS-232 side of the bridge drops commands that arrive back-to-back,
//! so every transmission is followed by a fixed spacing interval before the
//! next one. The queue hands encoded wire strings to the connection session
//! through an unbounded channel; it never touches the socket itself.
//!
//! The in-flight bookkeeping is an explicit phase machine (`Idle`,
//! `Sending`, `Scheduled`) plus an epoch counter. Every scheduled spacing
//! continuation carries the epoch it was created under; `clear()` bumps the
//! epoch, so a continuation firing after a clear is a no-op. A continuation
//! that observes `Sending` (a continuation it didn't schedule) self-heals
//! instead of double-sending.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::SessionConfig;
use crate::utils::now_millis;

/// One pending outbound command.
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    /// Encoded wire string, without terminator.
    pub wire: String,
    /// Unix millis when the command was enqueued.
    pub enqueued_at: u64,
}

/// Queue processing phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueuePhase {
    /// Nothing in flight and no continuation scheduled.
    Idle,
    /// A transmission is being handed to the sink right now.
    Sending,
    /// A spacing continuation is scheduled to fire.
    Scheduled,
}

#[derive(Debug)]
struct QueueInner {
    pending: VecDeque<QueuedCommand>,
    phase: QueuePhase,
    /// Bumped by `clear()`; stale continuations compare against it.
    epoch: u64,
    /// Sink to the connection session; replaced on each `open()`.
    sink: mpsc::UnboundedSender<String>,
}

/// FIFO command queue with enforced minimum inter-command spacing.
///
/// No priority and no dedup: duplicate or superseding commands are all
/// transmitted in order. Queueing can be disabled by configuration, in
/// which case `enqueue` transmits synchronously with no spacing.
pub struct CommandQueue {
    inner: Mutex<QueueInner>,
    spacing: Duration,
    enabled: bool,
}

impl CommandQueue {
    /// Creates a queue feeding the given session sink.
    pub fn new(sink: mpsc::UnboundedSender<String>, config: &SessionConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(QueueInner {
                pending: VecDeque::new(),
                phase: QueuePhase::Idle,
                epoch: 0,
                sink,
            }),
            spacing: config.command_spacing(),
            enabled: config.queue_enabled,
        })
    }

    /// Replaces the session sink. Called when a new session generation
    /// opens; commands already handed to the old sink stay with the old
    /// session and die with it.
    pub(crate) fn rebind(&self, sink: mpsc::UnboundedSender<String>) {
        self.inner.lock().sink = sink;
    }

    /// Appends a command and starts processing if idle.
    pub fn enqueue(self: &Arc<Self>, wire: String) {
        if !self.enabled {
            log::debug!("[CommandQueue] queueing disabled, transmitting directly: {wire}");
            self.inner.lock().transmit(&wire);
            return;
        }

        let mut inner = self.inner.lock();
        inner.pending.push_back(QueuedCommand {
            wire,
            enqueued_at: now_millis(),
        });
        if inner.phase == QueuePhase::Idle {
            self.send_next_locked(&mut inner);
        }
    }

    /// Drops all pending entries and resets the in-flight bookkeeping.
    ///
    /// Bumping the epoch atomically invalidates any scheduled continuation,
    /// so the "processing" flag can never outlive the queue contents it
    /// described.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.pending.len();
        inner.pending.clear();
        inner.phase = QueuePhase::Idle;
        inner.epoch += 1;
        if dropped > 0 {
            log::info!("[CommandQueue] cleared {dropped} pending command(s)");
        }
    }

    /// Whether a transmission is in flight or commands are waiting.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        let inner = self.inner.lock();
        inner.phase != QueuePhase::Idle || !inner.pending.is_empty()
    }

    /// Number of commands waiting (excludes the one in flight).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }

    /// Pops and transmits the oldest entry, then schedules the spacing
    /// continuation. Caller holds the lock.
    fn send_next_locked(self: &Arc<Self>, inner: &mut QueueInner) {
        let Some(command) = inner.pending.pop_front() else {
            inner.phase = QueuePhase::Idle;
            return;
        };
        inner.phase = QueuePhase::Sending;
        inner.transmit(&command.wire);
        inner.phase = QueuePhase::Scheduled;

        let epoch = inner.epoch;
        let queue = Arc::clone(self);
        let spacing = self.spacing;
        tokio::spawn(async move {
            tokio::time::sleep(spacing).await;
            queue.on_spacing_elapsed(epoch);
        });
    }

    /// Spacing continuation. No-op when the epoch is stale (queue cleared
    /// since scheduling); self-heals when the phase desynchronized.
    fn on_spacing_elapsed(self: &Arc<Self>, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            log::trace!("[CommandQueue] stale continuation ignored (epoch {epoch})");
            return;
        }
        match inner.phase {
            QueuePhase::Scheduled => self.send_next_locked(&mut inner),
            QueuePhase::Sending => {
                // A continuation we didn't schedule is running; the phase
                // flag desynchronized from the queue contents. Recover.
                log::warn!("[CommandQueue] phase desync detected, self-healing");
                self.send_next_locked(&mut inner);
            }
            QueuePhase::Idle => {}
        }
    }
}

impl QueueInner {
    /// Hands one wire string to the session. A closed sink means no session
    /// generation is listening; the command is dropped.
    fn transmit(&self, wire: &str) {
        if self.sink.send(wire.to_string()).is_err() {
            log::debug!("[CommandQueue] no active session, dropping: {wire}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::{advance, sleep, Instant};

    fn test_queue(spacing_ms: u64) -> (Arc<CommandQueue>, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut config = SessionConfig::new("host", 23);
        config.command_spacing_ms = spacing_ms;
        (CommandQueue::new(tx, &config), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn first_command_transmits_immediately() {
        let (queue, mut rx) = test_queue(500);
        queue.enqueue("*Z01ON".to_string());
        assert_eq!(rx.try_recv().unwrap(), "*Z01ON");
        assert!(queue.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_is_spaced_and_ordered() {
        let (queue, mut rx) = test_queue(500);
        let start = Instant::now();
        for i in 1..=3 {
            queue.enqueue(format!("*Z{i:02}ON"));
        }

        let mut stamps = Vec::new();
        for expected in ["*Z01ON", "*Z02ON", "*Z03ON"] {
            let line = rx.recv().await.unwrap();
            assert_eq!(line, expected);
            stamps.push(Instant::now() - start);
        }
        // Gaps between consecutive transmissions are >= the spacing
        assert!(stamps[1] - stamps[0] >= Duration::from_millis(500));
        assert!(stamps[2] - stamps[1] >= Duration::from_millis(500));

        // Queue drains back to idle after the trailing spacing elapses
        sleep(Duration::from_millis(600)).await;
        assert!(!queue.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_stops_further_sends() {
        let (queue, mut rx) = test_queue(500);
        for i in 1..=3 {
            queue.enqueue(format!("*Z{i:02}ON"));
        }
        assert_eq!(rx.try_recv().unwrap(), "*Z01ON");

        queue.clear();
        assert!(!queue.is_busy());

        // The already-scheduled continuation fires into a cleared queue
        advance(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_after_clear_starts_fresh() {
        let (queue, mut rx) = test_queue(500);
        queue.enqueue("*Z01ON".to_string());
        queue.clear();

        queue.enqueue("*Z02ON".to_string());
        assert_eq!(rx.recv().await.unwrap(), "*Z01ON");
        assert_eq!(rx.recv().await.unwrap(), "*Z02ON");

        // The pre-clear continuation must not cause a double-send
        advance(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_during_spacing_window_waits_its_turn() {
        let (queue, mut rx) = test_queue(500);
        queue.enqueue("*Z01ON".to_string());
        assert_eq!(rx.try_recv().unwrap(), "*Z01ON");

        sleep(Duration::from_millis(200)).await;
        queue.enqueue("*Z02ON".to_string());
        // Still inside the spacing window
        assert!(rx.try_recv().is_err());

        sleep(Duration::from_millis(300)).await;
        // The spacing continuation wakes at the same instant; let it run
        tokio::task::yield_now().await;
        assert_eq!(rx.try_recv().unwrap(), "*Z02ON");
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_queue_transmits_synchronously() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut config = SessionConfig::new("host", 23);
        config.queue_enabled = false;
        let queue = CommandQueue::new(tx, &config);

        queue.enqueue("*Z01ON".to_string());
        queue.enqueue("*Z02ON".to_string());
        assert_eq!(rx.try_recv().unwrap(), "*Z01ON");
        assert_eq!(rx.try_recv().unwrap(), "*Z02ON");
        assert!(!queue.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sink_discards_without_panic() {
        let (queue, rx) = test_queue(500);
        drop(rx);
        queue.enqueue("*Z01ON".to_string());
        sleep(Duration::from_secs(1)).await;
        assert!(!queue.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn desynced_sending_phase_self_heals() {
        let (queue, mut rx) = test_queue(500);
        // Force the inconsistent shape directly: a continuation observing
        // `Sending` can only mean the phase flag desynchronized from the
        // queue contents
        let epoch = {
            let mut inner = queue.inner.lock();
            inner.pending.push_back(QueuedCommand {
                wire: "*Z06ON".to_string(),
                enqueued_at: now_millis(),
            });
            inner.phase = QueuePhase::Sending;
            inner.epoch
        };

        queue.on_spacing_elapsed(epoch);
        assert_eq!(rx.try_recv().unwrap(), "*Z06ON");

        // The recovered send resumes the normal spacing cycle
        sleep(Duration::from_millis(600)).await;
        assert!(!queue.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn rebind_routes_to_new_sink() {
        let (queue, mut old_rx) = test_queue(500);
        queue.enqueue("*Z01ON".to_string());
        assert_eq!(old_rx.try_recv().unwrap(), "*Z01ON");
        sleep(Duration::from_millis(600)).await;

        let (new_tx, mut new_rx) = mpsc::unbounded_channel();
        queue.rebind(new_tx);
        queue.enqueue("*Z02ON".to_string());
        assert_eq!(new_rx.try_recv().unwrap(), "*Z02ON");
        assert!(old_rx.try_recv().is_err());
    }
}
