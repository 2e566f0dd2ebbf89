//! Broadcast Hub
//!
//! Owns the subscriber registry and drives the fixed-cadence tick loop that
//! pushes readings to every active stream subscriber.
//!
//! # Architecture
//!
//! ```text
//! ReadingSource ──tick──► BroadcastHub ──try_send──► Subscriber queue ──► socket writer
//!                              │                       (bounded, per subscriber)
//!                              └── registry: SubscriberId → Subscriber
//! ```
//!
//! Each reading is serialized once per tick and shared across subscribers
//! as an `Arc<str>`. Enqueueing never waits: a full queue means the socket
//! writer is stalled and the subscriber is dropped, a closed queue means the
//! writer already ended. Either way the remaining subscribers are unaffected.
//!
//! The registry lock is a synchronous mutex and is never held across an
//! `.await`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{ReadingError, SharedReadingSource};
use crate::domain::reading::Reading;
use crate::domain::subscriber::{CloseReason, SubscriberId, SubscriberState};
use crate::infrastructure::config::BroadcastSettings;
use crate::infrastructure::metrics::{self, TickOutcome};

// =============================================================================
// Configuration
// =============================================================================

/// Hub timing and buffering.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Interval between ticks.
    pub tick_interval: Duration,
    /// Messages buffered per subscriber before it counts as lagging.
    pub subscriber_queue_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        BroadcastSettings::default().into()
    }
}

impl From<BroadcastSettings> for BroadcastConfig {
    fn from(settings: BroadcastSettings) -> Self {
        Self {
            tick_interval: settings.tick_interval,
            subscriber_queue_capacity: settings.subscriber_queue_capacity.max(1),
        }
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Registry entry for one active subscriber.
#[derive(Debug)]
struct Subscriber {
    tx: mpsc::Sender<Arc<str>>,
    state: SubscriberState,
}

impl Subscriber {
    /// Mark the entry closed. Dropping it afterwards releases the queue,
    /// which ends the connection's writer.
    fn close(mut self, id: SubscriberId, reason: CloseReason) {
        if let Err(e) = self.state.transition(SubscriberState::Closed) {
            tracing::warn!(subscriber = %id, error = %e, "Subscriber already closed");
        }
        metrics::record_subscriber_closed(reason);
    }
}

/// Receiving half handed to a connection task on registration.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<str>>,
}

impl Subscription {
    /// Identifier assigned by the hub.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next serialized reading.
    ///
    /// Returns `None` once the hub has dropped this subscriber. Cancel safe.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }
}

/// Result of fanning one reading out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Subscribers that accepted the message.
    pub delivered: usize,
    /// Subscribers removed because they could not accept it.
    pub dropped: usize,
}

// =============================================================================
// Broadcast Hub
// =============================================================================

/// Central hub for live reading distribution.
///
/// # Example
///
/// ```rust,ignore
/// let hub = Arc::new(BroadcastHub::new(BroadcastConfig::default(), source));
///
/// let mut subscription = hub.register();
/// tokio::spawn({
///     let hub = Arc::clone(&hub);
///     async move { hub.run(cancel).await }
/// });
/// while let Some(json) = subscription.recv().await {
///     // write json to the socket
/// }
/// ```
pub struct BroadcastHub {
    config: BroadcastConfig,
    source: SharedReadingSource,
    registry: Mutex<HashMap<SubscriberId, Subscriber>>,
    running: AtomicBool,
    ticks_attempted: AtomicU64,
    ticks_skipped: AtomicU64,
    messages_delivered: AtomicU64,
    subscribers_dropped: AtomicU64,
}

impl std::fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("config", &self.config)
            .field("source", &self.source.name())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl BroadcastHub {
    /// Create a hub fed by `source`.
    #[must_use]
    pub fn new(config: BroadcastConfig, source: SharedReadingSource) -> Self {
        Self {
            config,
            source,
            registry: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            ticks_attempted: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            messages_delivered: AtomicU64::new(0),
            subscribers_dropped: AtomicU64::new(0),
        }
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Add a subscriber whose handshake has completed.
    ///
    /// A registration that races with an in-progress broadcast is seen either
    /// by that broadcast or by the next one.
    #[must_use]
    pub fn register(&self) -> Subscription {
        let id = SubscriberId::new();
        let (tx, rx) = mpsc::channel(self.config.subscriber_queue_capacity);
        // Entries only exist once the handshake is done.
        let state = SubscriberState::Active;

        let active = {
            let mut registry = self.registry.lock();
            registry.insert(id, Subscriber { tx, state });
            registry.len()
        };

        metrics::set_subscribers(active);
        tracing::info!(subscriber = %id, active, "Subscriber registered");
        Subscription { id, rx }
    }

    /// Remove a subscriber.
    ///
    /// Returns `false` if the hub had already dropped it.
    pub fn deregister(&self, id: SubscriberId, reason: CloseReason) -> bool {
        let (removed, active) = {
            let mut registry = self.registry.lock();
            let removed = registry.remove(&id);
            (removed, registry.len())
        };

        let Some(subscriber) = removed else {
            return false;
        };
        subscriber.close(id, reason);
        metrics::set_subscribers(active);
        tracing::info!(subscriber = %id, reason = %reason, active, "Subscriber deregistered");
        true
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Drop every subscriber. Used on shutdown.
    pub fn close_all(&self) {
        let drained: Vec<_> = self.registry.lock().drain().collect();
        let count = drained.len();
        for (id, subscriber) in drained {
            subscriber.close(id, CloseReason::Shutdown);
        }
        metrics::set_subscribers(0);
        if count > 0 {
            tracing::info!(count, "Closed all subscribers");
        }
    }

    // =========================================================================
    // Fan-out
    // =========================================================================

    /// Deliver one reading to every active subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error if the reading cannot be serialized; nothing is sent.
    pub fn broadcast(&self, reading: &Reading) -> Result<FanOut, serde_json::Error> {
        let payload: Arc<str> = serde_json::to_string(reading)?.into();
        Ok(self.fan_out(&payload))
    }

    fn fan_out(&self, payload: &Arc<str>) -> FanOut {
        let mut failed = Vec::new();
        let mut delivered = 0;

        let (closed, active) = {
            let mut registry = self.registry.lock();
            for (id, subscriber) in registry.iter() {
                match subscriber.tx.try_send(Arc::clone(payload)) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => failed.push((*id, CloseReason::Lagging)),
                    Err(TrySendError::Closed(_)) => failed.push((*id, CloseReason::SendFailed)),
                }
            }
            let closed: Vec<_> = failed
                .into_iter()
                .filter_map(|(id, reason)| registry.remove(&id).map(|s| (id, s, reason)))
                .collect();
            (closed, registry.len())
        };

        let dropped = closed.len();
        for (id, subscriber, reason) in closed {
            tracing::warn!(subscriber = %id, reason = %reason, "Dropping subscriber");
            subscriber.close(id, reason);
        }

        self.messages_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.subscribers_dropped
            .fetch_add(dropped as u64, Ordering::Relaxed);
        metrics::record_messages_sent(delivered as u64);
        if dropped > 0 {
            metrics::set_subscribers(active);
        }

        FanOut { delivered, dropped }
    }

    // =========================================================================
    // Tick Loop
    // =========================================================================

    /// Run one tick: produce a reading and broadcast it.
    ///
    /// A failed `produce()` skips the tick; the next tick is the retry.
    pub async fn tick(&self) -> TickOutcome {
        self.ticks_attempted.fetch_add(1, Ordering::Relaxed);

        let outcome = match self.source.produce().await {
            Ok(reading) => match self.broadcast(&reading) {
                Ok(fan_out) => {
                    tracing::debug!(
                        delivered = fan_out.delivered,
                        dropped = fan_out.dropped,
                        "Broadcast reading"
                    );
                    TickOutcome::Broadcast
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize reading");
                    TickOutcome::Failed
                }
            },
            Err(ReadingError::NotFound) => {
                tracing::debug!(source = self.source.name(), "No reading available, skipping tick");
                TickOutcome::NoData
            }
            Err(e) => {
                tracing::warn!(
                    source = self.source.name(),
                    kind = e.kind(),
                    error = %e,
                    "Failed to produce reading, skipping tick"
                );
                metrics::record_reading_error("tick", &e);
                TickOutcome::Failed
            }
        };

        if outcome != TickOutcome::Broadcast {
            self.ticks_skipped.fetch_add(1, Ordering::Relaxed);
        }
        metrics::record_tick(outcome);
        outcome
    }

    /// Run the tick loop until `cancel` fires, then drop all subscribers.
    ///
    /// The first tick fires immediately. Ticks missed while a slow
    /// `produce()` is in flight are skipped rather than bursted.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let _running = RunningGuard::start(self);
        tracing::info!(
            source = self.source.name(),
            interval_ms = u64::try_from(self.config.tick_interval.as_millis()).unwrap_or(u64::MAX),
            "Broadcast loop started"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = self.tick() => {}
            }
        }
    }

    /// Whether the tick loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Snapshot of hub counters.
    #[must_use]
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            active_subscribers: self.subscriber_count(),
            ticks_attempted: self.ticks_attempted.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            subscribers_dropped: self.subscribers_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Marks the tick loop running for as long as it lives.
///
/// Dropped on every exit from [`BroadcastHub::run`], including a panic
/// inside a tick, so readiness never outlives the loop.
struct RunningGuard<'a> {
    hub: &'a BroadcastHub,
}

impl<'a> RunningGuard<'a> {
    fn start(hub: &'a BroadcastHub) -> Self {
        hub.running.store(true, Ordering::Release);
        Self { hub }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.hub.running.store(false, Ordering::Release);
        self.hub.close_all();
        if std::thread::panicking() {
            tracing::error!("Broadcast loop aborted by panic");
        } else {
            tracing::info!("Broadcast loop stopped");
        }
    }
}

/// Shared broadcast hub reference.
pub type SharedBroadcastHub = Arc<BroadcastHub>;

/// Hub counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastStats {
    /// Subscribers currently registered.
    pub active_subscribers: usize,
    /// Ticks started.
    pub ticks_attempted: u64,
    /// Ticks that broadcast nothing.
    pub ticks_skipped: u64,
    /// Messages enqueued for subscribers.
    pub messages_delivered: u64,
    /// Subscribers removed by fan-out because they could not keep up.
    pub subscribers_dropped: u64,
}

// =============================================================================
// Tests
// =============================================================================
