//! # Metrics Batcher
//!
//! Queues metric entries and uploads them in batches.
//!
//! ## Queue and Flush
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  send(e) ─────────────────────────────┐                                 │
//! │                                       ▼                                 │
//! │  send_on_change(e) ──► LastSentCache ─► queue: [seq 1][seq 2][seq 3]   │
//! │                        (same value?      │                              │
//! │                         then dropped)    │ flush: snapshot 1..=3        │
//! │                                          ▼                              │
//! │                         POST devices/{id}/metrics {batch_id, metrics}   │
//! │                                          │                              │
//! │                       ok ─► remove seq ≤ 3 (seq 4+ appended meanwhile   │
//! │                             stays queued)                               │
//! │                       err ─► queue untouched                            │
//! │                                                                         │
//! │  TRIGGERS:                                                             │
//! │  • timer (default 300s, MissedTickBehavior::Delay)                     │
//! │  • force_send_metrics()                                                │
//! │  • a flush while one is in flight is a no-op                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Appends only take the queue lock for a push, so they never wait for an
//! upload.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use herald_core::{MetricEntry, MetricKey, MetricValue};

use crate::client::{Method, SyncClient};
use crate::config::LocationMode;
use crate::error::{SdkError, SdkResult};
use crate::protocol::{metrics_path, to_params, MetricsBatchRequest};
use crate::store::LocalStore;

/// Default period of the background flush.
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(300);

/// What a flush did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// This many entries were accepted by the backend.
    Sent(usize),
    Empty,
    /// No device id yet; the queue waits.
    NotRegistered,
    /// Another flush was in flight.
    Coalesced,
}

#[derive(Debug, Clone)]
struct Queued {
    seq: u64,
    entry: MetricEntry,
}

/// Sequence numbers are taken under the same lock as the push, so the
/// queue is always in ascending `seq` order.
#[derive(Debug)]
struct PendingQueue {
    entries: VecDeque<Queued>,
    next_seq: u64,
}

impl PendingQueue {
    fn push(&mut self, entry: MetricEntry) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(Queued { seq, entry });
    }

    /// Removes the entries up to and including `last_seq`.
    fn acknowledge(&mut self, last_seq: u64) {
        while self.entries.front().is_some_and(|q| q.seq <= last_seq) {
            self.entries.pop_front();
        }
    }
}

/// Clears the in-flight flag when a flush ends, on every path.
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// Batcher
// =============================================================================

pub struct MetricsBatcher {
    client: Arc<dyn SyncClient>,
    store: Arc<dyn LocalStore>,

    queue: Mutex<PendingQueue>,

    /// Last value enqueued per key by `send_on_change`.
    last_sent: Mutex<HashMap<MetricKey, MetricValue>>,

    flushing: AtomicBool,

    location_mode: RwLock<LocationMode>,

    interval_tx: watch::Sender<Duration>,
}

impl MetricsBatcher {
    pub fn new(
        client: Arc<dyn SyncClient>,
        store: Arc<dyn LocalStore>,
        send_interval: Duration,
        location_mode: LocationMode,
    ) -> Self {
        let (interval_tx, _) = watch::channel(send_interval);
        MetricsBatcher {
            client,
            store,
            queue: Mutex::new(PendingQueue {
                entries: VecDeque::new(),
                next_seq: 1,
            }),
            last_sent: Mutex::new(HashMap::new()),
            flushing: AtomicBool::new(false),
            location_mode: RwLock::new(location_mode),
            interval_tx,
        }
    }

    // =========================================================================
    // Append
    // =========================================================================

    /// Queues an entry. Returns false if the entry was dropped.
    pub fn send(&self, entry: MetricEntry) -> bool {
        if !self.accepts(&entry) {
            return false;
        }
        self.enqueue(entry);
        true
    }

    /// Queues an entry unless the last value queued for its key is equal.
    ///
    /// The cache is updated here, not when the backend confirms.
    pub fn send_on_change(&self, entry: MetricEntry) -> bool {
        if !self.accepts(&entry) {
            return false;
        }

        {
            let mut last_sent = self.last_sent();
            let key = entry.key();
            if last_sent.get(&key) == Some(&entry.value) {
                debug!(metric_type = %key.metric_type, subtype = %key.subtype, "Unchanged metric suppressed");
                return false;
            }
            last_sent.insert(key, entry.value.clone());
        }

        self.enqueue(entry);
        true
    }

    fn accepts(&self, entry: &MetricEntry) -> bool {
        if entry.is_location() && !self.location_mode().allows_location() {
            debug!("Location acquisition disabled, location metric dropped");
            return false;
        }
        true
    }

    fn enqueue(&self, entry: MetricEntry) {
        let mut queue = self.queue();
        debug!(
            metric_type = %entry.metric_type,
            subtype = %entry.subtype,
            pending = queue.entries.len() + 1,
            "Metric queued"
        );
        queue.push(entry);
    }

    // A panic elsewhere while holding one of these locks leaves the data
    // itself intact, so appends and flushes keep going.
    fn queue(&self) -> MutexGuard<'_, PendingQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn last_sent(&self) -> MutexGuard<'_, HashMap<MetricKey, MetricValue>> {
        self.last_sent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pending_count(&self) -> usize {
        self.queue().entries.len()
    }

    /// Entries waiting to be sent, oldest first.
    pub fn pending(&self) -> Vec<MetricEntry> {
        self.queue()
            .entries
            .iter()
            .map(|q| q.entry.clone())
            .collect()
    }

    /// Forgets every value remembered by `send_on_change`.
    pub fn clear_last_sent(&self) {
        self.last_sent().clear();
    }

    // =========================================================================
    // Settings
    // =========================================================================

    pub fn location_mode(&self) -> LocationMode {
        self.location_mode
            .read()
            .map(|mode| *mode)
            .unwrap_or_default()
    }

    pub fn set_location_mode(&self, mode: LocationMode) {
        if let Ok(mut guard) = self.location_mode.write() {
            *guard = mode;
        }
        info!(%mode, "Location acquisition mode changed");
    }

    pub fn send_interval(&self) -> Duration {
        *self.interval_tx.borrow()
    }

    /// Changes the timer period; a running timer restarts with it.
    pub fn set_send_interval(&self, interval: Duration) -> SdkResult<()> {
        if interval.is_zero() {
            return Err(SdkError::InvalidConfig(
                "metric send interval must be greater than 0".into(),
            ));
        }
        self.interval_tx.send_replace(interval);
        info!(interval_secs = interval.as_secs(), "Metric send interval changed");
        Ok(())
    }

    // =========================================================================
    // Flush
    // =========================================================================

    /// Uploads everything queued right now as one batch.
    pub async fn flush(&self) -> SdkResult<FlushOutcome> {
        if self.flushing.swap(true, Ordering::AcqRel) {
            debug!("Flush already in flight, coalesced");
            return Ok(FlushOutcome::Coalesced);
        }
        let _guard = FlushGuard(&self.flushing);

        let record = self.store.load_record().await?;
        let Some(device_id) = record.device_id() else {
            debug!(pending = self.pending_count(), "Not registered, metrics flush skipped");
            return Ok(FlushOutcome::NotRegistered);
        };

        let (last_seq, entries) = {
            let queue = self.queue();
            let Some(last) = queue.entries.back() else {
                return Ok(FlushOutcome::Empty);
            };
            let entries: Vec<MetricEntry> =
                queue.entries.iter().map(|q| q.entry.clone()).collect();
            (last.seq, entries)
        };

        let batch = MetricsBatchRequest::new(Uuid::new_v4().to_string(), &entries);
        debug!(batch_id = %batch.batch_id, count = entries.len(), "Sending metrics batch");

        match self
            .client
            .submit(&metrics_path(device_id), Method::Post, to_params(&batch))
            .await
        {
            Ok(_) => {
                self.queue().acknowledge(last_seq);
                info!(count = entries.len(), "Metrics batch sent");
                Ok(FlushOutcome::Sent(entries.len()))
            }
            Err(failure) => {
                warn!(
                    status = ?failure.status,
                    error = %failure.message,
                    pending = self.pending_count(),
                    "Metrics batch failed, keeping queue"
                );
                Err(failure.into())
            }
        }
    }

    // =========================================================================
    // Timer
    // =========================================================================

    /// Spawns the periodic flush task.
    pub fn spawn_timer(self: &Arc<Self>) -> MetricsTimer {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let interval_rx = self.interval_tx.subscribe();
        let task = tokio::spawn(Arc::clone(self).run(interval_rx, shutdown_rx));
        MetricsTimer { shutdown_tx, task }
    }

    async fn run(
        self: Arc<Self>,
        mut interval_rx: watch::Receiver<Duration>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let period = *interval_rx.borrow_and_update();
        info!(interval_secs = period.as_secs(), "Metrics timer starting");
        let mut ticker = new_ticker(period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.flush().await {
                        Ok(outcome) => debug!(?outcome, "Timed metrics flush"),
                        Err(e) => warn!(error = %e, "Timed metrics flush failed"),
                    }
                }

                changed = interval_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let period = *interval_rx.borrow_and_update();
                    debug!(interval_secs = period.as_secs(), "Metrics timer reset");
                    ticker = new_ticker(period);
                }

                _ = shutdown_rx.recv() => {
                    info!("Metrics timer shutting down");
                    break;
                }
            }
        }

        info!("Metrics timer stopped");
    }
}

/// First tick one period from now.
fn new_ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Handle of the running flush timer.
pub struct MetricsTimer {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl MetricsTimer {
    /// Stops the timer and waits for the task to end.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Metrics timer task ended abnormally");
        }
    }
}
