//! Background delivery of log records and alert events
//!
//! Lanes never wait on the log store or a notifier. They push onto a bounded
//! queue per target and move on; a worker task per target drains the queue.
//! When a queue is full the oldest entry is dropped and counted.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::alert::AlertEvent;
use crate::log_store::{LogRecord, LogSink};
use crate::notifier::{NotificationRecord, Notifier};
use crate::state::StateHandle;
use crate::PulseError;

/// Failure streak length at which a delivery target is reported as an error
const FAILURE_STREAK_REPORT: u64 = 5;

/// Bounded FIFO that evicts the oldest item when full
#[derive(Debug)]
pub struct DeliveryQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
}

impl<T> DeliveryQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
        }
    }

    /// Enqueue `item`. Returns the evicted item if the queue was full.
    pub async fn push(&self, item: T) -> Option<T> {
        let evicted = {
            let mut items = self.items.lock().await;
            let evicted = if items.len() >= self.capacity {
                items.pop_front()
            } else {
                None
            };
            items.push_back(item);
            evicted
        };
        self.notify.notify_one();
        evicted
    }

    /// Wait for the next item. Returns `None` once `cancel` fires, even if
    /// items remain queued.
    pub async fn pop(&self, cancel: &CancellationToken) -> Option<T> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(item) = self.items.lock().await.pop_front() {
                return Some(item);
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    pub async fn try_pop(&self) -> Option<T> {
        self.items.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

/// Delivery counters for one target
#[derive(Debug, Default)]
pub struct DeliveryCounters {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    consecutive_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
    pub consecutive_failures: u64,
}

impl DeliveryCounters {
    fn record_success(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Returns the current failure streak
    fn record_failure(&self) -> u64 {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns the total dropped so far
    fn record_drop(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
        }
    }
}

/// Counters for both delivery targets
#[derive(Debug, Default)]
pub struct DeliveryStats {
    pub log_store: DeliveryCounters,
    pub notifier: DeliveryCounters,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStatsSnapshot {
    pub log_store: CounterSnapshot,
    pub notifier: CounterSnapshot,
}

impl DeliveryStats {
    pub fn snapshot(&self) -> DeliveryStatsSnapshot {
        DeliveryStatsSnapshot {
            log_store: self.log_store.snapshot(),
            notifier: self.notifier.snapshot(),
        }
    }
}

/// Where the delivery workers send things
pub struct DeliveryTargets {
    pub log_sink: Arc<dyn LogSink>,
    pub notifiers: Vec<Arc<dyn Notifier>>,
    pub state: StateHandle,
    /// Bound on a single delivery attempt
    pub timeout: Duration,
}

/// Handle the lanes use to submit work for delivery
#[derive(Debug, Clone)]
pub struct Dispatcher {
    logs: Arc<DeliveryQueue<LogRecord>>,
    alerts: Arc<DeliveryQueue<AlertEvent>>,
    stats: Arc<DeliveryStats>,
}

impl Dispatcher {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            logs: Arc::new(DeliveryQueue::new(queue_capacity)),
            alerts: Arc::new(DeliveryQueue::new(queue_capacity)),
            stats: Arc::new(DeliveryStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }

    /// Queue a probe result for the log store
    pub async fn submit_log(&self, record: LogRecord) {
        if let Some(dropped) = self.logs.push(record).await {
            let total = self.stats.log_store.record_drop();
            tracing::warn!(
                "Log queue full, dropped result for '{}' at {} ({} dropped so far)",
                dropped.name,
                dropped.timestamp,
                total
            );
        }
    }

    /// Queue an alert event for the notifiers
    pub async fn submit_alert(&self, event: AlertEvent) {
        if let Some(dropped) = self.alerts.push(event).await {
            let total = self.stats.notifier.record_drop();
            tracing::warn!(
                "Alert queue full, dropped {} alert for '{}' ({} dropped so far)",
                dropped.kind,
                dropped.endpoint_name,
                total
            );
        }
    }

    /// Spawn one worker per target.
    ///
    /// Workers stop taking new work when `cancel` fires, then deliver what is
    /// still queued for at most `grace`. Anything left after that is logged
    /// and abandoned.
    pub fn spawn_workers(
        &self,
        targets: DeliveryTargets,
        cancel: CancellationToken,
        grace: Duration,
    ) -> Vec<JoinHandle<()>> {
        let DeliveryTargets {
            log_sink,
            notifiers,
            state,
            timeout,
        } = targets;

        let log_worker = {
            let queue = Arc::clone(&self.logs);
            let stats = Arc::clone(&self.stats);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                run_worker("log store", queue, cancel, grace, |record| {
                    deliver_log(log_sink.as_ref(), &stats, record, timeout)
                })
                .await;
            })
        };

        let alert_worker = {
            let queue = Arc::clone(&self.alerts);
            let stats = Arc::clone(&self.stats);
            tokio::spawn(async move {
                run_worker("notifier", queue, cancel, grace, |event| {
                    deliver_alert(&notifiers, &state, &stats, event, timeout)
                })
                .await;
            })
        };

        vec![log_worker, alert_worker]
    }
}

async fn run_worker<T, F, Fut>(
    target: &'static str,
    queue: Arc<DeliveryQueue<T>>,
    cancel: CancellationToken,
    grace: Duration,
    mut deliver: F,
) where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = ()>,
{
    tracing::debug!("{} delivery worker started", target);

    while let Some(item) = queue.pop(&cancel).await {
        deliver(item).await;
    }

    let pending = queue.len().await;
    if pending > 0 {
        tracing::debug!("Draining {} queued {} deliveries", pending, target);
        let drain = async {
            while let Some(item) = queue.try_pop().await {
                deliver(item).await;
            }
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            tracing::warn!(
                "Abandoned {} undelivered {} items after {:?} shutdown grace",
                queue.len().await,
                target,
                grace
            );
        }
    }

    tracing::debug!("{} delivery worker stopped", target);
}

async fn deliver_log(
    sink: &dyn LogSink,
    stats: &DeliveryStats,
    record: LogRecord,
    timeout: Duration,
) {
    let outcome = tokio::time::timeout(timeout, sink.record(&record))
        .await
        .unwrap_or_else(|_| Err(timed_out("log store", timeout)));

    match outcome {
        Ok(()) => {
            stats.log_store.record_success();
            tracing::trace!("Logged result for '{}'", record.name);
        }
        Err(e) => {
            report_failure("Log store", &stats.log_store, &record.name, &e);
        }
    }
}

async fn deliver_alert(
    notifiers: &[Arc<dyn Notifier>],
    state: &StateHandle,
    stats: &DeliveryStats,
    event: AlertEvent,
    timeout: Duration,
) {
    for notifier in notifiers {
        tracing::debug!(
            "Dispatching {} alert for '{}' to '{}'",
            event.kind,
            event.endpoint_name,
            notifier.type_name()
        );

        let outcome = tokio::time::timeout(timeout, notifier.notify(&event))
            .await
            .unwrap_or_else(|_| Err(timed_out(notifier.type_name(), timeout)));

        match &outcome {
            Ok(()) => stats.notifier.record_success(),
            Err(e) => report_failure(
                &format!("Notifier '{}'", notifier.type_name()),
                &stats.notifier,
                &event.endpoint_name,
                e,
            ),
        }

        let record = NotificationRecord::new(notifier.type_name(), &event, &outcome);
        state.write().await.add_notification(record);
    }
}

fn timed_out(target: &str, timeout: Duration) -> PulseError {
    PulseError::Timeout(format!(
        "{} delivery exceeded {}s",
        target,
        timeout.as_secs_f64()
    ))
}

fn report_failure(target: &str, counters: &DeliveryCounters, endpoint: &str, error: &PulseError) {
    let streak = counters.record_failure();
    tracing::warn!("{} delivery for '{}' failed: {}", target, endpoint, error);
    if streak % FAILURE_STREAK_REPORT == 0 {
        tracing::error!("{} has failed {} deliveries in a row", target, streak);
    }
}
