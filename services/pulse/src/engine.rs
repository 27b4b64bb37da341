//! Engine: one independent probe lane per endpoint
//!
//! A lane owns its endpoint's [`EndpointState`] and is the only code that
//! mutates it. Probes run as separate tasks so a slow endpoint never delays
//! another one, and at most one probe per endpoint is in flight: a tick that
//! fires while the previous probe is still running is skipped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::EndpointConfig;
use crate::delivery::Dispatcher;
use crate::log_store::LogRecord;
use crate::probe::{ProbeResult, Prober};
use crate::state::StateHandle;
use crate::tracker::{classify, EndpointState};

/// The engine runs a probe lane per endpoint
pub struct Engine {
    endpoints: Vec<EndpointConfig>,
    prober: Arc<dyn Prober>,
    dispatcher: Dispatcher,
    state: StateHandle,
    cancel: CancellationToken,
    grace: Duration,
}

impl Engine {
    pub fn new(
        endpoints: Vec<EndpointConfig>,
        prober: Arc<dyn Prober>,
        dispatcher: Dispatcher,
        state: StateHandle,
        cancel: CancellationToken,
        grace: Duration,
    ) -> Self {
        Self {
            endpoints,
            prober,
            dispatcher,
            state,
            cancel,
            grace,
        }
    }

    /// Start every lane. Returns once the cancellation token is triggered and
    /// every lane has wound down.
    pub async fn run(&self) {
        let mut handles = Vec::with_capacity(self.endpoints.len());

        for endpoint in &self.endpoints {
            let lane = Lane {
                endpoint: Arc::new(endpoint.clone()),
                prober: Arc::clone(&self.prober),
                dispatcher: self.dispatcher.clone(),
                shared: Arc::clone(&self.state),
                cancel: self.cancel.clone(),
                grace: self.grace,
            };
            tracing::debug!(
                "Starting lane for '{}' every {}s",
                endpoint.name,
                endpoint.interval_seconds
            );
            handles.push(tokio::spawn(lane.run()));
        }

        self.cancel.cancelled().await;

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Probe lane terminated abnormally: {}", e);
            }
        }
    }
}

struct Lane {
    endpoint: Arc<EndpointConfig>,
    prober: Arc<dyn Prober>,
    dispatcher: Dispatcher,
    shared: StateHandle,
    cancel: CancellationToken,
    grace: Duration,
}

struct InFlight {
    sequence: u64,
    handle: JoinHandle<()>,
}

impl Lane {
    async fn run(self) {
        let name = self.endpoint.name.clone();
        let mut state = EndpointState::new();
        let mut ticker = tokio::time::interval(self.endpoint.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Capacity 1 suffices: a lane never has more than one probe in flight
        let (result_tx, mut result_rx) = mpsc::channel::<(u64, ProbeResult)>(1);
        let mut next_sequence = 0u64;
        let mut in_flight: Option<InFlight> = None;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Lane for '{}' cancelled", name);
                    break;
                }
                Some((sequence, result)) = result_rx.recv() => {
                    if in_flight.as_ref().is_some_and(|p| p.sequence == sequence) {
                        in_flight = None;
                    }
                    self.handle_result(&mut state, sequence, result).await;
                }
                _ = ticker.tick() => {
                    if let Some(probe) = &in_flight {
                        tracing::debug!(
                            "Skipping tick for '{}': probe #{} still running",
                            name,
                            probe.sequence
                        );
                        self.shared.write().await.record_skipped_tick(&name);
                    } else {
                        next_sequence += 1;
                        in_flight = Some(InFlight {
                            sequence: next_sequence,
                            handle: self.spawn_probe(next_sequence, result_tx.clone()),
                        });
                    }
                }
            }
        }

        self.finish(&mut state, in_flight, &mut result_rx).await;
    }

    fn spawn_probe(&self, sequence: u64, tx: mpsc::Sender<(u64, ProbeResult)>) -> JoinHandle<()> {
        let prober = Arc::clone(&self.prober);
        let endpoint = Arc::clone(&self.endpoint);
        tokio::spawn(async move {
            let result = prober.probe(&endpoint).await;
            // The lane may already be gone during shutdown
            let _ = tx.send((sequence, result)).await;
        })
    }

    /// Give an in-flight probe the grace period to finish, then abandon it
    async fn finish(
        &self,
        state: &mut EndpointState,
        in_flight: Option<InFlight>,
        result_rx: &mut mpsc::Receiver<(u64, ProbeResult)>,
    ) {
        let Some(probe) = in_flight else {
            return;
        };

        match tokio::time::timeout(self.grace, result_rx.recv()).await {
            Ok(Some((sequence, result))) => {
                self.handle_result(state, sequence, result).await;
            }
            _ => {
                probe.handle.abort();
                tracing::info!(
                    "Abandoned probe #{} for '{}' at shutdown",
                    probe.sequence,
                    self.endpoint.name
                );
            }
        }
    }

    async fn handle_result(&self, state: &mut EndpointState, sequence: u64, result: ProbeResult) {
        let endpoint = self.endpoint.as_ref();
        let record = LogRecord::from_result(&result, classify(endpoint, &result));

        let (transition, event) = match state.observe(endpoint, sequence, result) {
            Ok(outcome) => outcome,
            Err(stale) => {
                tracing::warn!("Discarding result for '{}': {}", endpoint.name, stale);
                return;
            }
        };

        tracing::debug!(
            "Probe '{}' #{}: {} -> {} (failures={})",
            endpoint.name,
            sequence,
            transition.previous.status,
            transition.current.status,
            transition.current.consecutive_failures
        );
        if transition.previous.status != transition.current.status {
            tracing::info!(
                "'{}' is now {}{}",
                endpoint.name,
                transition.current.status,
                transition
                    .detail
                    .as_deref()
                    .map(|d| format!(" ({})", d))
                    .unwrap_or_default()
            );
        }

        self.shared.write().await.update_endpoint(&endpoint.name, state);
        self.dispatcher.submit_log(record).await;

        if let Some(event) = event {
            tracing::info!("{} alert: {}", event.kind, event.summary());
            self.dispatcher.submit_alert(event).await;
        }
    }
}
