//! Pulse - HTTP endpoint uptime monitoring and alerting service
//!
//! Probes HTTP(S) endpoints on a fixed schedule, ships every result to an
//! external log store and raises a single alert per failure episode.

pub mod alert;
pub mod config;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod io;
pub mod log_store;
pub mod notifier;
pub mod probe;
pub mod state;
pub mod status;
pub mod tracker;
pub mod webhook;

pub use config::{load_config, Config};
pub use error::{PulseError, Result};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::NotifierConfig;
use crate::delivery::{DeliveryStats, DeliveryTargets, Dispatcher};
use crate::engine::Engine;
use crate::io::{HttpClient, ReqwestHttpClient};
use crate::log_store::{HttpLogStore, LogSink};
use crate::notifier::Notifier;
use crate::probe::{HttpProber, Prober};
use crate::state::StateHandle;
use crate::status::StatusState;
use crate::webhook::WebhookNotifier;

/// Builder for the pulse service.
///
/// Every collaborator defaults to its production implementation built from
/// the config; tests inject their own.
pub struct PulseBuilder {
    config: Config,
    http: Option<Arc<dyn HttpClient>>,
    prober: Option<Arc<dyn Prober>>,
    log_sink: Option<Arc<dyn LogSink>>,
    notifiers: Option<Vec<Arc<dyn Notifier>>>,
    cancel: Option<CancellationToken>,
}

impl PulseBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http: None,
            prober: None,
            log_sink: None,
            notifiers: None,
            cancel: None,
        }
    }

    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn with_log_sink(mut self, log_sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(log_sink);
        self
    }

    pub fn with_notifiers(mut self, notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        self.notifiers = Some(notifiers);
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Validate the config and wire up the service
    pub async fn build(self) -> Result<Pulse> {
        let config = self.config;
        config.validate_roster()?;

        let http: Arc<dyn HttpClient> = match self.http {
            Some(http) => http,
            None => Arc::new(ReqwestHttpClient::new(
                &config.user_agent,
                config.delivery_timeout(),
            )?),
        };

        let prober: Arc<dyn Prober> = match self.prober {
            Some(prober) => prober,
            None => Arc::new(HttpProber::new(Arc::clone(&http))),
        };

        let log_sink: Arc<dyn LogSink> = match self.log_sink {
            Some(sink) => sink,
            None => {
                config.validate_log_store()?;
                Arc::new(HttpLogStore::new(
                    config.log_store.url.clone(),
                    Arc::clone(&http),
                ))
            }
        };

        let notifiers = match self.notifiers {
            Some(notifiers) => notifiers,
            None => {
                config.validate_notifiers()?;
                config
                    .notifiers
                    .iter()
                    .map(|notifier_config| -> Arc<dyn Notifier> {
                        match notifier_config {
                            NotifierConfig::Webhook { .. } => Arc::new(WebhookNotifier::new(
                                notifier_config,
                                Arc::clone(&http),
                            )),
                        }
                    })
                    .collect()
            }
        };

        let state = state::new_state_handle(&config.endpoints, config.status.history_size);
        let dispatcher = Dispatcher::new(config.delivery.queue_capacity);

        tracing::debug!(
            "Built pulse: {} endpoints, {} notifiers",
            config.endpoints.len(),
            notifiers.len()
        );

        Ok(Pulse {
            config,
            prober,
            log_sink,
            notifiers,
            state,
            dispatcher,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

/// A wired-up pulse service, ready to start
pub struct Pulse {
    config: Config,
    prober: Arc<dyn Prober>,
    log_sink: Arc<dyn LogSink>,
    notifiers: Vec<Arc<dyn Notifier>>,
    state: StateHandle,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
}

impl Pulse {
    pub fn state(&self) -> StateHandle {
        Arc::clone(&self.state)
    }

    pub fn delivery_stats(&self) -> Arc<DeliveryStats> {
        self.dispatcher.stats()
    }

    /// Token that stops the service when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until the cancellation token fires or ctrl-c is received.
    ///
    /// Lanes stop first and get the shutdown grace period for in-flight
    /// probes; delivery workers then get the same grace to drain.
    pub async fn start(self) -> Result<()> {
        let grace = self.config.shutdown_grace();

        let cancel_for_signal = self.cancel.clone();
        let signal_task = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                    cancel_for_signal.cancel();
                }
                Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
            }
        });

        let delivery_cancel = CancellationToken::new();
        let workers = self.dispatcher.spawn_workers(
            DeliveryTargets {
                log_sink: Arc::clone(&self.log_sink),
                notifiers: self.notifiers.clone(),
                state: Arc::clone(&self.state),
                timeout: self.config.delivery_timeout(),
            },
            delivery_cancel.clone(),
            grace,
        );

        if self.config.status.enabled {
            let status_state = StatusState {
                state: Arc::clone(&self.state),
                stats: self.dispatcher.stats(),
                log_sink: Arc::clone(&self.log_sink),
            };
            let port = self.config.status.port;
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = status::serve(status_state, port, cancel).await {
                    tracing::error!("{}. Continuing without status API.", e);
                }
            });
        }

        tracing::info!(
            "Pulse started, monitoring {} endpoints",
            self.config.endpoints.len()
        );

        let engine = Engine::new(
            self.config.endpoints.clone(),
            Arc::clone(&self.prober),
            self.dispatcher.clone(),
            Arc::clone(&self.state),
            self.cancel.clone(),
            grace,
        );
        engine.run().await;

        tracing::debug!("All lanes stopped, draining delivery queues");
        delivery_cancel.cancel();
        for worker in workers {
            if let Err(e) = worker.await {
                tracing::error!("Delivery worker terminated abnormally: {}", e);
            }
        }
        signal_task.abort();

        tracing::info!("Pulse stopped");
        Ok(())
    }
}
