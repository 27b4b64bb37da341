//! Probe client: one health check against one endpoint
//!
//! The prober only distinguishes a completed HTTP exchange from a transport
//! failure. Whether a status code is healthy is decided later by
//! [`crate::tracker::classify`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::EndpointConfig;
use crate::io::{HttpClient, ProbeRequest};

/// Outcome of a single probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub endpoint_name: String,
    pub url: String,
    /// Start of the probe (first attempt)
    pub timestamp: DateTime<Utc>,
    /// True when an HTTP exchange completed, whatever its status code
    pub success: bool,
    pub status_code: Option<u16>,
    pub response_time_ms: Option<f64>,
    pub error_message: Option<String>,
}

impl ProbeResult {
    pub fn completed(
        endpoint: &EndpointConfig,
        timestamp: DateTime<Utc>,
        status_code: u16,
        response_time_ms: f64,
    ) -> Self {
        Self {
            endpoint_name: endpoint.name.clone(),
            url: endpoint.url.clone(),
            timestamp,
            success: true,
            status_code: Some(status_code),
            response_time_ms: Some(response_time_ms),
            error_message: None,
        }
    }

    pub fn failed(
        endpoint: &EndpointConfig,
        timestamp: DateTime<Utc>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            endpoint_name: endpoint.name.clone(),
            url: endpoint.url.clone(),
            timestamp,
            success: false,
            status_code: None,
            response_time_ms: None,
            error_message: Some(error_message.into()),
        }
    }
}

/// Trait for probing an endpoint
#[async_trait]
pub trait Prober: Send + Sync + std::fmt::Debug {
    /// Probe the endpoint. Expected failures are reported in the result,
    /// never as a panic or error.
    async fn probe(&self, endpoint: &EndpointConfig) -> ProbeResult;
}

/// Prober backed by an [`HttpClient`]
pub struct HttpProber {
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for HttpProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProber").finish()
    }
}

impl HttpProber {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, endpoint: &EndpointConfig) -> ProbeResult {
        let timestamp = Utc::now();
        let request = ProbeRequest {
            method: endpoint.method,
            url: endpoint.url.clone(),
            headers: endpoint
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            timeout: endpoint.timeout(),
        };

        let attempts = endpoint.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let started = Instant::now();
            match tokio::time::timeout(endpoint.timeout(), self.http.probe(&request)).await {
                Ok(Ok(response)) => {
                    let elapsed = elapsed_ms(started);
                    tracing::debug!(
                        "Probe '{}' -> {} in {}ms (attempt {}/{})",
                        endpoint.name,
                        response.status,
                        elapsed,
                        attempt,
                        attempts
                    );
                    return ProbeResult::completed(endpoint, timestamp, response.status, elapsed);
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!(
                        "{} {} timed out after {}s",
                        endpoint.method.as_str(),
                        endpoint.url,
                        endpoint.timeout_seconds
                    )
                }
            }

            tracing::debug!(
                "Probe '{}' failed (attempt {}/{}): {}",
                endpoint.name,
                attempt,
                attempts,
                last_error
            );

            if attempt < attempts {
                tokio::time::sleep(endpoint.retry_delay()).await;
            }
        }

        ProbeResult::failed(endpoint, timestamp, last_error)
    }
}

/// Milliseconds since `started`, rounded to two decimals
fn elapsed_ms(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 100_000.0).round() / 100.0
}
