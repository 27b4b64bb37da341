//! Alert decision: turns state transitions into TRIGGERED/RESOLVED events

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EndpointConfig;
use crate::tracker::{HealthStatus, StateTransition};

/// Kind of alert event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertKind {
    Triggered,
    Resolved,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::Triggered => write!(f, "TRIGGERED"),
            AlertKind::Resolved => write!(f, "RESOLVED"),
        }
    }
}

/// An alert to hand to the notifiers. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub endpoint_name: String,
    pub url: String,
    pub kind: AlertKind,
    /// Failure count at trigger time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consecutive_failures: Option<u32>,
    /// How long the endpoint was down, at resolution time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub down_duration_seconds: Option<u64>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AlertEvent {
    /// One-line human readable summary
    pub fn summary(&self) -> String {
        match self.kind {
            AlertKind::Triggered => format!(
                "{} is DOWN after {} consecutive failed checks",
                self.endpoint_name,
                self.consecutive_failures.unwrap_or_default()
            ),
            AlertKind::Resolved => format!(
                "{} is back UP after {}s down",
                self.endpoint_name,
                self.down_duration_seconds.unwrap_or_default()
            ),
        }
    }
}

/// Decide whether `transition` warrants an alert.
///
/// TRIGGERED fires when the failure count steps from `threshold - 1` to
/// `threshold` while no alert is active. RESOLVED fires on the first healthy
/// result while an alert is active. Everything else, including failures past
/// the threshold and runs that never reach it, yields `None`.
pub fn evaluate(endpoint: &EndpointConfig, transition: &StateTransition) -> Option<AlertEvent> {
    let threshold = endpoint.consecutive_failure_threshold;
    let previous = transition.previous;
    let current = transition.current;

    let crossed_threshold = current.consecutive_failures == threshold
        && previous.consecutive_failures.saturating_add(1) == threshold;

    if !previous.alert_active && crossed_threshold {
        return Some(AlertEvent {
            endpoint_name: endpoint.name.clone(),
            url: endpoint.url.clone(),
            kind: AlertKind::Triggered,
            consecutive_failures: Some(current.consecutive_failures),
            down_duration_seconds: None,
            timestamp: transition.timestamp,
            detail: transition.detail.clone(),
        });
    }

    let recovered = previous.status != HealthStatus::Up && current.status == HealthStatus::Up;
    if previous.alert_active && recovered {
        let down_duration_seconds = transition
            .failing_since
            .map(|since| (transition.timestamp - since).num_seconds().max(0) as u64)
            .unwrap_or_default();

        return Some(AlertEvent {
            endpoint_name: endpoint.name.clone(),
            url: endpoint.url.clone(),
            kind: AlertKind::Resolved,
            consecutive_failures: None,
            down_duration_seconds: Some(down_duration_seconds),
            timestamp: transition.timestamp,
            detail: transition.detail.clone(),
        });
    }

    None
}
