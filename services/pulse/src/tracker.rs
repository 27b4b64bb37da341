//! Endpoint state tracker
//!
//! One [`EndpointState`] per endpoint, owned by that endpoint's lane in the
//! engine. Nothing here does I/O or takes a lock: the lane is the only writer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::{self, AlertEvent, AlertKind};
use crate::config::EndpointConfig;
use crate::probe::ProbeResult;

/// Health of an endpoint as seen by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Up => write!(f, "UP"),
            HealthStatus::Down => write!(f, "DOWN"),
            HealthStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Decide whether a probe result counts as healthy.
///
/// Transport failures are always `Down`. A completed exchange is `Up` when
/// `accept_any_status` is set, when it matches `expected_status`, or, with no
/// expected status, when the code is 2xx or 3xx.
pub fn classify(endpoint: &EndpointConfig, result: &ProbeResult) -> HealthStatus {
    let Some(code) = result.status_code.filter(|_| result.success) else {
        return HealthStatus::Down;
    };

    let healthy = if endpoint.accept_any_status {
        true
    } else if let Some(expected) = endpoint.expected_status {
        code == expected
    } else {
        (200..400).contains(&code)
    };

    if healthy {
        HealthStatus::Up
    } else {
        HealthStatus::Down
    }
}

/// The fields of [`EndpointState`] the alert decision looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub alert_active: bool,
}

/// Before/after view of one applied probe result
#[derive(Debug, Clone, PartialEq)]
pub struct StateTransition {
    pub sequence: u64,
    pub previous: StateSnapshot,
    pub current: StateSnapshot,
    pub timestamp: DateTime<Utc>,
    /// Start of the failure run this result belongs to or just ended
    pub failing_since: Option<DateTime<Utc>>,
    /// Error message or status line of the applied result
    pub detail: Option<String>,
}

/// A result arrived after a newer one had already been applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("stale probe result #{sequence}: #{last_applied} already applied")]
pub struct StaleResult {
    pub sequence: u64,
    pub last_applied: u64,
}

/// Per-endpoint state machine
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointState {
    pub current_status: HealthStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub alert_active: bool,
    pub last_result: Option<ProbeResult>,
    failing_since: Option<DateTime<Utc>>,
    last_sequence: u64,
}

impl Default for EndpointState {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointState {
    pub fn new() -> Self {
        Self {
            current_status: HealthStatus::Unknown,
            consecutive_failures: 0,
            consecutive_successes: 0,
            alert_active: false,
            last_result: None,
            failing_since: None,
            last_sequence: 0,
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            status: self.current_status,
            consecutive_failures: self.consecutive_failures,
            alert_active: self.alert_active,
        }
    }

    /// Sequence number of the most recently applied result (0 before any)
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Start of the current failure run, if the endpoint is failing
    pub fn failing_since(&self) -> Option<DateTime<Utc>> {
        self.failing_since
    }

    /// Apply a probe result.
    ///
    /// `sequence` numbers the probes of this endpoint in start order starting
    /// at 1; a result whose sequence is not newer than the last applied one is
    /// rejected and leaves the state untouched.
    pub fn apply_result(
        &mut self,
        endpoint: &EndpointConfig,
        sequence: u64,
        result: ProbeResult,
    ) -> Result<StateTransition, StaleResult> {
        if sequence <= self.last_sequence {
            return Err(StaleResult {
                sequence,
                last_applied: self.last_sequence,
            });
        }

        let previous = self.snapshot();
        let timestamp = result.timestamp;
        let previous_failing_since = self.failing_since;
        let detail = match (&result.error_message, result.status_code) {
            (Some(error), _) => Some(error.clone()),
            (None, Some(code)) => Some(format!("HTTP {}", code)),
            (None, None) => None,
        };

        let failing_since = match classify(endpoint, &result) {
            HealthStatus::Up => {
                self.consecutive_failures = 0;
                self.consecutive_successes = self.consecutive_successes.saturating_add(1);
                self.current_status = HealthStatus::Up;
                self.failing_since = None;
                previous_failing_since
            }
            _ => {
                if self.consecutive_failures == 0 {
                    self.failing_since = Some(timestamp);
                }
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.consecutive_successes = 0;
                self.current_status = HealthStatus::Down;
                self.failing_since
            }
        };

        self.last_result = Some(result);
        self.last_sequence = sequence;

        Ok(StateTransition {
            sequence,
            previous,
            current: self.snapshot(),
            timestamp,
            failing_since,
            detail,
        })
    }

    /// Record that the notifier is being told about `event`
    pub fn record_alert(&mut self, event: &AlertEvent) {
        self.alert_active = event.kind == AlertKind::Triggered;
    }

    /// Apply a result, run the alert decision on the transition and record
    /// any resulting alert. The returned transition reflects the final
    /// `alert_active`.
    pub fn observe(
        &mut self,
        endpoint: &EndpointConfig,
        sequence: u64,
        result: ProbeResult,
    ) -> Result<(StateTransition, Option<AlertEvent>), StaleResult> {
        let mut transition = self.apply_result(endpoint, sequence, result)?;
        let event = alert::evaluate(endpoint, &transition);
        if let Some(event) = &event {
            self.record_alert(event);
            transition.current.alert_active = self.alert_active;
        }
        Ok((transition, event))
    }
}
