//! Shared read model for endpoint statuses and notification history
//!
//! Each lane owns its [`EndpointState`]; after every applied result it
//! publishes a copy here for the status API to read.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::EndpointConfig;
use crate::notifier::NotificationRecord;
use crate::tracker::{EndpointState, HealthStatus};

/// Published status of a single endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointStatus {
    pub name: String,
    pub url: String,
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub alert_active: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub last_change: Option<DateTime<Utc>>,
    pub last_status_code: Option<u16>,
    pub last_response_time_ms: Option<f64>,
    pub last_error: Option<String>,
    pub interval_seconds: u64,
    /// Ticks skipped because the previous probe was still running
    pub skipped_ticks: u64,
}

impl EndpointStatus {
    fn new(endpoint: &EndpointConfig) -> Self {
        Self {
            name: endpoint.name.clone(),
            url: endpoint.url.clone(),
            status: HealthStatus::Unknown,
            consecutive_failures: 0,
            consecutive_successes: 0,
            alert_active: false,
            last_check: None,
            last_change: None,
            last_status_code: None,
            last_response_time_ms: None,
            last_error: None,
            interval_seconds: endpoint.interval_seconds,
            skipped_ticks: 0,
        }
    }
}

/// Shared state accessible by the lanes and the status API
#[derive(Debug)]
pub struct SharedState {
    pub endpoints: Vec<EndpointStatus>,
    pub history: VecDeque<NotificationRecord>,
    pub history_max_size: usize,
    pub started_at: Instant,
}

impl SharedState {
    pub fn new(endpoints: &[EndpointConfig], history_max_size: usize) -> Self {
        Self {
            endpoints: endpoints.iter().map(EndpointStatus::new).collect(),
            history: VecDeque::with_capacity(history_max_size),
            history_max_size,
            started_at: Instant::now(),
        }
    }

    /// Publish an endpoint's state, returning true if its status changed
    pub fn update_endpoint(&mut self, name: &str, state: &EndpointState) -> bool {
        let Some(status) = self.endpoints.iter_mut().find(|e| e.name == name) else {
            return false;
        };

        let changed = status.status != state.current_status;
        status.status = state.current_status;
        status.consecutive_failures = state.consecutive_failures;
        status.consecutive_successes = state.consecutive_successes;
        status.alert_active = state.alert_active;

        if let Some(result) = &state.last_result {
            status.last_check = Some(result.timestamp);
            status.last_status_code = result.status_code;
            status.last_response_time_ms = result.response_time_ms;
            status.last_error = result.error_message.clone();
            if changed {
                status.last_change = Some(result.timestamp);
            }
        }
        changed
    }

    /// Count a tick skipped while a probe was in flight
    pub fn record_skipped_tick(&mut self, name: &str) {
        if let Some(status) = self.endpoints.iter_mut().find(|e| e.name == name) {
            status.skipped_ticks += 1;
        }
    }

    pub fn get_endpoint(&self, name: &str) -> Option<&EndpointStatus> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    /// Add a notification to history
    pub fn add_notification(&mut self, record: NotificationRecord) {
        if self.history_max_size == 0 {
            return;
        }
        if self.history.len() >= self.history_max_size {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }
}

/// Thread-safe shared state handle
pub type StateHandle = Arc<RwLock<SharedState>>;

pub fn new_state_handle(endpoints: &[EndpointConfig], history_max_size: usize) -> StateHandle {
    Arc::new(RwLock::new(SharedState::new(endpoints, history_max_size)))
}
