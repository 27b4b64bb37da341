//! Notifier trait for sending alerts

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::{AlertEvent, AlertKind};

/// Record of a sent notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub endpoint_name: String,
    pub notifier_type: String,
    pub kind: AlertKind,
    pub message: String,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn new(notifier_type: &str, event: &AlertEvent, outcome: &crate::Result<()>) -> Self {
        Self {
            endpoint_name: event.endpoint_name.clone(),
            notifier_type: notifier_type.to_string(),
            kind: event.kind,
            message: event.summary(),
            success: outcome.is_ok(),
            error: outcome.as_ref().err().map(|e| e.to_string()),
            timestamp: event.timestamp,
        }
    }
}

/// Trait for sending notifications
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Get the notifier type name (e.g. "webhook")
    fn type_name(&self) -> &str;

    /// Deliver one alert event
    async fn notify(&self, event: &AlertEvent) -> crate::Result<()>;
}
