//! Webhook notification client

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::alert::{AlertEvent, AlertKind};
use crate::config::{NotifierConfig, WebhookFormat};
use crate::io::HttpClient;
use crate::notifier::Notifier;
use crate::PulseError;

const COLOR_RED: u32 = 0xFF0000;
const COLOR_GREEN: u32 = 0x00FF00;

/// Posts alert events to a webhook URL
pub struct WebhookNotifier {
    url: String,
    format: WebhookFormat,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URL usually embeds a token; keep it out of logs
        f.debug_struct("WebhookNotifier")
            .field("format", &self.format)
            .finish()
    }
}

impl WebhookNotifier {
    pub fn new(config: &NotifierConfig, http: Arc<dyn HttpClient>) -> Self {
        let NotifierConfig::Webhook { url, format } = config;

        tracing::debug!("Created WebhookNotifier with format {:?}", format);

        Self {
            url: url.clone(),
            format: *format,
            http,
        }
    }

    /// Build the request body for `event`
    pub fn payload(&self, event: &AlertEvent) -> serde_json::Value {
        match self.format {
            WebhookFormat::Json => json!(event),
            WebhookFormat::Discord => discord_payload(event),
        }
    }
}

fn discord_payload(event: &AlertEvent) -> serde_json::Value {
    let (title, color) = match event.kind {
        AlertKind::Triggered => ("Endpoint DOWN", COLOR_RED),
        AlertKind::Resolved => ("Endpoint recovered", COLOR_GREEN),
    };

    let mut fields = vec![
        json!({"name": "Endpoint", "value": event.endpoint_name, "inline": true}),
        json!({"name": "URL", "value": event.url, "inline": true}),
        json!({"name": "Last Check", "value": event.timestamp.to_rfc3339(), "inline": true}),
    ];
    if let Some(detail) = &event.detail {
        fields.push(json!({"name": "Detail", "value": detail, "inline": false}));
    }

    json!({
        "embeds": [{
            "title": title,
            "description": event.summary(),
            "color": color,
            "fields": fields,
        }]
    })
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn type_name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, event: &AlertEvent) -> crate::Result<()> {
        let payload = self.payload(event);

        tracing::debug!(
            "Sending webhook notification: endpoint='{}', kind={}",
            event.endpoint_name,
            event.kind
        );

        let response = self.http.post_json(&self.url, &payload).await?;

        if !response.is_success() {
            return Err(PulseError::Delivery(format!(
                "webhook returned status {}: {}",
                response.status, response.body
            )));
        }

        tracing::debug!("Webhook notification sent successfully");
        Ok(())
    }
}
