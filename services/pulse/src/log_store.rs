//! Log sink: ships every probe result to the external log store
//!
//! The log store speaks a small JSON protocol on a single collection URL:
//! `POST` appends one record, `GET` returns every record as an array.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::io::HttpClient;
use crate::probe::ProbeResult;
use crate::tracker::HealthStatus;
use crate::PulseError;

/// One probe result as stored by the log store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub url: String,
    pub name: String,
    pub status: HealthStatus,
    pub response_time: Option<f64>,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl LogRecord {
    /// Build the record for `result`, already classified as `status`
    pub fn from_result(result: &ProbeResult, status: HealthStatus) -> Self {
        Self {
            url: result.url.clone(),
            name: result.endpoint_name.clone(),
            status,
            response_time: result.response_time_ms,
            status_code: result.status_code,
            error: result.error_message.clone(),
            timestamp: result.timestamp,
        }
    }
}

/// Destination for probe results
#[async_trait]
pub trait LogSink: Send + Sync + std::fmt::Debug {
    /// Append one record
    async fn record(&self, record: &LogRecord) -> crate::Result<()>;

    /// Read back every stored record
    async fn fetch_all(&self) -> crate::Result<Vec<LogRecord>>;
}

/// Log sink backed by the HTTP log store
pub struct HttpLogStore {
    url: String,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for HttpLogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLogStore")
            .field("url", &self.url)
            .finish()
    }
}

impl HttpLogStore {
    pub fn new(url: impl Into<String>, http: Arc<dyn HttpClient>) -> Self {
        Self {
            url: url.into(),
            http,
        }
    }
}

#[async_trait]
impl LogSink for HttpLogStore {
    async fn record(&self, record: &LogRecord) -> crate::Result<()> {
        let body = serde_json::to_value(record)?;
        let response = self.http.post_json(&self.url, &body).await?;

        if !response.is_success() {
            return Err(PulseError::Delivery(format!(
                "log store returned status {} for '{}'",
                response.status, record.name
            )));
        }
        Ok(())
    }

    async fn fetch_all(&self) -> crate::Result<Vec<LogRecord>> {
        let response = self.http.get(&self.url).await?;

        if !response.is_success() {
            return Err(PulseError::Delivery(format!(
                "log store returned status {}",
                response.status
            )));
        }

        let records: Vec<LogRecord> = serde_json::from_str(&response.body)?;
        Ok(records)
    }
}

/// Per-URL time series for charting
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UrlSeries {
    pub name: String,
    pub timestamps: Vec<DateTime<Utc>>,
    pub response_times: Vec<Option<f64>>,
    pub status: Vec<HealthStatus>,
}

/// Stored history grouped by URL
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitoringData {
    /// URLs in order of their earliest record
    pub urls: Vec<String>,
    pub data: BTreeMap<String, UrlSeries>,
}

/// Group records by URL.
///
/// Records are sorted by timestamp first, so both the URL order and each
/// series follow probe time rather than the store's return order.
pub fn group_by_url(mut records: Vec<LogRecord>) -> MonitoringData {
    records.sort_by_key(|r| r.timestamp);

    let mut grouped = MonitoringData::default();
    for record in records {
        let series = grouped.data.entry(record.url.clone()).or_insert_with(|| {
            grouped.urls.push(record.url.clone());
            UrlSeries {
                name: record.name.clone(),
                ..UrlSeries::default()
            }
        });
        series.timestamps.push(record.timestamp);
        series.response_times.push(record.response_time);
        series.status.push(record.status);
    }
    grouped
}
