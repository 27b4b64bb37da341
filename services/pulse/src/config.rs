//! Configuration types for the pulse service

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::PulseError;

/// Environment variable that overrides `log_store.url`
pub const LOG_STORE_URL_ENV: &str = "PULSE_LOG_STORE_URL";

/// Environment variable that overrides the webhook notifier URL
pub const WEBHOOK_URL_ENV: &str = "PULSE_WEBHOOK_URL";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub log_store: LogStoreConfig,
    #[serde(default)]
    pub notifiers: Vec<NotifierConfig>,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            log_store: LogStoreConfig::default(),
            notifiers: Vec::new(),
            delivery: DeliveryConfig::default(),
            limits: LimitsConfig::default(),
            status: StatusConfig::default(),
            shutdown_grace_seconds: default_shutdown_grace(),
            user_agent: default_user_agent(),
        }
    }
}

/// A single monitored endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_failure_threshold")]
    pub consecutive_failure_threshold: u32,
    #[serde(default)]
    pub method: ProbeMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Only this status code counts as healthy when set
    #[serde(default)]
    pub expected_status: Option<u16>,
    /// Any completed HTTP exchange counts as healthy
    #[serde(default)]
    pub accept_any_status: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
}

impl EndpointConfig {
    /// Create an endpoint with default schedule, timeout and threshold
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            interval_seconds: default_interval(),
            timeout_seconds: default_timeout(),
            consecutive_failure_threshold: default_failure_threshold(),
            method: ProbeMethod::default(),
            headers: BTreeMap::new(),
            expected_status: None,
            accept_any_status: false,
            max_attempts: default_max_attempts(),
            retry_delay_seconds: default_retry_delay(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

/// HTTP method used for probing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMethod {
    #[default]
    Get,
    Head,
}

impl ProbeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeMethod::Get => "GET",
            ProbeMethod::Head => "HEAD",
        }
    }
}

/// External log store collaborator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogStoreConfig {
    /// Collection URL: results are POSTed here and history is read with GET
    #[serde(default)]
    pub url: String,
}

/// Notifier configuration with tagged enum for extensibility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotifierConfig {
    #[serde(rename = "webhook")]
    Webhook {
        url: String,
        #[serde(default)]
        format: WebhookFormat,
    },
}

impl NotifierConfig {
    pub fn type_name(&self) -> &str {
        match self {
            NotifierConfig::Webhook { .. } => "webhook",
        }
    }

    pub fn url(&self) -> &str {
        match self {
            NotifierConfig::Webhook { url, .. } => url,
        }
    }
}

/// Payload shape posted to a webhook
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookFormat {
    /// Discord-compatible embed
    #[default]
    Discord,
    /// The alert event serialized as plain JSON
    Json,
}

/// Background delivery settings shared by the log sink and notifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_delivery_timeout")]
    pub timeout_seconds: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            timeout_seconds: default_delivery_timeout(),
        }
    }
}

/// Upper bounds applied when validating the monitoring universe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_endpoints")]
    pub max_endpoints: usize,
    #[serde(default = "default_allowed_schemes")]
    pub allowed_schemes: Vec<String>,
    #[serde(default = "default_max_timeout")]
    pub max_timeout_seconds: u64,
    #[serde(default = "default_max_interval")]
    pub max_interval_seconds: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_endpoints: default_max_endpoints(),
            allowed_schemes: default_allowed_schemes(),
            max_timeout_seconds: default_max_timeout(),
            max_interval_seconds: default_max_interval(),
        }
    }
}

/// Status API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_status_port")]
    pub port: u16,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_status_port(),
            history_size: default_history_size(),
        }
    }
}

fn default_interval() -> u64 {
    60
}

fn default_timeout() -> u64 {
    10
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_delay() -> u64 {
    1
}

fn default_queue_capacity() -> usize {
    256
}

fn default_delivery_timeout() -> u64 {
    5
}

fn default_max_endpoints() -> usize {
    100
}

fn default_allowed_schemes() -> Vec<String> {
    vec!["http".to_string(), "https".to_string()]
}

fn default_max_timeout() -> u64 {
    60
}

fn default_max_interval() -> u64 {
    86_400
}

fn default_true() -> bool {
    true
}

fn default_status_port() -> u16 {
    11120
}

fn default_history_size() -> usize {
    100
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_user_agent() -> String {
    format!("pulse/{}", env!("CARGO_PKG_VERSION"))
}

impl Config {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery.timeout_seconds)
    }

    /// Apply process-wide URL overrides from the environment.
    ///
    /// `lookup` is `std::env::var` in production; tests pass a closure.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(LOG_STORE_URL_ENV).filter(|v| !v.is_empty()) {
            tracing::debug!("Log store URL overridden by {}", LOG_STORE_URL_ENV);
            self.log_store.url = url;
        }

        if let Some(new_url) = lookup(WEBHOOK_URL_ENV).filter(|v| !v.is_empty()) {
            tracing::debug!("Webhook URL overridden by {}", WEBHOOK_URL_ENV);
            match self.notifiers.first_mut() {
                Some(NotifierConfig::Webhook { url, .. }) => *url = new_url,
                None => self.notifiers.push(NotifierConfig::Webhook {
                    url: new_url,
                    format: WebhookFormat::default(),
                }),
            }
        }
    }

    /// Check the monitoring universe and delivery channels.
    ///
    /// Any error here is fatal: the service must not start with an invalid
    /// roster.
    pub fn validate(&self) -> crate::Result<()> {
        self.validate_roster()?;
        self.validate_log_store()?;
        self.validate_notifiers()
    }

    /// Check the endpoint roster and delivery settings
    pub fn validate_roster(&self) -> crate::Result<()> {
        if self.endpoints.is_empty() {
            return Err(config_error("no endpoints configured"));
        }
        if self.endpoints.len() > self.limits.max_endpoints {
            return Err(config_error(format!(
                "{} endpoints configured, at most {} allowed",
                self.endpoints.len(),
                self.limits.max_endpoints
            )));
        }

        let mut names = HashSet::new();
        for endpoint in &self.endpoints {
            self.validate_endpoint(endpoint)?;
            if !names.insert(endpoint.name.as_str()) {
                return Err(config_error(format!(
                    "duplicate endpoint name '{}'",
                    endpoint.name
                )));
            }
        }

        if self.delivery.queue_capacity == 0 {
            return Err(config_error("delivery.queue_capacity must be at least 1"));
        }

        Ok(())
    }

    pub fn validate_log_store(&self) -> crate::Result<()> {
        if self.log_store.url.is_empty() {
            return Err(config_error(format!(
                "log store URL is not set (config log_store.url or {})",
                LOG_STORE_URL_ENV
            )));
        }
        parse_url("log store", &self.log_store.url, &default_allowed_schemes())?;
        Ok(())
    }

    pub fn validate_notifiers(&self) -> crate::Result<()> {
        if self.notifiers.is_empty() {
            return Err(config_error(format!(
                "no notifier configured (config notifiers or {})",
                WEBHOOK_URL_ENV
            )));
        }
        for notifier in &self.notifiers {
            parse_url(
                &format!("{} notifier", notifier.type_name()),
                notifier.url(),
                &default_allowed_schemes(),
            )?;
        }
        Ok(())
    }

    fn validate_endpoint(&self, endpoint: &EndpointConfig) -> crate::Result<()> {
        if endpoint.name.trim().is_empty() {
            return Err(config_error(format!(
                "endpoint with url '{}' has an empty name",
                endpoint.url
            )));
        }
        let label = format!("endpoint '{}'", endpoint.name);
        parse_url(&label, &endpoint.url, &self.limits.allowed_schemes)?;

        if endpoint.interval_seconds == 0
            || endpoint.interval_seconds > self.limits.max_interval_seconds
        {
            return Err(config_error(format!(
                "{}: interval_seconds must be between 1 and {}, got {}",
                label, self.limits.max_interval_seconds, endpoint.interval_seconds
            )));
        }
        if endpoint.timeout_seconds == 0
            || endpoint.timeout_seconds > self.limits.max_timeout_seconds
        {
            return Err(config_error(format!(
                "{}: timeout_seconds must be between 1 and {}, got {}",
                label, self.limits.max_timeout_seconds, endpoint.timeout_seconds
            )));
        }
        if endpoint.consecutive_failure_threshold == 0 {
            return Err(config_error(format!(
                "{}: consecutive_failure_threshold must be at least 1",
                label
            )));
        }
        if endpoint.max_attempts == 0 {
            return Err(config_error(format!(
                "{}: max_attempts must be at least 1",
                label
            )));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> PulseError {
    PulseError::Config(message.into())
}

fn parse_url(label: &str, raw: &str, allowed_schemes: &[String]) -> crate::Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| config_error(format!("{}: invalid url '{}': {}", label, raw, e)))?;
    if !allowed_schemes.iter().any(|s| s == url.scheme()) {
        return Err(config_error(format!(
            "{}: url '{}' uses scheme '{}', allowed: {}",
            label,
            raw,
            url.scheme(),
            allowed_schemes.join(", ")
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(config_error(format!("{}: url '{}' has no host", label, raw)));
    }
    Ok(url)
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PulseError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
