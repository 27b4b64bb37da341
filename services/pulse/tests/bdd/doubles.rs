//! Test doubles shared by the step definitions

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use pulse::alert::AlertEvent;
use pulse::config::EndpointConfig;
use pulse::io::{HttpClient, HttpResponse, ProbeRequest};
use pulse::log_store::{LogRecord, LogSink};
use pulse::notifier::Notifier;
use pulse::probe::{ProbeResult, Prober};
use pulse::PulseError;

/// Run `f` to completion on a fresh runtime with a paused clock.
///
/// Timers auto-advance when the runtime is idle, so minutes of schedule run
/// instantly. A separate thread keeps it clear of the cucumber runtime.
pub fn run_paused<F, Fut, T>(f: F) -> T
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T>,
    T: Send + 'static,
{
    std::thread::spawn(move || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .expect("failed to build paused runtime")
            .block_on(f())
    })
    .join()
    .expect("paused runtime panicked")
}

/// How a scripted endpoint behaves
#[derive(Debug, Clone, Default)]
pub struct Behaviour {
    /// Time each probe takes
    pub delay: Duration,
    /// Outcome per probe, `true` for healthy; the last one repeats
    pub outcomes: Vec<bool>,
}

/// Prober whose answers are scripted per endpoint name
#[derive(Debug, Default)]
pub struct ScriptedProber {
    behaviours: Mutex<HashMap<String, Behaviour>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedProber {
    pub fn set(&self, name: &str, behaviour: Behaviour) {
        self.behaviours
            .lock()
            .unwrap()
            .insert(name.to_string(), behaviour);
    }

    pub fn calls(&self, name: &str) -> u32 {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, endpoint: &EndpointConfig) -> ProbeResult {
        let timestamp = Utc::now();
        let (delay, healthy) = {
            let behaviour = self
                .behaviours
                .lock()
                .unwrap()
                .get(&endpoint.name)
                .cloned()
                .unwrap_or_default();
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(endpoint.name.clone()).or_insert(0);
            let index = *count as usize;
            *count += 1;
            let healthy = behaviour
                .outcomes
                .get(index)
                .or(behaviour.outcomes.last())
                .copied()
                .unwrap_or(true);
            (behaviour.delay, healthy)
        };

        tokio::time::sleep(delay).await;

        if healthy {
            ProbeResult::completed(endpoint, timestamp, 200, 5.0)
        } else {
            ProbeResult::failed(endpoint, timestamp, "connection refused")
        }
    }
}

/// Canned answer for a probe request
#[derive(Debug, Clone)]
pub enum Scripted {
    Status(u16),
    Refused,
    Hang,
}

/// HTTP client that answers probes from a script and records every request
#[derive(Debug, Default)]
pub struct ScriptedHttpClient {
    script: Mutex<VecDeque<Scripted>>,
    pub probes: Mutex<Vec<ProbeRequest>>,
}

impl ScriptedHttpClient {
    pub fn push(&self, answer: Scripted) {
        self.script.lock().unwrap().push_back(answer);
    }

    fn next(&self) -> Scripted {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap_or(Scripted::Status(200))
        } else {
            script.front().cloned().unwrap_or(Scripted::Status(200))
        }
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn probe(&self, request: &ProbeRequest) -> pulse::Result<HttpResponse> {
        self.probes.lock().unwrap().push(request.clone());
        match self.next() {
            Scripted::Status(status) => Ok(HttpResponse {
                status,
                body: String::new(),
            }),
            Scripted::Refused => Err(PulseError::Http(format!(
                "{} {} failed: connection refused",
                request.method.as_str(),
                request.url
            ))),
            Scripted::Hang => std::future::pending().await,
        }
    }

    async fn get(&self, _url: &str) -> pulse::Result<HttpResponse> {
        Ok(HttpResponse {
            status: 200,
            body: "[]".to_string(),
        })
    }

    async fn post_json(
        &self,
        _url: &str,
        _body: &serde_json::Value,
    ) -> pulse::Result<HttpResponse> {
        Ok(HttpResponse {
            status: 201,
            body: String::new(),
        })
    }
}

/// Log sink that records, or fails every write when `failing` is set
#[derive(Debug, Default)]
pub struct RecordingLogSink {
    pub records: Mutex<Vec<LogRecord>>,
    pub failing: AtomicBool,
}

impl RecordingLogSink {
    pub fn count_for(&self, name: &str) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.name == name)
            .count()
    }
}

#[async_trait]
impl LogSink for RecordingLogSink {
    async fn record(&self, record: &LogRecord) -> pulse::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PulseError::Http("log store unavailable".to_string()));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn fetch_all(&self) -> pulse::Result<Vec<LogRecord>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PulseError::Http("log store unavailable".to_string()));
        }
        Ok(self.records.lock().unwrap().clone())
    }
}

/// Notifier that records every event it is asked to send
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<AlertEvent>>,
}

impl RecordingNotifier {
    pub fn kinds_for(&self, name: &str) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.endpoint_name == name)
            .map(|e| e.kind.to_string())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn type_name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, event: &AlertEvent) -> pulse::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
