//! HTTP client abstraction for testability

use std::time::Duration;

use async_trait::async_trait;

use crate::config::ProbeMethod;
use crate::PulseError;

/// HTTP response from a request
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A single probe request against a monitored endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRequest {
    pub method: ProbeMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

/// Abstraction over HTTP client for dependency injection
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient: Send + Sync {
    /// Send a probe request; only the status line is of interest
    async fn probe(&self, request: &ProbeRequest) -> crate::Result<HttpResponse>;

    /// Send a GET request to the given URL
    async fn get(&self, url: &str) -> crate::Result<HttpResponse>;

    /// Send a POST request with a JSON body
    async fn post_json(&self, url: &str, body: &serde_json::Value)
        -> crate::Result<HttpResponse>;
}

/// Production HTTP client using reqwest
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Build a client that sends `user_agent` on every request.
    ///
    /// `timeout` bounds `get` and `post_json`; probes carry their own timeout.
    pub fn new(user_agent: &str, timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| PulseError::Http(format!("Building HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

fn request_error(method: &str, url: &str, e: reqwest::Error) -> PulseError {
    if e.is_timeout() {
        PulseError::Timeout(format!("{} {}: {}", method, url, e))
    } else {
        PulseError::Http(format!("{} {} failed: {}", method, url, e))
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn probe(&self, request: &ProbeRequest) -> crate::Result<HttpResponse> {
        let method = request.method.as_str();
        tracing::debug!("{} {} (probe)", method, request.url);

        let mut builder = match request.method {
            ProbeMethod::Get => self.client.get(&request.url),
            ProbeMethod::Head => self.client.head(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| request_error(method, &request.url, e))?;

        let status = response.status().as_u16();
        tracing::debug!("{} {} -> {}", method, request.url, status);
        Ok(HttpResponse {
            status,
            body: String::new(),
        })
    }

    async fn get(&self, url: &str) -> crate::Result<HttpResponse> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error("GET", url, e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PulseError::Http(format!("Reading response body: {}", e)))?;

        tracing::debug!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok(HttpResponse { status, body })
    }

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> crate::Result<HttpResponse> {
        tracing::debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| request_error("POST", url, e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PulseError::Http(format!("Reading response body: {}", e)))?;

        tracing::debug!("POST {} -> {} ({} bytes)", url, status, body.len());
        Ok(HttpResponse { status, body })
    }
}
