//! Transport layer for scan requests.
//!
//! The query builder only needs "POST this JSON, give me status and body".
//! [`Transport`] is that seam; [`HttpTransport`] implements it with reqwest,
//! and tests substitute their own implementations.

use async_trait::async_trait;
use screener_common::config::{ScannerConfig, DEFAULT_TIMEOUT_SECS};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, ScanError};

pub use screener_common::config::DEFAULT_USER_AGENT;

// ============================================================================
// Constants
// ============================================================================

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(DEFAULT_TIMEOUT_SECS);

/// Origin the scanner expects requests from
const SCANNER_ORIGIN: &str = "https://www.tradingview.com";

// ============================================================================
// Request / Response
// ============================================================================

/// Per-request options handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    /// Extra headers, applied after the transport defaults
    pub headers: Vec<(String, String)>,
    /// Abort the request after this long
    pub timeout: Duration,
    /// Raw `Cookie` header value
    pub cookie: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            cookie: None,
        }
    }
}

impl RequestOptions {
    /// Options derived from the scanner config (timeout and cookie).
    pub fn from_config(config: &ScannerConfig) -> Self {
        Self {
            headers: Vec::new(),
            timeout: Duration::from_secs(config.timeout_secs),
            cookie: config.cookie.clone(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Raw response: status code and body text.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into [`ScanError::Http`] carrying status and body.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            warn!(status = self.status, body = %self.body, "Scanner rejected request");
            Err(ScanError::Http {
                status: self.status,
                body: self.body,
            })
        }
    }
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Sends a JSON document to a URL and returns the raw response.
///
/// Implementations return `Ok` for any response that arrived, whatever its
/// status; status handling belongs to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
        options: &RequestOptions,
    ) -> Result<TransportResponse>;
}

// ============================================================================
// HTTP Transport
// ============================================================================

/// reqwest-backed transport with the scanner's expected default headers.
pub struct HttpTransport {
    client: reqwest::Client,
    default_headers: Vec<(String, String)>,
}

impl HttpTransport {
    /// Create a transport with the default browser-like headers.
    pub fn new() -> Self {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    /// Create a transport sending a custom user agent.
    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            default_headers: vec![
                ("accept".into(), "application/json".into()),
                ("origin".into(), SCANNER_ORIGIN.into()),
                ("referer".into(), format!("{SCANNER_ORIGIN}/")),
                ("user-agent".into(), user_agent.into()),
            ],
        }
    }

    /// Create from config
    pub fn from_config(config: &ScannerConfig) -> Self {
        Self::with_user_agent(config.user_agent.clone())
    }

    fn build_request(
        &self,
        url: &str,
        body: &serde_json::Value,
        options: &RequestOptions,
    ) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(url).timeout(options.timeout);

        for (name, value) in self.default_headers.iter().chain(options.headers.iter()) {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(cookie) = &options.cookie {
            builder = builder.header(reqwest::header::COOKIE, cookie.as_str());
        }

        builder.json(body)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
        options: &RequestOptions,
    ) -> Result<TransportResponse> {
        let timeout_ms = options.timeout.as_millis() as u64;
        debug!(url = %url, timeout_ms, "Posting scan request");

        let response = self
            .build_request(url, body, options)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ScanError::Timeout
                } else if e.is_connect() {
                    ScanError::Network(format!("Connection failed: {e}"))
                } else {
                    ScanError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ScanError::Timeout
            } else {
                ScanError::Network(format!("Failed to read response body: {e}"))
            }
        })?;

        debug!(status, bytes = body.len(), "Scan response received");

        Ok(TransportResponse { status, body })
    }
}
