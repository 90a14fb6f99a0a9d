//! # Sync Client
//!
//! The request/response collaborator every engine talks to.
//!
//! ## Request Routing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  submit("apps/register", Post, {...})                                  │
//! │       │  relative path                                                  │
//! │       ▼                                                                 │
//! │  manager base URL ──join──► https://manager/api/v1/apps/register       │
//! │                                                                         │
//! │  submit("https://universe/devices/d1/push_token", Put, {...})          │
//! │       │  absolute http(s) URL                                           │
//! │       ▼                                                                 │
//! │  used as-is (universe host)                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Exactly one of `Ok(SyncResponse)` / `Err(SyncFailure)` comes back per call.
//! Only a 2xx status is a success.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{SdkError, SdkResult};

// =============================================================================
// Request / Response Types
// =============================================================================

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// Class of an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Informational,
    Successful,
    Redirection,
    ClientError,
    ServerError,
    Unknown,
}

impl StatusClass {
    pub fn of(status: u16) -> Self {
        match status {
            100..=199 => StatusClass::Informational,
            200..=299 => StatusClass::Successful,
            300..=399 => StatusClass::Redirection,
            400..=499 => StatusClass::ClientError,
            500..=599 => StatusClass::ServerError,
            _ => StatusClass::Unknown,
        }
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResponse {
    pub status: u16,
    /// Parsed JSON body; `Null` when the body was empty.
    pub body: Value,
}

impl SyncResponse {
    pub fn new(status: u16, body: Value) -> Self {
        SyncResponse { status, body }
    }

    /// Returns a non-empty string field of the body.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.body
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// A failed request: transport failure, timeout, or non-2xx status.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncFailure {
    /// HTTP status, if a response arrived.
    pub status: Option<u16>,
    pub message: String,
    /// Parsed error body, if any.
    pub body: Option<Value>,
    pub timed_out: bool,
    pub timeout_secs: u64,
}

impl SyncFailure {
    /// No response arrived.
    pub fn transport(message: impl Into<String>) -> Self {
        SyncFailure {
            status: None,
            message: message.into(),
            body: None,
            timed_out: false,
            timeout_secs: 0,
        }
    }

    /// A response arrived with a non-success status.
    pub fn status(status: u16, message: impl Into<String>, body: Option<Value>) -> Self {
        SyncFailure {
            status: Some(status),
            message: message.into(),
            body,
            timed_out: false,
            timeout_secs: 0,
        }
    }

    pub fn timeout(secs: u64) -> Self {
        SyncFailure {
            status: None,
            message: format!("timed out after {secs}s"),
            body: None,
            timed_out: true,
            timeout_secs: secs,
        }
    }

    pub fn status_class(&self) -> Option<StatusClass> {
        self.status.map(StatusClass::of)
    }
}

// =============================================================================
// Sync Client Trait
// =============================================================================

/// Asynchronous request/response collaborator.
#[async_trait]
pub trait SyncClient: Send + Sync {
    /// Submits a request.
    ///
    /// `path` is relative to the manager base URL, or an absolute http(s) URL.
    async fn submit(
        &self,
        path: &str,
        method: Method,
        params: Value,
    ) -> Result<SyncResponse, SyncFailure>;

    /// Tells the client which device id to attach to later requests.
    fn set_device_id(&self, _device_id: Option<&str>) {}
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// Settings for [`HttpSyncClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub app_id: Option<String>,
}

/// `SyncClient` over HTTPS with JSON bodies.
pub struct HttpSyncClient {
    http: reqwest::Client,
    base_url: Url,
    timeout_secs: u64,
    app_id: Option<String>,
    device_id: RwLock<Option<String>>,
}

impl HttpSyncClient {
    /// Builds the client. The base URL gets a trailing slash so joins keep
    /// its last path segment.
    pub fn new(config: HttpClientConfig) -> SdkResult<Self> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(SdkError::InvalidUrl(format!(
                "Manager URL must be http or https, got: {}",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(HttpSyncClient {
            http,
            base_url,
            timeout_secs: config.request_timeout.as_secs(),
            app_id: config.app_id,
            device_id: RwLock::new(None),
        })
    }

    /// Resolves a request path against the manager base URL.
    pub fn resolve(&self, path: &str) -> Result<Url, SyncFailure> {
        let resolved = if is_absolute_http(path) {
            Url::parse(path)
        } else {
            self.base_url.join(path.trim_start_matches('/'))
        };
        resolved.map_err(|e| SyncFailure::transport(format!("invalid request URL '{path}': {e}")))
    }

    fn current_device_id(&self) -> Option<String> {
        self.device_id.read().ok().and_then(|guard| guard.clone())
    }
}

fn is_absolute_http(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

#[async_trait]
impl SyncClient for HttpSyncClient {
    async fn submit(
        &self,
        path: &str,
        method: Method,
        params: Value,
    ) -> Result<SyncResponse, SyncFailure> {
        let url = self.resolve(path)?;
        debug!(%method, %url, "Submitting request");

        let mut request = match method {
            Method::Get => self.http.get(url.clone()).query(&query_pairs(&params)),
            Method::Post => self.http.post(url.clone()).json(&params),
            Method::Put => self.http.put(url.clone()).json(&params),
            Method::Delete => self.http.delete(url.clone()).json(&params),
        };

        if let Some(ref app_id) = self.app_id {
            request = request.header("X-App-Id", app_id);
        }
        if let Some(device_id) = self.current_device_id() {
            request = request.header("X-Device-Id", device_id);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SyncFailure::timeout(self.timeout_secs)
            } else {
                SyncFailure::transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| SyncFailure::transport(e.to_string()))?;
        let body = parse_body(&text);

        if StatusClass::of(status) == StatusClass::Successful {
            Ok(SyncResponse::new(status, body))
        } else {
            warn!(%method, %url, status, "Request rejected");
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| format!("{method} {url} returned {status}"));
            Err(SyncFailure::status(status, message, Some(body)))
        }
    }

    fn set_device_id(&self, device_id: Option<&str>) {
        if let Ok(mut guard) = self.device_id.write() {
            *guard = device_id.map(str::to_owned);
        }
    }
}

/// Empty body is `Null`; a body that is not JSON is kept as a string.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Flattens top-level params into query pairs.
fn query_pairs(params: &Value) -> Vec<(String, String)> {
    match params {
        Value::Object(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect(),
        _ => Vec::new(),
    }
}
