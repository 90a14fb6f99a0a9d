//! # Wire Protocol
//!
//! Request bodies and paths for the manager and universe endpoints.
//!
//! ## Endpoints
//! ```text
//! ┌───────────────────┬────────┬──────────────────────────────────────────┐
//! │ Step              │ Method │ Path                                     │
//! ├───────────────────┼────────┼──────────────────────────────────────────┤
//! │ register app      │ POST   │ apps/register                            │
//! │ token → manager   │ PUT    │ devices/{device_id}/push_token           │
//! │ resolve universe  │ GET    │ devices/{device_id}/universe             │
//! │ token → universe  │ PUT    │ {universe_url}/devices/{id}/push_token   │
//! │ metrics flush     │ POST   │ devices/{device_id}/metrics              │
//! └───────────────────┴────────┴──────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use herald_core::MetricEntry;

pub const REGISTER_APP_PATH: &str = "apps/register";

pub fn manager_push_token_path(device_id: &str) -> String {
    format!("devices/{device_id}/push_token")
}

pub fn universe_resolve_path(device_id: &str) -> String {
    format!("devices/{device_id}/universe")
}

/// Absolute URL on the universe host.
pub fn universe_push_token_url(universe_url: &str, device_id: &str) -> String {
    format!(
        "{}/devices/{device_id}/push_token",
        universe_url.trim_end_matches('/')
    )
}

pub fn metrics_path(device_id: &str) -> String {
    format!("devices/{device_id}/metrics")
}

// =============================================================================
// Registration
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RegisterAppRequest<'a> {
    pub app_id: &'a str,
    pub app_secret: &'a str,
    pub platform: &'a str,
    pub sdk_version: f64,
    /// Sent when re-registering a device that already has an id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<&'a str>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterAppResponse {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub chat_enabled: bool,
    #[serde(default)]
    pub universe_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerPushTokenRequest<'a> {
    pub push_token: &'a str,
    pub notification_types: u8,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UniverseResponse {
    #[serde(default)]
    pub universe_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UniversePushTokenRequest<'a> {
    pub push_token: &'a str,
}

// =============================================================================
// Metrics
// =============================================================================

/// One metrics upload.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsBatchRequest {
    pub batch_id: String,
    pub metrics: Vec<Value>,
}

impl MetricsBatchRequest {
    pub fn new(batch_id: impl Into<String>, entries: &[MetricEntry]) -> Self {
        MetricsBatchRequest {
            batch_id: batch_id.into(),
            metrics: entries.iter().map(MetricEntry::to_wire).collect(),
        }
    }
}

/// Serializes a request body; a failure becomes `Null`.
pub fn to_params<T: Serialize>(body: &T) -> Value {
    serde_json::to_value(body).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(manager_push_token_path("d1"), "devices/d1/push_token");
        assert_eq!(universe_resolve_path("d1"), "devices/d1/universe");
        assert_eq!(metrics_path("d1"), "devices/d1/metrics");
        assert_eq!(
            universe_push_token_url("https://u.example/api/", "d1"),
            "https://u.example/api/devices/d1/push_token"
        );
    }

    #[test]
    fn test_register_request_omits_missing_device_id() {
        let body = to_params(&RegisterAppRequest {
            app_id: "a",
            app_secret: "s",
            platform: "rust",
            sdk_version: 2.0,
            device_id: None,
        });
        assert!(body.get("device_id").is_none());
        assert_eq!(body["platform"], "rust");
    }

    #[test]
    fn test_register_response_defaults() {
        let response: RegisterAppResponse =
            serde_json::from_value(serde_json::json!({"device_id": "d1"})).unwrap();
        assert_eq!(response.device_id.as_deref(), Some("d1"));
        assert!(!response.chat_enabled);
        assert!(response.universe_url.is_none());
    }

    #[test]
    fn test_metrics_batch() {
        let batch = MetricsBatchRequest::new("b-1", &[MetricEntry::subscribe()]);
        let body = to_params(&batch);
        assert_eq!(body["batch_id"], "b-1");
        assert_eq!(body["metrics"][0]["type"], "subscription");
    }
}
