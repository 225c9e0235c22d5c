//! Sending payloads to the collector.
//!
//! The delivery pipeline only depends on the [`Transport`] trait. With the
//! `http` feature (on by default) [`HttpTransport`] posts payloads over
//! HTTPS; tests and unusual deployments can plug in their own.
//!
//! ```
//! use async_trait::async_trait;
//! use honeybadger::{
//!     TransportError,
//!     transport::{Transport, TransportOptions, TransportResponse},
//! };
//!
//! /// Prints payloads instead of sending them.
//! struct StdoutTransport;
//!
//! #[async_trait]
//! impl Transport for StdoutTransport {
//!     async fn send(
//!         &self,
//!         payload: serde_json::Value,
//!         _options: &TransportOptions,
//!     ) -> Result<TransportResponse, TransportError> {
//!         println!("{payload}");
//!         Ok(TransportResponse {
//!             status_code: 201,
//!             body: r#"{"id":"local"}"#.to_owned(),
//!         })
//!     }
//! }
//! ```

#[cfg(feature = "http")]
mod http;

use core::time::Duration;

use async_trait::async_trait;

#[cfg(feature = "http")]
pub use self::http::HttpTransport;
use crate::{config::Config, error::TransportError};

/// Path of the notices endpoint, relative to the configured endpoint.
pub const NOTICES_PATH: &str = "/v1/notices";

/// Per-request settings derived from the client's [`Config`].
#[derive(Clone, Debug)]
pub struct TransportOptions {
    /// Base URL of the collector.
    pub endpoint: String,
    /// Project API key.
    pub api_key: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Depth limit for [`sanitize`](crate::sanitize::sanitize).
    pub max_object_depth: usize,
    /// Key filters for [`sanitize`](crate::sanitize::sanitize).
    pub filters: Vec<String>,
}

impl TransportOptions {
    pub(crate) fn new(config: &Config, api_key: &str) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: api_key.to_owned(),
            timeout: config.timeout,
            max_object_depth: config.max_object_depth,
            filters: config.filters.clone(),
        }
    }

    /// Full URL of the notices endpoint.
    #[must_use]
    pub fn notices_url(&self) -> String {
        format!("{}{NOTICES_PATH}", self.endpoint.trim_end_matches('/'))
    }
}

/// What the collector answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body.
    pub body: String,
}

impl TransportResponse {
    /// Whether the status code is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// The notice id from a JSON body such as `{"id":"..."}`.
    #[must_use]
    pub fn notice_id(&self) -> Option<String> {
        let body: serde_json::Value = serde_json::from_str(&self.body).ok()?;
        match body.get("id")? {
            serde_json::Value::String(id) => Some(id.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Sends one notice payload.
///
/// Implementations must not assume they run synchronously, and should apply
/// [`sanitize`](crate::sanitize::sanitize) before serializing. A transport
/// performs a single attempt; retries are out of scope.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends `payload` and reports the collector's answer.
    async fn send(
        &self,
        payload: serde_json::Value,
        options: &TransportOptions,
    ) -> Result<TransportResponse, TransportError>;
}
