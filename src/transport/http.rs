use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::{Instrument, debug_span};

use super::{Transport, TransportOptions, TransportResponse};
use crate::{error::TransportError, sanitize::sanitize};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "-rust/", env!("CARGO_PKG_VERSION"));

/// Largest response body kept, in bytes.
const MAX_BODY_BYTES: usize = 4096;

/// Posts notices to the collector with `reqwest`.
///
/// The client keeps a connection pool, so build one transport and share it.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with its own connection pool.
    ///
    /// # Errors
    ///
    /// [`TransportError::Client`] if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Client(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing `reqwest` client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        payload: serde_json::Value,
        options: &TransportOptions,
    ) -> Result<TransportResponse, TransportError> {
        let url = options.notices_url();
        let span = debug_span!("notice_delivery", url = %url);

        async move {
            let body = serde_json::to_vec(&sanitize(
                payload,
                options.max_object_depth,
                &options.filters,
            ))
            .map_err(|e| TransportError::Client(format!("failed to encode payload: {e}")))?;

            let start_time = Instant::now();
            let response = self
                .client
                .post(&url)
                .timeout(options.timeout)
                .header("X-API-Key", &options.api_key)
                .header(CONTENT_TYPE, "application/json")
                .header(ACCEPT, "text/json, application/json")
                .body(body)
                .send()
                .await
                .map_err(|e| {
                    tracing::debug!(duration_ms = start_time.elapsed().as_millis(), "request failed: {e}");
                    if e.is_timeout() {
                        TransportError::Timeout(options.timeout)
                    } else if e.is_connect() {
                        TransportError::Network(format!("connection failed: {e}"))
                    } else {
                        TransportError::Network(e.to_string())
                    }
                })?;

            let status_code = response.status().as_u16();
            let body = match response.bytes().await {
                Ok(bytes) => {
                    let end = bytes.len().min(MAX_BODY_BYTES);
                    String::from_utf8_lossy(&bytes[..end]).into_owned()
                }
                Err(e) => {
                    tracing::debug!("failed to read response body: {e}");
                    String::new()
                }
            };

            tracing::debug!(
                status = status_code,
                duration_ms = start_time.elapsed().as_millis(),
                "collector responded"
            );

            Ok(TransportResponse { status_code, body })
        }
        .instrument(span)
        .await
    }
}
