//! Error types.
//!
//! Only [`InvalidInputError`] can come back from [`Client::notify`]. Reporting
//! problems ([`ReportingError`]) are absorbed by the delivery pipeline and
//! handed to `afterNotify` hooks through the [`Outcome`] instead. The
//! remaining types cover client construction, configuration and the
//! collaborator traits.
//!
//! [`Client::notify`]: crate::Client::notify
//! [`Outcome`]: crate::Outcome

use std::time::Duration;

use thiserror::Error;

/// A notice was requested without an error or a usable message.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("a notice needs an error or a non-empty message")]
pub struct InvalidInputError;

/// Why a delivery attempt failed.
///
/// Never returned to the caller of `notify`; it only reaches `afterNotify`
/// hooks and the resolved [`Delivery`](crate::Delivery).
#[derive(Debug, Error)]
pub enum ReportingError {
    /// The transport could not complete the request.
    #[error("unable to reach the collector: {0}")]
    Transport(#[from] TransportError),

    /// The collector answered with a non-success status code.
    #[error("bad HTTP response from collector: {status}: {message}")]
    Status {
        /// HTTP status code returned by the collector.
        status: u16,
        /// Short explanation, or the response body when the code is unknown.
        message: String,
    },

    /// The notice could not be turned into a JSON payload.
    #[error("unable to serialize notice: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ReportingError {
    /// Classifies a collector response code.
    pub(crate) fn from_status(status: u16, body: &str) -> Self {
        let message = match status {
            403 => "invalid API key".to_owned(),
            413 => "notice exceeds the maximum size".to_owned(),
            429 | 503 => "rate limited".to_owned(),
            _ if body.is_empty() => "unexpected response".to_owned(),
            _ => body.chars().take(256).collect(),
        };
        Self::Status { status, message }
    }

    /// Returns the HTTP status code when the collector responded.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The connection could not be established or was interrupted.
    #[error("network error: {0}")]
    Network(String),

    /// The transport could not be built or the request was malformed.
    #[error("transport error: {0}")]
    Client(String),
}

/// A configuration value could not be parsed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value of the wrong shape.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidEnv {
        /// Environment variable name.
        key: &'static str,
        /// Raw value found in the environment.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// A [`Client`](crate::Client) could not be constructed.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The configuration was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The default transport could not be created.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No transport was supplied and the `http` feature is disabled.
    #[error("no transport configured")]
    MissingTransport,
}

/// A [`StatsProvider`](crate::stats::StatsProvider) could not collect stats.
#[derive(Debug, Error)]
pub enum StatsError {
    /// Reading a stats source failed.
    #[error("unable to read {source_name}: {error}")]
    Io {
        /// Which source was being read.
        source_name: &'static str,
        /// Underlying I/O error.
        #[source]
        error: std::io::Error,
    },

    /// The stats source had an unexpected format.
    #[error("unable to parse {0}")]
    Parse(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_messages_include_code() {
        let err = ReportingError::from_status(403, "");
        assert_eq!(err.status(), Some(403));
        assert!(err.to_string().contains("403"));
        assert!(err.to_string().contains("invalid API key"));

        let err = ReportingError::from_status(500, "upstream exploded");
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("upstream exploded"));
    }

    #[test]
    fn test_send_sync() {
        static_assertions::assert_impl_all!(ReportingError: Send, Sync);
        static_assertions::assert_impl_all!(InvalidInputError: Send, Sync, Copy);
        static_assertions::assert_impl_all!(BuildError: Send, Sync);
    }
}
