//! Client configuration.
//!
//! A [`Config`] can be built in code, deserialized with serde, or read from
//! `HONEYBADGER_*` environment variables with [`Config::from_env`]. A running
//! [`Client`](crate::Client) keeps its configuration behind a lock and every
//! notice reads a snapshot, so [`Client::configure`](crate::Client::configure)
//! takes effect for the next notice without disturbing ones in flight.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Collector used when no endpoint is configured.
pub const DEFAULT_ENDPOINT: &str = "https://api.honeybadger.io";

/// Settings shared by every notice a client sends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project API key. Without one, notices are skipped.
    pub api_key: Option<String>,
    /// Base URL of the collector.
    pub endpoint: String,
    /// Deployment environment, e.g. `production`.
    pub environment: Option<String>,
    /// Host name reported with each notice.
    pub hostname: Option<String>,
    /// Root directory of the project, used by the collector to group frames.
    pub project_root: Option<String>,
    /// Revision of the deployed code.
    pub revision: Option<String>,
    /// Default component label.
    pub component: Option<String>,
    /// Default action label.
    pub action: Option<String>,
    /// Tags added to every notice.
    pub tags: Vec<String>,
    /// Forces reporting on or off. When unset, reporting is enabled unless
    /// the environment is listed in `development_environments`.
    pub report_data: Option<bool>,
    /// Environments in which reporting is off by default.
    pub development_environments: Vec<String>,
    /// Key fragments whose values are replaced with `[FILTERED]`.
    pub filters: Vec<String>,
    /// Nesting depth after which payload values are replaced with `[DEPTH]`.
    pub max_object_depth: usize,
    /// Timeout for a single transport request.
    #[serde(with = "millis")]
    pub timeout: Duration,
    /// How long a wrapped handler waits for its report before completing.
    #[serde(with = "millis")]
    pub grace_period: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            environment: None,
            hostname: None,
            project_root: None,
            revision: None,
            component: None,
            action: None,
            tags: Vec::new(),
            report_data: None,
            development_environments: vec!["dev".into(), "development".into(), "test".into()],
            filters: vec!["creditcard".into(), "password".into()],
            max_object_depth: 8,
            timeout: Duration::from_secs(10),
            grace_period: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Default configuration with the given API key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::default().with_api_key(api_key)
    }

    /// Reads configuration from the process environment.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `HONEYBADGER_API_KEY` | `api_key` |
    /// | `HONEYBADGER_ENDPOINT` | `endpoint` |
    /// | `HONEYBADGER_ENVIRONMENT` | `environment` |
    /// | `HONEYBADGER_HOSTNAME`, then `HOSTNAME` | `hostname` |
    /// | `HONEYBADGER_PROJECT_ROOT`, then the working directory | `project_root` |
    /// | `HONEYBADGER_REVISION` | `revision` |
    /// | `HONEYBADGER_REPORT_DATA` | `report_data` |
    /// | `HONEYBADGER_MAX_OBJECT_DEPTH` | `max_object_depth` |
    /// | `HONEYBADGER_GRACE_PERIOD_MS` | `grace_period` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        if config.project_root.is_none() {
            config.project_root = std::env::current_dir()
                .ok()
                .map(|dir| dir.display().to_string());
        }
        Ok(config)
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through
    /// `lookup`, and leaves `project_root` unset when it is not provided.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        config.api_key = get("HONEYBADGER_API_KEY");
        if let Some(endpoint) = get("HONEYBADGER_ENDPOINT") {
            config.endpoint = endpoint;
        }
        config.environment = get("HONEYBADGER_ENVIRONMENT");
        config.hostname = get("HONEYBADGER_HOSTNAME").or_else(|| get("HOSTNAME"));
        config.project_root = get("HONEYBADGER_PROJECT_ROOT");
        config.revision = get("HONEYBADGER_REVISION");

        if let Some(value) = get("HONEYBADGER_REPORT_DATA") {
            config.report_data = Some(parse_bool("HONEYBADGER_REPORT_DATA", value)?);
        }
        if let Some(value) = get("HONEYBADGER_MAX_OBJECT_DEPTH") {
            config.max_object_depth = parse_number("HONEYBADGER_MAX_OBJECT_DEPTH", value)?;
        }
        if let Some(value) = get("HONEYBADGER_GRACE_PERIOD_MS") {
            config.grace_period =
                Duration::from_millis(parse_number("HONEYBADGER_GRACE_PERIOD_MS", value)?);
        }

        Ok(config)
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the collector base URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the deployment environment.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Sets the deployed revision.
    #[must_use]
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Forces reporting on or off regardless of the environment.
    #[must_use]
    pub fn with_report_data(mut self, report_data: bool) -> Self {
        self.report_data = Some(report_data);
        self
    }

    /// Sets the wrapper grace period.
    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Sets the transport request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the API key if one is set and not blank.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Whether the configured environment is a development environment.
    #[must_use]
    pub fn is_development(&self) -> bool {
        self.environment.as_deref().is_some_and(|env| {
            self.development_environments
                .iter()
                .any(|dev| dev.eq_ignore_ascii_case(env))
        })
    }

    /// Whether notices should be sent at all.
    #[must_use]
    pub fn reporting_enabled(&self) -> bool {
        self.report_data.unwrap_or_else(|| !self.is_development())
    }
}

fn parse_bool(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            key,
            value,
            reason: "expected a boolean".to_owned(),
        }),
    }
}

fn parse_number<N>(key: &'static str, value: String) -> Result<N, ConfigError>
where
    N: core::str::FromStr,
    N::Err: core::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err: N::Err| ConfigError::InvalidEnv {
            key,
            reason: err.to_string(),
            value,
        })
}

mod millis {
    use core::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
