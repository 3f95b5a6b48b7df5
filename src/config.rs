//! Provider configuration.
//!
//! The host passes provider configuration as JSON. Values missing from the
//! configuration fall back to environment variables:
//!
//! - `FASTLY_API_KEY`: API token used for every request
//! - `FASTLY_API_URL`: base URL of the Fastly API (default `https://api.fastly.com`)

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema};

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "FASTLY_API_KEY";

/// Environment variable overriding the API base URL.
pub const API_URL_ENV: &str = "FASTLY_API_URL";

/// Default Fastly API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.fastly.com";

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_seconds: Option<u64>,
}

/// Resolved provider configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Fastly API token.
    pub api_key: String,
    /// API base URL, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Create a configuration with the default URL and timeout.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }

    /// Override the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve configuration from host JSON, falling back to the process environment.
    pub fn from_value(config: &Value) -> Result<Self, ProviderError> {
        Self::from_value_with_env(config, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from host JSON with a custom environment lookup.
    pub fn from_value_with_env<E>(config: &Value, env: E) -> Result<Self, ProviderError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let raw: RawConfig = match config {
            Value::Null => RawConfig::default(),
            other => serde_json::from_value(other.clone())
                .map_err(|e| ProviderError::Configuration(e.to_string()))?,
        };

        let api_key = raw
            .api_key
            .filter(|k| !k.is_empty())
            .or_else(|| env(API_KEY_ENV).filter(|k| !k.is_empty()))
            .ok_or_else(|| {
                ProviderError::Configuration(format!(
                    "no API key configured; set api_key or {}",
                    API_KEY_ENV
                ))
            })?;

        let base_url = raw
            .base_url
            .or_else(|| env(API_URL_ENV))
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ProviderError::Configuration(format!(
                "base_url must be an http(s) URL, got {}",
                base_url
            )));
        }

        let timeout_seconds = raw.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        if timeout_seconds == 0 {
            return Err(ProviderError::Configuration(
                "timeout_seconds must be greater than zero".to_string(),
            ));
        }

        Ok(Self::new(api_key)
            .with_base_url(base_url)
            .with_timeout(Duration::from_secs(timeout_seconds)))
    }

    /// Schema of the provider configuration block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "api_key",
                Attribute::optional_string()
                    .sensitive()
                    .with_description(format!(
                        "Fastly API key. Falls back to the {} environment variable",
                        API_KEY_ENV
                    )),
            )
            .with_attribute(
                "base_url",
                Attribute::optional_string().with_description(format!(
                    "Fastly API URL. Falls back to {}, then {}",
                    API_URL_ENV, DEFAULT_BASE_URL
                )),
            )
            .with_attribute(
                "timeout_seconds",
                Attribute::optional_int64()
                    .with_default(DEFAULT_TIMEOUT_SECONDS.into())
                    .with_description("Timeout for each Fastly API request, in seconds"),
            )
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Turn a configuration result into diagnostics for the host.
pub(crate) fn config_diagnostics(result: &Result<ProviderConfig, ProviderError>) -> Vec<Diagnostic> {
    match result {
        Ok(_) => vec![],
        Err(e) => vec![Diagnostic::error("Invalid provider configuration").with_detail(e.message())],
    }
}
