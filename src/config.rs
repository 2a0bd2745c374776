//! Delivery configuration.
//!
//! A [`DeliveryConfig`] is set once at startup and read-only afterwards. Leaving it out of the
//! [`Pipeline`](crate::Pipeline) disables delivery; events are still buffered.
use crate::error::ConfigError;
use serde::Deserialize;

/// Environment variable holding the collector URL.
pub const ENV_SERVER_URL: &str = "RELAYLOG_SERVER_URL";
/// Environment variable enabling action timing events (`1`/`true`/`yes`/`on`).
pub const ENV_PERFORMANCE_LOGGING: &str = "RELAYLOG_PERFORMANCE_LOGGING";
/// Environment variable with comma separated masked keywords.
pub const ENV_MASKED_KEYWORDS: &str = "RELAYLOG_MASKED_KEYWORDS";

/// Where and how telemetry is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryConfig {
    #[serde(rename = "serverURL", alias = "serverUrl")]
    server_url: String,
    #[serde(default)]
    performance_logging: bool,
    #[serde(default)]
    masked_keywords: Vec<String>,
}

impl DeliveryConfig {
    /// Start building a config for the given collector URL.
    pub fn builder(server_url: impl Into<String>) -> DeliveryConfigBuilder {
        DeliveryConfigBuilder {
            server_url: server_url.into(),
            performance_logging: false,
            masked_keywords: Vec::new(),
        }
    }

    /// Read the config from `RELAYLOG_*` variables.
    ///
    /// Returns `Ok(None)` when no server URL is set, which leaves delivery disabled.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(url) = lookup(ENV_SERVER_URL).filter(|u| !u.trim().is_empty()) else {
            return Ok(None);
        };
        let mut builder = Self::builder(url.trim());
        if let Some(flag) = lookup(ENV_PERFORMANCE_LOGGING) {
            builder = builder.performance_logging(parse_flag(&flag)?);
        }
        if let Some(list) = lookup(ENV_MASKED_KEYWORDS) {
            builder = builder.masked_keywords(
                list.split(',').map(str::trim).filter(|k| !k.is_empty()).map(String::from),
            );
        }
        builder.build().map(Some)
    }

    /// Check a deserialized config the same way [`DeliveryConfigBuilder::build`] does.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.server_url.trim();
        if url.is_empty() {
            return Err(ConfigError::EmptyServerUrl);
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::UnsupportedScheme(url.to_string()));
        }
        Ok(())
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn performance_logging(&self) -> bool {
        self.performance_logging
    }

    pub fn masked_keywords(&self) -> &[String] {
        &self.masked_keywords
    }
}

fn parse_flag(raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::InvalidEnv {
            var: ENV_PERFORMANCE_LOGGING,
            reason: format!("expected a boolean, got {:?}", other),
        }),
    }
}

/// Builder for [`DeliveryConfig`].
#[derive(Debug, Clone)]
pub struct DeliveryConfigBuilder {
    server_url: String,
    performance_logging: bool,
    masked_keywords: Vec<String>,
}

impl DeliveryConfigBuilder {
    /// Record an `OK` timing event for every wrapped action.
    pub fn performance_logging(mut self, enabled: bool) -> Self {
        self.performance_logging = enabled;
        self
    }

    /// Parameter names containing any of these keywords are masked before logging.
    pub fn masked_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.masked_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<DeliveryConfig, ConfigError> {
        let config = DeliveryConfig {
            server_url: self.server_url.trim().to_string(),
            performance_logging: self.performance_logging,
            masked_keywords: self.masked_keywords,
        };
        config.validate()?;
        Ok(config)
    }
}
