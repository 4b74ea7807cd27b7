use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://certipractice-backend-production.up.railway.app/api";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid base url `{raw}`: {source}")]
    InvalidUrl {
        raw: String,
        #[source]
        source: url::ParseError,
    },

    #[error("base url must use http or https, got `{0}`")]
    UnsupportedScheme(String),

    #[error("timeout must be > 0 ms")]
    InvalidTimeout,
}

/// Flat shape read from TOML/env before validation.
#[derive(Debug, Deserialize)]
struct RawApiConfig {
    base_url: String,
    timeout_ms: u64,
    retry_attempts: u32,
    retry_delay_ms: u64,
}

/// Connection settings for the REST backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    base_url: String,
    timeout: Duration,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl ApiConfig {
    /// Load from `config/exam.toml` (optional) and `CERTI_*` environment variables.
    ///
    /// Environment keys: `CERTI_BASE_URL`, `CERTI_TIMEOUT_MS`,
    /// `CERTI_RETRY_ATTEMPTS`, `CERTI_RETRY_DELAY_MS`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a source cannot be parsed or the URL is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/exam")
    }

    /// Same as [`ApiConfig::load`] with an explicit config file stem.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a source cannot be parsed or the URL is invalid.
    pub fn load_from(file_stem: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("timeout_ms", DEFAULT_TIMEOUT_MS)?
            .set_default("retry_attempts", DEFAULT_RETRY_ATTEMPTS)?
            .set_default("retry_delay_ms", DEFAULT_RETRY_DELAY_MS)?
            .add_source(config::File::with_name(file_stem).required(false))
            .add_source(config::Environment::with_prefix("CERTI").try_parsing(true))
            .build()?;

        let raw: RawApiConfig = settings.try_deserialize()?;
        Self::new(
            &raw.base_url,
            Duration::from_millis(raw.timeout_ms),
            raw.retry_attempts,
            Duration::from_millis(raw.retry_delay_ms),
        )
    }

    /// Build a validated config.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for malformed or non-http URLs and a zero timeout.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        retry_attempts: u32,
        retry_delay: Duration,
    ) -> Result<Self, ConfigError> {
        let url = Url::parse(base_url.trim()).map_err(|source| ConfigError::InvalidUrl {
            raw: base_url.to_owned(),
            source,
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(url.scheme().to_owned()));
        }
        if timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(Self {
            base_url: url.as_str().trim_end_matches('/').to_owned(),
            timeout,
            retry_attempts,
            retry_delay,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Absolute URL for an API path such as `/exams/3/start`; the base path is kept.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
