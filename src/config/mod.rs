//! Configuration system (layered: defaults < TOML file < env < code).

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SubtrackError};
use crate::exchange::{is_valid_rate, RateEndpoint};
use crate::util::retry::{RetryPolicy, DEFAULT_RETRYABLE_PATTERNS};

/// Global default config (lazy-initialized from file + env).
static DEFAULT_CONFIG: OnceLock<SubtrackConfig> = OnceLock::new();

/// Environment variable pointing at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "SUBTRACK_CONFIG";

/// Exchange-rate refresh settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    /// Currency the fetched rate converts from.
    pub base_currency: String,
    /// Currency the fetched rate converts into.
    pub target_currency: String,
    /// Rate used until the first successful refresh.
    pub default_rate: f64,
    /// Sources, highest priority first.
    pub endpoints: Vec<RateEndpoint>,
    pub refresh_interval_secs: u64,
    /// Delay before a scheduled retry after a fully failed refresh.
    pub retry_delay_ms: u64,
    /// Hard per-endpoint request deadline.
    pub request_timeout_ms: u64,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            base_currency: "USD".to_string(),
            target_currency: "KRW".to_string(),
            default_rate: 1300.0,
            endpoints: vec![
                RateEndpoint::new("exchangerate-api", "https://api.exchangerate-api.com/v4/latest/USD"),
                RateEndpoint::new("open-er-api", "https://open.er-api.com/v6/latest/USD"),
                RateEndpoint::new("frankfurter", "https://api.frankfurter.app/latest?from=USD&to=KRW"),
            ],
            refresh_interval_secs: 60 * 60,
            retry_delay_ms: 5 * 60 * 1000,
            request_timeout_ms: 10_000,
        }
    }
}

impl ExchangeSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Serializable form of [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub retryable_patterns: Vec<String>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            retryable_patterns: DEFAULT_RETRYABLE_PATTERNS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(self.max_attempts)
            .base_delay(Duration::from_millis(self.base_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .backoff_multiplier(self.backoff_multiplier)
            .retryable_patterns(self.retryable_patterns.clone())
            .build()
    }
}

/// Active connectivity probe settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivitySettings {
    pub probe_url: String,
    pub probe_timeout_ms: u64,
}

impl Default for ConnectivitySettings {
    fn default() -> Self {
        Self {
            probe_url: "https://www.google.com/generate_204".to_string(),
            probe_timeout_ms: 5_000,
        }
    }
}

impl ConnectivitySettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Layered configuration for subtrack.
///
/// Resolution order (later wins):
/// 1. Built-in defaults
/// 2. TOML file (`$SUBTRACK_CONFIG` or the platform config dir)
/// 3. `SUBTRACK_*` environment variables (a `.env` file is honoured)
/// 4. Explicit setters in code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtrackConfig {
    pub exchange: ExchangeSettings,
    pub retry: RetrySettings,
    pub connectivity: ConnectivitySettings,
}

impl SubtrackConfig {
    /// Defaults only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document. Missing sections and keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| SubtrackError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Platform default location of the config file.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "subtrack", "subtrack")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load defaults, then the config file if present, then the environment.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error

        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .or_else(Self::default_path);
        let mut config = match path {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "Loading config file");
                Self::from_file(&path)?
            }
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Get (or create) the global default config.
    ///
    /// A broken file or environment falls back to defaults with a warning.
    pub fn global() -> &'static SubtrackConfig {
        DEFAULT_CONFIG.get_or_init(|| {
            Self::load().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Invalid configuration; using defaults");
                Self::default()
            })
        })
    }

    /// Apply `SUBTRACK_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("SUBTRACK_DEFAULT_RATE") {
            self.exchange.default_rate = parse_env("SUBTRACK_DEFAULT_RATE", &v)?;
        }
        if let Some(v) = lookup("SUBTRACK_RATE_ENDPOINTS") {
            self.exchange.endpoints = v
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .enumerate()
                .map(|(i, url)| RateEndpoint::new(format!("env-{}", i + 1), url))
                .collect();
        }
        if let Some(v) = lookup("SUBTRACK_BASE_CURRENCY") {
            self.exchange.base_currency = v.trim().to_uppercase();
        }
        if let Some(v) = lookup("SUBTRACK_TARGET_CURRENCY") {
            self.exchange.target_currency = v.trim().to_uppercase();
        }
        if let Some(v) = lookup("SUBTRACK_REFRESH_INTERVAL_SECS") {
            self.exchange.refresh_interval_secs = parse_env("SUBTRACK_REFRESH_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("SUBTRACK_REQUEST_TIMEOUT_MS") {
            self.exchange.request_timeout_ms = parse_env("SUBTRACK_REQUEST_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("SUBTRACK_RETRY_DELAY_MS") {
            self.exchange.retry_delay_ms = parse_env("SUBTRACK_RETRY_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("SUBTRACK_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_env("SUBTRACK_RETRY_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("SUBTRACK_RETRY_BASE_DELAY_MS") {
            self.retry.base_delay_ms = parse_env("SUBTRACK_RETRY_BASE_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("SUBTRACK_RETRY_MAX_DELAY_MS") {
            self.retry.max_delay_ms = parse_env("SUBTRACK_RETRY_MAX_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("SUBTRACK_PROBE_URL") {
            self.connectivity.probe_url = v.trim().to_string();
        }
        Ok(())
    }

    /// Reject settings the runtime cannot honour.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_rate(self.exchange.default_rate) {
            return Err(SubtrackError::Configuration(format!(
                "exchange.default_rate must be a positive number, got {}",
                self.exchange.default_rate
            )));
        }
        if self.exchange.refresh_interval_secs == 0 {
            return Err(SubtrackError::Configuration(
                "exchange.refresh_interval_secs must be greater than zero".into(),
            ));
        }
        if self.exchange.request_timeout_ms == 0 {
            return Err(SubtrackError::Configuration(
                "exchange.request_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(SubtrackError::Configuration(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(SubtrackError::Configuration(format!(
                "retry.backoff_multiplier must be >= 1, got {}",
                self.retry.backoff_multiplier
            )));
        }
        if let Some(endpoint) = self.exchange.endpoints.iter().find(|e| e.url.trim().is_empty()) {
            return Err(SubtrackError::Configuration(format!(
                "exchange endpoint '{}' has an empty url",
                endpoint.name
            )));
        }
        Ok(())
    }

    pub fn set_default_rate(&mut self, rate: f64) {
        self.exchange.default_rate = rate;
    }

    pub fn set_endpoints(&mut self, endpoints: Vec<RateEndpoint>) {
        self.exchange.endpoints = endpoints;
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.to_policy()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| SubtrackError::Configuration(format!("{key}={value:?}: {e}")))
}
