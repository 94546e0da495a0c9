//! Tests for configuration layering.

use std::io::Write;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use pretty_assertions::assert_eq;
use subtrack::config::{SubtrackConfig, CONFIG_PATH_ENV};
use subtrack::error::SubtrackError;
use subtrack::exchange::RateEndpoint;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const CONFIG_ENV_VARS: [&str; 12] = [
    CONFIG_PATH_ENV,
    "SUBTRACK_DEFAULT_RATE",
    "SUBTRACK_RATE_ENDPOINTS",
    "SUBTRACK_BASE_CURRENCY",
    "SUBTRACK_TARGET_CURRENCY",
    "SUBTRACK_REFRESH_INTERVAL_SECS",
    "SUBTRACK_REQUEST_TIMEOUT_MS",
    "SUBTRACK_RETRY_DELAY_MS",
    "SUBTRACK_RETRY_MAX_ATTEMPTS",
    "SUBTRACK_RETRY_BASE_DELAY_MS",
    "SUBTRACK_RETRY_MAX_DELAY_MS",
    "SUBTRACK_PROBE_URL",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn capture(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Restores the environment before releasing the lock.
fn clean_env() -> (EnvGuard, std::sync::MutexGuard<'static, ()>) {
    let lock = env_lock_guard();
    let guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    for key in CONFIG_ENV_VARS {
        std::env::remove_var(key);
    }
    (guard, lock)
}

const SAMPLE_TOML: &str = r#"
[exchange]
default_rate = 1325.0
refresh_interval_secs = 1800

[[exchange.endpoints]]
name = "primary"
url = "https://rates.example/latest/USD"

[retry]
max_attempts = 4
base_delay_ms = 250
"#;

#[test]
fn toml_overrides_only_the_keys_it_names() {
    let config = SubtrackConfig::from_toml_str(SAMPLE_TOML).expect("valid toml");

    assert_eq!(config.exchange.default_rate, 1325.0);
    assert_eq!(config.exchange.refresh_interval(), Duration::from_secs(1800));
    assert_eq!(
        config.exchange.endpoints,
        vec![RateEndpoint::new("primary", "https://rates.example/latest/USD")]
    );
    assert_eq!(config.exchange.target_currency, "KRW");

    let policy = config.retry_policy();
    assert_eq!(policy.max_attempts, 4);
    assert_eq!(policy.base_delay, Duration::from_millis(250));
    assert_eq!(policy.max_delay, Duration::from_secs(10));
    assert_eq!(config.connectivity, SubtrackConfig::new().connectivity);
}

#[test]
fn invalid_toml_values_are_rejected() {
    let err = SubtrackConfig::from_toml_str("[exchange]\ndefault_rate = 0.0\n").expect_err("zero rate");
    assert!(matches!(err, SubtrackError::Configuration(_)));

    let err = SubtrackConfig::from_toml_str("[retry]\nmax_attempts = \"three\"\n").expect_err("bad type");
    assert!(matches!(err, SubtrackError::Configuration(_)));
}

#[test]
fn load_layers_file_then_environment() {
    let (_env, _lock) = clean_env();
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(SAMPLE_TOML.as_bytes()).expect("write config");

    std::env::set_var(CONFIG_PATH_ENV, file.path());
    std::env::set_var("SUBTRACK_DEFAULT_RATE", "1410");
    std::env::set_var("SUBTRACK_PROBE_URL", "http://127.0.0.1:9/ping");

    let config = SubtrackConfig::load().expect("config loads");

    assert_eq!(config.exchange.default_rate, 1410.0);
    assert_eq!(config.exchange.refresh_interval_secs, 1800);
    assert_eq!(config.retry.max_attempts, 4);
    assert_eq!(config.connectivity.probe_url, "http://127.0.0.1:9/ping");
}

#[test]
fn load_without_file_uses_defaults_plus_environment() {
    let (_env, _lock) = clean_env();
    let dir = tempfile::tempdir().expect("temp dir");
    std::env::set_var(CONFIG_PATH_ENV, dir.path().join("missing.toml"));
    std::env::set_var("SUBTRACK_RETRY_MAX_DELAY_MS", "2500");

    let config = SubtrackConfig::load().expect("config loads");

    assert_eq!(config.exchange, SubtrackConfig::new().exchange);
    assert_eq!(config.retry_policy().max_delay, Duration::from_millis(2500));
}

#[test]
fn invalid_environment_fails_load() {
    let (_env, _lock) = clean_env();
    let dir = tempfile::tempdir().expect("temp dir");
    std::env::set_var(CONFIG_PATH_ENV, dir.path().join("missing.toml"));
    std::env::set_var("SUBTRACK_DEFAULT_RATE", "-1");

    let err = SubtrackConfig::load().expect_err("negative rate");
    assert!(err.to_string().contains("default_rate"));
}

#[test]
fn code_setters_win_over_everything() {
    let mut config = SubtrackConfig::from_toml_str(SAMPLE_TOML).expect("valid toml");
    config.set_default_rate(1500.0);
    config.set_endpoints(Vec::new());

    assert_eq!(config.exchange.default_rate, 1500.0);
    assert!(config.exchange.endpoints.is_empty());
    assert!(config.validate().is_ok());
}
