//! Exchange-rate resolution from an ordered list of external sources.

mod parse;
mod service;

pub use parse::extract_rate;
pub use service::{ExchangeRateService, RefreshResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::AppError;

/// Whether `rate` may be used in monetary math.
pub fn is_valid_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

/// One HTTP GET source returning JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateEndpoint {
    pub name: String,
    pub url: String,
}

impl RateEndpoint {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Lifecycle of the held rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RateStatus {
    /// Holding the configured default; no refresh attempted yet.
    Idle,
    Refreshing,
    /// Last refresh succeeded within the refresh interval.
    Valid,
    /// Last success is older than the refresh interval.
    Stale,
    /// Last refresh failed; the previous rate is still held.
    Failed,
}

/// Session-scoped exchange-rate state.
///
/// `rate` is always finite and positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateState {
    pub rate: f64,
    pub is_refreshing: bool,
    pub last_error: Option<AppError>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub status: RateStatus,
}

impl RateState {
    pub fn new(default_rate: f64) -> Self {
        Self {
            rate: default_rate,
            is_refreshing: false,
            last_error: None,
            last_updated_at: None,
            consecutive_failures: 0,
            status: RateStatus::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_validation_rejects_non_positive_and_non_finite() {
        assert!(is_valid_rate(1350.0));
        assert!(!is_valid_rate(0.0));
        assert!(!is_valid_rate(-1.0));
        assert!(!is_valid_rate(f64::NAN));
        assert!(!is_valid_rate(f64::INFINITY));
    }
}
