//! Subscription records as they arrive from the remote store.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString};

/// Currency of a record's price.
///
/// Unknown codes deserialize to [`Currency::Other`] instead of failing the
/// whole batch.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Currency {
    Krw,
    Usd,
    Eur,
    Jpy,
    #[serde(other)]
    Other,
}

impl Currency {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Krw => "₩",
            Self::Usd => "$",
            Self::Eur => "€",
            Self::Jpy => "¥",
            Self::Other => "",
        }
    }

    /// Digits shown after the decimal point.
    pub fn minor_digits(self) -> usize {
        match self {
            Self::Krw | Self::Jpy => 0,
            Self::Usd | Self::Eur | Self::Other => 2,
        }
    }
}

/// How often a subscription is charged.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BillingCycle {
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl BillingCycle {
    /// Multiplier turning one charge into a monthly figure.
    pub fn monthly_factor(self) -> f64 {
        match self {
            Self::Weekly => 52.0 / 12.0,
            Self::Monthly => 1.0,
            Self::Quarterly => 1.0 / 3.0,
            Self::Yearly => 1.0 / 12.0,
        }
    }
}

/// One subscription.
///
/// `price` is deserialized leniently: numbers, numeric strings, `null` and
/// garbage are all accepted, with anything unusable becoming `NaN` so the
/// aggregator can report it per item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "missing_price", deserialize_with = "lenient_price")]
    pub price: f64,
    pub currency: Currency,
    #[serde(default)]
    pub billing_cycle: BillingCycle,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl SubscriptionRecord {
    /// An active, monthly record.
    pub fn new(id: impl Into<String>, price: f64, currency: Currency) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            price,
            currency,
            billing_cycle: BillingCycle::Monthly,
            active: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_billing_cycle(mut self, cycle: BillingCycle) -> Self {
        self.billing_cycle = cycle;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn has_valid_price(&self) -> bool {
        self.price.is_finite() && self.price >= 0.0
    }

    /// Price normalised to one month, in the record's own currency.
    pub fn monthly_price(&self) -> f64 {
        self.price * self.billing_cycle.monthly_factor()
    }
}

fn missing_price() -> f64 {
    f64::NAN
}

fn default_active() -> bool {
    true
}

fn lenient_price<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    })
}
