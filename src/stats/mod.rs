//! Fault-isolated aggregation of subscription prices.
//!
//! [`aggregate`] is pure: a bad record is reported in
//! [`AggregateResult::failed_items`] and never reaches the total.

mod format;
mod record;

pub use format::{format_amount, CALCULATION_ERROR};
pub use record::{BillingCycle, Currency, SubscriptionRecord};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::exchange::is_valid_rate;

/// Currency every total is expressed in.
pub const BASE_CURRENCY: Currency = Currency::Krw;

/// Why a record was left out of the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum FailureReason {
    #[serde(rename = "invalid price")]
    #[strum(serialize = "invalid price")]
    InvalidPrice,
    #[serde(rename = "unsupported currency")]
    #[strum(serialize = "unsupported currency")]
    UnsupportedCurrency,
    #[serde(rename = "conversion failed")]
    #[strum(serialize = "conversion failed")]
    ConversionFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub item_id: String,
    pub reason: FailureReason,
}

/// Unconverted monthly amounts for one currency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrencyBreakdown {
    pub count: usize,
    pub raw_total: f64,
}

/// Totals over a batch of records, in [`BASE_CURRENCY`] per month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub total: f64,
    pub average: f64,
    /// Every record passed in, active or not.
    pub item_count: usize,
    /// Active records that contributed to `total`.
    pub active_item_count: usize,
    pub per_currency_breakdown: BTreeMap<Currency, CurrencyBreakdown>,
    pub failed_item_count: usize,
    pub failed_items: Vec<FailedItem>,
}

impl AggregateResult {
    pub fn formatted_total(&self) -> String {
        format_amount(self.total, BASE_CURRENCY)
    }

    pub fn formatted_average(&self) -> String {
        format_amount(self.average, BASE_CURRENCY)
    }

    fn fail(&mut self, item_id: &str, reason: FailureReason) {
        tracing::debug!(item_id, %reason, "Excluding record from total");
        self.failed_items.push(FailedItem {
            item_id: item_id.to_string(),
            reason,
        });
    }
}

/// Aggregate `items` into a base-currency monthly total.
///
/// Foreign amounts are converted with `current_rate` (KRW per USD), or with
/// `fallback_rate` when `current_rate` is not a usable rate. Records with an
/// invalid price, an unsupported currency, or no usable rate are listed in
/// `failed_items`. Valid-price active records always appear in
/// `per_currency_breakdown`, even when their conversion fails.
pub fn aggregate(items: &[SubscriptionRecord], current_rate: f64, fallback_rate: f64) -> AggregateResult {
    let rate = [current_rate, fallback_rate]
        .into_iter()
        .find(|rate| is_valid_rate(*rate));

    let mut result = AggregateResult {
        item_count: items.len(),
        ..AggregateResult::default()
    };

    for item in items {
        if !item.has_valid_price() {
            result.fail(&item.id, FailureReason::InvalidPrice);
            continue;
        }
        if !item.active {
            continue;
        }

        let monthly = item.monthly_price();
        if !monthly.is_finite() {
            result.fail(&item.id, FailureReason::InvalidPrice);
            continue;
        }

        let entry = result.per_currency_breakdown.entry(item.currency).or_default();
        let raw_total = entry.raw_total + monthly;
        if raw_total.is_finite() {
            entry.count += 1;
            entry.raw_total = raw_total;
        } else {
            result.fail(&item.id, FailureReason::ConversionFailed);
            continue;
        }

        match convert(monthly, item.currency, rate) {
            Ok(converted) if (result.total + converted).is_finite() => {
                result.total += converted;
                result.active_item_count += 1;
            }
            Ok(_) => result.fail(&item.id, FailureReason::ConversionFailed),
            Err(reason) => result.fail(&item.id, reason),
        }
    }

    result.failed_item_count = result.failed_items.len();
    result.average = if result.active_item_count == 0 {
        0.0
    } else {
        result.total / result.active_item_count as f64
    };
    result
}

fn convert(amount: f64, currency: Currency, usd_rate: Option<f64>) -> Result<f64, FailureReason> {
    let converted = match currency {
        Currency::Krw => amount,
        Currency::Usd => amount * usd_rate.ok_or(FailureReason::ConversionFailed)?,
        Currency::Eur | Currency::Jpy | Currency::Other => {
            return Err(FailureReason::UnsupportedCurrency)
        }
    };
    if converted.is_finite() {
        Ok(converted)
    } else {
        Err(FailureReason::ConversionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn nan_price_is_isolated_from_total() {
        let items = [
            SubscriptionRecord::new("netflix", 10.0, Currency::Usd),
            SubscriptionRecord::new("broken", f64::NAN, Currency::Eur),
        ];

        let result = aggregate(&items, 1300.0, 1300.0);

        assert_eq!(result.total, 13000.0);
        assert_eq!(result.failed_item_count, 1);
        assert_eq!(
            result.failed_items,
            vec![FailedItem {
                item_id: "broken".into(),
                reason: FailureReason::InvalidPrice,
            }]
        );
        assert_eq!(result.item_count, 2);
        assert_eq!(result.active_item_count, 1);
    }

    #[test]
    fn invalid_current_rate_uses_fallback() {
        let items = [SubscriptionRecord::new("a", 2.0, Currency::Usd)];
        for bad in [f64::NAN, 0.0, -1.0, f64::INFINITY] {
            let result = aggregate(&items, bad, 1000.0);
            assert_eq!(result.total, 2000.0);
        }
    }

    #[test]
    fn no_usable_rate_fails_foreign_items_only() {
        let items = [
            SubscriptionRecord::new("usd", 5.0, Currency::Usd),
            SubscriptionRecord::new("krw", 7000.0, Currency::Krw),
        ];

        let result = aggregate(&items, f64::NAN, 0.0);

        assert_eq!(result.total, 7000.0);
        assert_eq!(result.failed_items[0].reason, FailureReason::ConversionFailed);
        assert_eq!(result.per_currency_breakdown[&Currency::Usd].raw_total, 5.0);
    }

    #[test]
    fn price_overflowing_on_normalisation_is_invalid() {
        let items = [
            SubscriptionRecord::new("music", 10000.0, Currency::Krw),
            SubscriptionRecord::new("huge", 1e308, Currency::Krw).with_billing_cycle(BillingCycle::Weekly),
        ];

        let result = aggregate(&items, 1300.0, 1300.0);

        assert_eq!(result.total, 10000.0);
        assert_eq!(result.failed_items[0].reason, FailureReason::InvalidPrice);
        let krw = &result.per_currency_breakdown[&Currency::Krw];
        assert_eq!((krw.count, krw.raw_total), (1, 10000.0));
    }

    #[test]
    fn overflowing_total_fails_the_item_instead() {
        let items = [
            SubscriptionRecord::new("big-krw", 1e308, Currency::Krw),
            SubscriptionRecord::new("big-usd", 9e304, Currency::Usd),
        ];

        let result = aggregate(&items, 1000.0, 1000.0);

        assert_eq!(result.total, 1e308);
        assert!(result.average.is_finite());
        assert_eq!(result.active_item_count, 1);
        assert_eq!(
            result.failed_items,
            vec![FailedItem {
                item_id: "big-usd".into(),
                reason: FailureReason::ConversionFailed,
            }]
        );
        assert_eq!(result.per_currency_breakdown[&Currency::Usd].raw_total, 9e304);
    }

    #[test]
    fn overflowing_breakdown_fails_the_item() {
        let items = [
            SubscriptionRecord::new("a", 1e308, Currency::Krw),
            SubscriptionRecord::new("b", 1e308, Currency::Krw),
        ];

        let result = aggregate(&items, 1300.0, 1300.0);

        assert_eq!(result.total, 1e308);
        assert_eq!(result.failed_item_count, 1);
        assert_eq!(result.failed_items[0].item_id, "b");
        assert_eq!(result.per_currency_breakdown[&Currency::Krw].raw_total, 1e308);
    }

    #[test]
    fn empty_input_has_zero_average() {
        let result = aggregate(&[], 1300.0, 1300.0);
        assert_eq!(result.average, 0.0);
        assert_eq!(result.total, 0.0);
        assert_eq!(result.formatted_average(), "₩0");
    }

    #[test]
    fn failure_reasons_display_as_plain_text() {
        assert_eq!(FailureReason::InvalidPrice.to_string(), "invalid price");
        assert_eq!(
            serde_json::to_value(FailureReason::UnsupportedCurrency).ok(),
            Some(serde_json::json!("unsupported currency"))
        );
    }
}
