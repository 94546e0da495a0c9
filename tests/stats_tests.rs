//! Tests for the statistics aggregator.

use pretty_assertions::assert_eq;
use serde_json::json;
use subtrack::stats::{
    aggregate, format_amount, BillingCycle, Currency, CurrencyBreakdown, FailedItem, FailureReason,
    SubscriptionRecord, CALCULATION_ERROR,
};

fn records(value: serde_json::Value) -> Vec<SubscriptionRecord> {
    serde_json::from_value(value).expect("records parse")
}

#[test]
fn invalid_price_never_reaches_the_total() {
    let items = records(json!([
        { "id": "1", "price": 10, "currency": "USD" },
        { "id": "2", "price": "NaN", "currency": "EUR" },
    ]));

    let result = aggregate(&items, 1300.0, 1300.0);

    assert_eq!(result.total, 13000.0);
    assert_eq!(result.failed_item_count, 1);
    assert_eq!(
        result.failed_items,
        vec![FailedItem {
            item_id: "2".into(),
            reason: FailureReason::InvalidPrice,
        }]
    );
    assert_eq!(result.formatted_total(), "₩13,000");
}

#[test]
fn aggregation_is_pure() {
    let items = records(json!([
        { "id": "a", "price": 9.99, "currency": "USD", "billing_cycle": "yearly" },
        { "id": "b", "price": 14500, "currency": "KRW" },
        { "id": "c", "price": -3, "currency": "KRW" },
        { "id": "d", "price": 4.5, "currency": "USD", "billing_cycle": "weekly" },
        { "id": "e", "price": 7, "currency": "JPY" },
    ]));
    let snapshot = items.clone();

    let first = aggregate(&items, 1337.7, 1300.0);
    let second = aggregate(&items, 1337.7, 1300.0);

    assert_eq!(items, snapshot);
    assert_eq!(first, second);
    assert_eq!(first.total.to_bits(), second.total.to_bits());
    assert_eq!(first.average.to_bits(), second.average.to_bits());
}

// A currency without a conversion path shows up in the raw breakdown but
// contributes nothing to the converted total.
#[test]
fn breakdown_and_total_disagree_for_unconvertible_items() {
    let items = vec![
        SubscriptionRecord::new("krw", 10000.0, Currency::Krw),
        SubscriptionRecord::new("eur", 12.0, Currency::Eur),
    ];

    let result = aggregate(&items, 1300.0, 1300.0);

    assert_eq!(result.total, 10000.0);
    assert_eq!(result.active_item_count, 1);
    assert_eq!(
        result.per_currency_breakdown.get(&Currency::Eur),
        Some(&CurrencyBreakdown {
            count: 1,
            raw_total: 12.0,
        })
    );
    assert_eq!(
        result.failed_items,
        vec![FailedItem {
            item_id: "eur".into(),
            reason: FailureReason::UnsupportedCurrency,
        }]
    );
}

#[test]
fn inactive_items_count_only_toward_item_count() {
    let items = vec![
        SubscriptionRecord::new("on", 5000.0, Currency::Krw),
        SubscriptionRecord::new("off", 9000.0, Currency::Krw).inactive(),
    ];

    let result = aggregate(&items, 1300.0, 1300.0);

    assert_eq!(result.item_count, 2);
    assert_eq!(result.active_item_count, 1);
    assert_eq!(result.total, 5000.0);
    assert_eq!(result.average, 5000.0);
    assert_eq!(result.per_currency_breakdown[&Currency::Krw].count, 1);
    assert_eq!(result.failed_item_count, 0);
}

#[test]
fn billing_cycles_are_normalised_to_monthly() {
    let items = vec![
        SubscriptionRecord::new("yearly", 120000.0, Currency::Krw)
            .with_billing_cycle(BillingCycle::Yearly),
        SubscriptionRecord::new("quarterly", 30000.0, Currency::Krw)
            .with_billing_cycle(BillingCycle::Quarterly),
    ];

    let result = aggregate(&items, 1300.0, 1300.0);

    assert!((result.total - 20000.0).abs() < 1e-6);
    assert!((result.average - 10000.0).abs() < 1e-6);
}

#[test]
fn bad_rates_fall_back_then_fail_conversion() {
    let items = vec![SubscriptionRecord::new("usd", 10.0, Currency::Usd)];

    let result = aggregate(&items, f64::NAN, 1250.0);
    assert_eq!(result.total, 12500.0);

    let result = aggregate(&items, f64::NAN, f64::INFINITY);
    assert_eq!(result.total, 0.0);
    assert_eq!(result.average, 0.0);
    assert_eq!(result.failed_items[0].reason, FailureReason::ConversionFailed);
    assert!(result.total.is_finite());
}

#[test]
fn result_serializes_with_currency_keys() {
    let items = vec![SubscriptionRecord::new("usd", 10.0, Currency::Usd)];
    let value = serde_json::to_value(aggregate(&items, 1300.0, 1300.0)).expect("serializes");

    assert_eq!(value["per_currency_breakdown"]["USD"]["count"], json!(1));
    assert_eq!(value["total"], json!(13000.0));
}

#[test]
fn formatting_is_defensive() {
    assert_eq!(format_amount(f64::NAN, Currency::Krw), CALCULATION_ERROR);
    assert_eq!(format_amount(9.5, Currency::Usd), "$9.50");
    assert_eq!(format_amount(1500.0, Currency::Jpy), "¥1,500");
    assert_eq!(format_amount(12.0, Currency::Eur), "€12.00");
}
