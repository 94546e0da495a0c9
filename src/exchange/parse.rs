//! Defensive parsing of provider responses.

use serde_json::Value;

use super::is_valid_rate;
use crate::error::SubtrackError;

/// Paths under which known providers nest their rate maps.
const RATE_CONTAINERS: [&[&str]; 3] = [&["rates"], &["conversion_rates"], &["data", "rates"]];

fn lookup<'a>(body: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(body, |node, key| node.get(*key))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Pull the `code` rate out of a provider body.
///
/// Unknown shapes and non-positive or non-finite values are errors, never
/// panics.
pub fn extract_rate(body: &Value, code: &str) -> Result<f64, SubtrackError> {
    let raw = RATE_CONTAINERS
        .iter()
        .filter_map(|path| lookup(body, path))
        .find_map(|rates| rates.get(code))
        .ok_or_else(|| {
            SubtrackError::InvalidRate(format!("unrecognised response shape: no {code} rate"))
        })?;

    let rate = as_number(raw)
        .ok_or_else(|| SubtrackError::InvalidRate(format!("non-numeric {code} rate: {raw}")))?;
    if !is_valid_rate(rate) {
        return Err(SubtrackError::InvalidRate(format!("{code} rate out of range: {rate}")));
    }
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_rates_map() {
        let body = json!({ "base": "USD", "rates": { "KRW": 1350.5, "JPY": 150 } });
        assert_eq!(extract_rate(&body, "KRW").ok(), Some(1350.5));
    }

    #[test]
    fn reads_conversion_rates_map() {
        let body = json!({ "result": "success", "conversion_rates": { "KRW": 1342 } });
        assert_eq!(extract_rate(&body, "KRW").ok(), Some(1342.0));
    }

    #[test]
    fn accepts_numeric_strings() {
        let body = json!({ "data": { "rates": { "KRW": " 1337.25 " } } });
        assert_eq!(extract_rate(&body, "KRW").ok(), Some(1337.25));
    }

    #[test]
    fn falls_through_containers_missing_the_code() {
        let body = json!({ "rates": { "EUR": 0.9 }, "conversion_rates": { "KRW": 1333 } });
        assert_eq!(extract_rate(&body, "KRW").ok(), Some(1333.0));
    }

    #[test]
    fn rejects_unknown_shapes_and_bad_values() {
        let cases = [
            json!({ "quotes": { "USDKRW": 1350 } }),
            json!({ "rates": { "KRW": 0 } }),
            json!({ "rates": { "KRW": -5 } }),
            json!({ "rates": { "KRW": null } }),
            json!({ "rates": { "KRW": "abc" } }),
            json!("rates"),
            json!([1, 2, 3]),
        ];
        for body in cases {
            assert!(
                matches!(extract_rate(&body, "KRW"), Err(SubtrackError::InvalidRate(_))),
                "{body}"
            );
        }
    }
}
