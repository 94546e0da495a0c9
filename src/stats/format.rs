//! Display formatting for monetary amounts.

use super::record::Currency;

/// Rendered in place of any non-finite amount.
pub const CALCULATION_ERROR: &str = "계산 오류";

/// Format `value` for display, e.g. `₩13,000` or `$1,234.50`.
///
/// NaN and infinities render as [`CALCULATION_ERROR`].
pub fn format_amount(value: f64, currency: Currency) -> String {
    if !value.is_finite() {
        return CALCULATION_ERROR.to_string();
    }

    let fixed = format!("{:.*}", currency.minor_digits(), value.abs());
    let (whole, fraction) = match fixed.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (fixed.as_str(), None),
    };
    let is_zero = fixed.chars().all(|c| c == '0' || c == '.');
    let sign = if value < 0.0 && !is_zero { "-" } else { "" };

    let mut out = format!("{sign}{}{}", currency.symbol(), group_thousands(whole));
    if let Some(fraction) = fraction {
        out.push('.');
        out.push_str(fraction);
    }
    out
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
