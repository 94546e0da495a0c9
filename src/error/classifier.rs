//! Message-pattern classification of raw failures.

use std::sync::OnceLock;

use regex::RegexSet;

use super::taxonomy::{ErrorKind, ErrorSource};

/// Ordered pattern groups. The first group with any match decides the kind.
const PATTERN_GROUPS: [(ErrorKind, &[&str]); 5] = [
    (
        ErrorKind::Validation,
        &[
            r"validation",
            r"invalid input",
            r"invalid (format|value|email|date|price|amount)",
            r"violates check constraint",
            r"malformed",
            r"required field",
            r"must be (a|an|at|positive|greater|less)\b",
            r"too (long|short)",
            r"out of range",
            r"\b22P02\b",
            r"\b23514\b",
        ],
    ),
    (
        ErrorKind::Network,
        &[
            r"failed to fetch",
            r"fetch failed",
            r"load failed",
            r"network",
            r"offline",
            r"timed out",
            r"timeout after",
            r"request timeout",
            r"gateway timeout",
            r"econn(refused|reset|aborted)",
            r"enotfound",
            r"connection (refused|reset|closed|error|lost)",
            r"error sending request",
            r"socket hang up",
            r"\bdns\b",
            r"status (502|503|504)\b",
        ],
    ),
    (
        ErrorKind::Auth,
        &[
            r"jwt",
            r"unauthori[sz]ed",
            r"not authenticated",
            r"auth",
            r"invalid (login )?credentials",
            r"session (expired|not found|missing)",
            r"refresh token",
            r"(invalid|expired) token",
            r"token (expired|invalid)",
            r"status 401\b",
            r"\bPGRST301\b",
        ],
    ),
    (
        ErrorKind::Database,
        &[
            r"database",
            r"duplicate key",
            r"violates (unique|foreign key|not-null) constraint",
            r"null value in column",
            r"relation .* does not exist",
            r"column .* does not exist",
            r"(statement|lock|query) timeout",
            r"deadlock",
            r"postgres",
            r"\bsql",
            r"\bPGRST\d{3}\b",
            r"\b23\d{3}\b",
            r"\b42P01\b",
            r"\b57014\b",
        ],
    ),
    (
        ErrorKind::Permission,
        &[
            r"permission denied",
            r"forbidden",
            r"access denied",
            r"not allowed",
            r"row-level security",
            r"insufficient privilege",
            r"status 403\b",
            r"\b42501\b",
        ],
    ),
];

fn compiled_groups() -> &'static [(ErrorKind, RegexSet)] {
    static GROUPS: OnceLock<Vec<(ErrorKind, RegexSet)>> = OnceLock::new();
    GROUPS.get_or_init(|| {
        PATTERN_GROUPS
            .iter()
            .filter_map(|(kind, patterns)| {
                let patterns = patterns.iter().map(|p| format!("(?i){p}"));
                // Patterns are static; a failure here would be a typo caught by tests.
                RegexSet::new(patterns).ok().map(|set| (*kind, set))
            })
            .collect()
    })
}

/// Text the pattern tables are matched against: message, then code.
fn haystack(source: &ErrorSource) -> String {
    match source.code() {
        Some(code) => format!("{} {}", source.message(), code),
        None => source.message().to_string(),
    }
}

/// Classify a raw failure into exactly one [`ErrorKind`].
///
/// Pure and infallible; unrecognised or empty messages are `Unknown`.
pub fn classify(source: &ErrorSource) -> ErrorKind {
    let text = haystack(source);
    if text.trim().is_empty() {
        return ErrorKind::Unknown;
    }
    compiled_groups()
        .iter()
        .find(|(_, set)| set.is_match(&text))
        .map(|(kind, _)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}
