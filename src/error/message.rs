//! User-facing error records built from classified failures.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::classifier::classify;
use super::taxonomy::{ErrorKind, ErrorSource};

/// A classified, localized failure ready for display.
///
/// `message` is always a user-facing sentence. The raw provider text lives
/// in `details` and is only surfaced through [`AppError::developer_details`].
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{title}: {message}")]
pub struct AppError {
    pub id: Uuid,
    pub kind: ErrorKind,
    pub title: String,
    pub message: String,
    pub details: String,
    pub recoverable: bool,
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

struct DefaultCopy {
    title: &'static str,
    message: &'static str,
}

fn default_copy(kind: ErrorKind) -> DefaultCopy {
    match kind {
        ErrorKind::Validation => DefaultCopy {
            title: "입력 오류",
            message: "입력한 정보를 다시 확인해 주세요.",
        },
        ErrorKind::Network => DefaultCopy {
            title: "네트워크 오류",
            message: "인터넷 연결을 확인한 후 다시 시도해 주세요.",
        },
        ErrorKind::Auth => DefaultCopy {
            title: "인증 오류",
            message: "로그인이 필요합니다. 다시 로그인해 주세요.",
        },
        ErrorKind::Database => DefaultCopy {
            title: "데이터 오류",
            message: "데이터를 처리하는 중 문제가 발생했습니다. 잠시 후 다시 시도해 주세요.",
        },
        ErrorKind::Permission => DefaultCopy {
            title: "권한 오류",
            message: "이 작업을 수행할 권한이 없습니다.",
        },
        ErrorKind::Unknown => DefaultCopy {
            title: "알 수 없는 오류",
            message: "예상치 못한 오류가 발생했습니다. 잠시 후 다시 시도해 주세요.",
        },
    }
}

/// Message-specific overrides, checked in order. They replace the message only.
const SPECIFIC_MESSAGES: [(&str, &str); 10] = [
    (r"duplicate key|already exists", "이미 존재하는 항목입니다."),
    (
        r"violates foreign key constraint",
        "연결된 데이터가 있어 처리할 수 없습니다.",
    ),
    (
        r"violates not-null constraint|null value in column",
        "필수 항목이 입력되지 않았습니다.",
    ),
    (
        r"invalid login credentials",
        "이메일 또는 비밀번호가 올바르지 않습니다.",
    ),
    (
        r"jwt expired|token expired|session expired",
        "로그인 세션이 만료되었습니다. 다시 로그인해 주세요.",
    ),
    (
        r"row-level security",
        "이 데이터에 접근할 권한이 없습니다.",
    ),
    (
        r"invalid input syntax",
        "입력 형식이 올바르지 않습니다.",
    ),
    (
        r"timeout|timed out",
        "요청 시간이 초과되었습니다. 잠시 후 다시 시도해 주세요.",
    ),
    (
        r"failed to fetch|fetch failed|offline",
        "서버에 연결할 수 없습니다. 네트워크 상태를 확인해 주세요.",
    ),
    (
        r"too many requests|status 429",
        "요청이 너무 많습니다. 잠시 후 다시 시도해 주세요.",
    ),
];

fn specific_overrides() -> &'static [(Regex, &'static str)] {
    static OVERRIDES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    OVERRIDES.get_or_init(|| {
        SPECIFIC_MESSAGES
            .iter()
            .filter_map(|(pattern, message)| {
                Regex::new(&format!("(?i){pattern}"))
                    .ok()
                    .map(|re| (re, *message))
            })
            .collect()
    })
}

fn specific_message(raw: &str) -> Option<&'static str> {
    specific_overrides()
        .iter()
        .find(|(re, _)| re.is_match(raw))
        .map(|(_, message)| *message)
}

/// Whether a failure of `kind` with raw text `raw` may be retried.
pub fn is_retryable(kind: ErrorKind, raw: &str) -> bool {
    match kind {
        ErrorKind::Network => true,
        ErrorKind::Database => {
            let raw = raw.to_lowercase();
            raw.contains("timeout") || raw.contains("timed out")
        }
        _ => false,
    }
}

impl AppError {
    /// Classify a raw failure and build the user-facing record.
    pub fn from_failure(source: impl Into<ErrorSource>, context: Option<&str>) -> Self {
        let source = source.into();
        let kind = classify(&source);
        let raw = source.message();
        let copy = default_copy(kind);
        let message = specific_message(raw).unwrap_or(copy.message);

        let error = Self {
            id: Uuid::new_v4(),
            kind,
            title: copy.title.to_string(),
            message: message.to_string(),
            details: raw.to_string(),
            recoverable: kind.is_recoverable(),
            retryable: is_retryable(kind, raw),
            timestamp: Utc::now(),
            context: context.map(str::to_string),
        };
        tracing::debug!(
            id = %error.id,
            kind = %error.kind,
            retryable = error.retryable,
            context = error.context.as_deref().unwrap_or(""),
            raw = raw,
            "Classified error"
        );
        error
    }

    /// Raw provider text, only exposed in debug builds.
    pub fn developer_details(&self) -> Option<&str> {
        if cfg!(debug_assertions) && !self.details.is_empty() {
            Some(&self.details)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn duplicate_key_gets_specific_message_but_keeps_kind() {
        let error = AppError::from_failure(
            "duplicate key value violates unique constraint \"subscriptions_pkey\"",
            Some("save subscription"),
        );
        assert_eq!(error.kind, ErrorKind::Database);
        assert_eq!(error.title, "데이터 오류");
        assert_eq!(error.message, "이미 존재하는 항목입니다.");
        assert!(!error.retryable);
        assert!(!error.recoverable);
        assert_eq!(error.context.as_deref(), Some("save subscription"));
    }

    #[test]
    fn network_failures_are_retryable_and_recoverable() {
        let error = AppError::from_failure("Failed to fetch", None);
        assert_eq!(error.kind, ErrorKind::Network);
        assert!(error.retryable);
        assert!(error.recoverable);
    }

    #[test]
    fn database_timeout_is_the_only_retryable_database_error() {
        let timeout = AppError::from_failure("canceling statement due to statement timeout", None);
        assert_eq!(timeout.kind, ErrorKind::Database);
        assert!(timeout.retryable);

        let schema = AppError::from_failure("relation \"subs\" does not exist", None);
        assert_eq!(schema.kind, ErrorKind::Database);
        assert!(!schema.retryable);
    }

    #[test]
    fn unknown_errors_use_default_copy() {
        let error = AppError::from_failure("kaboom", None);
        assert_eq!(error.kind, ErrorKind::Unknown);
        assert_eq!(error.message, default_copy(ErrorKind::Unknown).message);
        assert!(!error.retryable);
        assert_eq!(error.details, "kaboom");
    }

    #[test]
    fn each_failure_gets_a_fresh_id() {
        let a = AppError::from_failure("Failed to fetch", None);
        let b = AppError::from_failure("Failed to fetch", None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn display_shows_title_and_message() {
        let error = AppError::from_failure("permission denied for table subscriptions", None);
        assert_eq!(error.to_string(), "권한 오류: 이 작업을 수행할 권한이 없습니다.");
    }
}
