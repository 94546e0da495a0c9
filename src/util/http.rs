//! Shared HTTP client, deadline-bound requests and status mapping.

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::SubtrackError;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
///
/// Per-request deadlines are applied by callers; the client-level timeout is
/// only a backstop.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(4)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            })
    })
}

/// Send `request`, failing with [`SubtrackError::Timeout`] if no response
/// arrives within `deadline`.
pub async fn send_within(
    request: reqwest::RequestBuilder,
    deadline: Duration,
) -> Result<reqwest::Response, SubtrackError> {
    within(deadline, async { Ok(request.send().await?) }).await
}

/// Send `request` and read the body as text, all under one `deadline`.
/// Non-success statuses become errors via [`status_to_error`].
pub async fn fetch_text(request: reqwest::RequestBuilder, deadline: Duration) -> Result<String, SubtrackError> {
    within(deadline, async {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(status_to_error(status.as_u16(), &body))
        }
    })
    .await
}

async fn within<T>(
    deadline: Duration,
    future: impl Future<Output = Result<T, SubtrackError>>,
) -> Result<T, SubtrackError> {
    tokio::time::timeout(deadline, future)
        .await
        .unwrap_or_else(|_| Err(SubtrackError::Timeout(deadline.as_millis() as u64)))
}

/// Map a non-success HTTP status to an error.
pub fn status_to_error(status: u16, body: &str) -> SubtrackError {
    let body = body.trim();
    let message = if body.is_empty() {
        reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("request failed")
            .to_string()
    } else {
        truncate(body, 200)
    };
    SubtrackError::api(status, message)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_future_hits_the_deadline() {
        let result = within(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(SubtrackError::Timeout(50))));
    }

    #[tokio::test]
    async fn fetch_text_maps_error_statuses() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such route"))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_text(client.get(server.uri()), Duration::from_secs(2)).await;

        match result {
            Err(SubtrackError::Api { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "no such route");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn empty_body_uses_canonical_reason() {
        let err = status_to_error(503, "  ");
        assert_eq!(err.to_string(), "HTTP error (status 503): Service Unavailable");
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(500);
        match status_to_error(500, &body) {
            SubtrackError::Api { message, .. } => assert_eq!(message.chars().count(), 201),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
