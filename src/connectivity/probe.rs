//! Active connectivity probes.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::SubtrackError;
use crate::util::http::{send_within, shared_client, status_to_error};

/// Ground-truth connectivity check.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(&self) -> Result<(), SubtrackError>;
}

/// Issues a lightweight GET and treats any 2xx/3xx as reachable.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_client(shared_client().clone(), url, timeout)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn probe(&self) -> Result<(), SubtrackError> {
        let request = self
            .client
            .get(&self.url)
            .header(reqwest::header::CACHE_CONTROL, "no-cache");
        let status = send_within(request, self.timeout).await?.status();
        if status.is_success() || status.is_redirection() {
            Ok(())
        } else {
            Err(status_to_error(status.as_u16(), ""))
        }
    }
}
