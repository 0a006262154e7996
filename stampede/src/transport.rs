/// Transport module for the stampede load runner
///
/// Defines the capability the workers use to issue a probe, and the HTTP
/// implementation used by the binary. The runner never builds a transport
/// itself; one is injected so tests can substitute a fake.
use crate::error::TransportError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

/// Default `User-Agent` header sent with every HTTP probe.
pub const DEFAULT_USER_AGENT: &str = concat!("stampede/", env!("CARGO_PKG_VERSION"));

/// Issues a single probe against a target.
///
/// Implementations must bound the call by `timeout` and report anything that
/// prevented a response as a [`TransportError`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn issue_probe(&self, target: &str, timeout: Duration)
    -> Result<StatusCode, TransportError>;
}

/// Probe transport that sends an HTTP `GET` to the target URL.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .user_agent(user_agent)
            .pool_max_idle_per_host(0)
            .pool_idle_timeout(Duration::from_secs(0))
            .build()
            .context("Failed to build reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ProbeTransport for HttpTransport {
    async fn issue_probe(
        &self,
        target: &str,
        timeout: Duration,
    ) -> Result<StatusCode, TransportError> {
        match self
            .client
            .get(target)
            .timeout(timeout)
            .header(reqwest::header::CONNECTION, "close")
            .send()
            .await
        {
            Ok(response) => Ok(response.status()),
            Err(e) => Err(classify(e)),
        }
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}
