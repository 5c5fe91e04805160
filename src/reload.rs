//! Reload notification for the consuming process.
//!
//! One POST without a body per generated configuration. Transport failures
//! are retried forever on a fixed backoff; any HTTP response, whatever its
//! status, ends the attempt.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ReloadConfig;

#[derive(Error, Debug)]
pub enum ReloadError {
    #[error("Invalid reload url: {0}")]
    InvalidUrl(String),

    #[error("Reload request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Failure reported by a transport that does not go through reqwest.
    #[error("Reload transport failed: {0}")]
    Transport(String),
}

/// Response to a reload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadResponse {
    pub status: u16,
    pub body: String,
}

impl ReloadResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// How the reload request reaches the consumer.
#[async_trait]
pub trait ReloadTransport: Send + Sync {
    /// Endpoint description for logging.
    fn endpoint(&self) -> &str;

    /// Send one reload request.
    async fn send(&self) -> Result<ReloadResponse, ReloadError>;
}

/// POSTs to an HTTP endpoint, Prometheus' `/-/reload` by default.
pub struct HttpTransport {
    client: reqwest::Client,
    url: reqwest::Url,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(url: &str) -> Result<Self, ReloadError> {
        let url = reqwest::Url::parse(url).map_err(|e| ReloadError::InvalidUrl(e.to_string()))?;
        // The endpoint is local to the pod; proxy variables meant for outbound
        // traffic must not reroute it.
        let client = reqwest::Client::builder().no_proxy().build()?;
        Ok(Self {
            client,
            endpoint: url.to_string(),
            url,
        })
    }
}

#[async_trait]
impl ReloadTransport for HttpTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self) -> Result<ReloadResponse, ReloadError> {
        let response = self.client.post(self.url.clone()).send().await?;
        let status = response.status().as_u16();
        // The status already counts as an answer; an unreadable body does not
        // turn it back into a failure.
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                crate::debug_event!("reload", "body", "unreadable: {e}");
                String::new()
            }
        };
        Ok(ReloadResponse { status, body })
    }
}

/// Result of [`ReloadNotifier::notify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadOutcome {
    /// Requests sent, including the one that got an answer.
    pub attempts: u32,
    pub response: ReloadResponse,
}

pub struct ReloadNotifier {
    transport: Box<dyn ReloadTransport>,
    backoff: Duration,
}

impl ReloadNotifier {
    pub fn new(transport: Box<dyn ReloadTransport>, backoff: Duration) -> Self {
        Self { transport, backoff }
    }

    /// HTTP notifier for the configured endpoint.
    pub fn from_config(config: &ReloadConfig) -> Result<Self, ReloadError> {
        Ok(Self::new(
            Box::new(HttpTransport::new(&config.url)?),
            config.backoff(),
        ))
    }

    /// Ask the consumer to reload, blocking until it answers.
    pub async fn notify(&self) -> ReloadOutcome {
        crate::log_event!("reload", "reloading configuration", "{}", self.transport.endpoint());

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.transport.send().await {
                Ok(response) => {
                    if response.is_success() {
                        crate::log_event!("reload", "status", "{}", response.status);
                    } else {
                        tracing::warn!("[reload] status: {}", response.status);
                    }
                    if !response.body.is_empty() {
                        crate::debug_event!("reload", "body", "{}", response.body.trim_end());
                    }
                    return ReloadOutcome { attempts, response };
                }
                Err(e) => {
                    tracing::error!(
                        "[reload] attempt {attempts} failed: {e}, retrying in {:?}",
                        self.backoff
                    );
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }
}
