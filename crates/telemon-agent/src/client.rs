use crate::error::{DeliveryError, Result};
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use std::io::Write;
use telemon_common::backoff::{Backoff, MAX_ATTEMPTS};
use telemon_common::shutdown::Shutdown;
use telemon_common::sign::{sign, SIGNATURE_HEADER};
use telemon_common::types::Metric;

/// Destination for report batches, one call per batch.
#[async_trait]
pub trait BatchSender: Send + Sync {
    async fn send(&self, batch: &[Metric], shutdown: &Shutdown) -> Result<()>;
}

/// Gateway statuses that usually clear up on their own.
pub fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Posts gzip-compressed JSON batches to the server's `/updates/` endpoint.
pub struct MetricsClient {
    http: reqwest::Client,
    url: String,
    key: Option<String>,
    backoff: Backoff,
    max_attempts: u32,
}

impl MetricsClient {
    pub fn new(url: impl Into<String>, key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            key: key.filter(|k| !k.is_empty()),
            backoff: Backoff::default(),
            max_attempts: MAX_ATTEMPTS,
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// JSON-encodes and gzips a batch. The signature covers the raw JSON.
    fn encode(&self, batch: &[Metric]) -> Result<(Vec<u8>, Option<String>)> {
        let json = serde_json::to_vec(batch)?;
        let signature = self.key.as_deref().map(|key| sign(key, &json));

        let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 2), Compression::default());
        encoder.write_all(&json)?;
        Ok((encoder.finish()?, signature))
    }

    async fn post_once(&self, body: &[u8], signature: Option<&str>) -> Result<StatusCode> {
        let mut request = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .header(ACCEPT_ENCODING, "gzip")
            .body(body.to_vec());
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        let response = request.send().await?;
        Ok(response.status())
    }
}

#[async_trait]
impl BatchSender for MetricsClient {
    /// Delivers one batch, retrying only on 502/503/504.
    ///
    /// Transport errors and any other non-success status end delivery
    /// immediately. Shutdown interrupts both the request and the backoff sleep.
    async fn send(&self, batch: &[Metric], shutdown: &Shutdown) -> Result<()> {
        let (body, signature) = self.encode(batch)?;

        let mut last_status = StatusCode::SERVICE_UNAVAILABLE;
        for attempt in 0..self.max_attempts {
            tracing::debug!(url = %self.url, attempt = attempt + 1, count = batch.len(), "Posting metrics");

            let status = tokio::select! {
                res = self.post_once(&body, signature.as_deref()) => res?,
                _ = shutdown.cancelled() => return Err(DeliveryError::Cancelled),
            };
            if status.is_success() {
                return Ok(());
            }
            if !is_retryable(status) {
                return Err(DeliveryError::Status(status));
            }
            last_status = status;

            if attempt + 1 < self.max_attempts {
                let wait = self.backoff.wait(attempt);
                tracing::warn!(
                    status = status.as_u16(),
                    attempt = attempt + 1,
                    wait_ms = wait.as_millis() as u64,
                    "Server unavailable, backing off"
                );
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shutdown.cancelled() => return Err(DeliveryError::Cancelled),
                }
            }
        }

        Err(DeliveryError::Exhausted {
            attempts: self.max_attempts,
            status: last_status,
        })
    }
}
