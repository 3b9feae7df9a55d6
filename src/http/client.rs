//! Archive transfers over HTTP.

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::io::Write;
use std::time::Duration;

use super::retry::{MAX_RETRIES, NonRetryableError, RETRY_DELAY_MS, check_retryable};

/// What a completed transfer produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub bytes: u64,
    /// Hex-encoded SHA-256 of the body.
    pub sha256: String,
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Streams the body of `url` into a sink from `open_sink`, hashing it on
    /// the way. Every attempt gets a fresh sink so a retried transfer never
    /// appends to a partial one.
    #[tracing::instrument(skip(self, open_sink))]
    pub async fn transfer<W, F>(&self, url: &str, open_sink: F) -> Result<Transfer>
    where
        W: Write,
        F: Fn() -> Result<W>,
    {
        retrying(url, || self.transfer_once(url, &open_sink)).await
    }

    async fn transfer_once<W, F>(&self, url: &str, open_sink: &F) -> Result<Transfer>
    where
        W: Write,
        F: Fn() -> Result<W>,
    {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("request to {} failed", url))?;
        let mut response = response.error_for_status().map_err(check_retryable)?;

        let mut sink = open_sink()?;
        let mut hasher = Sha256::new();
        let mut bytes = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("connection to {} dropped", url))?
        {
            sink.write_all(&chunk).context("failed to store downloaded data")?;
            hasher.update(&chunk);
            bytes += chunk.len() as u64;
        }
        sink.flush().context("failed to store downloaded data")?;

        Ok(Transfer {
            bytes,
            sha256: hex::encode(hasher.finalize()),
        })
    }
}

/// Runs `attempt` up to `MAX_RETRIES` times, stopping early on errors
/// classified as permanent.
async fn retrying<F, Fut, T>(url: &str, attempt: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        let err = match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if err.downcast_ref::<NonRetryableError>().is_some() {
            debug!("{}: giving up: {}", url, err);
            return Err(err);
        }
        if tries >= MAX_RETRIES {
            return Err(err.context(anyhow!("{}: failed after {} attempts", url, tries)));
        }
        warn!(
            "{}: attempt {}/{} failed ({}), retrying in {}ms",
            url, tries, MAX_RETRIES, err, RETRY_DELAY_MS
        );
        tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
    }
}
