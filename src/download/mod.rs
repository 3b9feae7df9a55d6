//! Archive downloads into the scratch area.

use anyhow::{Context, Result};
use log::info;
use std::path::Path;

use crate::http::HttpClient;
use crate::runtime::Runtime;

/// Downloads `url` to `destination` and returns the hex SHA-256 of what was
/// written.
#[tracing::instrument(skip(runtime, destination, http_client))]
pub async fn download_file(
    runtime: &dyn Runtime,
    url: &str,
    destination: &Path,
    http_client: &HttpClient,
) -> Result<String> {
    info!("Downloading {}", url);
    let transfer = http_client
        .transfer(url, || {
            runtime
                .create_file(destination)
                .with_context(|| format!("cannot create {}", destination.display()))
        })
        .await?;
    info!("Downloaded {} bytes from {}", transfer.bytes, url);
    Ok(transfer.sha256)
}
