use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;

use super::Fetcher;
use crate::archive::{ArchiveExtractor, ArchiveExtractorImpl};
use crate::download::download_file;
use crate::http::HttpClient;
use crate::model::{EntrySource, ManifestEntry, PackageMetadata, PackageSource, SourceKind};
use crate::runtime::Runtime;

/// Downloads and unpacks `.zip`, `.tar.gz` and `.tgz` archives.
pub struct ArchiveFetcher {
    runtime: Arc<dyn Runtime>,
    http_client: HttpClient,
    extractor: Box<dyn ArchiveExtractor>,
}

impl ArchiveFetcher {
    pub fn new(runtime: Arc<dyn Runtime>, http_client: HttpClient) -> Self {
        Self::with_extractor(runtime, http_client, Box::new(ArchiveExtractorImpl::new()))
    }

    pub fn with_extractor(
        runtime: Arc<dyn Runtime>,
        http_client: HttpClient,
        extractor: Box<dyn ArchiveExtractor>,
    ) -> Self {
        Self {
            runtime,
            http_client,
            extractor,
        }
    }
}

/// Last path segment of `url`, without query or fragment.
fn archive_file_name(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    path.rsplit('/').next().filter(|name| !name.is_empty())
}

#[async_trait]
impl Fetcher for ArchiveFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::Archive
    }

    #[tracing::instrument(skip(self, entry), fields(name = %entry.name))]
    async fn fetch(&self, entry: &ManifestEntry, destination: &Path) -> Result<PackageMetadata> {
        let EntrySource::Archive(source) = &entry.source else {
            bail!("{} is not an archive package", entry.name);
        };
        let file_name = archive_file_name(&source.url)
            .with_context(|| format!("cannot derive an archive name from {}", source.url))?;
        if !self.extractor.can_handle(Path::new(file_name)) {
            bail!("Unsupported archive format: {}", source.url);
        }

        let download_dir = tempfile::Builder::new()
            .prefix("vendorsync_download_")
            .tempdir()
            .context("failed to create a download directory")?;
        let archive_path = download_dir.path().join(file_name);

        let sha256 = download_file(
            self.runtime.as_ref(),
            &source.url,
            &archive_path,
            &self.http_client,
        )
        .await?;
        debug!("sha256 of {} is {}", source.url, sha256);

        self.extractor
            .extract(self.runtime.as_ref(), &archive_path, destination)
            .with_context(|| format!("failed to extract {}", source.url))?;
        info!("Unpacked {} into {}", source.url, destination.display());

        Ok(PackageMetadata::new(
            &entry.name,
            Some(PackageSource::Archive {
                url: source.url.clone(),
                version: source.version.clone(),
                sha256,
            }),
        ))
    }
}
