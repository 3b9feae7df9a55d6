//! Fetching package content from its upstream.
//!
//! A [`Fetcher`] materialises one kind of [`EntrySource`] into a directory
//! and reports what was actually taken as [`PackageSource`] metadata. The
//! [`FetcherRegistry`] maps source kinds to fetchers; the
//! [`VersionResolver`] turns symbolic versions into pinned ones so that
//! validation can tell the operator what to write in the manifest.
//!
//! [`EntrySource`]: crate::model::EntrySource
//! [`PackageSource`]: crate::model::PackageSource

mod archive;
mod git;
mod golang;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::model::{ManifestEntry, PackageMetadata, SourceKind};
use crate::process::CommandRunner;

pub use archive::ArchiveFetcher;
pub use git::{GitFetcher, parse_ls_remote};
pub use golang::{GoFetcher, ModuleInfo};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Materialises the entry's source into `destination`, which must not
    /// exist yet.
    async fn fetch(&self, entry: &ManifestEntry, destination: &Path) -> Result<PackageMetadata>;
}

/// Fetchers by source kind.
#[derive(Default)]
pub struct FetcherRegistry {
    fetchers: HashMap<SourceKind, Arc<dyn Fetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fetcher, replacing any previous one for the same kind.
    pub fn register(&mut self, fetcher: Arc<dyn Fetcher>) {
        self.fetchers.insert(fetcher.kind(), fetcher);
    }

    pub fn get(&self, kind: SourceKind) -> Option<&Arc<dyn Fetcher>> {
        self.fetchers.get(&kind)
    }

    /// The fetcher for `entry`, or an error naming the unsupported kind.
    pub fn for_entry(&self, entry: &ManifestEntry) -> Result<&Arc<dyn Fetcher>> {
        let kind = entry.source_kind();
        self.get(kind)
            .ok_or_else(|| anyhow!("no fetcher available for {} packages ({})", kind, entry.name))
    }
}

/// Computes pinned versions from symbolic ones.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VersionResolver: Send + Sync {
    /// Commit sha a branch or tag currently points at.
    async fn resolve_git_ref(&self, url: &str, git_ref: &str) -> Result<String>;

    /// Module version a query such as `latest` or `master` resolves to.
    async fn resolve_go_version(&self, import_path: &str, query: &str) -> Result<String>;
}

/// Resolves versions with the git and go tools.
pub struct ToolchainResolver {
    runner: Arc<dyn CommandRunner>,
    go: PathBuf,
    cwd: PathBuf,
}

impl ToolchainResolver {
    pub fn new(runner: Arc<dyn CommandRunner>, go: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            go: go.into(),
            cwd: cwd.into(),
        }
    }
}

#[async_trait]
impl VersionResolver for ToolchainResolver {
    async fn resolve_git_ref(&self, url: &str, git_ref: &str) -> Result<String> {
        git::resolve_ref(self.runner.as_ref(), &self.cwd, url, git_ref).await
    }

    async fn resolve_go_version(&self, import_path: &str, query: &str) -> Result<String> {
        let info = golang::mod_download(self.runner.as_ref(), &self.go, &self.cwd, import_path, query)
            .await?;
        Ok(info.version)
    }
}
