use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::info;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::Fetcher;
use crate::generate::BuildGenerator;
use crate::labels::ensure_workspace_file;
use crate::model::{EntrySource, ManifestEntry, PackageMetadata, PackageSource, SourceKind};
use crate::process::{CommandRunner, Invocation};
use crate::runtime::Runtime;

/// What `go mod download -json` reports about a module.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ModuleInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub sum: String,
    #[serde(default)]
    pub dir: PathBuf,
    #[serde(default)]
    pub error: Option<String>,
}

/// Downloads `import_path@query` into the module cache.
pub(super) async fn mod_download(
    runner: &dyn CommandRunner,
    go: &Path,
    cwd: &Path,
    import_path: &str,
    query: &str,
) -> Result<ModuleInfo> {
    let output = runner
        .run(
            &Invocation::new(go)
                .args(["mod", "download", "-json", "--"])
                .arg(format!("{}@{}", import_path, query))
                .env("GO111MODULE", "on")
                .current_dir(cwd),
        )
        .await?;
    let info: ModuleInfo = serde_json::from_str(&output)
        .with_context(|| format!("unexpected go mod download output for {}", import_path))?;
    if let Some(error) = &info.error {
        bail!("failed to download {}@{}: {}", import_path, query, error);
    }
    Ok(info)
}

/// Fetches Go modules through the module cache and generates their build
/// files.
pub struct GoFetcher {
    runtime: Arc<dyn Runtime>,
    runner: Arc<dyn CommandRunner>,
    generator: Arc<dyn BuildGenerator>,
    go: PathBuf,
    cwd: PathBuf,
}

impl GoFetcher {
    pub fn new(
        runtime: Arc<dyn Runtime>,
        runner: Arc<dyn CommandRunner>,
        generator: Arc<dyn BuildGenerator>,
        go: impl Into<PathBuf>,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runtime,
            runner,
            generator,
            go: go.into(),
            cwd: cwd.into(),
        }
    }
}

#[async_trait]
impl Fetcher for GoFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::Go
    }

    #[tracing::instrument(skip(self, entry), fields(name = %entry.name))]
    async fn fetch(&self, entry: &ManifestEntry, destination: &Path) -> Result<PackageMetadata> {
        let EntrySource::Go(source) = &entry.source else {
            bail!("{} is not a Go package", entry.name);
        };
        info!("Fetching {}@{}", source.import_path, source.version);

        let module = mod_download(
            self.runner.as_ref(),
            &self.go,
            &self.cwd,
            &source.import_path,
            &source.version,
        )
        .await?;
        self.runtime
            .copy_dir(&module.dir, destination)
            .with_context(|| format!("failed to copy module {}", source.import_path))?;

        if !source.ignore_gazelle {
            ensure_workspace_file(self.runtime.as_ref(), destination)?;
            self.generator
                .generate(destination, &source.import_path)
                .await?;
        }

        Ok(PackageMetadata::new(
            &entry.name,
            Some(PackageSource::Go {
                import_path: source.import_path.clone(),
                version: module.version,
            }),
        ))
    }
}
