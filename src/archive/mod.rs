mod tar_gz;
mod zip;

use crate::runtime::Runtime;
use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use std::path::{Path, PathBuf};

pub use tar_gz::TarGzExtractor;
pub use zip::ZipExtractor;

/// Trait for format-specific archive extractors
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor: Send + Sync {
    /// Check if this extractor can handle the given archive format
    fn can_handle(&self, archive_path: &Path) -> bool;

    /// Extract the archive into `extract_to`. A single top-level directory
    /// in the archive is stripped.
    fn extract(&self, runtime: &dyn Runtime, archive_path: &Path, extract_to: &Path)
    -> Result<()>;
}

/// Dispatcher that selects the appropriate extractor based on archive format.
pub struct ArchiveExtractorImpl {
    tar_gz: TarGzExtractor,
    zip: ZipExtractor,
}

impl Default for ArchiveExtractorImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveExtractorImpl {
    pub fn new() -> Self {
        Self {
            tar_gz: TarGzExtractor,
            zip: ZipExtractor,
        }
    }
}

impl ArchiveExtractor for ArchiveExtractorImpl {
    fn can_handle(&self, archive_path: &Path) -> bool {
        self.tar_gz.can_handle(archive_path) || self.zip.can_handle(archive_path)
    }

    #[tracing::instrument(skip(self, runtime))]
    fn extract(
        &self,
        runtime: &dyn Runtime,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        if self.tar_gz.can_handle(archive_path) {
            return self.tar_gz.extract(runtime, archive_path, extract_to);
        }
        if self.zip.can_handle(archive_path) {
            return self.zip.extract(runtime, archive_path, extract_to);
        }
        Err(anyhow!(
            "Unsupported archive format: {}",
            archive_path.display()
        ))
    }
}

/// Sibling directory entries are unpacked into before being moved in place.
fn staging_dir(extract_to: &Path) -> Result<PathBuf> {
    let name = extract_to
        .file_name()
        .with_context(|| format!("Invalid extraction directory {:?}", extract_to))?;
    Ok(extract_to.with_file_name(format!("{}_unpack", name.to_string_lossy())))
}

/// Runs `unpack` into a fresh staging directory, then moves the result into
/// `extract_to`, stripping a single top-level directory.
fn unpack_and_hoist<F>(runtime: &dyn Runtime, extract_to: &Path, unpack: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let staging = staging_dir(extract_to)?;
    if runtime.exists(&staging) {
        runtime.remove_dir_all(&staging)?;
    }
    runtime.create_dir_all(&staging)?;
    debug!("Unpacking to staging dir: {:?}", staging);

    let result = unpack(&staging).and_then(|()| hoist(runtime, &staging, extract_to));
    runtime.remove_dir_all(&staging)?;
    result
}

fn hoist(runtime: &dyn Runtime, staging: &Path, extract_to: &Path) -> Result<()> {
    let entries = runtime
        .read_dir(staging)
        .context("Failed to read staging directory")?;
    let source_dir = match entries.as_slice() {
        [] => bail!("Archive appears to be empty."),
        [single] if runtime.is_dir(single) => single.clone(),
        _ => staging.to_path_buf(),
    };

    runtime.create_dir_all(extract_to)?;
    debug!("Moving contents from {:?} to {:?}", source_dir, extract_to);
    for item in runtime.read_dir(&source_dir)? {
        let name = item
            .file_name()
            .with_context(|| format!("Invalid archive entry {:?}", item))?;
        runtime.rename(&item, &extract_to.join(name))?;
    }
    Ok(())
}
