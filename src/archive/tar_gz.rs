use crate::runtime::Runtime;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::{debug, info};
use std::path::{Component, Path, PathBuf};

use super::{ArchiveExtractor, unpack_and_hoist};

/// Unpacks gzip-compressed tarballs (`.tar.gz`, `.tgz`).
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".tar.gz") || name.ends_with(".tgz")
    }

    fn extract(
        &self,
        runtime: &dyn Runtime,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        debug!("Untarring {} into {}", archive_path.display(), extract_to.display());
        let bytes = runtime
            .read(archive_path)
            .with_context(|| format!("cannot read archive {}", archive_path.display()))?;
        let mut archive = tar::Archive::new(GzDecoder::new(bytes.as_slice()));

        unpack_and_hoist(runtime, extract_to, |staging| {
            let entries = archive
                .entries()
                .with_context(|| format!("Failed to read archive {:?}", archive_path))?;
            for entry in entries {
                let mut entry = entry.context("Failed to read tar entry")?;
                let raw_path = entry.path().context("Invalid tar entry path")?.into_owned();
                let Some(relative) = enclosed(&raw_path) else {
                    debug!("Skipping entry with invalid path {:?}", raw_path);
                    continue;
                };
                let full_path = staging.join(relative);

                let kind = entry.header().entry_type();
                if kind.is_dir() {
                    runtime.create_dir_all(&full_path)?;
                    continue;
                }
                if !kind.is_file() {
                    debug!("Skipping non-regular entry {:?}", raw_path);
                    continue;
                }
                if let Some(parent) = full_path.parent() {
                    runtime.create_dir_all(parent)?;
                }
                let mut dest_file = runtime.create_file(&full_path)?;
                std::io::copy(&mut entry, &mut dest_file)
                    .with_context(|| format!("Failed to extract file {:?}", full_path))?;
                drop(dest_file);

                #[cfg(unix)]
                if let Ok(mode) = entry.header().mode()
                    && let Err(e) = runtime.set_permissions(&full_path, mode | 0o200)
                {
                    debug!("Failed to set permissions on {:?}: {}", full_path, e);
                }
            }
            Ok(())
        })?;

        info!("Extracted {}", archive_path.display());
        Ok(())
    }
}

/// `path` with `.` components dropped, or `None` if it escapes the root.
fn enclosed(path: &Path) -> Option<PathBuf> {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => result.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if result.as_os_str().is_empty() {
        None
    } else {
        Some(result)
    }
}
