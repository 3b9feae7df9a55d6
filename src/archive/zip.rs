use crate::runtime::Runtime;
use anyhow::{Context, Result};
use log::{debug, info};
use std::io::Cursor;
use std::path::Path;
use zip::ZipArchive;

use super::{ArchiveExtractor, unpack_and_hoist};

/// Unpacks `.zip` archives.
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".zip")
    }

    fn extract(
        &self,
        runtime: &dyn Runtime,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<()> {
        debug!("Unzipping {} into {}", archive_path.display(), extract_to.display());
        let bytes = runtime
            .read(archive_path)
            .with_context(|| format!("cannot read archive {}", archive_path.display()))?;
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).context("not a valid zip archive")?;

        unpack_and_hoist(runtime, extract_to, |staging| {
            for i in 0..archive.len() {
                let mut entry = archive
                    .by_index(i)
                    .with_context(|| format!("Failed to read ZIP entry {}", i))?;

                let Some(entry_path) = entry.enclosed_name() else {
                    debug!("Skipping entry with invalid path");
                    continue;
                };
                let full_path = staging.join(entry_path);

                if entry.is_dir() {
                    runtime.create_dir_all(&full_path)?;
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
                if let Some(mode) = entry.unix_mode()
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
