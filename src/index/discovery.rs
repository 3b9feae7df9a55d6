//! Walks the third-party tree collecting manifests and package metadata.

use anyhow::Result;
use log::debug;
use std::path::{Path, PathBuf};

use super::{IndexError, PhysicalPackage, Scope, ScopeId};
use crate::model::{Manifest, PackageMetadata};
use crate::runtime::Runtime;

/// Everything found on disk, before any cross-checking.
#[derive(Debug, Default)]
pub(crate) struct Discovery {
    pub scopes: Vec<Scope>,
    pub manifests: Vec<(ScopeId, Manifest)>,
    pub packages: Vec<(ScopeId, PhysicalPackage)>,
}

impl Discovery {
    /// Collects `dir` and, when it opens a manifest scope, its children.
    ///
    /// A directory holding a metadata file is a package and is attributed to
    /// the nearest enclosing manifest; walking stops there. A directory holding
    /// a manifest opens a new scope. Anything else is ignored.
    pub fn collect(
        &mut self,
        runtime: &dyn Runtime,
        dir: &Path,
        ws_path: &str,
        scope: Option<ScopeId>,
    ) -> Result<()> {
        if let Some(metadata_path) = PackageMetadata::find(runtime, dir) {
            let Some(scope) = scope else {
                return Err(IndexError::OrphanMetadata { path: metadata_path }.into());
            };
            let metadata = PackageMetadata::load(runtime, &metadata_path)
                .map_err(|e| parse_error(&metadata_path, e))?;
            debug!("Found package {} at {:?}", metadata.name, dir);
            self.packages.push((
                scope,
                PhysicalPackage {
                    path: dir.to_path_buf(),
                    metadata_path,
                    metadata,
                },
            ));
            return Ok(());
        }

        let Some(manifest_path) = Manifest::find(runtime, dir) else {
            return Ok(());
        };
        let manifest =
            Manifest::load(runtime, &manifest_path).map_err(|e| parse_error(&manifest_path, e))?;
        debug!(
            "Found manifest {:?} with {} entries",
            manifest_path,
            manifest.entries.len()
        );

        let id = self.scopes.len();
        self.scopes.push(Scope {
            dir: dir.to_path_buf(),
            ws_path: ws_path.to_string(),
            manifest_path,
        });
        self.manifests.push((id, manifest));

        for child in runtime.read_dir(dir)? {
            if !runtime.is_dir(&child) {
                continue;
            }
            let Some(name) = child.file_name() else {
                continue;
            };
            let child_ws_path = format!("{}/{}", ws_path, name.to_string_lossy());
            self.collect(runtime, &child, &child_ws_path, Some(id))?;
        }
        Ok(())
    }
}

fn parse_error(path: &Path, e: anyhow::Error) -> anyhow::Error {
    IndexError::Parse {
        path: PathBuf::from(path),
        reason: e.root_cause().to_string(),
    }
    .into()
}
