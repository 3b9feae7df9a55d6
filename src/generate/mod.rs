//! Build-file generation for vendored Go packages.

mod analyse;
mod gazelle;

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::labels::{WORKSPACE_FILE, ensure_workspace_file};
use crate::runtime::{Runtime, list_files};
use crate::vcs::Vcs;

pub use analyse::{PackageAnalysis, analyse_package, render_analysis};
pub use gazelle::GazelleGenerator;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BuildGenerator: Send + Sync {
    /// (Re)generates the build files of the Go package rooted at
    /// `package_dir`. Running it twice leaves the tree unchanged.
    async fn generate(&self, package_dir: &Path, import_path: &str) -> Result<()>;
}

/// `BUILD` and `BUILD.bazel` files under `dir`. Paths containing `@` are
/// skipped since version control cannot address them.
fn generated_build_files(runtime: &dyn Runtime, dir: &Path) -> Result<BTreeSet<PathBuf>> {
    Ok(list_files(runtime, dir)?
        .into_iter()
        .filter(|path| !path.to_string_lossy().contains('@'))
        .filter(|path| {
            matches!(
                path.file_name().and_then(|name| name.to_str()),
                Some("BUILD") | Some("BUILD.bazel")
            )
        })
        .collect())
}

/// Regenerates the build files of a vendored Go package and mirrors the
/// result into version control, in the default change.
///
/// Existing build files are opened for edit (and removed first when `clean`
/// is set). Files the generator creates are added; files it no longer
/// produces are turned into deletes.
#[tracing::instrument(skip(runtime, vcs, generator))]
pub async fn regenerate_package(
    runtime: &dyn Runtime,
    vcs: &dyn Vcs,
    generator: &dyn BuildGenerator,
    package_dir: &Path,
    import_path: &str,
    clean: bool,
) -> Result<()> {
    if ensure_workspace_file(runtime, package_dir)? {
        vcs.add(&[package_dir.join(WORKSPACE_FILE)], None).await?;
    }

    let existing = generated_build_files(runtime, package_dir)?;
    for file in &existing {
        vcs.edit(std::slice::from_ref(file), None).await?;
        if clean {
            runtime.remove_file(file)?;
        }
    }

    generator.generate(package_dir, import_path).await?;

    let current = generated_build_files(runtime, package_dir)?;
    for file in current.difference(&existing) {
        debug!("New build file {:?}", file);
        vcs.add(std::slice::from_ref(file), None).await?;
    }
    for file in existing.difference(&current) {
        debug!("Build file {:?} is gone", file);
        vcs.revert(std::slice::from_ref(file)).await?;
        vcs.delete(std::slice::from_ref(file), None).await?;
    }
    Ok(())
}
