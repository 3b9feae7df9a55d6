//! Local modifications of vendored code.
//!
//! Files patched in the monorepo carry a marker comment so that an update
//! which replaces them can be reviewed by hand.

use anyhow::Result;
use log::debug;
use std::path::{Path, PathBuf};

use crate::runtime::{Runtime, list_files};
use crate::vcs::Vcs;

pub const DIVERGENCE_START: &str = "DIVERGENCE_START";

/// UTF-8 files under `dir` containing the marker. A missing `dir` has none.
pub fn detect_divergences(runtime: &dyn Runtime, dir: &Path) -> Result<Vec<PathBuf>> {
    if !runtime.is_dir(dir) {
        return Ok(Vec::new());
    }
    let mut diverged = Vec::new();
    for file in list_files(runtime, dir)? {
        let bytes = runtime.read(&file)?;
        if let Ok(content) = std::str::from_utf8(&bytes)
            && content.contains(DIVERGENCE_START)
        {
            diverged.push(file);
        }
    }
    Ok(diverged)
}

/// Opens the diff of every opened text file whose submitted revision carries
/// the marker. Returns the files diffed.
#[tracing::instrument(skip(vcs))]
pub async fn diff_divergences(vcs: &dyn Vcs) -> Result<Vec<PathBuf>> {
    let mut diffed = Vec::new();
    for opened in vcs.opened_files().await? {
        if !opened.is_text() {
            continue;
        }
        let content = vcs.print(&opened.path).await?;
        if !content.contains(DIVERGENCE_START) {
            continue;
        }
        if diffed.is_empty() {
            println!("The following opened file(s) have divergences in the existing version:");
        }
        println!("{}", opened.path.display());
        vcs.diff(&opened.path).await?;
        diffed.push(opened.path);
    }
    debug!("{} diverged file(s) diffed", diffed.len());
    Ok(diffed)
}
