//! Version-control bookkeeping for vendored changes.
//!
//! Every file mutation made by an action is mirrored into a named change so
//! that an operator can review it before submitting. Two backends exist:
//! [`PerforceVcs`] drives the `p4` command line and [`LocalVcs`] only keeps
//! track of changes in memory, for monorepos without version control.

mod local;
mod perforce;
mod ztag;

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use std::path::{Path, PathBuf};

pub use local::LocalVcs;
pub use perforce::PerforceVcs;

/// Identifier of a pending change.
pub type ChangeId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub id: ChangeId,
    pub description: String,
}

/// A file currently opened in some change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedFile {
    /// Local path of the file.
    pub path: PathBuf,
    /// Operation the file is opened for (`edit`, `add`, `delete`, ...).
    pub action: String,
    /// File type as reported by the backend, e.g. `text` or `binary+x`.
    pub file_type: String,
    /// `None` for the default change.
    pub change: Option<ChangeId>,
}

impl OpenedFile {
    pub fn is_text(&self) -> bool {
        let base = self.file_type.split('+').next().unwrap_or_default();
        matches!(
            base,
            "text" | "ktext" | "xtext" | "ctext" | "ltext" | "utf8" | "unicode" | "utf16"
        )
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Opens a new pending change with `description`.
    async fn open_change(&self, description: &str) -> Result<ChangeId>;

    /// Opens files for edit. `None` targets the default change.
    async fn edit(&self, paths: &[PathBuf], change: Option<ChangeId>) -> Result<()>;

    async fn add(&self, paths: &[PathBuf], change: Option<ChangeId>) -> Result<()>;

    /// Opens files or directory trees for delete.
    async fn delete(&self, paths: &[PathBuf], change: Option<ChangeId>) -> Result<()>;

    /// Opens every added, edited or removed file under the paths.
    async fn reconcile(&self, paths: &[PathBuf], change: ChangeId) -> Result<()>;

    /// Reverts files of `change` under the paths whose content did not change.
    async fn revert_unchanged(&self, paths: &[PathBuf], change: ChangeId) -> Result<()>;

    async fn revert(&self, paths: &[PathBuf]) -> Result<()>;

    async fn pending_changes(&self) -> Result<Vec<PendingChange>>;

    async fn opened_files(&self) -> Result<Vec<OpenedFile>>;

    /// Content of a file at its last submitted revision.
    async fn print(&self, path: &Path) -> Result<String>;

    /// Shows the pending edits of a file to the operator.
    async fn diff(&self, path: &Path) -> Result<()>;
}

/// Returns the pending change described exactly as `description`, opening
/// one if there is none. Surrounding whitespace is ignored since p4 stores
/// descriptions with a trailing newline.
pub async fn find_or_open_change(vcs: &dyn Vcs, description: &str) -> Result<ChangeId> {
    if let Some(change) = vcs
        .pending_changes()
        .await?
        .into_iter()
        .find(|change| change.description.trim() == description.trim())
    {
        debug!("Reusing change {} for {:?}", change.id, description);
        return Ok(change.id);
    }
    vcs.open_change(description).await
}
