use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::{debug, info};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ChangeId, OpenedFile, PendingChange, Vcs};
use crate::runtime::{Runtime, list_files};

/// Bookkeeping for monorepos without version control.
///
/// Changes and opened files only live for the duration of the run. File
/// contents are never touched: deleting a path here only forgets about it,
/// callers remove files from disk themselves.
pub struct LocalVcs {
    runtime: Arc<dyn Runtime>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    changes: Vec<PendingChange>,
    opened: BTreeMap<PathBuf, OpenedFile>,
}

impl LocalVcs {
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        Self {
            runtime,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("local change state is poisoned"))
    }

    /// Files under `paths`, directories expanded.
    fn expand(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for path in paths {
            if self.runtime.is_dir(path) {
                files.extend(list_files(self.runtime.as_ref(), path)?);
            } else {
                files.push(path.clone());
            }
        }
        Ok(files)
    }

    fn open(&self, paths: &[PathBuf], action: &str, change: Option<ChangeId>) -> Result<()> {
        let files = self.expand(paths)?;
        let mut state = self.state()?;
        for path in files {
            debug!("Opened {:?} for {}", path, action);
            state.opened.insert(
                path.clone(),
                OpenedFile {
                    path,
                    action: action.to_string(),
                    file_type: "text".to_string(),
                    change,
                },
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Vcs for LocalVcs {
    async fn open_change(&self, description: &str) -> Result<ChangeId> {
        let mut state = self.state()?;
        let id = state.changes.len() as ChangeId + 1;
        state.changes.push(PendingChange {
            id,
            description: description.to_string(),
        });
        debug!("Opened local change {}: {}", id, description);
        Ok(id)
    }

    async fn edit(&self, paths: &[PathBuf], change: Option<ChangeId>) -> Result<()> {
        self.open(paths, "edit", change)
    }

    async fn add(&self, paths: &[PathBuf], change: Option<ChangeId>) -> Result<()> {
        self.open(paths, "add", change)
    }

    async fn delete(&self, paths: &[PathBuf], change: Option<ChangeId>) -> Result<()> {
        self.open(paths, "delete", change)
    }

    async fn reconcile(&self, paths: &[PathBuf], change: ChangeId) -> Result<()> {
        let existing: Vec<PathBuf> = paths
            .iter()
            .filter(|path| self.runtime.exists(path))
            .cloned()
            .collect();
        self.open(&existing, "edit", Some(change))
    }

    async fn revert_unchanged(&self, _paths: &[PathBuf], _change: ChangeId) -> Result<()> {
        Ok(())
    }

    async fn revert(&self, paths: &[PathBuf]) -> Result<()> {
        let mut state = self.state()?;
        for path in paths {
            state
                .opened
                .retain(|opened, _| opened != path && !opened.starts_with(path));
        }
        Ok(())
    }

    async fn pending_changes(&self) -> Result<Vec<PendingChange>> {
        Ok(self.state()?.changes.clone())
    }

    async fn opened_files(&self) -> Result<Vec<OpenedFile>> {
        Ok(self.state()?.opened.values().cloned().collect())
    }

    /// Without history the working copy is the only revision.
    async fn print(&self, path: &Path) -> Result<String> {
        self.runtime.read_to_string(path)
    }

    async fn diff(&self, path: &Path) -> Result<()> {
        info!("No version control configured, not diffing {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use crate::test_utils::write_file;
    use crate::vcs::find_or_open_change;

    #[tokio::test]
    async fn test_changes_are_numbered_and_reused() {
        let vcs = LocalVcs::new(Arc::new(RealRuntime));
        assert_eq!(vcs.open_change("vendor a into /x").await.unwrap(), 1);
        assert_eq!(vcs.open_change("delete package at /y").await.unwrap(), 2);
        assert_eq!(
            find_or_open_change(&vcs, "delete package at /y").await.unwrap(),
            2
        );
        assert_eq!(vcs.pending_changes().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_records_files_under_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "pkg/a.go", "package a");
        write_file(dir.path(), "pkg/sub/BUILD", "");

        let vcs = LocalVcs::new(Arc::new(RealRuntime));
        let change = vcs.open_change("vendor pkg").await.unwrap();
        vcs.reconcile(
            &[dir.path().join("pkg"), dir.path().join("gone")],
            change,
        )
        .await
        .unwrap();

        let opened = vcs.opened_files().await.unwrap();
        let paths: Vec<_> = opened.iter().map(|f| f.path.clone()).collect();
        assert_eq!(
            paths,
            vec![dir.path().join("pkg/a.go"), dir.path().join("pkg/sub/BUILD")]
        );
        assert!(opened.iter().all(|f| f.change == Some(change)));
    }

    #[tokio::test]
    async fn test_revert_forgets_files() {
        let vcs = LocalVcs::new(Arc::new(RealRuntime));
        vcs.add(&[PathBuf::from("/nonexistent/a/BUILD")], None)
            .await
            .unwrap();
        vcs.edit(&[PathBuf::from("/nonexistent/b")], None).await.unwrap();
        vcs.revert(&[PathBuf::from("/nonexistent/a")]).await.unwrap();

        let opened = vcs.opened_files().await.unwrap();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].path, PathBuf::from("/nonexistent/b"));
        assert_eq!(opened[0].action, "edit");
    }
}
