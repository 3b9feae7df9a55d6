use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{debug, info};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ChangeId, OpenedFile, PendingChange, Vcs, ztag};
use crate::process::{CommandRunner, Invocation};
use crate::runtime::Runtime;

/// Drives the `p4` command line.
pub struct PerforceVcs {
    runtime: Arc<dyn Runtime>,
    runner: Arc<dyn CommandRunner>,
    p4: PathBuf,
    cwd: PathBuf,
}

struct ClientInfo {
    user: String,
    client: String,
}

impl PerforceVcs {
    pub fn new(
        runtime: Arc<dyn Runtime>,
        runner: Arc<dyn CommandRunner>,
        p4: impl Into<PathBuf>,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runtime,
            runner,
            p4: p4.into(),
            cwd: cwd.into(),
        }
    }

    fn command(&self) -> Invocation {
        Invocation::new(&self.p4).current_dir(&self.cwd)
    }

    /// Directories are addressed as `<dir>/...`.
    fn file_specs(&self, paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|path| {
                let spec = path.to_string_lossy().into_owned();
                if self.runtime.is_dir(path) {
                    format!("{}/...", spec.trim_end_matches('/'))
                } else {
                    spec
                }
            })
            .collect()
    }

    async fn run_on_files(
        &self,
        command: &str,
        flags: &[String],
        paths: &[PathBuf],
    ) -> Result<String> {
        let invocation = self
            .command()
            .arg(command)
            .args(flags.iter().cloned())
            .args(self.file_specs(paths));
        self.runner.run(&invocation).await
    }

    async fn client_info(&self) -> Result<ClientInfo> {
        let output = self.runner.run(&self.command().args(["-ztag", "info"])).await?;
        let record = ztag::parse(&output)
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("p4 info returned no data"))?;
        let field = |key: &str| {
            record
                .get(key)
                .cloned()
                .ok_or_else(|| anyhow!("p4 info did not report {}", key))
        };
        Ok(ClientInfo {
            user: field("userName")?,
            client: field("clientName")?,
        })
    }
}

fn change_flags(change: Option<ChangeId>) -> Vec<String> {
    match change {
        Some(id) => vec!["-c".to_string(), id.to_string()],
        None => Vec::new(),
    }
}

fn parse_created_change(output: &str) -> Result<ChangeId> {
    // "Change 1234 created."
    output
        .split_whitespace()
        .nth(1)
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| anyhow!("unexpected p4 change output: {}", output.trim()))
}

#[async_trait]
impl Vcs for PerforceVcs {
    #[tracing::instrument(skip(self))]
    async fn open_change(&self, description: &str) -> Result<ChangeId> {
        let info = self.client_info().await?;
        let description = description
            .lines()
            .map(|line| format!("\t{}", line))
            .collect::<Vec<_>>()
            .join("\n");
        let spec = format!(
            "Change:\tnew\n\nClient:\t{}\n\nUser:\t{}\n\nStatus:\tnew\n\nDescription:\n{}\n",
            info.client, info.user, description
        );
        let output = self
            .runner
            .run(&self.command().args(["change", "-i"]).stdin(spec))
            .await
            .context("failed to create a change")?;
        let id = parse_created_change(&output)?;
        debug!("Created change {}", id);
        Ok(id)
    }

    async fn edit(&self, paths: &[PathBuf], change: Option<ChangeId>) -> Result<()> {
        self.run_on_files("edit", &change_flags(change), paths).await?;
        Ok(())
    }

    async fn add(&self, paths: &[PathBuf], change: Option<ChangeId>) -> Result<()> {
        self.run_on_files("add", &change_flags(change), paths).await?;
        Ok(())
    }

    async fn delete(&self, paths: &[PathBuf], change: Option<ChangeId>) -> Result<()> {
        self.run_on_files("delete", &change_flags(change), paths).await?;
        Ok(())
    }

    async fn reconcile(&self, paths: &[PathBuf], change: ChangeId) -> Result<()> {
        self.run_on_files("reconcile", &change_flags(Some(change)), paths)
            .await?;
        Ok(())
    }

    async fn revert_unchanged(&self, paths: &[PathBuf], change: ChangeId) -> Result<()> {
        let mut flags = vec!["-a".to_string()];
        flags.extend(change_flags(Some(change)));
        self.run_on_files("revert", &flags, paths).await?;
        Ok(())
    }

    async fn revert(&self, paths: &[PathBuf]) -> Result<()> {
        self.run_on_files("revert", &[], paths).await?;
        Ok(())
    }

    async fn pending_changes(&self) -> Result<Vec<PendingChange>> {
        let info = self.client_info().await?;
        let output = self
            .runner
            .run(&self.command().args([
                "-ztag",
                "changes",
                "-c",
                info.client.as_str(),
                "-s",
                "pending",
                "-L",
            ]))
            .await?;
        ztag::parse(&output)
            .into_iter()
            .map(|record| {
                let id = record
                    .get("change")
                    .and_then(|id| id.parse().ok())
                    .ok_or_else(|| anyhow!("p4 changes returned a record without change"))?;
                Ok(PendingChange {
                    id,
                    description: record.get("desc").cloned().unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn opened_files(&self) -> Result<Vec<OpenedFile>> {
        let output = self
            .runner
            .run(&self.command().args(["-ztag", "opened"]))
            .await?;
        let records = ztag::parse(&output);
        let depot_files: Vec<String> = records
            .iter()
            .filter_map(|record| record.get("depotFile").cloned())
            .collect();
        if depot_files.is_empty() {
            return Ok(Vec::new());
        }

        let output = self
            .runner
            .run(&self.command().args(["-ztag", "where"]).args(depot_files))
            .await?;
        let local_paths: HashMap<String, String> = ztag::parse(&output)
            .into_iter()
            .filter_map(|mut record| Some((record.remove("depotFile")?, record.remove("path")?)))
            .collect();

        records
            .into_iter()
            .filter_map(|record| {
                let depot_file = record.get("depotFile")?;
                Some((depot_file.clone(), record))
            })
            .map(|(depot_file, record)| {
                let path = local_paths
                    .get(&depot_file)
                    .ok_or_else(|| anyhow!("could not map {} to a local path", depot_file))?;
                Ok(OpenedFile {
                    path: PathBuf::from(path),
                    action: record.get("action").cloned().unwrap_or_default(),
                    file_type: record.get("type").cloned().unwrap_or_default(),
                    change: record.get("change").and_then(|c| c.parse().ok()),
                })
            })
            .collect()
    }

    async fn print(&self, path: &Path) -> Result<String> {
        self.runner
            .run(&self.command().args(["print", "-q"]).path_args([path]))
            .await
            .with_context(|| format!("failed to print {}", path.display()))
    }

    async fn diff(&self, path: &Path) -> Result<()> {
        let output = self
            .runner
            .run(&self.command().arg("diff").path_args([path]))
            .await?;
        info!("Diff of {}", path.display());
        print!("{}", output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockCommandRunner;
    use crate::runtime::MockRuntime;

    const INFO: &str = "... userName alice\n... clientName alice-ws\n... clientRoot /mono\n";

    fn vcs(runner: MockCommandRunner, runtime: MockRuntime) -> PerforceVcs {
        PerforceVcs::new(Arc::new(runtime), Arc::new(runner), "p4", "/mono")
    }

    fn is_info(inv: &Invocation) -> bool {
        inv.args == ["-ztag", "info"]
    }

    #[tokio::test]
    async fn test_open_change_writes_spec() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(is_info)
            .returning(|_| Ok(INFO.to_string()));
        runner
            .expect_run()
            .withf(|inv| {
                inv.args == ["change", "-i"]
                    && inv.cwd == Some(PathBuf::from("/mono"))
                    && inv.stdin.as_deref()
                        == Some(
                            "Change:\tnew\n\nClient:\talice-ws\n\nUser:\talice\n\nStatus:\tnew\n\nDescription:\n\tvendor foo into /mono/third_party/foo\n",
                        )
            })
            .times(1)
            .returning(|_| Ok("Change 4321 created.\n".to_string()));

        let id = vcs(runner, MockRuntime::new())
            .open_change("vendor foo into /mono/third_party/foo")
            .await
            .unwrap();
        assert_eq!(id, 4321);
    }

    #[tokio::test]
    async fn test_directories_are_addressed_recursively() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_is_dir()
            .returning(|path| path == Path::new("/mono/third_party/foo"));
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv| {
                inv.args
                    == [
                        "reconcile",
                        "-c",
                        "5",
                        "/mono/third_party/foo/...",
                        "/mono/WORKSPACE",
                    ]
            })
            .times(1)
            .returning(|_| Ok(String::new()));
        runner
            .expect_run()
            .withf(|inv| inv.args == ["revert", "-a", "-c", "5", "/mono/third_party/foo/..."])
            .times(1)
            .returning(|_| Ok(String::new()));

        let vcs = vcs(runner, runtime);
        vcs.reconcile(
            &[
                PathBuf::from("/mono/third_party/foo"),
                PathBuf::from("/mono/WORKSPACE"),
            ],
            5,
        )
        .await
        .unwrap();
        vcs.revert_unchanged(&[PathBuf::from("/mono/third_party/foo")], 5)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_edit_in_default_change() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_dir().returning(|_| false);
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv| inv.args == ["edit", "/mono/BUILD"])
            .times(1)
            .returning(|_| Ok(String::new()));

        vcs(runner, runtime)
            .edit(&[PathBuf::from("/mono/BUILD")], None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_pending_changes() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(is_info)
            .returning(|_| Ok(INFO.to_string()));
        runner
            .expect_run()
            .withf(|inv| inv.args == ["-ztag", "changes", "-c", "alice-ws", "-s", "pending", "-L"])
            .returning(|_| {
                Ok("... change 10\n... desc Repository declaration changes\n\n... change 11\n... desc other\n".to_string())
            });

        let changes = vcs(runner, MockRuntime::new())
            .pending_changes()
            .await
            .unwrap();
        assert_eq!(
            changes,
            vec![
                PendingChange {
                    id: 10,
                    description: "Repository declaration changes".into()
                },
                PendingChange {
                    id: 11,
                    description: "other".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_opened_files_maps_local_paths() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv| inv.args == ["-ztag", "opened"])
            .returning(|_| {
                Ok("... depotFile //depot/tp/foo/a.go\n... action edit\n... change 3\n... type text\n... depotFile //depot/tp/foo/logo.png\n... action add\n... change default\n... type binary\n".to_string())
            });
        runner
            .expect_run()
            .withf(|inv| {
                inv.args
                    == [
                        "-ztag",
                        "where",
                        "//depot/tp/foo/a.go",
                        "//depot/tp/foo/logo.png",
                    ]
            })
            .returning(|_| {
                Ok("... depotFile //depot/tp/foo/a.go\n... path /mono/tp/foo/a.go\n\n... depotFile //depot/tp/foo/logo.png\n... path /mono/tp/foo/logo.png\n".to_string())
            });

        let files = vcs(runner, MockRuntime::new()).opened_files().await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, PathBuf::from("/mono/tp/foo/a.go"));
        assert_eq!(files[0].change, Some(3));
        assert!(files[0].is_text());
        assert_eq!(files[1].change, None);
        assert!(!files[1].is_text());
    }

    #[tokio::test]
    async fn test_opened_files_empty() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(1)
            .returning(|_| Ok(String::new()));
        let files = vcs(runner, MockRuntime::new()).opened_files().await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_command_failure_propagates() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_| Err(anyhow!("p4 info failed: connect to server failed")));
        let err = vcs(runner, MockRuntime::new())
            .open_change("x")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connect to server failed"));
    }

    #[tokio::test]
    async fn test_print_reads_submitted_revision() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv| inv.args == ["print", "-q", "/mono/tp/foo/a.go"])
            .times(1)
            .returning(|_| Ok("package foo\n".to_string()));
        let content = vcs(runner, MockRuntime::new())
            .print(Path::new("/mono/tp/foo/a.go"))
            .await
            .unwrap();
        assert_eq!(content, "package foo\n");
    }

    #[test]
    fn test_parse_created_change() {
        assert_eq!(parse_created_change("Change 77 created.\n").unwrap(), 77);
        assert!(parse_created_change("Oops").is_err());
    }
}
