use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::Fetcher;
use crate::model::{EntrySource, ManifestEntry, PackageMetadata, PackageSource, SourceKind};
use crate::process::{CommandRunner, Invocation};
use crate::runtime::Runtime;

/// Fetches a single commit of a git repository, without history.
pub struct GitFetcher {
    runtime: Arc<dyn Runtime>,
    runner: Arc<dyn CommandRunner>,
    git: PathBuf,
}

impl GitFetcher {
    pub fn new(runtime: Arc<dyn Runtime>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runtime,
            runner,
            git: PathBuf::from("git"),
        }
    }

    async fn git<I, S>(&self, cwd: &Path, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runner
            .run(&Invocation::new(&self.git).args(args).current_dir(cwd))
            .await
    }
}

#[async_trait]
impl Fetcher for GitFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::Git
    }

    #[tracing::instrument(skip(self, entry), fields(name = %entry.name))]
    async fn fetch(&self, entry: &ManifestEntry, destination: &Path) -> Result<PackageMetadata> {
        let EntrySource::Git(source) = &entry.source else {
            bail!("{} is not a git package", entry.name);
        };
        info!("Fetching {} at {}", source.url, source.commit);

        self.runtime.create_dir_all(destination)?;
        self.git(destination, ["init", "--quiet"]).await?;
        self.git(destination, ["remote", "add", "origin", source.url.as_str()])
            .await?;
        self.git(destination, ["fetch", "--quiet", "origin", source.commit.as_str()])
            .await?;
        self.git(destination, ["reset", "--quiet", "--hard", "FETCH_HEAD"])
            .await?;
        self.runtime.remove_dir_all(&destination.join(".git"))?;

        Ok(PackageMetadata::new(
            &entry.name,
            Some(PackageSource::Git {
                url: source.url.clone(),
                sha: source.commit.clone(),
            }),
        ))
    }
}

/// Commit sha `git_ref` (a branch or tag) points at in the remote `url`.
pub(super) async fn resolve_ref(
    runner: &dyn CommandRunner,
    cwd: &Path,
    url: &str,
    git_ref: &str,
) -> Result<String> {
    let output = runner
        .run(
            &Invocation::new("git")
                .args([
                    "ls-remote".to_string(),
                    url.to_string(),
                    format!("refs/heads/{}", git_ref),
                    format!("refs/tags/{}", git_ref),
                ])
                .current_dir(cwd),
        )
        .await?;
    parse_ls_remote(&output).ok_or_else(|| anyhow!("ref {} not found in {}", git_ref, url))
}

/// The sha of the first ref listed by `git ls-remote`.
pub fn parse_ls_remote(output: &str) -> Option<String> {
    let sha = output.lines().next()?.get(..40)?;
    sha.chars()
        .all(|c| c.is_ascii_hexdigit())
        .then(|| sha.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GitSource;
    use crate::process::MockCommandRunner;
    use crate::runtime::MockRuntime;
    use mockall::Sequence;
    use mockall::predicate::eq;
    use std::collections::BTreeSet;

    const SHA: &str = "0123456789abcdef0123456789abcdef01234567";

    #[tokio::test]
    async fn test_fetch_runs_git_in_order() {
        // --- Setup Runtime ---
        let mut runtime = MockRuntime::new();
        runtime
            .expect_create_dir_all()
            .with(eq(Path::new("/scratch/foo").to_path_buf()))
            .times(1)
            .returning(|_| Ok(()));
        runtime
            .expect_remove_dir_all()
            .with(eq(Path::new("/scratch/foo/.git").to_path_buf()))
            .times(1)
            .returning(|_| Ok(()));

        // --- Setup Runner ---
        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();
        for expected in [
            vec!["init", "--quiet"],
            vec!["remote", "add", "origin", "https://example.com/foo.git"],
            vec!["fetch", "--quiet", "origin", SHA],
            vec!["reset", "--quiet", "--hard", "FETCH_HEAD"],
        ] {
            runner
                .expect_run()
                .withf(move |inv| {
                    inv.program == Path::new("git")
                        && inv.args == expected
                        && inv.cwd.as_deref() == Some(Path::new("/scratch/foo"))
                })
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(String::new()));
        }

        // --- Execute ---
        let fetcher = GitFetcher::new(Arc::new(runtime), Arc::new(runner));
        let entry = ManifestEntry {
            name: "foo".into(),
            source: EntrySource::Git(GitSource {
                url: "https://example.com/foo.git".into(),
                commit: SHA.into(),
                git_ref: None,
            }),
            foreign_files: BTreeSet::new(),
            set_as_local_repository: false,
        };
        let metadata = fetcher.fetch(&entry, Path::new("/scratch/foo")).await.unwrap();

        // --- Verify ---
        assert_eq!(metadata.name, "foo");
        assert_eq!(
            metadata.source,
            Some(PackageSource::Git {
                url: "https://example.com/foo.git".into(),
                sha: SHA.into(),
            })
        );
    }

    #[tokio::test]
    async fn test_fetch_rejects_other_sources() {
        let fetcher = GitFetcher::new(Arc::new(MockRuntime::new()), Arc::new(MockCommandRunner::new()));
        let entry = ManifestEntry {
            name: "raw".into(),
            source: EntrySource::Raw,
            foreign_files: BTreeSet::new(),
            set_as_local_repository: false,
        };
        assert!(fetcher.fetch(&entry, Path::new("/scratch/raw")).await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_ref() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv| {
                inv.args
                    == [
                        "ls-remote",
                        "https://example.com/foo.git",
                        "refs/heads/v1.2",
                        "refs/tags/v1.2",
                    ]
            })
            .returning(|_| Ok(format!("{}\trefs/tags/v1.2\n", SHA)));

        let sha = resolve_ref(&runner, Path::new("/mono"), "https://example.com/foo.git", "v1.2")
            .await
            .unwrap();
        assert_eq!(sha, SHA);
    }

    #[test]
    fn test_parse_ls_remote() {
        assert_eq!(parse_ls_remote(&format!("{}\trefs/heads/main\n", SHA)), Some(SHA.to_string()));
        assert_eq!(parse_ls_remote(""), None);
        assert_eq!(parse_ls_remote("short\trefs/heads/main"), None);
        assert_eq!(
            parse_ls_remote("zz23456789abcdef0123456789abcdef01234567\tx"),
            None
        );
    }
}
