use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::BuildGenerator;
use crate::process::{CommandRunner, Invocation};

/// Runs gazelle in the package directory.
pub struct GazelleGenerator {
    runner: Arc<dyn CommandRunner>,
    gazelle: PathBuf,
}

impl GazelleGenerator {
    pub fn new(runner: Arc<dyn CommandRunner>, gazelle: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            gazelle: gazelle.into(),
        }
    }

    fn invocation(&self, package_dir: &Path, import_path: &str) -> Invocation {
        Invocation::new(&self.gazelle)
            .arg("update")
            .arg(format!("-go_prefix={}", import_path))
            .args([
                "-index=false",
                "-go_naming_convention=import_alias",
                "-go_naming_convention_external=import",
                "-lang=go,proto",
            ])
            .current_dir(package_dir)
    }
}

#[async_trait]
impl BuildGenerator for GazelleGenerator {
    #[tracing::instrument(skip(self))]
    async fn generate(&self, package_dir: &Path, import_path: &str) -> Result<()> {
        let invocation = self.invocation(package_dir, import_path);
        let output = self
            .runner
            .run(&invocation)
            .await
            .context("gazelle update failed")?;
        if !output.is_empty() {
            debug!("gazelle: {}", output.trim_end());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockCommandRunner;

    #[tokio::test]
    async fn test_generate_runs_gazelle_in_package() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|inv| {
                inv.program == Path::new("/mono/bin/gazelle")
                    && inv.cwd.as_deref() == Some(Path::new("/mono/third_party/go/text"))
                    && inv.args
                        == [
                            "update",
                            "-go_prefix=golang.org/x/text",
                            "-index=false",
                            "-go_naming_convention=import_alias",
                            "-go_naming_convention_external=import",
                            "-lang=go,proto",
                        ]
            })
            .times(1)
            .returning(|_| Ok(String::new()));

        GazelleGenerator::new(Arc::new(runner), "/mono/bin/gazelle")
            .generate(Path::new("/mono/third_party/go/text"), "golang.org/x/text")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_generate_failure() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_| Err(anyhow::anyhow!("exit status 1")));

        let err = GazelleGenerator::new(Arc::new(runner), "gazelle")
            .generate(Path::new("/pkg"), "example.com/pkg")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("gazelle update failed"));
    }
}
