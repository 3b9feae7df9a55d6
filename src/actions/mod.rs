//! Carrying out a [`Plan`].
//!
//! Actions run one at a time in plan order. Each one mutates the monorepo
//! and mirrors what it did into a version-control change; a failure stops
//! the run and leaves earlier actions in place.

mod divergence;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::fetch::FetcherRegistry;
use crate::generate::{BuildGenerator, regenerate_package};
use crate::labels::{
    FileReplacements, apply_replacements, collect_replacements, ensure_workspace_file,
    relative_repo_path, render_repo_decl,
};
use crate::license::detect_license;
use crate::model::{EntrySource, ManifestEntry, PackageMetadata};
use crate::plan::{Action, Plan};
use crate::runtime::Runtime;
use crate::vcs::{Vcs, find_or_open_change};

pub use divergence::{DIVERGENCE_START, detect_divergences, diff_divergences};

/// Change collecting every new repository declaration of a run.
pub const REPO_DECL_CHANGE: &str = "Repository declaration changes";

/// Everything an action needs to run.
pub struct ExecContext {
    pub runtime: Arc<dyn Runtime>,
    pub vcs: Arc<dyn Vcs>,
    pub fetchers: FetcherRegistry,
    pub generator: Arc<dyn BuildGenerator>,
    pub root: PathBuf,
    pub license_db: PathBuf,
    /// Addressing map the plan was computed against.
    pub addressing: BTreeMap<String, String>,
    /// Stamped into the metadata of fetched packages.
    pub today: NaiveDate,
}

/// Prints every action and, unless `dry_run`, runs it.
#[tracing::instrument(skip_all, fields(actions = plan.actions.len(), dry_run = dry_run))]
pub async fn execute_plan(plan: &Plan, ctx: &ExecContext, dry_run: bool) -> Result<()> {
    for action in &plan.actions {
        println!("{}", action);
        if dry_run {
            continue;
        }
        action
            .run(ctx)
            .await
            .with_context(|| format!("failed to {}", action.summary()))?;
    }
    Ok(())
}

impl Action {
    pub async fn run(&self, ctx: &ExecContext) -> Result<()> {
        match self {
            Action::Add {
                entry,
                dest,
                repo_decl,
            } => sync_package(ctx, entry, dest, dest, repo_decl.as_deref()).await,
            Action::Update {
                entry,
                dest,
                old_path,
                repo_decl,
            } => sync_package(ctx, entry, dest, old_path, repo_decl.as_deref()).await,
            Action::Delete { path, .. } => delete_package(ctx, path).await,
            Action::LabelUpdate {
                name,
                replacements,
                workspace_file,
                metadata_path,
            } => {
                update_labels(
                    ctx,
                    name,
                    replacements,
                    workspace_file.as_deref(),
                    metadata_path.as_deref(),
                )
                .await
            }
            Action::Regenerate { entry, path, clean } => {
                let EntrySource::Go(go) = &entry.source else {
                    debug!("{} is not a Go package, nothing to generate", entry.name);
                    return Ok(());
                };
                regenerate_package(
                    ctx.runtime.as_ref(),
                    ctx.vcs.as_ref(),
                    ctx.generator.as_ref(),
                    path,
                    &go.import_path,
                    *clean,
                )
                .await
                .with_context(|| format!("failed to generate bazel files for {}", path.display()))
            }
        }
    }
}

/// Fetches `entry` and puts it at `dest`, replacing whatever is at
/// `old_path`.
#[tracing::instrument(skip(ctx, entry), fields(name = %entry.name))]
async fn sync_package(
    ctx: &ExecContext,
    entry: &ManifestEntry,
    dest: &Path,
    old_path: &Path,
    repo_decl: Option<&Path>,
) -> Result<()> {
    let runtime = ctx.runtime.as_ref();
    let scratch = tempfile::Builder::new()
        .prefix("vendorsync_")
        .tempdir()
        .context("couldn't create temp dir")?;
    let content = scratch.path().join(&entry.name);
    debug!("Fetching {} into {:?}", entry.name, content);

    let fetcher = ctx.fetchers.for_entry(entry)?;
    let mut metadata = fetcher
        .fetch(entry, &content)
        .await
        .with_context(|| format!("failed to get package {}", entry.name))?;

    metadata.license = match detect_license(runtime, &ctx.license_db, &content) {
        Ok(license) => Some(license),
        Err(e) => {
            warn!("LICENSE detection failed for {}: {:#}", entry.name, e);
            None
        }
    };
    metadata.last_update_date = Some(ctx.today);
    metadata.is_local_repository = entry.set_as_local_repository;
    metadata.save(runtime, &PackageMetadata::path_in(runtime, &content))?;

    let vcs = ctx.vcs.as_ref();
    let description = format!("vendor {} into {}", entry.name, dest.display());
    let mut change = None;
    if runtime.is_dir(old_path) {
        for file in &entry.foreign_files {
            let from = old_path.join(file);
            let to = content.join(file);
            if let Some(parent) = to.parent() {
                runtime.create_dir_all(parent)?;
            }
            runtime.copy(&from, &to).with_context(|| {
                format!(
                    "failed to copy over foreign file {} from existing package in {}",
                    file.display(),
                    old_path.display()
                )
            })?;
        }
        if old_path != dest {
            // Opened while the tree is still on disk to enumerate.
            let id = vcs.open_change(&description).await?;
            vcs.delete(&[old_path.to_path_buf()], Some(id)).await?;
            change = Some(id);
        }
        if runtime.exists(old_path) {
            runtime.remove_dir_all(old_path).with_context(|| {
                format!("failed to delete existing package at {}", old_path.display())
            })?;
        }
    }

    if entry.set_as_local_repository {
        ensure_workspace_file(runtime, &content)?;
    } else {
        let own_path = ctx.addressing.get(&entry.name).map(String::as_str);
        let replacements = collect_replacements(runtime, &ctx.addressing, &content, own_path)
            .with_context(|| format!("failed to collect label replacements of {}", entry.name))?;
        apply_replacements(runtime, &replacements)?;
    }

    runtime.copy_dir(&content, dest).with_context(|| {
        format!(
            "failed to copy temporary package sync location to its final destination ({} -> {})",
            content.display(),
            dest.display()
        )
    })?;

    let change = match change {
        Some(id) => id,
        None => vcs.open_change(&description).await?,
    };
    let touched = [dest.to_path_buf()];
    vcs.reconcile(&touched, change).await?;
    vcs.revert_unchanged(&touched, change).await?;

    if let Some(decl_file) = repo_decl {
        declare_repository(ctx, entry, dest, decl_file).await?;
    }
    info!("Vendored {} into {}", entry.name, dest.display());
    Ok(())
}

async fn declare_repository(
    ctx: &ExecContext,
    entry: &ManifestEntry,
    dest: &Path,
    decl_file: &Path,
) -> Result<()> {
    let runtime = ctx.runtime.as_ref();
    let mut content = runtime.read_to_string(decl_file).with_context(|| {
        format!(
            "could not read repository declaration file {}",
            decl_file.display()
        )
    })?;
    let repo_path = relative_repo_path(&ctx.root, dest)?;
    content.push_str(&render_repo_decl(
        decl_file,
        &repo_path,
        &entry.name,
        entry.go_import_path(),
    ));

    let change = find_or_open_change(ctx.vcs.as_ref(), REPO_DECL_CHANGE).await?;
    ctx.vcs.edit(&[decl_file.to_path_buf()], Some(change)).await?;
    runtime.write(decl_file, content.as_bytes()).with_context(|| {
        format!(
            "could not write repository declaration file {}",
            decl_file.display()
        )
    })
}

async fn delete_package(ctx: &ExecContext, path: &Path) -> Result<()> {
    let change = ctx
        .vcs
        .open_change(&format!("delete package at {}", path.display()))
        .await?;
    ctx.vcs.delete(&[path.to_path_buf()], Some(change)).await?;
    if ctx.runtime.exists(path) {
        ctx.runtime.remove_dir_all(path)?;
    }
    Ok(())
}

async fn update_labels(
    ctx: &ExecContext,
    name: &str,
    replacements: &[FileReplacements],
    workspace_file: Option<&Path>,
    metadata_path: Option<&Path>,
) -> Result<()> {
    let runtime = ctx.runtime.as_ref();
    let vcs = ctx.vcs.as_ref();
    let change = find_or_open_change(vcs, &format!("update labels of {}", name)).await?;

    for replacement in replacements {
        let content = runtime.read_to_string(&replacement.file).with_context(|| {
            format!("failed to read file {}", replacement.file.display())
        })?;
        vcs.edit(&[replacement.file.clone()], Some(change)).await?;
        runtime.write(&replacement.file, replacement.apply(&content).as_bytes())?;
    }

    if let Some(workspace_file) = workspace_file {
        vcs.delete(&[workspace_file.to_path_buf()], Some(change))
            .await?;
        if runtime.exists(workspace_file) {
            runtime.remove_file(workspace_file)?;
        }
    }

    if let Some(metadata_path) = metadata_path {
        let mut metadata = PackageMetadata::load(runtime, metadata_path)?;
        metadata.is_local_repository = false;
        vcs.edit(&[metadata_path.to_path_buf()], Some(change)).await?;
        metadata.save(runtime, metadata_path)?;
    }
    Ok(())
}
