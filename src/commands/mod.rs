use anyhow::{Context, Result};
use log::{debug, info};
use std::sync::Arc;

use crate::{
    actions::{ExecContext, diff_divergences, execute_plan},
    generate::{analyse_package, render_analysis},
    index::Index,
    plan::{Plan, build_regen_plan, build_vendor_plan, validate_index},
    runtime::Runtime,
};

pub mod config;
pub mod services;

use config::{Config, ConfigOverrides};
use services::Services;

#[derive(Debug, Clone, Copy, Default)]
pub struct VendorOptions {
    pub update_labels: bool,
    pub dry_run: bool,
    pub diff_divergences: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RegenOptions {
    pub package: Option<String>,
    pub clean: bool,
    pub dry_run: bool,
}

/// Bring every vendored package in line with the manifests
#[tracing::instrument(skip(runtime, overrides))]
pub async fn vendor(
    runtime: Arc<dyn Runtime>,
    options: VendorOptions,
    overrides: ConfigOverrides,
) -> Result<()> {
    let config = Config::load(runtime.as_ref(), overrides)?;
    let services = Services::from_config(&config, runtime.clone())?;
    run_vendor(runtime, &config, services, options).await
}

pub async fn run_vendor(
    runtime: Arc<dyn Runtime>,
    config: &Config,
    services: Services,
    options: VendorOptions,
) -> Result<()> {
    let index = Index::build(runtime.as_ref(), &config.root)
        .context("failed to create vendorsync context")?;
    validate_index(&index, services.resolver.as_ref()).await?;
    let plan = build_vendor_plan(runtime.as_ref(), &index, options.update_labels)
        .context("failed to create a vendoring plan")?;
    debug!("Vendoring plan has {} action(s)", plan.actions.len());

    let vcs = services.vcs.clone();
    run_plan(runtime, config, services, &plan, options.dry_run).await?;
    if options.diff_divergences && !options.dry_run {
        diff_divergences(vcs.as_ref()).await?;
    }
    Ok(())
}

/// Regenerate build files of vendored Go packages
#[tracing::instrument(skip(runtime, overrides))]
pub async fn regen(
    runtime: Arc<dyn Runtime>,
    options: RegenOptions,
    overrides: ConfigOverrides,
) -> Result<()> {
    let config = Config::load(runtime.as_ref(), overrides)?;
    let services = Services::from_config(&config, runtime.clone())?;
    run_regen(runtime, &config, services, options).await
}

pub async fn run_regen(
    runtime: Arc<dyn Runtime>,
    config: &Config,
    services: Services,
    options: RegenOptions,
) -> Result<()> {
    let index = Index::build(runtime.as_ref(), &config.root)
        .context("failed to create vendorsync context")?;
    validate_index(&index, services.resolver.as_ref()).await?;
    let plan = build_regen_plan(&index, options.package.as_deref(), options.clean)
        .context("failed to create a regen plan")?;
    run_plan(runtime, config, services, &plan, options.dry_run).await
}

async fn run_plan(
    runtime: Arc<dyn Runtime>,
    config: &Config,
    services: Services,
    plan: &Plan,
    dry_run: bool,
) -> Result<()> {
    if plan.is_empty() {
        info!("Nothing to do");
        return Ok(());
    }
    let ctx = ExecContext {
        runtime,
        vcs: services.vcs,
        fetchers: services.fetchers,
        generator: services.generator,
        root: config.root.clone(),
        license_db: config.license_db.clone(),
        addressing: plan.addressing.clone(),
        today: chrono::Local::now().date_naive(),
    };
    execute_plan(plan, &ctx, dry_run).await
}

/// Report which vendored packages have gazelle-generated build files
#[tracing::instrument(skip(runtime, overrides))]
pub fn analyse(runtime: &dyn Runtime, omit_non_go: bool, overrides: ConfigOverrides) -> Result<()> {
    let config = Config::load(runtime, overrides)?;
    print!("{}", analysis_report(runtime, &config, omit_non_go)?);
    Ok(())
}

fn analysis_report(runtime: &dyn Runtime, config: &Config, omit_non_go: bool) -> Result<String> {
    let index =
        Index::build(runtime, &config.root).context("failed to create vendorsync context")?;
    let mut results = Vec::new();
    for record in index.records() {
        if let Some(package) = &record.package {
            results.push(analyse_package(runtime, &record.name, &package.path)?);
        }
    }
    Ok(render_analysis(&results, config.verbose, omit_non_go))
}
