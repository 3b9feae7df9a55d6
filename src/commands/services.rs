//! Service factory for building run dependencies.
//!
//! This module separates the construction of services (version control,
//! fetchers, build-file generator) from the configuration they are derived
//! from.

use std::sync::Arc;

use anyhow::Result;
use reqwest::Client;

use crate::{
    fetch::{
        ArchiveFetcher, FetcherRegistry, GitFetcher, GoFetcher, ToolchainResolver, VersionResolver,
    },
    generate::{BuildGenerator, GazelleGenerator},
    http::HttpClient,
    process::{CommandRunner, SystemRunner},
    runtime::Runtime,
    vcs::{LocalVcs, PerforceVcs, Vcs},
};

use super::config::{Config, VcsKind};

/// Build an HTTP client for archive downloads
pub fn build_http_client() -> Result<HttpClient> {
    let client = Client::builder()
        .user_agent(concat!("vendorsync/", env!("VENDORSYNC_VERSION")))
        .build()?;
    Ok(HttpClient::new(client))
}

/// Build the version-control backend selected in the configuration
pub fn build_vcs(
    config: &Config,
    runtime: Arc<dyn Runtime>,
    runner: Arc<dyn CommandRunner>,
) -> Arc<dyn Vcs> {
    match config.vcs {
        VcsKind::P4 => Arc::new(PerforceVcs::new(runtime, runner, "p4", &config.root)),
        VcsKind::None => Arc::new(LocalVcs::new(runtime)),
    }
}

/// Build a FetcherRegistry with every supported source kind
pub fn build_fetcher_registry(
    config: &Config,
    runtime: Arc<dyn Runtime>,
    runner: Arc<dyn CommandRunner>,
    generator: Arc<dyn BuildGenerator>,
) -> Result<FetcherRegistry> {
    let mut registry = FetcherRegistry::new();
    registry.register(Arc::new(GitFetcher::new(runtime.clone(), runner.clone())));
    registry.register(Arc::new(GoFetcher::new(
        runtime.clone(),
        runner,
        generator,
        &config.go,
        &config.root,
    )));
    registry.register(Arc::new(ArchiveFetcher::new(runtime, build_http_client()?)));
    Ok(registry)
}

/// Container for everything a command needs besides the configuration.
pub struct Services {
    pub vcs: Arc<dyn Vcs>,
    pub generator: Arc<dyn BuildGenerator>,
    pub fetchers: FetcherRegistry,
    pub resolver: Arc<dyn VersionResolver>,
}

impl Services {
    pub fn from_config(config: &Config, runtime: Arc<dyn Runtime>) -> Result<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        let generator: Arc<dyn BuildGenerator> =
            Arc::new(GazelleGenerator::new(runner.clone(), &config.gazelle));
        Ok(Self {
            vcs: build_vcs(config, runtime.clone(), runner.clone()),
            fetchers: build_fetcher_registry(config, runtime, runner.clone(), generator.clone())?,
            resolver: Arc::new(ToolchainResolver::new(runner, &config.go, &config.root)),
            generator,
        })
    }
}
