//! Resolved settings of a run.
//!
//! Values given on the command line (or through `VENDORSYNC_*` variables,
//! which clap folds into the same overrides) win; everything else is derived
//! from the monorepo root.

use anyhow::{Result, bail};
use log::debug;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

/// File marking the root of a monorepo.
pub const MONOREPO_MARKER: &str = "MONOREPO";

const GO_IN_REPO: &str = "third_party/toolchains/go/bin/go";
const GAZELLE_IN_REPO: &str = "bin/gazelle";
const LICENSE_DB_IN_REPO: &str = "tools/vendorsync/license_database.toml";

/// Version-control backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum VcsKind {
    /// Perforce, through the `p4` command line
    #[default]
    P4,
    /// No version control; files are only changed on disk
    None,
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VcsKind::P4 => write!(f, "p4"),
            VcsKind::None => write!(f, "none"),
        }
    }
}

/// Settings given explicitly; `None` means "derive it".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root: Option<PathBuf>,
    pub vcs: Option<VcsKind>,
    pub go: Option<PathBuf>,
    pub gazelle: Option<PathBuf>,
    pub license_db: Option<PathBuf>,
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub root: PathBuf,
    pub vcs: VcsKind,
    pub go: PathBuf,
    pub gazelle: PathBuf,
    pub license_db: PathBuf,
    pub verbose: bool,
}

impl Config {
    #[tracing::instrument(skip(runtime))]
    pub fn load(runtime: &dyn Runtime, overrides: ConfigOverrides) -> Result<Self> {
        let root = match overrides.root {
            Some(root) => root,
            None => find_monorepo_root(runtime)?,
        };
        debug!("Monorepo root: {:?}", root);

        let go = overrides
            .go
            .unwrap_or_else(|| in_repo_or_path(runtime, &root, GO_IN_REPO, "go"));
        let gazelle = overrides
            .gazelle
            .unwrap_or_else(|| in_repo_or_path(runtime, &root, GAZELLE_IN_REPO, "gazelle"));
        let license_db = overrides
            .license_db
            .unwrap_or_else(|| root.join(LICENSE_DB_IN_REPO));

        Ok(Self {
            vcs: overrides.vcs.unwrap_or_default(),
            go,
            gazelle,
            license_db,
            verbose: overrides.verbose,
            root,
        })
    }
}

/// The checked-in tool when present, else the bare name resolved from `PATH`.
fn in_repo_or_path(runtime: &dyn Runtime, root: &Path, rel: &str, name: &str) -> PathBuf {
    let path = root.join(rel);
    if runtime.is_file(&path) {
        path
    } else {
        PathBuf::from(name)
    }
}

/// Nearest ancestor of the working directory holding a `MONOREPO` file.
pub fn find_monorepo_root(runtime: &dyn Runtime) -> Result<PathBuf> {
    let cwd = runtime.current_dir()?;
    for dir in cwd.ancestors() {
        if runtime.is_file(&dir.join(MONOREPO_MARKER)) {
            return Ok(dir.to_path_buf());
        }
    }
    bail!(
        "could not find a {} file in {} or any of its parents; use --root",
        MONOREPO_MARKER,
        cwd.display()
    )
}
