//! Unified, name-keyed view of declared and vendored packages.
//!
//! The index pairs every manifest entry with the package of the same name
//! found on disk (if any). Conflicting declarations are rejected here, before
//! anything gets planned.

mod discovery;

use anyhow::Result;
use log::debug;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::model::{ManifestEntry, PackageMetadata};
use crate::runtime::Runtime;
use discovery::Discovery;

/// Directory, relative to the monorepo root, holding all third-party code.
pub const THIRD_PARTY_DIR: &str = "third_party";

/// Index of a manifest scope inside an [`Index`].
pub type ScopeId = usize;

/// Structural problems found while building the index.
#[derive(Debug)]
pub enum IndexError {
    /// A metadata file with no enclosing manifest
    OrphanMetadata { path: PathBuf },
    /// Two manifests declaring the same package name
    DuplicateEntry {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
    /// Two directories vendoring the same package name
    DuplicatePackage {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
    /// A manifest or metadata file that cannot be read
    Parse { path: PathBuf, reason: String },
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::OrphanMetadata { path } => write!(
                f,
                "root MANIFEST file not found, found METADATA file {} instead",
                path.display()
            ),
            IndexError::DuplicateEntry {
                name,
                first,
                second,
            } => write!(
                f,
                "manifest entry {} in {} conflicts with the one in {}",
                name,
                second.display(),
                first.display()
            ),
            IndexError::DuplicatePackage {
                name,
                first,
                second,
            } => write!(
                f,
                "package {} at {} conflicts with the one at {}",
                name,
                second.display(),
                first.display()
            ),
            IndexError::Parse { path, reason } => {
                write!(f, "could not parse {}: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for IndexError {}

/// A directory owning a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub dir: PathBuf,
    /// Build-graph addressing path of `dir`, e.g. `//third_party/go`.
    pub ws_path: String,
    pub manifest_path: PathBuf,
}

/// A package found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalPackage {
    pub path: PathBuf,
    pub metadata_path: PathBuf,
    pub metadata: PackageMetadata,
}

/// What is known about one package name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub package: Option<PhysicalPackage>,
    pub package_scope: Option<ScopeId>,
    pub entry: Option<ManifestEntry>,
    pub entry_scope: Option<ScopeId>,
}

impl PackageRecord {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            package: None,
            package_scope: None,
            entry: None,
            entry_scope: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Index {
    root: PathBuf,
    scopes: Vec<Scope>,
    records: BTreeMap<String, PackageRecord>,
}

impl Index {
    /// Walks `<root>/third_party` and pairs declarations with packages.
    #[tracing::instrument(skip(runtime))]
    pub fn build(runtime: &dyn Runtime, root: &Path) -> Result<Self> {
        let third_party = root.join(THIRD_PARTY_DIR);
        let mut discovery = Discovery::default();
        discovery.collect(
            runtime,
            &third_party,
            &format!("//{}", THIRD_PARTY_DIR),
            None,
        )?;
        if discovery.scopes.is_empty() {
            debug!("No manifest found under {:?}", third_party);
        }

        let Discovery {
            scopes,
            manifests,
            packages,
        } = discovery;

        let mut records: BTreeMap<String, PackageRecord> = BTreeMap::new();
        for (scope, package) in packages {
            let name = package.metadata.name.clone();
            let record = records
                .entry(name.clone())
                .or_insert_with(|| PackageRecord::new(&name));
            if let Some(existing) = &record.package {
                return Err(IndexError::DuplicatePackage {
                    name,
                    first: existing.path.clone(),
                    second: package.path,
                }
                .into());
            }
            record.package = Some(package);
            record.package_scope = Some(scope);
        }

        for (scope, manifest) in manifests {
            for entry in manifest.entries {
                let name = entry.name.clone();
                let record = records
                    .entry(name.clone())
                    .or_insert_with(|| PackageRecord::new(&name));
                if let Some(existing_scope) = record.entry_scope {
                    return Err(IndexError::DuplicateEntry {
                        name,
                        first: scopes[existing_scope].manifest_path.clone(),
                        second: scopes[scope].manifest_path.clone(),
                    }
                    .into());
                }
                record.entry = Some(entry);
                record.entry_scope = Some(scope);
            }
        }

        debug!(
            "Indexed {} package names across {} manifests",
            records.len(),
            scopes.len()
        );
        Ok(Self {
            root: root.to_path_buf(),
            scopes,
            records,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// Records in name order.
    pub fn records(&self) -> impl Iterator<Item = &PackageRecord> {
        self.records.values()
    }

    pub fn record(&self, name: &str) -> Option<&PackageRecord> {
        self.records.get(name)
    }

    /// Directory a declared package should live in: `<manifest dir>/<name>`.
    pub fn entry_dir(&self, record: &PackageRecord) -> Option<PathBuf> {
        record
            .entry_scope
            .map(|scope| self.scopes[scope].dir.join(&record.name))
    }

    /// Build-graph path of every declared, non-local package.
    pub fn addressing_map(&self) -> BTreeMap<String, String> {
        self.records
            .values()
            .filter_map(|record| {
                let entry = record.entry.as_ref()?;
                if entry.set_as_local_repository {
                    return None;
                }
                let scope = &self.scopes[record.entry_scope?];
                Some((
                    record.name.clone(),
                    format!("{}/{}", scope.ws_path, record.name),
                ))
            })
            .collect()
    }
}
