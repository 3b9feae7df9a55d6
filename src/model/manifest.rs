use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::SourceKind;
use crate::runtime::Runtime;

/// File names accepted for a manifest, in priority order.
pub const MANIFEST_FILE_NAMES: [&str; 2] = ["MANIFEST.textpb", "MANIFEST"];

/// The declared packages of one directory scope.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default, rename = "entry")]
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Returns the first manifest file present in `dir`, if any.
    pub fn find(runtime: &dyn Runtime, dir: &Path) -> Option<PathBuf> {
        MANIFEST_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| runtime.is_file(path))
    }

    #[tracing::instrument(skip(runtime))]
    pub fn load(runtime: &dyn Runtime, path: &Path) -> Result<Self> {
        let content = runtime.read_to_string(path)?;
        let manifest: Manifest = toml::from_str(&content)
            .with_context(|| format!("could not read MANIFEST file {}", path.display()))?;
        Ok(manifest)
    }
}

/// One desired package, as declared by an operator.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(try_from = "RawManifestEntry")]
pub struct ManifestEntry {
    pub name: String,
    pub source: EntrySource,
    /// Files kept from the previous copy when the package is re-vendored.
    pub foreign_files: BTreeSet<PathBuf>,
    pub set_as_local_repository: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySource {
    Git(GitSource),
    Go(GoSource),
    Archive(ArchiveSource),
    /// Hand-maintained package; never fetched.
    Raw,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GitSource {
    pub url: String,
    #[serde(default)]
    pub commit: String,
    /// Branch or tag, only used to suggest a commit.
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GoSource {
    pub import_path: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub ignore_gazelle: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ArchiveSource {
    pub url: String,
    #[serde(default)]
    pub version: String,
}

impl ManifestEntry {
    pub fn source_kind(&self) -> SourceKind {
        match self.source {
            EntrySource::Git(_) => SourceKind::Git,
            EntrySource::Go(_) => SourceKind::Go,
            EntrySource::Archive(_) => SourceKind::Archive,
            EntrySource::Raw => SourceKind::None,
        }
    }

    pub fn go_import_path(&self) -> Option<&str> {
        match &self.source {
            EntrySource::Go(go) => Some(&go.import_path),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifestEntry {
    name: String,
    #[serde(default)]
    foreign_files: Vec<PathBuf>,
    #[serde(default)]
    set_as_local_repository: bool,
    git: Option<GitSource>,
    go: Option<GoSource>,
    archive: Option<ArchiveSource>,
    #[serde(default)]
    raw: bool,
}

impl TryFrom<RawManifestEntry> for ManifestEntry {
    type Error = String;

    fn try_from(raw: RawManifestEntry) -> Result<Self, Self::Error> {
        let mut sources = Vec::new();
        if let Some(git) = raw.git {
            sources.push(EntrySource::Git(git));
        }
        if let Some(go) = raw.go {
            sources.push(EntrySource::Go(go));
        }
        if let Some(archive) = raw.archive {
            sources.push(EntrySource::Archive(archive));
        }
        if raw.raw {
            sources.push(EntrySource::Raw);
        }
        if sources.len() > 1 {
            return Err(format!(
                "manifest entry {} declares more than one source",
                raw.name
            ));
        }
        let Some(source) = sources.pop() else {
            return Err(format!("manifest entry {} declares no source", raw.name));
        };
        Ok(ManifestEntry {
            name: raw.name,
            source,
            foreign_files: raw.foreign_files.into_iter().collect(),
            set_as_local_repository: raw.set_as_local_repository,
        })
    }
}
