//! Records read from and written to the monorepo: manifests declare what
//! should be vendored, metadata sidecars record what actually is.

mod manifest;
mod metadata;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use manifest::{
    ArchiveSource, EntrySource, GitSource, GoSource, MANIFEST_FILE_NAMES, Manifest, ManifestEntry,
};
pub use metadata::{License, METADATA_FILE_NAMES, PackageMetadata, PackageSource};

/// Kind of upstream a package is vendored from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Git,
    Go,
    Archive,
    None,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Git => write!(f, "git"),
            SourceKind::Go => write!(f, "go"),
            SourceKind::Archive => write!(f, "archive"),
            SourceKind::None => write!(f, "none"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "git" => Ok(SourceKind::Git),
            "go" => Ok(SourceKind::Go),
            "archive" => Ok(SourceKind::Archive),
            "none" | "raw" => Ok(SourceKind::None),
            _ => anyhow::bail!(
                "Unknown source kind: {}. Expected git, go, archive, or none.",
                s
            ),
        }
    }
}
