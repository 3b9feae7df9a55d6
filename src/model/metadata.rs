use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::SourceKind;
use crate::runtime::Runtime;

/// File names accepted for the metadata sidecar, in priority order.
pub const METADATA_FILE_NAMES: [&str; 2] = ["METADATA.textpb", "METADATA"];

/// Provenance record stored beside every vendored package.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    pub name: String,
    #[serde(default)]
    pub is_local_repository: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PackageSource>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct License {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

/// Where a vendored package came from and which exact revision was taken.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PackageSource {
    Git { url: String, sha: String },
    Go { import_path: String, version: String },
    Archive { url: String, version: String, sha256: String },
}

impl PackageSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            PackageSource::Git { .. } => SourceKind::Git,
            PackageSource::Go { .. } => SourceKind::Go,
            PackageSource::Archive { .. } => SourceKind::Archive,
        }
    }

    /// Location of the upstream (URL or import path).
    pub fn location(&self) -> &str {
        match self {
            PackageSource::Git { url, .. } | PackageSource::Archive { url, .. } => url,
            PackageSource::Go { import_path, .. } => import_path,
        }
    }

    /// The pinned identity (commit sha, module version, archive version).
    pub fn pinned_ref(&self) -> &str {
        match self {
            PackageSource::Git { sha, .. } => sha,
            PackageSource::Go { version, .. } | PackageSource::Archive { version, .. } => version,
        }
    }
}

impl PackageMetadata {
    pub fn new(name: impl Into<String>, source: Option<PackageSource>) -> Self {
        Self {
            name: name.into(),
            is_local_repository: false,
            last_update_date: None,
            license: None,
            source,
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source
            .as_ref()
            .map(PackageSource::kind)
            .unwrap_or(SourceKind::None)
    }

    /// Returns the first metadata file present in `dir`, if any.
    pub fn find(runtime: &dyn Runtime, dir: &Path) -> Option<PathBuf> {
        METADATA_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| runtime.is_file(path))
    }

    /// Path the metadata of the package rooted at `dir` should be written to.
    pub fn path_in(runtime: &dyn Runtime, dir: &Path) -> PathBuf {
        Self::find(runtime, dir).unwrap_or_else(|| dir.join("METADATA"))
    }

    #[tracing::instrument(skip(runtime))]
    pub fn load(runtime: &dyn Runtime, path: &Path) -> Result<Self> {
        let content = runtime.read_to_string(path)?;
        let metadata: PackageMetadata = toml::from_str(&content)
            .with_context(|| format!("could not read METADATA file {}", path.display()))?;
        Ok(metadata)
    }

    #[tracing::instrument(skip(self, runtime))]
    pub fn save(&self, runtime: &dyn Runtime, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| format!("failed to serialize metadata of {}", self.name))?;
        runtime.write(path, content.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use mockall::predicate::eq;

    const GIT_METADATA: &str = r#"
name = "zlib"
is_local_repository = false
last_update_date = "2021-03-04"

[license]
type = "notice"
name = "Zlib"

[source.git]
url = "https://github.com/madler/zlib"
sha = "cacf7f1d4e3d44d871b605da3b647f07d718623f"
"#;

    #[test]
    fn test_metadata_parses_git_source() {
        let metadata: PackageMetadata = toml::from_str(GIT_METADATA).unwrap();
        assert_eq!(metadata.name, "zlib");
        assert_eq!(metadata.source_kind(), SourceKind::Git);
        assert_eq!(
            metadata.last_update_date,
            NaiveDate::from_ymd_opt(2021, 3, 4)
        );
        assert_eq!(metadata.license.as_ref().unwrap().kind, "notice");
        let source = metadata.source.unwrap();
        assert_eq!(source.location(), "https://github.com/madler/zlib");
        assert_eq!(
            source.pinned_ref(),
            "cacf7f1d4e3d44d871b605da3b647f07d718623f"
        );
    }

    #[test]
    fn test_metadata_without_source_is_kind_none() {
        let metadata: PackageMetadata = toml::from_str("name = \"handwritten\"").unwrap();
        assert_eq!(metadata.source_kind(), SourceKind::None);
        assert!(!metadata.is_local_repository);
        assert!(metadata.license.is_none());
    }

    #[test]
    fn test_metadata_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("METADATA");
        let mut metadata = PackageMetadata::new(
            "org_golang_x_text",
            Some(PackageSource::Go {
                import_path: "golang.org/x/text".into(),
                version: "v0.3.5".into(),
            }),
        );
        metadata.is_local_repository = true;
        metadata.last_update_date = NaiveDate::from_ymd_opt(2024, 1, 31);

        metadata.save(&RealRuntime, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[source.go]"));
        assert!(written.contains("last_update_date = \"2024-01-31\""));

        let loaded = PackageMetadata::load(&RealRuntime, &path).unwrap();
        assert_eq!(loaded, metadata);
    }

    #[test]
    fn test_metadata_load_reports_file_on_parse_error() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .with(eq(Path::new("/pkg/METADATA").to_path_buf()))
            .returning(|_| Ok("name = ".into()));

        let err = PackageMetadata::load(&runtime, Path::new("/pkg/METADATA")).unwrap_err();
        assert!(err.to_string().contains("/pkg/METADATA"));
    }

    #[test]
    fn test_find_prefers_textpb() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_is_file()
            .with(eq(Path::new("/pkg/METADATA.textpb").to_path_buf()))
            .returning(|_| true);

        assert_eq!(
            PackageMetadata::find(&runtime, Path::new("/pkg")),
            Some(PathBuf::from("/pkg/METADATA.textpb"))
        );
    }

    #[test]
    fn test_path_in_defaults_to_plain_name() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_file().returning(|_| false);

        assert_eq!(
            PackageMetadata::path_in(&runtime, Path::new("/pkg")),
            PathBuf::from("/pkg/METADATA")
        );
    }
}
