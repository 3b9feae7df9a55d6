//! License detection against a key-phrase database.
//!
//! The database is a TOML list of licenses, each identified by the phrases
//! that must all appear in a license text:
//!
//! ```toml
//! [[license]]
//! type = "notice"
//! name = "MIT"
//! key_phrases = ["Permission is hereby granted, free of charge"]
//! ```

use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::model::License;
use crate::runtime::Runtime;

static NEWLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n").expect("newline regex is valid"));

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LicenseDatabase {
    #[serde(default, rename = "license")]
    pub licenses: Vec<KnownLicense>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KnownLicense {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub key_phrases: Vec<String>,
}

impl LicenseDatabase {
    pub fn load(runtime: &dyn Runtime, path: &Path) -> Result<Self> {
        let content = runtime.read_to_string(path).with_context(|| {
            format!("failed to read license database file {}", path.display())
        })?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse license database file {}", path.display()))
    }

    /// The license with the most key phrases that all occur in `text`.
    pub fn identify(&self, text: &str) -> Option<License> {
        let text = NEWLINE_RE.replace_all(text, " ");
        let mut candidates: Vec<&KnownLicense> = self.licenses.iter().collect();
        // Stable: ties keep database order.
        candidates.sort_by(|a, b| b.key_phrases.len().cmp(&a.key_phrases.len()));
        candidates
            .into_iter()
            .find(|license| {
                license
                    .key_phrases
                    .iter()
                    .all(|phrase| text.contains(phrase.as_str()))
            })
            .map(|license| License {
                kind: license.kind.clone(),
                name: license.name.clone(),
            })
    }
}

/// Finds the single `LICENSE*` file directly inside `package_dir`.
pub fn find_license_file(runtime: &dyn Runtime, package_dir: &Path) -> Result<PathBuf> {
    let pattern = glob::Pattern::new("LICENSE*")?;
    let matches: Vec<PathBuf> = runtime
        .read_dir(package_dir)
        .context("failed to find LICENSE file")?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.matches(name))
        })
        .collect();
    match matches.as_slice() {
        [] => bail!("failed to find LICENSE file"),
        [single] => Ok(single.clone()),
        _ => bail!("more than 1 LICENSE files were found"),
    }
}

/// Identifies the license of the package at `package_dir`.
#[tracing::instrument(skip(runtime))]
pub fn detect_license(
    runtime: &dyn Runtime,
    database_path: &Path,
    package_dir: &Path,
) -> Result<License> {
    let license_file = find_license_file(runtime, package_dir)?;
    let text = runtime
        .read_to_string(&license_file)
        .with_context(|| format!("failed to read LICENSE file {}", license_file.display()))?;
    let database = LicenseDatabase::load(runtime, database_path)?;
    let license = database.identify(&text).ok_or_else(|| {
        anyhow!(
            "failed to match the LICENSE {} in the license database",
            license_file.display()
        )
    })?;
    debug!("Detected license {} in {:?}", license.name, license_file);
    Ok(license)
}
