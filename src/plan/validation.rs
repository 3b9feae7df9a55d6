use anyhow::Result;
use log::debug;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::fetch::VersionResolver;
use crate::index::Index;
use crate::model::{EntrySource, ManifestEntry};

static REPO_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("repository name regex is valid"));
static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9A-Za-z_]+").expect("non-word regex is valid"));
static MODULE_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v[0-9]").expect("module version regex is valid"));
static COMMIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{40}$").expect("commit regex is valid"));

/// Go entries with this name predate the naming rule and keep it.
const NAMING_EXEMPT_GO_ENTRY: &str = "bazel_gazelle";

/// A manifest entry that cannot be planned as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A Go entry not named after its import path
    NonCanonicalName { name: String, expected: String },
    /// A name that cannot be used as an external repository name
    InvalidName { name: String },
    /// A symbolic or missing version, with the pinned value to use when known
    UnresolvedVersion {
        name: String,
        detail: String,
        suggestion: Option<String>,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NonCanonicalName { name, expected } => write!(
                f,
                "the name of the repo should be changed to {} instead of {}",
                expected, name
            ),
            ValidationError::InvalidName { name } => {
                write!(f, "{} is not a valid repository name", name)
            }
            ValidationError::UnresolvedVersion {
                detail,
                suggestion: Some(suggestion),
                ..
            } => write!(
                f,
                "{}; please change it to {} to proceed",
                detail, suggestion
            ),
            ValidationError::UnresolvedVersion { detail, .. } => write!(f, "{}", detail),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Repository name of a Go import path: host labels reversed, then the path
/// components, joined and with every non-word run replaced by `_`.
///
/// `golang.org/x/text` becomes `org_golang_x_text`.
pub fn go_repository_name(import_path: &str) -> String {
    let import_path = import_path.to_lowercase();
    let mut components = import_path.split('/');
    let host = components.next().unwrap_or_default();
    let parts: Vec<&str> = host.split('.').rev().chain(components).collect();
    NON_WORD_RE.replace_all(&parts.join("."), "_").into_owned()
}

fn unresolved(entry: &ManifestEntry, detail: String, suggestion: Option<String>) -> ValidationError {
    ValidationError::UnresolvedVersion {
        name: entry.name.clone(),
        detail,
        suggestion,
    }
}

/// Checks naming and version pinning of one entry. The resolver is only
/// consulted to build the corrective suggestion.
#[tracing::instrument(skip(entry, resolver), fields(name = %entry.name))]
pub async fn validate_entry(
    entry: &ManifestEntry,
    resolver: &dyn VersionResolver,
) -> Result<(), ValidationError> {
    if !REPO_NAME_RE.is_match(&entry.name) {
        return Err(ValidationError::InvalidName {
            name: entry.name.clone(),
        });
    }

    match &entry.source {
        EntrySource::Go(go) => {
            if entry.name != NAMING_EXEMPT_GO_ENTRY {
                let expected = go_repository_name(&go.import_path);
                if entry.name != expected {
                    return Err(ValidationError::NonCanonicalName {
                        name: entry.name.clone(),
                        expected,
                    });
                }
            }
            if go.version == "latest" || !MODULE_VERSION_RE.is_match(&go.version) {
                let query = if go.version.is_empty() {
                    "latest"
                } else {
                    go.version.as_str()
                };
                let detail = format!(
                    "the version {:?} of {} is not a pinned module version",
                    go.version, go.import_path
                );
                return Err(match resolver.resolve_go_version(&go.import_path, query).await {
                    Ok(version) => unresolved(entry, detail, Some(version)),
                    Err(e) => {
                        debug!("Could not resolve {}@{}: {}", go.import_path, query, e);
                        unresolved(entry, detail, None)
                    }
                });
            }
        }
        EntrySource::Git(git) => {
            if !COMMIT_RE.is_match(&git.commit) {
                let detail = if git.commit.is_empty() {
                    format!("a commit field is mandatory for {}", entry.name)
                } else {
                    format!("commit {:?} of {} is not a full sha", git.commit, entry.name)
                };
                let reference = git
                    .git_ref
                    .as_deref()
                    .or((!git.commit.is_empty()).then_some(git.commit.as_str()));
                let suggestion = match reference {
                    Some(reference) => match resolver.resolve_git_ref(&git.url, reference).await {
                        Ok(sha) => Some(sha),
                        Err(e) => {
                            debug!("Could not resolve {} in {}: {}", reference, git.url, e);
                            None
                        }
                    },
                    None => None,
                };
                return Err(unresolved(entry, detail, suggestion));
            }
        }
        EntrySource::Archive(archive) => {
            if archive.version.is_empty() {
                return Err(unresolved(
                    entry,
                    format!("an archive version is mandatory for {}", entry.name),
                    None,
                ));
            }
        }
        EntrySource::Raw => {}
    }
    Ok(())
}

/// Validates every declared entry, in name order, stopping at the first
/// violation.
pub async fn validate_index(index: &Index, resolver: &dyn VersionResolver) -> Result<()> {
    for entry in index.records().filter_map(|record| record.entry.as_ref()) {
        validate_entry(entry, resolver).await?;
    }
    Ok(())
}
