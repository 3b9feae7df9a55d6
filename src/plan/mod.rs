//! What a run is going to do.
//!
//! A [`Plan`] is computed from the [`Index`](crate::index::Index) alone and
//! holds immutable [`Action`]s, one per package needing attention, in name
//! order. Executing it is the job of [`crate::actions`].

mod builder;
mod validation;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::labels::FileReplacements;
use crate::model::ManifestEntry;

pub use builder::{build_regen_plan, build_vendor_plan, needs_update};
pub use validation::{ValidationError, go_repository_name, validate_entry, validate_index};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Fetch a declared package that is not vendored yet.
    Add {
        entry: ManifestEntry,
        dest: PathBuf,
        /// Where the `local_repository` declaration goes, for local entries.
        repo_decl: Option<PathBuf>,
    },
    /// Remove a vendored package no manifest declares any more.
    Delete { name: String, path: PathBuf },
    /// Re-fetch a package whose pin, addressing or location changed.
    Update {
        entry: ManifestEntry,
        dest: PathBuf,
        old_path: PathBuf,
        /// Set when a vendored package becomes a local repository.
        repo_decl: Option<PathBuf>,
    },
    /// Point references of an unchanged package at vendored paths.
    LabelUpdate {
        name: String,
        replacements: Vec<FileReplacements>,
        /// Local-repository marker to delete.
        workspace_file: Option<PathBuf>,
        /// Metadata whose local-repository flag must be cleared.
        metadata_path: Option<PathBuf>,
    },
    /// Run the build-file generator over a vendored package.
    Regenerate {
        entry: ManifestEntry,
        path: PathBuf,
        clean: bool,
    },
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::Add { entry, .. }
            | Action::Update { entry, .. }
            | Action::Regenerate { entry, .. } => &entry.name,
            Action::Delete { name, .. } | Action::LabelUpdate { name, .. } => name,
        }
    }

    /// Short description used in error messages.
    pub fn summary(&self) -> String {
        match self {
            Action::Add { entry, .. } => format!("add package {}", entry.name),
            Action::Delete { path, .. } => format!("delete package at {}", path.display()),
            Action::Update { entry, .. } => format!("update package {}", entry.name),
            Action::LabelUpdate { name, .. } => format!("update labels of {}", name),
            Action::Regenerate { entry, .. } => {
                format!("generate build files for {}", entry.name)
            }
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Add { entry, dest, .. } => {
                write!(f, "- Adding package {} in {}", entry.name, dest.display())
            }
            Action::Delete { path, .. } => {
                write!(f, "- Deleting package at \"{}\"", path.display())
            }
            Action::Update { dest, .. } => {
                write!(f, "- Updating package at \"{}\"", dest.display())
            }
            Action::LabelUpdate { replacements, .. } => {
                for (i, replacement) in replacements.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(
                        f,
                        "- Label replacements on file \"{}\"",
                        replacement.file.display()
                    )?;
                }
                Ok(())
            }
            Action::Regenerate { entry, .. } => {
                write!(f, "- Generating bazel files for \"{}\"", entry.name)
            }
        }
    }
}

/// Ordered actions plus the addressing map they were computed against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub actions: Vec<Action>,
    pub addressing: BTreeMap<String, String>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for action in &self.actions {
            writeln!(f, "{}", action)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntrySource;
    use std::collections::BTreeSet;

    fn raw_entry(name: &str) -> ManifestEntry {
        ManifestEntry {
            name: name.into(),
            source: EntrySource::Raw,
            foreign_files: BTreeSet::new(),
            set_as_local_repository: false,
        }
    }

    #[test]
    fn test_action_display() {
        let add = Action::Add {
            entry: raw_entry("foo"),
            dest: PathBuf::from("/mono/third_party/foo"),
            repo_decl: None,
        };
        assert_eq!(add.to_string(), "- Adding package foo in /mono/third_party/foo");

        let delete = Action::Delete {
            name: "old".into(),
            path: PathBuf::from("/mono/third_party/old"),
        };
        assert_eq!(delete.to_string(), "- Deleting package at \"/mono/third_party/old\"");
        assert_eq!(delete.summary(), "delete package at /mono/third_party/old");

        let labels = Action::LabelUpdate {
            name: "bar".into(),
            replacements: vec![
                FileReplacements {
                    file: PathBuf::from("/mono/third_party/bar/BUILD"),
                    pairs: vec![],
                },
                FileReplacements {
                    file: PathBuf::from("/mono/third_party/bar/x/BUILD"),
                    pairs: vec![],
                },
            ],
            workspace_file: None,
            metadata_path: None,
        };
        assert_eq!(
            labels.to_string(),
            "- Label replacements on file \"/mono/third_party/bar/BUILD\"\n- Label replacements on file \"/mono/third_party/bar/x/BUILD\""
        );
        assert_eq!(labels.name(), "bar");

        let regen = Action::Regenerate {
            entry: raw_entry("baz"),
            path: PathBuf::from("/mono/third_party/baz"),
            clean: false,
        };
        assert_eq!(regen.to_string(), "- Generating bazel files for \"baz\"");
        assert_eq!(regen.summary(), "generate build files for baz");
    }

    #[test]
    fn test_plan_display() {
        let plan = Plan {
            actions: vec![Action::Delete {
                name: "old".into(),
                path: PathBuf::from("/mono/third_party/old"),
            }],
            addressing: BTreeMap::new(),
        };
        assert_eq!(plan.to_string(), "- Deleting package at \"/mono/third_party/old\"\n");
        assert!(Plan::default().is_empty());
    }
}
