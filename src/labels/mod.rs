//! Rewrites cross-package references in build files.
//!
//! A reference has the form `@<name>//<path>[:<target>]`. When a package is
//! vendored (rather than declared as a local repository) its references must
//! address it by its monorepo path instead, e.g. `//third_party/<name>/<path>`.
//! Files are rewritten textually; they are never parsed or reformatted.

mod workspace;

use anyhow::{Context, Result};
use log::debug;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::runtime::Runtime;

pub use workspace::{
    LOCAL_REPOSITORIES_FILE, WORKSPACE_FILE, ensure_workspace_file, relative_repo_path,
    render_repo_decl, repo_decl_file,
};

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"@([A-Za-z0-9\-._]+)//((?:[A-Za-z0-9/\-._])*(?::[A-Za-z0-9!%_@^#$&'()*\-+,;<=>?\[\]{|}~/.]+)?)"#,
    )
    .expect("label pattern is valid")
});

/// One external reference found in a build file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelRef<'a> {
    /// The whole reference, e.g. `@foo//bar:baz`.
    pub span: &'a str,
    /// Repository name, e.g. `foo`.
    pub name: &'a str,
    /// Everything after `//`, e.g. `bar:baz`.
    pub suffix: &'a str,
}

/// Every external reference in `content`, left to right.
pub fn find_labels(content: &str) -> impl Iterator<Item = LabelRef<'_>> {
    LABEL_RE.captures_iter(content).filter_map(|caps| {
        Some(LabelRef {
            span: caps.get(0)?.as_str(),
            name: caps.get(1)?.as_str(),
            suffix: caps.get(2)?.as_str(),
        })
    })
}

/// `BUILD`, `BUILD.bazel` and `*.bzl` files.
pub fn is_build_file(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some("BUILD") | Some("BUILD.bazel") => true,
        _ => path.extension().is_some_and(|ext| ext == "bzl"),
    }
}

/// All build files under `dir`, depth first in name order.
pub fn collect_build_files(runtime: &dyn Runtime, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_build_files_into(runtime, dir, &mut files)?;
    Ok(files)
}

fn collect_build_files_into(
    runtime: &dyn Runtime,
    dir: &Path,
    files: &mut Vec<PathBuf>,
) -> Result<()> {
    for child in runtime.read_dir(dir)? {
        if runtime.is_dir(&child) {
            collect_build_files_into(runtime, &child, files)?;
        } else if is_build_file(&child) {
            files.push(child);
        }
    }
    Ok(())
}

/// Literal substitutions to perform on one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReplacements {
    pub file: PathBuf,
    /// `(from, to)` pairs; earlier pairs win when two match at one position.
    pub pairs: Vec<(String, String)>,
}

impl FileReplacements {
    pub fn apply(&self, content: &str) -> String {
        replace_literals(content, &self.pairs)
    }
}

/// Replaces every non-overlapping occurrence of a `from` string, scanning left
/// to right. At a given position the first matching pair wins.
pub fn replace_literals(content: &str, pairs: &[(String, String)]) -> String {
    let mut seen = HashSet::new();
    let mut lookup = BTreeMap::new();
    let mut alternatives = Vec::new();
    for (from, to) in pairs {
        if from.is_empty() || !seen.insert(from.as_str()) {
            continue;
        }
        lookup.insert(from.as_str(), to.as_str());
        alternatives.push(regex::escape(from));
    }
    if alternatives.is_empty() {
        return content.to_string();
    }
    let Ok(matcher) = Regex::new(&alternatives.join("|")) else {
        return content.to_string();
    };
    matcher
        .replace_all(content, |caps: &regex::Captures| {
            let found = &caps[0];
            lookup.get(found).copied().unwrap_or(found).to_string()
        })
        .into_owned()
}

/// Computes the rewrites needed under `package_dir`.
///
/// References to names in `addressing` are pointed at their monorepo path.
/// References to other names are left alone. With `own_path`, references the
/// package makes to itself (`//:x`, `//<child>/...`) are anchored at it.
/// Only files whose content would change are returned.
pub fn collect_replacements(
    runtime: &dyn Runtime,
    addressing: &BTreeMap<String, String>,
    package_dir: &Path,
    own_path: Option<&str>,
) -> Result<Vec<FileReplacements>> {
    let mut local_pairs = Vec::new();
    if let Some(own) = own_path {
        // Already-anchored paths must not be rewritten again by a child pattern.
        for path in addressing.values().map(String::as_str).chain([own]) {
            local_pairs.push((path.to_string(), path.to_string()));
        }
        local_pairs.push(("//:".to_string(), format!("{}:", own)));
        for child in runtime.read_dir(package_dir)? {
            if !runtime.is_dir(&child) {
                continue;
            }
            if let Some(name) = child.file_name() {
                let name = name.to_string_lossy();
                // A child reference ends the package path, so `//go` never matches `//golang`.
                for end in ["/", ":", "\"", "'"] {
                    local_pairs.push((
                        format!("//{}{}", name, end),
                        format!("{}/{}{}", own, name, end),
                    ));
                }
            }
        }
    }

    let mut replacements = Vec::new();
    for file in collect_build_files(runtime, package_dir)? {
        let content = runtime
            .read_to_string(&file)
            .with_context(|| format!("failed to read file {}", file.display()))?;

        let mut pairs: Vec<(String, String)> = find_labels(&content)
            .map(|label| {
                let to = match addressing.get(label.name) {
                    Some(path) => {
                        let sep = if label.suffix.is_empty() || label.suffix.starts_with(':') {
                            ""
                        } else {
                            "/"
                        };
                        format!("{}{}{}", path, sep, label.suffix)
                    }
                    None => label.span.to_string(),
                };
                (label.span.to_string(), to)
            })
            .collect();
        pairs.extend(
            local_pairs
                .iter()
                .filter(|(from, _)| content.contains(from.as_str()))
                .cloned(),
        );

        let candidate = FileReplacements { file, pairs };
        if candidate.apply(&content) != content {
            debug!("Labels to rewrite in {:?}", candidate.file);
            replacements.push(candidate);
        }
    }
    Ok(replacements)
}

/// Writes the rewritten content of every file.
pub fn apply_replacements(runtime: &dyn Runtime, replacements: &[FileReplacements]) -> Result<()> {
    for replacement in replacements {
        let content = runtime
            .read_to_string(&replacement.file)
            .with_context(|| format!("failed to read file {}", replacement.file.display()))?;
        runtime.write(&replacement.file, replacement.apply(&content).as_bytes())?;
    }
    Ok(())
}
