use anyhow::{Result, bail};
use log::{debug, warn};

use super::{Action, Plan};
use crate::actions::detect_divergences;
use crate::index::{Index, PackageRecord};
use crate::labels::{WORKSPACE_FILE, collect_replacements, repo_decl_file};
use crate::model::{EntrySource, ManifestEntry, PackageMetadata, PackageSource};
use crate::runtime::Runtime;

/// Whether the vendored copy described by `metadata` no longer matches
/// `entry`.
///
/// Raw entries never need one: nothing could fetch them.
pub fn needs_update(metadata: &PackageMetadata, entry: &ManifestEntry) -> bool {
    if matches!(entry.source, EntrySource::Raw) {
        return false;
    }
    let Some(source) = &metadata.source else {
        return true;
    };
    if entry.set_as_local_repository && !metadata.is_local_repository {
        return true;
    }
    match (source, &entry.source) {
        (PackageSource::Git { sha, .. }, EntrySource::Git(git)) => *sha != git.commit,
        (
            PackageSource::Go {
                import_path,
                version,
            },
            EntrySource::Go(go),
        ) => *version != go.version || *import_path != go.import_path,
        (PackageSource::Archive { version, .. }, EntrySource::Archive(archive)) => {
            *version != archive.version
        }
        _ => true,
    }
}

/// Computes the vendoring actions for every package of the index.
///
/// With `update_labels`, packages that are otherwise up to date get their
/// references rewritten when any build file would change.
#[tracing::instrument(skip(runtime, index))]
pub fn build_vendor_plan(runtime: &dyn Runtime, index: &Index, update_labels: bool) -> Result<Plan> {
    let addressing = index.addressing_map();
    let mut actions = Vec::new();

    for record in index.records() {
        match (&record.package, &record.entry) {
            (None, None) => bail!(
                "internal error, either the package or the entry of {} must exist",
                record.name
            ),
            (None, Some(entry)) => {
                let dest = entry_dir(index, record)?;
                if matches!(entry.source, EntrySource::Raw) {
                    bail!(
                        "raw package {} has no METADATA in {}; raw packages are maintained by hand",
                        entry.name,
                        dest.display()
                    );
                }
                if runtime.exists(&dest) {
                    bail!("package directory {} already exists", dest.display());
                }
                let repo_decl = if entry.set_as_local_repository {
                    Some(repo_decl_file(runtime, index.root(), &dest, &entry.name)?)
                } else {
                    None
                };
                actions.push(Action::Add {
                    entry: entry.clone(),
                    dest,
                    repo_decl,
                });
            }
            (Some(package), None) => actions.push(Action::Delete {
                name: record.name.clone(),
                path: package.path.clone(),
            }),
            (Some(package), Some(entry)) => {
                if package.metadata.source.is_none()
                    && !matches!(entry.source, EntrySource::Raw)
                {
                    warn!("METADATA of {} records no source, fetching it again", entry.name);
                }
                let moved = record.package_scope != record.entry_scope;
                if moved && matches!(entry.source, EntrySource::Raw) {
                    bail!(
                        "raw package {} at {} must be moved to {} by hand",
                        entry.name,
                        package.path.display(),
                        entry_dir(index, record)?.display()
                    );
                }
                if moved || needs_update(&package.metadata, entry) {
                    for file in detect_divergences(runtime, &package.path)? {
                        warn!("Divergence detected in file: {}", file.display());
                    }
                    let dest = entry_dir(index, record)?;
                    let repo_decl =
                        if entry.set_as_local_repository && !package.metadata.is_local_repository {
                            Some(repo_decl_file(runtime, index.root(), &dest, &entry.name)?)
                        } else {
                            None
                        };
                    actions.push(Action::Update {
                        entry: entry.clone(),
                        dest,
                        old_path: package.path.clone(),
                        repo_decl,
                    });
                    continue;
                }

                let relabel = !entry.set_as_local_repository
                    && (update_labels || package.metadata.is_local_repository);
                if !relabel {
                    continue;
                }
                let replacements = collect_replacements(
                    runtime,
                    &addressing,
                    &package.path,
                    addressing.get(&entry.name).map(String::as_str),
                )?;
                if replacements.is_empty() {
                    debug!("Labels of {} are up to date", entry.name);
                    continue;
                }
                let workspace_file = package.path.join(WORKSPACE_FILE);
                actions.push(Action::LabelUpdate {
                    name: entry.name.clone(),
                    replacements,
                    workspace_file: runtime.is_file(&workspace_file).then_some(workspace_file),
                    metadata_path: package
                        .metadata
                        .is_local_repository
                        .then(|| package.metadata_path.clone()),
                });
            }
        }
    }

    Ok(Plan {
        actions,
        addressing,
    })
}

fn entry_dir(index: &Index, record: &PackageRecord) -> Result<std::path::PathBuf> {
    match index.entry_dir(record) {
        Some(dir) => Ok(dir),
        None => bail!("{} has no manifest entry", record.name),
    }
}

/// One Regenerate action per package that is both declared and vendored,
/// optionally restricted to `package`.
pub fn build_regen_plan(index: &Index, package: Option<&str>, clean: bool) -> Result<Plan> {
    let actions: Vec<Action> = index
        .records()
        .filter(|record| package.is_none_or(|name| name == record.name))
        .filter_map(|record| {
            Some(Action::Regenerate {
                entry: record.entry.clone()?,
                path: record.package.as_ref()?.path.clone(),
                clean,
            })
        })
        .collect();

    if let Some(name) = package
        && actions.is_empty()
    {
        bail!("no vendored package named {}", name);
    }
    Ok(Plan {
        actions,
        addressing: index.addressing_map(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use crate::test_utils::{git_entry, git_metadata, local_git_entry, write_file};
    use std::collections::BTreeSet;
    use std::path::Path;

    fn git_manifest_entry(commit: &str, local: bool) -> ManifestEntry {
        ManifestEntry {
            name: "foo".into(),
            source: EntrySource::Git(crate::model::GitSource {
                url: "https://example.com/foo.git".into(),
                commit: commit.into(),
                git_ref: None,
            }),
            foreign_files: BTreeSet::new(),
            set_as_local_repository: local,
        }
    }

    fn git_package(sha: &str) -> PackageMetadata {
        PackageMetadata::new(
            "foo",
            Some(PackageSource::Git {
                url: "https://example.com/foo.git".into(),
                sha: sha.into(),
            }),
        )
    }

    #[test]
    fn test_needs_update_compares_pins() {
        assert!(!needs_update(&git_package("abc123"), &git_manifest_entry("abc123", false)));
        assert!(needs_update(&git_package("abc123"), &git_manifest_entry("def456", false)));
    }

    #[test]
    fn test_needs_update_addressing_and_kinds() {
        // vendored -> local forces a re-fetch
        assert!(needs_update(&git_package("abc123"), &git_manifest_entry("abc123", true)));

        let mut local = git_package("abc123");
        local.is_local_repository = true;
        assert!(!needs_update(&local, &git_manifest_entry("abc123", false)));

        let go = PackageMetadata::new(
            "foo",
            Some(PackageSource::Go {
                import_path: "example.com/foo".into(),
                version: "v1.0.0".into(),
            }),
        );
        assert!(needs_update(&go, &git_manifest_entry("abc123", false)));

        let no_source = PackageMetadata::new("foo", None);
        assert!(needs_update(&no_source, &git_manifest_entry("abc123", false)));
        let raw = ManifestEntry {
            source: EntrySource::Raw,
            ..git_manifest_entry("", false)
        };
        assert!(!needs_update(&no_source, &raw));
        // A package switched to raw keeps its last fetched copy.
        assert!(!needs_update(&git_package("abc123"), &raw));
    }

    const RAW_FOO: &str = "[[entry]]\nname = \"foo\"\nraw = true\n";

    #[test]
    fn test_vendor_plan_rejects_raw_entry_without_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let tp = dir.path().join("third_party");
        write_file(&tp, "MANIFEST", RAW_FOO);

        let index = Index::build(&RealRuntime, dir.path()).unwrap();
        let err = build_vendor_plan(&RealRuntime, &index, false).unwrap_err();
        assert!(err.to_string().contains("raw package foo has no METADATA"));

        // Hand-written files without METADATA are not mistaken for a stale copy.
        write_file(&tp, "foo/foo.c", "");
        let index = Index::build(&RealRuntime, dir.path()).unwrap();
        let err = build_vendor_plan(&RealRuntime, &index, false).unwrap_err();
        assert!(err.to_string().contains("raw package foo has no METADATA"));
    }

    #[test]
    fn test_vendor_plan_leaves_raw_packages_alone() {
        let dir = tempfile::tempdir().unwrap();
        let tp = dir.path().join("third_party");
        write_file(&tp, "MANIFEST", RAW_FOO);
        // Previously fetched from git, now maintained by hand.
        write_file(&tp, "foo/METADATA", &git_metadata("foo", "1111"));

        let index = Index::build(&RealRuntime, dir.path()).unwrap();
        let plan = build_vendor_plan(&RealRuntime, &index, false).unwrap();
        assert!(plan.is_empty(), "unexpected actions: {}", plan);
    }

    #[test]
    fn test_vendor_plan_rejects_moving_raw_package() {
        let dir = tempfile::tempdir().unwrap();
        let tp = dir.path().join("third_party");
        write_file(&tp, "MANIFEST", "");
        write_file(&tp, "go/MANIFEST", RAW_FOO);
        write_file(&tp, "foo/METADATA", "name = \"foo\"\nis_local_repository = false\n");

        let index = Index::build(&RealRuntime, dir.path()).unwrap();
        let err = build_vendor_plan(&RealRuntime, &index, false).unwrap_err();
        assert!(err.to_string().contains("must be moved to"));
    }

    #[test]
    fn test_vendor_plan_update_to_local_locates_declaration_file() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "WORKSPACE", "workspace(name = \"mono\")\n");
        let tp = dir.path().join("third_party");
        write_file(&tp, "MANIFEST", &local_git_entry("foo", "1111"));
        write_file(&tp, "foo/METADATA", &git_metadata("foo", "1111"));

        let index = Index::build(&RealRuntime, dir.path()).unwrap();
        let plan = build_vendor_plan(&RealRuntime, &index, false).unwrap();
        assert_eq!(
            plan.actions,
            vec![Action::Update {
                entry: index.record("foo").unwrap().entry.clone().unwrap(),
                dest: tp.join("foo"),
                old_path: tp.join("foo"),
                repo_decl: Some(dir.path().join("WORKSPACE")),
            }]
        );
    }

    #[test]
    fn test_vendor_plan_end_to_end() {
        // --- Setup ---
        let dir = tempfile::tempdir().unwrap();
        let tp = dir.path().join("third_party");
        write_file(
            &tp,
            "MANIFEST",
            &[
                git_entry("added", "1111"),
                git_entry("existing", "2222"),
                git_entry("updated", "4444"),
            ]
            .concat(),
        );
        write_file(&tp, "existing/METADATA", &git_metadata("existing", "2222"));
        write_file(&tp, "gone/METADATA", &git_metadata("gone", "3333"));
        write_file(&tp, "updated/METADATA", &git_metadata("updated", "3333"));

        // --- Execute ---
        let index = Index::build(&RealRuntime, dir.path()).unwrap();
        let plan = build_vendor_plan(&RealRuntime, &index, false).unwrap();

        // --- Verify ---
        let lines: Vec<String> = plan.actions.iter().map(|a| a.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                format!("- Adding package added in {}", tp.join("added").display()),
                format!("- Deleting package at \"{}\"", tp.join("gone").display()),
                format!("- Updating package at \"{}\"", tp.join("updated").display()),
            ]
        );
        assert_eq!(plan.addressing["existing"], "//third_party/existing");

        let again = build_vendor_plan(&RealRuntime, &index, false).unwrap();
        assert_eq!(plan, again);
    }

    #[test_log::test]
    fn test_vendor_plan_moved_package_is_updated() {
        let dir = tempfile::tempdir().unwrap();
        let tp = dir.path().join("third_party");
        write_file(&tp, "MANIFEST", "");
        write_file(&tp, "go/MANIFEST", &git_entry("foo", "1111"));
        write_file(&tp, "foo/METADATA", &git_metadata("foo", "1111"));

        let index = Index::build(&RealRuntime, dir.path()).unwrap();
        let plan = build_vendor_plan(&RealRuntime, &index, false).unwrap();
        assert_eq!(
            plan.actions,
            vec![Action::Update {
                entry: index.record("foo").unwrap().entry.clone().unwrap(),
                dest: tp.join("go/foo"),
                old_path: tp.join("foo"),
                repo_decl: None,
            }]
        );
    }

    #[test]
    fn test_vendor_plan_add_rejects_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tp = dir.path().join("third_party");
        write_file(&tp, "MANIFEST", &git_entry("foo", "1111"));
        write_file(&tp, "foo/README", "stale");

        let index = Index::build(&RealRuntime, dir.path()).unwrap();
        let err = build_vendor_plan(&RealRuntime, &index, false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_vendor_plan_local_add_locates_declaration_file() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "WORKSPACE", "");
        let tp = dir.path().join("third_party");
        write_file(&tp, "MANIFEST", &local_git_entry("foo", "1111"));

        let index = Index::build(&RealRuntime, dir.path()).unwrap();
        let plan = build_vendor_plan(&RealRuntime, &index, false).unwrap();
        match &plan.actions[..] {
            [Action::Add { repo_decl, .. }] => {
                assert_eq!(repo_decl.as_deref(), Some(dir.path().join("WORKSPACE").as_path()))
            }
            other => panic!("unexpected plan {:?}", other),
        }
        assert!(plan.addressing.is_empty());
    }

    #[test]
    fn test_vendor_plan_label_update_only_when_files_change() {
        // --- Setup ---
        let dir = tempfile::tempdir().unwrap();
        let tp = dir.path().join("third_party");
        write_file(
            &tp,
            "MANIFEST",
            &[git_entry("bar", "1111"), git_entry("foo", "2222")].concat(),
        );
        write_file(&tp, "bar/METADATA", &git_metadata("bar", "1111"));
        write_file(&tp, "bar/BUILD", "deps = [\"@foo//lib:x\", \"@unknown//y\"]\n");
        write_file(&tp, "foo/METADATA", &git_metadata("foo", "2222"));
        write_file(&tp, "foo/BUILD", "cc_library(name = \"x\")\n");

        // --- Execute ---
        let index = Index::build(&RealRuntime, dir.path()).unwrap();
        let without = build_vendor_plan(&RealRuntime, &index, false).unwrap();
        let with = build_vendor_plan(&RealRuntime, &index, true).unwrap();

        // --- Verify ---
        assert!(without.is_empty());
        match &with.actions[..] {
            [
                Action::LabelUpdate {
                    name,
                    replacements,
                    workspace_file,
                    metadata_path,
                },
            ] => {
                assert_eq!(name, "bar");
                assert_eq!(replacements.len(), 1);
                assert_eq!(replacements[0].file, tp.join("bar/BUILD"));
                assert_eq!(
                    replacements[0].apply("\"@foo//lib:x\", \"@unknown//y\""),
                    "\"//third_party/foo/lib:x\", \"@unknown//y\""
                );
                assert!(workspace_file.is_none());
                assert!(metadata_path.is_none());
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_vendor_plan_previously_local_package_is_relabelled() {
        let dir = tempfile::tempdir().unwrap();
        let tp = dir.path().join("third_party");
        write_file(&tp, "MANIFEST", &git_entry("foo", "1111"));
        write_file(
            &tp,
            "foo/METADATA",
            &git_metadata("foo", "1111").replace(
                "is_local_repository = false",
                "is_local_repository = true",
            ),
        );
        write_file(&tp, "foo/WORKSPACE", "");
        write_file(&tp, "foo/BUILD", "exports_files([\"//:a\"])\n");

        let index = Index::build(&RealRuntime, dir.path()).unwrap();
        let plan = build_vendor_plan(&RealRuntime, &index, false).unwrap();
        match &plan.actions[..] {
            [
                Action::LabelUpdate {
                    workspace_file,
                    metadata_path,
                    ..
                },
            ] => {
                assert_eq!(workspace_file.as_deref(), Some(tp.join("foo/WORKSPACE").as_path()));
                assert_eq!(metadata_path.as_deref(), Some(tp.join("foo/METADATA").as_path()));
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_regen_plan() {
        let dir = tempfile::tempdir().unwrap();
        let tp = dir.path().join("third_party");
        write_file(
            &tp,
            "MANIFEST",
            &[git_entry("a", "1"), git_entry("b", "2"), git_entry("new", "3")].concat(),
        );
        write_file(&tp, "a/METADATA", &git_metadata("a", "1"));
        write_file(&tp, "b/METADATA", &git_metadata("b", "2"));

        let index = Index::build(&RealRuntime, dir.path()).unwrap();
        let all = build_regen_plan(&index, None, false).unwrap();
        assert_eq!(all.actions.len(), 2);

        let one = build_regen_plan(&index, Some("b"), true).unwrap();
        match &one.actions[..] {
            [Action::Regenerate { entry, path, clean }] => {
                assert_eq!(entry.name, "b");
                assert_eq!(path, &tp.join("b"));
                assert!(*clean);
            }
            other => panic!("unexpected plan {:?}", other),
        }

        let err = build_regen_plan(&index, Some("new"), false).unwrap_err();
        assert!(err.to_string().contains("no vendored package named new"));
        assert!(!Path::new(&tp.join("new")).exists());
    }
}
