//! Repository declarations for packages kept as local repositories.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

pub const WORKSPACE_FILE: &str = "WORKSPACE";
pub const LOCAL_REPOSITORIES_FILE: &str = "local_repositories.bzl";

/// Picks the file a `local_repository` declaration for `name` goes into.
///
/// The root `WORKSPACE` is used unless a `local_repositories.bzl` sits next to
/// the package directory. Either file already mentioning `"<name>"` is an
/// error.
pub fn repo_decl_file(
    runtime: &dyn Runtime,
    root: &Path,
    package_dir: &Path,
    name: &str,
) -> Result<PathBuf> {
    let quoted = format!("\"{}\"", name);

    let workspace = root.join(WORKSPACE_FILE);
    let content = runtime.read_to_string(&workspace).with_context(|| {
        format!(
            "could not read repository declaration file {}",
            workspace.display()
        )
    })?;
    if content.contains(&quoted) {
        bail!(
            "workspace already contains a repo having the same name: {}",
            name
        );
    }

    let Some(parent) = package_dir.parent() else {
        return Ok(workspace);
    };
    let local = parent.join(LOCAL_REPOSITORIES_FILE);
    if !runtime.is_file(&local) {
        return Ok(workspace);
    }
    let content = runtime.read_to_string(&local).with_context(|| {
        format!(
            "could not read repository declaration file {}",
            local.display()
        )
    })?;
    if content.contains(&quoted) {
        bail!(
            "local repository file already contains a repo having the same name: {}",
            name
        );
    }
    Ok(local)
}

/// Text appended to `decl_file` to declare the repository.
pub fn render_repo_decl(
    decl_file: &Path,
    repo_path: &str,
    name: &str,
    import_path: Option<&str>,
) -> String {
    let is_workspace = decl_file
        .file_name()
        .is_some_and(|file| file == WORKSPACE_FILE);
    let decl = if is_workspace {
        format!(
            "\nlocal_repository(\n    name = \"{}\",\n    path = \"{}\",\n)\n",
            name, repo_path
        )
    } else {
        format!(
            "\n    native.local_repository(\n        name = \"{}\",\n        path = \"{}\",\n    )\n",
            name, repo_path
        )
    };
    match import_path {
        Some(import_path) => format!(
            "\n# gazelle:repository go_repository name={} importpath={}{}",
            name, import_path, decl
        ),
        None => decl,
    }
}

/// Path of `package_dir` relative to `root`, with `/` separators.
pub fn relative_repo_path(root: &Path, package_dir: &Path) -> Result<String> {
    let relative = pathdiff::diff_paths(package_dir, root).with_context(|| {
        format!(
            "failed to resolve the relative path from {} to {}",
            root.display(),
            package_dir.display()
        )
    })?;
    Ok(relative.to_string_lossy().replace('\\', "/"))
}

/// Creates an empty `WORKSPACE` marker in `dir` unless one exists.
/// Returns whether the file was created.
pub fn ensure_workspace_file(runtime: &dyn Runtime, dir: &Path) -> Result<bool> {
    let path = dir.join(WORKSPACE_FILE);
    if runtime.exists(&path) {
        return Ok(false);
    }
    runtime.write(&path, b"")?;
    Ok(true)
}
