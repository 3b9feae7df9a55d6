//! Heuristic check of whether vendored build files come from gazelle.

use anyhow::{Context, Result};
use regex::Regex;
use std::fmt::Write;
use std::path::Path;
use std::sync::LazyLock;

use crate::runtime::{Runtime, list_files};

static GO_LIBRARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^go_library\(").expect("go_library regex is valid"));
static TARGET_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name = "([^"]+)""#).expect("target name regex is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageAnalysis {
    pub name: String,
    /// Whether any build file declares a `go_library`.
    pub is_go: bool,
    /// `<file>: contains <target>` for targets gazelle would not have named.
    pub problems: Vec<String>,
}

impl PackageAnalysis {
    pub fn is_gazelle_generated(&self) -> bool {
        self.is_go && self.problems.is_empty()
    }
}

fn is_gazelle_target(target: &str, dir_name: &str) -> bool {
    matches!(
        target,
        "go_default_library" | "go_default_test" | "go_tool_library" | "all_files"
    ) || target == dir_name
        || target.strip_prefix(dir_name) == Some("_lib")
        || target.strip_prefix(dir_name) == Some("_test")
        || target.ends_with("_proto")
}

/// Scans the `BUILD*` files under `dir`.
pub fn analyse_package(runtime: &dyn Runtime, name: &str, dir: &Path) -> Result<PackageAnalysis> {
    let mut is_go = false;
    let mut problems = Vec::new();

    for file in list_files(runtime, dir)? {
        let is_build = file
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("BUILD"));
        if !is_build {
            continue;
        }
        let content = runtime
            .read_to_string(&file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        is_go = is_go || content.lines().any(|line| GO_LIBRARY_RE.is_match(line));

        let dir_name = file
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let display = file.to_string_lossy().replace('\\', "/");
        for caps in TARGET_NAME_RE.captures_iter(&content) {
            let target = &caps[1];
            if !is_gazelle_target(target, &dir_name) {
                problems.push(format!("{}: contains {}", display, target));
            }
        }
    }

    Ok(PackageAnalysis {
        name: name.to_string(),
        is_go,
        problems: if is_go { problems } else { Vec::new() },
    })
}

/// Groups results under "Gazelle generated", "Not generated by Gazelle" and
/// (unless `omit_non_go`) "Non-Go repos". Empty groups are left out.
pub fn render_analysis(results: &[PackageAnalysis], verbose: bool, omit_non_go: bool) -> String {
    let mut out = String::new();
    let mut section = |header: &str, filter: &dyn Fn(&PackageAnalysis) -> bool| {
        let mut selected: Vec<&PackageAnalysis> = results.iter().filter(|r| filter(r)).collect();
        if selected.is_empty() {
            return;
        }
        selected.sort_by(|a, b| a.name.cmp(&b.name));
        let _ = writeln!(out, "{}", header);
        for result in selected {
            let _ = writeln!(out, "  {}", result.name);
            if verbose && result.is_go && !result.is_gazelle_generated() {
                let _ = writeln!(out, "    Non-Gazelle generated targets:");
                for problem in &result.problems {
                    let _ = writeln!(out, "    {}", problem);
                }
            }
        }
    };

    section("Gazelle generated", &|r| r.is_gazelle_generated());
    section("Not generated by Gazelle", &|r| r.is_go && !r.is_gazelle_generated());
    if !omit_non_go {
        section("Non-Go repos", &|r| !r.is_go);
    }
    out
}
