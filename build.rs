use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

/// Stamps the binary with `git describe`, appending a build time to dirty
/// trees so local builds never pose as a release.
fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let described = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().trim_start_matches('v').to_string())
        .filter(|s| !s.is_empty());

    let version = match described {
        Some(v) if v.ends_with("-dirty") => format!("{}-{}", v, build_time()),
        Some(v) => v,
        None => format!("0.0.0-unknown-{}", build_time()),
    };
    println!("cargo:rustc-env=VENDORSYNC_VERSION={}", version);
}

fn build_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
