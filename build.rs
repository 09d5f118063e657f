//! Build script to capture the git commit for `--version`.

use std::process::Command;

fn git(args: &[&str]) -> Option<Vec<u8>> {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| o.stdout)
}

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");

    let hash = git(&["rev-parse", "--short=7", "HEAD"])
        .and_then(|out| String::from_utf8(out).ok())
        .map_or_else(|| "unknown".to_string(), |s| s.trim().to_string());

    let dirty = git(&["status", "--porcelain"]).is_some_and(|out| !out.is_empty());
    let label = if dirty { format!("{hash}*") } else { hash.clone() };

    println!("cargo:rustc-env=BUILD_HASH={hash}");
    println!("cargo:rustc-env=BUILD_LABEL={label}");
}
