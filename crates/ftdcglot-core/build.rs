//! Stamps the crate with the git revision and target triple it was built for.
//! Release tarballs carry no `.git`, so packagers pass `FTDCGLOT_GIT_SHA`.

use std::env;
use std::process::Command;

const SHA_OVERRIDE: &str = "FTDCGLOT_GIT_SHA";

fn git_sha() -> Option<String> {
    let out = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let sha = String::from_utf8(out.stdout).ok()?;
    let sha = sha.trim();
    (!sha.is_empty()).then(|| sha.to_string())
}

fn main() {
    let sha = env::var(SHA_OVERRIDE)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(git_sha)
        .unwrap_or_else(|| "unknown".into());
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".into());

    println!("cargo:rustc-env=GIT_SHA={sha}");
    println!("cargo:rustc-env=FTDCGLOT_BUILD_TARGET={target}");
    println!("cargo:rerun-if-env-changed={SHA_OVERRIDE}");
    println!("cargo:rerun-if-changed=../../.git/HEAD");
}
