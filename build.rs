// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

const VERSION_OVERRIDE: &str = "CAPTURE_EXPORT_VERSION";

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed={}", VERSION_OVERRIDE);

    let version = std::env::var(VERSION_OVERRIDE).unwrap_or_else(|_| describe_checkout());
    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// Version string printed by `capture-export -V`
///
/// Release builds print `<tag>+<commit>`, builds past the last release tag
/// print `<tag>.post<N>+<commit>`. Outside a checkout the package version is
/// used.
fn describe_checkout() -> String {
    let package = env!("CARGO_PKG_VERSION");
    let Some(commit) = git(&["rev-parse", "--short", "HEAD"]) else {
        return package.to_string();
    };

    let described = git(&["describe", "--tags", "--long", "--match", "v*"]);
    // --long always yields <tag>-<commits>-g<hash>
    let release = described.as_deref().and_then(|d| {
        let mut parts = d.rsplitn(3, '-');
        let _hash = parts.next()?;
        let commits: u32 = parts.next()?.parse().ok()?;
        let tag = parts.next()?.trim_start_matches('v');
        Some((tag.to_string(), commits))
    });

    match release {
        Some((tag, 0)) => format!("{}+{}", tag, commit),
        Some((tag, commits)) => format!("{}.post{}+{}", tag, commits, commit),
        None => format!("{}+{}", package, commit),
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}
