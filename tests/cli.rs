use assert_cmd::prelude::*;
use std::process::Command;

fn bin() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("kube-rollout"))
}

#[test]
fn help_lists_follow_flags() {
    let assert = bin().env("RUST_LOG", "off").arg("--help").assert().success();

    let out = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    for flag in [
        "--namespace",
        "--timeout",
        "--json",
        "--stop-on-ready",
        "--stop-on-delete",
        "--logs-since-now",
    ] {
        assert!(out.contains(flag), "missing flag {flag} in help output");
    }
}

#[test]
fn rejects_unsupported_kind_before_touching_the_cluster() {
    bin().env("RUST_LOG", "off").arg("job/x").assert().failure();
}

#[test]
fn rejects_target_without_kind() {
    bin().env("RUST_LOG", "off").arg("web").assert().failure();
}
