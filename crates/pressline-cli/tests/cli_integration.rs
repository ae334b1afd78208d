//! CLI subprocess integration tests.
//!
//! These invoke the `pressline` binary against a temporary store and
//! verify exit codes, stdout content, and JSON output stability. Only
//! store-backed commands run here; anything needing a container runtime
//! or database server is covered by the core tests against mocks.

use std::path::Path;
use std::process::Command;

fn pressline_bin(store: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pressline"));
    cmd.arg("--store").arg(store);
    // Point at a nonexistent config so defaults apply regardless of the host.
    cmd.arg("--config").arg(store.join("no-such-pressline.toml"));
    cmd
}

fn register_blog(store: &Path) {
    let output = pressline_bin(store)
        .args([
            "register",
            "blog-prod",
            "--domain",
            "blog.example.com",
            "--db-name",
            "blog_prod",
            "--password-ref",
            "/etc/pressline/blog.env#DB_PASSWORD",
            "--repo",
            "https://git.example.com/blog.git",
            "--file-root",
            "/var/www/blog",
        ])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "register failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn cli_version_exits_zero() {
    let store = tempfile::tempdir().unwrap();
    let output = pressline_bin(store.path()).arg("--version").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("pressline"), "version output: {stdout}");
}

#[test]
fn cli_help_lists_commands() {
    let store = tempfile::tempdir().unwrap();
    let output = pressline_bin(store.path()).arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in ["create", "sync", "promote", "delete", "snapshot", "restore"] {
        assert!(stdout.contains(cmd), "help must list '{cmd}': {stdout}");
    }
}

#[test]
fn list_empty_store() {
    let store = tempfile::tempdir().unwrap();
    let output = pressline_bin(store.path()).arg("list").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("no environments"));
}

#[test]
fn register_then_list_and_inspect() {
    let store = tempfile::tempdir().unwrap();
    register_blog(store.path());

    let output = pressline_bin(store.path())
        .args(["--json", "list"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let entries: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("list --json emits valid JSON");
    assert_eq!(entries[0]["env_id"], "blog-prod");
    assert_eq!(entries[0]["kind"], "production");

    let output = pressline_bin(store.path())
        .args(["inspect", "blog-prod"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("blog.example.com"));
    assert!(stdout.contains("wp_"));
}

#[test]
fn lock_then_unlock() {
    let store = tempfile::tempdir().unwrap();
    register_blog(store.path());

    let output = pressline_bin(store.path())
        .args(["lock", "blog-prod", "release freeze", "--hours", "8"])
        .output()
        .unwrap();
    assert!(output.status.success());

    // Same actor (config default) releases without --force.
    let output = pressline_bin(store.path())
        .args(["unlock", "blog-prod"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "unlock failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("unlocked"));
}

#[test]
fn delete_production_refused() {
    let store = tempfile::tempdir().unwrap();
    register_blog(store.path());

    let output = pressline_bin(store.path())
        .args(["delete", "blog-prod"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("refusing to delete"));

    // Still registered.
    let output = pressline_bin(store.path())
        .args(["inspect", "blog-prod"])
        .output()
        .unwrap();
    assert!(output.status.success());
}

#[test]
fn create_unknown_production_fails() {
    let store = tempfile::tempdir().unwrap();
    let output = pressline_bin(store.path())
        .args(["create", "ghost", "--kind", "staging"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}

#[test]
fn snapshot_list_empty() {
    let store = tempfile::tempdir().unwrap();
    let output = pressline_bin(store.path())
        .args(["snapshot", "list"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("no snapshots"));
}

#[test]
fn log_shows_register_activity() {
    let store = tempfile::tempdir().unwrap();
    register_blog(store.path());

    let output = pressline_bin(store.path())
        .args(["--json", "log", "blog-prod"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(records[0]["action"], "register");
}
