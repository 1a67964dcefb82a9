use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn workspace_path(rel: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join(rel)
}

/// `netdeploy` against the bundled inventory and templates.
fn netdeploy() -> Command {
    netdeploy_with(&workspace_path("inventory/devices.yaml"))
}

fn netdeploy_with(inventory: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("netdeploy"));
    cmd.arg("--inventory")
        .arg(inventory)
        .arg("--templates")
        .arg(workspace_path("templates"))
        .env_remove("NETDEPLOY_INVENTORY")
        .env_remove("NETDEPLOY_TEMPLATES")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

/// Three management switches; the second lacks `management_ip`.
fn broken_inventory(dir: &TempDir) -> PathBuf {
    broken_inventory_with(dir, "")
}

/// [`broken_inventory`] with `settings` prepended to the document.
fn broken_inventory_with(dir: &TempDir, settings: &str) -> PathBuf {
    let path = dir.path().join("devices.yaml");
    let devices = "\
defaults:
  variables: { mgmt_vlan: 10, prefix_len: 24, gateway: 192.168.10.1 }
devices:
  - name: mgmt-sw-01
    address: 192.168.10.10
    role: management
    priority: 1
    variables: { hostname: MGMT-SW-01, management_ip: 192.168.10.10 }
  - name: mgmt-sw-02
    address: 192.168.10.20
    role: management
    priority: 2
    variables: { hostname: MGMT-SW-02 }
  - name: mgmt-sw-03
    address: 192.168.10.30
    role: management
    priority: 3
    variables: { hostname: MGMT-SW-03, management_ip: 192.168.10.30 }
";
    fs::write(&path, format!("{settings}{devices}")).expect("write inventory");
    path
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().expect("run netdeploy");
    String::from_utf8(output.stdout).expect("stdout utf8")
}

// ---------------------------------------------------------------------------
// validate / info
// ---------------------------------------------------------------------------

#[test]
fn validate_passes_on_bundled_inventory() {
    netdeploy()
        .arg("validate")
        .assert()
        .success()
        .stdout(contains("core_switch"))
        .stdout(contains("edge_router"))
        .stdout(contains("all templates and devices are valid"));
}

#[test]
fn validate_names_missing_variables_and_fails() {
    let dir = TempDir::new().unwrap();
    netdeploy_with(&broken_inventory(&dir))
        .arg("validate")
        .assert()
        .failure()
        .stdout(contains("mgmt-sw-02"))
        .stdout(contains("management_ip"))
        .stderr(contains("validation failed"));
}

#[test]
fn validate_json_is_parseable() {
    let stdout = stdout_of(netdeploy().args(["validate", "--json"]));
    let report: serde_json::Value = serde_json::from_str(&stdout).expect("json");
    assert_eq!(report["templates"]["core_switch"]["valid"], true);
    assert!(report["missing_variables"].as_object().unwrap().is_empty());
}

#[test]
fn info_lists_devices_in_deployment_order() {
    let stdout = stdout_of(netdeploy().args(["info", "--json"]));
    let info: serde_json::Value = serde_json::from_str(&stdout).expect("json");
    let order: Vec<&str> = info["devices"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        order,
        ["mgmt-sw-01", "core-sw-01", "core-sw-02", "access-sw-01", "access-sw-02", "edge-router-01"]
    );
    assert_eq!(info["templates"].as_array().unwrap().len(), 4);
}

#[test]
fn missing_inventory_is_reported() {
    netdeploy_with(Path::new("/nonexistent/devices.yaml"))
        .arg("info")
        .assert()
        .failure()
        .stderr(contains("failed to load inventory"));
}

// ---------------------------------------------------------------------------
// generate / diff
// ---------------------------------------------------------------------------

#[test]
fn generate_writes_one_file_per_device_and_is_idempotent() {
    let out = TempDir::new().unwrap();

    netdeploy()
        .args(["generate", "--output"])
        .arg(out.path())
        .assert()
        .success()
        .stdout(contains("6 written, 0 unchanged"));

    let core = fs::read_to_string(out.path().join("core-sw-01.cfg")).unwrap();
    assert!(core.contains("sysname CORE-SW-01"));
    assert!(!core.contains("{{"));
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 6);

    netdeploy()
        .args(["generate", "--output"])
        .arg(out.path())
        .assert()
        .success()
        .stdout(contains("0 written, 6 unchanged"));
}

#[test]
fn generate_show_prints_without_writing() {
    let cwd = TempDir::new().unwrap();
    netdeploy()
        .current_dir(cwd.path())
        .args(["generate", "--device", "core-sw-01", "--show"])
        .assert()
        .success()
        .stdout(contains("sysname CORE-SW-01"))
        .stdout(contains("mgmt-sw-01").not());
    assert!(!cwd.path().join("generated").exists());
}

#[test]
fn generate_unknown_device_fails() {
    netdeploy()
        .args(["generate", "--show", "--device", "ghost"])
        .assert()
        .failure()
        .stderr(contains("ghost"));
}

#[test]
fn diff_is_clean_after_generate_and_shows_local_edits() {
    let out = TempDir::new().unwrap();
    netdeploy()
        .args(["generate", "--output"])
        .arg(out.path())
        .assert()
        .success();

    netdeploy()
        .args(["diff", "--device", "core-sw-01", "--output"])
        .arg(out.path())
        .assert()
        .success()
        .stdout(contains("No differences for 'core-sw-01'."));

    let target = out.path().join("core-sw-01.cfg");
    let edited = fs::read_to_string(&target)
        .unwrap()
        .replace("sysname CORE-SW-01", "sysname HAND-EDITED");
    fs::write(&target, edited).unwrap();

    let stdout = stdout_of(
        netdeploy()
            .args(["diff", "--device", "core-sw-01", "--output"])
            .arg(out.path()),
    );
    assert!(stdout.contains("--- a/core-sw-01.cfg"));
    assert!(stdout.lines().any(|l| l == "-sysname HAND-EDITED"));
    assert!(stdout.lines().any(|l| l == "+sysname CORE-SW-01"));
}

// ---------------------------------------------------------------------------
// deploy (dry run only; no network in tests)
// ---------------------------------------------------------------------------

#[test]
fn dry_run_deploy_reports_every_device() {
    netdeploy()
        .args(["deploy", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("[dry-run]"))
        .stdout(contains("6/6 devices deployed successfully (100.0%)"));
}

#[test]
fn inventory_default_makes_deploy_a_dry_run() {
    // The bundled inventory sets `dry_run_default: true`.
    netdeploy()
        .arg("deploy")
        .assert()
        .success()
        .stdout(contains("[dry-run]"));
}

#[test]
fn deploy_halts_at_first_failure() {
    let dir = TempDir::new().unwrap();
    let stdout = stdout_of(netdeploy_with(&broken_inventory(&dir)).args(["deploy", "--dry-run", "--json"]));
    let run: serde_json::Value = serde_json::from_str(&stdout).expect("json");
    assert_eq!(run["success"], false);
    assert_eq!(run["successful"], serde_json::json!(["mgmt-sw-01"]));
    assert_eq!(run["failed"], serde_json::json!(["mgmt-sw-02"]));
    assert_eq!(run["skipped"], serde_json::json!(["mgmt-sw-03"]));
    assert_eq!(run["results"]["mgmt-sw-02"]["stage"], "render");

    netdeploy_with(&broken_inventory(&dir))
        .args(["deploy", "--dry-run"])
        .assert()
        .failure()
        .stderr(contains("deployment stopped"));
}

#[test]
fn continue_on_error_attempts_every_device() {
    let dir = TempDir::new().unwrap();
    netdeploy_with(&broken_inventory(&dir))
        .args(["deploy", "--dry-run", "--continue-on-error"])
        .assert()
        .success()
        .stdout(contains("2/3 devices deployed successfully (66.7%)"))
        .stdout(contains("management_ip"));
}

#[test]
fn inventory_can_disable_halting() {
    let dir = TempDir::new().unwrap();
    let inventory = broken_inventory_with(&dir, "global_settings:\n  halt_on_failure: false\n");
    let stdout = stdout_of(netdeploy_with(&inventory).args(["deploy", "--dry-run", "--json"]));
    let run: serde_json::Value = serde_json::from_str(&stdout).expect("json");
    assert_eq!(run["successful"], serde_json::json!(["mgmt-sw-01", "mgmt-sw-03"]));
    assert_eq!(run["failed"], serde_json::json!(["mgmt-sw-02"]));
    assert_eq!(run["skipped"], serde_json::json!([]));

    netdeploy_with(&inventory)
        .args(["deploy", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("2/3 devices deployed successfully (66.7%)"));
}

#[test]
fn halt_flag_overrides_inventory() {
    let dir = TempDir::new().unwrap();
    let inventory = broken_inventory_with(&dir, "global_settings:\n  halt_on_failure: false\n");
    netdeploy_with(&inventory)
        .args(["deploy", "--dry-run", "--halt-on-failure"])
        .assert()
        .failure()
        .stderr(contains("deployment stopped"));
}

#[test]
fn deploy_unknown_device_fails() {
    netdeploy()
        .args(["deploy", "--dry-run", "--device", "ghost"])
        .assert()
        .failure()
        .stderr(contains("device 'ghost' is not in the inventory"));
}
