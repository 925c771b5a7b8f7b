use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn eadi_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("eadi");
    path
}

fn finding_aid(eadid: &str, components: &[&str]) -> String {
    let cs: String = components
        .iter()
        .map(|t| format!("<c><did><unittitle>{}</unittitle></did></c>", t))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ead><eadheader><eadid>{}</eadid></eadheader>
<archdesc level="fonds"><did><unittitle>Fonds {}</unittitle></did>
<controlaccess><geogname>Nancy</geogname></controlaccess>
<dsc>{}</dsc></archdesc></ead>"#,
        eadid, eadid, cs
    )
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("FRAD054_IR_0001.xml"),
        finding_aid("FRAD054_IR_0001", &["Administration", "Comptes"]),
    )
    .unwrap();
    fs::write(
        files_dir.join("FRAD054_IR_0002.xml"),
        finding_aid("FRAD054_IR_0002", &["Cadastre"]),
    )
    .unwrap();
    fs::write(files_dir.join("FRAD054_IR_0003.xml"), "<ead><archdesc>").unwrap();
    fs::write(files_dir.join("README.txt"), "not a finding aid").unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/eadi.sqlite"

[import]
workers = 2
artifacts_dir = "{}/appfiles"

[services.FRAD054]
name = "AD 54"
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("eadi.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_eadi(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = eadi_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run eadi binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn files_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("files")
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_eadi(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_eadi(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_eadi(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_import_directory_reports_summary() {
    let (tmp, config_path) = setup_test_env();
    let files = files_dir(&config_path);

    run_eadi(&config_path, &["init"]);
    let (stdout, stderr, success) = run_eadi(
        &config_path,
        &["import", files.to_str().unwrap(), "--progress", "off"],
    );
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(
        stdout.contains("imported 2, skipped 0, failed 1"),
        "stdout={}",
        stdout
    );
    assert!(stdout.contains("FRAD054_IR_0003.xml"));
    assert!(tmp
        .path()
        .join("appfiles/ape-ead/FRAD054/ape-FRAD054_IR_0001.xml")
        .exists());
}

#[test]
fn test_second_import_skips_known_files() {
    let (_tmp, config_path) = setup_test_env();
    let file = files_dir(&config_path).join("FRAD054_IR_0001.xml");
    let file = file.to_str().unwrap();

    run_eadi(&config_path, &["import", file]);
    let (stdout, _, success) = run_eadi(&config_path, &["import", file]);
    assert!(success);
    assert!(stdout.contains("imported 0, skipped 1, failed 0"), "stdout={}", stdout);

    let (stdout, _, success) = run_eadi(&config_path, &["import", file, "--force-delete"]);
    assert!(success);
    assert!(stdout.contains("imported 1, skipped 0, failed 0"), "stdout={}", stdout);
}

#[test]
fn test_stats_and_get() {
    let (_tmp, config_path) = setup_test_env();
    let files = files_dir(&config_path);

    run_eadi(&config_path, &["import", files.to_str().unwrap()]);

    let (stdout, stderr, success) = run_eadi(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Finding aids:       2"), "stdout={}", stdout);
    assert!(stdout.contains("Components:         3"), "stdout={}", stdout);
    assert!(stdout.contains("FRAD054"));

    let stable_id = ead_import::ids::root_stable_id("FRAD054_IR_0001.xml");
    let (stdout, stderr, success) = run_eadi(&config_path, &["get", &stable_id]);
    assert!(success, "get failed: {}", stderr);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["kind"], "finding_aid");
    assert_eq!(json["title"], "Fonds FRAD054_IR_0001");
    assert_eq!(json["record"]["eadid"], "FRAD054_IR_0001");

    let (_, _, success) = run_eadi(&config_path, &["get", "deadbeef"]);
    assert!(!success);
}

#[test]
fn test_dry_run_writes_nothing() {
    let (_tmp, config_path) = setup_test_env();
    let files = files_dir(&config_path);

    run_eadi(&config_path, &["init"]);
    let (stdout, _, success) =
        run_eadi(&config_path, &["import", files.to_str().unwrap(), "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("(dry-run)"));
    assert!(stdout.contains("imported 2"));

    let (stdout, _, _) = run_eadi(&config_path, &["stats"]);
    assert!(stdout.contains("Finding aids:       0"), "stdout={}", stdout);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, _, success) = run_eadi(&tmp.path().join("nope.toml"), &["stats"]);
    assert!(!success);
}
