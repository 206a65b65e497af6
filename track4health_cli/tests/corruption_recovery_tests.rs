//! Corruption recovery tests for the t4h binary.
//!
//! These tests verify the system can handle:
//! - Corrupted snapshot files
//! - Corrupted login state
//! - Missing files
//! - Leftover temp files from interrupted writes

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const USER: &str = r#"{"id": "7", "username": "sana", "name": "Sana Bibi", "role": "fmt"}"#;

const DRAFT: &str = r#"{
    "date": "2024-06-10",
    "villageName": "Model Town",
    "ucName": "UC-1",
    "conductedBy": "Sana",
    "attendees": [{"name": "Amna", "fatherHusbandName": "Bilal", "age": 25}]
}"#;

fn setup_test_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    fs::write(dir.path().join("config.toml"), "[api]\noffline = true\n")
        .expect("Failed to write config");
    fs::create_dir_all(dir.path().join("data")).unwrap();
    dir
}

fn data_dir(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("data")
}

fn sign_in(temp_dir: &TempDir) {
    fs::write(data_dir(temp_dir).join("track4health_user.json"), USER).unwrap();
}

fn cli(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("t4h"));
    cmd.arg("--config")
        .arg(temp_dir.path().join("config.toml"))
        .arg("--data-dir")
        .arg(data_dir(temp_dir))
        .arg("--offline");
    cmd
}

fn submit(temp_dir: &TempDir) {
    let draft = temp_dir.path().join("draft.json");
    fs::write(&draft, DRAFT).unwrap();
    cli(temp_dir)
        .arg("awareness")
        .arg("submit")
        .arg(&draft)
        .assert()
        .success();
}

#[test]
fn test_corrupted_snapshot_treated_as_empty() {
    let temp_dir = setup_test_dir();
    sign_in(&temp_dir);

    let snapshot = data_dir(&temp_dir).join("awarenessSessions.json");
    fs::write(&snapshot, "{ invalid json }}}}").expect("Failed to write corrupted snapshot");

    cli(&temp_dir)
        .args(["awareness", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No awareness sessions"));

    // The next save replaces the corrupt file with a valid one
    submit(&temp_dir);
    let contents = fs::read_to_string(&snapshot).unwrap();
    let sessions: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(sessions.as_array().unwrap().len(), 1);
}

#[test]
fn test_wrong_shape_snapshot_treated_as_empty() {
    let temp_dir = setup_test_dir();
    sign_in(&temp_dir);

    // Valid JSON, but not a list of sessions
    fs::write(
        data_dir(&temp_dir).join("childScreenings.json"),
        r#"{"unexpected": true}"#,
    )
    .unwrap();

    cli(&temp_dir)
        .args(["screening", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No child screenings"));
}

#[test]
fn test_corrupted_login_state() {
    let temp_dir = setup_test_dir();
    fs::write(data_dir(&temp_dir).join("track4health_user.json"), "not json").unwrap();

    cli(&temp_dir)
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not logged in"));
}

#[test]
fn test_corrupted_user_cache_blocks_only_offline_login() {
    let temp_dir = setup_test_dir();
    fs::write(data_dir(&temp_dir).join("cached_users.json"), "[{ truncated").unwrap();

    cli(&temp_dir)
        .args(["login", "sana", "--password", "pw"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No network connectivity"));

    cli(&temp_dir)
        .args(["classify", "--muac", "11.5"])
        .assert()
        .success()
        .stdout("MAM\n");
}

#[test]
fn test_missing_data_dir_is_created_on_first_write() {
    let temp_dir = setup_test_dir();
    fs::remove_dir_all(data_dir(&temp_dir)).unwrap();

    cli(&temp_dir)
        .args(["login", "sana", "--password", "pw"])
        .assert()
        .failure();
    assert!(!data_dir(&temp_dir).exists());

    fs::create_dir_all(data_dir(&temp_dir)).unwrap();
    sign_in(&temp_dir);
    submit(&temp_dir);
    assert!(data_dir(&temp_dir).join("awarenessSessions.json").exists());
}

#[test]
fn test_stray_temp_files_ignored() {
    let temp_dir = setup_test_dir();
    sign_in(&temp_dir);

    // Leftover from a write interrupted before rename
    fs::write(data_dir(&temp_dir).join(".tmpAbC123"), "[{\"partial\"").unwrap();

    submit(&temp_dir);
    cli(&temp_dir)
        .args(["awareness", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Model Town"));
}

#[test]
fn test_records_survive_across_processes() {
    let temp_dir = setup_test_dir();
    sign_in(&temp_dir);

    for day in 10..13 {
        let draft = temp_dir.path().join(format!("draft-{}.json", day));
        fs::write(&draft, DRAFT.replace("2024-06-10", &format!("2024-06-{}", day))).unwrap();
        cli(&temp_dir)
            .arg("awareness")
            .arg("submit")
            .arg(&draft)
            .assert()
            .success();
    }

    let output = cli(&temp_dir)
        .args(["awareness", "list", "--json"])
        .output()
        .unwrap();
    let sessions: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let dates: Vec<&str> = sessions
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["date"].as_str().unwrap())
        .collect();
    assert_eq!(dates, vec!["2024-06-12", "2024-06-11", "2024-06-10"]);
}
