//! Integration tests for the t4h binary.
//!
//! Every test runs offline against a temporary data directory:
//! - Login from the cached user list
//! - Submitting, listing and deleting sessions
//! - Duplicate and validation rejections
//! - Role checks

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FMT_USER: &str = r#"{"id": "7", "username": "sana", "name": "Sana Bibi", "role": "fmt"}"#;
const MASTER_USER: &str = r#"{"id": 1, "username": "admin", "name": "Admin", "role": "master"}"#;
const SM_USER: &str =
    r#"{"id": "9", "username": "bilal", "name": "Bilal Khan", "role": "socialMobilizer"}"#;

/// A temporary data directory plus an offline config file
struct TestEnv {
    dir: TempDir,
}

impl TestEnv {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::write(
            dir.path().join("config.toml"),
            "[api]\nbase_url = \"http://127.0.0.1:9\"\noffline = true\n",
        )
        .expect("Failed to write config");
        Self { dir }
    }

    fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    /// Sign `user_json` in by writing the persisted login state directly
    fn signed_in(self, user_json: &str) -> Self {
        self.switch_user(user_json);
        self
    }

    fn switch_user(&self, user_json: &str) {
        fs::create_dir_all(self.data_dir()).unwrap();
        fs::write(self.data_dir().join("track4health_user.json"), user_json).unwrap();
        fs::write(
            self.data_dir().join("cached_users.json"),
            format!("[{}]", user_json),
        )
        .unwrap();
    }

    fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("t4h"));
        cmd.arg("--config")
            .arg(self.dir.path().join("config.toml"))
            .arg("--data-dir")
            .arg(self.data_dir())
            .arg("--offline");
        cmd
    }

    fn awareness_ids(&self) -> Vec<String> {
        let output = self
            .cmd()
            .args(["awareness", "list", "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let sessions: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        sessions
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_str().unwrap().to_string())
            .collect()
    }
}

fn awareness_draft(attendees: &str) -> String {
    format!(
        r#"{{
            "date": "2024-06-10",
            "villageName": "model   town",
            "ucName": "UC-1",
            "conductedBy": "sana bibi",
            "designation": "FMT",
            "attendees": [{}]
        }}"#,
        attendees
    )
}

const AMNA: &str = r#"{"name": "amna", "fatherHusbandName": "bilal", "age": 25, "gender": "female", "childrenUnderFive": 2}"#;
const AMNA_AGAIN: &str = r#"{"name": "AMNA ", "fatherHusbandName": "Bilal", "age": 30, "gender": "female"}"#;

fn submit_awareness(env: &TestEnv, draft: &Path) -> assert_cmd::assert::Assert {
    env.cmd()
        .arg("awareness")
        .arg("submit")
        .arg(draft)
        .assert()
}

#[test]
fn test_cli_help() {
    Command::new(assert_cmd::cargo::cargo_bin!("t4h"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Track4Health field data for community health workers",
        ));
}

#[test]
fn test_classify_muac() {
    let env = TestEnv::new();
    env.cmd()
        .args(["classify", "--muac", "10.9"])
        .assert()
        .success()
        .stdout("SAM\n");
    env.cmd()
        .args(["classify", "--muac", "12.5"])
        .assert()
        .success()
        .stdout("MAM\n");
    env.cmd()
        .args(["classify", "--muac", "12.6"])
        .assert()
        .success()
        .stdout("Normal\n");
}

#[test]
fn test_classify_uses_configured_thresholds() {
    let env = TestEnv::new();
    fs::write(
        env.dir.path().join("config.toml"),
        "[api]\noffline = true\n\n[classification]\nsam_max_cm = 11.5\nmam_max_cm = 13.0\n",
    )
    .unwrap();

    env.cmd()
        .args(["classify", "--muac", "11.2"])
        .assert()
        .success()
        .stdout("SAM\n");
}

#[test]
fn test_invalid_config_rejected() {
    let env = TestEnv::new();
    fs::write(
        env.dir.path().join("config.toml"),
        "[classification]\nsam_max_cm = 13.0\nmam_max_cm = 12.0\n",
    )
    .unwrap();

    env.cmd()
        .args(["classify", "--muac", "11.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_age_conversions() {
    let env = TestEnv::new();
    env.cmd()
        .args(["age", "--dob", "10/01/2020"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("YYYY-MM-DD"));

    env.cmd()
        .args(["age", "--age", "2", "--unit", "years"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^\d{4}-\d{2}-\d{2}\n$").unwrap());
}

#[test]
fn test_offline_login_from_cache() {
    let env = TestEnv::new().signed_in(FMT_USER);
    env.cmd().arg("logout").assert().success();
    env.cmd()
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not logged in"));

    env.cmd()
        .args(["login", "sana", "--password", "anything"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged in as Sana Bibi"));

    env.cmd()
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("sana (fmt)"));
}

#[test]
fn test_offline_login_unknown_user_fails() {
    let env = TestEnv::new();
    env.cmd()
        .args(["login", "stranger", "--password", "pw"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No network connectivity"));
}

#[test]
fn test_records_require_login() {
    let env = TestEnv::new();
    env.cmd()
        .args(["awareness", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not logged in"));
}

#[test]
fn test_submit_requires_an_attendee() {
    let env = TestEnv::new().signed_in(FMT_USER);
    let empty = env.write_file("empty.json", &awareness_draft(""));

    submit_awareness(&env, &empty)
        .failure()
        .stderr(predicate::str::contains("at least one attendee"));
    assert!(!env.data_dir().join("awarenessSessions.json").exists());

    let draft = env.write_file("draft.json", &awareness_draft(AMNA));
    submit_awareness(&env, &draft)
        .success()
        .stdout(predicate::str::contains("1 attendees"));

    env.cmd()
        .args(["awareness", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Model Town"))
        .stdout(predicate::str::contains("1 attendees"));
}

#[test]
fn test_duplicate_attendees_rejected() {
    let env = TestEnv::new().signed_in(FMT_USER);

    // Same person twice in one draft
    let doubled = env.write_file(
        "doubled.json",
        &awareness_draft(&format!("{}, {}", AMNA, AMNA_AGAIN)),
    );
    submit_awareness(&env, &doubled)
        .failure()
        .stderr(predicate::str::contains("Duplicate entry"));
    assert!(env.awareness_ids().is_empty());

    // Same person already recorded for the village and date
    let draft = env.write_file("draft.json", &awareness_draft(AMNA));
    submit_awareness(&env, &draft).success();
    let again = env.write_file("again.json", &awareness_draft(AMNA_AGAIN));
    submit_awareness(&env, &again)
        .failure()
        .stderr(predicate::str::contains("Duplicate entry"));
    assert_eq!(env.awareness_ids().len(), 1);
}

#[test]
fn test_attendee_added_to_existing_session() {
    let env = TestEnv::new().signed_in(FMT_USER);
    let draft = env.write_file("draft.json", &awareness_draft(AMNA));
    submit_awareness(&env, &draft).success();
    let id = env.awareness_ids().remove(0);

    let zainab = env.write_file(
        "zainab.json",
        r#"{"name": "zainab", "fatherHusbandName": "raza", "dateOfBirth": "1990-01-01", "gender": "female"}"#,
    );
    env.cmd()
        .args(["awareness", "add-attendee", id.as_str()])
        .arg(&zainab)
        .assert()
        .success()
        .stdout(predicate::str::contains("Added attendee Zainab"));

    env.cmd()
        .args(["awareness", "show", id.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Amna / Bilal"))
        .stdout(predicate::str::contains("Zainab / Raza"));
}

#[test]
fn test_field_role_cannot_delete() {
    let env = TestEnv::new().signed_in(FMT_USER);
    let draft = env.write_file("draft.json", &awareness_draft(AMNA));
    submit_awareness(&env, &draft).success();
    let id = env.awareness_ids().remove(0);

    env.cmd()
        .args(["awareness", "delete", id.as_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Permission denied"));
    assert_eq!(env.awareness_ids().len(), 1);
}

#[test]
fn test_delete_is_idempotent() {
    let env = TestEnv::new().signed_in(MASTER_USER);
    let draft = env.write_file("draft.json", &awareness_draft(AMNA));
    submit_awareness(&env, &draft).success();
    let id = env.awareness_ids().remove(0);

    env.cmd()
        .args(["awareness", "delete", id.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted awareness session"));
    env.cmd()
        .args(["awareness", "delete", id.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to do"));
    assert!(env.awareness_ids().is_empty());
}

#[test]
fn test_screening_classifies_children() {
    let env = TestEnv::new().signed_in(FMT_USER);
    let draft = env.write_file(
        "screening.json",
        r#"{
            "date": "2024-06-12",
            "villageName": "Gulshan",
            "ucName": "UC-2",
            "conductedBy": "Sana",
            "children": [
                {"name": "ali", "fatherName": "raza", "ageMonths": 24, "muacCm": 10.9},
                {"name": "sara", "fatherName": "raza", "ageMonths": 36, "muacCm": 13.2, "gender": "female"}
            ]
        }"#,
    );
    env.cmd()
        .arg("screening")
        .arg("submit")
        .arg(&draft)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 children"));

    env.cmd()
        .args(["stats", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"children_screened\": 2"))
        .stdout(predicate::str::contains("\"sam\": 1"))
        .stdout(predicate::str::contains("\"normal\": 1"));
}

#[test]
fn test_screening_rejects_out_of_range_age() {
    let env = TestEnv::new().signed_in(FMT_USER);
    let draft = env.write_file(
        "screening.json",
        r#"{
            "date": "2024-06-12",
            "villageName": "Gulshan",
            "ucName": "UC-2",
            "conductedBy": "Sana",
            "children": [{"name": "ali", "fatherName": "raza", "ageMonths": 3, "muacCm": 12.0}]
        }"#,
    );
    env.cmd()
        .arg("screening")
        .arg("submit")
        .arg(&draft)
        .assert()
        .failure()
        .stderr(predicate::str::contains("between 6 and 59 months"));
}

#[test]
fn test_network_commands_offline() {
    let env = TestEnv::new().signed_in(MASTER_USER);
    env.cmd()
        .arg("probe")
        .assert()
        .success()
        .stdout("offline\n");
    env.cmd()
        .args(["users", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No network connectivity"));
    env.cmd()
        .args(["sync", "push"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No network connectivity"));
}

#[test]
fn test_location_kept_locally_when_offline() {
    let env = TestEnv::new().signed_in(FMT_USER);
    env.cmd()
        .args(["location", "set", "--lat", "24.86", "--lon", "67.01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("saved locally"));

    env.cmd()
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("24.86000, 67.01000"));
}

#[test]
fn test_location_track_reports_last_fix() {
    let env = TestEnv::new().signed_in(FMT_USER);
    env.cmd()
        .args(["location", "track"])
        .write_stdin("31.5,74.3\n\n24.86 67.01\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("saved locally"));

    env.cmd()
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("24.86000, 67.01000"));

    env.cmd()
        .args(["location", "track"])
        .write_stdin("north,east\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not a coordinate"));
}

#[test]
fn test_photo_lifecycle() {
    let env = TestEnv::new().signed_in(FMT_USER);
    env.cmd()
        .args(["photo", "add", "--image", "/tmp/site.jpg", "--lat", "31.5", "--lon", "74.3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved photo"));

    let output = env.cmd().args(["photo", "list", "--json"]).output().unwrap();
    let photos: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let id = photos[0]["id"].as_str().unwrap().to_string();
    assert_eq!(photos[0]["createdBy"], "sana");

    env.cmd()
        .args(["photo", "delete", id.as_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Permission denied"));

    env.switch_user(MASTER_USER);
    env.cmd()
        .args(["photo", "delete", id.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted photo"));
}

#[test]
fn test_photos_scoped_to_creator() {
    let env = TestEnv::new().signed_in(FMT_USER);
    env.cmd()
        .args(["photo", "add", "--image", "/tmp/site.jpg", "--lat", "31.5", "--lon", "74.3"])
        .assert()
        .success();

    env.switch_user(SM_USER);
    env.cmd()
        .args(["photo", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No photos"));

    env.switch_user(MASTER_USER);
    env.cmd()
        .args(["photo", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("31.50000, 74.30000"));

    env.cmd().arg("logout").assert().success();
    env.cmd()
        .args(["photo", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not logged in"));
}

#[test]
fn test_update_session_details() {
    let env = TestEnv::new().signed_in(FMT_USER);
    let draft = env.write_file("draft.json", &awareness_draft(AMNA));
    submit_awareness(&env, &draft).success();
    let id = env.awareness_ids().remove(0);

    let blank = env.write_file(
        "blank.json",
        r#"{"date": "2024-06-10", "villageName": " ", "ucName": "UC-1", "conductedBy": "Sana"}"#,
    );
    env.cmd()
        .args(["awareness", "update", id.as_str()])
        .arg(&blank)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Village name is required"));

    let changed = env.write_file(
        "changed.json",
        r#"{"date": "2024-06-10", "villageName": "garden town", "ucName": "UC-4", "conductedBy": "Sana", "sessionNumber": 2}"#,
    );
    env.cmd()
        .args(["awareness", "update", id.as_str()])
        .arg(&changed)
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated awareness session"));

    env.cmd()
        .args(["awareness", "show", id.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Garden Town / UC-4"))
        .stdout(predicate::str::contains("Created by:   sana"))
        .stdout(predicate::str::contains("Amna / Bilal"));
}

#[test]
fn test_field_role_cannot_edit_others_sessions() {
    let env = TestEnv::new().signed_in(MASTER_USER);
    let draft = env.write_file("draft.json", &awareness_draft(AMNA));
    submit_awareness(&env, &draft).success();
    let id = env.awareness_ids().remove(0);
    let attendee_id = {
        let output = env
            .cmd()
            .args(["awareness", "show", id.as_str(), "--json"])
            .output()
            .unwrap();
        let session: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        session["attendees"][0]["id"].as_str().unwrap().to_string()
    };

    env.switch_user(FMT_USER);
    let details = env.write_file(
        "details.json",
        r#"{"date": "2024-06-10", "villageName": "Elsewhere", "ucName": "UC-1", "conductedBy": "Sana"}"#,
    );
    let person = env.write_file(
        "person.json",
        r#"{"name": "zara", "fatherHusbandName": "umar", "age": 22, "gender": "female"}"#,
    );

    env.cmd()
        .args(["awareness", "update", id.as_str()])
        .arg(&details)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
    env.cmd()
        .args(["awareness", "add-attendee", id.as_str()])
        .arg(&person)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));
    env.cmd()
        .args(["awareness", "update-attendee", id.as_str(), attendee_id.as_str()])
        .arg(&person)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not found"));

    env.switch_user(MASTER_USER);
    env.cmd()
        .args(["awareness", "show", id.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Model Town"))
        .stdout(predicate::str::contains("Amna / Bilal"))
        .stdout(predicate::str::contains("Zara").not());
}

#[test]
fn test_update_child_rederives_status() {
    let env = TestEnv::new().signed_in(FMT_USER);
    let draft = env.write_file(
        "screening.json",
        r#"{
            "date": "2024-06-12",
            "villageName": "Gulshan",
            "ucName": "UC-2",
            "conductedBy": "Sana",
            "children": [{"name": "ali", "fatherName": "raza", "ageMonths": 24, "muacCm": 13.0}]
        }"#,
    );
    env.cmd()
        .arg("screening")
        .arg("submit")
        .arg(&draft)
        .assert()
        .success();

    let output = env
        .cmd()
        .args(["screening", "list", "--json"])
        .output()
        .unwrap();
    let screenings: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let id = screenings[0]["id"].as_str().unwrap().to_string();
    let child_id = screenings[0]["children"][0]["id"].as_str().unwrap().to_string();
    assert_eq!(screenings[0]["children"][0]["nutritionStatus"], "Normal");

    let remeasured = env.write_file(
        "child.json",
        r#"{"name": "ali", "fatherName": "raza", "ageMonths": 25, "muacCm": 10.0, "nutritionStatus": "Normal"}"#,
    );
    env.cmd()
        .args(["screening", "update-child", id.as_str(), child_id.as_str()])
        .arg(&remeasured)
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated child Ali (SAM)"));

    env.cmd()
        .args(["screening", "show", id.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("MUAC 10.0 cm: SAM"))
        .stdout(predicate::str::contains(child_id.as_str()));
}

#[test]
fn test_location_track_keeps_watch_fix_after_poll() {
    let env = TestEnv::new().signed_in(
        r#"{"id": "7", "username": "sana", "name": "Sana Bibi", "role": "fmt", "location": {"latitude": 10.0, "longitude": 10.0}}"#,
    );
    fs::write(
        env.dir.path().join("config.toml"),
        "[api]\nbase_url = \"http://127.0.0.1:9\"\noffline = true\n\n[location]\npoll_interval_secs = 1\n",
    )
    .unwrap();

    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin!("t4h"))
        .arg("--config")
        .arg(env.dir.path().join("config.toml"))
        .arg("--data-dir")
        .arg(env.data_dir())
        .arg("--offline")
        .args(["location", "track"])
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .spawn()
        .unwrap();
    {
        let mut stdin = child.stdin.take().unwrap();
        stdin.write_all(b"24.86,67.01\n").unwrap();
        stdin.flush().unwrap();
        // Let at least one poll fire after the fix
        std::thread::sleep(std::time::Duration::from_millis(1600));
    }
    assert!(child.wait_with_output().unwrap().status.success());

    env.cmd()
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("24.86000, 67.01000"));
}
