//! CLI integration tests for drydock.
//!
//! These tests run the binary against small database directories and check
//! both its output and what it leaves on disk.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

const DEPS_DB: &str = r#"{
    "ALARM": {
        "R3-7": {
            "source": {
                "path": "/srv/modules/alarm/R3-7"
            }
        },
        "R3-8": {
            "source": {
                "path": "/srv/modules/alarm/R3-8"
            },
            "weight": 1
        }
    },
    "MCAN": {
        "R2-6": {
            "source": {
                "path": "/srv/modules/mcan/R2-6"
            }
        }
    },
    "MYAPP": {
        "R1-0": {
            "dependencies": [
                "ALARM",
                "MCAN"
            ],
            "source": {
                "path": "/srv/modules/myapp/R1-0"
            }
        }
    }
}
"#;

const BUILDS_DB: &str = r#"{
    "MYAPP-001": {
        "modules": {
            "ALARM": "R3-7",
            "MCAN": "R2-6"
        },
        "state": "testing"
    }
}
"#;

/// Get the drydock binary command, isolated from the user's configuration
/// and caches.
fn drydock(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("drydock").unwrap();
    cmd.env("HOME", home)
        .env("XDG_CACHE_HOME", home.join("cache"))
        .env("DRYDOCK_CONFIG_PATH", home)
        .env_remove("DRYDOCK_DBDIR")
        .current_dir(home);
    cmd
}

/// A directory holding both sample databases.
fn sample_dbdir() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("DEPS.DB"), DEPS_DB).unwrap();
    fs::write(tmp.path().join("BUILDS.DB"), BUILDS_DB).unwrap();
    tmp
}

// ============================================================================
// drydock db
// ============================================================================

#[test]
fn test_db_show_round_trips() {
    let tmp = sample_dbdir();
    drydock(tmp.path())
        .args(["db", "show"])
        .assert()
        .success()
        .stdout(DEPS_DB);
}

#[test]
fn test_db_modules_and_versions() {
    let tmp = sample_dbdir();
    drydock(tmp.path())
        .args(["db", "modules"])
        .assert()
        .success()
        .stdout("ALARM\nMCAN\nMYAPP\n");

    drydock(tmp.path())
        .args(["db", "versions", "ALARM"])
        .assert()
        .success()
        .stdout("R3-8\nR3-7\n");
}

#[test]
fn test_db_sort_by_dependency() {
    let tmp = sample_dbdir();
    drydock(tmp.path())
        .args(["db", "sort", "MYAPP:R1-0", "ALARM:R3-7", "MCAN:R2-6"])
        .assert()
        .success()
        .stdout("ALARM:R3-7\nMCAN:R2-6\nMYAPP:R1-0\n");
}

#[test]
fn test_db_weight_edit_persists() {
    let tmp = sample_dbdir();
    drydock(tmp.path())
        .args(["db", "weight", "MCAN:R2-6", "3"])
        .assert()
        .success();

    drydock(tmp.path())
        .args(["db", "weight", "MCAN:R2-6"])
        .assert()
        .success()
        .stdout("3\n");

    assert!(tmp.path().join("DEPS.DB.bak").exists());
    assert!(fs::symlink_metadata(tmp.path().join("DEPS.DB.lock")).is_err());
}

#[test]
fn test_db_dry_run_does_not_write() {
    let tmp = sample_dbdir();
    drydock(tmp.path())
        .args(["--dry-run", "db", "add-dep", "ALARM:R3-7", "MCAN"])
        .assert()
        .success();

    let text = fs::read_to_string(tmp.path().join("DEPS.DB")).unwrap();
    assert_eq!(text, DEPS_DB);
}

#[test]
fn test_db_add_unknown_dependency_fails() {
    let tmp = sample_dbdir();
    drydock(tmp.path())
        .args(["db", "add-dep", "ALARM:R3-7", "NOPE"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("error: "))
        .stderr(predicate::str::contains("NOPE"));
}

#[test]
fn test_db_merge_conflict_leaves_db_unchanged() {
    let tmp = sample_dbdir();
    let other = tmp.path().join("OTHER.DB");
    fs::write(
        &other,
        r#"{"MYAPP": {"R1-0": {"dependencies": ["ALARM"], "source": {"path": "/srv/modules/myapp/R1-0"}}}}"#,
    )
    .unwrap();

    drydock(tmp.path())
        .args(["db", "merge"])
        .arg(&other)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: "));

    let text = fs::read_to_string(tmp.path().join("DEPS.DB")).unwrap();
    assert_eq!(text, DEPS_DB);
}

#[test]
fn test_db_locked_database() {
    let tmp = sample_dbdir();
    fs::write(tmp.path().join("DEPS.DB.lock"), "someone@elsewhere:1\n").unwrap();

    drydock(tmp.path())
        .args(["db", "weight", "MCAN:R2-6", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("locked"));
}

#[test]
fn test_db_check_reports_missing_dependency() {
    let tmp = sample_dbdir();
    let broken = DEPS_DB.replace("\"MCAN\"\n            ]", "\"MCAN\",\n                \"GONE\"\n            ]");
    fs::write(tmp.path().join("DEPS.DB"), broken).unwrap();

    drydock(tmp.path())
        .args(["db", "check"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("MYAPP:R1-0"))
        .stdout(predicate::str::contains("GONE"));
}

// ============================================================================
// drydock build
// ============================================================================

#[test]
fn test_build_find_reports_full_match() {
    let tmp = sample_dbdir();
    drydock(tmp.path())
        .args(["build", "find", "MCAN", "ALARM:R3-7"])
        .assert()
        .success()
        .stdout(predicate::str::contains("MYAPP-001 (testing)"))
        .stdout(predicate::str::contains("== ALARM:R3-7"))
        .stdout(predicate::str::contains("=~ MCAN:R2-6"));
}

#[test]
fn test_build_new_links_existing_modules() {
    let tmp = sample_dbdir();
    drydock(tmp.path())
        .args(["build", "new", "MYAPP", "MYAPP:R1-0", "ALARM:R3-7"])
        .assert()
        .success()
        .stdout("MYAPP-002\n");

    let text = fs::read_to_string(tmp.path().join("BUILDS.DB")).unwrap();
    assert!(text.contains("\"MYAPP-002\""));
    assert!(text.contains("\"linked\""));

    drydock(tmp.path())
        .args(["build", "linked", "MYAPP-002"])
        .assert()
        .success()
        .stdout("MYAPP-001\n");

    drydock(tmp.path())
        .args(["build", "sort"])
        .assert()
        .success()
        .stdout("MYAPP-001\nMYAPP-002\n");
}

#[test]
fn test_build_new_rejects_ambiguous_specs() {
    let tmp = sample_dbdir();
    drydock(tmp.path())
        .args(["build", "new", "MYAPP", "MYAPP:R1-0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ALARM (R3-7, R3-8)"));
}

#[test]
fn test_build_state_change() {
    let tmp = sample_dbdir();
    drydock(tmp.path())
        .args(["build", "state", "MYAPP-001", "stable"])
        .assert()
        .success();

    drydock(tmp.path())
        .args(["build", "state", "MYAPP-001"])
        .assert()
        .success()
        .stdout("stable\n");

    drydock(tmp.path())
        .args(["build", "state", "MYAPP-001", "broken"])
        .assert()
        .success();

    drydock(tmp.path())
        .args(["build", "state", "MYAPP-001", "bogus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("bogus"));
}

#[test]
fn test_overlay_builds_are_read_only() {
    let tmp = sample_dbdir();
    let overlay = tmp.path().join("SHARED.DB");
    fs::write(
        &overlay,
        r#"{"SHARED-001": {"modules": {"ALARM": "R3-8"}, "state": "stable"}}"#,
    )
    .unwrap();

    drydock(tmp.path())
        .arg("--overlay")
        .arg(&overlay)
        .args(["build", "list"])
        .assert()
        .success()
        .stdout("MYAPP-001\nSHARED-001\n");

    drydock(tmp.path())
        .arg("--overlay")
        .arg(&overlay)
        .args(["build", "delete", "SHARED-001"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SHARED-001"));
}

// ============================================================================
// drydock spec / config / completions
// ============================================================================

#[test]
fn test_spec_complete_adds_dependencies() {
    let tmp = sample_dbdir();
    drydock(tmp.path())
        .args(["spec", "complete", "MYAPP:R1-0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ALARM:R3-7,R3-8 (added)"))
        .stdout(predicate::str::contains("MCAN:R2-6 (added)"))
        .stdout(predicate::str::contains("MYAPP:R1-0\n"));
}

#[test]
fn test_config_file_supplies_module_specs() {
    let tmp = sample_dbdir();
    fs::write(
        tmp.path().join("drydock.config"),
        r#"{"module": ["ALARM:R3-7"], "lock-timeout": "2"}"#,
    )
    .unwrap();

    drydock(tmp.path())
        .args(["spec", "complete", "MCAN"])
        .assert()
        .success()
        .stdout("ALARM:R3-7\nMCAN:R2-6\n");

    drydock(tmp.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"lock-timeout\": \"2\""));
}

#[test]
fn test_config_rejects_unknown_keys() {
    let tmp = sample_dbdir();
    fs::write(tmp.path().join("drydock.config"), r#"{"colour": true}"#).unwrap();

    drydock(tmp.path())
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("colour"));
}

#[test]
fn test_completions_generate() {
    let tmp = TempDir::new().unwrap();
    drydock(tmp.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("drydock"));
}
