//! Integration tests for the claimboard CLI.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a claimboard Command with no environment overrides
fn claimboard() -> Command {
    let mut cmd = cargo_bin_cmd!("claimboard");
    cmd.env_remove("CLAIMBOARD_PORT")
        .env_remove("CLAIMBOARD_DB")
        .env_remove("CLAIMBOARD_LOG")
        .env_remove("RUST_LOG");
    cmd
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        claimboard()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("lane"));
    }

    #[test]
    fn test_version() {
        claimboard().arg("--version").assert().success();
    }

    #[test]
    fn test_unknown_command_fails() {
        claimboard().arg("frobnicate").assert().failure();
    }
}

// =============================================================================
// Lane Table Tests
// =============================================================================

mod lane {
    use super::*;

    fn lane_of(status: &str, assigned: &str) -> String {
        let output = claimboard()
            .args(["lane", status, assigned])
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    #[test]
    fn test_lane_table() {
        assert_eq!(lane_of("fnol", "0"), "unassigned");
        assert_eq!(lane_of("fnol", "2"), "unassigned");
        assert_eq!(lane_of("mitigation", "0"), "unassigned");
        assert_eq!(lane_of("mitigation", "1"), "in_progress");
        assert_eq!(lane_of("reconstruction", "3"), "in_progress");
        assert_eq!(lane_of("review", "0"), "review");
        assert_eq!(lane_of("closeout", "1"), "done");
    }

    #[test]
    fn test_lane_assigned_defaults_to_zero() {
        claimboard()
            .args(["lane", "reconstruction"])
            .assert()
            .success()
            .stdout(predicate::str::diff("unassigned\n"));
    }

    #[test]
    fn test_lane_status_is_case_insensitive() {
        claimboard()
            .args(["lane", "REVIEW", "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("review"));
    }

    #[test]
    fn test_lane_rejects_unknown_status() {
        claimboard()
            .args(["lane", "archived", "0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("archived"));
    }

    #[test]
    fn test_lane_rejects_negative_count() {
        claimboard().args(["lane", "fnol", "-1"]).assert().failure();
    }
}

// =============================================================================
// Config Command Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_show_without_file_uses_defaults() {
        let dir = create_temp_project();

        claimboard()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No claimboard.toml found"))
            .stdout(predicate::str::contains("port = 3142"))
            .stdout(predicate::str::contains("built-in"));
    }

    #[test]
    fn test_config_init_then_validate() {
        let dir = create_temp_project();

        claimboard()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created claimboard.toml"));

        let content = fs::read_to_string(dir.path().join("claimboard.toml")).unwrap();
        assert!(content.contains("[server]"));
        assert!(content.contains("[[navigation]]"));

        claimboard()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));
    }

    #[test]
    fn test_config_init_does_not_overwrite() {
        let dir = create_temp_project();
        let path = dir.path().join("claimboard.toml");
        fs::write(&path, "[server]\nport = 9999\n").unwrap();

        claimboard()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));

        assert_eq!(fs::read_to_string(&path).unwrap(), "[server]\nport = 9999\n");
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = create_temp_project();
        fs::write(
            dir.path().join("claimboard.toml"),
            r#"
[logging]
format = "xml"

[[navigation]]
id = "jobs"
label = "Job"
path = "/jobs/:jobId"
roles = []
contexts = ["global"]
"#,
        )
        .unwrap();

        claimboard()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration warnings:"))
            .stdout(predicate::str::contains("xml"))
            .stdout(predicate::str::contains(":jobId"))
            .stdout(predicate::str::contains("no roles"));
    }

    #[test]
    fn test_config_explicit_path() {
        let dir = create_temp_project();
        let path = dir.path().join("conf").join("board.toml");

        claimboard()
            .args(["--config", path.to_str().unwrap(), "config", "init"])
            .assert()
            .success();
        assert!(path.exists());

        claimboard()
            .args(["--config", path.to_str().unwrap(), "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Config file:"));
    }

    #[test]
    fn test_config_show_env_override() {
        let dir = create_temp_project();

        claimboard()
            .current_dir(dir.path())
            .env("CLAIMBOARD_PORT", "4555")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Effective values"))
            .stdout(predicate::str::contains("port = 4555"));
    }

    #[test]
    fn test_malformed_config_fails() {
        let dir = create_temp_project();
        fs::write(dir.path().join("claimboard.toml"), "[server\nport = ").unwrap();

        claimboard()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse claimboard.toml"));
    }
}

// =============================================================================
// Init Command Tests
// =============================================================================

mod init {
    use super::*;

    #[test]
    fn test_init_creates_database() {
        let dir = create_temp_project();

        claimboard()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Board database initialized"));

        assert!(dir.path().join(".claimboard/claimboard.db").exists());
    }

    #[test]
    fn test_init_custom_db_path_and_owner() {
        let dir = create_temp_project();
        let db = dir.path().join("data").join("board.db");

        claimboard()
            .args(["init", "--db-path", db.to_str().unwrap()])
            .args(["--org", "acme", "--owner", "alice"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Owner 'alice' bootstrapped"));
        assert!(db.exists());

        // Re-running with the same owner is idempotent
        claimboard()
            .args(["init", "--db-path", db.to_str().unwrap()])
            .args(["--org", "acme", "--owner", "alice"])
            .assert()
            .success();

        // The same user id cannot be claimed by another organization
        claimboard()
            .args(["init", "--db-path", db.to_str().unwrap()])
            .args(["--org", "globex", "--owner", "alice"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_init_owner_requires_org() {
        let dir = create_temp_project();

        claimboard()
            .current_dir(dir.path())
            .args(["init", "--owner", "alice"])
            .assert()
            .failure();
    }

    #[test]
    fn test_init_honors_db_env_override() {
        let dir = create_temp_project();
        let db = dir.path().join("env.db");

        claimboard()
            .current_dir(dir.path())
            .env("CLAIMBOARD_DB", db.to_str().unwrap())
            .arg("init")
            .assert()
            .success();
        assert!(db.exists());
    }
}
