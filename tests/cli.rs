//! End-to-end tests for the gearguard binary.
//!
//! These exercise the CLI surface only; the HTTP behavior is covered
//! by the router tests inside the crate.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper to create a gearguard Command
fn gearguard() -> Command {
    cargo_bin_cmd!("gearguard")
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        gearguard()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("init-db"));
    }

    #[test]
    fn test_version() {
        gearguard().arg("--version").assert().success();
    }

    #[test]
    fn test_unknown_command_fails() {
        gearguard().arg("frobnicate").assert().failure();
    }
}

// =============================================================================
// Database Initialization Tests
// =============================================================================

mod init_db {
    use super::*;

    #[test]
    fn test_init_db_creates_database_file() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("data/gearguard.db");

        gearguard()
            .current_dir(dir.path())
            .arg("init-db")
            .arg("--db")
            .arg(&db_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("Database initialized"));

        assert!(db_path.exists());
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("gearguard.db");

        for _ in 0..2 {
            gearguard()
                .arg("init-db")
                .arg("--db")
                .arg(&db_path)
                .assert()
                .success();
        }
    }

    #[test]
    fn test_init_db_uses_default_path() {
        let dir = TempDir::new().unwrap();

        gearguard()
            .current_dir(dir.path())
            .arg("init-db")
            .assert()
            .success();

        assert!(dir.path().join(".gearguard/gearguard.db").exists());
    }
}

// =============================================================================
// Serve Tests
// =============================================================================

mod serve {
    use super::*;

    #[test]
    fn test_serve_refuses_to_start_without_secret() {
        let dir = TempDir::new().unwrap();

        gearguard()
            .current_dir(dir.path())
            .env_remove("JWT_SECRET")
            .arg("serve")
            .arg("--db")
            .arg("gearguard.db")
            .assert()
            .failure()
            .stderr(predicate::str::contains("JWT_SECRET"));
    }

    #[test]
    fn test_serve_rejects_missing_config_file() {
        let dir = TempDir::new().unwrap();

        gearguard()
            .current_dir(dir.path())
            .env("JWT_SECRET", "test-secret")
            .arg("--config")
            .arg("missing.toml")
            .arg("serve")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to read config file"));
    }
}
