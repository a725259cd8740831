//! Integration tests for the panichd binary.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn panichd() -> Command {
    let mut cmd = cargo_bin_cmd!("panichd");
    for key in [
        "PANICHD_DB_PATH",
        "PANICHD_PORT",
        "PANICHD_LOG",
        "PANICHD_ATTACHMENTS_PATH",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        panichd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("init"))
            .stdout(predicate::str::contains("config"));
    }

    #[test]
    fn test_version() {
        panichd().arg("--version").assert().success();
    }

    #[test]
    fn test_unknown_command_fails() {
        panichd().arg("frobnicate").assert().failure();
    }
}

// =============================================================================
// Config Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_shows_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        panichd()
            .current_dir(dir.path())
            .arg("config")
            .assert()
            .success()
            .stdout(predicate::str::contains("showing defaults"))
            .stdout(predicate::str::contains("port = 8080"))
            .stdout(predicate::str::contains("paginate_items = 10"));
    }

    #[test]
    fn test_config_reads_file_and_env() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("panichd.toml"), "[server]\nport = 9000\n").unwrap();
        panichd()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 9000"));

        panichd()
            .current_dir(dir.path())
            .env("PANICHD_PORT", "9100")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 9100"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("panichd.toml"),
            "[settings]\npaginate_items = 0\n",
        )
        .unwrap();
        panichd()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("paginate_items must be greater than 0"));
    }

    #[test]
    fn test_config_validate_clean() {
        let dir = TempDir::new().unwrap();
        panichd()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));
    }

    #[test]
    fn test_config_init_writes_file_once() {
        let dir = TempDir::new().unwrap();
        panichd()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created"));
        let written = fs::read_to_string(dir.path().join("panichd.toml")).unwrap();
        assert!(written.contains("[settings]"));

        panichd()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_invalid_toml_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("panichd.toml"), "[server\nport = ").unwrap();
        panichd()
            .current_dir(dir.path())
            .arg("config")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse panichd.toml"));
    }
}

// =============================================================================
// Init Tests
// =============================================================================

mod init {
    use super::*;

    #[test]
    fn test_init_creates_database() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("data/helpdesk.db");
        panichd()
            .current_dir(dir.path())
            .args(["init", "--db-path"])
            .arg(&db)
            .assert()
            .success()
            .stdout(predicate::str::contains("Helpdesk database initialized"));
        assert!(db.exists());
    }

    #[test]
    fn test_init_seed_is_idempotent() {
        let dir = TempDir::new().unwrap();
        panichd()
            .current_dir(dir.path())
            .args(["init", "--seed", "--admin-email", "root@example.com"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Seeded default lookups and admin user root@example.com",
            ));
        assert!(dir.path().join("panichd.db").exists());

        panichd()
            .current_dir(dir.path())
            .args(["init", "--seed"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already seeded"));
    }

    #[test]
    fn test_init_uses_configured_db_path() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("panichd.toml"),
            "[server]\ndb_path = \"store/desk.db\"\n",
        )
        .unwrap();
        panichd()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success();
        assert!(dir.path().join("store/desk.db").exists());
    }
}
