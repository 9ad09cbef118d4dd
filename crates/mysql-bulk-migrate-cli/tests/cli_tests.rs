//! CLI integration tests for mysql-bulk-migrate.
//!
//! These tests verify command-line argument parsing, help output,
//! the init command, dry runs and exit codes. Runs that need `mysqldump`
//! or `mysql` use shell-script stand-ins configured through YAML.

use assert_cmd::Command;
use mysql_bulk_migrate::write_workbook;
use predicates::prelude::*;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

/// Get a command for the mysql-bulk-migrate binary.
fn cmd() -> Command {
    Command::cargo_bin("mysql-bulk-migrate").unwrap()
}

/// Command running inside `dir`, so default relative paths land there.
fn cmd_in(dir: &TempDir) -> Command {
    let mut command = cmd();
    command.current_dir(dir.path()).env_remove("MYSQL_ADMIN_PASSWORD");
    command
}

fn write_credentials(dir: &TempDir, rows: &[[&str; 4]]) {
    write_workbook(&dir.path().join("database_credentials.xlsx"), rows).unwrap();
}

fn list_dir(path: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(path)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[cfg(unix)]
fn write_script(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
fn write_config(dir: &TempDir, mysqldump: &Path, mysql: &Path) {
    let yaml = format!(
        "tools:\n  mysqldump: {}\n  mysql: {}\ntimeouts:\n  dump_secs: 10\n  restore_secs: 10\n",
        mysqldump.display(),
        mysql.display()
    );
    std::fs::write(dir.path().join("config.yaml"), yaml).unwrap();
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn test_export_subcommand_help() {
    cmd()
        .args(["export", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--timeout"));
}

#[test]
fn test_import_subcommand_help() {
    cmd()
        .args(["import", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--admin-host"))
        .stdout(predicate::str::contains("--admin-user"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mysql-bulk-migrate"));
}

#[test]
fn test_log_flags_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"))
        .stdout(predicate::str::contains("[default: text]"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

// =============================================================================
// Exit Code Tests - Config Errors (Exit Code 1)
// =============================================================================

#[test]
fn test_missing_credentials_exits_with_code_1() {
    let dir = TempDir::new().unwrap();
    cmd_in(&dir)
        .arg("export")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Credentials file not found"));
}

#[test]
fn test_missing_config_exits_with_code_7() {
    // Missing file is an IO error (code 7), not config error (code 1)
    let dir = TempDir::new().unwrap();
    cmd_in(&dir)
        .args(["--config", "nonexistent_config_file.yaml", "export"])
        .assert()
        .code(7);
}

#[test]
fn test_invalid_yaml_exits_with_code_1() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "export"])
        .assert()
        .code(1);
}

#[test]
fn test_zero_timeout_exits_with_code_1() {
    let dir = TempDir::new().unwrap();
    write_credentials(&dir, &[["shop", "shop_user", "pw", ""]]);

    cmd_in(&dir)
        .args(["export", "--timeout", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("dump_secs"));
}

#[test]
fn test_import_without_backup_dir_exits_with_code_1() {
    let dir = TempDir::new().unwrap();
    write_credentials(&dir, &[["shop", "shop_user", "pw", ""]]);

    cmd_in(&dir)
        .arg("import")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Backup directory not found"));
}

#[test]
fn test_import_without_admin_password_exits_with_code_1() {
    let dir = TempDir::new().unwrap();
    write_credentials(&dir, &[["shop", "shop_user", "pw", ""]]);
    std::fs::create_dir(dir.path().join("backups")).unwrap();

    cmd_in(&dir)
        .arg("import")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("MYSQL_ADMIN_PASSWORD"));
}

// =============================================================================
// Init Tests
// =============================================================================

#[test]
fn test_init_writes_sample_workbook() {
    let dir = TempDir::new().unwrap();
    cmd_in(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("database_credentials_SAMPLE.xlsx"));

    let records =
        mysql_bulk_migrate::load_credentials(dir.path().join("database_credentials_SAMPLE.xlsx"))
            .unwrap();
    assert!(!records.is_empty());
}

#[test]
fn test_init_refuses_to_overwrite_without_force() {
    let dir = TempDir::new().unwrap();
    cmd_in(&dir).args(["init", "--output", "creds.xlsx"]).assert().success();

    cmd_in(&dir)
        .args(["init", "--output", "creds.xlsx"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--force"));

    cmd_in(&dir)
        .args(["init", "--output", "creds.xlsx", "--force"])
        .assert()
        .success();
}

// =============================================================================
// Dry Run Tests
// =============================================================================

#[test]
fn test_export_dry_run_lists_databases() {
    let dir = TempDir::new().unwrap();
    write_credentials(
        &dir,
        &[
            ["shop", "shop_user", "pw", ""],
            ["blog", "blog_user", "pw", "127.0.0.1"],
        ],
    );

    cmd_in(&dir)
        .args(["export", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("shop"))
        .stdout(predicate::str::contains("blog"));

    // Dry runs leave no trace on disk
    assert!(!dir.path().join("backups").exists());
    assert!(!dir.path().join("logs").exists());
}

#[test]
fn test_import_dry_run_json_shows_chosen_backups() {
    let dir = TempDir::new().unwrap();
    write_credentials(
        &dir,
        &[
            ["shop", "shop_user", "pw", ""],
            ["blog", "blog_user", "pw", ""],
        ],
    );
    let backups = dir.path().join("backups");
    std::fs::create_dir(&backups).unwrap();
    std::fs::write(backups.join("shop_2024-01-01_000000.sql"), "-- old").unwrap();
    std::fs::write(backups.join("shop_2024-03-01_120000.sql"), "-- new").unwrap();

    let output = cmd_in(&dir)
        .args(["--output-json", "import", "--dry-run"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["mode"], "import");
    let databases = plan["databases"].as_array().unwrap();
    assert_eq!(databases.len(), 2);
    assert!(databases[0]["artifact"]
        .as_str()
        .unwrap()
        .ends_with("shop_2024-03-01_120000.sql"));
    assert!(databases[1]["artifact"].is_null());
}

// =============================================================================
// Full Runs With Stand-in Tools
// =============================================================================

#[cfg(unix)]
#[test]
fn test_export_continues_past_failed_database() {
    let dir = TempDir::new().unwrap();
    write_credentials(
        &dir,
        &[
            ["alpha", "a_user", "pw", ""],
            ["broken", "b_user", "pw", ""],
            ["gamma", "g_user", "pw", ""],
        ],
    );
    let mysqldump = write_script(
        &dir,
        "fake-mysqldump",
        r#"for last; do :; done
if [ "$last" = "broken" ]; then echo "Access denied" >&2; exit 2; fi
echo "-- dump of $last""#,
    );
    let mysql = write_script(&dir, "fake-mysql", "cat > /dev/null");
    write_config(&dir, &mysqldump, &mysql);

    cmd_in(&dir)
        .args(["--config", "config.yaml", "export"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("2/3 succeeded"))
        .stdout(predicate::str::contains("broken"));

    let files = list_dir(&dir.path().join("backups"));
    assert_eq!(files.len(), 2);
    assert!(files[0].starts_with("alpha_") && files[0].ends_with(".sql"));
    assert!(files[1].starts_with("gamma_"));

    let logs = list_dir(&dir.path().join("logs"));
    assert_eq!(logs.len(), 1);
    assert!(logs[0].starts_with("export_"));
    let log = std::fs::read_to_string(dir.path().join("logs").join(&logs[0])).unwrap();
    assert!(log.contains(" - ERROR - "));
    assert!(log.contains("Access denied"));
}

#[cfg(unix)]
#[test]
fn test_import_restores_and_skips_missing_backups() {
    let dir = TempDir::new().unwrap();
    write_credentials(
        &dir,
        &[
            ["shop", "shop_user", "pw", ""],
            ["blog", "blog_user", "pw", ""],
        ],
    );
    let backups = dir.path().join("backups");
    std::fs::create_dir(&backups).unwrap();
    std::fs::write(backups.join("shop_2024-03-01_120000.sql"), "CREATE TABLE t (id INT);").unwrap();

    let mysqldump = write_script(&dir, "fake-mysqldump", "exit 0");
    let mysql = write_script(&dir, "fake-mysql", "cat > /dev/null");
    write_config(&dir, &mysqldump, &mysql);

    let output = cmd_in(&dir)
        .env("MYSQL_ADMIN_PASSWORD", "secret")
        .args(["--config", "config.yaml", "--output-json", "import"])
        .output()
        .unwrap();

    // A skipped database makes the import unsuccessful
    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["stats"]["successful"], 1);
    assert_eq!(report["stats"]["skipped"], 1);
    assert_eq!(report["stats"]["failed"], 0);
}

#[cfg(unix)]
#[test]
fn test_import_succeeds_when_every_database_restores() {
    let dir = TempDir::new().unwrap();
    write_credentials(&dir, &[["shop", "shop_user", "pw", ""]]);
    let backups = dir.path().join("backups");
    std::fs::create_dir(&backups).unwrap();
    std::fs::write(backups.join("shop_2024-03-01_120000.sql"), "CREATE TABLE t (id INT);").unwrap();

    let mysqldump = write_script(&dir, "fake-mysqldump", "exit 0");
    let mysql = write_script(&dir, "fake-mysql", "cat > /dev/null");
    write_config(&dir, &mysqldump, &mysql);

    cmd_in(&dir)
        .env("MYSQL_ADMIN_PASSWORD", "secret")
        .args(["--config", "config.yaml", "import"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1/1 succeeded"));
}
