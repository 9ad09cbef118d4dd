//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default spreadsheet holding one row of credentials per database.
pub const DEFAULT_CREDENTIALS_FILE: &str = "database_credentials.xlsx";

/// Default directory for backup files.
pub const DEFAULT_BACKUP_DIR: &str = "backups";

/// Default directory for run log files.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Root configuration structure.
///
/// Every section is optional in the YAML file; missing values fall back to
/// the defaults below and command-line flags override both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Credentials spreadsheet (first row is a header).
    pub credentials_file: PathBuf,

    /// Directory backups are written to (export) and read from (import).
    pub backup_dir: PathBuf,

    /// Directory for the per-run log file.
    pub log_dir: PathBuf,

    /// External programs.
    pub tools: ToolsConfig,

    /// Per-process time limits.
    pub timeouts: TimeoutConfig,

    /// Run log behaviour.
    pub logging: LoggingConfig,

    /// Administrator account used to provision databases on import.
    /// Prompted for interactively when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<AdminConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials_file: PathBuf::from(DEFAULT_CREDENTIALS_FILE),
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            tools: ToolsConfig::default(),
            timeouts: TimeoutConfig::default(),
            logging: LoggingConfig::default(),
            admin: None,
        }
    }
}

/// Paths (or names resolved through PATH) of the MySQL client programs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Dump utility (default: "mysqldump").
    pub mysqldump: String,

    /// Client used for provisioning and restore (default: "mysql").
    pub mysql: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mysqldump: "mysqldump".to_string(),
            mysql: "mysql".to_string(),
        }
    }
}

/// Wall-clock limits for child processes, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Limit for one database dump (default: 300).
    pub dump_secs: u64,

    /// Limit for one restore attempt (default: 600).
    pub restore_secs: u64,

    /// Limit for the provisioning script. No limit when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provision_secs: Option<u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            dump_secs: 300,
            restore_secs: 600,
            provision_secs: None,
        }
    }
}

impl TimeoutConfig {
    pub fn dump_timeout(&self) -> Duration {
        Duration::from_secs(self.dump_secs)
    }

    pub fn restore_timeout(&self) -> Duration {
        Duration::from_secs(self.restore_secs)
    }

    pub fn provision_timeout(&self) -> Option<Duration> {
        self.provision_secs.map(Duration::from_secs)
    }
}

/// Run log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Buffered entries are written to the log file once this many are pending.
    pub flush_every: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { flush_every: 10 }
    }
}

/// Administrator account settings from the config file.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Admin host (default: "localhost").
    pub host: String,

    /// Admin user (default: "root").
    pub user: String,

    /// Admin password. Prompted for when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            user: "root".to_string(),
            password: None,
        }
    }
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .finish()
    }
}
