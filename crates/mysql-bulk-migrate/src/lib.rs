//! # mysql-bulk-migrate
//!
//! Move many MySQL databases from one server to another, driven by a
//! spreadsheet of per-database credentials.
//!
//! - **Export** runs `mysqldump` once per database and writes
//!   `<database>_<timestamp>.sql` files into a backup directory.
//! - **Import** finds the newest backup for each database, creates the
//!   database and its user with an administrator account, and loads the
//!   backup through `mysql`, retrying once on the other loopback host name.
//!
//! Databases are processed sequentially; one database failing never stops
//! the run. Every run writes a log file next to the console output.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_bulk_migrate::{load_credentials, Config, Orchestrator, RunLog, RunMode};
//!
//! #[tokio::main]
//! async fn main() -> mysql_bulk_migrate::Result<()> {
//!     let config = Config::default();
//!     let records = load_credentials(&config.credentials_file)?;
//!     let log = RunLog::create(&config.log_dir, RunMode::Export, config.logging.flush_every);
//!     let report = Orchestrator::new(config, log).export(&records).await?;
//!     println!("{} of {} databases backed up", report.stats.successful, report.stats.total);
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod config;
pub mod credentials;
pub mod dump;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod process;
pub mod restore;

// Re-exports for convenient access
pub use artifact::{artifact_file_name, locate};
pub use config::{AdminConfig, Config, LoggingConfig, TimeoutConfig, ToolsConfig};
pub use credentials::{
    load_credentials, write_sample_workbook, write_workbook, AdminCredential, CredentialRecord,
};
pub use dump::DumpRunner;
pub use error::{MigrateError, ProcessFailure, Result};
pub use logging::{LogEntry, LogLevel, RunLog};
pub use orchestrator::{
    DatabaseResult, Orchestrator, Outcome, PlannedDatabase, RunMode, RunPlan, RunReport, RunStats,
};
pub use process::{Invocation, ProcessOutput, ProcessRunner, StdoutTarget, ToolRunner};
pub use restore::{fallback_host, RestoreReport, Restorer};
