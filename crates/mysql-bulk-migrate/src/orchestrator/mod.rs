//! Run orchestrator - drives every database through export or import.
//!
//! Databases are processed one at a time, in spreadsheet order. A failure is
//! confined to its database: it is logged, counted, and the run moves on.

mod stats;

pub use stats::{Outcome, RunStats};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::artifact::locate;
use crate::config::Config;
use crate::credentials::{AdminCredential, CredentialRecord};
use crate::dump::DumpRunner;
use crate::error::{MigrateError, Result};
use crate::logging::RunLog;
use crate::process::{ProcessRunner, ToolRunner};
use crate::restore::Restorer;

const RULE: &str = "============================================================";

/// Direction of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Export,
    Import,
}

impl RunMode {
    fn noun(&self) -> &'static str {
        match self {
            RunMode::Export => "backup",
            RunMode::Import => "import",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Export => f.write_str("export"),
            RunMode::Import => f.write_str("import"),
        }
    }
}

/// Result for one database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseResult {
    pub database: String,
    pub outcome: Outcome,
    /// Backup written (export) or restored (import).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    /// External program attempts for the main step (dump or restore).
    pub attempts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DatabaseResult {
    fn succeeded(database: &str, artifact: PathBuf, attempts: usize) -> Self {
        Self {
            database: database.to_string(),
            outcome: Outcome::Succeeded,
            artifact: Some(artifact),
            attempts,
            error: None,
        }
    }

    fn failed(database: &str, artifact: Option<PathBuf>, attempts: usize, error: &MigrateError) -> Self {
        Self {
            database: database.to_string(),
            outcome: Outcome::Failed,
            artifact,
            attempts,
            error: Some(error.to_string()),
        }
    }

    fn skipped(database: &str) -> Self {
        Self {
            database: database.to_string(),
            outcome: Outcome::Skipped,
            artifact: None,
            attempts: 0,
            error: Some(MigrateError::MissingArtifact(database.to_string()).to_string()),
        }
    }
}

/// Result of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: String,

    pub mode: RunMode,

    /// "completed" or "failed".
    pub status: String,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    pub duration_seconds: f64,

    pub stats: RunStats,

    /// Per-database results, in processing order.
    pub databases: Vec<DatabaseResult>,

    pub backup_dir: PathBuf,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.stats.is_success(self.mode)
    }

    pub fn failed_databases(&self) -> Vec<&str> {
        self.names_with(Outcome::Failed)
    }

    pub fn skipped_databases(&self) -> Vec<&str> {
        self.names_with(Outcome::Skipped)
    }

    fn names_with(&self, outcome: Outcome) -> Vec<&str> {
        self.databases
            .iter()
            .filter(|d| d.outcome == outcome)
            .map(|d| d.database.as_str())
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// What a dry run found for one database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedDatabase {
    pub database: String,
    /// Import only: backup that would be restored. `None` means skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

/// Dry-run listing of what a run would do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPlan {
    pub mode: RunMode,
    pub backup_dir: PathBuf,
    pub databases: Vec<PlannedDatabase>,
}

impl RunPlan {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Run orchestrator.
pub struct Orchestrator {
    config: Config,
    log: RunLog,
    dumper: DumpRunner,
    restorer: Restorer,
}

impl Orchestrator {
    /// Create an orchestrator that runs the real MySQL client programs.
    pub fn new(config: Config, log: RunLog) -> Self {
        Self::with_runner(config, log, Arc::new(ProcessRunner::new()))
    }

    /// Create an orchestrator on top of a custom [`ToolRunner`].
    pub fn with_runner(config: Config, log: RunLog, runner: Arc<dyn ToolRunner>) -> Self {
        let dumper = DumpRunner::new(runner.clone(), &config.tools, &config.timeouts);
        let restorer = Restorer::new(runner, &config.tools, &config.timeouts);
        Self {
            config,
            log,
            dumper,
            restorer,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    /// Create the backup directory for an export if needed.
    pub fn prepare_backup_dir(&self) -> Result<()> {
        let dir = &self.config.backup_dir;
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            self.log
                .info(format!("Created backup directory: {}", dir.display()));
        }
        Ok(())
    }

    /// An import needs the backup directory copied over from the old server.
    pub fn ensure_backup_dir(&self) -> Result<()> {
        let dir = &self.config.backup_dir;
        if !dir.is_dir() {
            return Err(MigrateError::Config(format!(
                "Backup directory not found: {} (copy the backups folder from the old server first)",
                dir.display()
            )));
        }
        Ok(())
    }

    /// Dump every database in `records`.
    pub async fn export(&self, records: &[CredentialRecord]) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        self.banner("MySQL Database Export", &run_id);

        self.prepare_backup_dir()?;
        self.log
            .info(format!("Found {} databases to back up", records.len()));

        let mut results = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            self.progress(index, records.len(), record);
            results.push(self.export_one(record).await);
        }

        Ok(self.finish(RunMode::Export, run_id, started_at, results))
    }

    /// Provision and restore every database in `records` that has a backup.
    pub async fn import(
        &self,
        records: &[CredentialRecord],
        admin: &AdminCredential,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        self.banner("MySQL Database Import", &run_id);

        self.ensure_backup_dir()?;
        self.log
            .info(format!("Found {} databases to import", records.len()));

        let mut results = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            self.progress(index, records.len(), record);
            results.push(self.import_one(record, admin).await);
        }

        Ok(self.finish(RunMode::Import, run_id, started_at, results))
    }

    /// What a run would do, without running anything.
    pub fn plan(&self, mode: RunMode, records: &[CredentialRecord]) -> RunPlan {
        let databases = records
            .iter()
            .map(|record| PlannedDatabase {
                database: record.database_name.clone(),
                artifact: match mode {
                    RunMode::Export => None,
                    RunMode::Import => locate(&record.database_name, &self.config.backup_dir),
                },
            })
            .collect();

        RunPlan {
            mode,
            backup_dir: self.config.backup_dir.clone(),
            databases,
        }
    }

    async fn export_one(&self, record: &CredentialRecord) -> DatabaseResult {
        let database = &record.database_name;
        match self
            .dumper
            .dump(record, &self.config.backup_dir, &self.log)
            .await
        {
            Ok(path) => DatabaseResult::succeeded(database, path, 1),
            Err(e) => {
                self.log.error(e.to_string());
                DatabaseResult::failed(database, None, 1, &e)
            }
        }
    }

    async fn import_one(&self, record: &CredentialRecord, admin: &AdminCredential) -> DatabaseResult {
        let database = &record.database_name;

        // Look for the backup before provisioning anything, so databases
        // without a backup never get an orphaned user.
        let Some(artifact) = locate(database, &self.config.backup_dir) else {
            self.log
                .warning(format!("No backup file found for {}, skipping", database));
            return DatabaseResult::skipped(database);
        };
        self.log.info(format!("Found backup: {}", display_name(&artifact)));

        match self
            .restorer
            .restore(record, &artifact, admin, &self.log)
            .await
        {
            Ok(report) => DatabaseResult::succeeded(database, artifact, report.attempts),
            Err(e) => {
                let attempts = match &e {
                    MigrateError::Restore { attempts, .. } => *attempts,
                    _ => 0,
                };
                if matches!(e, MigrateError::Provision { .. }) {
                    self.log.error(format!("{}; import not attempted", e));
                } else {
                    self.log.error(e.to_string());
                }
                DatabaseResult::failed(database, Some(artifact), attempts, &e)
            }
        }
    }

    fn banner(&self, title: &str, run_id: &str) {
        self.log.info(RULE);
        self.log.info(title);
        self.log.info(RULE);
        debug!("Run id: {}", run_id);
    }

    fn progress(&self, index: usize, total: usize, record: &CredentialRecord) {
        self.log.info(format!(
            "[{}/{}] Processing {}",
            index + 1,
            total,
            record.database_name
        ));
    }

    fn finish(
        &self,
        mode: RunMode,
        run_id: String,
        started_at: DateTime<Utc>,
        databases: Vec<DatabaseResult>,
    ) -> RunReport {
        let stats = RunStats::from_outcomes(databases.iter().map(|d| d.outcome));
        debug_assert!(stats.is_consistent());

        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let report = RunReport {
            run_id,
            mode,
            status: if stats.is_success(mode) { "completed" } else { "failed" }.to_string(),
            started_at,
            completed_at,
            duration_seconds,
            stats,
            databases,
            backup_dir: self.config.backup_dir.clone(),
            log_file: self.log.path(),
        };

        self.log_summary(&report);
        report
    }

    fn log_summary(&self, report: &RunReport) {
        let noun = report.mode.noun();
        let stats = &report.stats;

        self.log.info(RULE);
        self.log.info(format!("{} Summary", capitalize(noun)));
        self.log.info(RULE);
        self.log.info(format!("Total databases: {}", stats.total));
        self.log.info(format!("Successful: {}", stats.successful));
        self.log.info(format!("Failed: {}", stats.failed));
        if report.mode == RunMode::Import {
            self.log.info(format!("Skipped: {}", stats.skipped));
        }
        let failed = report.failed_databases();
        if !failed.is_empty() {
            self.log.info(format!("Failed databases: {}", failed.join(", ")));
        }
        let skipped = report.skipped_databases();
        if !skipped.is_empty() {
            self.log.info(format!("Skipped databases: {}", skipped.join(", ")));
        }
        self.log.info(format!(
            "Backup location: {}",
            absolute(&report.backup_dir).display()
        ));
        if let Some(path) = &report.log_file {
            self.log.info(format!("Log file: {}", path.display()));
        }
        self.log.info(format!("Duration: {:.1}s", report.duration_seconds));
        self.log.info(RULE);

        if report.is_success() {
            self.log
                .success(format!("All {}s completed successfully!", noun));
        } else if report.mode == RunMode::Import {
            self.log.warning(
                "Some imports failed or were skipped. Please check the log file for details.",
            );
        } else {
            self.log
                .warning("Some backups failed. Please check the log file for details.");
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
