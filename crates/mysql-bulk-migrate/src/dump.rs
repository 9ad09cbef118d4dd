//! Per-database export through `mysqldump`.

use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::artifact::artifact_file_name;
use crate::config::{TimeoutConfig, ToolsConfig};
use crate::credentials::CredentialRecord;
use crate::error::{MigrateError, Result};
use crate::logging::RunLog;
use crate::process::{Invocation, StdoutTarget, ToolRunner};

/// Dumps one database at a time into timestamped `.sql` files.
pub struct DumpRunner {
    runner: Arc<dyn ToolRunner>,
    program: String,
    timeout: Duration,
}

impl DumpRunner {
    pub fn new(runner: Arc<dyn ToolRunner>, tools: &ToolsConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            runner,
            program: tools.mysqldump.clone(),
            timeout: timeouts.dump_timeout(),
        }
    }

    /// The `mysqldump` call for `record`, writing to `output`.
    ///
    /// Consistent snapshot (`--single-transaction`), routines, triggers and
    /// events included, and `DROP/CREATE DATABASE` statements emitted so the
    /// file recreates the database on its own.
    pub fn invocation(&self, record: &CredentialRecord, output: &Path) -> Invocation {
        Invocation::new(&self.program)
            .arg(format!("--host={}", record.host))
            .arg(format!("--user={}", record.username))
            .arg(format!("--password={}", record.password))
            .args([
                "--single-transaction",
                "--routines",
                "--triggers",
                "--events",
                "--add-drop-database",
                "--databases",
            ])
            .arg(&record.database_name)
            .stdout(StdoutTarget::File(output.to_path_buf()))
            .timeout(Some(self.timeout))
    }

    /// Dump `record`'s database into `output_dir` and return the file path.
    ///
    /// Failures are not retried. The partially written file is removed.
    pub async fn dump(
        &self,
        record: &CredentialRecord,
        output_dir: &Path,
        log: &RunLog,
    ) -> Result<PathBuf> {
        let database = &record.database_name;
        let path = output_dir.join(artifact_file_name(database, Local::now()));
        let invocation = self.invocation(record, &path);

        log.info(format!("Starting backup: {}", database));
        debug!(command = %invocation.command_line(), "Running dump");

        match self.runner.run(&invocation).await {
            Ok(output) => {
                let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
                log.success(format!(
                    "Backup successful: {} ({:.2} MB in {:.1}s)",
                    database,
                    megabytes(size),
                    output.duration.as_secs_f64()
                ));
                Ok(path)
            }
            Err(failure) => {
                remove_partial(&path).await;
                Err(MigrateError::dump(database, failure))
            }
        }
    }
}

pub(crate) fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial backup {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove partial backup {}: {}", path.display(), e),
    }
}
