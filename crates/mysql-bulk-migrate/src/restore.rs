//! Database provisioning and restore through the `mysql` client.
//!
//! Each database is handled in two phases:
//!
//! 1. **Provisioning** with the administrator account: create the database
//!    and the user if missing, grant the user everything on the database,
//!    flush privileges. The script is idempotent.
//! 2. **Restore** as the database's own user, streaming the backup file on
//!    stdin. A failed attempt against a loopback host is retried once against
//!    the other loopback spelling.

use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{TimeoutConfig, ToolsConfig};
use crate::credentials::{AdminCredential, CredentialRecord};
use crate::dump::megabytes;
use crate::error::{MigrateError, ProcessFailure, Result};
use crate::logging::RunLog;
use crate::process::{Invocation, StdoutTarget, ToolRunner};

/// Host spellings that reach the same local server. A restore that fails on
/// the first is retried on the second.
pub const LOOPBACK_ALIASES: [(&str, &str); 2] = [("localhost", "127.0.0.1"), ("127.0.0.1", "localhost")];

/// The alternate host to retry a failed restore against, if any.
pub fn fallback_host(host: &str) -> Option<&'static str> {
    LOOPBACK_ALIASES
        .iter()
        .find(|(from, _)| from.eq_ignore_ascii_case(host.trim()))
        .map(|(_, to)| *to)
}

/// Quote a MySQL identifier with backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a MySQL string literal with single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// Idempotent script creating `record`'s database and user.
pub fn provisioning_script(record: &CredentialRecord) -> String {
    let database = quote_ident(&record.database_name);
    let account = format!(
        "{}@{}",
        quote_literal(&record.username),
        quote_literal(&record.host)
    );

    format!(
        "CREATE DATABASE IF NOT EXISTS {database};\n\
         CREATE USER IF NOT EXISTS {account} IDENTIFIED BY {password};\n\
         GRANT ALL PRIVILEGES ON {database}.* TO {account};\n\
         FLUSH PRIVILEGES;\n",
        database = database,
        account = account,
        password = quote_literal(&record.password),
    )
}

/// Outcome of a successful restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Host the backup was finally loaded through.
    pub host: String,
    /// Restore attempts made (1, or 2 after a loopback retry).
    pub attempts: usize,
    /// Size of the backup file.
    pub bytes: u64,
}

/// Provisions databases and loads backups into them.
pub struct Restorer {
    runner: Arc<dyn ToolRunner>,
    program: String,
    restore_timeout: Duration,
    provision_timeout: Option<Duration>,
}

impl Restorer {
    pub fn new(runner: Arc<dyn ToolRunner>, tools: &ToolsConfig, timeouts: &TimeoutConfig) -> Self {
        Self {
            runner,
            program: tools.mysql.clone(),
            restore_timeout: timeouts.restore_timeout(),
            provision_timeout: timeouts.provision_timeout(),
        }
    }

    /// Admin `mysql -e <script>` call for `record`.
    pub fn provision_invocation(&self, record: &CredentialRecord, admin: &AdminCredential) -> Invocation {
        Invocation::new(&self.program)
            .arg(format!("--host={}", admin.host))
            .arg(format!("--user={}", admin.user))
            .arg(format!("--password={}", admin.password))
            .arg("-e")
            .arg(provisioning_script(record))
            .stdout(StdoutTarget::Discard)
            .timeout(self.provision_timeout)
    }

    /// `mysql <database>` call as the database's own user, reading `payload`.
    pub fn restore_invocation(&self, record: &CredentialRecord, host: &str, payload: Bytes) -> Invocation {
        Invocation::new(&self.program)
            .arg(format!("--host={}", host))
            .arg(format!("--user={}", record.username))
            .arg(format!("--password={}", record.password))
            .arg(&record.database_name)
            .stdin(payload)
            .stdout(StdoutTarget::Discard)
            .timeout(Some(self.restore_timeout))
    }

    /// Create `record`'s database and user with the admin account.
    pub async fn provision(
        &self,
        record: &CredentialRecord,
        admin: &AdminCredential,
        log: &RunLog,
    ) -> Result<()> {
        let database = &record.database_name;
        log.info(format!("Creating database and user for: {}", database));

        let invocation = self.provision_invocation(record, admin);
        debug!(command = %invocation.command_line(), "Running provisioning script");

        self.runner
            .run(&invocation)
            .await
            .map_err(|failure| MigrateError::provision(database, failure))?;

        log.info(format!(
            "Database and user ready: {} ({}@{})",
            database, record.username, record.host
        ));
        Ok(())
    }

    /// Provision `record`'s database, then load `artifact` into it.
    ///
    /// Nothing is loaded unless provisioning succeeded.
    pub async fn restore(
        &self,
        record: &CredentialRecord,
        artifact: &Path,
        admin: &AdminCredential,
        log: &RunLog,
    ) -> Result<RestoreReport> {
        self.provision(record, admin, log).await?;
        self.load(record, artifact, log).await
    }

    /// Stream `artifact` into the database, retrying once on the alternate
    /// loopback host.
    pub async fn load(
        &self,
        record: &CredentialRecord,
        artifact: &Path,
        log: &RunLog,
    ) -> Result<RestoreReport> {
        let database = &record.database_name;
        log.info(format!("Importing backup: {}", database));

        // Whole file in memory: the same bytes may be sent twice.
        let payload = tokio::fs::read(artifact).await.map(Bytes::from).map_err(|e| {
            MigrateError::restore(
                database,
                0,
                ProcessFailure::Io(format!("cannot read {}: {}", artifact.display(), e)),
            )
        })?;
        let bytes = payload.len() as u64;

        let mut hosts = vec![record.host.clone()];
        if let Some(alternate) = fallback_host(&record.host) {
            hosts.push(alternate.to_string());
        }

        let mut last_failure = None;
        for (attempt, host) in hosts.iter().enumerate() {
            let invocation = self.restore_invocation(record, host, payload.clone());
            debug!(command = %invocation.command_line(), attempt = attempt + 1, "Running restore");

            match self.runner.run(&invocation).await {
                Ok(output) => {
                    log.success(format!(
                        "Import successful: {} ({:.2} MB via {} in {:.1}s)",
                        database,
                        megabytes(bytes),
                        host,
                        output.duration.as_secs_f64()
                    ));
                    return Ok(RestoreReport {
                        host: host.clone(),
                        attempts: attempt + 1,
                        bytes,
                    });
                }
                Err(failure) => {
                    if let Some(next) = hosts.get(attempt + 1) {
                        log.warning(format!(
                            "Import via {} failed for {}: {}; retrying via {}",
                            host, database, failure, next
                        ));
                    }
                    last_failure = Some(failure);
                }
            }
        }

        let failure = last_failure.unwrap_or_else(|| ProcessFailure::Io("no restore attempted".into()));
        Err(MigrateError::restore(database, hosts.len(), failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::{exit_failure, ok_output, ScriptedRunner};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn admin() -> AdminCredential {
        AdminCredential::new("localhost", "root", "rootpw").unwrap()
    }

    fn restorer(runner: Arc<dyn ToolRunner>) -> Restorer {
        Restorer::new(runner, &ToolsConfig::default(), &TimeoutConfig::default())
    }

    fn backup(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, "CREATE TABLE t (id INT);\n").unwrap();
        path
    }

    fn is_provision(inv: &Invocation) -> bool {
        inv.args.iter().any(|a| a == "-e")
    }

    #[test]
    fn test_fallback_table() {
        assert_eq!(fallback_host("localhost"), Some("127.0.0.1"));
        assert_eq!(fallback_host("127.0.0.1"), Some("localhost"));
        assert_eq!(fallback_host("LOCALHOST"), Some("127.0.0.1"));
        assert_eq!(fallback_host("db1.internal"), None);
        assert_eq!(fallback_host("::1"), None);
    }

    #[test]
    fn test_provisioning_script_order_and_quoting() {
        let record = CredentialRecord::new("my`db", "o'brien", "p'w\\x", "localhost");
        let script = provisioning_script(&record);
        let lines: Vec<_> = script.lines().collect();

        assert_eq!(lines[0], "CREATE DATABASE IF NOT EXISTS `my``db`;");
        assert_eq!(
            lines[1],
            "CREATE USER IF NOT EXISTS 'o''brien'@'localhost' IDENTIFIED BY 'p''w\\\\x';"
        );
        assert_eq!(lines[2], "GRANT ALL PRIVILEGES ON `my``db`.* TO 'o''brien'@'localhost';");
        assert_eq!(lines[3], "FLUSH PRIVILEGES;");
    }

    #[test]
    fn test_provisioning_is_create_if_absent() {
        let script = provisioning_script(&CredentialRecord::new("a", "b", "c", "localhost"));
        assert!(script.contains("CREATE DATABASE IF NOT EXISTS"));
        assert!(script.contains("CREATE USER IF NOT EXISTS"));
        assert!(!script.contains("DROP"));
    }

    #[tokio::test]
    async fn test_provisioning_twice_is_harmless() {
        let runner = Arc::new(ScriptedRunner::succeeding(""));
        let restorer = restorer(runner.clone());
        let record = CredentialRecord::new("shop", "shop_user", "pw", "localhost");
        let log = RunLog::in_memory();

        restorer.provision(&record, &admin(), &log).await.unwrap();
        restorer.provision(&record, &admin(), &log).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].args, calls[1].args);
        assert_eq!(calls[0].flag_value("user"), Some("root"));
    }

    #[tokio::test]
    async fn test_loopback_retry_succeeds() {
        let dir = TempDir::new().unwrap();
        let artifact = backup(&dir, "shop_2024-01-01_000000.sql");
        let runner = Arc::new(ScriptedRunner::new(|inv| {
            if is_provision(inv) || inv.flag_value("host") == Some("127.0.0.1") {
                Ok(ok_output(""))
            } else {
                Err(exit_failure(1, "Can't connect to local MySQL server through socket"))
            }
        }));
        let record = CredentialRecord::new("shop", "shop_user", "pw", "localhost");

        let report = restorer(runner.clone())
            .restore(&record, &artifact, &admin(), &RunLog::in_memory())
            .await
            .unwrap();

        assert_eq!(report.attempts, 2);
        assert_eq!(report.host, "127.0.0.1");
        let restores: Vec<_> = runner.calls().into_iter().filter(|c| !is_provision(c)).collect();
        assert_eq!(restores.len(), 2);
        assert_eq!(restores[0].flag_value("host"), Some("localhost"));
        assert_eq!(restores[1].flag_value("host"), Some("127.0.0.1"));
        assert_eq!(
            restores[1].stdin.as_deref(),
            Some(&b"CREATE TABLE t (id INT);\n"[..])
        );
    }

    #[tokio::test]
    async fn test_numeric_loopback_retries_with_name() {
        let dir = TempDir::new().unwrap();
        let artifact = backup(&dir, "crm_2024-01-01_000000.sql");
        let runner = Arc::new(ScriptedRunner::new(|inv| {
            if is_provision(inv) {
                Ok(ok_output(""))
            } else {
                Err(exit_failure(1, "Access denied"))
            }
        }));
        let record = CredentialRecord::new("crm", "crm_user", "pw", "127.0.0.1");

        let err = restorer(runner.clone())
            .restore(&record, &artifact, &admin(), &RunLog::in_memory())
            .await
            .unwrap_err();

        assert!(matches!(err, MigrateError::Restore { attempts: 2, .. }));
        let hosts: Vec<_> = runner
            .calls()
            .iter()
            .filter(|c| !is_provision(c))
            .map(|c| c.flag_value("host").unwrap_or_default().to_string())
            .collect();
        assert_eq!(hosts, ["127.0.0.1", "localhost"]);
    }

    #[tokio::test]
    async fn test_remote_host_not_retried() {
        let dir = TempDir::new().unwrap();
        let artifact = backup(&dir, "erp_2024-01-01_000000.sql");
        let runner = Arc::new(ScriptedRunner::new(|inv| {
            if is_provision(inv) {
                Ok(ok_output(""))
            } else {
                Err(ProcessFailure::Timeout(Duration::from_secs(600)))
            }
        }));
        let record = CredentialRecord::new("erp", "erp_user", "pw", "db2.internal");

        let err = restorer(runner.clone())
            .restore(&record, &artifact, &admin(), &RunLog::in_memory())
            .await
            .unwrap_err();

        assert!(matches!(err, MigrateError::Restore { attempts: 1, .. }));
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_provisioning_failure_skips_restore() {
        let dir = TempDir::new().unwrap();
        let artifact = backup(&dir, "shop_2024-01-01_000000.sql");
        let runner = Arc::new(ScriptedRunner::new(|_| {
            Err(exit_failure(1, "ERROR 1045 (28000): Access denied for user 'root'"))
        }));
        let record = CredentialRecord::new("shop", "shop_user", "pw", "localhost");

        let err = restorer(runner.clone())
            .restore(&record, &artifact, &admin(), &RunLog::in_memory())
            .await
            .unwrap_err();

        assert!(matches!(err, MigrateError::Provision { .. }));
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(is_provision(&calls[0]));
    }

    #[tokio::test]
    async fn test_unreadable_artifact_fails_without_attempt() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::succeeding(""));
        let record = CredentialRecord::new("shop", "shop_user", "pw", "localhost");

        let err = restorer(runner.clone())
            .load(&record, &dir.path().join("gone.sql"), &RunLog::in_memory())
            .await
            .unwrap_err();

        assert!(matches!(err, MigrateError::Restore { attempts: 0, .. }));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_restore_invocation() {
        let restorer = restorer(Arc::new(ScriptedRunner::succeeding("")));
        let record = CredentialRecord::new("shop", "shop_user", "pw", "localhost");
        let inv = restorer.restore_invocation(&record, "127.0.0.1", Bytes::from_static(b"x"));

        assert_eq!(inv.program, "mysql");
        assert_eq!(
            inv.args,
            vec!["--host=127.0.0.1", "--user=shop_user", "--password=pw", "shop"]
        );
        assert_eq!(inv.timeout, Some(Duration::from_secs(600)));
    }
}
