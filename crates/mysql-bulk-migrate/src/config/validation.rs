//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.credentials_file.as_os_str().is_empty() {
        return Err(MigrateError::Config("credentials_file is required".into()));
    }
    if config.backup_dir.as_os_str().is_empty() {
        return Err(MigrateError::Config("backup_dir is required".into()));
    }
    if config.log_dir.as_os_str().is_empty() {
        return Err(MigrateError::Config("log_dir is required".into()));
    }

    if config.tools.mysqldump.trim().is_empty() {
        return Err(MigrateError::Config("tools.mysqldump is required".into()));
    }
    if config.tools.mysql.trim().is_empty() {
        return Err(MigrateError::Config("tools.mysql is required".into()));
    }

    if config.timeouts.dump_secs == 0 {
        return Err(MigrateError::Config(
            "timeouts.dump_secs must be at least 1".into(),
        ));
    }
    if config.timeouts.restore_secs == 0 {
        return Err(MigrateError::Config(
            "timeouts.restore_secs must be at least 1".into(),
        ));
    }
    if let Some(0) = config.timeouts.provision_secs {
        return Err(MigrateError::Config(
            "timeouts.provision_secs must be at least 1".into(),
        ));
    }

    if config.logging.flush_every == 0 {
        return Err(MigrateError::Config(
            "logging.flush_every must be at least 1".into(),
        ));
    }

    if let Some(admin) = &config.admin {
        if admin.host.trim().is_empty() {
            return Err(MigrateError::Config("admin.host is required".into()));
        }
        if admin.user.trim().is_empty() {
            return Err(MigrateError::Config("admin.user is required".into()));
        }
    }

    Ok(())
}
