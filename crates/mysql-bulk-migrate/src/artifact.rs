//! Backup file naming and lookup.
//!
//! Backups are named `<database>_<YYYY-MM-DD_HHMMSS>.sql`. The newest
//! embedded timestamp wins on lookup.

use chrono::{DateTime, Local, NaiveDateTime};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extension of backup files.
pub const BACKUP_EXTENSION: &str = "sql";

/// chrono format of the timestamp embedded in backup names.
pub const ARTIFACT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H%M%S";

/// File name for a backup of `database` taken at `taken_at`.
pub fn artifact_file_name(database: &str, taken_at: DateTime<Local>) -> String {
    format!(
        "{}_{}.{}",
        database,
        taken_at.format(ARTIFACT_TIMESTAMP_FORMAT),
        BACKUP_EXTENSION
    )
}

/// Compact timestamp form, also accepted on lookup.
const COMPACT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Timestamp of `file_name` when it is a backup of `database`.
///
/// The part between `<database>_` and `.sql` must parse as a timestamp, so
/// database `app` claims neither `app_archive_2024-01-01_000000.sql` nor
/// `app_2_2024-01-01_000000.sql`.
pub fn artifact_timestamp(database: &str, file_name: &str) -> Option<NaiveDateTime> {
    let stamp = file_name
        .strip_prefix(database)?
        .strip_prefix('_')?
        .strip_suffix(BACKUP_EXTENSION)?
        .strip_suffix('.')?;

    [ARTIFACT_TIMESTAMP_FORMAT, COMPACT_TIMESTAMP_FORMAT]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(stamp, format).ok())
}

/// Most recent backup of `database` in `backup_dir`.
///
/// Returns `None` when the directory is missing or unreadable or holds no
/// backup of that database. Nothing is cached between calls.
pub fn locate(database: &str, backup_dir: &Path) -> Option<PathBuf> {
    let entries = match std::fs::read_dir(backup_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot list {}: {}", backup_dir.display(), e);
            return None;
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|name| artifact_timestamp(database, &name).map(|at| (at, name)))
        .max()
        .map(|(_, name)| backup_dir.join(name))
}
