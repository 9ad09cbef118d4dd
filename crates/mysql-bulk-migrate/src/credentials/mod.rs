//! Per-database credentials and the administrator account.
//!
//! Credentials come from a spreadsheet whose first sheet has a header row
//! followed by `database_name | username | password | host` rows.

mod sample;

pub use sample::{write_sample_workbook, write_workbook, SAMPLE_HEADERS, SAMPLE_SHEET_NAME};

use calamine::{open_workbook_auto, Data, Reader};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use crate::config::AdminConfig;
use crate::error::{MigrateError, Result};

/// Host used when the host cell is blank.
pub const DEFAULT_HOST: &str = "localhost";

/// Credentials for one database, as read from the spreadsheet.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub database_name: String,
    pub username: String,
    pub password: String,
    pub host: String,
}

impl CredentialRecord {
    pub fn new(
        database_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        let host = host.into();
        Self {
            database_name: database_name.into(),
            username: username.into(),
            password: password.into(),
            host: if host.trim().is_empty() {
                DEFAULT_HOST.to_string()
            } else {
                host
            },
        }
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("database_name", &self.database_name)
            .field("username", &self.username)
            .field("password", &"****")
            .field("host", &self.host)
            .finish()
    }
}

/// Privileged account used to create databases and users on import.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminCredential {
    pub host: String,
    pub user: String,
    pub password: String,
}

impl AdminCredential {
    /// Build an admin credential; an empty password is a configuration error.
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let password = password.into();
        if password.trim().is_empty() {
            return Err(MigrateError::Config(
                "Administrator password cannot be empty".into(),
            ));
        }
        Ok(Self {
            host: host.into(),
            user: user.into(),
            password,
        })
    }

    /// Admin credential fully specified by the config file, if it is.
    pub fn from_config(admin: &AdminConfig) -> Option<Result<Self>> {
        admin
            .password
            .as_ref()
            .map(|password| Self::new(&admin.host, &admin.user, password))
    }
}

impl std::fmt::Debug for AdminCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredential")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"****")
            .finish()
    }
}

/// Load credential records from the first sheet of a spreadsheet
/// (`.xlsx`, `.xls`, `.xlsb` or `.ods`).
pub fn load_credentials<P: AsRef<Path>>(path: P) -> Result<Vec<CredentialRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MigrateError::Config(format!(
            "Credentials file not found: {}",
            path.display()
        )));
    }

    let mut workbook = open_workbook_auto(path)?;
    let range = workbook.worksheet_range_at(0).ok_or_else(|| {
        MigrateError::Config(format!("{} contains no worksheets", path.display()))
    })??;

    let rows = range
        .rows()
        .map(|row| (0..4).map(|col| cell_text(row.get(col))).collect::<Vec<_>>());
    let records = records_from_rows(rows)?;

    debug!("Loaded {} credential records from {}", records.len(), path.display());
    Ok(records)
}

/// Turn raw rows (header first) into records.
///
/// Rows with a blank database name are dropped, cells are trimmed, and a
/// database listed twice is rejected.
pub fn records_from_rows<I>(rows: I) -> Result<Vec<CredentialRecord>>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for (index, row) in rows.into_iter().enumerate().skip(1) {
        let cell = |col: usize| row.get(col).map(|s| s.trim()).unwrap_or_default();

        let database_name = cell(0);
        if database_name.is_empty() {
            continue;
        }
        if !seen.insert(database_name.to_string()) {
            return Err(MigrateError::Config(format!(
                "Database {} is listed more than once (row {})",
                database_name,
                index + 1
            )));
        }

        records.push(CredentialRecord::new(database_name, cell(1), cell(2), cell(3)));
    }

    Ok(records)
}

fn cell_text(cell: Option<&Data>) -> String {
    match cell {
        None | Some(Data::Empty) => String::new(),
        Some(Data::String(s)) => s.trim().to_string(),
        // Numeric passwords and names come back as floats.
        Some(Data::Float(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Some(other) => other.to_string().trim().to_string(),
    }
}
