//! Error types for the bulk migration library.

use std::time::Duration;
use thiserror::Error;

/// Exit status for configuration errors and runs that did not fully succeed.
pub const EXIT_FAILURE: u8 = 1;

/// Exit status for I/O errors (files, directories).
pub const EXIT_IO_ERROR: u8 = 7;

/// Exit status when the run was interrupted.
pub const EXIT_CANCELLED: u8 = 130;

/// Why an external program did not complete cleanly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessFailure {
    /// The program could not be started at all.
    #[error("failed to start {program}: {message}")]
    Spawn { program: String, message: String },

    /// The program ran and exited unsuccessfully. `code` is -1 when it was
    /// terminated by a signal.
    #[error("exited with code {code}: {stderr}")]
    Exit { code: i32, stderr: String },

    /// The program exceeded its wall-clock limit and was killed.
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The program's standard input could not accept the payload.
    #[error("could not write to standard input: {0}")]
    Stdin(String),

    /// Local I/O around the process (output file, waiting) failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl ProcessFailure {
    /// True when the program was killed for exceeding its time limit.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessFailure::Timeout(_))
    }
}

/// Main error type for export and import runs.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (missing credentials file, empty admin password, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credentials spreadsheet could not be read
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    /// Credentials workbook could not be written
    #[error("Workbook error: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),

    /// Dump of a single database failed
    #[error("Backup failed for {database}: {failure}")]
    Dump {
        database: String,
        failure: ProcessFailure,
    },

    /// Creating the database or its user failed
    #[error("Provisioning failed for {database}: {failure}")]
    Provision {
        database: String,
        failure: ProcessFailure,
    },

    /// Loading the backup into the database failed on every host tried
    #[error("Import failed for {database} after {attempts} attempt(s): {failure}")]
    Restore {
        database: String,
        attempts: usize,
        failure: ProcessFailure,
    },

    /// No backup file exists for the database
    #[error("No backup file found for {0}")]
    MissingArtifact(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was interrupted (SIGINT, SIGTERM)
    #[error("Run interrupted by user")]
    Cancelled,
}

impl MigrateError {
    /// Create a Dump error
    pub fn dump(database: impl Into<String>, failure: ProcessFailure) -> Self {
        MigrateError::Dump {
            database: database.into(),
            failure,
        }
    }

    /// Create a Provision error
    pub fn provision(database: impl Into<String>, failure: ProcessFailure) -> Self {
        MigrateError::Provision {
            database: database.into(),
            failure,
        }
    }

    /// Create a Restore error
    pub fn restore(database: impl Into<String>, attempts: usize, failure: ProcessFailure) -> Self {
        MigrateError::Restore {
            database: database.into(),
            attempts,
            failure,
        }
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Io(_) => EXIT_IO_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
            _ => EXIT_FAILURE,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
