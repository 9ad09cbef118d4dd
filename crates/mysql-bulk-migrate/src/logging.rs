//! Per-run log file.
//!
//! [`RunLog`] is a cloneable handle passed explicitly to every pipeline step.
//! Entries are kept in memory for the lifetime of the run, mirrored to
//! `tracing` for the console, and appended to `<mode>_<timestamp>.log` in
//! batches of `flush_every`. Whatever is still pending is written when the
//! last handle is dropped, so early exits still leave a complete file.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::orchestrator::RunMode;

/// Severity of a run log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Success => "SUCCESS",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    /// `<ISO timestamp> - <LEVEL> - <message>`
    pub fn format_line(&self) -> String {
        format!(
            "{} - {} - {}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3f"),
            self.level,
            self.message
        )
    }
}

struct LogBuffer {
    path: Option<PathBuf>,
    entries: Vec<LogEntry>,
    flushed: usize,
    flush_every: usize,
}

impl LogBuffer {
    fn pending(&self) -> usize {
        self.entries.len() - self.flushed
    }

    fn flush(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            self.flushed = self.entries.len();
            return Ok(());
        };
        if self.pending() == 0 {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut text = String::new();
        for entry in &self.entries[self.flushed..] {
            text.push_str(&entry.format_line());
            text.push('\n');
        }
        file.write_all(text.as_bytes())?;
        // Written entries live in the file only.
        self.entries.clear();
        self.flushed = 0;
        Ok(())
    }
}

impl Drop for LogBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            eprintln!("Failed to write run log: {}", e);
        }
    }
}

/// Handle to the run log. Clones share the same buffer.
#[derive(Clone)]
pub struct RunLog {
    inner: Arc<Mutex<LogBuffer>>,
}

impl RunLog {
    /// Log to `<log_dir>/<mode>_<YYYYMMDD_HHMMSS>.log`. The directory and file
    /// are created on the first flush.
    pub fn create(log_dir: &Path, mode: RunMode, flush_every: usize) -> Self {
        let file_name = format!("{}_{}.log", mode, Local::now().format("%Y%m%d_%H%M%S"));
        Self::with_path(Some(log_dir.join(file_name)), flush_every)
    }

    /// Log that is never written to disk.
    pub fn in_memory() -> Self {
        Self::with_path(None, usize::MAX)
    }

    fn with_path(path: Option<PathBuf>, flush_every: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogBuffer {
                path,
                entries: Vec::new(),
                flushed: 0,
                flush_every: flush_every.max(1),
            })),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, LogBuffer> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an entry, flushing when enough entries are pending.
    pub fn log(&self, message: impl Into<String>, level: LogLevel) {
        let message = message.into();
        match level {
            LogLevel::Info => info!("{}", message),
            LogLevel::Success => info!(outcome = "success", "{}", message),
            LogLevel::Warning => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }

        let mut buffer = self.buffer();
        buffer.entries.push(LogEntry {
            timestamp: Local::now(),
            level,
            message,
        });
        if buffer.pending() >= buffer.flush_every {
            if let Err(e) = buffer.flush() {
                warn!("Failed to write run log: {}", e);
            }
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(message, LogLevel::Info);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(message, LogLevel::Warning);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(message, LogLevel::Error);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.log(message, LogLevel::Success);
    }

    /// Write all pending entries to the log file.
    pub fn flush(&self) -> Result<()> {
        self.buffer().flush()
    }

    /// Log file path, if this log is backed by a file.
    pub fn path(&self) -> Option<PathBuf> {
        self.buffer().path.clone()
    }

    /// Entries held in memory: all of them for an in-memory log, the ones
    /// not yet written for a file-backed log.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.buffer().entries.clone()
    }
}

impl std::fmt::Debug for RunLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let buffer = self.buffer();
        f.debug_struct("RunLog")
            .field("path", &buffer.path)
            .field("entries", &buffer.entries.len())
            .field("flushed", &buffer.flushed)
            .finish()
    }
}
