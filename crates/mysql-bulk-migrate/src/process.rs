//! External program execution.
//!
//! Every call to `mysqldump` or `mysql` goes through a [`ToolRunner`]. The
//! production [`ProcessRunner`] spawns the program with tokio, feeds the
//! optional stdin payload, drains stdout/stderr concurrently and races the
//! child's exit against the invocation's time limit. When the timer wins the
//! child is killed before returning.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::ProcessFailure;

/// Where a child's standard output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutTarget {
    /// Collect into [`ProcessOutput::stdout`].
    Capture,
    /// Stream straight into a newly created file.
    File(PathBuf),
    /// Throw away.
    Discard,
}

/// A fully described program call.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Program name or path.
    pub program: String,
    /// Arguments, passed without a shell.
    pub args: Vec<String>,
    /// Bytes written to the child's stdin, which is then closed.
    pub stdin: Option<Bytes>,
    /// Destination of the child's stdout.
    pub stdout: StdoutTarget,
    /// Wall-clock limit. `None` waits for the child indefinitely.
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            stdout: StdoutTarget::Discard,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, payload: Bytes) -> Self {
        self.stdin = Some(payload);
        self
    }

    pub fn stdout(mut self, target: StdoutTarget) -> Self {
        self.stdout = target;
        self
    }

    pub fn timeout(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit;
        self
    }

    /// Value of a `--name=value` argument, if present.
    #[cfg(test)]
    pub(crate) fn flag_value(&self, name: &str) -> Option<&str> {
        let prefix = format!("--{}=", name);
        self.args
            .iter()
            .find_map(|arg| arg.strip_prefix(prefix.as_str()))
    }

    /// Command line safe to log: passwords and inline SQL are masked.
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.program.clone()];
        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                parts.push("<sql>".to_string());
                mask_next = false;
            } else if arg.starts_with("--password=") {
                parts.push("--password=****".to_string());
            } else {
                mask_next = arg == "-e" || arg == "--execute";
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

/// Output of a child that exited successfully.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Captured stdout (empty unless [`StdoutTarget::Capture`]).
    pub stdout: Vec<u8>,
    /// Captured stderr, trimmed.
    pub stderr: String,
    /// Time from spawn to exit.
    pub duration: Duration,
}

/// Executes external programs.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the invocation to completion. Anything other than a zero exit
    /// status within the time limit is a [`ProcessFailure`].
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessFailure>;
}

/// [`ToolRunner`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn build_command(invocation: &Invocation) -> Result<Command, ProcessFailure> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if invocation.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }

        match &invocation.stdout {
            StdoutTarget::Capture => {
                cmd.stdout(Stdio::piped());
            }
            StdoutTarget::Discard => {
                cmd.stdout(Stdio::null());
            }
            StdoutTarget::File(path) => {
                let file = std::fs::File::create(path).map_err(|e| {
                    ProcessFailure::Io(format!("cannot create {}: {}", path.display(), e))
                })?;
                cmd.stdout(Stdio::from(file));
            }
        }

        Ok(cmd)
    }

    /// Feed stdin (if any) and wait for exit.
    ///
    /// A child that stops reading and exits non-zero reports its own exit
    /// status, so its stderr survives. The stdin error is only returned when
    /// the child exited cleanly without taking the whole payload.
    async fn complete(child: &mut Child, payload: Option<Bytes>) -> Result<ExitStatus, ProcessFailure> {
        let mut stdin_error = None;
        if let (Some(mut pipe), Some(bytes)) = (child.stdin.take(), payload) {
            let written = match pipe.write_all(&bytes).await {
                Ok(()) => pipe.shutdown().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                debug!("Child stopped reading stdin: {}", e);
                stdin_error = Some(e.to_string());
            }
            // Dropping the pipe closes the child's stdin.
        }

        let status = child
            .wait()
            .await
            .map_err(|e| ProcessFailure::Io(format!("failed to wait for process: {}", e)))?;

        match stdin_error {
            Some(message) if status.success() => Err(ProcessFailure::Stdin(message)),
            _ => Ok(status),
        }
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessFailure> {
        let start = Instant::now();
        let mut cmd = Self::build_command(invocation)?;

        debug!(command = %invocation.command_line(), timeout = ?invocation.timeout, "Spawning process");

        let mut child = cmd.spawn().map_err(|e| ProcessFailure::Spawn {
            program: invocation.program.clone(),
            message: e.to_string(),
        })?;

        let stdout_task = tokio::spawn(read_all(child.stdout.take()));
        let stderr_task = tokio::spawn(read_all(child.stderr.take()));

        let completion = Self::complete(&mut child, invocation.stdin.clone());
        let outcome = match invocation.timeout {
            Some(limit) => match timeout(limit, completion).await {
                Ok(result) => result,
                Err(_) => Err(ProcessFailure::Timeout(limit)),
            },
            None => completion.await,
        };

        let status = match outcome {
            Ok(status) => status,
            Err(failure) => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", invocation.program, e);
                }
                stdout_task.abort();
                stderr_task.abort();
                return Err(failure);
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default())
            .trim()
            .to_string();
        let duration = start.elapsed();

        debug!(
            program = %invocation.program,
            status = ?status.code(),
            duration_ms = duration.as_millis() as u64,
            "Process exited"
        );

        if !status.success() {
            return Err(ProcessFailure::Exit {
                code: status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(ProcessOutput {
            stdout,
            stderr,
            duration,
        })
    }
}

async fn read_all<R>(reader: Option<R>) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buf).await {
            debug!("Failed to read child output after {} bytes: {}", buf.len(), e);
        }
    }
    buf
}
