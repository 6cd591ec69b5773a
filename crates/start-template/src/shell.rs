//! Scoped shell execution with a two-stage termination on timeout.

use anyhow::{Context as _, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::warn;

use start_core::{Settings, StartError, Utd, DEFAULT_TIMEOUT_SECS, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS};

/// Grace period between the polite SIGTERM and the forced SIGKILL.
const TERMINATION_GRACE: Duration = Duration::from_secs(1);

/// A shell invocation prefix: first word is the executable, the rest are
/// fixed flags; the command string is appended as the final argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl ShellSpec {
    /// Split a spec like `bash -c` or `python3 -c` on whitespace.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut words = spec.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| StartError::Validation {
                entity: "shell".into(),
                reason: "shell specification is empty".into(),
            })?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    /// Auto-detect `bash -c`, falling back to `sh -c`, via PATH lookup.
    pub fn detect() -> Result<Self> {
        for candidate in ["bash", "sh"] {
            if which::which(candidate).is_ok() {
                return Ok(Self {
                    program: candidate.to_string(),
                    args: vec!["-c".to_string()],
                });
            }
        }
        Err(StartError::ShellNotFound.into())
    }

    /// Precedence: per-UTD shell, then settings, then auto-detect.
    pub fn resolve(utd: &Utd, settings: &Settings) -> Result<Self> {
        match utd.shell.as_deref().or(settings.shell.as_deref()) {
            Some(spec) => Self::parse(spec),
            None => Self::detect(),
        }
    }
}

/// Effective timeout: per-UTD, then settings, then 30s; clamped to 1..=3600.
pub fn resolve_timeout(utd: &Utd, settings: &Settings) -> Duration {
    let secs = utd
        .timeout
        .or(settings.timeout)
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
        .clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

/// Captured result of one shell command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

/// Run `command` through the shell in `workdir`, capturing stdout/stderr.
///
/// On timeout the child's process group gets SIGTERM, one second of grace,
/// then SIGKILL; whatever output was produced is kept and `timed_out` is set.
/// A missing shell binary surfaces as [`StartError::ShellNotFound`].
pub async fn run(
    shell: &ShellSpec,
    command: &str,
    workdir: &Path,
    timeout: Duration,
) -> Result<CommandOutput> {
    let mut cmd = Command::new(&shell.program);
    cmd.args(&shell.args)
        .arg(command)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Isolate the child in its own process group so the two-stage kill
    // reaches the whole pipeline, not just the shell.
    // SAFETY: setsid() is async-signal-safe and runs before exec.
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StartError::ShellNotFound.into());
        }
        Err(e) => return Err(e).context("failed to spawn shell"),
    };
    let pid = child.id();

    let stdout = child.stdout.take().context("failed to capture stdout")?;
    let stderr = child.stderr.take().context("failed to capture stderr")?;
    let stdout_task = tokio::spawn(read_stream(stdout));
    let stderr_task = tokio::spawn(read_stream(stderr));

    let mut timed_out = false;
    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => status.context("failed to wait for shell")?,
        Err(_) => {
            timed_out = true;
            warn!(
                timeout_secs = timeout.as_secs(),
                command, "command timed out; terminating"
            );
            signal_group(pid, libc::SIGTERM);
            match tokio::time::timeout(TERMINATION_GRACE, child.wait()).await {
                Ok(status) => status.context("failed to wait for shell")?,
                Err(_) => {
                    signal_group(pid, libc::SIGKILL);
                    child.wait().await.context("failed to wait for shell")?
                }
            }
        }
    };

    let stdout = stdout_task.await.context("stdout reader panicked")?;
    let stderr = stderr_task.await.context("stderr reader panicked")?;

    Ok(CommandOutput {
        stdout,
        stderr,
        exit_code: status.code().unwrap_or(1),
        timed_out,
    })
}

async fn read_stream(mut stream: impl tokio::io::AsyncRead + Unpin) -> String {
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

fn signal_group(pid: Option<u32>, signal: i32) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        // SAFETY: kill() is async-signal-safe; negative PID targets the group.
        unsafe {
            libc::kill(-(pid as i32), signal);
        }
    }
    #[cfg(not(unix))]
    let _ = (pid, signal);
}

#[cfg(test)]
#[path = "shell_tests.rs"]
mod tests;
