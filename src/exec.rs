//! Subprocess execution, including timeout enforcement for the execution
//! orchestrator (C7) and the isolated-runner / plain-shell dispatch built by
//! the command builder (C6).
use std::collections::HashMap;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context as _, Result};

/// Designated exit code for a task that exceeded its `timeout`.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Result of a command execution.
#[derive(Debug)]
pub struct ExecResult {
    /// Standard output as a UTF-8 string.
    pub stdout: String,
    /// Standard error as a UTF-8 string.
    pub stderr: String,
    /// Whether the command exited successfully (status code 0).
    pub success: bool,
    /// Exit code; `None` if terminated by signal, `Some(124)` on timeout.
    pub code: Option<i32>,
    /// Whether this result represents a timeout kill rather than a natural exit.
    pub timed_out: bool,
}

impl From<std::process::Output> for ExecResult {
    fn from(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
            code: output.status.code(),
            timed_out: false,
        }
    }
}

/// A fully-specified subprocess invocation, as produced by the command
/// builder (C6).
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Program name (the isolated-runner tool, or the plain shell).
    pub program: String,
    /// Argument vector.
    pub args: Vec<String>,
    /// Child environment (already merged with the effective task env).
    pub env: HashMap<String, String>,
    /// Working directory, if any.
    pub cwd: Option<std::path::PathBuf>,
    /// Optional timeout in seconds.
    pub timeout: Option<u64>,
}

/// Trait for executing system commands, enabling test injection.
///
/// Implement this trait to provide mock executors for unit tests. The
/// [`SystemExecutor`] implementation delegates to real subprocess spawning.
pub trait Executor: std::fmt::Debug + Send + Sync {
    /// Run an [`Invocation`] to completion, honoring its timeout if set.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    fn run(&self, invocation: &Invocation) -> Result<ExecResult>;

    /// Run a short-lived hook command (no timeout, no captured output beyond
    /// what the caller wants) with the given environment and working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    fn run_hook(
        &self,
        script: &Path,
        cwd: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<ExecResult>;

    /// Check whether a program is available on `PATH`.
    fn which(&self, program: &str) -> bool;
}

/// The real system executor that delegates to process spawning.
#[derive(Debug)]
pub struct SystemExecutor;

impl SystemExecutor {
    fn build_command(invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        for (k, v) in &invocation.env {
            cmd.env(k, v);
        }
        if let Some(cwd) = &invocation.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        // On Unix, make the child its own process group leader so the whole
        // tree it spawns (shell pipelines, grandchildren) can be reached by a
        // single signal on timeout instead of leaking past it.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            cmd.process_group(0);
        }
        cmd
    }
}

/// Terminate `child` and, on Unix, every process in its group.
///
/// Pairs with `build_command`'s `process_group(0)`: the child is its own
/// group leader, so signaling `-pid` reaches descendants a plain
/// `child.kill()` would leave running past the timeout.
#[cfg(unix)]
#[allow(unsafe_code)]
fn kill_process_tree(child: &mut std::process::Child) {
    #[allow(clippy::cast_possible_wrap)]
    let pgid = child.id() as libc::pid_t;
    // SAFETY: `pgid` names a process group this process created via
    // `process_group(0)` at spawn time; signaling it affects only that
    // child and its descendants, never an unrelated process.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
    child.kill().ok();
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut std::process::Child) {
    child.kill().ok();
}

impl Executor for SystemExecutor {
    fn run(&self, invocation: &Invocation) -> Result<ExecResult> {
        let mut cmd = Self::build_command(invocation);
        let Some(seconds) = invocation.timeout else {
            let output = cmd
                .output()
                .with_context(|| format!("failed to execute: {}", invocation.program))?;
            return Ok(ExecResult::from(output));
        };

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn: {}", invocation.program))?;

        let (stdout_tx, stdout_rx) = mpsc::channel();
        let (stderr_tx, stderr_rx) = mpsc::channel();
        if let Some(mut h) = child.stdout.take() {
            std::thread::spawn(move || {
                use std::io::Read as _;
                let mut buf = String::new();
                h.read_to_string(&mut buf).ok();
                stdout_tx.send(buf).ok();
            });
        } else {
            stdout_tx.send(String::new()).ok();
        }
        if let Some(mut h) = child.stderr.take() {
            std::thread::spawn(move || {
                use std::io::Read as _;
                let mut buf = String::new();
                h.read_to_string(&mut buf).ok();
                stderr_tx.send(buf).ok();
            });
        } else {
            stderr_tx.send(String::new()).ok();
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(seconds);
        let status = loop {
            if let Some(status) = child.try_wait().with_context(|| "polling child status")? {
                break Some(status);
            }
            if std::time::Instant::now() >= deadline {
                break None;
            }
            std::thread::sleep(Duration::from_millis(50));
        };

        let Some(status) = status else {
            kill_process_tree(&mut child);
            child.wait().ok();
            return Ok(ExecResult {
                stdout: String::new(),
                stderr: String::new(),
                success: false,
                code: Some(TIMEOUT_EXIT_CODE),
                timed_out: true,
            });
        };

        let stdout = stdout_rx.recv_timeout(Duration::from_secs(5)).unwrap_or_default();
        let stderr = stderr_rx.recv_timeout(Duration::from_secs(5)).unwrap_or_default();
        Ok(ExecResult {
            stdout,
            stderr,
            success: status.success(),
            code: status.code(),
            timed_out: false,
        })
    }

    fn run_hook(
        &self,
        script: &Path,
        cwd: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<ExecResult> {
        let mut cmd = Command::new(script);
        for (k, v) in env {
            cmd.env(k, v);
        }
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        let output = cmd
            .output()
            .with_context(|| format!("failed to execute hook: {}", script.display()))?;
        Ok(ExecResult::from(output))
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}
