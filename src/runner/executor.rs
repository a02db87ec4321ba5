//! Shell command execution with hard timeouts.
//!
//! Used both to invoke agents and to run validation commands. A timeout is
//! a regular outcome ([`ExecOutput::timed_out`]), never an error: the whole
//! process tree is killed and the caller gets a result back.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Exit code reported for timed-out or signal-killed commands.
pub const KILLED_EXIT_CODE: i32 = -1;

/// Captured result of one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock seconds, rounded to two decimals.
    pub duration_seconds: f64,
    pub timed_out: bool,
}

impl ExecOutput {
    /// Checks if the command completed with exit code 0.
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Failures that prevent a command from running at all.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Failed to spawn '{command}' in {cwd}: {source}")]
    Spawn {
        command: String,
        cwd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error while running command: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs `command` through the shell in `cwd`, killing it after `timeout`.
pub async fn execute(command: &str, cwd: &Path, timeout: Duration) -> Result<ExecOutput, ExecError> {
    let start = Instant::now();

    let mut cmd = shell_command(command);
    cmd.current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group so a timeout can take down every descendant.
    #[cfg(unix)]
    cmd.process_group(0);

    debug!("Executing in {}: {}", cwd.display(), command);

    let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
        command: command.to_string(),
        cwd: cwd.display().to_string(),
        source,
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let collect = async {
        tokio::try_join!(child.wait(), read_pipe(stdout), read_pipe(stderr))
    };
    let outcome = tokio::time::timeout(timeout, collect).await;

    match outcome {
        Ok(Ok((status, stdout, stderr))) => {
            let exit_code = exit_code(status);
            debug!("Command exited with code {}", exit_code);
            Ok(ExecOutput {
                exit_code,
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                duration_seconds: round_seconds(start.elapsed()),
                timed_out: false,
            })
        }
        Ok(Err(e)) => {
            kill_tree(&mut child).await;
            Err(ExecError::Io(e))
        }
        Err(_) => {
            kill_tree(&mut child).await;
            warn!("Command timed out after {}s: {}", timeout.as_secs(), command);
            Ok(ExecOutput {
                exit_code: KILLED_EXIT_CODE,
                stdout: String::new(),
                stderr: timeout_message(timeout),
                duration_seconds: round_seconds(start.elapsed()),
                timed_out: true,
            })
        }
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// SIGKILLs the child's process group, then the child itself, and reaps it.
async fn kill_tree(child: &mut Child) {
    if let Some(pid) = child.id() {
        kill_group(pid);
    }

    if let Err(e) = child.kill().await {
        debug!("Failed to kill child process: {}", e);
    }
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        debug!("killpg({}) failed: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(KILLED_EXIT_CODE)
}

fn timeout_message(timeout: Duration) -> String {
    format!("Command timed out after {}s", timeout.as_secs())
}

/// Rounds an elapsed duration to seconds with two decimals.
pub fn round_seconds(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}
