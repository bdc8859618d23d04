//! Child process execution with timeout enforcement
//!
//! Commands run through `sh -c` in their own process group so that a
//! timeout kills everything the command started, not just the shell.
//! Output is collected incrementally; whatever was captured before a kill
//! is kept.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::constants::OUTPUT_DRAIN_GRACE_MS;

/// How stderr is captured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// stderr is redirected into stdout, preserving interleaving
    Combined,
    /// stdout and stderr are captured separately
    Separate,
}

/// Captured result of a shell command
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    /// Always empty in `StreamMode::Combined`
    pub stderr: Vec<u8>,
    /// None when the command was killed on timeout
    pub status: Option<ExitStatus>,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.status.is_some_and(|s| s.success())
    }
}

/// Run `command` with `sh -c` in `cwd`, killing it after `limit`.
///
/// Returns `Err` only when the process cannot be spawned or waited on;
/// a timeout is reported through `ProcessOutput::timed_out`.
pub async fn run_shell(
    command: &str,
    cwd: &Path,
    limit: Duration,
    mode: StreamMode,
) -> std::io::Result<ProcessOutput> {
    let script = match mode {
        StreamMode::Combined => format!("exec 2>&1\n{}", command),
        StreamMode::Separate => command.to_string(),
    };

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&script)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(match mode {
            StreamMode::Combined => Stdio::null(),
            StreamMode::Separate => Stdio::piped(),
        })
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn()?;
    let pid = child.id();
    let stdout = Capture::start(child.stdout.take());
    let stderr = Capture::start(child.stderr.take());

    let (status, timed_out) = match timeout(limit, child.wait()).await {
        Ok(status) => (Some(status?), false),
        Err(_) => {
            tracing::debug!(
                pid = ?pid,
                limit_secs = limit.as_secs(),
                "Command exceeded its timeout, killing process group"
            );
            (None, true)
        }
    };

    // Anything the command left running goes too, on every exit path.
    terminate(&mut child, pid).await;

    let grace = Duration::from_millis(OUTPUT_DRAIN_GRACE_MS);
    Ok(ProcessOutput {
        stdout: stdout.finish(grace).await,
        stderr: stderr.finish(grace).await,
        status,
        timed_out,
    })
}

/// Kill the child's process group (unix) and reap the child.
///
/// `pid` is taken at spawn time because tokio forgets it once the child
/// has been waited on.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            if e != nix::errno::Errno::ESRCH {
                tracing::warn!(pid, error = %e, "Failed to kill process group");
            }
        }
    }

    if let Err(e) = child.kill().await {
        tracing::trace!(error = %e, "Child already exited");
    }
}

/// Background reader that keeps every byte it has seen, even if aborted.
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl Capture {
    fn start<R>(reader: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = reader.map(|mut reader| {
            let buffer = buffer.clone();
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match reader.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buffer
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });
        Self { buffer, task }
    }

    async fn finish(self, grace: Duration) -> Vec<u8> {
        if let Some(mut task) = self.task {
            if timeout(grace, &mut task).await.is_err() {
                task.abort();
            }
        }
        std::mem::take(
            &mut *self
                .buffer
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}
