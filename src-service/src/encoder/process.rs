//! Supervised encoder processes.
//!
//! Every encoder runs as the leader of its own process group so that signals
//! reach helper children (the `nice` wrapper, shell wrappers) as well.

use crate::error::LaunchError;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Number of stderr lines kept for error reporting.
const STDERR_TAIL_LINES: usize = 20;

/// How long to wait for stderr to drain after the process has exited.
/// A grandchild that inherited the pipe can keep it open indefinitely.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Process group of a running encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGroup {
    pid: u32,
}

impl ProcessGroup {
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }

    /// Pid of the group leader (equal to the group id).
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Ask the whole group to finish (SIGINT). Encoders finalize their
    /// container on this signal.
    #[cfg(unix)]
    pub fn interrupt(&self) -> io::Result<()> {
        self.signal(libc::SIGINT)
    }

    /// Kill the whole group (SIGTERM).
    #[cfg(unix)]
    pub fn terminate(&self) -> io::Result<()> {
        self.signal(libc::SIGTERM)
    }

    #[cfg(unix)]
    fn signal(&self, signal: libc::c_int) -> io::Result<()> {
        let pgid = libc::pid_t::try_from(self.pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        // SAFETY: killpg only takes plain integers.
        let rc = unsafe { libc::killpg(pgid, signal) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            // Group already gone
            return Ok(());
        }
        Err(err)
    }

    #[cfg(not(unix))]
    pub fn interrupt(&self) -> io::Result<()> {
        self.taskkill(false)
    }

    #[cfg(not(unix))]
    pub fn terminate(&self) -> io::Result<()> {
        self.taskkill(true)
    }

    #[cfg(not(unix))]
    fn taskkill(&self, force: bool) -> io::Result<()> {
        let mut command = std::process::Command::new("taskkill");
        command.args(["/PID", &self.pid.to_string(), "/T"]);
        if force {
            command.arg("/F");
        }
        command
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|_| ())
    }
}

/// How an encoder process ended.
#[derive(Debug, Clone)]
pub struct EncoderExit {
    pub status: Option<ExitStatus>,
    /// Wait failure, or the tail of stderr when the process did not succeed
    pub error: Option<String>,
}

impl EncoderExit {
    pub fn success(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }

    /// One-line description used in logs and error messages.
    pub fn describe(&self) -> String {
        let status = match self.status {
            Some(status) => status.to_string(),
            None => "unknown status".to_string(),
        };
        match self.error.as_deref().and_then(|e| e.lines().last()) {
            Some(last) if !last.trim().is_empty() => format!("{status}: {}", last.trim()),
            _ => status,
        }
    }
}

/// Handle to a running encoder.
///
/// The process is reaped by a background task; [`EncoderHandle::wait`]
/// resolves once it has exited.
#[derive(Debug)]
pub struct EncoderHandle {
    group: ProcessGroup,
    output: PathBuf,
    exited: oneshot::Receiver<EncoderExit>,
}

impl EncoderHandle {
    /// Spawn `command` writing to `output` as a new process group leader.
    pub fn spawn(mut command: Command, program: &str, output: &Path) -> Result<Self, LaunchError> {
        #[cfg(unix)]
        command.process_group(0);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                LaunchError::BinaryNotFound(program.to_string())
            } else {
                LaunchError::Spawn {
                    program: program.to_string(),
                    source: Arc::new(e),
                }
            }
        })?;

        let pid = child.id().ok_or_else(|| LaunchError::Spawn {
            program: program.to_string(),
            source: Arc::new(io::Error::other("process exited before it could be tracked")),
        })?;
        debug!("Started {} (pid {}) -> {}", program, pid, output.display());

        let (exit_tx, exit_rx) = oneshot::channel();
        let stderr = child.stderr.take();
        tokio::spawn(async move {
            let tail = stderr.map(|stderr| tokio::spawn(collect_stderr(stderr, pid)));
            let status = child.wait().await;
            let diagnostic = match tail {
                Some(task) => match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, task).await {
                    Ok(Ok(lines)) => lines,
                    _ => String::new(),
                },
                None => String::new(),
            };

            let exit = match status {
                Ok(status) if status.success() => EncoderExit {
                    status: Some(status),
                    error: None,
                },
                Ok(status) => EncoderExit {
                    status: Some(status),
                    error: (!diagnostic.is_empty()).then_some(diagnostic),
                },
                Err(e) => {
                    warn!("Failed to wait for encoder (pid {}): {}", pid, e);
                    EncoderExit {
                        status: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            let _ = exit_tx.send(exit);
        });

        Ok(Self {
            group: ProcessGroup::new(pid),
            output: output.to_path_buf(),
            exited: exit_rx,
        })
    }

    pub fn pid(&self) -> u32 {
        self.group.pid()
    }

    pub fn process_group(&self) -> ProcessGroup {
        self.group
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Graceful stop: SIGINT to the group.
    pub fn request_graceful_stop(&self) -> io::Result<()> {
        self.group.interrupt()
    }

    /// Forceful stop: SIGTERM to the group.
    pub fn force_stop(&self) -> io::Result<()> {
        self.group.terminate()
    }

    /// Wait for the process to exit.
    pub async fn wait(self) -> EncoderExit {
        self.exited.await.unwrap_or_else(|_| EncoderExit {
            status: None,
            error: Some("encoder supervisor task ended".to_string()),
        })
    }
}

async fn collect_stderr(stderr: ChildStderr, pid: u32) -> String {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "encoder", pid, "{}", line);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}
