//! Lifecycle of a tool server child process.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;

use super::client::Transport;
use super::{McpError, StartupFailure};
use crate::config::ServerConfig;

/// How long to wait for stderr of a process that died during startup
const STDERR_COLLECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle state of a [`ProcessSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// One external tool server process and its stdio streams.
///
/// The process is spawned with `kill_on_drop`, so dropping the session never
/// leaks a child.
#[derive(Debug)]
pub struct ProcessSession {
    config: ServerConfig,
    state: SessionState,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<BufReader<ChildStdout>>,
    stderr_drain: Option<JoinHandle<()>>,
    broken: bool,
}

impl ProcessSession {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: SessionState::Stopped,
            child: None,
            stdin: None,
            stdout: None,
            stderr_drain: None,
            broken: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// OS process id of the running server
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Spawn the server and wait out the startup grace period.
    ///
    /// Does nothing if a healthy server is already running. A running session
    /// whose process died or whose wire is broken is restarted.
    pub async fn start(&mut self) -> Result<(), McpError> {
        if self.state == SessionState::Running {
            if !self.broken && self.child_alive() {
                tracing::debug!("MCP server process is already running");
                return Ok(());
            }
            tracing::warn!("MCP server session is unhealthy; restarting it");
            self.stop().await;
        }

        let argv = command_line(&self.config)?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| StartupFailure::InvalidCommand("empty command".to_string()))?;

        tracing::info!("Starting MCP server with command: {:?}", argv);
        self.state = SessionState::Starting;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.state = SessionState::Stopped;
                let failure = if e.kind() == std::io::ErrorKind::NotFound {
                    StartupFailure::CommandNotFound {
                        command: program.clone(),
                    }
                } else {
                    StartupFailure::Spawn {
                        command: program.clone(),
                        source: e,
                    }
                };
                return Err(failure.into());
            }
        };

        tokio::time::sleep(self.config.startup_grace()).await;

        match child.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => {
                let stderr = collect_stderr(&mut child).await;
                self.state = SessionState::Stopped;
                return Err(StartupFailure::ExitedEarly {
                    exit_code: status.code(),
                    stderr,
                }
                .into());
            }
            Err(e) => {
                let _ = child.start_kill();
                self.state = SessionState::Stopped;
                return Err(McpError::Io(e));
            }
        }

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.start_kill();
            self.state = SessionState::Stopped;
            return Err(McpError::Protocol(
                "child process stdio was not captured".to_string(),
            ));
        };
        self.stderr_drain = child.stderr.take().map(|stderr| tokio::spawn(drain_stderr(stderr)));
        self.stdin = Some(stdin);
        self.stdout = Some(BufReader::new(stdout));
        self.child = Some(child);
        self.broken = false;
        self.state = SessionState::Running;

        tracing::info!("MCP server started successfully (pid {:?})", self.pid());
        Ok(())
    }

    /// Stop the server: close its stdin, send SIGTERM if it is still up
    /// halfway through the shutdown timeout, then kill it once the timeout
    /// runs out. Always ends in [`SessionState::Stopped`].
    pub async fn stop(&mut self) {
        if self.state == SessionState::Stopped && self.child.is_none() {
            return;
        }
        self.state = SessionState::Stopping;
        tracing::info!("Stopping MCP server process");

        // EOF on stdin is the shutdown signal for stdio servers
        self.stdin.take();
        self.stdout.take();

        if let Some(mut child) = self.child.take() {
            let timeout = self.config.shutdown_timeout();
            let eof_wait = timeout / 2;

            let mut status = wait_for_exit(&mut child, eof_wait).await;
            if status.is_none() {
                tracing::debug!("MCP server ignored EOF; sending SIGTERM");
                terminate(&child);
                status = wait_for_exit(&mut child, timeout - eof_wait).await;
            }

            match status {
                Some(status) => tracing::info!("MCP server stopped ({})", status),
                None => {
                    tracing::warn!("MCP server did not exit within {:?}; killing it", timeout);
                    if let Err(e) = child.kill().await {
                        tracing::warn!("Failed to kill MCP server: {}", e);
                    }
                }
            }
        }

        self.release();
    }

    /// Kill the child without waiting. Used where no async context is left.
    pub(crate) fn kill_now(&mut self) {
        self.stdin.take();
        self.stdout.take();
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                tracing::warn!("Failed to kill MCP server: {}", e);
            }
        }
        self.release();
    }

    fn release(&mut self) {
        if let Some(drain) = self.stderr_drain.take() {
            drain.abort();
        }
        self.broken = false;
        self.state = SessionState::Stopped;
    }

    fn child_alive(&mut self) -> bool {
        self.child
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }
}

impl Transport for ProcessSession {
    type Writer = ChildStdin;
    type Reader = BufReader<ChildStdout>;

    fn channel(&mut self) -> Result<(&mut ChildStdin, &mut BufReader<ChildStdout>), McpError> {
        if self.state != SessionState::Running {
            return Err(McpError::NotActive);
        }
        if self.broken {
            return Err(McpError::Broken);
        }
        match (self.stdin.as_mut(), self.stdout.as_mut()) {
            (Some(stdin), Some(stdout)) => Ok((stdin, stdout)),
            _ => Err(McpError::NotActive),
        }
    }

    fn mark_broken(&mut self) {
        self.broken = true;
    }
}

async fn wait_for_exit(child: &mut Child, limit: Duration) -> Option<ExitStatus> {
    match tokio::time::timeout(limit, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(e)) => {
            tracing::warn!("Failed to wait for MCP server exit: {}", e);
            None
        }
        Err(_) => None,
    }
}

#[cfg(unix)]
fn terminate(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        tracing::warn!("Failed to send SIGTERM to MCP server: {}", e);
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {}

/// Split the configured command line and append the configured arguments.
fn command_line(config: &ServerConfig) -> Result<Vec<String>, StartupFailure> {
    let mut argv = shell_words::split(&config.command)
        .map_err(|e| StartupFailure::InvalidCommand(format!("{}: {}", config.command, e)))?;
    if argv.is_empty() {
        return Err(StartupFailure::InvalidCommand("empty command".to_string()));
    }
    argv.extend(config.args.iter().cloned());
    if let Some(path) = &config.storage_path {
        argv.push("--storage-path".to_string());
        argv.push(path.display().to_string());
    }
    Ok(argv)
}

async fn collect_stderr(child: &mut Child) -> String {
    let Some(mut stderr) = child.stderr.take() else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = tokio::time::timeout(STDERR_COLLECT_TIMEOUT, stderr.read_to_end(&mut buf)).await;
    String::from_utf8_lossy(&buf).trim().to_string()
}

async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "summx::mcp::server", "{}", line);
    }
}
