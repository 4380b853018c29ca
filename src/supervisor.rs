//! Lifecycle supervision of the documentation-service child process
//!
//! The gateway owns exactly one inner process. It is created at startup,
//! its stdout/stderr are piped line-for-line into the gateway's own log
//! stream, its exit code is recorded when it dies, and it is terminated
//! before the gateway itself exits so no orphan survives.

use crate::config::DocsConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// Interval for polling the child's exit status (in milliseconds)
const EXIT_POLL_INTERVAL_MS: u64 = 100;
/// Interval for polling during the shutdown grace period (in milliseconds)
const STOP_POLL_INTERVAL_MS: u64 = 25;

/// State of the supervised service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Process has been spawned but not yet observed alive
    Starting,
    /// Process is running
    Running,
    /// Process has exited; the code is None when it was killed by a signal
    Exited(Option<i32>),
}

/// Result of a non-blocking exit poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPoll {
    Running,
    Exited(Option<i32>),
}

/// Handle to the inner process. The supervisor only ever talks to the child
/// through this trait, so shutdown behavior is testable with a fake handle.
pub trait InnerHandle: Send + 'static {
    /// OS process id, when still known
    fn id(&self) -> Option<u32>;
    /// Polite stop request (SIGTERM on unix)
    fn terminate(&mut self);
    /// Forceful stop (SIGKILL)
    fn kill(&mut self);
    /// Non-blocking exit check
    fn poll_exit(&mut self) -> std::io::Result<ExitPoll>;
}

/// Real child process spawned by the gateway
pub struct SpawnedProcess {
    child: Child,
}

impl InnerHandle for SpawnedProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn terminate(&mut self) {
        // SIGTERM on unix so the child can shut down cleanly; elsewhere the
        // only stop primitive is a hard kill
        if let Some(pid) = self.child.id() {
            #[cfg(unix)]
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }

            #[cfg(not(unix))]
            {
                let _ = pid;
                let _ = self.child.start_kill();
            }
        }
    }

    fn kill(&mut self) {
        let _ = self.child.start_kill();
    }

    fn poll_exit(&mut self) -> std::io::Result<ExitPoll> {
        Ok(match self.child.try_wait()? {
            Some(status) => ExitPoll::Exited(status.code()),
            None => ExitPoll::Running,
        })
    }
}

/// Spawn the documentation service from its configuration
pub fn spawn_docs_service(config: &DocsConfig) -> anyhow::Result<Box<dyn InnerHandle>> {
    let (program, args) = config.command_line()?;
    spawn_command(&program, &args, &config.env, config.port)
}

/// Spawn a child with piped stdio and start pumping its output into our logs
pub fn spawn_command(
    program: &str,
    args: &[String],
    env: &HashMap<String, String>,
    port: u16,
) -> anyhow::Result<Box<dyn InnerHandle>> {
    info!(command = %program, port, "Starting documentation service");

    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    // The gateway's environment is inherited; config adds on top of it
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.env("DOCS_PORT", port.to_string());

    let mut child = cmd
        .spawn()
        .map_err(|e| anyhow::anyhow!("Failed to spawn '{}': {}", program, e))?;
    let pid = child.id().unwrap_or(0);
    info!(pid, "Documentation service process spawned");

    // Relay child output line for line, as received
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump_lines(stdout, false));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump_lines(stderr, true));
    }

    Ok(Box::new(SpawnedProcess { child }))
}

async fn pump_lines<R>(reader: R, is_stderr: bool)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            warn!(target: "fleetdocs", "{}", line);
        } else {
            info!(target: "fleetdocs", "{}", line);
        }
    }
}

struct SupervisorInner {
    handle: Option<Box<dyn InnerHandle>>,
    state: ServiceState,
    term_sent: bool,
    kill_sent: bool,
}

/// Owner of the single inner-process handle.
///
/// Created once at gateway startup via [`start`](Supervisor::start); the
/// returned `Arc` is shared with the request path (for state inspection)
/// and the shutdown path (for [`stop`](Supervisor::stop)).
pub struct Supervisor {
    inner: Mutex<SupervisorInner>,
    grace_period: Duration,
}

impl Supervisor {
    /// Take ownership of a spawned handle and start the exit monitor
    pub fn start(handle: Box<dyn InnerHandle>, grace_period: Duration) -> Arc<Self> {
        let supervisor = Arc::new(Self {
            inner: Mutex::new(SupervisorInner {
                handle: Some(handle),
                state: ServiceState::Starting,
                term_sent: false,
                kill_sent: false,
            }),
            grace_period,
        });

        let monitor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            monitor.monitor_exit().await;
        });

        supervisor
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServiceState {
        self.inner.lock().state
    }

    /// Poll the handle once; transitions to Exited when the child is gone.
    /// Returns the exit code once known.
    fn poll_exit_once(&self) -> Option<Option<i32>> {
        let mut guard = self.inner.lock();
        if let ServiceState::Exited(code) = guard.state {
            return Some(code);
        }

        let exited = match guard.handle.as_mut() {
            Some(handle) => match handle.poll_exit() {
                Ok(ExitPoll::Exited(code)) => Some(code),
                Ok(ExitPoll::Running) => None,
                Err(e) => {
                    warn!(error = %e, "Failed to poll documentation service, assuming it exited");
                    Some(None)
                }
            },
            None => Some(None),
        };

        if let Some(code) = exited {
            guard.state = ServiceState::Exited(code);
        } else if guard.state == ServiceState::Starting {
            guard.state = ServiceState::Running;
        }

        exited
    }

    /// Watch for the child dying on its own. A non-zero or unexpected exit
    /// is a reported condition, not fatal to the gateway: static traffic
    /// keeps being served, proxied calls start failing with 500s.
    async fn monitor_exit(self: Arc<Self>) {
        loop {
            if let Some(code) = self.poll_exit_once() {
                match code {
                    Some(0) => info!(code = 0, "Documentation service exited"),
                    Some(code) => {
                        warn!(code, "Documentation service exited with non-zero status")
                    }
                    None => warn!("Documentation service was terminated by a signal"),
                }
                return;
            }
            tokio::time::sleep(Duration::from_millis(EXIT_POLL_INTERVAL_MS)).await;
        }
    }

    /// Stop the child: terminate once, wait up to the grace period, then
    /// force-kill. Idempotent; concurrent or repeated calls never signal the
    /// process twice.
    pub async fn stop(&self) {
        {
            let mut guard = self.inner.lock();
            if matches!(guard.state, ServiceState::Exited(_)) {
                return;
            }
            if !guard.term_sent {
                guard.term_sent = true;
                if let Some(handle) = guard.handle.as_mut() {
                    let pid = handle.id().unwrap_or(0);
                    info!(pid, "Sending SIGTERM to documentation service");
                    handle.terminate();
                }
            }
        }

        let deadline = Instant::now() + self.grace_period;
        loop {
            if self.poll_exit_once().is_some() {
                info!("Documentation service stopped");
                return;
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(STOP_POLL_INTERVAL_MS)).await;
        }

        {
            let mut guard = self.inner.lock();
            if !guard.kill_sent {
                guard.kill_sent = true;
                warn!(
                    grace_period_secs = self.grace_period.as_secs(),
                    "Grace period exceeded, killing documentation service"
                );
                if let Some(handle) = guard.handle.as_mut() {
                    handle.kill();
                }
            }
        }

        // Give the kill a moment to be reaped so the exit is recorded
        for _ in 0..10 {
            if self.poll_exit_once().is_some() {
                info!("Documentation service stopped");
                return;
            }
            tokio::time::sleep(Duration::from_millis(STOP_POLL_INTERVAL_MS)).await;
        }
        warn!("Documentation service did not confirm exit after kill");
    }
}
