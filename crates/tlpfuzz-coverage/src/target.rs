//! Instrumented target process lifecycle.
//!
//! Spawning is followed by a bounded readiness wait: a [`ReadinessProbe`] is
//! polled until it succeeds, the target exits, the deadline passes or the
//! wait is cancelled. Shutdown is SIGTERM, a bounded wait, SIGKILL and a
//! second bounded wait.

use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{CoverageError, Result};
use crate::sys;

const EXIT_POLL: Duration = Duration::from_millis(20);

// ============================================================================
// Readiness
// ============================================================================

/// A lightweight health check polled while the target warms up.
pub trait ReadinessProbe {
    /// Returns true once the target accepts work.
    fn probe(&mut self) -> bool;

    fn name(&self) -> &'static str;
}

/// Ready once a TCP connection to the target's listen address succeeds.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: SocketAddr,
    connect_timeout: Duration,
}

impl TcpProbe {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_millis(200),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl ReadinessProbe for TcpProbe {
    fn probe(&mut self) -> bool {
        TcpStream::connect_timeout(&self.addr, self.connect_timeout).is_ok()
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

/// Ready once the target has stayed alive for a settle period.
///
/// Used when the target exposes no address to connect to; the wait loop
/// itself detects an early exit.
#[derive(Debug, Clone)]
pub struct AliveProbe {
    settle: Duration,
    started: Option<Instant>,
}

impl AliveProbe {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            started: None,
        }
    }
}

impl ReadinessProbe for AliveProbe {
    fn probe(&mut self) -> bool {
        let started = *self.started.get_or_insert_with(Instant::now);
        started.elapsed() >= self.settle
    }

    fn name(&self) -> &'static str {
        "alive"
    }
}

/// Cooperative cancellation flag shared with whoever may abort a wait.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Deadline and poll interval of the readiness wait.
#[derive(Debug, Clone, Copy)]
pub struct WarmupPolicy {
    pub deadline: Duration,
    pub poll_interval: Duration,
}

impl Default for WarmupPolicy {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
        }
    }
}

// ============================================================================
// Target command + process
// ============================================================================

/// What to launch.
#[derive(Debug, Clone)]
pub struct TargetCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Inherit stdout/stderr instead of discarding them.
    pub inherit_output: bool,
}

impl TargetCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            inherit_output: false,
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// A running target. Terminated on drop if still alive.
#[derive(Debug)]
pub struct TargetProcess {
    child: Child,
    program: PathBuf,
    exited: Option<ExitStatus>,
}

impl TargetProcess {
    /// Launches `command` with `injected` variables added to its environment.
    pub fn spawn(command: &TargetCommand, injected: &[(String, String)]) -> Result<Self> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .envs(injected.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null());
        if !command.inherit_output {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let child = cmd.spawn().map_err(|source| CoverageError::Spawn {
            path: command.program.clone(),
            source,
        })?;
        info!(pid = child.id(), program = %command.program.display(), "spawned target");

        Ok(Self {
            child,
            program: command.program.clone(),
            exited: None,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Non-blocking liveness check.
    pub fn is_alive(&mut self) -> bool {
        self.poll_exit().is_none()
    }

    fn poll_exit(&mut self) -> Option<ExitStatus> {
        if self.exited.is_none() {
            match self.child.try_wait() {
                Ok(status) => self.exited = status,
                Err(e) => warn!(pid = self.pid(), error = %e, "try_wait failed"),
            }
        }
        self.exited
    }

    /// Polls `probe` until ready, exit, deadline or cancellation.
    pub fn wait_ready(
        &mut self,
        probe: &mut dyn ReadinessProbe,
        policy: WarmupPolicy,
        cancel: &CancelToken,
    ) -> Result<()> {
        let deadline = Instant::now() + policy.deadline;
        loop {
            if cancel.is_cancelled() {
                return Err(CoverageError::Cancelled);
            }
            if let Some(status) = self.poll_exit() {
                return Err(CoverageError::TargetExited {
                    status: status.to_string(),
                });
            }
            if probe.probe() {
                debug!(pid = self.pid(), probe = probe.name(), "target ready");
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(CoverageError::ReadinessTimeout(policy.deadline));
            }
            thread::sleep(policy.poll_interval.min(deadline - now));
        }
    }

    fn wait_exit(&mut self, timeout: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.poll_exit() {
                return Some(status);
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(EXIT_POLL);
        }
    }

    /// Graceful then forced shutdown. Returns the exit status if the target
    /// went away within the two bounded waits.
    pub fn terminate(&mut self, grace: Duration) -> Option<ExitStatus> {
        if let Some(status) = self.poll_exit() {
            return Some(status);
        }

        let pid = self.pid();
        if let Err(e) = sys::send_sigterm(pid) {
            warn!(pid, error = %e, "SIGTERM failed");
        }
        if let Some(status) = self.wait_exit(grace) {
            info!(pid, %status, "target stopped");
            return Some(status);
        }

        warn!(pid, ?grace, "target ignored SIGTERM, killing");
        if let Err(e) = self.child.kill() {
            warn!(pid, error = %e, "SIGKILL failed");
        }
        let status = self.wait_exit(grace);
        if status.is_none() {
            warn!(pid, "target still running after SIGKILL");
        }
        status
    }
}

impl Drop for TargetProcess {
    fn drop(&mut self) {
        if self.exited.is_none() {
            self.terminate(Duration::from_secs(3));
        }
    }
}
