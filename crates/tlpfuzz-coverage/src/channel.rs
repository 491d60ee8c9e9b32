//! The coverage channel: one shared segment plus the target writing into it.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{error, info};

use crate::error::{CoverageError, Result};
use crate::map::{CoverageMap, CoverageSummary, EdgeHits};
use crate::sys::SharedSegment;
use crate::target::{CancelToken, ReadinessProbe, TargetCommand, TargetProcess, WarmupPolicy};

/// Environment variable carrying the segment id to the target.
pub const SHM_ENV_VAR: &str = "__AFL_SHM_ID";
/// Environment variable carrying the map size to the target.
pub const MAP_SIZE_ENV_VAR: &str = "AFL_MAP_SIZE";
pub const DEFAULT_MAP_SIZE: usize = 65_536;

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub map_size: usize,
    /// Extra variables injected into the target besides the AFL ones.
    pub extra_env: Vec<(String, String)>,
    pub warmup: WarmupPolicy,
    /// Bound on each of the two shutdown waits.
    pub shutdown_grace: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            map_size: DEFAULT_MAP_SIZE,
            extra_env: vec![("AFL_IGNORE_PROBLEMS".to_string(), "1".to_string())],
            warmup: WarmupPolicy::default(),
            shutdown_grace: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Default)]
struct Resources {
    segment: Option<SharedSegment>,
    target: Option<TargetProcess>,
}

/// Shared-memory coverage feedback from an instrumented target.
///
/// `refresh()` copies the live map into a local buffer without blocking the
/// target. Clearing is never automatic. `close()` may be called any number
/// of times from any thread; it also runs on drop.
#[derive(Debug)]
pub struct CoverageChannel {
    options: ChannelOptions,
    shm_id: i32,
    local: CoverageMap,
    resources: Mutex<Resources>,
    closed: AtomicBool,
}

impl CoverageChannel {
    /// Allocates, attaches and zeroes a segment of `options.map_size` bytes.
    pub fn create(options: ChannelOptions) -> Result<Self> {
        let segment = SharedSegment::create(options.map_size)?;
        let shm_id = segment.id();
        info!(shm_id, map_size = options.map_size, "coverage channel created");

        Ok(Self {
            local: CoverageMap::new(options.map_size),
            shm_id,
            options,
            resources: Mutex::new(Resources {
                segment: Some(segment),
                target: None,
            }),
            closed: AtomicBool::new(false),
        })
    }

    pub fn shm_id(&self) -> i32 {
        self.shm_id
    }

    pub fn map_size(&self) -> usize {
        self.options.map_size
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Resources> {
        self.resources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Variables the target needs to find the segment.
    pub fn target_env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            (SHM_ENV_VAR.to_string(), self.shm_id.to_string()),
            (MAP_SIZE_ENV_VAR.to_string(), self.options.map_size.to_string()),
        ];
        env.extend(self.options.extra_env.iter().cloned());
        env
    }

    /// Launches the target attached to this channel and waits until it is
    /// ready. On failure the target is terminated and the channel stays
    /// usable for another attempt.
    pub fn spawn(
        &mut self,
        command: &TargetCommand,
        probe: &mut dyn ReadinessProbe,
        cancel: &CancelToken,
    ) -> Result<u32> {
        if self.is_closed() {
            return Err(CoverageError::Closed);
        }
        let env = self.target_env();
        let warmup = self.options.warmup;
        let grace = self.options.shutdown_grace;

        let mut resources = self.lock();
        if let Some(target) = resources.target.as_mut() {
            if target.is_alive() {
                return Err(CoverageError::TargetAlreadySpawned { pid: target.pid() });
            }
        }

        let mut target = TargetProcess::spawn(command, &env)?;
        if let Err(e) = target.wait_ready(probe, warmup, cancel) {
            error!(pid = target.pid(), error = %e, "target failed to become ready");
            target.terminate(grace);
            return Err(e);
        }

        let pid = target.pid();
        resources.target = Some(target);
        Ok(pid)
    }

    pub fn target_pid(&self) -> Option<u32> {
        self.lock().target.as_ref().map(TargetProcess::pid)
    }

    pub fn target_alive(&self) -> bool {
        self.lock().target.as_mut().is_some_and(TargetProcess::is_alive)
    }

    /// Copies the live segment into the local buffer. Never blocks on the target.
    pub fn refresh(&mut self) -> Result<&CoverageMap> {
        {
            let resources = self.resources.lock().unwrap_or_else(PoisonError::into_inner);
            let segment = resources.segment.as_ref().ok_or(CoverageError::Closed)?;
            segment.read_into(self.local.as_mut_slice());
        }
        Ok(&self.local)
    }

    /// Zeroes the live segment and the local buffer.
    pub fn clear(&mut self) -> Result<()> {
        {
            let resources = self.resources.lock().unwrap_or_else(PoisonError::into_inner);
            let segment = resources.segment.as_ref().ok_or(CoverageError::Closed)?;
            segment.zero();
        }
        self.local.zero();
        Ok(())
    }

    /// The last refreshed snapshot.
    pub fn snapshot(&self) -> &CoverageMap {
        &self.local
    }

    pub fn summary(&self) -> CoverageSummary {
        self.local.summary()
    }

    pub fn top_edges(&self, n: usize) -> Vec<EdgeHits> {
        self.local.top_edges(n)
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        self.local.save_snapshot(path)?;
        info!(path = %path.display(), bytes = self.local.len(), "saved coverage snapshot");
        Ok(())
    }

    /// Stops the target and releases the segment. Only the first call does
    /// any work.
    pub fn close(&self) -> Result<()> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        let mut resources = self.lock();
        if let Some(mut target) = resources.target.take() {
            target.terminate(self.options.shutdown_grace);
        }
        let released = match resources.segment.take() {
            Some(mut segment) => segment.release(),
            None => Ok(()),
        };
        info!(shm_id = self.shm_id, "coverage channel closed");
        released
    }
}

impl Drop for CoverageChannel {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(shm_id = self.shm_id, error = %e, "failed to close coverage channel");
        }
    }
}
