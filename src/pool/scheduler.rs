//! Worker pool scheduler.
//!
//! `acquire()` hands out the endpoint of a Ready worker currently
//! reporting itself free, spawning up to the configured cap and waiting
//! (bounded) when everything is busy. All pool state lives behind one
//! mutex; busy probes run under it. That is acceptable here: probes carry
//! a one second deadline and the pool is operator-sized, typically single
//! digits.
//!
//! A worker observed free can still be taken by a concurrent caller
//! before the forwarded request lands. The worker's own `/isbusy` counter
//! is the truth; callers tolerate a conflict response from the worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::error::{DispatchError, Result};
use crate::pool::activity::ActivityClock;
use crate::pool::ports::{PortAllocator, PORT_RANGE_BASE, PORT_RANGE_LEN};
use crate::pool::probe::{BusyState, ProbeClient, PROBE_TIMEOUT};
use crate::pool::registry::Pool;
use crate::pool::spawn::spawn_worker;

/// Timing knobs for the pool.
///
/// Production runs the defaults; tests compress the budgets without
/// touching the algorithms.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Wall-clock budget for one `acquire()` call.
    pub acquire_timeout: Duration,
    /// Budget for a spawned worker to pass its readiness probe.
    pub ready_timeout: Duration,
    /// Sleep between acquire rounds and readiness polls.
    pub poll_interval: Duration,
    /// Deadline for each HTTP probe.
    pub probe_timeout: Duration,
    /// Period of the lifecycle controller.
    pub reap_interval: Duration,
    /// First worker port.
    pub port_base: u16,
    /// Number of candidate ports.
    pub port_count: u16,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(60),
            ready_timeout: Duration::from_secs(180),
            poll_interval: Duration::from_millis(500),
            probe_timeout: PROBE_TIMEOUT,
            reap_interval: Duration::from_secs(30),
            port_base: PORT_RANGE_BASE,
            port_count: PORT_RANGE_LEN,
        }
    }
}

/// Endpoint of an acquired worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEndpoint {
    pub host: String,
    pub port: u16,
}

impl WorkerEndpoint {
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Snapshot of pool membership for monitoring endpoints.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub alive: usize,
    pub ports: Vec<u16>,
}

/// The worker pool scheduler and lifecycle logic.
///
/// Owned by the application root; handlers receive an `Arc` and bridge
/// in via `spawn_blocking`. The lifecycle controller calls [`tick`] on
/// its timer thread.
///
/// [`tick`]: Scheduler::tick
pub struct Scheduler {
    service: ServiceConfig,
    config: PoolConfig,
    pool: Mutex<Pool>,
    probe: ProbeClient,
    ports: PortAllocator,
    activity: ActivityClock,
    /// Set once the first external request arrives; gates floor
    /// enforcement on pools that were never asked for anything.
    used: AtomicBool,
}

impl Scheduler {
    pub fn new(service: ServiceConfig, config: PoolConfig) -> Result<Self> {
        let probe = ProbeClient::new(config.probe_timeout)?;
        let ports = PortAllocator::new(config.port_base, config.port_count);
        Ok(Self {
            service,
            config,
            pool: Mutex::new(Pool::new()),
            probe,
            ports,
            activity: ActivityClock::new(),
            used: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Seconds since the most recent external request, -1 if none yet.
    pub fn idle_seconds(&self) -> i64 {
        self.activity.idle_seconds()
    }

    /// Acquire a Ready worker currently reporting itself free.
    ///
    /// Reaps and promotes, scans Ready workers in insertion order by
    /// their `/isbusy` probe, spawns below the cap, and otherwise waits,
    /// all within the acquire budget. Fails with `NoWorkerAvailable` when
    /// the budget runs out and with `ExecutableNotFound` when there is no
    /// worker binary to spawn.
    pub fn acquire(&self) -> Result<WorkerEndpoint> {
        self.activity.touch();
        self.used.store(true, Ordering::Relaxed);

        let deadline = Instant::now() + self.config.acquire_timeout;
        loop {
            {
                let mut pool = self.pool.lock().expect("pool mutex poisoned");
                pool.reap(self.config.ready_timeout);
                self.promote_starting(&mut pool);

                for worker in pool.ready_workers_mut() {
                    match self.probe.probe_busy(worker.port()) {
                        BusyState::Free => {
                            worker.mark_acquired();
                            let port = worker.port();
                            debug!(port, "acquired free worker");
                            return Ok(WorkerEndpoint {
                                host: "localhost".to_string(),
                                port,
                            });
                        }
                        BusyState::Busy => {}
                        BusyState::Unreachable => {
                            // Treated as busy for selection; the next
                            // reap pass kills it.
                            worker.mark_unresponsive();
                        }
                    }
                }

                if pool.alive_count() < self.service.spawn_count && !pool.has_starting() {
                    match self.launch(&mut pool) {
                        Ok(port) => debug!(port, "launched worker while acquiring"),
                        Err(e @ DispatchError::ExecutableNotFound { .. }) => return Err(e),
                        Err(e) => warn!(error = %e, "worker launch failed; will retry"),
                    }
                }
            }

            if Instant::now() >= deadline {
                warn!(
                    budget_secs = self.config.acquire_timeout.as_secs(),
                    "no worker available within the acquire budget"
                );
                return Err(DispatchError::NoWorkerAvailable);
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }

    /// Spawn one worker and block until it passes its readiness probe.
    ///
    /// Used at startup when `spawn_on_startup` is set. On timeout the
    /// subprocess is killed and the spawn slot released.
    pub fn seed_blocking(&self) -> Result<()> {
        let port = {
            let mut pool = self.pool.lock().expect("pool mutex poisoned");
            if pool.alive_count() >= self.service.spawn_count {
                return Ok(());
            }
            self.launch(&mut pool)?
        };

        info!(port, "waiting for startup worker to become ready");
        let deadline = Instant::now() + self.config.ready_timeout;
        loop {
            if self.probe.probe_ready(port) {
                let mut pool = self.pool.lock().expect("pool mutex poisoned");
                pool.promote(port);
                return Ok(());
            }

            {
                let mut pool = self.pool.lock().expect("pool mutex poisoned");
                if pool.worker_exited(port) {
                    pool.take(port);
                    return Err(DispatchError::Worker(format!(
                        "worker on port {} exited before becoming ready",
                        port
                    )));
                }
            }

            if Instant::now() >= deadline {
                let mut pool = self.pool.lock().expect("pool mutex poisoned");
                if let Some(mut worker) = pool.take(port) {
                    worker.kill();
                }
                return Err(DispatchError::SpawnTimeout {
                    port,
                    timeout_secs: self.config.ready_timeout.as_secs(),
                });
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }

    /// One lifecycle pass: reap, promote, enforce the cap, hold the
    /// floor. Runs on the controller's timer, independent of traffic.
    pub fn tick(&self) {
        let mut pool = self.pool.lock().expect("pool mutex poisoned");
        pool.reap(self.config.ready_timeout);
        self.promote_starting(&mut pool);

        while pool.alive_count() > self.service.spawn_count {
            pool.kill_newest();
        }

        // The floor is not enforced on a cold pool: a dispatcher that was
        // started but never asked for work should not launch workers.
        let floor_active = self.service.spawn_on_startup || self.used.load(Ordering::Relaxed);
        if floor_active {
            while pool.alive_count() < self.service.spawn_count && !pool.has_starting() {
                match self.launch(&mut pool) {
                    Ok(port) => info!(port, "respawned worker to hold the floor"),
                    Err(e) => {
                        warn!(error = %e, "floor respawn failed");
                        break;
                    }
                }
            }
        }
    }

    /// Pool membership snapshot for the monitoring endpoint.
    pub fn stats(&self) -> PoolStats {
        let pool = self.pool.lock().expect("pool mutex poisoned");
        PoolStats {
            alive: pool.alive_count(),
            ports: pool.ports(),
        }
    }

    /// Kill every worker. Called on dispatcher shutdown.
    pub fn shutdown(&self) {
        let mut pool = self.pool.lock().expect("pool mutex poisoned");
        pool.kill_all();
    }

    /// Allocate a port and launch a worker, registering it as Starting.
    fn launch(&self, pool: &mut Pool) -> Result<u16> {
        let port = self.ports.next_free(&pool.claimed_ports())?;
        let worker = spawn_worker(&self.service, port)?;
        pool.add_starting(worker)?;
        Ok(port)
    }

    /// Promote Starting workers whose readiness probe now succeeds.
    fn promote_starting(&self, pool: &mut Pool) {
        for port in pool.starting_ports() {
            if self.probe.probe_ready(port) {
                pool.promote(port);
            }
        }
    }
}

#[cfg(test)]
impl Scheduler {
    /// Test-only: register an already-running process as a Ready worker.
    pub(crate) fn inject_ready_worker(&self, child: std::process::Child, port: u16) {
        let mut worker = crate::pool::proc::WorkerProcess::new(child, port);
        worker.promote();
        let mut pool = self.pool.lock().expect("pool mutex poisoned");
        pool.add_starting(worker).expect("inject worker");
    }
}
