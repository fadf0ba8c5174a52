//! The worker registry.
//!
//! Authoritative in-memory set of spawned workers, held behind the
//! scheduler's single mutex. Iteration order is insertion order so that
//! selection is deterministic (oldest Ready worker first). Invariants:
//! ports are unique across non-Dead workers, and at most one worker is
//! Starting at any time.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{DispatchError, Result};
use crate::pool::proc::{WorkerProcess, WorkerState};

/// Grace between SIGTERM and SIGKILL when reaping under the lock.
const KILL_GRACE: Duration = Duration::from_millis(100);

/// Insertion-ordered collection of workers keyed by port.
#[derive(Default)]
pub struct Pool {
    workers: Vec<WorkerProcess>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count of non-Dead workers (Starting + Ready).
    pub fn alive_count(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.state() != WorkerState::Dead)
            .count()
    }

    pub fn has_starting(&self) -> bool {
        self.workers
            .iter()
            .any(|w| w.state() == WorkerState::Starting)
    }

    /// Ports owned by non-Dead workers.
    pub fn claimed_ports(&self) -> HashSet<u16> {
        self.workers
            .iter()
            .filter(|w| w.state() != WorkerState::Dead)
            .map(|w| w.port())
            .collect()
    }

    /// Non-Dead worker ports in insertion order.
    pub fn ports(&self) -> Vec<u16> {
        self.workers
            .iter()
            .filter(|w| w.state() != WorkerState::Dead)
            .map(|w| w.port())
            .collect()
    }

    /// Register a freshly launched worker.
    ///
    /// Rejects a duplicate port among non-Dead workers and a second
    /// concurrent Starting worker (spawns are serialized).
    pub fn add_starting(&mut self, worker: WorkerProcess) -> Result<()> {
        if self.has_starting() {
            return Err(DispatchError::Worker(
                "a worker is already starting".to_string(),
            ));
        }
        if self.claimed_ports().contains(&worker.port()) {
            return Err(DispatchError::Worker(format!(
                "port {} already claimed by a live worker",
                worker.port()
            )));
        }
        self.workers.push(worker);
        Ok(())
    }

    /// Promote a Starting worker to Ready. Returns false if no Starting
    /// worker owns `port`.
    pub fn promote(&mut self, port: u16) -> bool {
        for worker in &mut self.workers {
            if worker.port() == port && worker.state() == WorkerState::Starting {
                worker.promote();
                info!(port, "worker ready");
                return true;
            }
        }
        false
    }

    /// Ready workers in insertion order, mutably (probing stamps state).
    pub fn ready_workers_mut(&mut self) -> impl Iterator<Item = &mut WorkerProcess> {
        self.workers
            .iter_mut()
            .filter(|w| w.state() == WorkerState::Ready)
    }

    /// Ports of Starting workers (at most one while invariants hold).
    pub fn starting_ports(&self) -> Vec<u16> {
        self.workers
            .iter()
            .filter(|w| w.state() == WorkerState::Starting)
            .map(|w| w.port())
            .collect()
    }

    /// Remove and return the worker on `port`, regardless of state.
    pub fn take(&mut self, port: u16) -> Option<WorkerProcess> {
        let index = self.workers.iter().position(|w| w.port() == port)?;
        Some(self.workers.remove(index))
    }

    /// True when no tracked worker on `port` has a running process.
    pub fn worker_exited(&mut self, port: u16) -> bool {
        match self.workers.iter_mut().find(|w| w.port() == port) {
            Some(worker) => !worker.is_running(),
            None => true,
        }
    }

    /// Remove workers that are gone or condemned.
    ///
    /// Three paths feed this: the process exited on its own, a busy probe
    /// flagged the worker unresponsive, or a Starting worker outlived the
    /// readiness budget with nobody waiting on it. Condemned processes
    /// are killed before removal. Returns the number of workers removed.
    pub fn reap(&mut self, ready_timeout: Duration) -> usize {
        for worker in &mut self.workers {
            if worker.state() == WorkerState::Dead {
                continue;
            }
            if !worker.is_running() {
                warn!(
                    port = worker.port(),
                    pid = worker.pid(),
                    "worker process exited"
                );
                worker.condemn();
            } else if worker.is_unresponsive() {
                warn!(port = worker.port(), "killing unresponsive worker");
                worker.stop(KILL_GRACE);
            } else if worker.state() == WorkerState::Starting && worker.age() > ready_timeout {
                warn!(
                    port = worker.port(),
                    elapsed_secs = worker.age().as_secs(),
                    "worker never became ready; killing"
                );
                worker.stop(KILL_GRACE);
            }
        }

        let before = self.workers.len();
        self.workers.retain(|w| w.state() != WorkerState::Dead);
        before - self.workers.len()
    }

    /// Kill one worker for cap enforcement: any Starting worker first,
    /// otherwise the most recently spawned live one. Returns its port.
    pub fn kill_newest(&mut self) -> Option<u16> {
        let index = self
            .workers
            .iter()
            .rposition(|w| w.state() == WorkerState::Starting)
            .or_else(|| {
                self.workers
                    .iter()
                    .rposition(|w| w.state() != WorkerState::Dead)
            })?;
        let mut worker = self.workers.remove(index);
        let port = worker.port();
        info!(port, "killing worker to enforce the spawn cap");
        worker.stop(KILL_GRACE);
        Some(port)
    }

    /// Kill every worker. Used on dispatcher shutdown.
    pub fn kill_all(&mut self) {
        for worker in &mut self.workers {
            worker.stop(KILL_GRACE);
        }
        self.workers.clear();
    }
}
