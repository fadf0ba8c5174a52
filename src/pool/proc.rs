//! Process handle for worker subprocesses.

#![allow(dead_code)] // Some accessors are for monitoring

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::process::Child;
use std::time::{Duration, Instant};

/// Lifecycle state of a worker.
///
/// Busy-ness is deliberately not a state: it is queried from the worker's
/// own `/isbusy` endpoint at selection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Spawned, not yet confirmed by a readiness probe.
    Starting,
    /// Readiness probe succeeded at least once; process has not exited.
    Ready,
    /// Exited, killed, or condemned; removed on the next reap.
    Dead,
}

/// Handle to a spawned worker subprocess.
#[derive(Debug)]
pub struct WorkerProcess {
    child: Child,
    port: u16,
    state: WorkerState,
    spawned_at: Instant,
    last_acquired: Option<Instant>,
    unresponsive: bool,
}

impl WorkerProcess {
    /// Wrap a freshly spawned child. Workers start in `Starting` and are
    /// promoted once a readiness probe succeeds.
    pub fn new(child: Child, port: u16) -> Self {
        Self {
            child,
            port,
            state: WorkerState::Starting,
            spawned_at: Instant::now(),
            last_acquired: None,
            unresponsive: false,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Time since the subprocess was spawned.
    pub fn age(&self) -> Duration {
        self.spawned_at.elapsed()
    }

    pub fn promote(&mut self) {
        self.state = WorkerState::Ready;
    }

    pub fn condemn(&mut self) {
        self.state = WorkerState::Dead;
    }

    /// Stamp the worker as handed out to a caller.
    pub fn mark_acquired(&mut self) {
        self.last_acquired = Some(Instant::now());
    }

    /// Seconds since this worker was last handed out, if ever.
    pub fn seconds_since_acquired(&self) -> Option<u64> {
        self.last_acquired.map(|t| t.elapsed().as_secs())
    }

    /// Flag set when a busy probe came back unreachable; consumed by the
    /// next reap pass.
    pub fn mark_unresponsive(&mut self) {
        self.unresponsive = true;
    }

    pub fn is_unresponsive(&self) -> bool {
        self.unresponsive
    }

    /// Check if the process is still running (non-blocking).
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Send SIGTERM to the process.
    pub fn terminate(&mut self) {
        if !self.is_running() {
            return;
        }
        let pid = Pid::from_raw(self.child.id() as i32);
        let _ = signal::kill(pid, Signal::SIGTERM);
    }

    /// Send SIGKILL and reap the process.
    pub fn kill(&mut self) {
        if self.is_running() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
        self.state = WorkerState::Dead;
    }

    /// Stop the worker: SIGTERM, wait up to `timeout`, then SIGKILL.
    pub fn stop(&mut self, timeout: Duration) {
        if !self.is_running() {
            self.state = WorkerState::Dead;
            return;
        }

        self.terminate();

        let start = Instant::now();
        while start.elapsed() < timeout {
            if !self.is_running() {
                self.state = WorkerState::Dead;
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        self.kill();
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        // Safety net for paths that drop a worker without stopping it.
        if self.is_running() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
