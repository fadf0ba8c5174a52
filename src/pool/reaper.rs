//! Periodic lifecycle controller.
//!
//! Owns a background thread that runs one [`Scheduler::tick`] per period:
//! reap dead and unresponsive workers, enforce the spawn cap, hold the
//! floor. Independent of request traffic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::pool::scheduler::Scheduler;

/// Slice used to keep the controller responsive to shutdown while
/// sleeping out its period.
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// Periodic reaper thread around a [`Scheduler`].
pub struct LifecycleController {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl LifecycleController {
    /// Start the controller ticking every `interval`.
    pub fn start(scheduler: Arc<Scheduler>, interval: Duration) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));

        let shutdown_flag = shutdown.clone();
        let thread = thread::Builder::new()
            .name("lifecycle-controller".to_string())
            .spawn(move || controller_loop(scheduler, shutdown_flag, interval))
            .expect("failed to spawn lifecycle controller thread");

        Self {
            shutdown,
            thread: Some(thread),
        }
    }

    /// Stop the controller and join its thread.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn controller_loop(scheduler: Arc<Scheduler>, shutdown: Arc<AtomicBool>, interval: Duration) {
    debug!("lifecycle controller started");

    while !shutdown.load(Ordering::Relaxed) {
        scheduler.tick();

        let wake = Instant::now() + interval;
        loop {
            let remaining = wake.saturating_duration_since(Instant::now());
            if remaining.is_zero() || shutdown.load(Ordering::Relaxed) {
                break;
            }
            thread::sleep(SHUTDOWN_POLL.min(remaining));
        }
    }

    debug!("lifecycle controller stopped");
}
