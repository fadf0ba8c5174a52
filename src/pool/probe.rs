//! Worker probes.
//!
//! Busy-ness is queried from the worker itself rather than tracked by the
//! dispatcher: request bodies are relayed by the HTTP layer and the
//! completion edge is not observable from the scheduler, so the worker's
//! own counter is the only truth that cannot drift.

#![allow(dead_code)] // The raw TCP probe is for coarse diagnostics

use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// Deadline applied to every HTTP probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome of a busy probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyState {
    /// Active request count was 0.
    Free,
    /// Active request count was 1 or more.
    Busy,
    /// Connect failure, timeout, non-2xx, or unparseable body.
    Unreachable,
}

/// HTTP probe client for worker health and busy state.
///
/// Holds one blocking `reqwest` client configured with the probe
/// deadline. Only ever used from blocking contexts: the scheduler runs
/// under `spawn_blocking` and the lifecycle controller owns its own
/// thread.
#[derive(Debug)]
pub struct ProbeClient {
    http: reqwest::blocking::Client,
}

impl ProbeClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    /// True iff `GET /healthcheck` on the worker answers 2xx.
    pub fn probe_ready(&self, port: u16) -> bool {
        let url = format!("http://localhost:{}/healthcheck", port);
        match self.http.get(&url).send() {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Query the worker's active request count via `GET /isbusy`.
    ///
    /// The endpoint contract: 2xx with an ASCII decimal body, and the
    /// probe itself is not counted by the worker.
    pub fn probe_busy(&self, port: u16) -> BusyState {
        let url = format!("http://localhost:{}/isbusy", port);
        let response = match self.http.get(&url).send() {
            Ok(r) => r,
            Err(_) => return BusyState::Unreachable,
        };
        if !response.status().is_success() {
            return BusyState::Unreachable;
        }
        let body = match response.text() {
            Ok(b) => b,
            Err(_) => return BusyState::Unreachable,
        };
        match body.trim().parse::<u64>() {
            Ok(0) => BusyState::Free,
            Ok(_) => BusyState::Busy,
            Err(_) => BusyState::Unreachable,
        }
    }

    /// Raw TCP connect, for coarse liveness checks.
    pub fn tcp_open(port: u16, timeout: Duration) -> bool {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        TcpStream::connect_timeout(&addr, timeout).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::testutil::StubWorker;

    #[test]
    fn test_probe_ready_against_stub() {
        let stub = StubWorker::start(42201);
        let probe = ProbeClient::new(PROBE_TIMEOUT).unwrap();
        assert!(probe.probe_ready(stub.port()));
    }

    #[test]
    fn test_probe_ready_unreachable_port() {
        let probe = ProbeClient::new(Duration::from_millis(300)).unwrap();
        assert!(!probe.probe_ready(42299));
    }

    #[test]
    fn test_probe_busy_free_and_busy() {
        let stub = StubWorker::start(42202);
        let probe = ProbeClient::new(PROBE_TIMEOUT).unwrap();

        assert_eq!(probe.probe_busy(stub.port()), BusyState::Free);

        stub.set_busy(2);
        assert_eq!(probe.probe_busy(stub.port()), BusyState::Busy);

        stub.set_busy(0);
        assert_eq!(probe.probe_busy(stub.port()), BusyState::Free);
    }

    #[test]
    fn test_probe_busy_garbage_body_is_unreachable() {
        let stub = StubWorker::start(42203);
        stub.set_garbage(true);
        let probe = ProbeClient::new(PROBE_TIMEOUT).unwrap();
        assert_eq!(probe.probe_busy(stub.port()), BusyState::Unreachable);
    }

    #[test]
    fn test_probe_busy_closed_port_is_unreachable() {
        let probe = ProbeClient::new(Duration::from_millis(300)).unwrap();
        assert_eq!(probe.probe_busy(42298), BusyState::Unreachable);
    }

    #[test]
    fn test_tcp_open() {
        let stub = StubWorker::start(42204);
        assert!(ProbeClient::tcp_open(
            stub.port(),
            Duration::from_millis(300)
        ));
        assert!(!ProbeClient::tcp_open(42297, Duration::from_millis(300)));
    }
}
