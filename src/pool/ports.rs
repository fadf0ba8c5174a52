//! Worker port allocation.
//!
//! Workers bind HTTP listeners on a reserved range starting at 6001. A
//! candidate port is usable only if no tracked worker owns it and nothing
//! else on the machine answers a short TCP connect there (a foreign
//! listener, or a recently killed worker still in TIME_WAIT).

use crate::error::{DispatchError, Result};
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

/// First port handed to a worker.
pub const PORT_RANGE_BASE: u16 = 6001;

/// Number of candidate ports scanned before giving up.
pub const PORT_RANGE_LEN: u16 = 256;

/// Deadline for the occupancy connect probe.
const CONNECT_PROBE_TIMEOUT: Duration = Duration::from_millis(100);

/// Scans the reserved range for a port no worker owns and nothing is
/// listening on.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    base: u16,
    len: u16,
    connect_timeout: Duration,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self {
            base: PORT_RANGE_BASE,
            len: PORT_RANGE_LEN,
            connect_timeout: CONNECT_PROBE_TIMEOUT,
        }
    }
}

impl PortAllocator {
    /// Allocator over a custom range. Production uses [`Default`]; tests
    /// point this at ephemeral ranges.
    pub fn new(base: u16, len: u16) -> Self {
        Self {
            base,
            len,
            connect_timeout: CONNECT_PROBE_TIMEOUT,
        }
    }

    /// Return the first port in the range that is neither claimed by a
    /// tracked worker nor accepting TCP connections.
    pub fn next_free(&self, claimed: &HashSet<u16>) -> Result<u16> {
        for offset in 0..self.len {
            let port = self.base + offset;
            if claimed.contains(&port) {
                continue;
            }
            if self.is_listening(port) {
                continue;
            }
            return Ok(port);
        }
        Err(DispatchError::NoFreePort {
            base: self.base,
            last: self.base + self.len - 1,
        })
    }

    /// True when something accepts a TCP connection on `localhost:port`.
    fn is_listening(&self, port: u16) -> bool {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        TcpStream::connect_timeout(&addr, self.connect_timeout).is_ok()
    }
}
