//! Test-only stub worker.
//!
//! A minimal HTTP/1.1 responder on a fixed localhost port emulating the
//! probe surface a real geometry worker exposes: `/healthcheck`,
//! `/isbusy` (settable counter), and a generic 200 for anything else.
//! Each test uses its own port; the listener thread is left to die with
//! the test process.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct StubWorker {
    port: u16,
    busy: Arc<AtomicI64>,
    garbage: Arc<AtomicBool>,
}

impl StubWorker {
    /// Bind and serve on `127.0.0.1:port` in a background thread.
    pub fn start(port: u16) -> Self {
        let busy = Arc::new(AtomicI64::new(0));
        let garbage = Arc::new(AtomicBool::new(false));
        let listener = TcpListener::bind(("127.0.0.1", port)).expect("bind stub worker");

        let busy_handle = busy.clone();
        let garbage_handle = garbage.clone();
        std::thread::Builder::new()
            .name(format!("stub-worker-{}", port))
            .spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { break };
                    serve_one(stream, &busy_handle, &garbage_handle);
                }
            })
            .expect("spawn stub worker thread");

        Self {
            port,
            busy,
            garbage,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Set the active request count reported by `/isbusy`.
    pub fn set_busy(&self, count: i64) {
        self.busy.store(count, Ordering::Relaxed);
    }

    /// Make `/isbusy` answer with a non-numeric body.
    pub fn set_garbage(&self, on: bool) {
        self.garbage.store(on, Ordering::Relaxed);
    }
}

/// Read one request (headers plus declared body) and answer it.
fn serve_one(mut stream: TcpStream, busy: &AtomicI64, garbage: &AtomicBool) {
    let _ = stream.set_read_timeout(Some(Duration::from_millis(500)));

    let mut data = Vec::new();
    let mut buf = [0u8; 4096];

    // Read until end of headers.
    let body_start = loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                data.extend_from_slice(&buf[..n]);
                if let Some(pos) = find_subsequence(&data, b"\r\n\r\n") {
                    break pos + 4;
                }
                if data.len() > 64 * 1024 {
                    return;
                }
            }
        }
    };

    let head = String::from_utf8_lossy(&data[..body_start]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    // Drain the body before answering.
    while data.len() < body_start + content_length {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => data.extend_from_slice(&buf[..n]),
        }
    }

    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    let body = if path == "/isbusy" {
        if garbage.load(Ordering::Relaxed) {
            "not-a-number".to_string()
        } else {
            busy.load(Ordering::Relaxed).to_string()
        }
    } else if path == "/healthcheck" {
        "healthy".to_string()
    } else {
        "ok".to_string()
    };

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
