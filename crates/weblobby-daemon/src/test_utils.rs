//! Test utilities for daemon types
//!
//! Scripted lobby and HTTP servers on loopback, plus helpers that collect
//! events from an [`EventBridge`] until a condition holds.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener as StdListener, TcpStream as StdStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use weblobby_core::{Event, EventBridge};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Drain `bridge` until `done` holds for everything collected, or `timeout`.
pub async fn wait_for_events<F>(bridge: &mut EventBridge, timeout: Duration, done: F) -> Vec<Event>
where
    F: Fn(&[Event]) -> bool,
{
    let deadline = Instant::now() + timeout;
    let mut collected = Vec::new();
    loop {
        collected.extend(bridge.drain());
        if done(&collected) || Instant::now() >= deadline {
            return collected;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Blocking variant of [`wait_for_events`] for plain `#[test]`s.
pub fn wait_for_events_blocking<F>(bridge: &mut EventBridge, timeout: Duration, done: F) -> Vec<Event>
where
    F: Fn(&[Event]) -> bool,
{
    let deadline = Instant::now() + timeout;
    let mut collected = Vec::new();
    loop {
        collected.extend(bridge.drain());
        if done(&collected) || Instant::now() >= deadline {
            return collected;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

// ─────────────────────────────────────────────────────────
// Mock lobby server
// ─────────────────────────────────────────────────────────

/// Line-protocol server on `127.0.0.1` with an OS-assigned port
pub struct MockLineServer {
    listener: TcpListener,
    port: u16,
}

impl MockLineServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        Self { listener, port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn accept(&self) -> MockPeer {
        let (stream, _) = tokio::time::timeout(Duration::from_secs(5), self.listener.accept())
            .await
            .expect("client never connected")
            .unwrap();
        MockPeer {
            stream: BufReader::new(stream),
        }
    }

    /// A port nothing listens on
    pub async fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }
}

/// Server side of one accepted connection
pub struct MockPeer {
    stream: BufReader<TcpStream>,
}

impl MockPeer {
    /// Write each chunk separately, pausing between them so they arrive as
    /// distinct reads.
    pub async fn write_chunks(&mut self, chunks: &[&[u8]], pause: Duration) {
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            let stream = self.stream.get_mut();
            stream.write_all(chunk).await.unwrap();
            stream.flush().await.unwrap();
        }
    }

    /// Next line from the client without the delimiter, `None` on EOF.
    pub async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let read = tokio::time::timeout(Duration::from_secs(5), self.stream.read_line(&mut line))
            .await
            .expect("timed out reading from client");
        match read {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches('\n').to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Mock HTTP server
// ─────────────────────────────────────────────────────────

/// How the [`MockHttpServer`] answers every request
#[derive(Debug, Clone)]
pub enum MockHttpReply {
    /// `200` with this body
    Ok(Vec<u8>),
    /// Resource last changed at `last_modified`: `304` when the request's
    /// `If-Modified-Since` is not older than that, else `200` with body
    Conditional {
        body: Vec<u8>,
        last_modified: SystemTime,
    },
    /// Bare status with an empty body
    Status(u16),
    /// Announce `declared` bytes, send `sent`, then close
    Truncated { declared: usize, sent: Vec<u8> },
}

impl MockHttpReply {
    pub fn conditional(body: &[u8], last_modified: SystemTime) -> Self {
        Self::Conditional {
            body: body.to_vec(),
            last_modified,
        }
    }
}

/// A moment `hours` before now
pub fn hours_ago(hours: u64) -> SystemTime {
    SystemTime::now() - Duration::from_secs(hours * 3600)
}

/// Minimal HTTP/1.1 server on a std thread, one connection at a time
pub struct MockHttpServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MockHttpServer {
    pub fn start(reply: MockHttpReply) -> Self {
        let listener = StdListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let thread = {
            let requests = Arc::clone(&requests);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                for stream in listener.incoming() {
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    if let Ok(stream) = stream {
                        serve_one(stream, &reply, &requests);
                    }
                }
            })
        };

        Self {
            addr,
            requests,
            stop,
            thread: Some(thread),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Raw request heads received so far
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// A port nothing listens on
    pub fn unused_port() -> u16 {
        let listener = StdListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }
}

impl Drop for MockHttpServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        // Wake the blocking accept
        let _ = StdStream::connect(self.addr);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn serve_one(mut stream: StdStream, reply: &MockHttpReply, requests: &Mutex<Vec<String>>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let Some(head) = read_request_head(&mut stream) else {
        return;
    };
    let since = if_modified_since(&head);
    requests.lock().unwrap().push(head);

    let response = match reply {
        MockHttpReply::Conditional {
            body,
            last_modified,
        } => {
            let changed = DateTime::<Utc>::from(*last_modified).timestamp();
            match since {
                Some(since) if changed <= since => response_bytes(304, &[], None, None),
                _ => response_bytes(200, body, None, Some(*last_modified)),
            }
        }
        MockHttpReply::Ok(body) => response_bytes(200, body, None, None),
        MockHttpReply::Status(code) => response_bytes(*code, &[], None, None),
        MockHttpReply::Truncated { declared, sent } => {
            response_bytes(200, sent, Some(*declared), None)
        }
    };
    let _ = stream.write_all(&response);
    let _ = stream.flush();
    let _ = stream.shutdown(Shutdown::Both);
}

fn read_request_head(stream: &mut StdStream) -> Option<String> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        head.extend_from_slice(&buf[..n]);
    }
    Some(String::from_utf8_lossy(&head).into_owned())
}

/// `If-Modified-Since` as unix seconds, if present and parseable
fn if_modified_since(head: &str) -> Option<i64> {
    head.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.trim().eq_ignore_ascii_case("if-modified-since") {
            return None;
        }
        DateTime::parse_from_rfc2822(value.trim())
            .ok()
            .map(|date| date.timestamp())
    })
}

fn response_bytes(
    status: u16,
    body: &[u8],
    declared_len: Option<usize>,
    last_modified: Option<SystemTime>,
) -> Vec<u8> {
    let reason = match status {
        200 => "OK",
        304 => "Not Modified",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    };
    let mut out = format!("HTTP/1.1 {status} {reason}\r\nConnection: close\r\n");
    if let Some(time) = last_modified {
        out.push_str(&format!("Last-Modified: {}\r\n", crate::http_date(time)));
    }
    if status != 304 {
        out.push_str(&format!(
            "Content-Length: {}\r\n",
            declared_len.unwrap_or(body.len())
        ));
    }
    out.push_str("\r\n");
    let mut bytes = out.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}
