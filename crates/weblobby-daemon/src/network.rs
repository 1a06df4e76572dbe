//! Lobby server connection over a newline-delimited TCP protocol
//!
//! A [`LineProtocolClient`] owns one dedicated thread that runs a
//! single-threaded Tokio reactor for the lifetime of the client. The socket
//! lives only on that thread; the public API marshals commands to it over a
//! channel and results come back as [`Event`]s through the [`EventPoster`].
//!
//! ```text
//!   consumer thread                      weblobby-net thread
//!   ───────────────                      ───────────────────
//!   connect()/send()/disconnect() ─cmd─▶ reactor loop ── ConnectionState
//!                                          │  Disconnected
//!   EventBridge::drain() ◀──── post ───────┤  Resolving  (lookup_host)
//!     NetworkLine / NetworkError /         │  Connecting (TcpStream::connect)
//!     LogMessage                           │  Connected  (read → LineFramer,
//!                                          │              write ← outgoing queue)
//! ```

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::thread::{self, JoinHandle};

use futures_util::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use weblobby_core::prelude::*;
use weblobby_core::{Event, EventPoster, LogLevel};

use crate::framing::{frame_outgoing, LineFramer};

/// Size of one socket read
const READ_CHUNK: usize = 4096;

/// Tuning for a [`LineProtocolClient`]
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Log every received and sent line at debug level
    pub log_traffic: bool,
}

/// Commands marshaled from the public API onto the network thread
#[derive(Debug)]
enum NetCommand {
    Connect { host: String, port: u16 },
    Send(String),
    Disconnect,
    Shutdown,
}

// ---------------------------------------------------------------------------
// LineProtocolClient
// ---------------------------------------------------------------------------

/// Client for one long-lived lobby session.
///
/// Every method returns immediately. Outcomes are observed only through
/// events: [`Event::NetworkLine`] per received line, [`Event::NetworkError`]
/// when resolution, connection or reading fails, and a warning
/// [`Event::LogMessage`] when a send cannot be performed.
///
/// Dropping the client stops the reactor and joins the network thread.
pub struct LineProtocolClient {
    cmd_tx: mpsc::UnboundedSender<NetCommand>,
    thread: Option<JoinHandle<()>>,
}

impl fmt::Debug for LineProtocolClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineProtocolClient")
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl LineProtocolClient {
    /// Start the network thread with default options.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the reactor or the thread cannot be created.
    pub fn new(events: EventPoster) -> Result<Self> {
        Self::with_options(events, ClientOptions::default())
    }

    pub fn with_options(events: EventPoster, options: ClientOptions) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let thread = thread::Builder::new()
            .name("weblobby-net".to_string())
            .spawn(move || {
                runtime.block_on(run_reactor(cmd_rx, events, options));
                debug!("network thread exiting");
            })?;

        Ok(Self {
            cmd_tx,
            thread: Some(thread),
        })
    }

    /// Resolve `host`, connect, then read lines until failure or disconnect.
    ///
    /// Ignored with a warning if an attempt is already in flight or a session
    /// is open; call [`disconnect`](Self::disconnect) first.
    pub fn connect(&self, host: &str, port: u16) {
        self.dispatch(NetCommand::Connect {
            host: host.to_string(),
            port,
        });
    }

    /// Queue `message` for transmission; the `\n` delimiter is appended if
    /// missing. Dropped with a warning if the socket is not open.
    pub fn send(&self, message: &str) {
        self.dispatch(NetCommand::Send(message.to_string()));
    }

    /// Close the socket. Idempotent; never produces an error event.
    pub fn disconnect(&self) {
        self.dispatch(NetCommand::Disconnect);
    }

    fn dispatch(&self, cmd: NetCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            warn!("network thread is gone, command dropped");
        }
    }
}

impl Drop for LineProtocolClient {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(NetCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("network thread panicked");
            }
        }
        debug!("LineProtocolClient dropped");
    }
}

// ---------------------------------------------------------------------------
// Connection state machine (network thread only)
// ---------------------------------------------------------------------------

enum ConnectionState {
    Disconnected,
    Resolving {
        host: String,
        port: u16,
        lookup: BoxFuture<'static, io::Result<Vec<SocketAddr>>>,
    },
    Connecting {
        target: String,
        connect: BoxFuture<'static, Result<TcpStream>>,
    },
    Connected {
        peer: String,
        stream: TcpStream,
    },
}

/// Completion of whatever the current state is waiting on
enum Progress {
    Resolved(io::Result<Vec<SocketAddr>>),
    Connected(Result<TcpStream>),
    Read(io::Result<usize>),
    Wrote(io::Result<usize>),
}

impl ConnectionState {
    fn name(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Resolving { .. } => "resolving",
            ConnectionState::Connecting { .. } => "connecting",
            ConnectionState::Connected { .. } => "connected",
        }
    }

    /// Drive the current stage. Cancel safe: the stage futures live in `self`,
    /// and a dropped socket read or write has transferred nothing.
    async fn progress(&mut self, buf: &mut [u8], outgoing: &[u8]) -> Progress {
        match self {
            ConnectionState::Disconnected => std::future::pending().await,
            ConnectionState::Resolving { lookup, .. } => Progress::Resolved(lookup.await),
            ConnectionState::Connecting { connect, .. } => Progress::Connected(connect.await),
            ConnectionState::Connected { stream, .. } => {
                let (mut reader, mut writer) = stream.split();
                tokio::select! {
                    read = reader.read(buf) => Progress::Read(read),
                    wrote = writer.write(outgoing), if !outgoing.is_empty() => Progress::Wrote(wrote),
                }
            }
        }
    }
}

enum Wake {
    Command(Option<NetCommand>),
    Progress(Progress),
}

async fn run_reactor(
    mut cmd_rx: mpsc::UnboundedReceiver<NetCommand>,
    events: EventPoster,
    options: ClientOptions,
) {
    let mut reactor = Reactor {
        events,
        options,
        state: ConnectionState::Disconnected,
        framer: LineFramer::new(),
        outgoing: Vec::new(),
    };
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let wake = tokio::select! {
            biased;
            // Commands first, so Disconnect and Shutdown are never stuck
            // behind a peer that stops reading
            cmd = cmd_rx.recv() => Wake::Command(cmd),
            progress = reactor.state.progress(&mut buf, &reactor.outgoing) => Wake::Progress(progress),
        };

        match wake {
            Wake::Command(None) | Wake::Command(Some(NetCommand::Shutdown)) => break,
            Wake::Command(Some(cmd)) => reactor.handle_command(cmd).await,
            Wake::Progress(progress) => reactor.advance(progress, &buf),
        }
    }

    reactor.close().await;
}

struct Reactor {
    events: EventPoster,
    options: ClientOptions,
    state: ConnectionState,
    framer: LineFramer,
    /// Framed bytes not yet written to the socket
    outgoing: Vec<u8>,
}

impl Reactor {
    async fn handle_command(&mut self, cmd: NetCommand) {
        match cmd {
            NetCommand::Connect { host, port } => self.start_connect(host, port),
            NetCommand::Send(message) => self.send(&message),
            NetCommand::Disconnect => self.close().await,
            NetCommand::Shutdown => {}
        }
    }

    fn start_connect(&mut self, host: String, port: u16) {
        if !matches!(self.state, ConnectionState::Disconnected) {
            self.warn(format!(
                "Connect to {host}:{port} ignored: session is {}, disconnect first",
                self.state.name()
            ));
            return;
        }

        info!("Connecting to lobby server on {}:{}", host, port);
        let lookup_host = host.clone();
        self.state = ConnectionState::Resolving {
            host,
            port,
            lookup: Box::pin(async move {
                tokio::net::lookup_host((lookup_host.as_str(), port))
                    .await
                    .map(|addrs| addrs.collect())
            }),
        };
    }

    /// Queue a line; the reactor loop writes it as the socket accepts data.
    fn send(&mut self, message: &str) {
        if !matches!(self.state, ConnectionState::Connected { .. }) {
            self.warn(Error::send("socket is not open, message dropped").to_string());
            return;
        }

        if self.options.log_traffic {
            debug!(">> {}", message.trim_end_matches('\n'));
        }
        self.outgoing.extend_from_slice(&frame_outgoing(message));
    }

    /// Explicit close: cancels any stage silently.
    async fn close(&mut self) {
        match std::mem::replace(&mut self.state, ConnectionState::Disconnected) {
            ConnectionState::Connected { peer, mut stream } => {
                info!("Disconnecting from lobby server {}", peer);
                if let Err(e) = stream.shutdown().await {
                    debug!("socket shutdown: {}", e);
                }
            }
            ConnectionState::Disconnected => {}
            other => debug!("connection attempt cancelled while {}", other.name()),
        }
        if !self.outgoing.is_empty() {
            debug!("{} unsent bytes discarded", self.outgoing.len());
        }
        self.reset_buffers();
    }

    fn advance(&mut self, progress: Progress, buf: &[u8]) {
        match progress {
            Progress::Resolved(result) => {
                let ConnectionState::Resolving { host, port, .. } =
                    std::mem::replace(&mut self.state, ConnectionState::Disconnected)
                else {
                    return;
                };
                match result {
                    Ok(addrs) if !addrs.is_empty() => {
                        let target = format!("{host}:{port}");
                        debug!("{} resolved to {:?}", target, addrs);
                        self.state = ConnectionState::Connecting {
                            target: target.clone(),
                            connect: Box::pin(connect_any(addrs, target)),
                        };
                    }
                    Ok(_) => self.fail(Error::resolution(host, "no addresses found")),
                    Err(e) => self.fail(Error::resolution(host, e)),
                }
            }
            Progress::Connected(Ok(stream)) => {
                let peer = stream
                    .peer_addr()
                    .map(|addr| addr.to_string())
                    .unwrap_or_else(|_| "unknown peer".to_string());
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("set_nodelay failed: {}", e);
                }
                info!("Connected to lobby server at {}", peer);
                self.state = ConnectionState::Connected { peer, stream };
            }
            Progress::Connected(Err(e)) => self.fail(e),
            Progress::Read(Ok(0)) => self.fail(Error::read("connection closed by server")),
            Progress::Read(Ok(n)) => {
                for line in self.framer.push(&buf[..n]) {
                    if self.options.log_traffic {
                        debug!("<< {}", line);
                    }
                    self.events.post(Event::network_line(line));
                }
            }
            Progress::Read(Err(e)) => self.fail(Error::read(e)),
            Progress::Wrote(Ok(0)) => self.fail(Error::send("connection closed by server")),
            Progress::Wrote(Ok(n)) => {
                self.outgoing.drain(..n);
            }
            Progress::Wrote(Err(e)) => self.fail(Error::send(e)),
        }
    }

    /// Transport failure: report it and fall back to `Disconnected`.
    fn fail(&mut self, err: Error) {
        info!("lobby session ended: {}", err);
        self.state = ConnectionState::Disconnected;
        self.reset_buffers();
        self.events.post(Event::network_error(err));
    }

    fn reset_buffers(&mut self) {
        self.framer.clear();
        self.outgoing.clear();
    }

    fn warn(&self, text: String) {
        info!("{}", text);
        self.events.post(Event::log(LogLevel::Warning, text));
    }
}

/// Try each resolved address in order; report the last failure.
async fn connect_any(addrs: Vec<SocketAddr>, target: String) -> Result<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }
    Err(Error::connection(
        target,
        last_err.map_or_else(|| "no address reachable".to_string(), |e| e.to_string()),
    ))
}
