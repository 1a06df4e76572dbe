//! Child process supervision
//!
//! Every external command (engine, downloader, unitsync helpers) runs under a
//! caller-chosen name. Output is streamed line by line as
//! [`Event::ProcessOutputLine`] and exactly one [`Event::ProcessExited`] follows
//! the last line of each process.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use weblobby_core::prelude::*;
use weblobby_core::{Event, EventPoster};

/// How long the exit task waits for output pipes to drain after the child
/// is gone. A grandchild holding the pipes open must not delay the exit event
/// forever.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// What [`ProcessSupervisor::handle_exited`] did with an exit notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    /// The registered process had exited and its record was removed
    Removed,
    /// No record under that name (already terminated)
    AlreadyGone,
    /// The name now belongs to a newer, still running process
    Stale,
}

// ---------------------------------------------------------------------------
// ChildProcess
// ---------------------------------------------------------------------------

/// One supervised child.
///
/// The `Child` handle is owned by a background wait task. This record keeps a
/// kill channel, the exited flag set by that task, and the pid for logging.
/// Dropping the record requests termination.
#[derive(Debug)]
struct ChildProcess {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    exited: Arc<AtomicBool>,
}

impl ChildProcess {
    fn spawn(
        name: &str,
        program: &OsStr,
        args: Vec<std::ffi::OsString>,
        events: &EventPoster,
        runtime: &Handle,
        log_output: bool,
    ) -> Result<Self> {
        info!(
            "Running command ({}): {} {}",
            name,
            program.to_string_lossy(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        // tokio's process driver needs a runtime context at spawn time
        let _guard = runtime.enter();
        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(name, program, e))?;

        let pid = child.id();
        debug!("{} started with PID: {:?}", name, pid);

        let reader = runtime.spawn(output_reader(
            name.to_string(),
            child.stdout.take(),
            child.stderr.take(),
            events.clone(),
            log_output,
        ));

        let exited = Arc::new(AtomicBool::new(false));
        let (kill_tx, kill_rx) = oneshot::channel();
        runtime.spawn(wait_for_exit(
            name.to_string(),
            child,
            kill_rx,
            reader,
            events.clone(),
            Arc::clone(&exited),
        ));

        Ok(Self {
            pid,
            kill_tx: Some(kill_tx),
            exited,
        })
    }

    fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            // The wait task may already be gone
            let _ = tx.send(());
        }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            self.kill();
        }
    }
}

fn spawn_error(name: &str, program: &OsStr, e: io::Error) -> Error {
    let program = program.to_string_lossy();
    match e.kind() {
        io::ErrorKind::NotFound => Error::spawn(name, format!("{program}: executable not found")),
        io::ErrorKind::PermissionDenied => {
            Error::spawn(name, format!("{program}: permission denied"))
        }
        _ => Error::spawn(name, format!("{program}: {e}")),
    }
}

/// Background task: owns `child`, waits for it to exit, then posts
/// `ProcessExited` once all of its output has been posted.
async fn wait_for_exit(
    name: String,
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    mut reader: JoinHandle<()>,
    events: EventPoster,
    exited: Arc<AtomicBool>,
) {
    let code = tokio::select! {
        result = child.wait() => match result {
            Ok(status) => {
                info!("Command finished ({}): {}", name, status);
                status.code()
            }
            Err(e) => {
                error!("Error waiting for {}: {}", name, e);
                None
            }
        },
        // Explicit terminate, or the record was dropped
        _ = kill_rx => {
            info!("Terminating command ({})", name);
            if let Err(e) = child.kill().await {
                warn!("Failed to kill {}: {}", name, e);
            }
            match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    error!("Error waiting after kill of {}: {}", name, e);
                    None
                }
            }
        }
    };

    if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader)
        .await
        .is_err()
    {
        warn!("Output of {} still open after exit, detaching", name);
        reader.abort();
        // Wait for the abort to land so no line is posted after the exit event
        let _ = reader.await;
    }

    exited.store(true, Ordering::Release);
    debug!("{} exited with code {:?}", name, code);
    events.post(Event::ProcessExited {
        process_id: name,
        code,
    });
}

/// Merge stdout and stderr into one stream of lines, in arrival order.
async fn output_reader(
    name: String,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    events: EventPoster,
    log_output: bool,
) {
    let mut out = stdout.map(BufReader::new);
    let mut err = stderr.map(BufReader::new);
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();

    let emit = |buf: &mut Vec<u8>| {
        let text = decode_line(buf);
        buf.clear();
        if log_output {
            debug!("[{}] {}", name, text);
        }
        events.post(Event::output_line(name.as_str(), text));
    };

    while out.is_some() || err.is_some() {
        tokio::select! {
            read = next_line(out.as_mut(), &mut out_buf), if out.is_some() => {
                if !collect(read, &mut out_buf, &emit) {
                    out = None;
                }
            }
            read = next_line(err.as_mut(), &mut err_buf), if err.is_some() => {
                if !collect(read, &mut err_buf, &emit) {
                    err = None;
                }
            }
        }
    }

    trace!("output reader for {} finished", name);
}

/// Handle one `read_until` result. Returns `false` once the pipe is done.
fn collect(read: io::Result<usize>, buf: &mut Vec<u8>, emit: &impl Fn(&mut Vec<u8>)) -> bool {
    match read {
        Ok(0) => {
            // Last line without a trailing newline
            if !buf.is_empty() {
                emit(buf);
            }
            false
        }
        Ok(_) => {
            if buf.last() == Some(&b'\n') {
                emit(buf);
            }
            true
        }
        Err(e) => {
            debug!("output pipe error: {}", e);
            if !buf.is_empty() {
                emit(buf);
            }
            false
        }
    }
}

/// Cancel safe: partial data stays in `buf` across calls.
async fn next_line<R>(reader: Option<&mut R>, buf: &mut Vec<u8>) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    match reader {
        Some(reader) => reader.read_until(b'\n', buf).await,
        None => std::future::pending().await,
    }
}

/// Strip the line terminator (`\n` or `\r\n`) and decode lossily.
fn decode_line(buf: &[u8]) -> String {
    let mut end = buf.len();
    if end > 0 && buf[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && buf[end - 1] == b'\r' {
        end -= 1;
    }
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

// ---------------------------------------------------------------------------
// ProcessSupervisor
// ---------------------------------------------------------------------------

/// Registry of named child processes.
///
/// Owned by the consumer thread. The child I/O runs as tasks on the given
/// Tokio runtime; only the registry itself is touched synchronously.
pub struct ProcessSupervisor {
    events: EventPoster,
    runtime: Handle,
    processes: HashMap<String, ChildProcess>,
    log_output: bool,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("processes", &self.processes)
            .finish()
    }
}

impl ProcessSupervisor {
    pub fn new(events: EventPoster, runtime: Handle) -> Self {
        Self {
            events,
            runtime,
            processes: HashMap::new(),
            log_output: false,
        }
    }

    /// Log every output line at debug level
    pub fn with_output_logging(mut self, enabled: bool) -> Self {
        self.log_output = enabled;
        self
    }

    /// Start `program` under `name`.
    ///
    /// A no-op if a process is already registered under `name`. On spawn
    /// failure nothing is registered and no events are posted.
    ///
    /// # Errors
    ///
    /// [`Error::Spawn`] if the executable is missing or not executable.
    pub fn run<I, S>(&mut self, name: &str, program: impl AsRef<OsStr>, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        if self.processes.contains_key(name) {
            debug!("command {} is already running, ignoring run", name);
            return Ok(());
        }

        let args = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        let child = ChildProcess::spawn(
            name,
            program.as_ref(),
            args,
            &self.events,
            &self.runtime,
            self.log_output,
        )?;
        self.processes.insert(name.to_string(), child);
        Ok(())
    }

    /// Request termination of `name` and forget it. Returns `false` if no such
    /// process is registered. The exit event still arrives later.
    pub fn terminate(&mut self, name: &str) -> bool {
        match self.processes.remove(name) {
            Some(mut child) => {
                debug!("terminating {} (PID {:?})", name, child.pid);
                child.kill();
                true
            }
            None => false,
        }
    }

    /// Consumer-side bookkeeping for a `ProcessExited` event.
    ///
    /// Removes the record only if it belongs to a process that has actually
    /// exited, so an exit event from a terminated process cannot evict a newer
    /// process started under the same name.
    pub fn handle_exited(&mut self, name: &str) -> ExitDisposition {
        match self.processes.get(name) {
            None => ExitDisposition::AlreadyGone,
            Some(child) if child.has_exited() => {
                self.processes.remove(name);
                ExitDisposition::Removed
            }
            Some(_) => {
                debug!("stale exit event for {}, newer process is running", name);
                ExitDisposition::Stale
            }
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.processes.contains_key(name)
    }

    pub fn pid(&self, name: &str) -> Option<u32> {
        self.processes.get(name).and_then(|c| c.pid)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.processes.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Terminate every registered process.
    pub fn terminate_all(&mut self) {
        for (name, mut child) in self.processes.drain() {
            if !child.has_exited() {
                debug!("terminating {} on shutdown", name);
                child.kill();
            }
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.terminate_all();
    }
}
