//! Lobby - the single consumer that owns every producer
//!
//! The UI layer talks to one [`Lobby`]. Commands go out through the lobby's
//! methods and return immediately (except [`Lobby::fetch`]). Results come back
//! as [`Event`]s that the UI collects with [`Lobby::pump`] or
//! [`Lobby::next_event`] on its own thread.

use std::path::{Path, PathBuf};

use tokio::runtime::Handle;

use weblobby_core::prelude::*;
use weblobby_core::{Event, EventBridge, EventPoster, JobOutcome};
use weblobby_daemon::{
    CancelToken, ConditionalDownloader, ExitDisposition, FetchOutcome, JobHandle, JobRunner,
    LineProtocolClient, ProcessSupervisor,
};

use crate::config::{config_path, save_settings, Settings};
use crate::handler::EventHandler;

pub struct Lobby {
    settings: Settings,
    config_file: PathBuf,
    client: LineProtocolClient,
    supervisor: ProcessSupervisor,
    jobs: JobRunner,
    downloader: ConditionalDownloader,
    bridge: EventBridge,
}

impl std::fmt::Debug for Lobby {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lobby")
            .field("settings", &self.settings)
            .field("config_file", &self.config_file)
            .field("supervisor", &self.supervisor)
            .field("jobs", &self.jobs)
            .field("pending_events", &self.bridge.len())
            .finish()
    }
}

impl Lobby {
    /// Build a lobby with a fresh event bridge. Child process I/O runs on
    /// `runtime`.
    pub fn new(settings: Settings, runtime: Handle) -> Result<Self> {
        Self::with_bridge(settings, runtime, EventBridge::new())
    }

    /// Build a lobby around an existing bridge, e.g. one whose poster was
    /// already handed to the logging layer.
    pub fn with_bridge(settings: Settings, runtime: Handle, bridge: EventBridge) -> Result<Self> {
        let poster = bridge.poster();
        let client =
            LineProtocolClient::with_options(poster.clone(), settings.logging.client_options())?;
        let supervisor = ProcessSupervisor::new(poster.clone(), runtime)
            .with_output_logging(settings.logging.debug_commands);
        let jobs = JobRunner::new(poster);
        let downloader = ConditionalDownloader::new(settings.download.to_options());

        Ok(Self {
            settings,
            config_file: config_path(),
            client,
            supervisor,
            jobs,
            downloader,
            bridge,
        })
    }

    /// Where [`save_settings`](Self::save_settings) writes; defaults to
    /// [`config_path`].
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = path.into();
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Persist the settings in effect, command-line overrides included.
    pub fn save_settings(&self) -> Result<()> {
        save_settings(&self.config_file, &self.settings)
    }

    /// Producer handle for posting custom events into this lobby's bridge
    pub fn poster(&self) -> EventPoster {
        self.bridge.poster()
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    // ─────────────────────────────────────────────────────────
    // Lobby server
    // ─────────────────────────────────────────────────────────

    /// Connect to the configured lobby server
    pub fn connect(&self) {
        let network = &self.settings.network;
        self.client.connect(&network.host, network.port);
    }

    pub fn connect_to(&self, host: &str, port: u16) {
        self.client.connect(host, port);
    }

    pub fn send(&self, message: &str) {
        self.client.send(message);
    }

    pub fn disconnect(&self) {
        self.client.disconnect();
    }

    // ─────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────

    /// Start an external command under `name`. A spawn failure is returned
    /// to the caller and posts no event.
    pub fn run_command<I, S>(&mut self, name: &str, program: &str, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        self.supervisor.run(name, program, args).inspect_err(|e| {
            info!("{}", e);
        })
    }

    pub fn kill_command(&mut self, name: &str) -> bool {
        self.supervisor.terminate(name)
    }

    // ─────────────────────────────────────────────────────────
    // Downloads and jobs
    // ─────────────────────────────────────────────────────────

    /// Blocking conditional download on the calling thread.
    pub fn fetch(&self, url: &str, target: impl Into<PathBuf>) -> Result<FetchOutcome> {
        self.downloader.fetch(url, target.into())
    }

    /// Conditional download on a job thread, reported as
    /// `JobResult { kind: "download" }`.
    pub fn download(
        &mut self,
        job_id: &str,
        url: &str,
        target: impl Into<PathBuf>,
    ) -> Result<JobHandle> {
        let downloader = self.downloader.clone();
        let url = url.to_string();
        let target = target.into();

        self.jobs.start(job_id, "download", move |cancel| {
            if cancel.is_cancelled() {
                return Err("cancelled".to_string());
            }
            match downloader.fetch(&url, &target) {
                Ok(FetchOutcome::Updated { bytes }) => {
                    Ok(format!("{} updated ({} bytes)", target.display(), bytes))
                }
                Ok(FetchOutcome::NotModified) => Ok(format!("{} is up to date", target.display())),
                Err(e) => Err(e.to_string()),
            }
        })
    }

    pub fn start_job<F>(&mut self, id: &str, kind: &str, work: F) -> Result<JobHandle>
    where
        F: FnOnce(&CancelToken) -> JobOutcome + Send + 'static,
    {
        self.jobs.start(id, kind, work)
    }

    pub fn cancel_job(&self, id: &str) -> bool {
        self.jobs.cancel(id)
    }

    // ─────────────────────────────────────────────────────────
    // Event delivery
    // ─────────────────────────────────────────────────────────

    /// Deliver every pending event to `handler`. Returns how many were
    /// delivered.
    pub fn pump(&mut self, handler: &mut dyn EventHandler) -> usize {
        let mut delivered = 0;
        for event in self.bridge.drain() {
            if self.settle(&event) {
                handler.handle_event(&event);
                delivered += 1;
            }
        }
        delivered
    }

    /// Wait for the next deliverable event.
    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            let event = self.bridge.recv().await?;
            if self.settle(&event) {
                return Some(event);
            }
        }
    }

    /// Registry bookkeeping owed to an event. Returns whether the event
    /// should reach the UI.
    fn settle(&mut self, event: &Event) -> bool {
        match event {
            Event::ProcessExited { process_id, .. } => {
                self.supervisor.handle_exited(process_id) != ExitDisposition::Stale
            }
            Event::JobResult { job_id, .. } => {
                self.jobs.handle_result(job_id);
                true
            }
            _ => true,
        }
    }

    /// Close the session and terminate every command. Events already posted
    /// stay pending.
    pub fn shutdown(&mut self, handler: &mut dyn EventHandler) {
        info!("Shutting down lobby");
        self.client.disconnect();
        self.supervisor.terminate_all();
        handler.on_shutdown();
    }
}
