//! # weblobby-daemon - I/O Producers
//!
//! Everything that does blocking or asynchronous I/O on behalf of the lobby
//! client: the lobby server connection, child processes, downloads and
//! one-shot background jobs. Results reach the consumer only as
//! [`weblobby_core::Event`]s posted through an [`weblobby_core::EventPoster`].
//!
//! Depends on [`weblobby_core`] for events and error handling.
//!
//! ## Public API
//!
//! ### Lobby Connection
//! - [`LineProtocolClient`] - One TCP session on a dedicated I/O thread
//! - [`LineFramer`] - Splits a byte stream into `\n`-delimited lines
//!
//! ### Process Supervision
//! - [`ProcessSupervisor`] - Named child processes with streamed output
//! - [`ExitDisposition`] - Outcome of handling a `ProcessExited` event
//!
//! ### Downloads
//! - [`ConditionalDownloader`] - `If-Modified-Since` GET with atomic replace
//! - [`FetchOutcome`] - Updated vs. cache hit
//!
//! ### Background Jobs
//! - [`JobRunner`] - One thread per job, one `JobResult` per job
//! - [`JobHandle`], [`CancelToken`] - Cooperative cancellation

pub mod download;
pub mod framing;
pub mod job;
pub mod network;
pub mod process;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

// Public API re-exports
pub use download::{http_date, ConditionalDownloader, DownloadOptions, FetchOutcome};
pub use framing::{frame_outgoing, LineFramer};
pub use job::{CancelToken, JobHandle, JobRunner};
pub use network::{ClientOptions, LineProtocolClient};
pub use process::{ExitDisposition, ProcessSupervisor};
