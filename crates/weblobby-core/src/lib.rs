//! # weblobby-core - Core Types
//!
//! Foundation crate for weblobby. Provides the event model, the cross-thread
//! event bridge, error handling and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, tokio's sync primitives, tracing).
//!
//! ## Public API
//!
//! ### Events (`events`)
//! - [`Event`] - Tagged occurrence posted by a producer thread
//! - [`LogLevel`] - Severity of forwarded log messages
//! - [`Severity`] - Alert vs. informational classification for the UI
//!
//! ### Event Bridge (`bridge`)
//! - [`EventBridge`] - Consumer side: `drain()` everything posted so far
//! - [`EventPoster`] - Producer side: `post()` from any thread, never blocks
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Error taxonomy with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//!
//! ### Logging (`logging`)
//! - [`logging::init`] - File logging plus optional forwarding into the bridge
//! - [`logging::BridgeLayer`] - `tracing` layer that posts `LogMessage` events
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use weblobby_core::prelude::*;
//! ```

pub mod bridge;
pub mod error;
pub mod events;
pub mod logging;
pub mod prelude;

// Re-export commonly used types at crate root for convenience
pub use bridge::{EventBridge, EventPoster};
pub use error::{Error, Result};
pub use events::{Event, JobOutcome, LogLevel, Severity};
