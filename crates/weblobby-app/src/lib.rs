//! weblobby-app - Lobby orchestration for weblobby
//!
//! Owns the producers from `weblobby-daemon` behind one [`Lobby`], loads
//! [`config::Settings`], provides the [`files`] helpers for the game
//! install, and defines the [`EventHandler`] seam a UI layer
//! implements to receive events on its own thread.

pub mod config;
pub mod engine;
pub mod files;
pub mod handler;

// Re-export primary types
pub use config::Settings;
pub use engine::Lobby;
pub use handler::{EventHandler, EventLog};

// Re-export producer types the UI layer works with
pub use weblobby_daemon::{CancelToken, FetchOutcome, JobHandle};
