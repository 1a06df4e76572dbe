//! weblobby - headless lobby client
//!
//! Thin binary layer over `weblobby-app`: NDJSON event output on stdout and
//! line commands on stdin.

pub mod headless;

// Re-export main entry point
pub use headless::runner::run_headless;
