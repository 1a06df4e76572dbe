//! Configuration file parsing for weblobby
//!
//! A single `config.toml` in the platform config directory
//! (`~/.config/weblobby/config.toml` on Linux). Every section and key is
//! optional; missing values fall back to defaults.

pub mod settings;
pub mod types;

pub use settings::{config_path, load_settings, save_settings, CONFIG_ENV_VAR};
pub use types::*;
