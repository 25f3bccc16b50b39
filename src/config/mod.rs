//! Configuration module for kelda-fetch
//!
//! Loads config from `$XDG_CONFIG_HOME/kelda-fetch/config.toml` or `~/.config/kelda-fetch/config.toml`.
//! Falls back to built-in defaults if the file doesn't exist.
//! Partial configs are merged with defaults using serde's default attributes.
//!
//! # Example
//!
//! ```no_run
//! use kelda_fetch::config::Config;
//!
//! let config = Config::load().expect("Failed to load config");
//! println!("Release index: {}", config.release.index_url);
//! println!("Installs as: {}", config.release.install_name);
//! ```

pub mod schema;

pub use schema::Config;
