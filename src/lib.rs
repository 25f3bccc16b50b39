pub mod config;
pub mod error;
pub mod installer;
pub mod manifest;
pub mod release;

pub use error::{FetchError, Result};
pub use installer::{Installer, Outcome, Stage, StageError};
