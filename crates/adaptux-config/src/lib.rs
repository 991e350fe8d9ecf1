//! # adaptux configuration
//!
//! Configuration schema and loading for the adaptux decision pipeline.
//!
//! A config document carries the active profile, the declared signal names,
//! the raw rule documents and free-form styling/feature maps. Loading never
//! fails on a field with the wrong shape: the field falls back to its default
//! and a warning is logged. Only unreadable files and syntax errors are
//! reported as [`ConfigError`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use adaptux_config::ConfigLoader;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loaded = ConfigLoader::load_from_file("adaptux.toml")?;
//!     for warning in &loaded.warnings {
//!         eprintln!("{warning}");
//!     }
//!     println!("profile: {}", loaded.config.profile);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod loader;
mod normalize;

pub use config::{AdaptConfig, DEFAULT_MAX_PROPAGATION_DEPTH, DEFAULT_PROFILE};
pub use loader::{ConfigError, ConfigFormat, ConfigLoader, LoadedConfig};
pub use normalize::{normalize_config, normalize_config_with_warnings, ConfigWarning};
