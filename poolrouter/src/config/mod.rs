//! Configuration for the request container.
//!
//! The configuration lives in an INI file (default
//! `~/.poolrouter/config.ini`) with three sections:
//!
//! ```text
//! [container]   retry policy, liveness check, clumping, worker pool
//! [partition]   default tunable parameters for pool selection
//! [logging]     log file location
//! ```
//!
//! Loading starts from the defaults and overlays whatever keys are present.
//! A missing file yields the defaults.
//!
//! # Example
//!
//! ```
//! use poolrouter::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! assert_eq!(config.container.max_retries, 3);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub(crate) use parser::parse_limit;
pub use file::ConfigFileError;
pub use settings::{ConfigFile, ContainerSettings, LoggingSettings};
