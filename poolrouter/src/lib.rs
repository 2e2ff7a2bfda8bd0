//! poolrouter - request container for pool selection
//!
//! Clients ask "which pool can I read this file from?". The container clumps
//! identical questions onto one request actor, runs the cost-based selection
//! (read from a pool holding the file, copy it pool to pool, or restore it
//! from the archive) and answers every waiting client once a pool is ready.
//!
//! # High-Level API
//!
//! ```ignore
//! use poolrouter::config::ConfigFile;
//! use poolrouter::container::{Collaborators, Dispatcher};
//!
//! let config = ConfigFile::load()?;
//! let _guard = poolrouter::logging::init_logging(&config.logging)?;
//! let dispatcher = Dispatcher::new(&config, collaborators);
//! let _sweeper = dispatcher.start_sweeper();
//!
//! let selection = dispatcher.select_read_pool(request).await?;
//! println!("read from {}", selection.pool);
//! ```
//!
//! Pools answer through [`container::Dispatcher::route_reply`], the pool
//! monitor reports through [`container::Dispatcher::pool_status_changed`]
//! and operators drive the container with [`admin::execute`].

pub mod admin;
pub mod config;
pub mod container;
pub mod error;
pub mod location;
pub mod logging;
pub mod messages;
pub mod selection;
pub mod transport;

/// Version of the poolrouter library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
