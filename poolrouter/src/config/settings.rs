//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use crate::container::OnError;
use crate::location::{PoolManagerParameters, SameHostPolicy};
use std::path::PathBuf;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// Request container settings
    pub container: ContainerSettings,
    /// Default partition parameters
    pub partition: PoolManagerParameters,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Request container configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSettings {
    /// Delay before a failed request is retried, in seconds.
    pub retry_timer_secs: u64,
    /// Number of attempts before the on-error policy applies.
    pub max_retries: u32,
    /// What happens once retries are exhausted.
    pub on_error: OnError,
    /// Destination of operator warnings.
    pub warning_path: String,
    /// Liveness check interval in seconds. 0 disables pinging.
    pub ping_interval_secs: u64,
    /// Maximum number of concurrent stage requests. `None` is unlimited.
    pub max_restore: Option<usize>,
    /// Same-host policy when a stage is retried on another pool.
    pub same_host_retry: SameHostPolicy,
    /// Client requests answered per pass through DONE.
    pub max_request_clumping: usize,
    /// Maximum concurrently running actors. 0 is unlimited.
    pub max_workers: usize,
    /// Period of the liveness sweep in seconds.
    pub sweep_interval_secs: u64,
    /// Bound on storage descriptor lookups in seconds.
    pub storage_info_timeout_secs: u64,
    /// Emit cache hit/miss notifications.
    pub send_hit_info: bool,
    /// Emit cost notifications when a high-cost pool is accepted.
    pub send_cost_info: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Directory holding the log file
    pub directory: PathBuf,
    /// Log file name
    pub file: String,
}
