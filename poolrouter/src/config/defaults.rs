//! Default values and constants for all configuration settings.
//!
//! Contains all `DEFAULT_*` constants and the `ConfigFile::default()`
//! implementation.

use super::settings::*;
use crate::container::OnError;
use crate::location::{PoolManagerParameters, SameHostPolicy};

// =============================================================================
// [container]
// =============================================================================

/// Default retry timer: 15 minutes.
pub const DEFAULT_RETRY_TIMER_SECS: u64 = 15 * 60;

/// Default number of attempts before the on-error policy applies.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default destination of operator warnings.
pub const DEFAULT_WARNING_PATH: &str = "billing";

/// Default liveness check interval: 10 minutes.
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 10 * 60;

/// Default number of client requests answered per DONE pass.
pub const DEFAULT_MAX_REQUEST_CLUMPING: usize = 1;

/// Default worker limit (0 = unlimited).
pub const DEFAULT_MAX_WORKERS: usize = 0;

/// Default liveness sweep period.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default bound on storage descriptor lookups.
pub const DEFAULT_STORAGE_INFO_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// [logging]
// =============================================================================

/// Default log directory, relative to the working directory.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "poolrouter.log";

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            retry_timer_secs: DEFAULT_RETRY_TIMER_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            on_error: OnError::Suspend,
            warning_path: DEFAULT_WARNING_PATH.to_string(),
            ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
            max_restore: None,
            same_host_retry: SameHostPolicy::NotChecked,
            max_request_clumping: DEFAULT_MAX_REQUEST_CLUMPING,
            max_workers: DEFAULT_MAX_WORKERS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            storage_info_timeout_secs: DEFAULT_STORAGE_INFO_TIMEOUT_SECS,
            send_hit_info: false,
            send_cost_info: false,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: DEFAULT_LOG_DIR.into(),
            file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            container: ContainerSettings::default(),
            partition: PoolManagerParameters::default(),
            logging: LoggingSettings::default(),
        }
    }
}
