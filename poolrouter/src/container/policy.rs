//! Operator-controlled container policy.
//!
//! The live policy sits behind a lock and is replaced wholesale on every
//! change; actors take an `Arc` snapshot at each decision point.

use crate::config::ContainerSettings;
use crate::location::SameHostPolicy;
use parking_lot::RwLock;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// What happens once a request has used up its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnError {
    /// Park the request until an operator or a pool event intervenes.
    Suspend,
    /// Answer every waiting client with the last error.
    Fail,
}

impl fmt::Display for OnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suspend => f.write_str("suspend"),
            Self::Fail => f.write_str("fail"),
        }
    }
}

impl FromStr for OnError {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "suspend" => Ok(Self::Suspend),
            "fail" => Ok(Self::Fail),
            _ => Err("must be 'suspend' or 'fail'".to_string()),
        }
    }
}

/// Snapshot of the container-wide policy.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerPolicy {
    pub retry_timer: Duration,
    pub max_retries: u32,
    pub on_error: OnError,
    pub warning_path: String,
    pub ping_interval: Duration,
    pub max_restore: Option<usize>,
    pub same_host_retry: SameHostPolicy,
    pub max_request_clumping: usize,
    pub sweep_interval: Duration,
    pub storage_info_timeout: Duration,
    pub send_hit_info: bool,
    pub send_cost_info: bool,
    /// New requests park in SUSPENDED instead of being processed.
    pub suspend_incoming: bool,
    /// Stage attempts park in SUSPENDED.
    pub suspend_staging: bool,
}

impl From<&ContainerSettings> for ContainerPolicy {
    fn from(settings: &ContainerSettings) -> Self {
        Self {
            retry_timer: Duration::from_secs(settings.retry_timer_secs),
            max_retries: settings.max_retries,
            on_error: settings.on_error,
            warning_path: settings.warning_path.clone(),
            ping_interval: Duration::from_secs(settings.ping_interval_secs),
            max_restore: settings.max_restore,
            same_host_retry: settings.same_host_retry,
            max_request_clumping: settings.max_request_clumping.max(1),
            sweep_interval: Duration::from_secs(settings.sweep_interval_secs.max(1)),
            storage_info_timeout: Duration::from_secs(settings.storage_info_timeout_secs),
            send_hit_info: settings.send_hit_info,
            send_cost_info: settings.send_cost_info,
            suspend_incoming: false,
            suspend_staging: false,
        }
    }
}

impl ContainerPolicy {
    /// Persistable settings for this policy. The suspend flags are not kept.
    pub fn to_settings(&self, max_workers: usize) -> ContainerSettings {
        ContainerSettings {
            retry_timer_secs: self.retry_timer.as_secs(),
            max_retries: self.max_retries,
            on_error: self.on_error,
            warning_path: self.warning_path.clone(),
            ping_interval_secs: self.ping_interval.as_secs(),
            max_restore: self.max_restore,
            same_host_retry: self.same_host_retry,
            max_request_clumping: self.max_request_clumping,
            max_workers,
            sweep_interval_secs: self.sweep_interval.as_secs(),
            storage_info_timeout_secs: self.storage_info_timeout.as_secs(),
            send_hit_info: self.send_hit_info,
            send_cost_info: self.send_cost_info,
        }
    }
}

impl Default for ContainerPolicy {
    fn default() -> Self {
        Self::from(&ContainerSettings::default())
    }
}

/// Copy-on-write holder of the live policy.
#[derive(Debug, Default)]
pub(crate) struct PolicyStore {
    current: RwLock<Arc<ContainerPolicy>>,
}

impl PolicyStore {
    pub(crate) fn new(policy: ContainerPolicy) -> Self {
        Self {
            current: RwLock::new(Arc::new(policy)),
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<ContainerPolicy> {
        Arc::clone(&self.current.read())
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut ContainerPolicy)) {
        let mut guard = self.current.write();
        let mut next = (**guard).clone();
        f(&mut next);
        *guard = Arc::new(next);
    }
}
