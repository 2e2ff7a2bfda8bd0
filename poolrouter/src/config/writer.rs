//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`, and shown by
//! the `dump setup` admin command.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let c = &config.container;
    let p = &config.partition;
    let max_restore = c
        .max_restore
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unlimited".to_string());

    format!(
        r#"[container]
; Delay before a failed request is retried, in seconds (default: 900)
retry_timer_secs = {}
; Attempts before the on-error policy applies (default: 3)
max_retries = {}
; What to do once retries are exhausted:
;   suspend - keep the request until an operator retries or fails it
;   fail    - answer all waiting clients with the last error
on_error = {}
; Destination of operator warning messages
warning_path = {}
; Liveness check interval for running stages and copies, in seconds (0 disables)
ping_interval_secs = {}
; Maximum concurrent stage requests, or 'unlimited'
max_restore = {}
; Pool choice when a stage is retried: never, besteffort, notchecked
same_host_retry = {}
; Client requests answered per completed decision (default: 1)
max_request_clumping = {}
; Maximum concurrently running request actors (0 = unlimited)
max_workers = {}
; Liveness sweep period in seconds (default: 60)
sweep_interval_secs = {}
; Bound on storage descriptor lookups in seconds (default: 30)
storage_info_timeout_secs = {}
send_hit_info = {}
send_cost_info = {}

[partition]
p2p_allowed = {}
p2p_on_cost = {}
p2p_for_transfer = {}
has_hsm_backend = {}
stage_on_cost = {}
; Destination pools must be cheaper than slope * source cost (<= 0.01 disables)
slope = {}
max_copies = {}
; Cost thresholds, 0 disables the check
min_cost_cut = {}
cost_cut = {}
alert_cost_cut = {}
panic_cost_cut = {}
fallback_cost_cut = {}
; Pool-to-pool copies on the same host: never, besteffort, notchecked
same_host_copy = {}

[logging]
directory = {}
file = {}
"#,
        c.retry_timer_secs,
        c.max_retries,
        c.on_error,
        c.warning_path,
        c.ping_interval_secs,
        max_restore,
        c.same_host_retry,
        c.max_request_clumping,
        c.max_workers,
        c.sweep_interval_secs,
        c.storage_info_timeout_secs,
        c.send_hit_info,
        c.send_cost_info,
        p.p2p_allowed,
        p.p2p_on_cost,
        p.p2p_for_transfer,
        p.has_hsm_backend,
        p.stage_on_cost,
        p.slope,
        p.max_copies,
        p.min_cost_cut,
        p.cost_cut,
        p.alert_cost_cut,
        p.panic_cost_cut,
        p.fallback_cost_cut,
        p.same_host_copy,
        path_to_string(&config.logging.directory),
        config.logging.file,
    )
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
