//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::container::OnError;
use crate::location::SameHostPolicy;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [container] section
    if let Some(section) = ini.section(Some("container")) {
        let c = &mut config.container;
        if let Some(v) = section.get("retry_timer_secs") {
            c.retry_timer_secs = parse_number(v, "container", "retry_timer_secs")?;
        }
        if let Some(v) = section.get("max_retries") {
            c.max_retries = parse_number(v, "container", "max_retries")?;
        }
        if let Some(v) = section.get("on_error") {
            c.on_error = v.parse::<OnError>().map_err(|reason| ConfigFileError::InvalidValue {
                section: "container".to_string(),
                key: "on_error".to_string(),
                value: v.to_string(),
                reason,
            })?;
        }
        if let Some(v) = section.get("warning_path") {
            let v = v.trim();
            if !v.is_empty() {
                c.warning_path = v.to_string();
            }
        }
        if let Some(v) = section.get("ping_interval_secs") {
            c.ping_interval_secs = parse_number(v, "container", "ping_interval_secs")?;
        }
        if let Some(v) = section.get("max_restore") {
            c.max_restore = parse_limit(v).map_err(|reason| ConfigFileError::InvalidValue {
                section: "container".to_string(),
                key: "max_restore".to_string(),
                value: v.to_string(),
                reason,
            })?;
        }
        if let Some(v) = section.get("same_host_retry") {
            c.same_host_retry = parse_same_host(v, "container", "same_host_retry")?;
        }
        if let Some(v) = section.get("max_request_clumping") {
            let n: usize = parse_number(v, "container", "max_request_clumping")?;
            if n == 0 {
                return Err(ConfigFileError::InvalidValue {
                    section: "container".to_string(),
                    key: "max_request_clumping".to_string(),
                    value: v.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            c.max_request_clumping = n;
        }
        if let Some(v) = section.get("max_workers") {
            c.max_workers = parse_number(v, "container", "max_workers")?;
        }
        if let Some(v) = section.get("sweep_interval_secs") {
            let n: u64 = parse_number(v, "container", "sweep_interval_secs")?;
            if n == 0 {
                return Err(ConfigFileError::InvalidValue {
                    section: "container".to_string(),
                    key: "sweep_interval_secs".to_string(),
                    value: v.to_string(),
                    reason: "must be a positive integer (seconds)".to_string(),
                });
            }
            c.sweep_interval_secs = n;
        }
        if let Some(v) = section.get("storage_info_timeout_secs") {
            c.storage_info_timeout_secs =
                parse_number(v, "container", "storage_info_timeout_secs")?;
        }
        if let Some(v) = section.get("send_hit_info") {
            c.send_hit_info = parse_bool(v);
        }
        if let Some(v) = section.get("send_cost_info") {
            c.send_cost_info = parse_bool(v);
        }
    }

    // [partition] section
    if let Some(section) = ini.section(Some("partition")) {
        let p = &mut config.partition;
        overlay_bool(section, "p2p_allowed", &mut p.p2p_allowed);
        overlay_bool(section, "p2p_on_cost", &mut p.p2p_on_cost);
        overlay_bool(section, "p2p_for_transfer", &mut p.p2p_for_transfer);
        overlay_bool(section, "has_hsm_backend", &mut p.has_hsm_backend);
        overlay_bool(section, "stage_on_cost", &mut p.stage_on_cost);

        if let Some(v) = section.get("max_copies") {
            p.max_copies = parse_number(v, "partition", "max_copies")?;
        }
        for (key, field) in [
            ("slope", &mut p.slope),
            ("min_cost_cut", &mut p.min_cost_cut),
            ("cost_cut", &mut p.cost_cut),
            ("alert_cost_cut", &mut p.alert_cost_cut),
            ("panic_cost_cut", &mut p.panic_cost_cut),
            ("fallback_cost_cut", &mut p.fallback_cost_cut),
        ] {
            if let Some(v) = section.get(key) {
                *field = parse_cost(v, key)?;
            }
        }
        if let Some(v) = section.get("same_host_copy") {
            p.same_host_copy = parse_same_host(v, "partition", "same_host_copy")?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
    }

    Ok(config)
}

fn parse_number<T: FromStr>(value: &str, section: &str, key: &str) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigFileError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be a non-negative integer".to_string(),
        })
}

fn parse_cost(value: &str, key: &str) -> Result<f64, ConfigFileError> {
    match value.trim().parse::<f64>() {
        Ok(v) if v >= 0.0 && v.is_finite() => Ok(v),
        _ => Err(ConfigFileError::InvalidValue {
            section: "partition".to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be a non-negative number (0 disables)".to_string(),
        }),
    }
}

fn parse_same_host(value: &str, section: &str, key: &str) -> Result<SameHostPolicy, ConfigFileError> {
    value.parse().map_err(|_| ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: "must be one of: never, besteffort, notchecked".to_string(),
    })
}

fn overlay_bool(section: &Properties, key: &str, field: &mut bool) {
    if let Some(v) = section.get(key) {
        *field = parse_bool(v);
    }
}

/// Parse a count limit where `unlimited` (or a negative number) means no limit.
pub(crate) fn parse_limit(value: &str) -> Result<Option<usize>, String> {
    let v = value.trim().to_lowercase();
    if v == "unlimited" {
        return Ok(None);
    }
    match v.parse::<i64>() {
        Ok(n) if n < 0 => Ok(None),
        Ok(n) => Ok(Some(n as usize)),
        Err(_) => Err("must be a number or 'unlimited'".to_string()),
    }
}

/// Parse a boolean value from string.
pub(crate) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;
    use crate::config::settings::ConfigFile;
    use tempfile::TempDir;

    fn load(content: &str) -> Result<ConfigFile, ConfigFileError> {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");
        std::fs::write(&config_path, content).unwrap();
        ConfigFile::load_from(&config_path)
    }

    #[test]
    fn test_container_section_overlay() {
        let config = load(
            r#"
[container]
retry_timer_secs = 60
max_retries = 5
on_error = fail
warning_path = alarms
ping_interval_secs = 0
max_restore = 20
same_host_retry = never
max_request_clumping = 4
send_hit_info = yes
"#,
        )
        .unwrap();

        let c = &config.container;
        assert_eq!(c.retry_timer_secs, 60);
        assert_eq!(c.max_retries, 5);
        assert_eq!(c.on_error, OnError::Fail);
        assert_eq!(c.warning_path, "alarms");
        assert_eq!(c.ping_interval_secs, 0);
        assert_eq!(c.max_restore, Some(20));
        assert_eq!(c.same_host_retry, SameHostPolicy::Never);
        assert_eq!(c.max_request_clumping, 4);
        assert!(c.send_hit_info);
        assert!(!c.send_cost_info);
        assert_eq!(c.sweep_interval_secs, DEFAULT_SWEEP_INTERVAL_SECS);
    }

    #[test]
    fn test_partition_section_overlay() {
        let config = load(
            r#"
[partition]
has_hsm_backend = true
p2p_on_cost = on
cost_cut = 0.5
slope = 1.5
max_copies = 3
same_host_copy = never
"#,
        )
        .unwrap();

        let p = &config.partition;
        assert!(p.has_hsm_backend);
        assert!(p.p2p_on_cost);
        assert!(p.p2p_allowed);
        assert_eq!(p.cost_cut, 0.5);
        assert_eq!(p.slope, 1.5);
        assert_eq!(p.max_copies, 3);
        assert_eq!(p.same_host_copy, SameHostPolicy::Never);
    }

    #[test]
    fn test_invalid_on_error() {
        let result = load("[container]\non_error = explode\n");
        assert!(matches!(
            result,
            Err(ConfigFileError::InvalidValue { ref key, .. }) if key == "on_error"
        ));
    }

    #[test]
    fn test_invalid_cost_cut() {
        let result = load("[partition]\ncost_cut = -1\n");
        assert!(matches!(
            result,
            Err(ConfigFileError::InvalidValue { ref key, .. }) if key == "cost_cut"
        ));
    }

    #[test]
    fn test_zero_clumping_rejected() {
        let result = load("[container]\nmax_request_clumping = 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit("unlimited"), Ok(None));
        assert_eq!(parse_limit("-1"), Ok(None));
        assert_eq!(parse_limit("12"), Ok(Some(12)));
        assert!(parse_limit("lots").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("ON"));
        assert!(parse_bool(" 1 "));
        assert!(!parse_bool("off"));
        assert!(!parse_bool("nope"));
    }

    #[test]
    fn test_logging_section() {
        let config = load("[logging]\ndirectory = /var/log/poolrouter\nfile = rc.log\n").unwrap();
        assert_eq!(
            config.logging.directory,
            PathBuf::from("/var/log/poolrouter")
        );
        assert_eq!(config.logging.file, "rc.log");
    }
}
