//! Configuration loading from JSON documents and `TRELLIS_*` environment overrides.

use std::fs;
use std::path::Path;

use tracing::debug;
use trellis_telemetry::LogFormat;

use crate::error::{ConfigError, ConfigResult};
use crate::model::BridgeConfig;
use crate::validate::{parse_unsigned, validate};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "TRELLIS_";

const STARTUP_TIMEOUT_MS: &str = "TRELLIS_STARTUP_TIMEOUT_MS";
const POLL_INTERVAL_MS: &str = "TRELLIS_POLL_INTERVAL_MS";
const EVENT_BUS_CAPACITY: &str = "TRELLIS_EVENT_BUS_CAPACITY";
const LOG_LEVEL: &str = "TRELLIS_LOG_LEVEL";
const LOG_FORMAT: &str = "TRELLIS_LOG_FORMAT";

/// Read a configuration document from disk.
///
/// Missing fields take their defaults. The result is not validated.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read and
/// [`ConfigError::Parse`] when it does not match the model.
pub fn load_from_path(path: impl AsRef<Path>) -> ConfigResult<BridgeConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply overrides from the process environment.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidOverride`] when a numeric override does not parse.
pub fn apply_env_overrides(config: &mut BridgeConfig) -> ConfigResult<()> {
    apply_overrides_from(config, |name| std::env::var(name).ok())
}

/// Apply overrides resolved through `lookup`, which maps a variable name to its value.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidOverride`] when a numeric override does not parse.
pub fn apply_overrides_from<F>(config: &mut BridgeConfig, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(STARTUP_TIMEOUT_MS) {
        config.startup_timeout_ms = parse_unsigned(STARTUP_TIMEOUT_MS, &value)?;
        debug!(variable = STARTUP_TIMEOUT_MS, %value, "applied override");
    }
    if let Some(value) = lookup(POLL_INTERVAL_MS) {
        config.poll_interval_ms = parse_unsigned(POLL_INTERVAL_MS, &value)?;
        debug!(variable = POLL_INTERVAL_MS, %value, "applied override");
    }
    if let Some(value) = lookup(EVENT_BUS_CAPACITY) {
        let capacity = parse_unsigned(EVENT_BUS_CAPACITY, &value)?;
        config.event_bus_capacity =
            usize::try_from(capacity).map_err(|_| ConfigError::InvalidOverride {
                variable: EVENT_BUS_CAPACITY.to_string(),
                value: value.clone(),
                reason: "value does not fit the platform word size",
            })?;
        debug!(variable = EVENT_BUS_CAPACITY, %value, "applied override");
    }
    if let Some(value) = lookup(LOG_LEVEL) {
        debug!(variable = LOG_LEVEL, %value, "applied override");
        config.logging.level = value;
    }
    if let Some(value) = lookup(LOG_FORMAT) {
        config.logging.format = LogFormat::from_name(&value);
        debug!(variable = LOG_FORMAT, %value, "applied override");
    }
    Ok(())
}

/// Load, override and validate a configuration.
///
/// Without a path the defaults are used as the base document.
///
/// # Errors
///
/// Returns any loading, override or validation error.
pub fn load(path: Option<&Path>) -> ConfigResult<BridgeConfig> {
    let mut config = match path {
        Some(path) => load_from_path(path)?,
        None => BridgeConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    validate(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn overrides_replace_document_values() -> ConfigResult<()> {
        let mut config = BridgeConfig::default();
        apply_overrides_from(
            &mut config,
            lookup_from(&[
                ("TRELLIS_STARTUP_TIMEOUT_MS", "750"),
                ("TRELLIS_POLL_INTERVAL_MS", "20"),
                ("TRELLIS_EVENT_BUS_CAPACITY", "64"),
                ("TRELLIS_LOG_LEVEL", "debug"),
                ("TRELLIS_LOG_FORMAT", "json"),
            ]),
        )?;
        assert_eq!(config.startup_timeout_ms, 750);
        assert_eq!(config.poll_interval_ms, 20);
        assert_eq!(config.event_bus_capacity, 64);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        Ok(())
    }

    #[test]
    fn absent_overrides_leave_config_untouched() -> ConfigResult<()> {
        let mut config = BridgeConfig::default();
        apply_overrides_from(&mut config, lookup_from(&[]))?;
        assert_eq!(config, BridgeConfig::default());
        Ok(())
    }

    #[test]
    fn malformed_override_is_reported() {
        let mut config = BridgeConfig::default();
        let result = apply_overrides_from(
            &mut config,
            lookup_from(&[("TRELLIS_POLL_INTERVAL_MS", "fast")]),
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidOverride { reason: "expected an unsigned integer", .. })
        ));
    }
}
