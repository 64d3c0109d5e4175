//! Validation and parsing helpers for configuration values.

use crate::error::{ConfigError, ConfigResult};
use crate::model::{BridgeConfig, ServerProfile};

/// Validate a complete bridge configuration.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for the first offending field.
pub fn validate(config: &BridgeConfig) -> ConfigResult<()> {
    ensure_positive("bridge", "startup_timeout_ms", config.startup_timeout_ms)?;
    ensure_positive("bridge", "poll_interval_ms", config.poll_interval_ms)?;
    ensure_positive(
        "bridge",
        "event_bus_capacity",
        u64::try_from(config.event_bus_capacity).unwrap_or(u64::MAX),
    )?;
    ensure_non_empty("bridge", "thread_name", &config.thread_name)?;
    ensure_non_empty("logging", "level", &config.logging.level)?;
    if let Some(server) = &config.server {
        validate_server(server)?;
    }
    Ok(())
}

/// Validate a server profile.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for the first offending field.
pub fn validate_server(profile: &ServerProfile) -> ConfigResult<()> {
    ensure_non_empty("server", "address", &profile.address)?;
    if profile.port == 0 {
        return Err(ConfigError::InvalidField {
            section: "server",
            field: "port",
            value: Some(profile.port.to_string()),
            reason: "port must be between 1 and 65535",
        });
    }
    if !profile.api_path.starts_with('/') {
        return Err(ConfigError::InvalidField {
            section: "server",
            field: "api_path",
            value: Some(profile.api_path.clone()),
            reason: "path must start with '/'",
        });
    }
    ensure_positive("server", "update_interval_secs", profile.update_interval_secs)?;
    ensure_positive("server", "timeout_secs", profile.timeout_secs)?;
    if profile.authentication {
        ensure_non_empty("server", "username", &profile.username)?;
    }
    Ok(())
}

fn ensure_positive(section: &'static str, field: &'static str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::InvalidField {
            section,
            field,
            value: Some(value.to_string()),
            reason: "must be positive",
        });
    }
    Ok(())
}

fn ensure_non_empty(section: &'static str, field: &'static str, value: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidField {
            section,
            field,
            value: None,
            reason: "must not be empty",
        });
    }
    Ok(())
}

pub(crate) fn parse_unsigned(variable: &str, value: &str) -> ConfigResult<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidOverride {
            variable: variable.to_string(),
            value: value.to_string(),
            reason: "expected an unsigned integer",
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: ConfigResult<()>) -> Option<&'static str> {
        match result {
            Err(ConfigError::InvalidField { field, .. }) => Some(field),
            _ => None,
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate(&BridgeConfig::default()).is_ok());
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let config = BridgeConfig {
            poll_interval_ms: 0,
            ..BridgeConfig::default()
        };
        assert_eq!(field_of(validate(&config)), Some("poll_interval_ms"));

        let config = BridgeConfig {
            event_bus_capacity: 0,
            ..BridgeConfig::default()
        };
        assert_eq!(field_of(validate(&config)), Some("event_bus_capacity"));
    }

    #[test]
    fn server_profile_rules() {
        let profile = ServerProfile {
            address: "localhost".to_string(),
            ..ServerProfile::default()
        };
        assert!(validate_server(&profile).is_ok());

        let missing_address = ServerProfile::default();
        assert_eq!(field_of(validate_server(&missing_address)), Some("address"));

        let bad_port = ServerProfile {
            port: 0,
            ..profile.clone()
        };
        assert_eq!(field_of(validate_server(&bad_port)), Some("port"));

        let bad_path = ServerProfile {
            api_path: "rpc".to_string(),
            ..profile.clone()
        };
        assert_eq!(field_of(validate_server(&bad_path)), Some("api_path"));

        let anonymous_auth = ServerProfile {
            authentication: true,
            ..profile
        };
        assert_eq!(field_of(validate_server(&anonymous_auth)), Some("username"));
    }

    #[test]
    fn parse_unsigned_reports_variable() {
        assert_eq!(parse_unsigned("X", " 42 ").ok(), Some(42));
        match parse_unsigned("TRELLIS_POLL_INTERVAL_MS", "-1") {
            Err(ConfigError::InvalidOverride { variable, .. }) => {
                assert_eq!(variable, "TRELLIS_POLL_INTERVAL_MS");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
