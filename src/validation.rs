//! Input validation module
//!
//! Validates configuration-surface inputs before they reach the scheduler.
//! A rejected change must leave the prior configuration active, so every
//! check here happens before any state is touched.

use tracing::warn;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Device address constraints (host or host:port)
pub struct AddressConstraints;

impl AddressConstraints {
    /// DNS label plus dots; generous enough for mDNS names and IPv4.
    pub const MAX_LEN: usize = 253;
}

/// Run the derive-based validation of a request DTO and fold any field
/// errors into a single [`AppError::ValidationError`].
pub fn validate_request<T: Validate>(input: &T) -> AppResult<()> {
    if let Err(validation_errors) = input.validate() {
        let error_messages: Vec<String> = validation_errors
            .field_errors()
            .iter()
            .map(|(field, errors)| {
                let msgs: Vec<&str> = errors
                    .iter()
                    .filter_map(|e| e.message.as_ref().map(|c| c.as_ref()))
                    .collect();
                format!("{}: {}", field, msgs.join(", "))
            })
            .collect();

        warn!(errors = ?error_messages, "Request validation failed");
        return Err(AppError::ValidationError(error_messages.join("; ")));
    }

    Ok(())
}

/// Validate and normalize a device address (`host` or `host:port`).
///
/// Returns the trimmed address on success.
pub fn validate_device_address(address: &str) -> AppResult<String> {
    let address = address.trim();

    if address.is_empty() {
        return Err(AppError::ConfigError(
            "Device address must not be empty".to_string(),
        ));
    }

    if address.len() > AddressConstraints::MAX_LEN {
        return Err(AppError::ConfigError(format!(
            "Device address exceeds {} characters",
            AddressConstraints::MAX_LEN
        )));
    }

    let (host, port) = match address.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (address, None),
    };

    if host.is_empty() {
        return Err(AppError::ConfigError(format!(
            "Device address '{address}' has an empty host"
        )));
    }

    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
    {
        return Err(AppError::ConfigError(format!(
            "Device address '{address}' contains invalid characters"
        )));
    }

    if let Some(port) = port {
        let parsed: u16 = port.parse().map_err(|_| {
            AppError::ConfigError(format!("Device address '{address}' has an invalid port"))
        })?;
        if parsed == 0 {
            return Err(AppError::ConfigError(format!(
                "Device address '{address}' has an invalid port"
            )));
        }
    }

    Ok(address.to_string())
}

/// Validate a polling interval in milliseconds.
pub fn validate_poll_interval(interval_ms: u64) -> AppResult<u64> {
    if interval_ms == 0 {
        return Err(AppError::ConfigError(
            "Polling interval must be a positive number of milliseconds".to_string(),
        ));
    }
    Ok(interval_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_addresses() {
        assert_eq!(validate_device_address("192.168.122.79").unwrap(), "192.168.122.79");
        assert_eq!(validate_device_address("10.0.0.5:8080").unwrap(), "10.0.0.5:8080");
        assert_eq!(
            validate_device_address(" sensor-1.local ").unwrap(),
            "sensor-1.local"
        );
    }

    #[test]
    fn test_empty_address_rejected() {
        assert!(validate_device_address("").is_err());
        assert!(validate_device_address("   ").is_err());
    }

    #[test]
    fn test_bad_host_rejected() {
        assert!(validate_device_address("10.0.0.5 extra").is_err());
        assert!(validate_device_address("http://10.0.0.5").is_err());
        assert!(validate_device_address(":8080").is_err());
    }

    #[test]
    fn test_bad_port_rejected() {
        assert!(validate_device_address("10.0.0.5:not-a-port").is_err());
        assert!(validate_device_address("10.0.0.5:0").is_err());
        assert!(validate_device_address("10.0.0.5:70000").is_err());
    }

    #[test]
    fn test_overlong_address_rejected() {
        let address = "a".repeat(AddressConstraints::MAX_LEN + 1);
        assert!(validate_device_address(&address).is_err());
    }

    #[test]
    fn test_interval_validation() {
        assert_eq!(validate_poll_interval(1000).unwrap(), 1000);
        assert_eq!(validate_poll_interval(1).unwrap(), 1);
        assert!(validate_poll_interval(0).is_err());
    }
}
