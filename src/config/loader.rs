//! Configuration loading from the process environment.
//!
//! The proxy has no configuration file. The built-in defaults describe the
//! deployment and the `PORT` variable overrides the listen port.

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable holding the listen port.
pub const PORT_ENV: &str = "PORT";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid PORT value {value:?}: {source}")]
    Port {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from the process environment.
pub fn load_from_env() -> Result<ProxyConfig, ConfigError> {
    load_with(|key| std::env::var(key).ok())
}

/// Load and validate configuration using `lookup` to read variables.
pub fn load_with<F>(lookup: F) -> Result<ProxyConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ProxyConfig::default();

    if let Some(value) = lookup(PORT_ENV).filter(|v| !v.is_empty()) {
        let port: u16 = value.trim().parse().map_err(|source| ConfigError::Port {
            value: value.clone(),
            source,
        })?;
        config.listener.bind_address = format!("0.0.0.0:{}", port);
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_defaults_to_8080() {
        let config = load_with(|_| None).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn empty_port_is_ignored() {
        let config = load_with(|_| Some(String::new())).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn port_override() {
        let config = load_with(|key| (key == PORT_ENV).then(|| "3000".to_string())).unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:3000");
    }

    #[test]
    fn bad_port_is_fatal() {
        let err = load_with(|_| Some("eighty".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::Port { .. }));
        assert!(err.to_string().contains("PORT"));
    }
}
