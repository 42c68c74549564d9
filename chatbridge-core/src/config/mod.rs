//! Configuration module for the gateway
//!
//! Configuration is read from a YAML or JSON file with `${VAR}`
//! interpolation, then overlaid with a handful of flat environment
//! variables, then validated.

mod env;
mod error;
mod schema;
mod secrets;

pub use error::{ConfigError, ConfigResult, ValidationError, ValidationErrorKind};
pub use schema::{GatewayConfig, ServerConfig, UpstreamConfig};
pub use secrets::{is_sensitive_header, redact_header_value, SecretString};

use std::fs;
use std::path::Path;

/// Environment variable naming the config file read by [`load_from_env`]
pub const CONFIG_PATH_VAR: &str = "CHATBRIDGE_CONFIG";

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> ConfigResult<GatewayConfig> {
    let path = path.as_ref();
    let content = read_interpolated(path)?;

    let config: GatewayConfig =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        })?;

    config.validate()?;
    Ok(config)
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> ConfigResult<GatewayConfig> {
    let path = path.as_ref();
    let content = read_interpolated(path)?;

    let config: GatewayConfig =
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        })?;

    config.validate()?;
    Ok(config)
}

/// Load the process configuration.
///
/// Reads the file named by `CHATBRIDGE_CONFIG` when set (JSON if it ends in
/// `.json`, YAML otherwise), falls back to defaults, then applies the flat
/// environment overrides and validates the result.
pub fn load_from_env() -> ConfigResult<GatewayConfig> {
    let mut config = match std::env::var(CONFIG_PATH_VAR) {
        Ok(path) if path.ends_with(".json") => load_from_json(&path)?,
        Ok(path) => load_from_yaml(&path)?,
        Err(_) => GatewayConfig::default(),
    };

    env::apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn read_interpolated(path: &Path) -> ConfigResult<String> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;
    env::interpolate_env_vars(&content)
}
