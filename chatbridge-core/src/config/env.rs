//! Environment variable interpolation and overrides

use super::error::ConfigError;
use super::schema::GatewayConfig;
use super::secrets::SecretString;
use regex::Regex;
use std::env;
use std::path::PathBuf;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static pattern compiles"));

/// Interpolate `${VAR}` references in a configuration document
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut result = content.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(content) {
        let var_name = &cap[1];
        let value = env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound {
            var: var_name.to_string(),
        })?;
        result = result.replace(&cap[0], &value);
    }

    Ok(result)
}

/// Apply the flat environment overrides the gateway has always honoured.
///
/// `PORT`, `PROVIDERS_DIR`, `FORWARD_API_KEY` and `UPSTREAM_TIMEOUT_SECS`
/// win over whatever the config file says.
pub fn apply_env_overrides(config: &mut GatewayConfig) -> Result<(), ConfigError> {
    if let Ok(port) = env::var("PORT") {
        config.server.port = port
            .parse()
            .map_err(|_| ConfigError::InvalidEnvVar {
                var: "PORT".to_string(),
                value: port.clone(),
            })?;
    }

    if let Ok(dir) = env::var("PROVIDERS_DIR") {
        config.providers_dir = PathBuf::from(dir);
    }

    if let Ok(key) = env::var("FORWARD_API_KEY") {
        if !key.is_empty() {
            config.upstream.forward_api_key = Some(SecretString::new(key));
        }
    }

    if let Ok(secs) = env::var("UPSTREAM_TIMEOUT_SECS") {
        config.upstream.request_timeout_ms = timeout_secs_to_ms(&secs)?;
    }

    Ok(())
}

fn timeout_secs_to_ms(value: &str) -> Result<u64, ConfigError> {
    value
        .parse::<u64>()
        .ok()
        .and_then(|secs| secs.checked_mul(1000))
        .ok_or_else(|| ConfigError::InvalidEnvVar {
            var: "UPSTREAM_TIMEOUT_SECS".to_string(),
            value: value.to_string(),
        })
}
