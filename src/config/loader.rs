use std::{collections::HashMap, path::Path};

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::{models::ProxyConfig, validation::ConfigError};

/// Prefix of structured environment overrides, e.g. `PROXY_UPSTREAM__REQUEST_TIMEOUT_SECS`.
pub const ENV_PREFIX: &str = "PROXY";

/// Load configuration from an optional file plus the process environment.
///
/// Without a file the built-in defaults are used, so a bare deployment only
/// needs the target URL variables set.
pub fn load_config(config_path: Option<&str>) -> Result<ProxyConfig> {
    let env: HashMap<String, String> = std::env::vars().collect();
    load_config_with_env(config_path.map(Path::new), &env)
}

/// Load configuration against an explicit environment map.
///
/// Layering, lowest to highest precedence: struct defaults, the config file,
/// `PROXY_*` overrides, the legacy `HOST` / `PORT` variables. Target `url_env`
/// references are resolved last.
pub fn load_config_with_env(
    config_path: Option<&Path>,
    env: &HashMap<String, String>,
) -> Result<ProxyConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        let name = path
            .to_str()
            .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", path.display()))?;
        builder = builder.add_source(File::new(name, file_format(path)).required(true));
    }

    let overrides: config::Map<String, String> = env
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(Some(overrides)),
    );

    let settings = builder.build().with_context(|| match config_path {
        Some(path) => format!("Failed to build config from {}", path.display()),
        None => "Failed to build config from environment".to_string(),
    })?;

    let mut proxy_config: ProxyConfig = settings
        .try_deserialize()
        .context("Failed to deserialize proxy configuration")?;

    apply_legacy_env(&mut proxy_config, env)?;
    resolve_target_urls(&mut proxy_config, env);

    Ok(proxy_config)
}

/// Determine file format based on extension.
fn file_format(path: &Path) -> FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        _ => FileFormat::Toml,
    }
}

/// `HOST` and `PORT` predate the `PROXY_` namespace and still win over it.
fn apply_legacy_env(
    proxy_config: &mut ProxyConfig,
    env: &HashMap<String, String>,
) -> Result<(), ConfigError> {
    if let Some(host) = non_empty(env, "HOST") {
        proxy_config.host = host.to_string();
    }
    if let Some(port) = non_empty(env, "PORT") {
        proxy_config.port = port.parse().map_err(|_| ConfigError::InvalidField {
            field: "PORT".to_string(),
            message: format!("'{port}' is not a valid port number"),
        })?;
    }
    Ok(())
}

fn resolve_target_urls(proxy_config: &mut ProxyConfig, env: &HashMap<String, String>) {
    for (name, target) in proxy_config.targets.iter_mut() {
        let Some(var) = target.url_env.as_deref() else {
            continue;
        };
        match non_empty(env, var) {
            Some(url) => {
                tracing::debug!(target_name = %name, env_var = %var, "Target URL taken from environment");
                target.url = Some(url.to_string());
            }
            None if target.url.is_none() => {
                tracing::debug!(target_name = %name, env_var = %var, "Target URL variable is unset");
            }
            None => {}
        }
    }
}

fn non_empty<'a>(env: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    env.get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}
