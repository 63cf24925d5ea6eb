use std::collections::HashSet;

use tokio::sync::Semaphore;

use crate::{
    config::models::{ProxyConfig, RouteConfig, TargetConfig},
    core::backend::BackendUrl,
};

/// Paths the proxy always answers itself.
pub const RESERVED_PATHS: [&str; 2] = ["/", "/health"];

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ConfigError>;

/// Startup configuration errors. Any of these prevents the listener from being bound.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Missing URL for target '{name}'{}", env_hint(.env_var))]
    MissingTarget {
        name: String,
        env_var: Option<String>,
    },

    #[error("Invalid URL '{url}' for target '{name}': {reason}")]
    InvalidTargetUrl {
        name: String,
        url: String,
        reason: String,
    },

    #[error("Route '{prefix}' references unknown target '{target}'")]
    UnknownTarget { prefix: String, target: String },

    #[error("Invalid route prefix '{prefix}': {reason}")]
    InvalidPrefix { prefix: String, reason: String },

    #[error("Route prefix '{prefix}' is registered more than once")]
    DuplicatePrefix { prefix: String },

    #[error("Fallback references unknown target '{target}'")]
    UnknownFallback { target: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("{}", join_errors(.0))]
    Multiple(Vec<ConfigError>),
}

fn env_hint(env_var: &Option<String>) -> String {
    match env_var {
        Some(var) => format!(" (set the {var} environment variable)"),
        None => String::new(),
    }
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConfigError {
    /// Flatten into the individual issues.
    pub fn issues(&self) -> Vec<&ConfigError> {
        match self {
            ConfigError::Multiple(errors) => errors.iter().collect(),
            other => vec![other],
        }
    }
}

/// Strip trailing slashes so `/network/` and `/network` are the same binding.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Proxy configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire configuration, reporting every issue found.
    pub fn validate(config: &ProxyConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if config.host.trim().is_empty() {
            errors.push(ConfigError::InvalidField {
                field: "host".to_string(),
                message: "Listen host must not be empty".to_string(),
            });
        }

        errors.extend(Self::validate_upstream(config));

        if config.routes.is_empty() && config.fallback.is_none() {
            errors.push(ConfigError::InvalidField {
                field: "routes".to_string(),
                message: "At least one route or a fallback target is required".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for route in &config.routes {
            if let Err(e) = Self::validate_route(config, route, &mut seen) {
                errors.push(e);
            }
        }

        if let Some(fallback) = &config.fallback {
            if !config.targets.contains_key(fallback) {
                errors.push(ConfigError::UnknownFallback {
                    target: fallback.clone(),
                });
            }
        }

        for (name, target) in &config.targets {
            let referenced = config.fallback.as_deref() == Some(name.as_str())
                || config.routes.iter().any(|r| &r.target == name);
            if let Err(e) = Self::validate_target(name, target, referenced) {
                errors.push(e);
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::Multiple(errors)),
        }
    }

    fn validate_upstream(config: &ProxyConfig) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let upstream = &config.upstream;
        if upstream.request_timeout_secs == 0 {
            errors.push(ConfigError::InvalidField {
                field: "upstream.request_timeout_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }
        if upstream.connect_timeout_secs == 0 {
            errors.push(ConfigError::InvalidField {
                field: "upstream.connect_timeout_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }
        if upstream.max_connections_per_target == 0 {
            errors.push(ConfigError::InvalidField {
                field: "upstream.max_connections_per_target".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        } else if upstream.max_connections_per_target > Semaphore::MAX_PERMITS {
            errors.push(ConfigError::InvalidField {
                field: "upstream.max_connections_per_target".to_string(),
                message: format!("Must be at most {}", Semaphore::MAX_PERMITS),
            });
        }
        errors
    }

    fn validate_route(
        config: &ProxyConfig,
        route: &RouteConfig,
        seen: &mut HashSet<String>,
    ) -> ValidationResult<()> {
        Self::validate_prefix(&route.prefix)?;

        if !seen.insert(normalize_prefix(&route.prefix)) {
            return Err(ConfigError::DuplicatePrefix {
                prefix: route.prefix.clone(),
            });
        }

        if !config.targets.contains_key(&route.target) {
            return Err(ConfigError::UnknownTarget {
                prefix: route.prefix.clone(),
                target: route.target.clone(),
            });
        }
        Ok(())
    }

    /// Validate a single prefix.
    pub fn validate_prefix(prefix: &str) -> ValidationResult<()> {
        let invalid = |reason: &str| ConfigError::InvalidPrefix {
            prefix: prefix.to_string(),
            reason: reason.to_string(),
        };

        if !prefix.starts_with('/') {
            return Err(invalid("Route prefixes must start with '/'"));
        }
        if prefix.contains(['?', '#']) || prefix.chars().any(char::is_whitespace) {
            return Err(invalid(
                "Route prefixes must not contain whitespace, '?' or '#'",
            ));
        }
        if prefix.contains("//") {
            return Err(invalid("Route prefixes must not contain empty segments"));
        }

        let normalized = normalize_prefix(prefix);
        if RESERVED_PATHS.contains(&normalized.as_str()) {
            return Err(invalid("This path is answered by the proxy itself"));
        }
        Ok(())
    }

    fn validate_target(name: &str, target: &TargetConfig, referenced: bool) -> ValidationResult<()> {
        match target.url.as_deref() {
            Some(url) => BackendUrl::new(url)
                .map(|_| ())
                .map_err(|e| ConfigError::InvalidTargetUrl {
                    name: name.to_string(),
                    url: url.to_string(),
                    reason: e.to_string(),
                }),
            None if referenced => Err(ConfigError::MissingTarget {
                name: name.to_string(),
                env_var: target.url_env.clone(),
            }),
            None => {
                tracing::warn!(target_name = %name, "Target has no URL and no route uses it");
                Ok(())
            }
        }
    }
}
