//! Configuration data structures for Switchyard.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files and to
//! `PROXY_*` environment overrides. Every struct carries defaults so that an empty
//! configuration reproduces the stock two-backend deployment.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Environment variable holding the base URL of the `network` backend.
pub const DEFAULT_NETWORK_URL_ENV: &str = "BOT_A_URL";
/// Environment variable holding the base URL of the `fogochain` backend.
pub const DEFAULT_FOGOCHAIN_URL_ENV: &str = "BOT_B_URL";

/// A named backend service.
///
/// `url_env`, when set and present in the environment with a non-empty value,
/// takes precedence over `url`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TargetConfig {
    pub url: Option<String>,
    pub url_env: Option<String>,
}

impl TargetConfig {
    /// A target whose URL is read from the named environment variable.
    pub fn from_env(var: impl Into<String>) -> Self {
        Self {
            url: None,
            url_env: Some(var.into()),
        }
    }

    /// A target with a literal base URL.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            url_env: None,
        }
    }
}

/// Binds a path prefix to a named target.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    /// Path prefix, e.g. `/network`.
    pub prefix: String,
    /// Name of an entry in [`ProxyConfig::targets`].
    pub target: String,
    /// Human readable label shown on the landing page.
    #[serde(default)]
    pub title: Option<String>,
}

/// Outbound call limits.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Deadline for the upstream response head, including any wait for a
    /// connection permit. Also the longest a relayed body may go without a frame.
    pub request_timeout_secs: u64,
    /// Deadline for establishing the TCP (and TLS) connection.
    pub connect_timeout_secs: u64,
    /// Maximum concurrent outbound requests per target, at most
    /// `Semaphore::MAX_PERMITS`.
    pub max_connections_per_target: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 5,
            max_connections_per_target: 256,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub service_name: String,
    pub targets: BTreeMap<String, TargetConfig>,
    pub routes: Vec<RouteConfig>,
    /// Target used for paths that match no registered prefix. `None` means such
    /// paths are answered with 404.
    pub fallback: Option<String>,
    pub upstream: UpstreamConfig,
    /// How long in-flight requests may keep running after a shutdown signal.
    pub shutdown_grace_secs: u64,
    pub logging: LoggingConfig,
}

impl ProxyConfig {
    /// Create a new configuration builder starting from an empty route set.
    pub fn builder() -> ProxyConfigBuilder {
        ProxyConfigBuilder::default()
    }

    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        let mut targets = BTreeMap::new();
        targets.insert(
            "network".to_string(),
            TargetConfig::from_env(DEFAULT_NETWORK_URL_ENV),
        );
        targets.insert(
            "fogochain".to_string(),
            TargetConfig::from_env(DEFAULT_FOGOCHAIN_URL_ENV),
        );

        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            service_name: "Switchyard Proxy".to_string(),
            targets,
            routes: vec![
                RouteConfig {
                    prefix: "/network".to_string(),
                    target: "network".to_string(),
                    title: Some("Network Dashboard".to_string()),
                },
                RouteConfig {
                    prefix: "/fogochain".to_string(),
                    target: "fogochain".to_string(),
                    title: Some("FogoChain Dashboard".to_string()),
                },
            ],
            fallback: None,
            upstream: UpstreamConfig::default(),
            shutdown_grace_secs: 10,
            logging: LoggingConfig::default(),
        }
    }
}

/// Builder for [`ProxyConfig`], mostly used by tests and embedders that do not
/// want the stock route layout.
pub struct ProxyConfigBuilder {
    config: ProxyConfig,
}

impl Default for ProxyConfigBuilder {
    fn default() -> Self {
        Self {
            config: ProxyConfig {
                targets: BTreeMap::new(),
                routes: Vec::new(),
                ..ProxyConfig::default()
            },
        }
    }
}

impl ProxyConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = name.into();
        self
    }

    /// Register a target with a literal URL.
    pub fn target(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.config
            .targets
            .insert(name.into(), TargetConfig::from_url(url));
        self
    }

    /// Bind `prefix` to the target called `target`.
    pub fn route(mut self, prefix: impl Into<String>, target: impl Into<String>) -> Self {
        self.config.routes.push(RouteConfig {
            prefix: prefix.into(),
            target: target.into(),
            title: None,
        });
        self
    }

    pub fn fallback(mut self, target: impl Into<String>) -> Self {
        self.config.fallback = Some(target.into());
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upstream.request_timeout_secs = secs;
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upstream.connect_timeout_secs = secs;
        self
    }

    pub fn max_connections_per_target(mut self, max: usize) -> Self {
        self.config.upstream.max_connections_per_target = max;
        self
    }

    pub fn build(self) -> ProxyConfig {
        self.config
    }
}
