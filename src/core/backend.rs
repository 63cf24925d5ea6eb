use std::{fmt, str::FromStr};

use thiserror::Error;
use url::Url;

/// Errors related to backend operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BackendError {
    /// Error when URL is invalid
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// A validated backend base URL: `http` or `https`, a host, an optional port and
/// an optional base path. Query strings, fragments and credentials are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendUrl {
    /// The URL exactly as the operator wrote it, minus surrounding whitespace.
    configured: String,
    /// Normalized base without a trailing slash, e.g. `http://a:1000` or `https://b/api`.
    base: String,
    /// `host[:port]` as it should appear in the `Host` header.
    authority: String,
}

impl BackendUrl {
    /// Creates a new BackendUrl if the provided string is a valid base URL
    pub fn new(url: &str) -> BackendResult<Self> {
        let configured = url.trim();
        let parsed = Url::parse(configured)
            .map_err(|e| BackendError::InvalidUrl(format!("{url}: {e}")))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BackendError::InvalidUrl(format!(
                "Backend URL must start with http:// or https://, got scheme '{}' in {url}",
                parsed.scheme()
            )));
        }

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| BackendError::InvalidUrl(format!("{url}: missing host")))?;

        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(BackendError::InvalidUrl(format!(
                "{url}: a base URL must not carry a query or fragment"
            )));
        }
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(BackendError::InvalidUrl(format!(
                "{url}: credentials in backend URLs are not supported"
            )));
        }

        let authority = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let base = format!(
            "{}://{}{}",
            parsed.scheme(),
            authority,
            parsed.path().trim_end_matches('/')
        );

        Ok(BackendUrl {
            configured: configured.to_string(),
            base,
            authority,
        })
    }

    /// The URL as configured. Used wherever the target is shown to people:
    /// `/health`, 502 bodies, logs and the `routes` command.
    pub fn as_str(&self) -> &str {
        &self.configured
    }

    /// `host[:port]`, with the port only when it was given explicitly and is not the
    /// scheme default.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Append an absolute path (and optional raw query) to the normalized base.
    pub fn join(&self, path: &str, query: Option<&str>) -> String {
        let mut joined = String::with_capacity(self.base.len() + path.len() + 16);
        joined.push_str(&self.base);
        if !path.starts_with('/') {
            joined.push('/');
        }
        joined.push_str(path);
        if let Some(query) = query {
            joined.push('?');
            joined.push_str(query);
        }
        joined
    }
}

impl FromStr for BackendUrl {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendUrl::new(s)
    }
}

impl fmt::Display for BackendUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.configured)
    }
}
