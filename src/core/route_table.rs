//! Static prefix routing.
//!
//! The `RouteTable` is built once from a validated [`ProxyConfig`] and never
//! mutated afterwards, so it is shared across request tasks behind an `Arc`
//! without any locking. It provides:
//! * Segment-aware longest-prefix lookup (`/network` matches `/network/x`, not `/networkx`)
//! * An optional named fallback binding for everything else
//! * Enumeration helpers for the health and landing pages
use crate::{
    config::{
        ProxyConfig,
        validation::{ConfigError, ConfigValidator, normalize_prefix},
    },
    core::backend::BackendUrl,
};

/// How a path was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Prefix,
    Fallback,
}

/// One routing rule: a path prefix bound to a backend target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteBinding {
    /// Empty for the fallback binding.
    prefix: String,
    target_name: String,
    target: BackendUrl,
    title: Option<String>,
}

impl RouteBinding {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn target(&self) -> &BackendUrl {
        &self.target
    }

    /// Landing page label, defaulting to the prefix.
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.prefix)
    }
}

/// Result of [`RouteTable::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution<'a> {
    binding: &'a RouteBinding,
    kind: MatchKind,
    upstream_path: &'a str,
}

impl<'a> Resolution<'a> {
    pub fn binding(&self) -> &'a RouteBinding {
        self.binding
    }

    pub fn target(&self) -> &'a BackendUrl {
        &self.binding.target
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    pub fn is_fallback(&self) -> bool {
        self.kind == MatchKind::Fallback
    }

    /// The registered prefix that matched; `None` for fallback resolutions.
    pub fn matched_prefix(&self) -> Option<&'a str> {
        match self.kind {
            MatchKind::Prefix => Some(&self.binding.prefix),
            MatchKind::Fallback => None,
        }
    }

    /// Path to request on the target: the remainder after the prefix, or the whole
    /// path for fallback resolutions. Always starts with `/`.
    pub fn upstream_path(&self) -> &'a str {
        self.upstream_path
    }
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    /// Registration order.
    bindings: Vec<RouteBinding>,
    /// Indices into `bindings`, longest prefix first.
    lookup_order: Vec<usize>,
    fallback: Option<RouteBinding>,
}

impl RouteTable {
    /// Validate `config` and build the table. Fails on the first configuration
    /// problem set; nothing is served from a partially valid table.
    pub fn build(config: &ProxyConfig) -> Result<Self, ConfigError> {
        ConfigValidator::validate(config)?;

        let bindings = config
            .routes
            .iter()
            .map(|route| {
                Self::make_binding(
                    config,
                    normalize_prefix(&route.prefix),
                    &route.target,
                    route.title.clone(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let fallback = config
            .fallback
            .as_deref()
            .map(|name| Self::make_binding(config, String::new(), name, None))
            .transpose()?;

        let mut lookup_order: Vec<usize> = (0..bindings.len()).collect();
        lookup_order.sort_by(|a, b| {
            bindings[*b]
                .prefix
                .len()
                .cmp(&bindings[*a].prefix.len())
                .then_with(|| a.cmp(b))
        });

        Ok(Self {
            bindings,
            lookup_order,
            fallback,
        })
    }

    fn make_binding(
        config: &ProxyConfig,
        prefix: String,
        target_name: &str,
        title: Option<String>,
    ) -> Result<RouteBinding, ConfigError> {
        let target_config = config
            .targets
            .get(target_name)
            .ok_or_else(|| ConfigError::UnknownTarget {
                prefix: prefix.clone(),
                target: target_name.to_string(),
            })?;
        let raw_url = target_config
            .url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingTarget {
                name: target_name.to_string(),
                env_var: target_config.url_env.clone(),
            })?;
        let target = BackendUrl::new(raw_url).map_err(|e| ConfigError::InvalidTargetUrl {
            name: target_name.to_string(),
            url: raw_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(RouteBinding {
            prefix,
            target_name: target_name.to_string(),
            target,
            title,
        })
    }

    /// Resolve an inbound request path. Pure function of `path` and the table.
    pub fn resolve<'a>(&'a self, path: &'a str) -> Option<Resolution<'a>> {
        let matched = self.lookup_order.iter().find_map(|&index| {
            let binding = &self.bindings[index];
            strip_segment_prefix(path, &binding.prefix).map(|rest| Resolution {
                binding,
                kind: MatchKind::Prefix,
                upstream_path: rest,
            })
        });

        matched.or_else(|| {
            self.fallback.as_ref().map(|binding| Resolution {
                binding,
                kind: MatchKind::Fallback,
                upstream_path: if path.is_empty() { "/" } else { path },
            })
        })
    }

    /// Registered prefixes in registration order.
    pub fn prefixes(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.prefix.as_str()).collect()
    }

    /// Registered bindings in registration order (the fallback is not included).
    pub fn bindings(&self) -> &[RouteBinding] {
        &self.bindings
    }

    pub fn fallback(&self) -> Option<&RouteBinding> {
        self.fallback.as_ref()
    }

    /// `(prefix, target URL)` pairs in registration order.
    pub fn route_map(&self) -> Vec<(&str, &str)> {
        self.bindings
            .iter()
            .map(|b| (b.prefix.as_str(), b.target.as_str()))
            .collect()
    }

    /// Every distinct backend referenced by a binding or the fallback.
    pub fn targets(&self) -> Vec<&BackendUrl> {
        let mut targets: Vec<&BackendUrl> = Vec::new();
        for binding in self.bindings.iter().chain(self.fallback.as_ref()) {
            if !targets.contains(&&binding.target) {
                targets.push(&binding.target);
            }
        }
        targets
    }
}

/// `Some(rest)` when `prefix` covers whole leading segments of `path`.
fn strip_segment_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}
