use std::collections::HashSet;

use crate::config::{EnforcementMode, ScopeConfig, ServerConfig};
use crate::error::ConfigError;
use crate::resolver::{self, EffectivePolicy};

/// One configuration generation, flattened for lookups on the request path.
///
/// Rates are already merged down the Global → Host → Path chain when the
/// snapshot is built, so a lookup never walks ancestors. A snapshot is never
/// modified after `build`; a reload produces a new one.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    generation: u64,
    mode: EnforcementMode,
    global: ScopeConfig,
    hosts: Vec<HostScope>,
    default_host: usize,
}

#[derive(Debug, Clone)]
struct HostScope {
    names: Vec<String>,
    scope: ScopeConfig,
    /// Longest prefix first.
    locations: Vec<LocationScope>,
}

#[derive(Debug, Clone)]
struct LocationScope {
    prefix: String,
    scope: ScopeConfig,
}

/// The three scopes reachable from one request.
#[derive(Debug, Clone, Copy)]
pub struct ScopeChain<'a> {
    pub global: &'a ScopeConfig,
    pub host: &'a ScopeConfig,
    pub path: &'a ScopeConfig,
    /// First `server_name` of the matched host, if it has any.
    pub server_name: Option<&'a str>,
    /// Prefix of the matched location, if any matched.
    pub location: Option<&'a str>,
}

impl ScopeChain<'_> {
    pub fn resolve(&self) -> EffectivePolicy {
        resolver::resolve(self.global, self.host, self.path)
    }
}

/// A resolved policy for one declared server/location pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRow {
    pub server: String,
    pub location: Option<String>,
    pub policy: EffectivePolicy,
}

impl ConfigSnapshot {
    pub fn build(config: &ServerConfig) -> Result<Self, ConfigError> {
        let global = config.scope();
        let mut hosts = Vec::with_capacity(config.hosts.len().max(1));
        let mut seen_names = HashSet::new();
        let mut default_host = None;

        for (idx, host) in config.hosts.iter().enumerate() {
            if host.default_server {
                if default_host.is_some() {
                    return Err(ConfigError::Invalid("more than one `default_server`".into()));
                }
                default_host = Some(idx);
            }

            let mut names = Vec::with_capacity(host.server_name.len());
            for name in &host.server_name {
                let name = normalize_host(name);
                if !seen_names.insert(name.clone()) {
                    return Err(ConfigError::Invalid(format!("duplicate server_name `{}`", name)));
                }
                names.push(name);
            }

            let scope = host.scope().inherit_rate(&global);
            let mut locations: Vec<LocationScope> = Vec::with_capacity(host.locations.len());
            for location in &host.locations {
                if !location.path.starts_with('/') {
                    return Err(ConfigError::Invalid(format!(
                        "location `{}` must start with `/`",
                        location.path
                    )));
                }
                if locations.iter().any(|l| l.prefix == location.path) {
                    return Err(ConfigError::Invalid(format!(
                        "duplicate location `{}`",
                        location.path
                    )));
                }
                locations.push(LocationScope {
                    prefix: location.path.clone(),
                    scope: location.scope().inherit_rate(&scope),
                });
            }
            locations.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

            hosts.push(HostScope { names, scope, locations });
        }

        if hosts.is_empty() {
            hosts.push(HostScope {
                names: Vec::new(),
                scope: ScopeConfig::UNSET.inherit_rate(&global),
                locations: Vec::new(),
            });
        }

        Ok(Self {
            generation: 0,
            mode: config.on_failure,
            global,
            hosts,
            default_host: default_host.unwrap_or(0),
        })
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn mode(&self) -> EnforcementMode {
        self.mode
    }

    /// Picks the host by `Host` header and the location by longest prefix.
    ///
    /// An unknown or missing host falls back to the default server. A path no
    /// location matches uses the host's own scope as its Path scope. `path`
    /// is expected in the form produced by `uri::normalize_path`.
    pub fn scopes_for(&self, host: Option<&str>, path: &str) -> ScopeChain<'_> {
        let host_scope = host
            .map(normalize_host)
            .and_then(|name| self.hosts.iter().find(|h| h.names.iter().any(|n| *n == name)))
            .unwrap_or(&self.hosts[self.default_host]);

        let location = host_scope.locations.iter().find(|l| path.starts_with(&l.prefix));
        tracing::debug!(
            "Routing: host={:?} path={} -> server={:?} location={:?}",
            host,
            path,
            host_scope.names.first(),
            location.map(|l| &l.prefix)
        );

        ScopeChain {
            global: &self.global,
            host: &host_scope.scope,
            path: location.map(|l| &l.scope).unwrap_or(&host_scope.scope),
            server_name: host_scope.names.first().map(String::as_str),
            location: location.map(|l| l.prefix.as_str()),
        }
    }

    /// Every declared server and location with the policy it resolves to.
    pub fn policies(&self) -> Vec<PolicyRow> {
        let mut rows = Vec::new();
        for host in &self.hosts {
            let server = if host.names.is_empty() {
                "_".to_string()
            } else {
                host.names.join(" ")
            };
            rows.push(PolicyRow {
                server: server.clone(),
                location: None,
                policy: resolver::resolve(&self.global, &host.scope, &host.scope),
            });
            for location in &host.locations {
                rows.push(PolicyRow {
                    server: server.clone(),
                    location: Some(location.prefix.clone()),
                    policy: resolver::resolve(&self.global, &host.scope, &location.scope),
                });
            }
        }
        rows
    }
}

/// Lowercases and strips the port (and a trailing dot) from a host name.
fn normalize_host(raw: &str) -> String {
    let raw = raw.trim();
    let host = if raw.starts_with('[') {
        match raw.find(']') {
            Some(end) => &raw[..=end],
            None => raw,
        }
    } else {
        raw.split(':').next().unwrap_or(raw)
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}
