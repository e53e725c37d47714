//! # brutal-core: Policy Resolution
//!
//! Reduces the Global, Host and Path scopes reachable from a request into the
//! single `(enabled, rate)` pair the enforcer acts on. Every function here is
//! total: a missing or odd setting maps to a defined value, never an error.

use crate::config::{ScopeConfig, Toggle};

/// Rate used when no scope in the chain declares one.
///
/// Deliberately useless as a throughput. A connection that ends up paced at
/// 2 bytes/s points straight at a missing `tcp_brutal_rate`.
pub const DEFAULT_RATE: u64 = 2;

/// The policy a single request should run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectivePolicy {
    pub enabled: bool,
    /// Bytes per second.
    pub rate: u64,
}

impl EffectivePolicy {
    pub const DISABLED: EffectivePolicy = EffectivePolicy { enabled: false, rate: 0 };
}

/// Host decides when it says anything; otherwise only an explicit Global `on`
/// enables.
pub fn resolve_enabled(global: &ScopeConfig, host: &ScopeConfig) -> bool {
    match host.enabled {
        Toggle::On => true,
        Toggle::Off => false,
        Toggle::Unset => global.enabled == Toggle::On,
    }
}

pub fn resolve_rate(path: &ScopeConfig) -> u64 {
    path.rate.unwrap_or(DEFAULT_RATE)
}

/// A rate of 0 means "no rate configured" and switches enforcement off
/// regardless of the toggles.
pub fn resolve(global: &ScopeConfig, host: &ScopeConfig, path: &ScopeConfig) -> EffectivePolicy {
    let rate = resolve_rate(path);
    EffectivePolicy {
        enabled: resolve_enabled(global, host) && rate != 0,
        rate,
    }
}
