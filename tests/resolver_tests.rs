//! # Core Layer Tests: Policy Resolution
//!
//! Exhaustive checks of the Global/Host/Path resolution rules and the
//! documented example scenarios.

use brutal_core::{resolve, resolve_enabled, resolve_rate, EffectivePolicy, ScopeConfig, Toggle, DEFAULT_RATE};
use std::time::Instant;

const TOGGLES: [Toggle; 3] = [Toggle::Unset, Toggle::On, Toggle::Off];
const RATES: [Option<u64>; 4] = [None, Some(0), Some(2), Some(500_000)];

fn scope(enabled: Toggle, rate: Option<u64>) -> ScopeConfig {
    ScopeConfig::new(enabled, rate)
}

/// Every combination of toggles and rates yields a policy, and the policy is
/// consistent with the component rules.
#[test]
fn test_resolution_is_total_and_consistent() {
    let t = Instant::now();

    for g in TOGGLES {
        for h in TOGGLES {
            for rate in RATES {
                let global = scope(g, rate);
                let host = scope(h, rate);
                let path = ScopeConfig::new(Toggle::Unset, rate);

                let policy = resolve(&global, &host, &path);
                assert_eq!(policy.rate, resolve_rate(&path));
                assert_eq!(policy.enabled, resolve_enabled(&global, &host) && policy.rate != 0);
            }
        }
    }

    let overhead = t.elapsed();
    println!("test_resolution_is_total_and_consistent: Testing Overhead = {:?}", overhead);
}

/// Host `off` wins over any Global setting.
#[test]
fn test_host_off_overrides_global() {
    for g in TOGGLES {
        assert!(!resolve_enabled(&scope(g, None), &scope(Toggle::Off, None)), "global={}", g);
    }
}

/// Host `on` enables regardless of Global.
#[test]
fn test_host_on_enables() {
    for g in TOGGLES {
        assert!(resolve_enabled(&scope(g, None), &scope(Toggle::On, None)), "global={}", g);
    }
}

/// With Host unset only Global `on` enables.
#[test]
fn test_global_fallback() {
    let host = ScopeConfig::UNSET;
    assert!(resolve_enabled(&scope(Toggle::On, None), &host));
    assert!(!resolve_enabled(&scope(Toggle::Off, None), &host));
    assert!(!resolve_enabled(&scope(Toggle::Unset, None), &host));
}

#[test]
fn test_rate_defaults_to_two() {
    assert_eq!(DEFAULT_RATE, 2);
    assert_eq!(resolve_rate(&ScopeConfig::UNSET), 2);
    assert_eq!(resolve_rate(&ScopeConfig::with_rate(9)), 9);
}

/// A zero rate disables enforcement under every toggle combination.
#[test]
fn test_rate_zero_disables() {
    let path = ScopeConfig::with_rate(0);
    for g in TOGGLES {
        for h in TOGGLES {
            let policy = resolve(&scope(g, None), &scope(h, None), &path);
            assert!(!policy.enabled, "global={} host={}", g, h);
            assert_eq!(policy.rate, 0);
        }
    }
}

#[test]
fn test_scenario_global_on_host_unset() {
    let policy = resolve(&scope(Toggle::On, None), &ScopeConfig::UNSET, &ScopeConfig::with_rate(500_000));
    assert_eq!(policy, EffectivePolicy { enabled: true, rate: 500_000 });
}

#[test]
fn test_scenario_host_off() {
    let policy = resolve(
        &scope(Toggle::On, None),
        &scope(Toggle::Off, None),
        &ScopeConfig::with_rate(500_000),
    );
    assert!(!policy.enabled);
}

#[test]
fn test_scenario_nothing_set() {
    let policy = resolve(&ScopeConfig::UNSET, &ScopeConfig::UNSET, &ScopeConfig::UNSET);
    assert_eq!(policy, EffectivePolicy { enabled: false, rate: 2 });
}

#[test]
fn test_scenario_path_rate_zero() {
    let policy = resolve(
        &scope(Toggle::On, None),
        &scope(Toggle::On, None),
        &ScopeConfig::with_rate(0),
    );
    assert_eq!(policy, EffectivePolicy { enabled: false, rate: 0 });
}
