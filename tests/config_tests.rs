//! Tests for environment-driven configuration

use detplan::internal::config::{Config, ConfigError, ResourceTier};
use std::{collections::HashMap, path::PathBuf};

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| (format!("DETPLAN_{key}"), value.to_string()))
        .collect()
}

#[test]
fn test_defaults_when_unset() {
    let config = Config::from_vars(&HashMap::new()).unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.resource_tier, ResourceTier::Mobile);
    assert_eq!(config.planner_max_steps, 25);
    assert_eq!(config.planner_max_seconds, 2.0);
    assert!(!config.ledger_enabled);
}

#[test]
fn test_values_are_coerced() {
    let config = Config::from_vars(&vars(&[
        ("HOME", "/srv/work"),
        ("RESOURCE_TIER", " Server "),
        ("PLANNER_MAX_STEPS", "40"),
        ("PLANNER_MAX_SECONDS", "0.5"),
        ("MUTATION_ENABLED", "yes"),
        ("LEDGER_ENABLED", "1"),
        ("LEDGER_READONLY", "off"),
        ("LEDGER_FILENAME", "run.jsonl"),
    ]))
    .unwrap();

    assert_eq!(config.home, PathBuf::from("/srv/work"));
    assert_eq!(config.resource_tier, ResourceTier::Server);
    assert_eq!(config.planner_max_steps, 40);
    assert_eq!(config.planner_max_seconds, 0.5);
    assert!(config.mutation_enabled);
    assert!(config.ledger_enabled);
    assert!(!config.ledger_readonly);
    assert_eq!(
        config.ledger_relative_path(),
        Some(PathBuf::from(".detplan/ledger/run.jsonl"))
    );
}

#[test]
fn test_blank_values_fall_back_to_defaults() {
    let config = Config::from_vars(&vars(&[("RESOURCE_TIER", "  "), ("PLANNER_MAX_STEPS", "")])).unwrap();
    assert_eq!(config.resource_tier, ResourceTier::Mobile);
    assert_eq!(config.planner_max_steps, 25);
}

#[test]
fn test_invalid_values_rejected() {
    assert!(matches!(
        Config::from_vars(&vars(&[("LEDGER_ENABLED", "maybe")])),
        Err(ConfigError::InvalidBool { key: "LEDGER_ENABLED", .. })
    ));
    assert!(matches!(
        Config::from_vars(&vars(&[("RESOURCE_TIER", "desktop")])),
        Err(ConfigError::InvalidTier(_))
    ));
    assert!(matches!(
        Config::from_vars(&vars(&[("PLANNER_MAX_STEPS", "many")])),
        Err(ConfigError::InvalidInt { .. })
    ));
    assert!(matches!(
        Config::from_vars(&vars(&[("PLANNER_MAX_SECONDS", "soon")])),
        Err(ConfigError::InvalidFloat { .. })
    ));
}

#[test]
fn test_bounds_enforced() {
    for (key, value) in [
        ("PLANNER_MAX_STEPS", "0"),
        ("PLANNER_MAX_STEPS", "10001"),
        ("PLANNER_MAX_SECONDS", "0"),
        ("PLANNER_MAX_SECONDS", "301"),
        ("PLANNER_MAX_SECONDS", "NaN"),
    ] {
        assert!(
            matches!(
                Config::from_vars(&vars(&[(key, value)])),
                Err(ConfigError::OutOfRange { .. })
            ),
            "{key}={value} accepted"
        );
    }
}

#[test]
fn test_emergency_halt_dominates() {
    let config = Config::from_vars(&vars(&[
        ("EMERGENCY_HALT", "true"),
        ("PLANNER_MAX_STEPS", "500"),
        ("MUTATION_ENABLED", "true"),
        ("LEDGER_ENABLED", "true"),
    ]))
    .unwrap();

    assert!(config.emergency_halt);
    assert_eq!(config.planner_max_steps, 1);
    assert_eq!(config.planner_max_seconds, 0.01);
    assert!(!config.mutation_enabled);
    assert!(config.ledger_readonly);
}

#[test]
fn test_inconsistent_halt_rejected_by_validate() {
    let config = Config {
        emergency_halt: true,
        ..Config::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::EmergencyHalt(_))));
    assert!(config.halted().validate().is_ok());
}

#[test]
fn test_ledger_filename_must_stay_relative() {
    for bad in ["", "../escape.jsonl", "logs/../../x", "/abs.jsonl", "~/home.jsonl"] {
        let result = Config::from_vars(&vars(&[("LEDGER_ENABLED", "true"), ("LEDGER_FILENAME", bad)]));
        // Blank values fall back to the default filename.
        if bad.is_empty() {
            assert!(result.is_ok());
            continue;
        }
        assert!(
            matches!(result, Err(ConfigError::InvalidLedgerFilename(_))),
            "{bad} accepted"
        );
    }

    let disabled = Config::from_vars(&vars(&[("LEDGER_FILENAME", "../ignored")]));
    assert!(disabled.is_ok());
}

#[test]
fn test_tier_parsing_round_trips_display() {
    for tier in [ResourceTier::Mobile, ResourceTier::Edge, ResourceTier::Server] {
        assert_eq!(tier.to_string().parse::<ResourceTier>().unwrap(), tier);
    }
}
