//! Tests for configuration validation

use std::collections::HashMap;

use seal_pipeline::config::{AssignerKind, PipelineConfig, PollerConfig, StoreBackendConfig};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

#[test]
fn test_default_config_is_valid() {
    let cfg = PipelineConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.poller.interval_secs, 10);
    assert_eq!(cfg.poller.seed_epoch_confidence, 3);
    assert_eq!(cfg.scheduler.assigner, AssignerKind::Spread);
    assert_eq!(cfg.store, StoreBackendConfig::InMemory);
}

#[test]
fn test_poller_config_invalid_interval() {
    let invalid = PollerConfig {
        interval_secs: 0,
        ..PollerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_poller_config_invalid_confidence() {
    let invalid = PollerConfig {
        seed_epoch_confidence: -1,
        ..PollerConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_postgres_backend_requires_url() {
    let invalid = StoreBackendConfig::Postgres {
        url: "  ".to_string(),
        max_connections: 4,
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_from_json_str() {
    let cfg = PipelineConfig::from_json_str(
        r#"{
            "poller": { "interval_secs": 30 },
            "store": { "kind": "postgres", "url": "postgres://localhost/seal", "max_connections": 4 }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.poller.interval_secs, 30);
    assert_eq!(cfg.poller.precommit_challenge_delay, 150);
    assert_eq!(
        cfg.store,
        StoreBackendConfig::Postgres {
            url: "postgres://localhost/seal".to_string(),
            max_connections: 4,
        }
    );
}

#[test]
fn test_from_json_str_rejects_invalid_values() {
    let err = PipelineConfig::from_json_str(r#"{ "poller": { "interval_secs": 0 } }"#).unwrap_err();
    assert!(err.contains("poller invalid"));
}

#[test]
fn test_env_overrides() {
    let mut cfg = PipelineConfig::default();
    cfg.apply_overrides(lookup(&[
        ("SEAL_POLL_INTERVAL_SECS", "5"),
        ("SEAL_SEED_EPOCH_CONFIDENCE", "10"),
        ("SEAL_DATABASE_URL", "postgres://db/seal"),
    ]))
    .unwrap();

    assert_eq!(cfg.poller.interval_secs, 5);
    assert_eq!(cfg.poller.seed_epoch_confidence, 10);
    assert_eq!(
        cfg.store,
        StoreBackendConfig::Postgres {
            url: "postgres://db/seal".to_string(),
            max_connections: 8,
        }
    );
}

#[test]
fn test_env_override_parse_error() {
    let mut cfg = PipelineConfig::default();
    let err = cfg
        .apply_overrides(lookup(&[("SEAL_POLL_INTERVAL_SECS", "soon")]))
        .unwrap_err();
    assert!(err.to_string().contains("SEAL_POLL_INTERVAL_SECS"));
}

#[test]
fn test_env_override_fails_validation() {
    let mut cfg = PipelineConfig::default();
    assert!(cfg
        .apply_overrides(lookup(&[("SEAL_PRECOMMIT_CHALLENGE_DELAY", "0")]))
        .is_err());
}
