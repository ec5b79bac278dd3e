//! E2E tests for `stepcharity config`.

mod common;

use common::{assert_contains, CliEnv};

#[test]
fn test_config_defaults() {
    let env = CliEnv::with_pedometer();
    assert_eq!(env.run_success(&["config", "get", "tracking.poll_interval_secs"]).trim(), "5");
    assert_eq!(env.run_success(&["config", "get", "backend.kind"]).trim(), "local");
    assert!(env.data_dir().join("config.toml").exists());
}

#[test]
fn test_config_set_and_list() {
    let env = CliEnv::with_pedometer();
    env.run_success(&["config", "set", "tracking.history_days", "3"]);
    let config = env.run_json(&["config", "list"]);
    assert_eq!(config["tracking"]["history_days"], 3);
    assert_eq!(config["sensor"]["kind"], "pedometer");
}

#[test]
fn test_config_rejects_unknown_key_and_bad_value() {
    let env = CliEnv::with_pedometer();
    let stderr = env.run_failure(&["config", "get", "tracking.nope"]);
    assert_contains(&stderr, "error: unknown config key: tracking.nope");

    let stderr = env.run_failure(&["config", "set", "tracking.poll_interval_secs", "soon"]);
    assert_contains(&stderr, "error:");
}

#[test]
fn test_config_reset() {
    let env = CliEnv::with_pedometer();
    env.run_success(&["config", "reset"]);
    assert_eq!(env.run_success(&["config", "get", "sensor.kind"]).trim(), "health_export");
}

#[test]
fn test_rest_backend_requires_url() {
    let env = CliEnv::with_pedometer();
    env.run_success(&["config", "set", "backend.kind", "rest"]);
    let stderr = env.run_failure(&["companies", "list"]);
    assert_contains(&stderr, "backend.url is empty");
}
