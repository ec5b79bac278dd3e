//! E2E tests for step reading, baseline and diagnostics commands.

mod common;

use common::{assert_contains, CliEnv};

#[test]
fn test_first_reading_captures_baseline() {
    let env = CliEnv::with_pedometer();
    env.set_today_count(1200);

    let snapshot = env.run_json(&["steps", "today"]);
    assert_eq!(snapshot["steps"], 0);
    assert_eq!(snapshot["baseline"], 1200);

    let baseline = env.run_json(&["baseline", "show"]);
    assert_eq!(baseline["baseline"], 1200);

    env.set_today_count(1450);
    let snapshot = env.run_json(&["steps", "today"]);
    assert_eq!(snapshot["steps"], 250);
}

#[test]
fn test_counter_rollback_is_a_reset() {
    let env = CliEnv::with_pedometer();
    env.set_today_count(1200);
    env.run_success(&["steps", "today"]);

    env.set_today_count(900);
    let snapshot = env.run_json(&["steps", "today"]);
    assert_eq!(snapshot["steps"], 900);
    assert_eq!(snapshot["reset_detected"], true);
    assert_eq!(env.run_json(&["baseline", "show"])["baseline"], 0);
}

#[test]
fn test_baseline_reset() {
    let env = CliEnv::with_pedometer();
    env.set_today_count(300);
    env.run_success(&["steps", "today"]);

    assert_eq!(env.run_json(&["baseline", "reset"])["reset"], true);
    assert!(env.run_json(&["baseline", "show"]).is_null());
}

#[test]
fn test_missing_sensor_is_reported() {
    let env = CliEnv::with_pedometer();
    let stderr = env.run_failure(&["steps", "today"]);
    assert_contains(&stderr, "error: Pedometer not available on this device");
}

#[test]
fn test_history_respects_day_count() {
    let env = CliEnv::with_pedometer();
    env.set_today_count(10);
    let history = env.run_json(&["steps", "history", "--days", "3"]);
    let days = history["days"].as_array().expect("days array");
    assert_eq!(days.len(), 3);
    assert_eq!(days[2]["steps"], 10);
    assert_eq!(days[0]["steps"], 0);
}

#[test]
fn test_diagnose_reports_without_writing() {
    let env = CliEnv::with_pedometer();
    env.set_today_count(77);
    let report = env.run_json(&["diagnose"]);
    assert_eq!(report["sensor_kind"], "pedometer");
    assert_eq!(report["available"], true);
    assert_eq!(report["raw_steps"], 77);
    assert!(report["stored_baseline"].is_null());
    assert!(env.run_json(&["baseline", "show"]).is_null());
}

#[test]
fn test_health_export_is_the_default_sensor() {
    let env = CliEnv::new();
    env.write_samples(&[42]);

    let snapshot = env.run_json(&["steps", "today"]);
    assert_eq!(snapshot["cumulative"], 42);
    assert_eq!(snapshot["steps"], 0);

    let report = env.run_json(&["diagnose"]);
    assert_eq!(report["sensor_kind"], "health_store");
    assert_eq!(report["available"], true);
    assert_eq!(report["permission"], "granted");
    assert_eq!(report["raw_steps"], 42);
    assert_eq!(report["computed_steps"], 0);

    env.write_samples(&[42, 58]);
    assert_eq!(env.run_json(&["steps", "today"])["steps"], 58);
}

#[test]
fn test_missing_health_export_is_reported() {
    let env = CliEnv::new();
    let report = env.run_json(&["diagnose"]);
    assert_eq!(report["available"], false);
    assert!(report["raw_steps"].is_null());
    env.run_failure(&["steps", "today"]);
}
