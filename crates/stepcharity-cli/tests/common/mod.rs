//! Common utilities for CLI E2E tests.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Isolated data directory for one test.
pub struct CliEnv {
    dir: TempDir,
}

impl CliEnv {
    /// Fresh data dir with the default health-export sensor.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Fresh data dir with the pedometer counter file sensor selected.
    pub fn with_pedometer() -> Self {
        let env = Self::new();
        env.run_success(&["config", "set", "sensor.kind", "pedometer"]);
        env
    }

    pub fn data_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Write today's cumulative counter reading.
    pub fn set_today_count(&self, count: u64) {
        let today = chrono::Local::now().date_naive().format("%Y-%m-%d");
        std::fs::write(
            self.data_dir().join("counter.json"),
            format!(r#"{{"{today}": {count}}}"#),
        )
        .expect("Failed to write counter file");
    }

    /// Write cumulative counter readings for several days.
    pub fn set_counts(&self, counts: &[(chrono::NaiveDate, u64)]) {
        let map: serde_json::Map<String, serde_json::Value> = counts
            .iter()
            .map(|(day, count)| (day.format("%Y-%m-%d").to_string(), (*count).into()))
            .collect();
        std::fs::write(
            self.data_dir().join("counter.json"),
            serde_json::Value::Object(map).to_string(),
        )
        .expect("Failed to write counter file");
    }

    pub fn remove_counter(&self) {
        std::fs::remove_file(self.data_dir().join("counter.json"))
            .expect("Failed to remove counter file");
    }

    /// Write a health export holding one sample per count, all starting at
    /// local midnight today.
    pub fn write_samples(&self, counts: &[u64]) {
        let midnight = chrono::Local::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .and_then(|t| t.and_local_timezone(chrono::Local).earliest())
            .expect("local midnight")
            .with_timezone(&chrono::Utc);
        let samples: Vec<serde_json::Value> = counts
            .iter()
            .map(|count| {
                serde_json::json!({
                    "start": midnight.to_rfc3339(),
                    "end": (midnight + chrono::Duration::seconds(1)).to_rfc3339(),
                    "count": count,
                })
            })
            .collect();
        std::fs::write(
            self.data_dir().join("samples.json"),
            serde_json::Value::Array(samples).to_string(),
        )
        .expect("Failed to write samples file");
    }

    /// Invoke a CLI command and return (stdout, stderr, exit code).
    pub fn run(&self, args: &[&str]) -> (String, String, i32) {
        let output = Command::new(env!("CARGO_BIN_EXE_stepcharity"))
            .args(args)
            .env("STEPCHARITY_DATA_DIR", self.data_dir())
            .env_remove("STEPCHARITY_LOG")
            .output()
            .expect("Failed to execute CLI command");

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);

        (stdout, stderr, code)
    }

    /// Invoke a CLI command and expect success.
    pub fn run_success(&self, args: &[&str]) -> String {
        let (stdout, stderr, code) = self.run(args);
        assert_eq!(code, 0, "CLI command {args:?} failed: {stderr}");
        stdout
    }

    /// Invoke a CLI command and expect failure; returns stderr.
    pub fn run_failure(&self, args: &[&str]) -> String {
        let (_, stderr, code) = self.run(args);
        assert_eq!(code, 1, "CLI command unexpectedly succeeded: {args:?}");
        stderr
    }

    /// Run and parse stdout as JSON.
    pub fn run_json(&self, args: &[&str]) -> serde_json::Value {
        let stdout = self.run_success(args);
        serde_json::from_str(&stdout)
            .unwrap_or_else(|e| panic!("Failed to parse JSON output of {args:?}: {e}\n{stdout}"))
    }
}

/// Check if string contains substring
pub fn assert_contains(haystack: &str, needle: &str) {
    assert!(
        haystack.contains(needle),
        "Expected '{haystack}' to contain '{needle}'"
    );
}
