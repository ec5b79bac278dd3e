//! Remote step ledger.
//!
//! The ledger holds one row per `(employee_id, step_date)`. Writes are
//! last-write-wins upserts on that key. Goal evaluation happens at the call
//! site; the ledger only persists what it is given.

mod rest;
mod sqlite;

pub use rest::RestLedger;
pub use sqlite::SqliteLedger;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, ValidationError};
use crate::goal::GoalOutcome;

/// Program-wide goal settings. Read-only for the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(rename = "dailyStepGoal")]
    pub daily_step_goal: u64,
    #[serde(rename = "charityAmountPerGoal")]
    pub charity_amount_per_goal: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub employee_id: String,
    pub company: String,
    pub is_active: bool,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub profile_name: Option<String>,
    #[serde(default)]
    pub registration_date: Option<DateTime<Utc>>,
    #[serde(default, rename = "created_at", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Registration request for a new employee/device pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationForm {
    pub employee_id: String,
    pub company: String,
    pub profile_name: String,
}

impl RegistrationForm {
    /// Employee IDs are 7 alphanumerics starting with `K`; company is
    /// required; profile names need at least 2 characters.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let employee_id = self.employee_id.trim();
        if employee_id.is_empty() {
            return Err(ValidationError::invalid("employee_id", "Employee ID is required"));
        }
        if employee_id.chars().count() != 7 {
            return Err(ValidationError::invalid(
                "employee_id",
                "Employee ID must be exactly 7 characters",
            ));
        }
        if !employee_id.starts_with('K') {
            return Err(ValidationError::invalid(
                "employee_id",
                "Employee ID must start with \"K\"",
            ));
        }
        if !employee_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::invalid(
                "employee_id",
                "Employee ID must contain only letters and numbers",
            ));
        }
        if self.company.trim().is_empty() {
            return Err(ValidationError::invalid("company", "Company is required"));
        }
        let profile_name = self.profile_name.trim();
        if profile_name.is_empty() {
            return Err(ValidationError::invalid("profile_name", "Profile name is required"));
        }
        if profile_name.chars().count() < 2 {
            return Err(ValidationError::invalid(
                "profile_name",
                "Profile name must be at least 2 characters",
            ));
        }
        Ok(())
    }
}

/// Stored row of the `daily_steps` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStepRecord {
    #[serde(default)]
    pub record_id: Option<i64>,
    pub employee_id: String,
    pub device_id: String,
    pub step_date: NaiveDate,
    pub step_count: u64,
    pub goal_achieved: bool,
    pub daily_charity_earned: f64,
    pub last_updated: DateTime<Utc>,
}

/// Proposed write for one `(employee_id, step_date)` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStepUpsert {
    pub employee_id: String,
    pub device_id: String,
    pub step_date: NaiveDate,
    pub step_count: u64,
    pub goal_achieved: bool,
    pub daily_charity_earned: f64,
}

impl DailyStepUpsert {
    pub fn new(
        employee_id: &str,
        device_id: &str,
        step_date: NaiveDate,
        step_count: u64,
        outcome: GoalOutcome,
    ) -> Self {
        Self {
            employee_id: employee_id.to_string(),
            device_id: device_id.to_string(),
            step_date,
            step_count,
            goal_achieved: outcome.goal_achieved,
            daily_charity_earned: outcome.charity_earned,
        }
    }

    /// Stamp the write time.
    pub fn into_record(self, last_updated: DateTime<Utc>) -> DailyStepRecord {
        DailyStepRecord {
            record_id: None,
            employee_id: self.employee_id,
            device_id: self.device_id,
            step_date: self.step_date,
            step_count: self.step_count,
            goal_achieved: self.goal_achieved,
            daily_charity_earned: self.daily_charity_earned,
            last_updated,
        }
    }
}

/// Serializable `{success, data | error}` view of an upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSyncResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<DailyStepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepSyncResult {
    /// A sync that was not attempted.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

impl From<Result<DailyStepRecord, LedgerError>> for StepSyncResult {
    fn from(result: Result<DailyStepRecord, LedgerError>) -> Self {
        match result {
            Ok(record) => Self {
                success: true,
                data: Some(record),
                error: None,
            },
            Err(e) => Self {
                success: false,
                data: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Backend store operations used by the tracker.
#[async_trait]
pub trait StepLedger: Send + Sync {
    /// Insert or overwrite the row for `(employee_id, step_date)`.
    async fn upsert_daily_steps(
        &self,
        upsert: DailyStepUpsert,
    ) -> Result<DailyStepRecord, LedgerError>;

    async fn fetch_global_settings(&self) -> Result<Option<GlobalSettings>, LedgerError>;

    /// All companies, ordered by name.
    async fn fetch_companies(&self) -> Result<Vec<Company>, LedgerError>;

    async fn find_employee_by_device(
        &self,
        device_id: &str,
    ) -> Result<Option<Employee>, LedgerError>;

    async fn register_employee(
        &self,
        form: &RegistrationForm,
        device_id: &str,
    ) -> Result<Employee, LedgerError>;

    /// Rows for `from..=to`, ascending by date.
    async fn daily_steps_between(
        &self,
        employee_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyStepRecord>, LedgerError>;

    async fn lifetime_steps(&self, employee_id: &str) -> Result<u64, LedgerError>;

    async fn total_charity_earned(&self, employee_id: &str) -> Result<f64, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(employee_id: &str, company: &str, profile_name: &str) -> RegistrationForm {
        RegistrationForm {
            employee_id: employee_id.into(),
            company: company.into(),
            profile_name: profile_name.into(),
        }
    }

    #[test]
    fn test_valid_form_passes() {
        assert!(form("K123ABC", "Acme", "Jo").validate().is_ok());
    }

    #[test]
    fn test_employee_id_rules() {
        let message = |f: RegistrationForm| match f.validate() {
            Err(ValidationError::InvalidValue { message, .. }) => message,
            other => panic!("expected validation error, got {other:?}"),
        };
        assert_eq!(message(form("", "Acme", "Jo")), "Employee ID is required");
        assert_eq!(
            message(form("K12", "Acme", "Jo")),
            "Employee ID must be exactly 7 characters"
        );
        assert_eq!(
            message(form("A123456", "Acme", "Jo")),
            "Employee ID must start with \"K\""
        );
        assert_eq!(
            message(form("K12-456", "Acme", "Jo")),
            "Employee ID must contain only letters and numbers"
        );
        assert_eq!(message(form("K123456", " ", "Jo")), "Company is required");
        assert_eq!(
            message(form("K123456", "Acme", "J")),
            "Profile name must be at least 2 characters"
        );
    }

    #[test]
    fn test_settings_use_backend_column_names() {
        let settings: GlobalSettings =
            serde_json::from_str(r#"{"id":"1","dailyStepGoal":8000,"charityAmountPerGoal":0.5}"#)
                .unwrap();
        assert_eq!(settings.daily_step_goal, 8000);
        assert_eq!(settings.charity_amount_per_goal, 0.5);
    }

    #[test]
    fn test_sync_result_reports_failure_message() {
        let result: StepSyncResult = Err(LedgerError::MissingSettings).into();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Global settings are not configured"));
    }
}
