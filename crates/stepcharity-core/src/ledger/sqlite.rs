//! Ledger tables in the local SQLite database.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{
    Company, DailyStepRecord, DailyStepUpsert, Employee, GlobalSettings, RegistrationForm,
    StepLedger,
};
use crate::calendar::{day_key, parse_day_key};
use crate::error::{LedgerError, ValidationError};
use crate::storage::Database;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS companies (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS employees (
    employee_id       TEXT PRIMARY KEY,
    company           TEXT NOT NULL,
    is_active         INTEGER NOT NULL DEFAULT 1,
    device_id         TEXT UNIQUE,
    profile_name      TEXT,
    registration_date TEXT,
    created_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS daily_steps (
    record_id            INTEGER PRIMARY KEY AUTOINCREMENT,
    employee_id          TEXT NOT NULL,
    device_id            TEXT NOT NULL,
    step_date            TEXT NOT NULL,
    step_count           INTEGER NOT NULL,
    goal_achieved        INTEGER NOT NULL,
    daily_charity_earned REAL NOT NULL,
    last_updated         TEXT NOT NULL,
    UNIQUE (employee_id, step_date)
);

CREATE TABLE IF NOT EXISTS global_settings (
    id                      INTEGER PRIMARY KEY CHECK (id = 1),
    daily_step_goal         INTEGER NOT NULL,
    charity_amount_per_goal REAL NOT NULL,
    updated_at              TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_daily_steps_employee_date ON daily_steps(employee_id, step_date);
";

const DAILY_COLUMNS: &str = "record_id, employee_id, device_id, step_date, step_count, \
                             goal_achieved, daily_charity_earned, last_updated";

/// Local ledger. Used when no remote backend is configured, and in tests.
pub struct SqliteLedger {
    db: Arc<Database>,
}

impl SqliteLedger {
    pub fn new(db: Arc<Database>) -> Result<Self, LedgerError> {
        db.conn()?.execute_batch(SCHEMA)?;
        Ok(Self { db })
    }

    /// Replace the single settings row.
    pub fn set_global_settings(&self, settings: &GlobalSettings) -> Result<(), LedgerError> {
        self.db.conn()?.execute(
            "INSERT INTO global_settings (id, daily_step_goal, charity_amount_per_goal, updated_at)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                daily_step_goal = excluded.daily_step_goal,
                charity_amount_per_goal = excluded.charity_amount_per_goal,
                updated_at = excluded.updated_at",
            params![
                settings.daily_step_goal,
                settings.charity_amount_per_goal,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn add_company(&self, name: &str) -> Result<Company, LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::invalid("name", "Company name is required").into());
        }
        let company = Company {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: Some(Utc::now()),
        };
        let inserted = self.db.conn()?.execute(
            "INSERT OR IGNORE INTO companies (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![company.id, company.name, Utc::now().to_rfc3339()],
        )?;
        if inserted == 0 {
            return Err(LedgerError::Conflict(format!("Company '{name}' already exists")));
        }
        Ok(company)
    }

    fn query_daily(
        &self,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<DailyStepRecord>, LedgerError> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(args, DailyRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(DailyRow::into_record).collect()
    }
}

/// Raw column values; converted outside the row closure so decode errors
/// become `LedgerError::Decode`.
struct DailyRow {
    record_id: i64,
    employee_id: String,
    device_id: String,
    step_date: String,
    step_count: u64,
    goal_achieved: bool,
    daily_charity_earned: f64,
    last_updated: String,
}

impl DailyRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            record_id: row.get(0)?,
            employee_id: row.get(1)?,
            device_id: row.get(2)?,
            step_date: row.get(3)?,
            step_count: row.get(4)?,
            goal_achieved: row.get(5)?,
            daily_charity_earned: row.get(6)?,
            last_updated: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<DailyStepRecord, LedgerError> {
        Ok(DailyStepRecord {
            record_id: Some(self.record_id),
            employee_id: self.employee_id,
            device_id: self.device_id,
            step_date: parse_day_key(&self.step_date)
                .map_err(|e| LedgerError::Decode(e.to_string()))?,
            step_count: self.step_count,
            goal_achieved: self.goal_achieved,
            daily_charity_earned: self.daily_charity_earned,
            last_updated: parse_timestamp(&self.last_updated)?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LedgerError::Decode(format!("timestamp '{value}': {e}")))
}

fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>, LedgerError> {
    value.as_deref().map(parse_timestamp).transpose()
}

#[async_trait]
impl StepLedger for SqliteLedger {
    async fn upsert_daily_steps(
        &self,
        upsert: DailyStepUpsert,
    ) -> Result<DailyStepRecord, LedgerError> {
        let step_date = day_key(upsert.step_date);
        {
            let conn = self.db.conn()?;
            conn.execute(
                "INSERT INTO daily_steps
                    (employee_id, device_id, step_date, step_count, goal_achieved,
                     daily_charity_earned, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(employee_id, step_date) DO UPDATE SET
                    device_id = excluded.device_id,
                    step_count = excluded.step_count,
                    goal_achieved = excluded.goal_achieved,
                    daily_charity_earned = excluded.daily_charity_earned,
                    last_updated = excluded.last_updated",
                params![
                    upsert.employee_id,
                    upsert.device_id,
                    step_date,
                    upsert.step_count,
                    upsert.goal_achieved,
                    upsert.daily_charity_earned,
                    Utc::now().to_rfc3339(),
                ],
            )?;
        }

        let sql = format!(
            "SELECT {DAILY_COLUMNS} FROM daily_steps WHERE employee_id = ?1 AND step_date = ?2"
        );
        self.query_daily(&sql, &[&upsert.employee_id, &step_date])?
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::NotFound(format!("{} on {step_date}", upsert.employee_id)))
    }

    async fn fetch_global_settings(&self) -> Result<Option<GlobalSettings>, LedgerError> {
        let conn = self.db.conn()?;
        let settings = conn
            .query_row(
                "SELECT daily_step_goal, charity_amount_per_goal FROM global_settings WHERE id = 1",
                [],
                |row| {
                    Ok(GlobalSettings {
                        daily_step_goal: row.get(0)?,
                        charity_amount_per_goal: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(settings)
    }

    async fn fetch_companies(&self) -> Result<Vec<Company>, LedgerError> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, created_at FROM companies ORDER BY name ASC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, name, created_at)| {
                Ok(Company {
                    id,
                    name,
                    created_at: parse_optional_timestamp(created_at)?,
                })
            })
            .collect()
    }

    async fn find_employee_by_device(
        &self,
        device_id: &str,
    ) -> Result<Option<Employee>, LedgerError> {
        let conn = self.db.conn()?;
        let row = conn
            .query_row(
                "SELECT employee_id, company, is_active, device_id, profile_name,
                        registration_date, created_at
                 FROM employees WHERE device_id = ?1",
                params![device_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()?;

        row.map(
            |(employee_id, company, is_active, device_id, profile_name, registered, created)| {
                Ok(Employee {
                    employee_id,
                    company,
                    is_active,
                    device_id,
                    profile_name,
                    registration_date: parse_optional_timestamp(registered)?,
                    created_at: parse_optional_timestamp(created)?,
                })
            },
        )
        .transpose()
    }

    async fn register_employee(
        &self,
        form: &RegistrationForm,
        device_id: &str,
    ) -> Result<Employee, LedgerError> {
        form.validate()?;
        let now = Utc::now();
        let employee = Employee {
            employee_id: form.employee_id.trim().to_string(),
            company: form.company.trim().to_string(),
            is_active: true,
            device_id: Some(device_id.to_string()),
            profile_name: Some(form.profile_name.trim().to_string()),
            registration_date: Some(now),
            created_at: Some(now),
        };

        let conn = self.db.conn()?;
        let id_taken: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM employees WHERE employee_id = ?1)",
            params![employee.employee_id],
            |row| row.get(0),
        )?;
        if id_taken {
            return Err(LedgerError::Conflict("Employee ID already exists".into()));
        }
        let device_taken: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM employees WHERE device_id = ?1)",
            params![device_id],
            |row| row.get(0),
        )?;
        if device_taken {
            return Err(LedgerError::Conflict("This device is already registered".into()));
        }

        conn.execute(
            "INSERT INTO employees
                (employee_id, company, is_active, device_id, profile_name, registration_date, created_at)
             VALUES (?1, ?2, 1, ?3, ?4, ?5, ?5)",
            params![
                employee.employee_id,
                employee.company,
                device_id,
                employee.profile_name,
                now.to_rfc3339(),
            ],
        )?;
        tracing::info!(employee_id = %employee.employee_id, "registered employee");
        Ok(employee)
    }

    async fn daily_steps_between(
        &self,
        employee_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyStepRecord>, LedgerError> {
        let sql = format!(
            "SELECT {DAILY_COLUMNS} FROM daily_steps
             WHERE employee_id = ?1 AND step_date >= ?2 AND step_date <= ?3
             ORDER BY step_date ASC"
        );
        self.query_daily(&sql, &[&employee_id, &day_key(from), &day_key(to)])
    }

    async fn lifetime_steps(&self, employee_id: &str) -> Result<u64, LedgerError> {
        let total: u64 = self.db.conn()?.query_row(
            "SELECT COALESCE(SUM(step_count), 0) FROM daily_steps WHERE employee_id = ?1",
            params![employee_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    async fn total_charity_earned(&self, employee_id: &str) -> Result<f64, LedgerError> {
        let total: f64 = self.db.conn()?.query_row(
            "SELECT COALESCE(SUM(daily_charity_earned), 0.0) FROM daily_steps WHERE employee_id = ?1",
            params![employee_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::GoalOutcome;

    fn ledger() -> SqliteLedger {
        SqliteLedger::new(Arc::new(Database::open_memory().unwrap())).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn upsert(steps: u64, date: NaiveDate) -> DailyStepUpsert {
        DailyStepUpsert::new(
            "K123456",
            "dev-1",
            date,
            steps,
            GoalOutcome {
                goal_achieved: steps >= 5000,
                charity_earned: if steps >= 5000 { 1.0 } else { 0.0 },
            },
        )
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_day() {
        let ledger = ledger();
        ledger.upsert_daily_steps(upsert(5000, day(1))).await.unwrap();
        let second = ledger.upsert_daily_steps(upsert(6000, day(1))).await.unwrap();
        assert_eq!(second.step_count, 6000);

        let rows = ledger
            .daily_steps_between("K123456", day(1), day(1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].step_count, 6000);
    }

    #[tokio::test]
    async fn test_totals_sum_over_days() {
        let ledger = ledger();
        ledger.upsert_daily_steps(upsert(3000, day(1))).await.unwrap();
        ledger.upsert_daily_steps(upsert(7000, day(2))).await.unwrap();
        ledger.upsert_daily_steps(upsert(9000, day(3))).await.unwrap();

        assert_eq!(ledger.lifetime_steps("K123456").await.unwrap(), 19000);
        assert_eq!(ledger.total_charity_earned("K123456").await.unwrap(), 2.0);
        assert_eq!(ledger.lifetime_steps("K000000").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_settings_absent_until_set() {
        let ledger = ledger();
        assert_eq!(ledger.fetch_global_settings().await.unwrap(), None);
        let settings = GlobalSettings {
            daily_step_goal: 8000,
            charity_amount_per_goal: 0.75,
        };
        ledger.set_global_settings(&settings).unwrap();
        assert_eq!(ledger.fetch_global_settings().await.unwrap(), Some(settings));
    }

    #[tokio::test]
    async fn test_registration_rejects_duplicates() {
        let ledger = ledger();
        let form = RegistrationForm {
            employee_id: "K123456".into(),
            company: "Acme".into(),
            profile_name: "Sam".into(),
        };
        let employee = ledger.register_employee(&form, "dev-1").await.unwrap();
        assert_eq!(
            ledger.find_employee_by_device("dev-1").await.unwrap(),
            Some(employee)
        );

        let err = ledger.register_employee(&form, "dev-2").await.unwrap_err();
        assert_eq!(err.to_string(), "Employee ID already exists");

        let other = RegistrationForm {
            employee_id: "K654321".into(),
            ..form
        };
        let err = ledger.register_employee(&other, "dev-1").await.unwrap_err();
        assert_eq!(err.to_string(), "This device is already registered");
    }

    #[tokio::test]
    async fn test_companies_are_sorted_by_name() {
        let ledger = ledger();
        ledger.add_company("Zeta").unwrap();
        ledger.add_company("Acme").unwrap();
        assert!(ledger.add_company("Acme").is_err());
        let names: Vec<_> = ledger
            .fetch_companies()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Acme", "Zeta"]);
    }

    #[test]
    fn test_blank_company_name_is_rejected() {
        let err = ledger().add_company("   ").unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(err.to_string(), "name: Company name is required");
    }
}
