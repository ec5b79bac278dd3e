//! Integration tests for the SQLite and REST ledgers.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use mockito::{Matcher, Server};
use stepcharity_core::goal;
use stepcharity_core::{
    DailyStepUpsert, Database, GlobalSettings, LedgerError, RegistrationForm, RestLedger,
    SqliteLedger, StepLedger,
};
use tempfile::TempDir;

const SETTINGS: GlobalSettings = GlobalSettings {
    daily_step_goal: 5000,
    charity_amount_per_goal: 1.5,
};

fn new_year() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn upsert(steps: u64, date: NaiveDate) -> DailyStepUpsert {
    DailyStepUpsert::new(
        "K123456",
        "stepcharity-dev",
        date,
        steps,
        goal::evaluate(steps, &SETTINGS),
    )
}

fn rest_ledger(server: &Server) -> RestLedger {
    RestLedger::new(&server.url(), "anon-key", Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_sqlite_upsert_is_last_write_wins() {
    let temp_dir = TempDir::new().unwrap();
    let db = Arc::new(Database::open_at(&temp_dir.path().join("ledger.db")).unwrap());
    let ledger = SqliteLedger::new(db).unwrap();

    let first = ledger.upsert_daily_steps(upsert(5000, new_year())).await.unwrap();
    assert!(first.goal_achieved);
    let second = ledger.upsert_daily_steps(upsert(6000, new_year())).await.unwrap();
    assert_eq!(first.record_id, second.record_id);

    let rows = ledger
        .daily_steps_between("K123456", new_year(), new_year())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].step_count, 6000);
    assert_eq!(rows[0].daily_charity_earned, 1.5);
    assert_eq!(ledger.lifetime_steps("K123456").await.unwrap(), 6000);
}

#[tokio::test]
async fn test_sqlite_ledger_persists_across_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ledger.db");
    {
        let ledger = SqliteLedger::new(Arc::new(Database::open_at(&path).unwrap())).unwrap();
        ledger.set_global_settings(&SETTINGS).unwrap();
        ledger.upsert_daily_steps(upsert(4200, new_year())).await.unwrap();
    }

    let ledger = SqliteLedger::new(Arc::new(Database::open_at(&path).unwrap())).unwrap();
    assert_eq!(ledger.fetch_global_settings().await.unwrap(), Some(SETTINGS));
    assert_eq!(ledger.lifetime_steps("K123456").await.unwrap(), 4200);
    assert_eq!(ledger.total_charity_earned("K123456").await.unwrap(), 0.0);
}

#[tokio::test]
async fn test_rest_upsert_uses_conflict_key() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/rest/v1/daily_steps")
        .match_query(Matcher::UrlEncoded(
            "on_conflict".into(),
            "employee_id,step_date".into(),
        ))
        .match_header("apikey", "anon-key")
        .match_header("authorization", "Bearer anon-key")
        .match_header("prefer", "resolution=merge-duplicates,return=representation")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "employee_id": "K123456",
            "step_date": "2024-01-01",
            "step_count": 6000,
            "goal_achieved": true,
            "daily_charity_earned": 1.5
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[{"record_id":7,"employee_id":"K123456","device_id":"stepcharity-dev",
                "step_date":"2024-01-01","step_count":6000,"goal_achieved":true,
                "daily_charity_earned":1.5,"last_updated":"2024-01-01T12:00:00+00:00"}]"#,
        )
        .create_async()
        .await;

    let record = rest_ledger(&server)
        .upsert_daily_steps(upsert(6000, new_year()))
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(record.record_id, Some(7));
    assert_eq!(record.step_count, 6000);
}

#[tokio::test]
async fn test_rest_http_failure_is_structured() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/rest/v1/daily_steps")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body(r#"{"code":"XX000","message":"boom"}"#)
        .create_async()
        .await;

    let err = rest_ledger(&server)
        .upsert_daily_steps(upsert(10, new_year()))
        .await
        .unwrap_err();
    match err {
        LedgerError::Http { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_rest_reads_settings_and_employee() {
    let mut server = Server::new_async().await;
    let _settings = server
        .mock("GET", "/rest/v1/global_settings")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("select".into(), "*".into()),
            Matcher::UrlEncoded("limit".into(), "1".into()),
        ]))
        .with_body(r#"[{"id":"g1","dailyStepGoal":7000,"charityAmountPerGoal":2.0}]"#)
        .create_async()
        .await;
    let _employee = server
        .mock("GET", "/rest/v1/employees")
        .match_query(Matcher::UrlEncoded("deviceId".into(), "eq.stepcharity-dev".into()))
        .with_body(
            r#"[{"employeeId":"K123456","company":"Acme","isActive":true,
                "deviceId":"stepcharity-dev","profileName":"Sam"}]"#,
        )
        .create_async()
        .await;

    let ledger = rest_ledger(&server);
    let settings = ledger.fetch_global_settings().await.unwrap().unwrap();
    assert_eq!(settings.daily_step_goal, 7000);

    let employee = ledger
        .find_employee_by_device("stepcharity-dev")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(employee.employee_id, "K123456");
    assert_eq!(employee.profile_name.as_deref(), Some("Sam"));
}

#[tokio::test]
async fn test_rest_registration_conflicts() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/rest/v1/employees")
        .with_status(409)
        .with_body(
            r#"{"code":"23505","message":"duplicate key value violates unique constraint \"employees_deviceId_key\""}"#,
        )
        .create_async()
        .await;

    let form = RegistrationForm {
        employee_id: "K123456".into(),
        company: "Acme".into(),
        profile_name: "Sam".into(),
    };
    let err = rest_ledger(&server)
        .register_employee(&form, "stepcharity-dev")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "This device is already registered");
}

#[tokio::test]
async fn test_rest_registration_validates_before_sending() {
    let server = Server::new_async().await;
    let form = RegistrationForm {
        employee_id: "123".into(),
        company: "Acme".into(),
        profile_name: "Sam".into(),
    };
    let err = rest_ledger(&server)
        .register_employee(&form, "stepcharity-dev")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[tokio::test]
async fn test_rest_totals_sum_rows() {
    let mut server = Server::new_async().await;
    let _steps = server
        .mock("GET", "/rest/v1/daily_steps")
        .match_query(Matcher::UrlEncoded("select".into(), "step_count".into()))
        .with_body(r#"[{"step_count":1200},{"step_count":8000}]"#)
        .create_async()
        .await;
    let _charity = server
        .mock("GET", "/rest/v1/daily_steps")
        .match_query(Matcher::UrlEncoded(
            "select".into(),
            "daily_charity_earned".into(),
        ))
        .with_body(r#"[{"daily_charity_earned":0},{"daily_charity_earned":1.5}]"#)
        .create_async()
        .await;

    let ledger = rest_ledger(&server);
    assert_eq!(ledger.lifetime_steps("K123456").await.unwrap(), 9200);
    assert_eq!(ledger.total_charity_earned("K123456").await.unwrap(), 1.5);
}
