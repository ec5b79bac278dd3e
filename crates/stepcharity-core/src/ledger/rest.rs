//! PostgREST ledger client.
//!
//! Tables live under `{base}/rest/v1/`. Every request carries the API key
//! both as `apikey` and as a bearer token.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::{
    Company, DailyStepRecord, DailyStepUpsert, Employee, GlobalSettings, RegistrationForm,
    StepLedger,
};
use crate::calendar::day_key;
use crate::error::LedgerError;

const UPSERT_CONFLICT_KEY: &str = "employee_id,step_date";
const PREFER_UPSERT: &str = "resolution=merge-duplicates,return=representation";
const PREFER_RETURN: &str = "return=representation";

pub struct RestLedger {
    client: Client,
    base: Url,
    api_key: String,
}

impl RestLedger {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, LedgerError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| LedgerError::NotConfigured(format!("invalid backend url '{base_url}': {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            api_key: api_key.to_string(),
        })
    }

    fn table_url(&self, table: &str, query: &[(&str, String)]) -> Result<Url, LedgerError> {
        let mut url = self
            .base
            .join(&format!("rest/v1/{table}"))
            .map_err(|e| LedgerError::NotConfigured(e.to_string()))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn get_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, LedgerError> {
        let url = self.table_url(table, query)?;
        tracing::debug!(%url, "ledger GET");
        let response = self.authorized(self.client.get(url)).send().await?;
        decode(check(response).await?).await
    }
}

/// PostgREST error body.
#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

impl ApiError {
    fn mentions(&self, needle: &str) -> bool {
        [&self.message, &self.details]
            .into_iter()
            .flatten()
            .any(|text| text.contains(needle))
    }

    fn is_unique_violation(&self) -> bool {
        self.code.as_deref() == Some("23505")
    }
}

async fn error_body(response: Response) -> (u16, ApiError, String) {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<ApiError>(&text).unwrap_or_default();
    (status, parsed, text)
}

async fn check(response: Response) -> Result<Response, LedgerError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let (status, parsed, text) = error_body(response).await;
    Err(LedgerError::Http {
        status,
        message: parsed.message.unwrap_or(text),
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, LedgerError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| LedgerError::Decode(e.to_string()))
}

#[derive(Deserialize)]
struct StepCountRow {
    step_count: u64,
}

#[derive(Deserialize)]
struct CharityRow {
    daily_charity_earned: f64,
}

#[async_trait]
impl StepLedger for RestLedger {
    async fn upsert_daily_steps(
        &self,
        upsert: DailyStepUpsert,
    ) -> Result<DailyStepRecord, LedgerError> {
        let url = self.table_url(
            "daily_steps",
            &[("on_conflict", UPSERT_CONFLICT_KEY.to_string())],
        )?;
        let body = upsert.into_record(chrono::Utc::now());
        tracing::debug!(
            employee_id = %body.employee_id,
            date = %day_key(body.step_date),
            steps = body.step_count,
            "ledger upsert"
        );

        let response = self
            .authorized(self.client.post(url))
            .header("Prefer", PREFER_UPSERT)
            .json(&body)
            .send()
            .await?;
        let rows: Vec<DailyStepRecord> = decode(check(response).await?).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| LedgerError::Decode("upsert returned no rows".into()))
    }

    async fn fetch_global_settings(&self) -> Result<Option<GlobalSettings>, LedgerError> {
        let rows: Vec<GlobalSettings> = self
            .get_rows(
                "global_settings",
                &[("select", "*".into()), ("limit", "1".into())],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_companies(&self) -> Result<Vec<Company>, LedgerError> {
        self.get_rows(
            "companies",
            &[("select", "*".into()), ("order", "name.asc".into())],
        )
        .await
    }

    async fn find_employee_by_device(
        &self,
        device_id: &str,
    ) -> Result<Option<Employee>, LedgerError> {
        let rows: Vec<Employee> = self
            .get_rows(
                "employees",
                &[
                    ("select", "*".into()),
                    ("deviceId", format!("eq.{device_id}")),
                    ("limit", "1".into()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn register_employee(
        &self,
        form: &RegistrationForm,
        device_id: &str,
    ) -> Result<Employee, LedgerError> {
        form.validate()?;
        let now = chrono::Utc::now();
        let employee = Employee {
            employee_id: form.employee_id.trim().to_string(),
            company: form.company.trim().to_string(),
            is_active: true,
            device_id: Some(device_id.to_string()),
            profile_name: Some(form.profile_name.trim().to_string()),
            registration_date: Some(now),
            created_at: None,
        };

        let url = self.table_url("employees", &[])?;
        let response = self
            .authorized(self.client.post(url))
            .header("Prefer", PREFER_RETURN)
            .json(&employee)
            .send()
            .await?;

        if response.status().as_u16() == 409 {
            let (_, parsed, _) = error_body(response).await;
            if parsed.is_unique_violation() && parsed.mentions("deviceId") {
                return Err(LedgerError::Conflict("This device is already registered".into()));
            }
            return Err(LedgerError::Conflict("Employee ID already exists".into()));
        }

        let rows: Vec<Employee> = decode(check(response).await?).await?;
        let created = rows.into_iter().next().unwrap_or(employee);
        tracing::info!(employee_id = %created.employee_id, "registered employee");
        Ok(created)
    }

    async fn daily_steps_between(
        &self,
        employee_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyStepRecord>, LedgerError> {
        self.get_rows(
            "daily_steps",
            &[
                ("select", "*".into()),
                ("employee_id", format!("eq.{employee_id}")),
                ("step_date", format!("gte.{}", day_key(from))),
                ("step_date", format!("lte.{}", day_key(to))),
                ("order", "step_date.asc".into()),
            ],
        )
        .await
    }

    async fn lifetime_steps(&self, employee_id: &str) -> Result<u64, LedgerError> {
        let rows: Vec<StepCountRow> = self
            .get_rows(
                "daily_steps",
                &[
                    ("select", "step_count".into()),
                    ("employee_id", format!("eq.{employee_id}")),
                ],
            )
            .await?;
        Ok(rows.iter().map(|r| r.step_count).sum())
    }

    async fn total_charity_earned(&self, employee_id: &str) -> Result<f64, LedgerError> {
        let rows: Vec<CharityRow> = self
            .get_rows(
                "daily_steps",
                &[
                    ("select", "daily_charity_earned".into()),
                    ("employee_id", format!("eq.{employee_id}")),
                ],
            )
            .await?;
        Ok(rows.iter().map(|r| r.daily_charity_earned).sum())
    }
}
