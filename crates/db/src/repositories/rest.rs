use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::json;

use yobidashi_core::domain::emergency::{EmergencyCallRecord, NewEmergencyCall};

use super::{EmergencyCallRepository, RepositoryError};

const TABLE: &str = "emergency_calls";

/// Call store backed by a Supabase/PostgREST table.
pub struct PostgrestEmergencyCallRepository {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl PostgrestEmergencyCallRepository {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, RepositoryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: rest_base_url(base_url), api_key })
    }

    fn table_url(&self) -> String {
        format!("{}/{TABLE}", self.base_url)
    }

    fn request(&self, method: Method, query: &[(&str, String)]) -> RequestBuilder {
        let key = self.api_key.expose_secret();
        self.client
            .request(method, self.table_url())
            .query(query)
            .header("apikey", key)
            .bearer_auth(key)
            .header("Prefer", "return=representation")
    }

    async fn read_rows(response: Response) -> Result<Vec<EmergencyCallRecord>, RepositoryError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RepositoryError::Status { status: status.as_u16(), body });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| RepositoryError::Decode(e.to_string()))
    }
}

/// Accepts either a project URL or one that already points at `/rest/v1`.
fn rest_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/rest/v1") {
        trimmed.to_owned()
    } else {
        format!("{trimmed}/rest/v1")
    }
}

#[derive(Serialize)]
struct InsertRow<'a> {
    #[serde(flatten)]
    call: &'a NewEmergencyCall,
    created_at: String,
    updated_at: String,
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait::async_trait]
impl EmergencyCallRepository for PostgrestEmergencyCallRepository {
    async fn insert(
        &self,
        call: NewEmergencyCall,
    ) -> Result<EmergencyCallRecord, RepositoryError> {
        let now = timestamp(Utc::now());
        let row = InsertRow { call: &call, created_at: now.clone(), updated_at: now };
        let response = self.request(Method::POST, &[]).json(&row).send().await?;

        Self::read_rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RepositoryError::Decode("insert returned no rows".to_owned()))
    }

    async fn mark_responded(
        &self,
        id: i64,
        responded_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<EmergencyCallRecord>, RepositoryError> {
        let patch = json!({
            "status": "responded",
            "responded_by": responded_by,
            "responded_at": timestamp(at),
            "updated_at": timestamp(at),
        });
        let filter = [("id", format!("eq.{id}")), ("status", "eq.pending".to_owned())];
        let response = self.request(Method::PATCH, &filter).json(&patch).send().await?;

        Ok(Self::read_rows(response).await?.into_iter().next())
    }

    async fn list_pending(&self) -> Result<Vec<EmergencyCallRecord>, RepositoryError> {
        let query = [
            ("select", "*".to_owned()),
            ("status", "eq.pending".to_owned()),
            ("order", "created_at.desc".to_owned()),
        ];
        let response = self.request(Method::GET, &query).send().await?;
        Self::read_rows(response).await
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        let query = [("select", "id".to_owned()), ("limit", "1".to_owned())];
        let response = self.request(Method::GET, &query).send().await?;
        Self::read_rows(response).await.map(|_| ())
    }
}
