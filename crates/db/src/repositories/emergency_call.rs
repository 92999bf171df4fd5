use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;

use yobidashi_core::domain::emergency::{
    CallStatus, ContactType, EmergencyCallRecord, NewEmergencyCall,
};

use super::{EmergencyCallRepository, RepositoryError};
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT id, name, location, contact_type, status, responded_by,
        responded_at, created_at, updated_at
 FROM emergency_calls";

pub struct SqlEmergencyCallRepository {
    pool: DbPool,
}

impl SqlEmergencyCallRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<EmergencyCallRecord>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_call).transpose()
    }
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn row_to_call(row: &sqlx::sqlite::SqliteRow) -> Result<EmergencyCallRecord, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let id: i64 = row.try_get("id").map_err(decode)?;
    let name: String = row.try_get("name").map_err(decode)?;
    let location: String = row.try_get("location").map_err(decode)?;
    let contact_type: String = row.try_get("contact_type").map_err(decode)?;
    let status: String = row.try_get("status").map_err(decode)?;
    let responded_by: Option<String> = row.try_get("responded_by").map_err(decode)?;
    let responded_at: Option<String> = row.try_get("responded_at").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    Ok(EmergencyCallRecord {
        id,
        name,
        location,
        contact_type: contact_type
            .parse::<ContactType>()
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        status: status.parse::<CallStatus>().map_err(|e| RepositoryError::Decode(e.to_string()))?,
        responded_by,
        responded_at: responded_at
            .as_deref()
            .map(|value| parse_timestamp("responded_at", value))
            .transpose()?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl EmergencyCallRepository for SqlEmergencyCallRepository {
    async fn insert(
        &self,
        call: NewEmergencyCall,
    ) -> Result<EmergencyCallRecord, RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO emergency_calls (name, location, contact_type, status, responded_by,
                                          responded_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&call.name)
        .bind(&call.location)
        .bind(call.contact_type.as_str())
        .bind(call.status.as_str())
        .bind(&call.responded_by)
        .bind(call.responded_at.map(timestamp))
        .bind(timestamp(now))
        .bind(timestamp(now))
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::Decode(format!("inserted call {id} was not found")))
    }

    async fn mark_responded(
        &self,
        id: i64,
        responded_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<EmergencyCallRecord>, RepositoryError> {
        let result = sqlx::query(
            "UPDATE emergency_calls
             SET status = 'responded', responded_by = ?, responded_at = ?, updated_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(responded_by)
        .bind(timestamp(at))
        .bind(timestamp(at))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    async fn list_pending(&self) -> Result<Vec<EmergencyCallRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE status = 'pending' ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_call).collect::<Result<Vec<_>, _>>()
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
