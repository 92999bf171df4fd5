use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use yobidashi_core::domain::emergency::{EmergencyCallRecord, NewEmergencyCall};

pub mod emergency_call;
pub mod memory;
pub mod rest;

pub use emergency_call::SqlEmergencyCallRepository;
pub use memory::InMemoryEmergencyCallRepository;
pub use rest::PostgrestEmergencyCallRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store responded with status {status}: {body}")]
    Status { status: u16, body: String },
}

#[async_trait]
pub trait EmergencyCallRepository: Send + Sync {
    async fn insert(&self, call: NewEmergencyCall)
        -> Result<EmergencyCallRecord, RepositoryError>;

    /// Moves a `pending` row to `responded`. Rows in any other state are left
    /// untouched and `None` is returned.
    async fn mark_responded(
        &self,
        id: i64,
        responded_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<EmergencyCallRecord>, RepositoryError>;

    /// Pending calls, newest first.
    async fn list_pending(&self) -> Result<Vec<EmergencyCallRecord>, RepositoryError>;

    async fn ping(&self) -> Result<(), RepositoryError>;
}
