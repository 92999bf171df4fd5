use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::message::UserId;
use crate::errors::DomainError;

pub const UNKNOWN_FIELD: &str = "Unknown";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactType {
    #[default]
    Anyone,
    Experienced,
    Staff,
}

impl ContactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anyone => "anyone",
            Self::Experienced => "experienced",
            Self::Staff => "staff",
        }
    }
}

impl std::str::FromStr for ContactType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "anyone" => Ok(Self::Anyone),
            "experienced" => Ok(Self::Experienced),
            "staff" => Ok(Self::Staff),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown contact type `{other}`")))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Pending,
    Responded,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Responded => "responded",
        }
    }
}

impl std::str::FromStr for CallStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "pending" => Ok(Self::Pending),
            "responded" => Ok(Self::Responded),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown call status `{other}`")))
            }
        }
    }
}

/// Details pulled out of an emergency-call message. Every field may be absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmergencyMessageInfo {
    pub caller_name: Option<String>,
    pub location: Option<String>,
    pub contact_type: ContactType,
    pub caller_user_id: Option<UserId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyCallRecord {
    pub id: i64,
    pub name: String,
    pub location: String,
    pub contact_type: ContactType,
    pub status: CallStatus,
    pub responded_by: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmergencyCallRecord {
    pub fn mark_responded(
        &mut self,
        responded_by: String,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status != CallStatus::Pending {
            return Err(DomainError::InvalidCallTransition { id: self.id, from: self.status });
        }

        self.status = CallStatus::Responded;
        self.responded_by = Some(responded_by);
        self.responded_at = Some(at);
        self.updated_at = at;
        Ok(())
    }
}

/// Row to insert for a call that was claimed in chat.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewEmergencyCall {
    pub name: String,
    pub location: String,
    pub contact_type: ContactType,
    pub status: CallStatus,
    pub responded_by: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl NewEmergencyCall {
    pub fn responded(
        info: &EmergencyMessageInfo,
        responder_id: &UserId,
        responder_name: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: non_empty_or_unknown(info.caller_name.as_deref()),
            location: non_empty_or_unknown(info.location.as_deref()),
            contact_type: info.contact_type,
            status: CallStatus::Responded,
            responded_by: Some(responder_identity(responder_id, responder_name)),
            responded_at: Some(at),
        }
    }
}

/// Identity string stored on the record, e.g. `田中 (123)`.
pub fn responder_identity(responder_id: &UserId, responder_name: &str) -> String {
    format!("{responder_name} ({responder_id})")
}

fn non_empty_or_unknown(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(UNKNOWN_FIELD)
        .to_owned()
}
