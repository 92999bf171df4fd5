use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::domain::message::{MessageId, UserId};

/// One claimable slot: a message plus the reaction emoji on it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClaimKey {
    pub message_id: MessageId,
    pub emoji: String,
}

impl ClaimKey {
    pub fn new(message_id: MessageId, emoji: impl Into<String>) -> Self {
        Self { message_id, emoji: emoji.into() }
    }
}

impl std::fmt::Display for ClaimKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.message_id, self.emoji)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmergencyClaim {
    pub responder_id: UserId,
    pub responder_name: String,
    pub claimed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimAttempt {
    Claimed,
    AlreadyClaimed(EmergencyClaim),
}

impl ClaimAttempt {
    pub fn is_claimed(&self) -> bool {
        matches!(self, Self::Claimed)
    }
}

/// First-responder-wins claim table owned by one coordinator.
///
/// `try_claim` is a synchronous check-and-set under a short lock, so callers can
/// record the claim before they start awaiting any side effect.
#[derive(Debug, Default)]
pub struct ClaimRegistry {
    claims: Mutex<HashMap<ClaimKey, EmergencyClaim>>,
    retention: Option<Duration>,
}

impl ClaimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims older than `retention` are dropped lazily on the next attempt.
    pub fn with_retention(retention: Duration) -> Self {
        Self { claims: Mutex::default(), retention: Some(retention) }
    }

    pub fn try_claim(&self, key: ClaimKey, claim: EmergencyClaim) -> ClaimAttempt {
        let mut claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(retention) = self.retention {
            let cutoff = claim.claimed_at - retention;
            claims.retain(|_, existing| existing.claimed_at > cutoff);
        }

        if let Some(existing) = claims.get(&key) {
            return ClaimAttempt::AlreadyClaimed(existing.clone());
        }

        claims.insert(key, claim);
        ClaimAttempt::Claimed
    }

    /// Whether a message created at `created_at` can still be claimed at `now`.
    ///
    /// A claim is never pruned while its message is inside the window, so
    /// refusing older messages keeps every key claimable at most once.
    pub fn within_retention(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.retention.map_or(true, |retention| created_at > now - retention)
    }

    pub fn get(&self, key: &ClaimKey) -> Option<EmergencyClaim> {
        self.claims.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.claims.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
