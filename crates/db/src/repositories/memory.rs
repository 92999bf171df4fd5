use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use yobidashi_core::domain::emergency::{CallStatus, EmergencyCallRecord, NewEmergencyCall};

use super::{EmergencyCallRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryEmergencyCallRepository {
    calls: RwLock<Vec<EmergencyCallRecord>>,
}

impl InMemoryEmergencyCallRepository {
    /// Stores a row as-is, for seeding `pending` calls raised outside the bot.
    pub async fn seed(&self, record: EmergencyCallRecord) {
        self.calls.write().await.push(record);
    }

    pub async fn all(&self) -> Vec<EmergencyCallRecord> {
        self.calls.read().await.clone()
    }
}

#[async_trait::async_trait]
impl EmergencyCallRepository for InMemoryEmergencyCallRepository {
    async fn insert(
        &self,
        call: NewEmergencyCall,
    ) -> Result<EmergencyCallRecord, RepositoryError> {
        let mut calls = self.calls.write().await;
        let now = Utc::now();
        let record = EmergencyCallRecord {
            id: calls.iter().map(|existing| existing.id).max().unwrap_or(0) + 1,
            name: call.name,
            location: call.location,
            contact_type: call.contact_type,
            status: call.status,
            responded_by: call.responded_by,
            responded_at: call.responded_at,
            created_at: now,
            updated_at: now,
        };
        calls.push(record.clone());
        Ok(record)
    }

    async fn mark_responded(
        &self,
        id: i64,
        responded_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<EmergencyCallRecord>, RepositoryError> {
        let mut calls = self.calls.write().await;
        let Some(call) = calls.iter_mut().find(|call| call.id == id) else {
            return Ok(None);
        };

        match call.mark_responded(responded_by.to_owned(), at) {
            Ok(()) => Ok(Some(call.clone())),
            Err(_) => Ok(None),
        }
    }

    async fn list_pending(&self) -> Result<Vec<EmergencyCallRecord>, RepositoryError> {
        let mut pending = self
            .calls
            .read()
            .await
            .iter()
            .filter(|call| call.status == CallStatus::Pending)
            .cloned()
            .collect::<Vec<_>>();
        pending.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then(right.id.cmp(&left.id))
        });
        Ok(pending)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use yobidashi_core::domain::emergency::{
        CallStatus, ContactType, EmergencyCallRecord, EmergencyMessageInfo, NewEmergencyCall,
    };
    use yobidashi_core::domain::message::UserId;

    use crate::repositories::{EmergencyCallRepository, InMemoryEmergencyCallRepository};

    fn pending(id: i64, minutes_ago: i64) -> EmergencyCallRecord {
        let created_at = Utc::now() - Duration::minutes(minutes_ago);
        EmergencyCallRecord {
            id,
            name: format!("caller-{id}"),
            location: "体育館".to_owned(),
            contact_type: ContactType::Anyone,
            status: CallStatus::Pending,
            responded_by: None,
            responded_at: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let repo = InMemoryEmergencyCallRepository::default();
        let info = EmergencyMessageInfo::default();
        let responder = UserId("42".to_owned());

        let first = repo
            .insert(NewEmergencyCall::responded(&info, &responder, "田中", Utc::now()))
            .await
            .expect("insert first");
        let second = repo
            .insert(NewEmergencyCall::responded(&info, &responder, "田中", Utc::now()))
            .await
            .expect("insert second");

        assert_eq!((first.id, second.id), (1, 2));
        assert_eq!(repo.all().await.len(), 2);
    }

    #[tokio::test]
    async fn mark_responded_is_guarded_by_pending_status() {
        let repo = InMemoryEmergencyCallRepository::default();
        repo.seed(pending(7, 1)).await;

        let updated = repo.mark_responded(7, "田中 (42)", Utc::now()).await.expect("update");
        let repeated = repo.mark_responded(7, "鈴木 (43)", Utc::now()).await.expect("repeat");

        assert_eq!(updated.map(|call| call.status), Some(CallStatus::Responded));
        assert!(repeated.is_none());
        assert_eq!(repo.all().await[0].responded_by.as_deref(), Some("田中 (42)"));
    }

    #[tokio::test]
    async fn list_pending_orders_newest_first() {
        let repo = InMemoryEmergencyCallRepository::default();
        repo.seed(pending(1, 30)).await;
        repo.seed(pending(2, 5)).await;
        repo.seed(pending(3, 10)).await;

        let ids = repo
            .list_pending()
            .await
            .expect("list")
            .into_iter()
            .map(|call| call.id)
            .collect::<Vec<_>>();

        assert_eq!(ids, vec![2, 3, 1]);
    }
}
