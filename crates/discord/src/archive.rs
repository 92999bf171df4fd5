use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use yobidashi_core::domain::message::{ChannelId, ChatMessage};

/// Stored in place of an empty message body.
pub const EMPTY_CONTENT_PLACEHOLDER: &str = "(メッセージ内容なし)";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("archive request failed: {0}")]
    Request(String),
    #[error("archive responded with status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Append-only log of channel messages.
#[async_trait]
pub trait MessageArchive: Send + Sync {
    async fn append(&self, content: &str) -> Result<(), ArchiveError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    Appended,
    Skipped,
    Failed(String),
}

/// Copies every human message in one watched channel into the archive.
pub struct SheetsRelay<A> {
    archive: A,
    channel_id: ChannelId,
}

impl<A> SheetsRelay<A>
where
    A: MessageArchive,
{
    pub fn new(archive: A, channel_id: ChannelId) -> Self {
        Self { archive, channel_id }
    }

    pub async fn relay(&self, message: &ChatMessage) -> RelayOutcome {
        if message.author.is_bot || message.channel_id != self.channel_id {
            return RelayOutcome::Skipped;
        }

        let content = if message.content.is_empty() {
            EMPTY_CONTENT_PLACEHOLDER
        } else {
            message.content.as_str()
        };

        match self.archive.append(content).await {
            Ok(()) => {
                info!(
                    event_name = "relay.sheets.appended",
                    channel_id = %message.channel_id,
                    message_id = %message.id,
                    "message appended to sheet"
                );
                RelayOutcome::Appended
            }
            Err(error) => {
                warn!(
                    event_name = "relay.sheets.failed",
                    channel_id = %message.channel_id,
                    message_id = %message.id,
                    error = %error,
                    "failed to append message to sheet"
                );
                RelayOutcome::Failed(error.to_string())
            }
        }
    }
}

/// Archive used when no webhook is configured.
#[derive(Default)]
pub struct NoopArchive;

#[async_trait]
impl MessageArchive for NoopArchive {
    async fn append(&self, content: &str) -> Result<(), ArchiveError> {
        debug!(length = content.len(), "sheet relay disabled; dropping message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use yobidashi_core::domain::message::ChannelId;

    use super::{ArchiveError, MessageArchive, RelayOutcome, SheetsRelay};
    use crate::testing::{bot_user, plain_message, user};

    #[derive(Default)]
    struct RecordingArchive {
        appended: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl MessageArchive for Arc<RecordingArchive> {
        async fn append(&self, content: &str) -> Result<(), ArchiveError> {
            if self.fail {
                return Err(ArchiveError::Status { status: 500, body: "script error".into() });
            }
            self.appended.lock().await.push(content.to_owned());
            Ok(())
        }
    }

    fn relay(archive: &Arc<RecordingArchive>) -> SheetsRelay<Arc<RecordingArchive>> {
        SheetsRelay::new(Arc::clone(archive), ChannelId("1434".to_owned()))
    }

    #[tokio::test]
    async fn appends_messages_from_the_watched_channel() {
        let archive = Arc::new(RecordingArchive::default());
        let message = plain_message("1", "1434", user("10", "tanaka"), "本日の報告");

        assert_eq!(relay(&archive).relay(&message).await, RelayOutcome::Appended);
        assert_eq!(*archive.appended.lock().await, vec!["本日の報告"]);
    }

    #[tokio::test]
    async fn empty_body_is_replaced_with_placeholder() {
        let archive = Arc::new(RecordingArchive::default());
        let message = plain_message("1", "1434", user("10", "tanaka"), "");

        relay(&archive).relay(&message).await;
        assert_eq!(*archive.appended.lock().await, vec!["(メッセージ内容なし)"]);
    }

    #[tokio::test]
    async fn other_channels_and_bots_are_skipped() {
        let archive = Arc::new(RecordingArchive::default());
        let relay = relay(&archive);

        let elsewhere = plain_message("1", "999", user("10", "tanaka"), "hi");
        let from_bot = plain_message("2", "1434", bot_user(), "hi");

        assert_eq!(relay.relay(&elsewhere).await, RelayOutcome::Skipped);
        assert_eq!(relay.relay(&from_bot).await, RelayOutcome::Skipped);
        assert!(archive.appended.lock().await.is_empty());
    }

    #[tokio::test]
    async fn archive_failure_is_reported_not_raised() {
        let archive = Arc::new(RecordingArchive { fail: true, ..RecordingArchive::default() });
        let message = plain_message("1", "1434", user("10", "tanaka"), "本日の報告");

        assert!(matches!(relay(&archive).relay(&message).await, RelayOutcome::Failed(_)));
    }
}
