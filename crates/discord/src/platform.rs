use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use yobidashi_core::domain::message::{ChannelId, ChatMessage, ChatUser, GuildId, MessageId, UserId};

use crate::embeds::MessageTemplate;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("platform request failed: {0}")]
    Request(String),
    #[error("platform responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("platform payload could not be decoded: {0}")]
    Decode(String),
    #[error("{0} is not available in this context")]
    Unavailable(String),
}

/// Handle needed to answer a slash-command interaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractionRef {
    pub id: String,
    pub token: String,
}

/// Private follow-up thread opened from a claim notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadRequest {
    pub channel_id: ChannelId,
    /// Notification the thread follows up on. Informational only: private
    /// threads are opened on the channel, not attached to this message.
    pub anchor_message_id: MessageId,
    pub name: String,
    pub reason: String,
}

/// Outbound chat operations the bot relies on.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    fn bot_user_id(&self) -> &UserId;

    async fn fetch_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<ChatMessage, PlatformError>;

    async fn send_message(
        &self,
        channel_id: &ChannelId,
        message: &MessageTemplate,
    ) -> Result<MessageId, PlatformError>;

    async fn react(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        emoji: &str,
    ) -> Result<(), PlatformError>;

    async fn start_private_thread(&self, request: &ThreadRequest)
        -> Result<ChannelId, PlatformError>;

    async fn add_thread_member(
        &self,
        thread_id: &ChannelId,
        user_id: &UserId,
    ) -> Result<(), PlatformError>;

    async fn list_guild_members(&self, guild_id: &GuildId) -> Result<Vec<ChatUser>, PlatformError>;

    /// Round-trip time of one lightweight API call.
    async fn api_latency(&self) -> Result<Duration, PlatformError>;

    async fn reply(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
    ) -> Result<(), PlatformError>;

    async fn defer_reply(&self, interaction: &InteractionRef) -> Result<(), PlatformError>;

    async fn edit_reply(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
    ) -> Result<(), PlatformError>;

    async fn follow_up(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
    ) -> Result<(), PlatformError>;
}
