use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use yobidashi_core::domain::message::{
    ChannelId, ChatMessage, ChatUser, EmbedField, GuildId, MessageEmbed, MessageId,
    ReactionSummary, UserId,
};

use crate::embeds::MessageTemplate;
use crate::platform::{ChatPlatform, InteractionRef, PlatformError, ThreadRequest};

pub const BOT_ID: &str = "900";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InteractionCall {
    Reply(MessageTemplate),
    Defer,
    Edit(MessageTemplate),
    FollowUp(MessageTemplate),
}

#[derive(Default)]
pub struct FakeState {
    pub messages: HashMap<MessageId, ChatMessage>,
    pub members: Vec<ChatUser>,
    pub fail_fetch: bool,
    pub fail_send: bool,
    pub fail_react: bool,
    pub fail_thread: bool,
    pub fail_member_add: bool,
    pub fail_members: bool,
    pub fail_reply: bool,
    pub fail_latency: bool,
    pub sent: Vec<(ChannelId, MessageTemplate)>,
    pub reactions: Vec<(ChannelId, MessageId, String)>,
    pub threads: Vec<ThreadRequest>,
    pub thread_members: Vec<(ChannelId, UserId)>,
    pub interactions: Vec<InteractionCall>,
    pub fetch_calls: usize,
    next_id: u64,
}

pub struct FakePlatform {
    bot_user_id: UserId,
    pub state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self { bot_user_id: UserId(BOT_ID.to_owned()), state: Mutex::new(FakeState::default()) }
    }

    pub async fn with_state(self, configure: impl FnOnce(&mut FakeState)) -> Self {
        configure(&mut *self.state.lock().await);
        self
    }

    fn failure(operation: &str) -> PlatformError {
        PlatformError::Status { status: 500, body: format!("{operation} failed") }
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    fn bot_user_id(&self) -> &UserId {
        &self.bot_user_id
    }

    async fn fetch_message(
        &self,
        _channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<ChatMessage, PlatformError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        state.fetch_calls += 1;
        if state.fail_fetch {
            return Err(Self::failure("fetch"));
        }
        state
            .messages
            .get(message_id)
            .cloned()
            .ok_or_else(|| PlatformError::Status { status: 404, body: "Unknown Message".into() })
    }

    async fn send_message(
        &self,
        channel_id: &ChannelId,
        message: &MessageTemplate,
    ) -> Result<MessageId, PlatformError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        if state.fail_send {
            return Err(Self::failure("send"));
        }
        state.next_id += 1;
        let id = MessageId(format!("sent-{}", state.next_id));
        state.sent.push((channel_id.clone(), message.clone()));
        Ok(id)
    }

    async fn react(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock().await;
        if state.fail_react {
            return Err(Self::failure("react"));
        }
        state.reactions.push((channel_id.clone(), message_id.clone(), emoji.to_owned()));
        Ok(())
    }

    async fn start_private_thread(
        &self,
        request: &ThreadRequest,
    ) -> Result<ChannelId, PlatformError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        if state.fail_thread {
            return Err(Self::failure("thread"));
        }
        state.threads.push(request.clone());
        Ok(ChannelId(format!("thread-{}", state.threads.len())))
    }

    async fn add_thread_member(
        &self,
        thread_id: &ChannelId,
        user_id: &UserId,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock().await;
        if state.fail_member_add {
            return Err(Self::failure("thread member"));
        }
        state.thread_members.push((thread_id.clone(), user_id.clone()));
        Ok(())
    }

    async fn list_guild_members(
        &self,
        _guild_id: &GuildId,
    ) -> Result<Vec<ChatUser>, PlatformError> {
        let state = self.state.lock().await;
        if state.fail_members {
            return Err(Self::failure("members"));
        }
        Ok(state.members.clone())
    }

    async fn api_latency(&self) -> Result<Duration, PlatformError> {
        if self.state.lock().await.fail_latency {
            return Err(Self::failure("latency"));
        }
        Ok(Duration::from_millis(42))
    }

    async fn reply(
        &self,
        _interaction: &InteractionRef,
        message: &MessageTemplate,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock().await;
        if state.fail_reply {
            return Err(Self::failure("reply"));
        }
        state.interactions.push(InteractionCall::Reply(message.clone()));
        Ok(())
    }

    async fn defer_reply(&self, _interaction: &InteractionRef) -> Result<(), PlatformError> {
        self.state.lock().await.interactions.push(InteractionCall::Defer);
        Ok(())
    }

    async fn edit_reply(
        &self,
        _interaction: &InteractionRef,
        message: &MessageTemplate,
    ) -> Result<(), PlatformError> {
        self.state.lock().await.interactions.push(InteractionCall::Edit(message.clone()));
        Ok(())
    }

    async fn follow_up(
        &self,
        _interaction: &InteractionRef,
        message: &MessageTemplate,
    ) -> Result<(), PlatformError> {
        self.state.lock().await.interactions.push(InteractionCall::FollowUp(message.clone()));
        Ok(())
    }
}

pub fn user(id: &str, name: &str) -> ChatUser {
    ChatUser {
        id: UserId(id.to_owned()),
        is_bot: false,
        username: name.to_owned(),
        display_name: None,
    }
}

pub fn bot_user() -> ChatUser {
    ChatUser { is_bot: true, ..user(BOT_ID, "yobidashi") }
}

/// Embed-style emergency call with the bot's salute already attached.
pub fn emergency_message(id: &str, description: &str) -> ChatMessage {
    ChatMessage {
        id: MessageId(id.to_owned()),
        channel_id: ChannelId("500".to_owned()),
        guild_id: Some(GuildId("700".to_owned())),
        author: user("300", "webhook"),
        content: String::new(),
        embeds: vec![MessageEmbed {
            title: Some("🚨 緊急呼び出し".to_owned()),
            description: Some(description.to_owned()),
            fields: Vec::new(),
        }],
        reactions: vec![ReactionSummary {
            emoji: "🫡".to_owned(),
            count: 1,
            reacted_by_bot: true,
        }],
    }
}

/// Form-style emergency call whose details live in structured embed fields.
pub fn emergency_form_message(id: &str, fields: &[(&str, &str)]) -> ChatMessage {
    let mut message = emergency_message(id, "");
    message.embeds[0].description = None;
    message.embeds[0].fields = fields
        .iter()
        .map(|(name, value)| EmbedField { name: (*name).to_owned(), value: (*value).to_owned() })
        .collect();
    message
}

pub fn plain_message(id: &str, channel: &str, author: ChatUser, content: &str) -> ChatMessage {
    ChatMessage {
        id: MessageId(id.to_owned()),
        channel_id: ChannelId(channel.to_owned()),
        guild_id: Some(GuildId("700".to_owned())),
        author,
        content: content.to_owned(),
        embeds: Vec::new(),
        reactions: Vec::new(),
    }
}
