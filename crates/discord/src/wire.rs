//! Discord JSON payloads and their conversion into the chat model.
//!
//! Only the fields the bot reads are modelled; everything else is ignored by
//! serde. Gateway dispatch frames (`op = 0`) are decoded into
//! [`GatewayEnvelope`]s by [`decode_dispatch`].

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use yobidashi_core::domain::message::{
    ChannelId, ChatMessage, ChatUser, EmbedField, GuildId, MessageEmbed, MessageId,
    ReactionSummary, UserId,
};

use crate::commands::SlashCommandInvocation;
use crate::events::{GatewayEnvelope, GatewayEvent, MessageCreatedEvent, ReactionAddedEvent};
use crate::platform::InteractionRef;

const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;
const DISPATCH_OPCODE: u8 = 0;
const APPLICATION_COMMAND: u8 = 2;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected dispatch frame, got opcode {0}")]
    NotDispatch(u8),
    #[error("dispatch frame has no event name")]
    MissingEventName,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl WireUser {
    pub fn into_chat_user(self, nick: Option<String>) -> ChatUser {
        ChatUser {
            id: UserId(self.id),
            is_bot: self.bot,
            username: self.username,
            display_name: nick.or(self.global_name),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireMember {
    #[serde(default)]
    pub user: Option<WireUser>,
    #[serde(default)]
    pub nick: Option<String>,
}

impl WireMember {
    pub fn into_chat_user(self) -> Option<ChatUser> {
        let nick = self.nick;
        self.user.map(|user| user.into_chat_user(nick))
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireEmbedField {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireEmbed {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<WireEmbedField>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireEmoji {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl WireEmoji {
    /// Unicode emoji by glyph, custom emoji by name.
    pub fn key(&self) -> String {
        self.name.clone().or_else(|| self.id.clone()).unwrap_or_default()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireReaction {
    pub count: u32,
    #[serde(default)]
    pub me: bool,
    pub emoji: WireEmoji,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireMessage {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    pub author: WireUser,
    #[serde(default)]
    pub member: Option<WireMember>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub embeds: Vec<WireEmbed>,
    #[serde(default)]
    pub reactions: Vec<WireReaction>,
}

impl From<WireMessage> for ChatMessage {
    fn from(message: WireMessage) -> Self {
        let nick = message.member.and_then(|member| member.nick);
        ChatMessage {
            id: MessageId(message.id),
            channel_id: ChannelId(message.channel_id),
            guild_id: message.guild_id.map(GuildId),
            author: message.author.into_chat_user(nick),
            content: message.content,
            embeds: message
                .embeds
                .into_iter()
                .map(|embed| MessageEmbed {
                    title: embed.title,
                    description: embed.description,
                    fields: embed
                        .fields
                        .into_iter()
                        .map(|field| EmbedField { name: field.name, value: field.value })
                        .collect(),
                })
                .collect(),
            reactions: message
                .reactions
                .into_iter()
                .map(|reaction| ReactionSummary {
                    emoji: reaction.emoji.key(),
                    count: reaction.count,
                    reacted_by_bot: reaction.me,
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireReactionAdd {
    pub user_id: String,
    pub channel_id: String,
    pub message_id: String,
    #[serde(default)]
    pub member: Option<WireMember>,
    pub emoji: WireEmoji,
}

impl From<WireReactionAdd> for ReactionAddedEvent {
    fn from(reaction: WireReactionAdd) -> Self {
        let user_id = reaction.user_id;
        let user = reaction.member.and_then(WireMember::into_chat_user).unwrap_or_else(|| {
            ChatUser {
                id: UserId(user_id.clone()),
                is_bot: false,
                username: user_id.clone(),
                display_name: None,
            }
        });

        ReactionAddedEvent {
            channel_id: ChannelId(reaction.channel_id),
            message_id: MessageId(reaction.message_id),
            emoji: reaction.emoji.key(),
            user,
            // reaction frames never carry the message body
            message: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireCommandData {
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireInteraction {
    pub id: String,
    pub token: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub data: Option<WireCommandData>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub member: Option<WireMember>,
    #[serde(default)]
    pub user: Option<WireUser>,
}

impl WireInteraction {
    /// `None` for anything that is not an application command.
    pub fn into_invocation(self) -> Option<SlashCommandInvocation> {
        if self.kind != APPLICATION_COMMAND {
            return None;
        }
        let command_name = self.data?.name;
        let user = self
            .member
            .and_then(WireMember::into_chat_user)
            .or_else(|| self.user.map(|user| user.into_chat_user(None)))?;

        Some(SlashCommandInvocation {
            created_at: snowflake_timestamp(&self.id).unwrap_or_else(Utc::now),
            interaction: InteractionRef { id: self.id, token: self.token },
            command_name,
            channel_id: self.channel_id.map(ChannelId),
            guild_id: self.guild_id.map(GuildId),
            user,
        })
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct WireCreatedId {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct DispatchFrame {
    op: u8,
    #[serde(default)]
    t: Option<String>,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    d: Value,
}

/// Creation time encoded in a snowflake id.
pub fn snowflake_timestamp(id: &str) -> Option<DateTime<Utc>> {
    let raw: u64 = id.parse().ok()?;
    let millis = (raw >> 22) + DISCORD_EPOCH_MS;
    DateTime::from_timestamp_millis(i64::try_from(millis).ok()?)
}

pub fn decode_dispatch(frame: &str) -> Result<GatewayEnvelope, WireError> {
    let frame: DispatchFrame = serde_json::from_str(frame)?;
    if frame.op != DISPATCH_OPCODE {
        return Err(WireError::NotDispatch(frame.op));
    }
    let event_type = frame.t.ok_or(WireError::MissingEventName)?;
    let envelope_id = match frame.s {
        Some(sequence) => format!("{event_type}-{sequence}"),
        None => event_type.clone(),
    };

    let event = match event_type.as_str() {
        "MESSAGE_CREATE" => {
            let message: WireMessage = serde_json::from_value(frame.d)?;
            GatewayEvent::MessageCreated(MessageCreatedEvent { message: message.into() })
        }
        "MESSAGE_REACTION_ADD" => {
            let reaction: WireReactionAdd = serde_json::from_value(frame.d)?;
            GatewayEvent::ReactionAdded(reaction.into())
        }
        "INTERACTION_CREATE" => {
            let interaction: WireInteraction = serde_json::from_value(frame.d)?;
            match interaction.into_invocation() {
                Some(invocation) => GatewayEvent::SlashCommand(invocation),
                None => GatewayEvent::Unsupported { event_type },
            }
        }
        _ => GatewayEvent::Unsupported { event_type },
    };

    Ok(GatewayEnvelope { envelope_id, event })
}
