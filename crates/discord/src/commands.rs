use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info, warn};

use yobidashi_core::domain::message::{ChannelId, ChatUser, GuildId};
use yobidashi_core::stats::StatsTracker;

use crate::embeds::{
    self, generic_failure_message, MessageTemplate, MEMBER_FETCH_FAILURE_TEXT, NO_MEMBERS_TEXT,
    PING_PLACEHOLDER,
};
use crate::platform::{ChatPlatform, InteractionRef, PlatformError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandInvocation {
    pub interaction: InteractionRef,
    pub command_name: String,
    pub channel_id: Option<ChannelId>,
    pub guild_id: Option<GuildId>,
    pub user: ChatUser,
    /// When the platform created the interaction.
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlashCommand {
    Ping,
    Stats,
    Users,
    Unknown(String),
}

impl SlashCommand {
    pub fn parse(name: &str) -> Self {
        let name = name.trim().trim_start_matches('/').to_ascii_lowercase();
        match name.as_str() {
            "ping" => Self::Ping,
            "stats" => Self::Stats,
            "users" => Self::Users,
            _ => Self::Unknown(name),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Ping => "ping",
            Self::Stats => "stats",
            Self::Users => "users",
            Self::Unknown(name) => name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    Executed(SlashCommand),
    UnknownCommand(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("/{command} failed: {source}")]
    Platform { command: String, source: PlatformError },
}

/// Interaction handle that remembers whether the platform has seen a first answer.
struct InteractionSession<'a> {
    platform: &'a dyn ChatPlatform,
    interaction: &'a InteractionRef,
    acknowledged: AtomicBool,
}

impl<'a> InteractionSession<'a> {
    fn new(platform: &'a dyn ChatPlatform, interaction: &'a InteractionRef) -> Self {
        Self { platform, interaction, acknowledged: AtomicBool::new(false) }
    }

    async fn reply(&self, message: &MessageTemplate) -> Result<(), PlatformError> {
        self.platform.reply(self.interaction, message).await?;
        self.acknowledged.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn defer(&self) -> Result<(), PlatformError> {
        self.platform.defer_reply(self.interaction).await?;
        self.acknowledged.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn edit(&self, message: &MessageTemplate) -> Result<(), PlatformError> {
        self.platform.edit_reply(self.interaction, message).await
    }

    async fn follow_up(&self, message: &MessageTemplate) -> Result<(), PlatformError> {
        self.platform.follow_up(self.interaction, message).await
    }

    /// Generic notice, as a follow-up once the interaction was answered.
    async fn report_failure(&self) -> Result<(), PlatformError> {
        let notice = generic_failure_message();
        if self.acknowledged.load(Ordering::SeqCst) {
            self.follow_up(&notice).await
        } else {
            self.reply(&notice).await
        }
    }
}

pub struct CommandRouter {
    platform: Arc<dyn ChatPlatform>,
    stats: Arc<StatsTracker>,
}

impl CommandRouter {
    pub fn new(platform: Arc<dyn ChatPlatform>, stats: Arc<StatsTracker>) -> Self {
        Self { platform, stats }
    }

    pub async fn route(
        &self,
        invocation: &SlashCommandInvocation,
    ) -> Result<CommandOutcome, CommandError> {
        let command = SlashCommand::parse(&invocation.command_name);
        if let SlashCommand::Unknown(name) = command {
            warn!(
                event_name = "discord.command.unknown",
                command = %name,
                user_id = %invocation.user.id,
                "no handler for slash command"
            );
            return Ok(CommandOutcome::UnknownCommand(name));
        }

        let session = InteractionSession::new(self.platform.as_ref(), &invocation.interaction);
        let result = match command {
            SlashCommand::Ping => self.ping(&session, invocation).await,
            SlashCommand::Stats => self.stats(&session).await,
            SlashCommand::Users => self.users(&session, invocation).await,
            SlashCommand::Unknown(_) => Ok(()),
        };

        match result {
            Ok(()) => {
                info!(
                    event_name = "discord.command.executed",
                    command = command.name(),
                    user_id = %invocation.user.id,
                    "slash command executed"
                );
                Ok(CommandOutcome::Executed(command))
            }
            Err(source) => {
                error!(
                    event_name = "discord.command.failed",
                    command = command.name(),
                    error = %source,
                    "slash command failed"
                );
                if let Err(notice_error) = session.report_failure().await {
                    error!(
                        event_name = "discord.command.notice_failed",
                        command = command.name(),
                        error = %notice_error,
                        "could not deliver failure notice"
                    );
                }
                Err(CommandError::Platform { command: command.name().to_owned(), source })
            }
        }
    }

    async fn ping(
        &self,
        session: &InteractionSession<'_>,
        invocation: &SlashCommandInvocation,
    ) -> Result<(), PlatformError> {
        session.reply(&MessageTemplate::text(PING_PLACEHOLDER)).await?;
        let response_ms = (Utc::now() - invocation.created_at).num_milliseconds().max(0);
        let api_latency = self.platform.api_latency().await?;

        session.edit(&embeds::pong_message(response_ms, api_latency.as_millis())).await
    }

    async fn stats(&self, session: &InteractionSession<'_>) -> Result<(), PlatformError> {
        session.reply(&embeds::daily_stats_message(&self.stats.today())).await
    }

    async fn users(
        &self,
        session: &InteractionSession<'_>,
        invocation: &SlashCommandInvocation,
    ) -> Result<(), PlatformError> {
        session.defer().await?;

        let members = match &invocation.guild_id {
            Some(guild_id) => self.platform.list_guild_members(guild_id).await,
            None => Err(PlatformError::Unavailable("member listing outside a guild".to_owned())),
        };
        let members: Vec<ChatUser> = match members {
            Ok(members) => members.into_iter().filter(|member| !member.is_bot).collect(),
            Err(error) => {
                warn!(
                    event_name = "discord.command.members_failed",
                    error = %error,
                    "could not list guild members"
                );
                return session.edit(&MessageTemplate::text(MEMBER_FETCH_FAILURE_TEXT)).await;
            }
        };

        if members.is_empty() {
            return session.edit(&MessageTemplate::text(NO_MEMBERS_TEXT)).await;
        }

        let mut pages = embeds::member_pages(&members).into_iter();
        if let Some(first) = pages.next() {
            session.edit(&first).await?;
        }
        for page in pages {
            session.follow_up(&page).await?;
        }
        Ok(())
    }
}
