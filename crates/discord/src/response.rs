//! First-responder coordination for emergency calls.
//!
//! A reaction on an emergency message claims it for the reacting member. The
//! claim is recorded before any I/O, so a second reaction that arrives while the
//! first one is still persisting or notifying finds the slot taken and stops.
//! The follow-up work then runs as a fixed pipeline whose steps fail
//! independently.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use yobidashi_core::claims::{ClaimAttempt, ClaimKey, ClaimRegistry, EmergencyClaim};
use yobidashi_core::detect::is_emergency_message;
use yobidashi_core::domain::emergency::{EmergencyMessageInfo, NewEmergencyCall};
use yobidashi_core::domain::message::{ChannelId, ChatMessage, ChatUser, MessageId, UserId};
use yobidashi_core::extract::parse_emergency_message;
use yobidashi_core::stats::StatsTracker;
use yobidashi_db::repositories::EmergencyCallRepository;

use crate::embeds::{
    emergency_notification, responder_thread_name, thread_welcome, THREAD_AUDIT_REASON,
};
use crate::platform::{ChatPlatform, PlatformError, ThreadRequest};
use crate::wire::snowflake_timestamp;

/// A member added a reaction to a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionAddedEvent {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub emoji: String,
    pub user: ChatUser,
    /// Full message when the gateway delivered it; `None` means it must be fetched.
    pub message: Option<ChatMessage>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    BotReactor,
    HydrationFailed,
    NotEmergency,
    NotClaimable,
    OutsideRetention,
    AlreadyClaimed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    Skipped(&'static str),
    Failed(String),
}

impl StepOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    fn failed(error: impl fmt::Display) -> Self {
        Self::Failed(error.to_string())
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => f.write_str("done"),
            Self::Skipped(reason) => write!(f, "skipped ({reason})"),
            Self::Failed(error) => write!(f, "failed ({error})"),
        }
    }
}

/// What happened after a claim was won.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseReport {
    pub key: ClaimKey,
    pub responder_id: UserId,
    pub caller_user_id: Option<UserId>,
    pub persisted: StepOutcome,
    pub notified: StepOutcome,
    pub thread: StepOutcome,
    pub stats: StepOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReactionOutcome {
    Ignored(IgnoreReason),
    Claimed(Box<ResponseReport>),
}

pub struct ResponseCoordinator {
    platform: Arc<dyn ChatPlatform>,
    store: Arc<dyn EmergencyCallRepository>,
    claims: Arc<ClaimRegistry>,
    stats: Arc<StatsTracker>,
}

impl ResponseCoordinator {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        store: Arc<dyn EmergencyCallRepository>,
        claims: Arc<ClaimRegistry>,
        stats: Arc<StatsTracker>,
    ) -> Self {
        Self { platform, store, claims, stats }
    }

    pub fn claims(&self) -> &ClaimRegistry {
        &self.claims
    }

    pub async fn on_reaction_added(&self, event: &ReactionAddedEvent) -> ReactionOutcome {
        if event.user.is_bot || &event.user.id == self.platform.bot_user_id() {
            return ReactionOutcome::Ignored(IgnoreReason::BotReactor);
        }

        let Some(message) = self.hydrate(event).await else {
            return ReactionOutcome::Ignored(IgnoreReason::HydrationFailed);
        };

        if !is_emergency_message(&message) {
            return ReactionOutcome::Ignored(IgnoreReason::NotEmergency);
        }
        if !message.bot_reacted_with(&event.emoji) {
            debug!(
                message_id = %message.id,
                emoji = %event.emoji,
                "reaction is not on a bot-marked emoji; ignoring"
            );
            return ReactionOutcome::Ignored(IgnoreReason::NotClaimable);
        }

        let now = Utc::now();
        if let Some(created_at) = snowflake_timestamp(&message.id.0) {
            if !self.claims.within_retention(created_at, now) {
                debug!(
                    message_id = %message.id,
                    created_at = %created_at,
                    "emergency message is older than the claim window; ignoring"
                );
                return ReactionOutcome::Ignored(IgnoreReason::OutsideRetention);
            }
        }

        let key = ClaimKey::new(message.id.clone(), event.emoji.clone());
        let claim = EmergencyClaim {
            responder_id: event.user.id.clone(),
            responder_name: event.user.name().to_owned(),
            claimed_at: now,
        };
        if let ClaimAttempt::AlreadyClaimed(existing) = self.claims.try_claim(key.clone(), claim) {
            debug!(
                claim_key = %key,
                responder_id = %existing.responder_id,
                late_user_id = %event.user.id,
                "emergency call already claimed"
            );
            return ReactionOutcome::Ignored(IgnoreReason::AlreadyClaimed);
        }

        info!(
            event_name = "coordinator.claim.recorded",
            claim_key = %key,
            responder_id = %event.user.id,
            "emergency call claimed"
        );

        let report = self.respond(key, &message, &event.user).await;
        ReactionOutcome::Claimed(Box::new(report))
    }

    async fn hydrate(&self, event: &ReactionAddedEvent) -> Option<ChatMessage> {
        if let Some(message) = &event.message {
            return Some(message.clone());
        }

        match self.platform.fetch_message(&event.channel_id, &event.message_id).await {
            Ok(message) => Some(message),
            Err(error) => {
                error!(
                    event_name = "coordinator.hydrate.failed",
                    channel_id = %event.channel_id,
                    message_id = %event.message_id,
                    error = %error,
                    "could not fetch reacted message"
                );
                None
            }
        }
    }

    async fn respond(
        &self,
        key: ClaimKey,
        message: &ChatMessage,
        responder: &ChatUser,
    ) -> ResponseReport {
        let info = parse_emergency_message(message);
        let caller = info.caller_user_id.clone();

        let persisted = self.persist(&info, responder).await;
        let (notification_id, notified) =
            self.notify(&message.channel_id, &responder.id, caller.as_ref()).await;
        let thread = match notification_id {
            Some(anchor) => {
                self.open_thread(&message.channel_id, anchor, responder, caller.as_ref()).await
            }
            None => StepOutcome::Skipped("notification was not sent"),
        };

        self.stats.record_response(&responder.id, responder.name());
        let stats = StepOutcome::Done;

        let report = ResponseReport {
            key,
            responder_id: responder.id.clone(),
            caller_user_id: caller,
            persisted,
            notified,
            thread,
            stats,
        };

        let all_done = [&report.persisted, &report.notified, &report.thread, &report.stats]
            .iter()
            .all(|outcome| outcome.is_done());
        if all_done {
            info!(
                event_name = "coordinator.response.completed",
                claim_key = %report.key,
                responder_id = %report.responder_id,
                caller_id = report.caller_user_id.as_ref().map_or("none", |id| id.0.as_str()),
                "emergency response completed"
            );
        } else {
            warn!(
                event_name = "coordinator.response.partial",
                claim_key = %report.key,
                responder_id = %report.responder_id,
                persisted = %report.persisted,
                notified = %report.notified,
                thread = %report.thread,
                stats = %report.stats,
                "emergency response completed with failed steps"
            );
        }

        report
    }

    async fn persist(&self, info: &EmergencyMessageInfo, responder: &ChatUser) -> StepOutcome {
        let call = NewEmergencyCall::responded(info, &responder.id, responder.name(), Utc::now());
        match self.store.insert(call).await {
            Ok(record) => {
                info!(
                    event_name = "coordinator.persist.recorded",
                    call_id = record.id,
                    "emergency response recorded"
                );
                StepOutcome::Done
            }
            Err(error) => {
                warn!(
                    event_name = "coordinator.persist.failed",
                    error = %error,
                    "failed to record emergency response"
                );
                StepOutcome::failed(error)
            }
        }
    }

    async fn notify(
        &self,
        channel_id: &ChannelId,
        responder: &UserId,
        caller: Option<&UserId>,
    ) -> (Option<MessageId>, StepOutcome) {
        let notification = emergency_notification(responder, caller);
        match self.platform.send_message(channel_id, &notification).await {
            Ok(message_id) => (Some(message_id), StepOutcome::Done),
            Err(error) => {
                warn!(
                    event_name = "coordinator.notify.failed",
                    channel_id = %channel_id,
                    error = %error,
                    "failed to send responder notification"
                );
                (None, StepOutcome::failed(error))
            }
        }
    }

    async fn open_thread(
        &self,
        channel_id: &ChannelId,
        anchor: MessageId,
        responder: &ChatUser,
        caller: Option<&UserId>,
    ) -> StepOutcome {
        match self.try_open_thread(channel_id, anchor, responder, caller).await {
            Ok(thread_id) => {
                info!(
                    event_name = "coordinator.thread.created",
                    thread_id = %thread_id,
                    "private follow-up thread created"
                );
                StepOutcome::Done
            }
            Err(error) => {
                warn!(
                    event_name = "coordinator.thread.failed",
                    channel_id = %channel_id,
                    error = %error,
                    "failed to set up private follow-up thread"
                );
                StepOutcome::failed(error)
            }
        }
    }

    async fn try_open_thread(
        &self,
        channel_id: &ChannelId,
        anchor: MessageId,
        responder: &ChatUser,
        caller: Option<&UserId>,
    ) -> Result<ChannelId, PlatformError> {
        let request = ThreadRequest {
            channel_id: channel_id.clone(),
            anchor_message_id: anchor,
            name: responder_thread_name(responder.name()),
            reason: THREAD_AUDIT_REASON.to_owned(),
        };
        let thread_id = self.platform.start_private_thread(&request).await?;

        self.platform.add_thread_member(&thread_id, &responder.id).await?;
        if let Some(caller) = caller.filter(|caller| **caller != responder.id) {
            self.platform.add_thread_member(&thread_id, caller).await?;
        }

        self.platform.send_message(&thread_id, &thread_welcome(&responder.id, caller)).await?;
        Ok(thread_id)
    }
}
