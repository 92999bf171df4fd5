use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use yobidashi_core::detect::is_emergency_message;
use yobidashi_core::domain::message::ChatMessage;
use yobidashi_core::stats::StatsTracker;

use crate::archive::{MessageArchive, RelayOutcome, SheetsRelay};
use crate::commands::{CommandError, CommandOutcome, CommandRouter, SlashCommandInvocation};
use crate::platform::ChatPlatform;
use crate::response::{ReactionOutcome, ResponseCoordinator};

pub use crate::response::ReactionAddedEvent;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayEnvelope {
    pub envelope_id: String,
    pub event: GatewayEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayEvent {
    MessageCreated(MessageCreatedEvent),
    ReactionAdded(ReactionAddedEvent),
    SlashCommand(SlashCommandInvocation),
    Unsupported { event_type: String },
}

impl GatewayEvent {
    pub fn event_type(&self) -> GatewayEventType {
        match self {
            Self::MessageCreated(_) => GatewayEventType::MessageCreated,
            Self::ReactionAdded(_) => GatewayEventType::ReactionAdded,
            Self::SlashCommand(_) => GatewayEventType::SlashCommand,
            Self::Unsupported { .. } => GatewayEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GatewayEventType {
    MessageCreated,
    ReactionAdded,
    SlashCommand,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageCreatedEvent {
    pub message: ChatMessage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    Ignored,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Command(#[from] CommandError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> GatewayEventType;
    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

/// Routes each envelope to every handler registered for its event type, in
/// registration order.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<GatewayEventType, Vec<Arc<dyn EventHandler>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.entry(handler.event_type()).or_default().push(Arc::new(handler));
    }

    /// Runs all matching handlers even when one fails; the first error is returned.
    pub async fn dispatch(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handlers) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        let mut result = HandlerResult::Ignored;
        let mut first_error = None;
        for handler in handlers {
            match handler.handle(envelope, ctx).await {
                Ok(HandlerResult::Processed) => result = HandlerResult::Processed,
                Ok(HandlerResult::Ignored) => {}
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(DispatchError::from(error)),
            None => Ok(result),
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }
}

/// Everything the standard handler set needs.
pub struct DispatcherServices<A> {
    pub platform: Arc<dyn ChatPlatform>,
    pub coordinator: Arc<ResponseCoordinator>,
    pub stats: Arc<StatsTracker>,
    pub reaction_emoji: String,
    pub relay: Option<SheetsRelay<A>>,
}

pub fn build_dispatcher<A>(services: DispatcherServices<A>) -> EventDispatcher
where
    A: MessageArchive + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(EmergencyAutoReactHandler::new(
        services.platform.clone(),
        services.reaction_emoji,
    ));
    if let Some(relay) = services.relay {
        dispatcher.register(SheetsRelayHandler::new(relay));
    }
    dispatcher.register(ReactionAddedHandler::new(services.coordinator));
    dispatcher.register(SlashCommandHandler::new(CommandRouter::new(
        services.platform,
        services.stats,
    )));
    dispatcher
}

/// Marks new emergency calls with the claim emoji.
pub struct EmergencyAutoReactHandler {
    platform: Arc<dyn ChatPlatform>,
    emoji: String,
}

impl EmergencyAutoReactHandler {
    pub fn new(platform: Arc<dyn ChatPlatform>, emoji: impl Into<String>) -> Self {
        Self { platform, emoji: emoji.into() }
    }
}

#[async_trait]
impl EventHandler for EmergencyAutoReactHandler {
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::MessageCreated
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::MessageCreated(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let message = &event.message;

        if &message.author.id == self.platform.bot_user_id() {
            return Ok(HandlerResult::Ignored);
        }
        if !is_emergency_message(message) {
            return Ok(HandlerResult::Ignored);
        }

        info!(
            event_name = "discord.message.emergency_detected",
            correlation_id = %ctx.correlation_id,
            channel_id = %message.channel_id,
            message_id = %message.id,
            "emergency call detected"
        );
        if let Err(error) = self.platform.react(&message.channel_id, &message.id, &self.emoji).await
        {
            warn!(
                event_name = "discord.message.react_failed",
                correlation_id = %ctx.correlation_id,
                message_id = %message.id,
                error = %error,
                "failed to mark emergency call"
            );
        }
        Ok(HandlerResult::Processed)
    }
}

pub struct SheetsRelayHandler<A> {
    relay: SheetsRelay<A>,
}

impl<A> SheetsRelayHandler<A>
where
    A: MessageArchive,
{
    pub fn new(relay: SheetsRelay<A>) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl<A> EventHandler for SheetsRelayHandler<A>
where
    A: MessageArchive + 'static,
{
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::MessageCreated
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::MessageCreated(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        Ok(match self.relay.relay(&event.message).await {
            RelayOutcome::Skipped => HandlerResult::Ignored,
            RelayOutcome::Appended | RelayOutcome::Failed(_) => HandlerResult::Processed,
        })
    }
}

pub struct ReactionAddedHandler {
    coordinator: Arc<ResponseCoordinator>,
}

impl ReactionAddedHandler {
    pub fn new(coordinator: Arc<ResponseCoordinator>) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl EventHandler for ReactionAddedHandler {
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::ReactionAdded
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::ReactionAdded(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        match self.coordinator.on_reaction_added(event).await {
            ReactionOutcome::Claimed(_) => Ok(HandlerResult::Processed),
            ReactionOutcome::Ignored(reason) => {
                debug!(
                    correlation_id = %ctx.correlation_id,
                    message_id = %event.message_id,
                    reason = ?reason,
                    "reaction ignored"
                );
                Ok(HandlerResult::Ignored)
            }
        }
    }
}

pub struct SlashCommandHandler {
    router: CommandRouter,
}

impl SlashCommandHandler {
    pub fn new(router: CommandRouter) -> Self {
        Self { router }
    }
}

#[async_trait]
impl EventHandler for SlashCommandHandler {
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::SlashCommand(invocation) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        Ok(match self.router.route(invocation).await? {
            CommandOutcome::Executed(_) => HandlerResult::Processed,
            CommandOutcome::UnknownCommand(_) => HandlerResult::Ignored,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use yobidashi_core::claims::ClaimRegistry;
    use yobidashi_core::domain::message::{ChannelId, ChatMessage, GuildId, MessageId};
    use yobidashi_core::stats::StatsTracker;
    use yobidashi_db::repositories::InMemoryEmergencyCallRepository;

    use super::{
        build_dispatcher, DispatchError, DispatcherServices, EventContext, EventDispatcher,
        GatewayEnvelope, GatewayEvent, HandlerResult, MessageCreatedEvent, ReactionAddedEvent,
    };
    use crate::archive::{NoopArchive, SheetsRelay};
    use crate::commands::SlashCommandInvocation;
    use crate::platform::InteractionRef;
    use crate::response::ResponseCoordinator;
    use crate::testing::{bot_user, emergency_message, plain_message, user, FakePlatform};

    struct Fixture {
        platform: Arc<FakePlatform>,
        dispatcher: EventDispatcher,
    }

    fn fixture_with(platform: FakePlatform, relay: bool) -> Fixture {
        let platform = Arc::new(platform);
        let stats = Arc::new(StatsTracker::new());
        let coordinator = Arc::new(ResponseCoordinator::new(
            platform.clone(),
            Arc::new(InMemoryEmergencyCallRepository::default()),
            Arc::new(ClaimRegistry::new()),
            stats.clone(),
        ));
        let dispatcher = build_dispatcher(DispatcherServices {
            platform: platform.clone(),
            coordinator,
            stats,
            reaction_emoji: "🫡".to_owned(),
            relay: relay
                .then(|| SheetsRelay::new(NoopArchive, ChannelId("1434".to_owned()))),
        });
        Fixture { platform, dispatcher }
    }

    fn fixture() -> Fixture {
        fixture_with(FakePlatform::new(), true)
    }

    fn envelope(event: GatewayEvent) -> GatewayEnvelope {
        GatewayEnvelope { envelope_id: "env-1".to_owned(), event }
    }

    fn created(message: ChatMessage) -> GatewayEnvelope {
        envelope(GatewayEvent::MessageCreated(MessageCreatedEvent { message }))
    }

    #[test]
    fn standard_dispatcher_registers_handlers() {
        assert_eq!(fixture().dispatcher.handler_count(), 4);
        assert_eq!(fixture_with(FakePlatform::new(), false).dispatcher.handler_count(), 3);
    }

    #[tokio::test]
    async fn emergency_message_is_marked_with_claim_emoji() {
        let f = fixture();
        let mut message = emergency_message("100", "📍 現在地: 本館");
        message.reactions.clear();

        let result = f.dispatcher.dispatch(&created(message), &EventContext::default()).await;

        assert_eq!(result, Ok(HandlerResult::Processed));
        let reactions = f.platform.state.lock().await.reactions.clone();
        assert_eq!(
            reactions,
            vec![(ChannelId("500".to_owned()), MessageId("100".to_owned()), "🫡".to_owned())]
        );
    }

    #[tokio::test]
    async fn own_and_ordinary_messages_are_not_marked() {
        let f = fixture();
        let own = plain_message("1", "500", bot_user(), "🚨 緊急呼び出し");
        let ordinary = plain_message("2", "500", user("10", "tanaka"), "お疲れさまです");

        let own_result = f.dispatcher.dispatch(&created(own), &EventContext::default()).await;
        let ordinary_result =
            f.dispatcher.dispatch(&created(ordinary), &EventContext::default()).await;

        assert_eq!(own_result, Ok(HandlerResult::Ignored));
        assert_eq!(ordinary_result, Ok(HandlerResult::Ignored));
        assert!(f.platform.state.lock().await.reactions.is_empty());
    }

    #[tokio::test]
    async fn react_failure_is_logged_not_raised() {
        let f = fixture_with(FakePlatform::new().with_state(|s| s.fail_react = true).await, false);
        let message = plain_message("1", "500", user("10", "tanaka"), "緊急呼び出しです");

        let result = f.dispatcher.dispatch(&created(message), &EventContext::default()).await;
        assert_eq!(result, Ok(HandlerResult::Processed));
    }

    #[tokio::test]
    async fn relay_channel_messages_reach_the_relay_handler() {
        let f = fixture();
        let message = plain_message("1", "1434", user("10", "tanaka"), "日報");

        let result = f.dispatcher.dispatch(&created(message), &EventContext::default()).await;
        assert_eq!(result, Ok(HandlerResult::Processed));
    }

    #[tokio::test]
    async fn reaction_events_reach_the_coordinator() {
        let f = fixture();
        let event = ReactionAddedEvent {
            channel_id: ChannelId("500".to_owned()),
            message_id: MessageId("100".to_owned()),
            emoji: "🫡".to_owned(),
            user: user("10", "tanaka"),
            message: Some(emergency_message("100", "📍 現在地: 本館")),
        };

        let result = f
            .dispatcher
            .dispatch(&envelope(GatewayEvent::ReactionAdded(event)), &EventContext::default())
            .await;

        assert_eq!(result, Ok(HandlerResult::Processed));
        assert_eq!(f.platform.state.lock().await.threads.len(), 1);
    }

    fn slash(name: &str) -> GatewayEnvelope {
        envelope(GatewayEvent::SlashCommand(SlashCommandInvocation {
            interaction: InteractionRef { id: "1".to_owned(), token: "tok".to_owned() },
            command_name: name.to_owned(),
            channel_id: Some(ChannelId("500".to_owned())),
            guild_id: Some(GuildId("700".to_owned())),
            user: user("10", "tanaka"),
            created_at: Utc::now(),
        }))
    }

    #[tokio::test]
    async fn slash_commands_are_routed_and_failures_surface_as_errors() {
        let f = fixture();
        assert_eq!(
            f.dispatcher.dispatch(&slash("stats"), &EventContext::default()).await,
            Ok(HandlerResult::Processed)
        );
        assert_eq!(
            f.dispatcher.dispatch(&slash("unknown"), &EventContext::default()).await,
            Ok(HandlerResult::Ignored)
        );

        let failing =
            fixture_with(FakePlatform::new().with_state(|s| s.fail_latency = true).await, false);
        let result = failing.dispatcher.dispatch(&slash("ping"), &EventContext::default()).await;
        assert!(matches!(result, Err(DispatchError::Handler(_))));
    }

    #[tokio::test]
    async fn unregistered_event_types_are_ignored() {
        let dispatcher = EventDispatcher::new();
        let result = dispatcher
            .dispatch(
                &envelope(GatewayEvent::Unsupported { event_type: "TYPING_START".to_owned() }),
                &EventContext::default(),
            )
            .await;

        assert_eq!(result, Ok(HandlerResult::Ignored));
    }
}
