use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder, Url};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use yobidashi_core::config::DiscordConfig;
use yobidashi_core::domain::message::{ChannelId, ChatMessage, ChatUser, GuildId, MessageId, UserId};
use yobidashi_discord::embeds::MessageTemplate;
use yobidashi_discord::platform::{ChatPlatform, InteractionRef, PlatformError, ThreadRequest};
use yobidashi_discord::wire::{WireCreatedId, WireMember, WireMessage, WireUser};

const PRIVATE_THREAD: u8 = 12;
const THREAD_ARCHIVE_MINUTES: u32 = 1440;
const MEMBER_PAGE_LIMIT: usize = 1000;
const CHANNEL_MESSAGE: u8 = 4;
const DEFERRED_CHANNEL_MESSAGE: u8 = 5;

/// `ChatPlatform` over the Discord HTTP API.
pub struct DiscordRestClient {
    client: Client,
    base_url: Url,
    application_id: String,
    bot_user_id: UserId,
}

impl DiscordRestClient {
    pub fn new(config: &DiscordConfig, bot_user_id: UserId) -> Result<Self, PlatformError> {
        let mut authorization =
            HeaderValue::from_str(&format!("Bot {}", config.bot_token.expose_secret()))
                .map_err(|error| PlatformError::Request(format!("invalid bot token: {error}")))?;
        authorization.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(request_error)?;
        let base_url = Url::parse(config.api_base_url.trim_end_matches('/'))
            .map_err(|error| PlatformError::Request(format!("invalid api base url: {error}")))?;

        Ok(Self { client, base_url, application_id: config.application_id.clone(), bot_user_id })
    }

    /// Builds the client and resolves the bot's own user id.
    pub async fn connect(config: &DiscordConfig) -> Result<Self, PlatformError> {
        let mut client = Self::new(config, UserId(String::new()))?;
        let me: WireUser =
            client.send_json(client.request(Method::GET, &["users", "@me"])?).await?;
        debug!(bot_user_id = %me.id, "resolved bot identity");
        client.bot_user_id = UserId(me.id);
        Ok(client)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, PlatformError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| PlatformError::Request("api base url cannot be a base".to_owned()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, PlatformError> {
        Ok(self.client.request(method, self.endpoint(segments)?))
    }

    async fn send_json<T>(&self, request: RequestBuilder) -> Result<T, PlatformError>
    where
        T: DeserializeOwned,
    {
        let response = checked(request).await?;
        response.json::<T>().await.map_err(|error| PlatformError::Decode(error.to_string()))
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), PlatformError> {
        checked(request).await.map(|_| ())
    }

    async fn interaction_callback<T>(
        &self,
        interaction: &InteractionRef,
        body: &T,
    ) -> Result<(), PlatformError>
    where
        T: Serialize + ?Sized,
    {
        let segments: [&str; 4] = ["interactions", &interaction.id, &interaction.token, "callback"];
        let request = self.request(Method::POST, &segments)?.json(body);
        self.send_empty(request).await
    }
}

async fn checked(request: RequestBuilder) -> Result<reqwest::Response, PlatformError> {
    let response = request.send().await.map_err(request_error)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PlatformError::Status { status: status.as_u16(), body })
}

fn request_error(error: reqwest::Error) -> PlatformError {
    PlatformError::Request(error.to_string())
}

/// Audit-log reasons travel in a header, so non-ASCII text is percent-encoded.
fn audit_reason_header(reason: &str) -> String {
    let mut encoded = String::with_capacity(reason.len());
    for byte in reason.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}

fn thread_body(request: &ThreadRequest) -> serde_json::Value {
    json!({
        "name": request.name,
        "type": PRIVATE_THREAD,
        "invitable": false,
        "auto_archive_duration": THREAD_ARCHIVE_MINUTES,
    })
}

#[async_trait]
impl ChatPlatform for DiscordRestClient {
    fn bot_user_id(&self) -> &UserId {
        &self.bot_user_id
    }

    async fn fetch_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<ChatMessage, PlatformError> {
        let request =
            self.request(Method::GET, &["channels", &channel_id.0, "messages", &message_id.0])?;
        let message: WireMessage = self.send_json(request).await?;
        Ok(message.into())
    }

    async fn send_message(
        &self,
        channel_id: &ChannelId,
        message: &MessageTemplate,
    ) -> Result<MessageId, PlatformError> {
        let request =
            self.request(Method::POST, &["channels", &channel_id.0, "messages"])?.json(message);
        let created: WireCreatedId = self.send_json(request).await?;
        Ok(MessageId(created.id))
    }

    async fn react(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        let request = self.request(
            Method::PUT,
            &["channels", &channel_id.0, "messages", &message_id.0, "reactions", emoji, "@me"],
        )?;
        self.send_empty(request).await
    }

    async fn start_private_thread(
        &self,
        request: &ThreadRequest,
    ) -> Result<ChannelId, PlatformError> {
        // Private threads cannot hang off a message; the anchor only orders the audit trail.
        debug!(anchor_message_id = %request.anchor_message_id, "opening private thread");
        let http = self
            .request(Method::POST, &["channels", &request.channel_id.0, "threads"])?
            .header("X-Audit-Log-Reason", audit_reason_header(&request.reason))
            .json(&thread_body(request));
        let created: WireCreatedId = self.send_json(http).await?;
        Ok(ChannelId(created.id))
    }

    async fn add_thread_member(
        &self,
        thread_id: &ChannelId,
        user_id: &UserId,
    ) -> Result<(), PlatformError> {
        let request =
            self.request(Method::PUT, &["channels", &thread_id.0, "thread-members", &user_id.0])?;
        self.send_empty(request).await
    }

    async fn list_guild_members(
        &self,
        guild_id: &GuildId,
    ) -> Result<Vec<ChatUser>, PlatformError> {
        let mut members = Vec::new();
        let mut after = String::from("0");
        loop {
            let request = self
                .request(Method::GET, &["guilds", &guild_id.0, "members"])?
                .query(&[("limit", MEMBER_PAGE_LIMIT.to_string()), ("after", after.clone())]);
            let page: Vec<WireMember> = self.send_json(request).await?;
            let page_len = page.len();

            members.extend(page.into_iter().filter_map(WireMember::into_chat_user));
            if page_len < MEMBER_PAGE_LIMIT {
                return Ok(members);
            }
            match members.last() {
                Some(last) => after = last.id.0.clone(),
                None => return Ok(members),
            }
        }
    }

    async fn api_latency(&self) -> Result<Duration, PlatformError> {
        let started = Instant::now();
        self.send_empty(self.request(Method::GET, &["gateway"])?).await?;
        Ok(started.elapsed())
    }

    async fn reply(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
    ) -> Result<(), PlatformError> {
        self.interaction_callback(interaction, &json!({ "type": CHANNEL_MESSAGE, "data": message }))
            .await
    }

    async fn defer_reply(&self, interaction: &InteractionRef) -> Result<(), PlatformError> {
        self.interaction_callback(interaction, &json!({ "type": DEFERRED_CHANNEL_MESSAGE })).await
    }

    async fn edit_reply(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
    ) -> Result<(), PlatformError> {
        let request = self
            .request(
                Method::PATCH,
                &["webhooks", &self.application_id, &interaction.token, "messages", "@original"],
            )?
            .json(message);
        self.send_empty(request).await
    }

    async fn follow_up(
        &self,
        interaction: &InteractionRef,
        message: &MessageTemplate,
    ) -> Result<(), PlatformError> {
        let request = self
            .request(Method::POST, &["webhooks", &self.application_id, &interaction.token])?
            .json(message);
        self.send_empty(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::{post, put},
        Json, Router,
    };
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use yobidashi_core::config::{DiscordConfig, DEFAULT_DISCORD_API_BASE_URL};
    use yobidashi_core::domain::message::{ChannelId, MessageId, UserId};
    use yobidashi_discord::embeds::MessageTemplate;
    use yobidashi_discord::platform::{ChatPlatform, PlatformError, ThreadRequest};

    use super::{audit_reason_header, DiscordRestClient};

    fn config(api_base_url: &str) -> DiscordConfig {
        DiscordConfig {
            bot_token: "test-token".to_owned().into(),
            application_id: "42".to_owned(),
            api_base_url: api_base_url.to_owned(),
            request_timeout_secs: 5,
        }
    }

    #[test]
    fn endpoints_escape_emoji_segments() {
        let client =
            DiscordRestClient::new(&config(DEFAULT_DISCORD_API_BASE_URL), UserId("1".into()))
                .expect("client");

        let url = client
            .endpoint(&["channels", "5", "messages", "6", "reactions", "🫡", "@me"])
            .expect("url");

        assert_eq!(
            url.as_str(),
            "https://discord.com/api/v10/channels/5/messages/6/reactions/%F0%9F%AB%A1/@me"
        );
    }

    #[test]
    fn audit_reason_is_percent_encoded() {
        assert_eq!(audit_reason_header("a b"), "a%20b");
        assert_eq!(audit_reason_header("対応"), "%E5%AF%BE%E5%BF%9C");
    }

    #[derive(Default)]
    struct Recorded {
        bodies: Vec<Value>,
        audit_reasons: Vec<String>,
        authorizations: Vec<String>,
    }

    type Shared = Arc<Mutex<Recorded>>;

    async fn create_message(
        State(recorded): State<Shared>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let mut recorded = recorded.lock().await;
        recorded.bodies.push(body);
        if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
            recorded.authorizations.push(auth.to_owned());
        }
        Json(json!({ "id": "9001", "channel_id": "5" }))
    }

    async fn create_thread(
        State(recorded): State<Shared>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let mut recorded = recorded.lock().await;
        recorded.bodies.push(body);
        if let Some(reason) = headers.get("x-audit-log-reason").and_then(|v| v.to_str().ok()) {
            recorded.audit_reasons.push(reason.to_owned());
        }
        Json(json!({ "id": "7777" }))
    }

    async fn forbidden() -> (StatusCode, &'static str) {
        (StatusCode::FORBIDDEN, "Missing Access")
    }

    async fn serve(recorded: Shared) -> String {
        let app = Router::new()
            .route("/api/channels/{channel}/messages", post(create_message))
            .route("/api/channels/{channel}/threads", post(create_thread))
            .route("/api/channels/{channel}/thread-members/{user}", put(forbidden))
            .with_state(recorded);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{address}/api")
    }

    #[tokio::test]
    async fn sends_messages_and_threads_with_bot_authorization() {
        let recorded = Shared::default();
        let base = serve(recorded.clone()).await;
        let client = DiscordRestClient::new(&config(&base), UserId("1".into())).expect("client");

        let id = client
            .send_message(&ChannelId("5".into()), &MessageTemplate::text("hello"))
            .await
            .expect("send");
        let thread = client
            .start_private_thread(&ThreadRequest {
                channel_id: ChannelId("5".into()),
                anchor_message_id: MessageId("9001".into()),
                name: "緊急対応 - tanaka".to_owned(),
                reason: "緊急".to_owned(),
            })
            .await
            .expect("thread");

        assert_eq!(id, MessageId("9001".into()));
        assert_eq!(thread, ChannelId("7777".into()));
        let recorded = recorded.lock().await;
        assert_eq!(recorded.bodies[0], json!({ "content": "hello" }));
        assert_eq!(
            recorded.bodies[1],
            json!({
                "name": "緊急対応 - tanaka",
                "type": 12,
                "invitable": false,
                "auto_archive_duration": 1440
            })
        );
        assert_eq!(recorded.audit_reasons, vec!["%E7%B7%8A%E6%80%A5"]);
        assert_eq!(recorded.authorizations, vec!["Bot test-token"]);
    }

    #[tokio::test]
    async fn non_success_status_is_reported_with_body() {
        let base = serve(Shared::default()).await;
        let client = DiscordRestClient::new(&config(&base), UserId("1".into())).expect("client");

        let result =
            client.add_thread_member(&ChannelId("7777".into()), &UserId("10".into())).await;

        assert_eq!(
            result,
            Err(PlatformError::Status { status: 403, body: "Missing Access".to_owned() })
        );
    }
}
