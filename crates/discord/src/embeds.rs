use chrono::{Datelike, SecondsFormat, Utc};
use serde::Serialize;

use yobidashi_core::domain::message::{ChatUser, UserId};
use yobidashi_core::errors::GENERIC_COMMAND_FAILURE;
use yobidashi_core::stats::DailyStatsSnapshot;

/// Message flag that hides an interaction reply from everyone but the invoker.
pub const EPHEMERAL_FLAG: u64 = 1 << 6;

pub const THREAD_AUDIT_REASON: &str = "緊急呼び出し対応用プライベートスレッド";

/// Character budget for one member-listing page.
pub const MEMBER_PAGE_BUDGET: usize = 4000;

const STATS_COLOR: u32 = 0x00FF00;
const MEMBERS_COLOR: u32 = 0x0099FF;
const MEDALS: [&str; 3] = ["🥇", "🥈", "🥉"];
const OTHER_RANK: &str = "📋";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Mention allow-list. `parse` stays empty so only the listed users can be pinged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AllowedMentions {
    pub parse: Vec<String>,
    pub users: Vec<String>,
}

impl AllowedMentions {
    pub fn users(ids: &[UserId]) -> Self {
        let mut users: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            if !users.contains(&id.0) {
                users.push(id.0.clone());
            }
        }
        Self { parse: Vec::new(), users }
    }
}

/// Outbound message body in the shape the REST API accepts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_mentions: Option<AllowedMentions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u64>,
}

impl MessageTemplate {
    pub fn text(content: impl Into<String>) -> Self {
        MessageBuilder::new().content(content).build()
    }

    pub fn is_ephemeral(&self) -> bool {
        self.flags.is_some_and(|flags| flags & EPHEMERAL_FLAG != 0)
    }
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
    allowed_mentions: Option<AllowedMentions>,
    flags: Option<u64>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn embed<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut EmbedBuilder),
    {
        let mut builder = EmbedBuilder::default();
        build(&mut builder);
        self.embeds.push(builder.build());
        self
    }

    pub fn mention_only(mut self, users: &[UserId]) -> Self {
        self.allowed_mentions = Some(AllowedMentions::users(users));
        self
    }

    pub fn ephemeral(mut self) -> Self {
        self.flags = Some(self.flags.unwrap_or(0) | EPHEMERAL_FLAG);
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate {
            content: self.content,
            embeds: self.embeds,
            allowed_mentions: self.allowed_mentions,
            flags: self.flags,
        }
    }
}

#[derive(Default)]
pub struct EmbedBuilder {
    embed: Embed,
}

impl EmbedBuilder {
    pub fn title(&mut self, title: impl Into<String>) -> &mut Self {
        self.embed.title = Some(title.into());
        self
    }

    pub fn description(&mut self, description: impl Into<String>) -> &mut Self {
        self.embed.description = Some(description.into());
        self
    }

    pub fn color(&mut self, color: u32) -> &mut Self {
        self.embed.color = Some(color);
        self
    }

    pub fn footer(&mut self, text: impl Into<String>) -> &mut Self {
        self.embed.footer = Some(EmbedFooter { text: text.into() });
        self
    }

    pub fn timestamp(&mut self, timestamp: impl Into<String>) -> &mut Self {
        self.embed.timestamp = Some(timestamp.into());
        self
    }

    fn build(self) -> Embed {
        self.embed
    }
}

/// Users that a claim message may ping: the responder, then the caller if distinct.
pub fn claim_mentions(responder: &UserId, caller: Option<&UserId>) -> Vec<UserId> {
    let mut users = vec![responder.clone()];
    if let Some(caller) = caller.filter(|caller| *caller != responder) {
        users.push(caller.clone());
    }
    users
}

pub fn emergency_notification(responder: &UserId, caller: Option<&UserId>) -> MessageTemplate {
    let mut content = format!("🚨 **緊急呼び出し対応** 🚨\n{} が対応します！", responder.mention());
    if let Some(caller) = caller {
        content.push_str(&format!("\n\n{} 対応者が決まりました！", caller.mention()));
    }

    MessageBuilder::new()
        .content(content)
        .mention_only(&claim_mentions(responder, caller))
        .build()
}

pub fn responder_thread_name(responder_name: &str) -> String {
    format!("緊急対応 - {responder_name}")
}

pub fn thread_welcome(responder: &UserId, caller: Option<&UserId>) -> MessageTemplate {
    let mut content = format!("🔒 **対応者専用スレッド** 🔒\n対応者: {}", responder.mention());
    if let Some(caller) = caller {
        content.push_str(&format!("\n呼び出し者: {}", caller.mention()));
    }
    content.push_str("\n\nこちらで詳細な連絡を取り合ってください。");

    MessageBuilder::new()
        .content(content)
        .mention_only(&claim_mentions(responder, caller))
        .build()
}

pub fn generic_failure_message() -> MessageTemplate {
    MessageBuilder::new().content(GENERIC_COMMAND_FAILURE).ephemeral().build()
}

pub const PING_PLACEHOLDER: &str = "Pinging...";
pub const NO_MEMBERS_TEXT: &str = "メンバーが見つかりませんでした。";
pub const MEMBER_FETCH_FAILURE_TEXT: &str = "メンバー情報の取得中にエラーが発生しました。";

pub fn pong_message(response_ms: i64, api_ms: u128) -> MessageTemplate {
    MessageTemplate::text(format!(
        "🏓 **Pong!**\n⏱️ レスポンス時間: {response_ms}ms\n💓 API Ping: {api_ms}ms\n✅ Bot稼働中"
    ))
}

pub fn daily_stats_message(stats: &DailyStatsSnapshot) -> MessageTemplate {
    let description = if stats.is_empty() {
        "今日はまだ対応がありません。".to_owned()
    } else {
        let mut description = format!(
            "**総対応件数:** {}件\n**対応者数:** {}人\n\n",
            stats.total_responses, stats.total_responders
        );
        if !stats.responders.is_empty() {
            description.push_str("**対応者別統計:**\n");
            for (rank, responder) in stats.responders.iter().enumerate() {
                let medal = MEDALS.get(rank).copied().unwrap_or(OTHER_RANK);
                description
                    .push_str(&format!("{medal} **{}** - {}件\n", responder.name, responder.count));
            }
        }
        description
    };

    let date = stats.date;
    MessageBuilder::new()
        .embed(|embed| {
            embed
                .title("📊 今日の対応統計")
                .color(STATS_COLOR)
                .description(description)
                .footer(format!("集計日: {}/{}/{}", date.year(), date.month(), date.day()))
                .timestamp(now_timestamp());
        })
        .build()
}

pub fn member_entry(member: &ChatUser) -> String {
    format!("**{}**\n└ ID: `{}`", member.name(), member.id)
}

/// Joins entries with blank lines, starting a new page whenever the next entry
/// would push the current one past `budget` characters.
pub fn paginate(entries: &[String], budget: usize) -> Vec<String> {
    const SEPARATOR_LEN: usize = 2;

    let mut pages = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for entry in entries {
        let entry_len = entry.chars().count();
        if !current.is_empty() && current_len + SEPARATOR_LEN + entry_len > budget {
            pages.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
            current_len += SEPARATOR_LEN;
        }
        current.push_str(entry);
        current_len += entry_len;
    }
    if !current.is_empty() {
        pages.push(current);
    }
    pages
}

/// One embed per page; the first carries the member total.
pub fn member_pages(members: &[ChatUser]) -> Vec<MessageTemplate> {
    let entries: Vec<String> = members.iter().map(member_entry).collect();
    let pages = paginate(&entries, MEMBER_PAGE_BUDGET);
    let page_count = pages.len();

    pages
        .into_iter()
        .enumerate()
        .map(|(index, page)| {
            MessageBuilder::new()
                .embed(|embed| {
                    embed.description(page).color(MEMBERS_COLOR);
                    if index == 0 {
                        embed
                            .title("👥 サーバーメンバー一覧")
                            .footer(format!(
                                "総メンバー数: {}人 | ページ: 1/{page_count}",
                                members.len()
                            ))
                            .timestamp(now_timestamp());
                    } else {
                        embed
                            .title("👥 サーバーメンバー一覧（続き）")
                            .footer(format!("ページ: {}/{page_count}", index + 1));
                    }
                })
                .build()
        })
        .collect()
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
