//! Caller metadata extraction.
//!
//! Each value is resolved by an ordered list of [`ExtractionStrategy`] values; the
//! first strategy that yields a usable value wins. Structured embed fields are
//! tried before the embed description, and the embed before the plain body.

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::emergency::{ContactType, EmergencyMessageInfo};
use crate::domain::message::{ChatMessage, UserId};

/// A family of label phrases that introduce one kind of value.
pub struct MarkerSet {
    pub name: &'static str,
    pub markers: &'static [&'static str],
    pattern: OnceLock<Option<Regex>>,
}

impl MarkerSet {
    const fn new(name: &'static str, markers: &'static [&'static str]) -> Self {
        Self { name, markers, pattern: OnceLock::new() }
    }

    /// Case-insensitive label match used for structured fields.
    pub fn matches_label(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.markers.iter().any(|marker| label.contains(&marker.to_lowercase()))
    }

    /// `<marker>… : value` on a single line of free text.
    pub fn capture_free_text(&self, text: &str) -> Option<String> {
        let pattern = self.pattern.get_or_init(|| self.build_pattern()).as_ref()?;
        let captures = pattern.captures(text)?;
        let value = captures.get(1)?.as_str().trim();
        (!value.is_empty()).then(|| value.to_owned())
    }

    fn build_pattern(&self) -> Option<Regex> {
        let alternatives =
            self.markers.iter().map(|marker| regex::escape(marker)).collect::<Vec<_>>().join("|");
        Regex::new(&format!(r"(?i)(?:{alternatives})[^:：\r\n]*[:：][ \t　]*([^\r\n]+)")).ok()
    }
}

pub static DIRECT_ID_MARKERS: MarkerSet = MarkerSet::new("direct_id", &["discord id"]);
pub static CALLER_MARKERS: MarkerSet = MarkerSet::new("caller", &["呼び出し者", "👤"]);
pub static LOCATION_MARKERS: MarkerSet =
    MarkerSet::new("location", &["現在地", "場所", "📍"]);
pub static CONTACT_TYPE_MARKERS: MarkerSet =
    MarkerSet::new("contact_type", &["要請", "タイプ", "🎯"]);

const EXPERIENCED_PHRASES: &[&str] = &["理解している人", "経験者"];
const STAFF_PHRASES: &[&str] = &["スタッフ", "職員"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    EmbedFields,
    EmbedDescription,
    Body,
}

/// One step of a fallback chain: look in `source` for a value labelled by `markers`.
#[derive(Clone, Copy)]
pub struct ExtractionStrategy {
    pub source: SourceKind,
    pub markers: &'static MarkerSet,
}

impl ExtractionStrategy {
    pub const fn new(source: SourceKind, markers: &'static MarkerSet) -> Self {
        Self { source, markers }
    }

    pub fn apply(&self, message: &ChatMessage) -> Option<String> {
        match self.source {
            SourceKind::EmbedFields => {
                // first matching label wins when an embed repeats a label
                let field = message
                    .primary_embed()?
                    .fields
                    .iter()
                    .find(|field| self.markers.matches_label(&field.name))?;
                let value = field.value.trim();
                (!value.is_empty()).then(|| value.to_owned())
            }
            SourceKind::EmbedDescription => {
                let description = message.primary_embed()?.description.as_deref()?;
                self.markers.capture_free_text(description)
            }
            SourceKind::Body => self.markers.capture_free_text(&message.content),
        }
    }
}

impl std::fmt::Debug for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionStrategy")
            .field("source", &self.source)
            .field("markers", &self.markers.name)
            .finish()
    }
}

/// Direct id before caller label, per source.
pub fn caller_id_strategies() -> [ExtractionStrategy; 6] {
    [
        ExtractionStrategy::new(SourceKind::EmbedFields, &DIRECT_ID_MARKERS),
        ExtractionStrategy::new(SourceKind::EmbedFields, &CALLER_MARKERS),
        ExtractionStrategy::new(SourceKind::EmbedDescription, &DIRECT_ID_MARKERS),
        ExtractionStrategy::new(SourceKind::EmbedDescription, &CALLER_MARKERS),
        ExtractionStrategy::new(SourceKind::Body, &DIRECT_ID_MARKERS),
        ExtractionStrategy::new(SourceKind::Body, &CALLER_MARKERS),
    ]
}

/// Structured field, then embed description, then plain body.
pub fn field_strategies(markers: &'static MarkerSet) -> [ExtractionStrategy; 3] {
    [
        ExtractionStrategy::new(SourceKind::EmbedFields, markers),
        ExtractionStrategy::new(SourceKind::EmbedDescription, markers),
        ExtractionStrategy::new(SourceKind::Body, markers),
    ]
}

pub fn first_success<T>(
    message: &ChatMessage,
    strategies: &[ExtractionStrategy],
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    strategies.iter().find_map(|strategy| strategy.apply(message).and_then(|value| parse(&value)))
}

pub fn extract_caller_user_id(message: &ChatMessage) -> Option<UserId> {
    first_success(message, &caller_id_strategies(), parse_user_id)
}

pub fn parse_emergency_message(message: &ChatMessage) -> EmergencyMessageInfo {
    let some = |value: &str| Some(value.to_owned());

    EmergencyMessageInfo {
        caller_name: first_success(message, &field_strategies(&CALLER_MARKERS), some),
        location: first_success(message, &field_strategies(&LOCATION_MARKERS), some),
        contact_type: first_success(message, &field_strategies(&CONTACT_TYPE_MARKERS), |value| {
            Some(classify_contact_type(value))
        })
        .unwrap_or_default(),
        caller_user_id: extract_caller_user_id(message),
    }
}

/// A bare numeric id, or the digits inside a `<@…>` / `<@!…>` mention.
pub fn parse_user_id(value: &str) -> Option<UserId> {
    let value = value.trim();
    if !value.is_empty() && value.chars().all(|ch| ch.is_ascii_digit()) {
        return Some(UserId(value.to_owned()));
    }

    let captures = mention_pattern()?.captures(value)?;
    captures.get(1).map(|digits| UserId(digits.as_str().to_owned()))
}

pub fn classify_contact_type(value: &str) -> ContactType {
    let value = value.to_lowercase();
    if EXPERIENCED_PHRASES.iter().any(|phrase| value.contains(phrase)) {
        ContactType::Experienced
    } else if STAFF_PHRASES.iter().any(|phrase| value.contains(phrase)) {
        ContactType::Staff
    } else {
        ContactType::Anyone
    }
}

fn mention_pattern() -> Option<&'static Regex> {
    static MENTION: OnceLock<Option<Regex>> = OnceLock::new();
    MENTION.get_or_init(|| Regex::new(r"<@!?([0-9]+)>").ok()).as_ref()
}

#[cfg(test)]
mod tests {
    use super::{
        classify_contact_type, extract_caller_user_id, field_strategies, parse_emergency_message,
        parse_user_id, ExtractionStrategy, SourceKind, CALLER_MARKERS, DIRECT_ID_MARKERS,
        LOCATION_MARKERS,
    };
    use crate::domain::emergency::ContactType;
    use crate::domain::message::{
        ChannelId, ChatMessage, ChatUser, EmbedField, MessageEmbed, MessageId, UserId,
    };

    const CALLER_ID: &str = "123456789012345678";

    fn message(content: &str, embed: Option<MessageEmbed>) -> ChatMessage {
        ChatMessage {
            id: MessageId("m-1".to_owned()),
            channel_id: ChannelId("c-1".to_owned()),
            guild_id: None,
            author: ChatUser {
                id: UserId("webhook".to_owned()),
                is_bot: true,
                username: "form".to_owned(),
                display_name: None,
            },
            content: content.to_owned(),
            embeds: embed.into_iter().collect(),
            reactions: Vec::new(),
        }
    }

    fn embed(description: Option<&str>, fields: &[(&str, &str)]) -> MessageEmbed {
        MessageEmbed {
            title: Some("🚨 緊急呼び出し".to_owned()),
            description: description.map(str::to_owned),
            fields: fields
                .iter()
                .map(|(name, value)| EmbedField {
                    name: (*name).to_owned(),
                    value: (*value).to_owned(),
                })
                .collect(),
        }
    }

    #[test]
    fn direct_id_field_yields_bare_digits() {
        let message = message("", Some(embed(None, &[("Discord ID", CALLER_ID)])));
        assert_eq!(extract_caller_user_id(&message), Some(UserId(CALLER_ID.to_owned())));
    }

    #[test]
    fn direct_id_field_label_is_case_insensitive() {
        let message = message("", Some(embed(None, &[("🆔 DISCORD ID", " 42 ")])));
        assert_eq!(extract_caller_user_id(&message), Some(UserId("42".to_owned())));
    }

    #[test]
    fn caller_free_text_mention_with_bang_yields_digits() {
        let message = message(&format!("緊急呼び出し\n呼び出し者: <@!{CALLER_ID}>"), None);
        assert_eq!(extract_caller_user_id(&message), Some(UserId(CALLER_ID.to_owned())));
    }

    #[test]
    fn unparseable_direct_id_falls_through_to_caller_field() {
        let message = message(
            "",
            Some(embed(None, &[("Discord ID", "不明"), ("👤 呼び出し者", "<@555>")])),
        );
        assert_eq!(extract_caller_user_id(&message), Some(UserId("555".to_owned())));
    }

    #[test]
    fn embed_description_is_searched_before_body() {
        let message = message(
            "Discord ID: 222",
            Some(embed(Some("discord id：111\n場所: 体育館"), &[])),
        );
        assert_eq!(extract_caller_user_id(&message), Some(UserId("111".to_owned())));
    }

    #[test]
    fn body_is_searched_when_embed_has_nothing() {
        let message = message("Discord ID: 333", Some(embed(Some("詳細なし"), &[])));
        assert_eq!(extract_caller_user_id(&message), Some(UserId("333".to_owned())));
    }

    #[test]
    fn absent_markers_yield_no_caller() {
        let message = message("緊急呼び出し 体育館です", None);
        assert_eq!(extract_caller_user_id(&message), None);
    }

    #[test]
    fn plain_names_are_not_user_ids() {
        assert_eq!(parse_user_id("山田太郎"), None);
        assert_eq!(parse_user_id(""), None);
        assert_eq!(parse_user_id("12a"), None);
        assert_eq!(parse_user_id("<@77> さん"), Some(UserId("77".to_owned())));
        assert_eq!(parse_user_id("１２３"), None);
        assert_eq!(parse_user_id("<@１２３>"), None);
        assert_eq!(parse_user_id("<@!１２３>"), None);
    }

    #[test]
    fn contact_type_buckets() {
        assert_eq!(classify_contact_type("経験者希望"), ContactType::Experienced);
        assert_eq!(classify_contact_type("理解している人"), ContactType::Experienced);
        assert_eq!(classify_contact_type("スタッフ"), ContactType::Staff);
        assert_eq!(classify_contact_type("職員の方"), ContactType::Staff);
        assert_eq!(classify_contact_type("誰でも"), ContactType::Anyone);
    }

    #[test]
    fn parses_structured_fields() {
        let message = message(
            "",
            Some(embed(
                None,
                &[
                    ("👤 呼び出し者", "山田"),
                    ("📍 現在地", "第二体育館"),
                    ("🎯 要請タイプ", "スタッフ"),
                ],
            )),
        );

        let info = parse_emergency_message(&message);
        assert_eq!(info.caller_name.as_deref(), Some("山田"));
        assert_eq!(info.location.as_deref(), Some("第二体育館"));
        assert_eq!(info.contact_type, ContactType::Staff);
        assert_eq!(info.caller_user_id, None);
    }

    #[test]
    fn parses_free_text_body() {
        let message = message(
            "【緊急呼び出し】\n呼び出し者：佐藤\n場所: 図書館 2F\n要請: 経験者にお願いしたいです",
            None,
        );

        let info = parse_emergency_message(&message);
        assert_eq!(info.caller_name.as_deref(), Some("佐藤"));
        assert_eq!(info.location.as_deref(), Some("図書館 2F"));
        assert_eq!(info.contact_type, ContactType::Experienced);
    }

    #[test]
    fn missing_contact_type_defaults_to_anyone() {
        let info = parse_emergency_message(&message("緊急呼び出し", None));
        assert_eq!(info, Default::default());
        assert_eq!(info.contact_type, ContactType::Anyone);
    }

    #[test]
    fn field_value_wins_over_free_text() {
        let message = message(
            "場所: 食堂",
            Some(embed(Some("場所: 中庭"), &[("現在地", "正門")])),
        );
        assert_eq!(parse_emergency_message(&message).location.as_deref(), Some("正門"));
    }

    #[test]
    fn strategies_can_be_tried_individually() {
        let message = message("場所: 食堂", Some(embed(Some("場所: 中庭"), &[])));
        let [fields, description, body] = field_strategies(&LOCATION_MARKERS);

        assert_eq!(fields.apply(&message), None);
        assert_eq!(description.apply(&message).as_deref(), Some("中庭"));
        assert_eq!(body.apply(&message).as_deref(), Some("食堂"));
    }

    #[test]
    fn free_text_requires_a_separator() {
        let strategy = ExtractionStrategy::new(SourceKind::Body, &CALLER_MARKERS);
        assert_eq!(strategy.apply(&message("呼び出し者 山田", None)), None);

        let strategy = ExtractionStrategy::new(SourceKind::Body, &DIRECT_ID_MARKERS);
        assert_eq!(
            strategy.apply(&message("Discord ID (必須)： 987", None)).as_deref(),
            Some("987")
        );
    }
}
