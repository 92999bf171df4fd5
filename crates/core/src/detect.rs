use crate::domain::message::ChatMessage;

/// Marker phrase that turns a message into an emergency call.
pub const EMERGENCY_MARKER: &str = "緊急呼び出し";

/// True when the marker appears in the first embed's title or description, or in
/// the plain-text body.
pub fn is_emergency_message(message: &ChatMessage) -> bool {
    let in_embed = message.primary_embed().is_some_and(|embed| {
        contains_marker(embed.title.as_deref()) || contains_marker(embed.description.as_deref())
    });

    in_embed || message.content.contains(EMERGENCY_MARKER)
}

fn contains_marker(text: Option<&str>) -> bool {
    text.is_some_and(|text| text.contains(EMERGENCY_MARKER))
}
