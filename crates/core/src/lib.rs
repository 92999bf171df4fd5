pub mod claims;
pub mod config;
pub mod detect;
pub mod domain;
pub mod errors;
pub mod extract;
pub mod stats;

pub use claims::{ClaimAttempt, ClaimKey, ClaimRegistry, EmergencyClaim};
pub use detect::{is_emergency_message, EMERGENCY_MARKER};
pub use domain::emergency::{
    CallStatus, ContactType, EmergencyCallRecord, EmergencyMessageInfo, NewEmergencyCall,
};
pub use domain::message::{
    ChannelId, ChatMessage, ChatUser, EmbedField, GuildId, MessageEmbed, MessageId,
    ReactionSummary, UserId,
};
pub use errors::{DomainError, GENERIC_COMMAND_FAILURE};
pub use extract::{classify_contact_type, extract_caller_user_id, parse_emergency_message};
pub use stats::{DailyStatsSnapshot, ResponderStat, StatsTracker};
