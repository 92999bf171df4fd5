//! Discord boundary for the emergency-call bot
//!
//! - **Gateway** (`gateway`, `wire`) - envelope pump with reconnect backoff and
//!   the JSON payload decoder
//! - **Events** (`events`) - dispatcher plus the message, reaction and command handlers
//! - **Response** (`response`) - first-responder claim pipeline
//! - **Commands** (`commands`) - `/ping`, `/stats`, `/users`
//! - **Embeds** (`embeds`) - outbound message builders and texts
//! - **Archive** (`archive`) - spreadsheet relay for one watched channel
//!
//! # Architecture
//!
//! ```text
//! Gateway → EventDispatcher → Handlers → ResponseCoordinator → ChatPlatform
//!                                             ↓
//!                                  EmergencyCallRepository, StatsTracker
//! ```
//!
//! All outbound calls go through the `ChatPlatform` port, so every handler can be
//! exercised against an in-memory platform.

pub mod archive;
pub mod commands;
pub mod embeds;
pub mod events;
pub mod gateway;
pub mod platform;
pub mod response;
pub mod wire;

#[cfg(test)]
mod testing;
