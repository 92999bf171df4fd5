use thiserror::Error;

use crate::domain::emergency::CallStatus;

/// Notice shown to a member when a slash command fails for any reason.
pub const GENERIC_COMMAND_FAILURE: &str = "There was an error while executing this command!";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("emergency call {id} cannot be marked responded from {from:?}")]
    InvalidCallTransition { id: i64, from: CallStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}
