//! Domain error types surfaced to callers.
//!
//! `EventError` is the tagged result of a coordination mutation. It is
//! hand-rolled (no `thiserror`) in the style of the teacher's
//! `utils/error.rs`. Persistence and external-service failures stay
//! `BotError` (anyhow) and are logged at the adapter, never surfaced here.

use std::fmt;

use crate::database::models::StaffRole;

/// An error produced by a coordination mutation.
///
/// Every variant represents a condition the caller can react to by pattern
/// matching; no state change accompanies an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Malformed input (bad date, same captain twice, negative score).
    InvalidInput(String),
    /// An event with the given id already exists.
    DuplicateId(String),
    /// The requested staffing slot is already held.
    AlreadyClaimed { role: StaffRole, holder: String },
    /// The match has already started, so the operation is rejected.
    MatchAlreadyStarted(String),
    /// The event has already been completed.
    AlreadyCompleted(String),
    /// No event exists with the given id.
    EventNotFound(String),
    /// The caller lacks the role required for the requested slot.
    Unauthorized(StaffRole),
}

impl EventError {
    /// Whether this error represents a conflicting state transition: a
    /// duplicate id, an already-claimed slot, a match already started, or an
    /// event already completed (spec §7 `ConflictError`).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EventError::DuplicateId(_)
                | EventError::AlreadyClaimed { .. }
                | EventError::MatchAlreadyStarted(_)
                | EventError::AlreadyCompleted(_)
        )
    }
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            EventError::DuplicateId(id) => write!(f, "An event with id {} already exists.", id),
            EventError::AlreadyClaimed { role, holder } => {
                write!(f, "The {} slot is already claimed by {}.", role, holder)
            }
            EventError::MatchAlreadyStarted(id) => {
                write!(f, "Match {} has already started.", id)
            }
            EventError::AlreadyCompleted(id) => {
                write!(f, "Event {} has already been completed.", id)
            }
            EventError::EventNotFound(id) => write!(f, "No event found with id {}.", id),
            EventError::Unauthorized(role) => {
                write!(f, "You are not authorized for the {} role.", role)
            }
        }
    }
}

impl std::error::Error for EventError {}
