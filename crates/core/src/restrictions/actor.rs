//! Caller description used by every restriction decision.

use serde::{Deserialize, Serialize};

/// Role of an account within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Created the room.
    Creator,
    /// Moderates the room.
    Moderator,
    /// Regular participant.
    Participant,
    /// Room exists but the account never visited it.
    NotVisited,
    /// No room was given or the room does not exist.
    NoValidRoom,
    /// The resolver returned something unrecognised.
    Unknown,
}

impl Role {
    /// Map the raw value returned by the role resolver.
    #[must_use]
    pub fn from_db(value: Option<&str>) -> Self {
        match value {
            None => Self::NoValidRoom,
            Some("CREATOR") => Self::Creator,
            Some("MODERATOR" | "EXECUTIVE_MODERATOR" | "EDITING_MODERATOR") => Self::Moderator,
            Some("PARTICIPANT") => Self::Participant,
            Some("NULL") => Self::NotVisited,
            Some(_) => Self::Unknown,
        }
    }

    /// Whether this role may manage the room's restrictions.
    #[must_use]
    pub const fn can_moderate(&self) -> bool {
        matches!(self, Self::Creator | Self::Moderator)
    }
}

/// Registration status of the caller's account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Registration {
    Registered,
    Unregistered,
}

/// The caller of a single decision, as supplied by the identity resolver.
///
/// `role` is the caller's role in `room_id`; without a room it carries no
/// room authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub account_id: String,
    pub role: Role,
    pub registration: Registration,
    #[serde(default)]
    pub room_id: Option<String>,
}

impl ActorContext {
    #[must_use]
    pub fn new(account_id: impl Into<String>, role: Role, registration: Registration) -> Self {
        Self {
            account_id: account_id.into(),
            role,
            registration,
            room_id: None,
        }
    }

    /// Attach the room the role was resolved for.
    #[must_use]
    pub fn in_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    /// Whether the caller may manage restrictions of `room_id`.
    #[must_use]
    pub fn moderates(&self, room_id: &str) -> bool {
        self.role.can_moderate() && self.room_id.as_deref() == Some(room_id)
    }
}
