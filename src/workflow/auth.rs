//! Caller identity handed to step handlers

use super::error::HandlerError;

/// Portal account resolved for the chat sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidentUser {
    pub id: String,
    pub display_name: String,
}

impl ResidentUser {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Read-only description of who is talking and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Chat identity of the sender, e.g. `@alice:chat.example.org`
    pub sender_id: String,
    /// Conversation key; `None` for one-off requests without a room
    pub room_id: Option<String>,
    pub direct_message: bool,
    pub user: Option<ResidentUser>,
}

impl AuthContext {
    pub fn new(sender_id: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            room_id: Some(room_id.into()),
            direct_message: false,
            user: None,
        }
    }

    /// Context without a conversation key; nothing is remembered between turns
    pub fn anonymous(sender_id: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            room_id: None,
            direct_message: false,
            user: None,
        }
    }

    pub fn direct(mut self) -> Self {
        self.direct_message = true;
        self
    }

    pub fn with_user(mut self, user: ResidentUser) -> Self {
        self.user = Some(user);
        self
    }

    pub fn has_user(&self) -> bool {
        self.user.is_some()
    }

    /// Replies in public rooms are visible to everyone
    pub fn is_public_response(&self) -> bool {
        !self.direct_message
    }

    /// The resolved user, or an `Unauthorized` error for actions that need one
    pub fn authenticated_user(&self) -> Result<&ResidentUser, HandlerError> {
        self.user
            .as_ref()
            .ok_or_else(|| HandlerError::unauthorized("Action requires portal authentication"))
    }
}
