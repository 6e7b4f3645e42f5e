//! Data models for TVDeck

use serde::{Deserialize, Serialize};

/// Highest rating a channel can carry
pub const MAX_RATING: u8 = 5;

/// UI Tab selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Watch,
    Guide,
    Admin,
    Assistant,
    Console,
}

/// One watchable stream and its metadata (persisted to JSON)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub video_url: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub current_program: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

impl Channel {
    pub fn favorite(&self) -> bool {
        self.is_favorite.unwrap_or(false)
    }

    /// Set the rating, clamped to 0..=5
    pub fn set_rating(&mut self, rating: u8) {
        self.rating = Some(rating.min(MAX_RATING));
    }
}

/// Voice assistant connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (_, Error) => true,
            (Disconnected, Connecting) | (Error, Connecting) => true,
            (Connecting, Connected) => true,
            (Connected, Disconnected) => true,
            // user stop while the session is still opening
            (Connecting, Disconnected) | (Error, Disconnected) => true,
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting...",
            ConnectionState::Connected => "Listening",
            ConnectionState::Error => "Error",
        }
    }
}

/// Who said a transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

/// One line of the assistant conversation
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}
