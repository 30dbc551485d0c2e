use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{param, parse_tag, sent_at, tags, DomainError};
use crate::irc::Message;

/// A chat line posted to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub channel_name: String,
    /// Display name of the sender.
    pub user_name: String,
    pub message: String,
    /// When the service received the message.
    pub time: DateTime<Utc>,
    pub user_id: u64,
    pub channel_id: u64,
    pub moderator: bool,
    pub badges: Vec<Badge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub name: String,
    pub version: String,
}

impl Badge {
    /// Parses `name/version`.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw.split_once('/') {
            Some((name, version)) => Ok(Self {
                name: name.to_string(),
                version: version.to_string(),
            }),
            None => Err(DomainError::InvalidBadge(raw.to_string())),
        }
    }

    /// Parses a comma separated badge list. Empty input is an empty list.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, DomainError> {
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        raw.split(',').map(Self::parse).collect()
    }
}

impl ChatMessage {
    pub fn from_message(message: &Message) -> Result<Self, DomainError> {
        let channel = param(message, 0, "channel")?;
        let text = param(message, 1, "message")?;
        Ok(Self {
            id: parse_tag(message, tags::ID)?,
            channel_name: channel.trim_start_matches('#').to_string(),
            user_name: message
                .tag(tags::DISPLAY_NAME)
                .or_else(|| message.nick())
                .unwrap_or_default()
                .to_string(),
            message: text.to_string(),
            time: sent_at(message)?,
            user_id: parse_tag(message, tags::USER_ID)?,
            channel_id: parse_tag(message, tags::ROOM_ID)?,
            moderator: message.tag(tags::MOD) == Some("1"),
            badges: Badge::parse_list(message.tag_or(tags::BADGES, ""))?,
        })
    }

    pub fn has_badge(&self, name: &str) -> bool {
        self.badges.iter().any(|b| b.name == name)
    }
}
