use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{param, parse_tag, parse_value, sent_at, serialize_secs, tags, DomainError};
use crate::irc::Message;

/// A timeout or permanent ban, from `CLEARCHAT #channel :user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ban {
    pub channel_name: String,
    pub user_name: String,
    pub room_id: u64,
    pub target_user_id: u64,
    pub time: DateTime<Utc>,
    /// Serialized as whole seconds. `None` for a permanent ban.
    #[serde(serialize_with = "serialize_secs", skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    pub permanent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_message_id: Option<Uuid>,
}

impl Ban {
    pub fn from_message(message: &Message) -> Result<Self, DomainError> {
        let channel = param(message, 0, "channel")?;
        let user = param(message, 1, "user")?;

        let target_message_id = message
            .tag(tags::TARGET_MESSAGE_ID)
            .map(|id| parse_value(tags::TARGET_MESSAGE_ID, id))
            .transpose()?;
        let duration = message
            .tag(tags::BAN_DURATION)
            .map(|secs| parse_value::<u64>(tags::BAN_DURATION, secs).map(Duration::from_secs))
            .transpose()?;

        Ok(Self {
            channel_name: channel.trim_start_matches('#').to_string(),
            user_name: user.to_string(),
            room_id: parse_tag(message, tags::ROOM_ID)?,
            target_user_id: parse_tag(message, tags::TARGET_USER_ID)?,
            time: sent_at(message)?,
            permanent: duration.is_none(),
            duration,
            target_message_id,
        })
    }
}
