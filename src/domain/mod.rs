//! Chat events derived from decoded messages.
//!
//! Each event is built from one [`Message`] by a fallible constructor; a
//! missing or malformed tag fails that event only and never touches the
//! connection.

pub mod ban;
pub mod chat;
pub mod subscription;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serializer;
use thiserror::Error;

use crate::irc::Message;

pub use ban::Ban;
pub use chat::{Badge, ChatMessage};
pub use subscription::{SubPlan, Subscription};

/// Tag keys the service attaches to chat events.
pub mod tags {
    pub const ID: &str = "id";
    pub const DISPLAY_NAME: &str = "display-name";
    pub const LOGIN: &str = "login";
    pub const MOD: &str = "mod";
    pub const BADGES: &str = "badges";
    pub const USER_ID: &str = "user-id";
    pub const ROOM_ID: &str = "room-id";
    pub const TIMESTAMP: &str = "tmi-sent-ts";
    pub const BAN_DURATION: &str = "ban-duration";
    pub const TARGET_USER_ID: &str = "target-user-id";
    pub const TARGET_MESSAGE_ID: &str = "target-msg-id";
    pub const MESSAGE_ID: &str = "msg-id";
    pub const MONTHS_SUBSCRIBED: &str = "msg-param-cumulative-months";
    pub const SUBSCRIPTION_PLAN: &str = "msg-param-sub-plan";
    pub const SUBSCRIPTION_PLAN_NAME: &str = "msg-param-sub-plan-name";
    pub const EMOTE_ONLY: &str = "emote-only";
    pub const FOLLOWERS_ONLY: &str = "followers-only";
    pub const R9K: &str = "r9k";
    pub const SLOW: &str = "slow";
    pub const SUBS_ONLY: &str = "subs-only";
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("missing parameter {0}")]
    MissingParam(&'static str),
    #[error("missing tag {0}")]
    MissingTag(&'static str),
    #[error("tag {tag} has invalid value {value:?}")]
    InvalidTag { tag: &'static str, value: String },
    #[error("badge provided was invalid: {0:?}")]
    InvalidBadge(String),
    #[error("{0} is not a subscription notice")]
    NotSubscription(String),
}

pub(crate) fn param<'a>(
    message: &'a Message,
    index: usize,
    name: &'static str,
) -> Result<&'a str, DomainError> {
    message
        .params
        .get(index)
        .map(String::as_str)
        .ok_or(DomainError::MissingParam(name))
}

pub(crate) fn required_tag<'a>(message: &'a Message, key: &'static str) -> Result<&'a str, DomainError> {
    message.tag(key).ok_or(DomainError::MissingTag(key))
}

pub(crate) fn parse_tag<T: FromStr>(message: &Message, key: &'static str) -> Result<T, DomainError> {
    let value = required_tag(message, key)?;
    parse_value(key, value)
}

pub(crate) fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, DomainError> {
    value.parse().map_err(|_| DomainError::InvalidTag {
        tag: key,
        value: value.to_string(),
    })
}

/// `tmi-sent-ts` as a UTC instant. The tag holds milliseconds since the epoch.
pub(crate) fn sent_at(message: &Message) -> Result<DateTime<Utc>, DomainError> {
    let millis: i64 = parse_tag(message, tags::TIMESTAMP)?;
    DateTime::from_timestamp_millis(millis).ok_or_else(|| DomainError::InvalidTag {
        tag: tags::TIMESTAMP,
        value: millis.to_string(),
    })
}

pub(crate) fn serialize_secs<S: Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match duration {
        Some(d) => serializer.serialize_some(&d.as_secs()),
        None => serializer.serialize_none(),
    }
}
