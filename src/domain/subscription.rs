use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{param, parse_tag, required_tag, sent_at, tags, DomainError};
use crate::irc::Message;

/// Subscription tier from `msg-param-sub-plan`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubPlan {
    Prime,
    Tier1,
    Tier2,
    Tier3,
}

impl SubPlan {
    fn parse(raw: &str) -> Result<Self, DomainError> {
        match raw {
            "Prime" => Ok(Self::Prime),
            "1000" => Ok(Self::Tier1),
            "2000" => Ok(Self::Tier2),
            "3000" => Ok(Self::Tier3),
            _ => Err(DomainError::InvalidTag {
                tag: tags::SUBSCRIPTION_PLAN,
                value: raw.to_string(),
            }),
        }
    }
}

impl fmt::Display for SubPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Prime => "Prime",
            Self::Tier1 => "Tier 1",
            Self::Tier2 => "Tier 2",
            Self::Tier3 => "Tier 3",
        })
    }
}

/// A `sub` or `resub` USERNOTICE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub channel_name: String,
    pub user_name: String,
    pub user_id: u64,
    pub room_id: u64,
    pub resub: bool,
    pub cumulative_months: u32,
    pub plan: SubPlan,
    pub plan_name: String,
    /// Optional message the user shared with the resub.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub time: DateTime<Utc>,
}

impl Subscription {
    pub fn from_message(message: &Message) -> Result<Self, DomainError> {
        let resub = match required_tag(message, tags::MESSAGE_ID)? {
            "sub" => false,
            "resub" => true,
            other => return Err(DomainError::NotSubscription(other.to_string())),
        };
        let channel = param(message, 0, "channel")?;

        Ok(Self {
            channel_name: channel.trim_start_matches('#').to_string(),
            user_name: message
                .tag(tags::DISPLAY_NAME)
                .or_else(|| message.tag(tags::LOGIN))
                .unwrap_or_default()
                .to_string(),
            user_id: parse_tag(message, tags::USER_ID)?,
            room_id: parse_tag(message, tags::ROOM_ID)?,
            resub,
            cumulative_months: parse_tag(message, tags::MONTHS_SUBSCRIBED)?,
            plan: SubPlan::parse(required_tag(message, tags::SUBSCRIPTION_PLAN)?)?,
            plan_name: message
                .tag_or(tags::SUBSCRIPTION_PLAN_NAME, "")
                .to_string(),
            message: message.params.get(1).cloned(),
            time: sent_at(message)?,
        })
    }

    /// Whether `message` is a notice this type can be built from.
    pub fn is_subscription(message: &Message) -> bool {
        matches!(message.tag(tags::MESSAGE_ID), Some("sub" | "resub"))
    }
}
