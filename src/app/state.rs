//! Per-connection chat state: negotiated capabilities, joined channels and
//! the bot's own standing in each channel.
//!
//! Every read returns a copy. Updates for a channel the bot has not joined
//! fail with [`SessionError::NotInChannel`] and leave the state untouched.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::domain::tags;
use crate::irc::commands::{normalize_channel, Capability};
use crate::irc::{ClientError, Message};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not in channel {0}")]
    NotInChannel(String),
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Room settings from ROOMSTATE. Zero durations mean the mode is off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelState {
    pub emote_only: bool,
    pub subscriber_only: bool,
    pub r9k: bool,
    pub follower_only: Duration,
    pub slow: Duration,
}

impl ChannelState {
    /// Applies the room-state tags present on `message`. Updates carry only
    /// the settings that changed, so absent or unreadable tags keep their
    /// current value.
    pub fn merged_with(mut self, message: &Message) -> Self {
        if let Some(on) = flag(message, tags::EMOTE_ONLY) {
            self.emote_only = on;
        }
        if let Some(on) = flag(message, tags::SUBS_ONLY) {
            self.subscriber_only = on;
        }
        if let Some(on) = flag(message, tags::R9K) {
            self.r9k = on;
        }
        // Minutes, with -1 meaning followers-only is off. Saturates on
        // values too large to hold in seconds.
        if let Some(minutes) = message
            .tag(tags::FOLLOWERS_ONLY)
            .and_then(|v| v.parse::<i64>().ok())
        {
            let secs = (minutes.max(0) as u64).saturating_mul(60);
            self.follower_only = Duration::from_secs(secs);
        }
        if let Some(secs) = message.tag(tags::SLOW).and_then(|v| v.parse::<u64>().ok()) {
            self.slow = Duration::from_secs(secs);
        }
        self
    }
}

/// The bot's own standing in a channel, from USERSTATE.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserState {
    pub moderator: bool,
    pub subscriber: bool,
}

impl UserState {
    pub fn from_message(message: &Message) -> Self {
        let badges = message.tag_or(tags::BADGES, "");
        let has_badge = |name: &str| {
            badges
                .split(',')
                .any(|b| b.split('/').next() == Some(name))
        };
        Self {
            moderator: message.tag(tags::MOD) == Some("1")
                || has_badge("moderator")
                || has_badge("broadcaster"),
            subscriber: message.tag("subscriber") == Some("1")
                || has_badge("subscriber")
                || has_badge("founder"),
        }
    }
}

fn flag(message: &Message, key: &str) -> Option<bool> {
    match message.tag(key)? {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct SessionState {
    capabilities: Vec<Capability>,
    channels: BTreeMap<String, ChannelState>,
    users: HashMap<String, UserState>,
}

impl SessionState {
    /// Returns false if the capability was already present.
    pub fn add_capability(&mut self, capability: Capability) -> bool {
        if self.capabilities.contains(&capability) {
            return false;
        }
        self.capabilities.push(capability);
        true
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        self.capabilities.clone()
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Registers a joined channel with default settings. Re-adding keeps the
    /// existing entry.
    pub fn add_channel(&mut self, channel: &str) {
        self.channels.entry(normalize_channel(channel)).or_default();
    }

    /// Returns false if the channel was not joined.
    pub fn remove_channel(&mut self, channel: &str) -> bool {
        let name = normalize_channel(channel);
        self.users.remove(&name);
        self.channels.remove(&name).is_some()
    }

    pub fn in_channel(&self, channel: &str) -> bool {
        self.channels.contains_key(&normalize_channel(channel))
    }

    /// Joined channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    pub fn channel(&self, channel: &str) -> Result<ChannelState, SessionError> {
        let name = normalize_channel(channel);
        self.channels
            .get(&name)
            .copied()
            .ok_or(SessionError::NotInChannel(name))
    }

    pub fn update_channel(&mut self, channel: &str, state: ChannelState) -> Result<(), SessionError> {
        let name = normalize_channel(channel);
        match self.channels.get_mut(&name) {
            Some(current) => {
                *current = state;
                Ok(())
            }
            None => Err(SessionError::NotInChannel(name)),
        }
    }

    /// The bot's standing in a joined channel; defaults until the first
    /// USERSTATE arrives.
    pub fn user_state(&self, channel: &str) -> Result<UserState, SessionError> {
        let name = normalize_channel(channel);
        if !self.channels.contains_key(&name) {
            return Err(SessionError::NotInChannel(name));
        }
        Ok(self.users.get(&name).copied().unwrap_or_default())
    }

    pub fn update_user_state(&mut self, channel: &str, state: UserState) -> Result<(), SessionError> {
        let name = normalize_channel(channel);
        if !self.channels.contains_key(&name) {
            return Err(SessionError::NotInChannel(name));
        }
        self.users.insert(name, state);
        Ok(())
    }
}
