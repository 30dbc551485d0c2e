//! Outbound command encoders.
//!
//! Each [`Command`] renders to exactly one protocol line without its `\r\n`;
//! the client's write path appends the terminator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Protocol extensions the service lets a client request with `CAP REQ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Membership,
    Tags,
    Commands,
}

const CAPABILITY_NAMESPACE: &str = "twitch.tv/";

impl Capability {
    pub const ALL: [Capability; 3] = [Self::Membership, Self::Tags, Self::Commands];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Membership => "membership",
            Self::Tags => "tags",
            Self::Commands => "commands",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown capability: {0}")]
pub struct UnknownCapability(pub String);

/// Accepts both `tags` and `twitch.tv/tags`.
impl FromStr for Capability {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix(CAPABILITY_NAMESPACE).unwrap_or(s) {
            "membership" => Ok(Self::Membership),
            "tags" => Ok(Self::Tags),
            "commands" => Ok(Self::Commands),
            _ => Err(UnknownCapability(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// OAuth token without the `oauth:` prefix.
    Pass(String),
    Nick(String),
    Join(String),
    Part(String),
    Pong(String),
    CapReq(Capability),
    Privmsg { channel: String, text: String },
}

impl Command {
    pub fn pass(token: impl Into<String>) -> Self {
        Self::Pass(token.into())
    }

    pub fn nick(name: impl Into<String>) -> Self {
        Self::Nick(name.into())
    }

    pub fn join(channel: &str) -> Self {
        Self::Join(bare_channel(channel).to_string())
    }

    pub fn part(channel: &str) -> Self {
        Self::Part(bare_channel(channel).to_string())
    }

    pub fn pong(server: impl Into<String>) -> Self {
        Self::Pong(server.into())
    }

    pub fn privmsg(channel: &str, text: impl Into<String>) -> Self {
        Self::Privmsg {
            channel: bare_channel(channel).to_string(),
            text: text.into(),
        }
    }

    /// Wire bytes without the line terminator.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Whether the line carries a credential and must not be logged verbatim.
    pub fn is_secret(&self) -> bool {
        matches!(self, Self::Pass(_))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass(token) => write!(f, "PASS oauth:{}", token),
            Self::Nick(name) => write!(f, "NICK {}", name),
            Self::Join(channel) => write!(f, "JOIN #{}", channel),
            Self::Part(channel) => write!(f, "PART #{}", channel),
            Self::Pong(server) => write!(f, "PONG :{}", server),
            Self::CapReq(cap) => write!(f, "CAP REQ :{}{}", CAPABILITY_NAMESPACE, cap),
            Self::Privmsg { channel, text } => write!(f, "PRIVMSG #{} :{}", channel, text),
        }
    }
}

/// Channel name without its leading `#`, lowercased as the service expects.
pub fn normalize_channel(channel: &str) -> String {
    bare_channel(channel).to_lowercase()
}

fn bare_channel(channel: &str) -> &str {
    channel.strip_prefix('#').unwrap_or(channel)
}
