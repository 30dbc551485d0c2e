//! Decoded protocol messages.
//!
//! A [`Message`] is the structured form of one wire line:
//!
//! ```text
//! [@tag1=val1;tag2=val2 ][:prefix ]COMMAND [middle ...][:trailing]\r\n
//! ```

use std::collections::HashMap;
use std::fmt;

/// One decoded line. `command` is never empty for a message produced by the
/// scanner; `tags` and `params` are empty rather than absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub tags: HashMap<String, String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl Message {
    pub fn has_tags(&self) -> bool {
        !self.tags.is_empty()
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Tag value, or `default` when the tag was absent.
    pub fn tag_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.tag(key).unwrap_or(default)
    }

    /// First parameter with its leading `#` removed.
    pub fn channel(&self) -> Option<&str> {
        self.params
            .first()
            .map(|p| p.strip_prefix('#').unwrap_or(p))
    }

    /// Nick portion of a `nick!user@host` prefix.
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split(['!', '@']).next().unwrap_or(prefix))
    }

    pub fn kind(&self) -> MessageKind {
        MessageKind::from(self.command.as_str())
    }
}

/// Wire form without tags. The last parameter is written as trailing
/// whenever it could not be read back as a middle parameter.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        f.write_str(&self.command)?;

        if let Some((last, middle)) = self.params.split_last() {
            for param in middle {
                write!(f, " {}", param)?;
            }
            if last.is_empty() || last.contains(' ') || last.contains(':') {
                write!(f, " :{}", last)?;
            } else {
                write!(f, " {}", last)?;
            }
        }
        Ok(())
    }
}

/// Inbound commands the session acts on. Anything else lands in
/// [`MessageKind::Unknown`] and is still handed to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Ping,
    PrivMsg,
    Join,
    Part,
    Cap,
    RoomState,
    UserState,
    UserNotice,
    ClearChat,
    ClearMsg,
    Notice,
    HostTarget,
    Reconnect,
    /// `376` RPL_ENDOFMOTD
    EndOfMotd,
    /// `464` ERR_PASSWDMISMATCH
    PasswordMismatch,
    /// Registration and NAMES numerics with no effect on state.
    Welcome(String),
    Unknown(String),
}

impl From<&str> for MessageKind {
    fn from(command: &str) -> Self {
        match command {
            "PING" => Self::Ping,
            "PRIVMSG" => Self::PrivMsg,
            "JOIN" => Self::Join,
            "PART" => Self::Part,
            "CAP" => Self::Cap,
            "ROOMSTATE" => Self::RoomState,
            "USERSTATE" => Self::UserState,
            "USERNOTICE" => Self::UserNotice,
            "CLEARCHAT" => Self::ClearChat,
            "CLEARMSG" => Self::ClearMsg,
            "NOTICE" => Self::Notice,
            "HOSTTARGET" => Self::HostTarget,
            "RECONNECT" => Self::Reconnect,
            "376" => Self::EndOfMotd,
            "464" => Self::PasswordMismatch,
            "001" | "002" | "003" | "004" | "372" | "375" | "353" | "366" => {
                Self::Welcome(command.to_string())
            }
            other => Self::Unknown(other.to_string()),
        }
    }
}
