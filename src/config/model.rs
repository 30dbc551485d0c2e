//! Configuration data model.
//!
//! All structs derive `Serialize`/`Deserialize` for TOML persistence.
//! Every field has a default so the bot can start from an empty file and
//! read a channel anonymously.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::irc::commands::Capability;

use super::nickname::anonymous_nickname;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub irc: IrcConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Rejects settings the bot cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.irc.address.trim().is_empty() {
            anyhow::bail!("irc.address must not be empty");
        }
        if self.irc.login_timeout_secs == 0 {
            anyhow::bail!("irc.login_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// Strips an `oauth:` prefix from the token and fills in an anonymous
    /// nickname when no token is configured.
    pub fn normalize(&mut self) {
        if let Some(token) = self.bot.oauth.strip_prefix("oauth:") {
            self.bot.oauth = token.to_string();
        }
        if self.bot.is_anonymous() && !self.bot.name.starts_with("justinfan") {
            self.bot.name = anonymous_nickname();
        }
        self.bot.name = self.bot.name.to_lowercase();
    }
}

/// Chat service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrcConfig {
    /// `host:port` of the chat service.
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_true")]
    pub tls: bool,
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            tls: true,
            login_timeout_secs: default_login_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

impl IrcConfig {
    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    /// Host part of `address`, used as the TLS server name.
    pub fn host(&self) -> &str {
        match self.address.rsplit_once(':') {
            Some((host, port)) if port.parse::<u16>().is_ok() => host,
            _ => &self.address,
        }
    }
}

/// Startup connection retries. The same delay is used as the settle period
/// after dialing and as the pause between attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Identity and channels of the bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "anonymous_nickname")]
    pub name: String,
    /// OAuth token, with or without the `oauth:` prefix. Empty logs in
    /// anonymously.
    #[serde(default)]
    pub oauth: String,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<Capability>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: anonymous_nickname(),
            oauth: String::new(),
            channels: Vec::new(),
            capabilities: default_capabilities(),
        }
    }
}

impl BotConfig {
    pub fn is_anonymous(&self) -> bool {
        self.oauth.is_empty()
    }
}

/// Event publishing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_publish_dir")]
    pub dir: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_publish_dir(),
        }
    }
}

impl PublishConfig {
    /// `dir` with a leading `~` expanded to the home directory.
    pub fn resolved_dir(&self) -> PathBuf {
        match self.dir.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(&self.dir)),
            None => PathBuf::from(&self.dir),
        }
    }
}

/// Diagnostic log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence when set.
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

fn default_address() -> String {
    "irc.chat.twitch.tv:6697".to_string()
}
fn default_true() -> bool {
    true
}
fn default_login_timeout() -> u64 {
    10
}
fn default_attempts() -> u32 {
    3
}
fn default_delay_ms() -> u64 {
    10
}
fn default_capabilities() -> Vec<Capability> {
    Capability::ALL.to_vec()
}
fn default_publish_dir() -> String {
    "~/.local/share/chatrelay/events".to_string()
}
fn default_filter() -> String {
    "chatrelay=info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.irc.address, "irc.chat.twitch.tv:6697");
        assert!(config.irc.tls);
        assert_eq!(config.irc.retry.attempts, 3);
        assert_eq!(config.irc.retry.delay(), Duration::from_millis(10));
        assert_eq!(config.bot.capabilities, Capability::ALL.to_vec());
        assert!(config.bot.is_anonymous());
        assert!(config.bot.name.starts_with("justinfan"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_full_file() {
        let config: AppConfig = toml::from_str(
            r##"
            [irc]
            address = "localhost:6667"
            tls = false
            login_timeout_secs = 5

            [irc.retry]
            attempts = 5
            delay_ms = 250

            [bot]
            name = "RelayBot"
            oauth = "oauth:abc123"
            channels = ["#loeya", "dallas"]
            capabilities = ["tags", "commands"]

            [publish]
            enabled = true
            dir = "/tmp/events"

            [logging]
            filter = "debug"
            json = true
            "##,
        )
        .unwrap();

        assert_eq!(config.irc.host(), "localhost");
        assert_eq!(config.irc.login_timeout(), Duration::from_secs(5));
        assert_eq!(config.irc.retry.attempts, 5);
        assert_eq!(config.bot.channels, vec!["#loeya", "dallas"]);
        assert_eq!(
            config.bot.capabilities,
            vec![Capability::Tags, Capability::Commands]
        );
        assert_eq!(config.publish.resolved_dir(), PathBuf::from("/tmp/events"));
        assert!(config.logging.json);
    }

    #[test]
    fn normalize_strips_oauth_prefix_and_lowercases_name() {
        let mut config = AppConfig::default();
        config.bot.name = "RelayBot".into();
        config.bot.oauth = "oauth:abc123".into();
        config.normalize();
        assert_eq!(config.bot.oauth, "abc123");
        assert_eq!(config.bot.name, "relaybot");
    }

    #[test]
    fn normalize_replaces_name_when_anonymous() {
        let mut config = AppConfig::default();
        config.bot.name = "relaybot".into();
        config.normalize();
        assert!(config.bot.name.starts_with("justinfan"));
    }

    #[test]
    fn validate_rejects_unusable_settings() {
        let mut config = AppConfig::default();
        config.irc.address = " ".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.irc.login_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn host_without_port() {
        let irc = IrcConfig {
            address: "irc.chat.twitch.tv".into(),
            ..IrcConfig::default()
        };
        assert_eq!(irc.host(), "irc.chat.twitch.tv");
    }
}
