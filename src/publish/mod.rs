//! Forwarding chat events out of the bot.
//!
//! [`Publisher`] is the boundary to whatever consumes the events. The
//! bundled [`JsonlPublisher`] appends each event as one JSON line to daily
//! per-channel files named `<channel>_<date>.jsonl`.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, warn};

use crate::app::{DispatchError, Handler, Session};
use crate::config::PublishConfig;
use crate::domain::{Ban, ChatMessage, Subscription};

pub trait Publisher: Send {
    fn send_chat_message(&mut self, chat: &ChatMessage) -> Result<()>;
    fn send_ban(&mut self, ban: &Ban) -> Result<()>;
    fn send_subscription(&mut self, subscription: &Subscription) -> Result<()>;
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record<'a> {
    ChatMessage(&'a ChatMessage),
    Ban(&'a Ban),
    Subscription(&'a Subscription),
}

/// File handles are cached for the lifetime of the publisher.
pub struct JsonlPublisher {
    enabled: bool,
    dir: PathBuf,
    file_handles: HashMap<String, File>,
}

impl JsonlPublisher {
    pub fn new(config: &PublishConfig) -> Self {
        Self {
            enabled: config.enabled,
            dir: config.resolved_dir(),
            file_handles: HashMap::new(),
        }
    }

    fn write(&mut self, channel: &str, record: Record<'_>) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let safe_channel: String = channel
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let date = chrono::Local::now().format("%Y-%m-%d");
        let filename = format!("{}_{}.jsonl", safe_channel, date);

        let handle = match self.file_handles.entry(filename) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                fs::create_dir_all(&self.dir).with_context(|| {
                    format!("Failed to create event directory {}", self.dir.display())
                })?;
                let path = self.dir.join(entry.key());
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .with_context(|| format!("Failed to open {}", path.display()))?;
                debug!(path = %path.display(), "opened event file");
                entry.insert(file)
            }
        };

        let mut line = serde_json::to_vec(&record).context("Failed to encode event")?;
        line.push(b'\n');
        handle.write_all(&line).context("Failed to write event")?;
        Ok(())
    }
}

impl Publisher for JsonlPublisher {
    fn send_chat_message(&mut self, chat: &ChatMessage) -> Result<()> {
        self.write(&chat.channel_name, Record::ChatMessage(chat))
    }

    fn send_ban(&mut self, ban: &Ban) -> Result<()> {
        self.write(&ban.channel_name, Record::Ban(ban))
    }

    fn send_subscription(&mut self, subscription: &Subscription) -> Result<()> {
        self.write(&subscription.channel_name, Record::Subscription(subscription))
    }
}

/// Session handler that forwards every derived event to a [`Publisher`].
pub struct Relay<P> {
    publisher: P,
}

impl<P: Publisher> Relay<P> {
    pub fn new(publisher: P) -> Self {
        Self { publisher }
    }
}

impl<P: Publisher> Handler for Relay<P> {
    fn on_chat_message(&mut self, _session: &Session, chat: ChatMessage) {
        if let Err(e) = self.publisher.send_chat_message(&chat) {
            warn!(error = %e, channel = %chat.channel_name, "failed to publish chat message");
        }
    }

    fn on_ban(&mut self, _session: &Session, ban: Ban) {
        debug!(channel = %ban.channel_name, user = %ban.user_name, permanent = ban.permanent, "ban");
        if let Err(e) = self.publisher.send_ban(&ban) {
            warn!(error = %e, channel = %ban.channel_name, "failed to publish ban");
        }
    }

    fn on_subscription(&mut self, _session: &Session, subscription: Subscription) {
        if let Err(e) = self.publisher.send_subscription(&subscription) {
            warn!(error = %e, channel = %subscription.channel_name, "failed to publish subscription");
        }
    }

    fn on_error(&mut self, _session: &Session, error: DispatchError) {
        warn!(error = %error, "dispatch failed");
    }
}
