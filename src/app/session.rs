//! Login handshake, state tracking and message dispatch over one [`Client`].

use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::handler::{DispatchError, Handler};
use super::state::{ChannelState, SessionError, SessionState, UserState};
use crate::domain::{Ban, ChatMessage, Subscription};
use crate::irc::commands::normalize_channel;
use crate::irc::{Capability, Client, ClientError, Command, Event, Inbound, Message, MessageKind};

/// NOTICE texts the service uses to reject a login.
const AUTH_FAILURES: [&str; 2] = ["Login authentication failed", "Improperly formatted auth"];

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("login rejected: bad credentials")]
    BadCredentials,
    #[error("login timed out after {0:?}")]
    Timeout(Duration),
    #[error("login cancelled")]
    Cancelled,
    #[error("failed to send login: {0}")]
    Send(#[source] ClientError),
    #[error("connection closed during login")]
    Closed,
}

type LoginReply = oneshot::Sender<Result<(), LoginError>>;

/// Clears the outstanding login slot however the login ends.
struct PendingLogin<'a>(&'a Mutex<Option<LoginReply>>);

impl Drop for PendingLogin<'_> {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}

enum Derived {
    Chat(ChatMessage),
    Ban(Ban),
    Subscription(Subscription),
}

pub struct Session {
    client: Client,
    nick: String,
    state: RwLock<SessionState>,
    pending_login: Mutex<Option<LoginReply>>,
    login_lock: tokio::sync::Mutex<()>,
}

impl Session {
    pub fn new(client: Client, nick: impl Into<String>) -> Self {
        Self {
            client,
            nick: nick.into().to_lowercase(),
            state: RwLock::new(SessionState::default()),
            pending_login: Mutex::new(None),
            login_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Sends PASS (unless `oauth` is empty) and NICK, then waits for the
    /// end of the MOTD. Concurrent logins are serialized. Requires
    /// [`Session::run`] to be dispatching on another task.
    pub async fn login(
        &self,
        oauth: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), LoginError> {
        let _serial = self.login_lock.lock().await;

        let (reply_tx, reply_rx) = oneshot::channel();
        *self.pending_login.lock() = Some(reply_tx);
        let _pending = PendingLogin(&self.pending_login);

        let mut commands = Vec::with_capacity(2);
        if !oauth.is_empty() {
            commands.push(Command::pass(oauth));
        }
        commands.push(Command::nick(self.nick.as_str()));
        self.client.send(commands).await.map_err(LoginError::Send)?;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LoginError::Cancelled),
            _ = self.client.done() => Err(LoginError::Closed),
            reply = tokio::time::timeout(timeout, reply_rx) => match reply {
                Err(_) => Err(LoginError::Timeout(timeout)),
                Ok(Err(_)) => Err(LoginError::Closed),
                Ok(Ok(result)) => result,
            },
        };

        match &outcome {
            Ok(()) => info!(nick = %self.nick, "logged in"),
            Err(e) => warn!(nick = %self.nick, error = %e, "login failed"),
        }
        outcome
    }

    pub async fn join_channels<S: AsRef<str>>(&self, channels: &[S]) -> Result<(), SessionError> {
        let commands = channels.iter().map(|c| Command::join(&normalize_channel(c.as_ref())));
        self.client.send(commands).await?;
        Ok(())
    }

    pub async fn leave_channels<S: AsRef<str>>(&self, channels: &[S]) -> Result<(), SessionError> {
        let commands = channels.iter().map(|c| Command::part(&normalize_channel(c.as_ref())));
        self.client.send(commands).await?;
        Ok(())
    }

    /// Requests the capabilities not yet acknowledged.
    pub async fn request_capabilities(&self, capabilities: &[Capability]) -> Result<(), SessionError> {
        let missing: Vec<Command> = {
            let state = self.state.read();
            capabilities
                .iter()
                .filter(|c| !state.has_capability(**c))
                .map(|c| Command::CapReq(*c))
                .collect()
        };
        self.client.send(missing).await?;
        Ok(())
    }

    pub async fn send_message(&self, channel: &str, text: &str) -> Result<(), SessionError> {
        if !self.in_channel(channel) {
            return Err(SessionError::NotInChannel(normalize_channel(channel)));
        }
        self.client.send([Command::privmsg(channel, text)]).await?;
        Ok(())
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        self.state.read().capabilities()
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.state.read().has_capability(capability)
    }

    pub fn channels(&self) -> Vec<String> {
        self.state.read().channels()
    }

    pub fn in_channel(&self, channel: &str) -> bool {
        self.state.read().in_channel(channel)
    }

    pub fn channel(&self, channel: &str) -> Result<ChannelState, SessionError> {
        self.state.read().channel(channel)
    }

    pub fn user_state(&self, channel: &str) -> Result<UserState, SessionError> {
        self.state.read().user_state(channel)
    }

    pub fn add_channel(&self, channel: &str) {
        self.state.write().add_channel(channel);
    }

    pub fn remove_channel(&self, channel: &str) -> bool {
        self.state.write().remove_channel(channel)
    }

    pub fn update_channel(&self, channel: &str, state: ChannelState) -> Result<(), SessionError> {
        self.state.write().update_channel(channel, state)
    }

    pub fn update_user_state(&self, channel: &str, state: UserState) -> Result<(), SessionError> {
        self.state.write().update_user_state(channel, state)
    }

    /// Dispatches every inbound event until the client is done.
    pub async fn run<H: Handler + ?Sized>(&self, mut inbound: Inbound, handler: &mut H) {
        while let Some(event) = inbound.next().await {
            match event {
                Event::Message(message) => self.dispatch(message, handler).await,
                Event::Error(err) => handler.on_decode_error(self, err),
            }
        }
        debug!("dispatch finished");
    }

    /// Applies one message to the session, then hands it to `handler`.
    pub async fn dispatch<H: Handler + ?Sized>(&self, message: Message, handler: &mut H) {
        trace!(%message, "dispatch");
        let mut derived = None;

        match message.kind() {
            MessageKind::Ping => {
                let server = message.params.last().cloned().unwrap_or_default();
                if let Err(e) = self.client.send([Command::pong(server)]).await {
                    handler.on_error(self, SessionError::from(e).into());
                }
            }
            MessageKind::EndOfMotd => self.resolve_login(Ok(())),
            MessageKind::PasswordMismatch => self.resolve_login(Err(LoginError::BadCredentials)),
            MessageKind::Notice if is_auth_failure(&message) => {
                self.resolve_login(Err(LoginError::BadCredentials))
            }
            MessageKind::Cap => self.apply_cap(&message),
            MessageKind::Join if self.is_own(&message) => {
                if let Some(channel) = message.channel() {
                    info!(channel, "joined");
                    self.add_channel(channel);
                }
            }
            MessageKind::Part if self.is_own(&message) => {
                if let Some(channel) = message.channel() {
                    info!(channel, "left");
                    self.remove_channel(channel);
                }
            }
            MessageKind::RoomState => {
                if let Err(e) = self.apply_room_state(&message) {
                    handler.on_error(self, e.into());
                }
            }
            MessageKind::UserState => {
                if let Some(channel) = message.channel() {
                    let state = UserState::from_message(&message);
                    if let Err(e) = self.update_user_state(channel, state) {
                        handler.on_error(self, e.into());
                    }
                }
            }
            MessageKind::PrivMsg => {
                derived = self.derive(&message, handler, |m| ChatMessage::from_message(m).map(Derived::Chat))
            }
            MessageKind::ClearChat if message.params.len() > 1 => {
                derived = self.derive(&message, handler, |m| Ban::from_message(m).map(Derived::Ban))
            }
            MessageKind::UserNotice if Subscription::is_subscription(&message) => {
                derived = self.derive(&message, handler, |m| {
                    Subscription::from_message(m).map(Derived::Subscription)
                })
            }
            MessageKind::Reconnect => warn!("service requested a reconnect"),
            _ => {}
        }

        handler.on_message(self, &message);
        match derived {
            Some(Derived::Chat(chat)) => handler.on_chat_message(self, chat),
            Some(Derived::Ban(ban)) => handler.on_ban(self, ban),
            Some(Derived::Subscription(sub)) => handler.on_subscription(self, sub),
            None => {}
        }
    }

    fn derive<H, F>(&self, message: &Message, handler: &mut H, build: F) -> Option<Derived>
    where
        H: Handler + ?Sized,
        F: FnOnce(&Message) -> Result<Derived, crate::domain::DomainError>,
    {
        match build(message) {
            Ok(derived) => Some(derived),
            Err(source) => {
                handler.on_error(
                    self,
                    DispatchError::Domain {
                        command: message.command.clone(),
                        source,
                    },
                );
                None
            }
        }
    }

    fn resolve_login(&self, result: Result<(), LoginError>) {
        match self.pending_login.lock().take() {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => trace!("login reply with no login outstanding"),
        }
    }

    fn apply_cap(&self, message: &Message) {
        // CAP * ACK :twitch.tv/tags twitch.tv/commands
        let subcommand = message.params.get(1).map(String::as_str);
        let names = message.params.last().map(String::as_str).unwrap_or_default();
        match subcommand {
            Some("ACK") => {
                let mut state = self.state.write();
                for name in names.split_whitespace() {
                    match name.parse::<Capability>() {
                        Ok(cap) => {
                            if state.add_capability(cap) {
                                info!(capability = %cap, "capability acknowledged");
                            }
                        }
                        Err(e) => debug!(error = %e, "ignoring acknowledged capability"),
                    }
                }
            }
            Some("NAK") => warn!(capabilities = names, "capability request rejected"),
            _ => trace!(%message, "unhandled CAP"),
        }
    }

    fn apply_room_state(&self, message: &Message) -> Result<(), SessionError> {
        let Some(channel) = message.channel() else {
            return Ok(());
        };
        let mut state = self.state.write();
        let merged = state.channel(channel)?.merged_with(message);
        state.update_channel(channel, merged)
    }

    fn is_own(&self, message: &Message) -> bool {
        message
            .nick()
            .is_some_and(|nick| nick.eq_ignore_ascii_case(&self.nick))
    }
}

fn is_auth_failure(message: &Message) -> bool {
    message
        .params
        .last()
        .is_some_and(|text| AUTH_FAILURES.iter().any(|f| text.starts_with(f)))
}
