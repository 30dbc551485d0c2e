//! Application hooks invoked by [`Session::run`](super::session::Session::run).
//!
//! Dispatch is sequential: no method is called again before the previous
//! call returned, and messages arrive in stream order.

use tracing::{debug, warn};

use super::session::Session;
use super::state::SessionError;
use crate::domain::{Ban, ChatMessage, DomainError, Subscription};
use crate::irc::{Message, ScanError};

/// Failures raised while dispatching one message. They never stop dispatch.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("{command}: {source}")]
    Domain {
        command: String,
        #[source]
        source: DomainError,
    },
}

/// All methods default to no-ops except the error hooks, which log.
pub trait Handler: Send {
    /// Called for every decoded message after session state was updated.
    fn on_message(&mut self, _session: &Session, _message: &Message) {}

    fn on_chat_message(&mut self, _session: &Session, _chat: ChatMessage) {}

    fn on_ban(&mut self, _session: &Session, _ban: Ban) {}

    fn on_subscription(&mut self, _session: &Session, _subscription: Subscription) {}

    fn on_error(&mut self, _session: &Session, error: DispatchError) {
        warn!(error = %error, "dispatch failed");
    }

    fn on_decode_error(&mut self, _session: &Session, error: ScanError) {
        debug!(error = %error, "undecodable line");
    }
}
