//! Session layer: login, channel and user state, and message dispatch.

pub mod handler;
pub mod session;
pub mod state;

pub use handler::{DispatchError, Handler};
pub use session::Session;
pub use state::{ChannelState, SessionError, UserState};
