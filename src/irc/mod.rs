//! Chat protocol layer: line decoding, command encoding, and the duplex
//! connection client.

pub mod client;
pub mod commands;
pub mod connection;
pub mod message;
pub mod scanner;

pub use client::{Client, ClientError, Event, Inbound};
pub use commands::{Capability, Command};
pub use message::{Message, MessageKind};
pub use scanner::{ScanError, Scanner};
