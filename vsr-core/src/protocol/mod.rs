//! Wire protocol: transport header, chat message record, and VSR command
//! tags.

pub mod command;
pub mod header;
pub mod message;

pub use command::Command;
pub use header::{TransportHeader, HEADER_SIZE, PROTOCOL_VERSION, TRANSPORT_MAGIC};
pub use message::{ChatMessage, ChatMessageFlags, BODY_LEN_MAX, MESSAGE_SIZE};
