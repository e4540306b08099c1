//! Type-Length-Value wire protocol.
//!
//! This module defines the framing used between TLV clients and servers, the connection
//! primitive both sides read and write through, and the server-side machinery that routes
//! each incoming message to a handler registered for its type.
//!
//! # Binary Format
//!
//! Every message is a fixed 4-byte header followed by its payload:
//!
//! - bytes `[0..2)`: message type id, `u16` little-endian.
//! - bytes `[2..4)`: payload length, `u16` little-endian.
//! - bytes `[4..4 + length)`: the payload, with no padding, terminator or checksum.
//!
//! Payloads are therefore capped at 65535 bytes. Type ids below
//! [`MessageType::USER_START`] are reserved for protocol use (such as
//! [`MessageType::HELLO`]); ids at or above it belong to the application.
//!
//! # Key Components
//!
//! - [`Header`]: encodes and decodes the 4-byte header.
//! - [`Connection`]: exact-length reads with deadlines and single-write framed messages.
//! - [`Client`]: dials a server and owns one [`Connection`].
//! - [`HandlerRegistry`]: immutable type id to [`Handler`] mapping shared by every connection.
//! - [`Server`]: accepts connections and drives one dispatch loop per connection.
//!
//! # Replies
//!
//! The client does not decode a header when it reads. Handlers reply by writing directly on
//! the connection and the client must know how many bytes to expect.
use std::fmt;

use bincode::{Decode, Encode};

mod client;
mod handler;
mod header;
mod network;
mod server;
mod thread;
mod transport;

use thread::ThreadPool;

pub use client::Client;
pub use handler::{Handler, HandlerRegistry, HandlerRegistryBuilder};
pub use header::Header;
pub use network::Network;
pub use server::{Concurrency, Server, ServerConfig, UnknownTypePolicy};
pub use transport::{Connection, TransportError};

/// Size of the fixed message header in bytes.
pub const HEADER_LEN: usize = 4;
/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Message type id carried in the first two header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct MessageType(pub u16);

impl MessageType {
    /// Reserved greeting type.
    pub const HELLO: MessageType = MessageType(0);
    /// First id available to applications.
    pub const USER_START: MessageType = MessageType(1);

    /// Application type `offset` ids above [`MessageType::USER_START`].
    pub fn user(offset: u16) -> Option<Self> {
        Self::USER_START.0.checked_add(offset).map(MessageType)
    }

    pub fn is_reserved(&self) -> bool {
        *self < Self::USER_START
    }
}

impl From<u16> for MessageType {
    fn from(value: u16) -> Self {
        MessageType(value)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type {}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_range() {
        assert!(MessageType::HELLO.is_reserved());
        assert!(!MessageType::USER_START.is_reserved());
        assert!(!MessageType(u16::MAX).is_reserved());
    }

    #[test]
    fn user_types_start_after_reserved() {
        assert_eq!(MessageType::user(0), Some(MessageType::USER_START));
        assert_eq!(MessageType::user(4), Some(MessageType(5)));
        assert_eq!(MessageType::user(u16::MAX), None);
    }
}
