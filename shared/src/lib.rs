//! # Shared Protocol
//!
//! Types every peer of a snake game agrees on: the wire messages, the game
//! rules carried in announcements, and the replicated field snapshot.
//!
//! Messages are encoded with `bincode` using variable-length integers, so
//! coordinates and ids on a realistic field cost one or two bytes each and a
//! crowded snapshot still fits in one datagram. Enums that travel as raw
//! discriminants (`Direction`, `NodeRole`, `SnakeStatus`) are decoded through
//! `TryFrom<u8>` so a peer running a newer protocol surfaces as
//! [`CodecError::UnknownVariant`] instead of a generic decode failure.

use bincode::Options;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use thiserror::Error;

pub mod config;
pub mod protocol;
pub mod state;

pub use config::{ConfigError, GameConfig};
pub use protocol::{
    Direction, GameAnnouncement, GameMessage, GamePlayer, NodeRole, Payload, PayloadKind, PlayerId,
    UnknownVariant,
};
pub use state::{Coord, FieldSnapshot, GameSnapshot, PlayerScore, SnakeState, SnakeStatus};

/// Group every running game announces itself on.
pub const MULTICAST_GROUP: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(239, 192, 0, 4), 9192);
pub const ANNOUNCE_PERIOD: Duration = Duration::from_millis(1000);
/// A game that has not been announced for this long drops out of the list.
pub const ANNOUNCE_TTL: Duration = Duration::from_millis(3000);
pub const RECV_BUFFER_SIZE: usize = 65536;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] bincode::Error),
    #[error("failed to decode message: {0}")]
    Decode(#[source] bincode::Error),
    #[error("{0}")]
    UnknownVariant(String),
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_varint_encoding()
}

pub fn encode(message: &GameMessage) -> Result<Vec<u8>, CodecError> {
    codec().serialize(message).map_err(CodecError::Encode)
}

pub fn decode(bytes: &[u8]) -> Result<GameMessage, CodecError> {
    codec().deserialize(bytes).map_err(|err| match &*err {
        bincode::ErrorKind::Custom(msg) if msg.starts_with(protocol::UNKNOWN_VARIANT_MARKER) => {
            CodecError::UnknownVariant(msg.clone())
        }
        _ => CodecError::Decode(err),
    })
}
