use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

use crate::config::GameConfig;
use crate::state::GameSnapshot;

/// Identifier the Master assigns to every peer that joins its game.
pub type PlayerId = u32;

/// Marker carried in the error text when a wire enum holds a value this build
/// does not know. The codec looks for it to tell version mismatches apart from
/// garbage datagrams.
pub(crate) const UNKNOWN_VARIANT_MARKER: &str = "unknown wire enum value";

/// Raised while decoding an enum discriminant outside the known range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: u8,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} = {}", UNKNOWN_VARIANT_MARKER, self.kind, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Grid offset of one step in this direction. `y` grows downwards.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

impl From<Direction> for u8 {
    fn from(direction: Direction) -> u8 {
        match direction {
            Direction::Up => 0,
            Direction::Down => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }
}

impl TryFrom<u8> for Direction {
    type Error = UnknownVariant;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::Up),
            1 => Ok(Direction::Down),
            2 => Ok(Direction::Left),
            3 => Ok(Direction::Right),
            _ => Err(UnknownVariant {
                kind: "direction",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum NodeRole {
    Normal,
    Master,
    Deputy,
    Viewer,
}

impl From<NodeRole> for u8 {
    fn from(role: NodeRole) -> u8 {
        match role {
            NodeRole::Normal => 0,
            NodeRole::Master => 1,
            NodeRole::Deputy => 2,
            NodeRole::Viewer => 3,
        }
    }
}

impl TryFrom<u8> for NodeRole {
    type Error = UnknownVariant;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NodeRole::Normal),
            1 => Ok(NodeRole::Master),
            2 => Ok(NodeRole::Deputy),
            3 => Ok(NodeRole::Viewer),
            _ => Err(UnknownVariant {
                kind: "node role",
                value,
            }),
        }
    }
}

/// Roster entry as it travels inside State and Announcement messages.
///
/// The Master leaves its own `address` empty; receivers fill it in from the
/// datagram source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamePlayer {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
    pub address: Option<SocketAddr>,
    pub role: NodeRole,
}

impl GamePlayer {
    pub fn new(id: PlayerId, name: impl Into<String>, address: Option<SocketAddr>, role: NodeRole) -> Self {
        Self {
            id,
            name: name.into(),
            score: 0,
            address,
            role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameAnnouncement {
    pub game_name: String,
    pub can_join: bool,
    pub config: GameConfig,
    pub players: Vec<GamePlayer>,
}

impl GameAnnouncement {
    pub fn master(&self) -> Option<&GamePlayer> {
        self.players.iter().find(|p| p.role == NodeRole::Master)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Ping,
    Ack,
    Steer {
        direction: Direction,
    },
    State {
        snapshot: GameSnapshot,
        roster: Vec<GamePlayer>,
    },
    Join {
        requested_role: NodeRole,
        player_name: String,
        game_name: String,
    },
    Error {
        message: String,
    },
    RoleChange {
        sender_role: Option<NodeRole>,
        receiver_role: Option<NodeRole>,
    },
    Discover,
    Announcement {
        game: GameAnnouncement,
    },
}

/// Payload discriminant, used for logging and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Ping,
    Ack,
    Steer,
    State,
    Join,
    Error,
    RoleChange,
    Discover,
    Announcement,
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Ping => PayloadKind::Ping,
            Payload::Ack => PayloadKind::Ack,
            Payload::Steer { .. } => PayloadKind::Steer,
            Payload::State { .. } => PayloadKind::State,
            Payload::Join { .. } => PayloadKind::Join,
            Payload::Error { .. } => PayloadKind::Error,
            Payload::RoleChange { .. } => PayloadKind::RoleChange,
            Payload::Discover => PayloadKind::Discover,
            Payload::Announcement { .. } => PayloadKind::Announcement,
        }
    }

    /// Whether the sender keeps retrying this payload until it is acknowledged.
    pub fn requires_ack(&self) -> bool {
        matches!(
            self,
            Payload::Join { .. } | Payload::Steer { .. } | Payload::RoleChange { .. } | Payload::State { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameMessage {
    pub seq: u64,
    pub sender_id: Option<PlayerId>,
    pub receiver_id: Option<PlayerId>,
    pub payload: Payload,
}

impl GameMessage {
    pub fn new(seq: u64, payload: Payload) -> Self {
        Self {
            seq,
            sender_id: None,
            receiver_id: None,
            payload,
        }
    }

    pub fn from_sender(mut self, sender_id: Option<PlayerId>) -> Self {
        self.sender_id = sender_id;
        self
    }

    pub fn to_receiver(mut self, receiver_id: Option<PlayerId>) -> Self {
        self.receiver_id = receiver_id;
        self
    }

    pub fn kind(&self) -> PayloadKind {
        self.payload.kind()
    }
}
