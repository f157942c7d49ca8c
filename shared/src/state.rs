use serde::{Deserialize, Serialize};

use crate::protocol::{Direction, PlayerId, UnknownVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SnakeStatus {
    Alive,
    Zombie,
}

impl From<SnakeStatus> for u8 {
    fn from(status: SnakeStatus) -> u8 {
        match status {
            SnakeStatus::Alive => 0,
            SnakeStatus::Zombie => 1,
        }
    }
}

impl TryFrom<u8> for SnakeStatus {
    type Error = UnknownVariant;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SnakeStatus::Alive),
            1 => Ok(SnakeStatus::Zombie),
            _ => Err(UnknownVariant {
                kind: "snake status",
                value,
            }),
        }
    }
}

/// One snake as seen in a snapshot. `body[0]` is the head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnakeState {
    pub player_id: PlayerId,
    pub body: Vec<Coord>,
    pub direction: Direction,
    pub status: SnakeStatus,
}

impl SnakeState {
    pub fn head(&self) -> Option<Coord> {
        self.body.first().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub width: i32,
    pub height: i32,
    pub snakes: Vec<SnakeState>,
    pub foods: Vec<Coord>,
}

impl FieldSnapshot {
    pub fn snake(&self, player_id: PlayerId) -> Option<&SnakeState> {
        self.snakes.iter().find(|s| s.player_id == player_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerScore {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
}

/// Complete replicated state, tagged with a strictly increasing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub state_order: u64,
    pub field: FieldSnapshot,
    pub players: Vec<PlayerScore>,
}
