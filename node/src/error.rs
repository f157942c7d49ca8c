use crate::game::GameError;
use crate::roster::RosterError;
use shared::{CodecError, ConfigError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Game(#[from] GameError),
    #[error(transparent)]
    Roster(#[from] RosterError),
    #[error("the announced game has no master")]
    NoMaster,
    #[error("the session has stopped")]
    SessionClosed,
}
