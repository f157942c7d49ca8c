//! Registry of the peers taking part in a game
//!
//! The roster keeps every known peer partitioned by role:
//! - at most one Master and at most one Deputy
//! - any number of Normal players and Viewers, in the order they arrived
//!
//! Ids are unique across all partitions. The Master uses the roster to route
//! state broadcasts and to pick a Deputy; replicas replace theirs wholesale
//! with the list carried in every State message.

use log::info;
use shared::{GamePlayer, NodeRole, PlayerId};
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RosterError {
    #[error("player id {0} is already in the roster")]
    DuplicateId(PlayerId),
    #[error("the {0:?} slot is already taken")]
    RoleTaken(NodeRole),
    #[error("no player with id {0}")]
    NoSuchPlayer(PlayerId),
}

/// Role-partitioned set of known peers
///
/// Iteration order is Master, Deputy, Normal players, Viewers. Within the
/// last two partitions insertion order is kept, which makes Deputy election
/// deterministic.
#[derive(Debug, Default, Clone)]
pub struct Roster {
    master: Option<GamePlayer>,
    deputy: Option<GamePlayer>,
    normals: Vec<GamePlayer>,
    viewers: Vec<GamePlayer>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peer under the role it carries
    ///
    /// Fails if the id is already known or if the peer claims a Master or
    /// Deputy slot that is already filled.
    pub fn add(&mut self, player: GamePlayer) -> Result<(), RosterError> {
        if self.find(player.id).is_some() {
            return Err(RosterError::DuplicateId(player.id));
        }
        match player.role {
            NodeRole::Master if self.master.is_some() => Err(RosterError::RoleTaken(NodeRole::Master)),
            NodeRole::Deputy if self.deputy.is_some() => Err(RosterError::RoleTaken(NodeRole::Deputy)),
            NodeRole::Master => {
                self.master = Some(player);
                Ok(())
            }
            NodeRole::Deputy => {
                self.deputy = Some(player);
                Ok(())
            }
            NodeRole::Normal => {
                self.normals.push(player);
                Ok(())
            }
            NodeRole::Viewer => {
                self.viewers.push(player);
                Ok(())
            }
        }
    }

    /// Removes a peer from whichever partition holds it
    pub fn remove(&mut self, id: PlayerId) -> Option<GamePlayer> {
        if self.master.as_ref().map(|p| p.id) == Some(id) {
            return self.master.take();
        }
        if self.deputy.as_ref().map(|p| p.id) == Some(id) {
            return self.deputy.take();
        }
        if let Some(pos) = self.normals.iter().position(|p| p.id == id) {
            return Some(self.normals.remove(pos));
        }
        if let Some(pos) = self.viewers.iter().position(|p| p.id == id) {
            return Some(self.viewers.remove(pos));
        }
        None
    }

    /// Moves a peer to another role partition
    ///
    /// The roster is left unchanged if the target slot is taken.
    pub fn set_role(&mut self, id: PlayerId, role: NodeRole) -> Result<(), RosterError> {
        let current = self.find(id).ok_or(RosterError::NoSuchPlayer(id))?;
        if current.role == role {
            return Ok(());
        }
        let slot_taken = match role {
            NodeRole::Master => self.master.is_some(),
            NodeRole::Deputy => self.deputy.is_some(),
            _ => false,
        };
        if slot_taken {
            return Err(RosterError::RoleTaken(role));
        }

        let player = self.remove(id).ok_or(RosterError::NoSuchPlayer(id))?;
        info!("Player {} is now {:?} (was {:?})", id, role, player.role);
        self.add(GamePlayer { role, ..player })
    }

    pub fn set_score(&mut self, id: PlayerId, score: u32) {
        if let Some(player) = self.find_mut(id) {
            player.score = score;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &GamePlayer> {
        self.master
            .iter()
            .chain(self.deputy.iter())
            .chain(self.normals.iter())
            .chain(self.viewers.iter())
    }

    fn find_mut(&mut self, id: PlayerId) -> Option<&mut GamePlayer> {
        self.master
            .iter_mut()
            .chain(self.deputy.iter_mut())
            .chain(self.normals.iter_mut())
            .chain(self.viewers.iter_mut())
            .find(|p| p.id == id)
    }

    pub fn find(&self, id: PlayerId) -> Option<&GamePlayer> {
        self.iter().find(|p| p.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&GamePlayer> {
        self.iter().find(|p| p.name == name)
    }

    /// Finds the peer behind a datagram source address
    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<&GamePlayer> {
        self.iter().find(|p| p.address == Some(addr))
    }

    pub fn master(&self) -> Option<&GamePlayer> {
        self.master.as_ref()
    }

    pub fn deputy(&self) -> Option<&GamePlayer> {
        self.deputy.as_ref()
    }

    /// First Normal peer in arrival order, the Deputy candidate
    pub fn first_normal(&self) -> Option<&GamePlayer> {
        self.normals.first()
    }

    /// Every other peer that has a known address
    pub fn peers_except(&self, id: Option<PlayerId>) -> Vec<(PlayerId, SocketAddr)> {
        self.iter()
            .filter(|p| Some(p.id) != id)
            .filter_map(|p| p.address.map(|addr| (p.id, addr)))
            .collect()
    }

    pub fn to_vec(&self) -> Vec<GamePlayer> {
        self.iter().cloned().collect()
    }

    /// Rebuilds the roster from a list received from the Master
    ///
    /// The Master does not know its own address, so the entry it sends for
    /// itself is completed with `master_addr`, the datagram source.
    pub fn replace_from(&mut self, players: &[GamePlayer], master_addr: SocketAddr) -> Result<(), RosterError> {
        let mut fresh = Roster::new();
        for player in players {
            let mut player = player.clone();
            if player.role == NodeRole::Master && player.address.is_none() {
                player.address = Some(master_addr);
            }
            fresh.add(player)?;
        }
        *self = fresh;
        Ok(())
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.iter().map(|p| p.id).collect()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
