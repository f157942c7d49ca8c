//! Games seen on the multicast group, kept fresh by their announcements.

use log::{debug, info};
use shared::GameAnnouncement;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A game some Master is announcing, with the address it announces from.
#[derive(Debug, Clone, PartialEq)]
pub struct OngoingGame {
    pub address: SocketAddr,
    pub announcement: GameAnnouncement,
}

impl OngoingGame {
    pub fn name(&self) -> &str {
        &self.announcement.game_name
    }
}

#[derive(Debug)]
struct Entry {
    game: OngoingGame,
    last_seen: Instant,
}

#[derive(Debug)]
pub struct GamesList {
    ttl: Duration,
    entries: BTreeMap<(SocketAddr, String), Entry>,
}

impl GamesList {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: BTreeMap::new(),
        }
    }

    /// Records an announcement. Returns true if the visible list changed.
    pub fn update(&mut self, address: SocketAddr, announcement: GameAnnouncement, now: Instant) -> bool {
        let key = (address, announcement.game_name.clone());
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.last_seen = now;
                if entry.game.announcement == announcement {
                    return false;
                }
                entry.game.announcement = announcement;
                true
            }
            None => {
                info!("Found game {} at {}", announcement.game_name, address);
                self.entries.insert(
                    key,
                    Entry {
                        game: OngoingGame {
                            address,
                            announcement,
                        },
                        last_seen: now,
                    },
                );
                true
            }
        }
    }

    /// Drops games not announced within the TTL. Returns true if any were dropped.
    pub fn expire(&mut self, now: Instant) -> bool {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|(addr, name), entry| {
            let alive = now.saturating_duration_since(entry.last_seen) <= ttl;
            if !alive {
                debug!("Game {} at {} expired", name, addr);
            }
            alive
        });
        self.entries.len() != before
    }

    pub fn find(&self, name: &str) -> Option<&OngoingGame> {
        self.entries.values().map(|e| &e.game).find(|g| g.name() == name)
    }

    pub fn games(&self) -> Vec<OngoingGame> {
        self.entries.values().map(|e| e.game.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
