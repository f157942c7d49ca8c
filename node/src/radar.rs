//! Heartbeat-based failure detector.

use shared::{GameConfig, PlayerId};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct PeerTimes {
    last_received: Instant,
    last_sent: Instant,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Sweep {
    /// Peers silent past the disconnect threshold. Each is reported once.
    pub disconnected: Vec<PlayerId>,
    /// Peers we have not sent anything to for a while.
    pub to_ping: Vec<PlayerId>,
}

/// Tracks when each peer was last heard from and last written to.
#[derive(Debug)]
pub struct Radar {
    self_id: Option<PlayerId>,
    peers: BTreeMap<PlayerId, PeerTimes>,
    ping_after: Duration,
    disconnect_after: Duration,
}

impl Radar {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            self_id: None,
            peers: BTreeMap::new(),
            ping_after: config.ping_after(),
            disconnect_after: config.disconnect_after(),
        }
    }

    pub fn set_self(&mut self, id: Option<PlayerId>) {
        self.self_id = id;
        if let Some(id) = id {
            self.peers.remove(&id);
        }
    }

    /// Forgets every peer and starts watching `ids` afresh from `now`.
    pub fn reset(&mut self, ids: impl IntoIterator<Item = PlayerId>, now: Instant) {
        self.peers.clear();
        for id in ids {
            self.track(id, now);
        }
    }

    pub fn track(&mut self, id: PlayerId, now: Instant) {
        if Some(id) == self.self_id {
            return;
        }
        self.peers.entry(id).or_insert(PeerTimes {
            last_received: now,
            last_sent: now,
        });
    }

    pub fn untrack(&mut self, id: PlayerId) {
        self.peers.remove(&id);
    }

    pub fn is_tracked(&self, id: PlayerId) -> bool {
        self.peers.contains_key(&id)
    }

    pub fn received(&mut self, id: PlayerId, now: Instant) {
        self.track(id, now);
        if let Some(times) = self.peers.get_mut(&id) {
            times.last_received = now;
        }
    }

    pub fn sent(&mut self, id: PlayerId, now: Instant) {
        self.track(id, now);
        if let Some(times) = self.peers.get_mut(&id) {
            times.last_sent = now;
        }
    }

    pub fn sweep(&mut self, now: Instant) -> Sweep {
        let mut sweep = Sweep::default();
        for (id, times) in &self.peers {
            if now.saturating_duration_since(times.last_received) > self.disconnect_after {
                sweep.disconnected.push(*id);
            } else if now.saturating_duration_since(times.last_sent) > self.ping_after {
                sweep.to_ping.push(*id);
            }
        }
        for id in &sweep.disconnected {
            self.peers.remove(id);
        }
        sweep
    }
}
