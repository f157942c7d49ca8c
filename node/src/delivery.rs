//! At-least-once delivery on top of plain datagrams.
//!
//! The sending side keeps every reliable message in a pending table until an
//! Ack carrying its sequence number arrives, resending whatever has waited
//! longer than the resend threshold. The receiving side remembers what it has
//! already acknowledged so a retransmission is answered again without being
//! handled twice.

use log::debug;
use shared::{GameMessage, Payload, PlayerId};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// How many answered messages the duplicate filter remembers.
pub const ANSWERED_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub message: GameMessage,
    pub destination: SocketAddr,
    pub last_sent: Instant,
}

#[derive(Debug)]
pub struct DeliveryController {
    pending: BTreeMap<u64, PendingMessage>,
    resend_after: Duration,
}

impl DeliveryController {
    pub fn new(resend_after: Duration) -> Self {
        Self {
            pending: BTreeMap::new(),
            resend_after,
        }
    }

    /// Starts waiting for an Ack to `message`, which the caller has just sent.
    ///
    /// A newer State replaces any State still pending for the same peer.
    pub fn track(&mut self, message: GameMessage, destination: SocketAddr, now: Instant) {
        if matches!(message.payload, Payload::State { .. }) {
            self.pending.retain(|_, p| {
                !(p.destination == destination && matches!(p.message.payload, Payload::State { .. }))
            });
        }
        self.pending.insert(
            message.seq,
            PendingMessage {
                message,
                destination,
                last_sent: now,
            },
        );
    }

    pub fn confirm(&mut self, seq: u64) -> Option<PendingMessage> {
        self.pending.remove(&seq)
    }

    pub fn is_pending(&self, seq: u64) -> bool {
        self.pending.contains_key(&seq)
    }

    pub fn get(&self, seq: u64) -> Option<&PendingMessage> {
        self.pending.get(&seq)
    }

    /// Messages whose Ack is overdue, stamped as sent at `now`.
    pub fn due(&mut self, now: Instant) -> Vec<(GameMessage, SocketAddr)> {
        let mut out = Vec::new();
        for pending in self.pending.values_mut() {
            if now.saturating_duration_since(pending.last_sent) >= self.resend_after {
                pending.last_sent = now;
                out.push((pending.message.clone(), pending.destination));
            }
        }
        if !out.is_empty() {
            debug!("Resending {} unacknowledged message(s)", out.len());
        }
        out
    }

    /// Forgets everything addressed to a peer that left the roster.
    pub fn remove_all_to(&mut self, destination: SocketAddr) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, p| p.destination != destination);
        before - self.pending.len()
    }

    /// Re-addresses messages meant for a vanished Master to its successor,
    /// keeping their sequence numbers and timestamps.
    pub fn redirect(&mut self, from: SocketAddr, to: SocketAddr, receiver_id: PlayerId) -> usize {
        let mut moved = 0;
        for pending in self.pending.values_mut().filter(|p| p.destination == from) {
            pending.destination = to;
            pending.message.receiver_id = Some(receiver_id);
            moved += 1;
        }
        moved
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Receiver-side log of reliable messages already acknowledged.
///
/// Keys are (sender address, sequence number); the value is the receiver id
/// put in the first Ack so a repeated Ack is identical.
#[derive(Debug, Default)]
pub struct DuplicateFilter {
    answered: HashMap<(SocketAddr, u64), Option<PlayerId>>,
    order: VecDeque<(SocketAddr, u64)>,
}

impl DuplicateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answered(&self, from: SocketAddr, seq: u64) -> Option<Option<PlayerId>> {
        self.answered.get(&(from, seq)).copied()
    }

    pub fn record(&mut self, from: SocketAddr, seq: u64, ack_receiver: Option<PlayerId>) {
        if self.answered.insert((from, seq), ack_receiver).is_none() {
            self.order.push_back((from, seq));
        }
        while self.order.len() > ANSWERED_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.answered.remove(&oldest);
            }
        }
    }
}
