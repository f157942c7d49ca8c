//! State shared by every role a node can take.
//!
//! A [`NodeContext`] owns the game, the roster, the delivery controller and
//! the failure detector. Role handlers never touch the socket: they push
//! [`Outgoing`] datagrams into the outbox, which the session drains after
//! each step.

use crate::delivery::{DeliveryController, DuplicateFilter};
use crate::discovery::OngoingGame;
use crate::game::Game;
use crate::radar::Radar;
use crate::roster::Roster;
use log::{debug, warn};
use shared::{GameAnnouncement, GameMessage, GamePlayer, GameSnapshot, NodeRole, Payload, PlayerId};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;

pub const CHEATER_WARNING: &str = "Cheating is bad!!!";

/// Notifications for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// A snapshot was produced (Master) or applied (replica).
    StateUpdated {
        snapshot: GameSnapshot,
        players: Vec<GamePlayer>,
    },
    GamesUpdated(Vec<OngoingGame>),
    Joined { player_id: PlayerId },
    RoleChanged(NodeRole),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Unicast { message: GameMessage, to: SocketAddr },
    Multicast { message: GameMessage },
}

pub struct NodeContext {
    pub my_id: Option<PlayerId>,
    pub game: Game,
    pub roster: Roster,
    pub delivery: DeliveryController,
    pub dedup: DuplicateFilter,
    pub radar: Radar,
    next_seq: u64,
    outbox: Vec<Outgoing>,
    events: mpsc::UnboundedSender<GameEvent>,
}

impl NodeContext {
    pub fn new(game: Game, events: mpsc::UnboundedSender<GameEvent>) -> Self {
        let config = *game.config();
        Self {
            my_id: None,
            roster: Roster::new(),
            delivery: DeliveryController::new(config.resend_after()),
            dedup: DuplicateFilter::new(),
            radar: Radar::new(&config),
            game,
            next_seq: 1,
            outbox: Vec::new(),
            events,
        }
    }

    pub fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn set_my_id(&mut self, id: PlayerId) {
        self.my_id = Some(id);
        self.radar.set_self(Some(id));
    }

    pub fn my_role(&self) -> Option<NodeRole> {
        self.my_id.and_then(|id| self.roster.find(id)).map(|p| p.role)
    }

    fn message(&mut self, payload: Payload, receiver_id: Option<PlayerId>) -> GameMessage {
        GameMessage::new(self.next_seq(), payload)
            .from_sender(self.my_id)
            .to_receiver(receiver_id)
    }

    fn push(&mut self, message: GameMessage, to: SocketAddr, now: Instant) {
        if let Some(id) = message.receiver_id {
            self.radar.sent(id, now);
        }
        self.outbox.push(Outgoing::Unicast { message, to });
    }

    /// Fire-and-forget unicast.
    pub fn send_once(&mut self, payload: Payload, to: SocketAddr, receiver_id: Option<PlayerId>, now: Instant) {
        let message = self.message(payload, receiver_id);
        self.push(message, to, now);
    }

    /// Unicast that is resent until acknowledged. Returns its sequence number.
    pub fn deliver(&mut self, payload: Payload, to: SocketAddr, receiver_id: Option<PlayerId>, now: Instant) -> u64 {
        let message = self.message(payload, receiver_id);
        let seq = message.seq;
        self.delivery.track(message.clone(), to, now);
        self.push(message, to, now);
        seq
    }

    pub fn multicast(&mut self, payload: Payload) {
        let message = self.message(payload, None);
        self.outbox.push(Outgoing::Multicast { message });
    }

    /// Acknowledges `seq` and remembers it, so a retransmission gets the same
    /// answer without being handled again.
    pub fn acknowledge(&mut self, to: SocketAddr, seq: u64, receiver_id: Option<PlayerId>, now: Instant) {
        self.dedup.record(to, seq, receiver_id);
        self.send_ack(to, seq, receiver_id, now);
    }

    pub fn send_ack(&mut self, to: SocketAddr, seq: u64, receiver_id: Option<PlayerId>, now: Instant) {
        let message = GameMessage::new(seq, Payload::Ack)
            .from_sender(self.my_id)
            .to_receiver(receiver_id);
        self.push(message, to, now);
    }

    pub fn send_error(&mut self, to: SocketAddr, text: impl Into<String>, now: Instant) {
        self.send_once(Payload::Error { message: text.into() }, to, None, now);
    }

    pub fn warn_cheater(&mut self, to: SocketAddr, now: Instant) {
        warn!("Rejecting inconsistent role claim from {}", to);
        self.send_error(to, CHEATER_WARNING, now);
    }

    pub fn resend_due(&mut self, now: Instant) {
        for (message, to) in self.delivery.due(now) {
            self.push(message, to, now);
        }
    }

    /// Whether `from` is the Master this node currently follows.
    pub fn is_from_master(&self, from: SocketAddr, sender_id: Option<PlayerId>) -> bool {
        match self.roster.master() {
            Some(master) => Some(master.id) == sender_id && master.address == Some(from),
            None => false,
        }
    }

    pub fn announcement(&self) -> GameAnnouncement {
        GameAnnouncement {
            game_name: self.game.name().to_string(),
            can_join: self.game.can_add_player(),
            config: *self.game.config(),
            players: self.roster.to_vec(),
        }
    }

    pub fn emit(&self, event: GameEvent) {
        if self.events.send(event).is_err() {
            debug!("Nobody is listening to game events");
        }
    }

    pub fn publish_state(&self) {
        self.emit(GameEvent::StateUpdated {
            snapshot: self.game.snapshot(),
            players: self.roster.to_vec(),
        });
    }

    pub fn take_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }
}
