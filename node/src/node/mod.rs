//! Role state machine of a game peer.
//!
//! A [`Node`] is in exactly one [`Role`] at a time. Incoming messages are
//! routed on the (role, payload) pair: payloads every connected role treats
//! alike (Ping, Ack, Error) are handled here, the rest by the Master or
//! replica handlers. Handlers may return the role to switch to.

mod connecting;
mod master;
mod replica;

pub use connecting::Connecting;

use crate::context::{GameEvent, NodeContext, Outgoing};
use crate::discovery::OngoingGame;
use crate::error::NodeError;
use crate::game::Game;
use log::{debug, info, warn};
use shared::{Direction, GameConfig, GameMessage, NodeRole, Payload, PlayerId};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Connecting(Connecting),
    Master,
    Deputy,
    Normal,
    Viewer,
    /// The node left the game or the game was abandoned.
    Finished,
}

impl Role {
    pub fn node_role(&self) -> Option<NodeRole> {
        match self {
            Role::Master => Some(NodeRole::Master),
            Role::Deputy => Some(NodeRole::Deputy),
            Role::Normal => Some(NodeRole::Normal),
            Role::Viewer => Some(NodeRole::Viewer),
            Role::Connecting(_) | Role::Finished => None,
        }
    }
}

pub struct Node {
    role: Role,
    ctx: NodeContext,
}

impl Node {
    /// Creates a game and becomes its Master.
    pub fn host(
        game_name: &str,
        player_name: &str,
        config: GameConfig,
        events: mpsc::UnboundedSender<GameEvent>,
    ) -> Result<Node, NodeError> {
        config.validate()?;
        Self::host_game(Game::new(game_name, config), player_name, events)
    }

    /// Becomes Master of an already constructed game.
    pub fn host_game(
        game: Game,
        player_name: &str,
        events: mpsc::UnboundedSender<GameEvent>,
    ) -> Result<Node, NodeError> {
        let mut ctx = NodeContext::new(game, events);
        master::start(&mut ctx, player_name)?;
        ctx.emit(GameEvent::RoleChanged(NodeRole::Master));
        Ok(Node {
            role: Role::Master,
            ctx,
        })
    }

    /// Asks the Master of an announced game to let us in.
    pub fn join(
        game: &OngoingGame,
        player_name: &str,
        requested_role: NodeRole,
        events: mpsc::UnboundedSender<GameEvent>,
        now: Instant,
    ) -> Result<Node, NodeError> {
        let config = game.announcement.config;
        config.validate()?;
        let mut ctx = NodeContext::new(Game::new(game.announcement.game_name.clone(), config), events);
        let connecting = Connecting::start(&mut ctx, game, player_name, requested_role, now)?;
        Ok(Node {
            role: Role::Connecting(connecting),
            ctx,
        })
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn context(&self) -> &NodeContext {
        &self.ctx
    }

    pub fn my_id(&self) -> Option<PlayerId> {
        self.ctx.my_id
    }

    pub fn config(&self) -> GameConfig {
        *self.ctx.game.config()
    }

    pub fn is_finished(&self) -> bool {
        self.role == Role::Finished
    }

    pub fn take_outbox(&mut self) -> Vec<Outgoing> {
        self.ctx.take_outbox()
    }

    pub fn handle(&mut self, from: SocketAddr, message: GameMessage, now: Instant) {
        if self.is_finished() {
            return;
        }
        debug!("{:?} #{} from {} in {:?}", message.kind(), message.seq, from, self.role.node_role());

        if let Some(id) = message.sender_id {
            if Some(id) != self.ctx.my_id && self.ctx.roster.find(id).is_some() {
                self.ctx.radar.received(id, now);
            }
        }

        let connected = !matches!(self.role, Role::Connecting(_));
        if connected && message.payload.requires_ack() {
            if let Some(receiver) = self.ctx.dedup.answered(from, message.seq) {
                debug!("Duplicate #{} from {}, acknowledging again", message.seq, from);
                self.ctx.send_ack(from, message.seq, receiver, now);
                return;
            }
        }

        let next = match (&self.role, &message.payload) {
            (Role::Finished, _) => None,
            (Role::Connecting(connecting), _) => connecting.handle(&mut self.ctx, from, &message, now),
            (_, Payload::Ping) => {
                self.ctx.send_ack(from, message.seq, message.sender_id, now);
                None
            }
            (_, Payload::Ack) => {
                self.ctx.delivery.confirm(message.seq);
                None
            }
            (_, Payload::Error { message: text }) => {
                warn!("Error from {}: {}", from, text);
                self.ctx.emit(GameEvent::Error(text.clone()));
                None
            }
            (_, Payload::Announcement { .. }) => None,
            (Role::Master, _) => master::handle(&mut self.ctx, from, &message, now),
            (role, _) => match role.node_role() {
                Some(replica_role) => replica::handle(replica_role, &mut self.ctx, from, &message, now),
                None => None,
            },
        };

        if let Some(next) = next {
            self.switch_to(next);
        }
    }

    /// Master only: advances the simulation and broadcasts the result.
    pub fn on_tick(&mut self, now: Instant) {
        if self.role == Role::Master {
            master::tick(&mut self.ctx, now);
        }
    }

    pub fn on_announce(&mut self) {
        if self.role == Role::Master {
            let game = self.ctx.announcement();
            self.ctx.multicast(Payload::Announcement { game });
        }
    }

    pub fn on_retry(&mut self, now: Instant) {
        if !self.is_finished() {
            self.ctx.resend_due(now);
        }
    }

    pub fn on_heartbeat(&mut self, now: Instant) {
        if self.is_finished() {
            return;
        }
        let sweep = self.ctx.radar.sweep(now);
        for id in sweep.to_ping {
            if let Some(addr) = self.ctx.roster.find(id).and_then(|p| p.address) {
                self.ctx.send_once(Payload::Ping, addr, Some(id), now);
            }
        }
        for id in sweep.disconnected {
            self.on_disconnect(id, now);
            if self.is_finished() {
                break;
            }
        }
    }

    fn on_disconnect(&mut self, id: PlayerId, now: Instant) {
        info!("Peer {} went silent", id);
        let next = match &self.role {
            Role::Finished => None,
            Role::Connecting(connecting) if connecting.master_id == id => {
                self.ctx
                    .emit(GameEvent::Error("The game's master does not answer".to_string()));
                Some(Role::Finished)
            }
            Role::Connecting(_) => None,
            Role::Master => {
                master::on_disconnect(&mut self.ctx, id, now);
                None
            }
            role => match role.node_role() {
                Some(replica_role) => replica::on_disconnect(replica_role, &mut self.ctx, id, now),
                None => None,
            },
        };
        if let Some(next) = next {
            self.switch_to(next);
        }
    }

    pub fn change_direction(&mut self, direction: Direction, now: Instant) {
        match self.role {
            Role::Master => {
                if let Some(id) = self.ctx.my_id {
                    if let Err(e) = self.ctx.game.change_direction(id, direction) {
                        debug!("Ignoring steer: {}", e);
                    }
                }
            }
            Role::Deputy | Role::Normal => {
                let Some(master) = self.ctx.roster.master().cloned() else {
                    warn!("No master to steer through");
                    return;
                };
                if let Some(addr) = master.address {
                    self.ctx
                        .deliver(Payload::Steer { direction }, addr, Some(master.id), now);
                }
            }
            _ => debug!("Cannot steer in {:?}", self.role.node_role()),
        }
    }

    /// Leaves the game. A non-master tells the Master it is now only watching.
    pub fn exit(&mut self, now: Instant) {
        if matches!(self.role, Role::Deputy | Role::Normal | Role::Viewer) {
            if let Some(master) = self.ctx.roster.master().cloned() {
                if let Some(addr) = master.address {
                    self.ctx.send_once(
                        Payload::RoleChange {
                            sender_role: Some(NodeRole::Viewer),
                            receiver_role: None,
                        },
                        addr,
                        Some(master.id),
                        now,
                    );
                }
            }
        }
        info!("Leaving game {}", self.ctx.game.name());
        self.role = Role::Finished;
    }

    /// Gives up on the game after an unrecoverable condition.
    pub fn abandon(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("Abandoning game: {}", reason);
        self.ctx.emit(GameEvent::Error(reason));
        self.role = Role::Finished;
    }

    fn switch_to(&mut self, next: Role) {
        let before = self.role.node_role();
        let after = next.node_role();
        info!("Switching from {:?} to {:?}", before, after);
        self.role = next;
        if let Some(role) = after {
            if Some(role) != before {
                self.ctx.emit(GameEvent::RoleChanged(role));
            }
        }
    }
}
