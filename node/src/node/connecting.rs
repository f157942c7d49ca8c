use super::Role;
use crate::context::{GameEvent, NodeContext};
use crate::discovery::OngoingGame;
use crate::error::NodeError;
use log::{debug, info, warn};
use shared::{GameMessage, GamePlayer, NodeRole, Payload, PlayerId};
use std::net::SocketAddr;
use std::time::Instant;

/// A Join is in flight and the Master has not answered yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connecting {
    pub player_name: String,
    pub requested_role: NodeRole,
    pub master_id: PlayerId,
    pub master_addr: SocketAddr,
    pub join_seq: u64,
}

impl Connecting {
    pub(super) fn start(
        ctx: &mut NodeContext,
        game: &OngoingGame,
        player_name: &str,
        requested_role: NodeRole,
        now: Instant,
    ) -> Result<Connecting, NodeError> {
        let master = game.announcement.master().ok_or(NodeError::NoMaster)?;
        let master_id = master.id;
        ctx.roster.add(GamePlayer {
            address: Some(game.address),
            ..master.clone()
        })?;
        ctx.radar.track(master_id, now);

        let join_seq = ctx.deliver(
            Payload::Join {
                requested_role,
                player_name: player_name.to_string(),
                game_name: game.announcement.game_name.clone(),
            },
            game.address,
            Some(master_id),
            now,
        );
        info!(
            "Asking {} to join {} as {:?}",
            game.address, game.announcement.game_name, requested_role
        );

        Ok(Connecting {
            player_name: player_name.to_string(),
            requested_role,
            master_id,
            master_addr: game.address,
            join_seq,
        })
    }

    pub(super) fn handle(
        &self,
        ctx: &mut NodeContext,
        from: SocketAddr,
        message: &GameMessage,
        _now: Instant,
    ) -> Option<Role> {
        if from != self.master_addr {
            debug!("Ignoring {:?} from {} while connecting", message.kind(), from);
            return None;
        }
        match &message.payload {
            Payload::Ack if message.seq == self.join_seq => {
                ctx.delivery.confirm(message.seq);
                let Some(id) = message.receiver_id else {
                    warn!("Join acknowledged without a player id");
                    return None;
                };
                ctx.set_my_id(id);
                if let Err(e) = ctx
                    .roster
                    .add(GamePlayer::new(id, self.player_name.clone(), None, self.requested_role))
                {
                    debug!("Own entry not added: {}", e);
                }
                info!("Joined {} as player {}", ctx.game.name(), id);
                ctx.emit(GameEvent::Joined { player_id: id });
                match self.requested_role {
                    NodeRole::Viewer => Some(Role::Viewer),
                    _ => Some(Role::Normal),
                }
            }
            Payload::Error { message: text } => {
                warn!("Join refused: {}", text);
                ctx.delivery.confirm(self.join_seq);
                ctx.emit(GameEvent::Error(text.clone()));
                Some(Role::Finished)
            }
            _ => None,
        }
    }
}
