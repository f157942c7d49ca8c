use super::Role;
use crate::context::{GameEvent, NodeContext};
use crate::error::NodeError;
use log::{debug, info, warn};
use shared::{GameMessage, GamePlayer, NodeRole, Payload, PlayerId};
use std::net::SocketAddr;
use std::time::Instant;

pub(super) fn start(ctx: &mut NodeContext, player_name: &str) -> Result<(), NodeError> {
    let id = ctx.game.new_player(player_name)?;
    ctx.set_my_id(id);
    ctx.roster
        .add(GamePlayer::new(id, player_name, None, NodeRole::Master))?;
    info!("Hosting game {} as player {}", ctx.game.name(), id);
    ctx.emit(GameEvent::Joined { player_id: id });
    Ok(())
}

pub(super) fn handle(ctx: &mut NodeContext, from: SocketAddr, message: &GameMessage, now: Instant) -> Option<Role> {
    match &message.payload {
        Payload::Join {
            requested_role,
            player_name,
            game_name,
        } => return on_join(ctx, from, message.seq, *requested_role, player_name, game_name, now),
        Payload::Steer { direction } => {
            if message.receiver_id != ctx.my_id {
                debug!("Steer #{} is not addressed to us", message.seq);
                return None;
            }
            let Some(sender) = message.sender_id.and_then(|id| ctx.roster.find(id)).cloned() else {
                debug!("Steer from unknown peer {}", from);
                return None;
            };
            ctx.acknowledge(from, message.seq, Some(sender.id), now);
            if sender.role == NodeRole::Viewer {
                debug!("Viewer {} cannot steer", sender.id);
            } else if let Err(e) = ctx.game.change_direction(sender.id, *direction) {
                debug!("Ignoring steer from {}: {}", sender.id, e);
            }
        }
        Payload::RoleChange {
            sender_role,
            receiver_role,
        } => {
            if receiver_role.is_some() || *sender_role != Some(NodeRole::Viewer) {
                ctx.warn_cheater(from, now);
                return None;
            }
            let Some(sender) = message.sender_id.and_then(|id| ctx.roster.find(id)).cloned() else {
                return None;
            };
            ctx.acknowledge(from, message.seq, Some(sender.id), now);
            if let Err(e) = ctx.roster.set_role(sender.id, NodeRole::Viewer) {
                warn!("Could not demote {}: {}", sender.id, e);
            }
            ctx.game.kill_player(sender.id);
            if sender.role == NodeRole::Deputy {
                elect_deputy(ctx, now);
            }
        }
        Payload::Discover => {
            let game = ctx.announcement();
            ctx.send_once(Payload::Announcement { game }, from, None, now);
        }
        _ => {}
    }
    None
}

fn on_join(
    ctx: &mut NodeContext,
    from: SocketAddr,
    seq: u64,
    requested_role: NodeRole,
    player_name: &str,
    game_name: &str,
    now: Instant,
) -> Option<Role> {
    if game_name != ctx.game.name() {
        ctx.send_error(from, format!("There is no game named {} here.", game_name), now);
        return None;
    }
    if ctx.roster.find_by_name(player_name).is_some() {
        ctx.send_error(from, format!("Name: {} is already taken. Try other.", player_name), now);
        return None;
    }

    let id = match requested_role {
        NodeRole::Viewer => ctx.game.generate_player_id(),
        NodeRole::Normal => {
            if !ctx.game.can_add_player() {
                ctx.send_error(from, "No available space on the field.", now);
                return None;
            }
            match ctx.game.new_player(player_name) {
                Ok(id) => id,
                Err(e) => {
                    ctx.send_error(from, e.to_string(), now);
                    return None;
                }
            }
        }
        _ => {
            ctx.warn_cheater(from, now);
            return None;
        }
    };

    ctx.acknowledge(from, seq, Some(id), now);
    match ctx
        .roster
        .add(GamePlayer::new(id, player_name, Some(from), requested_role))
    {
        Ok(()) => {
            info!("{} joined as {:?} with id {}", player_name, requested_role, id);
            ctx.radar.track(id, now);
        }
        Err(e) => warn!("Could not add {} to the roster: {}", player_name, e),
    }
    None
}

pub(super) fn tick(ctx: &mut NodeContext, now: Instant) {
    let report = ctx.game.update();
    if report.food_shortfall > 0 {
        warn!(
            "No room for {} food item(s), retrying next tick",
            report.food_shortfall
        );
    }

    for dead in report.dead_players {
        if Some(dead) == ctx.my_id {
            info!("Our own snake crashed, staying on as master");
            continue;
        }
        let Some(player) = ctx.roster.find(dead).cloned() else {
            continue;
        };
        if let Err(e) = ctx.roster.set_role(dead, NodeRole::Viewer) {
            warn!("Could not demote {}: {}", dead, e);
        }
        if let Some(addr) = player.address {
            ctx.deliver(
                Payload::RoleChange {
                    sender_role: None,
                    receiver_role: Some(NodeRole::Viewer),
                },
                addr,
                Some(dead),
                now,
            );
        }
    }

    let scores: Vec<(PlayerId, u32)> = ctx.game.players().map(|p| (p.id, p.score)).collect();
    for (id, score) in scores {
        ctx.roster.set_score(id, score);
    }

    let snapshot = ctx.game.snapshot();
    let roster = ctx.roster.to_vec();
    for (id, addr) in ctx.roster.peers_except(ctx.my_id) {
        ctx.deliver(
            Payload::State {
                snapshot: snapshot.clone(),
                roster: roster.clone(),
            },
            addr,
            Some(id),
            now,
        );
    }

    if ctx.roster.deputy().is_none() {
        elect_deputy(ctx, now);
    }

    ctx.emit(GameEvent::StateUpdated {
        snapshot,
        players: roster,
    });
}

pub(super) fn on_disconnect(ctx: &mut NodeContext, id: PlayerId, now: Instant) {
    let Some(player) = ctx.roster.remove(id) else {
        return;
    };
    info!("Player {} ({}) disconnected", id, player.name);
    if let Some(addr) = player.address {
        ctx.delivery.remove_all_to(addr);
    }
    ctx.radar.untrack(id);
    ctx.game.kill_player(id);
    if player.role == NodeRole::Deputy {
        elect_deputy(ctx, now);
    }
}

/// Promotes the first Normal peer if the Deputy slot is empty.
pub(super) fn elect_deputy(ctx: &mut NodeContext, now: Instant) {
    if ctx.roster.deputy().is_some() {
        return;
    }
    let Some(candidate) = ctx.roster.first_normal().cloned() else {
        debug!("No candidate for deputy");
        return;
    };
    if let Err(e) = ctx.roster.set_role(candidate.id, NodeRole::Deputy) {
        warn!("Could not elect {}: {}", candidate.id, e);
        return;
    }
    info!("Player {} elected deputy", candidate.id);
    if let Some(addr) = candidate.address {
        ctx.deliver(
            Payload::RoleChange {
                sender_role: None,
                receiver_role: Some(NodeRole::Deputy),
            },
            addr,
            Some(candidate.id),
            now,
        );
    }
}

/// Deputy taking over after the Master vanished.
pub(super) fn take_over(ctx: &mut NodeContext, old_master: PlayerId, now: Instant) {
    info!("Master {} is gone, taking over", old_master);
    on_disconnect(ctx, old_master, now);

    if let Some(me) = ctx.my_id {
        if let Some(entry) = ctx.roster.remove(me) {
            let entry = GamePlayer {
                role: NodeRole::Master,
                address: None,
                ..entry
            };
            if let Err(e) = ctx.roster.add(entry) {
                warn!("Could not record ourselves as master: {}", e);
            }
        }
    }

    let ids = ctx.roster.ids();
    ctx.game.reserve_ids(ids.iter().copied());
    ctx.radar.reset(ids, now);

    for (id, addr) in ctx.roster.peers_except(ctx.my_id) {
        ctx.deliver(
            Payload::RoleChange {
                sender_role: Some(NodeRole::Master),
                receiver_role: None,
            },
            addr,
            Some(id),
            now,
        );
    }
    elect_deputy(ctx, now);
}
