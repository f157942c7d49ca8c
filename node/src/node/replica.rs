use super::{master, Role};
use crate::context::{GameEvent, NodeContext};
use log::{debug, info, warn};
use shared::{GameMessage, NodeRole, Payload, PlayerId};
use std::net::SocketAddr;
use std::time::Instant;

/// Messages reaching a Deputy, Normal or Viewer node.
pub(super) fn handle(
    role: NodeRole,
    ctx: &mut NodeContext,
    from: SocketAddr,
    message: &GameMessage,
    now: Instant,
) -> Option<Role> {
    match &message.payload {
        Payload::State { snapshot, roster } => {
            if !ctx.is_from_master(from, message.sender_id) {
                debug!("Ignoring state from {}, not our master", from);
                return None;
            }
            if snapshot.state_order < ctx.game.state_order() {
                debug!(
                    "Stale state {} (have {})",
                    snapshot.state_order,
                    ctx.game.state_order()
                );
                ctx.acknowledge(from, message.seq, message.sender_id, now);
                return None;
            }
            if let Err(e) = ctx.game.restore(snapshot) {
                warn!("Cannot apply state {}: {}", snapshot.state_order, e);
                return None;
            }
            if let Err(e) = ctx.roster.replace_from(roster, from) {
                warn!("Master sent an inconsistent roster: {}", e);
            }
            ctx.acknowledge(from, message.seq, message.sender_id, now);
            ctx.publish_state();
            follow_roster(role, ctx)
        }
        Payload::RoleChange {
            sender_role,
            receiver_role,
        } => on_role_change(role, ctx, from, message, *sender_role, *receiver_role, now),
        _ => None,
    }
}

/// The roster in a State is authoritative about our own role.
fn follow_roster(role: NodeRole, ctx: &NodeContext) -> Option<Role> {
    match (role, ctx.my_role()?) {
        (NodeRole::Normal, NodeRole::Deputy) => Some(Role::Deputy),
        (NodeRole::Normal | NodeRole::Deputy, NodeRole::Viewer) => Some(Role::Viewer),
        _ => None,
    }
}

fn on_role_change(
    role: NodeRole,
    ctx: &mut NodeContext,
    from: SocketAddr,
    message: &GameMessage,
    sender_role: Option<NodeRole>,
    receiver_role: Option<NodeRole>,
    now: Instant,
) -> Option<Role> {
    let from_master = ctx.is_from_master(from, message.sender_id);
    if receiver_role.is_some() && !from_master {
        ctx.warn_cheater(from, now);
        return None;
    }
    let Some(sender_id) = message.sender_id.filter(|id| ctx.roster.find(*id).is_some()) else {
        return None;
    };

    match sender_role {
        Some(NodeRole::Master) if from_master => {}
        Some(NodeRole::Master) => {
            if ctx.roster.deputy().map(|d| d.id) != Some(sender_id) {
                ctx.warn_cheater(from, now);
                return None;
            }
            if role == NodeRole::Deputy {
                // Two deputies cannot both be in charge.
                ctx.warn_cheater(from, now);
                return None;
            }
            adopt_deputy(ctx, now);
        }
        Some(other) => {
            debug!("Ignoring {:?} claim from {}", other, sender_id);
        }
        None => {}
    }
    ctx.acknowledge(from, message.seq, Some(sender_id), now);

    match (role, receiver_role) {
        (NodeRole::Normal | NodeRole::Deputy, Some(NodeRole::Viewer)) => {
            set_own_role(ctx, NodeRole::Viewer);
            Some(Role::Viewer)
        }
        (NodeRole::Normal, Some(NodeRole::Deputy)) => {
            set_own_role(ctx, NodeRole::Deputy);
            Some(Role::Deputy)
        }
        (NodeRole::Viewer, Some(NodeRole::Deputy)) => {
            debug!("A viewer cannot become deputy");
            None
        }
        _ => None,
    }
}

fn set_own_role(ctx: &mut NodeContext, role: NodeRole) {
    if let Some(me) = ctx.my_id {
        if let Err(e) = ctx.roster.set_role(me, role) {
            debug!("Roster does not reflect our new role yet: {}", e);
        }
    }
}

/// Treats the known Deputy as the Master from now on, redirecting whatever
/// was still waiting for the old Master. Returns false without a Deputy.
fn adopt_deputy(ctx: &mut NodeContext, now: Instant) -> bool {
    let Some(deputy) = ctx.roster.deputy().cloned() else {
        return false;
    };
    let old = ctx.roster.master().cloned();
    if let Some(old) = &old {
        ctx.roster.remove(old.id);
        ctx.radar.untrack(old.id);
    }
    if let Err(e) = ctx.roster.set_role(deputy.id, NodeRole::Master) {
        warn!("Could not promote deputy {}: {}", deputy.id, e);
        return false;
    }
    if let (Some(old_addr), Some(new_addr)) = (old.and_then(|o| o.address), deputy.address) {
        let moved = ctx.delivery.redirect(old_addr, new_addr, deputy.id);
        debug!("Redirected {} pending message(s) to {}", moved, new_addr);
    }
    ctx.radar.received(deputy.id, now);
    info!("Following deputy {} as the new master", deputy.id);
    true
}

pub(super) fn on_disconnect(role: NodeRole, ctx: &mut NodeContext, id: PlayerId, now: Instant) -> Option<Role> {
    let master_gone = ctx.roster.master().map(|m| m.id) == Some(id);
    if !master_gone {
        if let Some(player) = ctx.roster.remove(id) {
            if let Some(addr) = player.address {
                ctx.delivery.remove_all_to(addr);
            }
        }
        return None;
    }

    let i_am_deputy = role == NodeRole::Deputy || ctx.my_role() == Some(NodeRole::Deputy);
    if i_am_deputy && role != NodeRole::Viewer {
        master::take_over(ctx, id, now);
        return Some(Role::Master);
    }
    if adopt_deputy(ctx, now) {
        return None;
    }
    let reason = "The master left and nobody can take over the game".to_string();
    warn!("{}", reason);
    ctx.emit(GameEvent::Error(reason));
    Some(Role::Finished)
}
