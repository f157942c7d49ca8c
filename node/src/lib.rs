//! # Snake Node Library
//!
//! This library implements a peer of the serverless multiplayer snake game.
//! Every peer runs the same code; which part of it is active depends on the
//! role the peer currently holds in its game.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The Master runs the only writable copy of the field. On every tick it
//! moves all snakes, resolves crashes, awards score and broadcasts the
//! resulting snapshot to each peer individually. Replicas never simulate;
//! they replace their state wholesale with the newest snapshot.
//!
//! ### Peer Management
//! Handles the lifecycle of the peers in a game:
//! - Join negotiation and player id assignment
//! - Deputy election and Master failover
//! - Demotion of crashed players to viewers
//! - Failure detection through pings and silence thresholds
//!
//! ### Reliable Delivery
//! Join, Steer, RoleChange and State are resent until acknowledged.
//! Receivers remember what they already answered, so a retransmission is
//! acknowledged again without being applied twice.
//!
//! ## Architecture Design
//!
//! ### Single Actor
//! One session task owns the node, the roster, the simulation and all
//! timers, and processes network events and timer ticks sequentially. There
//! are no locks around game state.
//!
//! ### UDP-Based Communication
//! Unicast datagrams carry the game protocol; a multicast group carries
//! discovery probes and game announcements.
//!
//! ## Module Organization
//!
//! - `field`: the toroidal grid, snake movement, crashes and food
//! - `game`: players, scores and snapshots on top of the field
//! - `roster`: role-partitioned registry of peers
//! - `delivery`: pending message table and duplicate filter
//! - `radar`: heartbeat-based failure detector
//! - `context`: state every role shares, plus the outbox
//! - `node`: the role state machine
//! - `discovery`: list of announced games
//! - `network`: sockets and receiver tasks
//! - `session`: the actor and its public handle

pub mod context;
pub mod delivery;
pub mod discovery;
pub mod error;
pub mod field;
pub mod game;
pub mod network;
pub mod node;
pub mod radar;
pub mod roster;
pub mod session;

pub use context::{GameEvent, Outgoing, CHEATER_WARNING};
pub use discovery::{GamesList, OngoingGame};
pub use error::NodeError;
pub use field::FieldError;
pub use game::{Game, GameError};
pub use network::NetworkSettings;
pub use node::{Node, Role};
pub use roster::{Roster, RosterError};
pub use session::Session;
