//! Collaborator-facing entry point.
//!
//! A [`Session`] is a handle to a single actor task that owns the transport,
//! the list of discovered games and at most one [`Node`]. Every mutation of
//! game or roster state happens on that task, one step at a time; after each
//! step the node's outbox is flushed to the socket.

use crate::context::{GameEvent, Outgoing};
use crate::discovery::{GamesList, OngoingGame};
use crate::error::NodeError;
use crate::network::{Inbound, NetworkSettings, Transport};
use crate::node::Node;
use log::{debug, error, info, warn};
use shared::{Direction, GameConfig, GameMessage, NodeRole, Payload};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Interval, MissedTickBehavior};

#[derive(Debug)]
enum Command {
    StartNewGame {
        game_name: String,
        player_name: String,
        config: GameConfig,
    },
    JoinGame {
        game: OngoingGame,
        player_name: String,
        role: NodeRole,
    },
    ChangeDirection(Direction),
    ExitGame,
    Discover,
    Shutdown,
}

pub struct Session {
    commands: mpsc::UnboundedSender<Command>,
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl Session {
    /// Binds the sockets and spawns the session task. Game events arrive on
    /// the returned receiver.
    pub async fn start(
        settings: NetworkSettings,
    ) -> Result<(Session, mpsc::UnboundedReceiver<GameEvent>), NodeError> {
        let (transport, inbound) = Transport::bind(&settings).await?;
        let local_addr = transport.local_addr()?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let actor = SessionActor {
            transport,
            inbound,
            commands: command_rx,
            events: event_tx,
            games: GamesList::new(settings.announce_ttl),
            node: None,
            timers: NodeTimers::default(),
            announce: periodic(settings.announce_period),
            expiry: periodic(settings.announce_period),
            discover_seq: 0,
        };
        let task = tokio::spawn(actor.run());

        Ok((
            Session {
                commands: command_tx,
                local_addr,
                task,
            },
            event_rx,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn send(&self, command: Command) -> Result<(), NodeError> {
        self.commands.send(command).map_err(|_| NodeError::SessionClosed)
    }

    /// Hosts a new game, leaving the current one first.
    pub fn start_new_game(
        &self,
        game_name: impl Into<String>,
        player_name: impl Into<String>,
        config: GameConfig,
    ) -> Result<(), NodeError> {
        config.validate()?;
        self.send(Command::StartNewGame {
            game_name: game_name.into(),
            player_name: player_name.into(),
            config,
        })
    }

    /// Joins an announced game. The outcome arrives as `Joined` or `Error`.
    pub fn join_game(&self, game: OngoingGame, player_name: impl Into<String>, role: NodeRole) -> Result<(), NodeError> {
        self.send(Command::JoinGame {
            game,
            player_name: player_name.into(),
            role,
        })
    }

    pub fn change_direction(&self, direction: Direction) -> Result<(), NodeError> {
        self.send(Command::ChangeDirection(direction))
    }

    pub fn exit_game(&self) -> Result<(), NodeError> {
        self.send(Command::ExitGame)
    }

    /// Asks every Master on the group to announce itself right away.
    pub fn discover(&self) -> Result<(), NodeError> {
        self.send(Command::Discover)
    }

    /// Leaves any game and waits for the session task to stop.
    pub async fn shutdown(self) -> Result<(), NodeError> {
        // The task may already be gone, which is what we want anyway.
        let _ = self.commands.send(Command::Shutdown);
        self.task.await.map_err(|_| NodeError::SessionClosed)
    }
}

/// Timers that only run while a node exists; their periods come from its game.
#[derive(Default)]
struct NodeTimers {
    tick: Option<Interval>,
    retry: Option<Interval>,
    heartbeat: Option<Interval>,
}

impl NodeTimers {
    fn for_config(config: &GameConfig) -> Self {
        Self {
            tick: Some(periodic(config.state_delay())),
            retry: Some(periodic(config.retry_period())),
            heartbeat: Some(periodic(config.heartbeat_period())),
        }
    }
}

/// Interval whose first tick is one period away, skipping missed ticks.
fn periodic(period: Duration) -> Interval {
    let mut timer = interval_at(tokio::time::Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

struct SessionActor {
    transport: Transport,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<GameEvent>,
    games: GamesList,
    node: Option<Node>,
    timers: NodeTimers,
    announce: Interval,
    expiry: Interval,
    discover_seq: u64,
}

impl SessionActor {
    async fn run(mut self) {
        info!("Session started");

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => {
                            self.leave(Instant::now());
                            self.flush().await;
                            info!("Session shutting down");
                            break;
                        }
                        Some(command) => self.on_command(command).await,
                    }
                },

                inbound = self.inbound.recv() => {
                    match inbound {
                        Some(inbound) => self.on_inbound(inbound),
                        None => {
                            error!("All receivers stopped");
                            break;
                        }
                    }
                },

                _ = next_tick(&mut self.timers.tick) => {
                    if let Some(node) = self.node.as_mut() {
                        node.on_tick(Instant::now());
                    }
                },

                _ = next_tick(&mut self.timers.retry) => {
                    if let Some(node) = self.node.as_mut() {
                        node.on_retry(Instant::now());
                    }
                },

                _ = next_tick(&mut self.timers.heartbeat) => {
                    if let Some(node) = self.node.as_mut() {
                        node.on_heartbeat(Instant::now());
                    }
                },

                _ = self.announce.tick() => {
                    if let Some(node) = self.node.as_mut() {
                        node.on_announce();
                    }
                },

                _ = self.expiry.tick() => {
                    if self.games.expire(Instant::now()) {
                        self.emit(GameEvent::GamesUpdated(self.games.games()));
                    }
                },
            }

            self.flush().await;
        }
    }

    fn emit(&self, event: GameEvent) {
        if self.events.send(event).is_err() {
            debug!("Nobody is listening to game events");
        }
    }

    async fn on_command(&mut self, command: Command) {
        let now = Instant::now();
        match command {
            Command::StartNewGame {
                game_name,
                player_name,
                config,
            } => {
                self.leave(now);
                self.flush().await;
                match Node::host(&game_name, &player_name, config, self.events.clone()) {
                    Ok(node) => self.install(node),
                    Err(e) => {
                        error!("Could not start game {}: {}", game_name, e);
                        self.emit(GameEvent::Error(e.to_string()));
                    }
                }
            }
            Command::JoinGame {
                game,
                player_name,
                role,
            } => {
                self.leave(now);
                self.flush().await;
                match Node::join(&game, &player_name, role, self.events.clone(), now) {
                    Ok(node) => self.install(node),
                    Err(e) => {
                        error!("Could not join {}: {}", game.name(), e);
                        self.emit(GameEvent::Error(e.to_string()));
                    }
                }
            }
            Command::ChangeDirection(direction) => match self.node.as_mut() {
                Some(node) => node.change_direction(direction, now),
                None => debug!("Not in a game, ignoring {:?}", direction),
            },
            Command::ExitGame => self.leave(now),
            Command::Discover => {
                self.discover_seq += 1;
                let message = GameMessage::new(self.discover_seq, Payload::Discover);
                if let Err(e) = self.transport.send(&Outgoing::Multicast { message }).await {
                    warn!("Failed to send discovery probe: {}", e);
                }
            }
            Command::Shutdown => {}
        }
    }

    fn install(&mut self, node: Node) {
        self.timers = NodeTimers::for_config(&node.config());
        self.node = Some(node);
    }

    fn leave(&mut self, now: Instant) {
        if let Some(node) = self.node.as_mut() {
            node.exit(now);
        }
    }

    fn on_inbound(&mut self, inbound: Inbound) {
        let now = Instant::now();
        match inbound {
            Inbound::Message { from, message } => {
                if let Payload::Announcement { game } = &message.payload {
                    if self.games.update(from, game.clone(), now) {
                        self.emit(GameEvent::GamesUpdated(self.games.games()));
                    }
                }
                if let Some(node) = self.node.as_mut() {
                    node.handle(from, message, now);
                }
            }
            Inbound::Fatal { from, error } => {
                let Some(node) = self.node.as_mut() else {
                    warn!("Ignoring {} from {}: not in a game", error, from);
                    return;
                };
                if node.context().roster.find_by_addr(from).is_some() {
                    error!("Protocol mismatch with {}: {}", from, error);
                    node.abandon(format!("Protocol mismatch with {}: {}", from, error));
                } else {
                    warn!("Ignoring {} from stranger {}", error, from);
                }
            }
        }
    }

    /// Sends whatever the node queued and drops the node once it finished.
    async fn flush(&mut self) {
        let Some(node) = self.node.as_mut() else {
            return;
        };
        for outgoing in node.take_outbox() {
            if let Err(e) = self.transport.send(&outgoing).await {
                warn!("Failed to send datagram: {}", e);
            }
        }
        if node.is_finished() {
            info!("Game over for this node");
            self.node = None;
            self.timers = NodeTimers::default();
        }
    }
}
