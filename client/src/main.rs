use clap::{Args, Parser, Subcommand};
use client::input::{parse_command, InputCommand};
use client::rendering;
use log::{error, info, warn};
use node::{GameEvent, NetworkSettings, OngoingGame, Session};
use shared::{GameConfig, NodeRole, MULTICAST_GROUP};
use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Local address for the game socket
    #[arg(short = 'b', long, default_value = "0.0.0.0:0")]
    bind: SocketAddr,

    /// Multicast group used for discovery
    #[arg(long, default_value_t = MULTICAST_GROUP)]
    group: SocketAddrV4,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Start a new game and play in it as master
    Host {
        #[arg(short = 'g', long, default_value = "snake")]
        game_name: String,

        #[arg(short = 'p', long)]
        player_name: String,

        #[command(flatten)]
        rules: Rules,
    },
    /// Join a game announced on the local network
    Join {
        #[arg(short = 'g', long)]
        game_name: String,

        #[arg(short = 'p', long)]
        player_name: String,

        /// Watch without a snake
        #[arg(long)]
        viewer: bool,

        /// How long to wait for the game to be announced
        #[arg(long, default_value = "5")]
        wait_secs: u64,
    },
    /// Print the games currently announced
    List {
        #[arg(long, default_value = "3")]
        wait_secs: u64,
    },
}

#[derive(Args, Debug)]
struct Rules {
    /// Field width
    #[arg(short = 'w', long, default_value = "40")]
    width: i32,

    /// Field height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "30")]
    height: i32,

    /// Food kept on the field besides one per player
    #[arg(short = 'f', long, default_value = "1")]
    food_static: u32,

    /// Milliseconds between simulation ticks
    #[arg(short = 'd', long, default_value = "1000")]
    state_delay_ms: u64,
}

impl From<Rules> for GameConfig {
    fn from(rules: Rules) -> Self {
        GameConfig {
            width: rules.width,
            height: rules.height,
            food_static: rules.food_static,
            state_delay_ms: rules.state_delay_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let cli = Cli::parse();
    let settings = NetworkSettings {
        bind_addr: cli.bind,
        multicast_group: cli.group,
        ..NetworkSettings::default()
    };

    let (session, mut events) = Session::start(settings).await?;
    info!("Node bound to {}", session.local_addr());

    match cli.mode {
        Mode::Host {
            game_name,
            player_name,
            rules,
        } => {
            let config = GameConfig::from(rules);
            info!("Hosting {} ({}x{}, {} ms per tick)", game_name, config.width, config.height, config.state_delay_ms);
            session.start_new_game(game_name, player_name, config)?;
            play(&session, &mut events).await?;
        }
        Mode::Join {
            game_name,
            player_name,
            viewer,
            wait_secs,
        } => {
            session.discover()?;
            let game = wait_for_game(&mut events, &game_name, Duration::from_secs(wait_secs)).await?;
            let role = if viewer { NodeRole::Viewer } else { NodeRole::Normal };
            info!("Joining {} at {} as {:?}", game_name, game.address, role);
            session.join_game(game, player_name, role)?;
            play(&session, &mut events).await?;
        }
        Mode::List { wait_secs } => {
            session.discover()?;
            for game in collect_games(&mut events, Duration::from_secs(wait_secs)).await {
                let a = &game.announcement;
                println!(
                    "{:<20} {:<21} {}x{} {}ms players={} {}",
                    a.game_name,
                    game.address,
                    a.config.width,
                    a.config.height,
                    a.config.state_delay_ms,
                    a.players.len(),
                    if a.can_join { "open" } else { "full" }
                );
            }
        }
    }

    session.shutdown().await?;
    Ok(())
}

async fn wait_for_game(
    events: &mut mpsc::UnboundedReceiver<GameEvent>,
    name: &str,
    wait: Duration,
) -> Result<OngoingGame, Box<dyn std::error::Error>> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(GameEvent::GamesUpdated(games))) => {
                if let Some(game) = games.into_iter().find(|g| g.name() == name) {
                    return Ok(game);
                }
            }
            Ok(Some(_)) => {}
            Ok(None) => return Err("session stopped".into()),
            Err(_) => return Err(format!("no game named {} was announced", name).into()),
        }
    }
}

async fn collect_games(events: &mut mpsc::UnboundedReceiver<GameEvent>, wait: Duration) -> Vec<OngoingGame> {
    let deadline = tokio::time::Instant::now() + wait;
    let mut latest = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
        if let GameEvent::GamesUpdated(games) = event {
            latest = games;
        }
    }
    latest
}

/// Prints game events and forwards typed commands until the user quits.
async fn play(
    session: &Session,
    events: &mut mpsc::UnboundedReceiver<GameEvent>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Controls: w/a/s/d then Enter to steer, x to leave, q to quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut my_id = None;

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(GameEvent::StateUpdated { snapshot, players }) => {
                        println!("{}", rendering::render(&snapshot, &players, my_id));
                    }
                    Some(GameEvent::Joined { player_id }) => {
                        info!("Playing as {}", player_id);
                        my_id = Some(player_id);
                    }
                    Some(GameEvent::RoleChanged(role)) => info!("Now {:?}", role),
                    Some(GameEvent::Error(message)) => {
                        error!("{}", message);
                        if my_id.is_none() {
                            return Err(message.into());
                        }
                    }
                    Some(GameEvent::GamesUpdated(_)) => {}
                    None => break,
                }
            },

            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) => match parse_command(&line) {
                        Some(InputCommand::Steer(direction)) => session.change_direction(direction)?,
                        Some(InputCommand::Exit) => session.exit_game()?,
                        Some(InputCommand::Quit) => break,
                        None => warn!("Unknown command: {}", line.trim()),
                    },
                    None => {
                        info!("Stdin closed, watching until interrupted");
                        stdin_open = false;
                    }
                }
            },

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            },
        }
    }

    Ok(())
}
