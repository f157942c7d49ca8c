use crate::field::{Field, FieldError};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{Direction, GameConfig, GameSnapshot, PlayerId, PlayerScore};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub const SCORE_PER_FOOD: u32 = 1;
pub const SCORE_PER_KILL: u32 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GameError {
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error("no player with id {0}")]
    NoSuchPlayer(PlayerId),
}

/// A player that currently owns a live snake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
}

/// What a single [`Game::update`] changed that the caller has to act on.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    /// Players whose snake crashed this tick, in id order.
    pub dead_players: Vec<PlayerId>,
    /// Food items the top-up could not place for lack of free cells.
    pub food_shortfall: usize,
}

/// Field plus the players steering it and their scores.
pub struct Game {
    name: String,
    config: GameConfig,
    field: Field,
    players: BTreeMap<PlayerId, Player>,
    next_id: PlayerId,
    state_order: u64,
}

impl Game {
    /// Creates an empty game seeded from the operating system.
    ///
    /// # Arguments
    /// * `name` - Name announced to other nodes and checked on Join
    /// * `config` - Field size, static food and tick interval
    pub fn new(name: impl Into<String>, config: GameConfig) -> Self {
        Self::with_rng(name, config, StdRng::from_entropy())
    }

    /// Creates an empty game driven by the given random source.
    ///
    /// Spawn positions, facing and corpse food all draw from `rng`, so a
    /// seeded generator makes a whole game reproducible.
    pub fn with_rng(name: impl Into<String>, config: GameConfig, rng: StdRng) -> Self {
        Self {
            name: name.into(),
            field: Field::with_rng(config.width, config.height, rng),
            config,
            players: BTreeMap::new(),
            next_id: 1,
            state_order: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Number of ticks applied so far, also the order of the last snapshot.
    pub fn state_order(&self) -> u64 {
        self.state_order
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Hands out the next unused id. Viewers get one without a snake.
    pub fn generate_player_id(&mut self) -> PlayerId {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    /// Makes sure none of `ids` is handed out again.
    pub fn reserve_ids(&mut self, ids: impl IntoIterator<Item = PlayerId>) {
        if let Some(max) = ids.into_iter().max() {
            self.next_id = self.next_id.max(max.saturating_add(1));
        }
    }

    /// Whether the field still has a spot with enough clearance for a snake.
    pub fn can_add_player(&self) -> bool {
        self.field.can_place_new_snake()
    }

    /// Spawns a snake for a new player and returns the player's id.
    ///
    /// # Errors
    /// Returns `GameError::Field` with `NoSpawnSpace` when no cell has the
    /// required clearance. The id is consumed either way.
    pub fn new_player(&mut self, name: impl Into<String>) -> Result<PlayerId, GameError> {
        let id = self.generate_player_id();
        self.field.place_new_snake(id)?;
        let name = name.into();
        info!("Player {} ({}) joined game {}", id, name, self.name);
        self.players.insert(id, Player { id, name, score: 0 });
        Ok(id)
    }

    /// Drops the player and leaves its snake behind as a zombie.
    pub fn kill_player(&mut self, id: PlayerId) -> Option<Player> {
        self.field.set_zombie(id);
        let removed = self.players.remove(&id);
        if removed.is_some() {
            info!("Player {} left game {}", id, self.name);
        }
        removed
    }

    /// Queues a turn for the player's snake, applied on the next tick.
    pub fn change_direction(&mut self, id: PlayerId, direction: Direction) -> Result<(), GameError> {
        if !self.players.contains_key(&id) || !self.field.set_direction(id, direction) {
            return Err(GameError::NoSuchPlayer(id));
        }
        Ok(())
    }

    /// Advances the game by one tick.
    ///
    /// Moves every snake, credits food and kills, removes crashed players and
    /// tops up food to one per player plus `food_static`. A kill is only
    /// credited to a survivor, never to the victim or a snake that died in
    /// the same tick.
    pub fn update(&mut self) -> UpdateReport {
        let outcome = self.field.tick();
        self.state_order += 1;

        for id in &outcome.food_eaten {
            if let Some(player) = self.players.get_mut(id) {
                player.score += SCORE_PER_FOOD;
            }
        }

        let victims: BTreeSet<PlayerId> = outcome.deaths.iter().map(|d| d.victim).collect();
        for death in &outcome.deaths {
            for killer in &death.crashed_into {
                if *killer == death.victim || victims.contains(killer) {
                    continue;
                }
                if let Some(player) = self.players.get_mut(killer) {
                    player.score += SCORE_PER_KILL;
                }
            }
        }

        let mut report = UpdateReport::default();
        for victim in victims {
            if self.players.remove(&victim).is_some() {
                report.dead_players.push(victim);
            }
        }

        let wanted = self.players.len() + self.config.food_static as usize;
        let present = self.field.food_count();
        if wanted > present {
            match self.field.spawn_food(wanted - present) {
                Ok(spawn) => report.food_shortfall = spawn.shortfall(),
                Err(e) => {
                    debug!("Food top-up failed: {}", e);
                    report.food_shortfall = wanted - present;
                }
            }
        }

        report
    }

    /// Captures field, scores and state order for replication.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            state_order: self.state_order,
            field: self.field.snapshot(),
            players: self
                .players
                .values()
                .map(|p| PlayerScore {
                    id: p.id,
                    name: p.name.clone(),
                    score: p.score,
                })
                .collect(),
        }
    }

    /// Replaces the whole game with a snapshot received from the master.
    ///
    /// Every id in the snapshot is reserved so that this node, once promoted,
    /// never reuses one.
    ///
    /// # Errors
    /// Rejects a snapshot for a field of other dimensions or with
    /// inconsistent snakes, leaving the game unchanged.
    pub fn restore(&mut self, snapshot: &GameSnapshot) -> Result<(), GameError> {
        self.field.restore(&snapshot.field)?;
        self.players = snapshot
            .players
            .iter()
            .map(|p| {
                (
                    p.id,
                    Player {
                        id: p.id,
                        name: p.name.clone(),
                        score: p.score,
                    },
                )
            })
            .collect();
        self.reserve_ids(snapshot.players.iter().map(|p| p.id));
        self.state_order = snapshot.state_order;
        Ok(())
    }
}
