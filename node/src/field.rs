//! Toroidal grid on which snakes move, eat, grow and crash.
//!
//! The field knows nothing about players, scores or the network. Callers
//! drive it with [`Field::tick`] and read the outcome as plain data.

use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{Coord, Direction, FieldSnapshot, PlayerId, SnakeState, SnakeStatus};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;

/// Chance that a cell freed by a dead snake turns into food.
pub const CORPSE_FOOD_PROBABILITY: f64 = 0.5;

/// Half extents of the clearance box a new snake needs around its head.
const SPAWN_CLEARANCE_X: i32 = 2;
const SPAWN_CLEARANCE_Y: i32 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("no free cell left for food")]
    NoFreeCells,
    #[error("no space left for a new snake")]
    NoSpawnSpace,
    #[error("snake {0} is already on the field")]
    SnakeExists(PlayerId),
    #[error("snapshot is {actual_width}x{actual_height}, field is {width}x{height}")]
    DimensionMismatch {
        width: i32,
        height: i32,
        actual_width: i32,
        actual_height: i32,
    },
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

#[derive(Debug, Default, Clone)]
struct Cell {
    /// One entry per body segment standing here.
    occupants: Vec<PlayerId>,
    food: bool,
}

impl Cell {
    fn is_free(&self) -> bool {
        !self.food && self.occupants.is_empty()
    }

    fn leave(&mut self, player_id: PlayerId) {
        if let Some(pos) = self.occupants.iter().position(|&id| id == player_id) {
            self.occupants.swap_remove(pos);
        }
    }
}

#[derive(Debug, Clone)]
struct Snake {
    body: VecDeque<Coord>,
    direction: Direction,
    pending: Option<Direction>,
    status: SnakeStatus,
}

impl Snake {
    fn head(&self) -> Coord {
        self.body[0]
    }
}

/// A snake that crashed during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Death {
    pub victim: PlayerId,
    /// Owners of the other segments found in the victim's head cell. Contains
    /// the victim itself on a self-collision.
    pub crashed_into: BTreeSet<PlayerId>,
}

/// Everything that happened during one [`Field::tick`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    /// Crashes in ascending victim id order.
    pub deaths: Vec<Death>,
    /// One entry per snake that ate this tick.
    pub food_eaten: Vec<PlayerId>,
}

/// Result of [`Field::spawn_food`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoodSpawn {
    pub requested: usize,
    pub spawned: usize,
}

impl FoodSpawn {
    pub fn shortfall(&self) -> usize {
        self.requested - self.spawned
    }
}

/// The grid itself. Both axes wrap around.
pub struct Field {
    width: i32,
    height: i32,
    cells: HashMap<Coord, Cell>,
    snakes: BTreeMap<PlayerId, Snake>,
    rng: StdRng,
}

impl Field {
    /// Creates an empty field.
    ///
    /// # Arguments
    /// * `width`, `height` - Grid size in cells, already validated by the config
    /// * `rng` - Source for spawn spots, snake facing and corpse food
    pub fn with_rng(width: i32, height: i32, rng: StdRng) -> Self {
        Self {
            width,
            height,
            cells: HashMap::new(),
            snakes: BTreeMap::new(),
            rng,
        }
    }

    pub fn food_count(&self) -> usize {
        self.cells.values().filter(|c| c.food).count()
    }

    fn wrap(&self, x: i32, y: i32) -> Coord {
        Coord::new(x.rem_euclid(self.width), y.rem_euclid(self.height))
    }

    fn step(&self, from: Coord, direction: Direction) -> Coord {
        let (dx, dy) = direction.delta();
        self.wrap(from.x + dx, from.y + dy)
    }

    fn all_coords(&self) -> impl Iterator<Item = Coord> + '_ {
        (0..self.width).flat_map(move |x| (0..self.height).map(move |y| Coord::new(x, y)))
    }

    fn is_free(&self, coord: &Coord) -> bool {
        self.cells.get(coord).map_or(true, Cell::is_free)
    }

    fn occupy(&mut self, coord: Coord, player_id: PlayerId) {
        self.cells.entry(coord).or_default().occupants.push(player_id);
    }

    fn vacate(&mut self, coord: Coord, player_id: PlayerId) {
        if let Some(cell) = self.cells.get_mut(&coord) {
            cell.leave(player_id);
            if cell.is_free() {
                self.cells.remove(&coord);
            }
        }
    }

    /// Queues a turn for the next tick. An exact reversal is dropped when the
    /// tick resolves it.
    pub fn set_direction(&mut self, player_id: PlayerId, direction: Direction) -> bool {
        match self.snakes.get_mut(&player_id) {
            Some(snake) if snake.status == SnakeStatus::Alive => {
                snake.pending = Some(direction);
                true
            }
            _ => false,
        }
    }

    /// Hands the snake over to nobody. It keeps crawling straight ahead.
    pub fn set_zombie(&mut self, player_id: PlayerId) {
        if let Some(snake) = self.snakes.get_mut(&player_id) {
            snake.status = SnakeStatus::Zombie;
            snake.pending = None;
        }
    }

    /// Moves every snake one cell and resolves what happened.
    ///
    /// Zombies move like live snakes. All snakes move first, then every head
    /// sharing a cell with another segment crashes, so head-on collisions
    /// kill both. Each cell freed by a crashed snake turns into food with
    /// probability [`CORPSE_FOOD_PROBABILITY`].
    pub fn tick(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        let ids: Vec<PlayerId> = self.snakes.keys().copied().collect();

        for id in &ids {
            let Some(snake) = self.snakes.get_mut(id) else {
                continue;
            };
            if let Some(next) = snake.pending.take() {
                if next != snake.direction.opposite() {
                    snake.direction = next;
                }
            }
            let (head, direction) = (snake.head(), snake.direction);
            let new_head = self.step(head, direction);

            let ate = self.cells.get(&new_head).map_or(false, |c| c.food);
            if ate {
                if let Some(cell) = self.cells.get_mut(&new_head) {
                    cell.food = false;
                }
                outcome.food_eaten.push(*id);
            } else if let Some(tail) = self.snakes.get_mut(id).and_then(|s| s.body.pop_back()) {
                self.vacate(tail, *id);
            }
            self.occupy(new_head, *id);
            if let Some(snake) = self.snakes.get_mut(id) {
                snake.body.push_front(new_head);
            }
        }

        for (id, snake) in &self.snakes {
            let Some(cell) = self.cells.get(&snake.head()) else {
                continue;
            };
            if cell.occupants.len() <= 1 {
                continue;
            }
            let mut others = cell.occupants.clone();
            if let Some(pos) = others.iter().position(|o| o == id) {
                others.swap_remove(pos);
            }
            outcome.deaths.push(Death {
                victim: *id,
                crashed_into: others.into_iter().collect(),
            });
        }

        let mut vacated = HashSet::new();
        for death in &outcome.deaths {
            if let Some(snake) = self.snakes.remove(&death.victim) {
                for coord in snake.body {
                    self.vacate(coord, death.victim);
                    vacated.insert(coord);
                }
            }
        }
        let mut vacated: Vec<Coord> = vacated.into_iter().collect();
        vacated.sort();
        for coord in vacated {
            if self.is_free(&coord) && self.rng.gen_bool(CORPSE_FOOD_PROBABILITY) {
                self.cells.entry(coord).or_default().food = true;
            }
        }

        if !outcome.deaths.is_empty() {
            debug!("Field tick: {} snake(s) crashed", outcome.deaths.len());
        }
        outcome
    }

    /// Puts up to `count` food items on distinct free cells.
    ///
    /// Only a field with no free cell at all is an error; a partial placement
    /// is reported through [`FoodSpawn::shortfall`].
    pub fn spawn_food(&mut self, count: usize) -> Result<FoodSpawn, FieldError> {
        if count == 0 {
            return Ok(FoodSpawn {
                requested: 0,
                spawned: 0,
            });
        }
        let free: Vec<Coord> = self.all_coords().filter(|c| self.is_free(c)).collect();
        if free.is_empty() {
            return Err(FieldError::NoFreeCells);
        }
        let chosen: Vec<Coord> = free
            .choose_multiple(&mut self.rng, count.min(free.len()))
            .copied()
            .collect();
        for coord in &chosen {
            self.cells.entry(*coord).or_default().food = true;
        }
        Ok(FoodSpawn {
            requested: count,
            spawned: chosen.len(),
        })
    }

    fn spawn_candidates(&self) -> Vec<Coord> {
        let mut blocked = HashSet::new();
        for coord in self.cells.keys() {
            for dx in -SPAWN_CLEARANCE_X..=SPAWN_CLEARANCE_X {
                for dy in -SPAWN_CLEARANCE_Y..=SPAWN_CLEARANCE_Y {
                    blocked.insert(self.wrap(coord.x + dx, coord.y + dy));
                }
            }
        }
        self.all_coords().filter(|c| !blocked.contains(c)).collect()
    }

    pub fn can_place_new_snake(&self) -> bool {
        !self.spawn_candidates().is_empty()
    }

    /// Spawns a two-segment snake on a random cell with enough clearance.
    pub fn place_new_snake(&mut self, player_id: PlayerId) -> Result<(), FieldError> {
        if self.snakes.contains_key(&player_id) {
            return Err(FieldError::SnakeExists(player_id));
        }
        let candidates = self.spawn_candidates();
        let head = *candidates
            .choose(&mut self.rng)
            .ok_or(FieldError::NoSpawnSpace)?;
        let direction = Direction::ALL[self.rng.gen_range(0..Direction::ALL.len())];
        let tail = self.step(head, direction.opposite());

        self.occupy(head, player_id);
        self.occupy(tail, player_id);
        self.snakes.insert(
            player_id,
            Snake {
                body: VecDeque::from(vec![head, tail]),
                direction,
                pending: None,
                status: SnakeStatus::Alive,
            },
        );
        debug!("Placed snake {} at ({}, {}) facing {:?}", player_id, head.x, head.y, direction);
        Ok(())
    }

    /// Captures snakes and food. Food is listed in coordinate order.
    pub fn snapshot(&self) -> FieldSnapshot {
        let snakes = self
            .snakes
            .iter()
            .map(|(id, snake)| SnakeState {
                player_id: *id,
                body: snake.body.iter().copied().collect(),
                direction: snake.direction,
                status: snake.status,
            })
            .collect();
        let mut foods: Vec<Coord> = self
            .cells
            .iter()
            .filter(|(_, cell)| cell.food)
            .map(|(coord, _)| *coord)
            .collect();
        foods.sort();

        FieldSnapshot {
            width: self.width,
            height: self.height,
            snakes,
            foods,
        }
    }

    /// Replaces the whole field with the given snapshot. The field is left
    /// untouched when the snapshot is rejected.
    pub fn restore(&mut self, snapshot: &FieldSnapshot) -> Result<(), FieldError> {
        if snapshot.width != self.width || snapshot.height != self.height {
            return Err(FieldError::DimensionMismatch {
                width: self.width,
                height: self.height,
                actual_width: snapshot.width,
                actual_height: snapshot.height,
            });
        }
        let in_bounds = |c: &Coord| (0..self.width).contains(&c.x) && (0..self.height).contains(&c.y);

        let mut cells: HashMap<Coord, Cell> = HashMap::new();
        let mut snakes = BTreeMap::new();
        for food in &snapshot.foods {
            if !in_bounds(food) {
                return Err(FieldError::InvalidSnapshot(format!(
                    "food at ({}, {}) is off the field",
                    food.x, food.y
                )));
            }
            cells.entry(*food).or_default().food = true;
        }
        for state in &snapshot.snakes {
            if state.body.is_empty() {
                return Err(FieldError::InvalidSnapshot(format!(
                    "snake {} has no body",
                    state.player_id
                )));
            }
            if let Some(c) = state.body.iter().find(|c| !in_bounds(c)) {
                return Err(FieldError::InvalidSnapshot(format!(
                    "snake {} has a segment at ({}, {})",
                    state.player_id, c.x, c.y
                )));
            }
            for coord in &state.body {
                let cell = cells.entry(*coord).or_default();
                cell.food = false;
                cell.occupants.push(state.player_id);
            }
            let previous = snakes.insert(
                state.player_id,
                Snake {
                    body: state.body.iter().copied().collect(),
                    direction: state.direction,
                    pending: None,
                    status: state.status,
                },
            );
            if previous.is_some() {
                return Err(FieldError::InvalidSnapshot(format!(
                    "snake {} appears twice",
                    state.player_id
                )));
            }
        }

        self.cells = cells;
        self.snakes = snakes;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn field(width: i32, height: i32) -> Field {
        Field::with_rng(width, height, StdRng::seed_from_u64(7))
    }

    fn snake(id: PlayerId, body: &[(i32, i32)], direction: Direction) -> SnakeState {
        SnakeState {
            player_id: id,
            body: body.iter().map(|&(x, y)| Coord::new(x, y)).collect(),
            direction,
            status: SnakeStatus::Alive,
        }
    }

    fn with_state(width: i32, height: i32, snakes: Vec<SnakeState>, foods: &[(i32, i32)]) -> Field {
        let mut f = field(width, height);
        f.restore(&FieldSnapshot {
            width,
            height,
            snakes,
            foods: foods.iter().map(|&(x, y)| Coord::new(x, y)).collect(),
        })
        .unwrap();
        f
    }

    #[test]
    fn test_wraps_around_right_edge() {
        let mut f = with_state(10, 10, vec![snake(1, &[(9, 5), (8, 5)], Direction::Right)], &[]);
        let outcome = f.tick();
        assert!(outcome.deaths.is_empty());

        let snap = f.snapshot();
        let s = snap.snake(1).unwrap();
        assert_eq!(s.body, vec![Coord::new(0, 5), Coord::new(9, 5)]);
    }

    #[test]
    fn test_reverse_direction_is_ignored() {
        let mut f = with_state(10, 10, vec![snake(1, &[(5, 5), (4, 5)], Direction::Right)], &[]);
        assert!(f.set_direction(1, Direction::Left));
        f.tick();

        let snap = f.snapshot();
        let s = snap.snake(1).unwrap();
        assert_eq!(s.direction, Direction::Right);
        assert_eq!(s.head(), Some(Coord::new(6, 5)));
    }

    #[test]
    fn test_turn_applies_on_next_tick() {
        let mut f = with_state(10, 10, vec![snake(1, &[(5, 5), (4, 5)], Direction::Right)], &[]);
        f.set_direction(1, Direction::Up);
        f.tick();

        let snap = f.snapshot();
        assert_eq!(snap.snake(1).unwrap().head(), Some(Coord::new(5, 4)));
    }

    #[test]
    fn test_growth_keeps_tail() {
        let mut f = with_state(
            10,
            10,
            vec![snake(1, &[(5, 5), (4, 5)], Direction::Right)],
            &[(6, 5)],
        );
        let outcome = f.tick();
        assert_eq!(outcome.food_eaten, vec![1]);

        let snap = f.snapshot();
        let s = snap.snake(1).unwrap();
        assert_eq!(s.body.len(), 3);
        assert!(s.body.contains(&Coord::new(4, 5)));
        assert!(snap.foods.is_empty());
    }

    #[test]
    fn test_head_on_collision_kills_both() {
        let mut f = with_state(
            10,
            10,
            vec![
                snake(1, &[(4, 5), (3, 5)], Direction::Right),
                snake(2, &[(6, 5), (7, 5)], Direction::Left),
            ],
            &[],
        );
        let outcome = f.tick();
        assert_eq!(outcome.deaths.len(), 2);
        let victims: Vec<PlayerId> = outcome.deaths.iter().map(|d| d.victim).collect();
        assert_eq!(victims, vec![1, 2]);
        assert_eq!(outcome.deaths[0].crashed_into, BTreeSet::from([2]));
        assert_eq!(outcome.deaths[1].crashed_into, BTreeSet::from([1]));
        assert!(f.snapshot().snakes.is_empty());
    }

    #[test]
    fn test_self_collision() {
        // A five-long snake turning into its own body.
        let mut f = with_state(
            10,
            10,
            vec![snake(
                1,
                &[(5, 5), (5, 6), (6, 6), (6, 5), (6, 4)],
                Direction::Up,
            )],
            &[],
        );
        f.set_direction(1, Direction::Right);
        let outcome = f.tick();
        assert_eq!(outcome.deaths.len(), 1);
        assert_eq!(outcome.deaths[0].victim, 1);
        assert_eq!(outcome.deaths[0].crashed_into, BTreeSet::from([1]));
    }

    #[test]
    fn test_following_own_tail_is_safe() {
        let mut f = with_state(
            10,
            10,
            vec![snake(1, &[(5, 5), (5, 6), (6, 6), (6, 5)], Direction::Up)],
            &[],
        );
        f.set_direction(1, Direction::Right);
        let outcome = f.tick();
        assert!(outcome.deaths.is_empty());
    }

    #[test]
    fn test_corpse_cells_never_overlap_snakes() {
        let mut f = with_state(
            10,
            10,
            vec![
                snake(1, &[(4, 5), (3, 5), (2, 5)], Direction::Right),
                snake(2, &[(5, 4), (5, 3)], Direction::Down),
                snake(3, &[(5, 6), (5, 7), (5, 8)], Direction::Up),
            ],
            &[],
        );
        f.tick();
        let snap = f.snapshot();
        for food in &snap.foods {
            assert!(snap.snakes.iter().all(|s| !s.body.contains(food)));
        }
    }

    #[test]
    fn test_zombie_keeps_moving() {
        let mut f = with_state(10, 10, vec![snake(1, &[(5, 5), (4, 5)], Direction::Right)], &[]);
        f.set_zombie(1);
        assert!(!f.set_direction(1, Direction::Up));
        f.tick();

        let snap = f.snapshot();
        let s = snap.snake(1).unwrap();
        assert_eq!(s.status, SnakeStatus::Zombie);
        assert_eq!(s.head(), Some(Coord::new(6, 5)));
    }

    #[test]
    fn test_spawn_food_partial_and_full() {
        let mut f = field(10, 10);
        let spawn = f.spawn_food(3).unwrap();
        assert_eq!(spawn.spawned, 3);
        assert_eq!(f.food_count(), 3);

        let spawn = f.spawn_food(200).unwrap();
        assert_eq!(spawn.spawned, 97);
        assert_eq!(spawn.shortfall(), 103);
        assert_eq!(f.food_count(), 100);

        assert_eq!(f.spawn_food(1), Err(FieldError::NoFreeCells));
    }

    #[test]
    fn test_place_new_snake_clearance() {
        let mut f = field(10, 10);
        f.place_new_snake(1).unwrap();
        let snap = f.snapshot();
        let s = snap.snake(1).unwrap();
        assert_eq!(s.body.len(), 2);
        let (dx, dy) = s.direction.delta();
        let head = s.body[0];
        assert_eq!(
            s.body[1],
            Coord::new((head.x - dx).rem_euclid(10), (head.y - dy).rem_euclid(10))
        );

        assert_eq!(f.place_new_snake(1), Err(FieldError::SnakeExists(1)));
    }

    #[test]
    fn test_place_new_snake_without_room() {
        let mut f = field(10, 10);
        // Every third column holds food, so every cell is within two columns of one.
        let foods: Vec<Coord> = (0..10)
            .step_by(3)
            .flat_map(|x| (0..10).map(move |y| Coord::new(x, y)))
            .collect();
        f.restore(&FieldSnapshot {
            width: 10,
            height: 10,
            snakes: vec![],
            foods,
        })
        .unwrap();

        assert!(!f.can_place_new_snake());
        assert_eq!(f.place_new_snake(1), Err(FieldError::NoSpawnSpace));
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut f = field(20, 15);
        f.place_new_snake(1).unwrap();
        f.place_new_snake(2).unwrap();
        f.spawn_food(4).unwrap();
        f.tick();
        let snap = f.snapshot();

        let mut other = field(20, 15);
        other.restore(&snap).unwrap();
        assert_eq!(other.snapshot(), snap);
    }

    #[test]
    fn test_restore_rejects_other_dimensions() {
        let mut f = field(10, 10);
        let result = f.restore(&FieldSnapshot {
            width: 12,
            height: 10,
            snakes: vec![],
            foods: vec![],
        });
        assert!(matches!(result, Err(FieldError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_restore_rejects_off_field_segment() {
        let mut f = field(10, 10);
        let result = f.restore(&FieldSnapshot {
            width: 10,
            height: 10,
            snakes: vec![snake(1, &[(10, 0), (9, 0)], Direction::Right)],
            foods: vec![],
        });
        assert!(matches!(result, Err(FieldError::InvalidSnapshot(_))));
    }
}
