//! Plain-text view of a snapshot for terminals.

use shared::{GamePlayer, GameSnapshot, NodeRole, PlayerId, SnakeStatus};

const EMPTY: char = '.';
const FOOD: char = '*';
const OWN_HEAD: char = '@';
const OWN_BODY: char = 'o';
const ZOMBIE: char = 'z';

/// Letter used for other players' snakes; heads are upper case.
fn glyph(player_id: PlayerId, head: bool) -> char {
    let letter = (b'a' + (player_id % 26) as u8) as char;
    if head {
        letter.to_ascii_uppercase()
    } else {
        letter
    }
}

pub fn render_field(snapshot: &GameSnapshot, my_id: Option<PlayerId>) -> String {
    let field = &snapshot.field;
    let width = field.width.max(0) as usize;
    let height = field.height.max(0) as usize;
    let mut grid = vec![vec![EMPTY; width]; height];

    let mut put = |x: i32, y: i32, c: char| {
        if let Some(cell) = grid.get_mut(y as usize).and_then(|row| row.get_mut(x as usize)) {
            *cell = c;
        }
    };

    for food in &field.foods {
        put(food.x, food.y, FOOD);
    }
    for snake in &field.snakes {
        let own = Some(snake.player_id) == my_id;
        for (i, segment) in snake.body.iter().enumerate() {
            let head = i == 0;
            let c = match (own, snake.status) {
                (true, _) if head => OWN_HEAD,
                (true, _) => OWN_BODY,
                (false, SnakeStatus::Zombie) => ZOMBIE,
                (false, SnakeStatus::Alive) => glyph(snake.player_id, head),
            };
            put(segment.x, segment.y, c);
        }
    }

    let mut out = String::with_capacity((width + 1) * height);
    for row in grid {
        out.extend(row);
        out.push('\n');
    }
    out
}

/// Scoreboard, best first.
pub fn render_scores(players: &[GamePlayer], my_id: Option<PlayerId>) -> String {
    let mut sorted: Vec<&GamePlayer> = players.iter().collect();
    sorted.sort_by(|a, b| b.score.cmp(&a.score).then(a.id.cmp(&b.id)));

    let mut out = String::new();
    for player in sorted {
        let marker = if Some(player.id) == my_id { '>' } else { ' ' };
        let role = match player.role {
            NodeRole::Master => "master",
            NodeRole::Deputy => "deputy",
            NodeRole::Normal => "",
            NodeRole::Viewer => "viewer",
        };
        out.push_str(&format!("{} {:>4} {} {}\n", marker, player.score, player.name, role));
    }
    out
}

pub fn render(snapshot: &GameSnapshot, players: &[GamePlayer], my_id: Option<PlayerId>) -> String {
    format!(
        "state {}\n{}{}",
        snapshot.state_order,
        render_field(snapshot, my_id),
        render_scores(players, my_id)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Coord, Direction, FieldSnapshot, SnakeState};

    fn snapshot() -> GameSnapshot {
        GameSnapshot {
            state_order: 3,
            field: FieldSnapshot {
                width: 4,
                height: 2,
                snakes: vec![
                    SnakeState {
                        player_id: 1,
                        body: vec![Coord::new(1, 0), Coord::new(0, 0)],
                        direction: Direction::Right,
                        status: SnakeStatus::Alive,
                    },
                    SnakeState {
                        player_id: 2,
                        body: vec![Coord::new(3, 1), Coord::new(2, 1)],
                        direction: Direction::Right,
                        status: SnakeStatus::Alive,
                    },
                ],
                foods: vec![Coord::new(3, 0)],
            },
            players: Vec::new(),
        }
    }

    #[test]
    fn test_render_field() {
        assert_eq!(render_field(&snapshot(), Some(1)), "o@.*\n..cC\n");
    }

    #[test]
    fn test_render_scores_sorted() {
        let mut a = GamePlayer::new(1, "alice", None, NodeRole::Master);
        a.score = 2;
        let mut b = GamePlayer::new(2, "bob", None, NodeRole::Normal);
        b.score = 5;

        let text = render_scores(&[a, b], Some(1));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("bob"));
        assert!(lines[1].starts_with('>'));
    }
}
