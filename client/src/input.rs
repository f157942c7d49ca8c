//! Keyboard commands read line by line from stdin.

use shared::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputCommand {
    Steer(Direction),
    /// Leave the game but keep the process running.
    Exit,
    Quit,
}

/// Parses one line of input. Both WASD and arrow words are understood.
pub fn parse_command(line: &str) -> Option<InputCommand> {
    let command = match line.trim().to_ascii_lowercase().as_str() {
        "w" | "up" => InputCommand::Steer(Direction::Up),
        "s" | "down" => InputCommand::Steer(Direction::Down),
        "a" | "left" => InputCommand::Steer(Direction::Left),
        "d" | "right" => InputCommand::Steer(Direction::Right),
        "x" | "exit" | "leave" => InputCommand::Exit,
        "q" | "quit" => InputCommand::Quit,
        _ => return None,
    };
    Some(command)
}
