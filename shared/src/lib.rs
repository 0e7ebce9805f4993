use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const GRID_WIDTH: i32 = 40;
pub const GRID_HEIGHT: i32 = 20;
pub const INITIAL_SNAKE_LENGTH: i32 = 3;
pub const SPAWN_MARGIN: i32 = 5;
pub const DEFAULT_TICK_RATE: u32 = 10;

/// Grid coordinate as `(y, x)`, matching the `[y, x]` pairs on the wire.
pub type Coord = (i32, i32);

/// Food position broadcast when no free cell is left on the grid.
pub const NO_FOOD: Coord = (-1, -1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Unit offset as `(dy, dx)`.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }
}

/// A decoded client command.
///
/// Clients send bare tokens, one per frame. Anything outside this vocabulary
/// is not a command and gets dropped by the session without a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Direction(Direction),
    Respawn,
}

impl Command {
    /// Parses a raw frame into a command. Case-insensitive; surrounding
    /// whitespace is ignored. Returns `None` for anything unrecognized.
    pub fn parse(frame: &str) -> Option<Command> {
        match frame.trim().to_ascii_uppercase().as_str() {
            "UP" => Some(Command::Direction(Direction::Up)),
            "DOWN" => Some(Command::Direction(Direction::Down)),
            "LEFT" => Some(Command::Direction(Direction::Left)),
            "RIGHT" => Some(Command::Direction(Direction::Right)),
            "RESPAWN" => Some(Command::Respawn),
            _ => None,
        }
    }
}

/// Per-snake view inside a `game_state` broadcast.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SnakeState {
    pub body: Vec<Coord>,
    pub is_alive: bool,
    pub score: u32,
}

/// Server-to-client messages, one JSON object per newline-delimited frame.
///
/// The `BTreeMap` keeps snake ids in ascending order so every broadcast
/// serializes deterministically.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        player_id: u32,
    },
    GameState {
        #[serde(deserialize_with = "snake_ids_from_strings")]
        snakes: BTreeMap<u32, SnakeState>,
        food: Coord,
    },
}

/// Maps the wire's string-keyed `snakes` object back to numeric ids.
///
/// JSON object keys are always strings, and the internally-tagged
/// `ServerMessage` buffers its content before dispatching on `type`, so the
/// buffered keys have to be parsed into `u32` explicitly here.
fn snake_ids_from_strings<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<u32, SnakeState>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, SnakeState>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(id, snake)| {
            id.parse::<u32>()
                .map(|id| (id, snake))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}
