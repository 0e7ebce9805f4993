use rand::Rng;
use shared::{Coord, Direction, INITIAL_SNAKE_LENGTH, SnakeState};

/// One player's snake: body segments (head first), heading, and score.
///
/// Snakes are never removed from the world. Death only clears `is_alive`;
/// the entry stays addressable for respawn and visible for score display.
#[derive(Debug, Clone)]
pub struct Snake {
    pub id: u32,
    pub body: Vec<Coord>,
    pub direction: Direction,
    pub is_alive: bool,
    pub score: u32,
}

impl Snake {
    /// Creates a snake headed right, with its body trailing left from `(x, y)`.
    pub fn new(id: u32, x: i32, y: i32) -> Self {
        Self {
            id,
            body: initial_body(x, y),
            direction: Direction::Right,
            is_alive: true,
            score: 0,
        }
    }

    pub fn head(&self) -> Coord {
        self.body[0]
    }

    /// Moves one cell along the current heading, preserving length.
    /// No-op while dead. Collision checks run after this, not inside it,
    /// so the head may momentarily sit outside the grid.
    pub fn advance(&mut self) {
        if !self.is_alive {
            return;
        }
        let (head_y, head_x) = self.head();
        let (dy, dx) = self.direction.offset();
        self.body.insert(0, (head_y + dy, head_x + dx));
        self.body.pop();
    }

    /// Duplicates the tail segment and bumps the score. Called when the
    /// head has just landed on the food cell.
    pub fn grow(&mut self) {
        if let Some(&tail) = self.body.last() {
            self.body.push(tail);
        }
        self.score += 1;
    }

    /// Applies a steering change, rejecting 180-degree turns. A length-1
    /// snake has no segment behind the head and may reverse freely.
    pub fn set_direction(&mut self, direction: Direction) {
        if self.body.len() > 1 && direction == self.direction.opposite() {
            return;
        }
        self.direction = direction;
    }

    /// Marks the snake dead if its head is out of bounds, inside its own
    /// body, or inside any of `others`. Must run against already-moved
    /// bodies, immediately after `advance`/`grow`.
    pub fn check_collision(&mut self, others: &[&Snake], width: i32, height: i32) {
        let (head_y, head_x) = self.head();

        if !(0..height).contains(&head_y) || !(0..width).contains(&head_x) {
            self.is_alive = false;
            return;
        }

        if self.body[1..].contains(&self.head()) {
            self.is_alive = false;
            return;
        }

        for other in others {
            if other.body.contains(&self.head()) {
                self.is_alive = false;
                return;
            }
        }
    }

    /// Resets to the initial layout at `(x, y)` with a random heading,
    /// alive and with a zeroed score.
    pub fn respawn(&mut self, x: i32, y: i32) {
        let mut rng = rand::thread_rng();
        self.body = initial_body(x, y);
        self.direction = Direction::ALL[rng.gen_range(0..Direction::ALL.len())];
        self.is_alive = true;
        self.score = 0;
    }

    /// Copies the broadcast-visible fields into their wire representation.
    pub fn state(&self) -> SnakeState {
        SnakeState {
            body: self.body.clone(),
            is_alive: self.is_alive,
            score: self.score,
        }
    }
}

fn initial_body(x: i32, y: i32) -> Vec<Coord> {
    (0..INITIAL_SNAKE_LENGTH).map(|i| (y, x - i)).collect()
}
