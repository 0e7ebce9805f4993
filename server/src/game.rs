//! Canonical world state: every player's snake, the food cell, and the
//! grid bounds. The game loop is the only caller of `tick`/`snapshot`;
//! sessions reach in through `apply_direction`/`apply_respawn`. All of it
//! runs under one lock held by the caller, so a tick is never partially
//! visible.

use crate::snake::Snake;
use log::info;
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{Coord, Direction, ServerMessage, NO_FOOD, SPAWN_MARGIN};
use std::collections::BTreeMap;

pub struct World {
    snakes: BTreeMap<u32, Snake>,
    food: Coord,
    width: i32,
    height: i32,
}

impl World {
    pub fn new(width: i32, height: i32) -> Self {
        let mut world = Self {
            snakes: BTreeMap::new(),
            food: NO_FOOD,
            width,
            height,
        };
        world.relocate_food();
        world
    }

    /// Inserts a new snake for `id`. Ids are allocated by the acceptor and
    /// assumed unique; spawn overlap with existing snakes is not checked.
    pub fn add_player(&mut self, id: u32, x: i32, y: i32) {
        info!("Added player {} at ({}, {})", id, x, y);
        self.snakes.insert(id, Snake::new(id, x, y));
    }

    /// Marks the player's snake dead. The entry stays in the world so the
    /// final score remains visible in broadcasts.
    pub fn remove_player(&mut self, id: u32) {
        if let Some(snake) = self.snakes.get_mut(&id) {
            snake.is_alive = false;
            info!("Player {} retired, final score {}", id, snake.score);
        }
    }

    /// Steers a living snake. Unknown or dead players are silently ignored.
    pub fn apply_direction(&mut self, id: u32, direction: Direction) {
        if let Some(snake) = self.snakes.get_mut(&id) {
            if snake.is_alive {
                snake.set_direction(direction);
            }
        }
    }

    /// Respawns a dead snake at `(x, y)`. Ignored while the snake is alive
    /// or the player is unknown.
    pub fn apply_respawn(&mut self, id: u32, x: i32, y: i32) {
        if let Some(snake) = self.snakes.get_mut(&id) {
            if !snake.is_alive {
                snake.respawn(x, y);
                info!("Player {} respawned at ({}, {})", id, x, y);
            }
        }
    }

    /// A uniformly random coordinate within the interior spawn margin,
    /// as `(y, x)`. Falls back to the grid center on grids too small to
    /// hold the margin.
    pub fn random_spawn(&self) -> Coord {
        let mut rng = rand::thread_rng();
        let y = if self.height > 2 * SPAWN_MARGIN {
            rng.gen_range(SPAWN_MARGIN..self.height - SPAWN_MARGIN)
        } else {
            self.height / 2
        };
        let x = if self.width > 2 * SPAWN_MARGIN {
            rng.gen_range(SPAWN_MARGIN..self.width - SPAWN_MARGIN)
        } else {
            self.width / 2
        };
        (y, x)
    }

    /// Advances the simulation by one step.
    ///
    /// The alive set is snapshotted once at tick start: a snake that dies
    /// mid-tick still acts as an obstacle for snakes evaluated after it.
    /// Each snake's collision check runs against the bodies as they stand
    /// at that moment, so snakes earlier in id order have already moved and
    /// later ones have not. Head-on encounters therefore resolve
    /// asymmetrically by evaluation order; this matches the reference
    /// behavior and is kept on purpose.
    pub fn tick(&mut self) {
        let alive_ids: Vec<u32> = self
            .snakes
            .iter()
            .filter(|(_, snake)| snake.is_alive)
            .map(|(id, _)| *id)
            .collect();

        for &id in &alive_ids {
            let Some(mut snake) = self.snakes.get(&id).cloned() else {
                continue;
            };

            snake.advance();
            if snake.head() == self.food {
                snake.grow();
                // Make the grown body visible before choosing a new cell.
                self.snakes.insert(id, snake.clone());
                self.relocate_food();
            }

            {
                let others: Vec<&Snake> = alive_ids
                    .iter()
                    .filter(|&&other| other != id)
                    .filter_map(|other| self.snakes.get(other))
                    .collect();
                snake.check_collision(&others, self.width, self.height);
            }

            self.snakes.insert(id, snake);
        }
    }

    /// Moves the food to a uniformly random cell not covered by any alive
    /// snake. With no free cell left the food goes to the `NO_FOOD`
    /// sentinel until space opens up again.
    pub fn relocate_food(&mut self) {
        let occupied: Vec<Coord> = self
            .snakes
            .values()
            .filter(|snake| snake.is_alive)
            .flat_map(|snake| snake.body.iter().copied())
            .collect();

        let available: Vec<Coord> = (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| (y, x)))
            .filter(|cell| !occupied.contains(cell))
            .collect();

        let mut rng = rand::thread_rng();
        match available.choose(&mut rng) {
            Some(&cell) => self.food = cell,
            None => {
                info!("No space left to spawn food");
                self.food = NO_FOOD;
            }
        }
    }

    /// An immutable copy of every snake and the food cell, ready to be
    /// serialized outside the world lock.
    pub fn snapshot(&self) -> ServerMessage {
        ServerMessage::GameState {
            snakes: self
                .snakes
                .iter()
                .map(|(id, snake)| (*id, snake.state()))
                .collect(),
            food: self.food,
        }
    }
}
