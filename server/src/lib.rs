//! # Snake Game Server Library
//!
//! Authoritative server for the multiplayer snake game. A single process
//! holds the canonical world state (snakes, food, scores), advances it at a
//! fixed tick rate, and broadcasts JSON snapshots to every connected client
//! over newline-delimited TCP frames.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! All movement, growth, collision, and respawn decisions are made here.
//! Clients send steering intents only; the server never trusts
//! client-reported state.
//!
//! ### Session Management
//! Each accepted connection gets a stable player id, a freshly spawned
//! snake, and its own reader/writer tasks. Disconnects mark the snake dead
//! but never delete it, so final scores remain visible to other players.
//!
//! ### State Broadcasting
//! Once per tick the game loop snapshots the world under its lock,
//! serializes the snapshot outside it, and fans the frame out through
//! bounded per-session channels. A frozen client overflows only its own
//! channel and is disconnected; the simulation and other peers never wait.
//!
//! ## Concurrency Model
//!
//! The world sits behind a single `Arc<RwLock<World>>`, taken for writing
//! by every mutation: the game loop's tick-and-snapshot, session command
//! application, and connection setup/teardown. That one exclusion scope is
//! the whole synchronization story; contention is per-tick and
//! per-keystroke, so nothing finer-grained is needed. Socket I/O always
//! happens outside the lock.
//!
//! Shutdown is cooperative: a `watch` channel flips to true (Ctrl-C in the
//! binary) and the accept loop, the game loop, and every session read loop
//! observe it at the top of their next iteration.
//!
//! ## Module Organization
//!
//! - [`snake`]: one player's body, heading, and the movement/growth/
//!   collision/respawn rules.
//! - [`game`]: the `World` aggregate and its tick, food, and snapshot
//!   operations.
//! - [`session`]: the session registry and per-client outbound channels.
//! - [`network`]: the TCP acceptor, connection handling, and the game loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//!     // Bind on the default endpoint at 10 ticks per second on a 40x20 grid.
//!     let server = Server::bind("0.0.0.0:12345", 10, 40, 20, shutdown_rx).await?;
//!
//!     // Runs the accept loop and the game loop until the flag flips.
//!     server.run().await
//! }
//! ```

pub mod game;
pub mod network;
pub mod session;
pub mod snake;
