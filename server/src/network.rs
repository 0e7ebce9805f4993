//! TCP acceptor, per-connection session tasks, and the fixed-rate game loop

use crate::game::World;
use crate::session::SessionRegistry;
use log::{debug, error, info, warn};
use shared::{Command, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Main server owning the world, the session registry, and the listener.
///
/// `run` drives the accept loop on the caller's task and the game loop on a
/// spawned one; every per-connection session gets its own reader and writer
/// tasks. All of them exit when the shutdown flag flips to true.
pub struct Server {
    listener: TcpListener,
    world: Arc<RwLock<World>>,
    sessions: Arc<RwLock<SessionRegistry>>,
    tick_rate: u32,
    shutdown: watch::Receiver<bool>,
}

impl Server {
    pub async fn bind(
        addr: &str,
        tick_rate: u32,
        width: i32,
        height: i32,
        shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            world: Arc::new(RwLock::new(World::new(width, height))),
            sessions: Arc::new(RwLock::new(SessionRegistry::new())),
            tick_rate,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until shutdown. Each accepted socket gets a
    /// player id, a freshly spawned snake, and its own session tasks.
    pub async fn run(mut self) -> std::io::Result<()> {
        let game_loop = tokio::spawn(run_game_loop(
            Arc::clone(&self.world),
            Arc::clone(&self.sessions),
            self.tick_rate,
            self.shutdown.clone(),
        ));

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let (player_id, outbound, retired) = {
                            let mut sessions = self.sessions.write().await;
                            sessions.register()
                        };
                        {
                            let mut world = self.world.write().await;
                            let (y, x) = world.random_spawn();
                            world.add_player(player_id, x, y);
                        }
                        info!("Player {} connected from {}", player_id, peer);

                        tokio::spawn(handle_connection(
                            stream,
                            player_id,
                            Arc::clone(&self.world),
                            Arc::clone(&self.sessions),
                            outbound,
                            retired,
                            self.shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
            }
        }

        info!("Acceptor stopped");
        let _ = game_loop.await;
        Ok(())
    }
}

/// Advances the world and fans out a snapshot at a fixed cadence.
///
/// `tick` and `snapshot` run under one write guard, so every broadcast is a
/// consistent view of exactly one tick. Serialization and delivery happen
/// after the guard is released; a slow client can only back up its own
/// bounded channel. `MissedTickBehavior::Delay` gives the
/// sleep-the-remainder pacing with no drift compensation under overload.
async fn run_game_loop(
    world: Arc<RwLock<World>>,
    sessions: Arc<RwLock<SessionRegistry>>,
    tick_rate: u32,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(Duration::from_secs_f64(1.0 / f64::from(tick_rate)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        let snapshot = {
            let mut world = world.write().await;
            world.tick();
            world.snapshot()
        };

        let frame = match serde_json::to_string(&snapshot) {
            Ok(mut text) => {
                text.push('\n');
                text
            }
            Err(e) => {
                error!("Failed to serialize snapshot: {}", e);
                continue;
            }
        };

        broadcast_frame(&world, &sessions, frame).await;
    }

    info!("Game loop stopped");
}

/// Best-effort delivery of one frame to every registered session. Each
/// attempt is independent; sessions whose channel is full or closed are
/// pruned and their snake marked dead, never stalling the remaining peers.
async fn broadcast_frame(
    world: &Arc<RwLock<World>>,
    sessions: &Arc<RwLock<SessionRegistry>>,
    frame: String,
) {
    let targets = {
        let sessions = sessions.read().await;
        sessions.senders()
    };

    let mut stale = Vec::new();
    for (player_id, sender) in targets {
        match sender.try_send(frame.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Player {} cannot keep up with broadcasts, pruning", player_id);
                stale.push(player_id);
            }
            Err(TrySendError::Closed(_)) => stale.push(player_id),
        }
    }

    for player_id in stale {
        sessions.write().await.unregister(player_id);
        world.write().await.remove_player(player_id);
    }
}

/// Runs one client session: welcome handshake, a writer task draining the
/// outbound channel, and the command read loop until EOF, read error,
/// shutdown, or the session's retire signal (fired when broadcast pruning
/// unregisters it). Teardown marks the snake dead and unregisters the
/// session; the snake entry itself stays in the world.
async fn handle_connection(
    stream: TcpStream,
    player_id: u32,
    world: Arc<RwLock<World>>,
    sessions: Arc<RwLock<SessionRegistry>>,
    outbound: mpsc::Receiver<String>,
    mut retired: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (reader, mut writer) = stream.into_split();

    // One-time identity message, before any broadcast frame goes out.
    if let Ok(text) = serde_json::to_string(&ServerMessage::Welcome { player_id }) {
        if writer.write_all((text + "\n").as_bytes()).await.is_err() {
            debug!("Failed to send welcome to player {}", player_id);
        }
    }

    tokio::spawn(write_outbound(writer, outbound, player_id));

    let mut lines = BufReader::new(reader).lines();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            // Resolves with Err when the registry drops the session handle.
            _ = retired.changed() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_frame(player_id, &line, &world).await,
                Ok(None) => break,
                Err(e) => {
                    debug!("Read error for player {}: {}", player_id, e);
                    break;
                }
            },
        }
    }

    info!("Player {} disconnected", player_id);
    sessions.write().await.unregister(player_id);
    world.write().await.remove_player(player_id);
}

/// Applies one decoded frame to the world. Empty frames and anything
/// outside the command vocabulary are dropped without a response.
async fn handle_frame(player_id: u32, frame: &str, world: &Arc<RwLock<World>>) {
    if frame.trim().is_empty() {
        return;
    }

    match Command::parse(frame) {
        Some(Command::Direction(direction)) => {
            world.write().await.apply_direction(player_id, direction);
        }
        Some(Command::Respawn) => {
            let mut world = world.write().await;
            let (y, x) = world.random_spawn();
            world.apply_respawn(player_id, x, y);
        }
        None => {
            debug!(
                "Dropping unknown frame from player {}: {:?}",
                player_id,
                frame.trim()
            );
        }
    }
}

/// Drains the session's outbound channel to the socket. Ends when the
/// channel closes (teardown or pruning) or the first write fails; the
/// broadcast path then sees the closed channel and prunes the session.
async fn write_outbound(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<String>,
    player_id: u32,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = writer.write_all(frame.as_bytes()).await {
            debug!("Write failed for player {}: {}", player_id, e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::OUTBOUND_CAPACITY;
    use tokio::time::{sleep, timeout};

    fn test_state() -> (Arc<RwLock<World>>, Arc<RwLock<SessionRegistry>>) {
        (
            Arc::new(RwLock::new(World::new(40, 20))),
            Arc::new(RwLock::new(SessionRegistry::new())),
        )
    }

    #[tokio::test]
    async fn test_broadcast_reaches_registered_sessions() {
        let (world, sessions) = test_state();
        let (id, mut rx, _retired) = sessions.write().await.register();
        world.write().await.add_player(id, 10, 10);

        broadcast_frame(&world, &sessions, "frame\n".to_string()).await;

        assert_eq!(rx.try_recv().unwrap(), "frame\n");
        assert_eq!(sessions.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_prunes_overflowing_session() {
        let (world, sessions) = test_state();
        let (slow_id, _slow_rx, _slow_retired) = sessions.write().await.register();
        let (fast_id, mut fast_rx, _fast_retired) = sessions.write().await.register();
        world.write().await.add_player(slow_id, 10, 10);
        world.write().await.add_player(fast_id, 20, 10);

        // Fill the slow session's channel without draining it.
        for _ in 0..OUTBOUND_CAPACITY {
            broadcast_frame(&world, &sessions, "frame\n".to_string()).await;
            fast_rx.try_recv().unwrap();
        }
        assert_eq!(sessions.read().await.len(), 2);

        // The overflowing session is dropped; the healthy one still delivers.
        broadcast_frame(&world, &sessions, "frame\n".to_string()).await;
        assert_eq!(sessions.read().await.len(), 1);
        assert_eq!(fast_rx.try_recv().unwrap(), "frame\n");

        let snapshot = world.read().await.snapshot();
        match snapshot {
            ServerMessage::GameState { snakes, .. } => {
                assert!(!snakes[&slow_id].is_alive);
                assert!(snakes[&fast_id].is_alive);
            }
            _ => panic!("unexpected snapshot message"),
        }
    }

    #[tokio::test]
    async fn test_broadcast_prunes_closed_session() {
        let (world, sessions) = test_state();
        let (id, rx, _retired) = sessions.write().await.register();
        world.write().await.add_player(id, 10, 10);
        drop(rx);

        broadcast_frame(&world, &sessions, "frame\n".to_string()).await;
        assert!(sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_pruned_session_tears_down_its_connection() {
        let (world, sessions) = test_state();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();

        let (player_id, outbound, retired) = sessions.write().await.register();
        world.write().await.add_player(player_id, 10, 10);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let session = tokio::spawn(handle_connection(
            stream,
            player_id,
            Arc::clone(&world),
            Arc::clone(&sessions),
            outbound,
            retired,
            shutdown_rx,
        ));

        // The same teardown broadcast pruning performs for a stale session.
        sessions.write().await.unregister(player_id);
        world.write().await.remove_player(player_id);

        timeout(Duration::from_secs(1), session)
            .await
            .expect("session task should observe the prune")
            .unwrap();

        // Commands sent after the prune no longer reach the world.
        let _ = client.write_all(b"RESPAWN\n").await;
        sleep(Duration::from_millis(50)).await;
        let snapshot = world.read().await.snapshot();
        match snapshot {
            ServerMessage::GameState { snakes, .. } => assert!(!snakes[&player_id].is_alive),
            _ => panic!("unexpected snapshot message"),
        }
    }

    #[tokio::test]
    async fn test_handle_frame_steers_and_ignores_garbage() {
        let (world, _) = test_state();
        world.write().await.add_player(0, 10, 10);

        handle_frame(0, "BOGUS", &world).await;
        handle_frame(0, "", &world).await;
        handle_frame(0, "up", &world).await;

        let snapshot = world.read().await.snapshot();
        match snapshot {
            ServerMessage::GameState { snakes, .. } => assert!(snakes[&0].is_alive),
            _ => panic!("unexpected snapshot message"),
        }

        // The accepted direction takes effect on the next tick.
        world.write().await.tick();
        let snapshot = world.read().await.snapshot();
        match snapshot {
            ServerMessage::GameState { snakes, .. } => {
                assert_eq!(snakes[&0].body[0], (9, 10));
            }
            _ => panic!("unexpected snapshot message"),
        }
    }

    #[tokio::test]
    async fn test_handle_frame_respawn_requires_death() {
        let (world, _) = test_state();
        world.write().await.add_player(0, 10, 10);

        handle_frame(0, "RESPAWN", &world).await;
        match world.read().await.snapshot() {
            ServerMessage::GameState { snakes, .. } => {
                assert_eq!(snakes[&0].body[0], (10, 10));
            }
            _ => panic!("unexpected snapshot message"),
        }

        world.write().await.remove_player(0);
        handle_frame(0, "respawn", &world).await;
        let snapshot = world.read().await.snapshot();
        match snapshot {
            ServerMessage::GameState { snakes, .. } => {
                assert!(snakes[&0].is_alive);
                assert_eq!(snakes[&0].score, 0);
            }
            _ => panic!("unexpected snapshot message"),
        }
    }
}
