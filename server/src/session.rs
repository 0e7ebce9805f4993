//! Session registration and the broadcast fan-out surface
//!
//! This module tracks one bounded outbound channel per connected client:
//! - Player id allocation (monotonically increasing, never reused)
//! - Registration/unregistration over the connection lifecycle
//! - Enumeration of live senders for the game loop's per-tick broadcast
//!
//! The registry holds the sending half of each channel plus a retire signal
//! for the session's read loop. Each connection's writer task owns the
//! receiving half and drains it to the socket, so a stalled peer backs up
//! its own channel and nothing else; unregistering a session closes the
//! channel and fires the retire signal, ending both connection tasks.

use log::info;
use std::collections::HashMap;
use tokio::sync::{mpsc, watch};

/// Frames buffered per session before the client is considered too slow
/// and disconnected.
pub const OUTBOUND_CAPACITY: usize = 32;

/// Registry-owned half of one session: the outbound sender plus a retire
/// signal whose drop wakes the connection's read loop.
struct SessionHandle {
    sender: mpsc::Sender<String>,
    _retire: watch::Sender<bool>,
}

/// All registered client sessions, indexed by player id.
pub struct SessionRegistry {
    sessions: HashMap<u32, SessionHandle>,
    next_player_id: u32,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            next_player_id: 0,
        }
    }

    /// Allocates the next player id and registers a fresh outbound channel
    /// for it. Returns the id, the receiving half for the connection's
    /// writer task, and a retire watch that resolves once the session is
    /// unregistered.
    pub fn register(&mut self) -> (u32, mpsc::Receiver<String>, watch::Receiver<bool>) {
        let player_id = self.next_player_id;
        self.next_player_id += 1;

        let (sender, receiver) = mpsc::channel(OUTBOUND_CAPACITY);
        let (retire, retired) = watch::channel(false);
        self.sessions.insert(
            player_id,
            SessionHandle {
                sender,
                _retire: retire,
            },
        );

        (player_id, receiver, retired)
    }

    /// Drops a session's handle, which closes its outbound channel and
    /// fires its retire watch, letting both connection tasks wind down.
    /// Returns false if the id was already gone (teardown can race with
    /// broadcast pruning).
    pub fn unregister(&mut self, player_id: u32) -> bool {
        if self.sessions.remove(&player_id).is_some() {
            info!("Session for player {} unregistered", player_id);
            true
        } else {
            false
        }
    }

    /// Snapshot of all live senders for one broadcast pass.
    pub fn senders(&self) -> Vec<(u32, mpsc::Sender<String>)> {
        self.sessions
            .iter()
            .map(|(id, handle)| (*id, handle.sender.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
