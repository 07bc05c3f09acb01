//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use parley_core::{ConnectionId, RoomId, UserId};
use tokio::sync::mpsc;

/// One connected WebSocket client, bound to a (room, user) pair.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Room this connection is attached to.
    pub room_id: RoomId,
    /// Connected user.
    pub user_id: UserId,
    /// Display name at connect time.
    pub display_name: String,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded since the last ping.
    pub is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of events dropped due to a full channel.
    dropped_events: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(
        room_id: RoomId,
        user_id: UserId,
        display_name: String,
        tx: mpsc::Sender<Arc<String>>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            room_id,
            user_id,
            display_name,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_events: AtomicU64::new(0),
        }
    }

    /// Enqueue a serialized event for the client.
    ///
    /// Returns `false` if the channel is full or closed, and increments the
    /// dropped counter. The registry treats a failed send as the client
    /// falling off the room.
    pub fn send(&self, event: Arc<String>) -> bool {
        if self.tx.try_send(event).is_ok() {
            true
        } else {
            let _ = self.dropped_events.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total events dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or client activity).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for the heartbeat loop.
    ///
    /// Returns `true` if the client was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
