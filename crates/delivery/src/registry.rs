//! Connection registry: the set of open push connections.
//!
//! A connection is represented by the sending half of a bounded channel. The
//! socket task owning the receiving half writes every queued frame to the
//! client. Sends never wait: a full queue drops the frame for that connection
//! only.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// A serialized outbound frame, shared between all recipients of a broadcast.
pub type Frame = Arc<str>;

pub type FrameSender = mpsc::Sender<Frame>;
pub type FrameReceiver = mpsc::Receiver<Frame>;

/// Server-generated identifier for one push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Live push connections, keyed by id.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, FrameSender>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }

    /// Add a connection as a broadcast target. Re-registering an id replaces its sender.
    pub fn register(&mut self, id: ConnectionId, sender: FrameSender) {
        self.connections.insert(id, sender);
        tracing::info!(
            connection_id = %id,
            connections = self.connections.len(),
            "Push connection registered"
        );
    }

    /// Remove a connection. Returns `false` if it was not registered.
    pub fn unregister(&mut self, id: &ConnectionId) -> bool {
        let removed = self.connections.remove(id).is_some();
        if removed {
            tracing::info!(
                connection_id = %id,
                connections = self.connections.len(),
                "Push connection unregistered"
            );
        }
        removed
    }

    /// Queue `frame` on every open connection.
    ///
    /// Returns `true` if at least one connection accepted the frame. Connections
    /// whose socket task has already gone away are skipped, not removed; their
    /// own close event unregisters them.
    pub fn broadcast(&self, frame: &Frame) -> bool {
        let mut delivered = false;

        for (id, sender) in &self.connections {
            if sender.is_closed() {
                continue;
            }

            match sender.try_send(Arc::clone(frame)) {
                Ok(()) => delivered = true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection_id = %id,
                        "Outbound queue full, dropping frame for slow connection"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(connection_id = %id, "Connection closed mid-broadcast");
                }
            }
        }

        delivered
    }

    /// Number of registered connections, open or not.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Drop every sender, ending each connection's writer. Returns how many were released.
    pub fn release_all(&mut self) -> usize {
        let released = self.connections.len();
        self.connections.clear();
        released
    }
}
