//! # Connection Registry
//!
//! Tracks the currently open client connections. Each entry maps a
//! [`ConnectionId`] to the sending side of that connection's outbound queue;
//! a writer task owned by the connection drains the queue onto the socket.
//!
//! Outbound queues are bounded. A broadcast that finds a queue full evicts
//! that connection instead of waiting on it: the entry is removed and the
//! connection's eviction signal fires so its task can close the socket.
//!
//! Broadcasts take a snapshot of the entries and release the lock before
//! sending, so a connection registering or going away mid-broadcast never
//! sees a half-updated table.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::common::messages::Message;

/// Sending side of a connection's outbound queue.
pub type Outbound = mpsc::Sender<Message>;

/// Resolves once the connection is no longer registered.
pub type Evicted = oneshot::Receiver<()>;

/// Identity of one live client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Entry {
    outbound: Outbound,
    evict: oneshot::Sender<()>,
}

pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Entry>>,
    next_id: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a connection and return its freshly assigned id, together with
    /// the signal that fires when the registry drops it.
    pub async fn register(&self, outbound: Outbound) -> (ConnectionId, Evicted) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (evict, evicted) = oneshot::channel();
        let mut connections = self.connections.write().await;
        connections.insert(id, Entry { outbound, evict });
        info!("🔗 Connection {} registered ({} open)", id, connections.len());
        (id, evicted)
    }

    /// Remove a connection. Unknown ids are ignored.
    ///
    /// Returns true if the connection was registered.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(&id).is_some();
        if removed {
            info!("🔌 Connection {} unregistered ({} open)", id, connections.len());
        }
        removed
    }

    /// Remove a connection that cannot keep up and tell its task to stop.
    async fn evict(&self, id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(entry) = connections.remove(&id) {
            let _ = entry.evict.send(());
            warn!(
                "⚠️  Connection {} evicted, outbound queue full ({} open)",
                id,
                connections.len()
            );
        }
    }

    /// Snapshot of every connection except `except`.
    pub async fn others(&self, except: ConnectionId) -> Vec<(ConnectionId, Outbound)> {
        self.connections
            .read()
            .await
            .iter()
            .filter(|(id, _)| **id != except)
            .map(|(id, entry)| (*id, entry.outbound.clone()))
            .collect()
    }

    /// Queue `message` for every connection except `except`.
    ///
    /// Returns the number of connections the message was queued for.
    /// Connections whose queue is already closed are skipped; connections
    /// whose queue is full are evicted.
    pub async fn broadcast_except(&self, except: ConnectionId, message: &Message) -> usize {
        let mut delivered = 0;
        let mut stalled = Vec::new();
        for (id, tx) in self.others(except).await {
            match tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => stalled.push(id),
                Err(TrySendError::Closed(_)) => {
                    debug!("❌ Connection {} closed before broadcast", id)
                }
            }
        }
        for id in stalled {
            self.evict(id).await;
        }
        delivered
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
