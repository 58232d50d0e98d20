/// Debug session bookkeeping
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

use crate::handler::ProtocolHandler;

/// Unique identifier for a debug session
pub type SessionId = Uuid;

/// Messages queued for a connected client
#[derive(Debug, Clone)]
pub enum OutgoingMessage {
    /// JSON-RPC response or error response
    Response(serde_json::Value),
    /// JSON-RPC notification
    Notification(serde_json::Value),
    /// Close the connection after flushing what is queued
    Close,
}

impl OutgoingMessage {
    pub fn notification(value: &impl Serialize) -> Option<Self> {
        serde_json::to_value(value)
            .ok()
            .map(OutgoingMessage::Notification)
    }
}

/// The handler side of an attached client: where notifications go.
#[derive(Debug, Clone)]
pub struct SessionLink {
    pub id: SessionId,
    pub sender: mpsc::UnboundedSender<OutgoingMessage>,
}

impl SessionLink {
    pub fn new(sender: mpsc::UnboundedSender<OutgoingMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
        }
    }

    /// Queues a message. A closed channel means the client is already gone,
    /// which is not an error for the engine.
    pub fn send(&self, message: OutgoingMessage) {
        if self.sender.send(message).is_err() {
            debug!(session_id =? self.id, "Dropping message for closed session");
        }
    }
}

struct SessionEntry {
    runtime_name: String,
    handler: Arc<ProtocolHandler>,
    shutdown: oneshot::Sender<()>,
}

#[derive(Default)]
struct Sessions {
    accepting: bool,
    entries: HashMap<SessionId, SessionEntry>,
}

/// Open sessions of one listener, so they can be closed on shutdown.
#[derive(Default)]
pub struct SessionTable {
    inner: RwLock<Sessions>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn open(&self) {
        self.inner.write().await.accepting = true;
    }

    /// Tracks a new session. Returns `false` once the table has been closed,
    /// in which case the caller owns the cleanup.
    pub(crate) async fn insert(
        &self,
        id: SessionId,
        runtime_name: &str,
        handler: Arc<ProtocolHandler>,
        shutdown: oneshot::Sender<()>,
    ) -> bool {
        let mut inner = self.inner.write().await;
        if !inner.accepting {
            return false;
        }
        inner.entries.insert(
            id,
            SessionEntry {
                runtime_name: runtime_name.to_string(),
                handler,
                shutdown,
            },
        );
        true
    }

    pub(crate) async fn remove(&self, id: SessionId) {
        if let Some(entry) = self.inner.write().await.entries.remove(&id) {
            entry.handler.detach_session(id);
        }
    }

    /// Stops tracking new sessions, signals every open one to close and
    /// detaches it from its handler.
    pub(crate) async fn close_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut inner = self.inner.write().await;
            inner.accepting = false;
            inner.entries.drain().collect()
        };
        let count = drained.len();
        for (id, entry) in drained {
            debug!(session_id =? id, runtime = entry.runtime_name, "Force closing session");
            entry.handler.detach_session(id);
            let _ = entry.shutdown.send(());
        }
        count
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    /// Lists sessions as `(session id, runtime name)` pairs
    pub async fn list(&self) -> Vec<(SessionId, String)> {
        self.inner
            .read()
            .await
            .entries
            .iter()
            .map(|(id, entry)| (*id, entry.runtime_name.clone()))
            .collect()
    }
}
