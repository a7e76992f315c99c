// Live HTTP sessions, each bridged onto its own MCP server session

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use toolmesh_mcp::{McpServer, MemoryTransport, Transport};
use uuid::Uuid;

/// Gateway end of a session; the MCP server owns the other end.
pub type Bridge = Arc<MemoryTransport>;

#[derive(Default)]
pub struct SessionHub {
    sessions: RwLock<HashMap<Uuid, Bridge>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an MCP session on `server` and track its bridge under a new id.
    pub fn open(&self, server: &McpServer) -> (Uuid, Bridge) {
        let (bridge, serving) = MemoryTransport::pair();
        let bridge = Arc::new(bridge);
        let id = Uuid::new_v4();

        let server = server.clone();
        tokio::spawn(async move {
            if let Err(err) = server.serve(Arc::new(serving)).await {
                tracing::warn!(session = %id, error = %err, "MCP session ended with error");
            }
        });

        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, bridge.clone());
        tracing::info!(session = %id, "Session opened");
        (id, bridge)
    }

    pub fn get(&self, id: &Uuid) -> Option<Bridge> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Forget the session and close its bridge, which ends the MCP session.
    pub async fn close(&self, id: &Uuid) {
        let bridge = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if let Some(bridge) = bridge {
            let _ = bridge.close().await;
            tracing::info!(session = %id, "Session closed");
        }
    }

    /// Synchronous teardown for drop guards.
    pub fn detach(&self, id: &Uuid) {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if removed.is_some() {
            tracing::info!(session = %id, "Session closed");
        }
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
