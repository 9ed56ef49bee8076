use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::frames::ClientFrame;

/// Registry of live user WebSocket connections: session-id → frame sender.
///
/// Operator replies and system notices are pushed through here from outside
/// the per-connection task (proactive delivery after `connect`).
pub struct ConnectionManager {
    clients: DashMap<String, mpsc::Sender<ClientFrame>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    pub fn register(&self, session_id: &str, tx: mpsc::Sender<ClientFrame>) {
        info!(session = session_id, "websocket registered");
        self.clients.insert(session_id.to_string(), tx);
    }

    pub fn unregister(&self, session_id: &str) {
        if self.clients.remove(session_id).is_some() {
            info!(session = session_id, "websocket unregistered");
        }
    }

    /// Push a frame to one session. Returns false when no live connection
    /// exists (the user may have left — not an error).
    pub async fn send_to(&self, session_id: &str, frame: ClientFrame) -> bool {
        let Some(tx) = self.clients.get(session_id).map(|t| t.clone()) else {
            warn!(session = session_id, "no active websocket for session");
            return false;
        };
        tx.send(frame).await.is_ok()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_reaches_registered_session() {
        let manager = ConnectionManager::new();
        let (tx, mut rx) = mpsc::channel(4);
        manager.register("sess_1", tx);

        assert!(manager.send_to("sess_1", ClientFrame::chunk("hi")).await);
        assert_eq!(rx.recv().await.unwrap(), ClientFrame::chunk("hi"));
    }

    #[tokio::test]
    async fn send_to_absent_session_is_false() {
        let manager = ConnectionManager::new();
        assert!(!manager.send_to("sess_x", ClientFrame::done()).await);
    }

    #[tokio::test]
    async fn unregister_removes_sender() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::channel(4);
        manager.register("sess_1", tx);
        manager.unregister("sess_1");
        assert!(!manager.send_to("sess_1", ClientFrame::done()).await);
    }
}
