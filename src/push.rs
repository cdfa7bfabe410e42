//! WebSocket push channel.
//!
//! Every connection is registered with the session of its upgrade request.
//! A refreshed snapshot goes to all connections of that session.

use crate::dashboard::Dashboard;
use crate::models::Snapshot;
use crate::session::SessionId;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Server to client events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    DataUpdate(Snapshot),
}

/// Client to server events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    RequestUpdate,
}

#[derive(Debug)]
struct Subscriber {
    session: SessionId,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Debug, Default)]
pub struct PushHub {
    clients: RwLock<HashMap<Uuid, Subscriber>>,
}

impl PushHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, session: SessionId, tx: mpsc::UnboundedSender<String>) -> Uuid {
        let connection_id = Uuid::new_v4();
        self.clients
            .write()
            .await
            .insert(connection_id, Subscriber { session, tx });
        connection_id
    }

    pub async fn unregister(&self, connection_id: Uuid) {
        self.clients.write().await.remove(&connection_id);
    }

    /// Sessions with at least one live connection.
    pub async fn active_sessions(&self) -> Vec<SessionId> {
        let mut sessions: Vec<SessionId> = self
            .clients
            .read()
            .await
            .values()
            .map(|client| client.session)
            .collect();
        sessions.sort();
        sessions.dedup();
        sessions
    }

    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Sends `snapshot` to every connection of `session`, returning how many
    /// connections accepted it.
    pub async fn broadcast(&self, session: SessionId, snapshot: &Snapshot) -> usize {
        let payload = match serde_json::to_string(&PushEvent::DataUpdate(snapshot.clone())) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode data_update");
                return 0;
            }
        };

        let clients = self.clients.read().await;
        let mut delivered = 0;
        for (connection_id, client) in clients.iter().filter(|(_, c)| c.session == session) {
            if client.tx.send(payload.clone()).is_ok() {
                delivered += 1;
            } else {
                debug!(connection = %connection_id, "push target already closed");
            }
        }
        delivered
    }
}

/// Drives one WebSocket connection until the client goes away.
pub async fn serve_socket(dashboard: Arc<Dashboard>, session: SessionId, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let hub = dashboard.hub();
    let connection_id = hub.register(session, tx.clone()).await;
    info!(session = %session, connection = %connection_id, "push client connected");

    let snapshot = dashboard.current_snapshot(session).await;
    match serde_json::to_string(&PushEvent::DataUpdate(snapshot)) {
        Ok(payload) => {
            if tx.send(payload).is_err() {
                warn!(connection = %connection_id, "failed to send initial snapshot");
            }
        }
        Err(e) => warn!(error = %e, "failed to encode initial snapshot"),
    }

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(ClientEvent::RequestUpdate) => {
                    let dashboard = Arc::clone(&dashboard);
                    tokio::spawn(async move {
                        dashboard.refresh(session).await;
                    });
                }
                Err(e) => debug!(error = %e, "ignoring unknown push message"),
            },
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    hub.unregister(connection_id).await;
    send_task.abort();
    info!(session = %session, connection = %connection_id, "push client disconnected");
}
