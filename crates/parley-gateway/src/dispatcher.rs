use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use parley_types::events::GatewayEvent;

type ConnectionMap = HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>;

/// Manages all connected clients and routes events to them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Global events (presence). Every connected client receives them
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Targeted send channels: user_id -> (conn_id -> sender). A user may hold
    /// several connections at once (tabs, devices).
    connections: RwLock<ConnectionMap>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to global gateway events.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a connection for `user_id`.
    /// Returns (conn_id, receiver, whether this is the user's first live connection).
    pub async fn register_connection(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>, bool) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut connections = self.inner.connections.write().await;
        let user_conns = connections.entry(user_id).or_default();
        let first = user_conns.is_empty();
        user_conns.insert(conn_id, tx);
        (conn_id, rx, first)
    }

    /// Drop a connection. Returns true when it was the user's last one.
    pub async fn unregister_connection(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut connections = self.inner.connections.write().await;
        let Some(user_conns) = connections.get_mut(&user_id) else {
            return false;
        };
        if user_conns.remove(&conn_id).is_none() {
            return false;
        }
        if user_conns.is_empty() {
            connections.remove(&user_id);
            return true;
        }
        false
    }

    /// Send a targeted event to every connection of one user.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let connections = self.inner.connections.read().await;
        if let Some(user_conns) = connections.get(&user_id) {
            for tx in user_conns.values() {
                let _ = tx.send(event.clone());
            }
        }
    }

    /// Send a targeted event to every connection of each listed user.
    pub async fn send_to_users(&self, user_ids: &[Uuid], event: GatewayEvent) {
        let connections = self.inner.connections.read().await;
        for user_id in user_ids {
            if let Some(user_conns) = connections.get(user_id) {
                for tx in user_conns.values() {
                    let _ = tx.send(event.clone());
                }
            }
        }
    }

    /// Users with at least one live connection.
    pub async fn online_users(&self) -> Vec<Uuid> {
        self.inner.connections.read().await.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing_stop(conversation_id: Uuid, user_id: Uuid) -> GatewayEvent {
        GatewayEvent::TypingStop {
            conversation_id,
            user_id,
        }
    }

    #[tokio::test]
    async fn tracks_first_and_last_connection() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (first_conn, _rx1, first) = dispatcher.register_connection(user).await;
        assert!(first);
        let (second_conn, _rx2, first) = dispatcher.register_connection(user).await;
        assert!(!first);
        assert_eq!(dispatcher.online_users().await, vec![user]);

        assert!(!dispatcher.unregister_connection(user, first_conn).await);
        assert!(dispatcher.unregister_connection(user, second_conn).await);
        assert!(dispatcher.online_users().await.is_empty());

        // Unknown connection ids are ignored
        assert!(!dispatcher.unregister_connection(user, second_conn).await);
    }

    #[tokio::test]
    async fn targeted_events_reach_every_connection_of_listed_users_only() {
        let dispatcher = Dispatcher::new();
        let ada = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let eve = Uuid::new_v4();

        let (_, mut ada_tab1, _) = dispatcher.register_connection(ada).await;
        let (_, mut ada_tab2, _) = dispatcher.register_connection(ada).await;
        let (_, mut bob_rx, _) = dispatcher.register_connection(bob).await;
        let (_, mut eve_rx, _) = dispatcher.register_connection(eve).await;

        let conversation = Uuid::new_v4();
        dispatcher
            .send_to_users(&[ada, bob], typing_stop(conversation, bob))
            .await;

        for rx in [&mut ada_tab1, &mut ada_tab2, &mut bob_rx] {
            let event = rx.try_recv().unwrap();
            assert_eq!(event.conversation_id(), Some(conversation));
        }
        assert!(eve_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let user = Uuid::new_v4();

        dispatcher.broadcast(GatewayEvent::PresenceUpdate {
            user_id: user,
            online: true,
            last_seen_at: chrono::Utc::now(),
        });

        match rx.recv().await.unwrap() {
            GatewayEvent::PresenceUpdate { user_id, online, .. } => {
                assert_eq!(user_id, user);
                assert!(online);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
