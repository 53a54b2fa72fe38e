use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use orbit_types::events::{GatewayEvent, PresenceStatus};

/// Sender half of one socket's private queue.
type ConnSender = mpsc::UnboundedSender<GatewayEvent>;

/// Tracks connected sockets and fans events out to them.
///
/// Every user has a "room" holding all of their open connections, so an
/// event sent to a user reaches each of their tabs. Delivery is
/// fire-and-forget: if nobody is connected the event is dropped.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for events every connected client receives
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Per-user rooms. A user is online exactly while their room exists.
    rooms: RwLock<HashMap<Uuid, Room>>,
}

struct Room {
    username: String,
    conns: HashMap<Uuid, ConnSender>,
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
                rooms: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to broadcast events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Add a connection to the user's room. Returns (conn_id, receiver).
    ///
    /// The first connection of a user brings them online and announces it.
    /// The announcement happens under the rooms lock so it cannot be
    /// reordered with the offline of a concurrently closing last tab.
    pub async fn join_room(&self, user_id: Uuid, username: &str) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut rooms = self.inner.rooms.write().await;
        let room = rooms.entry(user_id).or_insert_with(|| Room {
            username: username.to_string(),
            conns: HashMap::new(),
        });
        let first = room.conns.is_empty();
        room.conns.insert(conn_id, tx);
        if first {
            self.broadcast(online(user_id));
        }

        (conn_id, rx)
    }

    /// Drop one connection. The user goes offline only when it was their
    /// last, and the offline is announced before the lock is released.
    pub async fn user_offline(&self, user_id: Uuid, conn_id: Uuid) {
        let mut rooms = self.inner.rooms.write().await;
        let Some(room) = rooms.get_mut(&user_id) else {
            return;
        };
        room.conns.remove(&conn_id);
        if !room.conns.is_empty() {
            // Another tab is still connected
            return;
        }

        rooms.remove(&user_id);
        self.broadcast(GatewayEvent::UserStatusChange {
            user_id,
            status: PresenceStatus::Offline,
        });
    }

    /// Send an event to every connection of one user. Returns how many
    /// connections it was handed to.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> usize {
        let rooms = self.inner.rooms.read().await;
        let Some(room) = rooms.get(&user_id) else {
            return 0;
        };
        room.conns
            .values()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    /// Re-announce a connected user as online (client `user_online`).
    /// Users without an open connection are ignored.
    pub async fn user_online(&self, user_id: Uuid) -> bool {
        let rooms = self.inner.rooms.read().await;
        if !rooms.contains_key(&user_id) {
            return false;
        }
        self.broadcast(online(user_id));
        true
    }

    /// Get list of online users.
    pub async fn online_users(&self) -> Vec<(Uuid, String)> {
        self.inner
            .rooms
            .read()
            .await
            .iter()
            .map(|(id, room)| (*id, room.username.clone()))
            .collect()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.rooms.read().await.contains_key(&user_id)
    }
}

fn online(user_id: Uuid) -> GatewayEvent {
    GatewayEvent::UserStatusChange {
        user_id,
        status: PresenceStatus::Online,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing(user_id: Uuid) -> GatewayEvent {
        GatewayEvent::UserStoppedTyping { user_id }
    }

    #[tokio::test]
    async fn send_to_user_reaches_every_tab() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (_c1, mut rx1) = dispatcher.join_room(alice, "alice").await;
        let (_c2, mut rx2) = dispatcher.join_room(alice, "alice").await;
        let (_c3, mut rx3) = dispatcher.join_room(bob, "bob").await;

        assert_eq!(dispatcher.send_to_user(alice, typing(bob)).await, 2);
        assert!(matches!(rx1.try_recv(), Ok(GatewayEvent::UserStoppedTyping { .. })));
        assert!(matches!(rx2.try_recv(), Ok(GatewayEvent::UserStoppedTyping { .. })));
        assert!(rx3.try_recv().is_err());
    }

    #[tokio::test]
    async fn sending_to_nobody_is_dropped() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.send_to_user(Uuid::new_v4(), typing(Uuid::new_v4())).await, 0);
    }

    #[tokio::test]
    async fn offline_only_after_last_connection() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let mut events = dispatcher.subscribe();

        let (c1, _rx1) = dispatcher.join_room(alice, "alice").await;
        let (c2, _rx2) = dispatcher.join_room(alice, "alice").await;
        assert!(dispatcher.is_online(alice).await);
        assert!(matches!(
            events.recv().await.unwrap(),
            GatewayEvent::UserStatusChange { status: PresenceStatus::Online, .. }
        ));

        dispatcher.user_offline(alice, c1).await;
        assert!(dispatcher.is_online(alice).await);

        dispatcher.user_offline(alice, c2).await;
        assert!(!dispatcher.is_online(alice).await);
        assert!(dispatcher.online_users().await.is_empty());
        assert!(matches!(
            events.recv().await.unwrap(),
            GatewayEvent::UserStatusChange { status: PresenceStatus::Offline, .. }
        ));
    }

    #[tokio::test]
    async fn second_tab_does_not_announce_online_again() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let mut events = dispatcher.subscribe();

        let (c1, _rx1) = dispatcher.join_room(alice, "alice").await;
        let (_c2, _rx2) = dispatcher.join_room(alice, "alice").await;
        assert!(matches!(
            events.try_recv(),
            Ok(GatewayEvent::UserStatusChange { status: PresenceStatus::Online, .. })
        ));
        assert!(events.try_recv().is_err());

        dispatcher.user_offline(alice, c1).await;
        assert!(events.try_recv().is_err());
        assert_eq!(dispatcher.online_users().await, vec![(alice, "alice".to_string())]);
    }

    #[tokio::test]
    async fn reconnect_after_last_tab_closes_is_online() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let mut events = dispatcher.subscribe();

        let (c1, _rx1) = dispatcher.join_room(alice, "alice").await;
        dispatcher.user_offline(alice, c1).await;
        let (_c2, _rx2) = dispatcher.join_room(alice, "alice").await;

        let statuses: Vec<PresenceStatus> = std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|e| match e {
                GatewayEvent::UserStatusChange { status, .. } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            vec![PresenceStatus::Online, PresenceStatus::Offline, PresenceStatus::Online]
        );
        assert!(dispatcher.is_online(alice).await);
    }

    #[tokio::test]
    async fn user_online_needs_an_open_connection() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        assert!(!dispatcher.user_online(alice).await);

        let (_c, _rx) = dispatcher.join_room(alice, "alice").await;
        let mut events = dispatcher.subscribe();
        assert!(dispatcher.user_online(alice).await);
        assert!(matches!(
            events.try_recv(),
            Ok(GatewayEvent::UserStatusChange { status: PresenceStatus::Online, .. })
        ));
    }
}
