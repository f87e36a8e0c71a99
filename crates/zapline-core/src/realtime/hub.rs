//! Connection registry and room fan-out

use super::events::{RealtimeEvent, Room};
use super::RealtimePublisher;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// One registered socket: its outbound channel and current rooms.
struct Connection {
    sender: mpsc::UnboundedSender<RealtimeEvent>,
    rooms: HashSet<String>,
}

/// Process-wide realtime hub. Sockets register with an unbounded channel;
/// publishing walks the room membership and pushes to each live sender.
/// Senders whose receiver is gone are pruned lazily on the next publish.
#[derive(Default)]
pub struct RealtimeHub {
    connections: RwLock<HashMap<Uuid, Connection>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket and hand back its event receiver.
    pub fn register(&self, connection_id: Uuid) -> mpsc::UnboundedReceiver<RealtimeEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut connections = self.connections.write().expect("hub lock poisoned");
        connections.insert(
            connection_id,
            Connection {
                sender,
                rooms: HashSet::new(),
            },
        );
        receiver
    }

    pub fn join(&self, connection_id: Uuid, room: &Room) {
        let mut connections = self.connections.write().expect("hub lock poisoned");
        if let Some(connection) = connections.get_mut(&connection_id) {
            connection.rooms.insert(room.label());
        }
    }

    pub fn leave(&self, connection_id: Uuid, room: &Room) {
        let mut connections = self.connections.write().expect("hub lock poisoned");
        if let Some(connection) = connections.get_mut(&connection_id) {
            connection.rooms.remove(&room.label());
        }
    }

    pub fn disconnect(&self, connection_id: Uuid) {
        let mut connections = self.connections.write().expect("hub lock poisoned");
        connections.remove(&connection_id);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().expect("hub lock poisoned").len()
    }
}

impl RealtimePublisher for RealtimeHub {
    fn publish(&self, room: Room, event: RealtimeEvent) {
        let label = room.label();
        let mut dead = Vec::new();
        {
            let connections = self.connections.read().expect("hub lock poisoned");
            for (id, connection) in connections.iter() {
                if connection.rooms.contains(&label)
                    && connection.sender.send(event.clone()).is_err()
                {
                    dead.push(*id);
                }
            }
        }
        if !dead.is_empty() {
            debug!(count = dead.len(), "pruning dead realtime connections");
            let mut connections = self.connections.write().expect("hub lock poisoned");
            for id in dead {
                connections.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_room_members_only() {
        let hub = RealtimeHub::new();
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();

        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();
        let mut rx_a = hub.register(conn_a);
        let mut rx_b = hub.register(conn_b);
        hub.join(conn_a, &Room::Org(tenant_a));
        hub.join(conn_b, &Room::Org(tenant_b));

        hub.publish(
            Room::Org(tenant_a),
            RealtimeEvent::UserStatus {
                user_id: Uuid::nil(),
                online: true,
            },
        );

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_connections_are_pruned() {
        let hub = RealtimeHub::new();
        let conn = Uuid::new_v4();
        let rx = hub.register(conn);
        hub.join(conn, &Room::Org(Uuid::nil()));
        drop(rx);

        hub.publish(
            Room::Org(Uuid::nil()),
            RealtimeEvent::UserStatus {
                user_id: Uuid::nil(),
                online: false,
            },
        );
        assert_eq!(hub.connection_count(), 0);
    }
}
