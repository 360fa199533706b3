//! Connection registry and per-game watcher sets
//!
//! This module tracks the server side of every open connection:
//! - Connection lifecycle (connect, disconnect) and capacity limits
//! - Which games each connection is watching, and in what role
//! - Best-effort delivery of notifications to one connection or a whole game
//!
//! Delivery never blocks: every connection owns an unbounded outgoing queue
//! drained by its own writer task, so a slow or dead socket cannot hold up
//! broadcasts to anyone else.

use log::{debug, info, warn};
use shared::{GameId, Notification, Team};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;

pub type ClientId = u32;

/// How a connection takes part in a game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Player(Team),
    Observer,
}

/// A connection's registration for one game
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watch {
    pub username: String,
    pub role: Role,
}

/// Represents a connected client
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: ClientId,
    /// Peer address, kept for logging
    pub addr: SocketAddr,
    pub connected_at: Instant,
    /// Queue feeding this connection's writer task
    sender: mpsc::UnboundedSender<Notification>,
    /// Games this connection is watching
    watching: HashMap<GameId, Watch>,
}

impl Client {
    pub fn new(id: ClientId, addr: SocketAddr, sender: mpsc::UnboundedSender<Notification>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            sender,
            watching: HashMap::new(),
        }
    }

    /// Queues a notification for this client. Returns false if its writer has gone away.
    pub fn send(&self, notification: Notification) -> bool {
        self.sender.send(notification).is_ok()
    }
}

/// Manages all connected clients and the watcher set of every game.
///
/// Shared behind an `RwLock` by all connection tasks. Registering and
/// removing watchers does not involve any per-game lock.
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<ClientId, Client>,
    /// Watcher sets indexed by game
    watchers: HashMap<GameId, HashSet<ClientId>>,
    /// Next available client ID for new connections
    next_client_id: ClientId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty registry. Client IDs start from 1.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            watchers: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a new connection.
    ///
    /// Returns None if the server is at capacity.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<Notification>,
    ) -> Option<ClientId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, sender));

        Some(client_id)
    }

    /// Removes a connection and drops it from every watcher set.
    ///
    /// Returns the games it was watching. Seats are left untouched.
    pub fn remove_client(&mut self, client_id: &ClientId) -> Vec<GameId> {
        let Some(client) = self.clients.remove(client_id) else {
            return Vec::new();
        };

        let games: Vec<GameId> = client.watching.keys().copied().collect();
        for game_id in &games {
            self.detach(*game_id, *client_id);
        }

        info!(
            "Client {} disconnected after {:?}",
            client.id,
            client.connected_at.elapsed()
        );
        games
    }

    /// Adds a connection to a game's watcher set, replacing any earlier
    /// registration of the same connection for that game.
    ///
    /// Returns false if the client ID is unknown.
    pub fn add_watcher(&mut self, game_id: GameId, client_id: ClientId, watch: Watch) -> bool {
        let Some(client) = self.clients.get_mut(&client_id) else {
            return false;
        };

        client.watching.insert(game_id, watch);
        self.watchers.entry(game_id).or_default().insert(client_id);
        true
    }

    /// Removes a connection from a game's watcher set, returning its registration
    pub fn remove_watcher(&mut self, game_id: GameId, client_id: ClientId) -> Option<Watch> {
        let watch = self.clients.get_mut(&client_id)?.watching.remove(&game_id)?;
        self.detach(game_id, client_id);
        Some(watch)
    }

    /// A connection's registration for a game, if it is watching
    pub fn watch(&self, game_id: GameId, client_id: ClientId) -> Option<&Watch> {
        self.clients.get(&client_id)?.watching.get(&game_id)
    }

    /// IDs of every connection watching `game_id`
    pub fn watchers(&self, game_id: GameId) -> Vec<ClientId> {
        self.watchers
            .get(&game_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Queues a notification for one client. Failures are logged, never returned.
    pub fn send_to(&self, client_id: ClientId, notification: Notification) -> bool {
        match self.clients.get(&client_id) {
            Some(client) => {
                let delivered = client.send(notification);
                if !delivered {
                    warn!("Client {} is no longer reading, dropping notification", client_id);
                }
                delivered
            }
            None => {
                debug!("Notification for unknown client {} dropped", client_id);
                false
            }
        }
    }

    /// Queues a notification for every watcher of a game, optionally skipping one.
    ///
    /// Returns how many watchers it was queued for.
    pub fn broadcast(
        &self,
        game_id: GameId,
        notification: &Notification,
        exclude: Option<ClientId>,
    ) -> usize {
        let Some(set) = self.watchers.get(&game_id) else {
            return 0;
        };

        set.iter()
            .filter(|id| Some(**id) != exclude)
            .filter(|id| self.send_to(**id, notification.clone()))
            .count()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn detach(&mut self, game_id: GameId, client_id: ClientId) {
        if let Some(set) = self.watchers.get_mut(&game_id) {
            set.remove(&client_id);
            if set.is_empty() {
                self.watchers.remove(&game_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn observer(name: &str) -> Watch {
        Watch {
            username: name.to_string(),
            role: Role::Observer,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
        let mut received = Vec::new();
        while let Ok(notification) = rx.try_recv() {
            received.push(notification);
        }
        received
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients, 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_add_multiple_clients() {
        let mut manager = ClientManager::new(3);
        let (tx, _rx) = mpsc::unbounded_channel();

        let client_id1 = manager.add_client(test_addr(), tx.clone()).unwrap();
        let client_id2 = manager.add_client(test_addr2(), tx).unwrap();

        assert_eq!(client_id1, 1);
        assert_eq!(client_id2, 2);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(manager.add_client(test_addr(), tx.clone()).is_some());
        assert!(manager.add_client(test_addr2(), tx).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_watcher_registration() {
        let mut manager = ClientManager::new(4);
        let (tx, _rx) = mpsc::unbounded_channel();
        let client_id = manager.add_client(test_addr(), tx).unwrap();

        let watch = Watch {
            username: "alice".to_string(),
            role: Role::Player(Team::White),
        };
        assert!(manager.add_watcher(9, client_id, watch.clone()));
        assert_eq!(manager.watch(9, client_id), Some(&watch));
        assert_eq!(manager.watchers(9), vec![client_id]);

        assert!(!manager.add_watcher(9, 999, observer("ghost")));

        assert_eq!(manager.remove_watcher(9, client_id), Some(watch));
        assert!(manager.watchers(9).is_empty());
        assert_eq!(manager.remove_watcher(9, client_id), None);
    }

    #[test]
    fn test_remove_client_leaves_every_game() {
        let mut manager = ClientManager::new(4);
        let (tx, _rx) = mpsc::unbounded_channel();
        let client_id = manager.add_client(test_addr(), tx.clone()).unwrap();
        let other_id = manager.add_client(test_addr2(), tx).unwrap();

        manager.add_watcher(1, client_id, observer("alice"));
        manager.add_watcher(2, client_id, observer("alice"));
        manager.add_watcher(2, other_id, observer("bob"));

        let mut games = manager.remove_client(&client_id);
        games.sort();
        assert_eq!(games, vec![1, 2]);
        assert!(manager.watchers(1).is_empty());
        assert_eq!(manager.watchers(2), vec![other_id]);
        assert!(manager.remove_client(&client_id).is_empty());
    }

    #[test]
    fn test_broadcast_with_exclusion() {
        let mut manager = ClientManager::new(4);
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();

        let id1 = manager.add_client(test_addr(), tx1).unwrap();
        let id2 = manager.add_client(test_addr2(), tx2).unwrap();
        let id3 = manager.add_client(test_addr(), tx3).unwrap();

        manager.add_watcher(5, id1, observer("a"));
        manager.add_watcher(5, id2, observer("b"));
        manager.add_watcher(6, id3, observer("c"));

        let notification = Notification::Notification {
            message: "hello".to_string(),
        };
        assert_eq!(manager.broadcast(5, &notification, Some(id1)), 1);

        assert!(drain(&mut rx1).is_empty());
        assert_eq!(drain(&mut rx2), vec![notification]);
        assert!(drain(&mut rx3).is_empty());
    }

    #[test]
    fn test_broadcast_skips_closed_connections() {
        let mut manager = ClientManager::new(4);
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        let id1 = manager.add_client(test_addr(), tx1).unwrap();
        let id2 = manager.add_client(test_addr2(), tx2).unwrap();
        manager.add_watcher(5, id1, observer("a"));
        manager.add_watcher(5, id2, observer("b"));

        drop(rx1);

        let notification = Notification::Notification {
            message: "still here".to_string(),
        };
        assert_eq!(manager.broadcast(5, &notification, None), 1);
        assert_eq!(drain(&mut rx2).len(), 1);
    }
}
