//! Per-game command handling
//!
//! Maps client commands onto [`Game`] operations and fans the results out to
//! every watcher of the game. Each game id has its own async mutex; moves,
//! resignations, seat claims and seat releases for one game run strictly one
//! at a time while different games proceed in parallel.
//!
//! Players act through the connection that joined the game. The username in
//! a MOVE or RESIGN must match the one that connection registered with.

use crate::client_manager::{ClientId, ClientManager, Role, Watch};
use crate::store::{GameStore, Outcome};
use log::{debug, warn};
use shared::{ChessError, ChessMove, Game, GameId, Notification, Packet, PieceKind, Square, Team};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

type LockMap = std::sync::Mutex<HashMap<GameId, Arc<Mutex<()>>>>;

pub struct GameSessions {
    clients: Arc<RwLock<ClientManager>>,
    store: Arc<dyn GameStore>,
    locks: LockMap,
}

/// Holds one game's mutex. On drop the map entry is removed again unless
/// another task is holding or waiting for the same mutex.
struct GameGuard<'a> {
    locks: &'a LockMap,
    game_id: GameId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for GameGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if matches!(locks.get(&self.game_id), Some(lock) if Arc::strong_count(lock) == 1) {
            locks.remove(&self.game_id);
        }
    }
}

impl GameSessions {
    pub fn new(clients: Arc<RwLock<ClientManager>>, store: Arc<dyn GameStore>) -> Self {
        Self {
            clients,
            store,
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Runs one command for a connection.
    ///
    /// Failures are reported to that connection alone as an ERROR notification.
    pub async fn handle_packet(&self, client_id: ClientId, packet: Packet) {
        debug!("Client {} sent {:?}", client_id, packet);

        let result = match packet {
            Packet::Join {
                game_id,
                username,
                color,
            } => self.join(client_id, game_id, &username, color).await,
            Packet::Observe { game_id, username } => {
                self.join(client_id, game_id, &username, None).await
            }
            Packet::Move {
                game_id,
                username,
                from,
                to,
                promotion,
            } => {
                self.make_move(client_id, game_id, &username, &from, &to, promotion)
                    .await
            }
            Packet::Resign { game_id, username } => {
                self.resign(client_id, game_id, &username).await
            }
            Packet::Leave { game_id, .. } => self.leave(client_id, game_id).await,
            Packet::Disconnect => {
                self.disconnect(client_id).await;
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("Rejected command from client {}: {}", client_id, e);
            self.report_error(client_id, e.to_string()).await;
        }
    }

    /// Sends an ERROR to one connection
    pub async fn report_error(&self, client_id: ClientId, message: String) {
        let clients = self.clients.read().await;
        clients.send_to(client_id, Notification::Error { message });
    }

    /// Registers the connection as a watcher of `game_id`, claiming `color`'s
    /// seat first when one is given. The joiner gets the current board, the
    /// other watchers get a JOIN.
    ///
    /// A seat claimed here is released again if the connection cannot be
    /// registered, unless the same username already held it.
    pub async fn join(
        &self,
        client_id: ClientId,
        game_id: GameId,
        username: &str,
        color: Option<Team>,
    ) -> Result<(), ChessError> {
        let Some(team) = color else {
            return self.register(client_id, game_id, username, Role::Observer).await;
        };

        let _game = self.lock_game(game_id).await;
        let held = self.store.resolve_seat(game_id, username) == Some(team);
        self.store.claim_seat(game_id, team, username)?;

        if let Err(e) = self
            .register(client_id, game_id, username, Role::Player(team))
            .await
        {
            if !held {
                self.store.vacate_seat(game_id, team)?;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Adds the watcher and sends it the board while the registry is write
    /// locked, so no move broadcast can reach it ahead of its own snapshot.
    async fn register(
        &self,
        client_id: ClientId,
        game_id: GameId,
        username: &str,
        role: Role,
    ) -> Result<(), ChessError> {
        let clients = {
            let mut clients = self.clients.write().await;
            let watch = Watch {
                username: username.to_string(),
                role,
            };
            if !clients.add_watcher(game_id, client_id, watch) {
                return Err(ChessError::Unauthorized(format!(
                    "connection {} is closed",
                    client_id
                )));
            }

            let game = match self.store.load_game(game_id) {
                Ok(game) => game,
                Err(e) => {
                    clients.remove_watcher(game_id, client_id);
                    return Err(e);
                }
            };
            clients.send_to(
                client_id,
                Notification::LoadGame {
                    game_id,
                    game: game.snapshot(),
                },
            );
            clients.downgrade()
        };

        let message = match role {
            Role::Player(team) => format!("{} joined game {} ({})", username, game_id, team),
            Role::Observer => format!("{} joined game {} as observer", username, game_id),
        };
        clients.broadcast(game_id, &Notification::Join { message }, Some(client_id));
        Ok(())
    }

    /// Validates and applies one move, then sends every watcher the new
    /// board followed by a description and, when relevant, the opponent's status.
    pub async fn make_move(
        &self,
        client_id: ClientId,
        game_id: GameId,
        username: &str,
        from: &str,
        to: &str,
        promotion: Option<PieceKind>,
    ) -> Result<(), ChessError> {
        let start: Square = from.parse()?;
        let end: Square = to.parse()?;
        let mv = match promotion {
            Some(kind) if end.is_back_rank() => ChessMove::with_promotion(start, end, kind),
            _ => ChessMove::new(start, end),
        };

        let watch = self.player_watch(client_id, game_id, username, "move").await?;

        let _game = self.lock_game(game_id).await;
        self.ensure_in_progress(game_id)?;
        let team = self.seat_of(game_id, &watch)?;

        let mut game = self.store.load_game(game_id)?;
        if game.turn() != team {
            return Err(ChessError::Unauthorized("not your turn".to_string()));
        }

        let moved = game
            .board()
            .piece_at(start)
            .ok_or_else(|| ChessError::InvalidMove(format!("no piece on {}", start)))?;
        let captured = game.make_move(mv)?;

        let opponent = team.opposite();
        let (outcome, status) = if game.is_in_checkmate(opponent) {
            let outcome = Outcome::Checkmate { winner: team };
            (Some(outcome), Some(format!("{} is in checkmate. {}", opponent, outcome)))
        } else if game.is_in_stalemate(opponent) {
            let outcome = Outcome::Stalemate;
            (Some(outcome), Some(format!("{} is in stalemate. {}", opponent, outcome)))
        } else if game.is_in_check(opponent) {
            (None, Some(format!("{} is in check", opponent)))
        } else {
            (None, None)
        };

        self.store.save_game(game_id, &game)?;
        if let Some(outcome) = outcome {
            if let Err(e) = self.store.mark_game_status(game_id, outcome) {
                warn!(
                    "Game {} ended ({}) but the outcome was not recorded: {}",
                    game_id, outcome, e
                );
            }
        }

        let mut description = format!("{} moved {} from {} to {}", username, moved.kind, start, end);
        if let Some(piece) = captured {
            description.push_str(&format!(", capturing {}", piece.kind));
        }
        if let Some(kind) = mv.promotion {
            description.push_str(&format!(", promoting to {}", kind));
        }

        let clients = self.clients.read().await;
        clients.broadcast(
            game_id,
            &Notification::LoadGame {
                game_id,
                game: game.snapshot(),
            },
            None,
        );
        clients.broadcast(
            game_id,
            &Notification::Notification {
                message: description,
            },
            None,
        );
        if let Some(message) = status {
            clients.broadcast(game_id, &Notification::Notification { message }, None);
        }
        Ok(())
    }

    /// Ends the game in the opponent's favour. Only a seated player may resign.
    pub async fn resign(
        &self,
        client_id: ClientId,
        game_id: GameId,
        username: &str,
    ) -> Result<(), ChessError> {
        let watch = self.player_watch(client_id, game_id, username, "resign").await?;

        let _game = self.lock_game(game_id).await;
        self.ensure_in_progress(game_id)?;
        let team = self.seat_of(game_id, &watch)?;

        let outcome = Outcome::Resignation {
            winner: team.opposite(),
        };
        self.store.mark_game_status(game_id, outcome)?;

        let message = format!("{} resigned. {}", username, outcome);
        let clients = self.clients.read().await;
        clients.broadcast(game_id, &Notification::Notification { message }, None);
        Ok(())
    }

    /// Stops watching a game. A seated player also gives up the seat.
    pub async fn leave(&self, client_id: ClientId, game_id: GameId) -> Result<(), ChessError> {
        let watch = {
            let mut clients = self.clients.write().await;
            clients.remove_watcher(game_id, client_id)
        }
        .ok_or_else(|| ChessError::Unauthorized(format!("not watching game {}", game_id)))?;

        let _game = self.lock_game(game_id).await;

        let message = match watch.role {
            Role::Player(team) => {
                self.store.vacate_seat(game_id, team)?;
                format!("{} (player) left game {}", watch.username, game_id)
            }
            Role::Observer => format!("{} (observer) left game {}", watch.username, game_id),
        };

        let clients = self.clients.read().await;
        clients.send_to(
            client_id,
            Notification::Leave {
                message: format!("Left game {}", game_id),
            },
        );
        clients.broadcast(game_id, &Notification::Notification { message }, None);
        Ok(())
    }

    /// Drops a closed connection from every game it watched. Seats stay taken.
    pub async fn disconnect(&self, client_id: ClientId) {
        let games = self.clients.write().await.remove_client(&client_id);
        if !games.is_empty() {
            debug!("Client {} stopped watching games {:?}", client_id, games);
        }
    }

    /// Current state of a game, read without taking its lock
    pub fn snapshot(&self, game_id: GameId) -> Result<Game, ChessError> {
        self.store.load_game(game_id)
    }

    /// Games with a mutex currently held or awaited
    pub fn active_locks(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// The connection's player registration for `game_id`, checked against
    /// the username the command was sent under
    async fn player_watch(
        &self,
        client_id: ClientId,
        game_id: GameId,
        username: &str,
        action: &str,
    ) -> Result<Watch, ChessError> {
        let watch = self
            .clients
            .read()
            .await
            .watch(game_id, client_id)
            .cloned()
            .ok_or_else(|| ChessError::Unauthorized(format!("not watching game {}", game_id)))?;

        if watch.role == Role::Observer {
            return Err(ChessError::Unauthorized(format!("observers cannot {}", action)));
        }
        if watch.username != username {
            return Err(ChessError::Unauthorized(format!(
                "this connection joined game {} as {}",
                game_id, watch.username
            )));
        }
        Ok(watch)
    }

    fn seat_of(&self, game_id: GameId, watch: &Watch) -> Result<Team, ChessError> {
        match (watch.role, self.store.resolve_seat(game_id, &watch.username)) {
            (Role::Player(registered), Some(team)) if registered == team => Ok(team),
            _ => Err(ChessError::Unauthorized(format!(
                "{} is not a player in game {}",
                watch.username, game_id
            ))),
        }
    }

    fn ensure_in_progress(&self, game_id: GameId) -> Result<(), ChessError> {
        match self.store.outcome(game_id) {
            Some(_) => Err(ChessError::InvalidMove("game is already over".to_string())),
            None => Ok(()),
        }
    }

    async fn lock_game(&self, game_id: GameId) -> GameGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(locks.entry(game_id).or_default())
        };
        GameGuard {
            locks: &self.locks,
            game_id,
            guard: Some(lock.lock_owned().await),
        }
    }
}
