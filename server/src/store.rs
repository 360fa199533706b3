//! Persistence and seating boundary
//!
//! Accounts, the game catalog and durable storage live outside this server.
//! The session layer only talks to them through [`GameStore`], loading the
//! authoritative game before each mutation and saving it afterwards.
//! [`MemoryGameStore`] is the in-process implementation the binary runs with.

use log::{debug, info};
use shared::{ChessError, Game, GameId, GameSnapshot, Team};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// How a finished game ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Checkmate { winner: Team },
    Stalemate,
    Resignation { winner: Team },
}

impl Outcome {
    pub fn winner(self) -> Option<Team> {
        match self {
            Outcome::Checkmate { winner } | Outcome::Resignation { winner } => Some(winner),
            Outcome::Stalemate => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Checkmate { winner } => write!(f, "{} wins by checkmate", winner),
            Outcome::Stalemate => write!(f, "draw by stalemate"),
            Outcome::Resignation { winner } => write!(f, "{} wins by resignation", winner),
        }
    }
}

/// What the session layer needs from the account and lobby side.
///
/// Implementations must be safe to call from many connection tasks at once.
/// Callers serialize mutations of one game themselves.
pub trait GameStore: Send + Sync {
    /// Seat held by `username` in this game, if any
    fn resolve_seat(&self, game_id: GameId, username: &str) -> Option<Team>;

    /// Binds `team`'s seat to `username`
    fn claim_seat(&self, game_id: GameId, team: Team, username: &str) -> Result<(), ChessError>;

    /// Frees `team`'s seat
    fn vacate_seat(&self, game_id: GameId, team: Team) -> Result<(), ChessError>;

    fn load_game(&self, game_id: GameId) -> Result<Game, ChessError>;

    fn save_game(&self, game_id: GameId, game: &Game) -> Result<(), ChessError>;

    /// Records a terminal outcome
    fn mark_game_status(&self, game_id: GameId, outcome: Outcome) -> Result<(), ChessError>;

    /// Terminal outcome, if the game has finished
    fn outcome(&self, game_id: GameId) -> Option<Outcome>;
}

#[derive(Debug, Clone)]
struct GameRecord {
    white: Option<String>,
    black: Option<String>,
    state: GameSnapshot,
    outcome: Option<Outcome>,
}

impl GameRecord {
    fn new() -> Self {
        Self {
            white: None,
            black: None,
            state: Game::new().snapshot(),
            outcome: None,
        }
    }

    fn seat_mut(&mut self, team: Team) -> &mut Option<String> {
        match team {
            Team::White => &mut self.white,
            Team::Black => &mut self.black,
        }
    }
}

/// Keeps every game in memory as a snapshot.
///
/// Unknown game ids load as the standard position with both seats empty. A
/// record is only created by a write (a seat claim, a save or an outcome), so
/// lookups for ids nobody plays never grow the map. Games are stored as
/// snapshots, so every load rebuilds and re-validates the board.
#[derive(Default)]
pub struct MemoryGameStore {
    games: Mutex<HashMap<GameId, GameRecord>>,
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a game's stored state without validation
    pub fn put_snapshot(&self, game_id: GameId, snapshot: GameSnapshot) {
        self.with_record(game_id, |record| record.state = snapshot);
    }

    /// Number of games with a stored record
    pub fn game_count(&self) -> usize {
        self.games().len()
    }

    fn games(&self) -> MutexGuard<'_, HashMap<GameId, GameRecord>> {
        self.games.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_record<R>(&self, game_id: GameId, f: impl FnOnce(&GameRecord) -> R) -> Option<R> {
        self.games().get(&game_id).map(f)
    }

    fn with_record<R>(&self, game_id: GameId, f: impl FnOnce(&mut GameRecord) -> R) -> R {
        let mut games = self.games();
        let record = games.entry(game_id).or_insert_with(|| {
            debug!("Creating game {}", game_id);
            GameRecord::new()
        });
        f(record)
    }
}

impl GameStore for MemoryGameStore {
    fn resolve_seat(&self, game_id: GameId, username: &str) -> Option<Team> {
        self.read_record(game_id, |record| {
            if record.white.as_deref() == Some(username) {
                Some(Team::White)
            } else if record.black.as_deref() == Some(username) {
                Some(Team::Black)
            } else {
                None
            }
        })
        .flatten()
    }

    fn claim_seat(&self, game_id: GameId, team: Team, username: &str) -> Result<(), ChessError> {
        self.with_record(game_id, |record| {
            let other = record.seat_mut(team.opposite()).clone();
            if other.as_deref() == Some(username) {
                return Err(ChessError::Unauthorized(format!(
                    "{} already plays {} in game {}",
                    username,
                    team.opposite(),
                    game_id
                )));
            }

            let seat = record.seat_mut(team);
            match seat.as_deref() {
                Some(holder) if holder != username => Err(ChessError::Unauthorized(format!(
                    "{} is already taken in game {}",
                    team, game_id
                ))),
                _ => {
                    *seat = Some(username.to_string());
                    info!("{} took the {} seat in game {}", username, team, game_id);
                    Ok(())
                }
            }
        })
    }

    fn vacate_seat(&self, game_id: GameId, team: Team) -> Result<(), ChessError> {
        let mut games = self.games();
        if let Some(holder) = games
            .get_mut(&game_id)
            .and_then(|record| record.seat_mut(team).take())
        {
            info!("{} gave up the {} seat in game {}", holder, team, game_id);
        }
        Ok(())
    }

    fn load_game(&self, game_id: GameId) -> Result<Game, ChessError> {
        match self.read_record(game_id, |record| record.state.clone()) {
            Some(snapshot) => Game::from_snapshot(&snapshot),
            None => Ok(Game::new()),
        }
    }

    fn save_game(&self, game_id: GameId, game: &Game) -> Result<(), ChessError> {
        let snapshot = game.snapshot();
        self.with_record(game_id, |record| record.state = snapshot);
        Ok(())
    }

    fn mark_game_status(&self, game_id: GameId, outcome: Outcome) -> Result<(), ChessError> {
        self.with_record(game_id, |record| {
            info!("Game {} finished: {}", game_id, outcome);
            record.outcome = Some(outcome);
        });
        Ok(())
    }

    fn outcome(&self, game_id: GameId) -> Option<Outcome> {
        self.read_record(game_id, |record| record.outcome).flatten()
    }
}
