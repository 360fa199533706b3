//! Error taxonomy shared by the rules engine and the session layer

use thiserror::Error;

/// Everything that can go wrong between a typed command and a committed move.
///
/// The `Display` text of each variant is what a client sees in an ERROR
/// notification, so messages are written for players, not developers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChessError {
    /// Coordinates outside 1..=8. Only reachable from code, never from parsed input.
    #[error("square ({row}, {column}) is off the board")]
    OutOfBounds { row: i32, column: i32 },

    /// Malformed square notation supplied by a user.
    #[error("invalid square: {0}")]
    InvalidSquare(String),

    /// Well-formed move that the rules do not allow.
    #[error("invalid move: {0}")]
    InvalidMove(String),

    /// Caller is not allowed to perform the action.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Game data that violates board invariants.
    #[error("corrupt game state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, ChessError>;
