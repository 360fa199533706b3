//! Authoritative game state: board, side to move and both kings' squares

use crate::board::Board;
use crate::error::{ChessError, Result};
use crate::movegen::{is_attacked, pseudo_legal_moves, ChessMove};
use crate::piece::{Piece, PieceKind, Team};
use crate::square::Square;
use serde::{Deserialize, Serialize};

/// Status of the side to move, derived from the position on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    Active,
    Check,
    Checkmate,
    Stalemate,
}

impl GameStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, GameStatus::Checkmate | GameStatus::Stalemate)
    }
}

/// One occupied square in a [`GameSnapshot`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedPiece {
    pub team: Team,
    pub kind: PieceKind,
    pub square: Square,
}

/// Full board plus side to move, as sent to clients and kept by stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub turn: Team,
    pub pieces: Vec<PlacedPiece>,
}

/// A chess game that only changes through [`Game::make_move`].
///
/// King squares are tracked here, not on the pieces, and are updated only by
/// `make_move` and `set_board`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    board: Board,
    turn: Team,
    white_king: Square,
    black_king: Square,
}

impl Game {
    /// Standard starting position, white to move
    pub fn new() -> Self {
        Self::from_board(Board::standard(), Team::White)
            .expect("standard layout has both kings")
    }

    /// A game on an arbitrary board. Fails with `InvalidState` unless each team has exactly one king.
    pub fn from_board(board: Board, turn: Team) -> Result<Self> {
        let (white_king, black_king) = find_kings(&board)?;
        Ok(Self {
            board,
            turn,
            white_king,
            black_king,
        })
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn turn(&self) -> Team {
        self.turn
    }

    pub fn king_square(&self, team: Team) -> Square {
        match team {
            Team::White => self.white_king,
            Team::Black => self.black_king,
        }
    }

    /// Replaces the board wholesale and re-derives both king squares
    pub fn set_board(&mut self, board: Board) -> Result<()> {
        let (white_king, black_king) = find_kings(&board)?;
        self.board = board;
        self.white_king = white_king;
        self.black_king = black_king;
        Ok(())
    }

    /// Legal moves for the piece on `square`.
    ///
    /// Empty when the square is empty or holds a piece of the side not on move.
    pub fn valid_moves(&self, square: Square) -> Vec<ChessMove> {
        match self.board.piece_at(square) {
            Some(piece) if piece.team == self.turn => self.legal_moves_from(square, piece),
            _ => Vec::new(),
        }
    }

    /// Validates and plays `mv`, then passes the turn. Returns the captured piece.
    ///
    /// On error the game is left exactly as it was.
    pub fn make_move(&mut self, mv: ChessMove) -> Result<Option<Piece>> {
        let piece = self
            .board
            .piece_at(mv.start)
            .ok_or_else(|| ChessError::InvalidMove(format!("no piece at {}", mv.start)))?;

        if piece.team != self.turn {
            return Err(ChessError::InvalidMove(format!(
                "it is {}'s turn",
                self.turn
            )));
        }

        let promoting = piece.kind == PieceKind::Pawn && mv.end.is_back_rank();
        match mv.promotion {
            None if promoting => {
                return Err(ChessError::InvalidMove(format!(
                    "a pawn reaching {} must promote",
                    mv.end
                )));
            }
            Some(kind) if !promoting => {
                return Err(ChessError::InvalidMove(format!(
                    "only a pawn reaching the last rank can become a {}",
                    kind
                )));
            }
            Some(kind) if !kind.is_promotion_target() => {
                return Err(ChessError::InvalidMove(format!(
                    "a pawn cannot promote to a {}",
                    kind
                )));
            }
            _ => {}
        }

        if !self.legal_moves_from(mv.start, piece).contains(&mv) {
            return Err(ChessError::InvalidMove(format!(
                "{} cannot move from {} to {}",
                piece.kind, mv.start, mv.end
            )));
        }

        let captured = self.board.apply(&mv);
        if piece.kind == PieceKind::King {
            match piece.team {
                Team::White => self.white_king = mv.end,
                Team::Black => self.black_king = mv.end,
            }
        }
        self.turn = self.turn.opposite();

        Ok(captured)
    }

    /// True iff an enemy piece could capture `team`'s king
    pub fn is_in_check(&self, team: Team) -> bool {
        is_attacked(&self.board, self.king_square(team), team.opposite())
    }

    /// In check with no legal move. Evaluated as if `team` were on move.
    pub fn is_in_checkmate(&self, team: Team) -> bool {
        self.is_in_check(team) && !self.has_legal_move(team)
    }

    /// Not in check but with no legal move. Evaluated as if `team` were on move.
    pub fn is_in_stalemate(&self, team: Team) -> bool {
        !self.is_in_check(team) && !self.has_legal_move(team)
    }

    /// Status of the side to move
    pub fn status(&self) -> GameStatus {
        let team = self.turn;
        match (self.is_in_check(team), self.has_legal_move(team)) {
            (true, false) => GameStatus::Checkmate,
            (false, false) => GameStatus::Stalemate,
            (true, true) => GameStatus::Check,
            (false, true) => GameStatus::Active,
        }
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            turn: self.turn,
            pieces: self
                .board
                .pieces()
                .map(|(square, piece)| PlacedPiece {
                    team: piece.team,
                    kind: piece.kind,
                    square,
                })
                .collect(),
        }
    }

    /// Rebuilds a game from a snapshot, rejecting doubled squares and bad king counts
    pub fn from_snapshot(snapshot: &GameSnapshot) -> Result<Self> {
        let mut board = Board::new();
        for placed in &snapshot.pieces {
            let piece = Piece::new(placed.team, placed.kind);
            if board.place(placed.square, Some(piece)).is_some() {
                return Err(ChessError::InvalidState(format!(
                    "two pieces on {}",
                    placed.square
                )));
            }
        }
        Self::from_board(board, snapshot.turn)
    }

    fn has_legal_move(&self, team: Team) -> bool {
        self.board
            .pieces()
            .filter(|(_, piece)| piece.team == team)
            .any(|(square, piece)| !self.legal_moves_from(square, piece).is_empty())
    }

    /// Pseudo-legal moves of `piece` that do not leave its own king attacked,
    /// each tried on a scratch copy of the board.
    fn legal_moves_from(&self, square: Square, piece: Piece) -> Vec<ChessMove> {
        pseudo_legal_moves(&self.board, square)
            .into_iter()
            .filter(|mv| {
                let mut scratch = self.board;
                scratch.apply(mv);
                let king = if piece.kind == PieceKind::King {
                    mv.end
                } else {
                    self.king_square(piece.team)
                };
                !is_attacked(&scratch, king, piece.team.opposite())
            })
            .collect()
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

fn find_kings(board: &Board) -> Result<(Square, Square)> {
    let mut white = None;
    let mut black = None;

    for (square, piece) in board.pieces() {
        if piece.kind != PieceKind::King {
            continue;
        }
        let slot = match piece.team {
            Team::White => &mut white,
            Team::Black => &mut black,
        };
        if slot.replace(square).is_some() {
            return Err(ChessError::InvalidState(format!(
                "{} has more than one king",
                piece.team
            )));
        }
    }

    match (white, black) {
        (Some(white), Some(black)) => Ok((white, black)),
        (None, _) => Err(ChessError::InvalidState("white king is missing".to_string())),
        (_, None) => Err(ChessError::InvalidState("black king is missing".to_string())),
    }
}
