use crate::movegen::ChessMove;
use crate::piece::{Piece, PieceKind, Team};
use crate::square::Square;
use std::fmt;

const BACK_RANK: [PieceKind; 8] = [
    PieceKind::Rook,
    PieceKind::Knight,
    PieceKind::Bishop,
    PieceKind::Queen,
    PieceKind::King,
    PieceKind::Bishop,
    PieceKind::Knight,
    PieceKind::Rook,
];

/// An 8x8 grid of optional pieces.
///
/// The board is plain storage: it never checks whether a placement is legal.
/// It is `Copy`, so check simulation works on a scratch copy and the live
/// board is never touched by a move that gets rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Board {
    grid: [[Option<Piece>; 8]; 8],
}

impl Board {
    /// An empty board
    pub fn new() -> Self {
        Self::default()
    }

    /// A board in the standard starting layout
    pub fn standard() -> Self {
        let mut board = Self::new();
        board.reset();
        board
    }

    /// Puts `piece` (or nothing) on `square`, returning what was there before
    pub fn place(&mut self, square: Square, piece: Option<Piece>) -> Option<Piece> {
        let slot = &mut self.grid[square.row() as usize - 1][square.column() as usize - 1];
        std::mem::replace(slot, piece)
    }

    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.grid[square.row() as usize - 1][square.column() as usize - 1]
    }

    /// Clears every square and sets up the standard layout
    pub fn reset(&mut self) {
        self.grid = [[None; 8]; 8];

        for team in [Team::White, Team::Black] {
            for (column, kind) in BACK_RANK.iter().enumerate() {
                self.grid[team.back_rank() as usize - 1][column] = Some(Piece::new(team, *kind));
                self.grid[team.pawn_rank() as usize - 1][column] =
                    Some(Piece::new(team, PieceKind::Pawn));
            }
        }
    }

    /// Every occupied square with its piece, rank 1 first
    pub fn pieces(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        Square::all().filter_map(move |square| self.piece_at(square).map(|piece| (square, piece)))
    }

    /// Moves the piece on `mv.start` to `mv.end`, replacing it with the
    /// promotion kind when one is given. Returns the captured piece, if any.
    ///
    /// Performs no legality checks; callers validate first.
    pub fn apply(&mut self, mv: &ChessMove) -> Option<Piece> {
        let moving = self.place(mv.start, None);
        let landed = match (moving, mv.promotion) {
            (Some(piece), Some(kind)) => Some(Piece::new(piece.team, kind)),
            (piece, _) => piece,
        };
        self.place(mv.end, landed)
    }
}

/// Text grid with rank 8 at the top, uppercase white, lowercase black.
impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in (1..=8).rev() {
            write!(f, "{} ", row)?;
            for column in 1..=8 {
                let symbol = self.grid[row - 1][column - 1].map_or('.', Piece::symbol);
                write!(f, "{} ", symbol)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "  a b c d e f g h")
    }
}
