//! Pseudo-legal move generation
//!
//! Each piece kind maps onto one of three movement patterns: sliding along
//! rays, stepping to fixed offsets, or the pawn's own rules. Generation
//! ignores whether the mover's king is left in check; the game layer filters
//! for that.

use crate::board::Board;
use crate::piece::{Piece, PieceKind, Team};
use crate::square::Square;
use serde::{Deserialize, Serialize};
use std::fmt;

const ORTHOGONAL: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const DIAGONAL: [(i32, i32); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];
const ROYAL: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];
const KNIGHT_JUMPS: [(i32, i32); 8] = [
    (1, 2),
    (1, -2),
    (-1, 2),
    (-1, -2),
    (2, 1),
    (2, -1),
    (-2, 1),
    (-2, -1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChessMove {
    pub start: Square,
    pub end: Square,
    pub promotion: Option<PieceKind>,
}

impl ChessMove {
    pub fn new(start: Square, end: Square) -> Self {
        Self {
            start,
            end,
            promotion: None,
        }
    }

    pub fn with_promotion(start: Square, end: Square, kind: PieceKind) -> Self {
        Self {
            start,
            end,
            promotion: Some(kind),
        }
    }
}

impl fmt::Display for ChessMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.start, self.end)?;
        if let Some(kind) = self.promotion {
            write!(f, "{}", kind.symbol())?;
        }
        Ok(())
    }
}

/// How a piece kind moves across the board
#[derive(Debug, Clone, Copy)]
enum Movement {
    /// Repeats each direction until blocked or off the board
    Slide(&'static [(i32, i32)]),
    /// Takes each offset once
    Step(&'static [(i32, i32)]),
    Pawn,
}

impl Movement {
    fn of(kind: PieceKind) -> Self {
        match kind {
            PieceKind::Rook => Movement::Slide(&ORTHOGONAL),
            PieceKind::Bishop => Movement::Slide(&DIAGONAL),
            PieceKind::Queen => Movement::Slide(&ROYAL),
            PieceKind::Knight => Movement::Step(&KNIGHT_JUMPS),
            PieceKind::King => Movement::Step(&ROYAL),
            PieceKind::Pawn => Movement::Pawn,
        }
    }
}

/// Moves the piece on `square` could make by its movement pattern alone.
/// Returns an empty list when the square is empty.
pub fn pseudo_legal_moves(board: &Board, square: Square) -> Vec<ChessMove> {
    let Some(piece) = board.piece_at(square) else {
        return Vec::new();
    };

    let mut moves = Vec::new();
    match Movement::of(piece.kind) {
        Movement::Slide(directions) => slide(board, square, piece.team, directions, &mut moves),
        Movement::Step(offsets) => step(board, square, piece.team, offsets, &mut moves),
        Movement::Pawn => pawn(board, square, piece.team, &mut moves),
    }
    moves
}

/// True if any piece of `attacker` has a pseudo-legal move ending on `target`.
///
/// Meant for occupied targets such as a king's square, where pawn pushes
/// cannot land. Scans the whole board and regenerates moves for each
/// attacking piece.
pub fn is_attacked(board: &Board, target: Square, attacker: Team) -> bool {
    board
        .pieces()
        .filter(|(_, piece)| piece.team == attacker)
        .any(|(square, _)| {
            pseudo_legal_moves(board, square)
                .iter()
                .any(|mv| mv.end == target)
        })
}

fn is_enemy(board: &Board, square: Square, team: Team) -> bool {
    matches!(board.piece_at(square), Some(Piece { team: other, .. }) if other != team)
}

fn slide(
    board: &Board,
    from: Square,
    team: Team,
    directions: &[(i32, i32)],
    moves: &mut Vec<ChessMove>,
) {
    for &(d_row, d_column) in directions {
        let mut current = from;
        while let Some(next) = current.offset(d_row, d_column) {
            match board.piece_at(next) {
                None => moves.push(ChessMove::new(from, next)),
                Some(blocker) => {
                    if blocker.team != team {
                        moves.push(ChessMove::new(from, next));
                    }
                    break;
                }
            }
            current = next;
        }
    }
}

fn step(
    board: &Board,
    from: Square,
    team: Team,
    offsets: &[(i32, i32)],
    moves: &mut Vec<ChessMove>,
) {
    for &(d_row, d_column) in offsets {
        if let Some(target) = from.offset(d_row, d_column) {
            let friendly = matches!(board.piece_at(target), Some(piece) if piece.team == team);
            if !friendly {
                moves.push(ChessMove::new(from, target));
            }
        }
    }
}

fn pawn(board: &Board, from: Square, team: Team, moves: &mut Vec<ChessMove>) {
    let forward = team.forward();

    if let Some(one) = from.offset(forward, 0) {
        if board.piece_at(one).is_none() {
            push_pawn_move(from, one, moves);

            if from.row() == team.pawn_rank() {
                if let Some(two) = from.offset(2 * forward, 0) {
                    if board.piece_at(two).is_none() {
                        push_pawn_move(from, two, moves);
                    }
                }
            }
        }
    }

    for d_column in [-1, 1] {
        if let Some(target) = from.offset(forward, d_column) {
            if is_enemy(board, target, team) {
                push_pawn_move(from, target, moves);
            }
        }
    }
}

/// Arrivals on the far rank expand into one move per promotion kind
fn push_pawn_move(from: Square, to: Square, moves: &mut Vec<ChessMove>) {
    if to.is_back_rank() {
        moves.extend(
            PieceKind::PROMOTIONS
                .iter()
                .map(|&kind| ChessMove::with_promotion(from, to, kind)),
        );
    } else {
        moves.push(ChessMove::new(from, to));
    }
}
