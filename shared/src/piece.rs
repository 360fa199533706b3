use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    White,
    Black,
}

impl Team {
    pub fn opposite(self) -> Self {
        match self {
            Team::White => Team::Black,
            Team::Black => Team::White,
        }
    }

    /// Row the team's pieces start on
    pub fn back_rank(self) -> i32 {
        match self {
            Team::White => 1,
            Team::Black => 8,
        }
    }

    /// Row the team's pawns start on
    pub fn pawn_rank(self) -> i32 {
        match self {
            Team::White => 2,
            Team::Black => 7,
        }
    }

    /// Row delta of a pawn step
    pub fn forward(self) -> i32 {
        match self {
            Team::White => 1,
            Team::Black => -1,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Team::White => write!(f, "white"),
            Team::Black => write!(f, "black"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceKind {
    King,
    Queen,
    Rook,
    Bishop,
    Knight,
    Pawn,
}

impl PieceKind {
    /// Kinds a pawn may become on the far rank
    pub const PROMOTIONS: [PieceKind; 4] = [
        PieceKind::Queen,
        PieceKind::Rook,
        PieceKind::Bishop,
        PieceKind::Knight,
    ];

    pub fn is_promotion_target(self) -> bool {
        Self::PROMOTIONS.contains(&self)
    }

    /// Lowercase letter used in board printing and promotion input
    pub fn symbol(self) -> char {
        match self {
            PieceKind::King => 'k',
            PieceKind::Queen => 'q',
            PieceKind::Rook => 'r',
            PieceKind::Bishop => 'b',
            PieceKind::Knight => 'n',
            PieceKind::Pawn => 'p',
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol.to_ascii_lowercase() {
            'k' => Some(PieceKind::King),
            'q' => Some(PieceKind::Queen),
            'r' => Some(PieceKind::Rook),
            'b' => Some(PieceKind::Bishop),
            'n' => Some(PieceKind::Knight),
            'p' => Some(PieceKind::Pawn),
            _ => None,
        }
    }
}

impl fmt::Display for PieceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PieceKind::King => "king",
            PieceKind::Queen => "queen",
            PieceKind::Rook => "rook",
            PieceKind::Bishop => "bishop",
            PieceKind::Knight => "knight",
            PieceKind::Pawn => "pawn",
        };
        f.write_str(name)
    }
}

/// A piece is just its team and kind; where it stands is the board's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub team: Team,
    pub kind: PieceKind,
}

impl Piece {
    pub fn new(team: Team, kind: PieceKind) -> Self {
        Self { team, kind }
    }

    /// Board symbol: uppercase for white, lowercase for black
    pub fn symbol(self) -> char {
        match self.team {
            Team::White => self.kind.symbol().to_ascii_uppercase(),
            Team::Black => self.kind.symbol(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_team_opposite() {
        assert_eq!(Team::White.opposite(), Team::Black);
        assert_eq!(Team::Black.opposite(), Team::White);
    }

    #[test]
    fn test_promotion_targets() {
        assert!(PieceKind::Queen.is_promotion_target());
        assert!(PieceKind::Knight.is_promotion_target());
        assert!(!PieceKind::King.is_promotion_target());
        assert!(!PieceKind::Pawn.is_promotion_target());
    }

    #[test]
    fn test_piece_symbols() {
        assert_eq!(Piece::new(Team::White, PieceKind::Knight).symbol(), 'N');
        assert_eq!(Piece::new(Team::Black, PieceKind::Queen).symbol(), 'q');
        assert_eq!(PieceKind::from_symbol('Q'), Some(PieceKind::Queen));
        assert_eq!(PieceKind::from_symbol('x'), None);
    }

    #[test]
    fn test_piece_equality_is_by_value() {
        let a = Piece::new(Team::Black, PieceKind::Rook);
        let b = Piece::new(Team::Black, PieceKind::Rook);
        assert_eq!(a, b);
        assert_ne!(a, Piece::new(Team::White, PieceKind::Rook));
    }
}
