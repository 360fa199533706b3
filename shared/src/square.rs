use crate::error::{ChessError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A board coordinate, 1-indexed. Row 1 is white's back rank, column 1 is the a-file.
///
/// Fields are private so every `Square` in existence is on the board,
/// including ones that arrive over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSquare", into = "RawSquare")]
pub struct Square {
    row: u8,
    column: u8,
}

#[derive(Serialize, Deserialize)]
struct RawSquare {
    row: i32,
    column: i32,
}

impl TryFrom<RawSquare> for Square {
    type Error = ChessError;

    fn try_from(raw: RawSquare) -> Result<Self> {
        Square::new(raw.row, raw.column)
    }
}

impl From<Square> for RawSquare {
    fn from(square: Square) -> Self {
        RawSquare {
            row: square.row(),
            column: square.column(),
        }
    }
}

impl Square {
    /// Creates a square, failing with `OutOfBounds` unless both coordinates are in 1..=8
    pub fn new(row: i32, column: i32) -> Result<Self> {
        if (1..=8).contains(&row) && (1..=8).contains(&column) {
            Ok(Self {
                row: row as u8,
                column: column as u8,
            })
        } else {
            Err(ChessError::OutOfBounds { row, column })
        }
    }

    pub fn row(self) -> i32 {
        self.row as i32
    }

    pub fn column(self) -> i32 {
        self.column as i32
    }

    /// Steps by a row/column delta, returning None when the result leaves the board
    pub fn offset(self, d_row: i32, d_column: i32) -> Option<Self> {
        Self::new(self.row() + d_row, self.column() + d_column).ok()
    }

    /// True for rows 1 and 8, where pawns promote
    pub fn is_back_rank(self) -> bool {
        self.row == 1 || self.row == 8
    }

    /// All 64 squares, rank 1 first, a-file first within each rank
    pub fn all() -> impl Iterator<Item = Square> {
        (1..=8u8).flat_map(|row| (1..=8u8).map(move |column| Square { row, column }))
    }

    fn file_letter(self) -> char {
        (b'a' + self.column - 1) as char
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.file_letter(), self.row)
    }
}

/// Parses two-character algebraic notation: a file `a`-`h` (either case) then a rank `1`-`8`.
impl FromStr for Square {
    type Err = ChessError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ChessError::InvalidSquare(s.to_string());

        let mut chars = s.chars();
        let (file, rank) = match (chars.next(), chars.next(), chars.next()) {
            (Some(file), Some(rank), None) => (file.to_ascii_lowercase(), rank),
            _ => return Err(invalid()),
        };

        if !('a'..='h').contains(&file) || !('1'..='8').contains(&rank) {
            return Err(invalid());
        }

        let column = file as i32 - 'a' as i32 + 1;
        let row = rank as i32 - '0' as i32;
        Square::new(row, column).map_err(|_| invalid())
    }
}
