//! Rules engine and wire protocol shared by the chess server and its clients.
//!
//! The rules half (`square`, `piece`, `board`, `movegen`, `game`) is pure and
//! synchronous. The protocol half defines the commands a client sends
//! ([`Packet`]), the replies and broadcasts the server sends back
//! ([`Notification`]), and the length-prefixed bincode framing both sides use
//! on a TCP stream.

pub mod board;
pub mod error;
pub mod game;
pub mod movegen;
pub mod piece;
pub mod square;

pub use board::Board;
pub use error::ChessError;
pub use game::{Game, GameSnapshot, GameStatus, PlacedPiece};
pub use movegen::{pseudo_legal_moves, ChessMove};
pub use piece::{Piece, PieceKind, Team};
pub use square::Square;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub type GameId = u32;

/// Largest frame payload either side will accept
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Size of the big-endian length prefix in front of every frame
pub const FRAME_HEADER_LEN: usize = 4;

/// Commands sent from a client to the server
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Watch a game, claiming the given seat when a color is supplied
    Join {
        game_id: GameId,
        username: String,
        color: Option<Team>,
    },
    Observe {
        game_id: GameId,
        username: String,
    },
    /// Squares are in algebraic notation, e.g. "e2"
    Move {
        game_id: GameId,
        username: String,
        from: String,
        to: String,
        promotion: Option<PieceKind>,
    },
    Resign {
        game_id: GameId,
        username: String,
    },
    Leave {
        game_id: GameId,
        username: String,
    },
    Disconnect,
}

/// Messages sent from the server to one or more clients
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Notification {
    Connect { client_id: u32 },
    Join { message: String },
    Leave { message: String },
    LoadGame { game_id: GameId, game: GameSnapshot },
    Notification { message: String },
    Error { message: String },
}

/// Serializes `message` and prefixes it with its length
pub fn encode_frame<T: Serialize>(message: &T) -> bincode::Result<Vec<u8>> {
    let payload = bincode::serialize(message)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(Box::new(bincode::ErrorKind::SizeLimit));
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Deserializes a frame payload (the bytes after the length prefix)
pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> bincode::Result<T> {
    bincode::deserialize(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_header_carries_payload_length() {
        let packet = Packet::Observe {
            game_id: 7,
            username: "carol".to_string(),
        };
        let frame = encode_frame(&packet).unwrap();

        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&frame[..FRAME_HEADER_LEN]);
        assert_eq!(u32::from_be_bytes(header) as usize, frame.len() - FRAME_HEADER_LEN);

        let decoded: Packet = decode_payload(&frame[FRAME_HEADER_LEN..]).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_packet_serialization_move() {
        let packet = Packet::Move {
            game_id: 3,
            username: "alice".to_string(),
            from: "e7".to_string(),
            to: "e8".to_string(),
            promotion: Some(PieceKind::Queen),
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Move {
                game_id,
                username,
                from,
                to,
                promotion,
            } => {
                assert_eq!(game_id, 3);
                assert_eq!(username, "alice");
                assert_eq!(from, "e7");
                assert_eq!(to, "e8");
                assert_eq!(promotion, Some(PieceKind::Queen));
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_notification_serialization_load_game() {
        let game = Game::new();
        let notification = Notification::LoadGame {
            game_id: 12,
            game: game.snapshot(),
        };

        let frame = encode_frame(&notification).unwrap();
        let decoded: Notification = decode_payload(&frame[FRAME_HEADER_LEN..]).unwrap();

        match decoded {
            Notification::LoadGame { game_id, game: snapshot } => {
                assert_eq!(game_id, 12);
                assert_eq!(Game::from_snapshot(&snapshot).unwrap(), game);
            }
            _ => panic!("Wrong notification type after deserialization"),
        }
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let notification = Notification::Error {
            message: "x".repeat(MAX_FRAME_LEN + 1),
        };
        assert!(encode_frame(&notification).is_err());
    }

    #[test]
    fn test_malformed_payload_rejected() {
        let frame = encode_frame(&Packet::Disconnect).unwrap();
        let mut corrupted = frame[FRAME_HEADER_LEN..].to_vec();
        corrupted[0] = 0xFF;

        assert!(decode_payload::<Packet>(&corrupted).is_err());
        assert!(decode_payload::<Packet>(&[]).is_err());
    }
}
