//! # Chess Session Server Library
//!
//! This library provides the authoritative server for live chess games. Clients
//! connect over TCP, join games as players or observers, and submit moves; the
//! server validates every command against the rules engine in `shared` and
//! pushes the results to everyone watching the game.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Rules
//! Every move is checked by [`shared::Game`] on the server before it is
//! committed. Clients never decide legality, they only display the boards the
//! server sends them.
//!
//! ### Watcher Fan-out
//! A game can have any number of watchers. After a committed move every watcher,
//! the mover included, receives the new board first and then a readable
//! description, followed by a check, checkmate or stalemate notice when the
//! opponent is affected.
//!
//! ### Failure Isolation
//! A rejected command produces an ERROR for its sender and nothing else. The
//! stored game is untouched, and a dead connection never delays delivery to the
//! remaining watchers.
//!
//! ## Architecture Design
//!
//! ### Task per Connection
//! Each accepted socket gets a reader task that decodes commands and a writer
//! task that drains an unbounded queue of notifications. Broadcasting is just
//! pushing onto those queues, so it never waits on the network.
//!
//! ### Per-game Critical Sections
//! Commands that change a game (move, resign, seat claim, seat release) take
//! that game's async mutex for the whole load, validate, save and broadcast
//! sequence. Two moves racing for the same game are serialized; games never
//! wait on each other.
//!
//! ### Stateless Sessions
//! The session layer keeps no game state of its own. It loads the game from a
//! [`store::GameStore`] before each mutation and saves it afterwards.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Connection registry and per-game watcher sets:
//! - Client ID assignment and capacity limits
//! - Watcher registration with player or observer role
//! - Best-effort single and broadcast delivery
//!
//! ### Session Module (`session`)
//! Command handlers for join, observe, move, resign, leave and disconnect.
//!
//! ### Store Module (`store`)
//! The persistence and seating boundary, plus the in-memory implementation.
//!
//! ### Network Module (`network`)
//! TCP accept loop, frame decoding and the per-connection reader and writer tasks.
//!
//! ## Protocol
//!
//! Frames are a 4-byte big-endian length followed by a bincode payload:
//! - **Client to server**: [`shared::Packet`]
//! - **Server to client**: [`shared::Notification`]
//!
//! Every connection is greeted with `Notification::Connect` carrying its ID.
//! Frames over [`shared::MAX_FRAME_LEN`] close the connection.

pub mod client_manager;
pub mod network;
pub mod session;
pub mod store;

pub use network::Server;
pub use session::GameSessions;
pub use store::{GameStore, MemoryGameStore, Outcome};
