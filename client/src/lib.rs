//! # Chess Console Client Library
//!
//! A line-oriented client for the chess session server. It reads commands
//! from standard input, sends them as [`shared::Packet`] frames, and prints
//! every [`shared::Notification`] the server pushes back, drawing boards as
//! plain text.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! Parses typed lines into commands:
//! - Game numbers, colors and promotion letters
//! - Square notation, checked before anything is sent
//! - Local commands (`help`, `quit`) that never reach the server
//!
//! ### Network Module (`network`)
//! Owns the TCP connection:
//! - Length-prefixed frame reading and writing
//! - A background task that prints notifications as they arrive
//! - Rendering of LOAD_GAME snapshots through the shared rules engine
//!
//! The client never judges moves itself. Whatever board the server sends is
//! the board it shows.

pub mod input;
pub mod network;
