//! Basic value types shared by the table, the history tables and the time manager.
//!
//! - `Color`: side to move
//! - `Value`: search score
//! - `Bound`: score bound kind stored in the transposition table
//! - `Move`: 16-bit packed move
//! - `Piece` / `Square`: indices used by the history statistics

mod bound;
mod color;
mod moves;
mod piece;
mod value;

pub use bound::Bound;
pub use color::Color;
pub use moves::Move;
pub use piece::{Piece, Square};
pub use value::Value;

/// Search depth in plies
pub type Depth = i32;

/// Milliseconds (or nodes in nodes-as-time mode)
pub type TimePoint = i64;
