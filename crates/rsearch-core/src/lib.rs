//! # rsearch-core
//!
//! Shared infrastructure under a parallel tree search.
//!
//! ## Modules
//!
//! - `types`: basic value types (Color, Value, Bound, Move, Piece, Square)
//! - `tt`: transposition table shared lock-free by all search threads
//! - `numa`: topology discovery, thread-to-node binding, per-node scratch
//! - `history`: counter-move history kept per node
//! - `time`: optimum/maximum time budget per search
//! - `options` / `output`: seams to the protocol layer
//! - `context`: `EngineContext`, owner of one of each of the above
//!

pub mod types;

pub mod tt;

pub mod history;
pub mod numa;

pub mod time;

pub mod options;
pub mod output;

pub mod context;

pub use context::{EngineContext, WorkerSetup};
pub use numa::NodeRegistry;
pub use tt::TranspositionTable;
