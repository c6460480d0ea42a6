//! Transposition table
//!
//! Caches search results keyed by the 64-bit position hash.
//!
//! - `TTEntry`: 10-byte slot (16-bit key, move, score, eval, generation/bound, depth)
//! - `Cluster`: 3 slots + 2 bytes padding = 32 bytes, two clusters per cache line
//! - `TranspositionTable`: the table itself, generation management, prefetch
//! - raw image save/load
//!
//! The cluster is selected by the low bits of the key and the top 16 bits are
//! matched inside the cluster.
//!
//! # Concurrency
//!
//! All search threads probe and store through a shared reference without any
//! lock. Slot fields are relaxed atomics written one by one, so a concurrent
//! reader may observe a slot that mixes two writes. That is accepted: a torn
//! slot either fails the key check or carries a plausible bound that the search
//! re-verifies, and it is overwritten soon. Slots hold no pointers. Do not put a
//! lock in front of the table.

mod alloc;
mod entry;
mod persist;
mod table;

pub use entry::{TTData, TTEntry};
pub use persist::PersistError;
pub use table::{Cluster, ProbeResult, TranspositionTable};

/// Number of entries per cluster
pub const CLUSTER_SIZE: usize = 3;

/// Bytes per cluster (also the unit of the saved image)
pub const CLUSTER_BYTES: usize = 32;

/// Generation constants
///
/// The generation lives in the upper 6 bits of `gen_bound8`, the bound in the
/// lower 2 bits.
pub const GENERATION_BITS: u32 = 2;
pub const GENERATION_DELTA: u8 = 1 << GENERATION_BITS; // 4
/// 256 is the modulus, +3 keeps the bound bits from borrowing into the age
pub const GENERATION_CYCLE: u16 = 255 + GENERATION_DELTA as u16; // 259
pub const GENERATION_MASK: u16 = 0xFC;
