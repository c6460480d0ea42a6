//! Counter-move history statistics
//!
//! `CounterMoveHistory`: [prev_pc][prev_to][pc][to] -> score. One table exists
//! per compute node and all threads bound to that node update it concurrently.
//! Cells are relaxed `AtomicI16`; a read-modify-write may lose a concurrent
//! update, which only blurs the statistics.

use std::sync::atomic::{AtomicI16, Ordering};

use crate::types::{Piece, Square};

/// Update divisor: `|bonus|` is clamped to this value
pub const HISTORY_DIVISOR: i32 = 936;

/// Scale applied to the bonus
pub const HISTORY_SCALE: i32 = 32;

/// Largest magnitude a cell converges to
pub const HISTORY_LIMIT: i32 = HISTORY_SCALE * HISTORY_DIVISOR;

const _: () = assert!(HISTORY_LIMIT <= i16::MAX as i32);

/// One history cell
#[derive(Default)]
#[repr(transparent)]
pub struct StatsEntry(AtomicI16);

impl StatsEntry {
    #[inline]
    pub fn get(&self) -> i16 {
        self.0.load(Ordering::Relaxed)
    }

    #[inline]
    fn set(&self, v: i16) {
        self.0.store(v, Ordering::Relaxed);
    }

    /// Adds a bonus with gravity towards zero
    ///
    /// entry += bonus * 32 - entry * |bonus| / D, with bonus clamped to [-D, D]
    #[inline]
    pub fn update(&self, bonus: i32) {
        let clamped = bonus.clamp(-HISTORY_DIVISOR, HISTORY_DIVISOR);
        let current = self.get() as i32;
        let next = current + clamped * HISTORY_SCALE - current * clamped.abs() / HISTORY_DIVISOR;
        self.set(next.clamp(-HISTORY_LIMIT, HISTORY_LIMIT) as i16);
    }
}

/// [pc][to] -> score
pub struct PieceToHistory {
    table: [[StatsEntry; Square::NUM]; Piece::NUM],
}

impl PieceToHistory {
    #[inline]
    pub fn get(&self, pc: Piece, to: Square) -> i16 {
        self.table[pc.index()][to.index()].get()
    }

    #[inline]
    pub fn update(&self, pc: Piece, to: Square, bonus: i32) {
        self.table[pc.index()][to.index()].update(bonus);
    }

    fn clear(&self) {
        for row in &self.table {
            for entry in row {
                entry.set(0);
            }
        }
    }
}

/// [prev_pc][prev_to][pc][to] -> score, about 2MB
pub struct CounterMoveHistory {
    table: [[PieceToHistory; Square::NUM]; Piece::NUM],
}

impl CounterMoveHistory {
    /// Allocates a zeroed table on the heap
    pub fn new_boxed() -> Box<Self> {
        // SAFETY: the table consists only of AtomicI16, for which all-zero is valid
        unsafe { Box::<Self>::new_zeroed().assume_init() }
    }

    /// Continuation table for the previous move
    #[inline]
    pub fn get_table(&self, prev_pc: Piece, prev_to: Square) -> &PieceToHistory {
        &self.table[prev_pc.index()][prev_to.index()]
    }

    #[inline]
    pub fn get(&self, prev_pc: Piece, prev_to: Square, pc: Piece, to: Square) -> i16 {
        self.get_table(prev_pc, prev_to).get(pc, to)
    }

    #[inline]
    pub fn update(&self, prev_pc: Piece, prev_to: Square, pc: Piece, to: Square, bonus: i32) {
        self.get_table(prev_pc, prev_to).update(pc, to, bonus);
    }

    /// Resets every cell to zero
    pub fn clear(&self) {
        for row in &self.table {
            for table in row {
                table.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_entry_update() {
        let entry = StatsEntry::default();
        entry.update(100);
        assert_eq!(entry.get(), 3200);

        // 3200 + 3200 - 3200 * 100 / 936 = 6059
        entry.update(100);
        assert_eq!(entry.get(), 6059);

        entry.update(-100);
        assert!(entry.get() < 6059);
    }

    #[test]
    fn test_stats_entry_converges_to_limit() {
        let entry = StatsEntry::default();
        for _ in 0..200 {
            entry.update(10_000);
        }
        assert_eq!(entry.get() as i32, HISTORY_LIMIT);

        for _ in 0..200 {
            entry.update(-10_000);
        }
        assert_eq!(entry.get() as i32, -HISTORY_LIMIT);
    }

    #[test]
    fn test_counter_move_history_indexing() {
        let cmh = CounterMoveHistory::new_boxed();
        let (p1, p2) = (Piece::new(3), Piece::new(11));
        let (s1, s2) = (Square::new(12), Square::new(60));

        assert_eq!(cmh.get(p1, s1, p2, s2), 0);
        cmh.update(p1, s1, p2, s2, 50);
        assert_eq!(cmh.get(p1, s1, p2, s2), 1600);
        assert_eq!(cmh.get(p2, s2, p1, s1), 0);
        assert_eq!(cmh.get(p1, s1, p2, s1), 0);

        cmh.clear();
        assert_eq!(cmh.get(p1, s1, p2, s2), 0);
    }

    #[test]
    fn test_counter_move_history_shared_between_threads() {
        let cmh = CounterMoveHistory::new_boxed();
        std::thread::scope(|scope| {
            for t in 0..4u8 {
                let cmh = &cmh;
                scope.spawn(move || {
                    for sq in 0..Square::NUM as u8 {
                        cmh.update(Piece::new(t), Square::new(sq), Piece::new(1), Square::new(0), 10);
                    }
                });
            }
        });
        // Each thread owns distinct cells, so nothing is lost
        for t in 0..4u8 {
            assert_eq!(cmh.get(Piece::new(t), Square::new(5), Piece::new(1), Square::new(0)), 320);
        }
    }
}
