//! Transposition table entry
//!
//! TTEntry: 10-byte slot written field by field with relaxed atomics
//! TTData: plain snapshot returned to the search

use std::sync::atomic::{AtomicI8, AtomicI16, AtomicU8, AtomicU16, Ordering};

use super::{GENERATION_CYCLE, GENERATION_MASK};
use crate::types::{Bound, Depth, Move, Value};

/// Transposition table entry
///
/// The in-memory layout is part of the saved image format, so the field order
/// must not change.
#[derive(Default)]
#[repr(C)]
pub struct TTEntry {
    /// Upper 16 bits of the position key, 0 = empty
    key16: AtomicU16,
    move16: AtomicU16,
    value16: AtomicI16,
    /// Static evaluation
    eval16: AtomicI16,
    /// generation(6bit) | bound(2bit)
    gen_bound8: AtomicU8,
    depth8: AtomicI8,
}

const _: () = assert!(std::mem::size_of::<TTEntry>() == 10);

/// Truncates a full key to the part stored in the slot
#[inline]
pub(super) const fn key16_of(key: u64) -> u16 {
    (key >> 48) as u16
}

impl TTEntry {
    #[inline]
    pub fn key16(&self) -> u16 {
        self.key16.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.key16() == 0
    }

    #[inline]
    pub fn depth8(&self) -> i8 {
        self.depth8.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn gen_bound8(&self) -> u8 {
        self.gen_bound8.load(Ordering::Relaxed)
    }

    /// Generation bits of the slot
    #[inline]
    pub fn generation(&self) -> u8 {
        self.gen_bound8() & GENERATION_MASK as u8
    }

    /// Reads the slot into a plain value
    pub fn read(&self) -> TTData {
        let gen_bound = self.gen_bound8();
        TTData {
            mv: Move::from_u16(self.move16.load(Ordering::Relaxed)),
            value: Value::from(self.value16.load(Ordering::Relaxed)),
            eval: Value::from(self.eval16.load(Ordering::Relaxed)),
            depth: self.depth8() as Depth,
            bound: Bound::from_bits(gen_bound),
            generation: gen_bound & GENERATION_MASK as u8,
        }
    }

    /// Stores a search result
    ///
    /// Kept as individual arguments because this runs on every node the search
    /// stores.
    #[allow(clippy::too_many_arguments)]
    pub fn save(
        &self,
        key: u64,
        value: Value,
        bound: Bound,
        depth: Depth,
        mv: Move,
        eval: Value,
        generation8: u8,
    ) {
        let key16 = key16_of(key);
        let stored_key = self.key16();

        // Keep the previous move for the same position when no new one is given
        if mv != Move::NONE || key16 != stored_key {
            self.move16.store(mv.to_u16(), Ordering::Relaxed);
        }

        // Don't overwrite a deeper result for the same position
        if key16 != stored_key || depth > self.depth8() as Depth - 4 || bound == Bound::Exact {
            debug_assert!((i8::MIN as Depth..=i8::MAX as Depth).contains(&depth));
            debug_assert!((i16::MIN as i32..=i16::MAX as i32).contains(&value.raw()));

            self.key16.store(key16, Ordering::Relaxed);
            self.value16.store(value.raw() as i16, Ordering::Relaxed);
            self.eval16.store(eval.raw() as i16, Ordering::Relaxed);
            self.gen_bound8.store(generation8 | bound.bits(), Ordering::Relaxed);
            self.depth8.store(depth as i8, Ordering::Relaxed);
        }
    }

    /// Moves the slot into the current generation without touching its data
    #[inline]
    pub(super) fn refresh(&self, generation8: u8) {
        let bound = self.gen_bound8() & !(GENERATION_MASK as u8);
        self.gen_bound8.store(generation8 | bound, Ordering::Relaxed);
    }

    /// Age relative to the current generation, in units of `GENERATION_DELTA`
    /// (0 = current search)
    #[inline]
    pub fn relative_age(&self, generation8: u8) -> u8 {
        let age = GENERATION_CYCLE
            .wrapping_add(generation8 as u16)
            .wrapping_sub(self.gen_bound8() as u16);
        (age & GENERATION_MASK) as u8
    }

    /// Replacement value: lower is evicted first
    #[inline]
    pub fn replace_value(&self, generation8: u8) -> i32 {
        self.depth8() as i32 - 2 * self.relative_age(generation8) as i32
    }

    /// Native-endian image of the slot, identical to its memory layout
    pub(super) fn to_bytes(&self) -> [u8; 10] {
        let mut out = [0u8; 10];
        out[0..2].copy_from_slice(&self.key16().to_ne_bytes());
        out[2..4].copy_from_slice(&self.move16.load(Ordering::Relaxed).to_ne_bytes());
        out[4..6].copy_from_slice(&self.value16.load(Ordering::Relaxed).to_ne_bytes());
        out[6..8].copy_from_slice(&self.eval16.load(Ordering::Relaxed).to_ne_bytes());
        out[8] = self.gen_bound8();
        out[9] = self.depth8() as u8;
        out
    }
}

/// Snapshot of a table slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TTData {
    pub mv: Move,
    pub value: Value,
    pub eval: Value,
    pub depth: Depth,
    pub bound: Bound,
    pub generation: u8,
}

impl TTData {
    pub const EMPTY: Self = Self {
        mv: Move::NONE,
        value: Value::NONE,
        eval: Value::NONE,
        depth: 0,
        bound: Bound::None,
        generation: 0,
    };
}

impl Default for TTData {
    fn default() -> Self {
        Self::EMPTY
    }
}
