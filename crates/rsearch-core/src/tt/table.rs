//! TranspositionTable itself
//!
//! - Cluster: group of entries sharing one lookup bucket
//! - TranspositionTable: sizing, clearing, probe, hashfull

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, Ordering};

use log::{debug, info};

use super::alloc::{AllocKind, Allocation};
use super::entry::{TTData, TTEntry, key16_of};
use super::{CLUSTER_BYTES, CLUSTER_SIZE, GENERATION_DELTA};
use crate::types::{Bound, Depth, Move, Value};

/// Cluster of entries
///
/// 10 bytes x 3 + 2 bytes padding = 32 bytes, so two clusters share a 64-byte
/// cache line.
#[repr(C, align(32))]
pub struct Cluster {
    entries: [TTEntry; CLUSTER_SIZE],
    _padding: [u8; 2],
}

const _: () = assert!(std::mem::size_of::<Cluster>() == CLUSTER_BYTES);

impl Cluster {
    #[inline]
    pub fn entries(&self) -> &[TTEntry; CLUSTER_SIZE] {
        &self.entries
    }

    /// Memory image of the cluster (padding is always zero)
    pub(super) fn to_bytes(&self) -> [u8; CLUSTER_BYTES] {
        let mut out = [0u8; CLUSTER_BYTES];
        for (i, entry) in self.entries.iter().enumerate() {
            out[i * 10..(i + 1) * 10].copy_from_slice(&entry.to_bytes());
        }
        out
    }
}

/// Owned cluster array on top of a raw allocation
pub(super) struct ClusterTable {
    alloc: Allocation,
    len: usize,
    large_pages_requested: bool,
}

impl ClusterTable {
    fn new(len: usize, large_pages: bool) -> Self {
        let bytes = len * std::mem::size_of::<Cluster>();
        let alloc = Allocation::allocate(bytes, std::mem::align_of::<Cluster>(), large_pages);
        Self {
            alloc,
            len,
            large_pages_requested: large_pages,
        }
    }

    fn uses_large_pages(&self) -> bool {
        self.alloc.kind() == AllocKind::LargePages
    }

    /// Raw bytes of the whole array, for bulk restore
    pub(super) fn as_bytes_mut(&mut self) -> &mut [u8] {
        debug_assert!(self.alloc.size() >= self.len * CLUSTER_BYTES);
        // SAFETY: the allocation covers len clusters, `&mut self` excludes all
        // other access, and every bit pattern is a valid cluster.
        unsafe {
            std::slice::from_raw_parts_mut(self.alloc.ptr().as_ptr(), self.len * CLUSTER_BYTES)
        }
    }
}

impl Deref for ClusterTable {
    type Target = [Cluster];

    fn deref(&self) -> &Self::Target {
        // SAFETY: the allocation is zero-initialized, aligned for Cluster and holds len clusters
        unsafe { std::slice::from_raw_parts(self.alloc.ptr().as_ptr() as *const Cluster, self.len) }
    }
}

impl DerefMut for ClusterTable {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe {
            std::slice::from_raw_parts_mut(self.alloc.ptr().as_ptr() as *mut Cluster, self.len)
        }
    }
}

/// Number of clusters for a size in megabytes: the largest power of two that fits
pub fn cluster_count_for_mb(mb_size: usize) -> usize {
    let fits = mb_size.saturating_mul(1024 * 1024) / CLUSTER_BYTES;
    floor_pow2(fits)
}

/// Largest power of two <= n, at least 1
pub(super) fn floor_pow2(n: usize) -> usize {
    if n == 0 { 1 } else { 1 << (usize::BITS - 1 - n.leading_zeros()) }
}

/// Transposition table
pub struct TranspositionTable {
    /// `None` only transiently inside `reallocate`
    table: Option<ClusterTable>,
    /// Generation counter (lower 2 bits always zero)
    generation8: AtomicU8,
    /// Last size passed to `resize`, reused by `resize(0, ..)`
    last_mb_size: usize,
}

impl TranspositionTable {
    /// Creates a table of `mb_size` megabytes, rounded down to a power of two
    /// number of clusters
    pub fn new(mb_size: usize, large_pages: bool) -> Self {
        let mut tt = Self {
            table: None,
            generation8: AtomicU8::new(0),
            last_mb_size: mb_size,
        };
        tt.reallocate(cluster_count_for_mb(mb_size), large_pages);
        tt
    }

    /// Changes the size
    ///
    /// Returns `true` if the table was reallocated (and therefore cleared).
    /// Re-applying the same effective size and page mode is a no-op so that
    /// repeated option updates do not throw away the table.
    pub fn resize(&mut self, mb_size: usize, large_pages: bool) -> bool {
        let mb_size = if mb_size == 0 { self.last_mb_size } else { mb_size };
        if mb_size == 0 {
            return false;
        }
        self.last_mb_size = mb_size;

        let new_count = cluster_count_for_mb(mb_size);
        if new_count == self.cluster_count() && self.large_pages_requested() == large_pages {
            debug!("transposition table resize to {mb_size}MB is a no-op");
            return false;
        }

        self.reallocate(new_count, large_pages);
        true
    }

    /// Replaces the allocation with `cluster_count` zeroed clusters
    pub(super) fn reallocate(&mut self, cluster_count: usize, large_pages: bool) {
        debug_assert!(cluster_count.is_power_of_two());

        // Free the old block before asking for the new one
        self.table = None;
        let table = ClusterTable::new(cluster_count, large_pages);
        info!(
            "transposition table: {} clusters ({}MB){}",
            cluster_count,
            (cluster_count * CLUSTER_BYTES) >> 20,
            if table.uses_large_pages() { ", large pages" } else { "" }
        );
        self.table = Some(table);
        self.generation8.store(0, Ordering::Relaxed);
    }

    /// Every cluster, in index order
    #[inline]
    pub fn clusters(&self) -> &[Cluster] {
        self.table.as_deref().unwrap_or(&[])
    }

    #[inline]
    pub(super) fn cluster_at(&self, index: usize) -> &Cluster {
        &self.clusters()[index]
    }

    pub(super) fn table_mut(&mut self) -> Option<&mut ClusterTable> {
        self.table.as_mut()
    }

    /// Zero-fills every cluster and resets the generation
    pub fn clear(&mut self) {
        self.generation8.store(0, Ordering::Relaxed);
        let Some(table) = self.table.as_mut() else {
            return;
        };
        let len = table.len();
        let threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);

        // Small tables or a single core: clear in place
        if threads <= 1 || len < threads * 1024 {
            table.as_bytes_mut().fill(0);
            return;
        }

        let chunk = len.div_ceil(threads);
        std::thread::scope(|scope| {
            for part in table.chunks_mut(chunk) {
                scope.spawn(move || {
                    // SAFETY: all-zero bytes are a valid empty cluster
                    unsafe { std::ptr::write_bytes(part.as_mut_ptr(), 0, part.len()) };
                });
            }
        });
    }

    /// Starts a new search (advances the generation)
    pub fn new_search(&self) {
        self.generation8.fetch_add(GENERATION_DELTA, Ordering::Relaxed);
    }

    #[inline]
    pub fn generation(&self) -> u8 {
        self.generation8.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn cluster_count(&self) -> usize {
        self.clusters().len()
    }

    /// Bytes currently allocated for clusters
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.cluster_count() * CLUSTER_BYTES
    }

    /// Whether the allocation is backed by large pages
    pub fn uses_large_pages(&self) -> bool {
        self.table.as_ref().is_some_and(ClusterTable::uses_large_pages)
    }

    /// Page mode asked for on the last allocation, granted or not
    pub(super) fn large_pages_requested(&self) -> bool {
        self.table.as_ref().is_some_and(|t| t.large_pages_requested)
    }

    /// Address of the backing block, stable until the next reallocation
    pub fn backing_addr(&self) -> usize {
        self.clusters().as_ptr() as usize
    }

    #[inline]
    fn cluster_index(&self, key: u64) -> usize {
        (key as usize) & (self.cluster_count() - 1)
    }

    #[inline]
    pub fn first_entry(&self, key: u64) -> &Cluster {
        &self.clusters()[self.cluster_index(key)]
    }

    /// Looks up `key`
    ///
    /// On a hit, returns `found = true` and the matching slot, moved into the
    /// current generation. Otherwise returns `found = false` and the slot the
    /// caller should overwrite: the first empty slot, or the one with the
    /// lowest `depth - 8 * age` value.
    pub fn probe(&self, key: u64) -> ProbeResult<'_> {
        let cluster = self.first_entry(key);
        let key16 = key16_of(key);
        let gen8 = self.generation();

        for entry in &cluster.entries {
            let stored = entry.key16();
            if stored == 0 || stored == key16 {
                if stored != 0 && entry.generation() != gen8 {
                    entry.refresh(gen8);
                }
                return ProbeResult {
                    found: stored != 0,
                    entry,
                    generation8: gen8,
                };
            }
        }

        let mut replace = &cluster.entries[0];
        for entry in &cluster.entries[1..] {
            if replace.replace_value(gen8) > entry.replace_value(gen8) {
                replace = entry;
            }
        }

        ProbeResult {
            found: false,
            entry: replace,
            generation8: gen8,
        }
    }

    /// Per-mille estimate of how much of the table the current search has
    /// written, sampled from the first clusters
    pub fn hashfull(&self) -> i32 {
        let gen8 = self.generation();
        let sample = (1000 / CLUSTER_SIZE).min(self.cluster_count());
        let mut count = 0;

        for cluster in self.clusters().iter().take(sample) {
            for entry in &cluster.entries {
                if !entry.is_empty() && entry.generation() == gen8 {
                    count += 1;
                }
            }
        }

        (count * 1000 / (sample * CLUSTER_SIZE)) as i32
    }

    /// Issues a cache prefetch for the cluster of `key`
    #[inline]
    pub fn prefetch(&self, key: u64) {
        let cluster = self.first_entry(key);

        #[cfg(target_arch = "x86_64")]
        unsafe {
            use std::arch::x86_64::{_MM_HINT_T0, _mm_prefetch};
            _mm_prefetch::<_MM_HINT_T0>(cluster as *const _ as *const i8);
        }

        #[cfg(not(target_arch = "x86_64"))]
        let _ = cluster;
    }
}

/// probe result
pub struct ProbeResult<'a> {
    /// Whether the key was found
    pub found: bool,
    /// Matching slot on a hit, slot to overwrite on a miss
    pub entry: &'a TTEntry,
    generation8: u8,
}

impl ProbeResult<'_> {
    /// Snapshot of the slot (meaningful only when `found`)
    #[inline]
    pub fn data(&self) -> TTData {
        if self.found { self.entry.read() } else { TTData::EMPTY }
    }

    /// Stores into the probed slot with the generation seen at probe time
    #[allow(clippy::too_many_arguments)]
    #[inline]
    pub fn write(
        &self,
        key: u64,
        value: Value,
        bound: Bound,
        depth: Depth,
        mv: Move,
        eval: Value,
    ) {
        self.entry.save(key, value, bound, depth, mv, eval, self.generation8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Square;

    fn key_in_cluster(cluster: u64, key16: u16) -> u64 {
        ((key16 as u64) << 48) | cluster
    }

    #[test]
    fn test_tt_new() {
        let tt = TranspositionTable::new(1, false);
        assert_eq!(tt.cluster_count(), 1024 * 1024 / CLUSTER_BYTES);
        assert_eq!(tt.generation(), 0);
        assert!(!tt.uses_large_pages());
    }

    #[test]
    fn test_cluster_count_rounds_down_to_power_of_two() {
        assert_eq!(cluster_count_for_mb(1), 32768);
        assert_eq!(cluster_count_for_mb(3), 65536);
        assert_eq!(cluster_count_for_mb(100), 2_097_152);
        for mb in [5, 7, 12, 33, 1000] {
            let count = cluster_count_for_mb(mb);
            assert!(count.is_power_of_two());
            assert!(count * CLUSTER_BYTES <= mb * 1024 * 1024);
            assert!(count * 2 * CLUSTER_BYTES > mb * 1024 * 1024);
        }
    }

    #[test]
    fn test_tt_new_search() {
        let tt = TranspositionTable::new(1, false);
        tt.new_search();
        assert_eq!(tt.generation(), GENERATION_DELTA);
        tt.new_search();
        assert_eq!(tt.generation(), GENERATION_DELTA * 2);
    }

    #[test]
    fn test_tt_generation_wraps() {
        let tt = TranspositionTable::new(1, false);
        for _ in 0..300 {
            tt.new_search();
        }
        // 300 * 4 = 1200, 1200 % 256 = 176
        assert_eq!(tt.generation(), 176);
    }

    #[test]
    fn test_tt_probe_empty() {
        let tt = TranspositionTable::new(1, false);
        let result = tt.probe(0xdead_beef_0000_1234);
        assert!(!result.found);
        assert!(result.entry.is_empty());
        assert_eq!(result.data(), TTData::EMPTY);
    }

    #[test]
    fn test_tt_probe_and_write() {
        let tt = TranspositionTable::new(1, false);
        tt.new_search();
        let key = 0xabcd_0123_4567_89ef;
        let mv = Move::new(Square::new(52), Square::new(36));

        let probe1 = tt.probe(key);
        assert!(!probe1.found);
        probe1.write(key, Value::new(50), Bound::Exact, 10, mv, Value::new(12));

        let probe2 = tt.probe(key);
        assert!(probe2.found);
        let data = probe2.data();
        assert_eq!(data.value.raw(), 50);
        assert_eq!(data.eval.raw(), 12);
        assert_eq!(data.depth, 10);
        assert_eq!(data.bound, Bound::Exact);
        assert_eq!(data.mv, mv);
        assert_eq!(data.generation, tt.generation());
    }

    #[test]
    fn test_tt_probe_refreshes_stale_hit() {
        let tt = TranspositionTable::new(1, false);
        let key = key_in_cluster(7, 0x4242);
        tt.probe(key).write(key, Value::new(1), Bound::Lower, 6, Move::NONE, Value::ZERO);

        tt.new_search();
        tt.new_search();
        let hit = tt.probe(key);
        assert!(hit.found);
        assert_eq!(hit.entry.generation(), tt.generation());
        assert_eq!(hit.data().bound, Bound::Lower);
        assert_eq!(hit.data().depth, 6);
    }

    #[test]
    fn test_tt_replaces_shallow_old_entry() {
        let tt = TranspositionTable::new(1, false);
        let cluster = 99;

        // Fill the cluster: an old deep entry, an old shallow entry, a fresh one
        let old_deep = key_in_cluster(cluster, 1);
        let old_shallow = key_in_cluster(cluster, 2);
        tt.probe(old_deep).write(old_deep, Value::ZERO, Bound::Lower, 30, Move::NONE, Value::ZERO);
        tt.probe(old_shallow).write(old_shallow, Value::ZERO, Bound::Lower, 2, Move::NONE, Value::ZERO);
        tt.new_search();
        let fresh = key_in_cluster(cluster, 3);
        tt.probe(fresh).write(fresh, Value::ZERO, Bound::Lower, 4, Move::NONE, Value::ZERO);

        let miss = tt.probe(key_in_cluster(cluster, 4));
        assert!(!miss.found);
        assert_eq!(miss.entry.key16(), 2);
    }

    #[test]
    fn test_tt_age_beats_depth_after_many_searches() {
        let tt = TranspositionTable::new(1, false);
        let cluster = 5;
        let a = key_in_cluster(cluster, 1);
        let b = key_in_cluster(cluster, 2);
        let c = key_in_cluster(cluster, 3);
        tt.probe(a).write(a, Value::ZERO, Bound::Lower, 20, Move::NONE, Value::ZERO);
        for _ in 0..4 {
            tt.new_search();
        }
        tt.probe(b).write(b, Value::ZERO, Bound::Lower, 1, Move::NONE, Value::ZERO);
        tt.probe(c).write(c, Value::ZERO, Bound::Lower, 1, Move::NONE, Value::ZERO);

        // a: 20 - 2 * 16 = -12, b and c: 1
        let miss = tt.probe(key_in_cluster(cluster, 9));
        assert_eq!(miss.entry.key16(), 1);
    }

    #[test]
    fn test_tt_hashfull() {
        let mut tt = TranspositionTable::new(1, false);
        assert_eq!(tt.hashfull(), 0);

        tt.new_search();
        for cluster in 0..(1000 / CLUSTER_SIZE) as u64 {
            for k in 1..=CLUSTER_SIZE as u16 {
                let key = key_in_cluster(cluster, k);
                tt.probe(key).write(key, Value::ZERO, Bound::Exact, 1, Move::NONE, Value::ZERO);
            }
        }
        assert_eq!(tt.hashfull(), 1000);

        // Entries of an older search no longer count
        tt.new_search();
        assert_eq!(tt.hashfull(), 0);

        tt.clear();
        assert_eq!(tt.hashfull(), 0);
    }

    #[test]
    fn test_tt_hashfull_half() {
        let tt = TranspositionTable::new(1, false);
        for cluster in 0..(1000 / CLUSTER_SIZE) as u64 {
            if cluster % 2 == 0 {
                continue;
            }
            for k in 1..=CLUSTER_SIZE as u16 {
                let key = key_in_cluster(cluster, k);
                tt.probe(key).write(key, Value::ZERO, Bound::Exact, 1, Move::NONE, Value::ZERO);
            }
        }
        // 166 of 333 clusters
        assert_eq!(tt.hashfull(), 498);
    }

    #[test]
    fn test_tt_clear() {
        let mut tt = TranspositionTable::new(1, false);
        let key = 0x7777_0000_0000_0001;
        tt.probe(key).write(key, Value::new(100), Bound::Lower, 10, Move::NONE, Value::ZERO);
        tt.new_search();

        tt.clear();
        assert_eq!(tt.generation(), 0);
        let probe = tt.probe(key);
        assert!(!probe.found);
        assert_eq!(probe.entry.key16(), 0);
    }

    #[test]
    fn test_tt_resize() {
        let mut tt = TranspositionTable::new(1, false);
        let initial_count = tt.cluster_count();

        assert!(tt.resize(2, false));
        assert_eq!(tt.cluster_count(), initial_count * 2);

        assert!(tt.resize(1, false));
        assert_eq!(tt.cluster_count(), initial_count);
    }

    #[test]
    fn test_tt_resize_same_size_keeps_allocation() {
        let mut tt = TranspositionTable::new(4, false);
        let key = 0x0101_0000_0000_0003;
        tt.probe(key).write(key, Value::new(9), Bound::Exact, 5, Move::NONE, Value::ZERO);
        let addr = tt.backing_addr();

        assert!(!tt.resize(4, false));
        assert_eq!(tt.backing_addr(), addr);
        assert!(tt.probe(key).found);

        // 5MB rounds down to the same cluster count as 4MB
        assert!(!tt.resize(5, false));
        assert_eq!(tt.backing_addr(), addr);

        // Zero reuses the last size
        assert!(!tt.resize(0, false));
        assert_eq!(tt.backing_addr(), addr);
    }

    #[test]
    fn test_tt_resize_mode_change_reallocates() {
        let mut tt = TranspositionTable::new(2, false);
        assert!(tt.resize(2, true));
        assert!(!tt.resize(2, true));
        assert!(tt.resize(2, false));
    }

    #[test]
    fn test_tt_concurrent_probe_and_store() {
        let tt = TranspositionTable::new(1, false);
        tt.new_search();

        std::thread::scope(|scope| {
            for t in 0..4u64 {
                let tt = &tt;
                scope.spawn(move || {
                    for i in 0..20_000u64 {
                        let key = ((t + 1) << 56) | (i << 20) | (i & 0xfff);
                        let probe = tt.probe(key);
                        probe.write(key, Value::new(i as i32 & 0x3ff), Bound::Lower, 3, Move::NONE, Value::ZERO);
                    }
                });
            }
        });

        assert!(tt.hashfull() > 0);
    }

    #[test]
    fn test_cluster_size() {
        assert_eq!(std::mem::size_of::<Cluster>(), 32);
        assert_eq!(std::mem::align_of::<Cluster>(), 32);
    }
}
