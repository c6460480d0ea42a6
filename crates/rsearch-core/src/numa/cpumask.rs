//! CPU membership masks
//!
//! - `CpuSet`: variable-width bitset of logical CPU ids (Linux)
//! - `CpuMask`: platform-specific node/core membership

use std::fmt;

/// Variable-width set of logical CPU ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuSet {
    words: Vec<u64>,
}

impl CpuSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set containing a single CPU
    pub fn single(cpu: usize) -> Self {
        let mut set = Self::new();
        set.insert(cpu);
        set
    }

    pub fn insert(&mut self, cpu: usize) {
        let word = cpu / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (cpu % 64);
    }

    #[inline]
    pub fn contains(&self, cpu: usize) -> bool {
        self.words
            .get(cpu / 64)
            .is_some_and(|&w| w & (1u64 << (cpu % 64)) != 0)
    }

    pub fn intersects(&self, other: &CpuSet) -> bool {
        self.words.iter().zip(&other.words).any(|(a, b)| a & b != 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// CPU ids in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..64usize)
                .filter(move |&bit| word & (1u64 << bit) != 0)
                .map(move |bit| i * 64 + bit)
        })
    }

    /// Parses a kernel cpu list such as `"0-3,8,10-11"`
    ///
    /// Returns `None` if any part is malformed. An empty or blank list yields
    /// an empty set (memory-only nodes have one).
    pub fn parse_cpu_list(list: &str) -> Option<CpuSet> {
        let mut set = CpuSet::new();
        let list = list.trim();
        if list.is_empty() {
            return Some(set);
        }

        for part in list.split(',') {
            let part = part.trim();
            match part.split_once('-') {
                Some((start, end)) => {
                    let start: usize = start.trim().parse().ok()?;
                    let end: usize = end.trim().parse().ok()?;
                    if start > end {
                        return None;
                    }
                    for cpu in start..=end {
                        set.insert(cpu);
                    }
                }
                None => set.insert(part.parse().ok()?),
            }
        }
        Some(set)
    }
}

impl FromIterator<usize> for CpuSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = CpuSet::new();
        for cpu in iter {
            set.insert(cpu);
        }
        set
    }
}

/// Renders in cpu list form, the inverse of `parse_cpu_list`
impl fmt::Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut cpus = self.iter().peekable();
        let mut first = true;
        while let Some(start) = cpus.next() {
            let mut end = start;
            while cpus.peek() == Some(&(end + 1)) {
                end += 1;
                cpus.next();
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}-{end}")?;
            }
        }
        Ok(())
    }
}

/// Which logical processors belong to a node or a physical core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpuMask {
    /// Linux: explicit CPU ids
    Set(CpuSet),
    /// Windows: processor group plus 64-bit affinity mask within the group
    Group { group: u16, mask: u64 },
    /// Every processor of the machine (dummy node)
    All,
}

impl CpuMask {
    /// Whether the two masks share at least one logical processor
    pub fn intersects(&self, other: &CpuMask) -> bool {
        match (self, other) {
            (CpuMask::All, _) | (_, CpuMask::All) => true,
            (CpuMask::Set(a), CpuMask::Set(b)) => a.intersects(b),
            (
                CpuMask::Group { group: ga, mask: ma },
                CpuMask::Group { group: gb, mask: mb },
            ) => ga == gb && ma & mb != 0,
            _ => false,
        }
    }
}

impl fmt::Display for CpuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuMask::Set(set) => write!(f, "cpus {set}"),
            CpuMask::Group { group, mask } => write!(f, "group {group}, mask {mask:x}"),
            CpuMask::All => f.write_str("all"),
        }
    }
}
