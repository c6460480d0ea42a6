//! Engine options read by the core
//!
//! The core does not register options; it reads them by name from whatever
//! registry the protocol layer keeps, through `OptionSource`.
//!
//! | name           | type  | default |
//! |----------------|-------|---------|
//! | `Hash`         | spin  | 16 (MB) |
//! | `Large Pages`  | check | false   |
//! | `Move Overhead`| spin  | 30 (ms) |
//! | `nodestime`    | spin  | 0 (0..=10000) |
//! | `Ponder`       | check | false   |

use std::collections::HashMap;

use serde::Deserialize;

use crate::time::TimeOptions;

pub const HASH: &str = "Hash";
pub const LARGE_PAGES: &str = "Large Pages";
pub const MOVE_OVERHEAD: &str = "Move Overhead";
pub const NODESTIME: &str = "nodestime";
pub const PONDER: &str = "Ponder";

/// Upper bound of the `nodestime` spin
pub const NODESTIME_MAX: i64 = 10_000;

/// Typed option value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Spin(i64),
    Check(bool),
    Text(String),
}

/// Read-only view of an option registry
pub trait OptionSource {
    fn get(&self, name: &str) -> Option<OptionValue>;

    fn spin(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            OptionValue::Spin(v) => Some(v),
            OptionValue::Text(s) => s.trim().parse().ok(),
            OptionValue::Check(_) => None,
        }
    }

    fn check(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            OptionValue::Check(v) => Some(v),
            OptionValue::Text(s) => s.trim().parse().ok(),
            OptionValue::Spin(_) => None,
        }
    }
}

/// In-memory registry, keys compared case-insensitively
#[derive(Debug, Clone, Default)]
pub struct OptionMap {
    values: HashMap<String, OptionValue>,
}

impl OptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: OptionValue) {
        self.values.insert(name.to_ascii_lowercase(), value);
    }

    /// `setoption name <name> value <text>`
    pub fn set_text(&mut self, name: &str, text: &str) {
        self.set(name, OptionValue::Text(text.to_owned()));
    }
}

impl OptionSource for OptionMap {
    fn get(&self, name: &str) -> Option<OptionValue> {
        self.values.get(&name.to_ascii_lowercase()).cloned()
    }
}

/// Snapshot of every option the core reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreOptions {
    /// Transposition table size in MB
    #[serde(alias = "Hash")]
    pub hash_mb: usize,
    #[serde(alias = "Large Pages")]
    pub large_pages: bool,
    #[serde(alias = "Move Overhead")]
    pub move_overhead: i64,
    pub nodestime: i64,
    #[serde(alias = "Ponder")]
    pub ponder: bool,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            hash_mb: 16,
            large_pages: false,
            move_overhead: 30,
            nodestime: 0,
            ponder: false,
        }
    }
}

impl CoreOptions {
    /// Reads the options from `source`; missing or mistyped values keep their default
    pub fn from_source(source: &dyn OptionSource) -> Self {
        let defaults = Self::default();
        Self {
            hash_mb: source
                .spin(HASH)
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(defaults.hash_mb),
            large_pages: source.check(LARGE_PAGES).unwrap_or(defaults.large_pages),
            move_overhead: source.spin(MOVE_OVERHEAD).unwrap_or(defaults.move_overhead).max(0),
            nodestime: source
                .spin(NODESTIME)
                .unwrap_or(defaults.nodestime)
                .clamp(0, NODESTIME_MAX),
            ponder: source.check(PONDER).unwrap_or(defaults.ponder),
        }
    }

    pub fn time_options(&self) -> TimeOptions {
        TimeOptions {
            move_overhead: self.move_overhead,
            nodestime: self.nodestime,
            ponder: self.ponder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let options = CoreOptions::from_source(&OptionMap::new());
        assert_eq!(options, CoreOptions::default());
        assert_eq!(options.time_options(), TimeOptions::default());
    }

    #[test]
    fn test_from_source_reads_typed_and_text_values() {
        let mut map = OptionMap::new();
        map.set(HASH, OptionValue::Spin(256));
        map.set_text("large pages", "true");
        map.set_text("Move Overhead", " 100 ");
        map.set(NODESTIME, OptionValue::Spin(600));
        map.set(PONDER, OptionValue::Check(true));

        let options = CoreOptions::from_source(&map);
        assert_eq!(options.hash_mb, 256);
        assert!(options.large_pages);
        assert_eq!(options.move_overhead, 100);
        assert_eq!(options.nodestime, 600);
        assert!(options.ponder);
    }

    #[test]
    fn test_mistyped_values_fall_back() {
        let mut map = OptionMap::new();
        map.set(HASH, OptionValue::Check(true));
        map.set_text(PONDER, "maybe");
        map.set(MOVE_OVERHEAD, OptionValue::Spin(-5));

        let options = CoreOptions::from_source(&map);
        assert_eq!(options.hash_mb, 16);
        assert!(!options.ponder);
        assert_eq!(options.move_overhead, 0);
    }

    #[test]
    fn test_nodestime_clamped_to_range() {
        let mut map = OptionMap::new();
        map.set(NODESTIME, OptionValue::Spin(1_000_000_000));
        assert_eq!(CoreOptions::from_source(&map).nodestime, NODESTIME_MAX);

        map.set(NODESTIME, OptionValue::Spin(-3));
        assert_eq!(CoreOptions::from_source(&map).nodestime, 0);
    }

    #[test]
    fn test_deserialize_from_toml() {
        let options: CoreOptions = toml::from_str("hash_mb = 64\nPonder = true\n").unwrap();
        assert_eq!(options.hash_mb, 64);
        assert!(options.ponder);
        assert_eq!(options.move_overhead, 30);
    }
}
