//! Types exchanged with the search driver

use std::time::Instant;

use crate::types::{Color, TimePoint};

/// Clock state of one `go` command
///
/// In nodes-as-time mode `TimeManager::init` rewrites `time[us]` and
/// `inc[us]` in nodes and sets `npmsec`.
#[derive(Debug, Clone)]
pub struct SearchLimits {
    /// Remaining time per side
    pub time: [TimePoint; Color::NUM],
    /// Increment per side
    pub inc: [TimePoint; Color::NUM],
    /// Moves until the next time control, 0 for sudden death
    pub movestogo: i32,
    pub start_time: Instant,
    /// Nodes per millisecond, non-zero in nodes-as-time mode
    pub npmsec: TimePoint,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            time: [0; Color::NUM],
            inc: [0; Color::NUM],
            movestogo: 0,
            start_time: Instant::now(),
            npmsec: 0,
        }
    }
}

impl SearchLimits {
    /// Whether a clock was given for `us`
    pub fn use_time_management(&self, us: Color) -> bool {
        self.time[us.index()] > 0
    }
}

/// Result of one `TimeManager::init`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimePlan {
    /// Soft target
    pub optimum: TimePoint,
    /// Hard ceiling
    pub maximum: TimePoint,
}
