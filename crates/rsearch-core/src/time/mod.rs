//! Time management
//!
//! `TimeManager::init` turns the clock of one `go` command into an optimum
//! (soft) and a maximum (hard) budget. The search polls its elapsed time
//! against both; this module never stops a search by itself.
//!
//! Nodes-as-time: with a non-zero `nodestime` the clock is replaced by a node
//! budget of `nodestime * time` fixed on the first search of a game. Every
//! budget is then a node count, and the driver reports spent nodes through
//! `advance_nodes_budget`.

mod allocation;
mod types;

use std::time::Instant;

use log::debug;
use serde::Deserialize;

use crate::types::{Color, TimePoint, Value};

pub use allocation::{MAX_RATIO, MAXIMUM_CAP, OPTIMUM_CAP, move_horizon, ratios};
pub use types::{SearchLimits, TimePlan};

/// Time related engine options
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimeOptions {
    /// Reserved per move for communication latency (ms)
    pub move_overhead: TimePoint,
    /// Nodes per millisecond; 0 disables nodes-as-time
    pub nodestime: TimePoint,
    /// Pondering enabled
    pub ponder: bool,
}

impl Default for TimeOptions {
    fn default() -> Self {
        Self {
            move_overhead: 30,
            nodestime: 0,
            ponder: false,
        }
    }
}

pub struct TimeManager {
    start_time: Instant,
    optimum: TimePoint,
    maximum: TimePoint,
    /// Nodes per millisecond of the last `init`
    npmsec: TimePoint,
    /// Remaining node budget of the current game in nodes-as-time mode
    available_nodes: Option<TimePoint>,
}

impl TimeManager {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            optimum: 0,
            maximum: 0,
            npmsec: 0,
            available_nodes: None,
        }
    }

    /// Computes the budgets for one search
    ///
    /// `ply` is the game ply, `score` the side to move's last known score.
    /// In nodes-as-time mode `limits` is rewritten in nodes.
    pub fn init(
        &mut self,
        limits: &mut SearchLimits,
        us: Color,
        ply: i32,
        score: Value,
        options: &TimeOptions,
    ) -> TimePlan {
        let side = us.index();
        let npmsec = options.nodestime.max(0);

        if npmsec > 0 {
            let budget = *self
                .available_nodes
                .get_or_insert(limits.time[side].saturating_mul(npmsec));
            limits.time[side] = budget;
            limits.inc[side] = limits.inc[side].saturating_mul(npmsec);
            limits.npmsec = npmsec;
        }
        self.npmsec = npmsec;
        self.start_time = limits.start_time;

        let time = limits.time[side];
        let inc = limits.inc[side];
        let (optimum_ratio, maximum_ratio) = ratios(time, inc, limits.movestogo, ply, score);
        let available = (time - options.move_overhead.max(0)).max(0);

        self.optimum = (available as f64 * optimum_ratio) as TimePoint;
        self.maximum = (available as f64 * maximum_ratio) as TimePoint;
        if options.ponder {
            self.optimum += self.optimum / 4;
        }
        debug_assert!(self.maximum >= self.optimum);

        debug!(
            "time plan: optimum {} maximum {} (remaining {time}, inc {inc}, movestogo {}, ply {ply}{})",
            self.optimum,
            self.maximum,
            limits.movestogo,
            if npmsec > 0 { ", in nodes" } else { "" }
        );
        self.plan()
    }

    #[inline]
    pub fn plan(&self) -> TimePlan {
        TimePlan {
            optimum: self.optimum,
            maximum: self.maximum,
        }
    }

    #[inline]
    pub fn optimum(&self) -> TimePoint {
        self.optimum
    }

    #[inline]
    pub fn maximum(&self) -> TimePoint {
        self.maximum
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    /// Time spent on the current search, or `nodes` in nodes-as-time mode
    pub fn elapsed(&self, nodes: u64) -> TimePoint {
        if self.npmsec > 0 {
            TimePoint::try_from(nodes).unwrap_or(TimePoint::MAX)
        } else {
            TimePoint::try_from(self.start_time.elapsed().as_millis()).unwrap_or(TimePoint::MAX)
        }
    }

    /// Remaining node budget, once nodes-as-time has started for this game
    pub fn available_nodes(&self) -> Option<TimePoint> {
        self.available_nodes
    }

    /// Books a finished move: `searched` nodes spent, `inc` nodes earned
    pub fn advance_nodes_budget(&mut self, searched: u64, inc: TimePoint) {
        if let Some(budget) = self.available_nodes.as_mut() {
            let searched = TimePoint::try_from(searched).unwrap_or(TimePoint::MAX);
            *budget = budget.saturating_add(inc).saturating_sub(searched).max(0);
        }
    }

    /// Forgets the node budget so the next `init` fixes a new one
    pub fn new_game(&mut self) {
        self.available_nodes = None;
    }
}

impl Default for TimeManager {
    fn default() -> Self {
        Self::new()
    }
}
