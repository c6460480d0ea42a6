//! Time allocation ratios
//!
//! Pure functions from clock state to the fraction of the remaining time one
//! move may use. All inputs are already converted to nodes in nodes-as-time
//! mode; the ratios do not care about the unit.

use crate::types::{TimePoint, Value};

/// Maximum-to-optimum ratio before the caps apply
pub const MAX_RATIO: f64 = 5.25;

/// Cap on the optimum fraction of the remaining time
pub const OPTIMUM_CAP: f64 = 0.5;

/// Cap on the maximum fraction of the remaining time
pub const MAXIMUM_CAP: f64 = 0.8;

/// Moves-to-go assumed when the score gives no reason to hurry
pub const DEFAULT_MOVE_HORIZON: i32 = 49;

/// Move number where the weighting peaks
const IMPORTANCE_PEAK: f64 = 20.0;

/// Sudden death: fraction at move 0, and the amount it grows by over the game
const SUDDEN_DEATH_BASE: f64 = 0.018;
const SUDDEN_DEATH_GROWTH: f64 = 0.012;
const SUDDEN_DEATH_PACE: f64 = 25.0;

#[inline]
fn gaussian(x: f64, mean: f64, sigma: f64) -> f64 {
    let d = x - mean;
    (-(d * d) / (2.0 * sigma * sigma)).exp()
}

/// Full move number for a ply count (ply 0 and 1 are move 1)
#[inline]
pub fn move_number(ply: i32) -> f64 {
    (ply.max(0) / 2 + 1) as f64
}

/// Moves-to-go horizon: 49, shrinking as a positive score grows
pub fn move_horizon(score: Value) -> i32 {
    let score = score.raw();
    if score <= 0 {
        return DEFAULT_MOVE_HORIZON;
    }
    let shrink = (16.4 * (1.0 + score as f64 / 87.5).ln()) as i32;
    (DEFAULT_MOVE_HORIZON - shrink).max(1)
}

/// Share of the remaining time before the increment is added
///
/// With `movestogo`, the time is split over the (score-limited) number of
/// moves, weighted up around move 20. Without it, the share grows slowly with
/// the number of moves already played.
pub fn base_ratio(movestogo: i32, ply: i32, score: Value) -> f64 {
    let mv = move_number(ply);
    if movestogo > 0 {
        let mtg = movestogo.min(move_horizon(score)) as f64;
        let importance = 1.0 + 0.5 * gaussian(mv, IMPORTANCE_PEAK, 8.0);
        importance / mtg
    } else {
        SUDDEN_DEATH_BASE + SUDDEN_DEATH_GROWTH * (1.0 - (-mv / SUDDEN_DEATH_PACE).exp())
    }
}

/// Share contributed by the increment
pub fn increment_ratio(time: TimePoint, inc: TimePoint, ply: i32) -> f64 {
    if time <= 0 || inc <= 0 {
        return 0.0;
    }
    let weight = 0.8 + 0.4 * gaussian(move_number(ply), IMPORTANCE_PEAK, 10.0);
    inc as f64 / time as f64 * weight
}

/// (optimum, maximum) fractions of the remaining time
pub fn ratios(time: TimePoint, inc: TimePoint, movestogo: i32, ply: i32, score: Value) -> (f64, f64) {
    let optimum = (base_ratio(movestogo, ply, score) + increment_ratio(time, inc, ply)).min(OPTIMUM_CAP);
    let maximum = (optimum * MAX_RATIO).min(MAXIMUM_CAP);
    (optimum, maximum)
}
