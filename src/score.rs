//! Mapping of raw service scores onto the bounded display range.
//!
//! Centipawn scores are clamped to ten pawns either way and scaled linearly
//! into `[-1.0, 1.0]`. Mate scores saturate by default; the alternative
//! [`MateScaling::Distance`] grades them by the reported mate distance.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{EvaluationResult, ScoreKind};

/// Centipawn magnitude that maps onto the edge of the display range.
pub const CENTIPAWN_CLAMP: i32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MateScaling {
    /// Any mate is `+1.0` / `-1.0`.
    #[default]
    Saturating,
    /// `sign * (1 - 1 / (|moves| + 1))`.
    Distance,
}

/// Normalize `result` into `[-1.0, 1.0]`.
pub fn normalize(result: &EvaluationResult, mate: MateScaling) -> f64 {
    match result.kind {
        ScoreKind::Centipawn => {
            let v = result.value.clamp(-CENTIPAWN_CLAMP, CENTIPAWN_CLAMP);
            f64::from(v) / f64::from(CENTIPAWN_CLAMP)
        }
        ScoreKind::Mate => {
            // mate in 0: the side to move is already mated
            let sign = if result.value > 0 { 1.0 } else { -1.0 };
            match mate {
                MateScaling::Saturating => sign,
                MateScaling::Distance => {
                    let distance = f64::from(result.value.unsigned_abs());
                    sign * (1.0 - 1.0 / (distance + 1.0))
                }
            }
        }
        ScoreKind::Unknown => {
            warn!(value = result.value, "unknown score kind, treating as level");
            0.0
        }
    }
}

/// Round to one decimal, the granularity stabilization is judged at.
pub fn round_tenth(score: f64) -> f64 {
    let r = (score * 10.0).round() / 10.0;
    // keep -0.0 from leaking into text
    if r == 0.0 { 0.0 } else { r }
}

/// Stable integer form of [`round_tenth`] used for equality checks.
pub(crate) fn tenths(score: f64) -> i32 {
    (score * 10.0).round() as i32
}
