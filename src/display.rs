//! Text and bar projection of the published evaluation.

use crate::poller::Published;
use crate::score::round_tenth;
use crate::types::{EvaluationResult, ScoreKind};

pub const NO_DATA: &str = "N/A";

#[derive(Debug, Clone, PartialEq)]
pub struct EvalDisplay {
    pub text: String,
    /// Share of the bar filled with the white side's colour, `0..=100`.
    pub bar_percent: f64,
}

impl EvalDisplay {
    pub fn project(published: &Published) -> Self {
        match published {
            Published::Score { result, normalized } => Self {
                text: format_result(result),
                bar_percent: bar_percent(*normalized),
            },
            Published::NoData | Published::Pending => Self {
                text: NO_DATA.to_owned(),
                bar_percent: 50.0,
            },
        }
    }
}

/// `((score + 1) / 2) * 100`, with the score clamped to the display range.
pub fn bar_percent(normalized: f64) -> f64 {
    (normalized.clamp(-1.0, 1.0) + 1.0) / 2.0 * 100.0
}

/// Signed one-decimal rendering of a normalized score (`+0.3`, `-1.0`).
pub fn format_normalized(normalized: Option<f64>) -> String {
    match normalized {
        Some(s) => format!("{:+.1}", round_tenth(s)),
        None => NO_DATA.to_owned(),
    }
}

/// Pawns with one decimal for centipawn scores, `M<n>` for mates.
pub fn format_result(result: &EvaluationResult) -> String {
    match result.kind {
        ScoreKind::Centipawn => format!("{:+.1}", round_tenth(f64::from(result.value) / 100.0)),
        ScoreKind::Mate if result.value <= 0 => format!("-M{}", result.value.unsigned_abs()),
        ScoreKind::Mate => format!("+M{}", result.value),
        ScoreKind::Unknown => NO_DATA.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_fill() {
        assert_eq!(bar_percent(0.0), 50.0);
        assert_eq!(bar_percent(1.0), 100.0);
        assert_eq!(bar_percent(-1.0), 0.0);
        assert_eq!(bar_percent(-0.5), 25.0);
        assert_eq!(bar_percent(7.0), 100.0);
    }

    #[test]
    fn normalized_text() {
        assert_eq!(format_normalized(Some(0.3)), "+0.3");
        assert_eq!(format_normalized(Some(-1.0)), "-1.0");
        assert_eq!(format_normalized(Some(-0.01)), "+0.0");
        assert_eq!(format_normalized(None), "N/A");
    }

    #[test]
    fn result_text() {
        assert_eq!(format_result(&EvaluationResult::centipawns(30, 10)), "+0.3");
        assert_eq!(format_result(&EvaluationResult::centipawns(-100, 10)), "-1.0");
        assert_eq!(format_result(&EvaluationResult::mate(3, 10)), "+M3");
        assert_eq!(format_result(&EvaluationResult::mate(-2, 10)), "-M2");
    }

    #[test]
    fn no_data_projects_neutral() {
        let d = EvalDisplay::project(&Published::NoData);
        assert_eq!(d.text, "N/A");
        assert_eq!(d.bar_percent, 50.0);
    }
}
