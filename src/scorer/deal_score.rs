use super::round_to;
use crate::types::{ScoreOutcome, ScoreUnavailable};

/// Spread weighted by comp depth: `(comp_avg - asking) * ln(1 + count)`, 2 decimals.
/// Zero comps give 0.0.
pub fn score(asking: Option<f64>, comp_avg: Option<f64>, count: u32) -> ScoreOutcome {
    let Some(asking) = asking else {
        return ScoreOutcome::Unavailable(ScoreUnavailable::MissingPrice);
    };
    let Some(comp_avg) = comp_avg else {
        return ScoreOutcome::Unavailable(ScoreUnavailable::MissingCompAverage);
    };

    let value = round_to((comp_avg - asking) * f64::from(count).ln_1p(), 2);
    if !value.is_finite() {
        return ScoreOutcome::Unavailable(ScoreUnavailable::NonFinite);
    }
    ScoreOutcome::Scored(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_comps_scores_zero() {
        assert_eq!(score(Some(100.0), Some(150.0), 0), ScoreOutcome::Scored(0.0));
    }

    #[test]
    fn deeper_comps_score_higher() {
        // 50 * ln(3) = 54.930...
        assert_eq!(score(Some(100.0), Some(150.0), 2), ScoreOutcome::Scored(54.93));
        let shallow = score(Some(100.0), Some(150.0), 1).value().unwrap();
        let deep = score(Some(100.0), Some(150.0), 20).value().unwrap();
        assert!(deep > shallow);
    }

    #[test]
    fn negative_spread_scores_negative() {
        assert!(score(Some(150.0), Some(100.0), 5).value().unwrap() < 0.0);
    }

    #[test]
    fn missing_inputs_report_a_reason() {
        assert_eq!(
            score(None, Some(150.0), 3),
            ScoreOutcome::Unavailable(ScoreUnavailable::MissingPrice)
        );
        assert_eq!(
            score(Some(100.0), None, 3),
            ScoreOutcome::Unavailable(ScoreUnavailable::MissingCompAverage)
        );
    }

    #[test]
    fn overflow_is_non_finite() {
        assert_eq!(
            score(Some(-f64::MAX), Some(f64::MAX), 3),
            ScoreOutcome::Unavailable(ScoreUnavailable::NonFinite)
        );
    }
}
