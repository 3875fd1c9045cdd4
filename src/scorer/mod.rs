//! Pure scoring stages: comp summary, profit estimate, deal score, decision label.

pub mod aggregate;
pub mod classifier;
pub mod deal_score;
pub mod estimator;

pub use aggregate::summarize;
pub use classifier::classify;
pub use deal_score::score;
pub use estimator::estimate;

/// Round half away from zero to `places` decimals.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
