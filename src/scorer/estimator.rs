use super::round_to;
use crate::types::Estimate;

/// Net-of-fees profit and ROI for buying at `asking` and reselling at `comp_avg`.
/// ROI is `None` when the asking price is zero (free listings).
pub fn estimate(asking: Option<f64>, comp_avg: Option<f64>, fee_rate: f64) -> Estimate {
    let (Some(asking), Some(comp_avg)) = (asking, comp_avg) else {
        return Estimate::default();
    };

    let net = comp_avg * (1.0 - fee_rate);
    let profit = net - asking;
    let roi = (asking > 0.0).then(|| profit / asking * 100.0);

    Estimate {
        profit: Some(round_to(profit, 2)),
        roi_percent: roi.map(|r| round_to(r, 1)),
    }
}
