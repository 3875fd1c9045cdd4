use crate::types::Decision;

const STRONG_PROFIT: f64 = 50.0;
const STRONG_ROI: f64 = 40.0;
const MODERATE_PROFIT: f64 = 20.0;
const MODERATE_ROI: f64 = 20.0;

/// Label a deal from its estimate. First matching rule wins.
pub fn classify(profit: Option<f64>, roi_percent: Option<f64>) -> Decision {
    let (Some(profit), Some(roi)) = (profit, roi_percent) else {
        return Decision::InsufficientData;
    };

    if profit >= STRONG_PROFIT && roi >= STRONG_ROI {
        Decision::StrongBuy
    } else if profit >= MODERATE_PROFIT && roi >= MODERATE_ROI {
        Decision::ModerateUpside
    } else {
        Decision::WeakMarginPass
    }
}
