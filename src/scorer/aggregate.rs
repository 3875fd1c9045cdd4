use crate::types::{CompItem, CompSummary};

/// Reduce comps to low/avg/high over every priced item. The sold flag does not gate.
pub fn summarize(items: &[CompItem]) -> CompSummary {
    let mut prices: Vec<f64> = items.iter().filter_map(|c| c.price).collect();
    if prices.is_empty() {
        return CompSummary::default();
    }

    prices.sort_by(|a, b| a.total_cmp(b));
    let low = prices[0];
    let high = prices[prices.len() - 1];

    // Running mean; no intermediate sum to overflow.
    let mut avg = 0.0;
    for (i, p) in prices.iter().enumerate() {
        avg += (p - avg) / (i + 1) as f64;
    }

    CompSummary {
        low: Some(low),
        avg: Some(avg.clamp(low, high)),
        high: Some(high),
        count: prices.len() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comp(price: Option<f64>, sold: bool) -> CompItem {
        CompItem {
            title: "Trek FX 2".to_string(),
            price,
            currency: "USD".to_string(),
            url: String::new(),
            ended: String::new(),
            sold,
        }
    }

    #[test]
    fn empty_input_is_all_null() {
        let s = summarize(&[]);
        assert_eq!(s, CompSummary { low: None, avg: None, high: None, count: 0 });
    }

    #[test]
    fn two_prices() {
        let s = summarize(&[comp(Some(30.0), true), comp(Some(10.0), true)]);
        assert_eq!(s, CompSummary { low: Some(10.0), avg: Some(20.0), high: Some(30.0), count: 2 });
    }

    #[test]
    fn unpriced_items_are_dropped_and_unsold_still_count() {
        let s = summarize(&[comp(None, true), comp(Some(50.0), false), comp(Some(70.0), true)]);
        assert_eq!(s.count, 2);
        assert_eq!(s.avg, Some(60.0));
        assert_eq!(s.low, Some(50.0));
        assert_eq!(s.high, Some(70.0));
    }

    #[test]
    fn huge_prices_average_stays_finite_and_in_range() {
        let big = f64::MAX / 2.0;
        let s = summarize(&[comp(Some(big), true), comp(Some(big * 1.5), true), comp(Some(big), true)]);
        let avg = s.avg.unwrap();
        assert!(avg.is_finite());
        assert!(s.low.unwrap() <= avg && avg <= s.high.unwrap());
    }

    #[test]
    fn only_unpriced_items_is_all_null() {
        let s = summarize(&[comp(None, true), comp(None, false)]);
        assert_eq!(s, CompSummary::default());
    }
}
