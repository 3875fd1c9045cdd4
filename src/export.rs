//! CSV renderings: the raw listing export and the ranked deals report.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::pipeline::Pipeline;
use crate::types::{Listing, ListingFilter};

/// Entries of the deals report printed to the log.
const REPORT_TOP_N: usize = 10;

/// `id,title,price,currency,location,url`. Line breaks inside text become spaces
/// and a missing price is left blank.
pub fn listings_csv(rows: &[Listing]) -> Result<String> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(["id", "title", "price", "currency", "location", "url"])?;
    for r in rows {
        w.write_record([
            r.id.to_string(),
            one_line(r.title.as_deref()),
            r.price.map(|p| p.to_string()).unwrap_or_default(),
            one_line(r.currency.as_deref()),
            one_line(r.location.as_deref()),
            one_line(Some(r.url.as_str())),
        ])?;
    }
    finish(w)
}

fn one_line(text: Option<&str>) -> String {
    text.unwrap_or("").replace(['\r', '\n'], " ")
}

fn finish(w: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = w.into_inner().map_err(|e| AppError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| AppError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

/// One line of the deals report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DealRow {
    pub id: i64,
    pub title: String,
    pub price: Option<f64>,
    pub url: String,
    pub profit: Option<f64>,
    pub roi_percent: Option<f64>,
    pub score: Option<f64>,
    pub decision: String,
}

/// Best first: by score, then profit, then ROI. Missing values rank as -1.
pub fn rank_deals(rows: &mut [DealRow]) {
    fn key(v: Option<f64>) -> f64 {
        v.unwrap_or(-1.0)
    }
    rows.sort_by(|a, b| {
        key(b.score)
            .total_cmp(&key(a.score))
            .then_with(|| key(b.profit).total_cmp(&key(a.profit)))
            .then_with(|| key(b.roi_percent).total_cmp(&key(a.roi_percent)))
    });
}

pub fn deals_csv(rows: &[DealRow]) -> Result<String> {
    let mut w = csv::Writer::from_writer(Vec::new());
    for r in rows {
        w.serialize(r)?;
    }
    if rows.is_empty() {
        w.write_record(["id", "title", "price", "url", "profit", "roi_percent", "score", "decision"])?;
    }
    finish(w)
}

/// Re-run comps for the most recent listings and rank them. Listings whose refresh
/// fails are left out.
pub async fn build_deals_report(pipeline: &Pipeline, limit: i64) -> Result<Vec<DealRow>> {
    let filter = ListingFilter {
        limit,
        ..Default::default()
    };
    let recent = pipeline.repo().recent(&filter).await?;

    let mut rows = Vec::with_capacity(recent.len());
    for listing in recent {
        match pipeline.refresh_comps(listing.id, false).await {
            Ok(result) => rows.push(DealRow {
                id: listing.id,
                title: listing.title.unwrap_or_default(),
                price: listing.price,
                url: listing.url,
                profit: result.estimate.profit,
                roi_percent: result.estimate.roi_percent,
                score: result.estimate.score,
                decision: result.estimate.decision,
            }),
            Err(e) => warn!(listing_id = listing.id, "recheck failed: {e}"),
        }
    }

    rank_deals(&mut rows);
    for r in rows.iter().take(REPORT_TOP_N) {
        let title: String = r.title.chars().take(60).collect();
        info!(
            id = r.id,
            profit = ?r.profit,
            roi = ?r.roi_percent,
            score = ?r.score,
            decision = %r.decision,
            "{title}"
        );
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;

    use crate::notify::testing::RecordingNotifier;
    use crate::pipeline::tests::{pipeline_with, raw, FixedComps};

    fn listing(id: i64, title: &str, price: Option<f64>) -> Listing {
        Listing {
            id,
            source: "facebook".to_string(),
            url: format!("https://fb.example/{id}"),
            title: Some(title.to_string()),
            description: None,
            price,
            currency: Some("CAD".to_string()),
            location: None,
            distance_km: None,
            posted_at_text: None,
            seller: None,
            photos: Vec::new(),
            label: None,
            note: None,
            created_at: Utc::now(),
        }
    }

    fn deal(id: i64, score: Option<f64>, profit: Option<f64>) -> DealRow {
        DealRow {
            id,
            title: String::new(),
            price: None,
            url: String::new(),
            profit,
            roi_percent: None,
            score,
            decision: String::new(),
        }
    }

    #[test]
    fn export_flattens_newlines_and_blanks_missing_price() {
        let rows = vec![
            listing(1, "Trek\nFX 2", Some(250.0)),
            listing(2, "Lamp, brass", None),
        ];
        let csv = listings_csv(&rows).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "id,title,price,currency,location,url");
        assert_eq!(lines[1], "1,Trek FX 2,250,CAD,,https://fb.example/1");
        assert_eq!(lines[2], "2,\"Lamp, brass\",,CAD,,https://fb.example/2");
    }

    #[test]
    fn ranking_prefers_score_then_profit() {
        let mut rows = vec![
            deal(1, None, Some(500.0)),
            deal(2, Some(10.0), Some(5.0)),
            deal(3, Some(10.0), Some(50.0)),
            deal(4, Some(80.0), None),
        ];
        rank_deals(&mut rows);
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);
    }

    #[test]
    fn deals_csv_has_header_even_when_empty() {
        assert!(deals_csv(&[]).unwrap().starts_with("id,title,price,url,profit,roi_percent,score,decision"));
        let csv = deals_csv(&[deal(7, Some(1.5), None)]).unwrap();
        assert!(csv.starts_with("id,title,price,url,profit,roi_percent,score,decision\n7,,,,,,1.5,"));
    }

    #[tokio::test]
    async fn report_rechecks_recent_listings() {
        let comps = Arc::new(FixedComps::new(&[Some(150.0)]));
        let (pipeline, _) = pipeline_with(comps, Arc::new(RecordingNotifier::default())).await;
        pipeline
            .process_listing(&raw("https://fb.example/a", "Cheap", "$50"), false)
            .await
            .unwrap();
        pipeline
            .process_listing(&raw("https://fb.example/b", "Pricey", "$140"), false)
            .await
            .unwrap();

        let rows = build_deals_report(&pipeline, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "Cheap");
        assert_eq!(rows[0].profit, Some(80.5));
        assert_eq!(rows[0].decision, "strong buy");
        assert_eq!(rows[1].title, "Pricey");
    }
}
