use std::sync::Arc;

use tracing::{info, warn};

use super::Notifier;
use crate::config::{Thresholds, SUBJECT_TITLE_CHARS};
use crate::types::{AlertPayload, CompSummary, Decision, Estimate, Listing, NotificationOutcome};

/// Everything the gate looks at for one listing after scoring.
#[derive(Debug, Clone, Copy)]
pub struct DealSnapshot<'a> {
    pub listing: &'a Listing,
    pub summary: &'a CompSummary,
    pub estimate: &'a Estimate,
    pub score: Option<f64>,
    pub decision: Decision,
}

/// Alert when profit and ROI both clear their bars, or the score alone does.
/// Never alerts without a comp average and a profit. A missing ROI counts as 0.
pub fn should_notify(
    summary: &CompSummary,
    estimate: &Estimate,
    score: Option<f64>,
    thresholds: &Thresholds,
) -> bool {
    let Some(profit) = estimate.profit else {
        return false;
    };
    if summary.avg.is_none() {
        return false;
    }

    let margin_ok =
        profit >= thresholds.profit_bar && estimate.roi_percent.unwrap_or(0.0) >= thresholds.roi_bar;
    let score_ok = score.is_some_and(|s| s >= thresholds.score_bar);
    margin_ok || score_ok
}

pub fn format_alert(deal: &DealSnapshot<'_>) -> AlertPayload {
    let title = deal.listing.title.as_deref().unwrap_or("");
    let short_title: String = title.chars().take(SUBJECT_TITLE_CHARS).collect();

    let body = format!(
        "Title: {title}\n\
         FB price: {price}\n\
         eBay avg: {avg} (count={count})\n\
         Profit est: {profit} | ROI%: {roi} | Score: {score}\n\
         Decision: {decision}\n\
         URL: {url}\n",
        price = opt(deal.listing.price),
        avg = opt(deal.summary.avg.map(|a| (a * 100.0).round() / 100.0)),
        count = deal.summary.count,
        profit = opt(deal.estimate.profit),
        roi = opt(deal.estimate.roi_percent),
        score = opt(deal.score),
        decision = deal.decision,
        url = deal.listing.url,
    );

    AlertPayload {
        subject: format!("[FlipFinder] {} — {}", deal.decision, short_title),
        body,
    }
}

fn opt(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
}

/// Applies the thresholds and hands qualifying deals to the notifier.
/// Delivery failures end up in the outcome, never as an error.
pub struct NotificationGate {
    notifier: Arc<dyn Notifier>,
    thresholds: Thresholds,
}

impl NotificationGate {
    pub fn new(notifier: Arc<dyn Notifier>, thresholds: Thresholds) -> Self {
        Self { notifier, thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub async fn evaluate(&self, requested: bool, deal: &DealSnapshot<'_>) -> NotificationOutcome {
        if !requested {
            return NotificationOutcome::NotRequested;
        }
        if !should_notify(deal.summary, deal.estimate, deal.score, &self.thresholds) {
            return NotificationOutcome::Skipped;
        }

        let alert = format_alert(deal);
        match self.notifier.send(&alert).await {
            Ok(()) => {
                info!(listing_id = deal.listing.id, decision = %deal.decision, "deal alert delivered");
                NotificationOutcome::Sent
            }
            Err(e) => {
                warn!(listing_id = deal.listing.id, "deal alert failed: {e}");
                NotificationOutcome::Failed { error: e.to_string() }
            }
        }
    }
}
