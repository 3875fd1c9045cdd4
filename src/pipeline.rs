use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use crate::api::health::HealthState;
use crate::db::ListingRepo;
use crate::error::{AppError, Result};
use crate::fetcher::CompSource;
use crate::normalize::normalize;
use crate::notify::{DealSnapshot, NotificationGate};
use crate::scorer::{classify, estimate, score, summarize};
use crate::types::{
    EstimateView, Listing, NotificationOutcome, PipelineStage, RawListing, RefreshResult, ScoreOutcome,
};

/// Runs listings from raw text to a scored, labelled result.
pub struct Pipeline {
    repo: ListingRepo,
    comps: Arc<dyn CompSource>,
    gate: NotificationGate,
    health: Arc<HealthState>,
    max_results: u32,
}

impl Pipeline {
    pub fn new(
        repo: ListingRepo,
        comps: Arc<dyn CompSource>,
        gate: NotificationGate,
        health: Arc<HealthState>,
        max_results: u32,
    ) -> Self {
        Self {
            repo,
            comps,
            gate,
            health,
            max_results,
        }
    }

    pub fn repo(&self) -> &ListingRepo {
        &self.repo
    }

    /// Normalize and store a scraped listing, then evaluate it against comps.
    pub async fn process_listing(&self, raw: &RawListing, notify: bool) -> Result<RefreshResult> {
        let mut stages = vec![PipelineStage::Fetched];
        let listing = normalize(raw);
        advance(&raw.url, &mut stages, PipelineStage::Normalized);

        let upserted = self.repo.upsert(&listing).await?;
        advance(&raw.url, &mut stages, PipelineStage::Stored);

        let stored = self
            .repo
            .get(upserted.id)
            .await?
            .ok_or(AppError::NotFound(upserted.id))?;
        self.evaluate(&stored, notify, stages).await
    }

    /// Re-run the comp search and scoring for a stored listing.
    pub async fn refresh_comps(&self, id: i64, notify: bool) -> Result<RefreshResult> {
        let listing = self.repo.get(id).await?.ok_or(AppError::NotFound(id))?;
        self.evaluate(&listing, notify, vec![PipelineStage::Stored]).await
    }

    async fn evaluate(
        &self,
        listing: &Listing,
        notify: bool,
        mut stages: Vec<PipelineStage>,
    ) -> Result<RefreshResult> {
        let title = listing.title.as_deref().unwrap_or("");
        let key = listing.url.as_str();

        let items = self.comps.find_completed_items(title, self.max_results).await;
        advance(key, &mut stages, PipelineStage::CompsFetched);

        let summary = summarize(&items);
        if summary.count == 0 {
            self.health.inc_empty_comp_summaries();
        }
        advance(key, &mut stages, PipelineStage::Aggregated);

        let est = estimate(listing.price, summary.avg, self.gate.thresholds().fee_rate);
        advance(key, &mut stages, PipelineStage::Estimated);

        let outcome = score(listing.price, summary.avg, summary.count);
        advance(key, &mut stages, PipelineStage::Scored);

        let decision = classify(est.profit, est.roi_percent);
        advance(key, &mut stages, PipelineStage::Classified);

        let deal = DealSnapshot {
            listing,
            summary: &summary,
            estimate: &est,
            score: outcome.value(),
            decision,
        };
        let notification = self.gate.evaluate(notify, &deal).await;
        match &notification {
            NotificationOutcome::Sent => {
                self.health.inc_alerts_sent();
                advance(key, &mut stages, PipelineStage::NotificationSent);
            }
            NotificationOutcome::Failed { .. } => {
                self.health.inc_alerts_failed();
                advance(key, &mut stages, PipelineStage::NotificationFailed);
            }
            NotificationOutcome::NotRequested | NotificationOutcome::Skipped => {
                advance(key, &mut stages, PipelineStage::NotificationSkipped);
            }
        }

        advance(key, &mut stages, PipelineStage::Done);
        self.health.inc_listings_processed();
        self.health.set_last_refresh_at_ns(now_ns());

        info!(
            listing_id = listing.id,
            comps = summary.count,
            profit = ?est.profit,
            roi = ?est.roi_percent,
            decision = %decision,
            "listing evaluated"
        );

        let score_unavailable = match outcome {
            ScoreOutcome::Scored(_) => None,
            ScoreOutcome::Unavailable(reason) => Some(reason),
        };

        Ok(RefreshResult {
            listing_id: listing.id,
            ebay: summary,
            estimate: EstimateView {
                profit: est.profit,
                roi_percent: est.roi_percent,
                score: outcome.value(),
                score_unavailable,
                decision: decision.to_string(),
            },
            notification,
            stages,
        })
    }
}

fn advance(key: &str, stages: &mut Vec<PipelineStage>, next: PipelineStage) {
    debug!(url = key, from = ?stages.last(), to = ?next, "pipeline stage");
    stages.push(next);
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::config::Thresholds;
    use crate::db::in_memory;
    use crate::notify::testing::RecordingNotifier;
    use crate::types::{CompItem, ScoreUnavailable};

    /// Returns the same comps for every title and counts calls.
    #[derive(Default)]
    pub(crate) struct FixedComps {
        pub prices: Vec<Option<f64>>,
        pub calls: AtomicU32,
    }

    impl FixedComps {
        pub fn new(prices: &[Option<f64>]) -> Self {
            Self {
                prices: prices.to_vec(),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CompSource for FixedComps {
        async fn find_completed_items(&self, title: &str, _max_results: u32) -> Vec<CompItem> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prices
                .iter()
                .map(|p| CompItem {
                    title: title.to_string(),
                    price: *p,
                    currency: "USD".to_string(),
                    url: String::new(),
                    ended: String::new(),
                    sold: true,
                })
                .collect()
        }
    }

    pub(crate) async fn pipeline_with(
        comps: Arc<dyn CompSource>,
        notifier: Arc<RecordingNotifier>,
    ) -> (Pipeline, Arc<HealthState>) {
        let repo = ListingRepo::new(in_memory().await);
        let health = Arc::new(HealthState::new());
        let gate = NotificationGate::new(notifier, Thresholds::default());
        (Pipeline::new(repo, comps, gate, health.clone(), 20), health)
    }

    pub(crate) fn raw(url: &str, title: &str, price: &str) -> RawListing {
        RawListing {
            source: "facebook".to_string(),
            url: url.to_string(),
            title: Some(title.to_string()),
            price_text: Some(price.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn strong_deal_runs_to_completion_and_alerts() {
        let notifier = Arc::new(RecordingNotifier::default());
        let comps = Arc::new(FixedComps::new(&[Some(300.0), Some(340.0), None]));
        let (pipeline, health) = pipeline_with(comps.clone(), notifier.clone()).await;

        let result = pipeline
            .process_listing(&raw("https://fb.example/1", "Trek FX 2", "CA$100"), true)
            .await
            .unwrap();

        assert_eq!(result.ebay.count, 2);
        assert_eq!(result.ebay.avg, Some(320.0));
        // 320 * 0.87 - 100
        assert_eq!(result.estimate.profit, Some(178.4));
        assert_eq!(result.estimate.roi_percent, Some(178.4));
        assert_eq!(result.estimate.decision, "strong buy");
        assert_eq!(result.notification, NotificationOutcome::Sent);
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(comps.calls.load(Ordering::SeqCst), 1);
        assert_eq!(health.listings_processed(), 1);
        assert_eq!(health.alerts_sent(), 1);
        assert_eq!(
            result.stages,
            vec![
                PipelineStage::Fetched,
                PipelineStage::Normalized,
                PipelineStage::Stored,
                PipelineStage::CompsFetched,
                PipelineStage::Aggregated,
                PipelineStage::Estimated,
                PipelineStage::Scored,
                PipelineStage::Classified,
                PipelineStage::NotificationSent,
                PipelineStage::Done,
            ]
        );
    }

    #[tokio::test]
    async fn no_comps_degrades_to_insufficient_data() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (pipeline, health) = pipeline_with(Arc::new(FixedComps::default()), notifier.clone()).await;

        let result = pipeline
            .process_listing(&raw("https://fb.example/2", "Mystery box", "$20"), true)
            .await
            .unwrap();

        assert_eq!(result.ebay.count, 0);
        assert_eq!(result.ebay.avg, None);
        assert_eq!(result.estimate.profit, None);
        assert_eq!(result.estimate.score, None);
        assert_eq!(result.estimate.score_unavailable, Some(ScoreUnavailable::MissingCompAverage));
        assert_eq!(result.estimate.decision, "insufficient data");
        assert_eq!(result.notification, NotificationOutcome::Skipped);
        assert!(notifier.sent().is_empty());
        assert_eq!(health.empty_comp_summaries(), 1);
        assert_eq!(health.listings_processed(), 1);
        assert_eq!(result.stages.len(), 10);
        assert_eq!(result.stages[8], PipelineStage::NotificationSkipped);
        assert_eq!(result.stages.last(), Some(&PipelineStage::Done));
    }

    #[tokio::test]
    async fn refresh_unknown_id_is_not_found() {
        let (pipeline, _) = pipeline_with(
            Arc::new(FixedComps::default()),
            Arc::new(RecordingNotifier::default()),
        )
        .await;
        let err = pipeline.refresh_comps(404, false).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(404)));
    }

    #[tokio::test]
    async fn refresh_reuses_stored_listing_without_notifying() {
        let notifier = Arc::new(RecordingNotifier::default());
        let comps = Arc::new(FixedComps::new(&[Some(150.0)]));
        let (pipeline, _) = pipeline_with(comps.clone(), notifier.clone()).await;

        let first = pipeline
            .process_listing(&raw("https://fb.example/3", "Desk lamp", "$100"), false)
            .await
            .unwrap();
        let again = pipeline.refresh_comps(first.listing_id, false).await.unwrap();

        assert_eq!(again.listing_id, first.listing_id);
        assert_eq!(again.estimate.profit, Some(30.5));
        assert_eq!(again.notification, NotificationOutcome::NotRequested);
        assert_eq!(comps.calls.load(Ordering::SeqCst), 2);
        assert!(notifier.sent().is_empty());
        assert_eq!(pipeline.repo().count().await.unwrap(), 1);
        assert_eq!(again.stages.first(), Some(&PipelineStage::Stored));
        assert_eq!(again.stages.last(), Some(&PipelineStage::Done));
    }

    #[tokio::test]
    async fn delivery_failure_is_reported_not_raised() {
        let notifier = Arc::new(RecordingNotifier::failing("relay refused"));
        let comps = Arc::new(FixedComps::new(&[Some(500.0), Some(500.0)]));
        let (pipeline, health) = pipeline_with(comps, notifier).await;

        let result = pipeline
            .process_listing(&raw("https://fb.example/4", "Road bike", "$50"), true)
            .await
            .unwrap();

        assert!(matches!(result.notification, NotificationOutcome::Failed { .. }));
        assert_eq!(health.alerts_failed(), 1);
        assert_eq!(health.listings_processed(), 1);
        let tail = &result.stages[result.stages.len() - 2..];
        assert_eq!(tail, [PipelineStage::NotificationFailed, PipelineStage::Done]);
        assert!(!result.stages.contains(&PipelineStage::NotificationSkipped));
    }
}
