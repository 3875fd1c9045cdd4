//! Batch ingestion: a fixed pool of workers draining a shared queue of listings.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use rand::Rng;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::types::{NotificationOutcome, RawListing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    pub workers: usize,
    pub delay_min: Duration,
    pub delay_max: Duration,
    /// Ask the gate to alert on qualifying deals.
    pub notify: bool,
}

impl IngestOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            workers: cfg.ingest_workers,
            delay_min: cfg.ingest_delay_min,
            delay_max: cfg.ingest_delay_max,
            notify: true,
        }
    }
}

/// Totals across all workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub processed: usize,
    pub failed: usize,
    pub alerts_sent: usize,
}

impl IngestReport {
    fn merge(mut self, other: IngestReport) -> Self {
        self.processed += other.processed;
        self.failed += other.failed;
        self.alerts_sent += other.alerts_sent;
        self
    }
}

/// Run every listing through the pipeline with `opts.workers` concurrent workers.
/// Each listing succeeds or fails on its own; a failure is logged and the worker
/// moves on. Returns once the queue is drained.
pub async fn run_batch(pipeline: Arc<Pipeline>, listings: Vec<RawListing>, opts: IngestOptions) -> IngestReport {
    let total = listings.len();
    let (tx, rx) = mpsc::channel(total.max(1));
    for listing in listings {
        // Capacity covers the whole batch.
        if tx.send(listing).await.is_err() {
            break;
        }
    }
    drop(tx);

    let queue = Arc::new(Mutex::new(rx));
    let workers = opts.workers.max(1);
    info!(total, workers, "ingest started");

    let handles = (0..workers).map(|worker_id| {
        let queue = queue.clone();
        let pipeline = pipeline.clone();
        tokio::spawn(async move { worker(worker_id, queue, pipeline, opts).await })
    });

    let report = join_all(handles)
        .await
        .into_iter()
        .fold(IngestReport::default(), |acc, joined| match joined {
            Ok(r) => acc.merge(r),
            Err(e) => {
                error!("ingest worker panicked: {e}");
                acc
            }
        });

    info!(
        processed = report.processed,
        failed = report.failed,
        alerts_sent = report.alerts_sent,
        "ingest finished"
    );
    report
}

async fn worker(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<RawListing>>>,
    pipeline: Arc<Pipeline>,
    opts: IngestOptions,
) -> IngestReport {
    let mut report = IngestReport::default();
    let mut first = true;

    loop {
        // Lock only long enough to pull the next item.
        let next = queue.lock().await.recv().await;
        let Some(raw) = next else {
            break;
        };

        if !first {
            tokio::time::sleep(jitter(opts.delay_min, opts.delay_max)).await;
        }
        first = false;

        match pipeline.process_listing(&raw, opts.notify).await {
            Ok(result) => {
                report.processed += 1;
                if result.notification == NotificationOutcome::Sent {
                    report.alerts_sent += 1;
                }
                info!(
                    worker_id,
                    listing_id = result.listing_id,
                    decision = %result.estimate.decision,
                    "listing ingested"
                );
            }
            Err(e) => {
                report.failed += 1;
                warn!(worker_id, url = %raw.url, "listing failed: {e}");
            }
        }
    }

    report
}

/// Uniform random delay in `[min, max]`.
fn jitter(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let secs = rand::rng().random_range(min.as_secs_f64()..=max.as_secs_f64());
    Duration::from_secs_f64(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::notify::testing::RecordingNotifier;
    use crate::pipeline::tests::{pipeline_with, raw, FixedComps};

    fn opts(workers: usize) -> IngestOptions {
        IngestOptions {
            workers,
            delay_min: Duration::ZERO,
            delay_max: Duration::ZERO,
            notify: true,
        }
    }

    #[tokio::test]
    async fn every_listing_is_processed_once() {
        let comps = Arc::new(FixedComps::new(&[Some(400.0), Some(420.0)]));
        let notifier = Arc::new(RecordingNotifier::default());
        let (pipeline, health) = pipeline_with(comps.clone(), notifier.clone()).await;
        let pipeline = Arc::new(pipeline);

        let batch: Vec<RawListing> = (0..5)
            .map(|i| raw(&format!("https://fb.example/{i}"), "Trek FX 2", "$100"))
            .collect();

        let report = run_batch(pipeline.clone(), batch, opts(2)).await;

        assert_eq!(report, IngestReport { processed: 5, failed: 0, alerts_sent: 5 });
        assert_eq!(comps.calls.load(Ordering::SeqCst), 5);
        assert_eq!(notifier.sent().len(), 5);
        assert_eq!(health.listings_processed(), 5);
        assert_eq!(pipeline.repo().count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn duplicate_keys_in_one_batch_collapse_to_one_row() {
        let (pipeline, _) = pipeline_with(
            Arc::new(FixedComps::default()),
            Arc::new(RecordingNotifier::default()),
        )
        .await;
        let pipeline = Arc::new(pipeline);

        let batch = vec![
            raw("https://fb.example/same", "Lamp", "$10"),
            raw("https://fb.example/same", "Lamp", "$12"),
            raw("https://fb.example/same", "Lamp", "$14"),
        ];
        let report = run_batch(pipeline.clone(), batch, opts(3)).await;

        assert_eq!(report.processed, 3);
        assert_eq!(pipeline.repo().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_batch_finishes_immediately() {
        let (pipeline, _) = pipeline_with(
            Arc::new(FixedComps::default()),
            Arc::new(RecordingNotifier::default()),
        )
        .await;
        let report = run_batch(Arc::new(pipeline), Vec::new(), opts(4)).await;
        assert_eq!(report, IngestReport::default());
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let min = Duration::from_millis(1500);
        let max = Duration::from_millis(3500);
        for _ in 0..100 {
            let d = jitter(min, max);
            assert!(d >= min && d <= max, "{d:?}");
        }
        assert_eq!(jitter(max, min), max);
    }
}
