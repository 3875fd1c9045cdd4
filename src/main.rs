mod api;
mod config;
mod db;
mod error;
mod export;
mod fetcher;
mod ingest;
mod normalize;
mod notify;
mod pipeline;
mod retry;
mod scorer;
mod source;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::{router, ApiState};
use crate::config::Config;
use crate::db::ListingRepo;
use crate::error::Result;
use crate::export::{build_deals_report, deals_csv};
use crate::fetcher::FindingClient;
use crate::ingest::{run_batch, IngestOptions};
use crate::notify::{NotificationGate, SmtpNotifier};
use crate::pipeline::Pipeline;
use crate::source::{CsvWatchlist, ListingSource};

const USAGE: &str = "usage: flipfinder [serve | ingest <watchlist.csv> | report [limit] [out.csv]]";

const REPORT_DEFAULT_LIMIT: i64 = 50;
const REPORT_DEFAULT_OUT: &str = "deals.csv";

enum Command {
    Serve,
    Ingest { path: String },
    Report { limit: i64, out: String },
}

impl Command {
    fn parse(args: &[String]) -> std::result::Result<Self, String> {
        match args.first().map(String::as_str) {
            None | Some("serve") => Ok(Command::Serve),
            Some("ingest") => match args.get(1) {
                Some(path) => Ok(Command::Ingest { path: path.clone() }),
                None => Err(USAGE.to_string()),
            },
            Some("report") => {
                let limit = match args.get(1) {
                    Some(raw) => raw
                        .parse::<i64>()
                        .map_err(|_| format!("report limit must be a number, got {raw:?}"))?,
                    None => REPORT_DEFAULT_LIMIT,
                };
                let out = args
                    .get(2)
                    .cloned()
                    .unwrap_or_else(|| REPORT_DEFAULT_OUT.to_string());
                Ok(Command::Report { limit: limit.max(1), out })
            }
            Some(other) => Err(format!("unknown command {other:?}\n{USAGE}")),
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg, command).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config, command: Command) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Collaborators ---
    let latency = Arc::new(LatencyStats::new());
    let health = Arc::new(HealthState::new());
    let comps = FindingClient::from_config(&cfg, Arc::clone(&latency))?;

    if !cfg.smtp.is_complete() {
        warn!("SMTP/EMAIL_* settings incomplete; deal alerts will be reported as failed");
    }
    let gate = NotificationGate::new(Arc::new(SmtpNotifier::new(cfg.smtp.clone())), cfg.thresholds);

    let pipeline = Arc::new(Pipeline::new(
        ListingRepo::new(pool),
        Arc::new(comps),
        gate,
        Arc::clone(&health),
        cfg.comp_max_results,
    ));

    match command {
        Command::Serve => serve(&cfg, pipeline, health, latency).await,
        Command::Ingest { path } => {
            let source = CsvWatchlist::new(path);
            let listings = source.fetch().await?;
            info!(source = source.name(), listings = listings.len(), "starting ingest");
            let report = run_batch(pipeline, listings, IngestOptions::from_config(&cfg)).await;
            info!(
                "Ingest complete: {} processed, {} failed, {} alerts sent",
                report.processed, report.failed, report.alerts_sent
            );
            Ok(())
        }
        Command::Report { limit, out } => {
            let rows = build_deals_report(&pipeline, limit).await?;
            tokio::fs::write(&out, deals_csv(&rows)?).await?;
            info!("Wrote {out} with {} rows", rows.len());
            Ok(())
        }
    }
}

async fn serve(
    cfg: &Config,
    pipeline: Arc<Pipeline>,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
) -> Result<()> {
    let app = router(ApiState {
        pipeline,
        health,
        latency,
    });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
