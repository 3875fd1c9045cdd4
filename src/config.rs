use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const FINDING_API_URL: &str = "https://svcs.ebay.com/services/search/FindingService/v1";
pub const DEFAULT_GLOBAL_ID: &str = "EBAY-ENCA";

/// Currency assumed for listing prices that carry no foreign marker.
pub const HOME_CURRENCY: &str = "CAD";

/// Fraction of resale proceeds lost to marketplace and payment fees.
pub const DEFAULT_FEE_RATE: f64 = 0.13;

/// Comps requested per search.
pub const DEFAULT_COMP_MAX_RESULTS: u32 = 20;
pub const DEFAULT_INGEST_WORKERS: usize = 2;

/// Comp search attempts before giving up with an empty result.
pub const COMP_FETCH_MAX_ATTEMPTS: u32 = 3;

/// Linear backoff step: sleep `attempt * step` after a transient failure.
pub const COMP_FETCH_BACKOFF_STEP_MS: u64 = 800;

/// Per-attempt request timeout (seconds).
pub const COMP_FETCH_TIMEOUT_SECS: u64 = 20;

/// Titles longer than this are cut in alert subjects.
pub const SUBJECT_TITLE_CHARS: usize = 60;

/// Notification gate defaults.
pub mod notify_defaults {
    pub const MIN_PROFIT: f64 = 40.0;
    pub const MIN_ROI: f64 = 35.0;
    pub const MIN_SCORE: f64 = 20.0;
}

/// Alert thresholds, built once at startup and passed to the gate and estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub profit_bar: f64,
    pub roi_bar: f64,
    pub score_bar: f64,
    pub fee_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            profit_bar: notify_defaults::MIN_PROFIT,
            roi_bar: notify_defaults::MIN_ROI,
            score_bar: notify_defaults::MIN_SCORE,
            fee_rate: DEFAULT_FEE_RATE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl SmtpConfig {
    /// True when every field needed to send mail is present.
    pub fn is_complete(&self) -> bool {
        self.host.is_some()
            && self.user.is_some()
            && self.password.is_some()
            && self.from.is_some()
            && self.to.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Finding API application id (EBAY_APP_ID). Required to fetch comps.
    pub ebay_app_id: Option<String>,
    /// Marketplace region (EBAY_GLOBAL_ID), e.g. EBAY-ENCA or EBAY-US.
    pub ebay_global_id: String,
    pub finding_api_url: String,
    pub comp_max_results: u32,
    pub thresholds: Thresholds,
    pub smtp: SmtpConfig,
    /// Concurrent ingest workers (INGEST_WORKERS).
    pub ingest_workers: usize,
    /// Jitter bounds slept between ingest tasks.
    pub ingest_delay_min: Duration,
    pub ingest_delay_max: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let ingest_delay_min = parse_env_f64("INGEST_DELAY_MIN_SECS", 1.5)?;
        let ingest_delay_max = parse_env_f64("INGEST_DELAY_MAX_SECS", 3.5)?;
        if ingest_delay_min < 0.0 || ingest_delay_max < ingest_delay_min {
            return Err(AppError::Config(
                "INGEST_DELAY_MIN_SECS must be >= 0 and <= INGEST_DELAY_MAX_SECS".to_string(),
            ));
        }

        let fee_rate = parse_env_f64("FEE_RATE", DEFAULT_FEE_RATE)?;
        if !(0.0..1.0).contains(&fee_rate) {
            return Err(AppError::Config("FEE_RATE must be in [0, 1)".to_string()));
        }

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "flipfinder.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            ebay_app_id: non_empty_var("EBAY_APP_ID"),
            ebay_global_id: std::env::var("EBAY_GLOBAL_ID")
                .unwrap_or_else(|_| DEFAULT_GLOBAL_ID.to_string()),
            finding_api_url: std::env::var("FINDING_API_URL")
                .unwrap_or_else(|_| FINDING_API_URL.to_string()),
            comp_max_results: parse_env_count("COMP_MAX_RESULTS", DEFAULT_COMP_MAX_RESULTS)?,
            thresholds: Thresholds {
                profit_bar: parse_env_f64("NOTIFY_MIN_PROFIT", notify_defaults::MIN_PROFIT)?,
                roi_bar: parse_env_f64("NOTIFY_MIN_ROI", notify_defaults::MIN_ROI)?,
                score_bar: parse_env_f64("NOTIFY_MIN_SCORE", notify_defaults::MIN_SCORE)?,
                fee_rate,
            },
            smtp: SmtpConfig {
                host: non_empty_var("SMTP_HOST"),
                port: std::env::var("SMTP_PORT")
                    .unwrap_or_else(|_| "587".to_string())
                    .parse::<u16>()
                    .map_err(|_| AppError::Config("SMTP_PORT must be a valid port number".to_string()))?,
                user: non_empty_var("SMTP_USER"),
                password: non_empty_var("SMTP_PASS"),
                from: non_empty_var("EMAIL_FROM").or_else(|| non_empty_var("SMTP_USER")),
                to: non_empty_var("EMAIL_TO"),
            },
            ingest_workers: parse_env_count("INGEST_WORKERS", DEFAULT_INGEST_WORKERS)?,
            ingest_delay_min: Duration::from_secs_f64(ingest_delay_min),
            ingest_delay_max: Duration::from_secs_f64(ingest_delay_max),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env_f64(key: &str, default: f64) -> Result<f64> {
    match non_empty_var(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| AppError::Config(format!("{key} must be a number, got {raw:?}"))),
    }
}

fn parse_env_count<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + PartialOrd + Default,
{
    parse_count(key, non_empty_var(key).as_deref(), default)
}

/// Positive integer setting; unset means `default`.
fn parse_count<T>(key: &str, raw: Option<&str>, default: T) -> Result<T>
where
    T: FromStr + PartialOrd + Default,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .ok()
            .filter(|v| *v > T::default())
            .ok_or_else(|| AppError::Config(format!("{key} must be a positive integer, got {raw:?}"))),
    }
}
