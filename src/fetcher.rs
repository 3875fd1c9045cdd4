use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::api::latency::LatencyStats;
use crate::config::{Config, COMP_FETCH_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::retry::{RetryError, RetryPolicy};
use crate::types::CompItem;

/// `sellingState` value of a listing that ended with a sale.
const SOLD_STATE: &str = "EndedWithSales";

/// Currency reported when a comp omits `@currencyId`.
const DEFAULT_COMP_CURRENCY: &str = "USD";

static RE_PENDING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)Pending\s*·\s*").unwrap());
static RE_SYMBOLS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s\-+.]").unwrap());
static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Source of sold comparables. Failures degrade to an empty list: callers cannot
/// tell "no comps" from "fetch failed".
#[async_trait]
pub trait CompSource: Send + Sync {
    async fn find_completed_items(&self, title: &str, max_results: u32) -> Vec<CompItem>;
}

/// Client for the Finding API `findCompletedItems` call.
pub struct FindingClient {
    client: reqwest::Client,
    endpoint: String,
    app_id: String,
    global_id: String,
    retry: RetryPolicy,
    latency: Arc<LatencyStats>,
}

/// Outcome of one HTTP attempt that did not produce items.
#[derive(Debug)]
enum AttemptError {
    /// 5xx or connection trouble; worth another try.
    Transient(String),
    /// 4xx or an unparseable body; retrying would not help.
    Permanent(String),
}

impl AttemptError {
    fn is_transient(&self) -> bool {
        matches!(self, AttemptError::Transient(_))
    }
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Transient(msg) => write!(f, "transient: {msg}"),
            AttemptError::Permanent(msg) => write!(f, "permanent: {msg}"),
        }
    }
}

impl FindingClient {
    /// Fails with `AppError::Config` when the application id is missing. There is no
    /// point retrying that, so it surfaces at startup.
    pub fn new(
        endpoint: impl Into<String>,
        app_id: Option<String>,
        global_id: impl Into<String>,
        latency: Arc<LatencyStats>,
    ) -> Result<Self> {
        let app_id = app_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| AppError::Config("Missing EBAY_APP_ID in environment".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(COMP_FETCH_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            app_id,
            global_id: global_id.into(),
            retry: RetryPolicy::comp_fetch(),
            latency,
        })
    }

    pub fn from_config(cfg: &Config, latency: Arc<LatencyStats>) -> Result<Self> {
        Self::new(
            cfg.finding_api_url.clone(),
            cfg.ebay_app_id.clone(),
            cfg.ebay_global_id.clone(),
            latency,
        )
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_once(&self, keywords: &str, max_results: u32) -> std::result::Result<Vec<CompItem>, AttemptError> {
        let per_page = max_results.to_string();
        let params = [
            ("OPERATION-NAME", "findCompletedItems"),
            ("SERVICE-VERSION", "1.13.0"),
            ("SECURITY-APPNAME", self.app_id.as_str()),
            ("RESPONSE-DATA-FORMAT", "JSON"),
            ("REST-PAYLOAD", "true"),
            ("GLOBAL-ID", self.global_id.as_str()),
            ("paginationInput.entriesPerPage", per_page.as_str()),
            ("keywords", keywords),
            ("itemFilter(0).name", "SoldItemsOnly"),
            ("itemFilter(0).value", "true"),
            ("sortOrder", "EndTimeSoonest"),
        ];

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(AttemptError::Transient(format!("comp search returned {status}")));
        }
        if !status.is_success() {
            return Err(AttemptError::Permanent(format!("comp search returned {status}")));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;
        let json: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| AttemptError::Permanent(format!("bad JSON: {e}")))?;

        Ok(parse_completed_items(&json))
    }
}

#[async_trait]
impl CompSource for FindingClient {
    async fn find_completed_items(&self, title: &str, max_results: u32) -> Vec<CompItem> {
        let keywords = clean_query(title);
        if keywords.is_empty() {
            debug!(title, "nothing searchable left in title, skipping comp search");
            return Vec::new();
        }

        let started = Instant::now();
        let result = self
            .retry
            .run(|_| self.fetch_once(&keywords, max_results), AttemptError::is_transient)
            .await;
        self.latency.record(started.elapsed());

        match result {
            Ok(items) => {
                info!(
                    keywords = %keywords,
                    items = items.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "comp search complete"
                );
                items
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                warn!(keywords = %keywords, attempts, "comp search gave up: {last}");
                Vec::new()
            }
            Err(RetryError::Permanent { attempt, error }) => {
                warn!(keywords = %keywords, attempt, "comp search failed: {error}");
                Vec::new()
            }
        }
    }
}

/// Strip the pending-status marker and symbols/emoji, collapse whitespace.
pub fn clean_query(title: &str) -> String {
    let t = RE_PENDING.replace_all(title, "");
    let t = RE_SYMBOLS.replace_all(&t, " ");
    RE_SPACES.replace_all(&t, " ").trim().to_string()
}

/// Map a `findCompletedItems` JSON response into comps. Every field in this API is
/// wrapped in a one-element array. Missing fields fall back to defaults; a bad price
/// only blanks that item's price.
pub fn parse_completed_items(v: &serde_json::Value) -> Vec<CompItem> {
    let items = first(v, "findCompletedItemsResponse")
        .and_then(|r| first(r, "searchResult"))
        .and_then(|s| s.get("item"))
        .and_then(|i| i.as_array());

    let Some(items) = items else {
        return Vec::new();
    };

    items.iter().map(parse_item).collect()
}

fn parse_item(it: &serde_json::Value) -> CompItem {
    let selling = first(it, "sellingStatus");
    let current_price = selling.and_then(|s| first(s, "currentPrice"));

    let price = current_price
        .and_then(|p| p.get("__value__"))
        .and_then(|p| p.as_f64().or_else(|| p.as_str().and_then(|s| s.trim().parse().ok())))
        .filter(|p: &f64| p.is_finite());

    let currency = current_price
        .and_then(|p| p.get("@currencyId"))
        .and_then(|c| c.as_str())
        .unwrap_or(DEFAULT_COMP_CURRENCY)
        .to_string();

    let state = selling
        .and_then(|s| first_str(s, "sellingState"))
        .unwrap_or("");

    CompItem {
        title: first_str(it, "title").unwrap_or("").to_string(),
        price,
        currency,
        url: first_str(it, "viewItemURL").unwrap_or("").to_string(),
        ended: first(it, "listingInfo")
            .and_then(|l| first_str(l, "endTime"))
            .unwrap_or("")
            .to_string(),
        sold: state.eq_ignore_ascii_case(SOLD_STATE),
    }
}

fn first<'a>(v: &'a serde_json::Value, key: &str) -> Option<&'a serde_json::Value> {
    v.get(key).and_then(|a| a.as_array()).and_then(|a| a.first())
}

fn first_str<'a>(v: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    first(v, key).and_then(|s| s.as_str())
}
