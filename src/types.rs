use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// Loosely-structured text fields as handed over by a scraper or import file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawListing {
    pub source: String,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_text: Option<String>,
    /// Currency column from import files; overrides the one parsed from `price_text`.
    pub currency: Option<String>,
    pub location: Option<String>,
    pub posted_at_text: Option<String>,
    pub seller: Option<String>,
    pub photos: Vec<String>,
    /// User annotations; when present they replace the stored ones.
    pub label: Option<String>,
    pub note: Option<String>,
    /// Annotations applied only when the listing is first stored.
    #[serde(default)]
    pub initial_label: Option<String>,
    #[serde(default)]
    pub initial_note: Option<String>,
}

/// A normalized listing ready for upsert. `None` fields never overwrite stored values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewListing {
    pub source: String,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub location: Option<String>,
    pub distance_km: Option<f64>,
    pub posted_at_text: Option<String>,
    pub seller: Option<String>,
    pub photos: Option<Vec<String>>,
    pub label: Option<String>,
    pub note: Option<String>,
    /// Used instead of `label`/`note` on insert only; never touches an existing row.
    pub initial_label: Option<String>,
    pub initial_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub source: String,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub location: Option<String>,
    pub distance_km: Option<f64>,
    pub posted_at_text: Option<String>,
    pub seller: Option<String>,
    pub photos: Vec<String>,
    pub label: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Filters shared by `recent` and `search`.
#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    pub limit: i64,
    pub label: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

// ---------------------------------------------------------------------------
// Comps
// ---------------------------------------------------------------------------

/// One completed sale returned by the comp search. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompItem {
    pub title: String,
    pub price: Option<f64>,
    pub currency: String,
    pub url: String,
    pub ended: String,
    pub sold: bool,
}

/// Invariant: `count == 0` iff low/avg/high are all `None`, and low <= avg <= high.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompSummary {
    pub low: Option<f64>,
    pub avg: Option<f64>,
    pub high: Option<f64>,
    pub count: u32,
}

// ---------------------------------------------------------------------------
// Estimates, scores and decisions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Rounded to 2 decimals.
    pub profit: Option<f64>,
    /// Rounded to 1 decimal.
    pub roi_percent: Option<f64>,
}

/// Why a deal score could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreUnavailable {
    MissingPrice,
    MissingCompAverage,
    /// The arithmetic produced NaN or infinity.
    NonFinite,
}

impl std::fmt::Display for ScoreUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScoreUnavailable::MissingPrice => "missing_price",
            ScoreUnavailable::MissingCompAverage => "missing_comp_average",
            ScoreUnavailable::NonFinite => "non_finite",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreOutcome {
    Scored(f64),
    Unavailable(ScoreUnavailable),
}

impl ScoreOutcome {
    pub fn value(&self) -> Option<f64> {
        match self {
            ScoreOutcome::Scored(v) => Some(*v),
            ScoreOutcome::Unavailable(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    StrongBuy,
    ModerateUpside,
    WeakMarginPass,
    InsufficientData,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Decision::StrongBuy => "strong buy",
            Decision::ModerateUpside => "moderate upside",
            Decision::WeakMarginPass => "weak margin / pass",
            Decision::InsufficientData => "insufficient data",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Subject/body handed to the notifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertPayload {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationOutcome {
    /// The caller did not ask for a notification.
    NotRequested,
    /// Requested, but the thresholds were not met.
    Skipped,
    Sent,
    Failed { error: String },
}

// ---------------------------------------------------------------------------
// Pipeline results
// ---------------------------------------------------------------------------

/// Stages a listing moves through, strictly in this order. Every run ends in `Done`,
/// whatever the comp search returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Fetched,
    Normalized,
    Stored,
    CompsFetched,
    Aggregated,
    Estimated,
    Scored,
    Classified,
    NotificationSent,
    NotificationSkipped,
    NotificationFailed,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimateView {
    pub profit: Option<f64>,
    pub roi_percent: Option<f64>,
    pub score: Option<f64>,
    /// Present when no score could be computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_unavailable: Option<ScoreUnavailable>,
    pub decision: String,
}

/// Composed answer of a comp refresh for one listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshResult {
    pub listing_id: i64,
    pub ebay: CompSummary,
    pub estimate: EstimateView,
    pub notification: NotificationOutcome,
    /// Stages visited by this run, in order.
    #[serde(skip)]
    pub stages: Vec<PipelineStage>,
}
