/// Database row types matching `migrations/`.
/// Used by sqlx for typed queries.
use chrono::{DateTime, Utc};

use crate::types::Listing;

#[derive(Debug, sqlx::FromRow)]
pub struct ListingRow {
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
    /// JSON array of photo URLs.
    pub photos: Option<String>,
    pub label: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ListingRow> for Listing {
    fn from(r: ListingRow) -> Self {
        // A corrupt photos column only loses the photos, not the row.
        let photos = r
            .photos
            .as_deref()
            .and_then(|p| serde_json::from_str::<Vec<String>>(p).ok())
            .unwrap_or_default();

        Listing {
            id: r.id,
            source: r.source,
            url: r.url,
            title: r.title,
            description: r.description,
            price: r.price,
            currency: r.currency,
            location: r.location,
            distance_km: r.distance_km,
            posted_at_text: r.posted_at_text,
            seller: r.seller,
            photos,
            label: r.label,
            note: r.note,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct LabelCountRow {
    pub label: String,
    pub count: i64,
}
