use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::db::models::{LabelCountRow, ListingRow};
use crate::error::{AppError, Result};
use crate::types::{Listing, ListingFilter, NewListing};

/// Result of an upsert: the row id and whether this call created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upserted {
    pub id: i64,
    pub created: bool,
}

/// Keyed store over the `listings` table. The UNIQUE(source, url) constraint is the
/// only guard against duplicate rows; no application-level locking.
#[derive(Clone)]
pub struct ListingRepo {
    pool: SqlitePool,
}

impl ListingRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new listing or merge it into the stored row with the same (source, url).
    /// Incoming `None` fields never erase stored values, and the import defaults
    /// (`initial_label`, `initial_note`) only apply when the row is created.
    ///
    /// One autocommit statement: the UNIQUE(source, url) conflict clause resolves
    /// concurrent writers inside SQLite, so there is no read-then-write window.
    pub async fn upsert(&self, listing: &NewListing) -> Result<Upserted> {
        let photos = encode_photos(listing)?;
        let now = Utc::now();

        let (id, created) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            INSERT INTO listings (
                source, url, title, description, price, currency, location, distance_km,
                posted_at_text, seller, photos, label, note, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, COALESCE(?, ?), COALESCE(?, ?), ?)
            ON CONFLICT(source, url) DO UPDATE SET
                title = COALESCE(excluded.title, listings.title),
                description = COALESCE(excluded.description, listings.description),
                price = COALESCE(excluded.price, listings.price),
                currency = COALESCE(excluded.currency, listings.currency),
                location = COALESCE(excluded.location, listings.location),
                distance_km = COALESCE(excluded.distance_km, listings.distance_km),
                posted_at_text = COALESCE(excluded.posted_at_text, listings.posted_at_text),
                seller = COALESCE(excluded.seller, listings.seller),
                photos = COALESCE(excluded.photos, listings.photos),
                label = COALESCE(?, listings.label),
                note = COALESCE(?, listings.note)
            RETURNING id, created_at = ? AS created
            "#,
        )
        .bind(&listing.source)
        .bind(&listing.url)
        .bind(listing.title.as_deref())
        .bind(listing.description.as_deref())
        .bind(listing.price)
        .bind(listing.currency.as_deref())
        .bind(listing.location.as_deref())
        .bind(listing.distance_km)
        .bind(listing.posted_at_text.as_deref())
        .bind(listing.seller.as_deref())
        .bind(photos.as_deref())
        .bind(listing.label.as_deref())
        .bind(listing.initial_label.as_deref())
        .bind(listing.note.as_deref())
        .bind(listing.initial_note.as_deref())
        .bind(now)
        .bind(listing.label.as_deref())
        .bind(listing.note.as_deref())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let created = created != 0;
        debug!(listing_id = id, created, source = %listing.source, "listing upserted");
        Ok(Upserted { id, created })
    }

    pub async fn get(&self, id: i64) -> Result<Option<Listing>> {
        let row = sqlx::query_as::<_, ListingRow>("SELECT * FROM listings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Listing::from))
    }

    /// Most recent first.
    pub async fn recent(&self, filter: &ListingFilter) -> Result<Vec<Listing>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM listings WHERE 1 = 1");
        push_filters(&mut qb, filter);
        self.fetch_listings(qb).await
    }

    /// Case-insensitive substring match over title and description.
    pub async fn search(&self, q: &str, filter: &ListingFilter) -> Result<Vec<Listing>> {
        let pattern = format!("%{}%", escape_like(q));
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM listings WHERE (title LIKE ");
        qb.push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR description LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
        push_filters(&mut qb, filter);
        self.fetch_listings(qb).await
    }

    /// Partial update of the user annotations; `None` leaves the stored value.
    pub async fn set_note(&self, id: i64, label: Option<&str>, note: Option<&str>) -> Result<Listing> {
        let result = sqlx::query(
            "UPDATE listings SET label = COALESCE(?, label), note = COALESCE(?, note) WHERE id = ?",
        )
        .bind(label)
        .bind(note)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(id));
        }
        self.get(id).await?.ok_or(AppError::NotFound(id))
    }

    /// Rows for the CSV export, most recent first.
    pub async fn export_rows(&self, limit: i64) -> Result<Vec<Listing>> {
        let rows = sqlx::query_as::<_, ListingRow>("SELECT * FROM listings ORDER BY id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Listing::from).collect())
    }

    /// Listing count per label; unlabelled rows are reported under "".
    pub async fn label_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query_as::<_, LabelCountRow>(
            r#"
            SELECT COALESCE(label, '') AS label, COUNT(*) AS count
            FROM listings
            GROUP BY COALESCE(label, '')
            ORDER BY count DESC, label ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| (r.label, r.count)).collect())
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM listings")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn fetch_listings(&self, mut qb: QueryBuilder<'_, Sqlite>) -> Result<Vec<Listing>> {
        let rows = qb
            .build_query_as::<ListingRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Listing::from).collect())
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ListingFilter) {
    if let Some(label) = &filter.label {
        qb.push(" AND label = ").push_bind(label.clone());
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND price IS NOT NULL AND price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND price IS NOT NULL AND price <= ").push_bind(max);
    }
    qb.push(" ORDER BY id DESC LIMIT ").push_bind(filter.limit);
}

fn escape_like(q: &str) -> String {
    q.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn encode_photos(listing: &NewListing) -> Result<Option<String>> {
    Ok(match &listing.photos {
        Some(p) => Some(serde_json::to_string(p)?),
        None => None,
    })
}
